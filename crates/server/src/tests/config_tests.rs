use super::*;

use std::{
    collections::HashMap,
    env, fs,
    time::{SystemTime, UNIX_EPOCH},
};

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_listen_on_port_3001() {
    let settings = Settings::default();
    assert_eq!(settings.server_bind, "0.0.0.0:3001");
    assert!(!settings.debug);
}

#[test]
fn file_overrides_apply_typed_values() {
    let mut settings = Settings::default();
    apply_file_overrides(
        &mut settings,
        r#"
        bind_addr = "127.0.0.1:9000"
        upload_dir = "/tmp/todo-uploads"
        max_upload_bytes = 1024
        debug = true
        "#,
    )
    .expect("valid toml");

    assert_eq!(settings.server_bind, "127.0.0.1:9000");
    assert_eq!(settings.upload_dir, PathBuf::from("/tmp/todo-uploads"));
    assert_eq!(settings.max_upload_bytes, 1024);
    assert!(settings.debug);
    assert_eq!(settings.database_url, Settings::default().database_url);
}

#[test]
fn malformed_file_is_reported_and_leaves_settings_alone() {
    let mut settings = Settings::default();
    assert!(apply_file_overrides(&mut settings, "max_upload_bytes = \"lots\"").is_err());
    assert_eq!(settings, Settings::default());
}

#[test]
fn app_prefixed_env_wins_over_plain_env() {
    let mut settings = Settings::default();
    apply_env_overrides(
        &mut settings,
        env_from(&[
            ("SERVER_BIND", "127.0.0.1:1"),
            ("APP__BIND_ADDR", "127.0.0.1:2"),
            ("DATABASE_URL", "sqlite::memory:"),
            ("APP__MAX_UPLOAD_BYTES", "not-a-number"),
        ]),
    );
    assert_eq!(settings.server_bind, "127.0.0.1:2");
    assert_eq!(settings.database_url, "sqlite::memory:");
    assert_eq!(settings.max_upload_bytes, Settings::default().max_upload_bytes);
}

#[test]
fn debug_flag_accepts_common_truthy_spellings() {
    for raw in ["1", "true", "ON", " yes "] {
        assert!(parse_flag(raw), "{raw} should enable debug");
    }
    for raw in ["", "0", "off", "no", "maybe"] {
        assert!(!parse_flag(raw), "{raw} should not enable debug");
    }
}

#[test]
fn normalizes_plain_file_path_to_sqlite_url() {
    assert_eq!(
        normalize_database_url("./data/test.db"),
        "sqlite://./data/test.db"
    );
}

#[test]
fn keeps_memory_and_explicit_urls() {
    assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
    assert_eq!(
        normalize_database_url("sqlite://./data/todo.db"),
        "sqlite://./data/todo.db"
    );
    assert_eq!(normalize_database_url("  "), Settings::default().database_url);
}

#[test]
fn creates_parent_dir_for_sqlite_url() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();

    let temp_root = env::temp_dir().join(format!("todo_server_config_test_{suffix}"));
    let db_path = temp_root.join("data").join("test.db");

    prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare db url");
    assert!(temp_root.join("data").exists());

    fs::remove_dir_all(temp_root).expect("cleanup");
}

#[tokio::test]
async fn prepared_database_url_creates_openable_sqlite_file() {
    let suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock")
        .as_nanos();

    let temp_root = env::temp_dir().join(format!("todo_server_open_test_{suffix}"));
    let db_path = temp_root.join("nested").join("todo.db");

    let prepared = prepare_database_url(db_path.to_string_lossy().as_ref()).expect("prepare");
    let storage = storage::Storage::new(&prepared).await.expect("open sqlite");
    drop(storage);

    assert!(
        db_path.exists(),
        "database file should be created: {}",
        db_path.display()
    );

    fs::remove_dir_all(temp_root).expect("cleanup");
}
