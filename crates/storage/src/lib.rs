use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{Item, ItemId, ListDetail, ListId, ListSummary};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    /// All lists ordered by name, each with its current item count.
    pub async fn list_summaries(&self) -> Result<Vec<ListSummary>> {
        let rows = sqlx::query(
            "SELECT l.id, l.name, COUNT(i.id) AS item_count
             FROM todo_lists l
             LEFT JOIN todo_items i ON i.list_id = l.id
             GROUP BY l.id, l.name
             ORDER BY l.name, l.id",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list todo lists")?;

        Ok(rows
            .into_iter()
            .map(|row| ListSummary {
                id: ListId(row.get::<i64, _>("id")),
                name: row.get::<String, _>("name"),
                item_count: row.get::<i64, _>("item_count").max(0) as u32,
            })
            .collect())
    }

    pub async fn create_list(&self, name: &str) -> Result<ListId> {
        let rec = sqlx::query("INSERT INTO todo_lists (name) VALUES (?) RETURNING id")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .context("failed to insert todo list")?;
        Ok(ListId(rec.get::<i64, _>(0)))
    }

    pub async fn get_list(&self, list_id: ListId) -> Result<Option<ListDetail>> {
        let Some(row) = sqlx::query("SELECT id, name FROM todo_lists WHERE id = ?")
            .bind(list_id.0)
            .fetch_optional(&self.pool)
            .await?
        else {
            return Ok(None);
        };

        let items = sqlx::query(
            "SELECT id, label, checked FROM todo_items
             WHERE list_id = ?
             ORDER BY position, id",
        )
        .bind(list_id.0)
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("failed to load items for list {}", list_id.0))?
        .into_iter()
        .map(|row| Item {
            id: ItemId(row.get::<i64, _>("id")),
            label: row.get::<String, _>("label"),
            checked: row.get::<bool, _>("checked"),
        })
        .collect();

        Ok(Some(ListDetail {
            id: ListId(row.get::<i64, _>("id")),
            name: row.get::<String, _>("name"),
            items,
        }))
    }

    /// Returns `false` when no list with that id existed.
    pub async fn delete_list(&self, list_id: ListId) -> Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM todo_items WHERE list_id = ?")
            .bind(list_id.0)
            .execute(&mut *tx)
            .await?;
        let deleted = sqlx::query("DELETE FROM todo_lists WHERE id = ?")
            .bind(list_id.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        tx.commit().await?;
        Ok(deleted == 1)
    }

    /// Appends an unchecked item and returns the updated list, or `None` for
    /// an unknown list.
    pub async fn create_item(&self, list_id: ListId, label: &str) -> Result<Option<ListDetail>> {
        if !self.list_exists(list_id).await? {
            return Ok(None);
        }

        sqlx::query(
            "INSERT INTO todo_items (list_id, label, checked, position)
             VALUES (?1, ?2, 0, (SELECT COALESCE(MAX(position) + 1, 0) FROM todo_items WHERE list_id = ?1))",
        )
        .bind(list_id.0)
        .bind(label)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert item into list {}", list_id.0))?;

        self.get_list(list_id).await
    }

    /// Removing an item that is not in the list still returns the list.
    pub async fn delete_item(&self, list_id: ListId, item_id: ItemId) -> Result<Option<ListDetail>> {
        if !self.list_exists(list_id).await? {
            return Ok(None);
        }

        sqlx::query("DELETE FROM todo_items WHERE id = ?1 AND list_id = ?2")
            .bind(item_id.0)
            .bind(list_id.0)
            .execute(&self.pool)
            .await?;

        self.get_list(list_id).await
    }

    /// `None` when either the list or the item inside it does not exist.
    pub async fn set_item_checked_state(
        &self,
        list_id: ListId,
        item_id: ItemId,
        checked: bool,
    ) -> Result<Option<ListDetail>> {
        let updated = sqlx::query("UPDATE todo_items SET checked = ?1 WHERE id = ?2 AND list_id = ?3")
            .bind(checked)
            .bind(item_id.0)
            .bind(list_id.0)
            .execute(&self.pool)
            .await?
            .rows_affected();
        if updated == 0 {
            return Ok(None);
        }

        self.get_list(list_id).await
    }

    async fn list_exists(&self, list_id: ListId) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM todo_lists WHERE id = ?")
            .bind(list_id.0)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
