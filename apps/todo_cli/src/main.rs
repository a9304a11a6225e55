mod commands;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use client_core::{
    load_client_settings, ClientEvent, DetailController, SyncError, TodoApp, UploadFile,
    UploadPhase, ViewState,
};
use shared::domain::{ListDetail, ListSummary};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::{info, warn};

use commands::{parse_command, Command, HELP};

#[derive(Parser, Debug)]
struct Args {
    /// Overrides the server url from client.toml and the environment.
    #[arg(long)]
    server_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = load_client_settings();
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url;
    }
    let mut app = TodoApp::from_settings(&settings)?;
    info!(server_url = %settings.server_url, "todo cli starting");

    tokio::spawn(print_events(BroadcastStream::new(app.subscribe_events())));
    if let Err(err) = app.collection().refresh().await {
        println!("could not load lists: {err}");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                println!("{err}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        run_command(&mut app, command).await;
    }
    Ok(())
}

async fn run_command(app: &mut TodoApp, command: Command) {
    match command {
        Command::Lists => {
            app.prune_upload_trackers().await;
            let collection = app.collection();
            tokio::spawn(async move {
                let _ = collection.refresh().await;
            });
        }
        Command::New(name) => {
            let collection = app.collection();
            tokio::spawn(async move { report_local(collection.create_list(&name).await) });
        }
        Command::Remove(list_id) => {
            let collection = app.collection();
            tokio::spawn(async move { report_local(collection.delete_list(list_id).await) });
        }
        Command::Open(list_id) => {
            let detail = app.select(list_id);
            tokio::spawn(async move { report_local(detail.load().await) });
        }
        Command::Add(label) => {
            if let Some(detail) = open_detail(app) {
                tokio::spawn(async move { report_local(detail.create_item(&label).await) });
            }
        }
        Command::Delete(item_id) => {
            if let Some(detail) = open_detail(app) {
                tokio::spawn(async move { report_local(detail.delete_item(item_id).await) });
            }
        }
        Command::Toggle(item_id) => {
            if let Some(detail) = open_detail(app) {
                tokio::spawn(async move { report_local(detail.toggle_item(item_id).await) });
            }
        }
        Command::Back => {
            if let Err(err) = app.clear_selection().await {
                warn!(error = %err, "refresh after navigating back failed");
            }
        }
        Command::Upload { list_id, path } => {
            let tracker = app.upload_tracker(list_id);
            if !tracker.select_file() {
                println!("list {list_id}: an upload is already running");
                return;
            }
            tokio::spawn(async move {
                let file = match UploadFile::from_path(&path).await {
                    Ok(file) => file,
                    Err(err) => {
                        println!("cannot read {}: {err}", path.display());
                        return;
                    }
                };
                let mut states = tracker.subscribe();
                let progress = tokio::spawn(async move {
                    while states.changed().await.is_ok() {
                        let state = *states.borrow_and_update();
                        if state.phase != UploadPhase::Uploading {
                            break;
                        }
                        match state.progress {
                            Some(percent) => println!("list {list_id}: upload {percent}%"),
                            None => println!("list {list_id}: uploading"),
                        }
                    }
                });
                match tracker.begin_upload(file).await {
                    Ok(receipt) => println!(
                        "list {list_id}: uploaded {} ({} bytes)",
                        receipt.filename, receipt.size_bytes
                    ),
                    Err(SyncError::Busy(_)) => {
                        println!("list {list_id}: an upload is already running")
                    }
                    Err(_) => println!("list {list_id}: upload failed"),
                }
                progress.abort();
            });
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
}

fn open_detail(app: &TodoApp) -> Option<Arc<DetailController>> {
    let detail = app.detail();
    if detail.is_none() {
        println!("no list is open; use 'open <list id>' first");
    }
    detail
}

/// Prints failures that never reach the event stream.
fn report_local<T>(result: Result<T, SyncError>) {
    if let Err(err @ (SyncError::Busy(_) | SyncError::NotLoaded | SyncError::UnknownItem(_))) =
        result
    {
        println!("{err}");
    }
}

async fn print_events(mut events: BroadcastStream<ClientEvent>) {
    while let Some(event) = events.next().await {
        match event {
            Ok(ClientEvent::CollectionUpdated(summaries)) => print_summaries(&summaries),
            Ok(ClientEvent::DetailUpdated(detail)) => print_detail(&detail),
            Ok(ClientEvent::ViewChanged(ViewState::Collection)) => println!("-- all lists --"),
            Ok(ClientEvent::ViewChanged(ViewState::Detail(list_id))) => {
                println!("-- list {list_id} --")
            }
            Ok(ClientEvent::Error { operation, error }) => {
                println!("{} failed: {error}", operation.as_str())
            }
            Err(err) => warn!(error = %err, "event stream lagged"),
        }
    }
}

fn print_summaries(summaries: &[ListSummary]) {
    if summaries.is_empty() {
        println!("(no lists)");
    }
    for summary in summaries {
        println!(
            "{:>4}  {} ({} items)",
            summary.id.0, summary.name, summary.item_count
        );
    }
}

fn print_detail(detail: &ListDetail) {
    println!("{}", detail.name);
    if detail.items.is_empty() {
        println!("  (empty)");
    }
    for item in &detail.items {
        let mark = if item.checked { 'x' } else { ' ' };
        println!("  [{mark}] {:>4}  {}", item.id.0, item.label);
    }
}
