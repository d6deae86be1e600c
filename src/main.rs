use std::fs::File;
use std::io::BufReader;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gamelist_sync::{config::SyncConfig, engine::SyncEngine, replay};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gamelist_sync=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("Usage: gamelist-sync <transcript.jsonl>");
        return ExitCode::from(2);
    };

    let file = match File::open(&path) {
        Ok(file) => file,
        Err(e) => {
            tracing::error!("Failed to open transcript {}: {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let engine = SyncEngine::new(SyncConfig::from_env());
    tracing::info!("Replaying {}", path);
    let stats = match replay::replay(&engine, BufReader::new(file)).await {
        Ok(stats) => stats,
        Err(e) => {
            tracing::error!("Replay of {} failed: {}", path, e);
            return ExitCode::FAILURE;
        }
    };

    let lists = engine.store.read().await.known_game_list_ids();
    let mut snapshots = Vec::with_capacity(lists.len());
    for list in lists {
        snapshots.push(engine.snapshot(list).await);
    }

    let report = serde_json::json!({
        "stats": stats,
        "snapshots": snapshots,
    });
    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Failed to serialize snapshots: {}", e);
            ExitCode::FAILURE
        }
    }
}
