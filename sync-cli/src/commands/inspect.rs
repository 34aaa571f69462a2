//! Show the sync bookkeeping stored in a state file.

use anyhow::{bail, Result};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use sync_client::{CursorStore, JsonFileStore, SnapshotStore, SyncConfig};

/// Run the inspect command.
pub async fn run(path: &Path) -> Result<()> {
    if !path.exists() {
        bail!("no sync state at {}", path.display());
    }
    let store = JsonFileStore::open(path).await?;
    let now = unix_now();

    println!("=== convo-sync state ===");
    println!();
    println!("Store: {}", store.path().display());

    let cursor = store.get().await?;
    match &cursor {
        Some(cursor) => println!("  Cursor:        {}", cursor),
        None => println!("  Cursor:        none"),
    }

    let stale = store.is_stale().await?;
    println!("  Stale:         {}", if stale { "yes" } else { "no" });

    let record = store.snapshot().await?;
    match &record {
        Some(record) => println!(
            "  Snapshot:      v{}, {}",
            record.version,
            format_timestamp(record.completed_at_secs, now)
        ),
        None => println!("  Snapshot:      none"),
    }
    println!("  Local version: {}", store.local_version().await?);

    println!();
    let policy = SyncConfig::default().freshness_policy();
    match policy.evaluate(record.as_ref(), stale, cursor.is_some(), now) {
        Some(reason) => println!("Next start: slow sync ({})", reason),
        None => println!("Next start: resume from cursor"),
    }

    Ok(())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

/// Format a Unix timestamp relative to `now`.
fn format_timestamp(ts: u64, now: u64) -> String {
    let diff = now.saturating_sub(ts);

    if diff < 60 {
        "just now".to_string()
    } else if diff < 3600 {
        format!("{} minutes ago", diff / 60)
    } else if diff < 86400 {
        format!("{} hours ago", diff / 3600)
    } else {
        format!("{} days ago", diff / 86400)
    }
}
