use std::time::Duration;

use anyhow::{Context, Result};

use plinth_engine::{Database, DatabaseConfig};
use plinth_types::query::{FilterParams, ResultSet};
use plinth_types::TransferEvent;

use crate::source::CliSource;

/// Execute the `search` command: acquire, load, query, print.
pub async fn execute(
    source: CliSource,
    params: FilterParams,
    ready_timeout: Duration,
    json: bool,
) -> Result<()> {
    let (db, mut events) = Database::start(source, DatabaseConfig::default());
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            if let TransferEvent::Progress(p) = event {
                tracing::info!(
                    bytes_received = p.bytes_received,
                    total_bytes = p.total_bytes,
                    "Acquiring database image"
                );
            }
        }
    });

    db.await_ready(ready_timeout)
        .await
        .context("Database did not become ready")?;
    let result = db
        .search(&params)
        .await
        .context("Search failed")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print_results(&result);
    }
    Ok(())
}

fn print_results(result: &ResultSet) {
    println!(
        "{} of {} result(s), page {} (size {})",
        result.rows.len(),
        result.total_count,
        result.page,
        result.page_size
    );
    for row in &result.rows {
        let year = row.year.map_or_else(String::new, |y| y.to_string());
        println!(
            "{:>6}  {:<40}  {:>4}  {}",
            row.id,
            row.title,
            year,
            row.architect.as_deref().unwrap_or("")
        );
    }
}
