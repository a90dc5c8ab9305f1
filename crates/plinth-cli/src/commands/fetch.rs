use std::path::Path;

use anyhow::{Context, Result};

use plinth_engine::EngineHandle;
use plinth_transfer::{event_channel, TransferConfig, TransferManager};
use plinth_types::TransferEvent;

use crate::source::CliSource;

/// Execute the `fetch` command: acquire the image, verify it loads, and
/// write it to disk.
pub async fn execute(source: CliSource, output: &Path) -> Result<()> {
    let mut manager = TransferManager::new(source, TransferConfig::default());
    let (tx, mut rx) = event_channel();

    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let manifest = manager
        .fetch_manifest()
        .await
        .context("Failed to fetch transfer manifest")?;
    if manifest.is_chunked() {
        println!(
            "Manifest: {} bytes in {} chunks",
            manifest.total_bytes,
            manifest.chunks.len()
        );
    } else {
        println!("Manifest: {} bytes, single blob", manifest.total_bytes);
    }

    let image = manager
        .acquire(&manifest, &tx)
        .await
        .context("Failed to acquire database image")?;
    drop(tx);
    let _ = printer.await;

    let verified = image.clone();
    tokio::task::spawn_blocking(move || EngineHandle::load(&verified))
        .await
        .context("Image verification task failed")?
        .context("Acquired image does not load")?;
    println!("Image verified: loads as a readable database");

    std::fs::write(output, image.as_slice())
        .with_context(|| format!("Failed to write image to {}", output.display()))?;
    println!("Wrote {} bytes to {}", image.len(), output.display());
    Ok(())
}

fn print_event(event: &TransferEvent) {
    match event {
        TransferEvent::Progress(p) => {
            let percent = if p.total_bytes == 0 {
                100
            } else {
                p.bytes_received * 100 / p.total_bytes
            };
            println!(
                "  {percent:>3}%  {}/{} bytes  {:.0} KiB/s",
                p.bytes_received,
                p.total_bytes,
                p.throughput_bytes_per_sec / 1024.0
            );
        }
        TransferEvent::StallWarning { tier, attempt } => {
            println!("  stall: attempt {attempt} exceeded the {tier} timeout budget");
        }
        TransferEvent::RetryScheduled { attempt, delay_ms } => {
            println!("  retrying (attempt {attempt}) in {delay_ms} ms");
        }
        TransferEvent::BudgetExceeded {
            budget_ms,
            elapsed_ms,
        } => {
            println!(
                "  over budget: {elapsed_ms} ms elapsed against a {budget_ms} ms acquisition budget"
            );
        }
        TransferEvent::Completed {
            bytes_received,
            elapsed_ms,
        } => {
            println!("  done: {bytes_received} bytes in {elapsed_ms} ms");
        }
        TransferEvent::Failed { detail } => {
            println!("  failed: {detail}");
        }
    }
}
