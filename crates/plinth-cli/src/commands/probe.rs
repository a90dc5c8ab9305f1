use anyhow::Result;

use plinth_transfer::{ConnectionProfiler, TimeoutTiers};

use crate::source::CliSource;

/// Execute the `probe` command: measure throughput and report the
/// timeout tier the transfer would use.
pub async fn execute(source: CliSource) -> Result<()> {
    let tiers = TimeoutTiers::default();
    let mut profiler = ConnectionProfiler::new();
    let estimate = profiler.estimate(&source).await;

    println!("Connection class:  {}", estimate.class.as_str());
    println!("Throughput:        {:.1} KiB/s", estimate.bytes_per_sec / 1024.0);
    println!(
        "Request budget:    {}s (emergency ceiling {}s)",
        tiers.request_budget(estimate.class).as_secs(),
        tiers.emergency.as_secs()
    );
    Ok(())
}
