//! Resolve addresses against ipinfo.io and persist the result.
//!
//! Run with: cargo run --example ipinfo_lookup --features http -- 8.8.8.8 1.1.1.1

use std::time::Instant;

use visitor_atlas::{
    IpInfoResolver, JsonFileStore, ResolverConfig, SnapshotConfig, TrackerConfig, VisitTracker,
    VisitorIdentity,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let addresses: Vec<String> = std::env::args().skip(1).collect();
    if addresses.is_empty() {
        eprintln!("usage: ipinfo_lookup <address>...");
        return Ok(());
    }

    let backend = JsonFileStore::new("visitor-atlas.json");
    let tracker = VisitTracker::restore(&backend, TrackerConfig::default())?;
    let resolver = IpInfoResolver::new(&ResolverConfig::default())?;

    for address in addresses {
        let identity = VisitorIdentity::new(address);
        let start = Instant::now();
        match tracker.record_visit(&identity, &resolver).await {
            Ok(outcome) => println!("{} -> {:?} ({:?})", identity, outcome, start.elapsed()),
            Err(e) => println!("{} -> error: {} ({:?})", identity, e, start.elapsed()),
        }
    }

    tracker.persist(&backend)?;

    let snapshot = tracker.snapshot(&SnapshotConfig::default());
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}
