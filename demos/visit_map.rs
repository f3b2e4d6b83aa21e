//! Feed a handful of visits through the tracker and print the map data.
//!
//! Run with: cargo run --example visit_map

use async_trait::async_trait;
use visitor_atlas::{
    client_identity, forwarded_for, GeoObservation, GeoResolver, ResolutionFailure, SnapshotConfig,
    TrackerConfig, VisitTracker, FORWARDED_FOR_HEADER,
};

/// Resolver with a fixed table instead of a network service.
struct TableResolver;

#[async_trait]
impl GeoResolver for TableResolver {
    async fn resolve(&self, address: &str) -> Result<GeoObservation, ResolutionFailure> {
        let (country, lat, lon) = match address {
            "203.0.113.7" => ("US", 40.7128, -74.0060),
            "203.0.113.8" => ("US", 34.0522, -118.2437),
            "198.51.100.4" => ("JP", 35.6762, 139.6503),
            "192.0.2.10" => ("FJ", -18.1416, 178.4419),
            "192.0.2.11" => ("WS", -13.8333, -171.7500),
            _ => {
                return Err(ResolutionFailure::IncompleteData {
                    country: None,
                    loc: None,
                })
            }
        };
        GeoObservation::new(country, lat, lon)
            .map_err(|e| ResolutionFailure::InvalidData(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "table"
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let tracker = VisitTracker::new(TrackerConfig::default());
    let requests: [(&[(&str, &str)], &str); 7] = [
        (&[(FORWARDED_FOR_HEADER, "203.0.113.7, 10.0.0.1")], "10.0.0.1"),
        (&[], "203.0.113.8"),
        (&[("accept", "text/html")], "198.51.100.4"),
        (&[("x-forwarded-for", "203.0.113.7")], "10.0.0.1"), // repeat visitor
        (&[], "192.0.2.10"),
        (&[], "192.0.2.11"),
        (&[], "10.0.0.99"), // private address, no location
    ];

    println!("Visits\n");
    for (headers, remote) in requests {
        let forwarded = forwarded_for(headers.iter().copied());
        let identity = client_identity(forwarded, Some(remote))?;
        let outcome = tracker.record_visit(&identity, &TableResolver).await?;
        println!("  {:<14} {:?}", identity.as_str(), outcome);
    }

    let snapshot = tracker.snapshot(&SnapshotConfig::default());

    println!("\nCountries ({} visits)\n", snapshot.total_visits);
    for marker in &snapshot.countries {
        println!(
            "  {:<6} mean=({:>8.3}, {:>9.3}) radius={:.1}",
            marker.label,
            marker.aggregate.mean_latitude,
            marker.aggregate.mean_longitude,
            marker.radius
        );
    }

    match snapshot.global_center {
        Some(center) => println!(
            "\nMeeting point: ({:.3}, {:.3})",
            center.latitude, center.longitude
        ),
        None => println!("\nMeeting point: none"),
    }

    Ok(())
}
