use anyhow::Result;

use crate::collector::ApifyClient;
use crate::config::{Config, STORE_SHEETS};
use crate::store::{open_stores, StoreHealth};

/// Probe every store in priority order. Stores that could not be opened
/// are reported as unavailable instead of being dropped from the list.
pub async fn check_sources(config: &Config) -> Vec<StoreHealth> {
    let stores = open_stores(config).await;
    let mut report = Vec::new();
    for name in &config.merge.source_priority {
        match stores.iter().find(|s| s.name() == name) {
            Some(store) => report.push(store.health().await),
            None if name == STORE_SHEETS && config.sheets.is_none() => {
                report.push(StoreHealth::failed(name, "NOT CONFIGURED"))
            }
            None => report.push(StoreHealth::failed(name, "UNAVAILABLE")),
        }
    }
    report
}

pub async fn list_sources(config: &Config) -> Result<()> {
    println!("{:<10} {:<12} {:<8} HEALTHY", "STORE", "STATUS", "VIDEOS");
    for h in check_sources(config).await {
        let videos = h.videos.map(|n| n.to_string()).unwrap_or_else(|| "-".into());
        println!("{:<10} {:<12} {:<8} {}", h.name, h.status, videos, h.healthy);
    }

    let collector = match config.collector().as_ref().and_then(ApifyClient::new) {
        Some(_) => "CONFIGURED",
        None => "NOT CONFIGURED (set APIFY_TOKEN)",
    };
    println!();
    println!("collector: {}", collector);
    Ok(())
}
