pub mod replace;
pub mod verify;

use std::path::Path;

use fleetcycle_core::CycleConfig;
use fleetcycle_provider::HttpFleet;
use fleetcycle_rollout::VerifyReport;

/// Load the config file: an explicit path must exist; otherwise
/// ./fleetcycle.toml is picked up when present.
pub fn load_config(path: &Option<String>) -> anyhow::Result<CycleConfig> {
    match path {
        Some(p) => CycleConfig::from_file(Path::new(p)),
        None => {
            let default = Path::new("fleetcycle.toml");
            if default.exists() {
                CycleConfig::from_file(default)
            } else {
                Ok(CycleConfig::default())
            }
        }
    }
}

/// Resolve the provider endpoint from flag or config.
pub fn provider_from(
    endpoint: &Option<String>,
    config: &CycleConfig,
) -> anyhow::Result<HttpFleet> {
    let endpoint = endpoint
        .clone()
        .or_else(|| config.provider.as_ref().map(|p| p.endpoint.clone()))
        .ok_or_else(|| {
            anyhow::anyhow!("no provider endpoint: pass --endpoint or set [provider].endpoint")
        })?;
    let mut provider = HttpFleet::new(endpoint);
    if let Some(timeout) = config.request_timeout() {
        provider = provider.with_timeout(timeout);
    }
    Ok(provider)
}

/// Print the per-instance verification report.
pub fn print_report(report: &VerifyReport) {
    for entry in &report.entries {
        let image = entry.image.as_deref().unwrap_or("unknown");
        let lifecycle = entry
            .lifecycle
            .map(|l| l.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        if entry.updated {
            println!("✓ {} updated to {image} ({lifecycle})", entry.id);
        } else {
            println!(
                "✗ {} still on {image} ({lifecycle}), wanted {}",
                entry.id, report.target_image
            );
        }
    }
}
