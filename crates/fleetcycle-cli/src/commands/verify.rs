use fleetcycle_rollout::{ReplaceError, verify_group};

use super::{load_config, print_report, provider_from};

pub async fn verify(
    group: &str,
    image: &str,
    endpoint: &Option<String>,
    config_path: &Option<String>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let provider = provider_from(endpoint, &config)?;

    match verify_group(&provider, &group.to_string(), &image.to_string()).await {
        Ok(report) => {
            print_report(&report);
            if report.all_updated() {
                println!("✓ All instances in {group} run {image}");
            }
            Ok(())
        }
        Err(ReplaceError::Provider(fleetcycle_core::FleetError::NotFound(what))) => {
            eprintln!("not found: {what}");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}
