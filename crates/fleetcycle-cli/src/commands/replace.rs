use tokio::sync::watch;
use tracing::warn;

use fleetcycle_core::config::parse_duration;
use fleetcycle_rollout::{PollPolicy, ReplaceConfig, ReplaceError, Replacement, verify_group};

use super::{load_config, print_report, provider_from};

#[allow(clippy::too_many_arguments)]
pub async fn replace(
    group: &str,
    image: &str,
    endpoint: &Option<String>,
    config_path: &Option<String>,
    poll_interval: Option<&str>,
    max_wait: Option<&str>,
    run_id: Option<String>,
) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let provider = provider_from(endpoint, &config)?;

    let interval = match poll_interval {
        Some(s) => parse_duration(s)
            .ok_or_else(|| anyhow::anyhow!("invalid --poll-interval: {s}"))?,
        None => config.poll_interval(),
    };
    let max_wait = match max_wait {
        Some(s) => parse_duration(s).ok_or_else(|| anyhow::anyhow!("invalid --max-wait: {s}"))?,
        None => config.max_wait(),
    };

    let mut replace_config = ReplaceConfig {
        poll: PollPolicy {
            interval,
            max_wait,
            ..PollPolicy::default()
        },
        ..ReplaceConfig::default()
    };
    if let Some(id) = run_id.or_else(|| config.run.as_ref().and_then(|r| r.run_id.clone())) {
        replace_config.run_id = id;
    }

    // Ctrl-C aborts at the next poll point.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    let mut run = Replacement::new(group, image, replace_config, shutdown_rx);
    match run.run(&provider).await {
        Ok(outcome) => {
            println!(
                "✓ Replaced {} instance(s) in {group} (template {})",
                outcome.cycles, outcome.template_ref
            );
            match verify_group(&provider, &group.to_string(), &image.to_string()).await {
                Ok(report) => print_report(&report),
                Err(e) => warn!(error = %e, "verification pass failed"),
            }
            Ok(())
        }
        // Not-found is a diagnostic, not a failure exit.
        Err(e @ (ReplaceError::GroupNotFound(_) | ReplaceError::ImageNotFound(_))) => {
            eprintln!("{e}");
            Ok(())
        }
        Err(e) => {
            eprintln!("Replacement failed: {e}");
            Err(e.into())
        }
    }
}
