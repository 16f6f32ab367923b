use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "fleetcycle",
    about = "Fleetcycle — rolling image replacement for scaling groups",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, clap::Args)]
struct ProviderOpts {
    /// Fleet-management API endpoint (host:port). Overrides the
    /// config file.
    #[arg(short, long)]
    endpoint: Option<String>,
    /// Path to fleetcycle.toml (default: ./fleetcycle.toml if present)
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace every instance in a group with one launched from a new
    /// image, one instance at a time.
    Replace {
        /// Scaling group name
        group: String,
        /// Target machine image reference
        image: String,
        #[command(flatten)]
        provider: ProviderOpts,
        /// Poll interval between observations (e.g. "15s")
        #[arg(long)]
        poll_interval: Option<String>,
        /// Deadline per wait phase (e.g. "10m")
        #[arg(long)]
        max_wait: Option<String>,
        /// Run identifier used in template names (default: derived
        /// from the start timestamp)
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Report, per instance, whether a group's members run an image
    Verify {
        /// Scaling group name
        group: String,
        /// Expected machine image reference
        image: String,
        #[command(flatten)]
        provider: ProviderOpts,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("fleetcycle_rollout=info".parse()?)
                .add_directive("fleetcycle_provider=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Replace {
            group,
            image,
            provider,
            poll_interval,
            max_wait,
            run_id,
        } => {
            commands::replace::replace(
                &group,
                &image,
                &provider.endpoint,
                &provider.config,
                poll_interval.as_deref(),
                max_wait.as_deref(),
                run_id,
            )
            .await
        }
        Commands::Verify {
            group,
            image,
            provider,
        } => commands::verify::verify(&group, &image, &provider.endpoint, &provider.config).await,
    }
}
