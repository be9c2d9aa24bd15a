//! Rightsizer operator CLI
//!
//! Plan or apply a rightsizing run from a workstation, inspect the
//! control plane's feature gates and exercise the quantity codec.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use commands::{feature_gates, quantity, walk};
use rightsizer_lib::{
    BoundsMergeStrategy, CachedRecommendationProvider, ClusterClient, HttpRecommendationProvider,
    InPlaceResizeMode, KubeClusterClient, RecommendationProvider, Resource,
    StaticRecommendationProvider, WalkerConfig,
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Workload rightsizer CLI
#[derive(Parser)]
#[command(name = "rsctl")]
#[command(author, version, about = "CLI for the workload rightsizer", long_about = None)]
pub struct Cli {
    /// Recommendation API URL; the built-in demo recommendations are used when unset
    #[arg(long, env = "RSCTL_API_URL")]
    pub api_url: Option<String>,

    /// Path to kubeconfig file (uses default discovery if not specified)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute the patches a run would send, without sending them
    Plan(WalkArgs),

    /// Run once and patch the cluster
    Apply(WalkArgs),

    /// Show the feature gates reported by the control plane
    FeatureGates {
        /// Only show the in-place pod resize gate
        #[arg(long)]
        resize_only: bool,
    },

    /// Convert between quantities and base units
    #[command(subcommand)]
    Quantity(QuantityCommands),
}

#[derive(Args, Debug, Clone)]
pub struct WalkArgs {
    /// Deployments processed at once
    #[arg(long, short)]
    pub concurrency: Option<usize>,

    /// How LimitRange declarations combine (intersection, widest)
    #[arg(long, default_value = "intersection")]
    pub bounds_strategy: BoundsMergeStrategy,

    /// Resize running pods: auto follows the feature gate (auto, enabled, disabled)
    #[arg(long, default_value = "auto")]
    pub in_place_resize: InPlaceResizeMode,
}

#[derive(Subcommand)]
pub enum QuantityCommands {
    /// Format a base-unit value (cores or bytes) as a quantity
    Format {
        /// Value in base units, e.g. 0.32 or 73401320
        value: String,

        /// Resource the value belongs to (cpu, memory)
        #[arg(long, short, default_value = "cpu")]
        resource: ResourceArg,

        /// Override the suffix (m, Mi, Gi, k, ...)
        #[arg(long, short)]
        suffix: Option<String>,
    },

    /// Parse a quantity into base units
    Parse {
        /// Quantity such as 320m or 70Mi
        quantity: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ResourceArg {
    Cpu,
    Memory,
}

impl From<ResourceArg> for Resource {
    fn from(arg: ResourceArg) -> Self {
        match arg {
            ResourceArg::Cpu => Resource::Cpu,
            ResourceArg::Memory => Resource::Memory,
        }
    }
}

impl Cli {
    fn walker_config(&self, args: &WalkArgs, defaults: &config::Config, dry_run: bool) -> WalkerConfig {
        let mut config = WalkerConfig {
            dry_run,
            bounds_strategy: args.bounds_strategy,
            in_place_resize: args.in_place_resize,
            ..WalkerConfig::default()
        };
        if let Some(concurrency) = args.concurrency.or(defaults.concurrency) {
            config.max_concurrent_deployments = concurrency;
        }
        if let Some(name) = &defaults.cluster_name {
            config.cluster_name = name.clone();
        }
        config
    }

    async fn cluster_client(&self) -> Result<Arc<dyn ClusterClient>> {
        let client = match config::kubeconfig_path(self.kubeconfig.as_deref()) {
            Some(path) => KubeClusterClient::from_kubeconfig(&path).await?,
            None => KubeClusterClient::try_default().await?,
        };
        Ok(Arc::new(client))
    }

    fn provider(&self, defaults: &config::Config) -> Result<Arc<dyn RecommendationProvider>> {
        let inner: Arc<dyn RecommendationProvider> =
            match self.api_url.as_ref().or(defaults.api_url.as_ref()) {
                Some(url) => Arc::new(HttpRecommendationProvider::new(url)?),
                None => {
                    output::print_warning("No --api-url given, using demo recommendations");
                    Arc::new(StaticRecommendationProvider::opencost_demo())
                }
            };
        Ok(Arc::new(CachedRecommendationProvider::new(
            inner,
            rightsizer_lib::cache::DEFAULT_CACHE_TTL,
        )))
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    match &cli.command {
        Commands::Plan(args) | Commands::Apply(args) => {
            let dry_run = matches!(cli.command, Commands::Plan(_));
            let defaults = config::Config::load()?;
            let walker_config = cli.walker_config(args, &defaults, dry_run);
            let cluster = cli.cluster_client().await?;
            let provider = cli.provider(&defaults)?;
            walk::run_walk(cluster, provider, walker_config, cli.format).await
        }
        Commands::FeatureGates { resize_only } => {
            let cluster = cli.cluster_client().await?;
            feature_gates::show_feature_gates(cluster, *resize_only, cli.format).await
        }
        Commands::Quantity(QuantityCommands::Format {
            value,
            resource,
            suffix,
        }) => quantity::show_format(value, (*resource).into(), suffix.as_deref(), cli.format),
        Commands::Quantity(QuantityCommands::Parse { quantity }) => {
            quantity::show_parse(quantity, cli.format)
        }
    }
}
