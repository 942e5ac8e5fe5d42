use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueHint, builder::BoolishValueParser};
use costboard_api_types::{InfoKind, MetricResource, MetricsSeries};

use crate::application::metrics::SortSpec;

/// Command-line arguments for the costboard binary.
#[derive(Debug, Parser)]
#[command(
    name = "costboard",
    version,
    about = "Infrastructure cost dashboard client"
)]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(
        long = "config-file",
        env = "COSTBOARD_CONFIG_FILE",
        value_name = "PATH",
        value_hint = ValueHint::FilePath,
        global = true
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: GlobalOverrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Args, Default, Clone)]
pub struct GlobalOverrides {
    /// Override the API base URL.
    #[arg(long = "api-base-url", value_name = "URL", global = true)]
    pub api_base_url: Option<String>,

    /// Override the request timeout.
    #[arg(long = "api-timeout-seconds", value_name = "SECONDS", global = true)]
    pub api_timeout_seconds: Option<u64>,

    /// Override the default stale window of cached queries (0 disables it).
    #[arg(long = "stale-time-ms", value_name = "MILLIS", global = true)]
    pub stale_time_ms: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL", global = true)]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new(),
        global = true
    )]
    pub log_json: Option<bool>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Fetch one metrics series for a resource.
    Metrics(MetricsArgs),
    /// Fetch metadata or configuration for a resource.
    Info(InfoArgs),
    /// Load the dashboard panels (nodes metrics and pods efficiency).
    Dashboard(DashboardArgs),
}

#[derive(Debug, Args, Default, Clone)]
pub struct RangeArgs {
    /// First day of the range (YYYY-MM-DD); defaults to a week ago.
    #[arg(long, value_name = "DATE")]
    pub start: Option<String>,

    /// Last day of the range (YYYY-MM-DD); defaults to today.
    #[arg(long, value_name = "DATE")]
    pub end: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct MetricsArgs {
    /// nodes|pods|containers|namespaces|deployments|cluster
    pub resource: MetricResource,

    /// cost|summary|trends|efficiency
    pub series: MetricsSeries,

    #[command(flatten)]
    pub range: RangeArgs,

    /// Page size; clamped to the configured maximum.
    #[arg(long, value_name = "COUNT")]
    pub limit: Option<u32>,

    /// One-based page number.
    #[arg(long, value_name = "PAGE", value_parser = clap::value_parser!(u64).range(1..))]
    pub page: Option<u64>,

    /// Sort order as `field:asc` or `field:desc`.
    #[arg(long, value_name = "FIELD:DIR")]
    pub sort: Option<SortSpec>,

    /// Metrics to include; repeat or separate with commas.
    #[arg(long, value_name = "NAME", value_delimiter = ',')]
    pub metric: Vec<String>,

    /// Currency for cost values.
    #[arg(long, value_name = "CODE")]
    pub currency: Option<String>,
}

#[derive(Debug, Args, Clone)]
pub struct InfoArgs {
    /// Resource name (nodes, pods, containers, settings, ...).
    pub resource: String,

    /// metadata|configuration
    pub kind: InfoKind,
}

#[derive(Debug, Args, Default, Clone)]
pub struct DashboardArgs {
    #[command(flatten)]
    pub range: RangeArgs,
}
