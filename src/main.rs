use std::process;

use costboard::{
    application::{
        dashboard::{Dashboard, default_metrics_query},
        error::AppError,
        info::InfoResourceClient,
        metrics::{MetricsQuery, MetricsResourceClient},
        pagination::Pagination,
    },
    cache::{ObserveOptions, QueryCache, QueryConfig, QueryParams},
    config::{self, Command, DashboardArgs, InfoArgs, MetricsArgs, RangeArgs, Settings},
    infra::{http::ApiClient, telemetry},
    util::dates::parse_iso_date,
};
use costboard_api_types::{
    CostMetricPoint, EfficiencyMetric, MetricsSeries, SummaryMetric, TrendMetricPoint,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    telemetry::init(&settings.logging)?;

    let api = ApiClient::new(&settings.api)?;
    let cache = QueryCache::with_config(QueryConfig::from(&settings.query));
    info!(base_url = %api.base_url(), "costboard client ready");

    match cli_args.command {
        Command::Metrics(args) => run_metrics(&settings, api, cache, args).await,
        Command::Info(args) => run_info(api, cache, args).await,
        Command::Dashboard(args) => run_dashboard(api, cache, args).await,
    }
}

async fn run_metrics(
    settings: &Settings,
    api: ApiClient,
    cache: QueryCache,
    args: MetricsArgs,
) -> Result<(), AppError> {
    let mut pagination = Pagination::from(&settings.pagination);
    if let Some(limit) = args.limit {
        pagination.update_limit(limit);
    }
    if let Some(page) = args.page {
        pagination.go_to(page.saturating_sub(1));
    }

    let mut query = with_range(&args.range)?;
    if let Some(sort) = args.sort {
        query.sort = Some(sort);
    }
    if !args.metric.is_empty() {
        query.metric = args.metric;
    }
    query.currency = args.currency;
    pagination.apply_to(&mut query);

    let client = MetricsResourceClient::new(api, cache, args.resource);
    let series = args.series;
    match series {
        MetricsSeries::Cost => {
            let response = client.fetch_series::<CostMetricPoint>(series, &query).await?;
            print_json(&*response)
        }
        MetricsSeries::Summary => {
            let response = client.fetch_series::<SummaryMetric>(series, &query).await?;
            print_json(&*response)
        }
        MetricsSeries::Trends => {
            let response = client.fetch_series::<TrendMetricPoint>(series, &query).await?;
            print_json(&*response)
        }
        MetricsSeries::Efficiency => {
            let response = client.fetch_series::<EfficiencyMetric>(series, &query).await?;
            print_json(&*response)
        }
    }
}

async fn run_info(api: ApiClient, cache: QueryCache, args: InfoArgs) -> Result<(), AppError> {
    let client = InfoResourceClient::new(api, cache, args.resource);
    let response = client
        .fetch_kind::<Value>(args.kind, &QueryParams::new())
        .await?;
    print_json(&*response)
}

#[derive(Serialize)]
struct DashboardReport<N, P> {
    nodes: N,
    pods: P,
}

async fn run_dashboard(
    api: ApiClient,
    cache: QueryCache,
    args: DashboardArgs,
) -> Result<(), AppError> {
    let dashboard = Dashboard::new(api, cache);
    let query = with_range(&args.range)?;

    let nodes = dashboard.nodes_metrics(&query, ObserveOptions::default());
    let pods = dashboard.pods_efficiency(&query, ObserveOptions::default());
    let (nodes, pods) = tokio::join!(nodes.settled(), pods.settled());

    if let Some(error) = nodes.error.clone().or_else(|| pods.error.clone()) {
        return Err(AppError::Fetch(error));
    }

    print_json(&DashboardReport {
        nodes: nodes.nodes_data(),
        pods: pods.pods_data(),
    })
}

/// Dashboard defaults with the range replaced where the user gave one.
fn with_range(range: &RangeArgs) -> Result<MetricsQuery, AppError> {
    let defaults = default_metrics_query();
    let query = MetricsQuery {
        start: range.start.clone().or_else(|| defaults.start.clone()),
        end: range.end.clone().or_else(|| defaults.end.clone()),
        ..defaults
    };

    if let (Some(start), Some(end)) = (query.start.as_deref(), query.end.as_deref()) {
        let start_date = parse_iso_date(start)
            .map_err(|err| AppError::validation(format!("invalid --start `{start}`: {err}")))?;
        let end_date = parse_iso_date(end)
            .map_err(|err| AppError::validation(format!("invalid --end `{end}`: {err}")))?;
        if start_date > end_date {
            return Err(AppError::validation(format!(
                "--start {start} is after --end {end}"
            )));
        }
    }
    Ok(query)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{rendered}");
    Ok(())
}
