//! Dashboard views that combine two observed series.

use std::sync::Arc;

use costboard_api_types::{
    EfficiencyMetric, MetricResource, MetricsResponse, SummaryMetric, TrendMetricPoint,
};
use serde::Serialize;

use crate::cache::{FetchError, ObserveOptions, QueryCache, QueryObserver, QueryState};
use crate::infra::http::ApiClient;
use crate::util::dates::default_date_range;

use super::metrics::{MetricsQuery, MetricsResourceClient, SortSpec};
use super::pagination::DEFAULT_PAGE_SIZE;

/// Last week, first page, heaviest CPU users first.
pub fn default_metrics_query() -> MetricsQuery {
    let (start, end) = default_date_range();
    MetricsQuery {
        start: Some(start),
        end: Some(end),
        limit: Some(DEFAULT_PAGE_SIZE),
        sort: Some(SortSpec::desc("cpuUsage")),
        metric: vec!["cpuUsage".to_string(), "memoryUsage".to_string()],
        ..MetricsQuery::default()
    }
}

/// Two observers presented as one.
pub struct QueryPair<A, B> {
    first: QueryObserver<A>,
    second: QueryObserver<B>,
}

/// Combined projection: loading while either side loads, and the first
/// side's error before the second's.
pub struct PairState<A, B> {
    pub first: QueryState<A>,
    pub second: QueryState<B>,
    pub is_loading: bool,
    pub error: Option<FetchError>,
}

impl<A, B> PairState<A, B> {
    fn combine(first: QueryState<A>, second: QueryState<B>) -> Self {
        let is_loading = first.is_loading || second.is_loading;
        let error = first.error.clone().or_else(|| second.error.clone());
        Self {
            first,
            second,
            is_loading,
            error,
        }
    }
}

impl<A, B> QueryPair<A, B>
where
    A: Send + Sync + 'static,
    B: Send + Sync + 'static,
{
    pub fn new(first: QueryObserver<A>, second: QueryObserver<B>) -> Self {
        Self { first, second }
    }

    pub fn first(&self) -> &QueryObserver<A> {
        &self.first
    }

    pub fn second(&self) -> &QueryObserver<B> {
        &self.second
    }

    pub fn state(&self) -> PairState<A, B> {
        PairState::combine(self.first.state(), self.second.state())
    }

    pub async fn settled(&self) -> PairState<A, B> {
        let (first, second) = tokio::join!(self.first.settled(), self.second.settled());
        PairState::combine(first, second)
    }

    /// Refetch both sides concurrently; the first error wins.
    pub async fn refetch(&self) -> Result<(Option<Arc<A>>, Option<Arc<B>>), FetchError> {
        let (first, second) = tokio::join!(self.first.refetch(), self.second.refetch());
        Ok((first?, second?))
    }

    pub fn deactivate(&mut self) {
        self.first.deactivate();
        self.second.deactivate();
    }
}

pub type NodesMetrics =
    QueryPair<MetricsResponse<SummaryMetric>, MetricsResponse<TrendMetricPoint>>;
pub type PodsEfficiency =
    QueryPair<MetricsResponse<EfficiencyMetric>, MetricsResponse<SummaryMetric>>;

/// Rows shown for the nodes panel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodesMetricsData {
    pub summary: Vec<SummaryMetric>,
    pub trends: Vec<TrendMetricPoint>,
}

/// Rows shown for the pods efficiency panel.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PodsEfficiencyData {
    pub efficiency: Vec<EfficiencyMetric>,
    pub summary: Vec<SummaryMetric>,
}

impl PairState<MetricsResponse<SummaryMetric>, MetricsResponse<TrendMetricPoint>> {
    pub fn nodes_data(&self) -> NodesMetricsData {
        NodesMetricsData {
            summary: rows(&self.first),
            trends: rows(&self.second),
        }
    }
}

impl PairState<MetricsResponse<EfficiencyMetric>, MetricsResponse<SummaryMetric>> {
    pub fn pods_data(&self) -> PodsEfficiencyData {
        PodsEfficiencyData {
            efficiency: rows(&self.first),
            summary: rows(&self.second),
        }
    }
}

fn rows<T: Clone>(state: &QueryState<MetricsResponse<T>>) -> Vec<T> {
    state
        .data
        .as_ref()
        .map(|response| response.data.clone())
        .unwrap_or_default()
}

/// Entry point for the dashboard panels.
#[derive(Clone, Debug)]
pub struct Dashboard {
    nodes: MetricsResourceClient,
    pods: MetricsResourceClient,
}

impl Dashboard {
    pub fn new(api: ApiClient, cache: QueryCache) -> Self {
        Self {
            nodes: MetricsResourceClient::new(api.clone(), cache.clone(), MetricResource::Nodes),
            pods: MetricsResourceClient::new(api, cache, MetricResource::Pods),
        }
    }

    pub fn nodes_metrics(&self, query: &MetricsQuery, options: ObserveOptions) -> NodesMetrics {
        QueryPair::new(
            self.nodes.observe_summary(query, options.clone()),
            self.nodes.observe_trends(query, options),
        )
    }

    pub fn pods_efficiency(&self, query: &MetricsQuery, options: ObserveOptions) -> PodsEfficiency {
        QueryPair::new(
            self.pods.observe_efficiency(query, options.clone()),
            self.pods.observe_summary(query, options),
        )
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use thiserror::Error;

    use crate::cache::{Query, QueryKey};

    use super::*;

    #[derive(Debug, Error)]
    #[error("{0}")]
    struct Named(&'static str);

    fn ok_query(raw: &str, value: u32, delay_ms: u64) -> Query<u32> {
        Query::new(QueryKey::new(raw), move || async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            Ok::<_, FetchError>(value)
        })
    }

    fn err_query(raw: &str, name: &'static str) -> Query<u32> {
        Query::new(QueryKey::new(raw), move || async move {
            Err::<u32, FetchError>(Arc::new(Named(name)))
        })
    }

    #[test]
    fn default_query_matches_dashboard_defaults() {
        let query = default_metrics_query();
        let params = query.to_params();

        assert_eq!(query.limit, Some(25));
        assert_eq!(
            params.get("sort").map(|v| v.to_query_value()).as_deref(),
            Some("cpuUsage:desc")
        );
        assert_eq!(
            params.get("metric").map(|v| v.to_query_value()).as_deref(),
            Some("cpuUsage,memoryUsage")
        );
        assert!(query.start.is_some() && query.end.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn loading_while_either_side_loads() {
        let cache = QueryCache::new();
        let pair = QueryPair::new(
            QueryObserver::new(cache.clone(), ok_query("fast", 1, 5)),
            QueryObserver::new(cache, ok_query("slow", 2, 50)),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        let state = pair.state();
        assert!(state.is_loading);
        assert!(!state.first.is_loading);

        let state = pair.settled().await;
        assert!(!state.is_loading);
        assert_eq!(state.second.data.as_deref(), Some(&2));
    }

    #[tokio::test(start_paused = true)]
    async fn first_error_wins() {
        let cache = QueryCache::new();
        let pair = QueryPair::new(
            QueryObserver::new(cache.clone(), err_query("a", "first")),
            QueryObserver::new(cache, err_query("b", "second")),
        );

        let state = pair.settled().await;
        assert_eq!(state.error.map(|e| e.to_string()).as_deref(), Some("first"));

        let err = pair.refetch().await.expect_err("both sides fail");
        assert_eq!(err.to_string(), "first");
    }

    #[tokio::test(start_paused = true)]
    async fn refetch_returns_both_values() {
        let cache = QueryCache::new();
        let pair = QueryPair::new(
            QueryObserver::new(cache.clone(), ok_query("x", 1, 1)),
            QueryObserver::new(cache, ok_query("y", 2, 1)),
        );

        let (first, second) = pair.refetch().await.expect("refetch");
        assert_eq!(first.as_deref(), Some(&1));
        assert_eq!(second.as_deref(), Some(&2));
    }
}
