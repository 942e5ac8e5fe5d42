//! Metrics series call-sites over the query cache.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use costboard_api_types::{
    CostMetricPoint, EfficiencyMetric, MetricResource, MetricsResponse, MetricsSeries,
    SummaryMetric, TrendMetricPoint,
};
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::cache::{
    FetchError, FetchOptions, ObserveOptions, Query, QueryCache, QueryKey, QueryObserver,
    QueryParams, compose_key,
};
use crate::infra::http::ApiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// `field:asc` or `field:desc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

impl fmt::Display for SortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.field, self.direction.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid sort `{0}`, expected `field:asc` or `field:desc`")]
pub struct InvalidSort(String);

impl FromStr for SortSpec {
    type Err = InvalidSort;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (field, direction) = value
            .rsplit_once(':')
            .ok_or_else(|| InvalidSort(value.to_string()))?;
        let direction = match direction {
            "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            _ => return Err(InvalidSort(value.to_string())),
        };
        if field.trim().is_empty() {
            return Err(InvalidSort(value.to_string()));
        }
        Ok(Self {
            field: field.to_string(),
            direction,
        })
    }
}

/// Filtering, paging and sorting of a metrics request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsQuery {
    pub start: Option<String>,
    pub end: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u64>,
    pub sort: Option<SortSpec>,
    pub metric: Vec<String>,
    pub currency: Option<String>,
}

impl MetricsQuery {
    /// Normalized parameters; unset fields and an empty metric list are left out.
    pub fn to_params(&self) -> QueryParams {
        QueryParams::new()
            .with_opt("start", self.start.clone())
            .with_opt("end", self.end.clone())
            .with_opt("limit", self.limit)
            .with_opt("offset", self.offset)
            .with_opt("sort", self.sort.as_ref().map(ToString::to_string))
            .with_opt("metric", (!self.metric.is_empty()).then(|| self.metric.clone()))
            .with_opt("currency", self.currency.clone())
    }
}

/// Cached access to the four series of one metrics resource.
#[derive(Clone, Debug)]
pub struct MetricsResourceClient {
    api: ApiClient,
    cache: QueryCache,
    resource: MetricResource,
}

impl MetricsResourceClient {
    pub fn new(api: ApiClient, cache: QueryCache, resource: MetricResource) -> Self {
        Self {
            api,
            cache,
            resource,
        }
    }

    pub fn resource(&self) -> MetricResource {
        self.resource
    }

    pub fn key<T>(&self, series: MetricsSeries, query: &MetricsQuery) -> QueryKey<MetricsResponse<T>> {
        QueryKey::new(compose_key(
            self.resource.as_str(),
            series.as_str(),
            &query.to_params(),
        ))
    }

    /// Query descriptor for one series. Its deps carry the serialized
    /// parameters.
    pub fn query<T>(&self, series: MetricsSeries, query: &MetricsQuery) -> Query<MetricsResponse<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        self.query_with(series, query, ObserveOptions::default())
    }

    /// Like [`query`](Self::query); the serialized parameters are prepended to
    /// `options.deps`.
    pub fn query_with<T>(
        &self,
        series: MetricsSeries,
        query: &MetricsQuery,
        mut options: ObserveOptions,
    ) -> Query<MetricsResponse<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let params = query.to_params();
        let key = QueryKey::new(compose_key(
            self.resource.as_str(),
            series.as_str(),
            &params,
        ));
        options.deps.insert(0, params.canonical());

        let api = self.api.clone();
        let path = format!("metrics/{}/{}", self.resource, series);
        Query::new(key, move || {
            let api = api.clone();
            let path = path.clone();
            let params = params.clone();
            async move {
                api.get_json::<MetricsResponse<T>>(&path, &params)
                    .await
                    .map_err(|err| err.into_fetch_error())
            }
        })
        .with_options(options)
    }

    /// Resolve one series through the cache with the default stale window.
    pub async fn fetch_series<T>(
        &self,
        series: MetricsSeries,
        query: &MetricsQuery,
    ) -> Result<Arc<MetricsResponse<T>>, FetchError>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        let descriptor = self.query::<T>(series, query);
        let fetcher = descriptor.fetcher;
        let options = FetchOptions {
            stale_time: self.cache.config().default_stale_time(),
        };
        self.cache
            .fetch(&descriptor.key, move || (*fetcher)(), options)
            .await
    }

    pub fn observe_series<T>(
        &self,
        series: MetricsSeries,
        query: &MetricsQuery,
        options: ObserveOptions,
    ) -> QueryObserver<MetricsResponse<T>>
    where
        T: DeserializeOwned + Send + Sync + 'static,
    {
        QueryObserver::new(self.cache.clone(), self.query_with(series, query, options))
    }

    pub async fn cost(
        &self,
        query: &MetricsQuery,
    ) -> Result<Arc<MetricsResponse<CostMetricPoint>>, FetchError> {
        self.fetch_series(MetricsSeries::Cost, query).await
    }

    pub async fn summary(
        &self,
        query: &MetricsQuery,
    ) -> Result<Arc<MetricsResponse<SummaryMetric>>, FetchError> {
        self.fetch_series(MetricsSeries::Summary, query).await
    }

    pub async fn trends(
        &self,
        query: &MetricsQuery,
    ) -> Result<Arc<MetricsResponse<TrendMetricPoint>>, FetchError> {
        self.fetch_series(MetricsSeries::Trends, query).await
    }

    pub async fn efficiency(
        &self,
        query: &MetricsQuery,
    ) -> Result<Arc<MetricsResponse<EfficiencyMetric>>, FetchError> {
        self.fetch_series(MetricsSeries::Efficiency, query).await
    }

    pub fn observe_cost(
        &self,
        query: &MetricsQuery,
        options: ObserveOptions,
    ) -> QueryObserver<MetricsResponse<CostMetricPoint>> {
        self.observe_series(MetricsSeries::Cost, query, options)
    }

    pub fn observe_summary(
        &self,
        query: &MetricsQuery,
        options: ObserveOptions,
    ) -> QueryObserver<MetricsResponse<SummaryMetric>> {
        self.observe_series(MetricsSeries::Summary, query, options)
    }

    pub fn observe_trends(
        &self,
        query: &MetricsQuery,
        options: ObserveOptions,
    ) -> QueryObserver<MetricsResponse<TrendMetricPoint>> {
        self.observe_series(MetricsSeries::Trends, query, options)
    }

    pub fn observe_efficiency(
        &self,
        query: &MetricsQuery,
        options: ObserveOptions,
    ) -> QueryObserver<MetricsResponse<EfficiencyMetric>> {
        self.observe_series(MetricsSeries::Efficiency, query, options)
    }
}
