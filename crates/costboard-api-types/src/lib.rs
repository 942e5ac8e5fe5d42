//! Response types for the costboard metrics and info endpoints.
//!
//! All payloads use camelCase field names on the wire.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Resources that expose cost and usage metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricResource {
    Nodes,
    Pods,
    Containers,
    Namespaces,
    Deployments,
    Cluster,
}

impl MetricResource {
    pub const ALL: [MetricResource; 6] = [
        MetricResource::Nodes,
        MetricResource::Pods,
        MetricResource::Containers,
        MetricResource::Namespaces,
        MetricResource::Deployments,
        MetricResource::Cluster,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricResource::Nodes => "nodes",
            MetricResource::Pods => "pods",
            MetricResource::Containers => "containers",
            MetricResource::Namespaces => "namespaces",
            MetricResource::Deployments => "deployments",
            MetricResource::Cluster => "cluster",
        }
    }
}

impl fmt::Display for MetricResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricResource {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|resource| resource.as_str() == value)
            .ok_or_else(|| UnknownVariant::new("metric resource", value))
    }
}

/// Metric series served for every [`MetricResource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricsSeries {
    Cost,
    Summary,
    Trends,
    Efficiency,
}

impl MetricsSeries {
    pub const ALL: [MetricsSeries; 4] = [
        MetricsSeries::Cost,
        MetricsSeries::Summary,
        MetricsSeries::Trends,
        MetricsSeries::Efficiency,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricsSeries::Cost => "cost",
            MetricsSeries::Summary => "summary",
            MetricsSeries::Trends => "trends",
            MetricsSeries::Efficiency => "efficiency",
        }
    }
}

impl fmt::Display for MetricsSeries {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricsSeries {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|series| series.as_str() == value)
            .ok_or_else(|| UnknownVariant::new("metrics series", value))
    }
}

/// Info endpoints available per resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InfoKind {
    Metadata,
    Configuration,
}

impl InfoKind {
    pub fn as_str(self) -> &'static str {
        match self {
            InfoKind::Metadata => "metadata",
            InfoKind::Configuration => "configuration",
        }
    }
}

impl fmt::Display for InfoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InfoKind {
    type Err = UnknownVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "metadata" => Ok(InfoKind::Metadata),
            "configuration" => Ok(InfoKind::Configuration),
            other => Err(UnknownVariant::new("info kind", other)),
        }
    }
}

/// Returned when parsing an enum from an unknown string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {} `{}`", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub limit: u32,
    pub offset: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
}

/// Envelope shared by every metrics series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsResponse<T> {
    pub resource: MetricResource,
    pub series: MetricsSeries,
    pub range: Range,
    pub data: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostMetricPoint {
    pub timestamp: String,
    pub total_cost: f64,
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amortized_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryMetric {
    pub id: String,
    pub name: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_usage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_in: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_out: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendMetricPoint {
    pub timestamp: String,
    pub cpu_usage: f64,
    pub memory_usage: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric_totals: Option<BTreeMap<String, f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyMetric {
    pub id: String,
    pub name: String,
    pub efficiency_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_efficiency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_efficiency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_efficiency: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub potential_savings: Option<f64>,
}

/// Envelope for info endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse<T> {
    pub resource: String,
    pub data: T,
    pub fetched_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Ready,
    NotReady,
    Cordoned,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
    pub status: NodeStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfiguration {
    pub kubernetes_version: String,
    pub capacity_cores: f64,
    pub capacity_memory_bytes: u64,
    pub operating_system: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_version: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodMetadata {
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub node_name: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceAmounts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceBudget {
    #[serde(default)]
    pub requests: ResourceAmounts,
    #[serde(default)]
    pub limits: ResourceAmounts,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodContainerSpec {
    pub name: String,
    pub image: String,
    #[serde(flatten)]
    pub resources: ResourceBudget,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PodConfiguration {
    pub qos_class: String,
    pub containers: Vec<PodContainerSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerMetadata {
    pub id: String,
    pub name: String,
    pub image: String,
    pub runtime: String,
    pub restart_count: u32,
    pub pod_uid: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerConfiguration {
    pub resources: ResourceBudget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<BTreeMap<String, String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_resource_parses_wire_names() {
        for resource in MetricResource::ALL {
            assert_eq!(resource.as_str().parse::<MetricResource>(), Ok(resource));
        }
        assert!("volumes".parse::<MetricResource>().is_err());
    }

    #[test]
    fn metrics_response_decodes_camel_case_points() {
        let body = r#"{
            "resource": "pods",
            "series": "summary",
            "range": {"start": "2024-01-01", "end": "2024-01-08"},
            "data": [{"id": "p1", "name": "api", "cpuUsage": 0.5, "memoryUsage": 128.0, "totalCost": 1.25}],
            "pagination": {"limit": 25, "offset": 0}
        }"#;

        let response: MetricsResponse<SummaryMetric> =
            serde_json::from_str(body).expect("valid metrics body");

        assert_eq!(response.resource, MetricResource::Pods);
        assert_eq!(response.series, MetricsSeries::Summary);
        assert_eq!(response.data[0].total_cost, Some(1.25));
        assert_eq!(response.pagination.map(|meta| meta.total), Some(None));
    }

    #[test]
    fn unknown_node_status_falls_back() {
        let body = r#"{"id": "n1", "name": "worker", "status": "draining"}"#;
        let node: NodeMetadata = serde_json::from_str(body).expect("valid node body");
        assert_eq!(node.status, NodeStatus::Unknown);
    }

    #[test]
    fn pod_configuration_reads_nested_budgets() {
        let body = r#"{
            "qosClass": "Burstable",
            "containers": [{
                "name": "app",
                "image": "example/app:1",
                "requests": {"cpu": 0.25, "memoryBytes": 1024},
                "limits": {}
            }]
        }"#;
        let config: PodConfiguration = serde_json::from_str(body).expect("valid pod config");
        let budget = &config.containers[0].resources;
        assert_eq!(budget.requests.memory_bytes, Some(1024));
        assert_eq!(budget.limits, ResourceAmounts::default());
    }
}
