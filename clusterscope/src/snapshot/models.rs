//! Shape of the aggregator's consolidated health document.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use utoipa::ToSchema;

/// One consolidated, point-in-time health document from the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct HealthSnapshot {
    pub timestamp: String,
    pub overall_status: String,
    /// Infrastructure components in document order. Entries that are not objects are skipped.
    #[serde(default, deserialize_with = "components_in_order", serialize_with = "components_as_map")]
    #[schema(value_type = Object)]
    pub kubernetes_infrastructure: Vec<(String, InfrastructureComponent)>,
    pub application_services: Vec<ServiceStatus>,
    pub dependencies: Dependencies,
    #[serde(default)]
    pub connectivity_matrix: Vec<ConnectivityEdge>,
    #[serde(default)]
    pub recent_events: Vec<ClusterEvent>,
}

/// A workload (deployment, ingress controller) or load balancer in the cluster.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, ToSchema)]
pub struct InfrastructureComponent {
    #[serde(default)]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_replicas: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restart_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pods: Option<Vec<PodRecord>>,
    /// Set for load balancers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ports: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct PodRecord {
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub restarts: u32,
    #[serde(default)]
    pub age: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs: Option<Vec<String>>,
}

impl PodRecord {
    /// Not running, or restarted at least once.
    pub fn has_problem(&self) -> bool {
        self.status != "Running" || self.restarts > 0
    }
}

/// An application service as reported by the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ServiceStatus {
    pub name: String,
    pub status: String,
    pub response_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Dependencies {
    pub redis: DependencyStatus,
    pub postgresql: DependencyStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DependencyStatus {
    pub status: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub response_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_name: Option<String>,
    /// Only reported for postgresql
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One directed reachability check between two services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ConnectivityEdge {
    pub source: String,
    pub target: String,
    pub status: String,
    /// -1 when the check failed
    pub response_time_ms: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ClusterEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub reason: String,
    pub message: String,
    pub object: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

fn components_in_order<'de, D>(deserializer: D) -> Result<Vec<(String, InfrastructureComponent)>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = serde_json::Map::<String, serde_json::Value>::deserialize(deserializer)?;
    let mut components = Vec::with_capacity(raw.len());
    for (name, value) in raw {
        if !value.is_object() {
            continue;
        }
        let component = serde_json::from_value(value).map_err(|e| serde::de::Error::custom(format!("kubernetes_infrastructure.{name}: {e}")))?;
        components.push((name, component));
    }
    Ok(components)
}

fn components_as_map<S>(components: &[(String, InfrastructureComponent)], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.collect_map(components.iter().map(|(name, component)| (name, component)))
}
