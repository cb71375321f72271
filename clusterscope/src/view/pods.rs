//! Flattened pod list and its filters.

use serde::Deserialize;
use utoipa::IntoParams;

use crate::snapshot::{HealthSnapshot, PodRecord};

/// Every component's pods in one sequence, in document order.
pub fn flatten_pods(snapshot: &HealthSnapshot) -> Vec<PodRecord> {
    snapshot
        .kubernetes_infrastructure
        .iter()
        .filter_map(|(_, component)| component.pods.as_ref())
        .flatten()
        .cloned()
        .collect()
}

/// Pod list filters. Both apply together.
#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PodFilter {
    /// Case-insensitive substring of the pod name
    pub search: Option<String>,
    /// Only pods that are not Running or have restarted
    #[serde(default)]
    pub problems_only: bool,
}

impl PodFilter {
    pub fn is_empty(&self) -> bool {
        !self.problems_only && self.search.as_deref().is_none_or(|s| s.trim().is_empty())
    }

    pub fn matches(&self, pod: &PodRecord) -> bool {
        let name_matches = match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => pod.name.to_lowercase().contains(&term.to_lowercase()),
            _ => true,
        };
        name_matches && (!self.problems_only || pod.has_problem())
    }

    pub fn apply<'a>(&self, pods: impl IntoIterator<Item = &'a PodRecord>) -> Vec<PodRecord> {
        pods.into_iter().filter(|pod| self.matches(pod)).cloned().collect()
    }
}
