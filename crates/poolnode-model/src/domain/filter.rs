use serde::{Deserialize, Serialize};

/// Predicate the coordinator applies when selecting pending jobs for a runner.
///
/// Unset fields match anything. Several filters on one runner are OR-ed by the coordinator.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_on: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<u32>,
}

impl JobFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_on(mut self, value: impl Into<String>) -> Self {
        self.run_on = Some(value.into());
        self
    }

    pub fn customer(mut self, value: impl Into<String>) -> Self {
        self.customer = Some(value.into());
        self
    }

    pub fn description(mut self, value: impl Into<String>) -> Self {
        self.description = Some(value.into());
        self
    }

    pub fn id(mut self, value: impl Into<String>) -> Self {
        self.id = Some(value.into());
        self
    }

    pub fn kind(mut self, kind: u32) -> Self {
        self.kind = Some(kind);
        self
    }

    /// `true` when no field is set, i.e. the filter matches every job.
    pub fn is_empty(&self) -> bool {
        self.run_on.is_none()
            && self.customer.is_none()
            && self.description.is_none()
            && self.id.is_none()
            && self.kind.is_none()
    }
}
