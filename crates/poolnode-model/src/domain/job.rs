use serde::{Deserialize, Serialize};

use crate::JobId;

/// One unit of work assigned by the coordinator.
///
/// A job is immutable once received: the node only reads it and references its id
/// for logging, locking and the accept/complete/cancel calls.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: JobId,
    /// Event kind the job was announced with.
    #[serde(default)]
    pub kind: u32,
    #[serde(default)]
    pub run_on: String,
    #[serde(default)]
    pub customer: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<JobParam>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<JobInput>,
    /// Mime-like tag describing the output the customer expects.
    #[serde(default)]
    pub output_format: String,
}

/// Key with one or more values.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParam {
    pub key: String,
    #[serde(default)]
    pub values: Vec<String>,
}

/// Typed input attached to a job.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInput {
    /// Raw value; its interpretation depends on `input_type` (text, url, event, job...).
    pub data: String,
    pub input_type: String,
    /// Free-form label the runner uses to tell inputs apart.
    #[serde(default)]
    pub marker: String,
    #[serde(default)]
    pub source: String,
}

fn carries(input: &JobInput, marker: Option<&str>) -> bool {
    marker.is_none_or(|m| input.marker == m)
}

impl Job {
    /// All values of the first parameter named `key`.
    pub fn param_values(&self, key: &str) -> Option<&[String]> {
        self.params
            .iter()
            .find(|p| p.key == key)
            .map(|p| p.values.as_slice())
    }

    /// First value of the parameter named `key`.
    ///
    /// A parameter that exists without any value is treated as missing.
    pub fn param_value(&self, key: &str) -> Option<&str> {
        self.param_values(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Inputs carrying `marker`, or every input when `marker` is `None`.
    pub fn inputs_marked<'a, 'm>(
        &'a self,
        marker: Option<&'m str>,
    ) -> impl Iterator<Item = &'a JobInput> + use<'a, 'm> {
        self.inputs.iter().filter(move |i| carries(i, marker))
    }

    /// First input carrying `marker` (first input overall when `marker` is `None`).
    pub fn input(&self, marker: Option<&str>) -> Option<&JobInput> {
        self.inputs.iter().find(|i| carries(i, marker))
    }
}
