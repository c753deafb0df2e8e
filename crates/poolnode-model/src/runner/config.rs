use serde_json::Value;

use crate::{JobFilter, RunnerMeta};

/// Static declaration of a runner: what it is, which jobs it wants and how its
/// input/output sockets look.
///
/// The template is an opaque mustache document and the sockets an opaque json schema;
/// the node forwards both verbatim.
#[derive(Clone, Debug, PartialEq)]
pub struct RunnerConfig {
    pub meta: RunnerMeta,
    pub filters: Vec<JobFilter>,
    pub template: String,
    pub sockets: Value,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            meta: RunnerMeta::default(),
            filters: Vec::new(),
            template: String::new(),
            sockets: Value::Object(Default::default()),
        }
    }
}

impl RunnerConfig {
    pub fn new(meta: RunnerMeta) -> Self {
        Self {
            meta,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: JobFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_sockets(mut self, sockets: Value) -> Self {
        self.sockets = sockets;
        self
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub fn meta_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.meta)
    }

    pub fn sockets_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.sockets)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Price;

    #[test]
    fn meta_json_carries_price_only_when_set() {
        let cfg = RunnerConfig::new(RunnerMeta::new(5003, "search"));
        let v: Value = serde_json::from_str(&cfg.meta_json().unwrap()).unwrap();
        assert_eq!(v["name"], "search");
        assert!(v.get("price").is_none());

        let cfg = RunnerConfig::new(
            RunnerMeta::new(5003, "search").with_price(Price::new(1000, "bitcoin", "lightning")),
        );
        let v: Value = serde_json::from_str(&cfg.meta_json().unwrap()).unwrap();
        assert_eq!(v["price"]["amount"], 1000);
    }

    #[test]
    fn sockets_forwarded_verbatim() {
        let sockets = json!({"in": {"k": {"type": "number"}}});
        let cfg = RunnerConfig::default().with_sockets(sockets.clone());
        let back: Value = serde_json::from_str(&cfg.sockets_json().unwrap()).unwrap();
        assert_eq!(back, sockets);
    }
}
