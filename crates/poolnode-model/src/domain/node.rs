use serde::{Deserialize, Serialize};

/// Identity a node announces to the coordinator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMeta {
    pub name: String,
    pub icon: String,
    pub description: String,
    pub version: String,
}

impl Default for NodeMeta {
    fn default() -> Self {
        Self {
            name: "PoolNode".to_string(),
            icon: String::new(),
            description: String::new(),
            version: "0.0.1".to_string(),
        }
    }
}
