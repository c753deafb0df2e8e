use serde::{Deserialize, Serialize};

use crate::Price;

/// Public description of what a runner does, announced alongside its template.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerMeta {
    pub kind: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tos: String,
    #[serde(default)]
    pub privacy: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub web: String,
    #[serde(default)]
    pub picture: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Per-runner price; the node default applies when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<Price>,
}

impl Default for RunnerMeta {
    fn default() -> Self {
        Self {
            kind: 5003,
            name: "An event template".to_string(),
            description: String::new(),
            tos: String::new(),
            privacy: String::new(),
            author: String::new(),
            web: String::new(),
            picture: String::new(),
            tags: Vec::new(),
            price: None,
        }
    }
}

impl RunnerMeta {
    pub fn new(kind: u32, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_price(mut self, price: Price) -> Self {
        self.price = Some(price);
        self
    }
}
