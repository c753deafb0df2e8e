use serde::{Deserialize, Serialize};

/// Sidecar stored next to every local entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    pub version: u64,
    /// Absolute expiry in epoch millis, `0` for never.
    #[serde(rename = "expireAt")]
    pub expire_at: u64,
}

impl CacheMeta {
    /// Whether a lookup for `last_version` at `now_ms` may see this entry.
    pub fn admits(&self, last_version: u64, now_ms: u64) -> bool {
        let version_ok = last_version == 0 || last_version == self.version;
        let fresh = self.expire_at == 0 || now_ms <= self.expire_at;
        version_ok && fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_gate() {
        let meta = CacheMeta {
            version: 5,
            expire_at: 0,
        };
        assert!(meta.admits(0, 1));
        assert!(meta.admits(5, 1));
        assert!(!meta.admits(6, 1));
        assert!(!meta.admits(4, 1));
    }

    #[test]
    fn expiry_is_inclusive() {
        let meta = CacheMeta {
            version: 1,
            expire_at: 1_000,
        };
        assert!(meta.admits(0, 999));
        assert!(meta.admits(0, 1_000));
        assert!(!meta.admits(0, 1_001));
    }

    #[test]
    fn sidecar_json_shape() {
        let json = serde_json::to_string(&CacheMeta {
            version: 3,
            expire_at: 42,
        })
        .unwrap();
        assert_eq!(json, r#"{"version":3,"expireAt":42}"#);
    }
}
