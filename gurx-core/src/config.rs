//! Realm Configuration
//!
//! Settings applied to every realm a factory builds. The struct is
//! serde-friendly so hosts can keep it next to the rest of their settings.

use serde::{Deserialize, Serialize};

/// Default upper bound on follow-up transactions queued by one drain.
pub const DEFAULT_MAX_CHAINED_TRANSACTIONS: usize = 10_000;

/// Configuration for a realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RealmConfig {
    /// Name attached to the realm's tracing spans.
    pub name: String,

    /// How many re-entrant transactions a single publish may chain before
    /// the drain is aborted as a feedback loop.
    pub max_chained_transactions: usize,
}

impl RealmConfig {
    /// Create a configuration with the given realm name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

impl Default for RealmConfig {
    fn default() -> Self {
        Self {
            name: "realm".to_string(),
            max_chained_transactions: DEFAULT_MAX_CHAINED_TRANSACTIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_use_defaults() {
        let config = RealmConfig::from_json(r#"{ "name": "editor" }"#).unwrap();
        assert_eq!(config.name, "editor");
        assert_eq!(
            config.max_chained_transactions,
            DEFAULT_MAX_CHAINED_TRANSACTIONS
        );
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(RealmConfig::from_json("{ name: ").is_err());
    }
}
