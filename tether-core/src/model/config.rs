//! Registry configuration.

use serde::Deserialize;

use crate::error::{Error, Result};

fn default_id_key() -> String {
    "id".to_string()
}

fn default_coerce_dates() -> bool {
    true
}

/// Settings shared by every model of a registry.
///
/// Deserializes from JSON; missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RegistryConfig {
    /// Key holding the unique id of an instance, unless a declaration
    /// overrides it.
    #[serde(default = "default_id_key")]
    pub id_key: String,

    /// Convert strings and millisecond timestamps written to `Date` keys.
    #[serde(default = "default_coerce_dates")]
    pub coerce_dates: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            id_key: default_id_key(),
            coerce_dates: default_coerce_dates(),
        }
    }
}

impl RegistryConfig {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|err| Error::InvalidArgument(format!("invalid registry config: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RegistryConfig::default();
        assert_eq!(config.id_key, "id");
        assert!(config.coerce_dates);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = RegistryConfig::from_json(r#"{ "id_key": "uuid" }"#).unwrap();
        assert_eq!(config.id_key, "uuid");
        assert!(config.coerce_dates);

        let config = RegistryConfig::from_json(r#"{ "coerce_dates": false }"#).unwrap();
        assert_eq!(config.id_key, "id");
        assert!(!config.coerce_dates);
    }

    #[test]
    fn malformed_json_is_an_invalid_argument() {
        assert!(matches!(
            RegistryConfig::from_json("{ id_key: "),
            Err(Error::InvalidArgument(_))
        ));
    }
}
