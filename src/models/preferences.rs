//! Typed user preference document
//!
//! Recognized keys are explicit fields. Anything else a client sends lands in
//! `extensions`, which is bounded in key count and value size so the stored
//! document cannot grow without limit.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::{Validate, ValidationError};

pub const MAX_EXTENSION_KEYS: usize = 16;
pub const MAX_EXTENSION_KEY_LEN: usize = 64;
pub const MAX_EXTENSION_VALUE_BYTES: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskTolerance {
    Conservative,
    Moderate,
    Aggressive,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences {
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub push: bool,
    #[serde(default)]
    pub price_alerts: bool,
}

/// User preferences as stored on the identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<Theme>,

    /// ISO 4217 display currency, e.g. "USD"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(custom = "validate_currency")]
    pub currency: Option<String>,

    /// BCP 47 language tag, e.g. "en" or "pt-BR"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 2, max = 10))]
    pub language: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications: Option<NotificationPreferences>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_tolerance: Option<RiskTolerance>,

    /// Forward-compatible fields this server does not interpret
    #[serde(flatten)]
    #[validate(custom = "validate_extensions")]
    pub extensions: BTreeMap<String, Value>,
}

fn validate_currency(currency: &String) -> Result<(), ValidationError> {
    if currency.len() == 3 && currency.chars().all(|c| c.is_ascii_uppercase()) {
        Ok(())
    } else {
        Err(ValidationError::new("currency_code"))
    }
}

fn validate_extensions(extensions: &BTreeMap<String, Value>) -> Result<(), ValidationError> {
    if extensions.len() > MAX_EXTENSION_KEYS {
        return Err(ValidationError::new("too_many_extensions"));
    }

    for (key, value) in extensions {
        if key.is_empty() || key.len() > MAX_EXTENSION_KEY_LEN {
            return Err(ValidationError::new("extension_key_length"));
        }
        let size = serde_json::to_vec(value).map(|v| v.len()).unwrap_or(usize::MAX);
        if size > MAX_EXTENSION_VALUE_BYTES {
            return Err(ValidationError::new("extension_value_too_large"));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_known_and_unknown_keys() {
        let prefs: Preferences = serde_json::from_value(json!({
            "theme": "dark",
            "currency": "USD",
            "notifications": { "priceAlerts": true },
            "dashboardLayout": "compact"
        }))
        .unwrap();

        assert_eq!(prefs.theme, Some(Theme::Dark));
        assert_eq!(prefs.currency.as_deref(), Some("USD"));
        assert!(prefs.notifications.as_ref().unwrap().price_alerts);
        assert_eq!(prefs.extensions.get("dashboardLayout"), Some(&json!("compact")));
        assert!(prefs.validate().is_ok());

        let round = serde_json::to_value(&prefs).unwrap();
        assert_eq!(round["dashboardLayout"], json!("compact"));
        assert!(round.get("language").is_none());
    }

    #[test]
    fn test_unknown_theme_is_rejected() {
        let result: Result<Preferences, _> = serde_json::from_value(json!({ "theme": "neon" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_currency() {
        let prefs = Preferences {
            currency: Some("usd".to_string()),
            ..Default::default()
        };
        assert!(prefs.validate().is_err());
    }

    #[test]
    fn test_extension_limits() {
        let mut prefs = Preferences::default();
        for i in 0..=MAX_EXTENSION_KEYS {
            prefs.extensions.insert(format!("k{}", i), json!(i));
        }
        assert!(prefs.validate().is_err());

        let mut prefs = Preferences::default();
        prefs
            .extensions
            .insert("blob".to_string(), json!("x".repeat(MAX_EXTENSION_VALUE_BYTES)));
        assert!(prefs.validate().is_err());

        let mut prefs = Preferences::default();
        prefs.extensions.insert("widgets".to_string(), json!(["a", "b"]));
        assert!(prefs.validate().is_ok());
    }
}
