//! Remediation decisions and their scopes

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::RemediationConfig;

/// What a decision value identifies
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A single address
    Ip,
    /// A CIDR block
    Range,
    /// A country code; recognised but not cached yet
    Country,
    /// Any other feed scope
    Other(String),
}

impl Scope {
    pub fn as_str(&self) -> &str {
        match self {
            Scope::Ip => "ip",
            Scope::Range => "range",
            Scope::Country => "country",
            Scope::Other(scope) => scope,
        }
    }
}

impl From<&str> for Scope {
    /// Scopes are case-insensitive on input ("Ip" and "ip" are the same scope).
    fn from(scope: &str) -> Self {
        let scope = scope.trim().to_lowercase();
        match scope.as_str() {
            "ip" => Scope::Ip,
            "range" => Scope::Range,
            "country" => Scope::Country,
            _ => Scope::Other(scope),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One remediation fact, resolved against the configured remediation order.
///
/// Immutable once built: `remediation` always belongs to the ordered list and
/// `priority` is its index there.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    scope: Scope,
    value: String,
    remediation: String,
    origin: String,
    duration: String,
    scenario: String,
    identifier: String,
    priority: usize,
}

impl Decision {
    /// Build a decision.
    ///
    /// Unknown remediation types are replaced by the configured fallback. A
    /// positive `id` becomes the identifier; otherwise it is derived from
    /// `origin-type-scope-value`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &RemediationConfig,
        scope: Scope,
        value: &str,
        remediation: &str,
        origin: &str,
        duration: &str,
        scenario: &str,
        id: Option<i64>,
    ) -> Self {
        let remediation = if config.priority_of(remediation).is_some() {
            remediation.to_string()
        } else {
            config.fallback_remediation.clone()
        };
        let priority = config.priority_of(&remediation).unwrap_or(0);

        let identifier = match id {
            Some(id) if id > 0 => id.to_string(),
            _ => format!("{}-{}-{}-{}", origin, remediation, scope, value),
        };

        Self {
            scope,
            value: value.to_string(),
            remediation,
            origin: origin.to_string(),
            duration: duration.to_string(),
            scenario: scenario.to_string(),
            identifier,
            priority,
        }
    }

    /// Validate a feed record and convert it.
    ///
    /// Returns the name of the first missing required field on failure.
    pub fn from_raw(
        config: &RemediationConfig,
        raw: &RawDecision,
    ) -> std::result::Result<Self, &'static str> {
        fn required<'a>(field: &'a Option<String>, name: &'static str) -> Result<&'a str, &'static str> {
            match field.as_deref().map(str::trim) {
                Some(value) if !value.is_empty() => Ok(value),
                _ => Err(name),
            }
        }

        let scope = required(&raw.scope, "scope")?;
        let value = required(&raw.value, "value")?;
        let remediation = required(&raw.remediation, "type")?;
        let origin = required(&raw.origin, "origin")?;
        let duration = required(&raw.duration, "duration")?;

        Ok(Self::new(
            config,
            Scope::from(scope),
            value,
            remediation,
            origin,
            duration,
            raw.scenario.as_deref().unwrap_or_default(),
            raw.id,
        ))
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Effective remediation type
    pub fn remediation(&self) -> &str {
        &self.remediation
    }

    pub fn origin(&self) -> &str {
        &self.origin
    }

    pub fn duration(&self) -> &str {
        &self.duration
    }

    pub fn scenario(&self) -> &str {
        &self.scenario
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Index in the ordered remediations (0 is the most severe)
    pub fn priority(&self) -> usize {
        self.priority
    }
}

impl fmt::Display for Decision {
    /// Compact rendering used in log events
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{identifier: {}, origin: {}, scope: {}, value: {}, type: {}, priority: {}, duration: {}}}",
            self.identifier,
            self.origin,
            self.scope,
            self.value,
            self.remediation,
            self.priority,
            self.duration
        )
    }
}

/// Decision record as delivered by the remote feed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDecision {
    #[serde(default)]
    pub scope: Option<String>,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default, rename = "type")]
    pub remediation: Option<String>,

    #[serde(default)]
    pub origin: Option<String>,

    #[serde(default)]
    pub duration: Option<String>,

    #[serde(default)]
    pub scenario: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capi_config() -> RemediationConfig {
        RemediationConfig::default()
    }

    fn custom_config() -> RemediationConfig {
        RemediationConfig::new(vec!["ban".into(), "captcha".into(), "bypass".into()], "bypass")
            .unwrap()
    }

    #[test]
    fn test_derived_identifier() {
        let decision = Decision::new(
            &capi_config(),
            Scope::from("Ip"),
            "1.2.3.4",
            "ban",
            "Unit",
            "147h",
            "",
            None,
        );
        assert_eq!(decision.identifier(), "Unit-ban-ip-1.2.3.4");
        assert_eq!(decision.scope(), &Scope::Ip);
        assert_eq!(decision.priority(), 0);
    }

    #[test]
    fn test_numeric_identifier() {
        let decision = Decision::new(
            &capi_config(),
            Scope::Ip,
            "1.2.3.4",
            "ban",
            "Unit",
            "147h",
            "",
            Some(12345),
        );
        assert_eq!(decision.identifier(), "12345");

        let decision = Decision::new(
            &capi_config(),
            Scope::Ip,
            "1.2.3.4",
            "ban",
            "Unit",
            "147h",
            "",
            Some(0),
        );
        assert_eq!(decision.identifier(), "Unit-ban-ip-1.2.3.4");
    }

    #[test]
    fn test_unknown_type_falls_back() {
        let decision = Decision::new(
            &capi_config(),
            Scope::Ip,
            "1.2.3.4",
            "unknown",
            "Unit",
            "147h",
            "",
            None,
        );
        assert_eq!(decision.remediation(), "bypass");
        assert_eq!(decision.identifier(), "Unit-bypass-ip-1.2.3.4");
        assert_eq!(decision.priority(), 1);

        let decision = Decision::new(
            &custom_config(),
            Scope::Ip,
            "1.2.3.4",
            "unknown",
            "Unit",
            "147h",
            "",
            None,
        );
        assert_eq!(decision.priority(), 2);
    }

    #[test]
    fn test_custom_order_priority() {
        let decision = Decision::new(
            &custom_config(),
            Scope::Ip,
            "1.2.3.4",
            "captcha",
            "Unit",
            "147h",
            "",
            None,
        );
        assert_eq!(decision.remediation(), "captcha");
        assert_eq!(decision.priority(), 1);

        // captcha is not part of the default CAPI order
        let decision = Decision::new(
            &capi_config(),
            Scope::Ip,
            "1.2.3.4",
            "captcha",
            "Unit",
            "147h",
            "",
            None,
        );
        assert_eq!(decision.remediation(), "bypass");
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!(Scope::from("Range"), Scope::Range);
        assert_eq!(Scope::from("COUNTRY"), Scope::Country);
        assert_eq!(Scope::from("AS"), Scope::Other("as".to_string()));
        assert_eq!(Scope::Other("as".to_string()).to_string(), "as");
    }

    #[test]
    fn test_from_raw() {
        let raw: RawDecision = serde_json::from_str(
            r#"{"duration":"147h","origin":"CAPI","scenario":"manual","scope":"range","type":"ban","value":"52.3.230.0/24"}"#,
        )
        .unwrap();

        let decision = Decision::from_raw(&capi_config(), &raw).unwrap();
        assert_eq!(decision.scope(), &Scope::Range);
        assert_eq!(decision.identifier(), "CAPI-ban-range-52.3.230.0/24");
        assert_eq!(decision.scenario(), "manual");
    }

    #[test]
    fn test_from_raw_with_id() {
        let raw: RawDecision = serde_json::from_str(
            r#"{"id":42,"duration":"1h","origin":"cscli","scope":"Ip","type":"ban","value":"5.6.7.8"}"#,
        )
        .unwrap();

        let decision = Decision::from_raw(&capi_config(), &raw).unwrap();
        assert_eq!(decision.identifier(), "42");
        assert_eq!(decision.scenario(), "");
    }

    #[test]
    fn test_from_raw_missing_field() {
        let raw = RawDecision {
            scope: Some("ip".into()),
            value: Some("1.2.3.4".into()),
            remediation: Some("ban".into()),
            origin: None,
            duration: Some("1h".into()),
            ..Default::default()
        };
        assert_eq!(Decision::from_raw(&capi_config(), &raw), Err("origin"));

        let raw = RawDecision {
            value: Some("  ".into()),
            ..raw
        };
        assert_eq!(Decision::from_raw(&capi_config(), &raw), Err("value"));
    }
}
