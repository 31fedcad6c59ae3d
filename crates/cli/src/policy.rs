//! Consent policy
//!
//! Decides how a permission request from the USB worker is answered: granted
//! or denied straight from configuration, or handed to the operator.

use crate::config::PermissionSettings;
use crate::filter::DeviceFilter;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;
use types::DeviceIdentity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Consent {
    /// Prompt the operator
    #[default]
    Ask,
    Grant,
    Deny,
}

#[derive(Debug, Clone, Default)]
pub struct ConsentPolicy {
    allow: Vec<DeviceFilter>,
    deny: Vec<DeviceFilter>,
    default: Consent,
}

impl ConsentPolicy {
    pub fn from_settings(settings: &PermissionSettings) -> Result<Self> {
        Ok(Self {
            allow: DeviceFilter::parse_all(&settings.allow).context("Invalid allow filter")?,
            deny: DeviceFilter::parse_all(&settings.deny).context("Invalid deny filter")?,
            default: settings.default,
        })
    }

    /// Decision for an interactive session
    pub fn decide(&self, identity: &DeviceIdentity) -> Consent {
        let decision = if self.deny.iter().any(|f| f.matches_identity(identity)) {
            Consent::Deny
        } else if self.allow.iter().any(|f| f.matches_identity(identity)) {
            Consent::Grant
        } else {
            self.default
        };
        debug!("Consent policy for {}: {:?}", identity, decision);
        decision
    }

    /// Decision when nobody is there to answer a prompt
    pub fn decide_unattended(&self, identity: &DeviceIdentity) -> bool {
        self.decide(identity) == Consent::Grant
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inspector::testing::create_mock_identity;

    fn policy(default: Consent, allow: &[&str], deny: &[&str]) -> ConsentPolicy {
        ConsentPolicy::from_settings(&PermissionSettings {
            default,
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
            ..PermissionSettings::default()
        })
        .unwrap()
    }

    #[test]
    fn test_default_applies_without_match() {
        let identity = create_mock_identity(1, 0x1234, 0x5678);
        assert_eq!(policy(Consent::Ask, &[], &[]).decide(&identity), Consent::Ask);
        assert_eq!(policy(Consent::Grant, &[], &[]).decide(&identity), Consent::Grant);
        assert_eq!(policy(Consent::Deny, &[], &[]).decide(&identity), Consent::Deny);
    }

    #[test]
    fn test_deny_beats_allow() {
        let identity = create_mock_identity(1, 0x1234, 0x5678);
        let policy = policy(Consent::Ask, &["0x1234:*"], &["0x1234:0x5678"]);
        assert_eq!(policy.decide(&identity), Consent::Deny);

        let other = create_mock_identity(2, 0x1234, 0x0001);
        assert_eq!(policy.decide(&other), Consent::Grant);
    }

    #[test]
    fn test_unattended_treats_ask_as_deny() {
        let identity = create_mock_identity(1, 0x1234, 0x5678);
        assert!(!policy(Consent::Ask, &[], &[]).decide_unattended(&identity));
        assert!(policy(Consent::Ask, &["*:0x5678"], &[]).decide_unattended(&identity));
    }

    #[test]
    fn test_invalid_filter_rejected() {
        let result = ConsentPolicy::from_settings(&PermissionSettings {
            allow: vec!["1234:5678".to_string()],
            ..PermissionSettings::default()
        });
        assert!(result.is_err());
    }
}
