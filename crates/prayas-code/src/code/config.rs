//! Derivation and lifecycle configuration.
//!
//! Every value here is part of the contract with the verifying server:
//! two installations only agree on codes when their window policy matches.

use std::path::Path;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::code::types::*;

/// Largest UTC offset a real timezone uses (±14:00).
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Longest validity period accepted (24 hours).
pub const MAX_VALIDITY_SECS: u64 = 24 * 60 * 60;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Window policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How the current instant is quantized into a derivation window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowPolicy {
    /// Whole minutes since the Unix epoch, labelled with the decimal count.
    EpochMinutes,
    /// Wall-clock slots of `step_minutes` in a fixed UTC offset, labelled
    /// `YYYY-MM-DD HH:mm` at the slot start.
    OffsetRounded {
        utc_offset_minutes: i32,
        step_minutes: u32,
    },
}

impl Default for WindowPolicy {
    /// IST (+05:30) five-minute slots.
    fn default() -> Self {
        Self::OffsetRounded {
            utc_offset_minutes: 330,
            step_minutes: 5,
        }
    }
}

impl WindowPolicy {
    /// Length of one window in milliseconds.
    pub fn window_ms(&self) -> i64 {
        match self {
            Self::EpochMinutes => 60_000,
            Self::OffsetRounded { step_minutes, .. } => *step_minutes as i64 * 60_000,
        }
    }

    pub fn validate(&self) -> Result<(), CodeError> {
        match *self {
            Self::EpochMinutes => Ok(()),
            Self::OffsetRounded {
                utc_offset_minutes,
                step_minutes,
            } => {
                if step_minutes == 0 || 1440 % step_minutes != 0 {
                    return Err(CodeError::new(
                        CodeErrorKind::InvalidConfig,
                        "Window step must be a non-zero divisor of 24 hours",
                    )
                    .with_detail(format!("step_minutes = {}", step_minutes)));
                }
                if utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
                    return Err(CodeError::new(
                        CodeErrorKind::InvalidConfig,
                        "UTC offset out of range",
                    )
                    .with_detail(format!("utc_offset_minutes = {}", utc_offset_minutes)));
                }
                Ok(())
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Enrollment rules
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Field checks applied before a profile is stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrollmentRules {
    /// Required mail domain of the identity (e.g. "nic.in").
    pub identity_domain: String,
    /// Exact number of digits in the phone number.
    pub phone_digits: usize,
    /// Exact number of digits in the shared key.
    pub secret_digits: usize,
    /// Minimum username length, checked only when a username is given.
    pub min_username_len: usize,
}

impl Default for EnrollmentRules {
    fn default() -> Self {
        Self {
            identity_domain: "nic.in".into(),
            phone_digits: 10,
            secret_digits: 5,
            min_username_len: 3,
        }
    }
}

impl EnrollmentRules {
    /// Check a profile. The first failing field is reported in `detail`.
    pub fn validate(&self, profile: &Profile) -> Result<(), CodeError> {
        if profile.identity.is_empty() || profile.phone.is_empty() || profile.secret.is_empty() {
            return Err(CodeError::new(
                CodeErrorKind::InvalidProfile,
                "All fields are required",
            ));
        }

        if let Some(name) = &profile.username {
            if name.chars().count() < self.min_username_len {
                return Err(CodeError::invalid_profile("username", "Please enter a Username"));
            }
        }

        let pattern = format!(r"^\S+@{}$", regex::escape(&self.identity_domain.to_lowercase()));
        let identity_re = Regex::new(&pattern).map_err(|e| {
            CodeError::new(CodeErrorKind::InvalidConfig, "Bad identity domain")
                .with_detail(e.to_string())
        })?;
        if !identity_re.is_match(&profile.identity) {
            return Err(CodeError::invalid_profile(
                "identity",
                "Please enter a valid email address",
            ));
        }

        if !is_digits(&profile.phone, self.phone_digits) {
            return Err(CodeError::invalid_profile("phone", "Please enter a valid Phone number"));
        }

        if !is_digits(&profile.secret, self.secret_digits) {
            return Err(CodeError::invalid_profile("secret", "Please enter a Key"));
        }

        Ok(())
    }
}

fn is_digits(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| b.is_ascii_digit())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeConfig {
    /// How long a code stays active (and regeneration is refused).
    pub validity_secs: u64,
    pub window: WindowPolicy,
    pub enrollment: EnrollmentRules,
}

impl Default for CodeConfig {
    fn default() -> Self {
        Self {
            validity_secs: 60,
            window: WindowPolicy::default(),
            enrollment: EnrollmentRules::default(),
        }
    }
}

impl CodeConfig {
    /// Builder: set the validity period.
    pub fn with_validity(mut self, validity: Duration) -> Self {
        self.validity_secs = validity.as_secs();
        self
    }

    /// Builder: set the window policy.
    pub fn with_window(mut self, window: WindowPolicy) -> Self {
        self.window = window;
        self
    }

    pub fn validity(&self) -> Duration {
        Duration::from_secs(self.validity_secs)
    }

    /// Validity in milliseconds, saturating at `i64::MAX` for values
    /// `validate` would reject.
    pub fn validity_ms(&self) -> i64 {
        i64::try_from(self.validity_secs)
            .map(|secs| secs.saturating_mul(1_000))
            .unwrap_or(i64::MAX)
    }

    pub fn validate(&self) -> Result<(), CodeError> {
        if self.validity_secs == 0 {
            return Err(CodeError::new(
                CodeErrorKind::InvalidConfig,
                "Validity period must be at least one second",
            ));
        }
        if self.validity_secs > MAX_VALIDITY_SECS {
            return Err(CodeError::new(
                CodeErrorKind::InvalidConfig,
                "Validity period must not exceed 24 hours",
            )
            .with_detail(format!("validity_secs = {}", self.validity_secs)));
        }
        self.window.validate()?;
        if self.enrollment.identity_domain.trim().is_empty() {
            return Err(CodeError::new(
                CodeErrorKind::InvalidConfig,
                "Identity domain must not be empty",
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON config. Missing fields take defaults.
    pub fn from_json(json: &str) -> Result<Self, CodeError> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            CodeError::new(CodeErrorKind::InvalidConfig, "Config parse failed")
                .with_detail(e.to_string())
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON config from disk.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, CodeError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            CodeError::new(CodeErrorKind::InvalidConfig, format!("Config read failed: {}", e))
                .with_detail(path.display().to_string())
        })?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String, CodeError> {
        serde_json::to_string_pretty(self).map_err(|e| {
            CodeError::new(CodeErrorKind::Internal, format!("JSON serialise: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_profile() -> Profile {
        Profile::new("asha@nic.in", "9876543210", "12345").with_username("asha")
    }

    // ── Window policy ────────────────────────────────────────────

    #[test]
    fn default_policy_is_ist_five_minutes() {
        assert_eq!(
            WindowPolicy::default(),
            WindowPolicy::OffsetRounded {
                utc_offset_minutes: 330,
                step_minutes: 5
            }
        );
        assert_eq!(WindowPolicy::default().window_ms(), 300_000);
        assert_eq!(WindowPolicy::EpochMinutes.window_ms(), 60_000);
    }

    #[test]
    fn policy_rejects_bad_step() {
        let zero = WindowPolicy::OffsetRounded {
            utc_offset_minutes: 0,
            step_minutes: 0,
        };
        assert!(zero.validate().is_err());
        let uneven = WindowPolicy::OffsetRounded {
            utc_offset_minutes: 0,
            step_minutes: 7,
        };
        assert!(uneven.validate().is_err());
    }

    #[test]
    fn policy_rejects_bad_offset() {
        let p = WindowPolicy::OffsetRounded {
            utc_offset_minutes: 15 * 60,
            step_minutes: 5,
        };
        let err = p.validate().unwrap_err();
        assert_eq!(err.kind, CodeErrorKind::InvalidConfig);
    }

    #[test]
    fn policy_serde_shape() {
        let json = serde_json::to_string(&WindowPolicy::EpochMinutes).unwrap();
        assert_eq!(json, r#"{"kind":"epoch_minutes"}"#);
        let back: WindowPolicy = serde_json::from_str(
            r#"{"kind":"offset_rounded","utc_offset_minutes":0,"step_minutes":15}"#,
        )
        .unwrap();
        assert_eq!(back.window_ms(), 900_000);
    }

    // ── Enrollment rules ─────────────────────────────────────────

    #[test]
    fn rules_accept_valid_profile() {
        assert!(EnrollmentRules::default().validate(&valid_profile()).is_ok());
    }

    #[test]
    fn rules_reject_missing_field() {
        let p = Profile::new("asha@nic.in", "", "12345");
        let err = EnrollmentRules::default().validate(&p).unwrap_err();
        assert_eq!(err.kind, CodeErrorKind::InvalidProfile);
    }

    #[test]
    fn rules_reject_wrong_domain() {
        let p = Profile::new("asha@gmail.com", "9876543210", "12345");
        let err = EnrollmentRules::default().validate(&p).unwrap_err();
        assert_eq!(err.detail.as_deref(), Some("identity"));
    }

    #[test]
    fn rules_reject_bad_phone_and_key() {
        let rules = EnrollmentRules::default();
        let p = Profile::new("asha@nic.in", "98765", "12345");
        assert_eq!(rules.validate(&p).unwrap_err().detail.as_deref(), Some("phone"));
        let p = Profile::new("asha@nic.in", "9876543210", "12a45");
        assert_eq!(rules.validate(&p).unwrap_err().detail.as_deref(), Some("secret"));
    }

    #[test]
    fn rules_reject_short_username() {
        let p = Profile::new("asha@nic.in", "9876543210", "12345").with_username("ab");
        let err = EnrollmentRules::default().validate(&p).unwrap_err();
        assert_eq!(err.detail.as_deref(), Some("username"));
    }

    #[test]
    fn rules_escape_domain() {
        // "nic.in" must not match "nicxin".
        let p = Profile::new("asha@nicxin", "9876543210", "12345");
        assert!(EnrollmentRules::default().validate(&p).is_err());
    }

    // ── CodeConfig ───────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let c = CodeConfig::default();
        assert_eq!(c.validity(), Duration::from_secs(60));
        assert_eq!(c.validity_ms(), 60_000);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn config_partial_json_takes_defaults() {
        let c = CodeConfig::from_json(r#"{"validity_secs":900}"#).unwrap();
        assert_eq!(c.validity_secs, 900);
        assert_eq!(c.window, WindowPolicy::default());
        assert_eq!(c.enrollment, EnrollmentRules::default());
    }

    #[test]
    fn config_rejects_zero_validity() {
        let err = CodeConfig::from_json(r#"{"validity_secs":0}"#).unwrap_err();
        assert_eq!(err.kind, CodeErrorKind::InvalidConfig);
    }

    #[test]
    fn config_rejects_oversized_validity() {
        for secs in [MAX_VALIDITY_SECS + 1, 10_000_000_000_000_000, u64::MAX] {
            let json = format!(r#"{{"validity_secs":{}}}"#, secs);
            let err = CodeConfig::from_json(&json).unwrap_err();
            assert_eq!(err.kind, CodeErrorKind::InvalidConfig);
        }
        let max = format!(r#"{{"validity_secs":{}}}"#, MAX_VALIDITY_SECS);
        assert!(CodeConfig::from_json(&max).is_ok());
    }

    #[test]
    fn validity_ms_saturates() {
        let huge = CodeConfig {
            validity_secs: u64::MAX,
            ..CodeConfig::default()
        };
        assert_eq!(huge.validity_ms(), i64::MAX);
        let big = CodeConfig {
            validity_secs: 10_000_000_000_000_000,
            ..CodeConfig::default()
        };
        assert_eq!(big.validity_ms(), i64::MAX);
        assert_eq!(CodeConfig::default().validity_ms(), 60_000);
    }

    #[test]
    fn config_rejects_malformed_json() {
        let err = CodeConfig::from_json("{not json").unwrap_err();
        assert_eq!(err.kind, CodeErrorKind::InvalidConfig);
    }

    #[test]
    fn config_json_roundtrip() {
        let c = CodeConfig::default()
            .with_validity(Duration::from_secs(900))
            .with_window(WindowPolicy::EpochMinutes);
        let json = c.to_json().unwrap();
        assert_eq!(CodeConfig::from_json(&json).unwrap(), c);
    }

    #[test]
    fn config_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("code.json");
        std::fs::write(&path, r#"{"window":{"kind":"epoch_minutes"}}"#).unwrap();
        let c = CodeConfig::load_from_file(&path).unwrap();
        assert_eq!(c.window, WindowPolicy::EpochMinutes);
        assert!(CodeConfig::load_from_file(dir.path().join("missing.json")).is_err());
    }
}
