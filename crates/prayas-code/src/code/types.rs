//! Core types for the verification code generator.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Milliseconds since the Unix epoch.
pub type Timestamp = i64;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Profile
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Enrolled user attributes. `identity`, `phone` and `secret` feed the
/// derivation; `username` is display-only.
///
/// Field aliases accept the record layout the mobile app stores
/// (`email`, `mobile`, `key`).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(alias = "email")]
    pub identity: String,
    #[serde(alias = "mobile")]
    pub phone: String,
    #[serde(alias = "key")]
    pub secret: String,
}

impl Profile {
    /// Build a profile, trimming every field and lowercasing the identity.
    pub fn new(
        identity: impl Into<String>,
        phone: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            username: None,
            identity: identity.into().trim().to_lowercase(),
            phone: phone.into().trim().to_string(),
            secret: secret.into().trim().to_string(),
        }
    }

    /// Builder: set the display username.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into().trim().to_string());
        self
    }

    /// Name shown on the code screen: the username, or the local part of
    /// the identity when no username was enrolled.
    pub fn display_name(&self) -> &str {
        match &self.username {
            Some(name) if !name.is_empty() => name,
            _ => self
                .identity
                .split('@')
                .next()
                .unwrap_or(self.identity.as_str()),
        }
    }
}

// Keeps the shared key out of logs and panic messages.
impl fmt::Debug for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Profile")
            .field("username", &self.username)
            .field("identity", &self.identity)
            .field("phone", &self.phone)
            .field("secret", &"<redacted>")
            .finish()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Time window
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A quantized slice of wall-clock time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Monotonic window counter.
    pub index: i64,
    /// The text appended to the canonical string.
    pub label: String,
    /// First instant inside the window (inclusive).
    pub starts_at: Timestamp,
    /// First instant after the window (exclusive).
    pub ends_at: Timestamp,
}

impl TimeWindow {
    pub fn contains(&self, at: Timestamp) -> bool {
        at >= self.starts_at && at < self.ends_at
    }

    pub fn length_ms(&self) -> i64 {
        self.ends_at - self.starts_at
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Derived code
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Lowest code the fold can produce.
pub const CODE_MIN: u32 = 10_000;
/// Highest code the fold can produce.
pub const CODE_MAX: u32 = 99_999;

/// A 5-digit verification code in `10000..=99999`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DerivedCode(String);

impl DerivedCode {
    /// Wrap a folded value. Callers guarantee the range.
    pub(crate) fn from_value(value: u32) -> Self {
        debug_assert!((CODE_MIN..=CODE_MAX).contains(&value));
        Self(value.to_string())
    }

    /// Parse a code string, accepting only exactly five ASCII digits in range.
    pub fn parse(s: &str) -> Option<Self> {
        if s.len() != 5 || !s.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let value: u32 = s.parse().ok()?;
        if (CODE_MIN..=CODE_MAX).contains(&value) {
            Some(Self(s.to_string()))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the code.
    pub fn value(&self) -> u32 {
        // Every constructor checks the digits.
        self.0.parse().unwrap_or_default()
    }
}

impl fmt::Display for DerivedCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DerivedCode {
    type Error = CodeError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s).ok_or_else(|| {
            CodeError::new(CodeErrorKind::Internal, "Malformed verification code").with_detail(s)
        })
    }
}

impl From<DerivedCode> for String {
    fn from(code: DerivedCode) -> String {
        code.0
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The currently active code and its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeSession {
    pub code: DerivedCode,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}

impl CodeSession {
    /// Time left before the session lapses, or `None` once `at >= expires_at`.
    pub fn remaining_at(&self, at: Timestamp) -> Option<Duration> {
        if at >= self.expires_at {
            None
        } else {
            Some(Duration::from_millis((self.expires_at - at) as u64))
        }
    }

    pub fn to_meta(&self) -> SessionMeta {
        SessionMeta {
            code: self.code.to_string(),
            issued_at: Some(self.issued_at),
            expires_at: self.expires_at,
        }
    }

    /// Rebuild a session from persisted meta. Records written without an
    /// issue time are assumed to have been minted one `validity_ms` before
    /// expiry.
    pub fn from_meta(meta: &SessionMeta, validity_ms: i64) -> Option<Self> {
        let code = DerivedCode::parse(&meta.code)?;
        Some(Self {
            code,
            issued_at: meta
                .issued_at
                .unwrap_or_else(|| meta.expires_at.saturating_sub(validity_ms)),
            expires_at: meta.expires_at,
        })
    }
}

/// The persisted part of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    #[serde(alias = "generatedCode")]
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<Timestamp>,
    #[serde(alias = "expirationTime")]
    pub expires_at: Timestamp,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Service results
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A freshly minted code with its timing info.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedCode {
    pub code: DerivedCode,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
    /// Label of the window the code was derived for.
    pub window: String,
}

/// What the code screen needs to render.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeStatus {
    pub enrolled: bool,
    pub display_name: Option<String>,
    pub code: Option<DerivedCode>,
    /// Whole seconds left, rounded up.
    pub remaining_secs: Option<u64>,
    /// e.g. "1 min 05 sec".
    pub remaining_display: Option<String>,
    pub can_regenerate: bool,
    pub can_update_profile: bool,
}

/// Result of checking a submitted code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResult {
    pub valid: bool,
    /// How many windows off the match was (0 = current window).
    pub drift: i64,
    /// Index of the window that matched (if any).
    pub matched_window: Option<i64>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Error type
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Error kind for this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeErrorKind {
    /// A code is still valid; a new one may be requested after `remaining_ms`.
    CooldownActive { remaining_ms: u64 },
    InvalidProfile,
    StorageUnavailable,
    NoProfile,
    InvalidConfig,
    Internal,
}

/// Crate-level error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeError {
    pub kind: CodeErrorKind,
    pub message: String,
    pub detail: Option<String>,
}

impl fmt::Display for CodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)?;
        if let Some(d) = &self.detail {
            write!(f, " ({})", d)?;
        }
        Ok(())
    }
}

impl std::error::Error for CodeError {}

impl CodeError {
    pub fn new(kind: CodeErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn cooldown(remaining: Duration) -> Self {
        Self::new(
            CodeErrorKind::CooldownActive {
                remaining_ms: remaining.as_millis() as u64,
            },
            "Please wait for the current code to expire",
        )
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::new(CodeErrorKind::StorageUnavailable, msg)
    }

    pub fn invalid_profile(field: &str, msg: impl Into<String>) -> Self {
        Self::new(CodeErrorKind::InvalidProfile, msg).with_detail(field)
    }

    /// Remaining cooldown carried by a `CooldownActive` error.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        match self.kind {
            CodeErrorKind::CooldownActive { remaining_ms } => {
                Some(Duration::from_millis(remaining_ms))
            }
            _ => None,
        }
    }

    pub fn is_cooldown(&self) -> bool {
        self.cooldown_remaining().is_some()
    }
}

impl From<CodeError> for String {
    fn from(e: CodeError) -> String {
        e.to_string()
    }
}
