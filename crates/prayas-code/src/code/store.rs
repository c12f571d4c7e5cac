//! Profile and session persistence.
//!
//! The lifecycle keeps only the session in memory; the enrolled profile
//! and the session's expiry live behind [`ProfileStore`] so that state
//! survives a process restart. Every failure is reported as
//! `StorageUnavailable` and handed back to the caller untouched.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::code::types::*;

/// Synchronous persistence consumed by the lifecycle and the service.
pub trait ProfileStore: Send {
    fn get_profile(&self) -> Result<Option<Profile>, CodeError>;
    fn set_profile(&mut self, profile: &Profile) -> Result<(), CodeError>;
    fn clear_profile(&mut self) -> Result<(), CodeError>;

    fn get_session_meta(&self) -> Result<Option<SessionMeta>, CodeError>;
    fn set_session_meta(&mut self, meta: &SessionMeta) -> Result<(), CodeError>;
    fn clear_session_meta(&mut self) -> Result<(), CodeError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  In-memory store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Store held entirely in memory. Can be taken offline to simulate an
/// unavailable backend.
#[derive(Debug, Clone, Default)]
pub struct MemoryProfileStore {
    profile: Option<Profile>,
    session: Option<SessionMeta>,
    offline: bool,
    writes: usize,
    write_budget: Option<usize>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: start with an enrolled profile.
    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Builder: start with persisted session meta.
    pub fn with_session(mut self, meta: SessionMeta) -> Self {
        self.session = Some(meta);
        self
    }

    /// While offline every operation fails with `StorageUnavailable`.
    pub fn set_offline(&mut self, offline: bool) {
        self.offline = offline;
    }

    /// Allow `count` more mutating calls, then fail every later one with
    /// `StorageUnavailable`. Reads keep working.
    pub fn fail_writes_after(&mut self, count: usize) {
        self.write_budget = Some(count);
    }

    /// Number of successful mutating calls so far.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    fn check_online(&self) -> Result<(), CodeError> {
        if self.offline {
            Err(CodeError::storage("Profile store is offline"))
        } else {
            Ok(())
        }
    }

    fn begin_write(&mut self) -> Result<(), CodeError> {
        self.check_online()?;
        match self.write_budget {
            Some(0) => Err(CodeError::storage("Profile store rejected the write")),
            Some(ref mut left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl ProfileStore for MemoryProfileStore {
    fn get_profile(&self) -> Result<Option<Profile>, CodeError> {
        self.check_online()?;
        Ok(self.profile.clone())
    }

    fn set_profile(&mut self, profile: &Profile) -> Result<(), CodeError> {
        self.begin_write()?;
        self.profile = Some(profile.clone());
        self.writes += 1;
        Ok(())
    }

    fn clear_profile(&mut self) -> Result<(), CodeError> {
        self.begin_write()?;
        self.profile = None;
        self.writes += 1;
        Ok(())
    }

    fn get_session_meta(&self) -> Result<Option<SessionMeta>, CodeError> {
        self.check_online()?;
        Ok(self.session.clone())
    }

    fn set_session_meta(&mut self, meta: &SessionMeta) -> Result<(), CodeError> {
        self.begin_write()?;
        self.session = Some(meta.clone());
        self.writes += 1;
        Ok(())
    }

    fn clear_session_meta(&mut self) -> Result<(), CodeError> {
        self.begin_write()?;
        self.session = None;
        self.writes += 1;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  JSON file store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// On-disk layout of [`JsonFileProfileStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default, alias = "userDetails")]
    profile: Option<Profile>,
    #[serde(default)]
    session: Option<SessionMeta>,
}

impl StoreDocument {
    fn is_empty(&self) -> bool {
        self.profile.is_none() && self.session.is_none()
    }

    /// Parse either this store's own layout or a flat dump of the mobile
    /// app's key/value storage.
    fn parse(data: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(data).map_err(|e| e.to_string())?;
        if AppStorageDump::matches(&value) {
            let dump: AppStorageDump = serde_json::from_value(value).map_err(|e| e.to_string())?;
            return dump.into_document();
        }
        serde_json::from_value(value).map_err(|e| e.to_string())
    }
}

/// The mobile app's storage: top-level `userDetails` (a JSON string),
/// `generatedCode` and `expirationTime` (a decimal string).
#[derive(Debug, Deserialize)]
struct AppStorageDump {
    #[serde(rename = "userDetails", default)]
    user_details: Option<Value>,
    #[serde(rename = "generatedCode", default)]
    generated_code: Option<String>,
    #[serde(rename = "expirationTime", default)]
    expiration_time: Option<Value>,
}

impl AppStorageDump {
    fn matches(value: &Value) -> bool {
        value.get("generatedCode").is_some()
            || value.get("expirationTime").is_some()
            || value.get("userDetails").is_some_and(Value::is_string)
    }

    fn into_document(self) -> Result<StoreDocument, String> {
        let profile = match self.user_details {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => Some(
                serde_json::from_str::<Profile>(&raw).map_err(|e| format!("userDetails: {}", e))?,
            ),
            Some(other) => Some(
                serde_json::from_value::<Profile>(other)
                    .map_err(|e| format!("userDetails: {}", e))?,
            ),
        };

        let expires_at = match self.expiration_time {
            None | Some(Value::Null) => None,
            Some(Value::String(raw)) => Some(
                raw.trim()
                    .parse::<Timestamp>()
                    .map_err(|e| format!("expirationTime: {}", e))?,
            ),
            Some(Value::Number(n)) => {
                Some(n.as_i64().ok_or("expirationTime: not an integer")?)
            }
            Some(other) => return Err(format!("expirationTime: unexpected value {}", other)),
        };

        // A code without an expiry (or the reverse) is not a session.
        let session = match (self.generated_code, expires_at) {
            (Some(code), Some(expires_at)) => Some(SessionMeta {
                code,
                issued_at: None,
                expires_at,
            }),
            _ => None,
        };
        Ok(StoreDocument { profile, session })
    }
}

/// Persists the profile and session meta as one pretty-printed JSON file.
///
/// The file is re-read on every call, so two handles on the same path
/// observe each other's writes. A missing file is an empty store; the file
/// is removed again once both profile and session are cleared. A file
/// holding the mobile app's flat storage dump is read as-is and rewritten
/// in this store's layout on the first write.
#[derive(Debug, Clone)]
pub struct JsonFileProfileStore {
    path: PathBuf,
}

impl JsonFileProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<StoreDocument, CodeError> {
        if !self.path.exists() {
            return Ok(StoreDocument::default());
        }
        let data = fs::read_to_string(&self.path).map_err(|e| self.io_error("read", e))?;
        if data.trim().is_empty() {
            return Ok(StoreDocument::default());
        }
        StoreDocument::parse(&data).map_err(|e| {
            CodeError::storage(format!("Profile store is corrupt: {}", e))
                .with_detail(self.path.display().to_string())
        })
    }

    fn save(&self, doc: &StoreDocument) -> Result<(), CodeError> {
        if doc.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path).map_err(|e| self.io_error("remove", e))?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| self.io_error("create dir", e))?;
            }
        }
        let json = serde_json::to_string_pretty(doc).map_err(|e| {
            CodeError::new(CodeErrorKind::Internal, format!("JSON serialise: {}", e))
        })?;
        // Write-then-rename so a crash never leaves a half-written file.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|e| self.io_error("write", e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error("rename", e))
    }

    fn update(&self, apply: impl FnOnce(&mut StoreDocument)) -> Result<(), CodeError> {
        let mut doc = self.load()?;
        apply(&mut doc);
        self.save(&doc)
    }

    fn io_error(&self, op: &str, e: std::io::Error) -> CodeError {
        log::warn!("Profile store {} failed at {}: {}", op, self.path.display(), e);
        CodeError::storage(format!("Profile store {} failed: {}", op, e))
            .with_detail(self.path.display().to_string())
    }
}

impl ProfileStore for JsonFileProfileStore {
    fn get_profile(&self) -> Result<Option<Profile>, CodeError> {
        Ok(self.load()?.profile)
    }

    fn set_profile(&mut self, profile: &Profile) -> Result<(), CodeError> {
        self.update(|doc| doc.profile = Some(profile.clone()))
    }

    fn clear_profile(&mut self) -> Result<(), CodeError> {
        self.update(|doc| doc.profile = None)
    }

    fn get_session_meta(&self) -> Result<Option<SessionMeta>, CodeError> {
        Ok(self.load()?.session)
    }

    fn set_session_meta(&mut self, meta: &SessionMeta) -> Result<(), CodeError> {
        self.update(|doc| doc.session = Some(meta.clone()))
    }

    fn clear_session_meta(&mut self) -> Result<(), CodeError> {
        self.update(|doc| doc.session = None)
    }
}
