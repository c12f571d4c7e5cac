//! High-level orchestrator. Owns the lifecycle and its profile store.
//! Exposes the methods that `commands.rs` delegates to.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::code::clock::{Clock, SystemClock};
use crate::code::config::CodeConfig;
use crate::code::deriver;
use crate::code::lifecycle::CodeLifecycle;
use crate::code::store::{JsonFileProfileStore, ProfileStore};
use crate::code::types::*;
use crate::code::window;

/// Thread-safe service state managed by Tauri.
pub type CodeServiceState = Arc<Mutex<CodeService>>;

/// Central verification code service.
pub struct CodeService<S = JsonFileProfileStore, C = SystemClock> {
    lifecycle: CodeLifecycle<S, C>,
}

impl CodeService {
    /// Open the JSON-backed service at `path` and wrap it for Tauri state.
    pub fn open(
        path: impl Into<PathBuf>,
        config: CodeConfig,
    ) -> Result<CodeServiceState, CodeError> {
        let store = JsonFileProfileStore::new(path);
        log::info!("Opening verification code store at {}", store.path().display());
        Ok(Self::new(store, SystemClock, config)?.into_state())
    }

    pub fn into_state(self) -> CodeServiceState {
        Arc::new(Mutex::new(self))
    }
}

impl<S: ProfileStore, C: Clock> CodeService<S, C> {
    /// Validate `config` and restore any persisted session from `store`.
    pub fn new(store: S, clock: C, config: CodeConfig) -> Result<Self, CodeError> {
        Ok(Self {
            lifecycle: CodeLifecycle::restore(store, clock, config)?,
        })
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Profile
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Replace the enrolled profile. Refused while a code is active; on
    /// success the previous session is dropped so the next code is derived
    /// from the new attributes.
    pub fn enroll(&mut self, profile: Profile) -> Result<(), CodeError> {
        self.lifecycle.config().enrollment.validate(&profile)?;
        if let Some(remaining) = self.lifecycle.remaining_cooldown() {
            return Err(CodeError::cooldown(remaining));
        }
        self.lifecycle.store_mut().set_profile(&profile)?;
        self.lifecycle.clear()?;
        log::info!("Enrolled profile for {}", profile.display_name());
        Ok(())
    }

    /// The enrolled profile.
    pub fn profile(&self) -> Result<Profile, CodeError> {
        self.lifecycle
            .store()
            .get_profile()?
            .ok_or_else(|| CodeError::new(CodeErrorKind::NoProfile, "Please register first"))
    }

    /// Forget the profile and any active session. Refused while a code is
    /// active.
    pub fn reset(&mut self) -> Result<(), CodeError> {
        if let Some(remaining) = self.lifecycle.remaining_cooldown() {
            return Err(CodeError::cooldown(remaining));
        }
        // Profile first: if the session clear then fails, no code can be
        // minted for the forgotten profile.
        self.lifecycle.store_mut().clear_profile()?;
        self.lifecycle.clear()?;
        log::info!("Profile reset");
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    //  Codes
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Mint a code for the enrolled profile.
    pub fn generate(&mut self) -> Result<IssuedCode, CodeError> {
        let profile = self.profile()?;
        let code = self.lifecycle.request_code(&profile)?;
        let session = self
            .lifecycle
            .current_session()
            .cloned()
            .ok_or_else(|| CodeError::new(CodeErrorKind::Internal, "Session missing after mint"))?;
        let window = window::quantize(&self.lifecycle.config().window, session.issued_at);
        Ok(IssuedCode {
            code,
            issued_at: session.issued_at,
            expires_at: session.expires_at,
            window: window.label,
        })
    }

    pub fn remaining_cooldown(&self) -> Option<Duration> {
        self.lifecycle.remaining_cooldown()
    }

    /// Snapshot of everything the code screen renders.
    pub fn status(&self) -> Result<CodeStatus, CodeError> {
        let profile = self.lifecycle.store().get_profile()?;
        let session = self.lifecycle.current_session();
        let remaining_secs = self
            .lifecycle
            .remaining_cooldown()
            .map(|d| (d.as_millis() as u64).div_ceil(1_000));
        let active = session.is_some();
        Ok(CodeStatus {
            enrolled: profile.is_some(),
            display_name: profile.as_ref().map(|p| p.display_name().to_string()),
            code: session.map(|s| s.code.clone()),
            remaining_secs,
            remaining_display: remaining_secs.map(format_remaining),
            can_regenerate: profile.is_some() && !active,
            can_update_profile: !active,
        })
    }

    /// Check `code` against the enrolled profile at the current time,
    /// allowing `drift_window` windows either side.
    pub fn verify(&self, code: &str, drift_window: u32) -> Result<VerifyResult, CodeError> {
        let profile = self.profile()?;
        let now = self.lifecycle.clock().now();
        Ok(deriver::verify_code(
            &profile,
            code,
            &self.lifecycle.config().window,
            now,
            drift_window,
        ))
    }

    pub fn config(&self) -> &CodeConfig {
        self.lifecycle.config()
    }

    pub fn lifecycle(&self) -> &CodeLifecycle<S, C> {
        &self.lifecycle
    }
}

/// Render a countdown the way the code screen shows it: `"1 min 05 sec"`,
/// or `"42 sec"` under a minute.
pub fn format_remaining(secs: u64) -> String {
    let minutes = secs / 60;
    let seconds = secs % 60;
    if minutes > 0 {
        format!("{} min {:02} sec", minutes, seconds)
    } else {
        format!("{:02} sec", seconds)
    }
}
