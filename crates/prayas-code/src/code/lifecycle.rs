//! Code lifecycle: one active code at a time, cooldown until it expires.
//!
//! ```text
//!   Idle ──request_code──▶ Active
//!   Active ──request_code (before expiry)──▶ Active   (CooldownActive, no change)
//!   Active ──clock passes expires_at──▶ Idle           (lazy, on next observation)
//!   Active | Idle ──clear──▶ Idle
//! ```
//!
//! Expiry is evaluated against the [`Clock`] whenever state is observed;
//! there is no timer. Only `request_code` and `clear` write to the store.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::code::clock::Clock;
use crate::code::config::CodeConfig;
use crate::code::deriver;
use crate::code::store::ProfileStore;
use crate::code::types::*;
use crate::code::window;

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// No valid code; a new one may be requested.
    Idle,
    /// A code is valid until its expiry; regeneration is refused.
    Active,
}

/// Owns the active session, the store it is persisted in and the clock
/// it is measured against.
pub struct CodeLifecycle<S, C> {
    store: S,
    clock: C,
    config: CodeConfig,
    active: Option<CodeSession>,
}

impl<S: ProfileStore, C: Clock> CodeLifecycle<S, C> {
    /// Rebuild lifecycle state from the store.
    ///
    /// Persisted meta that has already expired, cannot be parsed, or was
    /// issued after the current clock reading is removed and the lifecycle
    /// starts idle. An invalid `config` is rejected before the store is read.
    pub fn restore(mut store: S, clock: C, config: CodeConfig) -> Result<Self, CodeError> {
        config.validate()?;
        let now = clock.now();
        let mut stale = false;
        let active = match store.get_session_meta()? {
            None => None,
            Some(meta) => match CodeSession::from_meta(&meta, config.validity_ms()) {
                None => {
                    log::warn!("Discarding unreadable persisted session");
                    stale = true;
                    None
                }
                Some(session) if now < session.issued_at => {
                    log::warn!(
                        "Discarding persisted session issued {} ms in the future",
                        session.issued_at - now
                    );
                    stale = true;
                    None
                }
                Some(session) if now >= session.expires_at => {
                    log::debug!("Persisted session expired at {}", session.expires_at);
                    stale = true;
                    None
                }
                Some(session) => {
                    log::debug!(
                        "Restored active session, {} ms remaining",
                        session.expires_at - now
                    );
                    Some(session)
                }
            },
        };
        if stale {
            store.clear_session_meta()?;
        }
        Ok(Self {
            store,
            clock,
            config,
            active,
        })
    }

    /// Mint a new code for `profile`, or report how long the current one
    /// still blocks regeneration.
    ///
    /// The rejection path reads the clock only; nothing is written.
    pub fn request_code(&mut self, profile: &Profile) -> Result<DerivedCode, CodeError> {
        let now = self.clock.now();
        if let Some(remaining) = self.remaining_at(now) {
            log::debug!("Code request refused, {} ms of cooldown left", remaining.as_millis());
            return Err(CodeError::cooldown(remaining));
        }

        let window = window::quantize(&self.config.window, now);
        let code = deriver::derive(profile, &window);
        let session = CodeSession {
            code: code.clone(),
            issued_at: now,
            expires_at: now.saturating_add(self.config.validity_ms()),
        };

        // Persist first: a failed write leaves the lifecycle untouched.
        self.store.set_session_meta(&session.to_meta())?;
        log::info!(
            "Issued verification code for window {} (expires at {})",
            window.label,
            session.expires_at
        );
        self.active = Some(session);
        Ok(code)
    }

    /// Time until a new code may be requested; `None` when idle.
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        self.remaining_at(self.clock.now())
    }

    pub fn state(&self) -> LifecycleState {
        if self.remaining_cooldown().is_some() {
            LifecycleState::Active
        } else {
            LifecycleState::Idle
        }
    }

    /// The session, if it is still active.
    pub fn current_session(&self) -> Option<&CodeSession> {
        let now = self.clock.now();
        self.remaining_at(now)?;
        self.active.as_ref()
    }

    /// Drop the session and its persisted meta.
    pub fn clear(&mut self) -> Result<(), CodeError> {
        self.store.clear_session_meta()?;
        if self.active.take().is_some() {
            log::info!("Verification code session cleared");
        }
        Ok(())
    }

    pub fn config(&self) -> &CodeConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Give the store back, e.g. to restore a fresh lifecycle from it.
    pub fn into_store(self) -> S {
        self.store
    }

    fn remaining_at(&self, now: Timestamp) -> Option<Duration> {
        let session = self.active.as_ref()?;
        if now < session.issued_at {
            log::warn!(
                "Clock is {} ms behind the active session's issue time; treating it as lapsed",
                session.issued_at - now
            );
            return None;
        }
        session.remaining_at(now)
    }
}
