//! Tauri command bindings for the verification code crate.
//!
//! Thin wrappers that take `State<CodeServiceState>`, lock the mutex,
//! and delegate to the service.  Every command returns `Result<T, String>`.

use crate::code::service::{format_remaining, CodeServiceState};
use crate::code::types::*;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Profile
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tauri::command]
pub async fn code_enroll(
    state: tauri::State<'_, CodeServiceState>,
    username: String,
    identity: String,
    phone: String,
    secret: String,
) -> Result<(), String> {
    let profile = Profile::new(identity, phone, secret).with_username(username);
    let mut svc = state.lock().await;
    svc.enroll(profile).map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn code_get_profile(
    state: tauri::State<'_, CodeServiceState>,
) -> Result<Profile, String> {
    let svc = state.lock().await;
    svc.profile().map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn code_reset(state: tauri::State<'_, CodeServiceState>) -> Result<(), String> {
    let mut svc = state.lock().await;
    svc.reset().map_err(|e| e.to_string())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Codes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[tauri::command]
pub async fn code_generate(
    state: tauri::State<'_, CodeServiceState>,
) -> Result<IssuedCode, String> {
    let mut svc = state.lock().await;
    svc.generate().map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn code_status(
    state: tauri::State<'_, CodeServiceState>,
) -> Result<CodeStatus, String> {
    let svc = state.lock().await;
    svc.status().map_err(|e| e.to_string())
}

/// Remaining cooldown in milliseconds, `None` when a new code may be requested.
#[tauri::command]
pub async fn code_remaining_cooldown(
    state: tauri::State<'_, CodeServiceState>,
) -> Result<Option<u64>, String> {
    let svc = state.lock().await;
    Ok(svc.remaining_cooldown().map(|d| d.as_millis() as u64))
}

#[tauri::command]
pub async fn code_verify(
    state: tauri::State<'_, CodeServiceState>,
    code: String,
    drift_window: Option<u32>,
) -> Result<VerifyResult, String> {
    let svc = state.lock().await;
    svc.verify(&code, drift_window.unwrap_or(1))
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn code_format_remaining(secs: u64) -> String {
    format_remaining(secs)
}
