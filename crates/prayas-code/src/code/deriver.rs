//! Code derivation and verification.
//!
//! The derivation is the interoperability contract with the verifying
//! server and must not change:
//!
//! 1. canonical string = `lowercase(identity) ‖ phone ‖ secret ‖ window.label`
//!    with no separators;
//! 2. SHA-256 over its UTF-8 bytes;
//! 3. first four digest bytes read as a big-endian `u32`;
//! 4. `code = value % 90000 + 10000`.

use sha2::{Digest, Sha256};

use crate::code::config::WindowPolicy;
use crate::code::types::*;
use crate::code::window;

/// Number of distinct codes.
const CODE_SPAN: u32 = CODE_MAX - CODE_MIN + 1;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Derivation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Hash input for `profile` in `window`.
pub fn canonical_string(profile: &Profile, window: &TimeWindow) -> String {
    let identity = profile.identity.to_lowercase();
    let mut s = String::with_capacity(
        identity.len() + profile.phone.len() + profile.secret.len() + window.label.len(),
    );
    s.push_str(&identity);
    s.push_str(&profile.phone);
    s.push_str(&profile.secret);
    s.push_str(&window.label);
    s
}

/// Hex SHA-256 of the canonical string, for comparing against another
/// implementation when codes disagree.
pub fn digest_hex(profile: &Profile, window: &TimeWindow) -> String {
    hex::encode(Sha256::digest(canonical_string(profile, window).as_bytes()))
}

/// Derive the code for `profile` in `window`.
pub fn derive(profile: &Profile, window: &TimeWindow) -> DerivedCode {
    let digest = Sha256::digest(canonical_string(profile, window).as_bytes());
    let value = u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]);
    fold(value)
}

/// Reduce a 32-bit value into `CODE_MIN..=CODE_MAX`.
pub fn fold(value: u32) -> DerivedCode {
    DerivedCode::from_value(value % CODE_SPAN + CODE_MIN)
}

/// Quantize `at` and derive in one step.
pub fn derive_at(
    profile: &Profile,
    policy: &WindowPolicy,
    at: Timestamp,
) -> (TimeWindow, DerivedCode) {
    let window = window::quantize(policy, at);
    let code = derive(profile, &window);
    (window, code)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Verification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Verify a submitted code against the window containing `at`.
///
/// `drift_window` specifies how many windows to check on either side
/// (e.g. 1 checks ±1). The closest matching window wins.
pub fn verify_code(
    profile: &Profile,
    code: &str,
    policy: &WindowPolicy,
    at: Timestamp,
    drift_window: u32,
) -> VerifyResult {
    let miss = VerifyResult {
        valid: false,
        drift: 0,
        matched_window: None,
    };
    if DerivedCode::parse(code).is_none() {
        return miss;
    }

    // Nearest windows first: 0, -1, +1, -2, +2, ...
    let mut deltas = vec![0i64];
    for distance in 1..=drift_window as i64 {
        deltas.push(-distance);
        deltas.push(distance);
    }

    let base = window::quantize(policy, at);
    for delta in deltas {
        let candidate = window::neighbour(policy, &base, delta);
        let expected = derive(profile, &candidate);
        if constant_time_eq(expected.as_str().as_bytes(), code.as_bytes()) {
            return VerifyResult {
                valid: true,
                drift: delta,
                matched_window: Some(candidate.index),
            };
        }
    }
    miss
}

/// Constant-time comparison (to prevent timing attacks on code verification).
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
