//! # Prayas – Verification Code Generator
//!
//! Deterministic, time-windowed verification codes shared between the
//! Prayas app and its verifying server:
//!
//! - **Derivation** – SHA-256 over `identity ‖ phone ‖ secret ‖ window`,
//!   folded into a 5-digit code in `10000..=99999`
//! - **Windows** – per-minute epoch counter or IST 5-minute wall-clock slots
//! - **Lifecycle** – one active code at a time, cooldown until expiry,
//!   expiry persisted so it survives restarts
//! - **Profile Store** – in-memory and JSON-file backends behind one trait
//! - **Verification** – server-side check with an adjacent-window drift allowance
//! - **Tauri Commands** – optional command surface (feature `commands`)

pub mod code;
