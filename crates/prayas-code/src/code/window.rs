//! Time quantization.
//!
//! Maps an instant to the [`TimeWindow`] that feeds the derivation. Both
//! policies floor towards negative infinity, so the window index never
//! decreases as time moves forward and every instant of a window yields
//! the same label.

use chrono::{DateTime, FixedOffset, Offset, Utc};

use crate::code::config::WindowPolicy;
use crate::code::types::*;

/// Label format for offset-rounded windows.
pub const WINDOW_LABEL_FORMAT: &str = "%Y-%m-%d %H:%M";

const DAY_MS: i64 = 86_400_000;

/// Largest magnitude of an instant `quantize` works on.
const INSTANT_LIMIT: i64 = i64::MAX / 4;

/// Quantize `at` under `policy`.
pub fn quantize(policy: &WindowPolicy, at: Timestamp) -> TimeWindow {
    // Keeps the window arithmetic below clear of i64 overflow.
    let at = at.clamp(-INSTANT_LIMIT, INSTANT_LIMIT);
    match *policy {
        WindowPolicy::EpochMinutes => epoch_minutes(at),
        WindowPolicy::OffsetRounded {
            utc_offset_minutes,
            step_minutes,
        } => offset_rounded(at, utc_offset_minutes, step_minutes),
    }
}

/// The window `delta` steps away from `window` (negative = earlier).
pub fn neighbour(policy: &WindowPolicy, window: &TimeWindow, delta: i64) -> TimeWindow {
    quantize(policy, window.starts_at + delta * window.length_ms())
}

fn epoch_minutes(at: Timestamp) -> TimeWindow {
    let len = WindowPolicy::EpochMinutes.window_ms();
    let index = at.div_euclid(len);
    TimeWindow {
        index,
        label: index.to_string(),
        starts_at: index * len,
        ends_at: (index + 1) * len,
    }
}

fn offset_rounded(at: Timestamp, utc_offset_minutes: i32, step_minutes: u32) -> TimeWindow {
    // A zero step is rejected by config validation; clamp so a hand-built
    // policy cannot divide by zero.
    let len = step_minutes.max(1) as i64 * 60_000;
    let offset_ms = utc_offset_minutes as i64 * 60_000;
    let index = (at + offset_ms).div_euclid(len);
    let starts_at = index * len - offset_ms;

    let tz = FixedOffset::east_opt(utc_offset_minutes * 60).unwrap_or_else(|| Utc.fix());
    let label = calendar_instant(starts_at)
        .with_timezone(&tz)
        .format(WINDOW_LABEL_FORMAT)
        .to_string();

    TimeWindow {
        index,
        label,
        starts_at,
        ends_at: starts_at + len,
    }
}

/// `at` as a calendar date, clamped one day inside chrono's range so the
/// offset conversion cannot overflow.
fn calendar_instant(at: Timestamp) -> DateTime<Utc> {
    let lo = DateTime::<Utc>::MIN_UTC.timestamp_millis() + DAY_MS;
    let hi = DateTime::<Utc>::MAX_UTC.timestamp_millis() - DAY_MS;
    let clamped = at.clamp(lo, hi);
    if clamped != at {
        log::warn!(
            "Timestamp {} is outside the calendar range; labelling its window as {}",
            at,
            clamped
        );
    }
    // In range after the clamp.
    DateTime::<Utc>::from_timestamp_millis(clamped).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IST_5: WindowPolicy = WindowPolicy::OffsetRounded {
        utc_offset_minutes: 330,
        step_minutes: 5,
    };

    // 2025-07-08T18:40:00Z == 2025-07-09 00:10 IST
    const T0: Timestamp = 1_752_000_000_000;

    // ── Epoch minutes ────────────────────────────────────────────

    #[test]
    fn epoch_minutes_label_is_minute_count() {
        let w = quantize(&WindowPolicy::EpochMinutes, T0);
        assert_eq!(w.index, 29_200_000);
        assert_eq!(w.label, "29200000");
        assert_eq!(w.starts_at, T0);
        assert_eq!(w.ends_at, T0 + 60_000);
    }

    #[test]
    fn epoch_minutes_same_within_minute() {
        let a = quantize(&WindowPolicy::EpochMinutes, T0);
        let b = quantize(&WindowPolicy::EpochMinutes, T0 + 59_999);
        let c = quantize(&WindowPolicy::EpochMinutes, T0 + 60_000);
        assert_eq!(a, b);
        assert_eq!(c.index, a.index + 1);
    }

    #[test]
    fn epoch_minutes_before_epoch_floors() {
        let w = quantize(&WindowPolicy::EpochMinutes, -1);
        assert_eq!(w.index, -1);
        assert!(w.contains(-1));
    }

    // ── Offset rounded ───────────────────────────────────────────

    #[test]
    fn ist_label_matches_wall_clock() {
        let w = quantize(&IST_5, T0 + 123_456);
        assert_eq!(w.label, "2025-07-09 00:10");
        assert_eq!(w.starts_at, T0);
        assert_eq!(w.ends_at, T0 + 300_000);
    }

    #[test]
    fn ist_rounds_down_to_five_minutes() {
        let w = quantize(&IST_5, T0 + 299_999);
        assert_eq!(w.label, "2025-07-09 00:10");
        let next = quantize(&IST_5, T0 + 300_000);
        assert_eq!(next.label, "2025-07-09 00:15");
        assert_eq!(next.index, w.index + 1);
    }

    #[test]
    fn ist_crosses_date_line() {
        // 2025-07-08T18:29:59Z == 2025-07-08 23:59:59 IST
        let w = quantize(&IST_5, T0 - 600_001);
        assert_eq!(w.label, "2025-07-08 23:55");
    }

    #[test]
    fn utc_offset_zero() {
        let p = WindowPolicy::OffsetRounded {
            utc_offset_minutes: 0,
            step_minutes: 15,
        };
        assert_eq!(quantize(&p, T0).label, "2025-07-08 18:30");
    }

    #[test]
    fn non_aligned_offset_uses_local_boundaries() {
        // +05:45: local 00:25 at T0, so the 15-minute slot starts at 00:15 local.
        let p = WindowPolicy::OffsetRounded {
            utc_offset_minutes: 345,
            step_minutes: 15,
        };
        let w = quantize(&p, T0);
        assert_eq!(w.label, "2025-07-09 00:15");
        assert!(w.contains(T0));
    }

    #[test]
    fn quantize_is_monotonic() {
        let mut last = i64::MIN;
        for step in 0..2_000 {
            let at = T0 + step * 7_919;
            let idx = quantize(&IST_5, at).index;
            assert!(idx >= last);
            last = idx;
        }
    }

    #[test]
    fn every_instant_lies_in_its_window() {
        for step in 0..500 {
            let at = T0 + step * 12_345;
            assert!(quantize(&IST_5, at).contains(at));
            assert!(quantize(&WindowPolicy::EpochMinutes, at).contains(at));
        }
    }

    // ── Out-of-range instants ────────────────────────────────────

    #[test]
    fn far_future_label_is_clamped_not_epoch() {
        let far = quantize(&IST_5, 10_000_000_000_000_000);
        let farther = quantize(&IST_5, 20_000_000_000_000_000);
        assert!(!far.label.starts_with("1970"));
        assert_eq!(far.label, farther.label);
        assert!(far.index < farther.index);
    }

    #[test]
    fn extreme_instants_do_not_overflow() {
        for at in [i64::MAX, i64::MIN] {
            let w = quantize(&IST_5, at);
            assert!(w.starts_at <= w.ends_at);
            let m = quantize(&WindowPolicy::EpochMinutes, at);
            assert!(m.starts_at <= m.ends_at);
        }
    }

    // ── Neighbours ───────────────────────────────────────────────

    #[test]
    fn neighbour_steps_whole_windows() {
        let w = quantize(&IST_5, T0 + 1);
        let prev = neighbour(&IST_5, &w, -1);
        let next = neighbour(&IST_5, &w, 1);
        assert_eq!(prev.label, "2025-07-09 00:05");
        assert_eq!(next.label, "2025-07-09 00:15");
        assert_eq!(neighbour(&IST_5, &w, 0), w);
    }
}
