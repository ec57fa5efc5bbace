// src/engine/time.rs

use std::sync::OnceLock;
use std::time::Instant;

/// A point on the monotonic host clock, counted in ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tick(pub u64);

impl Tick {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

/// Relates host ticks to seconds.
///
/// The tick-to-seconds ratio is resolved once per process and reused by every
/// conversion afterwards. Ticks are counted from the moment the time base was
/// first touched, so they always fit comfortably in a `u64`.
#[derive(Debug)]
pub struct TimeBase {
    epoch: Instant,
    seconds_per_tick: f64,
}

static TIME_BASE: OnceLock<TimeBase> = OnceLock::new();

impl TimeBase {
    /// Process-wide time base.
    pub fn global() -> &'static TimeBase {
        TIME_BASE.get_or_init(|| {
            let tb = TimeBase {
                epoch: Instant::now(),
                // std::time::Instant resolves to nanoseconds on every supported host
                seconds_per_tick: 1.0e-9,
            };
            log::debug!("⏱️ TimeBase ready: {:e} s/tick", tb.seconds_per_tick);
            tb
        })
    }

    /// Current host time.
    pub fn now() -> Tick {
        let tb = Self::global();
        Tick(tb.epoch.elapsed().as_nanos() as u64)
    }

    /// Absolute tick `offset_seconds` after `reference`.
    /// Negative offsets saturate at the reference itself.
    pub fn to_instant(reference: Tick, offset_seconds: f64) -> Tick {
        let ticks = Self::seconds_to_ticks(offset_seconds.max(0.0));
        Tick(reference.0.saturating_add(ticks))
    }

    pub fn seconds_to_ticks(seconds: f64) -> u64 {
        (seconds / Self::global().seconds_per_tick).round() as u64
    }

    pub fn ticks_to_seconds(ticks: u64) -> f64 {
        ticks as f64 * Self::global().seconds_per_tick
    }

    /// Seconds from `from` until `to`; zero if `to` is not in the future of `from`.
    pub fn seconds_between(from: Tick, to: Tick) -> f64 {
        Self::ticks_to_seconds(to.0.saturating_sub(from.0))
    }
}
