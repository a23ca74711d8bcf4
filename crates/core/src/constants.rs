//! Engine-wide refresh cadences and thresholds.

use std::time::Duration;

/// Throttle window of the available pair-exchanges refresh.
pub const AVAILABLE_PAIRS_REFRESH_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Throttle window of the exchanges-list refresh.
pub const EXCHANGES_REFRESH_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Throttle window of the per-(pair, granularity) histo refresh.
pub const HISTO_REFRESH_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Throttle window of the market-cap refresh; the daily gate sits inside.
pub const MARKETCAP_REFRESH_WINDOW: Duration = Duration::from_secs(60);

/// Time window over which live price updates are buffered per batch.
pub const LIVE_RATES_BUFFER: Duration = Duration::from_secs(1);

/// Live pipeline restart delay after an error.
pub const RESTART_AFTER_ERROR: Duration = Duration::from_secs(60);

/// Live pipeline restart delay after a natural completion.
pub const RESTART_AFTER_COMPLETE: Duration = Duration::from_secs(30);

/// Forced recycle of the live subscription after this much uptime.
pub const AUTO_REBOOT_AFTER: Duration = Duration::from_secs(4 * 60 * 60);

/// Pause between unsubscribing and relaunching on a forced recycle.
pub const REBOOT_PAUSE: Duration = Duration::from_secs(10);

/// Period of the background prefetch job.
pub const PREFETCH_PERIOD: Duration = Duration::from_secs(4 * 60 * 60);

/// A 30-day min/max rate ratio at or above this marks the history as
/// unusable for candidate selection.
pub const MAX_RATIO: f64 = 1000.0;

/// Default for `MINIMAL_DAYS_TO_CONSIDER_EXCHANGE`.
pub const DEFAULT_MIN_DAYS: u32 = 20;

/// Upper clamp for `MINIMAL_DAYS_TO_CONSIDER_EXCHANGE`.
pub const MIN_DAYS_CAP: u32 = 30;

/// Live rates are reported unhealthy past this staleness.
pub const LIVE_RATES_STALENESS: Duration = Duration::from_secs(5 * 60);

/// The market-cap snapshot is reported unhealthy past this staleness.
pub const MARKETCAP_STALENESS: Duration = Duration::from_secs(25 * 60 * 60);
