//! Per-pair quality and freshness statistics derived from daily history.

use chrono::{DateTime, Duration, Utc};
use log::{debug, warn};

use countervalue_market_data::Granularity;

use crate::constants::MAX_RATIO;
use crate::store::{Histo, LATEST_KEY};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedStats {
    pub oldest_day_ago: i64,
    pub has_history_for_1_year: bool,
    pub has_history_for_30_last_days: bool,
}

/// Derives the history statistics for one pair from its daily histo.
///
/// Returns `None` when the histo holds no closed daily bucket; the
/// caller must then leave the record untouched.
///
/// The 30-day walk covers the closed buckets of `today-30 ..= today-2`,
/// day-aligned in UTC, counting buckets with a positive rate and adding
/// one for a `latest` value. The min/max ratio across those rates must
/// stay below [`MAX_RATIO`]; an extreme ratio is logged but never fails
/// the caller.
pub fn derive(histo_daily: &Histo, now: DateTime<Utc>, min_days: u32) -> Option<DerivedStats> {
    let mut oldest: Option<DateTime<Utc>> = None;
    for key in histo_daily.keys().filter(|k| k.as_str() != LATEST_KEY) {
        match Granularity::Daily.parse_key(key) {
            Ok(time) => {
                if oldest.map(|o| time < o).unwrap_or(true) {
                    oldest = Some(time);
                }
            }
            Err(e) => debug!("ignoring unparseable histo key '{key}': {e}"),
        }
    }
    let oldest = oldest?;
    let oldest_day_ago = (now - oldest).num_days();

    let mut history_count: u32 = 0;
    let mut min_rate: Option<f64> = None;
    let mut max_rate: Option<f64> = None;
    let mut track = |rate: f64| {
        min_rate = Some(min_rate.map_or(rate, |m| m.min(rate)));
        max_rate = Some(max_rate.map_or(rate, |m| m.max(rate)));
    };

    if let Some(latest) = histo_daily.get(LATEST_KEY) {
        history_count += 1;
        track(*latest);
    }
    let today = now.date_naive();
    for offset in 2..=30 {
        let key = (today - Duration::days(offset)).format("%Y-%m-%d").to_string();
        if let Some(rate) = histo_daily.get(&key) {
            if *rate > 0.0 {
                history_count += 1;
                track(*rate);
            }
        }
    }

    let ratio = match (min_rate, max_rate) {
        (Some(min), Some(max)) => max / min,
        _ => f64::NAN,
    };
    let invalid_ratio = !(ratio > 0.0) || !ratio.is_finite();
    if !invalid_ratio && ratio >= MAX_RATIO {
        warn!("extreme min/max rate ratio {ratio:.1} over the last 30 days");
    }

    Some(DerivedStats {
        oldest_day_ago,
        has_history_for_1_year: oldest_day_ago > 365,
        has_history_for_30_last_days: history_count >= min_days
            && !invalid_ratio
            && ratio < MAX_RATIO,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn daily_key(now: DateTime<Utc>, days_ago: i64) -> String {
        (now.date_naive() - Duration::days(days_ago))
            .format("%Y-%m-%d")
            .to_string()
    }

    fn full_recent_histo(now: DateTime<Utc>, rate: f64) -> Histo {
        let mut histo = Histo::new();
        for days_ago in 2..=30 {
            histo.insert(daily_key(now, days_ago), rate);
        }
        histo
    }

    #[test]
    fn empty_history_is_a_no_op() {
        assert!(derive(&Histo::new(), Utc::now(), 20).is_none());

        let mut only_latest = Histo::new();
        only_latest.insert(LATEST_KEY.to_string(), 1.0);
        assert!(derive(&only_latest, Utc::now(), 20).is_none());
    }

    #[test]
    fn a_full_stable_month_qualifies() {
        let now = Utc::now();
        let mut histo = full_recent_histo(now, 0.02);
        histo.insert(LATEST_KEY.to_string(), 0.021);

        let stats = derive(&histo, now, 20).unwrap();
        assert!(stats.has_history_for_30_last_days);
        assert!(!stats.has_history_for_1_year);
        assert_eq!(stats.oldest_day_ago, (now - Granularity::Daily.parse_key(&daily_key(now, 30)).unwrap()).num_days());
    }

    #[test]
    fn sparse_history_misses_the_minimum() {
        let now = Utc::now();
        let mut histo = Histo::new();
        for days_ago in [2, 5, 9, 14] {
            histo.insert(daily_key(now, days_ago), 0.02);
        }
        let stats = derive(&histo, now, 20).unwrap();
        assert!(!stats.has_history_for_30_last_days);
    }

    #[test]
    fn zero_rates_do_not_count() {
        let now = Utc::now();
        let histo = full_recent_histo(now, 0.0);
        let stats = derive(&histo, now, 20).unwrap();
        // All rates are zero: nothing counted, ratio undefined.
        assert!(!stats.has_history_for_30_last_days);
    }

    #[test]
    fn extreme_ratio_disqualifies_without_failing() {
        let now = Utc::now();
        let mut histo = full_recent_histo(now, 1.0);
        histo.insert(daily_key(now, 3), 2000.0);
        let stats = derive(&histo, now, 20).unwrap();
        assert!(!stats.has_history_for_30_last_days);
    }

    #[test]
    fn a_zero_latest_invalidates_the_ratio() {
        let now = Utc::now();
        let mut histo = full_recent_histo(now, 0.02);
        histo.insert(LATEST_KEY.to_string(), 0.0);
        let stats = derive(&histo, now, 20).unwrap();
        assert!(!stats.has_history_for_30_last_days);
    }

    #[test]
    fn year_flag_tracks_the_oldest_bucket() {
        let now = Utc::now();
        let mut histo = full_recent_histo(now, 0.02);
        histo.insert(daily_key(now, 400), 0.015);
        let stats = derive(&histo, now, 20).unwrap();
        assert!(stats.has_history_for_1_year);
        assert!(stats.oldest_day_ago >= 399);
    }

    #[test]
    fn oldest_day_ago_grows_with_history() {
        let now = Utc::now();
        let mut histo = full_recent_histo(now, 0.02);
        let shallow = derive(&histo, now, 20).unwrap();
        histo.insert(daily_key(now, 90), 0.019);
        let deeper = derive(&histo, now, 20).unwrap();
        assert!(deeper.oldest_day_ago >= shallow.oldest_day_ago);
    }
}
