//! Persisted entities of the countervalue cache.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use countervalue_market_data::{ExchangeInfo, Granularity, PairExchange};

/// Reserved histo key for the currently open, not-yet-closed bucket.
pub const LATEST_KEY: &str = "latest";

/// Singleton id of the meta document.
pub const META_ID: &str = "meta_1";

/// Bucket-key to centSat rate mapping for one granularity.
pub type Histo = HashMap<String, f64>;

/// One persisted document per pair-exchange id.
///
/// Histo refresh, stats updates and live-rate writes touch disjoint
/// fields of this record; readers may observe any mix of freshness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairExchangeRecord {
    pub id: String,
    pub exchange: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "from_to")]
    pub from_to: String,
    #[serde(rename = "histo_daily", default)]
    pub histo_daily: Histo,
    #[serde(rename = "histo_hourly", default)]
    pub histo_hourly: Histo,
    /// Live rate, written by the live pipeline. 0 until first update.
    #[serde(default)]
    pub latest: f64,
    /// Unix milliseconds of the last live update.
    #[serde(default)]
    pub latest_date: Option<i64>,
    #[serde(default)]
    pub yesterday_volume: f64,
    /// Age in days of the oldest available daily datapoint.
    #[serde(default)]
    pub oldest_day_ago: i64,
    #[serde(rename = "hasHistoryFor1Year", default)]
    pub has_history_for_1_year: bool,
    #[serde(rename = "hasHistoryFor30LastDays", default = "default_true")]
    pub has_history_for_30_last_days: bool,
    /// Bucket key of the last completed daily refresh, null if never.
    #[serde(rename = "historyLoadedAt_daily", default)]
    pub history_loaded_at_daily: Option<String>,
    #[serde(rename = "historyLoadedAt_hourly", default)]
    pub history_loaded_at_hourly: Option<String>,
}

fn default_true() -> bool {
    true
}

impl PairExchangeRecord {
    /// Fresh default record for a newly discovered pair exchange.
    /// Optimistic on the 30-day flag so the pair is eligible until its
    /// first stats run says otherwise.
    pub fn from_pair_exchange(pair_exchange: &PairExchange) -> Self {
        Self {
            id: pair_exchange.id(),
            exchange: pair_exchange.exchange.clone(),
            from: pair_exchange.from.clone(),
            to: pair_exchange.to.clone(),
            from_to: format!("{}_{}", pair_exchange.from, pair_exchange.to),
            histo_daily: Histo::new(),
            histo_hourly: Histo::new(),
            latest: 0.0,
            latest_date: None,
            yesterday_volume: 0.0,
            oldest_day_ago: 0,
            has_history_for_1_year: false,
            has_history_for_30_last_days: true,
            history_loaded_at_daily: None,
            history_loaded_at_hourly: None,
        }
    }

    pub fn histo(&self, granularity: Granularity) -> &Histo {
        match granularity {
            Granularity::Daily => &self.histo_daily,
            Granularity::Hourly => &self.histo_hourly,
        }
    }

    pub fn history_loaded_at(&self, granularity: Granularity) -> Option<&str> {
        match granularity {
            Granularity::Daily => self.history_loaded_at_daily.as_deref(),
            Granularity::Hourly => self.history_loaded_at_hourly.as_deref(),
        }
    }
}

/// Partial update of the derived statistic fields. Writers only set the
/// fields they computed; `None` fields are left untouched by the store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PairExchangeStats {
    pub yesterday_volume: Option<f64>,
    pub oldest_day_ago: Option<i64>,
    pub has_history_for_1_year: Option<bool>,
    pub has_history_for_30_last_days: Option<bool>,
    pub latest_date: Option<i64>,
    pub history_loaded_at_daily: Option<String>,
    pub history_loaded_at_hourly: Option<String>,
}

impl PairExchangeStats {
    pub fn is_empty(&self) -> bool {
        self.yesterday_volume.is_none()
            && self.oldest_day_ago.is_none()
            && self.has_history_for_1_year.is_none()
            && self.has_history_for_30_last_days.is_none()
            && self.latest_date.is_none()
            && self.history_loaded_at_daily.is_none()
            && self.history_loaded_at_hourly.is_none()
    }

    /// Merges the set fields into a record.
    pub fn apply(&self, record: &mut PairExchangeRecord) {
        if let Some(v) = self.yesterday_volume {
            record.yesterday_volume = v;
        }
        if let Some(v) = self.oldest_day_ago {
            record.oldest_day_ago = v;
        }
        if let Some(v) = self.has_history_for_1_year {
            record.has_history_for_1_year = v;
        }
        if let Some(v) = self.has_history_for_30_last_days {
            record.has_history_for_30_last_days = v;
        }
        if let Some(v) = self.latest_date {
            record.latest_date = Some(v);
        }
        if let Some(v) = &self.history_loaded_at_daily {
            record.history_loaded_at_daily = Some(v.clone());
        }
        if let Some(v) = &self.history_loaded_at_hourly {
            record.history_loaded_at_hourly = Some(v.clone());
        }
    }
}

/// One live-rate write, already converted to centSat units.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveRateUpdate {
    pub id: String,
    pub rate: f64,
}

/// Persisted exchange metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl From<ExchangeInfo> for ExchangeRecord {
    fn from(info: ExchangeInfo) -> Self {
        Self {
            id: info.id,
            name: info.name,
            website: info.website,
        }
    }
}

/// Daily crypto ranking snapshot, keyed by `YYYY-MM-DD`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCapSnapshot {
    pub day: String,
    pub coins: Vec<String>,
}

/// Singleton sync bookkeeping, zero instants when unset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Meta {
    #[serde(rename = "lastLiveRatesSync", default)]
    pub last_live_rates_sync: i64,
    #[serde(rename = "lastMarketCapSync", default)]
    pub last_market_cap_sync: i64,
}
