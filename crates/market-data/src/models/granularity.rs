use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Time-bucket granularity for historical series.
///
/// Bucket keys are locale-independent, zero-padded UTC formats. The two
/// formats stay distinguishable so a serialised key always identifies its
/// granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Hourly,
}

impl Granularity {
    pub const ALL: [Granularity; 2] = [Granularity::Daily, Granularity::Hourly];

    /// Width of one bucket in milliseconds.
    pub fn bucket_ms(self) -> i64 {
        match self {
            Granularity::Daily => 86_400_000,
            Granularity::Hourly => 3_600_000,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Granularity::Daily => "daily",
            Granularity::Hourly => "hourly",
        }
    }

    /// Formats the bucket key containing the given instant.
    pub fn format_key(self, time: DateTime<Utc>) -> String {
        match self {
            Granularity::Daily => time.format("%Y-%m-%d").to_string(),
            Granularity::Hourly => time.format("%Y-%m-%dT%H").to_string(),
        }
    }

    /// Parses a bucket key back to the instant at which the bucket opens.
    ///
    /// Hourly keys carry no minutes; `:00` is appended so the instant is
    /// recovered unambiguously.
    pub fn parse_key(self, key: &str) -> Result<DateTime<Utc>, MarketDataError> {
        let naive: NaiveDateTime = match self {
            Granularity::Daily => NaiveDate::parse_from_str(key, "%Y-%m-%d")
                .map_err(|e| MarketDataError::Parsing(format!("invalid daily key '{key}': {e}")))?
                .and_hms_opt(0, 0, 0)
                .expect("midnight is always a valid time"),
            Granularity::Hourly => {
                NaiveDateTime::parse_from_str(&format!("{key}:00"), "%Y-%m-%dT%H:%M").map_err(
                    |e| MarketDataError::Parsing(format!("invalid hourly key '{key}': {e}")),
                )?
            }
        };
        Ok(Utc.from_utc_datetime(&naive))
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Granularity {
    type Err = MarketDataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(Granularity::Daily),
            "hourly" => Ok(Granularity::Hourly),
            other => Err(MarketDataError::Parsing(format!(
                "unknown granularity '{other}'"
            ))),
        }
    }
}
