//! Registry of known tickers and their decimal magnitudes.
//!
//! The magnitude is the decimal exponent mapping one raw unit of a
//! currency to its smallest indivisible unit (satoshi, wei, cent). Every
//! rate the engine persists is expressed in destination smallest units
//! per source smallest unit, so the registry is the single source of
//! truth for those conversions.
//!
//! The registry is immutable after initialisation. Callers are expected
//! to pre-filter with [`is_supported`] before querying magnitudes.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use crate::errors::MarketDataError;

/// Crypto coins and tokens, in market-rank order. The order is exposed
/// through [`crypto_tickers`] and drives the `/tickers` listing.
const CRYPTO_CURRENCIES: &[(&str, i32)] = &[
    ("BTC", 8),
    ("ETH", 18),
    ("USDT", 6),
    ("BNB", 18),
    ("XRP", 6),
    ("USDC", 6),
    ("SOL", 9),
    ("ADA", 6),
    ("DOGE", 8),
    ("TRX", 6),
    ("DOT", 10),
    ("LTC", 8),
    ("BCH", 8),
    ("LINK", 18),
    ("XLM", 7),
    ("AVAX", 9),
    ("UNI", 18),
    ("ATOM", 6),
    ("XMR", 12),
    ("ETC", 18),
    ("NEAR", 24),
    ("ALGO", 6),
    ("XTZ", 6),
    ("FIL", 18),
    ("AAVE", 18),
    ("EOS", 4),
    ("MKR", 18),
    ("ICP", 8),
    ("HBAR", 8),
    ("VET", 18),
    ("SAND", 18),
    ("MANA", 18),
    ("THETA", 18),
    ("EGLD", 18),
    ("FTM", 18),
    ("SHIB", 18),
    ("COMP", 18),
    ("DASH", 8),
    ("ZEC", 8),
    ("KSM", 12),
    ("ZIL", 12),
    ("WAVES", 8),
    ("CHZ", 18),
    ("ENJ", 18),
    ("BAT", 18),
    ("CRV", 18),
    ("SNX", 18),
    ("SUSHI", 18),
    ("YFI", 18),
    ("GRT", 18),
    ("1INCH", 18),
    ("LRC", 18),
    ("KNC", 18),
    ("ZRX", 18),
    ("OMG", 18),
    ("QTUM", 8),
    ("DCR", 8),
    ("DGB", 8),
    ("RVN", 8),
    ("KAVA", 6),
    ("CELO", 18),
    ("ANKR", 18),
    ("STORJ", 8),
    ("ONE", 18),
    ("XEM", 6),
];

/// Fiat currencies with their ISO 4217 minor-unit exponents.
const FIAT_CURRENCIES: &[(&str, i32)] = &[
    ("USD", 2),
    ("EUR", 2),
    ("GBP", 2),
    ("JPY", 0),
    ("CHF", 2),
    ("CAD", 2),
    ("AUD", 2),
    ("NZD", 2),
    ("CNY", 2),
    ("HKD", 2),
    ("SGD", 2),
    ("KRW", 0),
    ("INR", 2),
    ("RUB", 2),
    ("BRL", 2),
    ("MXN", 2),
    ("SEK", 2),
    ("NOK", 2),
    ("DKK", 2),
    ("PLN", 2),
    ("CZK", 2),
    ("HUF", 2),
    ("TRY", 2),
    ("ZAR", 2),
    ("ILS", 2),
    ("AED", 2),
    ("THB", 2),
    ("PHP", 2),
    ("IDR", 2),
    ("MYR", 2),
    ("VND", 0),
    ("UAH", 2),
];

static MAGNITUDES: OnceLock<HashMap<&'static str, i32>> = OnceLock::new();
static CRYPTO_SET: OnceLock<HashSet<&'static str>> = OnceLock::new();

fn magnitudes() -> &'static HashMap<&'static str, i32> {
    MAGNITUDES.get_or_init(|| {
        let mut map = HashMap::with_capacity(CRYPTO_CURRENCIES.len() + FIAT_CURRENCIES.len());
        for (ticker, magnitude) in CRYPTO_CURRENCIES.iter().chain(FIAT_CURRENCIES.iter()) {
            map.insert(*ticker, *magnitude);
        }
        map
    })
}

fn crypto_set() -> &'static HashSet<&'static str> {
    CRYPTO_SET.get_or_init(|| CRYPTO_CURRENCIES.iter().map(|(ticker, _)| *ticker).collect())
}

/// Returns the decimal magnitude of a ticker, or `UnknownTicker`.
pub fn magnitude(ticker: &str) -> Result<i32, MarketDataError> {
    magnitudes()
        .get(ticker)
        .copied()
        .ok_or_else(|| MarketDataError::UnknownTicker(ticker.to_string()))
}

/// Whether the ticker is present in the registry.
pub fn is_supported(ticker: &str) -> bool {
    magnitudes().contains_key(ticker)
}

/// Whether the ticker is a known crypto coin or token.
pub fn is_crypto(ticker: &str) -> bool {
    crypto_set().contains(ticker)
}

/// Converts a raw observed rate into destination smallest units per
/// source smallest unit: `raw * 10^(magnitude(to) - magnitude(from))`.
pub fn to_cent_sat_rate(from: &str, to: &str, raw: f64) -> Result<f64, MarketDataError> {
    let exponent = magnitude(to)? - magnitude(from)?;
    Ok(raw * 10f64.powi(exponent))
}

/// Known crypto tickers in market-rank order.
pub fn crypto_tickers() -> Vec<&'static str> {
    CRYPTO_CURRENCIES.iter().map(|(t, _)| *t).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn magnitudes_are_known_for_major_tickers() {
        assert_eq!(magnitude("BTC").unwrap(), 8);
        assert_eq!(magnitude("ETH").unwrap(), 18);
        assert_eq!(magnitude("USD").unwrap(), 2);
        assert_eq!(magnitude("JPY").unwrap(), 0);
    }

    #[test]
    fn unknown_tickers_are_rejected() {
        assert!(!is_supported("NOPE"));
        assert!(matches!(
            magnitude("NOPE"),
            Err(MarketDataError::UnknownTicker(t)) if t == "NOPE"
        ));
    }

    #[test]
    fn cent_sat_conversion_applies_magnitude_difference() {
        // BTC (mag 8) -> USD (mag 2): raw close scaled by 10^(2-8).
        let rate = to_cent_sat_rate("BTC", "USD", 23456.78).unwrap();
        assert!((rate - 0.02345678).abs() < 1e-12);

        // Same-magnitude conversion is the identity.
        let rate = to_cent_sat_rate("BTC", "LTC", 120.5).unwrap();
        assert!((rate - 120.5).abs() < 1e-12);
    }

    #[test]
    fn crypto_tickers_keep_rank_order() {
        let tickers = crypto_tickers();
        assert_eq!(tickers[0], "BTC");
        assert_eq!(tickers[1], "ETH");
        assert!(tickers.contains(&"DOGE"));
        assert!(!tickers.contains(&"USD"));
    }
}
