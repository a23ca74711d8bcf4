use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// A (from, to) ticker pair, used where the exchange does not matter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub from: String,
    pub to: String,
}

impl Pair {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }

    /// Index key used by the store for pair lookups.
    pub fn key(&self) -> String {
        format!("{}_{}", self.from, self.to)
    }
}

/// A specific exchange's offering of a specific (from -> to) trading pair.
///
/// The canonical id is `<EXCHANGE>_<FROM>_<TO>`. Tickers never contain an
/// underscore, so the id parses unambiguously from the right even when the
/// exchange id itself contains one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairExchange {
    pub exchange: String,
    pub from: String,
    pub to: String,
}

impl PairExchange {
    pub fn new(
        exchange: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    /// Canonical id, `<EXCHANGE>_<FROM>_<TO>`. The exchange id is kept verbatim.
    pub fn id(&self) -> String {
        format!("{}_{}_{}", self.exchange, self.from, self.to)
    }

    pub fn pair(&self) -> Pair {
        Pair::new(self.from.clone(), self.to.clone())
    }

    /// Parses a canonical id back into its parts.
    pub fn parse(id: &str) -> Result<Self, MarketDataError> {
        let mut parts = id.rsplitn(3, '_');
        let to = parts.next();
        let from = parts.next();
        let exchange = parts.next();
        match (exchange, from, to) {
            (Some(exchange), Some(from), Some(to))
                if !exchange.is_empty() && !from.is_empty() && !to.is_empty() =>
            {
                Ok(Self::new(exchange, from, to))
            }
            _ => Err(MarketDataError::Parsing(format!(
                "invalid pair exchange id '{id}'"
            ))),
        }
    }
}

impl fmt::Display for PairExchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.exchange, self.from, self.to)
    }
}
