//! Domain value types shared by providers and the cache engine.

mod granularity;
mod pair;
mod quote;

pub use granularity::Granularity;
pub use pair::{Pair, PairExchange};
pub use quote::{ExchangeInfo, OhlcvPoint, PriceUpdate};
