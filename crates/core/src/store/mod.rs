//! Store contract and the in-memory reference backend.

mod memory;
mod model;
mod traits;

pub use memory::MemoryStore;
pub use model::{
    ExchangeRecord, Histo, LiveRateUpdate, MarketCapSnapshot, Meta, PairExchangeRecord,
    PairExchangeStats, LATEST_KEY, META_ID,
};
pub use traits::Store;
