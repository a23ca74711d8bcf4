//! Persistent store contract the engine relies on.
//!
//! Semantics are the design contract, not a schema; backends may lay the
//! data out however they like as long as these operations hold. The
//! store is the engine's only shared mutable resource, so every write
//! here must be atomic per document.

use async_trait::async_trait;

use countervalue_market_data::{Granularity, Pair};

use super::model::{
    ExchangeRecord, Histo, LiveRateUpdate, Meta, PairExchangeRecord, PairExchangeStats,
};
use crate::errors::Result;

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert-if-absent per id. Existing records keep their derived data.
    async fn insert_pair_exchange_data(&self, records: &[PairExchangeRecord]) -> Result<()>;

    /// Atomic per-id set of `latest` and `latestDate = now`; also
    /// refreshes `meta.lastLiveRatesSync`.
    async fn update_live_rates(&self, updates: &[LiveRateUpdate]) -> Result<()>;

    /// Replaces one granularity's histo wholesale.
    async fn update_histo(&self, id: &str, granularity: Granularity, histo: &Histo) -> Result<()>;

    /// Partial merge of the named statistic fields.
    async fn update_pair_exchange_stats(&self, id: &str, stats: &PairExchangeStats) -> Result<()>;

    /// Upsert by id.
    async fn update_exchanges(&self, exchanges: &[ExchangeRecord]) -> Result<()>;

    /// Upsert by day; also refreshes `meta.lastMarketCapSync`.
    async fn update_market_cap_coins(&self, day: &str, coins: &[String]) -> Result<()>;

    /// Records matching any of the pairs, sorted by
    /// (`hasHistoryFor1Year` desc, `yesterdayVolume` desc). With
    /// `filter_with_history`, only records with
    /// `hasHistoryFor30LastDays = true` are returned.
    async fn query_pair_exchanges_by_pairs(
        &self,
        pairs: &[Pair],
        filter_with_history: bool,
    ) -> Result<Vec<PairExchangeRecord>>;

    async fn query_pair_exchange_by_id(&self, id: &str) -> Result<Option<PairExchangeRecord>>;

    /// All ids, used by batch stats jobs.
    async fn query_pair_exchange_ids(&self) -> Result<Vec<String>>;

    /// All ids ordered by live activity: `latestDate` descending, pairs
    /// that never saw a live update last.
    async fn query_prefetch_candidates(&self) -> Result<Vec<String>>;

    async fn query_exchanges(&self) -> Result<Vec<ExchangeRecord>>;

    async fn query_market_cap_coins_for_day(&self, day: &str) -> Result<Option<Vec<String>>>;

    /// Fails when the pair-exchange collection is empty.
    async fn status(&self) -> Result<()>;

    /// Sync bookkeeping, zero-instant defaults when unset.
    async fn get_meta(&self) -> Result<Meta>;
}
