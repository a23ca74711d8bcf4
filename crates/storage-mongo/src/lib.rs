//! MongoDB implementation of the countervalue store contract.
//!
//! Four collections: `pairExchanges` (unique on `id`, indexed on
//! `from_to`), `exchanges`, `marketcap_coins` (unique on `day`) and the
//! `meta` singleton. Driver errors are folded into the storage-agnostic
//! core error types.

use async_trait::async_trait;
use chrono::Utc;
use futures::TryStreamExt;
use log::info;
use mongodb::bson::{doc, to_bson, to_document, Document};
use mongodb::error::ErrorKind;
use mongodb::options::{FindOptions, IndexOptions, InsertManyOptions, UpdateOptions};
use mongodb::{Client, Collection, Database, IndexModel};

use countervalue_core::errors::{DatabaseError, Error, Result};
use countervalue_core::store::{
    ExchangeRecord, Histo, LiveRateUpdate, MarketCapSnapshot, Meta, PairExchangeRecord,
    PairExchangeStats, Store, META_ID,
};
use countervalue_market_data::{Granularity, Pair};

const DEFAULT_DATABASE: &str = "ledger-countervalue";

const PAIR_EXCHANGES: &str = "pairExchanges";
const EXCHANGES: &str = "exchanges";
const MARKETCAP_COINS: &str = "marketcap_coins";
const META: &str = "meta";

pub struct MongoStore {
    db: Database,
    pair_exchanges: Collection<PairExchangeRecord>,
    exchanges: Collection<ExchangeRecord>,
    marketcap: Collection<MarketCapSnapshot>,
    meta: Collection<Meta>,
}

impl MongoStore {
    /// Connects and ensures the indexes the contract relies on.
    pub async fn connect(uri: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri)
            .await
            .map_err(|e| Error::Database(DatabaseError::ConnectionFailed(e.to_string())))?;
        let db = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));
        let store = Self {
            pair_exchanges: db.collection(PAIR_EXCHANGES),
            exchanges: db.collection(EXCHANGES),
            marketcap: db.collection(MARKETCAP_COINS),
            meta: db.collection(META),
            db,
        };
        store.ensure_indexes().await?;
        info!("connected to mongodb database '{}'", store.db.name());
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<()> {
        let unique = IndexOptions::builder().unique(true).build();
        self.pair_exchanges
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "id": 1 })
                    .options(unique.clone())
                    .build(),
                None,
            )
            .await
            .map_err(query_err)?;
        self.pair_exchanges
            .create_index(
                IndexModel::builder().keys(doc! { "from_to": 1 }).build(),
                None,
            )
            .await
            .map_err(query_err)?;
        self.marketcap
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "day": 1 })
                    .options(unique)
                    .build(),
                None,
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn touch_meta(&self, field: &str, now_ms: i64) -> Result<()> {
        self.meta
            .clone_with_type::<Document>()
            .update_one(
                doc! { "id": META_ID },
                doc! { "$set": { field: now_ms } },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await
            .map_err(query_err)?;
        Ok(())
    }
}

fn query_err(error: mongodb::error::Error) -> Error {
    Error::Database(DatabaseError::QueryFailed(error.to_string()))
}

fn bson_err(error: mongodb::bson::ser::Error) -> Error {
    Error::Database(DatabaseError::Internal(error.to_string()))
}

/// Insert-if-absent races are resolved by the unique index; an error
/// consisting solely of duplicate-key write failures means every record
/// already existed.
fn is_duplicate_key(error: &mongodb::error::Error) -> bool {
    match error.kind.as_ref() {
        ErrorKind::BulkWrite(failure) => failure
            .write_errors
            .as_ref()
            .map(|errors| errors.iter().all(|e| e.code == 11000))
            .unwrap_or(false),
        _ => false,
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn insert_pair_exchange_data(&self, records: &[PairExchangeRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }
        let options = InsertManyOptions::builder().ordered(false).build();
        match self.pair_exchanges.insert_many(records, options).await {
            Ok(_) => Ok(()),
            Err(e) if is_duplicate_key(&e) => Ok(()),
            Err(e) => Err(query_err(e)),
        }
    }

    async fn update_live_rates(&self, updates: &[LiveRateUpdate]) -> Result<()> {
        let now_ms = Utc::now().timestamp_millis();
        for update in updates {
            self.pair_exchanges
                .update_one(
                    doc! { "id": &update.id },
                    doc! { "$set": { "latest": update.rate, "latestDate": now_ms } },
                    None,
                )
                .await
                .map_err(query_err)?;
        }
        self.touch_meta("lastLiveRatesSync", now_ms).await
    }

    async fn update_histo(&self, id: &str, granularity: Granularity, histo: &Histo) -> Result<()> {
        let field = match granularity {
            Granularity::Daily => "histo_daily",
            Granularity::Hourly => "histo_hourly",
        };
        let histo = to_bson(histo).map_err(bson_err)?;
        self.pair_exchanges
            .update_one(doc! { "id": id }, doc! { "$set": { field: histo } }, None)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn update_pair_exchange_stats(&self, id: &str, stats: &PairExchangeStats) -> Result<()> {
        let mut set = Document::new();
        if let Some(v) = stats.yesterday_volume {
            set.insert("yesterdayVolume", v);
        }
        if let Some(v) = stats.oldest_day_ago {
            set.insert("oldestDayAgo", v);
        }
        if let Some(v) = stats.has_history_for_1_year {
            set.insert("hasHistoryFor1Year", v);
        }
        if let Some(v) = stats.has_history_for_30_last_days {
            set.insert("hasHistoryFor30LastDays", v);
        }
        if let Some(v) = stats.latest_date {
            set.insert("latestDate", v);
        }
        if let Some(v) = &stats.history_loaded_at_daily {
            set.insert("historyLoadedAt_daily", v.as_str());
        }
        if let Some(v) = &stats.history_loaded_at_hourly {
            set.insert("historyLoadedAt_hourly", v.as_str());
        }
        if set.is_empty() {
            return Ok(());
        }
        self.pair_exchanges
            .update_one(doc! { "id": id }, doc! { "$set": set }, None)
            .await
            .map_err(query_err)?;
        Ok(())
    }

    async fn update_exchanges(&self, exchanges: &[ExchangeRecord]) -> Result<()> {
        for exchange in exchanges {
            let document = to_document(exchange).map_err(bson_err)?;
            self.exchanges
                .update_one(
                    doc! { "id": &exchange.id },
                    doc! { "$set": document },
                    UpdateOptions::builder().upsert(true).build(),
                )
                .await
                .map_err(query_err)?;
        }
        Ok(())
    }

    async fn update_market_cap_coins(&self, day: &str, coins: &[String]) -> Result<()> {
        self.marketcap
            .clone_with_type::<Document>()
            .update_one(
                doc! { "day": day },
                doc! { "$set": { "day": day, "coins": coins.to_vec() } },
                UpdateOptions::builder().upsert(true).build(),
            )
            .await
            .map_err(query_err)?;
        self.touch_meta("lastMarketCapSync", Utc::now().timestamp_millis())
            .await
    }

    async fn query_pair_exchanges_by_pairs(
        &self,
        pairs: &[Pair],
        filter_with_history: bool,
    ) -> Result<Vec<PairExchangeRecord>> {
        let keys: Vec<String> = pairs.iter().map(Pair::key).collect();
        let mut filter = doc! { "from_to": { "$in": keys } };
        if filter_with_history {
            filter.insert("hasHistoryFor30LastDays", true);
        }
        let options = FindOptions::builder()
            .sort(doc! { "hasHistoryFor1Year": -1, "yesterdayVolume": -1 })
            .build();
        let cursor = self
            .pair_exchanges
            .find(filter, options)
            .await
            .map_err(query_err)?;
        cursor.try_collect().await.map_err(query_err)
    }

    async fn query_pair_exchange_by_id(&self, id: &str) -> Result<Option<PairExchangeRecord>> {
        self.pair_exchanges
            .find_one(doc! { "id": id }, None)
            .await
            .map_err(query_err)
    }

    async fn query_pair_exchange_ids(&self) -> Result<Vec<String>> {
        let options = FindOptions::builder().projection(doc! { "id": 1 }).build();
        let cursor = self
            .db
            .collection::<Document>(PAIR_EXCHANGES)
            .find(None, options)
            .await
            .map_err(query_err)?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(query_err)?;
        Ok(documents
            .iter()
            .filter_map(|d| d.get_str("id").ok().map(str::to_string))
            .collect())
    }

    async fn query_prefetch_candidates(&self) -> Result<Vec<String>> {
        // Descending sort puts documents without a latestDate last.
        let options = FindOptions::builder()
            .projection(doc! { "id": 1, "latestDate": 1 })
            .sort(doc! { "latestDate": -1 })
            .build();
        let cursor = self
            .db
            .collection::<Document>(PAIR_EXCHANGES)
            .find(None, options)
            .await
            .map_err(query_err)?;
        let documents: Vec<Document> = cursor.try_collect().await.map_err(query_err)?;
        Ok(documents
            .iter()
            .filter_map(|d| d.get_str("id").ok().map(str::to_string))
            .collect())
    }

    async fn query_exchanges(&self) -> Result<Vec<ExchangeRecord>> {
        let cursor = self.exchanges.find(None, None).await.map_err(query_err)?;
        cursor.try_collect().await.map_err(query_err)
    }

    async fn query_market_cap_coins_for_day(&self, day: &str) -> Result<Option<Vec<String>>> {
        let snapshot = self
            .marketcap
            .find_one(doc! { "day": day }, None)
            .await
            .map_err(query_err)?;
        Ok(snapshot.map(|s| s.coins))
    }

    async fn status(&self) -> Result<()> {
        let count = self
            .pair_exchanges
            .estimated_document_count(None)
            .await
            .map_err(query_err)?;
        if count == 0 {
            return Err(DatabaseError::NotFound(
                "pairExchanges collection is empty".to_string(),
            )
            .into());
        }
        Ok(())
    }

    async fn get_meta(&self) -> Result<Meta> {
        let meta = self
            .meta
            .find_one(doc! { "id": META_ID }, None)
            .await
            .map_err(query_err)?;
        Ok(meta.unwrap_or_default())
    }
}
