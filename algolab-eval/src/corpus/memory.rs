//! In-memory corpus store

use super::{check_projection, CorpusPair, CorpusStore, PairFilter};
use crate::types::{ComputationStatus, Projection};
use algolab_common::{Error, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
struct StoredPair {
    pair: CorpusPair,
    projection: Projection,
}

/// Corpus kept in a map keyed by `pair_id`
#[derive(Default)]
pub struct InMemoryCorpusStore {
    pairs: RwLock<BTreeMap<i64, StoredPair>>,
}

impl InMemoryCorpusStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pairs(pairs: Vec<CorpusPair>) -> Self {
        let map = pairs
            .into_iter()
            .map(|pair| {
                (
                    pair.pair_id,
                    StoredPair {
                        pair,
                        projection: Projection::new(),
                    },
                )
            })
            .collect();
        Self {
            pairs: RwLock::new(map),
        }
    }

    pub async fn insert(&self, pair: CorpusPair) {
        self.pairs.write().await.insert(
            pair.pair_id,
            StoredPair {
                pair,
                projection: Projection::new(),
            },
        );
    }

    /// Everything written to a pair so far
    pub async fn projection(&self, pair_id: i64) -> Option<Projection> {
        self.pairs
            .read()
            .await
            .get(&pair_id)
            .map(|stored| stored.projection.clone())
    }
}

#[async_trait]
impl CorpusStore for InMemoryCorpusStore {
    async fn fetch_pairs(&self, filter: &PairFilter) -> Result<Vec<CorpusPair>> {
        let pairs = self.pairs.read().await;
        let matching = pairs
            .values()
            .filter(|stored| {
                filter
                    .call_id
                    .as_deref()
                    .map_or(true, |call| stored.pair.call_id == call)
            })
            .map(|stored| stored.pair.clone())
            .take(filter.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(matching)
    }

    async fn update_projection(&self, pair_id: i64, projection: &Projection) -> Result<()> {
        check_projection(projection)?;

        let mut pairs = self.pairs.write().await;
        let stored = pairs
            .get_mut(&pair_id)
            .ok_or_else(|| Error::NotFound(format!("Pair {}", pair_id)))?;

        for (column, value) in projection.iter() {
            stored.projection.insert(column, value.clone());
        }
        if let Some(status) = projection.get("computation_status").and_then(|v| v.as_str()) {
            stored.pair.computation_status = Some(status.to_string());
        }
        Ok(())
    }

    async fn mark_status(&self, pair_id: i64, status: ComputationStatus) -> Result<()> {
        let mut pairs = self.pairs.write().await;
        let stored = pairs
            .get_mut(&pair_id)
            .ok_or_else(|| Error::NotFound(format!("Pair {}", pair_id)))?;
        stored.pair.computation_status = Some(status.as_str().to_string());
        stored.projection.insert("computation_status", status.as_str());
        Ok(())
    }
}
