//! In-process vector index over current embeddings.
//!
//! The index holds, per tenant, the unit vectors of all active facts and
//! answers top-k cosine queries optionally filtered by project. Because
//! every stored vector is unit-normalised, cosine similarity reduces to a
//! dot product.
//!
//! The structure is an exhaustive scoped scan: exact top-k, no recall
//! knob, and predictable behaviour for corpora in the tens of thousands of
//! vectors this engine targets. Removal is soft (a tombstone) so readers
//! racing a deprecation never observe a half-compacted shard; shards
//! compact themselves once tombstones outnumber live entries.
//!
//! Concurrency: many readers, serialised writers, via one `RwLock`.
//! Updates become visible at or after the commit of the fact-store
//! mutation that triggered them.

use std::collections::HashMap;
use std::sync::RwLock;

use crate::types::FactId;

/// One scored search result.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SearchHit {
    pub fact_id: FactId,
    /// Cosine similarity in `[-1, 1]`.
    pub score: f32,
}

#[derive(Clone, Debug)]
struct Entry {
    fact_id: FactId,
    project: String,
    vector: Vec<f32>,
    deleted: bool,
}

#[derive(Default)]
struct Shard {
    entries: Vec<Entry>,
    by_id: HashMap<FactId, usize>,
    tombstones: usize,
}

impl Shard {
    fn insert(&mut self, fact_id: FactId, project: String, vector: Vec<f32>) {
        if let Some(&pos) = self.by_id.get(&fact_id) {
            let entry = &mut self.entries[pos];
            entry.project = project;
            entry.vector = vector;
            if entry.deleted {
                entry.deleted = false;
                self.tombstones -= 1;
            }
            return;
        }

        self.by_id.insert(fact_id, self.entries.len());
        self.entries.push(Entry {
            fact_id,
            project,
            vector,
            deleted: false,
        });
    }

    fn remove(&mut self, fact_id: FactId) -> bool {
        let Some(&pos) = self.by_id.get(&fact_id) else {
            return false;
        };
        let entry = &mut self.entries[pos];
        if entry.deleted {
            return false;
        }
        entry.deleted = true;
        self.tombstones += 1;
        true
    }

    fn live(&self) -> usize {
        self.entries.len() - self.tombstones
    }

    fn should_compact(&self) -> bool {
        self.tombstones > 0 && self.tombstones >= self.live()
    }

    fn compact(&mut self) {
        self.entries.retain(|e| !e.deleted);
        self.tombstones = 0;
        self.by_id = self
            .entries
            .iter()
            .enumerate()
            .map(|(i, e)| (e.fact_id, i))
            .collect();
    }
}

/// Scoped cosine index; see the module docs for the model.
pub struct VectorIndex {
    shards: RwLock<HashMap<String, Shard>>,
    dim: usize,
}

impl VectorIndex {
    /// Creates an empty index for vectors of `dim` dimensions.
    pub fn new(dim: usize) -> Self {
        Self {
            shards: RwLock::new(HashMap::new()),
            dim,
        }
    }

    /// Inserts or replaces the vector for a fact.
    ///
    /// Vectors with the wrong dimensionality or a non-positive norm are
    /// dropped with a warning rather than poisoning later searches.
    pub fn insert(&self, fact_id: FactId, tenant_id: &str, project: &str, mut vector: Vec<f32>) {
        if vector.len() != self.dim {
            tracing::warn!(
                %fact_id,
                got = vector.len(),
                expected = self.dim,
                "dropping embedding with wrong dimensionality"
            );
            return;
        }
        if !crate::embedding::normalize_in_place(&mut vector) {
            tracing::warn!(%fact_id, "dropping embedding with zero or non-finite norm");
            return;
        }

        let mut shards = self.shards.write().unwrap_or_else(|e| e.into_inner());
        shards
            .entry(tenant_id.to_string())
            .or_default()
            .insert(fact_id, project.to_string(), vector);
    }

    /// Soft-removes a fact's vector. Idempotent; unknown ids are ignored.
    pub fn remove(&self, fact_id: FactId) {
        let mut shards = self.shards.write().unwrap_or_else(|e| e.into_inner());
        for shard in shards.values_mut() {
            if shard.remove(fact_id) {
                if shard.should_compact() {
                    shard.compact();
                }
                return;
            }
        }
    }

    /// Exact top-k cosine search within a tenant, optionally narrowed to a
    /// project.
    ///
    /// Results come back in descending score order; equal scores break
    /// toward the larger (more recent) fact id. A zero-norm or
    /// wrong-dimension query yields no hits.
    pub fn search(
        &self,
        tenant_id: &str,
        project: Option<&str>,
        query: &[f32],
        k: usize,
    ) -> Vec<SearchHit> {
        if k == 0 || query.len() != self.dim {
            return Vec::new();
        }
        let norm_sq: f32 = query.iter().map(|v| v * v).sum();
        if !norm_sq.is_finite() || norm_sq <= 0.0 {
            return Vec::new();
        }

        let shards = self.shards.read().unwrap_or_else(|e| e.into_inner());
        let Some(shard) = shards.get(tenant_id) else {
            return Vec::new();
        };

        let mut hits: Vec<SearchHit> = shard
            .entries
            .iter()
            .filter(|e| !e.deleted)
            .filter(|e| project.is_none_or(|p| e.project == p))
            .map(|e| SearchHit {
                fact_id: e.fact_id,
                score: dot(query, &e.vector),
            })
            .filter(|hit| hit.score.is_finite())
            .collect();

        hits.sort_unstable_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| b.fact_id.cmp(&a.fact_id))
        });
        hits.truncate(k);
        hits
    }

    /// Number of live vectors across all tenants.
    pub fn len(&self) -> usize {
        let shards = self.shards.read().unwrap_or_else(|e| e.into_inner());
        shards.values().map(Shard::live).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
