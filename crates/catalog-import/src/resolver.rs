//! Last-occurrence-wins SKU deduplication
//!
//! The counting pass records, for every normalized SKU, the row number of its
//! last occurrence. During the import pass a record is queued for upsert only
//! at that row, so each SKU reaches the store exactly once and carries the
//! fields of its final row. Memory is bounded by the number of distinct SKUs
//! (keys only) plus one pending batch of records.

use crate::error::{ImportError, Result};
use crate::validator::normalize_sku;
use catalog_common::types::ProductRecord;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct SkuSlot {
    last_row: u64,
    seen: bool,
}

/// Normalized SKU to last-occurrence index, built by the counting pass.
#[derive(Debug, Default)]
pub struct SkuIndex {
    slots: HashMap<String, SkuSlot>,
}

impl SkuIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note an occurrence of `raw_sku` at `row_number`. Blank SKUs are ignored.
    pub fn observe(&mut self, raw_sku: &str, row_number: u64) {
        let sku = normalize_sku(raw_sku);
        if sku.is_empty() {
            return;
        }
        self.slots
            .entry(sku)
            .and_modify(|slot| slot.last_row = row_number)
            .or_insert(SkuSlot {
                last_row: row_number,
                seen: false,
            });
    }

    pub fn distinct(&self) -> usize {
        self.slots.len()
    }

    pub fn last_occurrence(&self, sku: &str) -> Option<u64> {
        self.slots.get(sku).map(|slot| slot.last_row)
    }
}

/// How a valid row should be counted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A repeat of a SKU already seen in this file.
    Duplicate,
    /// The only occurrence. Counted from the upsert outcome once flushed.
    Deferred,
    /// First of several occurrences. Counted from whether the SKU existed
    /// before this job.
    Probe,
}

#[derive(Debug, Clone)]
pub struct PendingUpsert {
    pub record: ProductRecord,
    /// Whether the upsert outcome decides how this row is counted.
    pub counts_row: bool,
}

pub struct Resolver {
    index: SkuIndex,
    pending: Vec<PendingUpsert>,
    batch_size: usize,
}

impl Resolver {
    pub fn new(index: SkuIndex, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            index,
            pending: Vec::with_capacity(batch_size),
            batch_size,
        }
    }

    pub fn distinct_skus(&self) -> usize {
        self.index.distinct()
    }

    /// Classify a validated row, queueing it for upsert if it is the last
    /// occurrence of its SKU.
    pub fn resolve(&mut self, row_number: u64, record: ProductRecord) -> Result<Resolution> {
        let slot = self
            .index
            .slots
            .get_mut(&record.sku)
            .ok_or(ImportError::FileChanged)?;

        let first = !slot.seen;
        slot.seen = true;
        let is_last = slot.last_row == row_number;

        let resolution = match (first, is_last) {
            (false, _) => Resolution::Duplicate,
            (true, true) => Resolution::Deferred,
            (true, false) => Resolution::Probe,
        };

        if is_last {
            self.pending.push(PendingUpsert {
                record,
                counts_row: resolution == Resolution::Deferred,
            });
        }

        Ok(resolution)
    }

    pub fn batch_ready(&self) -> bool {
        self.pending.len() >= self.batch_size
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn take_batch(&mut self) -> Vec<PendingUpsert> {
        std::mem::replace(&mut self.pending, Vec::with_capacity(self.batch_size))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn index(skus: &[&str]) -> SkuIndex {
        let mut index = SkuIndex::new();
        for (i, sku) in skus.iter().enumerate() {
            index.observe(sku, i as u64 + 1);
        }
        index
    }

    fn record(sku: &str, name: &str) -> ProductRecord {
        ProductRecord::new(sku, name)
    }

    #[test]
    fn test_index_tracks_last_occurrence_case_insensitively() {
        let index = index(&["SKU-001", "b", "sku-001", "", "c"]);
        assert_eq!(index.distinct(), 3);
        assert_eq!(index.last_occurrence("sku-001"), Some(3));
        assert_eq!(index.last_occurrence("b"), Some(2));
        assert_eq!(index.last_occurrence(""), None);
    }

    #[test]
    fn test_last_occurrence_wins() {
        let mut resolver = Resolver::new(index(&["a", "b", "A"]), 10);

        assert_eq!(resolver.resolve(1, record("a", "first")).unwrap(), Resolution::Probe);
        assert_eq!(resolver.resolve(2, record("b", "only")).unwrap(), Resolution::Deferred);
        assert_eq!(resolver.resolve(3, record("a", "second")).unwrap(), Resolution::Duplicate);

        let batch = resolver.take_batch();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].record.name, "only");
        assert!(batch[0].counts_row);
        assert_eq!(batch[1].record.name, "second");
        assert!(!batch[1].counts_row);
        assert!(!resolver.has_pending());
    }

    #[test]
    fn test_one_upsert_per_sku() {
        let skus = ["x", "y", "x", "x", "y", "z"];
        let mut resolver = Resolver::new(index(&skus), 100);
        for (i, sku) in skus.iter().enumerate() {
            resolver.resolve(i as u64 + 1, record(sku, sku)).unwrap();
        }
        let batch = resolver.take_batch();
        let mut queued: Vec<_> = batch.iter().map(|p| p.record.sku.as_str()).collect();
        queued.sort();
        assert_eq!(queued, vec!["x", "y", "z"]);
    }

    #[test]
    fn test_batch_ready_at_batch_size() {
        let mut resolver = Resolver::new(index(&["a", "b", "c"]), 2);
        resolver.resolve(1, record("a", "a")).unwrap();
        assert!(!resolver.batch_ready());
        resolver.resolve(2, record("b", "b")).unwrap();
        assert!(resolver.batch_ready());
        assert_eq!(resolver.take_batch().len(), 2);
        assert!(!resolver.batch_ready());
    }

    #[test]
    fn test_unknown_sku_means_file_changed() {
        let mut resolver = Resolver::new(index(&["a"]), 2);
        let err = resolver.resolve(1, record("zzz", "z")).unwrap_err();
        assert!(matches!(err, ImportError::FileChanged));
    }
}
