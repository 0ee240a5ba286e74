use ripple_proto::RecordId;
use std::collections::HashSet;
use std::fmt;

/// Category a change is counted under, in display priority order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Bucket {
    New,
    Updated,
    Deleted,
}

/// Record identifiers seen since the last refresh, one set per bucket.
///
/// The same id may sit in several buckets (inserted, then later updated); uniqueness is only
/// enforced within a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationState {
    new_ids: HashSet<RecordId>,
    updated_ids: HashSet<RecordId>,
    deleted_ids: HashSet<RecordId>,
}

impl AggregationState {
    pub fn new() -> Self { Self::default() }

    /// Returns false when the id was already in the bucket
    pub fn insert(&mut self, bucket: Bucket, id: RecordId) -> bool { self.ids_mut(bucket).insert(id) }

    pub fn ids(&self, bucket: Bucket) -> &HashSet<RecordId> {
        match bucket {
            Bucket::New => &self.new_ids,
            Bucket::Updated => &self.updated_ids,
            Bucket::Deleted => &self.deleted_ids,
        }
    }

    fn ids_mut(&mut self, bucket: Bucket) -> &mut HashSet<RecordId> {
        match bucket {
            Bucket::New => &mut self.new_ids,
            Bucket::Updated => &mut self.updated_ids,
            Bucket::Deleted => &mut self.deleted_ids,
        }
    }

    pub fn contains(&self, bucket: Bucket, id: &RecordId) -> bool { self.ids(bucket).contains(id) }

    pub fn count(&self, bucket: Bucket) -> usize { self.ids(bucket).len() }

    pub fn is_empty(&self) -> bool { self.new_ids.is_empty() && self.updated_ids.is_empty() && self.deleted_ids.is_empty() }

    /// Empties every bucket. Returns false if there was nothing to clear.
    pub fn clear(&mut self) -> bool {
        if self.is_empty() {
            return false;
        }
        self.new_ids.clear();
        self.updated_ids.clear();
        self.deleted_ids.clear();
        true
    }

    /// The highest-priority non-empty bucket and its size (New > Updated > Deleted).
    /// Priority is fixed; event order plays no part.
    pub fn summary(&self) -> Option<Summary> {
        [Bucket::New, Bucket::Updated, Bucket::Deleted]
            .into_iter()
            .map(|kind| Summary { kind, count: self.count(kind) })
            .find(|summary| summary.count > 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub kind: Bucket,
    pub count: usize,
}

impl Summary {
    /// Human-readable line, e.g. "3 new posts available" for the noun "post"
    pub fn message(&self, noun: &str) -> String {
        let noun = if self.count == 1 { noun.to_string() } else { format!("{noun}s") };
        match self.kind {
            Bucket::New => format!("{} new {} available", self.count, noun),
            Bucket::Updated => format!("{} {} updated", self.count, noun),
            Bucket::Deleted => format!("{} {} removed", self.count, noun),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.message("item")) }
}
