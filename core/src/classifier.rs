use ripple_proto::{ChangeEvent, ChangeKind};
use tracing::{debug, warn};

use crate::aggregation::{AggregationState, Bucket};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// The id was added to the bucket
    Recorded(Bucket),
    /// The id was already in the bucket
    Duplicate(Bucket),
    /// The event had no usable record id and was ignored
    Dropped,
}

impl Classification {
    pub fn is_recorded(&self) -> bool { matches!(self, Classification::Recorded(_)) }
}

impl From<ChangeKind> for Bucket {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::Inserted => Bucket::New,
            ChangeKind::Updated => Bucket::Updated,
            ChangeKind::Deleted => Bucket::Deleted,
        }
    }
}

/// Files a change event into its bucket. Never removes anything from the state.
pub fn classify(event: &ChangeEvent, state: &mut AggregationState) -> Classification {
    let bucket = Bucket::from(event.kind);
    let Some(id) = &event.record_id else {
        warn!("Dropping {} change without a record id", event.kind);
        return Classification::Dropped;
    };

    if state.insert(bucket, id.clone()) {
        debug!("Recorded {:?} change for {}", bucket, id);
        Classification::Recorded(bucket)
    } else {
        Classification::Duplicate(bucket)
    }
}
