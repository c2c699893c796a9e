//! Index scans as seen by the host: ordered tuples with reported distances.

use crate::hnsw::{DistanceMetric, SearchHit, TupleId};
use serde::{Deserialize, Serialize};

/// One tuple returned by a scan.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanItem {
    pub tuple: TupleId,
    /// Distance in the metric's reported form (Euclidean, not squared, for L2).
    pub distance: f32,
}

/// An open ordered scan. Results are fixed when the scan begins.
#[derive(Debug)]
pub struct ScanHandle {
    items: std::vec::IntoIter<ScanItem>,
}

impl ScanHandle {
    pub(crate) fn new(hits: Vec<SearchHit>, metric: DistanceMetric) -> Self {
        let items: Vec<ScanItem> = hits
            .into_iter()
            .map(|hit| ScanItem {
                tuple: hit.tuple,
                distance: metric.to_reported(hit.distance),
            })
            .collect();
        Self {
            items: items.into_iter(),
        }
    }

    /// Next tuple in ascending distance order, `None` once exhausted.
    pub fn next_tuple(&mut self) -> Option<ScanItem> {
        self.items.next()
    }

    /// Tuples not yet returned.
    pub fn remaining(&self) -> usize {
        self.items.len()
    }

    /// Release the scan.
    pub fn end_scan(self) {}
}

impl Iterator for ScanHandle {
    type Item = ScanItem;

    fn next(&mut self) -> Option<ScanItem> {
        self.next_tuple()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}
