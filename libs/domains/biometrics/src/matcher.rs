//! Nearest-neighbour search over a tenant gallery
//!
//! Embeddings are assumed L2-normalized, so cosine distance reduces to
//! `1 - dot(a, b)`. The gallery is scanned linearly.

use crate::models::EnrollmentRecord;

/// `1 - dot(a, b)`, accumulated in f64
///
/// Callers must check that both slices have the same length.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    1.0 - dot
}

/// Match decision; the threshold itself counts as a match.
pub fn is_match(distance: f64, threshold: f64) -> bool {
    distance <= threshold
}

#[derive(Debug, Clone, PartialEq)]
pub struct BestMatch<'a> {
    pub record: &'a EnrollmentRecord,
    pub distance: f64,
    /// Records skipped for having a different dimension
    pub skipped: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome<'a> {
    /// The gallery has no records
    Empty,
    /// Every record had a different dimension than the probe
    AllIncompatible { skipped: usize },
    Found(BestMatch<'a>),
}

/// Find the record closest to `probe`
///
/// Exact ties keep the first record in gallery order.
pub fn search<'a>(probe: &[f32], gallery: &'a [EnrollmentRecord]) -> SearchOutcome<'a> {
    if gallery.is_empty() {
        return SearchOutcome::Empty;
    }

    let mut best: Option<(&EnrollmentRecord, f64)> = None;
    let mut skipped = 0;

    for record in gallery {
        if !record.is_compatible_with(probe) {
            skipped += 1;
            continue;
        }

        let distance = cosine_distance(probe, &record.embedding);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((record, distance)),
        }
    }

    match best {
        Some((record, distance)) => SearchOutcome::Found(BestMatch {
            record,
            distance,
            skipped,
        }),
        None => SearchOutcome::AllIncompatible { skipped },
    }
}
