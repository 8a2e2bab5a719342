//! Range coalescing for segment bitmaps.
//!
//! A member's segments are tracked as a `RoaringBitmap` of segment indices.
//! Coalescing turns maximal runs of consecutive bits back into token ranges,
//! the exact inverse of the segment indexing in [`crate::BoundaryModel`].

use roaring::RoaringBitmap;
use strata_core::{Range, Token};
use tracing::trace;

/// Extension trait for `RoaringBitmap` segment operations.
pub trait SegmentBitmap {
    /// Returns a bitmap with every segment in `0..segments` set.
    fn all_segments(segments: u32) -> Self;

    /// Returns maximal runs of consecutive set bits as `[start, end)` pairs,
    /// in ascending order.
    fn runs(&self) -> Vec<(u32, u32)>;

    /// Returns the lowest index in `0..segments` that is not set.
    fn first_missing(&self, segments: u32) -> Option<u32>;
}

impl SegmentBitmap for RoaringBitmap {
    fn all_segments(segments: u32) -> Self {
        let mut bitmap = Self::new();
        bitmap.insert_range(0..segments);
        bitmap
    }

    fn runs(&self) -> Vec<(u32, u32)> {
        let mut runs = Vec::new();
        let mut iter = self.iter();
        let Some(first) = iter.next() else {
            return runs;
        };

        let mut start = first;
        let mut end = first + 1;
        for bit in iter {
            if bit != end {
                runs.push((start, end));
                start = bit;
            }
            end = bit + 1;
        }
        runs.push((start, end));
        runs
    }

    fn first_missing(&self, segments: u32) -> Option<u32> {
        (0..segments).find(|bit| !self.contains(*bit))
    }
}

/// Converts a segment bitmap into the minimal ordered list of ranges.
///
/// # Panics
///
/// Panics if the bitmap holds an index `>= tokens.len()`.
#[must_use]
pub fn coalesce(tokens: &[Token], segments: &RoaringBitmap) -> Vec<Range> {
    if let Some(max) = segments.max() {
        assert!(
            (max as usize) < tokens.len(),
            "segment {max} out of range ({} segments)",
            tokens.len()
        );
    }

    let ranges: Vec<Range> = segments
        .runs()
        .into_iter()
        .map(|(left, right)| {
            let start = if left == 0 {
                Token::MIN
            } else {
                tokens[left as usize - 1]
            };
            Range::new(start, tokens[right as usize - 1])
        })
        .collect();

    trace!(?tokens, ?ranges, bits = segments.len(), "coalesced segments");
    ranges
}
