//! Columnar field statistics — per-field min/max/null-count summaries.
//!
//! Statistics summarise a set of rows one field at a time and power the
//! pruning decisions of the scan planner: manifest-level pruning uses the
//! partition statistics carried by each manifest-list entry, and per-file
//! pruning uses the key/value statistics carried by each SST descriptor.
//!
//! Pruning against statistics must be **sound**: a summary may keep a file
//! that contains no matching row, but it must never drop a file that does.
//! The evaluator side of that contract lives in [`crate::predicate`].

use crate::encoding::{self, Decode, Encode, EncodingError};
use crate::row::{Datum, Row};

// ------------------------------------------------------------------------------------------------
// FieldStats
// ------------------------------------------------------------------------------------------------

/// Min/max/null-count summary of one field over a set of rows.
///
/// `min`/`max` are `None` only for a summary over zero rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldStats {
    /// Smallest value observed.
    pub min: Option<Datum>,
    /// Largest value observed.
    pub max: Option<Datum>,
    /// Number of null values.  Reserved for nullable schemas — the current
    /// datum model never produces nulls, so collectors always write zero.
    pub null_count: u64,
}

impl FieldStats {
    /// An empty summary (zero rows observed).
    pub fn empty() -> Self {
        Self {
            min: None,
            max: None,
            null_count: 0,
        }
    }

    /// Folds one observed value into the summary.
    pub fn observe(&mut self, value: &Datum) {
        match &self.min {
            Some(min) if min <= value => {}
            _ => self.min = Some(value.clone()),
        }
        match &self.max {
            Some(max) if max >= value => {}
            _ => self.max = Some(value.clone()),
        }
    }

    /// Widens this summary to also cover everything `other` covers.
    pub fn merge(&mut self, other: &FieldStats) {
        if let Some(min) = &other.min {
            self.observe(min);
        }
        if let Some(max) = &other.max {
            self.observe(max);
        }
        self.null_count += other.null_count;
    }
}

impl Encode for FieldStats {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.min.encode_to(buf)?;
        self.max.encode_to(buf)?;
        self.null_count.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for FieldStats {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (min, n) = Option::<Datum>::decode_from(&buf[offset..])?;
        offset += n;
        let (max, n) = Option::<Datum>::decode_from(&buf[offset..])?;
        offset += n;
        let (null_count, n) = u64::decode_from(&buf[offset..])?;
        offset += n;
        Ok((
            Self {
                min,
                max,
                null_count,
            },
            offset,
        ))
    }
}

// ------------------------------------------------------------------------------------------------
// StatsCollector
// ------------------------------------------------------------------------------------------------

/// Accumulates per-field statistics over a stream of same-arity rows.
///
/// The collector sizes itself from the first row it sees, so a collector
/// fed only zero-arity rows (unpartitioned tables) finishes with an empty
/// summary vector.
#[derive(Debug, Default)]
pub struct StatsCollector {
    fields: Vec<FieldStats>,
    rows: u64,
}

impl StatsCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one row into the per-field summaries.
    pub fn collect(&mut self, row: &Row) {
        if self.fields.len() < row.arity() {
            self.fields.resize(row.arity(), FieldStats::empty());
        }
        for (stats, datum) in self.fields.iter_mut().zip(row.fields()) {
            stats.observe(datum);
        }
        self.rows += 1;
    }

    /// Number of rows folded so far.
    pub fn row_count(&self) -> u64 {
        self.rows
    }

    /// Finishes the collection, yielding one summary per field.
    pub fn finish(self) -> Vec<FieldStats> {
        self.fields
    }
}

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_tracks_min_max_per_field() {
        let mut collector = StatsCollector::new();
        collector.collect(&Row::new(vec![Datum::Int(5), Datum::Str("m".into())]));
        collector.collect(&Row::new(vec![Datum::Int(-3), Datum::Str("z".into())]));
        collector.collect(&Row::new(vec![Datum::Int(9), Datum::Str("a".into())]));

        assert_eq!(collector.row_count(), 3);
        let stats = collector.finish();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats[0].min, Some(Datum::Int(-3)));
        assert_eq!(stats[0].max, Some(Datum::Int(9)));
        assert_eq!(stats[1].min, Some(Datum::Str("a".into())));
        assert_eq!(stats[1].max, Some(Datum::Str("z".into())));
    }

    #[test]
    fn test_collector_empty_rows_yield_no_fields() {
        let mut collector = StatsCollector::new();
        collector.collect(&Row::empty());
        collector.collect(&Row::empty());
        assert_eq!(collector.row_count(), 2);
        assert!(collector.finish().is_empty());
    }

    #[test]
    fn test_merge_widens_bounds() {
        let mut a = FieldStats::empty();
        a.observe(&Datum::Int(3));
        a.observe(&Datum::Int(7));

        let mut b = FieldStats::empty();
        b.observe(&Datum::Int(-1));

        a.merge(&b);
        assert_eq!(a.min, Some(Datum::Int(-1)));
        assert_eq!(a.max, Some(Datum::Int(7)));
    }

    #[test]
    fn test_wire_round_trip() {
        let mut stats = FieldStats::empty();
        stats.observe(&Datum::Str("k".into()));
        let bytes = crate::encoding::encode_to_vec(&stats).unwrap();
        let (back, _) = crate::encoding::decode_from_slice::<FieldStats>(&bytes).unwrap();
        assert_eq!(back, stats);
    }
}
