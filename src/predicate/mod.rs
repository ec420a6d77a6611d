//! Predicate model — boolean expressions over row fields.
//!
//! A [`Predicate`] is a sum type over field comparisons (`Equal`) combined
//! with `And`/`Or`.  Predicates are in-memory only; they are never
//! persisted.
//!
//! Two evaluators are provided:
//!
//! - [`Predicate::test`] — exact evaluation against a concrete row, used
//!   for per-entry partition filtering.
//! - [`Predicate::test_stats`] — conservative evaluation against per-field
//!   min/max summaries.  This must return `true` whenever **any** row
//!   covered by the summaries could satisfy the predicate: pruning on a
//!   `false` here is sound, and there are no false negatives.
//!
//! Both evaluators type-check literals against the data they are applied
//! to and report [`PredicateError::TypeMismatch`] instead of guessing.


use thiserror::Error;

use crate::row::{Datum, Row};
use crate::stats::FieldStats;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors raised while evaluating a predicate.
#[derive(Debug, Error)]
pub enum PredicateError {
    /// The literal's kind does not match the field it is compared against.
    #[error("type mismatch on field {field}: literal kind differs from data kind")]
    TypeMismatch {
        /// Index of the offending field.
        field: usize,
    },

    /// The predicate references a field index beyond the row's arity.
    #[error("field index {field} out of range for arity {arity}")]
    FieldOutOfRange {
        /// Referenced field index.
        field: usize,
        /// Arity of the row being tested.
        arity: usize,
    },
}

// ------------------------------------------------------------------------------------------------
// Predicate
// ------------------------------------------------------------------------------------------------

/// A boolean expression over the fields of one row role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `field == literal`.
    Equal {
        /// Index of the field in the row.
        field: usize,
        /// Typed comparison literal.
        literal: Datum,
    },
    /// Both sub-expressions hold.
    And(Box<Predicate>, Box<Predicate>),
    /// At least one sub-expression holds.
    Or(Box<Predicate>, Box<Predicate>),
}

/// Builds `field == literal`.
pub fn equal(field: usize, literal: impl Into<Datum>) -> Predicate {
    Predicate::Equal {
        field,
        literal: literal.into(),
    }
}

/// Builds `a AND b`.
pub fn and(a: Predicate, b: Predicate) -> Predicate {
    Predicate::And(Box::new(a), Box::new(b))
}

/// Builds `a OR b`.
pub fn or(a: Predicate, b: Predicate) -> Predicate {
    Predicate::Or(Box::new(a), Box::new(b))
}

impl Predicate {
    /// Exact evaluation against a concrete row.
    pub fn test(&self, row: &Row) -> Result<bool, PredicateError> {
        match self {
            Predicate::Equal { field, literal } => {
                let datum = row.field(*field).ok_or(PredicateError::FieldOutOfRange {
                    field: *field,
                    arity: row.arity(),
                })?;
                if datum.kind() != literal.kind() {
                    return Err(PredicateError::TypeMismatch { field: *field });
                }
                Ok(datum == literal)
            }
            Predicate::And(a, b) => Ok(a.test(row)? && b.test(row)?),
            Predicate::Or(a, b) => Ok(a.test(row)? || b.test(row)?),
        }
    }

    /// Conservative evaluation against per-field min/max summaries.
    ///
    /// Returns `false` only when **no** row covered by the summaries can
    /// satisfy the predicate.  A field with no summary (index beyond
    /// `stats`, or empty bounds despite a non-zero row count) evaluates to
    /// `true` — absence of information never prunes.
    pub fn test_stats(
        &self,
        row_count: u64,
        stats: &[FieldStats],
    ) -> Result<bool, PredicateError> {
        if row_count == 0 {
            return Ok(false);
        }
        match self {
            Predicate::Equal { field, literal } => {
                let Some(field_stats) = stats.get(*field) else {
                    return Ok(true);
                };
                let (Some(min), Some(max)) = (&field_stats.min, &field_stats.max) else {
                    return Ok(true);
                };
                if min.kind() != literal.kind() || max.kind() != literal.kind() {
                    return Err(PredicateError::TypeMismatch { field: *field });
                }
                Ok(min <= literal && literal <= max)
            }
            Predicate::And(a, b) => {
                Ok(a.test_stats(row_count, stats)? && b.test_stats(row_count, stats)?)
            }
            Predicate::Or(a, b) => {
                Ok(a.test_stats(row_count, stats)? || b.test_stats(row_count, stats)?)
            }
        }
    }

    /// Builds the disjunction-of-conjunctions predicate selecting exactly
    /// the given partition rows: one `Equal` per field, `And`-combined per
    /// row, `Or`-combined across rows.
    ///
    /// Zero-arity rows (unpartitioned tables) contribute nothing; if no
    /// row contributes, the result is `None` (no filtering).
    pub fn from_partitions(partitions: &[Row]) -> Option<Predicate> {
        let mut result: Option<Predicate> = None;
        for partition in partitions {
            let mut conjunction: Option<Predicate> = None;
            for (idx, datum) in partition.fields().enumerate() {
                let eq = equal(idx, datum.clone());
                conjunction = Some(match conjunction {
                    Some(prev) => and(prev, eq),
                    None => eq,
                });
            }
            if let Some(conjunction) = conjunction {
                result = Some(match result {
                    Some(prev) => or(prev, conjunction),
                    None => conjunction,
                });
            }
        }
        result
    }
}
