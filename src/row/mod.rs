//! Row model — fixed-schema tuples of typed datums.
//!
//! Keys, values, and partition values are all [`Row`]s: fixed-arity tuples
//! whose field types are pinned by a [`RowType`] schema.  Two datum kinds
//! are supported, 64-bit integers and UTF-8 strings.  There are no
//! floating-point datums, which keeps `Eq`, `Ord`, and `Hash` total and
//! derivable — rows are used as map keys (file identifiers) and as sort
//! keys (merge ordering), both of which need a total order.
//!
//! Rows compare field-by-field, left to right.  Within one table all rows
//! of a given role (key, value, partition) share the same schema, so the
//! cross-kind arm of the datum comparison is unreachable in practice; it
//! still totally orders `Int` before `Str` so that the derived order is
//! well-defined on arbitrary input.
//!
//! The wire format follows [`crate::encoding`]: a datum is a one-byte kind
//! tag followed by its payload, a row is a counted sequence of datums.

use std::fmt;

use crate::encoding::{self, Decode, Encode, EncodingError};

// ------------------------------------------------------------------------------------------------
// Datum
// ------------------------------------------------------------------------------------------------

/// Kind of a single row field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatumKind {
    /// 64-bit signed integer.
    Int,
    /// UTF-8 string.
    Str,
}

/// A single typed field value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Datum {
    /// 64-bit signed integer.
    Int(i64),
    /// UTF-8 string.
    Str(String),
}

impl Datum {
    /// Returns the kind of this datum.
    pub fn kind(&self) -> DatumKind {
        match self {
            Datum::Int(_) => DatumKind::Int,
            Datum::Str(_) => DatumKind::Str,
        }
    }

    /// Returns the integer payload, or `None` for other kinds.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Datum::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, or `None` for other kinds.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Datum::Str(v) => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for Datum {
    /// Renders the raw payload — used for `k=v` partition path segments.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Datum::Int(v) => write!(f, "{v}"),
            Datum::Str(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Datum {
    fn from(v: i64) -> Self {
        Datum::Int(v)
    }
}

impl From<&str> for Datum {
    fn from(v: &str) -> Self {
        Datum::Str(v.to_string())
    }
}

impl Encode for Datum {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        match self {
            Datum::Int(v) => {
                0u8.encode_to(buf)?;
                v.encode_to(buf)?;
            }
            Datum::Str(v) => {
                1u8.encode_to(buf)?;
                v.encode_to(buf)?;
            }
        }
        Ok(())
    }
}

impl Decode for Datum {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, mut offset) = u8::decode_from(buf)?;
        match tag {
            0 => {
                let (v, n) = i64::decode_from(&buf[offset..])?;
                offset += n;
                Ok((Datum::Int(v), offset))
            }
            1 => {
                let (v, n) = String::decode_from(&buf[offset..])?;
                offset += n;
                Ok((Datum::Str(v), offset))
            }
            other => Err(EncodingError::BadTag {
                tag: other as u32,
                what: "Datum",
            }),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Row
// ------------------------------------------------------------------------------------------------

/// A fixed-arity tuple of datums.
///
/// Rows are cheap to clone for metadata purposes (partition values, min/max
/// keys); the bulk data path moves them by value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Row(Vec<Datum>);

impl Row {
    /// Creates a row from its field values.
    pub fn new(fields: Vec<Datum>) -> Self {
        Row(fields)
    }

    /// The empty row — the partition value of an unpartitioned table.
    pub fn empty() -> Self {
        Row(Vec::new())
    }

    /// Number of fields.
    pub fn arity(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` for the zero-arity row.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the field at `idx`, or `None` when out of range.
    pub fn field(&self, idx: usize) -> Option<&Datum> {
        self.0.get(idx)
    }

    /// Iterates over the fields in schema order.
    pub fn fields(&self) -> impl Iterator<Item = &Datum> {
        self.0.iter()
    }
}

impl From<Vec<Datum>> for Row {
    fn from(fields: Vec<Datum>) -> Self {
        Row(fields)
    }
}

impl Encode for Row {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        encoding::encode_seq(&self.0, buf)
    }
}

impl Decode for Row {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (fields, consumed) = encoding::decode_seq::<Datum>(buf)?;
        Ok((Row(fields), consumed))
    }
}

// ------------------------------------------------------------------------------------------------
// RowType — schema
// ------------------------------------------------------------------------------------------------

/// One named, typed field of a [`RowType`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowField {
    /// Field name, used for partition path segments (`name=value`).
    pub name: String,
    /// Field kind.
    pub kind: DatumKind,
}

impl RowField {
    /// Creates a field.
    pub fn new(name: impl Into<String>, kind: DatumKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }
}

/// Schema of a row role (key, value, or partition).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowType {
    fields: Vec<RowField>,
}

impl RowType {
    /// Creates a schema from its fields.
    pub fn new(fields: Vec<RowField>) -> Self {
        Self { fields }
    }

    /// The zero-field schema (unpartitioned tables).
    pub fn empty() -> Self {
        Self { fields: Vec::new() }
    }

    /// Number of fields.
    pub fn arity(&self) -> usize {
        self.fields.len()
    }

    /// Returns the field at `idx`, or `None` when out of range.
    pub fn field(&self, idx: usize) -> Option<&RowField> {
        self.fields.get(idx)
    }

    /// Iterates over the fields in schema order.
    pub fn fields(&self) -> impl Iterator<Item = &RowField> {
        self.fields.iter()
    }

    /// Returns `true` when `row` matches this schema in arity and kinds.
    pub fn matches(&self, row: &Row) -> bool {
        row.arity() == self.arity()
            && row
                .fields()
                .zip(self.fields.iter())
                .all(|(d, f)| d.kind() == f.kind)
    }
}

// ------------------------------------------------------------------------------------------------
// KeyValue — the record moved through write, store, and merge
// ------------------------------------------------------------------------------------------------

/// Distinguishes an upsert from a row-level tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    /// Upsert of the value under the key.
    Add,
    /// Tombstone for the key.
    Delete,
}

impl Encode for RowKind {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        let tag: u8 = match self {
            RowKind::Add => 0,
            RowKind::Delete => 1,
        };
        tag.encode_to(buf)
    }
}

impl Decode for RowKind {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (tag, consumed) = u8::decode_from(buf)?;
        match tag {
            0 => Ok((RowKind::Add, consumed)),
            1 => Ok((RowKind::Delete, consumed)),
            other => Err(EncodingError::BadTag {
                tag: other as u32,
                what: "RowKind",
            }),
        }
    }
}

/// One keyed update: `(key, value, kind)`.
///
/// A `Delete` record still carries a value row (the schema is fixed), but
/// merge readers never surface it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    /// Key tuple; files store records in ascending key order.
    pub key: Row,
    /// Value tuple.
    pub value: Row,
    /// Upsert or tombstone.
    pub kind: RowKind,
}

impl KeyValue {
    /// Creates an upsert record.
    pub fn add(key: Row, value: Row) -> Self {
        Self {
            key,
            value,
            kind: RowKind::Add,
        }
    }

    /// Creates a tombstone record.  The value row carries the tombstone's
    /// last-written payload and is ignored by merged reads.
    pub fn delete(key: Row, value: Row) -> Self {
        Self {
            key,
            value,
            kind: RowKind::Delete,
        }
    }

    /// Returns `true` for tombstones.
    pub fn is_delete(&self) -> bool {
        self.kind == RowKind::Delete
    }
}

impl Encode for KeyValue {
    fn encode_to(&self, buf: &mut Vec<u8>) -> Result<(), EncodingError> {
        self.kind.encode_to(buf)?;
        self.key.encode_to(buf)?;
        self.value.encode_to(buf)?;
        Ok(())
    }
}

impl Decode for KeyValue {
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let mut offset = 0;
        let (kind, n) = RowKind::decode_from(&buf[offset..])?;
        offset += n;
        let (key, n) = Row::decode_from(&buf[offset..])?;
        offset += n;
        let (value, n) = Row::decode_from(&buf[offset..])?;
        offset += n;
        Ok((Self { key, value, kind }, offset))
    }
}

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------
