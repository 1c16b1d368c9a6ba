//! Core record model (spec §3): a tagged union over Variant/Interval/Alignment
//! positions, all exposing a common chrom/start/end/source_id surface so the
//! merge engine (`crate::merge`) can treat them uniformly on the hot overlap
//! path.

use std::sync::Arc;

use indexmap::IndexMap;

/// Interned chromosome name. `Arc<str>` avoids a fresh allocation per record
/// for the same chromosome as a stream is walked.
pub type Chrom = Arc<str>;

/// SAM flag bits relevant to the Alignment source filtering rules in §4.3.
pub mod sam_flags {
    pub const PAIRED: u16 = 0x1;
    pub const REVERSE: u16 = 0x10;
    pub const SECONDARY: u16 = 0x100;
    pub const QC_FAIL: u16 = 0x200;
    pub const DUPLICATE: u16 = 0x400;
    pub const UNMAPPED: u16 = 0x4;
    pub const SUPPLEMENTARY: u16 = 0x800;
}

/// A single INFO value. Preserves the integer/float/string/flag distinction
/// VCF requires, plus homogeneous list variants for `Number=A`/`.` fields.
#[derive(Debug, Clone, PartialEq)]
pub enum InfoValue {
    Integer(i64),
    Float(f64),
    String(String),
    Flag,
    IntegerArray(Vec<i64>),
    FloatArray(Vec<f64>),
    StringArray(Vec<String>),
}

impl InfoValue {
    /// Render the way it would appear on the right-hand side of `key=value`
    /// in a VCF INFO column (flags have no value and are handled by the
    /// caller).
    pub fn display_value(&self) -> String {
        match self {
            InfoValue::Integer(v) => v.to_string(),
            InfoValue::Float(v) => format_float(*v),
            InfoValue::String(v) => v.clone(),
            InfoValue::Flag => String::new(),
            InfoValue::IntegerArray(v) => v
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(","),
            InfoValue::FloatArray(v) => {
                v.iter().map(|x| format_float(*x)).collect::<Vec<_>>().join(",")
            }
            InfoValue::StringArray(v) => v.join(","),
        }
    }

    /// A single scalar float, when the value can be coerced to one (used by
    /// numeric reducers reading an already-annotated field, e.g. post
    /// annotation `div2`).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            InfoValue::Integer(v) => Some(*v as f64),
            InfoValue::Float(v) => Some(*v),
            InfoValue::String(v) => v.parse().ok(),
            InfoValue::FloatArray(v) if v.len() == 1 => Some(v[0]),
            InfoValue::IntegerArray(v) if v.len() == 1 => Some(v[0] as f64),
            _ => None,
        }
    }
}

/// Render a float the way VCF writers conventionally do: integral floats
/// print without a trailing `.0`, matching the on-disk style annotation
/// files already use.
pub fn format_float(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        let mut buf = ryu::Buffer::new();
        buf.format(v).to_string()
    }
}

/// An ordered key/value map, preserving insertion order so that re-emitting a
/// query record round-trips its original field order (spec §3 Info).
#[derive(Debug, Clone, Default)]
pub struct Info {
    map: IndexMap<String, InfoValue>,
}

impl Info {
    pub fn new() -> Self {
        Self { map: IndexMap::new() }
    }

    pub fn get(&self, key: &str) -> Option<&InfoValue> {
        self.map.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: InfoValue) {
        self.map.insert(key.into(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<InfoValue> {
        self.map.shift_remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &InfoValue)> {
        self.map.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }
}

/// Attributes specific to a Variant record (VCF/BCF origin).
#[derive(Debug, Clone)]
pub struct VariantData {
    pub id: String,
    pub reference: String,
    pub alt: Vec<String>,
    pub filter: String,
    pub info: Info,
    /// `CIPOS` confidence interval, absolute coordinates, half-open.
    pub ci_pos: Option<(u32, u32)>,
    /// `CIEND` confidence interval, absolute coordinates, half-open.
    pub ci_end: Option<(u32, u32)>,
}

impl VariantData {
    /// Required by §3 strict-mode matching: same chrom/start/ref and at
    /// least one shared alt.
    pub fn shares_allele(&self, other: &VariantData) -> bool {
        self.reference == other.reference
            && self.alt.iter().any(|a| other.alt.contains(a))
    }
}

/// Attributes specific to an Interval record (BED origin).
#[derive(Debug, Clone, Default)]
pub struct IntervalData {
    /// Raw tab-separated columns beyond chrom/start/end, 0-indexed (column 4
    /// in 1-based BED terms is `fields[0]`).
    pub fields: Vec<Vec<u8>>,
}

impl IntervalData {
    /// Column lookup using the same 1-based numbering as the whole BED line
    /// (`Source.column`, spec §3): column 1 is chrom, 2 is start, 3 is end,
    /// so the first entry of `fields` is column 4.
    pub fn column(&self, one_based: usize) -> Option<&[u8]> {
        one_based.checked_sub(4).and_then(|i| self.fields.get(i)).map(|v| v.as_slice())
    }
}

/// Attributes specific to an Alignment record (BAM origin).
#[derive(Debug, Clone)]
pub struct AlignmentData {
    pub mapq: u8,
    pub flags: u16,
    pub seq: Vec<u8>,
}

impl AlignmentData {
    pub fn is_reverse(&self) -> bool {
        self.flags & sam_flags::REVERSE != 0
    }

    /// §4.3 Alignment filter: skip unmapped, duplicate, secondary, qc-fail.
    pub fn is_excluded(&self) -> bool {
        self.mapq < 1
            || self.flags
                & (sam_flags::UNMAPPED
                    | sam_flags::DUPLICATE
                    | sam_flags::SECONDARY
                    | sam_flags::QC_FAIL)
                != 0
    }
}

/// The per-kind payload of a `Record`.
#[derive(Debug, Clone)]
pub enum RecordBody {
    Variant(VariantData),
    Interval(IntervalData),
    Alignment(AlignmentData),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Variant,
    Interval,
    Alignment,
}

/// A positioned record from any stream, query (`source_id == 0`) or
/// annotation (`source_id >= 1`).
#[derive(Debug, Clone)]
pub struct Record {
    pub chrom: Chrom,
    pub start: u32,
    pub end: u32,
    pub source_id: u32,
    pub body: RecordBody,
}

impl Record {
    pub fn kind(&self) -> RecordKind {
        match &self.body {
            RecordBody::Variant(_) => RecordKind::Variant,
            RecordBody::Interval(_) => RecordKind::Interval,
            RecordBody::Alignment(_) => RecordKind::Alignment,
        }
    }

    pub fn as_variant(&self) -> Option<&VariantData> {
        match &self.body {
            RecordBody::Variant(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_variant_mut(&mut self) -> Option<&mut VariantData> {
        match &mut self.body {
            RecordBody::Variant(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_interval(&self) -> Option<&IntervalData> {
        match &self.body {
            RecordBody::Interval(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_alignment(&self) -> Option<&AlignmentData> {
        match &self.body {
            RecordBody::Alignment(a) => Some(a),
            _ => None,
        }
    }

    /// Half-open, chromosome-equal overlap predicate (spec §4.1).
    #[inline]
    pub fn overlaps(&self, other: &Record) -> bool {
        self.chrom == other.chrom && self.end > other.start && other.end > self.start
    }

    /// Overlap against an arbitrary half-open range on the same chromosome,
    /// used by the SV-end / BED-fallback proxy passes (§4.4, §4.5).
    #[inline]
    pub fn overlaps_range(&self, chrom: &str, start: u32, end: u32) -> bool {
        self.chrom.as_ref() == chrom && self.end > start && end > self.start
    }
}
