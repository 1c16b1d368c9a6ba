//! VCF record source: a sequential text codec, not a tabix/BCF random-access
//! reader — spec §1 excludes index-backed lookups, and the merge engine only
//! ever walks every stream forward once. Transparently reads plain or
//! gzip/bgzip-compressed text via `crate::io::open_possibly_gzipped`.

use std::io::{BufRead, BufReader, Cursor, Read, Seek};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, VannoError};
use crate::merge::RecordSource;
use crate::record::{Info, InfoValue, Record, RecordBody, VariantData};
use crate::source::OutputType;

/// One `##INFO=<...>` header declaration, as needed by `crate::config` to
/// drive the `self`/`first` "inherit upstream type" header rule (spec §4.7).
#[derive(Debug, Clone)]
pub struct InfoHeaderEntry {
    pub id: String,
    pub number_a: bool,
    pub out_type: OutputType,
}

pub struct VariantSource<R> {
    reader: BufReader<R>,
    path: String,
    line_number: usize,
    line: String,
    source_id: u32,
    pub info_header: Vec<InfoHeaderEntry>,
    /// Every `#`-prefixed line seen so far, in order, for passthrough
    /// re-emission of the output header.
    pub header_lines: Vec<String>,
}

impl VariantSource<Box<dyn Read>> {
    pub fn open(path: impl AsRef<Path>, source_id: u32) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let reader = super::open_possibly_gzipped(path)?;
        Ok(Self::new(reader, display, source_id))
    }
}

impl<R: Read> VariantSource<R> {
    pub fn new(reader: R, path: impl Into<String>, source_id: u32) -> Self {
        Self {
            reader: BufReader::new(reader),
            path: path.into(),
            line_number: 0,
            line: String::with_capacity(512),
            source_id,
            info_header: Vec::new(),
            header_lines: Vec::new(),
        }
    }

    fn parse_err(&self, message: impl Into<String>) -> VannoError {
        VannoError::Parse { file: self.path.clone(), line: self.line_number, message: message.into() }
    }

    fn parse_line(&mut self, line: &str) -> Result<Record> {
        let mut cols = line.split('\t');
        let chrom = cols.next().ok_or_else(|| self.parse_err("missing CHROM"))?;
        let pos: u32 = cols
            .next()
            .ok_or_else(|| self.parse_err("missing POS"))?
            .parse()
            .map_err(|_| self.parse_err("non-numeric POS"))?;
        let id = cols.next().ok_or_else(|| self.parse_err("missing ID"))?.to_string();
        let reference = cols.next().ok_or_else(|| self.parse_err("missing REF"))?.to_string();
        let alt_col = cols.next().ok_or_else(|| self.parse_err("missing ALT"))?;
        let alt: Vec<String> = if alt_col == "." {
            Vec::new()
        } else {
            alt_col.split(',').map(String::from).collect()
        };
        let _qual = cols.next();
        let filter = cols.next().unwrap_or(".").to_string();
        let info_col = cols.next().unwrap_or(".");

        let start = pos.saturating_sub(1);
        let info = parse_info(info_col);
        let end = info
            .get("END")
            .and_then(|v| v.as_f64())
            .map(|v| v as u32)
            .unwrap_or(start + reference.len().max(1) as u32);

        let ci_pos = parse_ci(&info, "CIPOS", start);
        let ci_end = parse_ci(&info, "CIEND", end);

        Ok(Record {
            chrom: Arc::from(chrom),
            start,
            end,
            source_id: self.source_id,
            body: RecordBody::Variant(VariantData { id, reference, alt, filter, info, ci_pos, ci_end }),
        })
    }

    /// Scan a `##INFO=<ID=...,Number=...,Type=...>` header line, recording
    /// its declared `Number=A`/`Type` for later `Source` header-derivation
    /// lookups.
    fn note_header_line(&mut self, line: &str) {
        if !line.starts_with("##INFO=") {
            return;
        }
        let body = line.trim_start_matches("##INFO=<").trim_end_matches('>');
        let mut id = None;
        let mut number_a = false;
        let mut out_type = OutputType::String;
        for kv in body.split(',') {
            if let Some(v) = kv.strip_prefix("ID=") {
                id = Some(v.to_string());
            } else if kv == "Number=A" {
                number_a = true;
            } else if let Some(v) = kv.strip_prefix("Type=") {
                out_type = match v {
                    "Integer" => OutputType::Integer,
                    "Float" => OutputType::Float,
                    "Flag" => OutputType::Flag,
                    _ => OutputType::String,
                };
            }
        }
        if let Some(id) = id {
            self.info_header.push(InfoHeaderEntry { id, number_a, out_type });
        }
    }
}

impl<R: Read> RecordSource for VariantSource<R> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            self.line.clear();
            let n = self.reader.read_line(&mut self.line)?;
            if n == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let trimmed = self.line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('#') {
                self.header_lines.push(trimmed.to_string());
                if let Some(stripped) = trimmed.strip_prefix("##") {
                    self.note_header_line(&format!("##{stripped}"));
                }
                continue;
            }
            match self.parse_line(trimmed) {
                Ok(rec) => return Ok(Some(rec)),
                Err(VannoError::Parse { file, line, message }) => {
                    log::warn!("{file}:{line}: {message}, skipping record");
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Scan just the `##` header lines of a VCF/VCF.gz file to collect each
/// INFO declaration's `Number=A`/`Type`, without consuming any data records.
/// Used by `crate::config` to drive the `self`/`first` "inherit upstream
/// type" rule (spec §4.7) at load time, before the merge engine ever opens
/// the file for real.
pub fn peek_info_header(path: impl AsRef<Path>) -> Result<Vec<InfoHeaderEntry>> {
    let path = path.as_ref();
    let reader = super::open_possibly_gzipped(path)?;
    let mut src = VariantSource::new(reader, path.display().to_string(), 0);
    let mut line = String::new();
    loop {
        line.clear();
        let n = src.reader.read_line(&mut line)?;
        if n == 0 || !line.starts_with('#') {
            break;
        }
        if line.starts_with("##") {
            src.note_header_line(line.trim_end_matches(['\n', '\r']));
        }
    }
    Ok(src.info_header)
}

/// Buffer an entire query stream into memory (file or stdin) and build a
/// `VariantSource` over it, returning the header lines collected up front so
/// the stream can be scanned for an up-front property before annotation
/// begins, which stdin's non-seekable nature would otherwise rule out.
pub fn buffer_and_open(
    mut reader: Box<dyn Read>,
    path: impl Into<String>,
    source_id: u32,
) -> Result<(VariantSource<Cursor<Vec<u8>>>, Vec<String>)> {
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    let mut src = VariantSource::new(Cursor::new(buf), path, source_id);
    // Prime header_lines without consuming data records: peek one record and
    // push it back by re-seeking, since header lines always precede it.
    let mut peek_line = String::new();
    loop {
        let pos_before = src.reader.stream_position().unwrap_or(0);
        peek_line.clear();
        let n = src.reader.read_line(&mut peek_line)?;
        if n == 0 {
            break;
        }
        let trimmed = peek_line.trim_end_matches(['\n', '\r']);
        if trimmed.is_empty() {
            continue;
        }
        if !trimmed.starts_with('#') {
            src.reader.seek(std::io::SeekFrom::Start(pos_before)).map_err(VannoError::Io)?;
            break;
        }
        src.header_lines.push(trimmed.to_string());
        if trimmed.starts_with("##") {
            src.note_header_line(trimmed);
        }
    }
    let header_lines = src.header_lines.clone();
    Ok((src, header_lines))
}

/// Parse a VCF `INFO` column into the typed `Info` map, inferring
/// Integer/Float/String from the literal text since plain-text VCF carries
/// no independent type tag per field value.
pub fn parse_info(col: &str) -> Info {
    let mut info = Info::new();
    if col == "." || col.is_empty() {
        return info;
    }
    for kv in col.split(';') {
        if kv.is_empty() {
            continue;
        }
        match kv.split_once('=') {
            None => info.insert(kv.to_string(), InfoValue::Flag),
            Some((k, v)) => {
                let value = if v.contains(',') {
                    InfoValue::StringArray(v.split(',').map(String::from).collect())
                } else if let Ok(i) = v.parse::<i64>() {
                    InfoValue::Integer(i)
                } else if let Ok(f) = v.parse::<f64>() {
                    InfoValue::Float(f)
                } else {
                    InfoValue::String(v.to_string())
                };
                info.insert(k.to_string(), value);
            }
        }
    }
    info
}

/// Convert a `CIPOS=lo,hi`/`CIEND=lo,hi`-style offset pair (relative to
/// `anchor`) into the absolute half-open range `annotate::ends` expects.
fn parse_ci(info: &Info, key: &str, anchor: u32) -> Option<(u32, u32)> {
    let raw = match info.get(key)? {
        InfoValue::StringArray(items) if items.len() == 2 => {
            let lo: i64 = items[0].parse().ok()?;
            let hi: i64 = items[1].parse().ok()?;
            (lo, hi)
        }
        _ => return None,
    };
    let lo = (anchor as i64 + raw.0).max(0) as u32;
    let hi = (anchor as i64 + raw.1 + 1).max(0) as u32;
    Some((lo, hi.max(lo + 1)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_fields_and_info() {
        let data = b"chr1\t100\trs1\tA\tG\t.\tPASS\tDP=35;AC_AFR=33\n";
        let mut src = VariantSource::new(&data[..], "t.vcf", 0);
        let rec = src.next_record().unwrap().unwrap();
        assert_eq!(rec.start, 99);
        let v = rec.as_variant().unwrap();
        assert_eq!(v.id, "rs1");
        assert_eq!(v.info.get("DP"), Some(&InfoValue::Integer(35)));
    }

    #[test]
    fn end_falls_back_to_ref_length_without_info_end() {
        let data = b"chr1\t100\t.\tACGT\tA\t.\t.\t.\n";
        let mut src = VariantSource::new(&data[..], "t.vcf", 0);
        let rec = src.next_record().unwrap().unwrap();
        assert_eq!(rec.start, 99);
        assert_eq!(rec.end, 103);
    }

    #[test]
    fn cipos_converts_to_absolute_half_open_range() {
        let data = b"chr1\t100\t.\tA\t<DEL>\t.\t.\tCIPOS=-5,5;END=200\n";
        let mut src = VariantSource::new(&data[..], "t.vcf", 0);
        let rec = src.next_record().unwrap().unwrap();
        let v = rec.as_variant().unwrap();
        assert_eq!(v.ci_pos, Some((94, 105)));
    }

    #[test]
    fn header_number_a_fields_are_recorded() {
        let data = b"##INFO=<ID=fitcons,Number=A,Type=Float,Description=\"x\">\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\nchr1\t1\t.\tA\tG\t.\t.\t.\n";
        let mut src = VariantSource::new(&data[..], "t.vcf", 0);
        src.next_record().unwrap();
        assert_eq!(src.info_header.len(), 1);
        assert_eq!(src.info_header[0].id, "fitcons");
        assert!(src.info_header[0].number_a);
        assert!(matches!(src.info_header[0].out_type, OutputType::Float));
        assert_eq!(src.header_lines.len(), 2);
    }

    #[test]
    fn malformed_line_is_logged_and_skipped() {
        let data = b"chr1\tNaN\trs1\tA\tG\t.\t.\t.\nchr1\t100\trs2\tA\tG\t.\t.\t.\n";
        let mut src = VariantSource::new(&data[..], "t.vcf", 0);
        let rec = src.next_record().unwrap().unwrap();
        assert_eq!(rec.as_variant().unwrap().id, "rs2");
        assert!(src.next_record().unwrap().is_none());
    }

    #[test]
    fn buffer_and_open_collects_header_then_still_yields_records() {
        let data: &[u8] = b"##fileformat=VCFv4.2\n##INFO=<ID=fitcons,Number=A,Type=Float,Description=\"x\">\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\nchr1\t100\t.\tA\tG\t.\t.\t.\n";
        let (mut src, header_lines) = buffer_and_open(Box::new(data), "query.vcf", 0).unwrap();
        assert_eq!(header_lines.len(), 3);
        let rec = src.next_record().unwrap().unwrap();
        assert_eq!(rec.start, 99);
    }
}
