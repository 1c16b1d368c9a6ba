//! BED record source: same line-skipping rules and line-numbered error
//! reporting as a plain BED tokenizer, retargeted to produce
//! `crate::record::Record` and implement `crate::merge::RecordSource`.

use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, VannoError};
use crate::merge::RecordSource;
use crate::record::{IntervalData, Record, RecordBody};

pub struct BedSource<R> {
    reader: BufReader<R>,
    path: String,
    line_number: usize,
    line: String,
    source_id: u32,
}

impl BedSource<Box<dyn Read>> {
    pub fn open(path: impl AsRef<Path>, source_id: u32) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let reader = super::open_possibly_gzipped(path)?;
        Ok(Self::new(reader, display, source_id))
    }
}

impl<R: Read> BedSource<R> {
    pub fn new(reader: R, path: impl Into<String>, source_id: u32) -> Self {
        Self {
            reader: BufReader::new(reader),
            path: path.into(),
            line_number: 0,
            line: String::with_capacity(256),
            source_id,
        }
    }

    fn parse_err(&self, message: impl Into<String>) -> VannoError {
        VannoError::Parse { file: self.path.clone(), line: self.line_number, message: message.into() }
    }

    fn parse_line(&self, line: &str) -> Result<Record> {
        let mut fields = line.split('\t');
        let chrom = fields.next().ok_or_else(|| self.parse_err("missing chrom column"))?;
        let start: u32 = fields
            .next()
            .ok_or_else(|| self.parse_err("missing start column"))?
            .parse()
            .map_err(|_| self.parse_err("non-numeric start column"))?;
        let end: u32 = fields
            .next()
            .ok_or_else(|| self.parse_err("missing end column"))?
            .parse()
            .map_err(|_| self.parse_err("non-numeric end column"))?;
        let extra: Vec<Vec<u8>> = fields.map(|f| f.as_bytes().to_vec()).collect();
        Ok(Record {
            chrom: Arc::from(chrom),
            start,
            end,
            source_id: self.source_id,
            body: RecordBody::Interval(IntervalData { fields: extra }),
        })
    }
}

impl<R: Read> RecordSource for BedSource<R> {
    fn next_record(&mut self) -> Result<Option<Record>> {
        loop {
            self.line.clear();
            let n = self.reader.read_line(&mut self.line)?;
            if n == 0 {
                return Ok(None);
            }
            self.line_number += 1;
            let trimmed = self.line.trim_end_matches(['\n', '\r']);
            if trimmed.is_empty()
                || trimmed.starts_with('#')
                || trimmed.starts_with("track")
                || trimmed.starts_with("browser")
            {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_header_and_comment_lines() {
        let data = b"track name=x\n#comment\nchr1\t10\t20\tfoo\n";
        let mut src = BedSource::new(&data[..], "test.bed", 1);
        let rec = src.next_record().unwrap().unwrap();
        assert_eq!(rec.start, 10);
        assert_eq!(rec.end, 20);
        assert!(src.next_record().unwrap().is_none());
    }

    #[test]
    fn keeps_extra_columns_for_selector_lookup() {
        let data = b"chr1\t10\t20\tname\t5\t+\n";
        let mut src = BedSource::new(&data[..], "test.bed", 1);
        let rec = src.next_record().unwrap().unwrap();
        let interval = rec.as_interval().unwrap();
        assert_eq!(interval.column(4), Some(b"name".as_ref()));
        assert_eq!(interval.column(5), Some(b"5".as_ref()));
    }

    #[test]
    fn malformed_line_is_logged_and_skipped() {
        let data = b"chr1\tNaN\t20\nchr1\t10\t20\tok\n";
        let mut src = BedSource::new(&data[..], "test.bed", 1);
        let rec = src.next_record().unwrap().unwrap();
        assert_eq!(rec.start, 10);
        assert!(src.next_record().unwrap().is_none());
    }
}
