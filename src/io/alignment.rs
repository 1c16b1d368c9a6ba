//! Alignment (BAM) record source. Unlike `bed`/`variant`, BAM's binary,
//! BGZF-block-compressed layout isn't worth hand-rolling — this is thin glue
//! over `noodles`'s sync reader, which handles BGZF framing internally.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use noodles_bam as bam;
use noodles_sam::alignment::record::Record as SamRecordExt;
use noodles_sam::Header;

use crate::error::{Result, VannoError};
use crate::merge::RecordSource;
use crate::record::{AlignmentData, Chrom, Record, RecordBody};

pub struct AlignmentSource {
    reader: bam::io::Reader<BufReader<File>>,
    header: Header,
    source_id: u32,
}

impl AlignmentSource {
    pub fn open(path: impl AsRef<Path>, source_id: u32) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        let mut reader = bam::io::Reader::new(BufReader::new(file));
        let header = reader.read_header()?;
        Ok(Self { reader, header, source_id })
    }

    fn chrom_for(&self, record: &bam::Record) -> Result<Chrom> {
        let Some(id) = record.reference_sequence_id(&self.header).transpose()? else {
            return Ok(Chrom::from("*"));
        };
        self.header
            .reference_sequences()
            .get_index(id)
            .map(|(name, _)| Chrom::from(name.as_ref() as &str))
            .ok_or_else(|| VannoError::Config("BAM reference sequence id out of range".to_string()))
    }
}

impl RecordSource for AlignmentSource {
    fn next_record(&mut self) -> Result<Option<Record>> {
        let mut record = bam::Record::default();
        loop {
            let bytes_read = self.reader.read_record(&mut record)?;
            if bytes_read == 0 {
                return Ok(None);
            }
            let Some(start) = record.alignment_start().transpose()? else { continue };
            let start = (usize::from(start) - 1) as u32;

            let reference_len: u32 = record
                .cigar()
                .iter()
                .filter_map(|op| op.ok())
                .filter(|op| op.kind().consumes_reference())
                .map(|op| op.len() as u32)
                .sum();
            let end = start + reference_len.max(1);

            let chrom = self.chrom_for(&record)?;
            let flags = record.flags()?;
            let mapq = record.mapping_quality().transpose()?.map(|q| q.get()).unwrap_or(0);
            let seq: Vec<u8> = record.sequence().iter().collect();

            return Ok(Some(Record {
                chrom,
                start,
                end,
                source_id: self.source_id,
                body: RecordBody::Alignment(AlignmentData { mapq, flags: flags.bits(), seq }),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    // Exercising this module needs a valid BGZF-framed BAM fixture; the
    // filtering/reduction logic it feeds is covered directly against
    // `AlignmentData` in `annotate::tests::bam_counter_source_counts_qualifying_reads`.
}
