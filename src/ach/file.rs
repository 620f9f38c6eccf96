//! ACH File Model
//!
//! An `AchFile` is the parsed form of one Nacha file: a file header, one or
//! more batches (header + entries + control), and a file control. Parsing
//! accepts the canonical text form produced by `write` (including block
//! padding); `create` recomputes the control records after batches change.

use std::io::{BufRead, BufReader, Read, Write};

use super::error::AchError;
use super::records::{
    check_routing_number, is_padding_line, padding_line, Addenda, BatchControl, BatchHeader,
    EntryDetail, FileControl, FileHeader, BLOCKING_FACTOR,
};

/// One ACH batch: header, entries (with addenda attached), control.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Batch {
    pub header: BatchHeader,
    pub entries: Vec<EntryDetail>,
    pub control: BatchControl,
}

impl Batch {
    pub fn new(header: BatchHeader) -> Self {
        Self {
            header,
            entries: Vec::new(),
            control: BatchControl::default(),
        }
    }

    /// Lines this batch occupies in canonical form.
    pub fn record_count(&self) -> usize {
        2 + self.entries.iter().map(|e| e.record_count()).sum::<usize>()
    }

    fn entry_addenda_count(&self) -> u32 {
        self.entries.iter().map(|e| e.record_count() as u32).sum()
    }

    /// Sum of the entries' 8-digit RDFI identifications, low 10 digits kept.
    fn entry_hash(&self) -> u64 {
        let sum: u64 = self
            .entries
            .iter()
            .map(|e| e.rdfi_identification.trim().parse::<u64>().unwrap_or(0))
            .sum();
        sum % 10_000_000_000
    }

    /// Recompute this batch's control record from its entries.
    pub fn recalculate(&mut self) {
        let mut debit = 0u64;
        let mut credit = 0u64;
        for entry in &self.entries {
            if entry.is_debit() {
                debit += entry.amount;
            } else {
                credit += entry.amount;
            }
        }
        self.control = BatchControl {
            service_class_code: self.header.service_class_code,
            entry_addenda_count: self.entry_addenda_count(),
            entry_hash: self.entry_hash(),
            total_debit: debit,
            total_credit: credit,
            company_identification: self.header.company_identification.clone(),
            message_authentication_code: String::new(),
            odfi_identification: self.header.odfi_identification.clone(),
            batch_number: self.header.batch_number,
        };
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AchFile {
    pub header: FileHeader,
    pub batches: Vec<Batch>,
    pub control: FileControl,
}

impl AchFile {
    pub fn new(header: FileHeader) -> Self {
        Self {
            header,
            batches: Vec::new(),
            control: FileControl::default(),
        }
    }

    /// Parse the canonical text form. Padding lines and a trailing newline
    /// are accepted; anything else that is not a well-formed record fails.
    pub fn parse<R: Read>(reader: R) -> Result<Self, AchError> {
        let mut header: Option<FileHeader> = None;
        let mut control: Option<FileControl> = None;
        let mut batches: Vec<Batch> = Vec::new();
        let mut open_batch: Option<Batch> = None;

        let buf = BufReader::new(reader);
        for (idx, line) in buf.lines().enumerate() {
            let line = line?;
            let number = idx + 1;
            if line.is_empty() {
                continue;
            }
            match line.as_bytes()[0] {
                b'1' => {
                    header = Some(FileHeader::parse(&line, number)?);
                }
                b'5' => {
                    if let Some(batch) = open_batch.take() {
                        batches.push(batch);
                    }
                    open_batch = Some(Batch::new(BatchHeader::parse(&line, number)?));
                }
                b'6' => {
                    let batch = open_batch
                        .as_mut()
                        .ok_or(AchError::OrphanRecord(number))?;
                    batch.entries.push(EntryDetail::parse(&line, number)?);
                }
                b'7' => {
                    let entry = open_batch
                        .as_mut()
                        .and_then(|b| b.entries.last_mut())
                        .ok_or(AchError::OrphanRecord(number))?;
                    entry.addenda.push(Addenda::parse(&line, number)?);
                }
                b'8' => {
                    let mut batch = open_batch
                        .take()
                        .ok_or(AchError::OrphanRecord(number))?;
                    batch.control = BatchControl::parse(&line, number)?;
                    batches.push(batch);
                }
                b'9' => {
                    if is_padding_line(&line) {
                        continue;
                    }
                    control = Some(FileControl::parse(&line, number)?);
                }
                other => {
                    return Err(AchError::malformed(
                        number,
                        format!("unknown record type {:?}", other as char),
                    ));
                }
            }
        }
        if let Some(batch) = open_batch.take() {
            batches.push(batch);
        }

        let header = header.ok_or(AchError::MissingFileHeader)?;
        let control = control.ok_or(AchError::MissingFileControl)?;
        Ok(Self {
            header,
            batches,
            control,
        })
    }

    /// Write the canonical text form, block-padded to a multiple of ten
    /// lines with all-nines records.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<(), AchError> {
        let mut lines: Vec<String> = Vec::with_capacity(self.line_count() + BLOCKING_FACTOR);
        lines.push(self.header.render());
        for batch in &self.batches {
            lines.push(batch.header.render());
            for entry in &batch.entries {
                lines.push(entry.render());
                for addenda in &entry.addenda {
                    lines.push(addenda.render());
                }
            }
            lines.push(batch.control.render());
        }
        lines.push(self.control.render());
        while lines.len() % BLOCKING_FACTOR != 0 {
            lines.push(padding_line());
        }

        for line in &lines {
            writer.write_all(line.as_bytes())?;
            writer.write_all(b"\n")?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn add_batch(&mut self, batch: Batch) {
        self.batches.push(batch);
    }

    /// Remove the first batch whose header equals the given one.
    pub fn remove_batch(&mut self, header: &BatchHeader) {
        if let Some(pos) = self.batches.iter().position(|b| &b.header == header) {
            self.batches.remove(pos);
        }
    }

    /// Canonical record count, without block padding. The Nacha transfer
    /// limit of 10,000 lines applies to this number.
    pub fn line_count(&self) -> usize {
        2 + self.batches.iter().map(|b| b.record_count()).sum::<usize>()
    }

    /// Recompute every batch control and the file control.
    pub fn create(&mut self) -> Result<(), AchError> {
        let mut entry_addenda = 0u32;
        let mut hash = 0u64;
        let mut debit = 0u64;
        let mut credit = 0u64;
        for batch in &mut self.batches {
            batch.recalculate();
            entry_addenda += batch.control.entry_addenda_count;
            hash += batch.control.entry_hash;
            debit += batch.control.total_debit;
            credit += batch.control.total_credit;
        }
        let records = self.line_count();
        self.control = FileControl {
            batch_count: self.batches.len() as u32,
            block_count: ((records + BLOCKING_FACTOR - 1) / BLOCKING_FACTOR) as u32,
            entry_addenda_count: entry_addenda,
            entry_hash: hash % 10_000_000_000,
            total_debit: debit,
            total_credit: credit,
        };
        Ok(())
    }

    /// Structural validation: well-formed destination routing number and at
    /// least the shape every downstream phase relies on.
    pub fn validate(&self) -> Result<(), AchError> {
        check_routing_number(&self.header.immediate_destination)?;
        for batch in &self.batches {
            if !self.header.immediate_destination.starts_with(
                batch.header.odfi_identification.trim(),
            ) && !self
                .header
                .immediate_origin
                .starts_with(batch.header.odfi_identification.trim())
            {
                // The ODFI identification is the first eight digits of either
                // side of the file header. A batch pointing elsewhere was
                // merged into the wrong file.
                return Err(AchError::DestinationMismatch {
                    batch: batch.header.batch_number,
                    got: batch.header.odfi_identification.clone(),
                    want: self.header.immediate_destination.clone(),
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ach::testutil::{ppd_debit_file, web_return_file};

    #[test]
    fn test_write_parse_roundtrip() {
        let mut file = ppd_debit_file();
        file.create().unwrap();

        let mut buf = Vec::new();
        file.write(&mut buf).unwrap();

        let text = String::from_utf8(buf.clone()).unwrap();
        let line_count = text.lines().count();
        assert_eq!(line_count % 10, 0, "output must be block padded");
        for line in text.lines() {
            assert_eq!(line.len(), 94);
        }

        let parsed = AchFile::parse(&buf[..]).unwrap();
        assert_eq!(parsed.header, file.header);
        assert_eq!(parsed.batches.len(), 1);
        assert_eq!(parsed.batches[0].entries.len(), 1);
        assert_eq!(parsed.batches[0].header.standard_entry_class_code, "PPD");
    }

    #[test]
    fn test_parse_return_file() {
        let mut buf = Vec::new();
        let mut file = web_return_file("R02");
        file.create().unwrap();
        file.write(&mut buf).unwrap();

        let parsed = AchFile::parse(&buf[..]).unwrap();
        let entry = &parsed.batches[0].entries[0];
        let addenda = entry.addenda99().expect("return addenda");
        assert_eq!(addenda.return_code, "R02");
        assert_eq!(parsed.batches[0].header.standard_entry_class_code, "WEB");
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = AchFile::parse("invalid ACH file contents".as_bytes());
        assert!(err.is_err());
    }

    #[test]
    fn test_parse_rejects_orphan_entry() {
        let mut file = ppd_debit_file();
        file.create().unwrap();
        let mut buf = Vec::new();
        file.write(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        // drop the batch header so the entry has no open batch
        let broken: String = text
            .lines()
            .filter(|l| !l.starts_with('5'))
            .map(|l| format!("{}\n", l))
            .collect();
        assert!(matches!(
            AchFile::parse(broken.as_bytes()),
            Err(AchError::OrphanRecord(_))
        ));
    }

    #[test]
    fn test_line_count() {
        let mut file = ppd_debit_file();
        file.create().unwrap();
        // header + (batch header + entry + batch control) + control
        assert_eq!(file.line_count(), 5);

        let extra = file.batches[0].clone();
        file.add_batch(extra);
        assert_eq!(file.line_count(), 8);
    }

    #[test]
    fn test_remove_batch() {
        let mut file = ppd_debit_file();
        let header = file.batches[0].header.clone();
        file.remove_batch(&header);
        assert!(file.batches.is_empty());

        // removing again is a no-op
        file.remove_batch(&header);
        assert!(file.batches.is_empty());
    }

    #[test]
    fn test_create_totals() {
        let mut file = ppd_debit_file();
        file.create().unwrap();
        let control = &file.batches[0].control;
        assert_eq!(control.entry_addenda_count, 1);
        assert_eq!(control.total_debit, file.batches[0].entries[0].amount);
        assert_eq!(control.total_credit, 0);
        assert_eq!(file.control.batch_count, 1);
        assert_eq!(file.control.total_debit, control.total_debit);
    }

    #[test]
    fn test_validate() {
        let mut file = ppd_debit_file();
        file.create().unwrap();
        assert!(file.validate().is_ok());

        file.header.immediate_destination = "12345".to_string();
        assert!(file.validate().is_err());
    }
}
