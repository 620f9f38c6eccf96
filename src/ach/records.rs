//! ACH Record Types
//!
//! Fixed-width (94 character) Nacha records: file header/control, batch
//! header/control, entry detail, and the two addenda shapes the pipeline
//! touches (05 payment-related, 99 return). Each type knows how to render
//! itself to its canonical line and how to parse itself back.

use super::error::AchError;

pub const RECORD_LENGTH: usize = 94;

/// Lines per block; files are padded with all-nines lines to a multiple of
/// this when written.
pub const BLOCKING_FACTOR: usize = 10;

// ---------------------------------------------------------------------------
// Fixed-width field helpers
// ---------------------------------------------------------------------------

/// Left-justified, space padded, truncated alphanumeric field.
fn alpha(s: &str, width: usize) -> String {
    let mut out: String = s.chars().take(width).collect();
    while out.len() < width {
        out.push(' ');
    }
    out
}

/// Right-justified, zero padded numeric field. Values wider than the field
/// keep their low-order digits, matching Nacha truncation for hash fields.
fn numeric(n: u64, width: usize) -> String {
    let s = n.to_string();
    if s.len() > width {
        s[s.len() - width..].to_string()
    } else {
        format!("{:0>width$}", s, width = width)
    }
}

/// Routing numbers in the file header occupy 10 characters, right
/// justified with a leading space.
fn routing10(s: &str) -> String {
    format!("{:>10}", s.chars().take(10).collect::<String>())
}

/// A parsed line with positional accessors.
struct Line<'a> {
    raw: &'a str,
    number: usize,
}

impl<'a> Line<'a> {
    fn new(raw: &'a str, number: usize) -> Result<Self, AchError> {
        if raw.len() != RECORD_LENGTH {
            return Err(AchError::malformed(
                number,
                format!("record is {} characters, want {}", raw.len(), RECORD_LENGTH),
            ));
        }
        if !raw.is_ascii() {
            return Err(AchError::malformed(number, "record contains non-ASCII bytes"));
        }
        Ok(Self { raw, number })
    }

    fn take(&self, start: usize, len: usize) -> &'a str {
        &self.raw[start..start + len]
    }

    fn take_trim(&self, start: usize, len: usize) -> String {
        self.take(start, len).trim().to_string()
    }

    fn take_u64(&self, start: usize, len: usize) -> Result<u64, AchError> {
        let field = self.take(start, len).trim();
        if field.is_empty() {
            return Ok(0);
        }
        field.parse::<u64>().map_err(|_| {
            AchError::malformed(
                self.number,
                format!("non-numeric field {:?} at offset {}", field, start),
            )
        })
    }
}

/// Nacha check digit for an 8-digit routing prefix (3-7-1 weighting).
pub fn routing_check_digit(prefix: &str) -> Option<u32> {
    if prefix.len() != 8 || !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let weights = [3u32, 7, 1, 3, 7, 1, 3, 7];
    let sum: u32 = prefix
        .chars()
        .zip(weights.iter())
        .map(|(c, w)| c.to_digit(10).unwrap_or(0) * w)
        .sum();
    Some((10 - (sum % 10)) % 10)
}

/// Validate a full 9-digit ABA routing number.
pub fn check_routing_number(routing: &str) -> Result<(), AchError> {
    if routing.len() != 9 || !routing.chars().all(|c| c.is_ascii_digit()) {
        return Err(AchError::InvalidRoutingNumber(routing.to_string()));
    }
    let want = routing_check_digit(&routing[..8]);
    let got = routing[8..].chars().next().and_then(|c| c.to_digit(10));
    if want.is_none() || want != got {
        return Err(AchError::InvalidRoutingNumber(routing.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// File Header (record type 1)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileHeader {
    pub immediate_destination: String,
    pub immediate_origin: String,
    /// YYMMDD
    pub file_creation_date: String,
    /// HHMM
    pub file_creation_time: String,
    pub file_id_modifier: char,
    pub immediate_destination_name: String,
    pub immediate_origin_name: String,
    pub reference_code: String,
}

impl FileHeader {
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(RECORD_LENGTH);
        out.push('1');
        out.push_str("01");
        out.push_str(&routing10(&self.immediate_destination));
        out.push_str(&routing10(&self.immediate_origin));
        out.push_str(&alpha(&self.file_creation_date, 6));
        out.push_str(&alpha(&self.file_creation_time, 4));
        out.push(if self.file_id_modifier == '\0' {
            'A'
        } else {
            self.file_id_modifier
        });
        out.push_str("094");
        out.push_str("10");
        out.push('1');
        out.push_str(&alpha(&self.immediate_destination_name, 23));
        out.push_str(&alpha(&self.immediate_origin_name, 23));
        out.push_str(&alpha(&self.reference_code, 8));
        out
    }

    pub fn parse(raw: &str, number: usize) -> Result<Self, AchError> {
        let line = Line::new(raw, number)?;
        Ok(Self {
            immediate_destination: line.take_trim(3, 10),
            immediate_origin: line.take_trim(13, 10),
            file_creation_date: line.take_trim(23, 6),
            file_creation_time: line.take_trim(29, 4),
            file_id_modifier: line.take(33, 1).chars().next().unwrap_or('A'),
            immediate_destination_name: line.take_trim(40, 23),
            immediate_origin_name: line.take_trim(63, 23),
            reference_code: line.take_trim(86, 8),
        })
    }
}

// ---------------------------------------------------------------------------
// Batch Header (record type 5)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchHeader {
    pub service_class_code: u16,
    pub company_name: String,
    pub company_discretionary_data: String,
    pub company_identification: String,
    pub standard_entry_class_code: String,
    pub company_entry_description: String,
    pub company_descriptive_date: String,
    pub effective_entry_date: String,
    pub settlement_date: String,
    pub originator_status_code: char,
    pub odfi_identification: String,
    pub batch_number: u32,
}

impl BatchHeader {
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(RECORD_LENGTH);
        out.push('5');
        out.push_str(&numeric(self.service_class_code as u64, 3));
        out.push_str(&alpha(&self.company_name, 16));
        out.push_str(&alpha(&self.company_discretionary_data, 20));
        out.push_str(&alpha(&self.company_identification, 10));
        out.push_str(&alpha(&self.standard_entry_class_code, 3));
        out.push_str(&alpha(&self.company_entry_description, 10));
        out.push_str(&alpha(&self.company_descriptive_date, 6));
        out.push_str(&alpha(&self.effective_entry_date, 6));
        out.push_str(&alpha(&self.settlement_date, 3));
        out.push(if self.originator_status_code == '\0' {
            '1'
        } else {
            self.originator_status_code
        });
        out.push_str(&alpha(&self.odfi_identification, 8));
        out.push_str(&numeric(self.batch_number as u64, 7));
        out
    }

    pub fn parse(raw: &str, number: usize) -> Result<Self, AchError> {
        let line = Line::new(raw, number)?;
        Ok(Self {
            service_class_code: line.take_u64(1, 3)? as u16,
            company_name: line.take_trim(4, 16),
            company_discretionary_data: line.take_trim(20, 20),
            company_identification: line.take_trim(40, 10),
            standard_entry_class_code: line.take_trim(50, 3),
            company_entry_description: line.take_trim(53, 10),
            company_descriptive_date: line.take_trim(63, 6),
            effective_entry_date: line.take_trim(69, 6),
            settlement_date: line.take_trim(75, 3),
            originator_status_code: line.take(78, 1).chars().next().unwrap_or('1'),
            odfi_identification: line.take_trim(79, 8),
            batch_number: line.take_u64(87, 7)? as u32,
        })
    }
}

// ---------------------------------------------------------------------------
// Entry Detail (record type 6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryDetail {
    pub transaction_code: u8,
    pub rdfi_identification: String,
    pub check_digit: char,
    pub dfi_account_number: String,
    /// Cents.
    pub amount: u64,
    pub individual_identification_number: String,
    pub individual_name: String,
    pub discretionary_data: String,
    pub addenda_record_indicator: u8,
    pub trace_number: String,
    pub addenda: Vec<Addenda>,
}

impl EntryDetail {
    /// Transaction codes ending 0-4 are credits, 5-9 are debits.
    pub fn is_debit(&self) -> bool {
        self.transaction_code % 10 >= 5
    }

    /// Lines this entry contributes (itself plus addenda).
    pub fn record_count(&self) -> usize {
        1 + self.addenda.len()
    }

    /// The return addenda attached to this entry, if any.
    pub fn addenda99(&self) -> Option<&Addenda99> {
        self.addenda.iter().find_map(|a| match a {
            Addenda::Return(r) => Some(r),
            _ => None,
        })
    }

    pub fn render(&self) -> String {
        let mut out = String::with_capacity(RECORD_LENGTH);
        out.push('6');
        out.push_str(&numeric(self.transaction_code as u64, 2));
        out.push_str(&alpha(&self.rdfi_identification, 8));
        out.push(self.check_digit);
        out.push_str(&alpha(&self.dfi_account_number, 17));
        out.push_str(&numeric(self.amount, 10));
        out.push_str(&alpha(&self.individual_identification_number, 15));
        out.push_str(&alpha(&self.individual_name, 22));
        out.push_str(&alpha(&self.discretionary_data, 2));
        out.push_str(&numeric(self.addenda_record_indicator as u64, 1));
        out.push_str(&alpha(&self.trace_number, 15));
        out
    }

    pub fn parse(raw: &str, number: usize) -> Result<Self, AchError> {
        let line = Line::new(raw, number)?;
        Ok(Self {
            transaction_code: line.take_u64(1, 2)? as u8,
            rdfi_identification: line.take_trim(3, 8),
            check_digit: line.take(11, 1).chars().next().unwrap_or('0'),
            dfi_account_number: line.take_trim(12, 17),
            amount: line.take_u64(29, 10)?,
            individual_identification_number: line.take_trim(39, 15),
            individual_name: line.take_trim(54, 22),
            discretionary_data: line.take_trim(76, 2),
            addenda_record_indicator: line.take_u64(78, 1)? as u8,
            trace_number: line.take_trim(79, 15),
            addenda: Vec::new(),
        })
    }
}

// ---------------------------------------------------------------------------
// Addenda records (record type 7)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Addenda {
    /// Addenda type 05 - payment related information (WEB, CCD, ...).
    PaymentRelated(Addenda05),
    /// Addenda type 99 - return entry.
    Return(Addenda99),
}

impl Addenda {
    pub fn render(&self) -> String {
        match self {
            Addenda::PaymentRelated(a) => a.render(),
            Addenda::Return(a) => a.render(),
        }
    }

    pub fn parse(raw: &str, number: usize) -> Result<Self, AchError> {
        let line = Line::new(raw, number)?;
        match line.take(1, 2) {
            "05" => Ok(Addenda::PaymentRelated(Addenda05::parse(raw, number)?)),
            "99" => Ok(Addenda::Return(Addenda99::parse(raw, number)?)),
            other => Err(AchError::malformed(
                number,
                format!("unsupported addenda type {:?}", other),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Addenda05 {
    pub payment_related_information: String,
    pub addenda_sequence_number: u32,
    pub entry_detail_sequence_number: u32,
}

impl Addenda05 {
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(RECORD_LENGTH);
        out.push('7');
        out.push_str("05");
        out.push_str(&alpha(&self.payment_related_information, 80));
        out.push_str(&numeric(self.addenda_sequence_number as u64, 4));
        out.push_str(&numeric(self.entry_detail_sequence_number as u64, 7));
        out
    }

    pub fn parse(raw: &str, number: usize) -> Result<Self, AchError> {
        let line = Line::new(raw, number)?;
        Ok(Self {
            payment_related_information: line.take_trim(3, 80),
            addenda_sequence_number: line.take_u64(83, 4)? as u32,
            entry_detail_sequence_number: line.take_u64(87, 7)? as u32,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Addenda99 {
    pub return_code: String,
    pub original_trace: String,
    pub date_of_death: String,
    pub original_dfi: String,
    pub addenda_information: String,
    pub trace_number: String,
}

impl Addenda99 {
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(RECORD_LENGTH);
        out.push('7');
        out.push_str("99");
        out.push_str(&alpha(&self.return_code, 3));
        out.push_str(&alpha(&self.original_trace, 15));
        out.push_str(&alpha(&self.date_of_death, 6));
        out.push_str(&alpha(&self.original_dfi, 8));
        out.push_str(&alpha(&self.addenda_information, 44));
        out.push_str(&alpha(&self.trace_number, 15));
        out
    }

    pub fn parse(raw: &str, number: usize) -> Result<Self, AchError> {
        let line = Line::new(raw, number)?;
        Ok(Self {
            return_code: line.take_trim(3, 3),
            original_trace: line.take_trim(6, 15),
            date_of_death: line.take_trim(21, 6),
            original_dfi: line.take_trim(27, 8),
            addenda_information: line.take_trim(35, 44),
            trace_number: line.take_trim(79, 15),
        })
    }
}

// ---------------------------------------------------------------------------
// Batch Control (record type 8)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BatchControl {
    pub service_class_code: u16,
    pub entry_addenda_count: u32,
    pub entry_hash: u64,
    pub total_debit: u64,
    pub total_credit: u64,
    pub company_identification: String,
    pub message_authentication_code: String,
    pub odfi_identification: String,
    pub batch_number: u32,
}

impl BatchControl {
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(RECORD_LENGTH);
        out.push('8');
        out.push_str(&numeric(self.service_class_code as u64, 3));
        out.push_str(&numeric(self.entry_addenda_count as u64, 6));
        out.push_str(&numeric(self.entry_hash, 10));
        out.push_str(&numeric(self.total_debit, 12));
        out.push_str(&numeric(self.total_credit, 12));
        out.push_str(&alpha(&self.company_identification, 10));
        out.push_str(&alpha(&self.message_authentication_code, 19));
        out.push_str(&alpha("", 6));
        out.push_str(&alpha(&self.odfi_identification, 8));
        out.push_str(&numeric(self.batch_number as u64, 7));
        out
    }

    pub fn parse(raw: &str, number: usize) -> Result<Self, AchError> {
        let line = Line::new(raw, number)?;
        Ok(Self {
            service_class_code: line.take_u64(1, 3)? as u16,
            entry_addenda_count: line.take_u64(4, 6)? as u32,
            entry_hash: line.take_u64(10, 10)?,
            total_debit: line.take_u64(20, 12)?,
            total_credit: line.take_u64(32, 12)?,
            company_identification: line.take_trim(44, 10),
            message_authentication_code: line.take_trim(54, 19),
            odfi_identification: line.take_trim(79, 8),
            batch_number: line.take_u64(87, 7)? as u32,
        })
    }
}

// ---------------------------------------------------------------------------
// File Control (record type 9)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileControl {
    pub batch_count: u32,
    pub block_count: u32,
    pub entry_addenda_count: u32,
    pub entry_hash: u64,
    pub total_debit: u64,
    pub total_credit: u64,
}

impl FileControl {
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(RECORD_LENGTH);
        out.push('9');
        out.push_str(&numeric(self.batch_count as u64, 6));
        out.push_str(&numeric(self.block_count as u64, 6));
        out.push_str(&numeric(self.entry_addenda_count as u64, 8));
        out.push_str(&numeric(self.entry_hash, 10));
        out.push_str(&numeric(self.total_debit, 12));
        out.push_str(&numeric(self.total_credit, 12));
        out.push_str(&alpha("", 39));
        out
    }

    pub fn parse(raw: &str, number: usize) -> Result<Self, AchError> {
        let line = Line::new(raw, number)?;
        Ok(Self {
            batch_count: line.take_u64(1, 6)? as u32,
            block_count: line.take_u64(7, 6)? as u32,
            entry_addenda_count: line.take_u64(13, 8)? as u32,
            entry_hash: line.take_u64(21, 10)?,
            total_debit: line.take_u64(31, 12)?,
            total_credit: line.take_u64(43, 12)?,
        })
    }
}

/// A block-filler line: all nines.
pub fn padding_line() -> String {
    "9".repeat(RECORD_LENGTH)
}

pub fn is_padding_line(raw: &str) -> bool {
    raw.len() == RECORD_LENGTH && raw.chars().all(|c| c == '9')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_helpers() {
        assert_eq!(alpha("PPD", 3), "PPD");
        assert_eq!(alpha("AB", 4), "AB  ");
        assert_eq!(alpha("TOOLONG", 4), "TOOL");
        assert_eq!(numeric(42, 6), "000042");
        assert_eq!(numeric(1234567890123, 10), "4567890123");
        assert_eq!(routing10("123456789"), " 123456789");
    }

    #[test]
    fn test_routing_check_digit() {
        // 09140060 -> 6 (a live Federal Reserve routing number)
        assert_eq!(routing_check_digit("09140060"), Some(6));
        assert!(check_routing_number("091400606").is_ok());
        assert!(check_routing_number("091400607").is_err());
        assert!(check_routing_number("12345").is_err());
        assert!(check_routing_number("abcdefghi").is_err());
    }

    #[test]
    fn test_file_header_roundtrip() {
        let header = FileHeader {
            immediate_destination: "091400606".to_string(),
            immediate_origin: "076401251".to_string(),
            file_creation_date: "190101".to_string(),
            file_creation_time: "1504".to_string(),
            file_id_modifier: 'A',
            immediate_destination_name: "Federal Reserve Bank".to_string(),
            immediate_origin_name: "My Bank Name".to_string(),
            reference_code: String::new(),
        };
        let line = header.render();
        assert_eq!(line.len(), RECORD_LENGTH);
        assert_eq!(FileHeader::parse(&line, 1).unwrap(), header);
    }

    #[test]
    fn test_entry_detail_roundtrip() {
        let entry = EntryDetail {
            transaction_code: 27,
            rdfi_identification: "23138010".to_string(),
            check_digit: '4',
            dfi_account_number: "744-5678-99".to_string(),
            amount: 500000,
            individual_identification_number: "location1234567".to_string(),
            individual_name: "Best Co. #123456789012".to_string(),
            discretionary_data: "S ".to_string(),
            addenda_record_indicator: 0,
            trace_number: "031300010000001".to_string(),
            addenda: Vec::new(),
        };
        let line = entry.render();
        assert_eq!(line.len(), RECORD_LENGTH);
        let parsed = EntryDetail::parse(&line, 3).unwrap();
        assert_eq!(parsed.amount, 500000);
        assert_eq!(parsed.dfi_account_number, "744-5678-99");
        assert!(parsed.is_debit());
    }

    #[test]
    fn test_addenda99_roundtrip() {
        let addenda = Addenda99 {
            return_code: "R02".to_string(),
            original_trace: "091400600000001".to_string(),
            date_of_death: String::new(),
            original_dfi: "09140060".to_string(),
            addenda_information: String::new(),
            trace_number: "091400600000001".to_string(),
        };
        let line = addenda.render();
        assert_eq!(line.len(), RECORD_LENGTH);
        match Addenda::parse(&line, 4).unwrap() {
            Addenda::Return(parsed) => {
                assert_eq!(parsed.return_code, "R02");
                assert_eq!(parsed.original_trace, "091400600000001");
            }
            other => panic!("parsed wrong addenda type: {:?}", other),
        }
    }

    #[test]
    fn test_unsupported_addenda_type() {
        let mut line = Addenda05::default().render();
        line.replace_range(1..3, "02");
        assert!(Addenda::parse(&line, 9).is_err());
    }

    #[test]
    fn test_record_length_enforced() {
        assert!(FileHeader::parse("1 too short", 1).is_err());
        assert!(BatchHeader::parse(&"5".repeat(93), 2).is_err());
    }

    #[test]
    fn test_padding_line() {
        let pad = padding_line();
        assert_eq!(pad.len(), RECORD_LENGTH);
        assert!(is_padding_line(&pad));
        assert!(!is_padding_line(&FileControl::default().render()));
    }

    #[test]
    fn test_credit_debit_classification() {
        let mut entry = EntryDetail::default();
        entry.transaction_code = 22;
        assert!(!entry.is_debit());
        entry.transaction_code = 27;
        assert!(entry.is_debit());
        entry.transaction_code = 32;
        assert!(!entry.is_debit());
        entry.transaction_code = 37;
        assert!(entry.is_debit());
    }
}
