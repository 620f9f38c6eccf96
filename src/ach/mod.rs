//! ACH File Codec
//!
//! Parse, build, and serialize Nacha-format ACH files. Only the record
//! shapes the transfer pipeline needs are modeled: PPD/WEB batches with
//! entry details, payment-related (05) and return (99) addenda.

pub mod error;
pub mod file;
pub mod records;

pub use error::AchError;
pub use file::{AchFile, Batch};
pub use records::{
    check_routing_number, Addenda, Addenda05, Addenda99, BatchControl, BatchHeader, EntryDetail,
    FileControl, FileHeader,
};

#[cfg(test)]
pub mod testutil {
    //! Programmatic ACH fixtures, standing in for the usual testdata files.

    use super::records::*;
    use super::{AchFile, Batch};

    /// A single-batch PPD debit file (one $500.00 checking debit).
    pub fn ppd_debit_file() -> AchFile {
        let header = FileHeader {
            immediate_destination: "231380104".to_string(),
            immediate_origin: "121042882".to_string(),
            file_creation_date: "190816".to_string(),
            file_creation_time: "1055".to_string(),
            file_id_modifier: 'A',
            immediate_destination_name: "Citadel".to_string(),
            immediate_origin_name: "Wells Fargo".to_string(),
            reference_code: String::new(),
        };
        let batch_header = BatchHeader {
            service_class_code: 225,
            company_name: "Wells Fargo".to_string(),
            company_discretionary_data: String::new(),
            company_identification: "121042882".to_string(),
            standard_entry_class_code: "PPD".to_string(),
            company_entry_description: "Trans. Des".to_string(),
            company_descriptive_date: String::new(),
            effective_entry_date: "190816".to_string(),
            settlement_date: String::new(),
            originator_status_code: '1',
            odfi_identification: "12104288".to_string(),
            batch_number: 1,
        };
        let entry = EntryDetail {
            transaction_code: 27,
            rdfi_identification: "23138010".to_string(),
            check_digit: '4',
            dfi_account_number: "744-5678-99".to_string(),
            amount: 50_000,
            individual_identification_number: "location1234567".to_string(),
            individual_name: "Best Co. #123456789012".to_string(),
            discretionary_data: "S ".to_string(),
            addenda_record_indicator: 0,
            trace_number: "121042880000001".to_string(),
            addenda: Vec::new(),
        };
        let mut batch = Batch::new(batch_header);
        batch.entries.push(entry);
        let mut file = AchFile::new(header);
        file.add_batch(batch);
        file
    }

    /// A WEB return file carrying one returned $52.12 debit with the given
    /// return code in its Addenda99.
    pub fn web_return_file(return_code: &str) -> AchFile {
        let header = FileHeader {
            immediate_destination: "091400606".to_string(),
            immediate_origin: "076401251".to_string(),
            file_creation_date: "190404".to_string(),
            file_creation_time: "0730".to_string(),
            file_id_modifier: 'A',
            immediate_destination_name: "Federal Reserve Bank".to_string(),
            immediate_origin_name: "My Bank Name".to_string(),
            reference_code: String::new(),
        };
        let batch_header = BatchHeader {
            service_class_code: 200,
            company_name: "My Company".to_string(),
            company_discretionary_data: String::new(),
            company_identification: "123121".to_string(),
            standard_entry_class_code: "WEB".to_string(),
            company_entry_description: "Subscribe".to_string(),
            company_descriptive_date: String::new(),
            effective_entry_date: "190404".to_string(),
            settlement_date: String::new(),
            originator_status_code: '1',
            odfi_identification: "07640125".to_string(),
            batch_number: 1,
        };
        let entry = EntryDetail {
            transaction_code: 26,
            rdfi_identification: "09140060".to_string(),
            check_digit: '6',
            dfi_account_number: "123456789".to_string(),
            amount: 5212,
            individual_identification_number: "internal-id".to_string(),
            individual_name: "Jane Doe".to_string(),
            discretionary_data: String::new(),
            addenda_record_indicator: 1,
            trace_number: "076401255655291".to_string(),
            addenda: vec![Addenda::Return(Addenda99 {
                return_code: return_code.to_string(),
                original_trace: "091400606301109".to_string(),
                date_of_death: String::new(),
                original_dfi: "09140060".to_string(),
                addenda_information: String::new(),
                trace_number: "076401255655291".to_string(),
            })],
        };
        let mut batch = Batch::new(batch_header);
        batch.entries.push(entry);
        let mut file = AchFile::new(header);
        file.add_batch(batch);
        file
    }
}
