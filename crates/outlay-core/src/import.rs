//! CSV transaction loader
//!
//! Reads the canonical export format used by the ingestion pipeline:
//!
//! ```text
//! id,account_id,date,description,amount_minor,status,category
//! ```
//!
//! Rows come back as raw records; validation happens downstream where a
//! malformed row is skipped instead of aborting the batch. A missing date or
//! blank id therefore parses fine here and gets rejected later with a log
//! line.

use std::io::Read;

use chrono::NaiveDate;
use csv::{ReaderBuilder, StringRecord};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{TransactionRecord, TransactionStatus};

/// Parse CSV data into raw transaction records
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<TransactionRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = rdr.headers()?.clone();
    let columns = Columns::from_headers(&headers)?;

    let mut records = Vec::new();
    for result in rdr.records() {
        let record = result?;
        records.push(columns.parse_record(&record)?);
    }

    debug!("Parsed {} transaction records", records.len());
    Ok(records)
}

/// Column indexes resolved from the header row, so column order can vary
struct Columns {
    id: usize,
    account_id: usize,
    date: usize,
    description: usize,
    amount_minor: usize,
    status: Option<usize>,
    category: Option<usize>,
}

impl Columns {
    fn from_headers(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        let require = |name: &str| {
            find(name).ok_or_else(|| Error::InvalidData(format!("Missing CSV column: {}", name)))
        };

        Ok(Self {
            id: require("id")?,
            account_id: require("account_id")?,
            date: require("date")?,
            description: require("description")?,
            amount_minor: require("amount_minor")?,
            status: find("status"),
            category: find("category"),
        })
    }

    fn parse_record(&self, record: &StringRecord) -> Result<TransactionRecord> {
        let field = |i: usize| record.get(i).unwrap_or("").trim();

        let posted = match field(self.date) {
            "" => None,
            s => Some(parse_date(s)?),
        };

        let amount_str = field(self.amount_minor);
        let amount_minor = parse_amount_minor(amount_str)?;

        let status = match self.status.map(field).unwrap_or("") {
            "" => TransactionStatus::Settled,
            s => s
                .parse()
                .map_err(|_| Error::InvalidData(format!("Unknown status: {}", s)))?,
        };

        let user_category = self
            .category
            .map(field)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        Ok(TransactionRecord {
            id: field(self.id).to_string(),
            account_id: field(self.account_id).to_string(),
            posted,
            amount_minor,
            description: field(self.description).to_string(),
            user_category,
            status,
        })
    }
}

/// Parse a date string in the common formats exports use
fn parse_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();

    let formats = [
        "%Y-%m-%d", // 2024-01-15
        "%m/%d/%Y", // 01/15/2024
        "%m/%d/%y", // 01/15/24
    ];

    for fmt in formats {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(date);
        }
    }

    Err(Error::InvalidData(format!("Unable to parse date: {}", s)))
}

/// Parse a signed minor-unit amount, tolerating separators and parentheses
fn parse_amount_minor(s: &str) -> Result<i64> {
    let cleaned: String = s
        .trim()
        .replace([',', ' '], "")
        .replace('(', "-")
        .replace(')', "");

    cleaned
        .parse::<i64>()
        .map_err(|_| Error::InvalidData(format!("Unable to parse amount: {}", s)))
}
