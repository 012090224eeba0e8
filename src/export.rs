//! Export of run results as CSV or JSON.
//!
//! CSV carries one row per [`MarkerRecord`] in record order:
//!
//! ```text
//! page_id,cycle_id,page_number,text,has_marker
//! 1,1,i,see note,true
//! ```
//!
//! A missing `page_number` becomes an empty cell. JSON is the whole
//! [`RunResult`], pretty-printed.

use crate::error::MagnifierError;
use crate::output::{MarkerRecord, RunResult};
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::str::FromStr;

/// Output file format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Json => "json",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ExportFormat {
    type Err = MagnifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(MagnifierError::InvalidConfig(format!(
                "unknown export format '{other}' (expected csv or json)"
            ))),
        }
    }
}

#[derive(Serialize)]
struct CsvRow<'a> {
    page_id: usize,
    cycle_id: i64,
    page_number: String,
    text: &'a str,
    has_marker: bool,
}

impl<'a> From<&'a MarkerRecord> for CsvRow<'a> {
    fn from(r: &'a MarkerRecord) -> Self {
        Self {
            page_id: r.page_id,
            cycle_id: r.cycle_id,
            page_number: r
                .page_number
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_default(),
            text: &r.text,
            has_marker: r.has_marker,
        }
    }
}

const CSV_HEADER: [&str; 5] = ["page_id", "cycle_id", "page_number", "text", "has_marker"];

/// Write `records` as CSV. The header is written even when there are no rows.
pub fn write_csv<W: Write>(records: &[MarkerRecord], writer: W) -> Result<(), MagnifierError> {
    let csv_err = |e: csv::Error| MagnifierError::ExportFailed(e.to_string());
    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);

    wtr.write_record(CSV_HEADER).map_err(csv_err)?;
    for record in records {
        wtr.serialize(CsvRow::from(record)).map_err(csv_err)?;
    }
    wtr.flush()
        .map_err(|e| MagnifierError::ExportFailed(e.to_string()))
}

/// Pretty JSON of the whole run.
pub fn to_json(result: &RunResult) -> Result<String, MagnifierError> {
    serde_json::to_string_pretty(result).map_err(|e| MagnifierError::ExportFailed(e.to_string()))
}

/// Serialise `result` in `format`.
pub fn render(result: &RunResult, format: ExportFormat) -> Result<Vec<u8>, MagnifierError> {
    match format {
        ExportFormat::Csv => {
            let mut buf = Vec::new();
            write_csv(&result.records, &mut buf)?;
            Ok(buf)
        }
        ExportFormat::Json => to_json(result).map(String::into_bytes),
    }
}

/// `<document-name>_magnifier_results.<ext>`
pub fn default_export_name(document_name: &str, format: ExportFormat) -> String {
    format!("{}_magnifier_results.{}", document_name, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::PageLabel;

    fn record(page_id: usize, cycle_id: i64, label: Option<PageLabel>, text: &str) -> MarkerRecord {
        MarkerRecord {
            page_id,
            cycle_id,
            page_number: label,
            text: text.into(),
            has_marker: true,
        }
    }

    fn csv_string(records: &[MarkerRecord]) -> String {
        let mut buf = Vec::new();
        write_csv(records, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn empty_run_still_has_header() {
        assert_eq!(
            csv_string(&[]),
            "page_id,cycle_id,page_number,text,has_marker\n"
        );
    }

    #[test]
    fn rows_follow_record_order() {
        let out = csv_string(&[
            record(1, 1, Some("i".into()), "see note"),
            record(2, 1, Some(12.into()), "second"),
            record(2, 2, None, ""),
        ]);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[1], "1,1,i,see note,true");
        assert_eq!(lines[2], "2,1,12,second,true");
        assert_eq!(lines[3], "2,2,,,true");
    }

    #[test]
    fn text_with_commas_and_quotes_is_escaped() {
        let out = csv_string(&[record(3, 1, None, "a, \"quoted\" note")]);
        assert!(out.contains("\"a, \"\"quoted\"\" note\""));

        let mut rdr = csv::Reader::from_reader(out.as_bytes());
        let row = rdr.records().next().unwrap().unwrap();
        assert_eq!(&row[3], "a, \"quoted\" note");
    }

    #[test]
    fn json_contains_tallies() {
        let result = RunResult {
            records: vec![record(1, 1, None, "x")],
            pages_attempted: 2,
            pages_with_marker: 1,
            ..Default::default()
        };
        let json = to_json(&result).unwrap();
        let back: RunResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.pages_attempted, 2);
        assert_eq!(back.records[0].text, "x");
    }

    #[test]
    fn format_parsing_and_names() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xlsx".parse::<ExportFormat>().is_err());
        assert_eq!(
            default_export_name("ledger", ExportFormat::Csv),
            "ledger_magnifier_results.csv"
        );
    }
}
