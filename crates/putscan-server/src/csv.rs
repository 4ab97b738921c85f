//! CSV rendering for scan results.
//!
//! The header row is derived from the first result's field names; an empty
//! result set emits a fixed header-only line so downstream spreadsheet
//! imports always see the same columns.

use putscan_core::Hit;
use serde_json::Value;
use thiserror::Error;

/// Header emitted when there are no results to derive one from.
pub const EMPTY_HEADER: &str = "ticker,contract_symbol,strike,expiration,dte,spot,bid,ask,\
last_price,used_price,price_used,theo_price,ratio,intrinsic_value,intrinsic_gap,\
moneyness_pct,iv_pct,volume,open_interest";

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("csv write failed: {0}")]
    Write(#[from] csv::Error),
    #[error("csv buffer was not valid utf-8")]
    Encoding,
}

pub fn render(results: &[Hit]) -> Result<String, RenderError> {
    if results.is_empty() {
        return Ok(format!("{EMPTY_HEADER}\n"));
    }

    let rows: Vec<serde_json::Map<String, Value>> = results
        .iter()
        .filter_map(|hit| match serde_json::to_value(hit) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        })
        .collect();

    let header: Vec<String> = rows[0].keys().cloned().collect();

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for row in &rows {
        let record: Vec<String> = header.iter().map(|key| cell(row.get(key))).collect();
        writer.write_record(&record)?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| RenderError::Write(e.into_error().into()))?;
    String::from_utf8(bytes).map_err(|_| RenderError::Encoding)
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
