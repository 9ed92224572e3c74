// src/clean.rs

use crate::heuristics::{Field, FieldMap};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, Month};
use tracing::{info, warn};

/// Three-letter month labels, January first.
pub const MONTH_LABELS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// Label for a calendar month.
pub fn month_label(month: Month) -> &'static str {
    MONTH_LABELS[usize::from(u8::from(month)) - 1]
}

/// "05 Mar 2023" style dates as printed on the invoices.
const INVOICE_DATE: &[BorrowedFormatItem<'static>] =
    format_description!("[day padding:none] [month repr:short case_sensitive:false] [year]");

/// Prefix printed in front of every amount.
const CURRENCY_PREFIX: &str = "S$";

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
pub enum CleanError {
    #[error("{field}: '{value}' is not a 'day Mon year' date")]
    InvalidDate { field: Field, value: String },
    #[error("{field}: '{value}' is not an amount")]
    InvalidAmount { field: Field, value: String },
    #[error("Invoice_Date is empty")]
    MissingInvoiceDate,
}

/// A cleaned invoice row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceRecord {
    #[serde(rename = "Invoice_Number")]
    pub invoice_number: String,
    #[serde(rename = "Invoice_Date")]
    pub invoice_date: Date,
    #[serde(rename = "Order_Total")]
    pub order_total: f64,
    #[serde(rename = "Tax")]
    pub tax: f64,
    #[serde(rename = "Invoice_Total")]
    pub invoice_total: f64,
    #[serde(rename = "DO_Number")]
    pub do_number: String,
    #[serde(rename = "PO_Number")]
    pub po_number: String,
    #[serde(rename = "Order_Date")]
    pub order_date: Option<Date>,
    #[serde(rename = "Sale_Order")]
    pub sale_order: String,
    #[serde(rename = "Delivery_Date")]
    pub delivery_date: Option<Date>,
    /// Delivery minus order date in days; negative when the dates are inverted.
    #[serde(rename = "Delivery_Leadtime")]
    pub delivery_leadtime: Option<i64>,
    #[serde(rename = "Invoice_Year")]
    pub invoice_year: i32,
    #[serde(rename = "Invoice_Month")]
    pub invoice_month: &'static str,
}

/// A deduplicated row that could not be typed, with every reason why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowFailure {
    /// Position in the deduplicated input.
    pub row: usize,
    pub invoice_number: String,
    pub errors: Vec<CleanError>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanReport {
    pub records: Vec<InvoiceRecord>,
    pub failures: Vec<RowFailure>,
}

/// Keep the first row seen for each key, preserving order.
pub fn dedup_by<T: Clone>(rows: &[T], key: impl Fn(&T) -> &str) -> Vec<T> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter(|row| seen.insert(key(*row).trim().to_string()))
        .cloned()
        .collect()
}

/// Keep the first row seen for each Invoice_Number.
pub fn dedup(rows: &[FieldMap]) -> Vec<FieldMap> {
    dedup_by(rows, |row| row.invoice_number.as_str())
}

/// Parse "05 Mar 2023". Runs of whitespace between the parts are accepted.
pub fn parse_invoice_date(value: &str) -> Option<Date> {
    let normalized = value.split_whitespace().collect::<Vec<_>>().join(" ");
    Date::parse(&normalized, INVOICE_DATE).ok()
}

/// Parse "S$ 1,120.50" into 1120.5.
pub fn parse_amount(value: &str) -> Option<f64> {
    let trimmed = value.trim();
    let number = trimmed
        .strip_prefix(CURRENCY_PREFIX)
        .unwrap_or(trimmed)
        .trim()
        .replace(',', "");
    if number.is_empty() {
        return None;
    }
    number.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn required_date(row: &FieldMap, field: Field, errors: &mut Vec<CleanError>) -> Option<Date> {
    let value = row.get(field).trim();
    if value.is_empty() {
        errors.push(CleanError::MissingInvoiceDate);
        return None;
    }
    optional_date(row, field, errors)
}

fn optional_date(row: &FieldMap, field: Field, errors: &mut Vec<CleanError>) -> Option<Date> {
    let value = row.get(field).trim();
    if value.is_empty() {
        return None;
    }
    let parsed = parse_invoice_date(value);
    if parsed.is_none() {
        errors.push(CleanError::InvalidDate {
            field,
            value: value.to_string(),
        });
    }
    parsed
}

fn amount(row: &FieldMap, field: Field, errors: &mut Vec<CleanError>) -> f64 {
    let value = row.get(field);
    parse_amount(value).unwrap_or_else(|| {
        errors.push(CleanError::InvalidAmount {
            field,
            value: value.trim().to_string(),
        });
        0.0
    })
}

/// Type and derive one row, collecting every field that fails.
pub fn clean_row(row: &FieldMap) -> Result<InvoiceRecord, Vec<CleanError>> {
    let mut errors = Vec::new();

    let invoice_date = required_date(row, Field::InvoiceDate, &mut errors);
    let order_date = optional_date(row, Field::OrderDate, &mut errors);
    let delivery_date = optional_date(row, Field::DeliveryDate, &mut errors);
    let order_total = amount(row, Field::OrderTotal, &mut errors);
    let tax = amount(row, Field::Tax, &mut errors);
    let invoice_total = amount(row, Field::InvoiceTotal, &mut errors);

    let Some(invoice_date) = invoice_date.filter(|_| errors.is_empty()) else {
        return Err(errors);
    };

    let delivery_leadtime = match (order_date, delivery_date) {
        (Some(ordered), Some(delivered)) => Some((delivered - ordered).whole_days()),
        _ => None,
    };

    Ok(InvoiceRecord {
        invoice_number: row.invoice_number.trim().to_string(),
        invoice_date,
        order_total,
        tax,
        invoice_total,
        do_number: row.do_number.trim().to_string(),
        po_number: row.po_number.trim().to_string(),
        order_date,
        sale_order: row.sale_order.trim().to_string(),
        delivery_date,
        delivery_leadtime,
        invoice_year: invoice_date.year(),
        invoice_month: month_label(invoice_date.month()),
    })
}

/// Dedup, type and derive a batch of raw rows. Bad rows are reported and
/// skipped; they never abort the rest of the batch.
pub fn clean(rows: &[FieldMap]) -> CleanReport {
    let unique = dedup(rows);
    info!(
        rows = rows.len(),
        unique = unique.len(),
        "Cleaning invoice rows"
    );

    let mut report = CleanReport::default();
    for (row, raw) in unique.iter().enumerate() {
        match clean_row(raw) {
            Ok(record) => report.records.push(record),
            Err(errors) => {
                warn!(
                    row,
                    invoice_no = %raw.invoice_number,
                    errors = errors.len(),
                    first = %errors[0],
                    "Row skipped"
                );
                report.failures.push(RowFailure {
                    row,
                    invoice_number: raw.invoice_number.clone(),
                    errors,
                });
            }
        }
    }

    info!(
        records = report.records.len(),
        failures = report.failures.len(),
        "Cleaning complete"
    );
    report
}
