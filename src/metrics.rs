// src/metrics.rs

use crate::clean::{CleanReport, InvoiceRecord, MONTH_LABELS, RowFailure};
use crate::record_db::FundingSource;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use time::Date;

/// Spend per base unit; this vendor prices at a fixed yield.
pub const DEFAULT_BASE_UNIT_PRICE: f64 = 0.20;

/// Which invoice years an aggregate covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum YearFilter {
    #[default]
    AllYears,
    Year(i32),
}

impl YearFilter {
    pub fn matches(self, record: &InvoiceRecord) -> bool {
        match self {
            YearFilter::AllYears => true,
            YearFilter::Year(year) => record.invoice_year == year,
        }
    }
}

impl FromStr for YearFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all years") || s.eq_ignore_ascii_case("all") {
            return Ok(YearFilter::AllYears);
        }
        s.parse::<i32>()
            .map(YearFilter::Year)
            .map_err(|_| format!("expected a year or 'All Years', got '{s}'"))
    }
}

impl fmt::Display for YearFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearFilter::AllYears => f.write_str("All Years"),
            YearFilter::Year(year) => write!(f, "{year}"),
        }
    }
}

impl Serialize for YearFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KeyMetrics {
    /// Sum of order totals, tax excluded.
    pub total_order_value: f64,
    /// Sum of invoice totals, tax included.
    pub total_invoice_value: f64,
    pub order_count: usize,
    pub average_order_value: Option<f64>,
    pub total_base_units: i64,
    /// Mean lead time in days over rows that have both dates.
    pub average_lead_time: Option<f64>,
}

pub fn key_metrics(records: &[InvoiceRecord], year: YearFilter, base_unit_price: f64) -> KeyMetrics {
    let selected: Vec<&InvoiceRecord> = records.iter().filter(|r| year.matches(r)).collect();

    let order_sum: f64 = selected.iter().map(|r| r.order_total).sum();
    let invoice_sum: f64 = selected.iter().map(|r| r.invoice_total).sum();
    let order_count = selected.len();

    let average_order_value = (order_count > 0).then(|| round2(invoice_sum / order_count as f64));

    let leadtimes: Vec<i64> = selected.iter().filter_map(|r| r.delivery_leadtime).collect();
    let average_lead_time = (!leadtimes.is_empty())
        .then(|| round2(leadtimes.iter().sum::<i64>() as f64 / leadtimes.len() as f64));

    let total_base_units = if base_unit_price > 0.0 {
        (order_sum / base_unit_price) as i64
    } else {
        0
    };

    KeyMetrics {
        total_order_value: round2(order_sum),
        total_invoice_value: round2(invoice_sum),
        order_count,
        average_order_value,
        total_base_units,
        average_lead_time,
    }
}

/// Invoice spend per (year, month): one row per year, twelve calendar
/// columns, zero where nothing was invoiced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Heatmap {
    pub years: Vec<i32>,
    pub months: Vec<&'static str>,
    pub values: Vec<Vec<f64>>,
}

pub fn monthly_heatmap(records: &[InvoiceRecord]) -> Heatmap {
    let mut by_year: BTreeMap<i32, [f64; 12]> = BTreeMap::new();
    for record in records {
        let month = usize::from(u8::from(record.invoice_date.month())) - 1;
        by_year.entry(record.invoice_year).or_insert([0.0; 12])[month] += record.invoice_total;
    }

    Heatmap {
        years: by_year.keys().copied().collect(),
        months: MONTH_LABELS.to_vec(),
        values: by_year
            .values()
            .map(|row| row.iter().map(|v| round2(*v)).collect())
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearCount {
    pub year: i32,
    pub orders: usize,
}

/// Number of orders per invoice year, oldest first.
pub fn yearly_order_counts(records: &[InvoiceRecord]) -> Vec<YearCount> {
    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(record.invoice_year).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(year, orders)| YearCount { year, orders })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthCount {
    pub month: &'static str,
    /// `None` for a month with no orders.
    pub orders: Option<usize>,
}

/// Orders per month of one year, Jan through Dec.
pub fn monthly_order_counts(records: &[InvoiceRecord], year: i32) -> Vec<MonthCount> {
    let mut counts = [0usize; 12];
    for record in records.iter().filter(|r| r.invoice_year == year) {
        counts[usize::from(u8::from(record.invoice_date.month())) - 1] += 1;
    }
    MONTH_LABELS
        .iter()
        .zip(counts)
        .map(|(&month, n)| MonthCount {
            month,
            orders: (n > 0).then_some(n),
        })
        .collect()
}

/// Two-slice split of total spend: one PO against everything else.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DonutSplit {
    pub selected_po: f64,
    pub other_pos: f64,
}

fn po_spending(records: &[InvoiceRecord], po: &str) -> f64 {
    records
        .iter()
        .filter(|r| r.po_number == po.trim())
        .map(|r| r.invoice_total)
        .sum()
}

pub fn po_split(records: &[InvoiceRecord], po: &str) -> DonutSplit {
    let total: f64 = records.iter().map(|r| r.invoice_total).sum();
    let selected = po_spending(records, po);
    DonutSplit {
        selected_po: round2(selected),
        other_pos: round2(total - selected),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoInvoiceRow {
    #[serde(rename = "Invoice_Date")]
    pub invoice_date: Date,
    #[serde(rename = "Invoice_Number")]
    pub invoice_number: String,
    #[serde(rename = "DO_Number")]
    pub do_number: String,
    #[serde(rename = "Sale_Order")]
    pub sale_order: String,
    #[serde(rename = "Invoice_Total")]
    pub invoice_total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PoSummary {
    pub po_number: String,
    /// WBS element funding this PO, when the lookup table knows it.
    pub funding_source: Option<String>,
    pub po_value: f64,
    pub invoices: Vec<PoInvoiceRow>,
    pub split: DonutSplit,
}

/// Everything shown for one purchase order. Invoices come out in
/// invoice-date order.
pub fn po_summary(records: &[InvoiceRecord], po: &str, funding: &[FundingSource]) -> PoSummary {
    let po = po.trim();
    let mut invoices: Vec<PoInvoiceRow> = records
        .iter()
        .filter(|r| r.po_number == po)
        .map(|r| PoInvoiceRow {
            invoice_date: r.invoice_date,
            invoice_number: r.invoice_number.clone(),
            do_number: r.do_number.clone(),
            sale_order: r.sale_order.clone(),
            invoice_total: r.invoice_total,
        })
        .collect();
    invoices.sort_by_key(|row| row.invoice_date);

    PoSummary {
        po_number: po.to_string(),
        funding_source: funding
            .iter()
            .find(|f| f.po_number == po)
            .map(|f| f.wbs_number.clone()),
        po_value: round2(po_spending(records, po)),
        invoices,
        split: po_split(records, po),
    }
}

/// Order-count bars: per year across all years, or per month inside one.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "granularity", rename_all = "snake_case")]
pub enum OrderSeries {
    Yearly { bars: Vec<YearCount> },
    Monthly { year: i32, bars: Vec<MonthCount> },
}

/// One full dashboard view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardReport {
    pub year: YearFilter,
    pub key_metrics: KeyMetrics,
    pub heatmap: Heatmap,
    pub orders: OrderSeries,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_order: Option<PoSummary>,
    pub funding_sources: Vec<FundingSource>,
    pub skipped_rows: Vec<RowFailure>,
}

pub fn dashboard(
    cleaned: &CleanReport,
    year: YearFilter,
    po: Option<&str>,
    funding: &[FundingSource],
    base_unit_price: f64,
) -> DashboardReport {
    let mut records = cleaned.records.clone();
    records.sort_by_key(|r| r.invoice_date);

    let orders = match year {
        YearFilter::AllYears => OrderSeries::Yearly {
            bars: yearly_order_counts(&records),
        },
        YearFilter::Year(y) => OrderSeries::Monthly {
            year: y,
            bars: monthly_order_counts(&records, y),
        },
    };

    DashboardReport {
        year,
        key_metrics: key_metrics(&records, year, base_unit_price),
        heatmap: monthly_heatmap(&records),
        orders,
        purchase_order: po.map(|po| po_summary(&records, po, funding)),
        funding_sources: funding.to_vec(),
        skipped_rows: cleaned.failures.clone(),
    }
}
