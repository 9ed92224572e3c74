// src/heuristics/mod.rs

mod keyword;

use serde::Deserialize;
use serde::Serialize;

/// One of the fixed columns scraped from an invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "Invoice_Number")]
    InvoiceNumber,
    #[serde(rename = "Invoice_Date")]
    InvoiceDate,
    #[serde(rename = "Order_Total")]
    OrderTotal,
    #[serde(rename = "Tax")]
    Tax,
    #[serde(rename = "Invoice_Total")]
    InvoiceTotal,
    #[serde(rename = "DO_Number")]
    DoNumber,
    #[serde(rename = "PO_Number")]
    PoNumber,
    #[serde(rename = "Order_Date")]
    OrderDate,
    #[serde(rename = "Sale_Order")]
    SaleOrder,
    #[serde(rename = "Delivery_Date")]
    DeliveryDate,
}

impl Field {
    /// Every field, in output column order.
    pub const ALL: [Field; 10] = [
        Field::InvoiceNumber,
        Field::InvoiceDate,
        Field::OrderTotal,
        Field::Tax,
        Field::InvoiceTotal,
        Field::DoNumber,
        Field::PoNumber,
        Field::OrderDate,
        Field::SaleOrder,
        Field::DeliveryDate,
    ];

    /// Column header used in CSV exports and the store.
    pub fn column(self) -> &'static str {
        match self {
            Field::InvoiceNumber => "Invoice_Number",
            Field::InvoiceDate => "Invoice_Date",
            Field::OrderTotal => "Order_Total",
            Field::Tax => "Tax",
            Field::InvoiceTotal => "Invoice_Total",
            Field::DoNumber => "DO_Number",
            Field::PoNumber => "PO_Number",
            Field::OrderDate => "Order_Date",
            Field::SaleOrder => "Sale_Order",
            Field::DeliveryDate => "Delivery_Date",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}

/// Raw string values scraped from one invoice. Every column is always
/// present; anything not found stays an empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldMap {
    #[serde(rename = "Invoice_Number")]
    pub invoice_number: String,
    #[serde(rename = "Invoice_Date")]
    pub invoice_date: String,
    #[serde(rename = "Order_Total")]
    pub order_total: String,
    #[serde(rename = "Tax")]
    pub tax: String,
    #[serde(rename = "Invoice_Total")]
    pub invoice_total: String,
    #[serde(rename = "DO_Number")]
    pub do_number: String,
    #[serde(rename = "PO_Number")]
    pub po_number: String,
    #[serde(rename = "Order_Date")]
    pub order_date: String,
    #[serde(rename = "Sale_Order")]
    pub sale_order: String,
    #[serde(rename = "Delivery_Date")]
    pub delivery_date: String,
}

impl FieldMap {
    pub fn get(&self, field: Field) -> &str {
        match field {
            Field::InvoiceNumber => &self.invoice_number,
            Field::InvoiceDate => &self.invoice_date,
            Field::OrderTotal => &self.order_total,
            Field::Tax => &self.tax,
            Field::InvoiceTotal => &self.invoice_total,
            Field::DoNumber => &self.do_number,
            Field::PoNumber => &self.po_number,
            Field::OrderDate => &self.order_date,
            Field::SaleOrder => &self.sale_order,
            Field::DeliveryDate => &self.delivery_date,
        }
    }

    pub fn set(&mut self, field: Field, value: impl Into<String>) {
        let slot = match field {
            Field::InvoiceNumber => &mut self.invoice_number,
            Field::InvoiceDate => &mut self.invoice_date,
            Field::OrderTotal => &mut self.order_total,
            Field::Tax => &mut self.tax,
            Field::InvoiceTotal => &mut self.invoice_total,
            Field::DoNumber => &mut self.do_number,
            Field::PoNumber => &mut self.po_number,
            Field::OrderDate => &mut self.order_date,
            Field::SaleOrder => &mut self.sale_order,
            Field::DeliveryDate => &mut self.delivery_date,
        };
        *slot = value.into();
    }

    /// Values in column order, for CSV rows and store inserts.
    pub fn values(&self) -> [&str; 10] {
        Field::ALL.map(|f| self.get(f))
    }

    /// How many fields were successfully extracted (out of all of them).
    pub fn coverage(&self) -> (usize, usize) {
        let filled = Field::ALL
            .iter()
            .filter(|&&f| !self.get(f).is_empty())
            .count();
        (filled, Field::ALL.len())
    }
}

/// A keyword anchor and where its value sits relative to the anchor line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub keyword: String,
    pub field: Field,
    /// `None`: value follows the keyword on the same line (or on the next
    /// line when nothing follows it). `Some(n)`: value is `n` lines below.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
}

impl KeywordRule {
    fn same_line(keyword: &str, field: Field) -> Self {
        Self {
            keyword: keyword.to_string(),
            field,
            offset: None,
        }
    }

    fn below(keyword: &str, field: Field, offset: usize) -> Self {
        Self {
            keyword: keyword.to_string(),
            field,
            offset: Some(offset),
        }
    }
}

/// Ordered keyword table for one vendor layout. Order matters: the first
/// rule whose keyword occurs in a line claims that line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub rules: Vec<KeywordRule>,
}

/// Column-header offset used by the IDT invoice layout.
const IDT_HEADER_OFFSET: usize = 6;

impl Template {
    /// The Integrated DNA Technologies invoice layout.
    pub fn idt() -> Self {
        Self {
            rules: vec![
                KeywordRule::same_line("Invoice Nbr:", Field::InvoiceNumber),
                KeywordRule::same_line("Invoice Date:", Field::InvoiceDate),
                KeywordRule::same_line("Order Total:", Field::OrderTotal),
                KeywordRule::same_line("Tax:", Field::Tax),
                KeywordRule::same_line("Invoice Total:", Field::InvoiceTotal),
                KeywordRule::same_line("Package Ids:", Field::DoNumber),
                KeywordRule::below("P.O. #", Field::PoNumber, IDT_HEADER_OFFSET),
                KeywordRule::below("Order Date", Field::OrderDate, IDT_HEADER_OFFSET),
                KeywordRule::below("Sales Order #", Field::SaleOrder, IDT_HEADER_OFFSET),
                KeywordRule::below("Ship Date", Field::DeliveryDate, IDT_HEADER_OFFSET),
            ],
        }
    }
}

impl Default for Template {
    fn default() -> Self {
        Self::idt()
    }
}

/// Extract invoice fields from the ordered text lines of one document.
pub fn extract_fields<S: AsRef<str>>(lines: &[S], template: &Template) -> FieldMap {
    keyword::extract(lines, template)
}
