// src/export.rs

use crate::clean::InvoiceRecord;
use crate::heuristics::{Field, FieldMap};
use std::io::Write;
use tracing::info;

/// Columns the cleaner appends after the extracted ones.
const DERIVED_COLUMNS: [&str; 3] = ["Delivery_Leadtime", "Invoice_Year", "Invoice_Month"];

fn header() -> Vec<&'static str> {
    Field::ALL.iter().map(|f| f.column()).collect()
}

/// Write raw extracted rows as CSV, in the fixed column order.
pub fn write_field_maps<W: Write>(
    out: W,
    rows: &[FieldMap],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(header())?;
    for row in rows {
        writer.write_record(row.values())?;
    }
    // csv buffers rows; surface write errors here.
    writer.flush()?;
    info!(rows = rows.len(), "Extracted rows written as CSV");
    Ok(())
}

fn date_cell(date: Option<time::Date>) -> String {
    date.map(|d| d.to_string()).unwrap_or_default()
}

/// Write cleaned records as CSV: extracted columns, then derived ones.
/// Dates are ISO formatted and amounts are plain numbers.
pub fn write_records<W: Write>(
    out: W,
    records: &[InvoiceRecord],
) -> Result<(), Box<dyn std::error::Error>> {
    let mut writer = csv::Writer::from_writer(out);
    let mut columns = header();
    columns.extend(DERIVED_COLUMNS);
    writer.write_record(&columns)?;

    for r in records {
        writer.write_record([
            r.invoice_number.clone(),
            r.invoice_date.to_string(),
            r.order_total.to_string(),
            r.tax.to_string(),
            r.invoice_total.to_string(),
            r.do_number.clone(),
            r.po_number.clone(),
            date_cell(r.order_date),
            r.sale_order.clone(),
            date_cell(r.delivery_date),
            r.delivery_leadtime.map(|d| d.to_string()).unwrap_or_default(),
            r.invoice_year.to_string(),
            r.invoice_month.to_string(),
        ])?;
    }
    writer.flush()?;
    info!(rows = records.len(), "Cleaned records written as CSV");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clean::clean_row;

    fn sample_map() -> FieldMap {
        let mut map = FieldMap::default();
        map.set(Field::InvoiceNumber, "5583021");
        map.set(Field::InvoiceDate, "14 Mar 2023");
        map.set(Field::OrderTotal, "S$ 1,120.50");
        map.set(Field::Tax, "S$ 89.64");
        map.set(Field::InvoiceTotal, "S$ 1,210.14");
        map.set(Field::PoNumber, "0045001");
        map.set(Field::OrderDate, "02 Mar 2023");
        map.set(Field::DeliveryDate, "09 Mar 2023");
        map
    }

    #[test]
    fn test_field_map_csv() {
        let mut buf = Vec::new();
        write_field_maps(&mut buf, &[sample_map()]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some(
                "Invoice_Number,Invoice_Date,Order_Total,Tax,Invoice_Total,\
                 DO_Number,PO_Number,Order_Date,Sale_Order,Delivery_Date"
            )
        );
        assert_eq!(
            lines.next(),
            Some("5583021,14 Mar 2023,\"S$ 1,120.50\",S$ 89.64,\"S$ 1,210.14\",,0045001,02 Mar 2023,,09 Mar 2023")
        );
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn test_record_csv_appends_derived_columns() {
        let record = clean_row(&sample_map()).unwrap();
        let mut buf = Vec::new();
        write_records(&mut buf, &[record]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].ends_with("Delivery_Date,Delivery_Leadtime,Invoice_Year,Invoice_Month"));
        assert_eq!(
            lines[1],
            "5583021,2023-03-14,1120.5,89.64,1210.14,,0045001,2023-03-02,,2023-03-09,7,2023,Mar"
        );
    }

    struct BrokenSink;

    impl Write for BrokenSink {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_buffered_write_error_is_returned() {
        assert!(write_field_maps(BrokenSink, &[sample_map()]).is_err());
    }
}
