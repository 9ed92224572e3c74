use crate::heuristics::{Field, FieldMap};
use crate::pdf_extract::ExtractedInvoice;
use rusqlite::{Connection, Result as SqliteResult, params};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Invoice rows and the PO funding lookup, backed by SQLite.
pub struct InvoiceStore {
    conn: Connection,
}

#[derive(Debug, Clone)]
pub struct StoredInvoice {
    pub id: i64,
    pub source_file: Option<String>,
    pub source_digest: Option<String>,
    pub fields: FieldMap,
}

/// Which budget (WBS element) a purchase order draws on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FundingSource {
    pub po_number: String,
    pub wbs_number: String,
}

const FIELD_COLUMNS: &str = "invoice_number, invoice_date, order_total, tax, invoice_total, \
     do_number, po_number, order_date, sale_order, delivery_date";

impl InvoiceStore {
    /// Open (or create) the invoice store at `db_path`.
    pub fn new<P: AsRef<Path>>(db_path: P) -> SqliteResult<Self> {
        Self::init(Connection::open(db_path)?)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> SqliteResult<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> SqliteResult<Self> {
        // Raw strings, exactly as extracted; typing happens on read.
        conn.execute(
            "CREATE TABLE IF NOT EXISTS invoices (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                invoice_number TEXT NOT NULL DEFAULT '',
                invoice_date TEXT NOT NULL DEFAULT '',
                order_total TEXT NOT NULL DEFAULT '',
                tax TEXT NOT NULL DEFAULT '',
                invoice_total TEXT NOT NULL DEFAULT '',
                do_number TEXT NOT NULL DEFAULT '',
                po_number TEXT NOT NULL DEFAULT '',
                order_date TEXT NOT NULL DEFAULT '',
                sale_order TEXT NOT NULL DEFAULT '',
                delivery_date TEXT NOT NULL DEFAULT '',
                source_file TEXT,
                source_digest TEXT,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS po_funding (
                po_number TEXT PRIMARY KEY,
                wbs_number TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_invoices_invoice_number ON invoices(invoice_number)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_invoices_po_number ON invoices(po_number)",
            [],
        )?;

        info!("Database initialized successfully");
        Ok(Self { conn })
    }

    fn insert_row(
        tx: &rusqlite::Transaction<'_>,
        fields: &FieldMap,
        source_file: Option<&str>,
        source_digest: Option<&str>,
    ) -> SqliteResult<()> {
        let v = fields.values();
        tx.execute(
            &format!(
                "INSERT INTO invoices ({FIELD_COLUMNS}, source_file, source_digest)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                v[0],
                v[1],
                v[2],
                v[3],
                v[4],
                v[5],
                v[6],
                v[7],
                v[8],
                v[9],
                source_file,
                source_digest,
            ],
        )?;
        Ok(())
    }

    /// Append extracted invoices. All rows land or none do.
    pub fn append(&mut self, invoices: &[ExtractedInvoice]) -> SqliteResult<usize> {
        let tx = self.conn.transaction()?;
        for invoice in invoices {
            Self::insert_row(
                &tx,
                &invoice.fields,
                Some(invoice.source.as_str()),
                Some(invoice.digest.as_str()),
            )?;
        }
        tx.commit()?;
        info!(rows = invoices.len(), "Invoices appended");
        Ok(invoices.len())
    }

    /// Replace the whole invoice table with `rows`, keeping their source
    /// columns. Runs in one transaction.
    pub fn overwrite(&mut self, rows: &[StoredInvoice]) -> SqliteResult<usize> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM invoices", [])?;
        for row in rows {
            Self::insert_row(
                &tx,
                &row.fields,
                row.source_file.as_deref(),
                row.source_digest.as_deref(),
            )?;
        }
        tx.commit()?;
        info!(rows = rows.len(), "Invoice table overwritten");
        Ok(rows.len())
    }

    /// Every stored invoice row, in insertion order.
    pub fn read_all(&self) -> SqliteResult<Vec<StoredInvoice>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT id, {FIELD_COLUMNS}, source_file, source_digest
             FROM invoices
             ORDER BY id"
        ))?;
        let rows = stmt.query_map([], |row| Self::row_to_invoice(row))?;
        rows.collect()
    }

    /// Just the field maps, in insertion order.
    pub fn read_field_maps(&self) -> SqliteResult<Vec<FieldMap>> {
        Ok(self.read_all()?.into_iter().map(|r| r.fields).collect())
    }

    /// Helper: map the id + 10 field + 2 source column projection.
    fn row_to_invoice(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredInvoice> {
        let mut fields = FieldMap::default();
        for (i, field) in Field::ALL.into_iter().enumerate() {
            fields.set(field, row.get::<_, String>(i + 1)?);
        }
        Ok(StoredInvoice {
            id: row.get(0)?,
            source_file: row.get(11)?,
            source_digest: row.get(12)?,
            fields,
        })
    }

    /// Record (or replace) the funding source for a PO.
    pub fn set_funding_source(&self, po_number: &str, wbs_number: &str) -> SqliteResult<()> {
        self.conn.execute(
            "INSERT INTO po_funding (po_number, wbs_number) VALUES (?1, ?2)
             ON CONFLICT(po_number) DO UPDATE SET wbs_number = excluded.wbs_number",
            params![po_number.trim(), wbs_number.trim()],
        )?;
        info!(po = %po_number, wbs = %wbs_number, "Funding source stored");
        Ok(())
    }

    pub fn funding_sources(&self) -> SqliteResult<Vec<FundingSource>> {
        let mut stmt = self
            .conn
            .prepare("SELECT po_number, wbs_number FROM po_funding ORDER BY po_number")?;
        let rows = stmt.query_map([], |row| {
            Ok(FundingSource {
                po_number: row.get(0)?,
                wbs_number: row.get(1)?,
            })
        })?;
        rows.collect()
    }

    /// Row counts: (invoices, distinct invoice numbers, funding entries).
    pub fn get_counts(&self) -> SqliteResult<(usize, usize, usize)> {
        let invoices: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM invoices", [], |row| row.get(0))?;

        let distinct: usize = self.conn.query_row(
            "SELECT COUNT(DISTINCT invoice_number) FROM invoices",
            [],
            |row| row.get(0),
        )?;

        let funding: usize =
            self.conn
                .query_row("SELECT COUNT(*) FROM po_funding", [], |row| row.get(0))?;

        Ok((invoices, distinct, funding))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(invoice_no: &str, source: &str) -> ExtractedInvoice {
        let mut fields = FieldMap::default();
        fields.set(Field::InvoiceNumber, invoice_no);
        fields.set(Field::PoNumber, "0012345");
        ExtractedInvoice {
            source: source.to_string(),
            digest: format!("digest-{source}"),
            content_type: "text",
            fields,
        }
    }

    #[test]
    fn test_append_and_read_back_in_order() {
        let mut store = InvoiceStore::open_in_memory().unwrap();
        store
            .append(&[extracted("INV-2", "b.pdf"), extracted("INV-1", "a.pdf")])
            .unwrap();
        store.append(&[extracted("INV-2", "c.pdf")]).unwrap();

        let rows = store.read_all().unwrap();
        let numbers: Vec<&str> = rows.iter().map(|r| r.fields.invoice_number.as_str()).collect();
        assert_eq!(numbers, vec!["INV-2", "INV-1", "INV-2"]);
        assert_eq!(rows[0].source_file.as_deref(), Some("b.pdf"));
        assert_eq!(rows[2].source_digest.as_deref(), Some("digest-c.pdf"));
        // numeric-looking ids stay strings
        assert_eq!(rows[0].fields.po_number, "0012345");
        assert_eq!(store.get_counts().unwrap(), (3, 2, 0));
    }

    #[test]
    fn test_overwrite_replaces_table() {
        let mut store = InvoiceStore::open_in_memory().unwrap();
        store
            .append(&[extracted("A", "a.pdf"), extracted("A", "a2.pdf")])
            .unwrap();
        let mut rows = store.read_all().unwrap();
        rows.truncate(1);
        store.overwrite(&rows).unwrap();

        let after = store.read_field_maps().unwrap();
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].invoice_number, "A");
    }

    #[test]
    fn test_funding_upsert() {
        let store = InvoiceStore::open_in_memory().unwrap();
        store.set_funding_source("PO-2", "WBS-B").unwrap();
        store.set_funding_source("PO-1", "WBS-A").unwrap();
        store.set_funding_source("PO-2", " WBS-C ").unwrap();

        assert_eq!(
            store.funding_sources().unwrap(),
            vec![
                FundingSource {
                    po_number: "PO-1".to_string(),
                    wbs_number: "WBS-A".to_string()
                },
                FundingSource {
                    po_number: "PO-2".to_string(),
                    wbs_number: "WBS-C".to_string()
                },
            ]
        );
    }
}
