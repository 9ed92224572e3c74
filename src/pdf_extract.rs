// src/pdf_extract.rs

use crate::heuristics::{self, FieldMap, Template};
use lopdf::Document;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{info, warn};

/// Result of attempting to extract text from a PDF.
#[derive(Debug)]
pub enum PdfContent {
    /// The PDF contains extractable text.
    Text(String),
    /// The PDF appears to be scanned / image-only — needs OCR.
    ScannedImage,
    /// Something went wrong during extraction.
    Error(String),
}

impl PdfContent {
    pub fn kind(&self) -> &'static str {
        match self {
            PdfContent::Text(_) => "text",
            PdfContent::ScannedImage => "scanned",
            PdfContent::Error(_) => "error",
        }
    }

    /// Ordered text lines; empty for anything without a text layer.
    pub fn lines(&self) -> Vec<&str> {
        match self {
            PdfContent::Text(text) => text.lines().collect(),
            _ => Vec::new(),
        }
    }
}

/// Below this many non-whitespace characters the text layer is logged as
/// sparse. It is still parsed; only an empty layer counts as scanned.
const MIN_TEXT_CHARS: usize = 30;

/// Main entry point: takes raw PDF bytes and returns `PdfContent`.
pub fn extract_text_from_pdf(pdf_bytes: &[u8]) -> PdfContent {
    // --- Phase 1: structural check with lopdf ---
    let doc = match Document::load_mem(pdf_bytes) {
        Ok(d) => d,
        Err(e) => return PdfContent::Error(format!("Failed to parse PDF: {e}")),
    };

    if looks_like_scanned(&doc) {
        info!("PDF structural check: likely scanned / image-only");
        return PdfContent::ScannedImage;
    }

    // --- Phase 2: attempt full text extraction ---
    match pdf_extract::extract_text_from_mem(pdf_bytes) {
        Ok(text) => {
            let meaningful = text.chars().filter(|c| !c.is_whitespace()).count();
            if meaningful == 0 {
                info!("No text layer found, treating as scanned");
                PdfContent::ScannedImage
            } else if meaningful < MIN_TEXT_CHARS {
                warn!(chars = meaningful, "Sparse text layer, parsing anyway");
                PdfContent::Text(text)
            } else {
                info!(chars = meaningful, "Text extracted successfully");
                PdfContent::Text(text)
            }
        }
        Err(e) => {
            warn!(error = %e, "pdf-extract failed on a structurally valid PDF");
            PdfContent::Error(format!("Text extraction failed: {e}"))
        }
    }
}

/// Heuristic: inspect the PDF object tree for signs that every page
/// is just a single image with no text operators.
///
/// We look at each page's `Resources` dictionary. If a page has
/// XObject images but **no** Font resources, it's almost certainly
/// a scanned page.
fn looks_like_scanned(doc: &Document) -> bool {
    let pages = doc.get_pages();
    if pages.is_empty() {
        return false; // Can't tell — let text extraction try
    }

    let mut image_only_pages = 0;

    for object_id in pages.values() {
        let Ok(page_obj) = doc.get_object(*object_id) else {
            continue;
        };
        let Ok(page_dict) = page_obj.as_dict() else {
            continue;
        };

        let resources = page_dict
            .get(b"Resources")
            .ok()
            .and_then(|r| doc.dereference(r).ok())
            .and_then(|(_, resolved)| resolved.as_dict().ok());

        let has_resource = |key: &[u8]| {
            resources
                .and_then(|res| res.get(key).ok())
                .and_then(|entry| doc.dereference(entry).ok())
                .and_then(|(_, resolved)| resolved.as_dict().ok())
                .is_some_and(|dict| !dict.is_empty())
        };

        if has_resource(b"XObject") && !has_resource(b"Font") {
            image_only_pages += 1;
        }
    }

    let total = pages.len();
    let ratio = image_only_pages as f64 / total as f64;
    info!(
        total_pages = total,
        image_only = image_only_pages,
        ratio = format!("{ratio:.2}"),
        "Scanned-page analysis"
    );

    // If ≥80% of pages are image-only, treat the whole PDF as scanned
    ratio >= 0.8
}

/// Hex SHA-256 of the document bytes, stored next to each row so a
/// re-uploaded file can be traced back.
pub fn document_digest(pdf_bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pdf_bytes);
    format!("{:x}", hasher.finalize())
}

/// An uploaded invoice file.
#[derive(Debug, Clone)]
pub struct InputDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl InputDocument {
    pub fn load(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self { name, bytes })
    }
}

/// Fields scraped from one uploaded document, with where they came from.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedInvoice {
    pub source: String,
    pub digest: String,
    pub content_type: &'static str,
    #[serde(flatten)]
    pub fields: FieldMap,
}

/// Run the field parser over one document.
pub fn extract_document(doc: &InputDocument, template: &Template) -> ExtractedInvoice {
    let content = extract_text_from_pdf(&doc.bytes);
    let fields = match &content {
        PdfContent::Text(_) => heuristics::extract_fields(&content.lines(), template),
        PdfContent::ScannedImage => {
            warn!("PDF is scanned — no text layer to parse");
            FieldMap::default()
        }
        PdfContent::Error(e) => {
            tracing::error!(error = %e, "Failed to process PDF");
            FieldMap::default()
        }
    };

    let (filled, total) = fields.coverage();
    info!(
        filled,
        total,
        invoice_no = %fields.invoice_number,
        po = %fields.po_number,
        invoice_total = %fields.invoice_total,
        "Extraction result"
    );

    ExtractedInvoice {
        source: doc.name.clone(),
        digest: document_digest(&doc.bytes),
        content_type: content.kind(),
        fields,
    }
}

/// Extract every document in order. Output length always equals input
/// length: unreadable documents yield an empty field map, never a gap.
pub fn extract_batch(docs: &[InputDocument], template: &Template) -> Vec<ExtractedInvoice> {
    info!(count = docs.len(), "Documents to extract");

    docs.iter()
        .map(|doc| {
            let span = tracing::info_span!("pdf", filename = %doc.name);
            let _guard = span.enter();
            extract_document(doc, template)
        })
        .collect()
}

/// Print a document's numbered lines and the fields scraped from them.
///
/// Usage: `invoice_dashboard inspect <file.pdf>`
pub fn inspect_pdf(
    path: impl AsRef<Path>,
    template: &Template,
) -> Result<(), Box<dyn std::error::Error>> {
    let doc = InputDocument::load(path)?;
    info!(filename = %doc.name, pdf_bytes = doc.bytes.len(), "Inspecting document");

    let content = extract_text_from_pdf(&doc.bytes);
    let lines = match &content {
        PdfContent::Text(_) => content.lines(),
        PdfContent::ScannedImage => {
            println!("\n⚠ PDF is scanned/image-only — cannot extract text.\n");
            return Ok(());
        }
        PdfContent::Error(e) => {
            tracing::error!(error = %e, "PDF extraction failed");
            println!("\n✗ Error: {e}\n");
            return Ok(());
        }
    };

    println!("\n--- Extracted Lines ({}) ---", lines.len());
    for (i, line) in lines.iter().enumerate() {
        println!("{i:>4} | {line}");
    }
    println!("--- End ---\n");

    let fields = heuristics::extract_fields(&lines, template);
    let (filled, total) = fields.coverage();
    info!(filled, total, "Keyword coverage");
    println!("{}", serde_json::to_string_pretty(&fields)?);
    println!("--- End Fields ({filled}/{total}) ---\n");

    Ok(())
}
