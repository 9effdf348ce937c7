//! Text extraction for uploaded documents (plain text, PDF, DOCX).
//!
//! Callers supply bytes plus a format tag; this module returns plain UTF-8
//! text. A batch of documents is extracted in order and joined with a
//! newline, so the last word of one page or file never merges with the
//! first word of the next.

use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use docqa_core::Error;

pub const MIME_TEXT: &str = "text/plain";
pub const MIME_MARKDOWN: &str = "text/markdown";
pub const MIME_PDF: &str = "application/pdf";
pub const MIME_DOCX: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Maximum decompressed bytes to read from a single ZIP entry (zip-bomb protection).
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

/// Inserted between pages and between documents.
pub const DOCUMENT_SEPARATOR: &str = "\n";

/// Kind of content held by a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Text,
    Pdf,
    Docx,
}

impl DocumentFormat {
    /// Infer the format from a file extension (`.txt`, `.md`, `.pdf`, `.docx`).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "text" | "md" | "markdown" => Some(Self::Text),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            _ => None,
        }
    }

    /// Infer the format from a MIME type. Parameters such as `charset` are ignored.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        match essence.as_str() {
            MIME_TEXT | MIME_MARKDOWN => Some(Self::Text),
            MIME_PDF => Some(Self::Pdf),
            MIME_DOCX => Some(Self::Docx),
            _ => None,
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Text => MIME_TEXT,
            Self::Pdf => MIME_PDF,
            Self::Docx => MIME_DOCX,
        }
    }
}

impl FromStr for DocumentFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "txt" | "md" | "markdown" => Ok(Self::Text),
            "pdf" => Ok(Self::Pdf),
            "docx" => Ok(Self::Docx),
            other => Err(format!(
                "unsupported document format '{}'; expected text, pdf, or docx",
                other
            )),
        }
    }
}

/// One uploaded file. Only lives for the duration of an upload.
#[derive(Debug, Clone)]
pub struct Document {
    pub name: String,
    pub format: DocumentFormat,
    pub bytes: Vec<u8>,
}

impl Document {
    pub fn new(name: impl Into<String>, format: DocumentFormat, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            format,
            bytes,
        }
    }

    /// Read a file from disk, inferring its format from the extension.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let format = DocumentFormat::from_path(path).ok_or_else(|| {
            anyhow::anyhow!(
                "Unsupported file type: {} (expected .txt, .md, .pdf, or .docx)",
                path.display()
            )
        })?;
        let bytes = std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::new(name, format, bytes))
    }
}

/// Why a single document could not be read.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("unsupported content-type: {0}")]
    UnsupportedContentType(String),
    #[error("text is not valid UTF-8: {0}")]
    Encoding(String),
    #[error("PDF extraction failed: {0}")]
    Pdf(String),
    #[error("OOXML extraction failed: {0}")]
    Ooxml(String),
}

/// Extract and concatenate the text of every document, in order.
///
/// Any failing document aborts the batch with [`Error::Extraction`] naming
/// it; no partial text is returned.
pub fn extract_documents(docs: &[Document]) -> docqa_core::Result<String> {
    let mut texts = Vec::with_capacity(docs.len());
    for doc in docs {
        let text = extract_format(&doc.bytes, doc.format)
            .map_err(|e| Error::extraction(&doc.name, e.to_string()))?;
        tracing::debug!(
            document = %doc.name,
            characters = text.chars().count(),
            "extracted document"
        );
        texts.push(text);
    }
    Ok(texts.join(DOCUMENT_SEPARATOR))
}

/// Extract plain text from a single document identified by MIME type.
pub fn extract_text(bytes: &[u8], content_type: &str) -> Result<String, ExtractError> {
    let format = DocumentFormat::from_content_type(content_type)
        .ok_or_else(|| ExtractError::UnsupportedContentType(content_type.to_string()))?;
    extract_format(bytes, format)
}

fn extract_format(bytes: &[u8], format: DocumentFormat) -> Result<String, ExtractError> {
    match format {
        DocumentFormat::Text => extract_plain(bytes),
        DocumentFormat::Pdf => extract_pdf(bytes),
        DocumentFormat::Docx => extract_docx(bytes),
    }
}

fn extract_plain(bytes: &[u8]) -> Result<String, ExtractError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ExtractError::Encoding(e.to_string()))?;
    Ok(text.strip_prefix('\u{feff}').unwrap_or(text).to_string())
}

fn extract_pdf(bytes: &[u8]) -> Result<String, ExtractError> {
    // pdf-extract panics on some malformed inputs instead of returning Err.
    let pages = std::panic::catch_unwind(|| pdf_extract::extract_text_from_mem_by_pages(bytes))
        .map_err(|_| ExtractError::Pdf("parser crashed on malformed input".to_string()))?
        .map_err(|e| ExtractError::Pdf(e.to_string()))?;
    Ok(pages.join(DOCUMENT_SEPARATOR))
}

fn extract_docx(bytes: &[u8]) -> Result<String, ExtractError> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    let entry = archive
        .by_name("word/document.xml")
        .map_err(|_| ExtractError::Ooxml("word/document.xml not found".to_string()))?;
    let mut doc_xml = Vec::new();
    entry
        .take(MAX_XML_ENTRY_BYTES)
        .read_to_end(&mut doc_xml)
        .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
    if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
        return Err(ExtractError::Ooxml(
            "word/document.xml exceeds size limit".to_string(),
        ));
    }
    extract_paragraphs(&doc_xml)
}

/// Collect `<w:t>` runs, one output line per `<w:p>` paragraph.
fn extract_paragraphs(xml: &[u8]) -> Result<String, ExtractError> {
    use quick_xml::events::Event;

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_text = false;
    let mut reader = quick_xml::Reader::from_reader(xml);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"t" => in_text = true,
            Ok(Event::Text(te)) if in_text => {
                let text = te
                    .unescape()
                    .map_err(|e| ExtractError::Ooxml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::End(e)) => match e.local_name().as_ref() {
                b"t" => in_text = false,
                b"p" => paragraphs.push(std::mem::take(&mut current)),
                _ => {}
            },
            Ok(Event::Empty(e)) if e.local_name().as_ref() == b"tab" => current.push('\t'),
            Ok(Event::Eof) => break,
            Err(e) => return Err(ExtractError::Ooxml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }
    Ok(paragraphs.join(DOCUMENT_SEPARATOR))
}
