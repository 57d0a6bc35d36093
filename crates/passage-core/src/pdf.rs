//! PDF text extraction through poppler's `pdftotext`.

use std::io::Write;
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{Error, Result};

const PDFTOTEXT: &str = "pdftotext";
const PAGE_BREAK: char = '\u{c}';

/// Extract the text of a PDF page by page; pages are separated by a blank line.
///
/// A PDF that cannot be converted, or that has no text layer, is a
/// `Chunking` error for `document`.
pub fn extract_text(document: &str, bytes: &[u8]) -> Result<String> {
    let failed = |reason: String| Error::Chunking { document: document.to_string(), reason };

    let mut file = tempfile::Builder::new().prefix("passage-").suffix(".pdf").tempfile()?;
    file.write_all(bytes)?;
    file.flush()?;

    let output = Command::new(PDFTOTEXT)
        .args(["-layout", "-enc", "UTF-8"])
        .arg(file.path())
        .arg("-")
        .output()
        .map_err(|e| failed(format!("cannot run {PDFTOTEXT}: {e} (is poppler installed?)")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(%document, stderr = %stderr.trim(), "pdftotext failed");
        return Err(failed(format!("unreadable PDF: {}", stderr.trim())));
    }

    let pages = split_pages(&String::from_utf8_lossy(&output.stdout));
    if pages.is_empty() {
        return Err(failed("PDF has no extractable text".into()));
    }
    debug!(%document, pages = pages.len(), "PDF text extracted");
    Ok(pages.join("\n\n"))
}

/// Split `pdftotext` output on form feeds, dropping pages without text.
pub fn split_pages(text: &str) -> Vec<String> {
    text.split(PAGE_BREAK)
        .map(|page| page.lines().map(str::trim_end).collect::<Vec<_>>().join("\n").trim().to_string())
        .filter(|page| !page.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_split_on_form_feed() {
        let out = "Policy schedule   \nPage one\n\u{c}\n\u{c}Claims\n  1. Call us\n\u{c}";
        assert_eq!(split_pages(out), vec!["Policy schedule\nPage one", "Claims\n  1. Call us"]);
    }

    #[test]
    fn garbage_is_a_chunking_error() {
        let err = extract_text("policy.pdf", b"this is not a pdf").err();
        assert!(matches!(err, Some(Error::Chunking { ref document, .. }) if document == "policy.pdf"));
    }
}
