//! Plain-text and metadata extraction from uploaded files.

use crate::errors::{CoreError, CoreResult};
use crate::types::{DocumentType, ParsedDocument};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const DOCUMENT_TYPE_SCAN_CHARS: usize = 10_000;

/// Extract plain text and metadata from raw files.
#[derive(Debug, Clone, Default)]
pub struct DocumentParser;

impl DocumentParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(
        &self,
        content: &[u8],
        filename: &str,
        content_type: Option<&str>,
    ) -> CoreResult<ParsedDocument> {
        let mime_type = content_type
            .map(str::to_string)
            .unwrap_or_else(|| Self::guess_mime_type(filename));
        debug!("Parsing {} as {}", filename, mime_type);

        let (text, metadata) = match mime_type.as_str() {
            "application/pdf" => (Self::extract_pdf(content)?, BTreeMap::new()),
            "text/html" => Self::extract_html(content),
            "message/rfc822" => Self::extract_email(content),
            _ => (String::from_utf8_lossy(content).into_owned(), BTreeMap::new()),
        };

        let document_type = Self::detect_document_type(filename, &text, &metadata);
        Ok(ParsedDocument {
            content: text,
            mime_type,
            metadata,
            document_type,
        })
    }

    fn guess_mime_type(filename: &str) -> String {
        let suffix = Path::new(filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        match suffix.as_str() {
            "pdf" => "application/pdf",
            "html" | "htm" => "text/html",
            "eml" => "message/rfc822",
            "msg" => "application/vnd.ms-outlook",
            "txt" => "text/plain",
            _ => "application/octet-stream",
        }
        .to_string()
    }

    fn extract_pdf(content: &[u8]) -> CoreResult<String> {
        pdf_extract::extract_text_from_mem(content)
            .map_err(|err| CoreError::validation(format!("Failed to parse PDF: {err}")))
    }

    fn extract_html(content: &[u8]) -> (String, BTreeMap<String, String>) {
        let html = String::from_utf8_lossy(content);
        let document = scraper::Html::parse_document(&html);

        let mut metadata = BTreeMap::new();
        if let Ok(selector) = scraper::Selector::parse("title") {
            if let Some(title) = document.select(&selector).next() {
                let title: String = title.text().collect::<String>().trim().to_string();
                if !title.is_empty() {
                    metadata.insert("title".to_string(), title);
                }
            }
        }

        let body_selector = scraper::Selector::parse("body").ok();
        let text: String = match body_selector.and_then(|sel| {
            document
                .select(&sel)
                .next()
                .map(|body| body.text().collect::<Vec<_>>().join(" "))
        }) {
            Some(text) => text,
            None => document.root_element().text().collect::<Vec<_>>().join(" "),
        };
        let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
        (text, metadata)
    }

    /// Minimal RFC 822 split: headers up to the first blank line, body
    /// afterwards. `From`, `To`, `Subject` and `Date` land in metadata.
    fn extract_email(content: &[u8]) -> (String, BTreeMap<String, String>) {
        let raw = String::from_utf8_lossy(content);
        let mut metadata = BTreeMap::new();
        metadata.insert("format_type".to_string(), "email".to_string());

        let mut lines = raw.lines();
        let mut current: Option<(String, String)> = None;
        for line in lines.by_ref() {
            if line.trim().is_empty() {
                break;
            }
            if line.starts_with(' ') || line.starts_with('\t') {
                if let Some((_, value)) = current.as_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((name, value)) = current.take() {
                Self::record_header(&mut metadata, &name, value);
            }
            if let Some((name, value)) = line.split_once(':') {
                current = Some((name.trim().to_string(), value.trim().to_string()));
            }
        }
        if let Some((name, value)) = current.take() {
            Self::record_header(&mut metadata, &name, value);
        }

        let body: String = lines.collect::<Vec<_>>().join("\n");
        (body.trim().to_string(), metadata)
    }

    fn record_header(metadata: &mut BTreeMap<String, String>, name: &str, value: String) {
        let key = name.to_lowercase();
        if matches!(key.as_str(), "from" | "to" | "subject" | "date") && !value.is_empty() {
            metadata.insert(key, value);
        }
    }

    pub fn detect_document_type(
        filename: &str,
        content: &str,
        metadata: &BTreeMap<String, String>,
    ) -> DocumentType {
        let suffix = Path::new(filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if suffix == "eml"
            || suffix == "msg"
            || metadata.get("format_type").map(String::as_str) == Some("email")
        {
            return DocumentType::Email;
        }

        let upper: String = content
            .chars()
            .take(DOCUMENT_TYPE_SCAN_CHARS)
            .collect::<String>()
            .to_uppercase();
        if upper.contains("FORM 10-K") || upper.contains("FORM 10-Q") || upper.contains("FORM 8-K")
        {
            return DocumentType::SecFiling;
        }

        DocumentType::General
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_mime_from_suffix() {
        assert_eq!(DocumentParser::guess_mime_type("a.PDF"), "application/pdf");
        assert_eq!(DocumentParser::guess_mime_type("a.htm"), "text/html");
        assert_eq!(DocumentParser::guess_mime_type("a.eml"), "message/rfc822");
        assert_eq!(
            DocumentParser::guess_mime_type("a.bin"),
            "application/octet-stream"
        );
    }

    #[test]
    fn parses_plain_text() {
        let parser = DocumentParser::new();
        let parsed = parser.parse(b"hello world", "notes.txt", None).unwrap();
        assert_eq!(parsed.content, "hello world");
        assert_eq!(parsed.mime_type, "text/plain");
        assert_eq!(parsed.document_type, DocumentType::General);
    }

    #[test]
    fn strips_html_tags_and_keeps_title() {
        let parser = DocumentParser::new();
        let html = b"<html><head><title>Annual Report</title></head>\
            <body><p>Acme Corp</p><p>results</p></body></html>";
        let parsed = parser.parse(html, "report.html", None).unwrap();
        assert!(parsed.content.contains("Acme Corp"));
        assert!(parsed.content.contains("results"));
        assert!(!parsed.content.contains('<'));
        assert_eq!(parsed.metadata.get("title").unwrap(), "Annual Report");
    }

    #[test]
    fn splits_email_headers_from_body() {
        let parser = DocumentParser::new();
        let eml = b"From: Jane <jane@example.org>\nTo: john@example.org\n\
Subject: Meeting\n Notes attached\nDate: Mon, 1 Jan 2024 10:00:00 +0000\n\
\nSee the attached notes.\nThanks";
        let parsed = parser.parse(eml, "mail.eml", None).unwrap();
        assert_eq!(parsed.document_type, DocumentType::Email);
        assert_eq!(parsed.metadata.get("subject").unwrap(), "Meeting Notes attached");
        assert!(parsed.content.starts_with("See the attached notes."));
    }

    #[test]
    fn detects_sec_filings_from_leading_text() {
        let metadata = BTreeMap::new();
        let content = format!("{}FORM 10-K annual report", " ".repeat(100));
        assert_eq!(
            DocumentParser::detect_document_type("report.txt", &content, &metadata),
            DocumentType::SecFiling
        );

        let late = format!("{}form 10-k", "x".repeat(DOCUMENT_TYPE_SCAN_CHARS + 10));
        assert_eq!(
            DocumentParser::detect_document_type("report.txt", &late, &metadata),
            DocumentType::General
        );
    }
}
