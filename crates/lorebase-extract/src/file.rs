//! Format-specific file parsers.
//!
//! Parsing is synchronous and runs on the blocking pool. Unknown extensions
//! fall back to a lossy text read rather than failing the document.

use std::io::Read;
use std::path::{Path, PathBuf};

use calamine::Reader;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use lorebase_core::{Document, Error, Result};

type FileParser = fn(&Path) -> Result<String>;

const PARSERS: &[(&[&str], FileParser)] = &[
    (&["pdf"], parse_pdf),
    (&["docx"], parse_docx),
    (&["doc"], parse_legacy_doc),
    (&["xlsx", "xls", "xlsm", "ods"], parse_spreadsheet),
    (&["csv"], parse_csv),
    (&["html", "htm"], parse_html),
    (&["txt", "md", "markdown", "text", "log", "json", "yaml", "yml"], parse_text),
];

pub(crate) async fn extract_file(document: &Document) -> Result<String> {
    let path = PathBuf::from(&document.source);
    let extension = document.file_extension();

    let parser = match parser_for(extension.as_deref()) {
        Some(parser) => parser,
        None => {
            warn!(
                "No parser for extension {:?} on document {}, reading as text",
                extension, document.id
            );
            parse_text as FileParser
        }
    };

    tokio::task::spawn_blocking(move || parser(&path))
        .await
        .map_err(|e| Error::Parse(format!("parser task failed: {}", e)))?
}

fn parser_for(extension: Option<&str>) -> Option<FileParser> {
    let extension = extension?;
    PARSERS
        .iter()
        .find(|(exts, _)| exts.contains(&extension))
        .map(|(_, parser)| *parser)
}

fn parse_pdf(path: &Path) -> Result<String> {
    pdf_extract::extract_text(path).map_err(|e| Error::Parse(format!("pdf: {}", e)))
}

/// DOCX is a zip archive; the body lives in `word/document.xml`.
fn parse_docx(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|e| Error::Parse(format!("docx: {}", e)))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|e| Error::Parse(format!("docx: {}", e)))?
        .read_to_string(&mut xml)?;
    Ok(docx_xml_to_text(&xml))
}

static XML_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("tag pattern"));

fn docx_xml_to_text(xml: &str) -> String {
    // Paragraph closes become blank lines before tags are stripped.
    let with_breaks = xml.replace("</w:p>", "\n\n");
    let stripped = XML_TAG.replace_all(&with_breaks, "");
    decode_entities(&stripped)
}

fn decode_entities(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
}

/// Legacy binary .doc has no open parser here; salvage printable runs.
fn parse_legacy_doc(path: &Path) -> Result<String> {
    const MIN_RUN: usize = 4;

    let bytes = std::fs::read(path)?;
    let mut out = String::new();
    let mut run = String::new();
    for &b in &bytes {
        if b == b'\n' || b == b'\t' || (0x20..0x7f).contains(&b) {
            run.push(b as char);
        } else {
            if run.trim().len() >= MIN_RUN {
                out.push_str(run.trim());
                out.push('\n');
            }
            run.clear();
        }
    }
    if run.trim().len() >= MIN_RUN {
        out.push_str(run.trim());
    }
    Ok(out)
}

fn parse_spreadsheet(path: &Path) -> Result<String> {
    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|e| Error::Parse(format!("spreadsheet: {}", e)))?;

    let mut sections = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook
            .worksheet_range(&name)
            .map_err(|e| Error::Parse(format!("spreadsheet sheet {}: {}", name, e)))?;
        let rows: Vec<String> = range
            .rows()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.to_string())
                    .collect::<Vec<_>>()
                    .join(" | ")
            })
            .filter(|r| !r.trim().is_empty() && r.chars().any(|c| c != ' ' && c != '|'))
            .collect();
        if !rows.is_empty() {
            sections.push(format!("Sheet: {}\n{}", name, rows.join("\n")));
        }
    }
    Ok(sections.join("\n\n"))
}

fn parse_csv(path: &Path) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| Error::Parse(format!("csv: {}", e)))?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::Parse(format!("csv: {}", e)))?;
        rows.push(record.iter().collect::<Vec<_>>().join(" | "));
    }
    Ok(rows.join("\n"))
}

fn parse_html(path: &Path) -> Result<String> {
    let html = std::fs::read(path)?;
    Ok(crate::html::extract_readable_text(&String::from_utf8_lossy(
        &html,
    )))
}

fn parse_text(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_text_lossy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"plain notes \xff here").unwrap();
        let text = parse_text(&path).unwrap();
        assert!(text.starts_with("plain notes"));
        assert!(text.ends_with("here"));
    }

    #[test]
    fn test_parse_csv_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.csv");
        std::fs::write(&path, "name,role\nAria,Bard\n").unwrap();
        let text = parse_csv(&path).unwrap();
        assert_eq!(text, "name | role\nAria | Bard");
    }

    #[test]
    fn test_parse_docx_body() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.docx");
        let file = std::fs::File::create(&path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        writer
            .write_all(
                b"<w:document><w:body>\
                  <w:p><w:r><w:t>First paragraph &amp; more</w:t></w:r></w:p>\
                  <w:p><w:r><w:t>Second paragraph</w:t></w:r></w:p>\
                  </w:body></w:document>",
            )
            .unwrap();
        writer.finish().unwrap();

        let text = parse_docx(&path).unwrap();
        assert!(text.contains("First paragraph & more"));
        assert!(text.contains("Second paragraph"));
    }

    #[test]
    fn test_legacy_doc_salvages_printable_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("old.doc");
        std::fs::write(&path, b"\x00\x01Recovered sentence\x00\x02ab\x00").unwrap();
        let text = parse_legacy_doc(&path).unwrap();
        assert!(text.contains("Recovered sentence"));
        assert!(!text.contains("ab"));
    }

    #[test]
    fn test_parser_dispatch() {
        assert!(parser_for(Some("pdf")).is_some());
        assert!(parser_for(Some("docx")).is_some());
        assert!(parser_for(Some("xlsx")).is_some());
        assert!(parser_for(Some("exe")).is_none());
        assert!(parser_for(None).is_none());
    }
}
