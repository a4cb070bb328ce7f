//! Readable-text extraction from HTML.
//!
//! Layered strategy: structured tables first, then heading-led sections, then
//! bare paragraphs and lists. If none of those yield anything the whole
//! document is stripped of markup, minus script/style/chrome subtrees.

use scraper::{ElementRef, Html, Selector};

struct Selectors {
    table: Selector,
    row: Selector,
    cell: Selector,
    heading: Selector,
    paragraph: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            table: Selector::parse("table, [role=\"table\"]").expect("table selector"),
            row: Selector::parse("tr, [role=\"row\"]").expect("row selector"),
            cell: Selector::parse("th, td, [role=\"cell\"]").expect("cell selector"),
            heading: Selector::parse("h1, h2, h3").expect("heading selector"),
            paragraph: Selector::parse("p, ul, ol, pre, blockquote").expect("paragraph selector"),
        }
    }
}

/// Extract readable plain text from an HTML document.
pub fn extract_readable_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    let selectors = Selectors::new();

    let mut sections: Vec<String> = Vec::new();
    sections.extend(extract_tables(&doc, &selectors));
    sections.extend(extract_heading_sections(&doc, &selectors));
    if sections.is_empty() {
        sections.extend(extract_paragraphs(&doc, &selectors));
    }
    if sections.is_empty() {
        return strip_markup(&doc);
    }
    sections.join("\n\n")
}

/// Tables become one line per row, cells joined with " | ".
fn extract_tables(doc: &Html, selectors: &Selectors) -> Vec<String> {
    let mut out = Vec::new();
    for table in doc.select(&selectors.table) {
        let mut rows = Vec::new();
        for row in table.select(&selectors.row) {
            let cells: Vec<String> = row
                .select(&selectors.cell)
                .map(|cell| element_text(&cell))
                .filter(|c| !c.is_empty())
                .collect();
            if !cells.is_empty() {
                rows.push(cells.join(" | "));
            }
        }
        if !rows.is_empty() {
            out.push(rows.join("\n"));
        }
    }
    out
}

/// Each h1-h3 heading plus the sibling content up to the next such heading.
fn extract_heading_sections(doc: &Html, selectors: &Selectors) -> Vec<String> {
    let mut out = Vec::new();
    for heading in doc.select(&selectors.heading) {
        let title = element_text(&heading);
        if title.is_empty() {
            continue;
        }

        let mut body = Vec::new();
        for sibling in heading.next_siblings() {
            let Some(element) = ElementRef::wrap(sibling) else {
                continue;
            };
            let name = element.value().name();
            if matches!(name, "h1" | "h2" | "h3") {
                break;
            }
            if matches!(
                name,
                "p" | "ul" | "ol" | "pre" | "blockquote" | "div" | "table" | "h4" | "h5" | "h6"
            ) {
                let text = element_text(&element);
                if !text.is_empty() {
                    body.push(text);
                }
            }
        }

        if body.is_empty() {
            out.push(title);
        } else {
            out.push(format!("{}\n{}", title, body.join("\n")));
        }
    }
    out
}

fn extract_paragraphs(doc: &Html, selectors: &Selectors) -> Vec<String> {
    doc.select(&selectors.paragraph)
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())
        .collect()
}

/// Full-document fallback: all text nodes outside script/style and page
/// chrome, joined with single spaces.
fn strip_markup(doc: &Html) -> String {
    let mut parts: Vec<String> = Vec::new();
    for node in doc.tree.root().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let skip = node.ancestors().any(|a| {
            a.value().as_element().is_some_and(|e| {
                matches!(
                    e.name(),
                    "script" | "style" | "noscript" | "header" | "footer" | "nav"
                )
            })
        });
        if skip {
            continue;
        }
        let text = text.trim();
        if !text.is_empty() {
            parts.push(text.to_string());
        }
    }
    parts.join(" ")
}

/// Collapsed inner text of an element.
fn element_text(element: &ElementRef) -> String {
    let joined = element.text().collect::<Vec<_>>().join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}
