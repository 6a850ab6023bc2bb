use scraper::node::Node;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::parser::error::ExtractError;
use crate::parser::node::{NodeDescriptor, Tag};

/// Children of the list that holds chapter and act indexes.
pub const UL_CHILDREN: &str = "td ul > *";
/// Children of the paragraph that holds an act's section tables.
pub const P_CHILDREN: &str = "td p > *";
/// Anchors in the act body, where a "View Entire Act" link would live.
pub const P_ANCHORS: &str = "td p a";

const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "blockquote", "pre",
];

/// Materialize every element matching `selector` into a `NodeDescriptor`, in
/// document order. Hrefs are resolved against `base`.
pub fn select_nodes(
    document: &Html,
    selector: &str,
    base: &Url,
) -> Result<Vec<NodeDescriptor>, ExtractError> {
    let sel = Selector::parse(selector).map_err(|e| ExtractError::InvalidSelector {
        selector: selector.to_string(),
        message: format!("{:?}", e),
    })?;

    Ok(document
        .select(&sel)
        .map(|el| describe(el, base))
        .collect())
}

fn describe(el: ElementRef, base: &Url) -> NodeDescriptor {
    let tag = Tag::from_name(el.value().name());
    let text = match tag {
        Tag::Table => table_text(el),
        _ => inner_text(el),
    };
    NodeDescriptor {
        href: anchor_href(el, &tag).map(|h| absolutize(base, h)),
        tag,
        inner_text: text,
    }
}

/// The element's own href for anchors, otherwise the first anchor descendant's.
fn anchor_href<'a>(el: ElementRef<'a>, tag: &Tag) -> Option<&'a str> {
    if *tag == Tag::A {
        return el.value().attr("href");
    }
    el.descendants()
        .filter_map(ElementRef::wrap)
        .filter(|d| d.value().name() == "a")
        .find_map(|a| a.value().attr("href"))
}

fn absolutize(base: &Url, href: &str) -> String {
    base.join(href.trim())
        .map(String::from)
        .unwrap_or_else(|_| href.to_string())
}

/// Approximation of the browser's `innerText`: whitespace runs collapse,
/// `<br>` and block boundaries become line breaks.
pub fn inner_text(el: ElementRef) -> String {
    let mut raw = String::new();
    render(el, &mut raw);
    normalize(&raw)
}

/// Rows on separate lines, cells joined by a tab.
pub fn table_text(table: ElementRef) -> String {
    let mut rows = Vec::new();
    for row in table
        .descendants()
        .filter_map(ElementRef::wrap)
        .filter(|e| e.value().name() == "tr")
    {
        // rows of nested tables belong to the nested table's cell text
        if nearest_table(row).map(|t| t.id()) != Some(table.id()) {
            continue;
        }
        let cells: Vec<String> = row
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "td" | "th"))
            .map(inner_text)
            .collect();
        rows.push(cells.join("\t"));
    }
    rows.join("\n")
}

fn nearest_table(el: ElementRef) -> Option<ElementRef> {
    el.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
}

fn render(el: ElementRef, out: &mut String) {
    for child in el.children() {
        match child.value() {
            // source line breaks are plain whitespace; only markup breaks lines
            Node::Text(t) => out.extend(t.chars().map(|c| if c.is_whitespace() { ' ' } else { c })),
            Node::Element(e) => {
                let Some(child_el) = ElementRef::wrap(child) else {
                    continue;
                };
                match e.name() {
                    "br" => out.push('\n'),
                    "script" | "style" => {}
                    "table" => {
                        out.push('\n');
                        out.push_str(&table_text(child_el));
                        out.push('\n');
                    }
                    name if BLOCK_TAGS.contains(&name) => {
                        out.push('\n');
                        render(child_el, out);
                        out.push('\n');
                    }
                    _ => render(child_el, out),
                }
            }
            _ => {}
        }
    }
}

fn normalize(raw: &str) -> String {
    let lines: Vec<String> = raw
        .split('\n')
        .map(|line| {
            line.split('\t')
                .map(|cell| cell.split_whitespace().collect::<Vec<_>>().join(" "))
                .collect::<Vec<_>>()
                .join("\t")
        })
        .collect();

    let mut out: Vec<&str> = Vec::with_capacity(lines.len());
    for line in &lines {
        if line.trim().is_empty() {
            // keep at most one blank line between paragraphs
            if out.last().is_some_and(|l| !l.is_empty()) {
                out.push("");
            }
        } else {
            out.push(line);
        }
    }
    while out.last().is_some_and(|l| l.is_empty()) {
        out.pop();
    }
    out.join("\n")
}
