use serde::{Deserialize, Serialize};
use tracing::warn;

use super::error::ExtractError;
use super::node::{NodeDescriptor, Tag};

pub const TITLE_PREFIX: &str = "title:";
/// Written at column 0 by the builder; the parser also accepts it indented.
pub const TOPIC_PREFIX: &str = "topic:";
pub const URL_PREFIX: &str = "url:";
pub const ENTRY_SEPARATOR: &str = "\n\n";

const FIELD_PREFIXES: [&str; 3] = [TITLE_PREFIX, TOPIC_PREFIX, URL_PREFIX];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub title: String,
    pub topic: String,
    pub url: String,
}

/// A fragment of index text that did not match the entry grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedEntry {
    /// Zero-based position among the non-empty fragments.
    pub position: usize,
    pub fragment: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedIndex {
    pub entries: Vec<IndexEntry>,
    pub skipped: Vec<MalformedEntry>,
}

/// Flatten list children (`td ul > *`) into index text.
///
/// `DIV`/`P` nodes set the running topic, `LI` nodes emit one entry under the
/// most recent topic. Nodes with blank text are skipped. An item without an
/// anchor href aborts the whole call. Titles and topics may span several
/// lines, but blank lines inside them are dropped since a blank line ends an
/// entry.
pub fn build_index_string(nodes: &[NodeDescriptor]) -> Result<String, ExtractError> {
    let mut out = String::new();
    let mut current_topic = String::new();

    for (position, node) in nodes.iter().enumerate() {
        let text = node.trimmed_text();
        if text.is_empty() {
            continue;
        }
        match node.tag {
            Tag::Div | Tag::P => current_topic = without_blank_lines(text),
            Tag::Li => {
                let url = node.href.as_deref().ok_or_else(|| ExtractError::MissingAnchor {
                    position,
                    title: text.to_string(),
                })?;
                push_entry(&mut out, &without_blank_lines(text), &current_topic, url);
            }
            Tag::Table | Tag::A | Tag::Other(_) => {}
        }
    }

    Ok(out)
}

/// Parse index text back into entries. Malformed fragments are skipped and
/// reported in `ParsedIndex::skipped`.
pub fn parse_index(blob: &str) -> ParsedIndex {
    let mut parsed = ParsedIndex::default();

    let fragments = blob
        .split(ENTRY_SEPARATOR)
        .filter(|f| !f.trim().is_empty());

    for (position, fragment) in fragments.enumerate() {
        match parse_entry(fragment) {
            Ok(entry) => parsed.entries.push(entry),
            Err(reason) => {
                warn!(position, %reason, "Skipping malformed index entry");
                parsed.skipped.push(MalformedEntry {
                    position,
                    fragment: fragment.to_string(),
                    reason,
                });
            }
        }
    }

    parsed
}

/// Serialize entries in the same format `build_index_string` produces.
pub fn render_index(entries: &[IndexEntry]) -> String {
    let mut out = String::new();
    for e in entries {
        push_entry(&mut out, &e.title, &e.topic, &e.url);
    }
    out
}

fn push_entry(out: &mut String, title: &str, topic: &str, url: &str) {
    out.push_str(TITLE_PREFIX);
    out.push_str(title);
    out.push('\n');
    out.push_str(TOPIC_PREFIX);
    out.push_str(topic);
    out.push('\n');
    out.push_str(URL_PREFIX);
    out.push_str(url);
    out.push_str(ENTRY_SEPARATOR);
}

fn without_blank_lines(text: &str) -> String {
    text.lines()
        .filter(|l| !l.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Each field runs from its prefix up to the next field's prefix, so titles
/// and topics may continue over several lines. The url is a single line.
fn parse_entry(fragment: &str) -> Result<IndexEntry, String> {
    let mut fields: [Vec<&str>; 3] = Default::default();
    let mut current: Option<usize> = None;

    for line in fragment.trim_matches('\n').lines() {
        let next = current.map_or(0, |i| i + 1);
        let opened = FIELD_PREFIXES
            .get(next)
            .and_then(|prefix| line.trim_start().strip_prefix(prefix));
        match (opened, current) {
            (Some(rest), _) => {
                fields[next].push(rest);
                current = Some(next);
            }
            (None, Some(i)) if i + 1 < FIELD_PREFIXES.len() => fields[i].push(line),
            (None, Some(_)) => return Err("unexpected line after url".to_string()),
            (None, None) => return Err(format!("missing {:?} prefix", TITLE_PREFIX)),
        }
    }

    if let Some(missing) = FIELD_PREFIXES.get(current.map_or(0, |i| i + 1)) {
        return Err(format!("missing {:?} prefix", missing));
    }

    let [title, topic, url] = fields.map(|lines| lines.join("\n").trim().to_string());
    if title.is_empty() {
        return Err("empty title".to_string());
    }

    Ok(IndexEntry { title, topic, url })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn heading(tag: Tag, text: &str) -> NodeDescriptor {
        NodeDescriptor::new(tag, text)
    }

    fn item(text: &str, href: &str) -> NodeDescriptor {
        NodeDescriptor::new(Tag::Li, text).with_href(href)
    }

    fn entry(title: &str, topic: &str, url: &str) -> IndexEntry {
        IndexEntry {
            title: title.into(),
            topic: topic.into(),
            url: url.into(),
        }
    }

    fn round_trip(nodes: &[NodeDescriptor]) -> Vec<IndexEntry> {
        let blob = build_index_string(nodes).unwrap();
        let parsed = parse_index(&blob);
        assert!(parsed.skipped.is_empty(), "unexpected skips: {:?}", parsed.skipped);
        parsed.entries
    }

    #[test]
    fn exact_text_format() {
        let blob = build_index_string(&[
            heading(Tag::Div, "GOVERNMENT"),
            item("5 ILCS 70/ Statute on Statutes.", "https://x/ilcs3.asp?ActID=1"),
        ])
        .unwrap();
        assert_eq!(
            blob,
            "title:5 ILCS 70/ Statute on Statutes.\ntopic:GOVERNMENT\nurl:https://x/ilcs3.asp?ActID=1\n\n"
        );
    }

    #[test]
    fn topic_a_topic_b_scenario() {
        let nodes = [
            heading(Tag::Div, "Topic A"),
            item("Act 5", "u1"),
            item("Act 6", "u2"),
            heading(Tag::P, "Topic B"),
            item("Act 7", "u3"),
        ];
        assert_eq!(
            round_trip(&nodes),
            vec![
                entry("Act 5", "Topic A", "u1"),
                entry("Act 6", "Topic A", "u2"),
                entry("Act 7", "Topic B", "u3"),
            ]
        );
    }

    #[test]
    fn topic_sticks_until_next_heading() {
        let nodes = [
            heading(Tag::P, "A"),
            item("X", "hx"),
            item("Y", "hy"),
            heading(Tag::Div, "B"),
            item("Z", "hz"),
        ];
        let topics: Vec<String> = round_trip(&nodes).into_iter().map(|e| e.topic).collect();
        assert_eq!(topics, ["A", "A", "B"]);
    }

    #[test]
    fn blank_nodes_change_nothing() {
        let plain = [heading(Tag::Div, "A"), item("X", "hx"), item("Y", "hy")];
        let noisy = [
            heading(Tag::Div, "   "),
            heading(Tag::Div, "A"),
            item("", "ignored"),
            item("X", "hx"),
            heading(Tag::P, "\n\t"),
            heading(Tag::P, ""),
            item("Y", "hy"),
            item(" \n", "ignored"),
        ];
        assert_eq!(round_trip(&plain), round_trip(&noisy));
    }

    #[test]
    fn item_before_any_heading_has_empty_topic() {
        let entries = round_trip(&[item("Orphan", "u"), heading(Tag::Div, "Late")]);
        assert_eq!(entries, vec![entry("Orphan", "", "u")]);
    }

    #[test]
    fn text_is_trimmed() {
        let entries = round_trip(&[heading(Tag::Div, "\n Topic \n"), item("  Act 1\n", "u")]);
        assert_eq!(entries, vec![entry("Act 1", "Topic", "u")]);
    }

    #[test]
    fn other_tags_are_ignored() {
        let nodes = [
            heading(Tag::Div, "A"),
            NodeDescriptor::new(Tag::Table, "table text"),
            NodeDescriptor::new(Tag::Other("br".into()), "x"),
            item("X", "hx"),
        ];
        assert_eq!(round_trip(&nodes), vec![entry("X", "A", "hx")]);
    }

    #[test]
    fn item_without_anchor_aborts() {
        let nodes = [heading(Tag::Div, "A"), item("X", "hx"), NodeDescriptor::new(Tag::Li, "No link")];
        let err = build_index_string(&nodes).unwrap_err();
        assert!(matches!(
            err,
            ExtractError::MissingAnchor { position: 2, ref title } if title == "No link"
        ));
    }

    #[test]
    fn empty_input_yields_empty_index() {
        assert_eq!(build_index_string(&[]).unwrap(), "");
        assert_eq!(parse_index(""), ParsedIndex::default());
    }

    #[test]
    fn render_is_idempotent() {
        let entries = vec![entry("Act 5", "Topic A", "u1"), entry("Act 7", "", "u3")];
        let rendered = render_index(&entries);
        let reparsed = parse_index(&rendered).entries;
        assert_eq!(reparsed, entries);
        assert_eq!(render_index(&reparsed), rendered);
    }

    #[test]
    fn tolerates_indented_prefixes() {
        let parsed = parse_index("title:Act 1\n topic:T\n url:u\n\n");
        assert_eq!(parsed.entries, vec![entry("Act 1", "T", "u")]);
    }

    #[test]
    fn malformed_fragments_are_reported() {
        let blob = "title:Good\ntopic:T\nurl:u1\n\n\
                    title:Missing url\ntopic:T\n\n\
                    topic:T\ntitle:Swapped\nurl:u2\n\n\
                    title:\ntopic:T\nurl:u3\n\n\
                    title:Also good\ntopic:\nurl:u4\n\n";
        let parsed = parse_index(blob);
        assert_eq!(
            parsed.entries,
            vec![entry("Good", "T", "u1"), entry("Also good", "", "u4")]
        );
        let positions: Vec<usize> = parsed.skipped.iter().map(|s| s.position).collect();
        assert_eq!(positions, [1, 2, 3]);
        assert_eq!(parsed.skipped[0].reason, "missing \"url:\" prefix");
        assert_eq!(parsed.skipped[1].reason, "missing \"title:\" prefix");
        assert_eq!(parsed.skipped[2].reason, "empty title");
    }

    #[test]
    fn multi_line_items_round_trip() {
        let nodes = [
            heading(Tag::Div, "Topic A"),
            item("Act 5\n(repealed)", "u1"),
            item("Act 6", "u2"),
            heading(Tag::P, "Topic\nB"),
            item("Act 7\n\nsee also Act 8", "u3"),
        ];
        assert_eq!(
            round_trip(&nodes),
            vec![
                entry("Act 5\n(repealed)", "Topic A", "u1"),
                entry("Act 6", "Topic A", "u2"),
                entry("Act 7\nsee also Act 8", "Topic\nB", "u3"),
            ]
        );
    }

    #[test]
    fn line_after_url_is_malformed() {
        let parsed = parse_index("title:Act 1\ntopic:T\nurl:u\nstray\n\n");
        assert!(parsed.entries.is_empty());
        assert_eq!(parsed.skipped[0].reason, "unexpected line after url");
    }
}
