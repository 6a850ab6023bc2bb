pub mod act;
pub mod continuation;
pub mod error;
pub mod index;
pub mod node;

use scraper::Html;
use url::Url;

use crate::db::{SectionRow, StoredActPage};
use crate::dom;
use act::ActDocument;
use error::ExtractError;
use index::ParsedIndex;

/// An act page split into sections, plus the link to the full act if the
/// page offers one.
#[derive(Debug, Clone, Default)]
pub struct ActPage {
    pub document: ActDocument,
    pub continuation: Option<String>,
}

/// Chapter index and per-chapter act index pages share one layout.
pub fn extract_index_page(html: &str, page_url: &Url) -> Result<ParsedIndex, ExtractError> {
    let document = Html::parse_document(html);
    let nodes = dom::select_nodes(&document, dom::UL_CHILDREN, page_url)?;
    let blob = index::build_index_string(&nodes)?;
    Ok(index::parse_index(&blob))
}

pub fn extract_act_page(
    html: &str,
    page_url: &Url,
    delimiter: &str,
    phrase: &str,
) -> Result<ActPage, ExtractError> {
    let document = Html::parse_document(html);
    let body = dom::select_nodes(&document, dom::P_CHILDREN, page_url)?;
    let anchors = dom::select_nodes(&document, dom::P_ANCHORS, page_url)?;

    let text = act::assemble_act(&body, delimiter);
    Ok(ActPage {
        document: act::split_sections(&text, delimiter),
        continuation: continuation::resolve_entire_act_link(&anchors, phrase),
    })
}

/// Split a stored act page into section rows.
pub fn process_page(page: &StoredActPage, delimiter: &str) -> Result<Vec<SectionRow>, ExtractError> {
    let base = Url::parse(&page.source_url).map_err(|e| ExtractError::InvalidUrl {
        url: page.source_url.clone(),
        message: e.to_string(),
    })?;
    let body = Html::parse_document(&page.html);
    let nodes = dom::select_nodes(&body, dom::P_CHILDREN, &base)?;
    let text = act::assemble_act(&nodes, delimiter);

    Ok(act::split_sections(&text, delimiter)
        .sections
        .into_iter()
        .enumerate()
        .map(|(position, section)| SectionRow {
            page_id: page.page_id,
            act_row_id: page.act_row_id,
            position: position as i64,
            text: section.text,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::act::DEFAULT_SECTION_DELIMITER;
    use crate::parser::continuation::ENTIRE_ACT_PHRASE;

    fn fixture(name: &str) -> String {
        std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap()
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn chapter_index_fixture() {
        let parsed = extract_index_page(
            &fixture("chapter_index"),
            &url("https://www.ilga.gov/legislation/ilcs/ilcs.asp"),
        )
        .unwrap();
        assert!(parsed.skipped.is_empty());
        assert_eq!(parsed.entries.len(), 5);

        let first = &parsed.entries[0];
        assert_eq!(first.title, "CHAPTER 5 GENERAL PROVISIONS");
        assert_eq!(first.topic, "GOVERNMENT");
        assert_eq!(
            first.url,
            "https://www.ilga.gov/legislation/ilcs/ilcs2.asp?ChapterID=2"
        );

        // the source wraps this item over two lines
        assert_eq!(parsed.entries[2].title, "CHAPTER 15 EXECUTIVE OFFICERS");

        let topics: Vec<&str> = parsed.entries.iter().map(|e| e.topic.as_str()).collect();
        assert_eq!(
            topics,
            ["GOVERNMENT", "GOVERNMENT", "GOVERNMENT", "EDUCATION", "EDUCATION"]
        );
    }

    #[test]
    fn act_index_fixture() {
        let parsed = extract_index_page(
            &fixture("act_index"),
            &url("https://www.ilga.gov/legislation/ilcs/ilcs2.asp?ChapterID=2"),
        )
        .unwrap();
        let titles: Vec<&str> = parsed.entries.iter().map(|e| e.title.as_str()).collect();
        assert_eq!(
            titles,
            [
                "5 ILCS 70/ Statute on Statutes.",
                "5 ILCS 75/ Illinois Identification Card Act.",
                "5 ILCS 100/ Illinois Administrative Procedure Act."
            ]
        );
        assert_eq!(parsed.entries[0].topic, "");
        assert_eq!(parsed.entries[2].topic, "ADMINISTRATIVE PROCEDURE");
        assert!(parsed.entries[2].url.ends_with("ilcs3.asp?ActID=7&ChapterID=2"));
    }

    #[test]
    fn act_text_fixture() {
        let page = extract_act_page(
            &fixture("act_text"),
            &url("https://www.ilga.gov/legislation/ilcs/ilcs3.asp?ActID=1&ChapterID=2"),
            DEFAULT_SECTION_DELIMITER,
            ENTIRE_ACT_PHRASE,
        )
        .unwrap();
        assert_eq!(page.continuation, None);
        assert_eq!(page.document.len(), 3);
        assert!(page.document.sections[0].text.contains("Sec. 1."));
        assert!(page.document.sections[2].text.contains("Sec. 1.03."));
    }

    #[test]
    fn act_with_articles_points_to_entire_act() {
        let page = extract_act_page(
            &fixture("act_articles"),
            &url("https://www.ilga.gov/legislation/ilcs/ilcs3.asp?ActID=7&ChapterID=2"),
            DEFAULT_SECTION_DELIMITER,
            ENTIRE_ACT_PHRASE,
        )
        .unwrap();
        assert!(page.document.is_empty());
        assert_eq!(
            page.continuation.as_deref(),
            Some("https://www.ilga.gov/legislation/ilcs/ilcs4.asp?ActID=7&ChapterID=2&Print=True")
        );
    }

    #[test]
    fn process_page_numbers_sections() {
        let page = StoredActPage {
            page_id: 4,
            act_row_id: 9,
            source_url: "https://www.ilga.gov/legislation/ilcs/ilcs3.asp?ActID=1&ChapterID=2".into(),
            html: fixture("act_text"),
        };
        let rows = process_page(&page, DEFAULT_SECTION_DELIMITER).unwrap();
        let positions: Vec<i64> = rows.iter().map(|r| r.position).collect();
        assert_eq!(positions, [0, 1, 2]);
        assert!(rows.iter().all(|r| r.page_id == 4 && r.act_row_id == 9));
    }
}
