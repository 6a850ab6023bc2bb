use super::node::NodeDescriptor;

/// Link text marking the page that renders an act in full.
pub const ENTIRE_ACT_PHRASE: &str = "view entire act";

/// Href of the first anchor whose text contains `phrase`, case-insensitively.
/// Anchors without an href are not candidates. `None` is the common case:
/// most acts render inline.
pub fn resolve_entire_act_link(anchors: &[NodeDescriptor], phrase: &str) -> Option<String> {
    let needle = phrase.to_lowercase();
    anchors
        .iter()
        .filter(|a| a.trimmed_text().to_lowercase().contains(&needle))
        .find_map(|a| a.href.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::node::Tag;

    fn anchor(text: &str, href: &str) -> NodeDescriptor {
        NodeDescriptor::new(Tag::A, text).with_href(href)
    }

    #[test]
    fn finds_view_entire_act() {
        let anchors = [
            anchor("Article 1", "h1"),
            anchor("View Entire Act", "h2"),
            anchor("Article 2", "h3"),
        ];
        assert_eq!(
            resolve_entire_act_link(&anchors, ENTIRE_ACT_PHRASE).as_deref(),
            Some("h2")
        );
    }

    #[test]
    fn absent_without_match() {
        let anchors = [anchor("Article 1", "h1"), anchor("Article 2", "h3")];
        assert_eq!(resolve_entire_act_link(&anchors, ENTIRE_ACT_PHRASE), None);
        assert_eq!(resolve_entire_act_link(&[], ENTIRE_ACT_PHRASE), None);
    }

    #[test]
    fn first_match_wins_and_phrase_case_is_ignored() {
        let anchors = [
            anchor("  >> VIEW ENTIRE ACT <<\n", "first"),
            anchor("view entire act", "second"),
        ];
        assert_eq!(
            resolve_entire_act_link(&anchors, "View Entire Act").as_deref(),
            Some("first")
        );
    }

    #[test]
    fn anchor_without_href_is_skipped() {
        let anchors = [
            NodeDescriptor::new(Tag::A, "View Entire Act"),
            anchor("View Entire Act", "real"),
        ];
        assert_eq!(
            resolve_entire_act_link(&anchors, ENTIRE_ACT_PHRASE).as_deref(),
            Some("real")
        );
    }
}
