/// Element kinds the extractors branch on. Everything else is `Other`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tag {
    Div,
    P,
    Li,
    Table,
    A,
    Other(String),
}

impl Tag {
    /// Case-insensitive: accepts both DOM-style `LI` and html5ever-style `li`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "div" => Tag::Div,
            "p" => Tag::P,
            "li" => Tag::Li,
            "table" => Tag::Table,
            "a" => Tag::A,
            other => Tag::Other(other.to_string()),
        }
    }
}

/// The minimal shape of a rendered element the extractors consume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeDescriptor {
    pub tag: Tag,
    pub inner_text: String,
    /// Absolute link of the element (anchors) or of its anchor descendant.
    pub href: Option<String>,
}

impl NodeDescriptor {
    pub fn new(tag: Tag, inner_text: impl Into<String>) -> Self {
        Self {
            tag,
            inner_text: inner_text.into(),
            href: None,
        }
    }

    pub fn with_href(mut self, href: impl Into<String>) -> Self {
        self.href = Some(href.into());
        self
    }

    pub fn trimmed_text(&self) -> &str {
        self.inner_text.trim()
    }
}
