use serde::Serialize;

use super::node::{NodeDescriptor, Tag};

/// Default section delimiter; must never occur in statute text.
pub const DEFAULT_SECTION_DELIMITER: &str = "<<SECTION>>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Section {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActDocument {
    pub sections: Vec<Section>,
}

impl ActDocument {
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }
}

/// Concatenate the inner text of every `TABLE` node, each followed by
/// `delimiter`. Table text is kept as rendered, without trimming.
pub fn assemble_act(nodes: &[NodeDescriptor], delimiter: &str) -> String {
    let mut text = String::new();
    for node in nodes {
        match node.tag {
            Tag::Table => {
                text.push_str(&node.inner_text);
                text.push_str(delimiter);
            }
            Tag::Div | Tag::P | Tag::Li | Tag::A | Tag::Other(_) => {}
        }
    }
    text
}

/// Split assembled act text into sections, dropping the empty segment left
/// by the final delimiter.
pub fn split_sections(text: &str, delimiter: &str) -> ActDocument {
    let mut segments: Vec<&str> = text.split(delimiter).collect();
    if segments.last().is_some_and(|s| s.is_empty()) {
        segments.pop();
    }
    ActDocument {
        sections: segments
            .into_iter()
            .map(|s| Section { text: s.to_string() })
            .collect(),
    }
}
