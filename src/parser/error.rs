use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    /// An index item carried no anchor to take its url from.
    #[error("index item #{position} ({title:?}) has no anchor href")]
    MissingAnchor { position: usize, title: String },

    #[error("invalid selector {selector:?}: {message}")]
    InvalidSelector { selector: String, message: String },

    #[error("invalid page url {url:?}: {message}")]
    InvalidUrl { url: String, message: String },
}
