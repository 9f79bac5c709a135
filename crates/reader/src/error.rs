// ABOUTME: Error types for feed reading operations.
// ABOUTME: Every variant is fatal; recoverable conditions are logged and skipped instead.

use thiserror::Error;

/// Errors that abort a feed read.
///
/// Element-level problems (bad dates, unknown elements, missing optional
/// attributes) never show up here. They are skipped where they occur and the
/// parse continues. Everything in this enum stops the parse and carries a
/// message suitable for showing to the user directly.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The document root is `<html>` rather than a feed.
    #[error("the downloaded document is an HTML page, not a podcast feed")]
    HtmlPage,

    /// The root is `<rss>` but the version attribute is not "2.0".
    #[error("unsupported RSS version \"{0}\"; only RSS 2.0 feeds are supported")]
    UnsupportedRssVersion(String),

    /// The root is `rdf:RDF` but no RSS 1.0 namespace is declared on it.
    #[error("the RDF document does not declare the RSS 1.0 namespace")]
    NotRss10,

    /// The root element is not one of rss / rdf:RDF / Atom feed.
    #[error("the document is not a recognized RSS or Atom feed")]
    UnknownFeedType,

    /// The byte stream is not well-formed XML, or it ended mid-document
    /// after the transport reported completion.
    #[error("the feed is not well formed: {0}")]
    Malformed(String),

    /// Download failure surfaced by the transport collaborator. Kept distinct
    /// from parse errors so the user can tell "couldn't download" from
    /// "downloaded but couldn't parse".
    #[error("could not download the feed: {0}")]
    Transport(String),

    /// State-stack underflow or nesting mismatch. A programming error, not a
    /// user condition.
    #[error("internal parser state error: {0}")]
    Internal(String),
}

impl ReadError {
    /// Creates a Malformed error with a custom message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        ReadError::Malformed(msg.into())
    }

    /// Creates a Transport error with a custom message.
    pub fn transport(msg: impl Into<String>) -> Self {
        ReadError::Transport(msg.into())
    }
}
