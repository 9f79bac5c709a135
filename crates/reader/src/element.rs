// ABOUTME: Semantic element classification for feed XML.
// ABOUTME: Maps (local name, namespace, attributes) to an ElementKind.

use crate::xml::StartTag;

pub const NS_ATOM: &str = "http://www.w3.org/2005/Atom";
pub const NS_ITUNES: &str = "http://www.itunes.com/dtds/podcast-1.0.dtd";
pub const NS_RDF: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";
pub const NS_RSS10: &str = "http://purl.org/rss/1.0/";
pub const NS_CONTENT: &str = "http://purl.org/rss/1.0/modules/content/";
pub const NS_XHTML: &str = "http://www.w3.org/1999/xhtml";

/// Semantic element type, the first key of the grammar table.
/// `Any` never comes out of classification; it is the wildcard slot a
/// context registers to catch everything it has no exact entry for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementKind {
    Unknown,
    Any,
    Rss,
    Rdf,
    Feed,
    Html,
    Channel,
    Item,
    Entry,
    Image,
    ItunesImage,
    Title,
    Subtitle,
    ItunesSubtitle,
    Summary,
    ItunesSummary,
    Description,
    Encoded,
    Body,
    SupportedContent,
    Link,
    Enclosure,
    Guid,
    Id,
    PubDate,
    Published,
    Updated,
    Author,
    ItunesAuthor,
    ItunesEpisode,
    Keywords,
    ItunesKeywords,
    NewFeedUrl,
    Url,
    Name,
    Email,
    Uri,
    Logo,
    Icon,
}

/// How an Atom text construct asks to be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentKind {
    #[default]
    Text,
    Html,
    Xhtml,
}

impl ContentKind {
    /// Maps an Atom `type` attribute. A missing attribute means text;
    /// anything unrecognized is treated as text rather than rejected here
    /// (rejection of non-inline content happens during classification).
    pub fn from_type_attr(value: Option<&str>) -> ContentKind {
        match value {
            Some("html") => ContentKind::Html,
            Some("xhtml") => ContentKind::Xhtml,
            _ => ContentKind::Text,
        }
    }
}

/// Classifies a start tag given its resolved namespace URI.
pub fn classify(tag: &StartTag, ns: Option<&str>) -> ElementKind {
    use ElementKind::*;

    let itunes = ns == Some(NS_ITUNES);
    match tag.local_name() {
        "rss" => Rss,
        "RDF" => Rdf,
        "feed" if ns == Some(NS_ATOM) => Feed,
        "html" | "HTML" => Html,
        "channel" => Channel,
        "item" => Item,
        "entry" => Entry,
        "image" if itunes => ItunesImage,
        "image" => Image,
        "title" => Title,
        "subtitle" if itunes => ItunesSubtitle,
        "subtitle" => Subtitle,
        "summary" if itunes => ItunesSummary,
        "summary" => Summary,
        "description" => Description,
        "encoded" if ns == Some(NS_CONTENT) => Encoded,
        "body" => Body,
        "content" => classify_content(tag, ns),
        "link" => Link,
        "enclosure" => Enclosure,
        "guid" => Guid,
        "id" => Id,
        "pubDate" => PubDate,
        "published" => Published,
        "updated" => Updated,
        "author" if itunes => ItunesAuthor,
        "author" => Author,
        "episode" if itunes => ItunesEpisode,
        "keywords" if itunes => ItunesKeywords,
        "keywords" => Keywords,
        "new-feed-url" if itunes => NewFeedUrl,
        "url" => Url,
        "name" => Name,
        "email" => Email,
        "uri" => Uri,
        "logo" => Logo,
        "icon" => Icon,
        _ => Unknown,
    }
}

/// Atom `<content>` is supported only as inline text/html/xhtml. A `src`
/// attribute (external reference) or a media type makes it unsupported, and
/// the whole subtree is skipped.
fn classify_content(tag: &StartTag, ns: Option<&str>) -> ElementKind {
    if ns.is_some() && ns != Some(NS_ATOM) {
        return ElementKind::Unknown;
    }
    if tag.attr("src").is_some() {
        return ElementKind::Unknown;
    }
    match tag.attr("type") {
        None | Some("text") | Some("html") | Some("xhtml") => ElementKind::SupportedContent,
        Some(_) => ElementKind::Unknown,
    }
}
