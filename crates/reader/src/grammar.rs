// ABOUTME: Declarative feed grammar: (context, element kind) -> handler rule.
// ABOUTME: Built once behind a Lazy, immutable, shared by every reader instance.

use std::collections::HashMap;
use std::fmt::Write as _;

use once_cell::sync::Lazy;
use tracing::{info, warn};

use crate::builder::{add_keywords, normalize_description, DescribedText, FeedBuilder, Person};
use crate::element::{ContentKind, ElementKind, NS_RSS10};
use crate::error::ReadError;
use crate::text;
use crate::time_parse::parse_feed_date;
use crate::xml::StartTag;

/// Parser context: which sub-table of the grammar is active. One context is
/// pushed per open element; the stack of contexts is the whole continuation
/// needed to resume a suspended parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    /// Before the root element.
    Root,
    Rss,
    Rdf,
    Channel,
    Image,
    Item,
    Feed,
    Entry,
    /// Inside an Atom person construct.
    Person,
    /// Inside a captured xhtml subtree; children re-serialize themselves.
    Xhtml,
    /// Inside an unrecognized subtree. Its sub-table is empty, so every
    /// descendant resolves to skip again and the stack stays balanced.
    Skip,
}

/// A finished element handed to an exit handler.
pub struct ClosedElement<'a> {
    /// Raw qualified name as written in the document.
    pub name: &'a str,
    /// Character data accumulated directly under this element.
    pub text: &'a str,
}

pub type EnterFn = fn(&mut FeedBuilder, &StartTag) -> Result<(), ReadError>;
pub type ExitFn = fn(&mut FeedBuilder, &ClosedElement) -> Result<(), ReadError>;

/// Handler triple for one (context, element) pair. `context` is what gets
/// pushed for the element's children.
#[derive(Clone, Copy)]
pub struct Rule {
    pub context: Context,
    pub enter: Option<EnterFn>,
    pub exit: Option<ExitFn>,
}

fn rule(context: Context) -> Rule {
    Rule {
        context,
        enter: None,
        exit: None,
    }
}

impl Rule {
    fn on_enter(mut self, f: EnterFn) -> Self {
        self.enter = Some(f);
        self
    }
    fn on_exit(mut self, f: ExitFn) -> Self {
        self.exit = Some(f);
        self
    }
}

/// Default rule for anything no context claims: consume the subtree,
/// keep the stack balanced, let nothing leak.
pub static SKIP_RULE: Rule = Rule {
    context: Context::Skip,
    enter: None,
    exit: None,
};

/// Synthetic rule for the document itself, below the root element.
pub static DOCUMENT_RULE: Rule = Rule {
    context: Context::Root,
    enter: None,
    exit: None,
};

/// Resolves a rule: exact entry, then the context's wildcard, then skip.
pub fn lookup(context: Context, kind: ElementKind) -> &'static Rule {
    GRAMMAR
        .get(&(context, kind))
        .or_else(|| GRAMMAR.get(&(context, ElementKind::Any)))
        .unwrap_or(&SKIP_RULE)
}

static GRAMMAR: Lazy<HashMap<(Context, ElementKind), Rule>> = Lazy::new(|| {
    use Context as C;
    use ElementKind as E;

    let mut g: HashMap<(Context, ElementKind), Rule> = HashMap::new();

    // Document root: the only place where an unexpected element is fatal.
    g.insert((C::Root, E::Rss), rule(C::Rss).on_enter(begin_rss));
    g.insert((C::Root, E::Rdf), rule(C::Rdf).on_enter(begin_rdf));
    g.insert((C::Root, E::Feed), rule(C::Feed));
    g.insert((C::Root, E::Html), rule(C::Skip).on_enter(reject_html));
    g.insert((C::Root, E::Any), rule(C::Skip).on_enter(reject_unknown_root));

    // <rss> wrapper.
    g.insert((C::Rss, E::Channel), rule(C::Channel));

    // rdf:RDF wrapper. RSS 1.0 items and the channel image are siblings of
    // <channel>, not children, so they route from here as well.
    g.insert((C::Rdf, E::Channel), rule(C::Channel));
    g.insert(
        (C::Rdf, E::Item),
        rule(C::Item).on_enter(begin_item).on_exit(end_item),
    );
    g.insert((C::Rdf, E::Image), rule(C::Image));

    // <channel>, shared between RSS 2.0 and RSS 1.0.
    g.insert((C::Channel, E::Title), rule(C::Skip).on_exit(end_channel_title));
    g.insert(
        (C::Channel, E::Description),
        rule(C::Skip).on_exit(end_channel_description),
    );
    g.insert(
        (C::Channel, E::ItunesSummary),
        rule(C::Skip).on_exit(end_channel_description),
    );
    g.insert(
        (C::Channel, E::Encoded),
        rule(C::Skip).on_exit(end_channel_encoded),
    );
    g.insert(
        (C::Channel, E::Body),
        rule(C::Skip).on_enter(enter_body).on_exit(end_channel_body),
    );
    g.insert(
        (C::Channel, E::ItunesSubtitle),
        rule(C::Skip).on_exit(end_channel_subtitle),
    );
    g.insert(
        (C::Channel, E::ItunesAuthor),
        rule(C::Skip).on_exit(end_channel_author),
    );
    g.insert(
        (C::Channel, E::Keywords),
        rule(C::Skip).on_exit(end_channel_keywords),
    );
    g.insert(
        (C::Channel, E::ItunesKeywords),
        rule(C::Skip).on_exit(end_channel_keywords),
    );
    g.insert(
        (C::Channel, E::NewFeedUrl),
        rule(C::Skip).on_exit(end_new_feed_url),
    );
    g.insert((C::Channel, E::Link), rule(C::Skip).on_exit(end_channel_link));
    g.insert(
        (C::Channel, E::ItunesImage),
        rule(C::Skip).on_enter(enter_itunes_image),
    );
    g.insert((C::Channel, E::Image), rule(C::Image));
    g.insert(
        (C::Channel, E::Item),
        rule(C::Item).on_enter(begin_item).on_exit(end_item),
    );

    // <image> block: only its <url> matters.
    g.insert((C::Image, E::Url), rule(C::Skip).on_exit(end_image_url));

    // <item>.
    g.insert((C::Item, E::Title), rule(C::Skip).on_exit(end_item_title));
    g.insert(
        (C::Item, E::ItunesSubtitle),
        rule(C::Skip).on_exit(end_item_subtitle),
    );
    g.insert(
        (C::Item, E::Description),
        rule(C::Skip).on_exit(end_item_description),
    );
    g.insert(
        (C::Item, E::ItunesSummary),
        rule(C::Skip).on_exit(end_item_description),
    );
    g.insert((C::Item, E::Encoded), rule(C::Skip).on_exit(end_item_encoded));
    g.insert(
        (C::Item, E::Body),
        rule(C::Skip).on_enter(enter_body).on_exit(end_item_body),
    );
    g.insert((C::Item, E::Guid), rule(C::Skip).on_exit(end_item_guid));
    g.insert((C::Item, E::PubDate), rule(C::Skip).on_exit(end_item_pub_date));
    g.insert((C::Item, E::Author), rule(C::Skip).on_exit(end_item_author));
    g.insert(
        (C::Item, E::ItunesAuthor),
        rule(C::Skip).on_exit(end_item_author),
    );
    g.insert(
        (C::Item, E::Keywords),
        rule(C::Skip).on_exit(end_item_keywords),
    );
    g.insert(
        (C::Item, E::ItunesKeywords),
        rule(C::Skip).on_exit(end_item_keywords),
    );
    g.insert(
        (C::Item, E::ItunesEpisode),
        rule(C::Skip).on_exit(end_item_sequence),
    );
    g.insert(
        (C::Item, E::Enclosure),
        rule(C::Skip).on_enter(enter_enclosure),
    );
    g.insert((C::Item, E::Link), rule(C::Skip).on_exit(end_item_link));

    // Atom <feed>.
    g.insert(
        (C::Feed, E::Title),
        rule(C::Skip).on_enter(enter_atom_text).on_exit(end_feed_title),
    );
    g.insert(
        (C::Feed, E::Subtitle),
        rule(C::Skip)
            .on_enter(enter_atom_text)
            .on_exit(end_feed_subtitle),
    );
    g.insert((C::Feed, E::Link), rule(C::Skip).on_enter(enter_feed_link));
    g.insert((C::Feed, E::Logo), rule(C::Skip).on_exit(end_feed_logo));
    g.insert((C::Feed, E::Icon), rule(C::Skip).on_exit(end_feed_icon));
    g.insert(
        (C::Feed, E::Author),
        rule(C::Person)
            .on_enter(begin_person)
            .on_exit(end_feed_author),
    );
    g.insert(
        (C::Feed, E::ItunesAuthor),
        rule(C::Skip).on_exit(end_channel_author),
    );
    g.insert(
        (C::Feed, E::ItunesImage),
        rule(C::Skip).on_enter(enter_itunes_image),
    );
    g.insert(
        (C::Feed, E::ItunesKeywords),
        rule(C::Skip).on_exit(end_channel_keywords),
    );
    g.insert(
        (C::Feed, E::Entry),
        rule(C::Entry).on_enter(begin_item).on_exit(end_item),
    );

    // Atom <entry>.
    g.insert(
        (C::Entry, E::Title),
        rule(C::Skip)
            .on_enter(enter_atom_text)
            .on_exit(end_entry_title),
    );
    g.insert(
        (C::Entry, E::Summary),
        rule(C::Skip)
            .on_enter(enter_atom_text)
            .on_exit(end_entry_summary),
    );
    g.insert(
        (C::Entry, E::SupportedContent),
        rule(C::Skip)
            .on_enter(enter_atom_text)
            .on_exit(end_entry_content),
    );
    g.insert(
        (C::Entry, E::Published),
        rule(C::Skip).on_exit(end_entry_published),
    );
    g.insert(
        (C::Entry, E::Updated),
        rule(C::Skip).on_exit(end_entry_updated),
    );
    g.insert(
        (C::Entry, E::Author),
        rule(C::Person)
            .on_enter(begin_person)
            .on_exit(end_entry_author),
    );
    g.insert((C::Entry, E::Id), rule(C::Skip).on_exit(end_item_guid));
    g.insert((C::Entry, E::Link), rule(C::Skip).on_enter(enter_entry_link));
    g.insert(
        (C::Entry, E::ItunesKeywords),
        rule(C::Skip).on_exit(end_item_keywords),
    );
    g.insert(
        (C::Entry, E::ItunesAuthor),
        rule(C::Skip).on_exit(end_item_author),
    );
    g.insert(
        (C::Entry, E::ItunesEpisode),
        rule(C::Skip).on_exit(end_item_sequence),
    );

    // Atom person construct.
    g.insert((C::Person, E::Name), rule(C::Skip).on_exit(end_person_name));
    g.insert((C::Person, E::Email), rule(C::Skip).on_exit(end_person_email));
    g.insert((C::Person, E::Uri), rule(C::Skip).on_exit(end_person_uri));

    // Captured xhtml: every child re-serializes itself into the buffer.
    g.insert(
        (C::Xhtml, E::Any),
        rule(C::Xhtml).on_enter(xhtml_open).on_exit(xhtml_close),
    );

    g
});

// ---------------------------------------------------------------------------
// Document-level handlers
// ---------------------------------------------------------------------------

fn begin_rss(_b: &mut FeedBuilder, tag: &StartTag) -> Result<(), ReadError> {
    match tag.attr("version") {
        Some("2.0") => Ok(()),
        other => Err(ReadError::UnsupportedRssVersion(
            other.unwrap_or("").to_string(),
        )),
    }
}

fn begin_rdf(_b: &mut FeedBuilder, tag: &StartTag) -> Result<(), ReadError> {
    let declares_rss10 = tag
        .attributes
        .iter()
        .any(|(k, v)| k.starts_with("xmlns") && v == NS_RSS10);
    if declares_rss10 {
        Ok(())
    } else {
        Err(ReadError::NotRss10)
    }
}

fn reject_html(_b: &mut FeedBuilder, _tag: &StartTag) -> Result<(), ReadError> {
    Err(ReadError::HtmlPage)
}

fn reject_unknown_root(_b: &mut FeedBuilder, _tag: &StartTag) -> Result<(), ReadError> {
    Err(ReadError::UnknownFeedType)
}

// ---------------------------------------------------------------------------
// Channel handlers
// ---------------------------------------------------------------------------

fn end_channel_title(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    b.channel.title = el.text.trim().to_string();
    Ok(())
}

fn end_channel_description(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    let html = normalize_description(el.text);
    b.channel.assign_description(&html);
    Ok(())
}

fn end_channel_encoded(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    // content:encoded is HTML by definition; no heuristic needed.
    b.channel.assign_description(el.text.trim());
    Ok(())
}

fn end_channel_subtitle(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    b.channel.subtitle = el.text.trim().to_string();
    Ok(())
}

fn end_channel_author(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    b.channel.author = el.text.trim().to_string();
    Ok(())
}

fn end_channel_keywords(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    add_keywords(&mut b.channel.keywords, el.text);
    Ok(())
}

fn end_new_feed_url(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    let url = el.text.trim();
    if !url.is_empty() {
        info!(old = %b.channel.url, new = %url, "feed moved via itunes:new-feed-url");
        b.channel.url = url.to_string();
    }
    Ok(())
}

fn end_channel_link(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    b.channel.web_link = el.text.trim().to_string();
    Ok(())
}

fn enter_itunes_image(b: &mut FeedBuilder, tag: &StartTag) -> Result<(), ReadError> {
    if let Some(href) = tag.attr("href") {
        b.channel.image_url = href.to_string();
        b.itunes_image_seen = true;
    }
    Ok(())
}

fn end_image_url(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    if !b.itunes_image_seen {
        b.channel.image_url = el.text.trim().to_string();
    }
    Ok(())
}

fn end_channel_body(b: &mut FeedBuilder, _el: &ClosedElement) -> Result<(), ReadError> {
    let body = std::mem::take(&mut b.xhtml).trim().to_string();
    if !body.is_empty() {
        b.channel.assign_body(&body);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Item handlers (RSS items and, via shared rules, Atom entries)
// ---------------------------------------------------------------------------

fn begin_item(b: &mut FeedBuilder, _tag: &StartTag) -> Result<(), ReadError> {
    b.begin_item();
    Ok(())
}

fn end_item(b: &mut FeedBuilder, _el: &ClosedElement) -> Result<(), ReadError> {
    b.finish_item();
    Ok(())
}

fn end_item_title(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    b.episode_mut().title = el.text.trim().to_string();
    Ok(())
}

fn end_item_subtitle(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    b.episode_mut().subtitle = el.text.trim().to_string();
    Ok(())
}

fn end_item_description(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    let html = normalize_description(el.text);
    b.episode_mut().assign_description(&html);
    Ok(())
}

fn end_item_encoded(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    b.episode_mut().assign_description(el.text.trim());
    Ok(())
}

fn enter_body(b: &mut FeedBuilder, _tag: &StartTag) -> Result<(), ReadError> {
    b.request_capture();
    Ok(())
}

fn end_item_body(b: &mut FeedBuilder, _el: &ClosedElement) -> Result<(), ReadError> {
    let body = std::mem::take(&mut b.xhtml).trim().to_string();
    if !body.is_empty() {
        b.episode_mut().assign_body(&body);
    }
    Ok(())
}

fn end_item_guid(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    b.episode_mut().guid = el.text.trim().to_string();
    Ok(())
}

fn end_item_pub_date(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    match parse_feed_date(el.text) {
        Some(date) => b.episode_mut().pub_date = Some(date),
        None => warn!(value = %el.text.trim(), "ignoring unparseable episode date"),
    }
    Ok(())
}

fn end_item_author(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    b.episode_mut().author = el.text.trim().to_string();
    Ok(())
}

fn end_item_keywords(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    let episode = b.episode_mut();
    add_keywords(&mut episode.keywords, el.text);
    Ok(())
}

fn end_item_sequence(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    match el.text.trim().parse::<u32>() {
        Ok(n) => b.episode_mut().sequence = n,
        Err(_) => warn!(value = %el.text.trim(), "ignoring unparseable itunes:episode number"),
    }
    Ok(())
}

fn enter_enclosure(b: &mut FeedBuilder, tag: &StartTag) -> Result<(), ReadError> {
    match tag.attr("url") {
        Some(url) => b.push_enclosure(url, tag.attr("length"), tag.attr("type")),
        None => warn!("ignoring enclosure without url attribute"),
    }
    Ok(())
}

fn end_item_link(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    b.episode_mut().link = el.text.trim().to_string();
    Ok(())
}

// ---------------------------------------------------------------------------
// Atom feed/entry handlers
// ---------------------------------------------------------------------------

fn enter_atom_text(b: &mut FeedBuilder, tag: &StartTag) -> Result<(), ReadError> {
    b.content_kind = ContentKind::from_type_attr(tag.attr("type"));
    if b.content_kind == ContentKind::Xhtml {
        b.request_capture();
    }
    Ok(())
}

fn end_feed_title(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    let title = b.take_construct_plain(el.text);
    b.channel.title = title;
    Ok(())
}

fn end_feed_subtitle(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    let subtitle = b.take_construct_plain(el.text);
    b.channel.subtitle = subtitle;
    Ok(())
}

fn enter_feed_link(b: &mut FeedBuilder, tag: &StartTag) -> Result<(), ReadError> {
    if let Some(href) = tag.attr("href") {
        if matches!(tag.attr("rel"), None | Some("alternate")) {
            b.channel.web_link = href.to_string();
        }
    }
    Ok(())
}

fn end_feed_logo(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    if !b.itunes_image_seen {
        b.channel.image_url = el.text.trim().to_string();
    }
    Ok(())
}

fn end_feed_icon(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    // Icon is a fallback only; logo and itunes:image rank above it.
    if b.channel.image_url.is_empty() {
        b.channel.image_url = el.text.trim().to_string();
    }
    Ok(())
}

fn begin_person(b: &mut FeedBuilder, _tag: &StartTag) -> Result<(), ReadError> {
    b.person = Person::default();
    Ok(())
}

fn end_feed_author(b: &mut FeedBuilder, _el: &ClosedElement) -> Result<(), ReadError> {
    b.channel.author = b.person.compose();
    Ok(())
}

fn end_entry_author(b: &mut FeedBuilder, _el: &ClosedElement) -> Result<(), ReadError> {
    let author = b.person.compose();
    b.episode_mut().author = author;
    Ok(())
}

fn end_person_name(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    b.person.name = el.text.trim().to_string();
    Ok(())
}

fn end_person_email(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    b.person.email = el.text.trim().to_string();
    Ok(())
}

fn end_person_uri(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    b.person.uri = el.text.trim().to_string();
    Ok(())
}

fn end_entry_title(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    let title = b.take_construct_plain(el.text);
    b.episode_mut().title = title;
    Ok(())
}

fn end_entry_summary(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    let html = b.take_construct(el.text);
    if !html.is_empty() {
        b.episode_mut().assign_description(&html);
    }
    Ok(())
}

fn end_entry_content(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    let html = b.take_construct(el.text);
    if !html.is_empty() {
        b.episode_mut().assign_description(&html);
    }
    Ok(())
}

fn end_entry_published(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    match parse_feed_date(el.text) {
        Some(date) => b.episode_mut().pub_date = Some(date),
        None => warn!(value = %el.text.trim(), "ignoring unparseable published date"),
    }
    Ok(())
}

fn end_entry_updated(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    // updated only fills in when published never arrived.
    if b.episode_mut().pub_date.is_none() {
        if let Some(date) = parse_feed_date(el.text) {
            b.episode_mut().pub_date = Some(date);
        }
    }
    Ok(())
}

fn enter_entry_link(b: &mut FeedBuilder, tag: &StartTag) -> Result<(), ReadError> {
    let Some(href) = tag.attr("href") else {
        return Ok(());
    };
    match tag.attr("rel") {
        Some("enclosure") => b.push_enclosure(href, tag.attr("length"), tag.attr("type")),
        None | Some("alternate") => b.episode_mut().link = href.to_string(),
        _ => {}
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// xhtml re-serialization
// ---------------------------------------------------------------------------

fn xhtml_open(b: &mut FeedBuilder, tag: &StartTag) -> Result<(), ReadError> {
    let _ = write!(b.xhtml, "<{}", tag.local_name());
    for (key, value) in &tag.attributes {
        if key.starts_with("xmlns") {
            continue;
        }
        let _ = write!(b.xhtml, " {}=\"{}\"", key, text::escape_html(value));
    }
    b.xhtml.push('>');
    Ok(())
}

fn xhtml_close(b: &mut FeedBuilder, el: &ClosedElement) -> Result<(), ReadError> {
    let local = match el.name.find(':') {
        Some(i) => &el.name[i + 1..],
        None => el.name,
    };
    let _ = write!(b.xhtml, "</{local}>");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_precedence() {
        // Exact entry.
        let r = lookup(Context::Channel, ElementKind::Title);
        assert!(r.exit.is_some());
        // No entry and no wildcard: default skip.
        let r = lookup(Context::Channel, ElementKind::Enclosure);
        assert_eq!(r.context, Context::Skip);
        assert!(r.enter.is_none() && r.exit.is_none());
        // Wildcard at root is the fatal catch-all.
        let r = lookup(Context::Root, ElementKind::Unknown);
        assert!(r.enter.is_some());
    }

    #[test]
    fn test_skip_context_is_closed() {
        // Nothing inside a skipped subtree resolves to a live handler.
        for kind in [
            ElementKind::Title,
            ElementKind::Description,
            ElementKind::Item,
            ElementKind::Unknown,
        ] {
            let r = lookup(Context::Skip, kind);
            assert_eq!(r.context, Context::Skip);
            assert!(r.enter.is_none() && r.exit.is_none());
        }
    }
}
