// ABOUTME: In-progress channel/episode state mutated by grammar handlers.
// ABOUTME: Carries the description/summary length-contest rule and item finalization.

use std::fmt::Write as _;

use tracing::debug;

use crate::element::ContentKind;
use crate::models::{Channel, Enclosure, Episode};
use crate::reconcile::{self, Commit};
use crate::text;

/// The rule deciding which of a feed's redundant description-like elements
/// win. The longest text ever seen becomes `description`, the second-longest
/// becomes `summary`, shorter duplicates are dropped. Ranking is by length
/// only, never by arrival order.
pub trait DescribedText {
    fn description_mut(&mut self) -> &mut String;
    fn summary_mut(&mut self) -> &mut String;

    fn assign_description(&mut self, candidate: &str) {
        if self.description_mut().len() < candidate.len() {
            let demoted = std::mem::replace(self.description_mut(), candidate.to_string());
            self.assign_summary(&demoted);
        } else {
            self.assign_summary(candidate);
        }
    }

    fn assign_summary(&mut self, candidate: &str) {
        if self.summary_mut().len() < candidate.len() {
            *self.summary_mut() = candidate.to_string();
        }
    }

    /// An xhtml `<body>` claims `description` outright, regardless of
    /// length; the incumbent is demoted into the summary contest. This
    /// asymmetry with `assign_description` is intentional.
    fn assign_body(&mut self, body: &str) {
        let demoted = std::mem::replace(self.description_mut(), body.to_string());
        self.assign_summary(&demoted);
    }
}

impl DescribedText for Channel {
    fn description_mut(&mut self) -> &mut String {
        &mut self.description
    }
    fn summary_mut(&mut self) -> &mut String {
        &mut self.summary
    }
}

impl DescribedText for Episode {
    fn description_mut(&mut self) -> &mut String {
        &mut self.description
    }
    fn summary_mut(&mut self) -> &mut String {
        &mut self.summary
    }
}

/// Splits comma-separated keywords into an ordered-unique list.
pub fn add_keywords(list: &mut Vec<String>, raw: &str) {
    for word in raw.split(',') {
        let word = word.trim();
        if word.is_empty() {
            continue;
        }
        if !list.iter().any(|k| k == word) {
            list.push(word.to_string());
        }
    }
}

/// Normalizes a raw description blob: content that already looks like HTML
/// passes through, plain text is escaped and linkified.
pub fn normalize_description(raw: &str) -> String {
    let trimmed = raw.trim();
    if text::might_be_html(trimmed) {
        trimmed.to_string()
    } else {
        text::text_to_html(trimmed)
    }
}

/// An Atom person construct under assembly.
#[derive(Debug, Default, Clone)]
pub struct Person {
    pub name: String,
    pub email: String,
    pub uri: String,
}

impl Person {
    /// Renders "Name <email>", falling back to whichever part exists.
    pub fn compose(&self) -> String {
        match (self.name.is_empty(), self.email.is_empty()) {
            (false, false) => format!("{} <{}>", self.name, self.email),
            (false, true) => self.name.clone(),
            (true, false) => self.email.clone(),
            (true, true) => self.uri.clone(),
        }
    }
}

/// All mutable state the grammar handlers operate on during one parse pass.
pub struct FeedBuilder {
    pub channel: Channel,
    episode: Option<Episode>,
    pub enclosures: Vec<Enclosure>,
    pub person: Person,
    /// Type of the Atom text construct currently open.
    pub content_kind: ContentKind,
    /// Set by an enter handler to route the element's subtree into the
    /// xhtml capture buffer; consumed by the driver when pushing the frame.
    capture_request: bool,
    /// Re-serialized markup captured from an xhtml subtree.
    pub xhtml: String,
    /// True once itunes:image set the channel image; plain <image>/<logo>
    /// no longer override it then.
    pub itunes_image_seen: bool,
}

impl FeedBuilder {
    /// Starts a pass for a never-seen feed.
    pub fn for_new_channel(url: &str) -> Self {
        Self::with_channel(Channel::new(url))
    }

    /// Starts a refresh pass over an already-subscribed channel. The
    /// description/summary contest restarts from empty; existing episodes
    /// stay for the reconciler to match against.
    pub fn for_update(mut channel: Channel) -> Self {
        channel.description.clear();
        channel.summary.clear();
        channel.keywords.clear();
        Self::with_channel(channel)
    }

    fn with_channel(channel: Channel) -> Self {
        FeedBuilder {
            channel,
            episode: None,
            enclosures: Vec::new(),
            person: Person::default(),
            content_kind: ContentKind::Text,
            capture_request: false,
            xhtml: String::new(),
            itunes_image_seen: false,
        }
    }

    /// Opens a fresh item/entry.
    pub fn begin_item(&mut self) {
        self.episode = Some(Episode::new());
        self.enclosures.clear();
    }

    /// The episode under construction. Handlers only run inside an item
    /// context, but an absent episode is tolerated rather than unwrapped.
    pub fn episode_mut(&mut self) -> &mut Episode {
        self.episode.get_or_insert_with(Episode::new)
    }

    /// Asks the driver to capture this element's subtree as xhtml.
    pub fn request_capture(&mut self) {
        self.capture_request = true;
        self.xhtml.clear();
    }

    /// Consumed by the driver right after an enter handler ran.
    pub fn take_capture_request(&mut self) -> bool {
        std::mem::take(&mut self.capture_request)
    }

    /// Resolves the text of a finished Atom text construct according to its
    /// declared type.
    pub fn take_construct(&mut self, accumulated: &str) -> String {
        match self.content_kind {
            ContentKind::Xhtml => std::mem::take(&mut self.xhtml).trim().to_string(),
            ContentKind::Html => accumulated.trim().to_string(),
            ContentKind::Text => text::text_to_html(accumulated.trim()),
        }
    }

    /// Like `take_construct` but for fields that stay plain (titles).
    pub fn take_construct_plain(&mut self, accumulated: &str) -> String {
        match self.content_kind {
            ContentKind::Xhtml => std::mem::take(&mut self.xhtml).trim().to_string(),
            ContentKind::Html | ContentKind::Text => accumulated.trim().to_string(),
        }
    }

    /// Collects one enclosure for the open item.
    pub fn push_enclosure(&mut self, url: &str, length: Option<&str>, mime: Option<&str>) {
        let url = url.trim();
        if url.is_empty() {
            return;
        }
        self.enclosures.push(Enclosure {
            url: url.to_string(),
            length: length.and_then(|v| v.trim().parse().ok()).unwrap_or(0),
            mime_type: mime.unwrap_or("").to_string(),
        });
    }

    /// Closes the open item: picks the primary enclosure, renders the rest
    /// into the description, and reconciles against the channel's episodes.
    /// An item without enclosures still commits as a metadata-only entry.
    pub fn finish_item(&mut self) {
        let Some(mut episode) = self.episode.take() else {
            return;
        };

        if !self.enclosures.is_empty() {
            let primary = self.enclosures.remove(0);
            episode.url = primary.url;
            episode.mime_type = primary.mime_type;
            episode.file_size = primary.length;

            if !self.enclosures.is_empty() {
                let mut list = String::from("\n<p>Alternative Enclosures:</p>\n<ul>\n");
                for enc in self.enclosures.drain(..) {
                    let href = text::escape_html(&enc.url);
                    let label = if enc.mime_type.is_empty() {
                        href.clone()
                    } else {
                        format!("{} ({})", href, text::escape_html(&enc.mime_type))
                    };
                    let _ = writeln!(list, "<li><a href=\"{href}\">{label}</a></li>");
                }
                list.push_str("</ul>");
                episode.description.push_str(&list);
            }
        }
        self.enclosures.clear();

        match reconcile::commit(&mut self.channel, episode) {
            Commit::Added => debug!(channel = %self.channel.title, "episode added"),
            Commit::Merged(idx) => {
                debug!(channel = %self.channel.title, index = idx, "episode merged")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_longest_text_wins_description() {
        let mut ch = Channel::default();
        ch.assign_description("short");
        ch.assign_description("a much longer description here");
        ch.assign_description("medium text");
        assert_eq!(ch.description, "a much longer description here");
        assert_eq!(ch.summary, "medium text");
    }

    #[test]
    fn test_order_does_not_matter() {
        let inputs = ["medium text", "a much longer description here", "short"];
        let mut ch = Channel::default();
        for i in inputs {
            ch.assign_description(i);
        }
        assert_eq!(ch.description, "a much longer description here");
        assert_eq!(ch.summary, "medium text");
    }

    #[test]
    fn test_equal_length_keeps_incumbent() {
        let mut ch = Channel::default();
        ch.assign_description("first");
        ch.assign_description("other");
        assert_eq!(ch.description, "first");
        assert_eq!(ch.summary, "other");
    }

    #[test]
    fn test_body_claims_description_even_when_shorter() {
        let mut ep = Episode::new();
        ep.assign_description("a rather long plain description");
        ep.assign_body("tiny");
        assert_eq!(ep.description, "tiny");
        assert_eq!(ep.summary, "a rather long plain description");
    }

    #[test]
    fn test_add_keywords_ordered_unique() {
        let mut list = Vec::new();
        add_keywords(&mut list, "rust, audio , rust,,podcast");
        add_keywords(&mut list, "audio,news");
        assert_eq!(list, vec!["rust", "audio", "podcast", "news"]);
    }

    #[test]
    fn test_finish_item_selects_first_enclosure() {
        let mut b = FeedBuilder::for_new_channel("http://feed/");
        b.begin_item();
        b.episode_mut().title = "ep".into();
        b.push_enclosure("http://cdn/a.mp3", Some("100"), Some("audio/mpeg"));
        b.push_enclosure("http://cdn/b.ogg", Some("200"), Some("audio/ogg"));
        b.push_enclosure("http://cdn/c.mp3", None, None);
        b.finish_item();

        let ep = &b.channel.episodes[0];
        assert_eq!(ep.url, "http://cdn/a.mp3");
        assert_eq!(ep.file_size, 100);
        assert_eq!(ep.mime_type, "audio/mpeg");
        assert!(ep.description.contains("Alternative Enclosures:"));
        assert!(ep.description.contains("http://cdn/b.ogg"));
        assert!(ep.description.contains("http://cdn/c.mp3"));
    }

    #[test]
    fn test_finish_item_without_enclosures_is_metadata_only() {
        let mut b = FeedBuilder::for_new_channel("http://feed/");
        b.begin_item();
        b.episode_mut().title = "blog post".into();
        b.finish_item();

        let ep = &b.channel.episodes[0];
        assert_eq!(ep.url, "");
        assert_eq!(ep.title, "blog post");
    }

    #[test]
    fn test_for_update_resets_text_contest() {
        let mut ch = Channel::new("http://feed/");
        ch.description = "old description".into();
        ch.summary = "old summary".into();
        ch.episodes.push(Episode::new());
        let b = FeedBuilder::for_update(ch);
        assert_eq!(b.channel.description, "");
        assert_eq!(b.channel.summary, "");
        assert_eq!(b.channel.episodes.len(), 1);
    }

    #[test]
    fn test_person_compose() {
        let p = Person {
            name: "Jo".into(),
            email: "jo@x.org".into(),
            uri: String::new(),
        };
        assert_eq!(p.compose(), "Jo <jo@x.org>");
        let only_uri = Person {
            uri: "http://jo.example".into(),
            ..Default::default()
        };
        assert_eq!(only_uri.compose(), "http://jo.example");
    }
}
