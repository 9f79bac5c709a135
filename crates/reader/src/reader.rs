// ABOUTME: Streaming feed reader: drives the tokenizer through the grammar
// ABOUTME: table and suspends whenever the transport has not delivered enough.

use tracing::{debug, warn};
use url::Url;

use crate::builder::FeedBuilder;
use crate::element::classify;
use crate::error::ReadError;
use crate::grammar::{self, ClosedElement, Context, Rule, DOCUMENT_RULE};
use crate::models::Channel;
use crate::text;
use crate::xml::{StartTag, TokenStep, XmlToken, XmlTokenizer};

/// Hook back into whatever is downloading the feed, so a fatal parse error
/// can cancel the transfer instead of letting the rest of the bytes arrive.
pub trait TransportControl {
    fn abort(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderStatus {
    /// Created, no bytes seen yet.
    Idle,
    Reading,
    /// The root element closed cleanly.
    Finished,
    Failed,
    /// Cancelled from outside via [`PodcastReader::abort`].
    Aborted,
}

/// What [`PodcastReader::continue_read`] accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStep {
    /// Ran out of buffered input mid-document; feed another chunk and call
    /// again.
    Suspended,
    Finished,
}

/// One open element. The stack of frames is the entire parse state, which is
/// why the reader can stop between any two tokens and pick up later.
struct Frame {
    name: String,
    rule: &'static Rule,
    /// Context pushed for this element's children. Usually `rule.context`,
    /// but forced to Xhtml when a handler requested subtree capture.
    context: Context,
    /// Namespace prefixes declared on this element ("" for the default).
    bindings: Vec<(String, String)>,
    /// Character data accumulated directly under this element.
    text: String,
}

impl Frame {
    fn document() -> Frame {
        Frame {
            name: String::new(),
            rule: &DOCUMENT_RULE,
            context: Context::Root,
            bindings: Vec::new(),
            text: String::new(),
        }
    }
}

/// Incremental podcast feed parser. Feed it bytes as they arrive, call
/// [`continue_read`](Self::continue_read) after each chunk, and take the
/// finished [`Channel`] once it reports [`ReadStep::Finished`].
pub struct PodcastReader {
    tokenizer: XmlTokenizer,
    stack: Vec<Frame>,
    builder: FeedBuilder,
    status: ReaderStatus,
    /// Where the bytes are currently being fetched from. Diverges from
    /// `channel.url` during a temporary redirect.
    url: String,
    transport: Option<Box<dyn TransportControl>>,
}

impl PodcastReader {
    /// Reader for a feed seen for the first time.
    pub fn new(url: &str) -> Self {
        Self::with_builder(url.to_string(), FeedBuilder::for_new_channel(url))
    }

    /// Reader that refreshes an already known channel. Existing episodes are
    /// kept and reconciled against what the feed now contains.
    pub fn update(channel: Channel) -> Self {
        let url = channel.url.clone();
        Self::with_builder(url, FeedBuilder::for_update(channel))
    }

    fn with_builder(url: String, builder: FeedBuilder) -> Self {
        PodcastReader {
            tokenizer: XmlTokenizer::new(),
            stack: vec![Frame::document()],
            builder,
            status: ReaderStatus::Idle,
            url,
            transport: None,
        }
    }

    pub fn set_transport(&mut self, transport: Box<dyn TransportControl>) {
        self.transport = Some(transport);
    }

    /// The URL the feed bytes are currently coming from.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn status(&self) -> ReaderStatus {
        self.status
    }

    /// Hands the reader the next chunk of the document.
    pub fn feed_chunk(&mut self, chunk: &[u8]) {
        if self.status == ReaderStatus::Idle {
            self.status = ReaderStatus::Reading;
        }
        self.tokenizer.feed(chunk);
    }

    /// Tells the reader the transport delivered everything.
    pub fn end_of_input(&mut self) {
        self.tokenizer.end_input();
    }

    /// The transport followed an HTTP redirect. A permanent redirect also
    /// rewrites the channel's stored URL so future refreshes skip the hop.
    pub fn redirected(&mut self, new_url: &str, permanent: bool) -> Result<(), ReadError> {
        Url::parse(new_url)
            .map_err(|e| ReadError::transport(format!("invalid redirect target {new_url}: {e}")))?;
        debug!(from = %self.url, to = %new_url, permanent, "feed redirected");
        self.url = new_url.to_string();
        if permanent {
            self.builder.channel.url = new_url.to_string();
        }
        Ok(())
    }

    /// Cancels the read from outside, e.g. when the user removes the feed.
    pub fn abort(&mut self) {
        if matches!(self.status, ReaderStatus::Idle | ReaderStatus::Reading) {
            self.status = ReaderStatus::Aborted;
            if let Some(t) = &mut self.transport {
                t.abort();
            }
        }
    }

    /// Consumes buffered tokens until the document finishes or the buffer
    /// ends mid-token. Safe to call any number of times; a reader in a
    /// terminal state reports Finished immediately.
    pub fn continue_read(&mut self) -> Result<ReadStep, ReadError> {
        match self.status {
            ReaderStatus::Finished | ReaderStatus::Failed | ReaderStatus::Aborted => {
                return Ok(ReadStep::Finished);
            }
            _ => {}
        }

        loop {
            match self.tokenizer.next_token() {
                Ok(TokenStep::NeedMoreInput) => return Ok(ReadStep::Suspended),
                Ok(TokenStep::EndOfDocument) => return self.finish_document(),
                Ok(TokenStep::Token(token)) => {
                    if let Err(e) = self.dispatch(token) {
                        return Err(self.fail(e));
                    }
                    if self.status == ReaderStatus::Finished {
                        return Ok(ReadStep::Finished);
                    }
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    /// The fully reconciled channel. Meaningful once the reader finished.
    pub fn into_channel(self) -> Channel {
        self.builder.channel
    }

    fn finish_document(&mut self) -> Result<ReadStep, ReadError> {
        if self.stack.len() > 1 {
            let open = self
                .stack
                .last()
                .map(|f| f.name.clone())
                .unwrap_or_default();
            return Err(self.fail(ReadError::malformed(format!(
                "document ended while <{open}> was still open"
            ))));
        }
        if self.status != ReaderStatus::Finished {
            // End of input before any root element appeared.
            return Err(self.fail(ReadError::malformed("document contains no root element")));
        }
        Ok(ReadStep::Finished)
    }

    fn fail(&mut self, err: ReadError) -> ReadError {
        self.status = ReaderStatus::Failed;
        if let Some(t) = &mut self.transport {
            t.abort();
        }
        warn!(url = %self.url, error = %err, "feed read failed");
        err
    }

    fn dispatch(&mut self, token: XmlToken) -> Result<(), ReadError> {
        match token {
            XmlToken::StartTag(tag) => self.open_element(tag),
            XmlToken::EndTag { name } => self.close_element(&name),
            XmlToken::Text { content, cdata } => {
                self.handle_text(&content, cdata);
                Ok(())
            }
        }
    }

    fn open_element(&mut self, tag: StartTag) -> Result<(), ReadError> {
        let bindings = namespace_bindings(&tag);
        let ns = self.resolve_namespace(tag.prefix(), &bindings);
        let kind = classify(&tag, ns.as_deref());

        let parent_context = match self.stack.last() {
            Some(frame) => frame.context,
            None => return Err(ReadError::Internal("element stack underflow".into())),
        };
        let rule = grammar::lookup(parent_context, kind);

        if let Some(enter) = rule.enter {
            enter(&mut self.builder, &tag)?;
        }

        // A handler that wants the raw subtree flips this element's children
        // into xhtml re-serialization mode.
        let context = if self.builder.take_capture_request() {
            Context::Xhtml
        } else {
            rule.context
        };

        let name = tag.name.clone();
        let self_closing = tag.self_closing;
        self.stack.push(Frame {
            name: tag.name,
            rule,
            context,
            bindings,
            text: String::new(),
        });

        if self_closing {
            self.close_element(&name)?;
        }
        Ok(())
    }

    fn close_element(&mut self, name: &str) -> Result<(), ReadError> {
        let frame = match self.stack.pop() {
            Some(frame) => frame,
            None => return Err(ReadError::Internal("element stack underflow".into())),
        };
        if frame.name != name {
            return Err(ReadError::malformed(format!(
                "mismatched closing tag </{name}>, expected </{}>",
                frame.name
            )));
        }

        if let Some(exit) = frame.rule.exit {
            exit(
                &mut self.builder,
                &ClosedElement {
                    name,
                    text: &frame.text,
                },
            )?;
        }

        if self.stack.len() == 1 {
            self.status = ReaderStatus::Finished;
        }
        Ok(())
    }

    fn handle_text(&mut self, content: &str, cdata: bool) {
        let context = match self.stack.last() {
            Some(frame) => frame.context,
            None => return,
        };
        // Captured xhtml keeps its whitespace verbatim; everywhere else,
        // whitespace-only text outside CDATA is formatting noise.
        if context == Context::Xhtml {
            self.builder.xhtml.push_str(&text::escape_html(content));
            return;
        }
        if !cdata && content.trim().is_empty() {
            return;
        }
        if let Some(frame) = self.stack.last_mut() {
            frame.text.push_str(content);
        }
    }

    /// Resolves a prefix against this element's own declarations first, then
    /// the enclosing frames innermost-out.
    fn resolve_namespace(&self, prefix: &str, own: &[(String, String)]) -> Option<String> {
        if let Some((_, uri)) = own.iter().find(|(p, _)| p == prefix) {
            return Some(uri.clone());
        }
        for frame in self.stack.iter().rev() {
            if let Some((_, uri)) = frame.bindings.iter().find(|(p, _)| p == prefix) {
                return Some(uri.clone());
            }
        }
        None
    }
}

fn namespace_bindings(tag: &StartTag) -> Vec<(String, String)> {
    let mut bindings = Vec::new();
    for (key, value) in &tag.attributes {
        if key == "xmlns" {
            bindings.push((String::new(), value.clone()));
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            bindings.push((prefix.to_string(), value.clone()));
        }
    }
    bindings
}

/// One-shot convenience for callers that already hold the whole document.
pub fn parse_feed(url: &str, bytes: &[u8]) -> Result<Channel, ReadError> {
    let mut reader = PodcastReader::new(url);
    reader.feed_chunk(bytes);
    reader.end_of_input();
    reader.continue_read()?;
    Ok(reader.into_channel())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_minimal_feed_finishes() {
        let doc = br#"<rss version="2.0"><channel><title>T</title></channel></rss>"#;
        let channel = parse_feed("http://example.com/feed", doc).unwrap();
        assert_eq!(channel.title, "T");
        assert_eq!(channel.url, "http://example.com/feed");
    }

    #[test]
    fn test_suspends_without_input() {
        let mut reader = PodcastReader::new("http://example.com/feed");
        reader.feed_chunk(br#"<rss version="2.0"><chan"#);
        assert_eq!(reader.continue_read().unwrap(), ReadStep::Suspended);
        assert_eq!(reader.status(), ReaderStatus::Reading);
        reader.feed_chunk(br#"nel><title>T</title></channel></rss>"#);
        reader.end_of_input();
        assert_eq!(reader.continue_read().unwrap(), ReadStep::Finished);
        assert_eq!(reader.into_channel().title, "T");
    }

    #[test]
    fn test_trailing_garbage_after_root_is_ignored() {
        let mut reader = PodcastReader::new("http://example.com/feed");
        reader.feed_chunk(br#"<rss version="2.0"><channel></channel></rss>junk"#);
        assert_eq!(reader.continue_read().unwrap(), ReadStep::Finished);
    }

    #[test]
    fn test_unclosed_element_is_malformed() {
        let mut reader = PodcastReader::new("http://example.com/feed");
        reader.feed_chunk(br#"<rss version="2.0"><channel>"#);
        reader.end_of_input();
        let err = reader.continue_read().unwrap_err();
        assert!(matches!(err, ReadError::Malformed(_)));
        assert_eq!(reader.status(), ReaderStatus::Failed);
    }

    #[test]
    fn test_mismatched_nesting_is_malformed() {
        let mut reader = PodcastReader::new("http://example.com/feed");
        reader.feed_chunk(br#"<rss version="2.0"><channel></item></channel></rss>"#);
        reader.end_of_input();
        let err = reader.continue_read().unwrap_err();
        assert!(matches!(err, ReadError::Malformed(_)));
    }

    #[test]
    fn test_empty_document_is_malformed() {
        let mut reader = PodcastReader::new("http://example.com/feed");
        reader.end_of_input();
        assert!(matches!(
            reader.continue_read(),
            Err(ReadError::Malformed(_))
        ));
    }

    #[test]
    fn test_redirect_rewrites_url_only_when_permanent() {
        let mut reader = PodcastReader::new("http://example.com/feed");
        reader
            .redirected("http://example.com/temp", false)
            .unwrap();
        assert_eq!(reader.url(), "http://example.com/temp");

        reader
            .redirected("http://example.com/forever", true)
            .unwrap();
        assert_eq!(reader.url(), "http://example.com/forever");

        reader.feed_chunk(br#"<rss version="2.0"><channel></channel></rss>"#);
        reader.continue_read().unwrap();
        assert_eq!(reader.into_channel().url, "http://example.com/forever");
    }

    #[test]
    fn test_redirect_rejects_garbage_url() {
        let mut reader = PodcastReader::new("http://example.com/feed");
        assert!(reader.redirected("not a url", false).is_err());
    }
}
