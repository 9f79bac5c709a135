// ABOUTME: Incremental XML tokenizer fed by arbitrary-sized byte chunks.
// ABOUTME: Carves complete tokens from a growing buffer; quick-xml parses each tag.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use crate::error::ReadError;
use crate::text;

/// An opening tag with its raw qualified name and unescaped attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct StartTag {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub self_closing: bool,
}

impl StartTag {
    /// Looks up an attribute by exact name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// The element name without its namespace prefix.
    pub fn local_name(&self) -> &str {
        match self.name.find(':') {
            Some(i) => &self.name[i + 1..],
            None => &self.name,
        }
    }

    /// The namespace prefix, or "" for unprefixed names.
    pub fn prefix(&self) -> &str {
        match self.name.find(':') {
            Some(i) => &self.name[..i],
            None => "",
        }
    }
}

/// One complete token. Comments, processing instructions and doctypes are
/// consumed inside the tokenizer and never surface.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlToken {
    StartTag(StartTag),
    EndTag { name: String },
    /// Character data, already entity-unescaped unless it came from CDATA.
    Text { content: String, cdata: bool },
}

/// Result of asking for the next token.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenStep {
    Token(XmlToken),
    /// The buffer ends mid-token and the transport has more data coming.
    /// Feed more bytes and call again; no state is lost.
    NeedMoreInput,
    /// All input was consumed after end_input().
    EndOfDocument,
}

/// Splits a byte stream into complete XML tokens without ever holding more
/// than the unconsumed tail of the document. A token that is cut off at the
/// end of the buffer is reported as [`TokenStep::NeedMoreInput`] until the
/// missing bytes arrive, which is what makes the parse resumable.
#[derive(Debug, Default)]
pub struct XmlTokenizer {
    buf: Vec<u8>,
    pos: usize,
    input_ended: bool,
}

impl XmlTokenizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk delivered by the transport.
    pub fn feed(&mut self, chunk: &[u8]) {
        self.compact();
        self.buf.extend_from_slice(chunk);
    }

    /// Marks the input as complete. After this, a token cut off at the end
    /// of the buffer is a hard error instead of a suspension.
    pub fn end_input(&mut self) {
        self.input_ended = true;
    }

    /// Discards all buffered input.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pos = 0;
        self.input_ended = false;
    }

    fn compact(&mut self) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
    }

    /// Produces the next complete token.
    pub fn next_token(&mut self) -> Result<TokenStep, ReadError> {
        loop {
            if self.pos >= self.buf.len() {
                return if self.input_ended {
                    Ok(TokenStep::EndOfDocument)
                } else {
                    Ok(TokenStep::NeedMoreInput)
                };
            }

            if self.buf[self.pos] != b'<' {
                return self.take_text();
            }

            let rest = &self.buf[self.pos..];

            if let Some(step) = self.starts_with_special(rest)? {
                match step {
                    Special::Skip(len) => {
                        self.pos += len;
                        continue;
                    }
                    Special::Cdata { content, len } => {
                        self.pos += len;
                        return Ok(TokenStep::Token(XmlToken::Text {
                            content,
                            cdata: true,
                        }));
                    }
                    Special::Pending => return self.pending(),
                }
            }

            return match find_tag_end(rest) {
                Some(end) => {
                    let raw = rest[..end + 1].to_vec();
                    self.pos += end + 1;
                    if raw.starts_with(b"</") {
                        Ok(TokenStep::Token(XmlToken::EndTag {
                            name: parse_end_tag(&raw)?,
                        }))
                    } else {
                        Ok(TokenStep::Token(XmlToken::StartTag(parse_start_tag(
                            &raw,
                        )?)))
                    }
                }
                None => self.pending(),
            };
        }
    }

    /// Handles comments, CDATA, processing instructions and doctypes.
    /// Returns None when `rest` is an ordinary tag.
    fn starts_with_special(&self, rest: &[u8]) -> Result<Option<Special>, ReadError> {
        if rest.len() < 2 {
            return Ok(Some(Special::Pending));
        }
        if rest.starts_with(b"<!--") {
            return Ok(Some(match find_subslice(rest, b"-->") {
                Some(end) => Special::Skip(end + 3),
                None => Special::Pending,
            }));
        }
        if rest.starts_with(b"<![CDATA[") {
            return Ok(Some(match find_subslice(rest, b"]]>") {
                Some(end) => Special::Cdata {
                    content: String::from_utf8_lossy(&rest[9..end]).into_owned(),
                    len: end + 3,
                },
                None => Special::Pending,
            }));
        }
        if rest.starts_with(b"<?") {
            return Ok(Some(match find_subslice(rest, b"?>") {
                Some(end) => Special::Skip(end + 2),
                None => Special::Pending,
            }));
        }
        if rest.starts_with(b"<!") {
            // A partial "<!-" or "<![CD" prefix may still grow into a
            // comment or CDATA section.
            if rest.len() < 9 && (b"<!--".starts_with(rest) || b"<![CDATA[".starts_with(rest)) {
                return Ok(Some(Special::Pending));
            }
            return Ok(Some(match find_doctype_end(rest) {
                Some(len) => Special::Skip(len),
                None => Special::Pending,
            }));
        }
        Ok(None)
    }

    fn take_text(&mut self) -> Result<TokenStep, ReadError> {
        let rest = &self.buf[self.pos..];
        let upto = match rest.iter().position(|&b| b == b'<') {
            Some(lt) => lt,
            None if self.input_ended => rest.len(),
            None => return Ok(TokenStep::NeedMoreInput),
        };
        let raw = String::from_utf8_lossy(&rest[..upto]).into_owned();
        self.pos += upto;
        Ok(TokenStep::Token(XmlToken::Text {
            content: text::unescape(&raw),
            cdata: false,
        }))
    }

    fn pending(&self) -> Result<TokenStep, ReadError> {
        if self.input_ended {
            Err(ReadError::malformed(
                "the document ends in the middle of a token",
            ))
        } else {
            Ok(TokenStep::NeedMoreInput)
        }
    }
}

enum Special {
    Skip(usize),
    Cdata { content: String, len: usize },
    Pending,
}

/// Byte index of `needle` within `haystack`, if fully present.
fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|w| w == needle)
}

/// Index of the '>' closing a start or end tag, honoring quoted attribute
/// values (which may legally contain '>').
fn find_tag_end(rest: &[u8]) -> Option<usize> {
    let mut quote: Option<u8> = None;
    for (i, &b) in rest.iter().enumerate() {
        match (quote, b) {
            (Some(q), _) if b == q => quote = None,
            (Some(_), _) => {}
            (None, b'"') | (None, b'\'') => quote = Some(b),
            (None, b'>') => return Some(i),
            _ => {}
        }
    }
    None
}

/// Bytes consumed by a `<!DOCTYPE ...>` declaration, allowing for an
/// internal subset in square brackets.
fn find_doctype_end(rest: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    for (i, &b) in rest.iter().enumerate() {
        match b {
            b'[' => depth += 1,
            b']' => depth = depth.saturating_sub(1),
            b'>' if depth == 0 && i > 0 => return Some(i + 1),
            _ => {}
        }
    }
    None
}

/// Parses one complete `<name attr="v">` or `<name/>` slice via quick-xml.
fn parse_start_tag(raw: &[u8]) -> Result<StartTag, ReadError> {
    let mut reader = Reader::from_reader(raw);
    let mut buf = Vec::new();
    match reader.read_event_into(&mut buf) {
        Ok(Event::Start(e)) => build_start_tag(&e, false),
        Ok(Event::Empty(e)) => build_start_tag(&e, true),
        _ => Err(ReadError::Malformed(format!(
            "malformed tag: {}",
            String::from_utf8_lossy(raw)
        ))),
    }
}

fn build_start_tag(e: &BytesStart<'_>, self_closing: bool) -> Result<StartTag, ReadError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attr in e.attributes().flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = text::unescape(&String::from_utf8_lossy(&attr.value));
        attributes.push((key, value));
    }
    Ok(StartTag {
        name,
        attributes,
        self_closing,
    })
}

fn parse_end_tag(raw: &[u8]) -> Result<String, ReadError> {
    let inner = &raw[2..raw.len() - 1];
    let name = String::from_utf8_lossy(inner).trim().to_string();
    if name.is_empty() {
        return Err(ReadError::Malformed(format!(
            "malformed end tag: {}",
            String::from_utf8_lossy(raw)
        )));
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn drain(tok: &mut XmlTokenizer) -> Vec<XmlToken> {
        let mut out = Vec::new();
        loop {
            match tok.next_token().unwrap() {
                TokenStep::Token(t) => out.push(t),
                TokenStep::NeedMoreInput | TokenStep::EndOfDocument => return out,
            }
        }
    }

    #[test]
    fn test_basic_tokens() {
        let mut tok = XmlTokenizer::new();
        tok.feed(b"<a x=\"1\">hi</a>");
        tok.end_input();
        let tokens = drain(&mut tok);
        assert_eq!(
            tokens,
            vec![
                XmlToken::StartTag(StartTag {
                    name: "a".into(),
                    attributes: vec![("x".into(), "1".into())],
                    self_closing: false,
                }),
                XmlToken::Text {
                    content: "hi".into(),
                    cdata: false
                },
                XmlToken::EndTag { name: "a".into() },
            ]
        );
    }

    #[test]
    fn test_suspends_mid_tag() {
        let mut tok = XmlTokenizer::new();
        tok.feed(b"<item><ti");
        assert!(matches!(
            tok.next_token().unwrap(),
            TokenStep::Token(XmlToken::StartTag(_))
        ));
        assert_eq!(tok.next_token().unwrap(), TokenStep::NeedMoreInput);
        tok.feed(b"tle>x</title>");
        let tokens = drain(&mut tok);
        assert_eq!(
            tokens[0],
            XmlToken::StartTag(StartTag {
                name: "title".into(),
                attributes: vec![],
                self_closing: false,
            })
        );
    }

    #[test]
    fn test_text_waits_for_more_input() {
        // Trailing text cannot be emitted yet: more of it may follow.
        let mut tok = XmlTokenizer::new();
        tok.feed(b"<t>partial te");
        let _ = tok.next_token().unwrap();
        assert_eq!(tok.next_token().unwrap(), TokenStep::NeedMoreInput);
        tok.feed(b"xt</t>");
        let tokens = drain(&mut tok);
        assert_eq!(
            tokens[0],
            XmlToken::Text {
                content: "partial text".into(),
                cdata: false
            }
        );
    }

    #[test]
    fn test_cdata_is_raw() {
        let mut tok = XmlTokenizer::new();
        tok.feed(b"<d><![CDATA[<p>a &amp; b</p>]]></d>");
        tok.end_input();
        let tokens = drain(&mut tok);
        assert_eq!(
            tokens[1],
            XmlToken::Text {
                content: "<p>a &amp; b</p>".into(),
                cdata: true
            }
        );
    }

    #[test]
    fn test_entities_unescaped_in_text() {
        let mut tok = XmlTokenizer::new();
        tok.feed(b"<t>a &amp; b</t>");
        tok.end_input();
        let tokens = drain(&mut tok);
        assert_eq!(
            tokens[1],
            XmlToken::Text {
                content: "a & b".into(),
                cdata: false
            }
        );
    }

    #[test]
    fn test_comments_pi_doctype_skipped() {
        let mut tok = XmlTokenizer::new();
        tok.feed(b"<?xml version=\"1.0\"?><!DOCTYPE rss [<!ENTITY x \"y\">]><!-- note --><rss/>");
        tok.end_input();
        let tokens = drain(&mut tok);
        assert_eq!(
            tokens,
            vec![XmlToken::StartTag(StartTag {
                name: "rss".into(),
                attributes: vec![],
                self_closing: true,
            })]
        );
    }

    #[test]
    fn test_quoted_gt_in_attribute() {
        let mut tok = XmlTokenizer::new();
        tok.feed(b"<a title=\"1 > 0\"></a>");
        tok.end_input();
        let tokens = drain(&mut tok);
        match &tokens[0] {
            XmlToken::StartTag(tag) => assert_eq!(tag.attr("title"), Some("1 > 0")),
            other => panic!("unexpected token {other:?}"),
        }
    }

    #[test]
    fn test_truncated_document_is_error() {
        let mut tok = XmlTokenizer::new();
        tok.feed(b"<rss><chan");
        tok.end_input();
        assert!(matches!(
            tok.next_token().unwrap(),
            TokenStep::Token(XmlToken::StartTag(_))
        ));
        assert!(tok.next_token().is_err());
    }

    #[test]
    fn test_split_inside_cdata_marker() {
        let mut tok = XmlTokenizer::new();
        tok.feed(b"<d><![CD");
        let _ = tok.next_token().unwrap();
        assert_eq!(tok.next_token().unwrap(), TokenStep::NeedMoreInput);
        tok.feed(b"ATA[x]]></d>");
        let tokens = drain(&mut tok);
        assert_eq!(
            tokens[0],
            XmlToken::Text {
                content: "x".into(),
                cdata: true
            }
        );
    }
}
