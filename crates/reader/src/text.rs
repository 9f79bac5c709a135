// ABOUTME: Text normalization utilities for feed content.
// ABOUTME: Entity unescaping, plain-text-to-HTML conversion, and HTML detection.

use once_cell::sync::Lazy;
use regex::Regex;

/// Matches bare URLs and email addresses in plain text. The scheme list is a
/// whitelist; javascript: and exec: style schemes never match and therefore
/// never become clickable.
static LINKIFY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?x)
        (?P<url>\b(?:https?|ftp)://[^\s<>'\x22]+)
        |
        (?P<mail>\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b)
        ",
    )
    .unwrap()
});

/// Signals that a raw description blob is probably already HTML: common
/// inline tags, entities, or any closing tag.
static HTML_HINT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?ix)
        <\s*(?:p|br|hr|a|b|i|em|strong|ul|ol|li|div|span|img|table|h[1-6]|blockquote|pre|code)\b
        |
        &(?:\#[0-9]+|\#x[0-9a-f]+|[a-z][a-z0-9]*);
        |
        </[a-z][a-z0-9]*\s*>
        ",
    )
    .unwrap()
});

/// Decodes numeric (`&#NN;`, `&#xHH;`) and the five predefined named XML
/// entities. Malformed or unknown sequences are passed through unchanged.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match decode_entity(tail) {
            Some((decoded, used)) => {
                out.push(decoded);
                rest = &tail[used..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decodes one entity at the start of `s` (which begins with '&').
/// Returns the character and the byte length consumed, or None to fail soft.
fn decode_entity(s: &str) -> Option<(char, usize)> {
    let semi = s.find(';')?;
    if !(2..=11).contains(&semi) {
        return None;
    }
    let body = &s[1..semi];
    let ch = if let Some(num) = body.strip_prefix('#') {
        let code = if let Some(hex) = num.strip_prefix(['x', 'X']) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            num.parse::<u32>().ok()?
        };
        char::from_u32(code)?
    } else {
        match body {
            "lt" => '<',
            "gt" => '>',
            "amp" => '&',
            "apos" => '\'',
            "quot" => '"',
            _ => return None,
        }
    };
    Some((ch, semi + 1))
}

/// Escapes the HTML-significant characters of `text`.
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Converts plain text to HTML: escapes markup characters, turns bare URLs
/// and email addresses into links, and turns newlines into `<br/>`.
///
/// Linkification runs on the raw text before escaping so entities produced by
/// the escape step cannot be mistaken for parts of a URL.
pub fn text_to_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 16);
    let mut last = 0;
    for caps in LINKIFY_RE.captures_iter(text) {
        let m = caps.get(0).expect("regex always has group 0");
        out.push_str(&escape_segment(&text[last..m.start()]));
        let target = m.as_str();
        let escaped = escape_html(target);
        if caps.name("mail").is_some() {
            out.push_str(&format!("<a href=\"mailto:{escaped}\">{escaped}</a>"));
        } else {
            out.push_str(&format!("<a href=\"{escaped}\">{escaped}</a>"));
        }
        last = m.end();
    }
    out.push_str(&escape_segment(&text[last..]));
    out
}

fn escape_segment(text: &str) -> String {
    escape_html(text).replace('\n', "<br/>\n")
}

/// Heuristic: does this raw description text already look like HTML?
/// Used to decide between passing content through untouched and running it
/// through [`text_to_html`].
pub fn might_be_html(text: &str) -> bool {
    HTML_HINT_RE.is_match(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_unescape_named() {
        assert_eq!(unescape("&lt;b&gt; &amp; &quot;x&quot;"), "<b> & \"x\"");
        assert_eq!(unescape("&apos;"), "'");
    }

    #[test]
    fn test_unescape_numeric() {
        assert_eq!(unescape("&#38;"), "&");
        assert_eq!(unescape("&#x26;"), "&");
        assert_eq!(unescape("&#xA9;&#169;"), "©©");
    }

    #[test]
    fn test_unescape_malformed_passes_through() {
        assert_eq!(unescape("&unknown;"), "&unknown;");
        assert_eq!(unescape("no semicolon &amp"), "no semicolon &amp");
        assert_eq!(unescape("&#xZZ;"), "&#xZZ;");
        assert_eq!(unescape("a && b"), "a && b");
    }

    #[test]
    fn test_unescape_mixed() {
        assert_eq!(unescape("Tom &amp; &unknown; Jerry"), "Tom & &unknown; Jerry");
    }

    #[test]
    fn test_text_to_html_escapes() {
        assert_eq!(text_to_html("a < b & c"), "a &lt; b &amp; c");
    }

    #[test]
    fn test_text_to_html_newlines() {
        assert_eq!(text_to_html("one\ntwo"), "one<br/>\ntwo");
    }

    #[test]
    fn test_text_to_html_linkifies_urls() {
        assert_eq!(
            text_to_html("see https://example.com/a?x=1&y=2 now"),
            "see <a href=\"https://example.com/a?x=1&amp;y=2\">https://example.com/a?x=1&amp;y=2</a> now"
        );
    }

    #[test]
    fn test_text_to_html_linkifies_email() {
        assert_eq!(
            text_to_html("mail me@example.org please"),
            "mail <a href=\"mailto:me@example.org\">me@example.org</a> please"
        );
    }

    #[test]
    fn test_text_to_html_never_links_javascript() {
        let out = text_to_html("javascript:alert('x')");
        assert!(!out.contains("<a "), "javascript: must not become a link: {out}");
        assert!(out.contains("javascript:alert(&#39;x&#39;)"));
    }

    #[test]
    fn test_might_be_html() {
        assert!(might_be_html("<p>hello</p>"));
        assert!(might_be_html("text with &amp; entity"));
        assert!(might_be_html("odd <custom>tag</custom> pair"));
        assert!(!might_be_html("just plain text, 2 < 3 maybe"));
    }
}
