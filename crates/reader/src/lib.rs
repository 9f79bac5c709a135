// ABOUTME: Streaming podcast feed reader for RSS 2.0, RSS 1.0 and Atom.
// ABOUTME: Parses incrementally delivered bytes and reconciles episodes across refreshes.

pub mod builder;
pub mod element;
pub mod error;
pub mod grammar;
pub mod models;
pub mod reconcile;
pub mod reader;
pub mod text;
pub mod time_parse;
pub mod xml;

pub use error::ReadError;
pub use models::{Channel, Enclosure, Episode};
pub use reader::{parse_feed, PodcastReader, ReadStep, ReaderStatus, TransportControl};
pub use text::{escape_html, might_be_html, text_to_html, unescape};
pub use time_parse::parse_feed_date;
pub use xml::{TokenStep, XmlToken, XmlTokenizer};
