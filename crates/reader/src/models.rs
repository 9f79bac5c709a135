// ABOUTME: Value objects for parsed podcast data.
// ABOUTME: Channel owns its episodes; Enclosure is transient per-item state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A media attachment seen inside one `<item>`. Only the first enclosure of
/// an item survives into the episode; the rest are rendered into the
/// description as an HTML list when the item closes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enclosure {
    pub url: String,
    pub length: u64,
    pub mime_type: String,
}

/// One installment of a podcast ("item" in RSS, "entry" in Atom).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub title: String,
    pub subtitle: String,
    /// Second-longest descriptive text seen for this episode.
    pub summary: String,
    /// Longest descriptive text seen for this episode, as HTML.
    pub description: String,
    pub author: String,
    pub guid: String,
    /// Web page for the episode, distinct from the playable URL.
    pub link: String,
    pub pub_date: Option<DateTime<Utc>>,
    /// itunes:episode number when the feed carries one, otherwise 0.
    pub sequence: u32,
    /// Playable enclosure URL. Empty for enclosure-less blog entries.
    pub url: String,
    pub mime_type: String,
    pub file_size: u64,
    pub keywords: Vec<String>,
    /// Stored-copy flag; reconciliation preserves it across re-fetches.
    pub is_new: bool,
}

impl Episode {
    /// A freshly parsed episode, marked new until reconciliation says otherwise.
    pub fn new() -> Self {
        Episode {
            is_new: true,
            ..Default::default()
        }
    }
}

/// One subscribed feed with its episodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub title: String,
    pub subtitle: String,
    /// Second-longest descriptive text seen across the feed's redundant
    /// description-like elements. Never null; empty at the start of a pass.
    pub summary: String,
    /// Longest descriptive text, as HTML. Same lifecycle as `summary`.
    pub description: String,
    pub author: String,
    pub keywords: Vec<String>,
    /// Source URL the feed is fetched from. Rewritten by permanent redirects
    /// and by itunes:new-feed-url.
    pub url: String,
    pub web_link: String,
    pub image_url: String,
    pub subscribe_date: DateTime<Utc>,
    pub episodes: Vec<Episode>,
}

impl Default for Channel {
    fn default() -> Self {
        Channel {
            title: String::new(),
            subtitle: String::new(),
            summary: String::new(),
            description: String::new(),
            author: String::new(),
            keywords: Vec::new(),
            url: String::new(),
            web_link: String::new(),
            image_url: String::new(),
            subscribe_date: Utc::now(),
            episodes: Vec::new(),
        }
    }
}

impl Channel {
    /// Creates an empty channel subscribed now at the given source URL.
    pub fn new(url: &str) -> Self {
        Channel {
            url: url.to_string(),
            ..Default::default()
        }
    }
}
