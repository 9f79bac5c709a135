// ABOUTME: Episode reconciliation: decides new-episode vs re-fetch-of-known.
// ABOUTME: Similarity scoring with fixed weights 1/3/3 and threshold 3.

use crate::models::{Channel, Episode};

/// Minimum similarity score for two episodes to count as the same one.
///
/// With the weights below, a guid match alone or a URL match alone is
/// sufficient, while a title match alone (score 1) deliberately is not;
/// titles must combine with something else. These exact numbers are load
/// bearing for de-duplication behavior; do not tune them casually.
pub const MATCH_THRESHOLD: u32 = 3;

/// Scores how likely `existing` and `parsed` are the same episode.
/// Empty fields never contribute.
pub fn match_score(existing: &Episode, parsed: &Episode) -> u32 {
    let mut score = 0;
    if !existing.title.is_empty() && existing.title == parsed.title {
        score += 1;
    }
    if !existing.url.is_empty() && existing.url == parsed.url {
        score += 3;
    }
    if !existing.guid.is_empty() && existing.guid == parsed.guid {
        score += 3;
    }
    score
}

/// Outcome of committing a parsed episode into a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Commit {
    /// No existing episode matched; the parsed one was appended.
    Added,
    /// Merged into the existing episode at this index.
    Merged(usize),
}

/// Commits a freshly parsed episode: the first existing episode, in the
/// channel's natural order, that crosses [`MATCH_THRESHOLD`] absorbs it;
/// otherwise it is appended as new.
pub fn commit(channel: &mut Channel, parsed: Episode) -> Commit {
    let found = channel
        .episodes
        .iter()
        .position(|e| match_score(e, &parsed) >= MATCH_THRESHOLD);
    match found {
        Some(idx) => {
            merge(&mut channel.episodes[idx], parsed);
            Commit::Merged(idx)
        }
        None => {
            channel.episodes.push(parsed);
            Commit::Added
        }
    }
}

/// Folds newly parsed metadata into the stored episode. Fields only the
/// stored copy tracks (`is_new`) are preserved, as is a sequence number the
/// feed stopped sending.
fn merge(existing: &mut Episode, parsed: Episode) {
    fn take(dst: &mut String, src: String) {
        if !src.is_empty() {
            *dst = src;
        }
    }
    take(&mut existing.title, parsed.title);
    take(&mut existing.subtitle, parsed.subtitle);
    take(&mut existing.summary, parsed.summary);
    take(&mut existing.description, parsed.description);
    take(&mut existing.author, parsed.author);
    take(&mut existing.guid, parsed.guid);
    take(&mut existing.link, parsed.link);
    take(&mut existing.url, parsed.url);
    take(&mut existing.mime_type, parsed.mime_type);
    if parsed.file_size != 0 {
        existing.file_size = parsed.file_size;
    }
    if parsed.pub_date.is_some() {
        existing.pub_date = parsed.pub_date;
    }
    if parsed.sequence != 0 {
        existing.sequence = parsed.sequence;
    }
    if !parsed.keywords.is_empty() {
        existing.keywords = parsed.keywords;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(title: &str, url: &str, guid: &str) -> Episode {
        Episode {
            title: title.into(),
            url: url.into(),
            guid: guid.into(),
            ..Episode::new()
        }
    }

    #[test]
    fn test_guid_match_alone_suffices() {
        let a = episode("old title", "http://a/1.mp3", "guid-1");
        let b = episode("new title", "http://b/2.mp3", "guid-1");
        assert_eq!(match_score(&a, &b), 3);
    }

    #[test]
    fn test_url_match_alone_suffices() {
        let a = episode("x", "http://cdn/ep.mp3", "g1");
        let b = episode("y", "http://cdn/ep.mp3", "g2");
        assert_eq!(match_score(&a, &b), 3);
    }

    #[test]
    fn test_title_match_alone_is_not_enough() {
        let mut channel = Channel::default();
        channel.episodes.push(episode("same title", "http://a", "g1"));
        let outcome = commit(&mut channel, episode("same title", "http://b", "g2"));
        assert_eq!(outcome, Commit::Added);
        assert_eq!(channel.episodes.len(), 2);
    }

    #[test]
    fn test_empty_fields_do_not_match() {
        let a = episode("", "", "");
        let b = episode("", "", "");
        assert_eq!(match_score(&a, &b), 0);
    }

    #[test]
    fn test_merge_preserves_is_new() {
        let mut channel = Channel::default();
        let mut stored = episode("ep", "http://cdn/ep.mp3", "g1");
        stored.is_new = false;
        channel.episodes.push(stored);

        let mut refetched = episode("ep (updated)", "http://cdn/ep.mp3", "g1");
        refetched.description = "richer".into();
        let outcome = commit(&mut channel, refetched);

        assert_eq!(outcome, Commit::Merged(0));
        assert_eq!(channel.episodes.len(), 1);
        let ep = &channel.episodes[0];
        assert!(!ep.is_new, "merge must not resurrect the new flag");
        assert_eq!(ep.title, "ep (updated)");
        assert_eq!(ep.description, "richer");
    }

    #[test]
    fn test_first_match_wins() {
        let mut channel = Channel::default();
        channel.episodes.push(episode("first", "", "shared-guid"));
        channel.episodes.push(episode("second", "", "shared-guid"));
        let outcome = commit(&mut channel, episode("update", "", "shared-guid"));
        assert_eq!(outcome, Commit::Merged(0));
    }
}
