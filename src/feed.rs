use chrono::{DateTime, Utc};
use feed_rs::parser;

use crate::error::Error;

/// One feed item, with every optional field resolved to a concrete value.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Feed-provided id/guid, falling back to the raw link
    pub id: String,
    pub link: Option<String>,
    pub title: String,
    pub author: String,
    pub published: DateTime<Utc>,
}

pub const DEFAULT_TITLE: &str = "No Title";
pub const DEFAULT_AUTHOR: &str = "Unknown";

impl Entry {
    fn resolve(
        id: Option<String>,
        link: Option<String>,
        title: Option<String>,
        author: Option<String>,
        published: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        let link = link.map(|l| l.trim().to_string()).filter(|l| !l.is_empty());
        let id = id
            .map(|i| i.trim().to_string())
            .filter(|i| !i.is_empty())
            .or_else(|| link.clone())
            .unwrap_or_default();

        Self {
            id,
            link,
            title: title
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            author: author
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty())
                .unwrap_or_else(|| DEFAULT_AUTHOR.to_string()),
            published: published.unwrap_or(now),
        }
    }

    fn from_feed_rs(entry: feed_rs::model::Entry, now: DateTime<Utc>) -> Self {
        let link = entry
            .links
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| entry.links.first())
            .map(|l| l.href.clone());

        Self::resolve(
            Some(entry.id),
            link,
            entry.title.map(|t| t.content),
            entry.authors.into_iter().next().map(|p| p.name),
            entry.published.or(entry.updated),
            now,
        )
    }
}

/// Result of parsing one fetched document.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    /// Entries in document order (usually newest first)
    pub entries: Vec<Entry>,
    /// Set when the document was malformed; `entries` then holds what could be recovered
    pub malformed: Option<Error>,
}

impl ParsedFeed {
    /// Entries oldest first: document order reversed, then stably sorted by
    /// published time.
    pub fn chronological(self) -> Vec<Entry> {
        let mut entries = self.entries;
        entries.reverse();
        entries.sort_by_key(|e| e.published);
        entries
    }
}

/// Parse a fetched RSS/Atom/JSON feed body.
///
/// Never fails: a document rejected by the parser is scanned for item blocks
/// and the failure is reported through [`ParsedFeed::malformed`].
pub fn parse_feed(bytes: &[u8]) -> ParsedFeed {
    let now = Utc::now();

    // An empty generated id lets `Entry::resolve` fall back to the link
    let parser = parser::Builder::new()
        .id_generator(|_, _, _| String::new())
        .build();

    match parser.parse(bytes) {
        Ok(feed) => ParsedFeed {
            entries: feed
                .entries
                .into_iter()
                .map(|e| Entry::from_feed_rs(e, now))
                .collect(),
            malformed: None,
        },
        Err(e) => ParsedFeed {
            entries: recover_entries(bytes, now),
            malformed: Some(Error::FeedParse(e.to_string())),
        },
    }
}

/// Best-effort scan of `<item>` / `<entry>` blocks in a document the parser rejected.
pub fn recover_entries(bytes: &[u8], now: DateTime<Utc>) -> Vec<Entry> {
    let xml = String::from_utf8_lossy(bytes);

    let mut entries = Vec::new();
    for tag in ["item", "entry"] {
        for block in split_blocks(&xml, tag) {
            let link = extract_xml_element(block, "link")
                .filter(|l| !l.is_empty())
                .or_else(|| extract_attribute(block, "link", "href"));

            let id = extract_xml_element(block, "guid").or_else(|| extract_xml_element(block, "id"));

            let author = extract_xml_element(block, "author")
                .map(|a| extract_xml_element(&a, "name").unwrap_or(a))
                .or_else(|| extract_xml_element(block, "dc:creator"));

            let published = extract_xml_element(block, "pubDate")
                .and_then(|d| DateTime::parse_from_rfc2822(&d).ok())
                .or_else(|| {
                    extract_xml_element(block, "published")
                        .or_else(|| extract_xml_element(block, "updated"))
                        .and_then(|d| DateTime::parse_from_rfc3339(&d).ok())
                })
                .map(|d| d.with_timezone(&Utc));

            entries.push(Entry::resolve(
                id,
                link,
                extract_xml_element(block, "title"),
                author,
                published,
                now,
            ));
        }
    }
    entries
}

/// Bodies of every `<tag>` / `<tag attr=..>` element; an unterminated last
/// block runs to the end of the text.
fn split_blocks<'a>(xml: &'a str, tag: &str) -> Vec<&'a str> {
    let open = format!("<{}", tag);
    let close = format!("</{}>", tag);

    let mut blocks = Vec::new();
    let mut rest = xml;
    while let Some(start) = find_open_tag(rest, &open) {
        let body_start = match rest[start..].find('>') {
            Some(i) => start + i + 1,
            None => break,
        };
        let body = &rest[body_start..];
        let end = body.find(&close).unwrap_or(body.len());
        blocks.push(&body[..end]);
        rest = &body[end..];
    }
    blocks
}

/// Position of `open` (`<tag`) where the tag name ends right after it.
fn find_open_tag(xml: &str, open: &str) -> Option<usize> {
    let mut offset = 0;
    while let Some(i) = xml[offset..].find(open) {
        let at = offset + i;
        let next = xml[at + open.len()..].chars().next();
        if matches!(next, Some('>') | Some('/')) || next.map_or(false, char::is_whitespace) {
            return Some(at);
        }
        offset = at + open.len();
    }
    None
}

/// Text content of the first `<tag>` element, CDATA unwrapped and basic entities decoded.
pub fn extract_xml_element(xml: &str, tag: &str) -> Option<String> {
    let open = format!("<{}", tag);
    let end_tag = format!("</{}>", tag);

    let at = find_open_tag(xml, &open)?;
    let head_end = at + xml[at..].find('>')?;
    if xml[..head_end].ends_with('/') {
        return None;
    }
    let start = head_end + 1;
    let end = xml[start..].find(&end_tag)? + start;

    let text = xml[start..end].trim();
    let text = text
        .strip_prefix("<![CDATA[")
        .and_then(|t| t.strip_suffix("]]>"))
        .unwrap_or(text);

    Some(decode_entities(text.trim()))
}

fn extract_attribute(xml: &str, tag: &str, attr: &str) -> Option<String> {
    let at = find_open_tag(xml, &format!("<{}", tag))?;
    let head = &xml[at..at + xml[at..].find('>')?];
    let needle = format!("{}=", attr);
    let value_start = head.find(&needle)? + needle.len();
    let quote = head[value_start..].chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let value = &head[value_start + 1..];
    let value_end = value.find(quote)?;
    Some(decode_entities(&value[..value_end]))
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
        <rss version="2.0">
            <channel>
                <title>Tech News</title>
                <link>https://technews.example.com</link>
                <description>Latest tech news</description>
                <item>
                    <title>Newer</title>
                    <link>https://technews.example.com/article/2?utm_source=rss</link>
                    <guid>tag:technews,2</guid>
                    <author>jane@example.com (Jane)</author>
                    <pubDate>Mon, 09 Dec 2024 12:00:00 GMT</pubDate>
                </item>
                <item>
                    <title>Older</title>
                    <link>https://technews.example.com/article/1</link>
                    <guid>tag:technews,1</guid>
                    <pubDate>Mon, 09 Dec 2024 10:00:00 GMT</pubDate>
                </item>
            </channel>
        </rss>
    "#;

    fn entry(id: &str, published: DateTime<Utc>) -> Entry {
        Entry {
            id: id.to_string(),
            link: Some(format!("https://example.com/{}", id)),
            title: id.to_string(),
            author: DEFAULT_AUTHOR.to_string(),
            published,
        }
    }

    mod parse_tests {
        use super::*;

        #[test]
        fn test_parse_rss() {
            let parsed = parse_feed(RSS.as_bytes());

            assert!(parsed.malformed.is_none());
            assert_eq!(parsed.entries.len(), 2);

            let newer = &parsed.entries[0];
            assert_eq!(newer.id, "tag:technews,2");
            assert_eq!(newer.title, "Newer");
            assert_eq!(
                newer.link.as_deref(),
                Some("https://technews.example.com/article/2?utm_source=rss")
            );
            assert_eq!(
                newer.published,
                Utc.with_ymd_and_hms(2024, 12, 9, 12, 0, 0).unwrap()
            );
        }

        #[test]
        fn test_parse_atom_with_missing_fields() {
            let atom = r#"<?xml version="1.0" encoding="utf-8"?>
                <feed xmlns="http://www.w3.org/2005/Atom">
                    <title>Blog</title>
                    <id>urn:blog</id>
                    <updated>2024-01-02T00:00:00Z</updated>
                    <entry>
                        <id>urn:blog:post-1</id>
                        <link rel="alternate" href="https://blog.example.com/post-1"/>
                        <updated>2024-01-02T00:00:00Z</updated>
                    </entry>
                </feed>
            "#;

            let parsed = parse_feed(atom.as_bytes());
            assert!(parsed.malformed.is_none());
            assert_eq!(parsed.entries.len(), 1);

            let e = &parsed.entries[0];
            assert_eq!(e.id, "urn:blog:post-1");
            assert_eq!(e.link.as_deref(), Some("https://blog.example.com/post-1"));
            assert_eq!(e.title, DEFAULT_TITLE);
            assert_eq!(e.author, DEFAULT_AUTHOR);
            // No published date: falls back to updated
            assert_eq!(e.published, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
        }

        #[test]
        fn test_rss_item_without_guid_uses_link_as_id() {
            let rss = r#"<?xml version="1.0"?>
                <rss version="2.0">
                    <channel>
                        <title>No guids</title>
                        <item>
                            <title>Plain item</title>
                            <link>https://example.com/no-guid</link>
                        </item>
                    </channel>
                </rss>
            "#;

            let parsed = parse_feed(rss.as_bytes());
            assert!(parsed.malformed.is_none());
            assert_eq!(parsed.entries.len(), 1);
            assert_eq!(parsed.entries[0].id, "https://example.com/no-guid");
        }

        #[test]
        fn test_unrecognized_root_recovers_items() {
            let broken = r#"
                <channel>
                    <item>
                        <title><![CDATA[Fish & Chips]]></title>
                        <link>https://example.com/a?x=1&amp;y=2</link>
                        <pubDate>Mon, 09 Dec 2024 12:00:00 GMT</pubDate>
                    </item>
                    <item>
                        <title>No link here</title>
                    </item>
                </channel>
            "#;

            let parsed = parse_feed(broken.as_bytes());
            assert!(matches!(parsed.malformed, Some(Error::FeedParse(_))));
            assert_eq!(parsed.entries.len(), 2);

            let first = &parsed.entries[0];
            assert_eq!(first.title, "Fish & Chips");
            assert_eq!(first.link.as_deref(), Some("https://example.com/a?x=1&y=2"));
            // No guid: id falls back to link
            assert_eq!(first.id, "https://example.com/a?x=1&y=2");

            assert!(parsed.entries[1].link.is_none());
        }

        #[test]
        fn test_garbage_yields_no_entries() {
            let parsed = parse_feed(b"this is not a feed");
            assert!(parsed.malformed.is_some());
            assert!(parsed.entries.is_empty());
        }
    }

    mod recovery_tests {
        use super::*;

        #[test]
        fn test_extract_simple_element() {
            let xml = "<title>Hello World</title>";
            assert_eq!(extract_xml_element(xml, "title"), Some("Hello World".to_string()));
        }

        #[test]
        fn test_extract_element_with_attributes() {
            let xml = r#"<guid isPermaLink="false">abc-1</guid>"#;
            assert_eq!(extract_xml_element(xml, "guid"), Some("abc-1".to_string()));
        }

        #[test]
        fn test_extract_does_not_match_longer_tag_names() {
            let xml = "<titles>wrong</titles><title>right</title>";
            assert_eq!(extract_xml_element(xml, "title"), Some("right".to_string()));
        }

        #[test]
        fn test_extract_self_closing_returns_none() {
            let xml = r#"<link href="https://example.com/x"/>"#;
            assert_eq!(extract_xml_element(xml, "link"), None);
            assert_eq!(
                extract_attribute(xml, "link", "href"),
                Some("https://example.com/x".to_string())
            );
        }

        #[test]
        fn test_extract_element_no_closing_tag() {
            assert_eq!(extract_xml_element("<title>Hello", "title"), None);
        }

        #[test]
        fn test_recover_atom_entries() {
            let xml = r#"
                <feed>
                    <entry>
                        <id>urn:1</id>
                        <title>One</title>
                        <link href="https://example.com/1"/>
                        <author><name>Ann</name></author>
                        <published>2024-05-01T08:00:00Z</published>
                    </entry>
                    <entry>
                        <id>urn:2</id>
                        <link href="https://example.com/2"/>
            "#;

            let now = Utc::now();
            let entries = recover_entries(xml.as_bytes(), now);
            assert_eq!(entries.len(), 2);
            assert_eq!(entries[0].id, "urn:1");
            assert_eq!(entries[0].author, "Ann");
            assert_eq!(
                entries[0].published,
                Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap()
            );
            // Truncated block still yields what is there
            assert_eq!(entries[1].link.as_deref(), Some("https://example.com/2"));
            assert_eq!(entries[1].published, now);
        }
    }

    mod ordering_tests {
        use super::*;

        #[test]
        fn test_newest_first_becomes_oldest_first() {
            let t = |s| Utc.timestamp_opt(s, 0).unwrap();
            let parsed = ParsedFeed {
                entries: vec![entry("b", t(20)), entry("a", t(10))],
                malformed: None,
            };

            let ids: Vec<_> = parsed.chronological().into_iter().map(|e| e.id).collect();
            assert_eq!(ids, vec!["a", "b"]);
        }

        #[test]
        fn test_oldest_first_feed_stays_chronological() {
            let t = |s| Utc.timestamp_opt(s, 0).unwrap();
            let parsed = ParsedFeed {
                entries: vec![entry("a", t(10)), entry("b", t(20)), entry("c", t(30))],
                malformed: None,
            };

            let ids: Vec<_> = parsed.chronological().into_iter().map(|e| e.id).collect();
            assert_eq!(ids, vec!["a", "b", "c"]);
        }

        #[test]
        fn test_equal_timestamps_use_reversed_document_order() {
            let now = Utc::now();
            let parsed = ParsedFeed {
                entries: vec![entry("third", now), entry("second", now), entry("first", now)],
                malformed: None,
            };

            let ids: Vec<_> = parsed.chronological().into_iter().map(|e| e.id).collect();
            assert_eq!(ids, vec!["first", "second", "third"]);
        }
    }
}
