use url::form_urlencoded;

use crate::feed::Entry;

pub const INSTANT_VIEW_ENDPOINT: &str = "https://t.me/iv";

const PUBLISHED_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Render a notification body from a feed's template.
///
/// Recognized placeholders are `{title}`, `{link}`, `{author}` and
/// `{published}`; anything else in braces is left untouched. `{link}` becomes
/// a Markdown hyperlink, routed through Instant View when `rhash` is set.
pub fn format_message(
    template: &str,
    entry: &Entry,
    canonical_link: &str,
    rhash: Option<&str>,
) -> String {
    let target = match rhash.filter(|h| !h.is_empty()) {
        Some(hash) => instant_view_link(canonical_link, hash),
        None => canonical_link.to_string(),
    };
    let link = format!("[Link]({})", target);
    let published = entry.published.format(PUBLISHED_FORMAT).to_string();

    let mut out = String::with_capacity(template.len() + link.len() + entry.title.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open..];

        let value = after.find('}').and_then(|close| {
            let value = match &after[1..close] {
                "title" => entry.title.as_str(),
                "link" => link.as_str(),
                "author" => entry.author.as_str(),
                "published" => published.as_str(),
                _ => return None,
            };
            Some((value, close))
        });

        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = &after[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn instant_view_link(link: &str, rhash: &str) -> String {
    let encoded: String = form_urlencoded::byte_serialize(link.as_bytes()).collect();
    format!("{}?url={}&rhash={}", INSTANT_VIEW_ENDPOINT, encoded, rhash)
}
