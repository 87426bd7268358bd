//! Link canonicalization.
//!
//! Two links that differ only by tracking parameters must hash to the same
//! value in the dedup store, so every link goes through [`canonicalize`]
//! before it is checked, stored, or rendered.

use url::{form_urlencoded, Url};

/// Query keys stripped from links, compared case-insensitively.
pub const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "yclid",
    "_openstat",
    "action",
    "ref",
    "from",
];

/// Remove tracking query parameters from `link`.
///
/// Only the query is rewritten: scheme, host, path and fragment are kept as
/// written. Remaining parameters keep their order and their original encoding.
/// A query left empty is dropped together with its `?`. Input that does not
/// parse as an absolute URL is returned unchanged.
pub fn canonicalize(link: &str) -> String {
    if Url::parse(link).is_err() {
        return link.to_string();
    }

    let (head, fragment) = match link.split_once('#') {
        Some((head, fragment)) => (head, Some(fragment)),
        None => (link, None),
    };
    let (base, query) = match head.split_once('?') {
        Some(parts) => parts,
        None => return link.to_string(),
    };

    let kept = query
        .split('&')
        .filter(|pair| !pair.is_empty() && !is_tracking_pair(pair))
        .collect::<Vec<_>>()
        .join("&");

    let mut canonical = String::with_capacity(link.len());
    canonical.push_str(base);
    if !kept.is_empty() {
        canonical.push('?');
        canonical.push_str(&kept);
    }
    if let Some(fragment) = fragment {
        canonical.push('#');
        canonical.push_str(fragment);
    }
    canonical
}

fn is_tracking_pair(pair: &str) -> bool {
    form_urlencoded::parse(pair.as_bytes())
        .next()
        .map(|(key, _)| {
            let key = key.to_ascii_lowercase();
            TRACKING_PARAMS.contains(&key.as_str())
        })
        .unwrap_or(false)
}
