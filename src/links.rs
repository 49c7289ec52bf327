//! Product link recognition and URL keys

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

static PRODUCT_LINK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:https?://)?(?:www\.)?amazon\.\S*/\S*(?:dp|gp)/\S*")
        .expect("hardcoded product link pattern is valid")
});

/// First product link found in `text`, if any.
pub fn extract_one(text: &str) -> Option<&str> {
    PRODUCT_LINK.find(text).map(|m| m.as_str())
}

/// One product link per qualifying line, in input order.
///
/// Links are returned as written: no scheme is added, affiliate tags are kept
/// and duplicates across lines are not removed.
pub fn extract_many(text: &str) -> Vec<&str> {
    text.lines().filter_map(extract_one).collect()
}

pub fn is_product_link(text: &str) -> bool {
    extract_one(text).is_some()
}

/// Parses a recognized link, assuming `https` when the scheme was left out.
pub fn parse_link(link: &str) -> Result<Url, url::ParseError> {
    if link.starts_with("http://") || link.starts_with("https://") {
        Url::parse(link)
    } else {
        Url::parse(&format!("https://{link}"))
    }
}

/// Cache key for a product URL: scheme, host and path with query and fragment
/// stripped, so affiliate-tag variants of one page share an entry.
pub fn cache_key(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}://{host}:{port}{}", url.scheme(), url.path()),
        None => format!("{}://{host}{}", url.scheme(), url.path()),
    }
}

/// File-safe identifier derived from a cache key. Archived markup and report
/// fixtures are named by it.
pub fn log_id(cache_key: &str) -> String {
    format!("{:x}", md5::compute(cache_key))
}

/// Sets the `tag` query parameter, replacing any tag already present.
/// The link shown to users: `url` with the referral tag applied when one is configured
pub fn delivered_link(url: &Url, referral_tag: Option<&str>) -> Url {
    match referral_tag {
        Some(tag) => with_referral_tag(url, tag),
        None => url.clone(),
    }
}

pub fn with_referral_tag(url: &Url, tag: &str) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "tag")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut tagged = url.clone();
    tagged
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("tag", tag);
    tagged
}
