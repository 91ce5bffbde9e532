//! URL fragment carrier for snapshot blobs.
//!
//! The blob rides in the fragment (`#kc=<blob>`), which browsers never send
//! to a server. Other `&`-separated fragment segments are preserved.

use url::Url;

/// Default fragment key.
pub const DEFAULT_FRAGMENT_KEY: &str = "kc";

/// Attach `blob` to `url`'s fragment under `key`, replacing any previous
/// value for the same key.
pub fn attach(url: &mut Url, key: &str, blob: &str) {
    let mut segments: Vec<String> = segments(url)
        .filter(|segment| segment_key(segment) != key)
        .map(str::to_owned)
        .collect();
    segments.push(format!("{}={}", key, blob));
    url.set_fragment(Some(&segments.join("&")));
}

/// Remove the blob stored under `key` from `url`'s fragment and return it.
///
/// The carrier is stripped so it does not linger in history. An empty
/// fragment is removed entirely.
pub fn take(url: &mut Url, key: &str) -> Option<String> {
    let mut found = None;
    let rest: Vec<String> = segments(url)
        .filter(|segment| {
            if segment_key(segment) == key {
                if found.is_none() {
                    found = segment.split_once('=').map(|(_, v)| v.to_owned());
                }
                false
            } else {
                true
            }
        })
        .map(str::to_owned)
        .collect();

    found.as_ref()?;
    if rest.is_empty() {
        url.set_fragment(None);
    } else {
        url.set_fragment(Some(&rest.join("&")));
    }
    found
}

fn segments(url: &Url) -> impl Iterator<Item = &str> {
    url.fragment()
        .unwrap_or("")
        .split('&')
        .filter(|segment| !segment.is_empty())
}

fn segment_key(segment: &str) -> &str {
    segment.split_once('=').map_or(segment, |(k, _)| k)
}
