//! Canonical listing keys used for deduplication.

use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Query parameter that identifies a listing.
pub const ID_PARAM: &str = "id";

/// Canonical key for a listing URL.
///
/// Tracking and session parameters vary between visits to the same
/// listing, so only the first `id` parameter survives and the fragment is
/// dropped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingKey(String);

impl ListingKey {
    /// Canonicalize `link` into a key.
    #[must_use]
    pub fn from_link(link: &str) -> Self {
        Self(canonicalize(link))
    }

    /// Key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ListingKey {
    fn from(link: &str) -> Self {
        Self::from_link(link)
    }
}

/// Strip every query parameter except the first `id`, and the fragment.
///
/// Links that do not parse as absolute URLs are handled textually with the
/// same rules. Applying this twice gives the same result as applying it once.
#[must_use]
pub fn canonicalize(link: &str) -> String {
    let link = link.trim();
    match Url::parse(link) {
        Ok(mut url) => {
            let id = url.query().and_then(find_id_pair).map(str::to_string);
            url.set_query(id.as_deref());
            url.set_fragment(None);
            url.to_string()
        }
        Err(_) => {
            let without_fragment = link.split_once('#').map_or(link, |(head, _)| head);
            match without_fragment.split_once('?') {
                Some((base, query)) => match find_id_pair(query) {
                    Some(pair) => format!("{base}?{pair}"),
                    None => base.to_string(),
                },
                None => without_fragment.to_string(),
            }
        }
    }
}

/// First raw `id=...` pair of a query string, left exactly as encoded.
fn find_id_pair(query: &str) -> Option<&str> {
    query.split('&').find(|pair| {
        let key = pair.split_once('=').map_or(*pair, |(key, _)| key);
        key == ID_PARAM
    })
}
