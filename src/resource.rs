use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::locator::absolute_url;

/// A viewable learning resource as supplied by the content layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
}

impl Resource {
    /// The locator the resolver should consult. `url` wins when both are set.
    pub fn locator(&self) -> Option<&str> {
        self.url.as_deref().or(self.path.as_deref())
    }
}

/// Converts a bare locator string or a loosely-typed record into a [`Resource`].
pub fn normalize(raw: &Value, fallback_title: &str) -> Option<Resource> {
    match raw {
        Value::String(locator) => from_locator(locator, fallback_title),
        Value::Object(fields) => from_record(fields, fallback_title),
        _ => None,
    }
}

fn from_locator(raw: &str, fallback_title: &str) -> Option<Resource> {
    let locator = raw.trim();
    if locator.is_empty() {
        return None;
    }
    let title = basename_title(locator).unwrap_or_else(|| fallback_title.to_string());
    let (url, path) = if absolute_url(locator).is_some() {
        (Some(locator.to_string()), None)
    } else {
        (None, Some(locator.to_string()))
    };
    Some(Resource {
        title,
        url,
        path,
        mime: None,
    })
}

fn from_record(fields: &Map<String, Value>, fallback_title: &str) -> Option<Resource> {
    let url = text_field(fields, &["url", "link"]);
    let path = if url.is_some() {
        None
    } else {
        text_field(fields, &["path", "storagePath"])
    };
    let locator = url.as_deref().or(path.as_deref())?;

    let title = text_field(fields, &["title"])
        .or_else(|| basename_title(locator))
        .unwrap_or_else(|| fallback_title.to_string());
    let mime = text_field(fields, &["mime", "contentType"]);

    Some(Resource {
        title,
        url,
        path,
        mime,
    })
}

fn text_field(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| fields.get(*key).and_then(Value::as_str))
        .map(str::trim)
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Last path segment of a locator, query and fragment stripped, percent-decoded.
pub fn basename_title(locator: &str) -> Option<String> {
    let end = locator
        .find(|c: char| c == '?' || c == '#')
        .unwrap_or(locator.len());
    let without_query = &locator[..end];
    let segment = without_query
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or("");
    if segment.is_empty() {
        return None;
    }
    // "https://host/" has no file segment; the host is not a title
    if let Some(url) = absolute_url(locator) {
        if url.path_segments().map_or(true, |mut s| s.all(str::is_empty)) {
            return None;
        }
    }
    let decoded = percent_decode_str(segment).decode_utf8_lossy().trim().to_string();
    if decoded.is_empty() {
        None
    } else {
        Some(decoded)
    }
}
