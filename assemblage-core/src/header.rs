//! Decoding of the trigger header naming the sections to assemble.
//!
//! The value is a comma-separated list of dotted names, each optionally
//! followed by `;key=value` attributes: `X-Filter: head, body.title;q=1`.

use assemblage_types::Headers;

/// One requested name with its attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestedName {
    pub name: String,
    pub attributes: Vec<(String, String)>,
}

/// Decode every value of `header` in `headers`.
pub fn decode(headers: &Headers, header: &str) -> Vec<RequestedName> {
    headers
        .get_all(header)
        .flat_map(|value| value.split(','))
        .filter_map(decode_entry)
        .collect()
}

fn decode_entry(entry: &str) -> Option<RequestedName> {
    let mut parts = entry.split(';');
    let name = parts.next()?.trim();
    if name.is_empty() {
        return None;
    }
    let attributes = parts
        .filter_map(|attribute| {
            let attribute = attribute.trim();
            if attribute.is_empty() {
                return None;
            }
            Some(match attribute.split_once('=') {
                Some((key, value)) => (key.trim().to_string(), value.trim().to_string()),
                None => (attribute.to_string(), String::new()),
            })
        })
        .collect();
    Some(RequestedName {
        name: name.to_string(),
        attributes,
    })
}

/// The distinct requested names, in first-seen order.
pub fn requested_names(headers: &Headers, header: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for requested in decode(headers, header) {
        if !names.contains(&requested.name) {
            names.push(requested.name);
        }
    }
    names
}
