use std::collections::BTreeMap;

use sha2::{Digest, Sha256};
use url::form_urlencoded;

/// Query parameter carrying the token itself; never part of the hash.
const TOKEN_PARAMETER: &str = "jwt";

/// Builds the canonical form of a request for query string hashing.
///
/// `METHOD&path&query`, where the path has no trailing slash and the query is
/// sorted by key with repeated values sorted and joined by commas.
#[must_use]
pub fn canonical_request(method: &str, path: &str, query: &[(&str, &str)]) -> String {
    let mut parameters: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for &(key, value) in query {
        if key != TOKEN_PARAMETER {
            parameters.entry(key).or_default().push(value);
        }
    }

    let canonical_query = parameters
        .into_iter()
        .map(|(key, mut values)| {
            values.sort_unstable();
            let values: Vec<String> = values.into_iter().map(encode_rfc3986).collect();
            format!("{}={}", encode_rfc3986(key), values.join(","))
        })
        .collect::<Vec<_>>()
        .join("&");

    format!(
        "{}&{}&{}",
        method.trim().to_ascii_uppercase(),
        canonical_path(path),
        canonical_query
    )
}

/// Returns the lowercase hex SHA-256 of the canonical request.
#[must_use]
pub fn query_string_hash(method: &str, path: &str, query: &[(&str, &str)]) -> String {
    hex::encode(Sha256::digest(
        canonical_request(method, path, query).as_bytes(),
    ))
}

fn canonical_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    let path = if trimmed.starts_with('/') {
        trimmed.to_owned()
    } else {
        format!("/{trimmed}")
    };

    path.replace('&', "%26")
}

fn encode_rfc3986(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
        .replace('*', "%2A")
        .replace("%7E", "~")
}
