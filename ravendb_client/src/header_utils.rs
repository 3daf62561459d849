use reqwest::header::{HeaderMap, ETAG};

/// Converts an `ETag` header value into a change vector.
///
/// The server quotes change vectors. A leading quote is always stripped; a trailing one only
/// when present.
pub fn etag_header_to_change_vector(value: &str) -> String {
    match value.strip_prefix('"') {
        Some(rest) => rest.strip_suffix('"').unwrap_or(rest).to_string(),
        None => value.to_string(),
    }
}

/// Reads the change vector out of the response `ETag` header.
pub fn get_etag_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(ETAG)
        .and_then(|value| value.to_str().ok())
        .map(etag_header_to_change_vector)
}

/// `"true"` in any casing is `true`, any other value is `false`, a missing header is `None`.
pub fn get_boolean_header(headers: &HeaderMap, name: &str) -> Option<bool> {
    headers
        .get(name)
        .map(|value| value.to_str().map_or(false, |v| v.eq_ignore_ascii_case("true")))
}

/// Reads an integer header such as `Topology-Etag`, tolerating surrounding quotes.
pub fn get_i64_header(headers: &HeaderMap, name: &str) -> Option<i64> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| etag_header_to_change_vector(value.trim()).parse().ok())
}

/// Quotes a change vector for use in `If-None-Match` / `If-Match`.
pub fn quote_change_vector(change_vector: &str) -> String {
    format!("\"{}\"", change_vector)
}
