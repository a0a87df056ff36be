//! Canonical request construction for SigV4
//!
//! ```text
//! HTTPMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! Every canonical header line ends with its own `\n`, so the header block is
//! followed by an empty line. The path is used exactly as received.

use super::AuthRequest;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Payload hash sentinel for requests whose body is not signed
pub const UNSIGNED_PAYLOAD: &str = "UNSIGNED-PAYLOAD";

/// RFC 3986 unreserved characters stay literal, everything else is encoded.
const QUERY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Build the canonical request string for `request`.
///
/// `signed_headers` is the list declared in the `Authorization` header, in the
/// order declared. `payload_hash` is a hex SHA-256 of the body or
/// [`UNSIGNED_PAYLOAD`].
pub fn build_canonical_request(
    request: &AuthRequest,
    signed_headers: &[String],
    payload_hash: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method,
        canonical_uri(&request.path),
        canonical_query_string(request.query.as_deref()),
        canonical_headers(request, signed_headers),
        signed_headers_line(signed_headers),
        payload_hash
    )
}

/// The request path, or `/` when empty. No other normalization.
pub fn canonical_uri(path: &str) -> &str {
    if path.is_empty() {
        "/"
    } else {
        path
    }
}

/// Decode the raw query, re-encode each key and value, sort by key.
///
/// Repeated keys each produce their own `key=value` pair, in the order they
/// were received.
pub fn canonical_query_string(query: Option<&str>) -> String {
    let query = match query {
        Some(q) if !q.is_empty() => q,
        _ => return String::new(),
    };

    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (uri_encode(&k), uri_encode(&v)))
        .collect();

    // stable: values of one key keep their order
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&")
}

/// One `name:value\n` line per signed header.
///
/// A missing `host` header falls back to the connection host. Other missing
/// headers contribute an empty value, which then fails signature comparison.
pub fn canonical_headers(request: &AuthRequest, signed_headers: &[String]) -> String {
    let mut out = String::new();
    for name in signed_headers {
        let name = name.to_ascii_lowercase();
        let value = match request.header(&name) {
            Some(v) => v,
            None if name == "host" => request.host.as_deref().unwrap_or(""),
            None => "",
        };
        out.push_str(&name);
        out.push(':');
        out.push_str(value.trim());
        out.push('\n');
    }
    out
}

/// Semicolon-joined lowercase signed header names
pub fn signed_headers_line(signed_headers: &[String]) -> String {
    signed_headers
        .iter()
        .map(|h| h.to_ascii_lowercase())
        .collect::<Vec<_>>()
        .join(";")
}

fn uri_encode(s: &str) -> String {
    utf8_percent_encode(s, QUERY_ENCODE_SET).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_HASH: &str = "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_get_vanilla_canonical_request() {
        let request = AuthRequest::new("GET", "/")
            .with_header("host", "example.amazonaws.com")
            .with_header("x-amz-date", "20150830T123600Z");

        let canonical =
            build_canonical_request(&request, &names(&["host", "x-amz-date"]), EMPTY_HASH);

        let expected = "GET\n/\n\nhost:example.amazonaws.com\nx-amz-date:20150830T123600Z\n\nhost;x-amz-date\ne3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(canonical, expected);
    }

    #[test]
    fn test_empty_path_defaults_to_root() {
        assert_eq!(canonical_uri(""), "/");
    }

    #[test]
    fn test_path_is_not_normalized() {
        assert_eq!(canonical_uri("/bucket/./a/../b/"), "/bucket/./a/../b/");
        assert_eq!(canonical_uri("/bucket//key"), "/bucket//key");
    }

    #[test]
    fn test_query_sorted_by_key() {
        assert_eq!(canonical_query_string(Some("b=2&a=1&c=3")), "a=1&b=2&c=3");
    }

    #[test]
    fn test_query_repeated_keys_each_emitted() {
        assert_eq!(
            canonical_query_string(Some("tag=z&id=1&tag=a")),
            "id=1&tag=z&tag=a"
        );
    }

    #[test]
    fn test_query_values_are_percent_encoded() {
        assert_eq!(
            canonical_query_string(Some("prefix=a%20b%2Fc&key=x*y")),
            "key=x%2Ay&prefix=a%20b%2Fc"
        );
    }

    #[test]
    fn test_query_flag_without_value() {
        assert_eq!(canonical_query_string(Some("uploads")), "uploads=");
        assert_eq!(canonical_query_string(Some("")), "");
        assert_eq!(canonical_query_string(None), "");
    }

    #[test]
    fn test_headers_lowercased_and_trimmed() {
        let request = AuthRequest::new("PUT", "/b/k").with_header("X-Amz-Meta-Note", "  hello  ");
        let headers = canonical_headers(&request, &names(&["X-Amz-Meta-Note"]));
        assert_eq!(headers, "x-amz-meta-note:hello\n");
    }

    #[test]
    fn test_host_falls_back_to_connection_host() {
        let request = AuthRequest::new("GET", "/").with_host("bucket.example.com:9000");
        let headers = canonical_headers(&request, &names(&["host"]));
        assert_eq!(headers, "host:bucket.example.com:9000\n");
    }

    #[test]
    fn test_header_order_follows_declaration() {
        let request = AuthRequest::new("GET", "/")
            .with_header("host", "h")
            .with_header("x-amz-date", "d");
        let headers = canonical_headers(&request, &names(&["x-amz-date", "host"]));
        assert_eq!(headers, "x-amz-date:d\nhost:h\n");
    }

    #[test]
    fn test_signed_headers_line() {
        assert_eq!(
            signed_headers_line(&names(&["Host", "x-amz-content-sha256", "x-amz-date"])),
            "host;x-amz-content-sha256;x-amz-date"
        );
    }
}
