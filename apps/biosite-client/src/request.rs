//! # Requests and Responses
//!
//! The mutable request/response values that flow through the interceptor
//! chains, and [`build_url`], which expands `/resource/{id}` templates
//! against the client's base URL.

use crate::error::ClientError;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde_json::Value;
use url::Url;

/// An outgoing call, before it is handed to the HTTP stack.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

/// A received response, after the body has been read.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub method: Method,
    /// Path of the request URL, e.g. `/auth/login`.
    pub path: String,
    pub status: StatusCode,
    pub headers: HeaderMap,
    /// Parsed JSON body; `None` when the body was empty or not JSON.
    pub body: Option<Value>,
    /// Raw body text, kept for error messages when the body is not JSON.
    pub text: String,
}

impl ApiResponse {
    /// True when the request path ends with `suffix` (ignores any base path).
    pub fn path_ends_with(&self, suffix: &str) -> bool {
        self.path.trim_end_matches('/').ends_with(suffix)
    }
}

// =============================================================================
// URL TEMPLATES
// =============================================================================

/// Expand `template` against `base`.
///
/// Each `{name}` placeholder is replaced by the matching entry of `params`;
/// every path segment is percent-encoded, so parameter values can never
/// introduce new segments. Query pairs whose value is `None` are dropped.
pub fn build_url(
    base: &Url,
    template: &str,
    params: &[(&str, &str)],
    query: &[(&str, Option<String>)],
) -> Result<Url, ClientError> {
    let mut url = base.clone();
    url.set_query(None);
    url.set_fragment(None);

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|()| ClientError::Url(format!("{base} cannot be used as a base URL")))?;
        segments.pop_if_empty();
        for raw in template.split('/').filter(|segment| !segment.is_empty()) {
            let segment = expand_segment(raw, params)?;
            segments.push(&segment);
        }
    }

    let mut present = query
        .iter()
        .filter_map(|(key, value)| value.as_deref().map(|value| (*key, value)))
        .peekable();
    if present.peek().is_some() {
        url.query_pairs_mut().extend_pairs(present);
    }

    Ok(url)
}

fn expand_segment(raw: &str, params: &[(&str, &str)]) -> Result<String, ClientError> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after
            .find('}')
            .ok_or_else(|| ClientError::Url(format!("unterminated placeholder in `{raw}`")))?;
        let name = &after[..end];
        let value = params
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| ClientError::Url(format!("missing path parameter `{name}`")))?;
        if value.is_empty() {
            return Err(ClientError::Url(format!("empty path parameter `{name}`")));
        }
        out.push_str(value);
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    // `path_segments_mut` drops dot segments instead of encoding them
    if out == "." || out == ".." {
        return Err(ClientError::Url(format!("dot segment `{out}` in `{raw}`")));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(s: &str) -> Url {
        Url::parse(s).expect("base url")
    }

    #[test]
    fn expands_placeholders() {
        let url = build_url(
            &base("http://localhost:8080"),
            "/achievements/{id}",
            &[("id", "abc")],
            &[],
        )
        .expect("url");
        assert_eq!(url.as_str(), "http://localhost:8080/achievements/abc");
    }

    #[test]
    fn keeps_base_path_prefix() {
        let url = build_url(&base("https://example.com/api/"), "/events/search", &[], &[])
            .expect("url");
        assert_eq!(url.as_str(), "https://example.com/api/events/search");
    }

    #[test]
    fn encodes_parameter_values() {
        let url = build_url(
            &base("http://localhost"),
            "/visitors/{id}/messages",
            &[("id", "a/b c")],
            &[],
        )
        .expect("url");
        assert_eq!(url.path(), "/visitors/a%2Fb%20c/messages");
    }

    #[test]
    fn skips_absent_query_values() {
        let url = build_url(
            &base("http://localhost"),
            "/events/search",
            &[],
            &[
                ("q", Some("rust & go".to_string())),
                ("limit", None),
                ("offset", Some("10".to_string())),
            ],
        )
        .expect("url");
        assert_eq!(url.query(), Some("q=rust+%26+go&offset=10"));

        let bare = build_url(&base("http://localhost"), "/events", &[], &[("limit", None)])
            .expect("url");
        assert_eq!(bare.query(), None);
    }

    #[test]
    fn missing_parameter_is_an_error() {
        let err = build_url(&base("http://localhost"), "/gallery/{id}", &[], &[])
            .expect_err("missing id");
        assert!(matches!(err, ClientError::Url(msg) if msg.contains("`id`")));
    }

    #[test]
    fn empty_and_dot_parameters_are_rejected() {
        for id in ["", ".", ".."] {
            let err = build_url(
                &base("http://localhost"),
                "/visitors/{id}/messages",
                &[("id", id)],
                &[],
            )
            .expect_err("path would change shape");
            assert!(matches!(err, ClientError::Url(_)), "id {id:?}");
        }

        let url = build_url(
            &base("http://localhost"),
            "/visitors/{id}/messages",
            &[("id", "..x")],
            &[],
        )
        .expect("dots inside a value are fine");
        assert_eq!(url.path(), "/visitors/..x/messages");
    }

    #[test]
    fn unterminated_placeholder_is_an_error() {
        let err = build_url(&base("http://localhost"), "/gallery/{id", &[("id", "1")], &[])
            .expect_err("bad template");
        assert!(matches!(err, ClientError::Url(_)));
    }

    #[test]
    fn cannot_be_a_base_url_is_rejected() {
        let err = build_url(&base("mailto:someone@example.com"), "/x", &[], &[])
            .expect_err("not a base");
        assert!(matches!(err, ClientError::Url(_)));
    }
}
