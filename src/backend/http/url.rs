use itertools::Itertools;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::attributes::Attributes;
use crate::filters::Filters;

/// Escape everything except the RFC 3986 unreserved characters, the same
/// set libcurl's escaper leaves alone.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Escapes one path segment (account, queue, or message id).
pub(crate) fn escape(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// Reverses [`escape`] on ids and names coming back from the server.
pub(crate) fn unescape(segment: &str) -> String {
    percent_decode_str(segment).decode_utf8_lossy().into_owned()
}

/// The query string for a request: set filter fields first, then set
/// attribute fields, `&`-joined. `None` when nothing is set.
///
/// The marker is passed through raw; the server takes it as-is.
pub(crate) fn query_string(
    filters: Option<&Filters>,
    attributes: Option<&Attributes>,
) -> Option<String> {
    let mut pairs: Vec<String> = Vec::new();

    if let Some(f) = filters {
        if f.match_hidden_isset() {
            pairs.push(format!("match_hidden={}", f.match_hidden()));
        }
        if f.limit_isset() {
            pairs.push(format!("limit={}", f.limit()));
        }
        if let Some(marker) = f.marker() {
            pairs.push(format!("marker={marker}"));
        }
        if f.wait_isset() {
            pairs.push(format!("wait={}", f.wait()));
        }
        if f.detail_isset() {
            pairs.push(format!("detail={}", f.detail()));
        }
    }

    if let Some(a) = attributes {
        if a.ttl_isset() {
            pairs.push(format!("ttl={}", a.ttl()));
        }
        if a.hide_isset() {
            pairs.push(format!("hide={}", a.hide()));
        }
    }

    if pairs.is_empty() {
        None
    } else {
        Some(pairs.iter().join("&"))
    }
}

/// Assembles the path-and-query part of a request URL from the escaped
/// segments under the protocol version.
pub(crate) fn path(
    version: &str,
    segments: &[&str],
    query: Option<&str>,
) -> String {
    let mut out = format!("/{version}");
    for segment in segments {
        out.push('/');
        out.push_str(&escape(segment));
    }
    if let Some(q) = query {
        out.push('?');
        out.push_str(q);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Detail;

    #[test]
    fn escape_leaves_unreserved_alone() {
        assert_eq!(escape("msg-1_a.b~c"), "msg-1_a.b~c");
        assert_eq!(escape("a b/c"), "a%20b%2Fc");
        assert_eq!(unescape("a%20b%2Fc"), "a b/c");
    }

    #[test]
    fn empty_query_is_none() {
        assert_eq!(query_string(None, None), None);
        assert_eq!(query_string(Some(&Filters::new()), None), None);
    }

    #[test]
    fn create_with_ttl_only() {
        let mut attrs = Attributes::new();
        attrs.set_ttl(100);
        assert_eq!(
            query_string(None, Some(&attrs)).as_deref(),
            Some("ttl=100")
        );
    }

    #[test]
    fn filter_fields_come_in_wire_order() {
        let mut filters = Filters::new();
        filters
            .set_detail(Detail::All)
            .set_limit(5)
            .set_wait(30)
            .set_marker("msg 1")
            .set_match_hidden(true);
        let mut attrs = Attributes::new();
        attrs.set_hide(0).set_ttl(60);

        assert_eq!(
            query_string(Some(&filters), Some(&attrs)).as_deref(),
            Some(
                "match_hidden=true&limit=5&marker=msg 1&wait=30&detail=all\
                 &ttl=60&hide=0"
            )
        );
    }

    #[test]
    fn paths_escape_each_segment() {
        assert_eq!(path("v1.0", &[], None), "/v1.0");
        assert_eq!(
            path("v1.0", &["a", "q", "m1"], Some("ttl=100")),
            "/v1.0/a/q/m1?ttl=100"
        );
        assert_eq!(
            path("v1.0", &["acct one", "q/2"], None),
            "/v1.0/acct%20one/q%2F2"
        );
    }
}
