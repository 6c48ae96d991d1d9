//! Path parameter escaping.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Bytes escaped in a single path segment: everything except the unreserved
/// characters and the sub-delimiters that are legal inside a segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b':')
    .remove(b'=')
    .remove(b'@');

/// Escapes a path parameter that may contain reserved characters such as `/`.
///
/// The value is percent-escaped twice, because the Duplo routing layer
/// decodes the request path once before dispatching it. Callers embedding
/// ARNs, API Gateway paths and the like in a request path must use this.
///
/// # Examples
///
/// ```
/// use duplo_sdk::encode_path_param;
///
/// assert_eq!(encode_path_param("/orders/{id}"), "%252Forders%252F%257Bid%257D");
/// assert_eq!(encode_path_param("plain-name"), "plain-name");
/// ```
pub fn encode_path_param(param: &str) -> String {
    escape_segment(&escape_segment(param))
}

fn escape_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_escape() {
        assert_eq!(escape_segment("a/b c"), "a%2Fb%20c");
        assert_eq!(escape_segment("100%"), "100%25");
        assert_eq!(escape_segment("a?b#c"), "a%3Fb%23c");
        assert_eq!(escape_segment("$&+:=@-_.~"), "$&+:=@-_.~");
    }

    #[test]
    fn test_double_escape() {
        assert_eq!(encode_path_param("a/b c"), "a%252Fb%2520c");
        assert_eq!(
            encode_path_param("arn:aws:sqs:us-west-2:123:queue"),
            "arn:aws:sqs:us-west-2:123:queue"
        );
    }

    #[test]
    fn test_segment_delimiters_are_escaped() {
        assert_eq!(encode_path_param("a;b"), "a%253Bb");
        assert_eq!(encode_path_param("a,b"), "a%252Cb");
        assert_eq!(encode_path_param("a|b"), "a%257Cb");
        assert_eq!(encode_path_param("a[0]"), "a%255B0%255D");
        assert_eq!(encode_path_param("x^2"), "x%255E2");
    }

    #[test]
    fn test_dot_segments_are_kept() {
        assert_eq!(encode_path_param("."), ".");
        assert_eq!(encode_path_param(".."), "..");
        assert_eq!(encode_path_param(""), "");
    }

    #[test]
    fn test_non_ascii() {
        assert_eq!(escape_segment("é"), "%C3%A9");
        assert_eq!(encode_path_param("é"), "%25C3%25A9");
    }
}
