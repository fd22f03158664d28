//! Minification stage (§4.9): strips insignificant whitespace and comments
//! from JSON, CSS, HTML and JavaScript bodies by media type. JSON is always
//! minified; the rest are minified on a best-effort basis since, unlike JSON,
//! there is no single unambiguous compacted form.
//!
//! Runs upstream of [`super::compression`] in the assembled chain — minifying
//! before compressing gives the compressor less redundant whitespace to spend
//! bits modeling.

use crate::{
    chain::{Handler, HandlerFuture, SharedHandler},
    http::{body::Body, request::Request},
    net::ConnectionInfo,
};

pub struct Minification {
    next: SharedHandler,
}

impl Minification {
    pub fn new(next: SharedHandler) -> Self {
        Self { next }
    }
}

impl Handler for Minification {
    fn handle<'a>(&'a self, info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            let mut response = self.next.handle(info, request).await;

            let Some(minifier) = response
                .headers()
                .get("content-type")
                .and_then(|ct| minifier_for(ct))
            else {
                return response;
            };

            let materialized = match response.body_mut().take() {
                Body::Bytes(data) => Some(data),
                Body::File { path, .. } => tokio::fs::read(&path).await.ok(),
                other @ (Body::Empty | Body::Stream { .. } | Body::Tunnel(_)) => {
                    *response.body_mut() = other;
                    None
                }
            };

            if let Some(data) = materialized {
                response.set_body(Body::Bytes(minifier(&data)));
            }

            response
        })
    }
}

type Minifier = fn(&[u8]) -> Vec<u8>;

fn minifier_for(content_type: &str) -> Option<Minifier> {
    match content_type.split(';').next()?.trim().to_ascii_lowercase().as_str() {
        "application/json" => Some(minify_json),
        "text/css" => Some(minify_css),
        "text/html" => Some(minify_html),
        "application/javascript" | "text/javascript" => Some(minify_js),
        _ => None,
    }
}

/// Drops whitespace between tokens outside of string literals. Leaves string
/// contents (including escape sequences) untouched.
fn minify_json(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    for &byte in input {
        if in_string {
            out.push(byte);
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        if byte == b'"' {
            in_string = true;
            out.push(byte);
        } else if !byte.is_ascii_whitespace() {
            out.push(byte);
        }
    }
    out
}

/// Strips `/* ... */` comments and collapses whitespace runs to nothing
/// around structural punctuation, to a single space elsewhere.
fn minify_css(input: &[u8]) -> Vec<u8> {
    let stripped = strip_c_style_comments(input);
    let mut out = Vec::with_capacity(stripped.len());
    let mut pending_space = false;
    for &byte in &stripped {
        if byte.is_ascii_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            if !matches!(out.last(), Some(b'{') | Some(b'}') | Some(b':') | Some(b';') | Some(b',') | None)
                && !matches!(byte, b'{' | b'}' | b':' | b';' | b',')
            {
                out.push(b' ');
            }
            pending_space = false;
        }
        out.push(byte);
    }
    out
}

/// Strips `<!-- ... -->` comments and collapses runs of whitespace between
/// tags down to a single space.
fn minify_html(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    let mut pending_space = false;
    while i < input.len() {
        if input[i..].starts_with(b"<!--") {
            if let Some(end) = find_subslice(&input[i..], b"-->") {
                i += end + 3;
                continue;
            }
            break;
        }
        let byte = input[i];
        if byte.is_ascii_whitespace() {
            pending_space = true;
            i += 1;
            continue;
        }
        if pending_space {
            out.push(b' ');
            pending_space = false;
        }
        out.push(byte);
        i += 1;
    }
    out
}

/// Strips `//` and `/* */` comments (naively, outside of string literals) and
/// collapses whitespace runs to a single space. Does not attempt to shrink
/// identifiers or remove optional semicolons.
fn minify_js(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    let mut pending_space = false;
    let mut in_string: Option<u8> = None;
    while i < input.len() {
        let byte = input[i];

        if let Some(quote) = in_string {
            out.push(byte);
            if byte == b'\\' && i + 1 < input.len() {
                out.push(input[i + 1]);
                i += 2;
                continue;
            }
            if byte == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }

        if byte == b'"' || byte == b'\'' || byte == b'`' {
            if pending_space {
                out.push(b' ');
                pending_space = false;
            }
            in_string = Some(byte);
            out.push(byte);
            i += 1;
            continue;
        }

        if input[i..].starts_with(b"//") {
            while i < input.len() && input[i] != b'\n' {
                i += 1;
            }
            pending_space = true;
            continue;
        }

        if input[i..].starts_with(b"/*") {
            if let Some(end) = find_subslice(&input[i..], b"*/") {
                i += end + 2;
            } else {
                i = input.len();
            }
            pending_space = true;
            continue;
        }

        if byte.is_ascii_whitespace() {
            pending_space = true;
            i += 1;
            continue;
        }

        if pending_space {
            out.push(b' ');
            pending_space = false;
        }
        out.push(byte);
        i += 1;
    }
    out
}

fn strip_c_style_comments(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i..].starts_with(b"/*") {
            if let Some(end) = find_subslice(&input[i..], b"*/") {
                i += end + 2;
                continue;
            }
            break;
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_minify_drops_whitespace_outside_strings() {
        let input = br#"{ "a" : 1,  "b": "  spaced  " }"#;
        let out = minify_json(input);
        assert_eq!(out, br#"{"a":1,"b":"  spaced  "}"#.to_vec());
    }

    #[test]
    fn css_minify_strips_comments_and_collapses_whitespace() {
        let input = b"body {\n  color: red; /* comment */\n  margin: 0;\n}\n";
        let out = minify_css(input);
        let out = String::from_utf8(out).unwrap();
        assert!(!out.contains("comment"));
        assert!(!out.contains('\n'));
    }

    #[test]
    fn html_minify_strips_comments_and_collapses_inter_tag_whitespace() {
        let input = b"<div>\n  <!-- note -->\n  <p>hi</p>\n</div>";
        let out = String::from_utf8(minify_html(input)).unwrap();
        assert!(!out.contains("note"));
        assert!(!out.contains('\n'));
    }

    #[test]
    fn js_minify_strips_line_and_block_comments_but_preserves_strings() {
        let input = b"const x = 1; // comment\n/* block */ const s = \"  keep  \";";
        let out = String::from_utf8(minify_js(input)).unwrap();
        assert!(!out.contains("comment"));
        assert!(!out.contains("block"));
        assert!(out.contains("\"  keep  \""));
    }
}
