//! File router terminal handler (§4.14): serves a document root off disk.

use crate::{
    chain::{Handler, HandlerFuture},
    http::{body::Body, request::Request},
    net::ConnectionInfo,
    Method, Response, StatusCode,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::{
    io,
    path::{Path, PathBuf},
    time::SystemTime,
};

/// Per-file-router configuration (§10.2).
#[derive(Debug, Clone)]
pub struct FileRouterConfig {
    pub document_root: PathBuf,
    /// Generate an HTML directory listing for a directory with no `index.html`
    /// (default: `false`, yielding `404` instead).
    pub generate_index: bool,
    pub enable_etag: bool,
    pub enable_last_modified: bool,
    /// Refuse a request whose resolved path differs from its unresolved path
    /// (i.e. a symlink was followed) rather than serving through it.
    pub disable_symlinks: bool,

    #[doc(hidden)]
    #[allow(dead_code)]
    pub _priv: (),
}

impl FileRouterConfig {
    pub fn new(document_root: impl Into<PathBuf>) -> Self {
        Self {
            document_root: document_root.into(),
            generate_index: false,
            enable_etag: true,
            enable_last_modified: true,
            disable_symlinks: false,
            _priv: (),
        }
    }
}

pub struct FileRouter {
    config: FileRouterConfig,
}

impl FileRouter {
    pub fn new(config: FileRouterConfig) -> Self {
        Self { config }
    }
}

impl Handler for FileRouter {
    fn handle<'a>(&'a self, _info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            if request.method() != Method::Get {
                return Response::status_only(StatusCode::MethodNotAllowed);
            }

            let resolved = match resolve(&self.config, request.url().path()).await {
                Ok(resolved) => resolved,
                Err(status) => return Response::status_only(status),
            };

            match resolved {
                Resolved::File(path) => serve_file(&self.config, &path, request).await,
                Resolved::Directory(path) => {
                    let index = path.join("index.html");
                    if tokio::fs::metadata(&index).await.is_ok() {
                        serve_file(&self.config, &index, request).await
                    } else if self.config.generate_index {
                        serve_folder(&self.config, &path, request.url().path()).await
                    } else {
                        Response::status_only(StatusCode::NotFound)
                    }
                }
            }
        })
    }
}

enum Resolved {
    File(PathBuf),
    Directory(PathBuf),
}

/// Joins `document_root` with `request_path` (stripped of its leading `/`),
/// resolves symlinks, and confirms containment within the document root.
async fn resolve(config: &FileRouterConfig, request_path: &str) -> Result<Resolved, StatusCode> {
    let relative = request_path.trim_start_matches('/');
    let candidate = config.document_root.join(relative);

    let resolved = match tokio::fs::canonicalize(&candidate).await {
        Ok(resolved) => resolved,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Err(StatusCode::NotFound),
        Err(_) => return Err(StatusCode::BadRequest),
    };

    if config.disable_symlinks && resolved != candidate {
        return Err(StatusCode::BadRequest);
    }

    let root = tokio::fs::canonicalize(&config.document_root)
        .await
        .map_err(|_| StatusCode::NotFound)?;
    if !resolved.starts_with(&root) {
        return Err(StatusCode::BadRequest);
    }

    let metadata = tokio::fs::metadata(&resolved).await.map_err(|_| StatusCode::NotFound)?;
    if metadata.is_dir() {
        Ok(Resolved::Directory(resolved))
    } else {
        Ok(Resolved::File(resolved))
    }
}

/// Serves one resolved file, short-circuiting to `304 Not Modified` inline
/// per §4.14 when the request's own conditional headers say so — this router
/// may be the whole chain (Testable Scenario S2 has no `Precondition` stage),
/// so it can't rely on that stage to ever run.
async fn serve_file(config: &FileRouterConfig, path: &Path, request: &Request) -> Response {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(metadata) => metadata,
        Err(_) => return Response::status_only(StatusCode::NotFound),
    };

    let mut response = Response::new(StatusCode::Ok);
    let if_none_match = request.header("if-none-match");

    if config.enable_etag {
        let etag = etag_for(&metadata);
        response.headers_mut().insert("etag", etag.clone());

        if if_none_match == Some(etag.as_str()) {
            return not_modified(response);
        }
    }

    if config.enable_last_modified {
        if let Ok(modified) = metadata.modified() {
            let last_modified = httpdate::fmt_http_date(modified);
            response.headers_mut().insert("last-modified", last_modified.clone());

            // RFC 9110: a recipient MUST ignore If-Modified-Since if the
            // request also carries If-None-Match.
            if if_none_match.is_none() {
                if let Some(if_modified_since) = request.header("if-modified-since") {
                    if let (Ok(threshold), Ok(last_modified)) =
                        (httpdate::parse_http_date(if_modified_since), httpdate::parse_http_date(&last_modified))
                    {
                        if last_modified <= threshold {
                            return not_modified(response);
                        }
                    }
                }
            }
        }
    }

    response
        .headers_mut()
        .insert("content-type", crate::mime::lookup_path(path));
    response.set_body(Body::file(path.to_path_buf(), metadata.len()));
    response
}

/// Turns a 200-in-progress response carrying validators into a `304`: per
/// RFC 9110 §15.4.5 the cacheable headers already set (`ETag`,
/// `Last-Modified`) are kept, the body is dropped.
fn not_modified(mut response: Response) -> Response {
    response.set_status(StatusCode::NotModified);
    response.set_body(Body::Empty);
    response
}

/// Weak, nginx-style ETag: base64 of the size and mtime, not a content hash —
/// cheap enough to compute on every request without reading the file body.
fn etag_for(metadata: &std::fs::Metadata) -> String {
    let size = metadata.len();
    let mtime_ns = metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!(
        "W/\"{}-{}\"",
        STANDARD.encode(size.to_be_bytes()),
        STANDARD.encode(mtime_ns.to_be_bytes())
    )
}

async fn serve_folder(config: &FileRouterConfig, dir: &Path, request_path: &str) -> Response {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(_) => return Response::status_only(StatusCode::NotFound),
    };

    let mut rows = Vec::new();
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(_) => break,
        };

        let name = entry.file_name().to_string_lossy().into_owned();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        let kind = if metadata.is_symlink() {
            "Symlink"
        } else if metadata.is_dir() {
            "Folder"
        } else {
            "File"
        };
        let last_modified = metadata
            .modified()
            .ok()
            .map(httpdate::fmt_http_date)
            .unwrap_or_default();
        let size = if metadata.is_file() { metadata.len().to_string() } else { String::new() };

        let href = format!(
            "{}/{}",
            request_path.trim_end_matches('/'),
            urlencoding::encode(&name)
        );
        rows.push(format!(
            "<tr><td><a href=\"{}\">{}</a></td><td>{}</td><td>{}</td><td>{}</td></tr>",
            html_escape(&href),
            html_escape(&name),
            kind,
            html_escape(&last_modified),
            size
        ));
    }

    let parent_row = parent_link(config, dir)
        .await
        .map(|href| format!("<tr><td><a href=\"{}\">..</a></td><td>Folder</td><td></td><td></td></tr>", html_escape(&href)))
        .unwrap_or_default();

    let body = format!(
        "<!DOCTYPE html><html><head><meta charset=\"utf-8\"><title>Index of {path}</title></head>\
         <body><h1>Index of {path}</h1><table>\
         <tr><th>Name</th><th>Type</th><th>Last modified</th><th>Size</th></tr>{parent}{rows}\
         </table></body></html>",
        path = html_escape(request_path),
        parent = parent_row,
        rows = rows.join(""),
    );

    Response::html(body)
}

/// `None` when the directory's parent would resolve outside the document root
/// (i.e. `dir` already *is* the document root).
async fn parent_link(config: &FileRouterConfig, dir: &Path) -> Option<String> {
    let root = tokio::fs::canonicalize(&config.document_root).await.ok()?;
    if dir == root {
        return None;
    }
    let parent = dir.parent()?;
    let relative = parent.strip_prefix(&root).ok()?;
    let mut href = String::from("/");
    href.push_str(&relative.to_string_lossy());
    Some(href)
}

fn html_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{http::request::test_request, net::Endpoint};
    use std::net::{IpAddr, Ipv4Addr};
    use tempfile::tempdir;

    fn conn_info() -> ConnectionInfo {
        let ep = Endpoint::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 8080);
        ConnectionInfo::new(ep, ep, false)
    }

    #[tokio::test]
    async fn serves_a_plain_file_with_content_type_and_etag() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hi").unwrap();

        let router = FileRouter::new(FileRouterConfig::new(dir.path()));
        let mut req = test_request("GET /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n");
        let resp = router.handle(&conn_info(), &mut req).await;

        assert_eq!(resp.status(), StatusCode::Ok);
        assert_eq!(resp.headers().get("content-type"), Some("text/plain; charset=utf-8"));
        assert!(resp.headers().get("etag").unwrap().starts_with("W/\""));
        assert_eq!(resp.body().content_length(), Some(2));
    }

    #[tokio::test]
    async fn returns_404_for_missing_path() {
        let dir = tempdir().unwrap();
        let router = FileRouter::new(FileRouterConfig::new(dir.path()));
        let mut req = test_request("GET /nope.txt HTTP/1.1\r\nHost: x\r\n\r\n");
        let resp = router.handle(&conn_info(), &mut req).await;
        assert_eq!(resp.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn rejects_path_traversal_outside_document_root() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        let router = FileRouter::new(FileRouterConfig::new(dir.path().join("sub")));
        let mut req = test_request("GET /../secret HTTP/1.1\r\nHost: x\r\n\r\n");
        let resp = router.handle(&conn_info(), &mut req).await;
        assert_eq!(resp.status(), StatusCode::BadRequest);
    }

    #[tokio::test]
    async fn directory_without_index_is_404_when_generate_index_is_off() {
        let dir = tempdir().unwrap();
        let router = FileRouter::new(FileRouterConfig::new(dir.path()));
        let mut req = test_request("GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let resp = router.handle(&conn_info(), &mut req).await;
        assert_eq!(resp.status(), StatusCode::NotFound);
    }

    #[tokio::test]
    async fn directory_listing_escapes_and_links_entries() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();

        let mut config = FileRouterConfig::new(dir.path());
        config.generate_index = true;
        let router = FileRouter::new(config);
        let mut req = test_request("GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        let resp = router.handle(&conn_info(), &mut req).await;

        assert_eq!(resp.status(), StatusCode::Ok);
        let Body::Bytes(data) = resp.body() else { panic!("expected bytes body") };
        let html = String::from_utf8(data.clone()).unwrap();
        assert!(html.contains("a.txt"));
    }

    #[tokio::test]
    async fn non_get_method_is_405() {
        let dir = tempdir().unwrap();
        let router = FileRouter::new(FileRouterConfig::new(dir.path()));
        let mut req = test_request("POST / HTTP/1.1\r\nHost: x\r\n\r\n");
        let resp = router.handle(&conn_info(), &mut req).await;
        assert_eq!(resp.status(), StatusCode::MethodNotAllowed);
    }

    /// Testable Scenario S2: with no `Precondition` stage anywhere in the
    /// chain, the file router alone must honor `If-None-Match`.
    #[tokio::test]
    async fn if_none_match_short_circuits_to_304_with_no_precondition_stage() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hi").unwrap();

        let router = FileRouter::new(FileRouterConfig::new(dir.path()));
        let mut req = test_request("GET /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n");
        let first = router.handle(&conn_info(), &mut req).await;
        let etag = first.headers().get("etag").unwrap().to_owned();

        let mut req = test_request(&format!("GET /hello.txt HTTP/1.1\r\nHost: x\r\nIf-None-Match: {etag}\r\n\r\n"));
        let resp = router.handle(&conn_info(), &mut req).await;

        assert_eq!(resp.status(), StatusCode::NotModified);
        assert!(resp.body().is_empty());
        assert_eq!(resp.headers().get("etag"), Some(etag.as_str()));
    }

    #[tokio::test]
    async fn if_modified_since_short_circuits_unless_if_none_match_present() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hi").unwrap();

        let router = FileRouter::new(FileRouterConfig::new(dir.path()));
        let mut req = test_request("GET /hello.txt HTTP/1.1\r\nHost: x\r\n\r\n");
        let first = router.handle(&conn_info(), &mut req).await;
        let last_modified = first.headers().get("last-modified").unwrap().to_owned();

        let mut req = test_request(&format!(
            "GET /hello.txt HTTP/1.1\r\nHost: x\r\nIf-Modified-Since: {last_modified}\r\n\r\n"
        ));
        let resp = router.handle(&conn_info(), &mut req).await;
        assert_eq!(resp.status(), StatusCode::NotModified);

        let mut req = test_request(&format!(
            "GET /hello.txt HTTP/1.1\r\nHost: x\r\nIf-None-Match: \"bogus\"\r\nIf-Modified-Since: {last_modified}\r\n\r\n"
        ));
        let resp = router.handle(&conn_info(), &mut req).await;
        assert_eq!(resp.status(), StatusCode::Ok);
    }
}
