//! A small, static extension → MIME-type lookup table for the file router.
//!
//! Intentionally not a crate dependency: the table only needs to cover the
//! handful of extensions a typical document root actually serves, and a
//! `match` compiles to a tight jump table rather than pulling in a generic
//! registry of every IANA media type.

/// Looks up the MIME type for a file extension (without the leading dot,
/// matched case-insensitively). Returns `None` for anything not in the table;
/// callers fall back to `application/octet-stream`.
pub fn lookup(extension: &str) -> Option<&'static str> {
    Some(match extension.to_ascii_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" => "text/plain; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "md" => "text/markdown; charset=utf-8",

        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "bmp" => "image/bmp",
        "avif" => "image/avif",

        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",

        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",

        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "wasm" => "application/wasm",

        _ => return None,
    })
}

/// Resolves the MIME type for a path's extension, defaulting to
/// `application/octet-stream` when the extension is unknown or absent.
pub fn lookup_path(path: &std::path::Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(lookup)
        .unwrap_or("application/octet-stream")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn resolves_known_extensions_case_insensitively() {
        assert_eq!(lookup("HTML"), Some("text/html; charset=utf-8"));
        assert_eq!(lookup("Json"), Some("application/json"));
    }

    #[test]
    fn falls_back_to_octet_stream() {
        assert_eq!(lookup_path(Path::new("/tmp/file.unknownext")), "application/octet-stream");
        assert_eq!(lookup_path(Path::new("/tmp/file")), "application/octet-stream");
    }

    #[test]
    fn resolves_path_extension() {
        assert_eq!(lookup_path(Path::new("/srv/www/index.html")), "text/html; charset=utf-8");
    }
}
