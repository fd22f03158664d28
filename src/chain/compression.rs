//! Compression stage (§4.8): negotiates a `Content-Encoding` against the
//! request's `Accept-Encoding` and the configured preference order, and
//! recompresses in-memory and on-disk bodies that fall within the configured
//! size window.

use crate::{
    chain::{Handler, HandlerFuture, SharedHandler},
    http::{body::Body, request::Request},
    limits::{CompressionLimits, Encoding},
    net::ConnectionInfo,
};
use std::io::Write;

pub struct Compression {
    next: SharedHandler,
    limits: CompressionLimits,
}

impl Compression {
    pub fn new(next: SharedHandler, limits: CompressionLimits) -> Self {
        Self { next, limits }
    }
}

impl Handler for Compression {
    fn handle<'a>(&'a self, info: &'a ConnectionInfo, request: &'a mut Request) -> HandlerFuture<'a> {
        Box::pin(async move {
            let accept_encoding = request.header("accept-encoding").map(str::to_owned);
            let mut response = self.next.handle(info, request).await;

            let Some(accept_encoding) = accept_encoding else {
                return response;
            };
            if response.headers().get("content-encoding").is_some() {
                return response;
            }
            let Some(encoding) = negotiate_encoding(&accept_encoding, &self.limits.preference) else {
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

            let Some(data) = materialized else {
                return response;
            };
            if data.len() < self.limits.min_body_size || data.len() > self.limits.max_body_size {
                response.set_body(Body::Bytes(data));
                return response;
            }

            match compress(&data, encoding) {
                Ok(compressed) => {
                    response.set_body(Body::Bytes(compressed));
                    response.headers_mut().insert("content-encoding", encoding.token());
                    response.headers_mut().insert_if_absent("vary", "accept-encoding");
                }
                Err(_) => {
                    response.set_body(Body::Bytes(data));
                }
            }

            response
        })
    }
}

/// Picks the highest-preference encoding the client both offers and assigns a
/// nonzero `q` value to. Unparseable `q` parameters default to `1.0`.
fn negotiate_encoding(accept_encoding: &str, preference: &[Encoding]) -> Option<Encoding> {
    let offered: Vec<(&str, f32)> = accept_encoding
        .split(',')
        .filter_map(|part| {
            let part = part.trim();
            if part.is_empty() {
                return None;
            }
            let mut pieces = part.split(';');
            let token = pieces.next()?.trim();
            let q = pieces
                .find_map(|p| p.trim().strip_prefix("q=").and_then(|v| v.parse::<f32>().ok()))
                .unwrap_or(1.0);
            Some((token, q))
        })
        .collect();

    preference.iter().copied().find(|enc| {
        offered
            .iter()
            .any(|(token, q)| *q > 0.0 && (token.eq_ignore_ascii_case(enc.token()) || *token == "*"))
    })
}

fn compress(data: &[u8], encoding: Encoding) -> std::io::Result<Vec<u8>> {
    match encoding {
        Encoding::Brotli => {
            let mut out = Vec::new();
            {
                let mut writer = brotli::CompressorWriter::new(&mut out, 4096, 5, 22);
                writer.write_all(data)?;
            }
            Ok(out)
        }
        Encoding::Zstd => zstd::stream::encode_all(data, 0),
        Encoding::Gzip | Encoding::XGzip => {
            use flate2::{write::GzEncoder, Compression};
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
        Encoding::Deflate => {
            use flate2::{write::DeflateEncoder, Compression};
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            encoder.finish()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiates_first_preferred_encoding_offered() {
        let preference = vec![Encoding::Brotli, Encoding::Gzip];
        assert_eq!(
            negotiate_encoding("gzip, br", &preference),
            Some(Encoding::Brotli)
        );
    }

    #[test]
    fn skips_encoding_with_zero_q() {
        let preference = vec![Encoding::Brotli, Encoding::Gzip];
        assert_eq!(negotiate_encoding("br;q=0, gzip", &preference), Some(Encoding::Gzip));
    }

    #[test]
    fn returns_none_when_nothing_offered_matches() {
        let preference = vec![Encoding::Brotli];
        assert_eq!(negotiate_encoding("identity", &preference), None);
    }

    #[test]
    fn gzip_round_trips_through_flate2() {
        let data = b"hello hello hello hello hello";
        let compressed = compress(data, Encoding::Gzip).unwrap();
        let mut decoder = flate2::read::GzDecoder::new(&compressed[..]);
        let mut restored = Vec::new();
        std::io::Read::read_to_end(&mut decoder, &mut restored).unwrap();
        assert_eq!(restored, data);
    }
}
