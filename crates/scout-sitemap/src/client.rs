use std::io::Read;
use std::time::Duration;

use flate2::read::GzDecoder;
use reqwest::{Client, StatusCode};
use scout_core::ScoutError;
use tracing::{debug, warn};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

pub fn build_client(timeout: Duration) -> Result<Client, ScoutError> {
    Client::builder()
        .timeout(timeout)
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
        .build()
        .map_err(|e| ScoutError::Network(e.to_string()))
}

/// Fetch `url`, retrying on 5xx responses or connection errors with a
/// linear backoff taken from `retry_delays` (one retry per delay, so
/// `retry_delays.len() + 1` attempts total), decompressing a gzip body
/// transparently (sniffed by `.xml.gz` file extension first, falling
/// back to the gzip magic bytes — either signal is sufficient).
pub async fn fetch_text(client: &Client, url: &str, retry_delays: &[Duration]) -> Result<String, ScoutError> {
    let mut last_err = None;

    for (attempt, delay) in std::iter::once(None)
        .chain(retry_delays.iter().copied().map(Some))
        .enumerate()
    {
        if let Some(delay) = delay {
            debug!(url, attempt, delay_secs = delay.as_secs(), "retrying sitemap fetch");
            tokio::time::sleep(delay).await;
        }

        match client.get(url).send().await {
            Ok(resp) if resp.status().is_server_error() => {
                last_err = Some(ScoutError::Network(format!(
                    "{} returned {}",
                    url,
                    resp.status()
                )));
                continue;
            }
            Ok(resp) if resp.status() == StatusCode::OK => {
                let bytes = resp.bytes().await.map_err(|e| ScoutError::Network(e.to_string()))?;
                return Ok(decompress_if_gzip(url, &bytes));
            }
            Ok(resp) => {
                // A non-5xx, non-200 status (4xx) is not transient; don't retry.
                return Err(ScoutError::Network(format!("{} returned {}", url, resp.status())));
            }
            Err(e) => {
                last_err = Some(ScoutError::Network(e.to_string()));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| ScoutError::Network(format!("{url} failed with no response"))))
}

fn decompress_if_gzip(url: &str, bytes: &[u8]) -> String {
    let looks_gz_ext = url.ends_with(".gz");
    let looks_gz_magic = bytes.len() >= 2 && bytes[0..2] == GZIP_MAGIC;

    if looks_gz_ext || looks_gz_magic {
        let mut decoder = GzDecoder::new(bytes);
        let mut out = String::new();
        if decoder.read_to_string(&mut out).is_ok() {
            return out;
        }
        warn!(url, "gzip magic/extension matched but inflate failed, using raw bytes");
    }

    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn detects_gzip_by_magic_bytes_without_extension() {
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(b"<urlset></urlset>").unwrap();
        let gz_bytes = encoder.finish().unwrap();

        let out = decompress_if_gzip("https://example.hr/sitemap-weird-name", &gz_bytes);
        assert_eq!(out, "<urlset></urlset>");
    }

    #[test]
    fn plain_text_passes_through() {
        let out = decompress_if_gzip("https://example.hr/sitemap.xml", b"<urlset></urlset>");
        assert_eq!(out, "<urlset></urlset>");
    }
}
