//! HTTP fetch layer: retries, backoff, `Retry-After` and explicit
//! content decompression.

use std::io::Read;
use std::thread;
use std::time::Duration;

use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, RETRY_AFTER};
use reqwest::StatusCode;

use crate::config::{ACCEPT_ENCODINGS, ACCEPT_XML, HTTP_TIMEOUT_SECS, USER_AGENT};
use crate::error::{HarvesterError, Result};

/// Create a configured HTTP client.
///
/// The client advertises XML-preferring `Accept` and explicit
/// `Accept-Encoding` headers on every request; response bodies are
/// decompressed by [`fetch`], not by reqwest.
pub fn create_client() -> Result<Client> {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_XML));
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static(ACCEPT_ENCODINGS));

    let client = Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .user_agent(USER_AGENT)
        .default_headers(headers)
        .build()?;
    Ok(client)
}

/// Perform one GET with bounded retries and return the decoded body
/// plus the response content type.
///
/// Waits `backoff * attempt_number` seconds between attempts. A 429 or
/// 503 carrying a valid numeric `Retry-After` header raises the wait to
/// at least that many seconds. On the final attempt the error surfaces
/// instead of being swallowed. Decompression failures are terminal and
/// never retried.
pub fn fetch(client: &Client, url: &str, retries: u32, backoff: f64) -> Result<(Vec<u8>, String)> {
    let attempts = retries.max(1);
    let mut last_error: Option<String> = None;

    for attempt in 1..=attempts {
        let response = match client.get(url).send() {
            Ok(response) => response,
            Err(e) => {
                if attempt == attempts {
                    return Err(HarvesterError::Http(e));
                }
                let wait = backoff * f64::from(attempt);
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = attempts,
                    wait_secs = wait,
                    "network error, will retry"
                );
                last_error = Some(e.to_string());
                sleep_secs(wait);
                continue;
            }
        };

        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            if attempt == attempts {
                last_error = Some(format!("HTTP {status}"));
                break;
            }
            let wait = retry_wait(status, response.headers(), backoff, attempt);
            tracing::warn!(
                status = %status,
                attempt,
                max_attempts = attempts,
                wait_secs = wait,
                "HTTP error, will retry"
            );
            last_error = Some(format!("HTTP {status}"));
            sleep_secs(wait);
            continue;
        }

        let content_type = header_str(response.headers(), "content-type");
        let content_encoding = header_str(response.headers(), "content-encoding");

        let raw = match response.bytes() {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                if attempt == attempts {
                    return Err(HarvesterError::Http(e));
                }
                let wait = backoff * f64::from(attempt);
                tracing::warn!(error = %e, attempt, wait_secs = wait, "body read failed, will retry");
                last_error = Some(e.to_string());
                sleep_secs(wait);
                continue;
            }
        };

        // Decompression happens after the full body is read
        let body = decode_body(raw, &content_encoding)?;

        tracing::info!(
            status = %status,
            content_type = %content_type,
            content_encoding = %if content_encoding.is_empty() { "none" } else { &content_encoding },
            bytes = body.len(),
            "response received"
        );
        return Ok((body, content_type));
    }

    Err(HarvesterError::RetriesExhausted {
        attempts,
        message: last_error.unwrap_or_else(|| "unknown error".to_string()),
    })
}

/// Backoff wait for an HTTP error status, honoring `Retry-After` on
/// 429/503 when it is a valid number of seconds.
fn retry_wait(status: StatusCode, headers: &HeaderMap, backoff: f64, attempt: u32) -> f64 {
    let wait = backoff * f64::from(attempt);
    if matches!(status.as_u16(), 429 | 503) {
        if let Some(retry_after) = parse_retry_after(headers) {
            return wait.max(retry_after);
        }
    }
    wait
}

/// Read `Retry-After` as seconds; anything non-numeric falls back to
/// the regular backoff schedule.
fn parse_retry_after(headers: &HeaderMap) -> Option<f64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| *secs >= 0.0)
}

/// Decode a response body per its `Content-Encoding`.
fn decode_body(raw: Vec<u8>, encoding: &str) -> Result<Vec<u8>> {
    match encoding.to_ascii_lowercase().as_str() {
        "" | "identity" => Ok(raw),
        "gzip" => {
            let mut out = Vec::new();
            GzDecoder::new(raw.as_slice())
                .read_to_end(&mut out)
                .map_err(|source| HarvesterError::Decompress {
                    encoding: "gzip".to_string(),
                    source,
                })?;
            Ok(out)
        }
        "deflate" | "zlib" => {
            // Some servers send a zlib stream, others a raw deflate stream
            let mut out = Vec::new();
            if ZlibDecoder::new(raw.as_slice()).read_to_end(&mut out).is_ok() {
                return Ok(out);
            }
            out.clear();
            DeflateDecoder::new(raw.as_slice())
                .read_to_end(&mut out)
                .map_err(|source| HarvesterError::Decompress {
                    encoding: "deflate".to_string(),
                    source,
                })?;
            Ok(out)
        }
        other => {
            tracing::warn!(encoding = other, "unknown content encoding, passing body through");
            Ok(raw)
        }
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn sleep_secs(secs: f64) {
    thread::sleep(Duration::from_secs_f64(secs.max(0.0)));
}
