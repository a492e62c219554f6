//! Redirect resolution: turn a start URL into the content-bearing endpoint.
//!
//! Some catalog entries point at share links that bounce through several
//! hosts before the real file. We chase those up front with header-only
//! probes so the transfer engine's ranged requests always hit the final
//! endpoint (a 302 answering a `Range` request would otherwise defeat
//! resumption).

use reqwest::{header, Client, StatusCode, Url};
use sbx_core::{SbxError, SbxResult};
use tracing::{debug, trace};

/// Hard cap on hops; past this we assume a loop.
const MAX_HOPS: u32 = 10;

/// Follow redirects from `start` and return the final URL.
///
/// The client must have redirect following disabled; each Location is
/// resolved relative to the URL that produced it. A 405/403 answer to the
/// HEAD probe is retried once per hop with a minimal ranged GET, since some
/// endpoints reject HEAD but still disclose their redirect that way.
pub async fn resolve(client: &Client, start: &str) -> SbxResult<Url> {
    let mut current =
        Url::parse(start).map_err(|e| SbxError::Protocol(format!("bad url {start}: {e}")))?;

    for hop in 0..MAX_HOPS {
        let response = client
            .head(current.clone())
            .header(header::ACCEPT, "*/*")
            .header(header::ACCEPT_ENCODING, "identity")
            .send()
            .await
            .map_err(|e| SbxError::Network(format!("probe {current}: {e}")))?;

        let status = response.status();
        if status.is_redirection() {
            if let Some(next) = location_of(&response, &current)? {
                trace!(hop, from = %current, to = %next, "following redirect");
                current = next;
                continue;
            }
            // Redirect status without a usable Location: treat as terminal.
            return Ok(current);
        }

        if status == StatusCode::METHOD_NOT_ALLOWED || status == StatusCode::FORBIDDEN {
            // HEAD rejected; a one-byte ranged GET reveals the true endpoint.
            let probe = client
                .get(current.clone())
                .header(header::RANGE, "bytes=0-0")
                .header(header::ACCEPT, "*/*")
                .header(header::ACCEPT_ENCODING, "identity")
                .send()
                .await
                .map_err(|e| SbxError::Network(format!("ranged probe {current}: {e}")))?;

            if probe.status().is_redirection() {
                if let Some(next) = location_of(&probe, &current)? {
                    debug!(hop, from = %current, to = %next, "redirect found via ranged probe");
                    current = next;
                    continue;
                }
            }
            return Ok(current);
        }

        return Ok(current);
    }

    Err(SbxError::TooManyRedirects(MAX_HOPS))
}

/// Extract and resolve the Location header. Empty or whitespace-only values
/// count as "no redirect".
fn location_of(response: &reqwest::Response, base: &Url) -> SbxResult<Option<Url>> {
    let Some(raw) = response.headers().get(header::LOCATION) else {
        return Ok(None);
    };
    let text = raw
        .to_str()
        .map_err(|e| SbxError::Protocol(format!("non-text Location header: {e}")))?
        .trim();
    if text.is_empty() {
        return Ok(None);
    }
    let next = base
        .join(text)
        .map_err(|e| SbxError::Protocol(format!("bad Location {text:?}: {e}")))?;
    Ok(Some(next))
}
