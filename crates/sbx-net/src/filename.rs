//! Final-name derivation for downloaded assets.
//!
//! Preference order: RFC 5987 `filename*=` from Content-Disposition, then
//! plain `filename=`, then the last path segment of the URL, then a fixed
//! fallback. Every candidate is sanitized before use.

use reqwest::Url;

const FALLBACK: &str = "download.bin";

/// Replace filesystem-unsafe characters with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            other => other,
        })
        .collect()
}

/// Derive a name from the URL path alone (query string never contributes).
pub fn from_url(url: &Url) -> String {
    let last = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or("");
    if last.is_empty() {
        FALLBACK.to_string()
    } else {
        sanitize(last)
    }
}

/// Derive a name from a Content-Disposition header value, if it names one.
pub fn from_content_disposition(header: &str) -> Option<String> {
    let lower = header.to_ascii_lowercase();

    // filename*=charset''percent-encoded  (RFC 5987)
    if let Some(idx) = lower.find("filename*=") {
        let value = strip_param(&header[idx + "filename*=".len()..]);
        if let Some(ticks) = value.find("''") {
            let encoded = strip_quotes(&value[ticks + 2..]);
            if let Some(decoded) = percent_decode(encoded) {
                if !decoded.is_empty() {
                    return Some(sanitize(&decoded));
                }
            }
        }
    }

    if let Some(idx) = lower.find("filename=") {
        let value = strip_quotes(strip_param(&header[idx + "filename=".len()..]));
        if !value.is_empty() {
            return Some(sanitize(value));
        }
    }

    None
}

/// Pick the final on-disk name for a response: header hint first, URL second.
pub fn resolve_final(content_disposition: Option<&str>, url: &Url) -> String {
    content_disposition
        .and_then(from_content_disposition)
        .unwrap_or_else(|| from_url(url))
}

/// The partial-file name a URL maps to while its transfer is in flight.
pub fn partial_name(url: &Url) -> String {
    format!("{}.part", from_url(url))
}

fn strip_param(s: &str) -> &str {
    s.split(';').next().unwrap_or(s).trim()
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    if (s.starts_with('"') && s.ends_with('"') && s.len() >= 2)
        || (s.starts_with('\'') && s.ends_with('\'') && s.len() >= 2)
    {
        &s[1..s.len() - 1]
    } else {
        s
    }
}

/// Minimal %XX decoder; returns None on malformed escapes or invalid UTF-8.
fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn url_name_ignores_query() {
        assert_eq!(
            from_url(&url("http://x/media/clip.mp4?token=abc&x=1")),
            "clip.mp4"
        );
    }

    #[test]
    fn url_name_falls_back_on_empty_path() {
        assert_eq!(from_url(&url("http://x/")), FALLBACK);
        assert_eq!(from_url(&url("http://x")), FALLBACK);
    }

    #[test]
    fn sanitize_replaces_unsafe_characters() {
        assert_eq!(sanitize(r#"a\b/c:d*e?f"g<h>i|j"#), "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn content_disposition_plain() {
        assert_eq!(
            from_content_disposition(r#"attachment; filename="promo.mp4""#),
            Some("promo.mp4".to_string())
        );
    }

    #[test]
    fn content_disposition_rfc5987_wins() {
        assert_eq!(
            from_content_disposition(
                r#"attachment; filename="fallback.mp4"; filename*=UTF-8''sommer%20aktion.mp4"#
            ),
            Some("sommer aktion.mp4".to_string())
        );
    }

    #[test]
    fn content_disposition_without_name() {
        assert_eq!(from_content_disposition("inline"), None);
    }

    #[test]
    fn malformed_percent_escape_falls_through_to_plain() {
        // Broken filename* must not shadow a usable filename=
        assert_eq!(
            from_content_disposition(r#"attachment; filename*=UTF-8''bad%zz; filename=ok.mp4"#),
            Some("ok.mp4".to_string())
        );
    }

    #[test]
    fn partial_name_is_derived_from_url() {
        assert_eq!(partial_name(&url("http://x/a.mp4")), "a.mp4.part");
    }

    #[test]
    fn resolve_prefers_header_over_url() {
        let u = url("http://x/path/raw-name.bin");
        assert_eq!(
            resolve_final(Some(r#"attachment; filename="nice.mp4""#), &u),
            "nice.mp4"
        );
        assert_eq!(resolve_final(None, &u), "raw-name.bin");
    }
}
