// SplitStream Downloader - source.rs

use std::time::Duration;

use reqwest::{header, Client, StatusCode};
use thiserror::Error;
use url::Url;

pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// What the metadata request learned about the origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub total_bytes: u64,
    /// Server-suggested name from the Content-Disposition header, unsanitized.
    pub file_name: Option<String>,
}

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("metadata request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("metadata request returned status {0}")]
    Unsuccessful(StatusCode),
    #[error("cannot determine file size: server did not declare one")]
    NoContentLength,
}

impl ProbeError {
    /// A missing size header is a dead end; everything else is worth another
    /// `start` call.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ProbeError::NoContentLength)
    }
}

/// Asks the origin for the file's size and suggested name via a HEAD request
/// with a 10-second deadline.
pub async fn inspect(client: &Client, url: &Url) -> Result<SourceInfo, ProbeError> {
    let response = client
        .head(url.clone())
        .timeout(PROBE_TIMEOUT)
        .send()
        .await?;
    if !response.status().is_success() {
        return Err(ProbeError::Unsuccessful(response.status()));
    }

    let total_bytes = response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|s| s.parse().ok())
        .ok_or(ProbeError::NoContentLength)?;

    let file_name = response
        .headers()
        .get(header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(disposition_file_name);

    Ok(SourceInfo {
        total_bytes,
        file_name,
    })
}

/// Pulls the `filename` parameter out of a Content-Disposition value,
/// accepting both `filename="x"` and `filename=x`.
fn disposition_file_name(value: &str) -> Option<String> {
    for part in value.split(';') {
        let part = part.trim();
        let is_filename = part
            .get(..9)
            .map(|prefix| prefix.eq_ignore_ascii_case("filename="))
            .unwrap_or(false);
        if is_filename {
            let raw = part[9..].trim().trim_matches('"');
            if !raw.is_empty() {
                return Some(raw.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_filename() {
        assert_eq!(
            disposition_file_name(r#"attachment; filename="report final.pdf""#),
            Some("report final.pdf".to_string())
        );
    }

    #[test]
    fn parses_bare_filename() {
        assert_eq!(
            disposition_file_name("attachment; filename=data.iso"),
            Some("data.iso".to_string())
        );
    }

    #[test]
    fn ignores_values_without_filename() {
        assert_eq!(disposition_file_name("inline"), None);
        assert_eq!(disposition_file_name("attachment; filename="), None);
        // The RFC 5987 form carries an encoding prefix this engine does not
        // interpret, so it is skipped rather than mangled.
        assert_eq!(
            disposition_file_name("attachment; filename*=UTF-8''x.pdf"),
            None
        );
    }
}
