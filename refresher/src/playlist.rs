use async_trait::async_trait;
use mosaic_common::channel::Channel;
use std::time::Duration;
use tracing::debug;

use crate::USER_AGENT;

#[derive(Debug, thiserror::Error)]
pub enum PlaylistError {
    #[error("failed to build HTTP client: {0}")]
    Client(reqwest::Error),
    #[error("request to {0} failed: {1}")]
    Request(String, reqwest::Error),
    #[error("request to {0} failed: HTTP status {1}")]
    Status(String, u16),
    #[error("failed to read {0}: {1}")]
    Read(String, std::io::Error),
    #[error("empty playlist")]
    Empty,
    #[error("invalid playlist format")]
    InvalidFormat,
}

/// Produces the ordered channel list of one playlist source.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn fetch_playlist(&self, source: &str) -> Result<Vec<Channel>, PlaylistError>;
}

/// Loads M3U playlists over HTTP(S), or from disk for any other source string.
pub struct PlaylistFetcher {
    client: reqwest::Client,
}

impl PlaylistFetcher {
    pub fn new(request_timeout: Duration) -> Result<Self, PlaylistError> {
        let client = client_builder(request_timeout)
            .build()
            .map_err(PlaylistError::Client)?;
        Ok(Self { client })
    }

    async fn download(&self, url: &str) -> Result<String, PlaylistError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PlaylistError::Request(url.to_string(), e))?;

        // Redirects are already followed by reqwest; anything but 200 is a failure.
        if response.status() != reqwest::StatusCode::OK {
            return Err(PlaylistError::Status(
                url.to_string(),
                response.status().as_u16(),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| PlaylistError::Request(url.to_string(), e))
    }
}

#[async_trait]
impl PlaylistSource for PlaylistFetcher {
    async fn fetch_playlist(&self, source: &str) -> Result<Vec<Channel>, PlaylistError> {
        let body = if is_remote(source) {
            self.download(source).await?
        } else {
            tokio::fs::read_to_string(source)
                .await
                .map_err(|e| PlaylistError::Read(source.to_string(), e))?
        };

        let channels = parse_playlist(&body)?;
        debug!(source, channels = channels.len(), "playlist parsed");
        Ok(channels)
    }
}

fn client_builder(request_timeout: Duration) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .user_agent(USER_AGENT)
}

fn is_remote(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Parse an extended M3U document into its channels, in document order.
///
/// An `#EXTINF` line names the next channel; the first following line that is neither blank nor
/// a `#` directive is its address. Entries that never receive an address are dropped.
pub fn parse_playlist(source: &str) -> Result<Vec<Channel>, PlaylistError> {
    let mut lines = source.lines();

    let header = lines.next().ok_or(PlaylistError::Empty)?;
    if !header.trim_start_matches('\u{feff}').starts_with("#EXTM3U") {
        return Err(PlaylistError::InvalidFormat);
    }

    let mut channels = Vec::new();
    let mut pending_name: Option<String> = None;

    for line in lines {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            continue;
        }

        if line.starts_with("#EXTINF") {
            if let Some(name) = pending_name.replace(extinf_name(line)) {
                debug!(channel = %name, "playlist entry without address, dropping");
            }
            continue;
        }

        if line.starts_with('#') {
            continue;
        }

        if let Some(name) = pending_name.take() {
            channels.push(Channel::new(name, line.trim()));
        }
    }

    if let Some(name) = pending_name {
        debug!(channel = %name, "playlist entry without address, dropping");
    }

    Ok(channels)
}

/// Channel title of an `#EXTINF` line: the text after the first comma that is neither inside
/// double quotes nor escaped with a backslash.
///
/// Falls back to the last space or `=` separated attribute token when the title is empty.
fn extinf_name(line: &str) -> String {
    let mut quoted = false;
    let mut escaped = false;
    let mut tokens: Vec<&str> = Vec::new();
    let mut token_start = 0;
    let mut token_end = line.len();

    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '"' => quoted = !quoted,
            ',' if !quoted => {
                let title = line[i + 1..].trim();
                if !title.is_empty() {
                    return title.to_string();
                }
                token_end = i;
                break;
            }
            ' ' | '=' if !quoted => {
                tokens.push(&line[token_start..i]);
                token_start = i + 1;
            }
            _ => {}
        }
    }
    tokens.push(&line[token_start..token_end]);

    tokens
        .into_iter()
        .rev()
        .find(|t| !t.is_empty())
        .unwrap_or_default()
        .trim_matches('"')
        .to_string()
}
