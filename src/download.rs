//! HTTP fetches for provisioning.
//!
//! Downloads stream into a temp file next to the destination and are only
//! renamed into place once the whole body arrived, so a failed download
//! never leaves a partial file at the target path. Nothing here retries.

use std::fs;
use std::io::Write;
use std::path::Path;

use futures_util::StreamExt;
use serde::Deserialize;
use sha2::{Digest, Sha256};

use crate::common::files::{persist, temp_file_beside};
use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("setup-image/", env!("CARGO_PKG_VERSION"));

/// Default GitHub REST API endpoint.
pub const GITHUB_API_URL: &str = "https://api.github.com";

fn client(follow_redirects: bool) -> Result<reqwest::Client> {
    let policy = if follow_redirects {
        reqwest::redirect::Policy::limited(10)
    } else {
        reqwest::redirect::Policy::none()
    };
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(policy)
        .build()
        .map_err(|e| transport_error("<client>", e))
}

fn transport_error(url: &str, err: reqwest::Error) -> Error {
    Error::DownloadFailure {
        url: url.to_string(),
        status_code: None,
        message: err.to_string(),
    }
}

async fn get(client: &reqwest::Client, url: &str) -> Result<reqwest::Response> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| transport_error(url, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::DownloadFailure {
            url: url.to_string(),
            status_code: Some(status.as_u16()),
            message: status.canonical_reason().unwrap_or("Unknown error").to_string(),
        });
    }
    Ok(response)
}

/// Stream `url` to `dest`, replacing any existing file.
///
/// # Errors
/// [`Error::DownloadFailure`] with the status code on a non-2xx response,
/// or without one on a transport error. `dest` is untouched on failure.
pub async fn download_file(url: &str, dest: &Path, follow_redirects: bool) -> Result<()> {
    let client = client(follow_redirects)?;
    let response = get(&client, url).await?;

    let mut tmp = temp_file_beside(dest)?;
    let mut written: u64 = 0;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| transport_error(url, e))?;
        tmp.write_all(&chunk)
            .map_err(|e| Error::io("failed to write", dest, e))?;
        written += chunk.len() as u64;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| Error::io("failed to flush", dest, e))?;

    persist(tmp, dest, true)?;
    tracing::info!(url, path = %dest.display(), bytes = written, "downloaded");
    Ok(())
}

/// Fetch a small text resource into memory.
pub async fn fetch_text(url: &str) -> Result<String> {
    let client = client(true)?;
    get(&client, url)
        .await?
        .text()
        .await
        .map_err(|e| transport_error(url, e))
}

#[derive(Debug, Deserialize)]
struct Release {
    tag_name: String,
}

/// Resolve the tag of the newest published release of `repo` (`owner/name`).
pub async fn latest_release_tag(api_url: &str, repo: &str) -> Result<String> {
    let url = format!("{}/repos/{}/releases/latest", api_url.trim_end_matches('/'), repo);
    let client = client(true)?;
    let body = get(&client, &url)
        .await?
        .text()
        .await
        .map_err(|e| transport_error(&url, e))?;

    let release: Release = serde_json::from_str(&body).map_err(|e| Error::DownloadFailure {
        url: url.clone(),
        status_code: None,
        message: format!("invalid release metadata: {}", e),
    })?;
    Ok(release.tag_name)
}

/// Pick the digest for `file_name` out of `sha256sum` output.
///
/// Accepts both `<hex>  <name>` lines and a bare digest.
pub fn parse_sha256sum(text: &str, file_name: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        let digest = parts.next()?;
        match parts.next() {
            Some(name) if name.trim_start_matches('*') != file_name => None,
            _ if digest.len() == 64 && digest.chars().all(|c| c.is_ascii_hexdigit()) => {
                Some(digest.to_ascii_lowercase())
            }
            _ => None,
        }
    })
}

/// Verify SHA256 checksum of a downloaded file.
pub fn verify_sha256(path: &Path, expected: &str) -> Result<()> {
    let bytes = fs::read(path).map_err(|e| Error::io("failed to read", path, e))?;
    let actual = format!("{:x}", Sha256::digest(&bytes));
    if !actual.eq_ignore_ascii_case(expected) {
        return Err(Error::ChecksumMismatch {
            path: path.to_path_buf(),
            expected: expected.to_string(),
            actual,
        });
    }
    tracing::debug!(path = %path.display(), "checksum verified");
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_server {
    //! A throwaway HTTP/1.1 responder for download tests.

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// One canned response: request path, status line, extra headers, body.
    pub type Route = (&'static str, &'static str, &'static str, &'static str);

    /// Serve `routes` on an ephemeral port and return the base URL.
    pub async fn serve(routes: &'static [Route]) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buf.extend_from_slice(&chunk[..n]),
                    }
                }
                let request = String::from_utf8_lossy(&buf);
                let path = request.split_whitespace().nth(1).unwrap_or("/").to_string();
                let (status, headers, body) = routes
                    .iter()
                    .find(|(p, ..)| *p == path)
                    .map(|(_, s, h, b)| (*s, *h, *b))
                    .unwrap_or(("404 Not Found", "", "not found"));
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
                    status,
                    body.len(),
                    headers,
                    body
                );
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }
}
