//! HTTP transport for Smart Protocol v2 built on `reqwest`.
//!
//! Every request carries `Git-Protocol: version=2` and the configured
//! User-Agent. Authentication is either basic credentials or an opaque
//! token sent verbatim in `Authorization` (any `Bearer ` or `token `
//! prefix is the caller's responsibility). Status mapping: 401 is
//! `Unauthorized`, 404 is `RepoNotFound`, other non-2xx statuses are
//! `Transport` errors carrying the status code.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{RequestBuilder, StatusCode, Url};
use tokio_util::sync::CancellationToken;

use super::transport::{ProtocolStream, SmartTransport};
use crate::errors::GitError;

const UPLOAD_PACK_REQUEST: &str = "application/x-git-upload-pack-request";
const RECEIVE_PACK_REQUEST: &str = "application/x-git-receive-pack-request";
const RECEIVE_PACK_RESULT: &str = "application/x-git-receive-pack-result";

/// Credential material for the remote. Basic and token auth are mutually
/// exclusive.
#[derive(Debug, Clone)]
pub enum Auth {
    Basic {
        username: String,
        password: Option<String>,
    },
    /// Sent verbatim as the `Authorization` header value.
    Token(String),
}

/// `reqwest`-backed transport bound to one repository base URL.
#[derive(Debug)]
pub struct HttpTransport {
    base: Url,
    client: reqwest::Client,
    auth: Option<Auth>,
    user_agent: String,
    cancel: CancellationToken,
}

impl HttpTransport {
    pub fn new(
        base: Url,
        client: reqwest::Client,
        auth: Option<Auth>,
        user_agent: String,
        cancel: CancellationToken,
    ) -> Result<Self, GitError> {
        match base.scheme() {
            "http" | "https" => {}
            other => {
                return Err(GitError::InvalidArgument(format!(
                    "unsupported URL scheme `{other}` (expected http or https)"
                )));
            }
        }
        Ok(Self {
            base,
            client,
            auth,
            user_agent,
            cancel,
        })
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/{suffix}", self.base.as_str().trim_end_matches('/'))
    }

    fn apply_headers(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request
            .header("Git-Protocol", "version=2")
            .header(reqwest::header::USER_AGENT, &self.user_agent);
        match &self.auth {
            Some(Auth::Basic { username, password }) => {
                request.basic_auth(username, password.as_deref())
            }
            Some(Auth::Token(token)) => {
                request.header(reqwest::header::AUTHORIZATION, token.clone())
            }
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<reqwest::Response, GitError> {
        let response = tokio::select! {
            _ = self.cancel.cancelled() => return Err(GitError::Canceled),
            result = request.send() => {
                result.map_err(|e| GitError::NetworkError(e.to_string()))?
            }
        };
        map_status(&response)?;
        Ok(response)
    }
}

/// Map the response status to the error taxonomy.
fn map_status(response: &reqwest::Response) -> Result<(), GitError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::UNAUTHORIZED => Err(GitError::Unauthorized),
        StatusCode::NOT_FOUND => Err(GitError::RepoNotFound),
        other => Err(GitError::Transport {
            status: other.as_u16(),
            reason: other
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        }),
    }
}

#[async_trait]
impl SmartTransport for HttpTransport {
    async fn probe(&self) -> Result<(), GitError> {
        let url = self.endpoint("info/refs?service=git-upload-pack");
        tracing::debug!(%url, "capability probe");
        let request = self.apply_headers(self.client.get(&url));
        let response = self.send(request).await?;
        // The advertisement body is irrelevant for the probe.
        drop(response);
        Ok(())
    }

    async fn upload_pack(&self, body: Bytes) -> Result<ProtocolStream, GitError> {
        let url = self.endpoint("git-upload-pack");
        tracing::debug!(%url, bytes = body.len(), "upload-pack request");
        let request = self
            .apply_headers(self.client.post(&url))
            .header(reqwest::header::CONTENT_TYPE, UPLOAD_PACK_REQUEST)
            .body(body);
        let response = self.send(request).await?;

        let cancel = self.cancel.clone();
        let stream = response.bytes_stream().map(move |chunk| {
            if cancel.is_cancelled() {
                return Err(GitError::Canceled);
            }
            chunk.map_err(|e| GitError::NetworkError(e.to_string()))
        });
        Ok(Box::pin(stream))
    }

    async fn receive_pack(&self, body: ProtocolStream) -> Result<Bytes, GitError> {
        let url = self.endpoint("git-receive-pack");
        tracing::debug!(%url, "receive-pack request");
        let request = self
            .apply_headers(self.client.post(&url))
            .header(reqwest::header::CONTENT_TYPE, RECEIVE_PACK_REQUEST)
            .header(reqwest::header::ACCEPT, RECEIVE_PACK_RESULT)
            .body(reqwest::Body::wrap_stream(body));
        let response = self.send(request).await?;
        tokio::select! {
            _ = self.cancel.cancelled() => Err(GitError::Canceled),
            bytes = response.bytes() => {
                bytes.map_err(|e| GitError::NetworkError(e.to_string()))
            }
        }
    }
}
