//! High-level client operations over the Smart HTTP v2 transport.
//!
//! A [`Client`] is stateless: it holds connection configuration only, and
//! every operation talks to the remote from scratch. Caching across the
//! round-trips of one logical operation goes through the ambient object
//! store (see [`crate::storage`]).

pub mod commits;
pub mod diff;
pub mod fetch;
pub mod path;
pub mod refs;
pub mod writer;

use std::time::Duration;

use reqwest::Url;
use tokio_util::sync::CancellationToken;

pub use commits::ListCommitsOptions;
pub use diff::{CommitDiffEntry, DiffStatus, FlatTree, FlatTreeEntry};
pub use refs::Ref;
pub use writer::StagedWriter;

use crate::{
    errors::GitError,
    internal::pack::encode::StorageMode,
    protocol::{
        http::{Auth, HttpTransport},
        transport::SmartTransport,
    },
};

/// Default User-Agent advertised on every request.
pub const DEFAULT_USER_AGENT: &str = "nanogit/0";

/// Connection configuration for [`Client::new`].
#[derive(Default)]
pub struct ClientOptions {
    /// User-Agent header; defaults to [`DEFAULT_USER_AGENT`].
    pub user_agent: Option<String>,
    /// Basic credentials. Mutually exclusive with `token`.
    pub basic_auth: Option<(String, Option<String>)>,
    /// Opaque `Authorization` header value, sent verbatim. Mutually
    /// exclusive with `basic_auth`.
    pub token: Option<String>,
    /// Per-request timeout for the HTTP client.
    pub timeout: Option<Duration>,
    /// Cancellation signal honored at every transport suspension point.
    pub cancel: Option<CancellationToken>,
    /// Staging policy for outgoing packfiles.
    pub pack_storage: StorageMode,
}

/// Stateless Git Smart HTTP v2 client bound to one repository URL.
#[derive(Debug)]
pub struct Client<T: SmartTransport = HttpTransport> {
    transport: T,
    user_agent: String,
    cancel: CancellationToken,
    pack_storage: StorageMode,
}

impl Client<HttpTransport> {
    /// Build a client for `url` (scheme must be http or https).
    pub fn new(url: &str, options: ClientOptions) -> Result<Self, GitError> {
        if options.basic_auth.is_some() && options.token.is_some() {
            return Err(GitError::InvalidArgument(
                "basic_auth and token are mutually exclusive".to_string(),
            ));
        }
        let base = Url::parse(url)
            .map_err(|e| GitError::InvalidArgument(format!("invalid URL `{url}`: {e}")))?;

        let user_agent = options
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let cancel = options.cancel.unwrap_or_default();

        let mut http = reqwest::Client::builder();
        if let Some(timeout) = options.timeout {
            http = http.timeout(timeout);
        }
        let http = http
            .build()
            .map_err(|e| GitError::NetworkError(e.to_string()))?;

        let auth = match (options.basic_auth, options.token) {
            (Some((username, password)), None) => Some(Auth::Basic { username, password }),
            (None, Some(token)) => Some(Auth::Token(token)),
            _ => None,
        };

        let transport =
            HttpTransport::new(base, http, auth, user_agent.clone(), cancel.clone())?;
        Ok(Client {
            transport,
            user_agent,
            cancel,
            pack_storage: options.pack_storage,
        })
    }
}

impl<T: SmartTransport> Client<T> {
    /// Build a client over an arbitrary transport. Used by tests and by
    /// embedders with their own HTTP stack.
    pub fn with_transport(transport: T, user_agent: String, pack_storage: StorageMode) -> Self {
        Client {
            transport,
            user_agent,
            cancel: CancellationToken::new(),
            pack_storage,
        }
    }

    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub(crate) fn pack_storage(&self) -> StorageMode {
        self.pack_storage
    }

    pub(crate) fn check_cancel(&self) -> Result<(), GitError> {
        if self.cancel.is_cancelled() {
            return Err(GitError::Canceled);
        }
        Ok(())
    }

    /// Whether the configured credentials can reach the repository. A 401
    /// maps to `Ok(false)` rather than an error.
    pub async fn is_authorized(&self) -> Result<bool, GitError> {
        match self.transport.probe().await {
            Ok(()) => Ok(true),
            Err(GitError::Unauthorized) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Whether the repository exists. A 404 maps to `Ok(false)` rather
    /// than an error.
    pub async fn repo_exists(&self) -> Result<bool, GitError> {
        match self.transport.probe().await {
            Ok(()) => Ok(true),
            Err(GitError::RepoNotFound) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
