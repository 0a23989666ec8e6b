//! Commit history listing: breadth-first walk over the commit graph with
//! author-time and path filters, paginated after filtering.

use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};

use super::Client;
use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::object::commit::Commit,
    protocol::transport::SmartTransport,
    storage::{store_or_ephemeral, with_object_store},
};

/// Default page size for [`Client::list_commits`].
pub const DEFAULT_PER_PAGE: usize = 30;
/// Hard cap on the page size.
pub const MAX_PER_PAGE: usize = 100;

/// Filters and pagination for [`Client::list_commits`].
#[derive(Debug, Clone, Default)]
pub struct ListCommitsOptions {
    /// Page size; defaults to 30, capped at 100.
    pub per_page: Option<usize>,
    /// 1-based page number; defaults to 1.
    pub page: Option<usize>,
    /// Only commits that change this path (file or directory).
    pub path: Option<String>,
    /// Only commits authored at or after this instant.
    pub since: Option<DateTime<Utc>>,
    /// Only commits authored at or before this instant.
    pub until: Option<DateTime<Utc>>,
}

impl<T: SmartTransport> Client<T> {
    /// Walk the commit graph breadth-first from `start`, applying the
    /// option filters, and return the requested page.
    ///
    /// For a linear history the result is in reverse chronological order.
    /// Time filters apply to the author timestamp; the path filter keeps a
    /// commit iff the path's resolved hash differs from its first parent
    /// (for root commits, iff the path resolves at all).
    pub async fn list_commits(
        &self,
        start: ObjectHash,
        options: ListCommitsOptions,
    ) -> Result<Vec<Commit>, GitError> {
        let per_page = options
            .per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE);
        let page = options.page.unwrap_or(1).max(1);
        let wanted = per_page
            .checked_mul(page)
            .ok_or_else(|| GitError::InvalidArgument("page overflow".to_string()))?;

        let path_filter = match &options.path {
            Some(raw) => Some(super::path::normalize_tree_path(raw)?),
            None => None,
        };

        let store = store_or_ephemeral();
        with_object_store(store.clone(), async {
            let mut matched: Vec<Commit> = Vec::new();
            let mut visited: HashSet<ObjectHash> = HashSet::new();
            let mut queue: VecDeque<ObjectHash> = VecDeque::new();
            queue.push_back(start);
            visited.insert(start);

            while let Some(hash) = queue.pop_front() {
                self.check_cancel()?;
                let commit = self.commit_read_through(&store, hash).await?;

                let mut keep = true;
                if let Some(since) = options.since {
                    keep &= commit.author.timestamp >= since.timestamp();
                }
                if let Some(until) = options.until {
                    keep &= commit.author.timestamp <= until.timestamp();
                }
                if keep && let Some(path) = &path_filter {
                    keep = self.commit_touches_path(&store, &commit, path).await?;
                }
                if keep {
                    matched.push(commit.clone());
                    if matched.len() >= wanted {
                        break;
                    }
                }

                for parent in &commit.parent_commit_ids {
                    if visited.insert(*parent) {
                        queue.push_back(*parent);
                    }
                }
            }

            Ok(matched
                .into_iter()
                .skip(per_page * (page - 1))
                .take(per_page)
                .collect())
        })
        .await
    }

    /// Whether `commit` changes `path` relative to its first parent.
    async fn commit_touches_path(
        &self,
        store: &std::sync::Arc<dyn crate::storage::ObjectStore>,
        commit: &Commit,
        path: &str,
    ) -> Result<bool, GitError> {
        let current = self
            .resolve_path(store, commit.tree_id, path)
            .await?
            .map(|item| item.id)
            .unwrap_or(ObjectHash::ZERO);

        match commit.first_parent() {
            None => Ok(!current.is_zero()),
            Some(parent_hash) => {
                let parent = self.commit_read_through(store, parent_hash).await?;
                let previous = self
                    .resolve_path(store, parent.tree_id, path)
                    .await?
                    .map(|item| item.id)
                    .unwrap_or(ObjectHash::ZERO);
                Ok(current != previous)
            }
        }
    }
}
