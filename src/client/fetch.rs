//! The v2 `fetch` command and the object read operations built on it.
//!
//! A fetch response embeds a packfile in sideband-1 frames of its
//! `packfile` section. The orchestrator feeds those frames through a
//! channel into the blocking pack decoder as they arrive, so the response
//! is never buffered whole; decoded objects land in the ambient object
//! store where the higher-level walks (flat tree, diff, commit listing)
//! pick them up.

use std::sync::Arc;

use bytes::BytesMut;
use futures::StreamExt;

use super::Client;
use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::{
        object::{
            blob::Blob,
            commit::Commit,
            tree::{Tree, TreeItem},
            types::ObjectType,
        },
        pack::{channel_reader::ChannelReader, decode, entry::Entry},
    },
    protocol::{
        pkt_line::{
            self, Pkt, SideBand, add_delim_pkt, add_flush_pkt, add_pkt_line_string,
            split_sideband,
        },
        transport::{PktReader, SmartTransport},
    },
    storage::{ObjectStore, store_or_ephemeral},
};

/// Blob fetches are batched in want-sets of this size.
pub(crate) const BLOB_BATCH_SIZE: usize = 50;
/// Concurrent batch cap for batched blob fetches.
pub(crate) const BLOB_BATCH_PARALLELISM: usize = 5;

/// Arguments for one `fetch` round-trip.
#[derive(Debug, Clone, Default)]
pub(crate) struct FetchRequest {
    pub wants: Vec<ObjectHash>,
    /// Mark each want as shallow (single-commit fetches).
    pub shallow: bool,
    /// `deepen <n>` history depth bound.
    pub deepen: Option<u32>,
    /// `filter blob:none` to suppress blob payloads.
    pub filter_blob_none: bool,
}

impl FetchRequest {
    pub(crate) fn want(hash: ObjectHash) -> Self {
        FetchRequest {
            wants: vec![hash],
            ..Default::default()
        }
    }

    fn to_payload(&self) -> bytes::Bytes {
        let mut body = BytesMut::new();
        add_pkt_line_string(&mut body, "command=fetch\n".to_string());
        add_pkt_line_string(&mut body, "object-format=sha1\n".to_string());
        add_delim_pkt(&mut body);
        add_pkt_line_string(&mut body, "no-progress\n".to_string());
        if self.filter_blob_none {
            add_pkt_line_string(&mut body, "filter blob:none\n".to_string());
        }
        for want in &self.wants {
            add_pkt_line_string(&mut body, format!("want {want}\n"));
        }
        if self.shallow {
            for want in &self.wants {
                add_pkt_line_string(&mut body, format!("shallow {want}\n"));
            }
        }
        if let Some(depth) = self.deepen {
            add_pkt_line_string(&mut body, format!("deepen {depth}\n"));
        }
        add_pkt_line_string(&mut body, "done\n".to_string());
        add_flush_pkt(&mut body);
        body.freeze()
    }
}

impl<T: SmartTransport> Client<T> {
    /// Run one fetch round-trip, streaming the embedded pack into the
    /// decoder. Decoded entries are added to `store` and returned.
    pub(crate) async fn fetch_into_store(
        &self,
        request: &FetchRequest,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Vec<Entry>, GitError> {
        self.check_cancel()?;
        let response = self.transport().upload_pack(request.to_payload()).await?;
        let mut reader = PktReader::new(response);

        let (tx, rx) = std::sync::mpsc::channel::<bytes::Bytes>();
        let decode_store = store.clone();
        let decode_task = tokio::task::spawn_blocking(move || {
            decode::decode(ChannelReader::new(rx), Some(decode_store.as_ref()))
        });

        // Pump the response: section lines until `packfile`, then sideband
        // frames into the decoder channel.
        let mut in_packfile = false;
        let mut saw_packfile_section = false;
        let mut pump_err: Option<GitError> = None;
        loop {
            let pkt = match reader.next_pkt().await {
                Ok(pkt) => pkt,
                Err(e) => {
                    pump_err = Some(e);
                    break;
                }
            };
            match pkt {
                None | Some(Pkt::Flush) | Some(Pkt::ResponseEnd) => break,
                Some(Pkt::Delim) => continue,
                Some(Pkt::Data(payload)) => {
                    if !in_packfile {
                        if let Some(err) = pkt_line::check_err_pkt(&payload) {
                            pump_err = Some(err);
                            break;
                        }
                        let line = String::from_utf8_lossy(&payload);
                        let line = line.trim_end();
                        match line {
                            "packfile" => {
                                in_packfile = true;
                                saw_packfile_section = true;
                            }
                            "acknowledgments" | "shallow-info" => {
                                tracing::debug!(section = line, "fetch response section");
                            }
                            other => {
                                // NAK / ACK / shallow / unshallow lines
                                tracing::debug!(line = other, "fetch response line");
                            }
                        }
                    } else {
                        match split_sideband(payload) {
                            Ok((SideBand::PackfileData, data)) => {
                                if tx.send(data).is_err() {
                                    // Decoder bailed; its error surfaces below.
                                    break;
                                }
                            }
                            Ok((SideBand::Progress, text)) => {
                                tracing::debug!(
                                    progress = %String::from_utf8_lossy(&text).trim_end(),
                                    "remote progress"
                                );
                            }
                            Ok((SideBand::Fatal, text)) => {
                                pump_err = Some(GitError::RemoteProtocol(
                                    String::from_utf8_lossy(&text).trim_end().to_string(),
                                ));
                                break;
                            }
                            Err(e) => {
                                pump_err = Some(e);
                                break;
                            }
                        }
                    }
                }
            }
        }
        drop(tx);

        let decode_result = decode_task
            .await
            .map_err(|e| GitError::NetworkError(format!("pack decode task failed: {e}")))?;
        if let Some(err) = pump_err {
            return Err(err);
        }
        if !saw_packfile_section {
            // A fetch that acked nothing returns no pack at all.
            return Ok(Vec::new());
        }
        let pack = decode_result?;
        tracing::debug!(objects = pack.number, "fetch pack decoded");
        Ok(pack.objects)
    }

    /// Fetch a single blob by hash.
    ///
    /// The store is consulted first; a fresh fetch expects exactly one
    /// object, the requested blob.
    pub async fn get_blob(&self, hash: ObjectHash) -> Result<Blob, GitError> {
        let store = store_or_ephemeral();
        if let Some(entry) = store.get(&hash)? {
            return entry.to_blob();
        }

        let entries = self
            .fetch_into_store(&FetchRequest::want(hash), store.clone())
            .await?;
        if entries.len() > 1 {
            return Err(GitError::UnexpectedObjectCount {
                expected: 1,
                actual: entries.len(),
            });
        }
        match store.get(&hash)? {
            Some(entry) => entry.to_blob(),
            None => Err(GitError::ObjectNotFound(hash.to_string())),
        }
    }

    /// Fetch a single commit by hash using a shallow, blob-less fetch.
    ///
    /// Servers frequently include the commit's trees despite the filter;
    /// those are accepted and stored. Any blob or tag in the response is a
    /// protocol violation.
    pub async fn get_commit(&self, hash: ObjectHash) -> Result<Commit, GitError> {
        let store = store_or_ephemeral();
        if let Some(entry) = store.get(&hash)? {
            return entry.to_commit();
        }

        let request = FetchRequest {
            wants: vec![hash],
            shallow: true,
            deepen: Some(1),
            filter_blob_none: true,
        };
        let entries = self.fetch_into_store(&request, store.clone()).await?;

        let mut commits = 0usize;
        for entry in &entries {
            match entry.obj_type {
                ObjectType::Commit => commits += 1,
                ObjectType::Tree => {}
                other => {
                    return Err(GitError::UnexpectedObjectType {
                        expected: "commit".to_string(),
                        actual: other.to_string(),
                    });
                }
            }
        }
        if commits > 1 {
            return Err(GitError::UnexpectedObjectCount {
                expected: 1,
                actual: commits,
            });
        }
        match store.get(&hash)? {
            Some(entry) => entry.to_commit(),
            None => Err(GitError::ObjectNotFound(hash.to_string())),
        }
    }

    /// Fetch a single tree by hash. The server may return every reachable
    /// tree; the requested one is returned and the rest stay in the store.
    pub async fn get_tree(&self, hash: ObjectHash) -> Result<Tree, GitError> {
        let store = store_or_ephemeral();
        if let Some(entry) = store.get(&hash)? {
            return entry.to_tree();
        }

        let request = FetchRequest {
            wants: vec![hash],
            filter_blob_none: true,
            ..Default::default()
        };
        self.fetch_into_store(&request, store.clone()).await?;
        match store.get(&hash)? {
            Some(entry) => entry.to_tree(),
            None => Err(GitError::ObjectNotFound(hash.to_string())),
        }
    }

    /// Read a tree through the ambient store, fetching on a miss.
    pub(crate) async fn tree_read_through(
        &self,
        store: &Arc<dyn ObjectStore>,
        hash: ObjectHash,
    ) -> Result<Tree, GitError> {
        match store.get(&hash)? {
            Some(entry) => entry.to_tree(),
            None => self.get_tree(hash).await,
        }
    }

    /// Read a commit through the ambient store, fetching on a miss.
    pub(crate) async fn commit_read_through(
        &self,
        store: &Arc<dyn ObjectStore>,
        hash: ObjectHash,
    ) -> Result<Commit, GitError> {
        match store.get(&hash)? {
            Some(entry) => entry.to_commit(),
            None => self.get_commit(hash).await,
        }
    }

    /// Resolve a slash-separated path from a root tree to its entry.
    /// Returns None when any component is absent or a non-tree appears
    /// mid-path.
    pub(crate) async fn resolve_path(
        &self,
        store: &Arc<dyn ObjectStore>,
        root_tree: ObjectHash,
        path: &str,
    ) -> Result<Option<TreeItem>, GitError> {
        let mut current = root_tree;
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        while let Some(component) = components.next() {
            let tree = self.tree_read_through(store, current).await?;
            let Some(item) = tree.entry(component) else {
                return Ok(None);
            };
            if components.peek().is_none() {
                return Ok(Some(item.clone()));
            }
            if !item.mode.is_tree() {
                return Ok(None);
            }
            current = item.id;
        }
        // Empty path: the root tree itself.
        Ok(Some(TreeItem::new(
            crate::internal::object::tree::TreeItemMode::Tree,
            root_tree,
            String::new(),
        )))
    }

    /// Resolve `path` under `root_tree` and fetch the blob it names.
    pub async fn get_blob_by_path(
        &self,
        root_tree: ObjectHash,
        path: &str,
    ) -> Result<Blob, GitError> {
        let store = store_or_ephemeral();
        crate::storage::with_object_store(store.clone(), async {
            match self.resolve_path(&store, root_tree, path).await? {
                Some(item) if !item.mode.is_tree() => self.get_blob(item.id).await,
                Some(_) => Err(GitError::UnexpectedObjectType {
                    expected: "blob".to_string(),
                    actual: "tree".to_string(),
                }),
                None => Err(GitError::ObjectNotFound(path.to_string())),
            }
        })
        .await
    }

    /// Fetch a large blob want-set in bounded-parallel batches.
    ///
    /// Per-batch transport errors do not fail the operation: missing blobs
    /// are retried in half-size batches, then individually. Blobs still
    /// missing after that surface as `ObjectNotFound`.
    pub async fn fetch_blobs_batched(&self, hashes: &[ObjectHash]) -> Result<(), GitError> {
        let store = store_or_ephemeral();

        let mut batch_size = BLOB_BATCH_SIZE;
        loop {
            let mut missing = Vec::new();
            for hash in hashes {
                if !store.has(hash)? {
                    missing.push(*hash);
                }
            }
            if missing.is_empty() {
                return Ok(());
            }
            self.check_cancel()?;

            let batches: Vec<Vec<ObjectHash>> =
                missing.chunks(batch_size).map(|c| c.to_vec()).collect();
            tracing::debug!(
                missing = missing.len(),
                batch_size,
                batches = batches.len(),
                "batched blob fetch pass"
            );

            futures::stream::iter(batches.into_iter().map(|wants| {
                let store = store.clone();
                async move {
                    let request = FetchRequest {
                        wants,
                        ..Default::default()
                    };
                    if let Err(err) = self.fetch_into_store(&request, store).await {
                        tracing::warn!(error = %err, "blob batch failed; will retry smaller");
                    }
                }
            }))
            .buffer_unordered(BLOB_BATCH_PARALLELISM)
            .collect::<Vec<()>>()
            .await;

            if batch_size == 1 {
                for hash in hashes {
                    if !store.has(hash)? {
                        return Err(GitError::ObjectNotFound(hash.to_string()));
                    }
                }
                return Ok(());
            }
            batch_size = (batch_size / 2).max(1);
        }
    }
}

