//! A scripted in-memory Git remote implementing the transport trait.
//!
//! Holds refs and objects in maps, answers ls-refs / fetch / receive-pack
//! with responses built from the crate's own codecs, and supports failure
//! injection for retry tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::io::{BufReader, Cursor};
use std::str::FromStr;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;

use nanogit::errors::GitError;
use nanogit::hash::ObjectHash;
use nanogit::internal::object::types::ObjectType;
use nanogit::internal::object::{
    ObjectTrait, commit::Commit, signature::{Signature, SignatureType}, tree::Tree,
};
use nanogit::internal::pack::decode;
use nanogit::internal::pack::encode::{PackBuilder, StorageMode};
use nanogit::internal::pack::entry::Entry;
use nanogit::protocol::pkt_line::{
    self, Pkt, add_delim_pkt, add_flush_pkt, add_pkt_line_bytes, add_pkt_line_string,
};
use nanogit::protocol::transport::{ProtocolStream, SmartTransport, stream_from_bytes};

#[derive(Default)]
pub struct RemoteState {
    pub objects: HashMap<ObjectHash, Entry>,
    pub refs: HashMap<String, ObjectHash>,
}

/// What the capability probe should answer.
#[derive(Clone, Copy, PartialEq, Eq)]
pub enum ProbeBehavior {
    Ok,
    Unauthorized,
    NotFound,
}

pub struct FakeRemoteInner {
    pub state: Mutex<RemoteState>,
    pub probe: Mutex<ProbeBehavior>,
    /// Fail this many receive-pack calls before succeeding.
    pub fail_receives: AtomicUsize,
    pub receive_calls: AtomicUsize,
}

#[derive(Clone)]
pub struct FakeRemote(pub Arc<FakeRemoteInner>);

impl FakeRemote {
    pub fn new() -> FakeRemote {
        FakeRemote(Arc::new(FakeRemoteInner {
            state: Mutex::new(RemoteState::default()),
            probe: Mutex::new(ProbeBehavior::Ok),
            fail_receives: AtomicUsize::new(0),
            receive_calls: AtomicUsize::new(0),
        }))
    }

    pub fn set_probe(&self, behavior: ProbeBehavior) {
        *self.0.probe.lock().unwrap() = behavior;
    }

    pub fn ref_hash(&self, name: &str) -> Option<ObjectHash> {
        self.0.state.lock().unwrap().refs.get(name).copied()
    }

    pub fn add_object(&self, entry: Entry) {
        self.0
            .state
            .lock()
            .unwrap()
            .objects
            .insert(entry.hash, entry);
    }

    pub fn set_ref(&self, name: &str, hash: ObjectHash) {
        self.0
            .state
            .lock()
            .unwrap()
            .refs
            .insert(name.to_string(), hash);
    }

    fn ls_refs_response(&self, prefixes: &[String]) -> Bytes {
        let state = self.0.state.lock().unwrap();
        let mut names: Vec<&String> = state
            .refs
            .keys()
            .filter(|name| prefixes.is_empty() || prefixes.iter().any(|p| name.starts_with(p.as_str())))
            .collect();
        names.sort();

        let mut out = BytesMut::new();
        for name in names {
            let hash = state.refs[name];
            add_pkt_line_string(&mut out, format!("{hash} {name}\n"));
        }
        add_flush_pkt(&mut out);
        out.freeze()
    }

    /// Compute the object closure for a fetch: commits pull in their root
    /// trees (and parents unless deepen), trees pull in their children.
    fn fetch_closure(
        state: &RemoteState,
        wants: &[ObjectHash],
        deepen: Option<u32>,
        filter_blobs: bool,
    ) -> Vec<Entry> {
        let explicit: HashSet<ObjectHash> = wants.iter().copied().collect();
        let mut seen: HashSet<ObjectHash> = HashSet::new();
        let mut queue: VecDeque<ObjectHash> = wants.iter().copied().collect();
        let mut out = Vec::new();

        while let Some(hash) = queue.pop_front() {
            if !seen.insert(hash) {
                continue;
            }
            let Some(entry) = state.objects.get(&hash) else {
                continue;
            };
            match entry.obj_type {
                ObjectType::Commit => {
                    let commit = Commit::from_bytes(&entry.data, entry.hash).unwrap();
                    queue.push_back(commit.tree_id);
                    if deepen.is_none() {
                        for parent in commit.parent_commit_ids {
                            queue.push_back(parent);
                        }
                    }
                    out.push(entry.clone());
                }
                ObjectType::Tree => {
                    let tree = Tree::from_bytes(&entry.data, entry.hash).unwrap();
                    for item in tree.tree_items {
                        queue.push_back(item.id);
                    }
                    out.push(entry.clone());
                }
                ObjectType::Blob => {
                    if !filter_blobs || explicit.contains(&hash) {
                        out.push(entry.clone());
                    }
                }
                _ => out.push(entry.clone()),
            }
        }
        out
    }

    fn fetch_response(&self, lines: &[String]) -> Result<Bytes, GitError> {
        let mut wants = Vec::new();
        let mut deepen = None;
        let mut filter_blobs = false;
        for line in lines {
            if let Some(hex) = line.strip_prefix("want ") {
                wants.push(ObjectHash::from_str(hex.trim())?);
            } else if let Some(depth) = line.strip_prefix("deepen ") {
                deepen = depth.trim().parse::<u32>().ok();
            } else if line.trim() == "filter blob:none" {
                filter_blobs = true;
            }
        }

        let state = self.0.state.lock().unwrap();
        for want in &wants {
            if !state.objects.contains_key(want) {
                let mut out = BytesMut::new();
                add_pkt_line_string(&mut out, format!("ERR upload-pack: not our ref {want}"));
                add_flush_pkt(&mut out);
                return Ok(out.freeze());
            }
        }

        let closure = Self::fetch_closure(&state, &wants, deepen, filter_blobs);
        drop(state);

        let mut builder = PackBuilder::new(StorageMode::Memory);
        for entry in &closure {
            builder.add_object(entry).unwrap();
        }
        let pack = builder.emit_bytes()?;

        let mut out = BytesMut::new();
        if deepen.is_some() {
            add_pkt_line_string(&mut out, "shallow-info\n".to_string());
            for want in &wants {
                add_pkt_line_string(&mut out, format!("shallow {want}\n"));
            }
            add_delim_pkt(&mut out);
        }
        add_pkt_line_string(&mut out, "packfile\n".to_string());
        // Progress noise exercises the sideband-2 discard path.
        let mut progress = vec![2u8];
        progress.extend_from_slice(b"Enumerating objects, done.\n");
        add_pkt_line_bytes(&mut out, &progress);
        for chunk in pack.chunks(1000) {
            let mut frame = vec![1u8];
            frame.extend_from_slice(chunk);
            add_pkt_line_bytes(&mut out, &frame);
        }
        add_flush_pkt(&mut out);
        Ok(out.freeze())
    }

    fn apply_receive(&self, body: Bytes) -> Result<Bytes, GitError> {
        // Command pkt-lines up to the flush; the rest is the pack.
        let mut buf = BytesMut::from(body.as_ref());
        let mut commands = Vec::new();
        loop {
            match pkt_line::parse_pkt(&mut buf)? {
                Some(Pkt::Data(payload)) => {
                    let line = String::from_utf8_lossy(&payload).to_string();
                    let line = line.split('\0').next().unwrap_or("").trim_end().to_string();
                    commands.push(line);
                }
                Some(Pkt::Flush) => break,
                other => {
                    return Err(GitError::ProtocolFraming(format!(
                        "unexpected frame in receive-pack request: {other:?}"
                    )));
                }
            }
        }

        let pack_bytes = buf.freeze();
        let decoded = decode::decode(BufReader::new(Cursor::new(pack_bytes.to_vec())), None)?;
        {
            let mut state = self.0.state.lock().unwrap();
            for entry in decoded.objects {
                state.objects.insert(entry.hash, entry);
            }
        }

        let mut report = BytesMut::new();
        add_pkt_line_string(&mut report, "unpack ok\n".to_string());
        for command in &commands {
            let mut tokens = command.split_ascii_whitespace();
            let old = ObjectHash::from_str(tokens.next().unwrap())?;
            let new = ObjectHash::from_str(tokens.next().unwrap())?;
            let name = tokens.next().unwrap().to_string();

            let mut state = self.0.state.lock().unwrap();
            let current = state.refs.get(&name).copied().unwrap_or(ObjectHash::ZERO);
            if current != old {
                add_pkt_line_string(&mut report, format!("ng {name} stale info\n"));
                continue;
            }
            if new.is_zero() {
                state.refs.remove(&name);
            } else {
                state.refs.insert(name.clone(), new);
            }
            add_pkt_line_string(&mut report, format!("ok {name}\n"));
        }
        add_flush_pkt(&mut report);
        Ok(report.freeze())
    }
}

#[async_trait]
impl SmartTransport for FakeRemote {
    async fn probe(&self) -> Result<(), GitError> {
        match *self.0.probe.lock().unwrap() {
            ProbeBehavior::Ok => Ok(()),
            ProbeBehavior::Unauthorized => Err(GitError::Unauthorized),
            ProbeBehavior::NotFound => Err(GitError::RepoNotFound),
        }
    }

    async fn upload_pack(&self, body: Bytes) -> Result<ProtocolStream, GitError> {
        let mut command = None;
        let mut lines = Vec::new();
        for pkt in pkt_line::parse_all(body)? {
            if let Pkt::Data(payload) = pkt {
                let line = String::from_utf8_lossy(&payload).trim_end().to_string();
                if let Some(cmd) = line.strip_prefix("command=") {
                    command = Some(cmd.to_string());
                } else {
                    lines.push(line);
                }
            }
        }

        let response = match command.as_deref() {
            Some("ls-refs") => {
                let prefixes: Vec<String> = lines
                    .iter()
                    .filter_map(|l| l.strip_prefix("ref-prefix "))
                    .map(|p| p.to_string())
                    .collect();
                self.ls_refs_response(&prefixes)
            }
            Some("fetch") => self.fetch_response(&lines)?,
            other => {
                return Err(GitError::RemoteProtocol(format!(
                    "unsupported command: {other:?}"
                )));
            }
        };
        Ok(stream_from_bytes(response))
    }

    async fn receive_pack(&self, body: ProtocolStream) -> Result<Bytes, GitError> {
        self.0.receive_calls.fetch_add(1, Ordering::SeqCst);
        let mut collected = BytesMut::new();
        let mut stream = body;
        while let Some(chunk) = stream.next().await {
            collected.extend_from_slice(&chunk?);
        }

        if self
            .0
            .fail_receives
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(GitError::NetworkError("injected transport failure".to_string()));
        }

        self.apply_receive(collected.freeze())
    }
}

/// A deterministic signature for test commits.
pub fn test_signature(kind: SignatureType, timestamp: i64) -> Signature {
    Signature::new_with_time(
        kind,
        "tester".to_string(),
        "tester@example.com".to_string(),
        timestamp,
        "+0000".to_string(),
    )
}

/// Seed the remote with an empty-tree root commit on refs/heads/main and
/// return its hash.
pub fn seed_root_commit(remote: &FakeRemote) -> ObjectHash {
    let tree = Tree::from_tree_items(vec![]).unwrap();
    let commit = Commit::new(
        test_signature(SignatureType::Author, 1_700_000_000),
        test_signature(SignatureType::Committer, 1_700_000_000),
        tree.id,
        vec![],
        "root\n",
    );
    remote.add_object(Entry::from(tree));
    remote.add_object(Entry::from(commit.clone()));
    remote.set_ref("refs/heads/main", commit.id);
    commit.id
}
