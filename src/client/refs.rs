//! Reference listing and CRUD.
//!
//! Listing goes through the v2 `ls-refs` command. Creation, update, and
//! deletion are receive-pack ref update commands: `old new refname` with
//! the zero hash standing in for "must not exist" (create) and "delete".
//! A ref update that ships no new objects carries the canonical empty
//! pack.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use super::Client;
use crate::{
    errors::GitError,
    hash::ObjectHash,
    internal::pack::encode::PackBuilder,
    protocol::{
        pkt_line::{
            self, Pkt, SideBand, add_delim_pkt, add_flush_pkt, add_pkt_line_string,
            split_sideband,
        },
        transport::{PktReader, ProtocolStream, SmartTransport, stream_from_bytes},
    },
};

/// A named pointer to a commit on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    pub name: String,
    pub hash: ObjectHash,
}

/// Capabilities sent with every receive-pack command list.
fn receive_caps(agent: &str) -> String {
    format!("report-status-v2 side-band-64k quiet object-format=sha1 agent={agent}")
}

impl<T: SmartTransport> Client<T> {
    /// List refs, optionally narrowed by `ref-prefix` patterns.
    ///
    /// A `HEAD` advertisement with a `symref-target` attribute is
    /// surfaced under its logical ref name, carrying HEAD's hash; the
    /// direct advertisement of the same ref wins when both appear.
    pub async fn list_refs(&self, prefixes: &[&str]) -> Result<Vec<Ref>, GitError> {
        self.check_cancel()?;
        let mut body = BytesMut::new();
        add_pkt_line_string(&mut body, "command=ls-refs\n".to_string());
        add_pkt_line_string(&mut body, "object-format=sha1\n".to_string());
        add_delim_pkt(&mut body);
        // symrefs is requested so HEAD's target is visible to callers.
        add_pkt_line_string(&mut body, "symrefs\n".to_string());
        for prefix in prefixes {
            add_pkt_line_string(&mut body, format!("ref-prefix {prefix}\n"));
        }
        add_flush_pkt(&mut body);

        let response = self.transport().upload_pack(body.freeze()).await?;
        let mut reader = PktReader::new(response);

        let mut refs: Vec<Ref> = Vec::new();
        let mut symref: Option<Ref> = None;
        loop {
            match reader.next_pkt().await? {
                None | Some(Pkt::Flush) | Some(Pkt::ResponseEnd) => break,
                Some(Pkt::Delim) => continue,
                Some(Pkt::Data(payload)) => {
                    if let Some(err) = pkt_line::check_err_pkt(&payload) {
                        return Err(err);
                    }
                    let line = String::from_utf8_lossy(&payload);
                    let line = line.trim_end();
                    let mut tokens = line.split_ascii_whitespace();
                    let Some(hash_hex) = tokens.next() else {
                        continue;
                    };
                    let Some(name) = tokens.next() else {
                        continue;
                    };
                    if hash_hex == "unborn" {
                        // HEAD of an empty repository; nothing to point at.
                        continue;
                    }
                    let hash: ObjectHash = hash_hex.parse()?;
                    let target = tokens.find_map(|attr| {
                        attr.strip_prefix("symref-target:")
                            .or_else(|| attr.strip_prefix("symref-target="))
                    });
                    match (name, target) {
                        ("HEAD", Some(target)) => {
                            symref = Some(Ref {
                                name: target.to_string(),
                                hash,
                            });
                        }
                        ("HEAD", None) => {}
                        _ => refs.push(Ref {
                            name: name.to_string(),
                            hash,
                        }),
                    }
                }
            }
        }

        if let Some(symref) = symref
            && !refs.iter().any(|r| r.name == symref.name)
        {
            refs.push(symref);
        }
        Ok(refs)
    }

    /// Look up one ref by its fully qualified name.
    pub async fn get_ref(&self, name: &str) -> Result<Ref, GitError> {
        let refs = self.list_refs(&[name]).await?;
        refs.into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| GitError::RefNotFound(name.to_string()))
    }

    /// Create a ref pointing at an existing commit. The target name must
    /// be absent.
    pub async fn create_ref(&self, name: &str, hash: ObjectHash) -> Result<Ref, GitError> {
        match self.get_ref(name).await {
            Ok(_) => return Err(GitError::RefAlreadyExists(name.to_string())),
            Err(GitError::RefNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.push_ref_update(ObjectHash::ZERO, hash, name, None)
            .await?;
        Ok(Ref {
            name: name.to_string(),
            hash,
        })
    }

    /// Point an existing ref at a new commit. The observed old hash guards
    /// the update server-side.
    pub async fn update_ref(&self, name: &str, hash: ObjectHash) -> Result<Ref, GitError> {
        let observed = self.get_ref(name).await?;
        self.push_ref_update(observed.hash, hash, name, None).await?;
        Ok(Ref {
            name: name.to_string(),
            hash,
        })
    }

    /// Delete an existing ref.
    pub async fn delete_ref(&self, name: &str) -> Result<(), GitError> {
        let observed = self.get_ref(name).await?;
        self.push_ref_update(observed.hash, ObjectHash::ZERO, name, None)
            .await
    }

    /// One receive-pack POST: the ref update command, flush, then the
    /// pack body (the canonical empty pack when no objects ship).
    pub(crate) async fn push_ref_update(
        &self,
        old: ObjectHash,
        new: ObjectHash,
        refname: &str,
        pack: Option<ProtocolStream>,
    ) -> Result<(), GitError> {
        self.check_cancel()?;
        let mut command = BytesMut::new();
        add_pkt_line_string(
            &mut command,
            format!("{old} {new} {refname}\0{}\n", receive_caps(self.user_agent())),
        );
        add_flush_pkt(&mut command);

        let pack = match pack {
            Some(stream) => stream,
            None => stream_from_bytes(PackBuilder::new(self.pack_storage()).emit_bytes()?),
        };
        let body: ProtocolStream = Box::pin(futures::StreamExt::chain(
            futures::stream::once({
                let command = command.freeze();
                async move { Ok(command) }
            }),
            pack,
        ));

        let response = self.transport().receive_pack(body).await?;
        parse_report_status(response, refname)
    }
}

/// Parse a report-status-v2 response, tolerating sideband multiplexing.
///
/// Requires `unpack ok` and `ok <refname>`; an `ng <refname> <reason>`
/// line surfaces as `PushRejected`.
pub(crate) fn parse_report_status(response: Bytes, refname: &str) -> Result<(), GitError> {
    let pkts = pkt_line::parse_all(response)?;

    // Servers that saw side-band-64k wrap the report in channel-1 frames;
    // unwrap and reparse in that case.
    let mut lines: Vec<String> = Vec::new();
    let mut banded = BytesMut::new();
    let mut uses_sideband = false;
    for pkt in &pkts {
        if let Pkt::Data(payload) = pkt {
            match split_sideband(payload.clone()) {
                Ok((SideBand::PackfileData, data)) => {
                    uses_sideband = true;
                    banded.extend_from_slice(&data);
                }
                Ok((SideBand::Progress, text)) => {
                    uses_sideband = true;
                    tracing::debug!(progress = %String::from_utf8_lossy(&text).trim_end(), "remote progress");
                }
                Ok((SideBand::Fatal, text)) => {
                    return Err(GitError::RemoteProtocol(
                        String::from_utf8_lossy(&text).trim_end().to_string(),
                    ));
                }
                _ => lines.push(String::from_utf8_lossy(payload).trim_end().to_string()),
            }
        }
    }
    if uses_sideband {
        for pkt in pkt_line::parse_all(banded.freeze())? {
            if let Pkt::Data(payload) = pkt {
                lines.push(String::from_utf8_lossy(&payload).trim_end().to_string());
            }
        }
    }

    let mut unpack_ok = false;
    let mut ref_ok = false;
    for line in &lines {
        if let Some(err) = pkt_line::check_err_pkt(line.as_bytes()) {
            return Err(err);
        }
        if line == "unpack ok" {
            unpack_ok = true;
        } else if let Some(rest) = line.strip_prefix("unpack ") {
            return Err(GitError::PushRejected {
                refname: refname.to_string(),
                reason: format!("unpack failed: {rest}"),
            });
        } else if line.strip_prefix("ok ").is_some_and(|r| r == refname) {
            ref_ok = true;
        } else if let Some(rest) = line.strip_prefix("ng ") {
            let (name, reason) = rest.split_once(' ').unwrap_or((rest, "rejected"));
            return Err(GitError::PushRejected {
                refname: name.to_string(),
                reason: reason.to_string(),
            });
        }
    }

    if !unpack_ok || !ref_ok {
        return Err(GitError::PushRejected {
            refname: refname.to_string(),
            reason: format!(
                "missing status acknowledgment (unpack ok: {unpack_ok}, ref ok: {ref_ok})"
            ),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::pkt_line::{add_flush_pkt, add_pkt_line_string};

    fn plain_report(lines: &[&str]) -> Bytes {
        let mut out = BytesMut::new();
        for line in lines {
            add_pkt_line_string(&mut out, format!("{line}\n"));
        }
        add_flush_pkt(&mut out);
        out.freeze()
    }

    /// unpack ok + ok refname is a successful push.
    #[test]
    fn test_report_ok() {
        let report = plain_report(&["unpack ok", "ok refs/heads/main"]);
        assert!(parse_report_status(report, "refs/heads/main").is_ok());
    }

    /// An ng line surfaces as PushRejected with its reason.
    #[test]
    fn test_report_ng() {
        let report = plain_report(&["unpack ok", "ng refs/heads/main non-fast-forward"]);
        let err = parse_report_status(report, "refs/heads/main").unwrap_err();
        match err {
            GitError::PushRejected { refname, reason } => {
                assert_eq!(refname, "refs/heads/main");
                assert_eq!(reason, "non-fast-forward");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    /// A missing ok line is a rejection even without ng.
    #[test]
    fn test_report_missing_ack() {
        let report = plain_report(&["unpack ok"]);
        assert!(matches!(
            parse_report_status(report, "refs/heads/main").unwrap_err(),
            GitError::PushRejected { .. }
        ));
    }

    /// Sideband-wrapped reports unwrap to the same result.
    #[test]
    fn test_report_sideband() {
        let mut inner = BytesMut::new();
        add_pkt_line_string(&mut inner, "unpack ok\n".to_string());
        add_pkt_line_string(&mut inner, "ok refs/heads/feature\n".to_string());
        add_flush_pkt(&mut inner);

        let mut payload = BytesMut::new();
        payload.extend_from_slice(&[1u8]);
        payload.extend_from_slice(&inner.freeze());

        let mut outer = BytesMut::new();
        add_pkt_line_bytes_helper(&mut outer, &payload);
        add_flush_pkt(&mut outer);

        assert!(parse_report_status(outer.freeze(), "refs/heads/feature").is_ok());
    }

    fn add_pkt_line_bytes_helper(out: &mut BytesMut, payload: &[u8]) {
        crate::protocol::pkt_line::add_pkt_line_bytes(out, payload);
    }

    /// Refs round-trip through serde.
    #[test]
    fn test_ref_serialization() {
        let reference = Ref {
            name: "refs/heads/main".to_string(),
            hash: "8ab686eafeb1f44702738c8b0f24f2567c36da6d".parse().unwrap(),
        };
        let json = serde_json::to_string(&reference).unwrap();
        let parsed: Ref = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, reference);
    }
}
