//! Packfile round-trip coverage: builder output feeding the decoder,
//! large payloads, storage-mode equivalence, and trailer verification.

use std::io::{BufReader, Cursor};

use rand::{Rng, SeedableRng, rngs::StdRng};

use nanogit::errors::GitError;
use nanogit::internal::object::signature::{Signature, SignatureType};
use nanogit::internal::object::{blob::Blob, commit::Commit, tree::{Tree, TreeItem, TreeItemMode}};
use nanogit::internal::pack::decode;
use nanogit::internal::pack::encode::{PackBuilder, StorageMode};
use nanogit::internal::pack::entry::Entry;
use nanogit::internal::object::types::ObjectType;

fn signature(kind: SignatureType) -> Signature {
    Signature::new_with_time(
        kind,
        "tester".to_string(),
        "tester@example.com".to_string(),
        1_700_000_000,
        "+0000".to_string(),
    )
}

/// A 1 MiB blob plus tree and commit referencing it survive the write +
/// read cycle with identical hashes and a verified trailer.
#[test]
fn large_blob_round_trip() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut payload = vec![0u8; 1024 * 1024];
    rng.fill(payload.as_mut_slice());
    let blob = Blob::from_content_bytes(payload);

    let tree = Tree::from_tree_items(vec![TreeItem::new(
        TreeItemMode::Blob,
        blob.id,
        "big.bin".to_string(),
    )])
    .unwrap();
    let commit = Commit::new(
        signature(SignatureType::Author),
        signature(SignatureType::Committer),
        tree.id,
        vec![],
        "add big file\n",
    );

    let mut builder = PackBuilder::new(StorageMode::Memory);
    builder.add_object(&Entry::from(commit.clone())).unwrap();
    builder.add_object(&Entry::from(tree.clone())).unwrap();
    builder.add_object(&Entry::from(blob.clone())).unwrap();
    let bytes = builder.emit_bytes().unwrap();

    let pack = decode::decode(BufReader::new(Cursor::new(bytes.to_vec())), None).unwrap();
    assert_eq!(pack.number, 3);
    let hashes: Vec<_> = pack.objects.iter().map(|o| o.hash).collect();
    assert!(hashes.contains(&blob.id));
    assert!(hashes.contains(&tree.id));
    assert!(hashes.contains(&commit.id));

    let decoded_blob = pack
        .objects
        .iter()
        .find(|o| o.hash == blob.id)
        .unwrap();
    assert_eq!(decoded_blob.obj_type, ObjectType::Blob);
    assert_eq!(decoded_blob.data, blob.data);
}

/// Every storage mode emits byte-identical packs for the same object set.
#[test]
fn storage_modes_agree() {
    let objects: Vec<Entry> = (0..20)
        .map(|i| Entry::from(Blob::from_content_bytes(vec![i as u8; 4096])))
        .collect();

    let mut packs = Vec::new();
    for mode in [StorageMode::Memory, StorageMode::Disk, StorageMode::Auto] {
        let mut builder = PackBuilder::with_threshold(mode, 8 * 1024);
        for object in &objects {
            builder.add_object(object).unwrap();
        }
        packs.push(builder.emit_bytes().unwrap());
    }
    assert_eq!(packs[0], packs[1]);
    assert_eq!(packs[1], packs[2]);
}

/// Flipping one byte of the body invalidates the trailer.
#[test]
fn corrupted_body_fails_checksum() {
    let mut builder = PackBuilder::new(StorageMode::Memory);
    builder
        .add_object(&Entry::from(Blob::from_content("checksummed")))
        .unwrap();
    let bytes = builder.emit_bytes().unwrap().to_vec();

    let mut corrupted = bytes.clone();
    // Flip a bit inside the deflated payload, keeping the zlib stream
    // parseable is not required: either inflate or the trailer must fail.
    let mid = corrupted.len() - 25;
    corrupted[mid] ^= 0x01;

    let err = decode::decode(BufReader::new(Cursor::new(corrupted)), None).unwrap_err();
    assert!(matches!(err, GitError::PackfileCorrupt(_)));
}

/// An arbitrary mixed object set reproduces exactly, order-independent.
#[test]
fn mixed_set_round_trip() {
    let blobs: Vec<Blob> = (0..10)
        .map(|i| Blob::from_content(&format!("file contents {i}")))
        .collect();
    let tree = Tree::from_tree_items(
        blobs
            .iter()
            .enumerate()
            .map(|(i, b)| TreeItem::new(TreeItemMode::Blob, b.id, format!("f{i}.txt")))
            .collect(),
    )
    .unwrap();
    let commit = Commit::new(
        signature(SignatureType::Author),
        signature(SignatureType::Committer),
        tree.id,
        vec![],
        "snapshot\n",
    );

    let mut expected: Vec<Entry> = blobs.into_iter().map(Entry::from).collect();
    expected.push(Entry::from(tree));
    expected.push(Entry::from(commit));

    let mut builder = PackBuilder::new(StorageMode::Auto);
    for entry in &expected {
        builder.add_object(entry).unwrap();
    }
    let bytes = builder.emit_bytes().unwrap();

    let pack = decode::decode(BufReader::new(Cursor::new(bytes.to_vec())), None).unwrap();
    assert_eq!(pack.number, expected.len());
    for entry in &expected {
        let decoded = pack
            .objects
            .iter()
            .find(|o| o.hash == entry.hash)
            .expect("object survives round trip");
        assert_eq!(decoded.obj_type, entry.obj_type);
        assert_eq!(decoded.data, entry.data);
    }
}
