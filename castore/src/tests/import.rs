use std::io::Cursor;

use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use proptest::prelude::ProptestConfig;
use rstest::rstest;
use test_strategy::proptest;

use crate::codec::Codec;
use crate::fixtures::BLOB_B;
use crate::import::{AddOptions, AddResult, Chunker, ImportEntry};
use crate::pins::{PinEntry, PinLsOptions, PinType};
use crate::unixfs::{CatOptions, EntryType, GetEntry, GetOptions, LsOptions};
use crate::{Cid, Repo};

async fn cat(repo: &Repo, cid: &Cid, offset: u64, length: Option<u64>) -> Vec<u8> {
    let chunks: Vec<Bytes> = repo
        .cat(
            &cid.to_string(),
            CatOptions {
                offset,
                length,
                ..Default::default()
            },
        )
        .try_collect()
        .await
        .expect("cat must succeed");
    chunks.concat()
}

/// Small chunks and a narrow tree, so short inputs already span several
/// layers.
fn narrow(trickle: bool, cid_version: u64) -> AddOptions {
    AddOptions {
        chunker: Chunker::Fixed(7),
        max_children_per_node: 3,
        layer_repeat: 2,
        trickle,
        cid_version,
        ..Default::default()
    }
}

#[proptest(ProptestConfig { cases: 32, ..Default::default() })]
fn cat_returns_added_content(
    #[strategy(proptest::collection::vec(proptest::prelude::any::<u8>(), 0..300))] content: Vec<u8>,
    trickle: bool,
    #[strategy(0u64..=1)] cid_version: u64,
    #[strategy(0u64..320)] offset: u64,
    #[strategy(proptest::option::of(0u64..100))] length: Option<u64>,
) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let repo = Repo::from_addr("memory://").await.unwrap();
        let added = repo
            .add(Cursor::new(content.clone()), narrow(trickle, cid_version))
            .await
            .unwrap();

        assert_eq!(content, cat(&repo, &added.cid, 0, None).await);

        let expected: Vec<u8> = content
            .iter()
            .skip(offset as usize)
            .take(length.map_or(usize::MAX, |l| l as usize))
            .copied()
            .collect();
        assert_eq!(expected, cat(&repo, &added.cid, offset, length).await);
    });
}

#[rstest]
#[case::balanced(false)]
#[case::trickle(true)]
#[tokio::test]
async fn same_content_stored_once(#[case] trickle: bool) {
    let repo = Repo::from_addr("memory://").await.unwrap();
    let options = AddOptions {
        trickle,
        ..Default::default()
    };

    let first = repo
        .add(Cursor::new(BLOB_B.to_vec()), options.clone())
        .await
        .unwrap();
    let stat = repo.stat().await.unwrap();

    let second = repo
        .add(Cursor::new(BLOB_B.to_vec()), options)
        .await
        .unwrap();
    assert_eq!(first.cid, second.cid);
    assert_eq!(stat, repo.stat().await.unwrap());
}

#[tokio::test]
async fn only_hash_stores_nothing() {
    let repo = Repo::from_addr("memory://").await.unwrap();
    let entries = futures::stream::iter([
        ImportEntry::file("dir/a", Cursor::new(b"some content here".to_vec())),
        ImportEntry::file("dir/sub/b", Cursor::new(vec![7u8; 2000])),
        ImportEntry::directory("dir/empty"),
    ]);
    let options = AddOptions {
        only_hash: true,
        ..narrow(false, 1)
    };

    let results: Vec<AddResult> = repo.add_all(entries, options).try_collect().await.unwrap();
    assert_eq!(5, results.len());
    for result in &results {
        assert!(!repo.store().has(&result.cid).await.unwrap());
    }
    assert_eq!(0, repo.stat().await.unwrap().num_objects);

    let pins: Vec<_> = repo.pin_ls(PinLsOptions::default()).collect().await;
    assert!(pins.is_empty());
}

#[tokio::test]
async fn raw_leaf_is_pinned() {
    let repo = Repo::from_addr("memory://").await.unwrap();
    let added = repo
        .add(
            Cursor::new(b"abc".to_vec()),
            AddOptions {
                cid_version: 1,
                raw_leaves: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(Codec::Raw.code(), added.cid.codec());
    assert_eq!(1, repo.stat().await.unwrap().num_objects);
    assert_eq!(b"abc".to_vec(), cat(&repo, &added.cid, 0, None).await);

    let pins: Vec<PinEntry> = repo
        .pin_ls(PinLsOptions::default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(
        vec![PinEntry {
            cid: added.cid,
            kind: PinType::Recursive
        }],
        pins
    );
}

/// Imports `n` files below `dir`, returning the directory's CID.
async fn import_dir(repo: &Repo, n: usize, sharding: bool) -> Cid {
    let entries = futures::stream::iter((0..n).map(|i| {
        ImportEntry::file(
            format!("dir/file-{}", i),
            Cursor::new(format!("content of file {}", i).into_bytes()),
        )
    }));
    let options = AddOptions {
        cid_version: 1,
        enable_sharding_experiment: sharding,
        shard_split_threshold: 8,
        shard_fanout: 16,
        ..Default::default()
    };

    let results: Vec<AddResult> = repo.add_all(entries, options).try_collect().await.unwrap();
    results
        .into_iter()
        .find(|r| r.path == "dir")
        .expect("directory must be reported")
        .cid
}

#[rstest]
#[case::below_threshold(5)]
#[case::one_level(40)]
#[case::nested_shards(300)]
#[tokio::test]
async fn sharded_listing_matches_flat(#[case] n: usize) {
    let repo = Repo::from_addr("memory://").await.unwrap();
    let flat = import_dir(&repo, n, false).await;
    let sharded = import_dir(&repo, n, true).await;
    assert_eq!(n > 8, flat != sharded);

    let mut listings = vec![];
    for dir in [flat, sharded] {
        let mut entries: Vec<(String, Cid, u64, EntryType)> = repo
            .ls(&dir.to_string(), LsOptions::default())
            .map_ok(|e| (e.name, e.cid, e.size, e.kind))
            .try_collect()
            .await
            .unwrap();
        entries.sort();
        listings.push(entries);
    }
    assert_eq!(n, listings[0].len());
    assert_eq!(listings[0], listings[1]);

    let content: Vec<Bytes> = repo
        .cat(&format!("{}/file-3", sharded), CatOptions::default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(b"content of file 3".to_vec(), content.concat());
}

/// Exporting a sharded directory yields the same files as the flat one.
#[rstest]
#[case::flat(false)]
#[case::sharded(true)]
#[tokio::test]
async fn get_exports_every_file(#[case] sharding: bool) {
    let repo = Repo::from_addr("memory://").await.unwrap();
    let dir = import_dir(&repo, 40, sharding).await;
    let prefix = format!("{}/", dir);

    let entries: Vec<GetEntry> = repo
        .get(&dir.to_string(), GetOptions::default())
        .try_collect()
        .await
        .unwrap();
    assert_eq!(41, entries.len());
    assert_eq!(dir.to_string(), entries[0].path);
    assert_eq!(EntryType::Dir, entries[0].kind);

    let mut files = vec![];
    for entry in entries.into_iter().skip(1) {
        assert_eq!(EntryType::File, entry.kind);
        let name = entry
            .path
            .strip_prefix(&prefix)
            .expect("paths start with the exported path")
            .to_string();
        let chunks: Vec<Bytes> = entry
            .content
            .expect("files carry content")
            .try_collect()
            .await
            .unwrap();
        files.push((name, chunks.concat()));
    }
    files.sort();

    let mut expected: Vec<(String, Vec<u8>)> = (0..40)
        .map(|i| (format!("file-{}", i), format!("content of file {}", i).into_bytes()))
        .collect();
    expected.sort();
    assert_eq!(expected, files);
}
