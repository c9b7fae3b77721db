//! This contains test scenarios that a given [BlockStore] needs to pass.
//! We use [rstest] and [rstest_reuse] to provide all stores we want to test
//! against, and then apply this template to all test functions.

use futures::TryStreamExt;
use rstest::*;
use rstest_reuse::{self, *};

use super::BlockStore;
use crate::blockstore;
use crate::codec::Codec;
use crate::digests::HashAlg;
use crate::fixtures::{BLOB_A, BLOB_A_CID, BLOB_B, BLOB_B_CID, EMPTY_DIRECTORY_CID};
use crate::Error;

/// This produces a template, which will be applied to all individual test functions.
/// See https://github.com/la10736/rstest/issues/130#issuecomment-968864832
#[template]
#[rstest]
#[case::memory(blockstore::from_addr("memory://").await.unwrap())]
#[case::redb(blockstore::from_addr("redb://").await.unwrap())]
pub fn block_stores(#[case] block_store: impl BlockStore) {}

/// Using [BlockStore::has] on a non-existing block should return false.
#[apply(block_stores)]
#[tokio::test]
async fn has_nonexistent_false(block_store: impl BlockStore) {
    assert!(!block_store.has(&BLOB_A_CID).await.expect("must not fail"));
}

/// Getting a non-existing block should return NotFound.
#[apply(block_stores)]
#[tokio::test]
async fn not_found_get(block_store: impl BlockStore) {
    assert_eq!(
        Err(Error::NotFound(*BLOB_A_CID)),
        block_store.get(&BLOB_A_CID).await
    );
}

/// Put a block in the store, check has, get it back.
#[apply(block_stores)]
#[tokio::test]
async fn put_has_get(block_store: impl BlockStore) {
    for (contents, cid) in [(&*BLOB_A, *BLOB_A_CID), (&*BLOB_B, *BLOB_B_CID)] {
        let returned = block_store
            .put(
                contents.clone(),
                Codec::Raw,
                HashAlg::Sha2_256,
                cid::Version::V1,
                false,
            )
            .await
            .expect("put must succeed");
        assert_eq!(cid, returned, "returned cid must match");

        assert!(block_store.has(&cid).await.expect("must not fail"));
        assert_eq!(contents, &block_store.get(&cid).await.expect("must be found"));
    }
}

/// Putting the same block twice only writes it once.
#[apply(block_stores)]
#[tokio::test]
async fn put_idempotent(block_store: impl BlockStore) {
    assert!(block_store
        .put_block(&BLOB_A_CID, BLOB_A.clone())
        .await
        .unwrap());
    assert!(!block_store
        .put_block(&BLOB_A_CID, BLOB_A.clone())
        .await
        .unwrap());

    let stat = block_store.stat().await.unwrap();
    assert_eq!(1, stat.num_objects);
    assert_eq!(BLOB_A.len() as u64, stat.repo_size);
}

/// With only_hash, the CID is computed but nothing is written.
#[apply(block_stores)]
#[tokio::test]
async fn put_only_hash(block_store: impl BlockStore) {
    let cid = block_store
        .put(
            BLOB_A.clone(),
            Codec::Raw,
            HashAlg::Sha2_256,
            cid::Version::V1,
            true,
        )
        .await
        .unwrap();
    assert_eq!(*BLOB_A_CID, cid);
    assert!(!block_store.has(&cid).await.unwrap());
}

/// CIDv0 can only address dag-pb blocks.
#[apply(block_stores)]
#[tokio::test]
async fn put_v0_raw_fails(block_store: impl BlockStore) {
    assert!(matches!(
        block_store
            .put(
                BLOB_A.clone(),
                Codec::Raw,
                HashAlg::Sha2_256,
                cid::Version::V0,
                false
            )
            .await,
        Err(Error::InvalidRequest(_))
    ));
    let cid = block_store
        .put(
            crate::fixtures::EMPTY_DIRECTORY.clone(),
            Codec::DagPb,
            HashAlg::Sha2_256,
            cid::Version::V0,
            false,
        )
        .await
        .unwrap();
    assert_eq!(*EMPTY_DIRECTORY_CID, cid);
}

/// Deleting removes the block, deleting again reports NotFound.
#[apply(block_stores)]
#[tokio::test]
async fn delete(block_store: impl BlockStore) {
    block_store
        .put_block(&BLOB_A_CID, BLOB_A.clone())
        .await
        .unwrap();
    block_store.delete(&BLOB_A_CID).await.expect("must delete");
    assert!(!block_store.has(&BLOB_A_CID).await.unwrap());
    assert_eq!(
        Err(Error::NotFound(*BLOB_A_CID)),
        block_store.delete(&BLOB_A_CID).await
    );
}

/// Listing returns every block, and can be restarted.
#[apply(block_stores)]
#[tokio::test]
async fn list(block_store: impl BlockStore) {
    assert!(block_store
        .list()
        .try_collect::<Vec<_>>()
        .await
        .unwrap()
        .is_empty());

    block_store
        .put_block(&BLOB_A_CID, BLOB_A.clone())
        .await
        .unwrap();
    block_store
        .put_block(&BLOB_B_CID, BLOB_B.clone())
        .await
        .unwrap();

    for _ in 0..2 {
        let mut cids: Vec<_> = block_store.list().try_collect().await.unwrap();
        cids.sort();
        let mut expected = vec![*BLOB_A_CID, *BLOB_B_CID];
        expected.sort();
        assert_eq!(expected, cids);
    }
}

/// Listing more blocks than fit into one batch.
#[apply(block_stores)]
#[tokio::test]
async fn list_many(block_store: impl BlockStore) {
    for i in 0u32..2500 {
        block_store
            .put(
                i.to_be_bytes().to_vec().into(),
                Codec::Raw,
                HashAlg::Sha2_256,
                cid::Version::V1,
                false,
            )
            .await
            .unwrap();
    }
    let cids: Vec<_> = block_store.list().try_collect().await.unwrap();
    assert_eq!(2500, cids.len());
}
