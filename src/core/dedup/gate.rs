// The duplicate-image gate. Given the raw bytes of a candidate image it
// decides whether that exact content has been posted before, recording the
// fingerprint when it has not.
//
// The gate has NO Discord, HTTP, or SQL types in it. Storage goes through
// the `FingerprintStore` trait so production can use SQLite while tests use
// an in-memory double.

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tokio::sync::Mutex;

/// Outcome of a gate check for one candidate image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// First time this content has been seen; it was recorded and may be posted.
    Novel,
    /// Content already recorded; the caller must not post it again.
    Duplicate,
}

#[derive(Debug, Error)]
pub enum GateError {
    #[error("candidate bytes are not a decodable image: {0}")]
    Decode(String),

    #[error("fingerprint store error: {0}")]
    Store(String),
}

/// SHA-256 digest of an image's raw bytes. Two images with the same digest
/// are duplicates regardless of where they were submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn from_bytes(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Self(out)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Persistent set of fingerprints that have already been posted.
///
/// Invariant: a fingerprint is present if and only if an image with that
/// content was approved for posting. Entries are added exactly once and
/// never removed.
#[async_trait]
pub trait FingerprintStore: Send + Sync {
    async fn contains(&self, fingerprint: &Fingerprint) -> Result<bool, GateError>;

    /// Record a fingerprint. Must be durable before returning Ok.
    async fn insert(&self, fingerprint: &Fingerprint) -> Result<(), GateError>;

    /// Number of recorded fingerprints.
    async fn len(&self) -> Result<u64, GateError>;
}

/// The gate itself: lookup-then-insert over a `FingerprintStore`.
///
/// Lookup and insert are serialized behind one async mutex so that two
/// concurrent candidates with identical content cannot both observe
/// "absent" and both get posted.
pub struct DuplicateGate<S: FingerprintStore> {
    store: S,
    write_lock: Mutex<()>,
}

impl<S: FingerprintStore> DuplicateGate<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            write_lock: Mutex::new(()),
        }
    }

    /// Validate that the bytes decode as an image and produce their digest.
    pub fn fingerprint_image(image_bytes: &[u8]) -> Result<Fingerprint, GateError> {
        image::load_from_memory(image_bytes).map_err(|e| GateError::Decode(e.to_string()))?;
        Ok(Fingerprint::from_bytes(image_bytes))
    }

    /// Decide whether a candidate image is novel, recording it when it is.
    ///
    /// A store failure aborts the check without marking the item seen, so the
    /// same candidate can be retried on a later cycle. A failed candidate is
    /// never permanently blocked.
    pub async fn check_and_record(&self, image_bytes: &[u8]) -> Result<Decision, GateError> {
        let fingerprint = Self::fingerprint_image(image_bytes)?;
        self.check_and_record_fingerprint(&fingerprint).await
    }

    /// Same as `check_and_record` but for an already-computed fingerprint.
    pub async fn check_and_record_fingerprint(
        &self,
        fingerprint: &Fingerprint,
    ) -> Result<Decision, GateError> {
        let _guard = self.write_lock.lock().await;

        if self.store.contains(fingerprint).await? {
            return Ok(Decision::Duplicate);
        }

        // Insert must complete before we report Novel: a crash between the
        // decision and the post may re-post later (acceptable), but an image
        // reported novel and not recorded would never be caught again.
        self.store.insert(fingerprint).await?;
        Ok(Decision::Novel)
    }

    pub async fn seen_count(&self) -> Result<u64, GateError> {
        self.store.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;

    /// Plain in-memory set, with an optional one-shot insert failure for the
    /// failure-injection tests.
    struct MemStore {
        seen: StdMutex<HashSet<Fingerprint>>,
        fail_next_insert: AtomicBool,
    }

    impl MemStore {
        fn new() -> Self {
            Self {
                seen: StdMutex::new(HashSet::new()),
                fail_next_insert: AtomicBool::new(false),
            }
        }

        fn fail_next_insert(&self) {
            self.fail_next_insert.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl FingerprintStore for MemStore {
        async fn contains(&self, fingerprint: &Fingerprint) -> Result<bool, GateError> {
            Ok(self.seen.lock().unwrap().contains(fingerprint))
        }

        async fn insert(&self, fingerprint: &Fingerprint) -> Result<(), GateError> {
            if self.fail_next_insert.swap(false, Ordering::SeqCst) {
                return Err(GateError::Store("injected write failure".to_string()));
            }
            self.seen.lock().unwrap().insert(*fingerprint);
            Ok(())
        }

        async fn len(&self) -> Result<u64, GateError> {
            Ok(self.seen.lock().unwrap().len() as u64)
        }
    }

    fn png_bytes(shade: u8) -> Vec<u8> {
        let img = image::GrayImage::from_pixel(16, 16, image::Luma([shade]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[tokio::test]
    async fn first_sighting_is_novel_then_duplicate() {
        let gate = DuplicateGate::new(MemStore::new());
        let img = png_bytes(40);

        assert_eq!(gate.check_and_record(&img).await.unwrap(), Decision::Novel);
        assert_eq!(
            gate.check_and_record(&img).await.unwrap(),
            Decision::Duplicate
        );
    }

    #[tokio::test]
    async fn distinct_images_are_independent() {
        let gate = DuplicateGate::new(MemStore::new());
        let a = png_bytes(10);
        let b = png_bytes(200);

        assert_eq!(gate.check_and_record(&b).await.unwrap(), Decision::Novel);
        assert_eq!(gate.check_and_record(&a).await.unwrap(), Decision::Novel);
    }

    #[tokio::test]
    async fn duplicate_decisions_never_mutate_the_set() {
        let gate = DuplicateGate::new(MemStore::new());
        let img = png_bytes(90);

        gate.check_and_record(&img).await.unwrap();
        let size_after_first = gate.seen_count().await.unwrap();

        for _ in 0..5 {
            assert_eq!(
                gate.check_and_record(&img).await.unwrap(),
                Decision::Duplicate
            );
        }
        assert_eq!(gate.seen_count().await.unwrap(), size_after_first);
    }

    #[tokio::test]
    async fn undecodable_bytes_are_rejected_without_mutation() {
        let gate = DuplicateGate::new(MemStore::new());

        let err = gate.check_and_record(b"definitely not an image").await;
        assert!(matches!(err, Err(GateError::Decode(_))));
        assert_eq!(gate.seen_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_identical_candidates_yield_one_novel() {
        let gate = Arc::new(DuplicateGate::new(MemStore::new()));
        let img = png_bytes(123);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let gate = Arc::clone(&gate);
            let img = img.clone();
            handles.push(tokio::spawn(
                async move { gate.check_and_record(&img).await },
            ));
        }

        let mut novel = 0;
        let mut duplicate = 0;
        for handle in handles {
            match handle.await.unwrap().unwrap() {
                Decision::Novel => novel += 1,
                Decision::Duplicate => duplicate += 1,
            }
        }

        assert_eq!(novel, 1);
        assert_eq!(duplicate, 7);
        assert_eq!(gate.seen_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn failed_insert_leaves_candidate_retryable() {
        let store = MemStore::new();
        store.fail_next_insert();
        let gate = DuplicateGate::new(store);
        let img = png_bytes(55);

        let err = gate.check_and_record(&img).await;
        assert!(matches!(err, Err(GateError::Store(_))));
        assert_eq!(gate.seen_count().await.unwrap(), 0);

        // Retry succeeds and the image is still treated as fresh content.
        assert_eq!(gate.check_and_record(&img).await.unwrap(), Decision::Novel);
    }

    #[test]
    fn fingerprint_is_stable_and_hex_encodes() {
        let a = Fingerprint::from_bytes(b"abc");
        let b = Fingerprint::from_bytes(b"abc");
        assert_eq!(a, b);
        // Well-known SHA-256 of "abc".
        assert_eq!(
            a.to_hex(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
