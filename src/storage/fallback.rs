//! Primary/fallback backend decorator.
//!
//! Every value is written with a generation stamp in front of it. A read
//! consults both backends and returns the copy with the highest
//! generation, so whichever backend took the latest write wins no matter
//! which of them was down at the time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::KvBackend;
use crate::error::SyncqError;

const MAGIC: &[u8; 4] = b"SQG1";
const HEADER_LEN: usize = MAGIC.len() + 8;

/// Prefix `value` with `generation`.
fn stamp(generation: u64, value: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + value.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&generation.to_be_bytes());
    out.extend_from_slice(value);
    out
}

/// Split a stored value into its generation and payload. Values written
/// without a stamp count as generation 0.
fn unstamp(bytes: Vec<u8>) -> (u64, Vec<u8>) {
    if bytes.len() < HEADER_LEN || !bytes.starts_with(MAGIC) {
        return (0, bytes);
    }
    let mut generation = [0_u8; 8];
    generation.copy_from_slice(&bytes[MAGIC.len()..HEADER_LEN]);
    (u64::from_be_bytes(generation), bytes[HEADER_LEN..].to_vec())
}

/// Tries `primary` first and falls back to `fallback` when it fails.
///
/// Writes go to the primary, and only on failure to the fallback. Reads
/// look at both and return the newest copy. After a successful primary
/// write the fallback copy is removed; after a fallback write the primary
/// copy is removed if the primary still answers.
pub struct FallbackBackend {
    primary: Option<Arc<dyn KvBackend>>,
    fallback: Arc<dyn KvBackend>,
    last_generation: AtomicU64,
}

impl FallbackBackend {
    /// Combine two backends.
    #[must_use]
    pub fn new(primary: Arc<dyn KvBackend>, fallback: Arc<dyn KvBackend>) -> Self {
        Self {
            primary: Some(primary),
            fallback,
            last_generation: AtomicU64::new(0),
        }
    }

    /// Fallback alone, for when the primary could not be opened at all.
    ///
    /// Values still carry generation stamps so a primary that comes back in
    /// a later process cannot shadow them with an older copy.
    #[must_use]
    pub fn without_primary(fallback: Arc<dyn KvBackend>) -> Self {
        Self {
            primary: None,
            fallback,
            last_generation: AtomicU64::new(0),
        }
    }

    /// Wall-clock based, strictly increasing within the process.
    fn next_generation(&self) -> u64 {
        let now = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
        let mut last = self.last_generation.load(Ordering::SeqCst);
        loop {
            let next = now.max(last.saturating_add(1));
            match self.last_generation.compare_exchange(
                last,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(current) => last = current,
            }
        }
    }

    async fn read(
        &self,
        backend: &dyn KvBackend,
        key: &str,
    ) -> Result<Option<(u64, Vec<u8>)>, SyncqError> {
        let value = backend.get(key).await.inspect_err(|e| {
            tracing::warn!(backend = backend.name(), key, error = %e, "read failed");
        })?;
        Ok(value.map(unstamp))
    }
}

#[async_trait]
impl KvBackend for FallbackBackend {
    fn name(&self) -> &'static str {
        if self.primary.is_some() {
            "fallback"
        } else {
            "fallback-only"
        }
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncqError> {
        let fallback = self.read(self.fallback.as_ref(), key).await;
        let Some(primary) = &self.primary else {
            return fallback.map(|v| v.map(|(_, bytes)| bytes));
        };
        let primary = self.read(primary.as_ref(), key).await;

        let newest = match (primary, fallback) {
            // A miss on one side says nothing while the other side errors
            (Err(e), Err(_) | Ok(None)) | (Ok(None), Err(e)) => return Err(e),
            (Ok(p), Err(_)) => p,
            (Err(_), Ok(f)) => f,
            (Ok(p), Ok(f)) => match (p, f) {
                // Both copies only survive a fallback write, so ties go to it
                (Some(p), Some(f)) => Some(if f.0 >= p.0 { f } else { p }),
                (p, f) => p.or(f),
            },
        };
        Ok(newest.map(|(_, bytes)| bytes))
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), SyncqError> {
        let stamped = stamp(self.next_generation(), value);

        let primary_err = match &self.primary {
            Some(primary) => match primary.set(key, &stamped).await {
                Ok(()) => {
                    if let Err(e) = self.fallback.remove(key).await {
                        tracing::debug!(backend = self.fallback.name(), key, error = %e, "stale fallback copy not removed");
                    }
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        backend = primary.name(),
                        key,
                        error = %e,
                        "primary write failed, using fallback"
                    );
                    Some(e)
                }
            },
            None => None,
        };

        self.fallback.set(key, &stamped).await.map_err(|fallback_err| {
            let primary = primary_err.map_or_else(|| "no primary".to_string(), |e| e.to_string());
            SyncqError::Storage(format!(
                "primary failed ({primary}); {} failed ({fallback_err})",
                self.fallback.name()
            ))
        })?;

        if let Some(primary) = &self.primary {
            if let Err(e) = primary.remove(key).await {
                tracing::debug!(backend = primary.name(), key, error = %e, "stale primary copy not removed");
            }
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), SyncqError> {
        let fallback = self.fallback.remove(key).await;
        let Some(primary) = &self.primary else {
            return fallback;
        };
        match (primary.remove(key).await, fallback) {
            (Err(p), Err(f)) => Err(SyncqError::Storage(format!(
                "remove failed on {} ({p}) and {} ({f})",
                primary.name(),
                self.fallback.name()
            ))),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;

    fn pair() -> (Arc<MemoryBackend>, Arc<MemoryBackend>, FallbackBackend) {
        let primary = Arc::new(MemoryBackend::new());
        let fallback = Arc::new(MemoryBackend::new());
        let combined = FallbackBackend::new(primary.clone(), fallback.clone());
        (primary, fallback, combined)
    }

    #[test]
    fn test_stamp_roundtrip() {
        assert_eq!(unstamp(stamp(42, b"queue")), (42, b"queue".to_vec()));
        assert_eq!(unstamp(b"[]".to_vec()), (0, b"[]".to_vec()));
    }

    #[tokio::test]
    async fn test_writes_prefer_primary() {
        let (primary, fallback, combined) = pair();

        combined.set("q", b"v1").await.unwrap();

        assert!(primary.get("q").await.unwrap().is_some());
        assert_eq!(fallback.get("q").await.unwrap(), None);
        assert_eq!(combined.get("q").await.unwrap(), Some(b"v1".to_vec()));
    }

    #[tokio::test]
    async fn test_falls_back_when_primary_unavailable() {
        let (primary, fallback, combined) = pair();
        primary.set_available(false);

        combined.set("q", b"v1").await.unwrap();
        assert!(fallback.get("q").await.unwrap().is_some());
        assert_eq!(combined.get("q").await.unwrap(), Some(b"v1".to_vec()));
    }

    #[tokio::test]
    async fn test_outage_write_wins_after_primary_recovers() {
        let (primary, _fallback, combined) = pair();

        combined.set("q", b"v1").await.unwrap();
        primary.set_available(false);
        combined.set("q", b"v2").await.unwrap();
        primary.set_available(true);

        // The primary still holds v1; the newer fallback copy must win
        assert!(primary.get("q").await.unwrap().is_some());
        assert_eq!(combined.get("q").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_outage_write_survives_a_new_decorator() {
        let primary = Arc::new(MemoryBackend::new());
        let fallback = Arc::new(MemoryBackend::new());

        FallbackBackend::new(primary.clone(), fallback.clone())
            .set("q", b"v1")
            .await
            .unwrap();
        primary.set_available(false);
        FallbackBackend::new(primary.clone(), fallback.clone())
            .set("q", b"v2")
            .await
            .unwrap();
        primary.set_available(true);

        let reopened = FallbackBackend::new(primary, fallback);
        assert_eq!(reopened.get("q").await.unwrap(), Some(b"v2".to_vec()));
    }

    #[tokio::test]
    async fn test_primary_recovery_clears_fallback_copy() {
        let (primary, fallback, combined) = pair();

        primary.set_available(false);
        combined.set("q", b"old").await.unwrap();

        primary.set_available(true);
        combined.set("q", b"new").await.unwrap();
        assert_eq!(fallback.get("q").await.unwrap(), None);
        assert_eq!(combined.get("q").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_fallback_write_clears_reachable_primary_copy() {
        struct RejectWrites(MemoryBackend);

        #[async_trait]
        impl KvBackend for RejectWrites {
            fn name(&self) -> &'static str {
                "reject-writes"
            }
            async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, SyncqError> {
                self.0.get(key).await
            }
            async fn set(&self, _: &str, _: &[u8]) -> Result<(), SyncqError> {
                Err(SyncqError::Storage("quota exceeded".to_string()))
            }
            async fn remove(&self, key: &str) -> Result<(), SyncqError> {
                self.0.remove(key).await
            }
        }

        let inner = MemoryBackend::new();
        inner.set("q", &stamp(1, b"old")).await.unwrap();
        let primary = Arc::new(RejectWrites(inner));
        let combined = FallbackBackend::new(primary.clone(), Arc::new(MemoryBackend::new()));

        combined.set("q", b"new").await.unwrap();
        assert_eq!(primary.get("q").await.unwrap(), None);
        assert_eq!(combined.get("q").await.unwrap(), Some(b"new".to_vec()));
    }

    #[tokio::test]
    async fn test_without_primary() {
        let fallback = Arc::new(MemoryBackend::new());
        let combined = FallbackBackend::without_primary(fallback.clone());

        combined.set("q", b"v1").await.unwrap();
        assert_eq!(combined.get("q").await.unwrap(), Some(b"v1".to_vec()));
        assert_eq!(unstamp(fallback.get("q").await.unwrap().unwrap()).1, b"v1".to_vec());
    }

    #[tokio::test]
    async fn test_total_failure_is_error() {
        let (primary, fallback, combined) = pair();
        primary.set_available(false);
        fallback.set_available(false);

        let err = combined.set("q", b"v").await.unwrap_err();
        assert!(matches!(err, SyncqError::Storage(_)));
        assert!(combined.get("q").await.is_err());
    }

    #[tokio::test]
    async fn test_miss_beside_failure_is_error() {
        let (primary, fallback, combined) = pair();
        fallback.set_available(false);
        assert!(combined.get("q").await.is_err());

        fallback.set_available(true);
        primary.set_available(false);
        combined.set("q", b"v").await.unwrap();
        assert_eq!(combined.get("q").await.unwrap(), Some(b"v".to_vec()));
    }
}
