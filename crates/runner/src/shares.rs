//! time-limited share tokens, persisted as one JSON document per directory.

use std::{
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
};

pub(crate) const DEFAULT_SHARES_DIR: &str = "/data/ftpbrowser/shares";
pub(crate) const DEFAULT_SHARE_HOURS: i64 = 24;
pub(crate) const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

const SHARES_FILE: &str = "shares.json";

#[derive(Debug, Error)]
pub(crate) enum ShareError {
    #[error("unknown share token {0}")]
    NotFound(String),
    #[error("share {token} expired at {expiry}")]
    Expired {
        token: String,
        expiry: DateTime<Utc>,
    },
    #[error("share store i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("share store is corrupt: {0}")]
    Json(#[from] serde_json::Error),
}

impl ShareError {
    pub(crate) fn http_status(&self) -> u16 {
        match self {
            ShareError::NotFound(_) => 404,
            ShareError::Expired { .. } => 410,
            ShareError::Io(_) | ShareError::Json(_) => 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) struct Share {
    pub(crate) server_id: usize,
    pub(crate) path: String,
    pub(crate) created: DateTime<Utc>,
    pub(crate) expiry: DateTime<Utc>,
}

impl Share {
    pub(crate) fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry < now
    }
}

type Shares = HashMap<String, Share>;

/// All reads and writes of the shares file go through one lock, and a
/// write replaces the file with a rename so readers never see half of it.
pub(crate) struct ShareStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl ShareStore {
    pub(crate) fn new(dir: impl Into<PathBuf>) -> Self {
        ShareStore {
            dir: dir.into(),
            lock: Mutex::new(()),
        }
    }

    pub(crate) fn dir(&self) -> &Path {
        &self.dir
    }

    pub(crate) async fn create(
        &self,
        server_id: usize,
        path: &str,
        valid_for: TimeDelta,
    ) -> Result<(String, Share), ShareError> {
        let _guard = self.lock.lock().await;
        let mut shares = self.load().await?;

        let token = uuid::Uuid::new_v4().to_string();
        let created = Utc::now();
        let share = Share {
            server_id,
            path: path.to_string(),
            created,
            expiry: created + valid_for,
        };
        shares.insert(token.clone(), share.clone());
        self.save(&shares).await?;

        tracing::info!(%token, server_id, path, expiry = %share.expiry, "share created");
        Ok((token, share))
    }

    /// Looks up a live share. Expired shares are reported as such even if
    /// the sweeper has not removed them yet.
    pub(crate) async fn resolve(&self, token: &str) -> Result<Share, ShareError> {
        let _guard = self.lock.lock().await;
        let shares = self.load().await?;

        let share = shares
            .get(token)
            .ok_or_else(|| ShareError::NotFound(token.to_string()))?;
        if share.is_expired(Utc::now()) {
            return Err(ShareError::Expired {
                token: token.to_string(),
                expiry: share.expiry,
            });
        }
        Ok(share.clone())
    }

    /// Removes every expired share and returns how many were dropped.
    pub(crate) async fn clean_expired(&self) -> Result<usize, ShareError> {
        let _guard = self.lock.lock().await;
        let mut shares = self.load().await?;

        let now = Utc::now();
        let before = shares.len();
        shares.retain(|_, share| !share.is_expired(now));
        let removed = before - shares.len();

        if removed > 0 {
            self.save(&shares).await?;
            tracing::info!(removed, remaining = shares.len(), "expired shares removed");
        }
        Ok(removed)
    }

    fn file(&self) -> PathBuf {
        self.dir.join(SHARES_FILE)
    }

    async fn load(&self) -> Result<Shares, ShareError> {
        match tokio::fs::read(self.file()).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Shares::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, shares: &Shares) -> Result<(), ShareError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let raw = serde_json::to_vec_pretty(shares)?;
        let tmp = self.dir.join(format!(".{SHARES_FILE}.{}", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, raw).await?;
        if let Err(e) = tokio::fs::rename(&tmp, self.file()).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

/// Background task purging expired shares on a fixed interval. The first
/// sweep runs immediately.
pub(crate) struct Sweeper {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    pub(crate) fn start(store: Arc<ShareStore>, interval: Duration) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = store.clean_expired().await {
                            tracing::error!(err = %e, dir = %store.dir().display(), "share sweep failed");
                        }
                    }
                    _ = stopped.changed() => break,
                }
            }
            tracing::debug!("share sweeper stopped");
        });

        tracing::info!(interval_secs = interval.as_secs(), "share sweeper started");
        Sweeper { stop, handle }
    }

    pub(crate) async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(err = %e, "share sweeper task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_then_resolve() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());

        let (token, share) = store.create(1, "/pub/a.iso", TimeDelta::hours(24)).await.unwrap();
        assert!(uuid::Uuid::parse_str(&token).is_ok());
        assert_eq!(store.resolve(&token).await.unwrap(), share);

        let reopened = ShareStore::new(dir.path());
        assert_eq!(reopened.resolve(&token).await.unwrap().path, "/pub/a.iso");
    }

    #[tokio::test]
    async fn unknown_and_expired_are_distinct() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());

        let err = store.resolve("nope").await.unwrap_err();
        assert!(matches!(err, ShareError::NotFound(_)));
        assert_eq!(err.http_status(), 404);

        let (token, _) = store.create(0, "/x", TimeDelta::hours(-1)).await.unwrap();
        let err = store.resolve(&token).await.unwrap_err();
        assert!(matches!(err, ShareError::Expired { .. }));
        assert_eq!(err.http_status(), 410);
    }

    #[tokio::test]
    async fn clean_removes_only_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = ShareStore::new(dir.path());

        let (live, _) = store.create(0, "/live", TimeDelta::hours(1)).await.unwrap();
        let (dead, _) = store.create(0, "/dead", TimeDelta::hours(-1)).await.unwrap();

        assert_eq!(store.clean_expired().await.unwrap(), 1);
        assert_eq!(store.clean_expired().await.unwrap(), 0);
        assert!(store.resolve(&live).await.is_ok());
        assert!(matches!(
            store.resolve(&dead).await,
            Err(ShareError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SHARES_FILE), b"{not json").unwrap();
        let store = ShareStore::new(dir.path());

        assert!(matches!(store.resolve("t").await, Err(ShareError::Json(_))));
    }

    #[tokio::test]
    async fn concurrent_creates_are_all_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ShareStore::new(dir.path()));

        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .create(i, &format!("/f{i}"), TimeDelta::hours(1))
                        .await
                        .unwrap()
                        .0
                })
            })
            .collect();

        for task in tasks {
            let token = task.await.unwrap();
            assert!(store.resolve(&token).await.is_ok());
        }
    }

    #[tokio::test]
    async fn sweeper_purges_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ShareStore::new(dir.path()));
        let (dead, _) = store.create(0, "/dead", TimeDelta::hours(-1)).await.unwrap();

        let sweeper = Sweeper::start(store.clone(), Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(100)).await;
        sweeper.stop().await;

        assert!(matches!(
            store.resolve(&dead).await,
            Err(ShareError::NotFound(_))
        ));
    }
}
