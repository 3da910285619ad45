//! Credential lifecycle manager
//!
//! Single authority over per-user OAuth credentials:
//! - Retrieval from the credential store
//! - Proactive refresh inside a safety window before expiry (default 5 min)
//! - Forced refresh after the remote rejects a token
//! - A per-user refresh lock so concurrent callers never refresh twice
//!
//! A refreshed token pair is persisted before it is returned, so a crash right
//! after a refresh never loses the new token.

use std::sync::Arc;

use calsync_domain::constants::DEFAULT_REFRESH_WINDOW_SECS;
use calsync_domain::{CalSyncError, Credentials, Result};
use chrono::{Duration, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::ports::{CredentialStore, TokenRefresher};

/// Credential manager with per-user refresh serialization
pub struct CredentialManager {
    store: Arc<dyn CredentialStore>,
    refresher: Arc<dyn TokenRefresher>,
    refresh_window: Duration,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl CredentialManager {
    /// Create a manager with the default 5 minute refresh window.
    pub fn new(store: Arc<dyn CredentialStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            store,
            refresher,
            refresh_window: Duration::seconds(DEFAULT_REFRESH_WINDOW_SECS as i64),
            refresh_locks: DashMap::new(),
        }
    }

    /// Refresh tokens this long before they expire.
    pub fn with_refresh_window(mut self, window: std::time::Duration) -> Self {
        self.refresh_window = Duration::from_std(window).unwrap_or(self.refresh_window);
        self
    }

    /// Store credentials obtained from a completed authorization flow.
    #[instrument(skip(self, credentials), fields(user_id = %credentials.user_id()))]
    pub async fn connect(&self, credentials: Credentials) -> Result<()> {
        self.store.put(&credentials).await?;
        info!("calendar credentials stored");
        Ok(())
    }

    /// Load the credentials for `user_id`.
    ///
    /// # Errors
    /// `NotFound` when the user never connected a calendar.
    pub async fn get(&self, user_id: &str) -> Result<Credentials> {
        self.store
            .get(user_id)
            .await?
            .ok_or_else(|| CalSyncError::NotFound(format!("no calendar credentials for {user_id}")))
    }

    /// Return `credentials` unchanged unless they expire within the refresh
    /// window, in which case a refreshed and persisted pair is returned.
    ///
    /// # Errors
    /// `ReconnectRequired` when the provider refuses the refresh.
    #[instrument(skip(self, credentials), fields(user_id = %credentials.user_id()))]
    pub async fn refresh_if_needed(&self, credentials: Credentials) -> Result<Credentials> {
        if !credentials.expires_within(self.refresh_window, Utc::now()) {
            return Ok(credentials);
        }

        let lock = self.lock_for(credentials.user_id());
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited on the lock.
        let current = self.store.get(credentials.user_id()).await?.unwrap_or(credentials);
        if !current.expires_within(self.refresh_window, Utc::now()) {
            debug!("credentials already refreshed by a concurrent caller");
            return Ok(current);
        }

        self.refresh_locked(&current).await
    }

    /// Refresh after the remote rejected `stale`'s access token (HTTP 401).
    ///
    /// # Errors
    /// `ReconnectRequired` when the provider refuses the refresh.
    #[instrument(skip(self, stale), fields(user_id = %stale.user_id()))]
    pub async fn force_refresh(&self, stale: &Credentials) -> Result<Credentials> {
        let lock = self.lock_for(stale.user_id());
        let _guard = lock.lock().await;

        let current = self.get(stale.user_id()).await?;
        if current.access_token() != stale.access_token() {
            debug!("access token rotated by a concurrent caller");
            return Ok(current);
        }

        self.refresh_locked(&current).await
    }

    async fn refresh_locked(&self, current: &Credentials) -> Result<Credentials> {
        let refreshed = self.refresher.refresh(current.refresh_token()).await.map_err(|err| {
            warn!(user_id = %current.user_id(), error = %err, "token refresh failed");
            CalSyncError::ReconnectRequired(format!(
                "calendar authorization expired, reconnect your calendar ({err})"
            ))
        })?;

        let refresh_token =
            refreshed.refresh_token.unwrap_or_else(|| current.refresh_token().to_owned());
        let expires_at = Credentials::expiry_after(Utc::now(), refreshed.expires_in_secs)
            .ok_or_else(|| {
                warn!(
                    user_id = %current.user_id(),
                    expires_in_secs = refreshed.expires_in_secs,
                    "token endpoint returned an unusable expiry"
                );
                CalSyncError::ReconnectRequired(
                    "token endpoint returned an unusable expiry, reconnect your calendar".into(),
                )
            })?;
        let renewed =
            Credentials::new(current.user_id(), refreshed.access_token, refresh_token, expires_at);

        self.store.put(&renewed).await?;
        info!(user_id = %renewed.user_id(), expires_at = %expires_at, "credentials refreshed");

        Ok(renewed)
    }

    fn lock_for(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.refresh_locks.entry(user_id.to_owned()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::calendar::ports::{RefreshError, RefreshedToken};

    #[derive(Default)]
    struct MemoryStore {
        rows: std::sync::Mutex<Vec<Credentials>>,
        puts: AtomicUsize,
    }

    #[async_trait]
    impl CredentialStore for MemoryStore {
        async fn get(&self, user_id: &str) -> Result<Option<Credentials>> {
            Ok(self.rows.lock().unwrap().iter().find(|c| c.user_id() == user_id).cloned())
        }

        async fn put(&self, credentials: &Credentials) -> Result<()> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            let mut rows = self.rows.lock().unwrap();
            rows.retain(|c| c.user_id() != credentials.user_id());
            rows.push(credentials.clone());
            Ok(())
        }
    }

    struct CountingRefresher {
        calls: AtomicUsize,
        fail: bool,
        expires_in_secs: i64,
    }

    #[async_trait]
    impl TokenRefresher for CountingRefresher {
        async fn refresh(
            &self,
            _refresh_token: &str,
        ) -> std::result::Result<RefreshedToken, RefreshError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail {
                return Err(RefreshError::Rejected("invalid_grant".into()));
            }
            Ok(RefreshedToken {
                access_token: format!("access-{n}"),
                refresh_token: None,
                expires_in_secs: self.expires_in_secs,
            })
        }
    }

    fn manager(fail: bool) -> (CredentialManager, Arc<MemoryStore>, Arc<CountingRefresher>) {
        manager_with(fail, 3600)
    }

    fn manager_with(
        fail: bool,
        expires_in_secs: i64,
    ) -> (CredentialManager, Arc<MemoryStore>, Arc<CountingRefresher>) {
        let store = Arc::new(MemoryStore::default());
        let refresher =
            Arc::new(CountingRefresher { calls: AtomicUsize::new(0), fail, expires_in_secs });
        let manager = CredentialManager::new(store.clone(), refresher.clone());
        (manager, store, refresher)
    }

    #[tokio::test]
    async fn fresh_credentials_are_returned_untouched() {
        let (manager, store, refresher) = manager(false);
        let creds = Credentials::new("u1", "at", "rt", Utc::now() + Duration::hours(1));
        manager.connect(creds.clone()).await.unwrap();

        let result = manager.refresh_if_needed(creds.clone()).await.unwrap();

        assert_eq!(result, creds);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_credentials_are_not_found() {
        let (manager, _, _) = manager(false);
        assert!(matches!(manager.get("nobody").await, Err(CalSyncError::NotFound(_))));
    }

    #[tokio::test]
    async fn refresh_keeps_refresh_token_when_not_rotated() {
        let (manager, store, _) = manager(false);
        let creds = Credentials::new("u1", "old", "keep-me", Utc::now() + Duration::minutes(1));
        manager.connect(creds.clone()).await.unwrap();

        let renewed = manager.refresh_if_needed(creds).await.unwrap();

        assert_eq!(renewed.access_token().as_str(), "access-0");
        assert_eq!(renewed.refresh_token(), "keep-me");
        assert_eq!(store.get("u1").await.unwrap(), Some(renewed));
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let (manager, _, refresher) = manager(false);
        let manager = Arc::new(manager);
        let creds = Credentials::new("u1", "old", "rt", Utc::now() + Duration::seconds(30));
        manager.connect(creds.clone()).await.unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = Arc::clone(&manager);
                let creds = creds.clone();
                tokio::spawn(async move { manager.refresh_if_needed(creds).await })
            })
            .collect();

        for handle in handles {
            let renewed = handle.await.unwrap().unwrap();
            assert_eq!(renewed.access_token().as_str(), "access-0");
        }
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn rejected_refresh_requires_reconnect() {
        let (manager, store, _) = manager(true);
        let creds = Credentials::new("u1", "old", "rt", Utc::now() - Duration::minutes(1));
        manager.connect(creds.clone()).await.unwrap();

        let err = manager.refresh_if_needed(creds).await.unwrap_err();

        assert!(err.requires_reconnect());
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn out_of_range_expiry_requires_reconnect_without_persisting() {
        let (manager, store, _) = manager_with(false, i64::MAX);
        let creds = Credentials::new("u1", "old", "rt", Utc::now() - Duration::minutes(1));
        manager.connect(creds.clone()).await.unwrap();

        let err = manager.refresh_if_needed(creds.clone()).await.unwrap_err();

        assert!(matches!(err, CalSyncError::ReconnectRequired(_)));
        assert_eq!(store.puts.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("u1").await.unwrap(), Some(creds));
    }

    #[tokio::test]
    async fn force_refresh_reuses_token_rotated_by_another_caller() {
        let (manager, _, refresher) = manager(false);
        let stale = Credentials::new("u1", "stale", "rt", Utc::now() + Duration::hours(1));
        manager.connect(stale.clone()).await.unwrap();

        let first = manager.force_refresh(&stale).await.unwrap();
        let second = manager.force_refresh(&stale).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
    }
}
