//! # Badge service
//!
//! Polls the unread count and notification list endpoints for the user's
//! responsibilities and publishes a single badge total.
//!
//! | Setting | Default | Description |
//! |---------|---------|-------------|
//! | `period` | 10s | Time between two polls, at least 1s |
//!
//! Unread counts only ever come from this poll. Pushed messages drive
//! toasts, never the badge.

use crate::state::responsibility::{
    join_responsibilities, BadgeSnapshot, NotificationEntry, ResponsibilityId, UnreadCount,
};
use async_trait::async_trait;
use reqwest::Url;
use std::{sync::Arc, time::Duration};
use thiserror::Error;
use tokio::{
    sync::watch,
    time::{self, MissedTickBehavior},
};

/// Default time between two polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
/// Shortest accepted time between two polls.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// Query parameter carrying the responsibility ids.
pub const RESPONSIBILITIES_PARAM: &str = "responsibility_ids";

/// Error type for the notification API.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid endpoint `{0}`")]
    InvalidEndpoint(String),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(u16),
}

/// Endpoints the badge is computed from.
#[async_trait]
pub trait NotificationApi: Send + Sync {
    /// Unread count rows for the given responsibilities.
    async fn unread_counts(&self, ids: &[ResponsibilityId]) -> Result<Vec<UnreadCount>, ApiError>;

    /// Notification list for the given responsibilities.
    async fn notifications(
        &self,
        ids: &[ResponsibilityId],
    ) -> Result<Vec<NotificationEntry>, ApiError>;
}

/// HTTP implementation of [`NotificationApi`].
#[derive(Debug, Clone)]
pub struct HttpNotificationApi {
    http: reqwest::Client,
    count_url: Url,
    list_url: Url,
    token: Option<String>,
}

impl HttpNotificationApi {
    /// Creates the API client. Paths are resolved against `base`.
    ///
    /// No request timeout is set beyond the transport defaults.
    pub fn new(
        base: &str,
        count_path: &str,
        list_path: &str,
        token: Option<String>,
    ) -> Result<Self, ApiError> {
        let base = Url::parse(base).map_err(|_| ApiError::InvalidEndpoint(base.to_string()))?;
        let join = |path: &str| {
            base.join(path)
                .map_err(|_| ApiError::InvalidEndpoint(path.to_string()))
        };
        Ok(Self {
            http: reqwest::Client::new(),
            count_url: join(count_path)?,
            list_url: join(list_path)?,
            token,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: &Url,
        ids: &[ResponsibilityId],
    ) -> Result<T, ApiError> {
        let mut request = self
            .http
            .get(url.clone())
            .query(&[(RESPONSIBILITIES_PARAM, join_responsibilities(ids))]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Status(response.status().as_u16()));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl NotificationApi for HttpNotificationApi {
    async fn unread_counts(&self, ids: &[ResponsibilityId]) -> Result<Vec<UnreadCount>, ApiError> {
        self.get(&self.count_url, ids).await
    }

    async fn notifications(
        &self,
        ids: &[ResponsibilityId],
    ) -> Result<Vec<NotificationEntry>, ApiError> {
        self.get(&self.list_url, ids).await
    }
}

/// Background service that keeps the badge fresh.
pub struct BadgeAggregator {
    api: Arc<dyn NotificationApi>,
    period: Duration,
    responsibilities: watch::Sender<Vec<ResponsibilityId>>,
    snapshot: watch::Sender<BadgeSnapshot>,
}

impl BadgeAggregator {
    /// Creates an aggregator with no responsibilities; it stays idle until
    /// some are set. Periods below [`MIN_POLL_INTERVAL`] are raised to it.
    pub fn new(api: Arc<dyn NotificationApi>, period: Duration) -> Self {
        let period = period.max(MIN_POLL_INTERVAL);
        let (responsibilities, _) = watch::channel(Vec::new());
        let (snapshot, _) = watch::channel(BadgeSnapshot::default());
        Self {
            api,
            period,
            responsibilities,
            snapshot,
        }
    }

    /// Replaces the responsibilities the badge is computed for. An empty
    /// list stops polling; the timer restarts with the new list otherwise.
    pub fn set_responsibilities(&self, ids: Vec<ResponsibilityId>) {
        self.responsibilities.send_replace(ids);
    }

    /// Returns the time between two polls.
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns a receiver of the published badge.
    pub fn subscribe(&self) -> watch::Receiver<BadgeSnapshot> {
        self.snapshot.subscribe()
    }

    /// Returns the last published badge.
    pub fn current(&self) -> BadgeSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Runs one poll: both requests or nothing. On failure the previous
    /// badge stays published.
    #[tracing::instrument(name = "Polling notification badge", skip_all, fields(responsibilities = %join_responsibilities(ids)))]
    pub async fn poll_once(&self, ids: &[ResponsibilityId]) -> Result<u64, ApiError> {
        let (counts, notifications) =
            tokio::try_join!(self.api.unread_counts(ids), self.api.notifications(ids))?;
        let snapshot = BadgeSnapshot::new(counts, notifications);
        let total = snapshot.total;
        self.snapshot.send_replace(snapshot);
        tracing::debug!(total, "Badge updated");
        Ok(total)
    }

    /// Polls at a fixed period until `shutdown` fires.
    ///
    /// Failures are logged and retried on the next tick, without backoff.
    /// A poll slower than the period delays the next one instead of
    /// triggering a catch-up burst.
    /// Shutdown is observed between polls; a poll already in flight is not
    /// aborted.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut responsibilities = self.responsibilities.subscribe();
        loop {
            let ids = responsibilities.borrow_and_update().clone();
            if ids.is_empty() {
                tracing::debug!("No responsibilities, badge polling idle");
                tokio::select! {
                    res = responsibilities.changed() => {
                        if res.is_err() {
                            return;
                        }
                    }
                    _ = shutdown.changed() => return,
                }
                continue;
            }

            let mut interval = time::interval(self.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.changed() => return,
                    res = responsibilities.changed() => {
                        if res.is_err() {
                            return;
                        }
                        break;
                    }
                    _ = interval.tick() => {
                        if let Err(err) = self.poll_once(&ids).await {
                            tracing::warn!(error = %err, "Badge poll failed, keeping previous total");
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    };

    /// Fake endpoints returning fixed rows, or failing on demand.
    #[derive(Default)]
    struct FakeApi {
        counts: Mutex<Vec<UnreadCount>>,
        fail_list: AtomicBool,
        /// Time the count request takes.
        latency: Mutex<Duration>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<ResponsibilityId>>>,
    }

    impl FakeApi {
        fn with_counts(counts: &[u64]) -> Self {
            let api = Self::default();
            api.set_counts(counts);
            api
        }

        fn set_counts(&self, counts: &[u64]) {
            *self.counts.lock().unwrap() = counts
                .iter()
                .map(|&count| UnreadCount {
                    responsibility_id: None,
                    count,
                })
                .collect();
        }
    }

    #[async_trait]
    impl NotificationApi for FakeApi {
        async fn unread_counts(
            &self,
            ids: &[ResponsibilityId],
        ) -> Result<Vec<UnreadCount>, ApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(ids.to_vec());
            let latency = *self.latency.lock().unwrap();
            if !latency.is_zero() {
                time::sleep(latency).await;
            }
            Ok(self.counts.lock().unwrap().clone())
        }

        async fn notifications(
            &self,
            _ids: &[ResponsibilityId],
        ) -> Result<Vec<NotificationEntry>, ApiError> {
            if self.fail_list.load(Ordering::SeqCst) {
                return Err(ApiError::Status(500));
            }
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn badge_is_the_sum_of_counts() {
        let api = Arc::new(FakeApi::with_counts(&[3, 5]));
        let aggregator = BadgeAggregator::new(api.clone(), DEFAULT_POLL_INTERVAL);

        assert_eq!(aggregator.poll_once(&[7, 12]).await.unwrap(), 8);
        assert_eq!(aggregator.current().total, 8);
        assert_eq!(api.seen.lock().unwrap().as_slice(), &[vec![7, 12]]);
    }

    #[tokio::test]
    async fn failed_poll_keeps_previous_total() {
        let api = Arc::new(FakeApi::with_counts(&[3, 5]));
        let aggregator = BadgeAggregator::new(api.clone(), DEFAULT_POLL_INTERVAL);
        aggregator.poll_once(&[7, 12]).await.unwrap();

        api.set_counts(&[1]);
        api.fail_list.store(true, Ordering::SeqCst);
        assert!(aggregator.poll_once(&[7, 12]).await.is_err());
        assert_eq!(aggregator.current().total, 8);
    }

    #[tokio::test(start_paused = true)]
    async fn run_polls_on_a_fixed_period() {
        let api = Arc::new(FakeApi::with_counts(&[3, 5]));
        let aggregator = Arc::new(BadgeAggregator::new(api.clone(), DEFAULT_POLL_INTERVAL));
        aggregator.set_responsibilities(vec![7, 12]);
        let mut badge = aggregator.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let aggregator_c = aggregator.clone();
        let task = tokio::spawn(async move { aggregator_c.run(shutdown_rx).await });

        badge.changed().await.unwrap();
        assert_eq!(badge.borrow().total, 8);

        api.set_counts(&[2]);
        time::sleep(DEFAULT_POLL_INTERVAL + Duration::from_millis(1)).await;
        assert_eq!(aggregator.current().total, 2);
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_is_raised_to_the_minimum() {
        let api = Arc::new(FakeApi::with_counts(&[4]));
        let aggregator = Arc::new(BadgeAggregator::new(api.clone(), Duration::ZERO));
        assert_eq!(aggregator.period(), MIN_POLL_INTERVAL);
        aggregator.set_responsibilities(vec![7]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let aggregator_c = aggregator.clone();
        let task = tokio::spawn(async move { aggregator_c.run(shutdown_rx).await });

        time::sleep(MIN_POLL_INTERVAL * 2 + Duration::from_millis(1)).await;
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
        assert_eq!(aggregator.current().total, 4);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn slow_poll_delays_the_next_tick() {
        let api = Arc::new(FakeApi::with_counts(&[1]));
        *api.latency.lock().unwrap() = Duration::from_secs(15);
        let aggregator = Arc::new(BadgeAggregator::new(api.clone(), DEFAULT_POLL_INTERVAL));
        aggregator.set_responsibilities(vec![7]);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let aggregator_c = aggregator.clone();
        let task = tokio::spawn(async move { aggregator_c.run(shutdown_rx).await });

        time::sleep(Duration::from_secs(1)).await;
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
        *api.latency.lock().unwrap() = Duration::ZERO;

        // The first poll ends at 15s, the missed tick fires right away and
        // the next one is due at 25s, not 20s.
        time::sleep(Duration::from_secs(21)).await;
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);

        time::sleep(Duration::from_secs(4)).await;
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn empty_responsibilities_never_poll() {
        let api = Arc::new(FakeApi::with_counts(&[3]));
        let aggregator = Arc::new(BadgeAggregator::new(api.clone(), DEFAULT_POLL_INTERVAL));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let aggregator_c = aggregator.clone();
        let task = tokio::spawn(async move { aggregator_c.run(shutdown_rx).await });

        time::sleep(DEFAULT_POLL_INTERVAL * 3).await;
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);

        aggregator.set_responsibilities(vec![7]);
        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        aggregator.set_responsibilities(vec![]);
        time::sleep(DEFAULT_POLL_INTERVAL * 3).await;
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[test]
    fn endpoints_resolve_against_base() {
        let api = HttpNotificationApi::new(
            "http://localhost:8080/api/",
            "notification/count",
            "notification",
            None,
        )
        .unwrap();
        assert_eq!(
            api.count_url.as_str(),
            "http://localhost:8080/api/notification/count"
        );
        assert_eq!(api.list_url.as_str(), "http://localhost:8080/api/notification");
        assert!(HttpNotificationApi::new("nope", "a", "b", None).is_err());
    }
}
