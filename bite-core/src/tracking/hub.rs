//! Per-request publish/subscribe for volunteer positions.
//!
//! Each request gets a topic on first use: a broadcast channel, the latest
//! sample, and a short history. Publishing and subscribing both take the
//! topic map lock, so a subscriber sees the latest sample at the moment it
//! joined followed by every later one, with no gap and no duplicate.
//!
//! Nothing here blocks a publisher. A subscriber that falls behind the
//! channel buffer skips ahead to the oldest sample still buffered.

use crate::config::HubConfig;
use crate::entities::TrackingSample;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::debug;
use uuid::Uuid;

struct Topic {
    sender: broadcast::Sender<TrackingSample>,
    latest: Option<TrackingSample>,
    history: VecDeque<TrackingSample>,
}

impl Topic {
    fn new(config: &HubConfig) -> Self {
        let (sender, _) = broadcast::channel(config.buffer.max(1));
        Self {
            sender,
            latest: None,
            history: VecDeque::with_capacity(config.history),
        }
    }
}

pub struct TrackingHub {
    config: HubConfig,
    topics: Mutex<HashMap<Uuid, Topic>>,
}

impl TrackingHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            config,
            topics: Mutex::new(HashMap::new()),
        }
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<Uuid, Topic>> {
        self.topics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record `sample` as the latest for its request and fan it out.
    ///
    /// Returns how many subscribers it was handed to; zero is not an error.
    pub fn publish(&self, sample: TrackingSample) -> usize {
        let mut topics = self.topics();
        let topic = topics
            .entry(sample.request_id)
            .or_insert_with(|| Topic::new(&self.config));

        topic.latest = Some(sample);
        if self.config.history > 0 {
            if topic.history.len() == self.config.history {
                topic.history.pop_front();
            }
            topic.history.push_back(sample);
        }
        topic.sender.send(sample).unwrap_or(0)
    }

    /// Join the topic for `request_id`, creating it if needed.
    pub fn subscribe(&self, request_id: Uuid) -> TrackingSubscription {
        let mut topics = self.topics();
        let topic = topics
            .entry(request_id)
            .or_insert_with(|| Topic::new(&self.config));
        TrackingSubscription {
            request_id,
            catch_up: topic.latest,
            rx: topic.sender.subscribe(),
        }
    }

    /// Tear the topic down. Subscribers drain what is buffered, then end.
    pub fn close(&self, request_id: Uuid) -> bool {
        let removed = self.topics().remove(&request_id);
        if let Some(topic) = &removed {
            debug!(
                %request_id,
                subscribers = topic.sender.receiver_count(),
                "Tracking topic closed"
            );
        }
        removed.is_some()
    }

    pub fn latest(&self, request_id: Uuid) -> Option<TrackingSample> {
        self.topics().get(&request_id).and_then(|t| t.latest)
    }

    /// Recent samples, oldest first.
    pub fn history(&self, request_id: Uuid) -> Vec<TrackingSample> {
        self.topics()
            .get(&request_id)
            .map(|t| t.history.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn subscriber_count(&self, request_id: Uuid) -> usize {
        self.topics()
            .get(&request_id)
            .map_or(0, |t| t.sender.receiver_count())
    }

    pub fn topic_count(&self) -> usize {
        self.topics().len()
    }
}

/// One observer's view of a request's topic.
pub struct TrackingSubscription {
    request_id: Uuid,
    catch_up: Option<TrackingSample>,
    rx: broadcast::Receiver<TrackingSample>,
}

impl TrackingSubscription {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Next sample, or `None` once the topic is closed.
    pub async fn next(&mut self) -> Option<TrackingSample> {
        if let Some(sample) = self.catch_up.take() {
            return Some(sample);
        }
        loop {
            match self.rx.recv().await {
                Ok(sample) => return Some(sample),
                Err(RecvError::Lagged(skipped)) => {
                    debug!(request_id = %self.request_id, skipped, "Tracking subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// The same sequence as [`next`](Self::next), as a `Stream`.
    pub fn into_stream(self) -> impl Stream<Item = TrackingSample> + Send + 'static {
        tokio_stream::iter(self.catch_up).chain(
            BroadcastStream::new(self.rx).filter_map(|item| item.ok()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use time::OffsetDateTime;

    fn sample(request_id: Uuid, n: u32) -> TrackingSample {
        TrackingSample {
            request_id,
            volunteer_id: Uuid::nil(),
            latitude: 12.0 + f64::from(n) / 100.0,
            longitude: 77.0,
            recorded_at: OffsetDateTime::from_unix_timestamp(1_700_000_000 + i64::from(n))
                .unwrap(),
        }
    }

    async fn next_within(sub: &mut TrackingSubscription) -> Option<TrackingSample> {
        tokio::time::timeout(Duration::from_secs(1), sub.next())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn late_subscriber_gets_latest_then_new_samples() {
        let hub = TrackingHub::new(HubConfig::default());
        let request_id = Uuid::now_v7();
        for n in 1..=3 {
            assert_eq!(hub.publish(sample(request_id, n)), 0);
        }

        let mut sub = hub.subscribe(request_id);
        assert_eq!(next_within(&mut sub).await, Some(sample(request_id, 3)));

        hub.publish(sample(request_id, 4));
        hub.publish(sample(request_id, 5));
        assert_eq!(next_within(&mut sub).await, Some(sample(request_id, 4)));
        assert_eq!(next_within(&mut sub).await, Some(sample(request_id, 5)));
    }

    #[tokio::test]
    async fn independent_subscribers_each_see_every_sample() {
        let hub = TrackingHub::new(HubConfig::default());
        let request_id = Uuid::now_v7();
        let mut a = hub.subscribe(request_id);
        let mut b = hub.subscribe(request_id);
        assert_eq!(hub.subscriber_count(request_id), 2);

        for n in 1..=3 {
            assert_eq!(hub.publish(sample(request_id, n)), 2);
        }
        for n in 1..=3 {
            assert_eq!(next_within(&mut a).await, Some(sample(request_id, n)));
            assert_eq!(next_within(&mut b).await, Some(sample(request_id, n)));
        }
    }

    #[tokio::test]
    async fn topics_are_scoped_per_request() {
        let hub = TrackingHub::new(HubConfig::default());
        let first = Uuid::now_v7();
        let second = Uuid::now_v7();
        let mut sub = hub.subscribe(first);

        hub.publish(sample(second, 1));
        hub.publish(sample(first, 2));
        assert_eq!(next_within(&mut sub).await, Some(sample(first, 2)));
        assert_eq!(hub.latest(second), Some(sample(second, 1)));
    }

    #[tokio::test]
    async fn close_ends_subscriptions_after_buffered_samples() {
        let hub = TrackingHub::new(HubConfig::default());
        let request_id = Uuid::now_v7();
        let mut sub = hub.subscribe(request_id);
        hub.publish(sample(request_id, 1));

        assert!(hub.close(request_id));
        assert!(!hub.close(request_id));
        assert_eq!(next_within(&mut sub).await, Some(sample(request_id, 1)));
        assert_eq!(next_within(&mut sub).await, None);
        assert_eq!(hub.latest(request_id), None);
        assert_eq!(hub.topic_count(), 0);
    }

    #[tokio::test]
    async fn slow_subscriber_skips_to_buffered_samples() {
        let hub = TrackingHub::new(HubConfig {
            buffer: 2,
            history: 20,
        });
        let request_id = Uuid::now_v7();
        let mut sub = hub.subscribe(request_id);
        for n in 1..=5 {
            hub.publish(sample(request_id, n));
        }
        assert_eq!(next_within(&mut sub).await, Some(sample(request_id, 4)));
        assert_eq!(next_within(&mut sub).await, Some(sample(request_id, 5)));
    }

    #[tokio::test]
    async fn history_is_bounded_and_ordered() {
        let hub = TrackingHub::new(HubConfig {
            buffer: 16,
            history: 3,
        });
        let request_id = Uuid::now_v7();
        for n in 1..=5 {
            hub.publish(sample(request_id, n));
        }
        let history = hub.history(request_id);
        assert_eq!(
            history,
            vec![
                sample(request_id, 3),
                sample(request_id, 4),
                sample(request_id, 5)
            ]
        );
    }

    #[tokio::test]
    async fn stream_yields_catch_up_first() {
        let hub = TrackingHub::new(HubConfig::default());
        let request_id = Uuid::now_v7();
        hub.publish(sample(request_id, 1));
        let stream = hub.subscribe(request_id).into_stream();
        hub.publish(sample(request_id, 2));
        hub.close(request_id);

        let collected: Vec<TrackingSample> =
            tokio::time::timeout(Duration::from_secs(1), stream.collect())
                .await
                .unwrap();
        assert_eq!(collected, vec![sample(request_id, 1), sample(request_id, 2)]);
    }
}
