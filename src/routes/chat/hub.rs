use std::collections::HashMap;

use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

const TOPIC_CAPACITY: usize = 128;

/// One broadcast channel per schedule. Frames are pre-serialized JSON so a
/// single send fans out to every subscribed socket; lagging receivers drop
/// frames rather than applying backpressure.
pub struct ChatHub {
    topics: RwLock<HashMap<Uuid, broadcast::Sender<String>>>,
}

impl ChatHub {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub async fn subscribe(&self, schedule_id: Uuid) -> broadcast::Receiver<String> {
        self.topic(schedule_id).await.subscribe()
    }

    /// Best-effort fan-out; a topic with no subscribers swallows the frame.
    pub async fn publish(&self, schedule_id: Uuid, frame: String) {
        let _ = self.topic(schedule_id).await.send(frame);
    }

    /// Drops the topic once its last subscriber is gone.
    pub async fn release(&self, schedule_id: Uuid) {
        let mut topics = self.topics.write().await;
        if let Some(tx) = topics.get(&schedule_id) {
            if tx.receiver_count() == 0 {
                topics.remove(&schedule_id);
            }
        }
    }

    async fn topic(&self, schedule_id: Uuid) -> broadcast::Sender<String> {
        if let Some(tx) = self.topics.read().await.get(&schedule_id) {
            return tx.clone();
        }

        let mut topics = self.topics.write().await;
        topics
            .entry(schedule_id)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_of_the_same_topic_see_the_frame() {
        let hub = ChatHub::new();
        let schedule = Uuid::new_v4();

        let mut a = hub.subscribe(schedule).await;
        let mut b = hub.subscribe(schedule).await;

        hub.publish(schedule, "hello".into()).await;

        assert_eq!(a.recv().await.unwrap(), "hello");
        assert_eq!(b.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn topics_are_isolated_per_schedule() {
        let hub = ChatHub::new();
        let mut a = hub.subscribe(Uuid::new_v4()).await;

        hub.publish(Uuid::new_v4(), "elsewhere".into()).await;

        assert!(
            tokio::time::timeout(std::time::Duration::from_millis(20), a.recv())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let hub = ChatHub::new();
        hub.publish(Uuid::new_v4(), "void".into()).await;
    }

    #[tokio::test]
    async fn release_removes_idle_topics() {
        let hub = ChatHub::new();
        let schedule = Uuid::new_v4();

        let rx = hub.subscribe(schedule).await;
        drop(rx);
        hub.release(schedule).await;

        assert!(hub.topics.read().await.is_empty());
    }

    #[tokio::test]
    async fn release_sweeps_after_an_aborted_forward_task() {
        let hub = ChatHub::new();
        let schedule = Uuid::new_v4();

        // A forward task owns the receiver, like a subscribed socket.
        let mut rx = hub.subscribe(schedule).await;
        let task = tokio::spawn(async move {
            loop {
                if rx.recv().await.is_err() {
                    break;
                }
            }
        });

        // The receiver only drops once the aborted task has finished, so the
        // sweep must happen after awaiting it.
        task.abort();
        let _ = task.await;
        hub.release(schedule).await;

        assert!(hub.topics.read().await.is_empty());
    }
}
