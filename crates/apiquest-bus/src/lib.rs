use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use apiquest_schema::QuestEvent;
use tokio::sync::{mpsc, RwLock};

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum Topic {
    QuestCompleted,
    BadgeAwarded,
    TrackCompleted,
    TrackReset,
}

impl Topic {
    pub fn from_event(event: &QuestEvent) -> Self {
        match event {
            QuestEvent::QuestCompleted { .. } => Topic::QuestCompleted,
            QuestEvent::BadgeAwarded { .. } => Topic::BadgeAwarded,
            QuestEvent::TrackCompleted { .. } => Topic::TrackCompleted,
            QuestEvent::TrackReset { .. } => Topic::TrackReset,
        }
    }
}

type Subscriber = mpsc::Sender<QuestEvent>;
type Subscribers = Arc<RwLock<HashMap<Topic, Vec<Subscriber>>>>;

pub struct EventBus {
    subscribers: Subscribers,
    capacity: usize,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    pub async fn subscribe(&self, topic: Topic) -> mpsc::Receiver<QuestEvent> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut subs = self.subscribers.write().await;
        subs.entry(topic).or_default().push(tx);
        rx
    }

    pub async fn publish(&self, event: QuestEvent) -> Result<()> {
        self.publisher().publish(event).await
    }

    pub fn publisher(&self) -> BusPublisher {
        BusPublisher {
            subscribers: self.subscribers.clone(),
        }
    }
}

#[derive(Clone)]
pub struct BusPublisher {
    subscribers: Subscribers,
}

impl BusPublisher {
    /// A publisher with no subscribers attached; every event is dropped.
    pub fn detached() -> Self {
        Self {
            subscribers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn publish(&self, event: QuestEvent) -> Result<()> {
        let subs = self.subscribers.read().await;
        deliver(&subs, event);
        Ok(())
    }

    /// Non-blocking publish for synchronous callers.
    /// Returns false when the subscriber table is being modified and the event was dropped.
    pub fn try_publish(&self, event: QuestEvent) -> bool {
        match self.subscribers.try_read() {
            Ok(subs) => {
                deliver(&subs, event);
                true
            }
            Err(_) => false,
        }
    }
}

fn deliver(subs: &HashMap<Topic, Vec<Subscriber>>, event: QuestEvent) {
    let topic = Topic::from_event(&event);
    if let Some(subscribers) = subs.get(&topic) {
        for tx in subscribers {
            let _ = tx.try_send(event.clone());
        }
    }
}
