//! Broadcast hub for live log subscribers
//!
//! A single coordinating task owns the subscriber set; registration,
//! unregistration, and broadcast all arrive as messages on its command
//! channel, so the set is only ever mutated by that task. Each subscriber
//! has a bounded outbound queue — a full queue means the subscriber is
//! evicted rather than the broadcaster blocking.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::models::LogEntry;

/// Outbound frames buffered per subscriber before it is considered slow.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 256;

enum Command {
    Register {
        id: u64,
        sender: mpsc::Sender<Arc<str>>,
    },
    Unregister {
        id: u64,
    },
    Broadcast {
        payload: Arc<str>,
    },
}

/// Handle to the hub's coordinating task. Cheap to clone.
#[derive(Clone)]
pub struct Hub {
    commands: mpsc::UnboundedSender<Command>,
    subscriber_count: Arc<AtomicUsize>,
    next_id: Arc<AtomicU64>,
}

/// A registered subscriber's receiving end.
pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<Arc<str>>,
}

impl Hub {
    /// Spawn the coordinating task and return a handle to it.
    pub fn spawn() -> Self {
        let (commands, rx) = mpsc::unbounded_channel();
        let subscriber_count = Arc::new(AtomicUsize::new(0));

        tokio::spawn(run(rx, subscriber_count.clone()));

        Self {
            commands,
            subscriber_count,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Register a fresh subscriber and hand back its queue.
    pub fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let _ = self.commands.send(Command::Register { id, sender });
        Subscription { id, receiver }
    }

    /// Remove a subscriber and release its queue. Safe to call repeatedly.
    pub fn unsubscribe(&self, id: u64) {
        let _ = self.commands.send(Command::Unregister { id });
    }

    /// Serialize the entries once and deliver the payload to every current
    /// subscriber. Fire-and-forget: never blocks or fails the caller.
    pub fn broadcast(&self, entries: &[LogEntry]) {
        let payload = match serde_json::to_string(entries) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!(error = %e, "failed to serialize entries for broadcast");
                return;
            }
        };
        let _ = self.commands.send(Command::Broadcast {
            payload: payload.into(),
        });
    }

    /// Current live-subscriber count, readable without the coordinator.
    pub fn subscriber_count(&self) -> usize {
        self.subscriber_count.load(Ordering::Relaxed)
    }
}

async fn run(mut commands: mpsc::UnboundedReceiver<Command>, count: Arc<AtomicUsize>) {
    let mut subscribers: HashMap<u64, mpsc::Sender<Arc<str>>> = HashMap::new();

    while let Some(command) = commands.recv().await {
        match command {
            Command::Register { id, sender } => {
                subscribers.insert(id, sender);
                count.store(subscribers.len(), Ordering::Relaxed);
                tracing::debug!(subscribers = subscribers.len(), "subscriber connected");
            }
            Command::Unregister { id } => {
                if subscribers.remove(&id).is_some() {
                    count.store(subscribers.len(), Ordering::Relaxed);
                    tracing::debug!(subscribers = subscribers.len(), "subscriber disconnected");
                }
            }
            Command::Broadcast { payload } => {
                let mut evicted = Vec::new();
                for (id, sender) in &subscribers {
                    match sender.try_send(payload.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::warn!(subscriber = id, "evicting slow subscriber");
                            evicted.push(*id);
                        }
                        Err(TrySendError::Closed(_)) => {
                            evicted.push(*id);
                        }
                    }
                }
                if !evicted.is_empty() {
                    for id in evicted {
                        subscribers.remove(&id);
                    }
                    count.store(subscribers.len(), Ordering::Relaxed);
                }
            }
        }
    }

    tracing::info!("broadcast hub shutting down");
}
