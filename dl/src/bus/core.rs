//! MessageBus implementation
//!
//! Fine-grained locking: queues, subscribers, history and pending requests
//! each sit behind their own mutex, so a slow subscriber callback never
//! blocks a request reply.

use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::json;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::Priority;
use patternstore::now_ms;

use super::message::{Message, MessageType};

/// Default bound on the history ring buffer
pub const DEFAULT_HISTORY_CAP: usize = 10_000;

/// Default per-recipient queue cap
pub const DEFAULT_QUEUE_CAP: usize = 1_000;

/// Errors surfaced by bus operations
#[derive(Debug, Error)]
pub enum BusError {
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Bus is shut down")]
    Closed,
}

/// Options for draining a recipient's queue
#[derive(Debug, Clone, Default)]
pub struct GetOptions {
    /// Only messages of exactly this priority
    pub priority: Option<Priority>,
    /// Only messages of this type
    pub message_type: Option<MessageType>,
    /// Maximum number of messages to drain (0 = unlimited)
    pub limit: usize,
}

/// Filter for history queries
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    pub message_type: Option<MessageType>,
    pub sender: Option<String>,
}

/// Priority classes, drained high to low; FIFO within a class
const PRIORITY_CLASSES: [Priority; 4] = [Priority::Critical, Priority::High, Priority::Normal, Priority::Low];

#[derive(Default)]
struct RecipientQueue {
    classes: HashMap<Priority, VecDeque<Message>>,
}

impl RecipientQueue {
    fn push(&mut self, msg: Message) {
        self.classes.entry(msg.priority).or_default().push_back(msg);
    }

    fn len(&self) -> usize {
        self.classes.values().map(|q| q.len()).sum()
    }

    /// Remove the oldest message of the lowest populated priority class
    fn drop_lowest_oldest(&mut self) -> Option<Message> {
        for priority in PRIORITY_CLASSES.iter().rev() {
            if let Some(queue) = self.classes.get_mut(priority)
                && let Some(msg) = queue.pop_front()
            {
                return Some(msg);
            }
        }
        None
    }

    fn drain(&mut self, opts: &GetOptions, now: i64) -> Vec<Message> {
        let limit = if opts.limit == 0 { usize::MAX } else { opts.limit };
        let mut out = Vec::new();

        for priority in PRIORITY_CLASSES {
            if let Some(wanted) = opts.priority
                && wanted != priority
            {
                continue;
            }
            let Some(queue) = self.classes.get_mut(&priority) else {
                continue;
            };

            let mut kept = VecDeque::new();
            while let Some(msg) = queue.pop_front() {
                if msg.is_expired(now) {
                    debug!(id = %msg.id, "Dropping expired message at delivery");
                    continue;
                }
                let type_matches = opts.message_type.map(|t| t == msg.message_type).unwrap_or(true);
                if type_matches && out.len() < limit {
                    out.push(msg);
                } else {
                    kept.push_back(msg);
                }
            }
            *queue = kept;

            if out.len() >= limit {
                break;
            }
        }

        out
    }
}

type Handler = Box<dyn Fn(&Message) + Send + Sync>;

struct Subscriber {
    recipient: String,
    type_filter: Option<Vec<MessageType>>,
    handler: Handler,
}

/// In-process publish/subscribe bus with priorities, correlation ids and
/// bounded history
pub struct MessageBus {
    queues: Mutex<HashMap<String, RecipientQueue>>,
    subscribers: Mutex<Vec<Subscriber>>,
    history: Mutex<VecDeque<Message>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Message>>>,
    history_cap: usize,
    queue_cap: usize,
    closed: Mutex<bool>,
}

impl MessageBus {
    pub fn new() -> Self {
        Self::with_caps(DEFAULT_HISTORY_CAP, DEFAULT_QUEUE_CAP)
    }

    pub fn with_caps(history_cap: usize, queue_cap: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(Vec::new()),
            history: Mutex::new(VecDeque::new()),
            pending: Mutex::new(HashMap::new()),
            history_cap,
            queue_cap,
            closed: Mutex::new(false),
        }
    }

    /// Register a recipient so broadcasts reach its queue
    pub fn register(&self, recipient: impl Into<String>) {
        let recipient = recipient.into();
        debug!(%recipient, "Registering bus recipient");
        self.queues.lock().unwrap().entry(recipient).or_default();
    }

    /// Remove a recipient and its pending queue
    pub fn unregister(&self, recipient: &str) {
        debug!(%recipient, "Unregistering bus recipient");
        self.queues.lock().unwrap().remove(recipient);
    }

    /// Publish a message: enqueue for its recipient (or all registered
    /// recipients when broadcast), notify matching subscribers, record in
    /// history.
    pub fn publish(&self, msg: Message) {
        if *self.closed.lock().unwrap() {
            warn!(id = %msg.id, "Publish after shutdown dropped");
            return;
        }

        // Route responses straight to the waiting requester
        if msg.message_type == MessageType::Response
            && let Some(correlation_id) = &msg.correlation_id
            && let Some(tx) = self.pending.lock().unwrap().remove(correlation_id)
        {
            self.record_history(msg.clone());
            let _ = tx.send(msg);
            return;
        }

        self.record_history(msg.clone());
        self.enqueue(&msg);
        self.notify_subscribers(&msg);
    }

    /// Drain matching messages for a recipient, FIFO within priority,
    /// CRITICAL first. Expired messages are dropped here, not proactively.
    pub fn get(&self, recipient: &str, opts: GetOptions) -> Vec<Message> {
        let now = now_ms();
        let mut queues = self.queues.lock().unwrap();
        match queues.get_mut(recipient) {
            Some(queue) => queue.drain(&opts, now),
            None => Vec::new(),
        }
    }

    /// Register a handler invoked synchronously on every matching publish
    ///
    /// Handler panics are caught, logged and recorded as a SystemWarning;
    /// delivery to other subscribers proceeds.
    pub fn subscribe(
        &self,
        recipient: impl Into<String>,
        type_filter: Option<Vec<MessageType>>,
        handler: impl Fn(&Message) + Send + Sync + 'static,
    ) {
        self.subscribers.lock().unwrap().push(Subscriber {
            recipient: recipient.into(),
            type_filter,
            handler: Box::new(handler),
        });
    }

    /// Correlation-id request/response: publishes a Request addressed to
    /// `recipient` and waits for the matching Response.
    pub async fn request(
        &self,
        recipient: &str,
        sender: &str,
        payload: serde_json::Value,
        timeout: Duration,
    ) -> Result<Message, BusError> {
        if *self.closed.lock().unwrap() {
            return Err(BusError::Closed);
        }

        let correlation_id = Uuid::now_v7().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(correlation_id.clone(), tx);

        let msg = Message::to(recipient, MessageType::Request, sender, payload)
            .with_priority(Priority::High)
            .with_correlation(&correlation_id);
        self.publish(msg);

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(BusError::Closed),
            Err(_) => {
                self.pending.lock().unwrap().remove(&correlation_id);
                Err(BusError::Timeout(timeout))
            }
        }
    }

    /// Publish the response to a previously received request
    pub fn respond(&self, request: &Message, sender: &str, payload: serde_json::Value) {
        let Some(correlation_id) = &request.correlation_id else {
            warn!(id = %request.id, "Respond called on a message without correlation id");
            return;
        };
        let msg = Message::to(&request.sender, MessageType::Response, sender, payload)
            .with_priority(Priority::High)
            .with_correlation(correlation_id);
        self.publish(msg);
    }

    /// Search the bounded history, newest last
    pub fn history(&self, filter: HistoryFilter, limit: usize) -> Vec<Message> {
        let history = self.history.lock().unwrap();
        let limit = if limit == 0 { usize::MAX } else { limit };
        history
            .iter()
            .filter(|msg| {
                filter.message_type.map(|t| t == msg.message_type).unwrap_or(true)
                    && filter.sender.as_deref().map(|s| s == msg.sender).unwrap_or(true)
            })
            .rev()
            .take(limit)
            .cloned()
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect()
    }

    /// Stop accepting publishes; pending requests are cancelled after the
    /// grace period.
    pub async fn shutdown(&self, grace: Duration) {
        tokio::time::sleep(grace.min(Duration::from_secs(5))).await;
        *self.closed.lock().unwrap() = true;
        self.pending.lock().unwrap().clear();
        debug!("Message bus shut down");
    }

    fn enqueue(&self, msg: &Message) {
        let mut queues = self.queues.lock().unwrap();
        let mut overflowed: Vec<String> = Vec::new();

        match &msg.recipient {
            Some(recipient) => {
                let queue = queues.entry(recipient.clone()).or_default();
                queue.push(msg.clone());
                if queue.len() > self.queue_cap {
                    queue.drop_lowest_oldest();
                    overflowed.push(recipient.clone());
                }
            }
            None => {
                for (recipient, queue) in queues.iter_mut() {
                    queue.push(msg.clone());
                    if queue.len() > self.queue_cap {
                        queue.drop_lowest_oldest();
                        overflowed.push(recipient.clone());
                    }
                }
            }
        }
        drop(queues);

        // Overflow raises an alert; guard against alerting about alerts
        if msg.message_type != MessageType::SystemAlert {
            for recipient in overflowed {
                warn!(%recipient, "Queue overflow, dropped lowest-priority oldest message");
                self.publish(
                    Message::broadcast(
                        MessageType::SystemAlert,
                        "bus",
                        json!({"kind": "queue_overflow", "recipient": recipient}),
                    )
                    .with_priority(Priority::High),
                );
            }
        }
    }

    fn notify_subscribers(&self, msg: &Message) {
        let subscribers = self.subscribers.lock().unwrap();
        let mut panicked = Vec::new();

        for sub in subscribers.iter() {
            let addressed = msg.broadcast || msg.recipient.as_deref() == Some(sub.recipient.as_str());
            if !addressed {
                continue;
            }
            if let Some(filter) = &sub.type_filter
                && !filter.contains(&msg.message_type)
            {
                continue;
            }

            let result = std::panic::catch_unwind(AssertUnwindSafe(|| (sub.handler)(msg)));
            if result.is_err() {
                warn!(recipient = %sub.recipient, id = %msg.id, "Subscriber handler panicked");
                panicked.push(sub.recipient.clone());
            }
        }
        drop(subscribers);

        if msg.message_type != MessageType::SystemWarning {
            for recipient in panicked {
                self.publish(Message::broadcast(
                    MessageType::SystemWarning,
                    "bus",
                    json!({"kind": "handler_panic", "recipient": recipient, "message_id": msg.id}),
                ));
            }
        }
    }

    fn record_history(&self, msg: Message) {
        let mut history = self.history.lock().unwrap();
        history.push_back(msg);
        while history.len() > self.history_cap {
            history.pop_front();
        }
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}
