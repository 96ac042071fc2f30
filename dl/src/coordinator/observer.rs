//! Background observer
//!
//! A detached task watching bus traffic for trouble: bursts of phase
//! errors raise a SystemAlert for the coordinator's next decision. The
//! observer only reads and publishes - it never preempts a phase.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::bus::{HistoryFilter, Message, MessageBus, MessageType};

/// Phase errors within one scan interval that count as a burst
const ERROR_BURST_THRESHOLD: usize = 3;

/// How often the observer scans history
const SCAN_INTERVAL: Duration = Duration::from_millis(500);

/// Spawn the observer; flip the returned sender to stop it
pub fn spawn_observer(bus: Arc<MessageBus>) -> (watch::Sender<bool>, JoinHandle<()>) {
    let (stop_tx, mut stop_rx) = watch::channel(false);

    let handle = tokio::spawn(async move {
        let mut seen_errors = 0usize;
        debug!("Observer started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(SCAN_INTERVAL) => {}
                _ = stop_rx.changed() => {
                    if *stop_rx.borrow() {
                        break;
                    }
                }
            }

            let errors = bus
                .history(
                    HistoryFilter {
                        message_type: Some(MessageType::PhaseError),
                        ..Default::default()
                    },
                    0,
                )
                .len();

            let new_errors = errors.saturating_sub(seen_errors);
            if new_errors >= ERROR_BURST_THRESHOLD {
                warn!(new_errors, "Observer sees a phase error burst");
                bus.publish(
                    Message::to(
                        "coordinator",
                        MessageType::SystemAlert,
                        "observer",
                        json!({"kind": "phase_error_burst", "count": new_errors}),
                    )
                    .with_priority(crate::domain::Priority::Critical),
                );
            }
            seen_errors = errors;
        }

        debug!("Observer stopped");
    });

    (stop_tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::GetOptions;

    #[tokio::test]
    async fn test_observer_flags_error_burst() {
        let bus = Arc::new(MessageBus::new());
        bus.register("coordinator");
        let (stop_tx, handle) = spawn_observer(bus.clone());

        for _ in 0..4 {
            bus.publish(Message::broadcast(
                MessageType::PhaseError,
                "coordinator",
                json!({"phase": "coding"}),
            ));
        }

        tokio::time::sleep(Duration::from_millis(700)).await;

        let alerts = bus.get(
            "coordinator",
            GetOptions {
                message_type: Some(MessageType::SystemAlert),
                ..Default::default()
            },
        );
        assert!(alerts.iter().any(|m| m.payload["kind"] == "phase_error_burst"));

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_observer_quiet_below_threshold() {
        let bus = Arc::new(MessageBus::new());
        bus.register("coordinator");
        let (stop_tx, handle) = spawn_observer(bus.clone());

        bus.publish(Message::broadcast(MessageType::PhaseError, "x", json!({})));
        tokio::time::sleep(Duration::from_millis(700)).await;

        let alerts = bus.get(
            "coordinator",
            GetOptions {
                message_type: Some(MessageType::SystemAlert),
                ..Default::default()
            },
        );
        assert!(alerts.is_empty());

        stop_tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
