use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::entities::OrderStatus;

/// Domain events published by the services after a successful commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    UserRegistered(Uuid),

    // Cart events
    CartItemAdded {
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartItemRemoved {
        user_id: Uuid,
        product_id: Uuid,
        quantity: i32,
    },
    CartCleared {
        user_id: Uuid,
        lines: usize,
    },

    // Order events
    OrderCreated {
        order_id: Uuid,
        user_id: Uuid,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },

    // Catalog events
    ProductCreated(Uuid),
    ProductUpdated(Uuid),
    ProductDeleted(Uuid),
    StockAdjusted {
        product_id: Uuid,
        delta: i32,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::UserRegistered(_) => "user_registered",
            Event::CartItemAdded { .. } => "cart_item_added",
            Event::CartItemRemoved { .. } => "cart_item_removed",
            Event::CartCleared { .. } => "cart_cleared",
            Event::OrderCreated { .. } => "order_created",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::ProductCreated(_) => "product_created",
            Event::ProductUpdated(_) => "product_updated",
            Event::ProductDeleted(_) => "product_deleted",
            Event::StockAdjusted { .. } => "stock_adjusted",
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Publishes without waiting or failing the caller. A full or closed
    /// channel drops the event with a warning.
    pub fn send_or_log(&self, event: Event) {
        let name = event.name();
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!(event = name, "event channel full, dropping event");
                counter!("storefront.events.dropped", 1, "reason" => "full");
            }
            Err(TrySendError::Closed(_)) => {
                warn!(event = name, "event channel closed, dropping event");
                counter!("storefront.events.dropped", 1, "reason" => "closed");
            }
        }
    }
}

/// Creates a bounded event channel.
pub fn channel(capacity: usize) -> (EventSender, mpsc::Receiver<Event>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (EventSender::new(tx), rx)
}

/// Drains the event channel, logging every event, until all senders are dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        counter!("storefront.events.processed", 1, "event" => event.name());
        match &event {
            Event::OrderCreated { order_id, user_id } => {
                info!(%order_id, %user_id, "order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "order status changed");
            }
            Event::StockAdjusted { product_id, delta } => {
                debug!(%product_id, delta, "stock adjusted");
            }
            other => debug!(event = other.name(), "{:?}", other),
        }
    }

    info!("Event processing loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_delivered_in_order() {
        let (sender, mut rx) = channel(4);
        let product_id = Uuid::new_v4();
        sender.send_or_log(Event::ProductCreated(product_id));
        sender.send_or_log(Event::StockAdjusted {
            product_id,
            delta: -2,
        });

        assert_eq!(rx.recv().await, Some(Event::ProductCreated(product_id)));
        assert_eq!(
            rx.recv().await,
            Some(Event::StockAdjusted {
                product_id,
                delta: -2
            })
        );
    }

    #[tokio::test]
    async fn send_or_log_tolerates_closed_channel() {
        let (sender, rx) = channel(1);
        drop(rx);
        sender.send_or_log(Event::UserRegistered(Uuid::new_v4()));
        sender.send_or_log(Event::UserRegistered(Uuid::new_v4()));
    }

    #[tokio::test]
    async fn send_or_log_drops_instead_of_waiting_on_a_full_channel() {
        let (sender, mut rx) = channel(2);
        let first = Uuid::new_v4();
        sender.send_or_log(Event::ProductCreated(first));
        sender.send_or_log(Event::ProductCreated(Uuid::new_v4()));
        // Capacity is exhausted; these return immediately and are dropped.
        for _ in 0..10 {
            sender.send_or_log(Event::ProductDeleted(Uuid::new_v4()));
        }

        assert_eq!(rx.recv().await, Some(Event::ProductCreated(first)));
        assert!(matches!(rx.recv().await, Some(Event::ProductCreated(_))));
        assert!(rx.try_recv().is_err());
    }
}
