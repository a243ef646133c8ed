//! Event types for the menugen event system
//!
//! Pipeline stages publish `MenuEvent`s on an `EventBus`; the HTTP layer
//! forwards them to SSE subscribers. Delivery is best-effort: a lagging or
//! absent subscriber never blocks the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Menu pipeline events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MenuEvent {
    /// A new menu record was created by an upload
    MenuCreated {
        menu_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Sections and dishes were persisted; enrichment is starting
    MenuProcessing {
        menu_id: Uuid,
        total_dishes: i64,
        timestamp: DateTime<Utc>,
    },

    /// One dish reached a terminal status
    DishEnriched {
        menu_id: Uuid,
        dish_id: Uuid,
        /// `COMPLETE` or `FAILED`
        status: String,
        has_image: bool,
        timestamp: DateTime<Utc>,
    },

    /// Processed counter advanced
    MenuProgress {
        menu_id: Uuid,
        processed_dishes: i64,
        total_dishes: i64,
        timestamp: DateTime<Utc>,
    },

    /// Every dish task joined; the menu is COMPLETE
    MenuCompleted {
        menu_id: Uuid,
        total_dishes: i64,
        timestamp: DateTime<Utc>,
    },

    /// The menu failed before enrichment
    MenuFailed {
        menu_id: Uuid,
        code: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

impl MenuEvent {
    /// SSE event name
    pub fn event_type(&self) -> &'static str {
        match self {
            MenuEvent::MenuCreated { .. } => "MenuCreated",
            MenuEvent::MenuProcessing { .. } => "MenuProcessing",
            MenuEvent::DishEnriched { .. } => "DishEnriched",
            MenuEvent::MenuProgress { .. } => "MenuProgress",
            MenuEvent::MenuCompleted { .. } => "MenuCompleted",
            MenuEvent::MenuFailed { .. } => "MenuFailed",
        }
    }

    /// Menu the event belongs to
    pub fn menu_id(&self) -> Uuid {
        match self {
            MenuEvent::MenuCreated { menu_id, .. }
            | MenuEvent::MenuProcessing { menu_id, .. }
            | MenuEvent::DishEnriched { menu_id, .. }
            | MenuEvent::MenuProgress { menu_id, .. }
            | MenuEvent::MenuCompleted { menu_id, .. }
            | MenuEvent::MenuFailed { menu_id, .. } => *menu_id,
        }
    }
}

/// Broadcast channel for `MenuEvent`s
///
/// Cloning is cheap; all clones share the same channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<MenuEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// `capacity` is the number of events buffered before slow subscribers
    /// start missing the oldest ones.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<MenuEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: MenuEvent) {
        let _ = self.tx.send(event);
    }
}
