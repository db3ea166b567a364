use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::{db::TargetId, refresh::DisplaySignal};

const CHANNEL_CAPACITY: usize = 64;

/// Emitted after a widget's weather has been written.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WidgetRefreshed {
    pub target_id: TargetId,
    pub refreshed_at: DateTime<Utc>,
}

/// Fans refresh notifications out to every subscribed renderer.
#[derive(Clone)]
pub struct BroadcastDisplaySignal {
    sender: broadcast::Sender<WidgetRefreshed>,
}

impl BroadcastDisplaySignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WidgetRefreshed> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastDisplaySignal {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplaySignal for BroadcastDisplaySignal {
    fn notify_refreshed(&self, target_id: TargetId) -> Result<()> {
        let event = WidgetRefreshed {
            target_id,
            refreshed_at: Utc::now(),
        };

        // Nobody drawing right now is fine; they read the store when they attach.
        if self.sender.send(event).is_err() {
            debug!("no renderer subscribed for widget {target_id}");
        }
        Ok(())
    }
}
