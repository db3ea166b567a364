//! Live device state fed in by the host platform.

use tokio::sync::watch;

use crate::constraints::{DeviceConditions, NetworkState};

/// Publisher side: the host pushes network/battery changes here and every
/// scheduled run waiting on its constraints re-evaluates.
#[derive(Clone)]
pub struct DeviceMonitor {
    sender: watch::Sender<DeviceConditions>,
}

impl DeviceMonitor {
    pub fn new(initial: DeviceConditions) -> Self {
        let (sender, _) = watch::channel(initial);
        Self { sender }
    }

    /// Connected to an unmetered network with a healthy battery.
    pub fn online() -> Self {
        Self::new(DeviceConditions {
            network: NetworkState::Unmetered,
            battery_low: false,
            device_idle: false,
        })
    }

    pub fn update(&self, conditions: DeviceConditions) {
        self.sender.send_replace(conditions);
    }

    pub fn current(&self) -> DeviceConditions {
        *self.sender.borrow()
    }

    pub fn watch(&self) -> watch::Receiver<DeviceConditions> {
        self.sender.subscribe()
    }
}
