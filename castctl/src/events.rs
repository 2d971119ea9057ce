//! Crossbeam-channel event fan-out for scanner and device events.

use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::device::Device;
use crate::model::MediaStatus;

/// Events emitted by the discovery reconciler.
#[derive(Clone)]
pub enum ScannerEvent {
    /// Fired exactly once per identity, once both a friendly name and an
    /// address are known.
    DeviceFound(Device),
}

/// Events emitted by a device session client.
#[derive(Clone, Debug)]
pub enum DeviceEvent {
    Connected,
    /// A status notification, re-emitted in transport delivery order.
    Status(MediaStatus),
    /// Playback reached its natural end (idle with a "finished" reason).
    Finished,
    Closed,
    Error(String),
}

/// Unbounded fan-out bus; senders whose receiver side hung up are dropped
/// on the next broadcast.
#[derive(Clone)]
pub(crate) struct EventBus<E: Clone> {
    subscribers: Arc<Mutex<Vec<Sender<E>>>>,
}

impl<E: Clone> EventBus<E> {
    pub(crate) fn new() -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn subscribe(&self) -> Receiver<E> {
        let (tx, rx) = unbounded::<E>();
        {
            let mut subscribers = self.subscribers.lock().unwrap();
            subscribers.push(tx);
        }
        rx
    }

    pub(crate) fn broadcast(&self, event: E) {
        let mut subscribers = self.subscribers.lock().unwrap();
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

pub(crate) type ScannerEventBus = EventBus<ScannerEvent>;
pub(crate) type DeviceEventBus = EventBus<DeviceEvent>;
