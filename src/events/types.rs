//! Handles returned by the event bus.

use super::EventBus;
use crate::types::{ListenerId, StorageEvent};
use std::sync::Arc;

/// Registration of a callback on an [`EventBus`].
///
/// The callback is unregistered exactly once, when the guard is dropped or
/// [`Listener::unsubscribe`] is called.
pub struct Listener {
    pub(super) id: ListenerId,
    pub(super) bus: Arc<EventBus>,
}

impl Listener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    /// Unregister now instead of at drop.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.bus.remove_listener(self.id);
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener").field("id", &self.id).finish()
    }
}

/// Channel-backed subscription to storage events.
pub struct EventReceiver {
    pub id: ListenerId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<StorageEvent>,
}

impl EventReceiver {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<StorageEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<StorageEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<StorageEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<StorageEvent> {
        self.receiver.try_iter().collect()
    }
}
