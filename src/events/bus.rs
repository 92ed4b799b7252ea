//! Event bus dispatching storage notifications to listeners.

use crate::types::{ListenerId, StorageEvent};
use crossbeam_channel::{bounded, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::types::{EventReceiver, Listener};

/// Default buffer size for channel subscriptions.
const DEFAULT_CHANNEL_BUFFER: usize = 256;

type Callback = Arc<dyn Fn(&StorageEvent) + Send + Sync>;

/// Internal channel subscription state.
struct ChannelSubscriber {
    /// Keys of interest (None = all keys).
    keys: Option<Vec<String>>,
    sender: Sender<StorageEvent>,
}

impl ChannelSubscriber {
    fn matches(&self, event: &StorageEvent) -> bool {
        match self.keys {
            Some(ref keys) => keys.iter().any(|k| event.is_for(k)),
            None => true,
        }
    }
}

/// Synchronous in-process notification channel.
///
/// Callbacks run in registration order on the dispatching thread, before
/// [`EventBus::dispatch`] returns. A callback registered while a dispatch is
/// in progress does not see that dispatch.
pub struct EventBus {
    /// Registered callbacks, ordered by registration.
    listeners: RwLock<BTreeMap<ListenerId, Callback>>,
    /// Channel subscriptions by ID.
    channels: RwLock<HashMap<ListenerId, ChannelSubscriber>>,
    /// Counter for generating listener IDs.
    next_id: AtomicU64,
}

impl EventBus {
    /// Create a bus with no listeners.
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(BTreeMap::new()),
            channels: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_id(&self) -> ListenerId {
        ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Register a callback for every event. Returns its ID; pair with
    /// [`EventBus::remove_listener`].
    pub fn add_listener<F>(&self, callback: F) -> ListenerId
    where
        F: Fn(&StorageEvent) + Send + Sync + 'static,
    {
        let id = self.next_id();
        self.listeners.write().insert(id, Arc::new(callback));
        id
    }

    /// Unregister a callback. Returns false if it was not registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.write().remove(&id).is_some()
    }

    /// Register a callback that stays registered while the returned guard lives.
    pub fn listen<F>(self: &Arc<Self>, callback: F) -> Listener
    where
        F: Fn(&StorageEvent) + Send + Sync + 'static,
    {
        let id = self.add_listener(callback);
        Listener {
            id,
            bus: Arc::clone(self),
        }
    }

    /// Open a channel subscription with the default buffer size.
    pub fn channel(&self, keys: Option<Vec<String>>) -> EventReceiver {
        self.channel_with_buffer(keys, DEFAULT_CHANNEL_BUFFER)
    }

    /// Open a channel subscription. If the receiver falls more than
    /// `buffer_size` events behind, it is dropped and its channel disconnects.
    pub fn channel_with_buffer(&self, keys: Option<Vec<String>>, buffer_size: usize) -> EventReceiver {
        let id = self.next_id();
        let (sender, receiver) = bounded(buffer_size.max(1));

        self.channels
            .write()
            .insert(id, ChannelSubscriber { keys, sender });

        EventReceiver { id, receiver }
    }

    /// Close a channel subscription.
    pub fn close_channel(&self, id: ListenerId) {
        self.channels.write().remove(&id);
    }

    /// Number of registered callbacks.
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Number of open channel subscriptions.
    pub fn channel_count(&self) -> usize {
        self.channels.read().len()
    }

    /// Deliver `event` to every callback and matching channel.
    pub fn dispatch(&self, event: &StorageEvent) {
        // Snapshot so callbacks may (un)register without deadlocking.
        let callbacks: Vec<(ListenerId, Callback)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, callback)| (*id, Arc::clone(callback)))
            .collect();

        tracing::debug!(
            key = %event.key,
            listeners = callbacks.len(),
            "dispatching storage event"
        );

        for (id, callback) in callbacks {
            // Removed by an earlier callback in this dispatch
            if !self.listeners.read().contains_key(&id) {
                continue;
            }
            callback(event);
        }

        self.send_to_channels(event);
    }

    /// Drops subscribers that fail to receive.
    fn send_to_channels(&self, event: &StorageEvent) {
        let mut to_remove = Vec::new();

        {
            let channels = self.channels.read();
            for (id, sub) in channels.iter() {
                if !sub.matches(event) {
                    continue;
                }
                match sub.sender.try_send(event.clone()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        tracing::warn!(id = ?id, key = %event.key, "dropping slow event subscriber");
                        to_remove.push(*id);
                    }
                    Err(TrySendError::Disconnected(_)) => to_remove.push(*id),
                }
            }
        }

        if !to_remove.is_empty() {
            let mut channels = self.channels.write();
            for id in to_remove {
                channels.remove(&id);
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
