//! Notification and indication subscriptions

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// The kind of server initiated update of a characteristic value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    Notification,
    Indication,
}

impl SubscriptionKind {
    /// Get the value of the kind in a subscribe command
    pub fn to_command_val(&self) -> u8 {
        match self {
            SubscriptionKind::Notification => 1,
            SubscriptionKind::Indication => 2,
        }
    }
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SubscriptionKind::Notification => f.write_str("notification"),
            SubscriptionKind::Indication => f.write_str("indication"),
        }
    }
}

/// A characteristic value received through a subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: SubscriptionKind,
    /// UUID of the characteristic within the attribute database
    pub uuid: String,
    pub value_handle: u16,
    /// The value, exactly as long as the length given in the event
    pub data: Vec<u8>,
}

/// Callback for received notifications and indications
pub type NotificationCallback = Arc<dyn Fn(Notification) + Send + Sync>;

/// An active subscription
#[derive(Clone)]
pub struct Subscription {
    /// Identifier assigned by the daemon
    pub id: u8,
    pub kind: SubscriptionKind,
    pub value_handle: u16,
    pub uuid: String,
    pub callback: NotificationCallback,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("value_handle", &self.value_handle)
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

/// The active subscriptions of a session, keyed by subscription id
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: HashMap<u8, Subscription>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription
    ///
    /// Any previous subscription with the same id is replaced and returned.
    pub fn insert(&mut self, subscription: Subscription) -> Option<Subscription> {
        self.entries.insert(subscription.id, subscription)
    }

    pub fn remove(&mut self, id: u8) -> Option<Subscription> {
        self.entries.remove(&id)
    }

    pub fn get(&self, id: u8) -> Option<&Subscription> {
        self.entries.get(&id)
    }

    pub fn by_value_handle(&self, value_handle: u16) -> Option<&Subscription> {
        self.entries.values().find(|s| s.value_handle == value_handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear()
    }

    /// Build the notification for a received value
    ///
    /// The callback is returned alongside it so that it can be called after any lock around the
    /// table is released. `None` is returned if `id` is not an active subscription.
    pub fn route(&self, id: u8, value_handle: u16, data: Vec<u8>) -> Option<(NotificationCallback, Notification)> {
        let subscription = self.get(id)?;

        if subscription.value_handle != value_handle {
            log::debug!(
                "subscription {} is for handle 0x{:04x} but the value is for 0x{:04x}",
                id,
                subscription.value_handle,
                value_handle
            );
        }

        let notification = Notification {
            kind: subscription.kind,
            uuid: subscription.uuid.clone(),
            value_handle,
            data,
        };

        Some((subscription.callback.clone(), notification))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn route_to_subscription() {
        let received = Arc::new(Mutex::new(Vec::new()));

        let sink = received.clone();

        let mut table = SubscriptionTable::new();

        table.insert(Subscription {
            id: 3,
            kind: SubscriptionKind::Notification,
            value_handle: 0x12,
            uuid: "2a37".into(),
            callback: Arc::new(move |n| sink.lock().unwrap().push(n)),
        });

        assert_eq!(3, table.by_value_handle(0x12).unwrap().id);

        let (callback, notification) = table.route(3, 0x12, vec![1, 2]).unwrap();

        callback(notification);

        assert!(table.route(4, 0x12, vec![1]).is_none());

        table.remove(3);

        assert!(table.route(3, 0x12, vec![1]).is_none());

        assert!(table.is_empty());

        let received = received.lock().unwrap();

        assert_eq!(1, received.len());

        assert_eq!("2a37", received[0].uuid);

        assert_eq!(vec![1, 2], received[0].data);
    }
}
