//! Discovery transports
//!
//! A transport turns a service-type subscription into a stream of
//! [`TransportEvent`]s delivered over an `async_channel`. The session only
//! talks to the [`DiscoveryTransport`] trait; [`MdnsTransport`](crate::MdnsTransport)
//! browses the network, [`ChannelTransport`] is fed by its host.

use async_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::{DiscoveryError, Result};
use crate::types::TransportEvent;

/// Source of raw discovery notifications
pub trait DiscoveryTransport: Send + Sync {
    /// Starts browsing for `service_type`.
    ///
    /// Events are delivered on the returned channel until
    /// [`unsubscribe`](Self::unsubscribe) is called, after which the channel
    /// is closed.
    fn subscribe(&self, service_type: &str, capacity: usize) -> Result<Receiver<TransportEvent>>;

    /// Stops browsing for `service_type`. Unknown service types are ignored.
    fn unsubscribe(&self, service_type: &str) -> Result<()>;

    /// Asks the transport to resolve a service previously reported as found.
    ///
    /// The outcome arrives later as a `Resolved` or `ResolveFailed` event.
    fn resolve(&self, service_type: &str, name: &str) -> Result<()>;
}

#[derive(Debug, Default)]
struct ChannelState {
    subscription: Option<(String, Sender<TransportEvent>)>,
    deny_reason: Option<String>,
    resolve_requests: Vec<String>,
}

/// Transport whose events are pushed by the host.
///
/// Used by applications that receive discovery callbacks from a platform
/// service themselves, and by tests. Cloning yields another handle to the
/// same transport.
#[derive(Debug, Clone, Default)]
pub struct ChannelTransport {
    state: Arc<Mutex<ChannelState>>,
}

impl ChannelTransport {
    /// Creates a transport with no subscriber
    pub fn new() -> Self {
        Self::default()
    }

    /// Delivers `event` to the current subscriber, waiting for channel space.
    ///
    /// Returns false when nobody is subscribed.
    pub async fn emit(&self, event: TransportEvent) -> bool {
        let Some(sender) = self.sender() else {
            debug!(event = event.kind(), "No subscriber, event dropped");
            return false;
        };
        sender.send(event).await.is_ok()
    }

    /// Delivers `event` without waiting; false when there is no subscriber
    /// or the channel is full.
    pub fn try_emit(&self, event: TransportEvent) -> bool {
        let Some(sender) = self.sender() else {
            return false;
        };
        match sender.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to deliver discovery event");
                false
            }
        }
    }

    /// Returns true while a subscription is open
    pub fn is_subscribed(&self) -> bool {
        self.state.lock().subscription.is_some()
    }

    /// Service type of the open subscription, if any
    pub fn subscribed_service_type(&self) -> Option<String> {
        self.state
            .lock()
            .subscription
            .as_ref()
            .map(|(service_type, _)| service_type.clone())
    }

    /// Makes subsequent `subscribe` calls fail with `reason` (or succeed
    /// again when `None`).
    pub fn deny_subscriptions(&self, reason: Option<&str>) {
        self.state.lock().deny_reason = reason.map(str::to_string);
    }

    /// Names passed to `resolve`, in call order
    pub fn resolve_requests(&self) -> Vec<String> {
        self.state.lock().resolve_requests.clone()
    }

    fn sender(&self) -> Option<Sender<TransportEvent>> {
        self.state
            .lock()
            .subscription
            .as_ref()
            .map(|(_, sender)| sender.clone())
    }
}

impl DiscoveryTransport for ChannelTransport {
    fn subscribe(&self, service_type: &str, capacity: usize) -> Result<Receiver<TransportEvent>> {
        let mut state = self.state.lock();

        if let Some(reason) = &state.deny_reason {
            return Err(DiscoveryError::SubscribeFailed {
                service_type: service_type.to_string(),
                reason: reason.clone(),
            });
        }

        let (tx, rx) = async_channel::bounded(capacity.max(1));
        if let Some((previous, old)) = state.subscription.replace((service_type.to_string(), tx)) {
            debug!(service_type = %previous, "Replacing existing subscription");
            old.close();
        }
        Ok(rx)
    }

    fn unsubscribe(&self, service_type: &str) -> Result<()> {
        let mut state = self.state.lock();
        let matches = state
            .subscription
            .as_ref()
            .is_some_and(|(current, _)| current == service_type);

        if matches {
            if let Some((_, sender)) = state.subscription.take() {
                sender.close();
            }
        }
        Ok(())
    }

    fn resolve(&self, _service_type: &str, name: &str) -> Result<()> {
        self.state.lock().resolve_requests.push(name.to_string());
        Ok(())
    }
}
