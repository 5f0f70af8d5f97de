//! Bus port: outbound publishing onto the message bus.

use std::future::Future;

use linkbridge_domain::error::BridgeError;

/// Publish-capable handle to the bus.
///
/// A single handle is created by the bus adapter and cloned into the router
/// and every poll job; clones share one submission point, so concurrent
/// publishes from several tasks are safe. QoS and retain flags are adapter
/// configuration.
pub trait BusPublisher: Clone + Send + Sync + 'static {
    /// Publish `payload` on `topic`.
    ///
    /// Fails fast while the bus is disconnected; callers log and move on.
    fn publish(
        &self,
        topic: &str,
        payload: String,
    ) -> impl Future<Output = Result<(), BridgeError>> + Send;
}
