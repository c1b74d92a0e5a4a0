//! Outbound adapter boundary
//!
//! Adapters translate an envelope into a protocol-native request (HTTP call,
//! RPC, publish) for a target and translate the reply back. The runtime only
//! sees this trait.

use crate::{OutboundTarget, SinkError};
use async_trait::async_trait;
use std::sync::Arc;
use types::Envelope;

/// Protocol client reachable by adapter name
#[async_trait]
pub trait OutboundAdapter: Send + Sync {
    /// Name targets refer to in `adapter`
    fn name(&self) -> &str;

    /// Request/response exchange with `target`
    async fn request(
        &self,
        target: &OutboundTarget,
        envelope: Envelope,
    ) -> Result<Envelope, SinkError>;

    /// Fire-and-forget delivery; defaults to a request with the reply dropped
    async fn send(&self, target: &OutboundTarget, envelope: Envelope) -> Result<(), SinkError> {
        self.request(target, envelope).await.map(|_| ())
    }
}

pub type SharedAdapter = Arc<dyn OutboundAdapter>;
