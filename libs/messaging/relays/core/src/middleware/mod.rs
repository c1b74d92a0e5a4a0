//! Middleware chain
//!
//! Middleware wrap the handler invocation. Each receives the request context
//! and a [`Next`] continuation; it may inspect or mutate the context before
//! and after calling `next.run(ctx)`, or return without calling it at all.
//!
//! ## Built-in middleware
//!
//! - [`ObservabilityMiddleware`]: span per invocation plus pipeline metrics
//! - [`TimeoutMiddleware`]: deadline enforcement returning 504 envelopes

pub mod observability;
pub mod timeout;

pub use observability::ObservabilityMiddleware;
pub use timeout::TimeoutMiddleware;

use crate::handler::SharedHandler;
use crate::pipeline::PipelineContext;
use async_trait::async_trait;
use std::sync::Arc;
use types::Envelope;

/// A stage wrapped around the handler call
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    async fn handle(&self, ctx: &mut PipelineContext, next: Next) -> anyhow::Result<Envelope>;
}

/// Ordered middleware list shared by every request
pub type MiddlewareChain = Arc<[Arc<dyn Middleware>]>;

/// Continuation invoking the rest of the chain and finally the handler
#[derive(Clone)]
pub struct Next {
    chain: MiddlewareChain,
    index: usize,
    handler: SharedHandler,
}

impl Next {
    pub fn new(chain: MiddlewareChain, handler: SharedHandler) -> Self {
        Self {
            chain,
            index: 0,
            handler,
        }
    }

    /// Middleware remaining after this point
    pub fn remaining(&self) -> usize {
        self.chain.len().saturating_sub(self.index)
    }

    pub async fn run(self, ctx: &mut PipelineContext) -> anyhow::Result<Envelope> {
        match self.chain.get(self.index).cloned() {
            Some(middleware) => {
                let next = Next {
                    chain: Arc::clone(&self.chain),
                    index: self.index + 1,
                    handler: Arc::clone(&self.handler),
                };
                middleware.handle(ctx, next).await
            }
            None => self.handler.handle(ctx.envelope.clone()).await,
        }
    }
}
