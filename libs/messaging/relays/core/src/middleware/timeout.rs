//! Timeout middleware
//!
//! Races the rest of the chain against a deadline. The continuation runs as
//! its own task so that on expiry the middleware can return immediately: the
//! task is abandoned, never joined, and its result is discarded. The request's
//! cancellation token is cancelled so cooperative work can stop early.

use super::{Middleware, Next};
use crate::common::RelayError;
use crate::pipeline::{keys, ContextValue, PipelineContext};
use async_trait::async_trait;
use config::TimeoutConfig;
use tracing::warn;
use types::Envelope;

/// Deadline enforcement
#[derive(Debug, Clone)]
pub struct TimeoutMiddleware {
    config: TimeoutConfig,
}

impl TimeoutMiddleware {
    pub fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TimeoutConfig {
        &self.config
    }
}

#[async_trait]
impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &str {
        "timeout"
    }

    async fn handle(&self, ctx: &mut PipelineContext, next: Next) -> anyhow::Result<Envelope> {
        let Some(deadline) = self.config.duration() else {
            return next.run(ctx).await;
        };

        let mut task_ctx = ctx.clone();
        let task = tokio::spawn(async move {
            let result = next.run(&mut task_ctx).await;
            (task_ctx, result)
        });

        match tokio::time::timeout(deadline, task).await {
            Ok(Ok((task_ctx, result))) => {
                *ctx = task_ctx;
                result
            }
            Ok(Err(join_err)) => {
                if join_err.is_panic() {
                    let payload = join_err.into_panic();
                    Err(anyhow::anyhow!(crate::panic_message(payload.as_ref())))
                } else {
                    Err(anyhow::anyhow!("request task cancelled: {}", join_err))
                }
            }
            Err(_elapsed) => {
                ctx.cancellation.cancel();
                ctx.set(keys::TIMEOUT, ContextValue::Flag(true));
                warn!(
                    "Port {} exceeded {:?}, abandoning request",
                    ctx.port_name, deadline
                );
                let mut response = RelayError::Timeout(deadline).to_envelope();
                response.inherit_trace(&ctx.envelope);
                Ok(response)
            }
        }
    }
}
