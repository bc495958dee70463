//! CLI commands

pub mod cache;
pub mod config;
pub mod replay;
pub mod serve;
pub mod stats;

use scout::ServiceContext;
use scout_core::config::ScoutConfig;
use scout_core::error::ScoutResult;
use std::future::Future;

/// Run `f` against a freshly initialized context, then shut it down.
///
/// The command's error wins over a shutdown error.
pub async fn with_context<T, F, Fut>(config: ScoutConfig, f: F) -> ScoutResult<T>
where
    F: FnOnce(&ServiceContext) -> Fut,
    Fut: Future<Output = ScoutResult<T>>,
{
    let context = ServiceContext::initialize(config).await?;
    let result = f(&context).await;
    let shutdown = context.shutdown().await.into_result();
    let value = result?;
    shutdown?;
    Ok(value)
}
