use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use aws_config::{BehaviorVersion, SdkConfig};
use tokio::runtime::Runtime;

/// Shared AWS configuration plus the runtime the blocking adapters drive
/// the async SDK clients on.
#[derive(Clone)]
pub struct AwsContext {
    runtime: Arc<Runtime>,
    config: SdkConfig,
}

impl AwsContext {
    /// Loads region and credentials from the default provider chain.
    pub fn load() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to create tokio runtime")?;
        let config = runtime.block_on(aws_config::load_defaults(BehaviorVersion::latest()));
        Ok(Self {
            runtime: Arc::new(runtime),
            config,
        })
    }

    pub fn sdk_config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}
