//! Defines report processors and the ordered pipeline that runs them.

use crate::conf::Settings;
use crate::storage::BlobStore;
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument};

/// What a processor gets to see besides the report itself.
pub struct Context<'a> {
    /// The name of the upload that carried the report.
    pub name: &'a str,

    /// Where processors read and write their outputs.
    pub store: &'a dyn BlobStore,

    pub settings: &'a Settings,
}

/// A consumer of report documents.
#[async_trait]
pub trait Processor: Send + Sync {
    /// A short, stable identifier used in logs and configuration.
    fn name(&self) -> &'static str;

    /// Process a single report.
    async fn process(&self, context: &Context<'_>, report: &Value) -> Result<()>;
}

struct Registration {
    processor: Box<dyn Processor>,
    enabled: bool,
}

/// An ordered list of processors, each individually switchable.
#[derive(Default)]
pub struct Pipeline {
    registrations: Vec<Registration>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a processor. Registration order is execution order.
    pub fn register(mut self, processor: Box<dyn Processor>, enabled: bool) -> Self {
        self.registrations.push(Registration { processor, enabled });
        self
    }

    /// The names of all registered processors with their switch.
    pub fn registered(&self) -> Vec<(&'static str, bool)> {
        self.registrations
            .iter()
            .map(|r| (r.processor.name(), r.enabled))
            .collect()
    }

    /// The names of the processors that will run, in order.
    pub fn enabled_names(&self) -> Vec<&'static str> {
        self.registrations
            .iter()
            .filter(|r| r.enabled)
            .map(|r| r.processor.name())
            .collect()
    }

    /// Runs every enabled processor against the report, one at a
    /// time, so that only one processor's working set is alive at
    /// once. Stops at the first failure.
    #[instrument(skip_all, fields(name = context.name))]
    pub async fn run(&self, context: &Context<'_>, report: &Value) -> Result<()> {
        for registration in self.registrations.iter().filter(|r| r.enabled) {
            let name = registration.processor.name();
            info!("Running processor {}", name);
            registration
                .processor
                .process(context, report)
                .await
                .with_context(|| format!("Processor {} failed", name))?;
        }
        Ok(())
    }
}
