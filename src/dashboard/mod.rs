//! The dashboard processors fed by each ingested report.

mod raw;
mod v1;
mod v2;

pub use raw::DashboardRaw;
pub use v1::{CommitEntry, DashboardV1};
pub use v2::{DashboardV2, LastSeen, TestStats};

use crate::conf::Settings;
use crate::processor::Pipeline;
use crate::storage::BlobStore;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Builds the processor pipeline in its fixed order: raw, v1, v2.
pub fn pipeline(settings: &Settings) -> Pipeline {
    Pipeline::new()
        .register(Box::new(DashboardRaw), settings.enable_dashboard_raw)
        .register(Box::new(DashboardV1), settings.enable_dashboard_v1)
        .register(Box::new(DashboardV2), settings.enable_dashboard_v2)
}

/// Reads a JSON dashboard, or `None` if there isn't one yet.
async fn read_json<T: DeserializeOwned>(
    store: &dyn BlobStore,
    container: &str,
    name: &str,
) -> Result<Option<T>> {
    match store.get_blob(container, name).await? {
        Some(content) => serde_json::from_slice(&content)
            .map(Some)
            .with_context(|| format!("Dashboard {:?} in {:?} is corrupt", name, container)),
        None => Ok(None),
    }
}

async fn write_json<T: Serialize>(
    store: &dyn BlobStore,
    container: &str,
    name: &str,
    value: &T,
) -> Result<()> {
    let content = serde_json::to_vec(value)
        .with_context(|| format!("Failed to serialize dashboard {:?}", name))?;
    store.put_blob(container, name, content).await
}
