//! Raw dashboard: a compressed digest of each uploaded report.

use crate::decode::gzip;
use crate::processor::{Context, Processor};
use crate::report::{collect_tests, Metadata, TestOutcome};
use anyhow::{Context as _, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, instrument};

/// Stores a compact, compressed digest of every report, one blob per
/// upload.
pub struct DashboardRaw;

#[derive(Serialize)]
struct Digest<'a> {
    metadata: &'a Metadata,
    tests: &'a [TestOutcome],
}

impl DashboardRaw {
    pub fn key(metadata: &Metadata, upload_name: &str) -> String {
        format!(
            "raw/{}/{}/{}",
            metadata.branch, metadata.commit_sha, upload_name
        )
    }
}

#[async_trait]
impl Processor for DashboardRaw {
    fn name(&self) -> &'static str {
        "raw"
    }

    #[instrument(skip_all, fields(name = context.name))]
    async fn process(&self, context: &Context<'_>, report: &Value) -> Result<()> {
        let metadata = Metadata::from_report(report);
        let tests = collect_tests(report);
        let digest = serde_json::to_vec(&Digest {
            metadata: &metadata,
            tests: &tests,
        })
        .context("Failed to serialize raw digest")?;
        let key = Self::key(&metadata, context.name);
        context
            .store
            .put_blob(
                &context.settings.dashboards_bucket,
                &key,
                gzip(digest).await?,
            )
            .await?;
        info!(tests = tests.len(), "Wrote raw digest {}", key);
        Ok(())
    }
}
