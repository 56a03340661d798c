//! V2 dashboard: running outcome counters per test and branch.

use super::{read_json, write_json};
use crate::processor::{Context, Processor};
use crate::report::{collect_tests, Metadata, Outcome};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// Keeps, per branch, running outcome counters for every test ever
/// reported.
pub struct DashboardV2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastSeen {
    pub sha: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestStats {
    pub expected: u64,
    pub flaky: u64,
    pub unexpected: u64,
    pub skipped: u64,
    pub last_seen: LastSeen,
}

impl TestStats {
    fn count(&mut self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Expected => &mut self.expected,
            Outcome::Flaky => &mut self.flaky,
            Outcome::Unexpected => &mut self.unexpected,
            Outcome::Skipped => &mut self.skipped,
        };
        *counter = counter.saturating_add(1);
    }
}

impl DashboardV2 {
    pub fn key(branch: &str) -> String {
        format!("v2/{}.json", branch)
    }
}

#[async_trait]
impl Processor for DashboardV2 {
    fn name(&self) -> &'static str {
        "v2"
    }

    #[instrument(skip_all, fields(name = context.name))]
    async fn process(&self, context: &Context<'_>, report: &Value) -> Result<()> {
        let metadata = Metadata::from_report(report);
        let bucket = &context.settings.dashboards_bucket;
        let key = Self::key(&metadata.branch);
        let mut stats: BTreeMap<String, TestStats> = read_json(context.store, bucket, &key)
            .await?
            .unwrap_or_default();

        let now = Utc::now();
        for test in collect_tests(report) {
            let last_seen = LastSeen {
                sha: metadata.commit_sha.clone(),
                updated_at: now,
            };
            let entry = stats.entry(test.id.key()).or_insert_with(|| TestStats {
                expected: 0,
                flaky: 0,
                unexpected: 0,
                skipped: 0,
                last_seen: last_seen.clone(),
            });
            entry.count(test.outcome);
            entry.last_seen = last_seen;
        }

        write_json(context.store, bucket, &key, &stats).await?;
        info!(tests = stats.len(), "Updated dashboard {}", key);
        Ok(())
    }
}
