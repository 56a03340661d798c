//! V1 dashboard: recent commits per branch with their flaky and
//! failing tests.

use super::{read_json, write_json};
use crate::processor::{Context, Processor};
use crate::report::{collect_tests, Metadata, Outcome, TestId};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{info, instrument};

/// Keeps, per branch, the latest commits with their flaky and failing
/// tests.
pub struct DashboardV1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitEntry {
    pub sha: String,
    pub timestamp: i64,
    #[serde(rename = "runURL")]
    pub run_url: Option<String>,
    pub flaky: BTreeSet<TestId>,
    pub unexpected: BTreeSet<TestId>,
}

impl DashboardV1 {
    pub fn key(branch: &str) -> String {
        format!("v1/{}.json", branch)
    }
}

/// Folds a report into the commit list: newest commit first, a
/// known commit gains the report's tests, and the list never grows
/// past `max_commits`.
fn merge(
    mut commits: Vec<CommitEntry>,
    entry: CommitEntry,
    max_commits: usize,
) -> Vec<CommitEntry> {
    if let Some(existing) = commits.iter_mut().find(|c| c.sha == entry.sha) {
        existing.flaky.extend(entry.flaky);
        existing.unexpected.extend(entry.unexpected);
        if existing.run_url.is_none() {
            existing.run_url = entry.run_url;
        }
    } else {
        commits.push(entry);
    }
    commits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    commits.truncate(max_commits);
    commits
}

#[async_trait]
impl Processor for DashboardV1 {
    fn name(&self) -> &'static str {
        "v1"
    }

    #[instrument(skip_all, fields(name = context.name))]
    async fn process(&self, context: &Context<'_>, report: &Value) -> Result<()> {
        let metadata = Metadata::from_report(report);
        let mut entry = CommitEntry {
            sha: metadata.commit_sha.clone(),
            timestamp: metadata.commit_timestamp,
            run_url: metadata.run_url.clone(),
            flaky: BTreeSet::new(),
            unexpected: BTreeSet::new(),
        };
        for test in collect_tests(report) {
            match test.outcome {
                Outcome::Flaky => {
                    entry.flaky.insert(test.id);
                }
                Outcome::Unexpected => {
                    entry.unexpected.insert(test.id);
                }
                Outcome::Expected | Outcome::Skipped => (),
            }
        }

        let bucket = &context.settings.dashboards_bucket;
        let key = Self::key(&metadata.branch);
        let commits: Vec<CommitEntry> = read_json(context.store, bucket, &key)
            .await?
            .unwrap_or_default();
        let commits = merge(commits, entry, context.settings.dashboard_max_commits);
        write_json(context.store, bucket, &key, &commits).await?;
        info!(commits = commits.len(), "Updated dashboard {}", key);
        Ok(())
    }
}
