//! Reads the parts of a test report that the dashboards care about.
//!
//! Reports follow the JSON reporter layout: a `metadata` object
//! describing the run, and nested `suites`, each holding `specs`
//! whose `tests` carry one result per attempt.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where a report comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(rename = "commitSHA")]
    pub commit_sha: String,
    pub commit_timestamp: i64,
    pub branch: String,
    #[serde(rename = "runURL")]
    pub run_url: Option<String>,
}

const UNKNOWN: &str = "unknown";

impl Metadata {
    pub fn from_report(report: &Value) -> Self {
        let metadata = report.get("metadata");
        let text = |key: &str| {
            metadata
                .and_then(|m| m.get(key))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        Metadata {
            commit_sha: text("commitSHA").unwrap_or_else(|| String::from(UNKNOWN)),
            commit_timestamp: metadata
                .and_then(|m| m.get("commitTimestamp"))
                .and_then(Value::as_i64)
                .unwrap_or(0),
            branch: text("branch").unwrap_or_else(|| String::from(UNKNOWN)),
            run_url: text("runURL"),
        }
    }
}

/// How a test fared across its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Expected,
    Flaky,
    Unexpected,
    Skipped,
}

impl Outcome {
    fn classify(expected_status: &str, statuses: &[&str]) -> Self {
        if statuses.iter().all(|s| *s == "skipped") {
            return Outcome::Skipped;
        }
        let matches: Vec<bool> = statuses.iter().map(|s| *s == expected_status).collect();
        if matches.iter().all(|m| *m) {
            Outcome::Expected
        } else if matches.last().copied().unwrap_or(false) {
            Outcome::Flaky
        } else {
            Outcome::Unexpected
        }
    }
}

/// Identifies a test across reports.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TestId {
    pub file: String,
    pub title: String,
    pub project: String,
}

impl TestId {
    pub fn key(&self) -> String {
        format!("{} > {} [{}]", self.file, self.title, self.project)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    #[serde(flatten)]
    pub id: TestId,
    pub outcome: Outcome,
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn visit_suite(suite: &Value, file: &str, outcomes: &mut Vec<TestOutcome>) {
    let file = str_field(suite, "file").unwrap_or(file);
    for spec in array_field(suite, "specs") {
        let spec_file = str_field(spec, "file").unwrap_or(file);
        let title = str_field(spec, "title").unwrap_or_default();
        for test in array_field(spec, "tests") {
            let expected_status = str_field(test, "expectedStatus").unwrap_or("passed");
            let statuses: Vec<&str> = array_field(test, "results")
                .iter()
                .filter_map(|r| str_field(r, "status"))
                .collect();
            outcomes.push(TestOutcome {
                id: TestId {
                    file: spec_file.to_string(),
                    title: title.to_string(),
                    project: str_field(test, "projectName")
                        .unwrap_or_default()
                        .to_string(),
                },
                outcome: Outcome::classify(expected_status, &statuses),
            });
        }
    }
    for child in array_field(suite, "suites") {
        visit_suite(child, file, outcomes);
    }
}

/// Collects every test in the report, in document order.
pub fn collect_tests(report: &Value) -> Vec<TestOutcome> {
    let mut outcomes = Vec::new();
    for suite in array_field(report, "suites") {
        visit_suite(suite, "", &mut outcomes);
    }
    outcomes
}
