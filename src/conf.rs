//! Defines configuration as read from the environment.

use serde::Deserialize;

/// Default `uploads_bucket` value.
fn default_uploads_bucket() -> String {
    String::from("uploads")
}

/// Default `dashboards_bucket` value.
fn default_dashboards_bucket() -> String {
    String::from("dashboards")
}

/// Default `dashboard_max_commits` value.
fn default_dashboard_max_commits() -> usize {
    100
}

fn enabled() -> bool {
    true
}

/// The ingestion step is configured to consume compressed reports
/// dropped in an uploads bucket, and to write dashboards derived from
/// them to a second bucket. The configuration must be given as
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// The bucket where reports are uploaded. Each triggering object
    /// is deleted from here before it's processed.
    #[serde(default = "default_uploads_bucket")]
    pub uploads_bucket: String,

    /// The bucket that receives the dashboards.
    #[serde(default = "default_dashboards_bucket")]
    pub dashboards_bucket: String,

    /// Defines a filter to select only matching keys. The star (*)
    /// can be used as a wildcard matching any number of non-slash
    /// characters. E.g. to match any compressed report, use
    /// `"*.json.gz"`. Omitting this will make it match any file.
    #[serde(default)]
    pub match_key: Option<String>,

    /// Whether the raw dashboard processor runs.
    #[serde(default = "enabled")]
    pub enable_dashboard_raw: bool,

    /// Whether the v1 dashboard processor runs.
    #[serde(default = "enabled")]
    pub enable_dashboard_v1: bool,

    /// Whether the v2 dashboard processor runs. Off unless asked for,
    /// since the raw dashboard supersedes it.
    #[serde(default)]
    pub enable_dashboard_v2: bool,

    /// The amount of commits kept in each v1 dashboard.
    #[serde(default = "default_dashboard_max_commits")]
    pub dashboard_max_commits: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            uploads_bucket: default_uploads_bucket(),
            dashboards_bucket: default_dashboards_bucket(),
            match_key: None,
            enable_dashboard_raw: true,
            enable_dashboard_v1: true,
            enable_dashboard_v2: false,
            dashboard_max_commits: default_dashboard_max_commits(),
        }
    }
}
