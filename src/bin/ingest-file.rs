use anyhow::{anyhow, Context, Result};
use report_ingestion::app::App;
use report_ingestion::storage::{BlobStore, MemoryStore};
use report_ingestion::trigger::Trigger;
use std::env::args;
use std::path::Path;

/// Run the ingestion step against a local compressed report, using an
/// in-memory store, and list the dashboards it produced.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    let app = App::new(envy::from_env()?)?;

    let path = args()
        .nth(1)
        .ok_or_else(|| anyhow!("usage: ingest-file <report.json.gz>"))?;
    let name = Path::new(&path)
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("{:?} is not a file path", path))?
        .to_string();
    let content = tokio::fs::read(&path)
        .await
        .with_context(|| format!("Failed to read local file {:?}", path))?;

    let store = MemoryStore::new();
    store
        .put_blob(&app.settings.uploads_bucket, &name, content.clone())
        .await?;
    app.handle(Trigger::new(name, content), &store).await?;

    for key in store.names(&app.settings.dashboards_bucket).await {
        println!("{}", key);
    }
    Ok(())
}
