use anyhow::{anyhow, Result};
use aws_lambda_events::event::s3::S3Event;
use lambda_runtime::{run, service_fn, LambdaEvent};
use report_ingestion::{app, client};

/// Handle each created object, one after the other.
async fn function_handler(event: LambdaEvent<S3Event>) -> Result<()> {
    app::current()
        .handle_event(&event.payload, client::current())
        .await
}

/// Run an AWS Lambda function that listens to S3 events for uploaded
/// reports, and feeds each report to the dashboard processors.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    app::init()?;
    client::init().await?;

    run(service_fn(function_handler))
        .await
        .map_err(|e| anyhow!("{:?}", e))
}
