use anyhow::{Context, Result};
use aws_lambda_events::event::s3::S3Event;
use aws_sdk_sqs::types::{DeleteMessageBatchRequestEntry, Message};
use aws_sdk_sqs::Client;
use core::time::Duration;
use report_ingestion::app::App;
use report_ingestion::storage::BlobStore;
use report_ingestion::{app, client};
use std::env::var;
use tokio::time::sleep;
use tracing::{info, instrument, warn};

/// The minimum time to wait between ticks, in milliseconds.
const BASE_LAPSE_TIME: u64 = 300;

/// The base of the exponential backoff sequence.
const BACKOFF_BASE: u64 = 2;

/// The maximum amount of milliseconds to sleep between ticks. Set to
/// the equivalent of 20 minutes.
const MAX_SLEEP: u64 = 1200000;

/// Wrapper structure that executes successive SQS consumption cycles:
/// receive messages, parse the S3 events they carry, run the ingestion
/// step for each created object, and finally delete messages.
struct SQSConsumer {
    queue_url: String,
    visibility_timeout: i32,
    max_number_of_messages: i32,
    client: Client,
    backoff: u32,
}

/// Runs the ingestion step for the event carried by each message, and
/// returns the messages that may be deleted along with the failures.
/// A message may be deleted once its event was fully handled, or when
/// its body isn't an S3 event at all, since no redelivery would fix it.
async fn settle<'m>(
    app: &App,
    store: &dyn BlobStore,
    messages: &'m [Message],
) -> (Vec<&'m Message>, Vec<anyhow::Error>) {
    let mut settled = Vec::with_capacity(messages.len());
    let mut errors = Vec::new();
    for message in messages {
        let event = match message.body().map(serde_json::from_str::<S3Event>) {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                warn!("Couldn't parse the body of SQS message: {:?}", e);
                settled.push(message);
                continue;
            }
            None => {
                warn!("SQS message has no body");
                settled.push(message);
                continue;
            }
        };
        match app.handle_event(&event, store).await {
            Ok(()) => settled.push(message),
            Err(e) => errors.push(e),
        }
    }
    (settled, errors)
}

impl SQSConsumer {
    /// Record a success and wait a little while.
    async fn pass(&mut self) {
        self.backoff = 0;
        sleep(Duration::from_millis(BASE_LAPSE_TIME)).await;
    }

    /// Record a failure and wait a while.
    async fn fail(&mut self) {
        sleep(Duration::from_millis(std::cmp::min(
            BASE_LAPSE_TIME.saturating_mul(BACKOFF_BASE.saturating_pow(self.backoff)),
            MAX_SLEEP,
        )))
        .await;
        self.backoff = self.backoff.saturating_add(1);
    }

    /// Perform a single pass of the SQS consumption cycle.
    #[instrument(skip(self))]
    pub async fn tick(&mut self) {
        let result = match self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .visibility_timeout(self.visibility_timeout)
            .max_number_of_messages(self.max_number_of_messages)
            .wait_time_seconds(20)
            .send()
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Error while consuming messages from SQS queue: {:?}", e);
                return self.fail().await;
            }
        };
        let messages = result.messages().unwrap_or_default();
        if messages.is_empty() {
            return self.pass().await;
        }

        let (settled, errors) = settle(app::current(), client::current(), messages).await;
        for e in &errors {
            warn!(
                "Error encountered while handling an event; its SQS message won't be deleted: {:?}",
                e
            );
        }
        if settled.is_empty() {
            return self.fail().await;
        }

        info!("Deleting SQS messages");
        let result = match self
            .client
            .delete_message_batch()
            .queue_url(&self.queue_url)
            .set_entries(Some(
                settled
                    .iter()
                    .map(|message| {
                        DeleteMessageBatchRequestEntry::builder()
                            .set_id(message.message_id().map(String::from))
                            .set_receipt_handle(message.receipt_handle().map(String::from))
                            .build()
                    })
                    .collect(),
            ))
            .send()
            .await
        {
            Ok(result) => result,
            Err(e) => {
                warn!("Couldn't delete SQS messages: {:?}", e);
                return self.fail().await;
            }
        };
        let failed = result.failed().unwrap_or_default().len();
        if failed > 0 {
            warn!(
                "Couldn't delete some SQS messages: {:?} out of {:?} weren't deleted",
                failed,
                settled.len()
            );
        }
        if errors.is_empty() {
            self.pass().await
        } else {
            self.fail().await
        }
    }
}

/// Consume S3 event notifications from an SQS queue, feeding each
/// uploaded report to the dashboard processors.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .without_time()
        .init();
    app::init()?;
    client::init().await?;

    let queue_url = var("SQS_QUEUE_URL").context("SQS_QUEUE_URL is required")?;
    let visibility_timeout = var("SQS_VISIBILITY_TIMEOUT")
        .unwrap_or(String::from("30"))
        .parse::<i32>()
        .context("SQS_VISIBILITY_TIMEOUT must be a number")?;
    let max_number_of_messages = var("SQS_MAX_NUMBER_OF_MESSAGES")
        .unwrap_or(String::from("1"))
        .parse::<i32>()
        .context("SQS_MAX_NUMBER_OF_MESSAGES must be a number")?;
    let sqs_client = Client::new(&client::aws_config().await);

    let mut consumer = SQSConsumer {
        queue_url,
        visibility_timeout,
        max_number_of_messages,
        client: sqs_client,
        backoff: 0,
    };

    // Continuously receive messages and run the ingestion step for
    // each one, until interrupted
    let mut should_stop = Box::pin(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            _ = consumer.tick() => (),
            _ = &mut should_stop => {
                info!("CTRL-C");
                break
            }
        }
    }
    Ok(())
}
