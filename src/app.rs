//! Defines the read-only application state and the ingestion step.

use crate::conf::Settings;
use crate::dashboard;
use crate::decode::decode_report;
use crate::processor::{Context, Pipeline};
use crate::storage::BlobStore;
use crate::trigger::{ObjectRef, Trigger};
use anyhow::{anyhow, Context as _, Result};
use aws_lambda_events::event::s3::S3Event;
use envy::from_env;
use itertools::Itertools;
use once_cell::sync::OnceCell;
use regex::Regex;
use tracing::{info, instrument, warn};

/// An App is an initialized application state, derived from
/// settings. This is only useful to pre-compute stuff that will be
/// used constantly.
pub struct App {
    /// The original settings.
    pub settings: Settings,

    /// The regex that matches trigger names.
    pub match_key_re: Regex,

    /// The processors every report goes through.
    pub pipeline: Pipeline,
}

impl App {
    /// Initialize an App instance given a settings struct, with the
    /// dashboard processors. Consumes the settings struct.
    pub fn new(settings: Settings) -> Result<Self> {
        let pipeline = dashboard::pipeline(&settings);
        Self::with_pipeline(settings, pipeline)
    }

    /// Initialize an App instance with a custom processor pipeline.
    pub fn with_pipeline(settings: Settings, pipeline: Pipeline) -> Result<Self> {
        // Parse regex
        let match_key_re = if let Some(match_key) = &settings.match_key {
            Regex::new(&format!(
                "^{}$",
                match_key
                    .split('*')
                    .map(regex::escape)
                    .collect::<Vec<String>>()
                    .join("[^/]*?")
            ))
        } else {
            Regex::new("")
        }?;
        Ok(App {
            settings,
            match_key_re,
            pipeline,
        })
    }

    /// Whether an uploaded object should be handled at all.
    pub fn accepts(&self, name: &str) -> bool {
        self.match_key_re.is_match(name)
    }

    /// Handle an invocation trigger: delete the upload, decode it,
    /// and run it through every enabled processor in order.
    ///
    /// The upload is deleted before anything else so that a retried
    /// invocation doesn't fail on a second delete. The cost is that
    /// the upload is lost if a later step fails.
    #[instrument(skip(self, store))]
    pub async fn handle(&self, trigger: Trigger, store: &dyn BlobStore) -> Result<()> {
        let Trigger { name, content } = trigger;
        store
            .delete_blob(&self.settings.uploads_bucket, &name)
            .await
            .with_context(|| format!("Failed to delete upload {:?}", name))?;

        let report = decode_report(content)
            .await
            .with_context(|| format!("Failed to decode upload {:?}", name))?;

        let context = Context {
            name: &name,
            store,
            settings: &self.settings,
        };
        self.pipeline.run(&context, &report).await?;
        info!(
            "Processed upload {:?} through {:?}",
            name,
            self.pipeline.enabled_names()
        );
        Ok(())
    }

    /// Handle a single object named by a storage event. Objects that
    /// don't match the key filter are ignored, and objects that no
    /// longer exist are taken as consumed by an earlier delivery.
    pub async fn handle_object(&self, object: &ObjectRef, store: &dyn BlobStore) -> Result<()> {
        if !self.accepts(&object.key) {
            info!("Ignoring object {:?}", object.key);
            return Ok(());
        }
        match Trigger::fetch(store, object).await? {
            Some(trigger) => self
                .handle(trigger, store)
                .await
                .with_context(|| format!("Failed to handle object {:?}", object)),
            None => {
                warn!("Object {:?} was already consumed; skipping it", object);
                Ok(())
            }
        }
    }

    /// Handle every created object in an S3 event, one after the
    /// other, stopping at the first failure.
    pub async fn handle_event(&self, event: &S3Event, store: &dyn BlobStore) -> Result<()> {
        for object in ObjectRef::from_event(event) {
            self.handle_object(&object, store).await?;
        }
        Ok(())
    }
}

/// Global App instance.
static CURRENT: OnceCell<App> = OnceCell::new();

/// Initialize the global App instance.
pub fn init() -> Result<()> {
    let settings = from_env()?;
    let app = App::new(settings)?;
    info!(
        "Enabled processors: {}",
        app.pipeline.enabled_names().iter().join(", ")
    );
    CURRENT
        .set(app)
        .map_err(|_| anyhow!("app::CURRENT was already initialized"))
}

/// Get the current App instance, or panic if it hasn't been
/// initialized.
pub fn current() -> &'static App {
    CURRENT.get().expect("app is not initialized")
}
