//! Defines a _trigger_, the input for a single run of the ingestion
//! step. The trigger is built from an S3 event record and the content
//! of the object it refers to.

use crate::storage::BlobStore;
use anyhow::{Context, Result};
use aws_lambda_events::event::s3::S3Event;
use std::fmt;
use tracing::{instrument, warn};

/// An object named by a storage event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub bucket: String,
    pub key: String,
}

impl ObjectRef {
    /// Extracts the created objects from the records inside an S3
    /// event. Records of other kinds, or lacking a bucket or key, are
    /// skipped.
    #[instrument(skip(event))]
    pub fn from_event(event: &S3Event) -> Vec<Self> {
        event
            .records
            .iter()
            .filter(|record| {
                record
                    .event_name
                    .as_deref()
                    .map(|name| name.starts_with("ObjectCreated:"))
                    .unwrap_or(false)
            })
            .filter_map(|record| {
                let bucket = record.s3.bucket.name.clone()?;
                let raw_key = record.s3.object.key.as_deref()?;
                match decode_key(raw_key) {
                    Ok(key) => Some(ObjectRef { bucket, key }),
                    Err(e) => {
                        warn!("Skipping record with an undecodable key: {:?}", e);
                        None
                    }
                }
            })
            .collect()
    }
}

/// Keys in S3 event notifications are form-encoded.
fn decode_key(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    Ok(urlencoding::decode(&spaced)
        .with_context(|| format!("Invalid object key encoding {:?}", raw))?
        .into_owned())
}

/// The input to the ingestion step: the name of a newly arrived
/// object and its compressed content.
pub struct Trigger {
    pub name: String,
    pub content: Vec<u8>,
}

impl fmt::Debug for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Trigger")
            .field("name", &self.name)
            .field("content_len", &self.content.len())
            .finish()
    }
}

impl Trigger {
    pub fn new(name: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }

    /// Builds a trigger by reading the referenced object, or `None` if
    /// the object is gone, which means an earlier delivery of the same
    /// event already consumed it.
    #[instrument(skip(store))]
    pub async fn fetch(store: &dyn BlobStore, object: &ObjectRef) -> Result<Option<Self>> {
        let content = store.get_blob(&object.bucket, &object.key).await?;
        Ok(content.map(|content| Trigger::new(object.key.clone(), content)))
    }
}
