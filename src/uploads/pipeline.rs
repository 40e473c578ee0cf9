//! Creates an observation together with its uploaded images.
//!
//! Stages run in order: validate the request, reserve a hidden row to obtain
//! an id, write every file under that id, then publish the row with the real
//! URLs. A failure at any stage after validation removes the files written so
//! far and the reserved row before the error is returned.

use std::{fmt, sync::Arc};

use anyhow::anyhow;
use bytes::Bytes;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::files::{is_image, object_key, observation_prefix, public_url, unique_filename};
use crate::{
    config::StorageConfig,
    error::AppError,
    observations::{
        repo::ObservationStore,
        repo_types::{Observation, PendingObservation},
        validation::{validate_caption, validate_coordinates, validate_image_count},
    },
    storage::StorageClient,
};

/// One uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct UploadItem {
    pub filename: Option<String>,
    pub content_type: String,
    pub body: Bytes,
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub user_id: Uuid,
    pub caption: String,
    pub longitude: f64,
    pub latitude: f64,
    pub files: Vec<UploadItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStage {
    Validating,
    PersistingRecord,
    WritingFiles,
    Finalizing,
    Done,
    Failed,
}

impl fmt::Display for UploadStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStage::Validating => "validating",
            UploadStage::PersistingRecord => "persisting_record",
            UploadStage::WritingFiles => "writing_files",
            UploadStage::Finalizing => "finalizing",
            UploadStage::Done => "done",
            UploadStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Collaborators of one pipeline run.
#[derive(Clone)]
pub struct MediaPipeline {
    pub observations: Arc<dyn ObservationStore>,
    pub storage: Arc<dyn StorageClient>,
    pub public_base_url: String,
    pub static_path: String,
}

impl MediaPipeline {
    pub fn new(
        observations: Arc<dyn ObservationStore>,
        storage: Arc<dyn StorageClient>,
        cfg: &StorageConfig,
    ) -> Self {
        Self {
            observations,
            storage,
            public_base_url: cfg.public_base_url.clone(),
            static_path: cfg.static_path.clone(),
        }
    }

    /// Runs the pipeline on its own task so a dropped request cannot stop it
    /// between side effects.
    pub async fn ingest_detached(&self, req: UploadRequest) -> Result<Observation, AppError> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.ingest(req).await })
            .await
            .map_err(|e| AppError::Internal(anyhow!("upload task failed: {e}")))?
    }

    #[instrument(skip_all, fields(user_id = %req.user_id, files = req.files.len()))]
    pub async fn ingest(&self, req: UploadRequest) -> Result<Observation, AppError> {
        let mut run = Run {
            stage: UploadStage::Validating,
            observation_id: None,
            touched_storage: false,
        };

        if let Err(e) = validate(&req) {
            run.advance(UploadStage::Failed);
            return Err(e);
        }

        match self.write_through(&mut run, req).await {
            Ok(obs) => {
                run.advance(UploadStage::Done);
                info!(observation_id = obs.id, images = obs.image_urls.len(), "observation uploaded");
                Ok(obs)
            }
            Err(e) => {
                warn!(stage = %run.stage, error = %e, "upload failed, cleaning up");
                run.advance(UploadStage::Failed);
                self.compensate(&run).await;
                Err(e)
            }
        }
    }

    async fn write_through(&self, run: &mut Run, req: UploadRequest) -> Result<Observation, AppError> {
        run.advance(UploadStage::PersistingRecord);
        let id = self
            .observations
            .reserve(&PendingObservation {
                user_id: req.user_id,
                caption: req.caption,
                longitude: req.longitude,
                latitude: req.latitude,
            })
            .await?;
        run.observation_id = Some(id);

        run.advance(UploadStage::WritingFiles);
        let mut urls = Vec::with_capacity(req.files.len());
        for (idx, file) in req.files.into_iter().enumerate() {
            if !is_image(&file.content_type) {
                let label = file.filename.unwrap_or_else(|| format!("#{}", idx + 1));
                return Err(AppError::validation(format!(
                    "File {label} is not an image ({})",
                    file.content_type
                )));
            }
            let filename = unique_filename(file.filename.as_deref(), &file.content_type);
            let key = object_key(id, &filename);
            run.touched_storage = true;
            self.storage
                .put_object(&key, file.body, &file.content_type)
                .await?;
            urls.push(public_url(&self.public_base_url, &self.static_path, id, &filename));
        }

        run.advance(UploadStage::Finalizing);
        self.observations
            .update_image_urls(id, &urls)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow!("observation {id} vanished before finalizing")))
    }

    /// Best effort. Cleanup errors are logged and never replace the original one.
    async fn compensate(&self, run: &Run) {
        let Some(id) = run.observation_id else {
            return;
        };
        if run.touched_storage {
            if let Err(e) = self.storage.delete_prefix(&observation_prefix(id)).await {
                error!(observation_id = id, error = %e, "failed to remove uploaded files");
            }
        }
        match self.observations.delete(id).await {
            Ok(true) => debug!(observation_id = id, "reserved observation removed"),
            Ok(false) => warn!(observation_id = id, "reserved observation already gone"),
            Err(e) => error!(observation_id = id, error = %e, "failed to remove reserved observation"),
        }
    }
}

struct Run {
    stage: UploadStage,
    observation_id: Option<i64>,
    touched_storage: bool,
}

impl Run {
    fn advance(&mut self, next: UploadStage) {
        debug!(from = %self.stage, to = %next, "upload stage");
        self.stage = next;
    }
}

fn validate(req: &UploadRequest) -> Result<(), AppError> {
    validate_image_count(req.files.len())?;
    validate_coordinates(req.longitude, req.latitude)?;
    validate_caption(&req.caption)?;
    Ok(())
}
