//! Local backend: a pre-loaded in-process vision model.
//!
//! The model itself (weights, tokenizer, runtime) is an external
//! collaborator behind the [`VisionModel`] trait — this crate never links a
//! tensor runtime. What lives here is the lifecycle contract:
//!
//! * the hardware-accelerator precondition is checked **once**, when the
//!   backend is constructed — a missing GPU is a terminal setup error, not
//!   something to rediscover on every call;
//! * the model call blocks for seconds to tens of seconds, so it runs on
//!   the blocking thread pool via `spawn_blocking`, the same discipline the
//!   rasterizer uses.

use crate::backend::{InferenceReply, OcrBackend};
use crate::config::ProcessingParams;
use crate::error::OcrError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// One inference request handed to the in-process model.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Full prompt including the `<image>` placeholder.
    pub prompt: String,
    pub image_path: PathBuf,
    /// Directory the runtime may write auxiliary output files into.
    pub output_dir: PathBuf,
    pub base_size: u32,
    pub image_size: u32,
    pub crop_mode: bool,
    pub test_compress: bool,
}

/// An in-process vision-language model runtime.
///
/// Implementations wrap whatever inference stack actually executes the
/// model. `infer` is expected to block the calling thread; [`LocalBackend`]
/// handles moving it off the async runtime.
pub trait VisionModel: Send + Sync {
    /// True when the accelerator the model needs is present and usable.
    fn accelerator_available(&self) -> bool;

    /// Run one blocking inference.
    ///
    /// Runtime failures should surface as [`OcrError::ModelFailed`]; the
    /// backend propagates them unchanged.
    fn infer(&self, request: &ModelRequest) -> Result<InferenceReply, OcrError>;
}

/// Backend wrapping a pre-loaded [`VisionModel`].
pub struct LocalBackend {
    model: Arc<dyn VisionModel>,
}

impl std::fmt::Debug for LocalBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalBackend").finish_non_exhaustive()
    }
}

impl LocalBackend {
    /// Wrap a loaded model, verifying the accelerator precondition.
    ///
    /// # Errors
    /// [`OcrError::AcceleratorUnavailable`] when the runtime reports no
    /// usable accelerator. This is the only place that check happens.
    pub fn new(model: Arc<dyn VisionModel>) -> Result<Self, OcrError> {
        if !model.accelerator_available() {
            return Err(OcrError::AcceleratorUnavailable {
                detail: "model runtime reports no usable accelerator".to_string(),
            });
        }
        info!("Local backend ready");
        Ok(Self { model })
    }
}

#[async_trait]
impl OcrBackend for LocalBackend {
    async fn infer(
        &self,
        prompt: &str,
        image_path: &Path,
        scratch_dir: &Path,
        params: &ProcessingParams,
    ) -> Result<InferenceReply, OcrError> {
        let request = ModelRequest {
            prompt: prompt.to_string(),
            image_path: image_path.to_path_buf(),
            output_dir: scratch_dir.to_path_buf(),
            base_size: params.base_size,
            image_size: params.image_size,
            crop_mode: params.crop_mode,
            test_compress: params.test_compress,
        };
        debug!(image = %request.image_path.display(), "local inference starting");

        let model = Arc::clone(&self.model);
        tokio::task::spawn_blocking(move || model.infer(&request))
            .await
            .map_err(|e| OcrError::Internal(format!("Inference task panicked: {e}")))?
    }
}
