//! Converts the provisioned disk into the image.

use super::{halt, Step, StepContext};
use crate::client::{ComputeApi, ImageId, ImagizeSpec, RemoteJob};
use crate::context::StateBag;
use crate::core::StepOutcome;
use crate::errors::ImageflowError;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;

/// Creates the image and records `image-id` once its job succeeded.
///
/// The image is the product of the pipeline and is never rolled back.
pub struct Imagize {
    api: Arc<dyn ComputeApi>,
}

impl Imagize {
    /// Creates the step.
    #[must_use]
    pub fn new(api: Arc<dyn ComputeApi>) -> Self {
        Self { api }
    }

    async fn imagize(
        &self,
        state: &StateBag,
        ctx: &StepContext,
    ) -> Result<(ImageId, String), ImageflowError> {
        let config = state.config();
        let spec = ImagizeSpec {
            instance_id: state.require_instance_id()?,
            disk_id: state.require_disk_id()?,
            description: config.description.clone(),
            label: config.image_label.clone(),
        };

        let (image_id, job_id) = self.api.imagize(&spec, ctx.token()).await?;
        ctx.poller(&self.api, state)
            .await_success(RemoteJob::new(spec.instance_id, job_id), ctx.token())
            .await?;

        info!(image_id = %image_id, label = %spec.label, disk_id = %spec.disk_id, "Image created");
        Ok((image_id, spec.label))
    }
}

#[async_trait]
impl Step for Imagize {
    fn name(&self) -> &str {
        "imagize"
    }

    async fn run(&self, state: &mut StateBag, ctx: &StepContext) -> StepOutcome {
        ctx.sink().say("Imagizing...");

        match self.imagize(state, ctx).await {
            Ok((image_id, label)) => {
                state.set_image(image_id, label);
                StepOutcome::Continue
            }
            Err(e) => halt(state, ctx, "Error creating image", e),
        }
    }
}
