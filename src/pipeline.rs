//! End-to-end relocalization: request an estimate, then place the anchor.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::anchor::{AnchorHandle, AnchorManager};
use crate::client::PoseEstimationClient;
use crate::config::PipelineConfig;
use crate::error::PipelineResult;
use crate::geometry::{CoordinateTransformer, Pose, PoseEstimate};
use crate::ingest::CameraFrameSource;
use crate::sensors::MetadataProvider;
use crate::transport::HttpTransport;

pub struct RelocalizationPipeline {
    client: PoseEstimationClient,
    anchors: Mutex<AnchorManager>,
}

impl RelocalizationPipeline {
    pub fn new(client: PoseEstimationClient, anchors: AnchorManager) -> Self {
        Self {
            client,
            anchors: Mutex::new(anchors),
        }
    }

    /// Wire a pipeline from configuration.
    pub fn from_config(
        config: &PipelineConfig,
        transport: Arc<dyn HttpTransport>,
        source: Box<dyn CameraFrameSource>,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Self {
        let client =
            PoseEstimationClient::new(config.client_settings(), transport, source, metadata);
        let variants = config.placement.variants.clone();
        let anchors = AnchorManager::new(CoordinateTransformer::new(), variants)
            .with_scale_factor(config.placement.scale_factor);
        Self::new(client, anchors)
    }

    pub fn client(&self) -> &PoseEstimationClient {
        &self.client
    }

    /// Exclusive access to the anchor state.
    pub fn anchors(&self) -> MutexGuard<'_, AnchorManager> {
        self.anchors
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Request an estimate and place content for it at the current scale.
    ///
    /// `camera_pose` is read once the estimate has arrived, so placement uses
    /// where the camera is then rather than where it was at capture.
    pub async fn relocalize<F>(
        &self,
        camera_pose: F,
    ) -> PipelineResult<(AnchorHandle, PoseEstimate)>
    where
        F: FnOnce() -> Pose,
    {
        let estimate = self.client.request_placement().await?;
        let camera = camera_pose();
        let handle = self.anchors().place_with_current_scale(&estimate, &camera)?;
        Ok((handle, estimate))
    }
}
