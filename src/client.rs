//! Pose estimation requests.
//!
//! One call to `request_placement` captures a frame, snapshots device
//! metadata, resolves the pose service and uploads both. Only one request may
//! be in flight; a second trigger is rejected rather than queued.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::frame::{CaptureSettings, FrameCapture};
use crate::geometry::PoseEstimate;
use crate::ingest::CameraFrameSource;
use crate::promise::spawn_transfer;
use crate::sensors::{DeviceMetadata, GeoLocation, MetadataProvider};
use crate::transport::{
    decode_response, HttpTransport, LocatorConfig, MultipartForm, ServiceLocator,
};

/// Form field carrying the metadata text.
pub const MESSAGE_FIELD: &str = "message";
/// Form field carrying the JPEG.
pub const FILE_FIELD: &str = "file";
pub const UPLOAD_FILENAME: &str = "upload.jpg";
pub const UPLOAD_CONTENT_TYPE: &str = "image/jpeg";

/// Client settings.
#[derive(Clone, Debug)]
pub struct ClientSettings {
    pub locator: LocatorConfig,
    /// Path of the pose endpoint on the resolved host.
    pub pose_path: String,
    /// Bound on each network await (discovery and upload).
    pub timeout: Duration,
    /// Append the location fix to the pose URL as query parameters.
    pub location_query: bool,
    pub capture: CaptureSettings,
}

/// Clears the in-flight flag when the request ends, however it ends.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> PipelineResult<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| PipelineError::PlacementInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct PoseEstimationClient {
    settings: ClientSettings,
    transport: Arc<dyn HttpTransport>,
    locator: ServiceLocator,
    capture: Mutex<FrameCapture>,
    source: Mutex<Box<dyn CameraFrameSource>>,
    metadata: Arc<dyn MetadataProvider>,
    in_flight: AtomicBool,
    requests: AtomicU64,
    last_fix: Mutex<Option<GeoLocation>>,
}

impl PoseEstimationClient {
    pub fn new(
        settings: ClientSettings,
        transport: Arc<dyn HttpTransport>,
        source: Box<dyn CameraFrameSource>,
        metadata: Arc<dyn MetadataProvider>,
    ) -> Self {
        let locator = ServiceLocator::new(settings.locator.clone(), Arc::clone(&transport));
        let capture = FrameCapture::new(settings.capture.clone());
        Self {
            settings,
            transport,
            locator,
            capture: Mutex::new(capture),
            source: Mutex::new(source),
            metadata,
            in_flight: AtomicBool::new(false),
            requests: AtomicU64::new(0),
            last_fix: Mutex::new(None),
        }
    }

    pub fn locator(&self) -> &ServiceLocator {
        &self.locator
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// A request is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Requests that reached the upload step.
    pub fn uploads(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }

    /// Capture, resolve, upload and decode one pose estimate.
    pub async fn request_placement(&self) -> PipelineResult<PoseEstimate> {
        let _guard = InFlight::acquire(&self.in_flight)?;

        let metadata = DeviceMetadata::gather(self.metadata.as_ref())
            .ok_or(PipelineError::IntrinsicsUnavailable)?;
        let jpeg = self.capture_frame()?;
        self.note_location(&metadata);

        let endpoint = self.locator.resolve(self.settings.timeout).await?;
        let query = if self.settings.location_query {
            metadata.location_query()
        } else {
            Vec::new()
        };
        let url = endpoint.url_for(&self.settings.pose_path, &query)?;

        let form = MultipartForm::new()
            .text(MESSAGE_FIELD, metadata.to_message())
            .file(FILE_FIELD, UPLOAD_FILENAME, UPLOAD_CONTENT_TYPE, jpeg);
        let content_type = form.content_type();
        let body = form.into_body();

        self.requests.fetch_add(1, Ordering::Relaxed);
        log::info!("uploading {} bytes to {}", body.len(), url);
        let transport = Arc::clone(&self.transport);
        let target = url.to_string();
        let response = spawn_transfer(move || transport.post(&target, &content_type, body))
            .with_timeout(self.settings.timeout)
            .await?;

        let estimate: PoseEstimate = decode_response(&response).map_err(|e| {
            log::warn!("pose request to {} failed: {}", url, e);
            e
        })?;
        log::info!(
            "pose estimate '{}' at [{:.3}, {:.3}, {:.3}]",
            estimate.variant_name,
            estimate.position[0],
            estimate.position[1],
            estimate.position[2]
        );
        Ok(estimate)
    }

    /// Capture into the buffer and copy the encoded bytes out.
    fn capture_frame(&self) -> PipelineResult<Vec<u8>> {
        let mut capture = lock(&self.capture);
        let fresh = {
            let mut source = lock(&self.source);
            capture.capture(source.as_mut())?
        };
        if !fresh {
            log::debug!("no new camera frame, reusing the last capture");
        }
        capture.latest_encoded().ok_or(PipelineError::FrameUnavailable)
    }

    fn note_location(&self, metadata: &DeviceMetadata) {
        let Some(current) = metadata.geolocation() else {
            return;
        };
        let mut last = lock(&self.last_fix);
        if let Some(previous) = last.as_ref() {
            log::debug!("moved {:.1} m since the previous request", previous.distance_to(current));
        }
        *last = Some(*current);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
