//! Pose Anchor
//!
//! Client side of a visual relocalization service. A camera frame plus device
//! metadata is uploaded to a remote pose service, which answers with the camera
//! pose in a prebuilt 3D reconstruction. The answer is converted into the AR
//! session's frame and used to place one anchored piece of content.
//!
//! # Flow
//!
//! `FrameCapture` -> `PoseEstimationClient` (`ServiceLocator`, `Promise`) ->
//! `CoordinateTransformer` -> `AnchorManager`
//!
//! # Module Structure
//!
//! - `ingest`: Camera frame sources (synthetic, still image)
//! - `frame`: Capture buffer, RGBA conversion, JPEG encoding
//! - `sensors`: Intrinsics, geolocation, orientation
//! - `transport`: HTTP seam, discovery, multipart upload, response decoding
//! - `promise`: Callback-to-future bridge
//! - `client`: Single-flight pose requests
//! - `geometry`: Reconstruction to session frame conversion
//! - `anchor`: Anchor placement and variant selection
//! - `pipeline`: Request plus placement
//! - `config`: File and environment configuration

pub mod anchor;
pub mod client;
pub mod config;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod pipeline;
pub mod promise;
pub mod sensors;
pub mod transport;

pub use anchor::{Anchor, AnchorHandle, AnchorManager, AnchorParent, Variant};
pub use client::{ClientSettings, PoseEstimationClient};
pub use config::PipelineConfig;
pub use error::{PipelineError, PipelineResult};
pub use frame::{CaptureSettings, CapturedFrame, FrameCapture};
pub use geometry::{CoordinateTransformer, LocalPose, Pose, PoseEstimate};
pub use ingest::{CameraFrameSource, CameraImage, PixelFormat, StillImageSource, SyntheticSource};
pub use pipeline::RelocalizationPipeline;
pub use promise::{Promise, PromiseState, Settler};
pub use sensors::{
    CameraIntrinsics, DeviceMetadata, GeoLocation, Heading, LocationReading, MetadataProvider,
    ScreenOrientation, StaticMetadata,
};
pub use transport::{EndpointDescriptor, HttpResponse, HttpTransport, ServiceLocator};
#[cfg(feature = "http-ureq")]
pub use transport::UreqTransport;
