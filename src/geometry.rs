//! Reconstruction frame to AR session frame conversion.
//!
//! The pose service reports, for the uploaded image, the world-to-camera
//! transform of a right-handed reconstruction (rotation on the wire as
//! `[w, x, y, z]`). The AR session tracks in a left-handed frame. Placement needs
//! the pose of the reconstruction origin expressed in session space, given the
//! live camera pose:
//!
//! 1. reorder the wire quaternion to `[x, y, z, w]`
//! 2. invert world-to-camera into the camera's pose in the reconstruction
//! 3. flip Y of the position
//! 4. negate x and z of the rotation
//! 5. scale the position by the content scale
//! 6. take the origin's pose relative to that camera pose (camera-local)
//! 7. compose with the live camera pose (and the inverse session origin)
//!
//! Steps 3 and 4 together are the reflection through the XZ plane.

use nalgebra::{Isometry3, Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, PipelineResult};

/// Rotations shorter than this cannot be normalized.
const MIN_QUATERNION_NORM: f64 = 1e-9;

// ----------------------------------------------------------------------------
// Wire value
// ----------------------------------------------------------------------------

/// Camera pose estimate as returned by the pose service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    /// Name the service attached to the estimate.
    #[serde(rename = "name", default)]
    pub variant_name: String,
    /// World-to-camera translation.
    pub position: [f64; 3],
    /// World-to-camera rotation, scalar first: `[w, x, y, z]`.
    pub rotation: [f64; 4],
}

/// Reorder a scalar-first wire quaternion into scalar-last `[x, y, z, w]`.
pub fn wire_to_native(rotation: [f64; 4]) -> [f64; 4] {
    let [w, x, y, z] = rotation;
    [x, y, z, w]
}

/// Build a unit quaternion from scalar-last components.
pub fn unit_rotation(native: [f64; 4]) -> PipelineResult<UnitQuaternion<f64>> {
    if native.iter().any(|c| !c.is_finite()) {
        return Err(PipelineError::DegenerateEstimate(format!(
            "non-finite rotation {:?}",
            native
        )));
    }
    let [x, y, z, w] = native;
    UnitQuaternion::try_new(Quaternion::new(w, x, y, z), MIN_QUATERNION_NORM).ok_or_else(|| {
        PipelineError::DegenerateEstimate(format!("rotation {:?} has no direction", native))
    })
}

// ----------------------------------------------------------------------------
// Pose
// ----------------------------------------------------------------------------

/// Rigid pose: position plus orientation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Pose {
    pub position: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

impl Pose {
    pub fn new(position: Vector3<f64>, rotation: UnitQuaternion<f64>) -> Self {
        Self { position, rotation }
    }

    pub fn identity() -> Self {
        Self::new(Vector3::zeros(), UnitQuaternion::identity())
    }

    /// From a position and a scalar-last rotation.
    pub fn from_parts(position: [f64; 3], rotation: [f64; 4]) -> PipelineResult<Self> {
        if position.iter().any(|c| !c.is_finite()) {
            return Err(PipelineError::DegenerateEstimate(format!(
                "non-finite position {:?}",
                position
            )));
        }
        Ok(Self::new(Vector3::from(position), unit_rotation(rotation)?))
    }

    pub fn to_isometry(&self) -> Isometry3<f64> {
        Isometry3::from_parts(Translation3::from(self.position), self.rotation)
    }

    pub fn from_isometry(iso: &Isometry3<f64>) -> Self {
        Self::new(iso.translation.vector, iso.rotation)
    }

    /// Pose of `world` expressed relative to this pose.
    pub fn inverse_transform(&self, world: &Pose) -> Pose {
        Pose::from_isometry(&(self.to_isometry().inverse() * world.to_isometry()))
    }
}

/// Reflect a rotation through the XZ plane: negate x and z.
fn reflect_rotation(rotation: &UnitQuaternion<f64>) -> UnitQuaternion<f64> {
    let q = rotation.quaternion();
    UnitQuaternion::new_unchecked(Quaternion::new(q.w, -q.i, q.j, -q.k))
}

/// Steps 2-4: world-to-camera (reconstruction) to camera pose (tracking handedness).
pub fn tracking_from_reconstruction(
    position: &Vector3<f64>,
    rotation: &UnitQuaternion<f64>,
) -> Pose {
    let inverse = rotation.inverse();
    let mut camera_position = inverse * (-position);
    camera_position.y = -camera_position.y;
    Pose::new(camera_position, reflect_rotation(&inverse))
}

/// Exact inverse of [`tracking_from_reconstruction`].
pub fn reconstruction_from_tracking(pose: &Pose) -> (Vector3<f64>, UnitQuaternion<f64>) {
    let inverse = reflect_rotation(&pose.rotation);
    let mut camera_position = pose.position;
    camera_position.y = -camera_position.y;
    let rotation = inverse.inverse();
    let position = -(rotation * camera_position);
    (position, rotation)
}

// ----------------------------------------------------------------------------
// CoordinateTransformer
// ----------------------------------------------------------------------------

/// Anchor pose in session space plus the content scale to apply.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct LocalPose {
    pub pose: Pose,
    /// `(scale, -scale, scale)`: Y is mirrored to match the handedness flip.
    pub content_scale: Vector3<f64>,
}

/// Converts pose estimates into session-space anchor poses.
#[derive(Clone, Debug, Default)]
pub struct CoordinateTransformer {
    /// Session origin in tracking space. Identity unless the host moves it.
    session_origin: Pose,
}

impl CoordinateTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session_origin(session_origin: Pose) -> Self {
        Self { session_origin }
    }

    pub fn session_origin(&self) -> &Pose {
        &self.session_origin
    }

    /// Anchor pose for `estimate`, relative to the session origin, for a camera
    /// currently at `camera` (tracking space).
    pub fn to_session_local_pose(
        &self,
        estimate: &PoseEstimate,
        camera: &Pose,
        scale: f64,
    ) -> PipelineResult<LocalPose> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(PipelineError::DegenerateEstimate(format!(
                "content scale must be positive, got {}",
                scale
            )));
        }
        let Pose { position, rotation } =
            Pose::from_parts(estimate.position, wire_to_native(estimate.rotation))?;

        let tracked = tracking_from_reconstruction(&position, &rotation);
        let scaled = Pose::new(tracked.position * scale, tracked.rotation);

        // Where the reconstruction origin sits as seen from the estimated camera.
        let camera_local = scaled.inverse_transform(&Pose::identity());

        let session = self.session_origin.to_isometry().inverse()
            * camera.to_isometry()
            * camera_local.to_isometry();

        Ok(LocalPose {
            pose: Pose::from_isometry(&session),
            content_scale: Vector3::new(scale, -scale, scale),
        })
    }
}
