//! Anchor placement and variant selection.
//!
//! `AnchorManager` owns the single active anchor. Placing computes the local
//! pose first; only a successful computation replaces the previous anchor.

use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};
use crate::geometry::{CoordinateTransformer, Pose, PoseEstimate};
use nalgebra::Vector3;

pub const DEFAULT_SCALE_FACTOR: f64 = 5.0;
pub const MIN_SCALE_FACTOR: f64 = 0.1;
pub const SCALE_UP_STEP: f64 = 0.2;
pub const SCALE_DOWN_STEP: f64 = 0.1;

/// Named child of the placed content. At most one is active.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Variant {
    pub name: String,
    pub active: bool,
}

/// Frame the anchor is parented to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorParent {
    SessionOrigin,
}

/// Placed content.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Anchor {
    pub id: u64,
    /// Pose relative to `parent`.
    pub pose: Pose,
    pub content_scale: Vector3<f64>,
    pub scale_factor: f64,
    pub parent: AnchorParent,
    /// Name reported with the estimate this anchor came from.
    pub estimate_name: String,
    pub variants: Vec<Variant>,
    pub active_variant: Option<usize>,
}

impl Anchor {
    pub fn handle(&self) -> AnchorHandle {
        AnchorHandle(self.id)
    }

    pub fn active_variant_name(&self) -> Option<&str> {
        self.active_variant
            .and_then(|i| self.variants.get(i))
            .map(|v| v.name.as_str())
    }

    fn activate(&mut self, index: usize) {
        for (i, variant) in self.variants.iter_mut().enumerate() {
            variant.active = i == index;
        }
        self.active_variant = Some(index);
    }
}

/// Identifies one placement. A new placement always gets a new handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AnchorHandle(pub u64);

/// Owns the active anchor.
pub struct AnchorManager {
    transformer: CoordinateTransformer,
    variant_names: Vec<String>,
    scale_factor: f64,
    active: Option<Anchor>,
    next_id: u64,
}

impl AnchorManager {
    pub fn new(transformer: CoordinateTransformer, variant_names: Vec<String>) -> Self {
        Self {
            transformer,
            variant_names,
            scale_factor: DEFAULT_SCALE_FACTOR,
            active: None,
            next_id: 1,
        }
    }

    pub fn with_scale_factor(mut self, scale_factor: f64) -> Self {
        self.scale_factor = scale_factor.max(MIN_SCALE_FACTOR);
        self
    }

    /// Place content for `estimate`, replacing any previous anchor.
    pub fn place(
        &mut self,
        estimate: &PoseEstimate,
        camera: &Pose,
        scale: f64,
    ) -> PipelineResult<AnchorHandle> {
        let local = self
            .transformer
            .to_session_local_pose(estimate, camera, scale)?;

        if let Some(previous) = self.active.take() {
            log::debug!("replacing anchor {}", previous.id);
        }

        let id = self.next_id;
        self.next_id += 1;
        let mut anchor = Anchor {
            id,
            pose: local.pose,
            content_scale: local.content_scale,
            scale_factor: scale,
            parent: AnchorParent::SessionOrigin,
            estimate_name: estimate.variant_name.clone(),
            variants: self
                .variant_names
                .iter()
                .map(|name| Variant {
                    name: name.clone(),
                    active: false,
                })
                .collect(),
            active_variant: None,
        };
        if !anchor.variants.is_empty() {
            anchor.activate(0);
        }
        log::info!(
            "placed anchor {} at ({:.3}, {:.3}, {:.3}) scale {}",
            id,
            anchor.pose.position.x,
            anchor.pose.position.y,
            anchor.pose.position.z,
            scale
        );
        self.active = Some(anchor);
        Ok(AnchorHandle(id))
    }

    /// Place using the manager's current scale factor.
    pub fn place_with_current_scale(
        &mut self,
        estimate: &PoseEstimate,
        camera: &Pose,
    ) -> PipelineResult<AnchorHandle> {
        let scale = self.scale_factor;
        self.place(estimate, camera, scale)
    }

    pub fn select_variant(&mut self, index: usize) -> PipelineResult<()> {
        let anchor = self.active.as_mut().ok_or(PipelineError::NoActiveAnchor)?;
        if index >= anchor.variants.len() {
            return Err(PipelineError::VariantOutOfRange {
                index,
                len: anchor.variants.len(),
            });
        }
        anchor.activate(index);
        Ok(())
    }

    pub fn select_variant_by_name(&mut self, name: &str) -> PipelineResult<()> {
        let anchor = self.active.as_ref().ok_or(PipelineError::NoActiveAnchor)?;
        let index = anchor
            .variants
            .iter()
            .position(|v| v.name == name)
            .ok_or_else(|| PipelineError::UnknownVariant(name.to_string()))?;
        self.select_variant(index)
    }

    /// Scale for subsequent placements. Does not touch the placed anchor.
    pub fn scale_factor(&self) -> f64 {
        self.scale_factor
    }

    pub fn scale_up(&mut self) -> f64 {
        self.scale_factor += SCALE_UP_STEP;
        self.scale_factor
    }

    pub fn scale_down(&mut self) -> f64 {
        self.scale_factor = (self.scale_factor - SCALE_DOWN_STEP).max(MIN_SCALE_FACTOR);
        self.scale_factor
    }

    pub fn active(&self) -> Option<&Anchor> {
        self.active.as_ref()
    }

    pub fn clear(&mut self) -> Option<Anchor> {
        self.active.take()
    }
}
