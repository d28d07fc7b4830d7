//! Renderer-facing snapshot
//!
//! The renderer is stateless: every frame it asks the engine for an
//! [`OverlayFrame`] and draws anchor handles and guide lines at the viewport
//! positions it contains. Nothing here is retained between frames.

use crate::anchor::{AnchorRole, AnchorSet};
use crate::geometry::ViewportPoint;
use crate::transform::Viewport;
use serde::{Deserialize, Serialize};

/// An anchor handle placed in viewport space
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayAnchor {
    pub id: String,
    pub role: AnchorRole,
    pub position: ViewportPoint,
    /// Handle radius in viewport pixels (constant across zoom)
    pub radius: f64,
    pub draggable: bool,
    pub confidence: f64,
}

/// What a guide line connects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuideKind {
    Calibration,
    PupilLine,
    FrameHeightLeft,
    FrameHeightRight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideLine {
    pub kind: GuideKind,
    pub from: ViewportPoint,
    pub to: ViewportPoint,
}

/// Everything the renderer needs for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverlayFrame {
    pub viewport: Viewport,
    pub anchors: Vec<OverlayAnchor>,
    pub lines: Vec<GuideLine>,
}

impl OverlayFrame {
    /// Project the anchor set through the viewport
    pub fn build(viewport: &Viewport, anchors: &AnchorSet, handle_radius_px: f64) -> Self {
        let overlay_anchors = anchors
            .iter()
            .map(|anchor| OverlayAnchor {
                id: anchor.id.clone(),
                role: anchor.role,
                position: viewport.image_to_viewport(anchor.position),
                radius: handle_radius_px,
                draggable: anchor.draggable,
                confidence: anchor.confidence,
            })
            .collect();

        let guides = [
            (GuideKind::Calibration, AnchorRole::CalibrationStart, AnchorRole::CalibrationEnd),
            (GuideKind::PupilLine, AnchorRole::PupilLeft, AnchorRole::PupilRight),
            (GuideKind::FrameHeightLeft, AnchorRole::PupilLeft, AnchorRole::FrameBottomLeft),
            (GuideKind::FrameHeightRight, AnchorRole::PupilRight, AnchorRole::FrameBottomRight),
        ];
        let lines = guides
            .into_iter()
            .filter_map(|(kind, from, to)| {
                let from = anchors.position(from)?;
                let to = anchors.position(to)?;
                Some(GuideLine {
                    kind,
                    from: viewport.image_to_viewport(from),
                    to: viewport.image_to_viewport(to),
                })
            })
            .collect();

        Self { viewport: *viewport, anchors: overlay_anchors, lines }
    }

    pub fn anchor(&self, id: &str) -> Option<&OverlayAnchor> {
        self.anchors.iter().find(|a| a.id == id)
    }
}
