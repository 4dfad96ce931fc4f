//! Smart zoom: face bounding box → viewport transform.
//!
//! The renderer applies the transform around the viewport centre, scale
//! first and translate second, so the translation is scaled in lockstep
//! with the zoom factor:
//!
//! ```text
//! shift      = (frame_centre - face_centre) / frame_dimension   ∈ [-0.5, 0.5]
//! scale      = clamp(target_ratio / (face_h / frame_h), min, max)
//! translate% = shift * 100 * scale
//! ```
//!
//! The computation is stateless. Jitter in successive face boxes passes
//! straight through; any easing belongs to the presentation layer.

use serde::{Deserialize, Serialize};

/// Fraction of the viewport height a centred face should occupy.
pub const TARGET_HEIGHT_RATIO: f64 = 0.5;
/// Lower clamp for the zoom factor.
pub const MIN_SCALE: f64 = 1.0;
/// Upper clamp for the zoom factor.
pub const MAX_SCALE: f64 = 2.5;

// ── FaceBox ──────────────────────────────────────────────────────

/// A detected face in frame-pixel coordinates, together with the size of
/// the frame it was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub frame_width: f64,
    pub frame_height: f64,
}

impl FaceBox {
    /// Centre of the face box.
    pub fn centre(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Centre of the frame the box was detected in.
    pub fn frame_centre(&self) -> (f64, f64) {
        (self.frame_width / 2.0, self.frame_height / 2.0)
    }

    /// Whether the box can drive a transform without producing NaN or
    /// infinities.
    fn is_usable(&self) -> bool {
        let positive = |v: f64| v.is_finite() && v > 0.0;
        positive(self.height)
            && positive(self.frame_width)
            && positive(self.frame_height)
            && self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
    }
}

// ── ViewTransform ────────────────────────────────────────────────

/// Scale/translate applied to the video view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    pub scale: f64,
    pub translate_x_pct: f64,
    pub translate_y_pct: f64,
}

impl ViewTransform {
    /// No zoom, no translation.
    pub const IDENTITY: Self = Self {
        scale: 1.0,
        translate_x_pct: 0.0,
        translate_y_pct: 0.0,
    };

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// CSS-style transform string. CSS composes right to left, so the
    /// scale is applied before the translation.
    pub fn css(&self) -> String {
        format!(
            "translate({:.2}%, {:.2}%) scale({:.3})",
            self.translate_x_pct, self.translate_y_pct, self.scale
        )
    }
}

impl Default for ViewTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

// ── ZoomPolicy ───────────────────────────────────────────────────

/// Tunables for the smart zoom.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomPolicy {
    /// Target face height as a fraction of the frame height.
    pub target_height_ratio: f64,
    /// Minimum zoom factor.
    pub min_scale: f64,
    /// Maximum zoom factor.
    pub max_scale: f64,
}

impl Default for ZoomPolicy {
    fn default() -> Self {
        Self {
            target_height_ratio: TARGET_HEIGHT_RATIO,
            min_scale: MIN_SCALE,
            max_scale: MAX_SCALE,
        }
    }
}

impl ZoomPolicy {
    /// A positive finite target and finite bounds with
    /// `0 < min_scale <= max_scale`.
    pub fn is_valid(&self) -> bool {
        self.target_height_ratio.is_finite()
            && self.target_height_ratio > 0.0
            && self.min_scale.is_finite()
            && self.max_scale.is_finite()
            && self.min_scale > 0.0
            && self.min_scale <= self.max_scale
    }

    /// This policy if valid, otherwise the default one.
    pub fn or_default(self) -> Self {
        if self.is_valid() { self } else { Self::default() }
    }

    /// Compute the view transform for `face`, or the identity when there
    /// is no (usable) face. An invalid policy computes with the defaults.
    pub fn compute(&self, face: Option<&FaceBox>) -> ViewTransform {
        let Some(face) = face.filter(|f| f.is_usable()) else {
            return ViewTransform::IDENTITY;
        };
        let policy = self.or_default();

        let (face_cx, face_cy) = face.centre();
        let (frame_cx, frame_cy) = face.frame_centre();
        let shift_x = (frame_cx - face_cx) / face.frame_width;
        let shift_y = (frame_cy - face_cy) / face.frame_height;

        let current_ratio = face.height / face.frame_height;
        let scale =
            (policy.target_height_ratio / current_ratio).clamp(policy.min_scale, policy.max_scale);

        ViewTransform {
            scale,
            translate_x_pct: shift_x * 100.0 * scale,
            translate_y_pct: shift_y * 100.0 * scale,
        }
    }
}

/// Smart zoom with the default policy (target 0.5, scale in [1.0, 2.5]).
pub fn compute_transform(face: Option<&FaceBox>) -> ViewTransform {
    ZoomPolicy::default().compute(face)
}

// ── Tests ────────────────────────────────────────────────────────
