//! Face-presence gating.
//!
//! Each video frame yields zero or more landmark sets. The first detected
//! face decides whether the subject is fully framed: its bounding box must
//! stay clear of a 10% band along every edge of the frame.

use crate::types::{CameraMode, FaceBoundingBox, LandmarkSet};

/// Fraction of the frame on each edge the face must stay out of.
pub const FRAME_MARGIN: f32 = 0.1;

/// True when the first face in `faces` sits fully inside the margins.
pub fn is_face_framed(faces: &[LandmarkSet]) -> bool {
    faces
        .first()
        .and_then(|face| FaceBoundingBox::from_landmarks(face))
        .is_some_and(|b| b.within_margin(FRAME_MARGIN))
}

/// Whether a capture may proceed given the latest gate signal.
/// Group shots are never gated on a single framed face.
pub fn capture_allowed(mode: CameraMode, framed: bool) -> bool {
    match mode {
        CameraMode::Friends => true,
        CameraMode::Solo => framed,
    }
}

/// Per-frame classifier. Polled by an external frame scheduler; the result
/// goes to the sink on every frame, even when unchanged, so consumers only
/// ever need the latest value.
#[derive(Debug)]
pub struct FacePresenceGate {
    available: bool,
    frames: u64,
    last: bool,
}

impl Default for FacePresenceGate {
    fn default() -> Self {
        Self::new()
    }
}

impl FacePresenceGate {
    pub fn new() -> Self {
        Self {
            available: true,
            frames: 0,
            last: false,
        }
    }

    /// A gate for a missing camera or landmark model. Always reports `false`.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Evaluate one frame and publish the result.
    pub fn poll<F: FnMut(bool)>(&mut self, faces: &[LandmarkSet], mut sink: F) -> bool {
        let framed = self.available && is_face_framed(faces);
        self.frames += 1;
        if framed != self.last {
            tracing::debug!(framed, faces = faces.len(), frame = self.frames, "face framing changed");
        }
        self.last = framed;
        sink(framed);
        framed
    }

    /// Most recent result (false before the first frame).
    pub fn last(&self) -> bool {
        self.last
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Landmark;

    fn face(min: f32, max: f32) -> LandmarkSet {
        vec![
            Landmark::new(min, min),
            Landmark::new(max, min),
            Landmark::new(min, max),
            Landmark::new(max, max),
            Landmark::new((min + max) / 2.0, (min + max) / 2.0),
        ]
    }

    #[test]
    fn test_no_faces_is_not_framed() {
        assert!(!is_face_framed(&[]));
    }

    #[test]
    fn test_face_without_points_is_not_framed() {
        assert!(!is_face_framed(&[vec![]]));
    }

    #[test]
    fn test_centered_face_is_framed() {
        assert!(is_face_framed(&[face(0.2, 0.8)]));
    }

    #[test]
    fn test_face_touching_margin_is_not_framed() {
        let mut f = face(0.2, 0.8);
        f.push(Landmark::new(0.09, 0.5));
        assert!(!is_face_framed(&[f]));

        let mut f = face(0.2, 0.8);
        f.push(Landmark::new(0.5, 0.95));
        assert!(!is_face_framed(&[f]));
    }

    #[test]
    fn test_only_first_face_counts() {
        assert!(!is_face_framed(&[face(0.0, 0.5), face(0.2, 0.8)]));
        assert!(is_face_framed(&[face(0.2, 0.8), face(0.0, 0.5)]));
    }

    #[test]
    fn test_capture_allowed_by_mode() {
        assert!(capture_allowed(CameraMode::Friends, false));
        assert!(capture_allowed(CameraMode::Solo, true));
        assert!(!capture_allowed(CameraMode::Solo, false));
    }

    #[test]
    fn test_poll_publishes_every_frame() {
        let mut gate = FacePresenceGate::new();
        let mut published = Vec::new();
        let frames = [vec![face(0.2, 0.8)], vec![face(0.2, 0.8)], vec![], vec![]];
        for faces in &frames {
            gate.poll(faces, |v| published.push(v));
        }
        assert_eq!(published, vec![true, true, false, false]);
        assert_eq!(gate.frames_seen(), 4);
        assert!(!gate.last());
    }

    #[test]
    fn test_unavailable_gate_never_frames() {
        let mut gate = FacePresenceGate::unavailable();
        let mut published = Vec::new();
        gate.poll(&[face(0.2, 0.8)], |v| published.push(v));
        assert_eq!(published, vec![false]);
        assert!(!gate.is_available());
    }
}
