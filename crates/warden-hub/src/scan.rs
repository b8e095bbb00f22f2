//! Frame scan loops for enrollment and face authentication.
//!
//! Both loops pull frames from an already-acquired [`FrameSource`], hand each
//! one to the encoder, and report every frame to a [`ScanObserver`]. They do
//! not touch the ledger or the fault counter; the hub interprets the
//! [`ScanStop`] they return.

use warden_core::{BestFace, BestFaceTracker, EncoderError, FaceEncoder, Gallery, MatchResult, Matcher};
use warden_hw::preview::{COLOR_ACCEPT, COLOR_REJECT};
use warden_hw::{CameraError, Frame, FrameSource, Overlay};

/// Receives per-frame progress from a scan.
pub trait ScanObserver {
    /// Called once per processed frame with an outline for each face.
    fn frame(&mut self, frame: &Frame, overlays: &[Overlay]);

    /// Called for every face that matched no enrolled identity.
    fn unknown_face(&mut self, frame_index: usize);
}

/// A device failure that ended a scan early.
#[derive(Debug)]
pub enum DeviceFault {
    Capture(CameraError),
    Encoder(EncoderError),
}

/// Why a scan loop stopped.
#[derive(Debug)]
pub enum ScanStop {
    /// The frame cap was reached.
    FrameCap,
    /// The source reported end of stream.
    EndOfStream,
    /// A known face was found (authentication only).
    Matched,
    Device(DeviceFault),
}

#[derive(Debug)]
pub struct EnrollScan {
    pub best: Option<BestFace>,
    pub frames: usize,
    pub stop: ScanStop,
}

#[derive(Debug)]
pub struct AuthScan {
    /// Label of the identity that ended the scan.
    pub matched: Option<String>,
    pub frames: usize,
    pub unknown_faces: usize,
    pub stop: ScanStop,
}

fn pull(source: &mut dyn FrameSource) -> Result<Option<Frame>, ScanStop> {
    match source.next_frame() {
        Ok(Some(frame)) => Ok(Some(frame)),
        Ok(None) => Ok(None),
        Err(e) => Err(ScanStop::Device(DeviceFault::Capture(e))),
    }
}

fn overlay(bbox: &warden_core::BoundingBox, color: [u8; 3]) -> Overlay {
    Overlay {
        x: bbox.x,
        y: bbox.y,
        width: bbox.width,
        height: bbox.height,
        color,
    }
}

/// Sample up to `frame_cap` frames and keep the highest-scoring face.
pub fn run_enroll(
    source: &mut dyn FrameSource,
    encoder: &mut dyn FaceEncoder,
    frame_cap: usize,
    observer: &mut dyn ScanObserver,
) -> EnrollScan {
    let mut tracker = BestFaceTracker::new();
    let mut frames = 0;

    let stop = loop {
        if frames >= frame_cap {
            break ScanStop::FrameCap;
        }
        let frame = match pull(source) {
            Ok(Some(frame)) => frame,
            Ok(None) => break ScanStop::EndOfStream,
            Err(stop) => break stop,
        };
        let detections = match encoder.detect_and_encode(&frame.data, frame.width, frame.height) {
            Ok(d) => d,
            Err(e) => break ScanStop::Device(DeviceFault::Encoder(e)),
        };

        let scores = tracker.observe(frames, frame.width, frame.height, &detections);
        tracing::debug!(frame = frames, faces = detections.len(), ?scores, "enroll: scored frame");

        let overlays: Vec<Overlay> = detections.iter().map(|d| overlay(&d.bbox, COLOR_ACCEPT)).collect();
        observer.frame(&frame, &overlays);
        frames += 1;
    };

    EnrollScan {
        best: tracker.into_best(),
        frames,
        stop,
    }
}

/// Scan up to `frame_cap` frames, stopping at the first frame that contains
/// a known face.
///
/// Every face in a frame is matched. Unknown faces are reported to the
/// observer even when another face in the same frame is known. When several
/// faces in one frame match, the last one in detection order names the user.
pub fn run_authenticate(
    source: &mut dyn FrameSource,
    encoder: &mut dyn FaceEncoder,
    matcher: &dyn Matcher,
    gallery: &Gallery,
    frame_cap: usize,
    observer: &mut dyn ScanObserver,
) -> AuthScan {
    let mut frames = 0;
    let mut unknown_faces = 0;
    let mut matched = None;

    let stop = loop {
        if frames >= frame_cap {
            break ScanStop::FrameCap;
        }
        let frame = match pull(source) {
            Ok(Some(frame)) => frame,
            Ok(None) => break ScanStop::EndOfStream,
            Err(stop) => break stop,
        };
        let detections = match encoder.detect_and_encode(&frame.data, frame.width, frame.height) {
            Ok(d) => d,
            Err(e) => break ScanStop::Device(DeviceFault::Encoder(e)),
        };

        let mut overlays = Vec::with_capacity(detections.len());
        let mut frame_match = None;
        for det in &detections {
            match matcher.compare(&det.embedding, gallery) {
                MatchResult::Known { label, distance, .. } => {
                    tracing::debug!(frame = frames, %label, distance, "auth: face matched");
                    overlays.push(overlay(&det.bbox, COLOR_ACCEPT));
                    frame_match = Some(label);
                }
                MatchResult::Unknown => {
                    overlays.push(overlay(&det.bbox, COLOR_REJECT));
                    unknown_faces += 1;
                    observer.unknown_face(frames);
                }
            }
        }
        observer.frame(&frame, &overlays);
        frames += 1;

        if frame_match.is_some() {
            matched = frame_match;
            break ScanStop::Matched;
        }
    };

    AuthScan {
        matched,
        frames,
        unknown_faces,
        stop,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use warden_core::{Embedding, FirstMatchMatcher};

    fn gallery(entries: &[(&str, &[f32])]) -> Gallery {
        let mut g = Gallery::new();
        for (label, v) in entries {
            g.upsert(label, Embedding::new(v.to_vec())).unwrap();
        }
        g
    }

    #[test]
    fn test_enroll_keeps_best_across_frames() {
        let (mut src, mut enc) = script(vec![
            Step::Faces(vec![face(2.0, &[1.0])]),
            Step::Faces(vec![face(6.0, &[2.0]), face(1.0, &[3.0])]),
            Step::Faces(vec![face(4.0, &[4.0])]),
        ]);
        let mut rec = Recorder::default();
        let scan = run_enroll(&mut src, &mut enc, 30, &mut rec);

        assert!(matches!(scan.stop, ScanStop::EndOfStream));
        assert_eq!(scan.frames, 3);
        assert_eq!(rec.frames, 3);
        let best = scan.best.unwrap();
        assert_eq!(best.embedding.values, vec![2.0]);
        assert_eq!(best.frame_index, 1);
    }

    #[test]
    fn test_enroll_respects_frame_cap() {
        let steps = (0..10).map(|_| Step::Faces(vec![face(2.0, &[1.0])])).collect();
        let (mut src, mut enc) = script(steps);
        let scan = run_enroll(&mut src, &mut enc, 4, &mut Recorder::default());
        assert!(matches!(scan.stop, ScanStop::FrameCap));
        assert_eq!(scan.frames, 4);
    }

    #[test]
    fn test_enroll_no_faces() {
        let (mut src, mut enc) = script(vec![Step::Faces(vec![]), Step::Faces(vec![])]);
        let scan = run_enroll(&mut src, &mut enc, 30, &mut Recorder::default());
        assert!(scan.best.is_none());
    }

    #[test]
    fn test_enroll_device_error_keeps_best_so_far() {
        let (mut src, mut enc) = script(vec![
            Step::Faces(vec![face(4.0, &[9.0])]),
            Step::CaptureError,
            Step::Faces(vec![face(8.0, &[1.0])]),
        ]);
        let scan = run_enroll(&mut src, &mut enc, 30, &mut Recorder::default());
        assert!(matches!(scan.stop, ScanStop::Device(DeviceFault::Capture(_))));
        assert_eq!(scan.best.unwrap().embedding.values, vec![9.0]);
    }

    #[test]
    fn test_auth_stops_at_first_known_frame() {
        let g = gallery(&[("alice", &[0.0, 0.0])]);
        let (mut src, mut enc) = script(vec![
            Step::Faces(vec![]),
            Step::Faces(vec![face(2.0, &[3.0, 0.0])]),
            Step::Faces(vec![face(2.0, &[0.1, 0.0])]),
            Step::Faces(vec![face(2.0, &[0.0, 0.0])]),
        ]);
        let mut rec = Recorder::default();
        let scan = run_authenticate(&mut src, &mut enc, &FirstMatchMatcher::default(), &g, 30, &mut rec);

        assert!(matches!(scan.stop, ScanStop::Matched));
        assert_eq!(scan.matched.as_deref(), Some("alice"));
        assert_eq!(scan.frames, 3);
        assert_eq!(rec.unknown, vec![1]);
        assert_eq!(rec.overlays[2][0].color, COLOR_ACCEPT);
    }

    #[test]
    fn test_auth_reports_unknown_even_when_frame_matches() {
        let g = gallery(&[("alice", &[0.0, 0.0])]);
        let (mut src, mut enc) = script(vec![Step::Faces(vec![
            face(2.0, &[5.0, 5.0]),
            face(2.0, &[0.0, 0.0]),
        ])]);
        let mut rec = Recorder::default();
        let scan = run_authenticate(&mut src, &mut enc, &FirstMatchMatcher::default(), &g, 30, &mut rec);

        assert_eq!(scan.matched.as_deref(), Some("alice"));
        assert_eq!(scan.unknown_faces, 1);
        assert_eq!(rec.unknown, vec![0]);
        assert_eq!(rec.overlays[0][0].color, COLOR_REJECT);
        assert_eq!(rec.overlays[0][1].color, COLOR_ACCEPT);
    }

    #[test]
    fn test_auth_last_matching_face_names_user() {
        let g = gallery(&[("alice", &[0.0]), ("bob", &[10.0])]);
        let (mut src, mut enc) = script(vec![Step::Faces(vec![face(2.0, &[0.0]), face(2.0, &[10.0])])]);
        let scan = run_authenticate(&mut src, &mut enc, &FirstMatchMatcher::default(), &g, 30, &mut Recorder::default());
        assert_eq!(scan.matched.as_deref(), Some("bob"));
    }

    #[test]
    fn test_auth_exhausts_frames() {
        let g = gallery(&[("alice", &[0.0])]);
        let steps = (0..5).map(|_| Step::Faces(vec![face(2.0, &[3.0])])).collect();
        let (mut src, mut enc) = script(steps);
        let mut rec = Recorder::default();
        let scan = run_authenticate(&mut src, &mut enc, &FirstMatchMatcher::default(), &g, 3, &mut rec);
        assert!(matches!(scan.stop, ScanStop::FrameCap));
        assert!(scan.matched.is_none());
        assert_eq!(rec.unknown, vec![0, 1, 2]);
    }

    #[test]
    fn test_auth_encoder_failure_stops_scan() {
        let g = gallery(&[("alice", &[0.0])]);
        let (mut src, mut enc) = script(vec![Step::EncoderError, Step::Faces(vec![face(2.0, &[0.0])])]);
        let scan = run_authenticate(&mut src, &mut enc, &FirstMatchMatcher::default(), &g, 30, &mut Recorder::default());
        assert!(matches!(scan.stop, ScanStop::Device(DeviceFault::Encoder(_))));
        assert!(scan.matched.is_none());
        assert_eq!(scan.frames, 0);
    }
}
