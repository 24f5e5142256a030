//! Tracking state management.
//!
//! `TrackingState` owns the mutable association between object instances
//! seen in earlier frames and their track ids. Exactly one instance exists
//! per pipeline run when tracking is enabled; it is created at run start and
//! discarded at run end, so track ids are only meaningful within one
//! continuous capture session. Ids are allocated from a process-wide counter,
//! which also guarantees that ids from one run never reappear in the next.
//!
//! Two interchangeable association algorithms are supported. Both do greedy
//! IoU matching with coasting through short detection gaps; they differ in
//! matching policy:
//!
//! - `ByteTrack`: two-stage matching, where high-confidence detections claim
//!   tracks first, low-confidence detections then rescue what is left.
//! - `BotSort`: single stage plus a centroid-distance fallback that rescues
//!   recently lost tracks when overlap collapses under fast motion.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::engine::{BoundingBox, Detection};
use crate::frame::TARGET_WIDTH;

static NEXT_TRACK_ID: AtomicU64 = AtomicU64::new(1);

/// Tracker algorithm selector. Opaque to the pipeline, which only forwards
/// it to the inference boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackerAlgorithm {
    ByteTrack,
    BotSort,
}

impl TrackerAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ByteTrack => "bytetrack",
            Self::BotSort => "botsort",
        }
    }

    fn params(&self) -> AlgorithmParams {
        match self {
            Self::ByteTrack => AlgorithmParams {
                min_iou: 0.20,
                max_coast_frames: 30,
                high_score: Some(0.50),
                centroid_fallback: None,
            },
            Self::BotSort => AlgorithmParams {
                min_iou: 0.25,
                max_coast_frames: 30,
                high_score: None,
                centroid_fallback: Some(CentroidFallback {
                    max_distance: 0.20 * TARGET_WIDTH as f32,
                    max_coast_frames: 10,
                }),
            },
        }
    }
}

impl FromStr for TrackerAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept the bare names and the upstream config-file spellings.
        match s.trim().to_ascii_lowercase().as_str() {
            "bytetrack" | "bytetrack.yaml" => Ok(Self::ByteTrack),
            "botsort" | "botsort.yaml" => Ok(Self::BotSort),
            other => Err(format!(
                "unknown tracker '{other}', expected 'bytetrack' or 'botsort'"
            )),
        }
    }
}

impl std::fmt::Display for TrackerAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct AlgorithmParams {
    min_iou: f32,
    max_coast_frames: u32,
    /// Two-stage split: detections at or above this score match first.
    high_score: Option<f32>,
    centroid_fallback: Option<CentroidFallback>,
}

struct CentroidFallback {
    /// Maximum center distance in normalized-frame pixels.
    max_distance: f32,
    /// Only rescue tracks lost at most this many frames ago.
    max_coast_frames: u32,
}

struct Track {
    id: u64,
    bbox: BoundingBox,
    class_id: u32,
    misses: u32,
}

/// Per-run tracker state. See the module docs for lifecycle rules.
pub struct TrackingState {
    algorithm: TrackerAlgorithm,
    tracks: Vec<Track>,
    frames_seen: u64,
}

impl TrackingState {
    pub fn new(algorithm: TrackerAlgorithm) -> Self {
        Self {
            algorithm,
            tracks: Vec::new(),
            frames_seen: 0,
        }
    }

    pub fn algorithm(&self) -> TrackerAlgorithm {
        self.algorithm
    }

    /// Tracks currently alive (matched recently enough to still coast).
    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    /// Associate one frame's detections with existing tracks, assigning a
    /// track id to every detection. Unmatched detections spawn new tracks;
    /// unmatched tracks coast and eventually expire.
    pub fn update(&mut self, detections: &mut [Detection]) {
        self.frames_seen += 1;
        let params = self.algorithm.params();

        let mut det_order: Vec<usize> = (0..detections.len()).collect();
        det_order.sort_by(|&a, &b| {
            detections[b]
                .confidence
                .total_cmp(&detections[a].confidence)
        });

        let mut track_taken = vec![false; self.tracks.len()];
        let mut det_matched = vec![false; detections.len()];

        // Stage one: high-confidence detections (all of them when the
        // algorithm has no score split).
        for &di in &det_order {
            if let Some(high) = params.high_score {
                if detections[di].confidence < high {
                    continue;
                }
            }
            self.match_by_iou(detections, di, &mut track_taken, &mut det_matched, &params);
        }
        // Stage two: remaining low-confidence detections.
        if params.high_score.is_some() {
            for &di in &det_order {
                if det_matched[di] {
                    continue;
                }
                self.match_by_iou(detections, di, &mut track_taken, &mut det_matched, &params);
            }
        }

        // Centroid rescue for recently lost tracks.
        if let Some(fallback) = &params.centroid_fallback {
            for &di in &det_order {
                if det_matched[di] {
                    continue;
                }
                let center = detections[di].bbox.center();
                let mut best: Option<(usize, f32)> = None;
                for (ti, track) in self.tracks.iter().enumerate() {
                    if track_taken[ti]
                        || track.misses > fallback.max_coast_frames
                        || track.class_id != detections[di].class_id
                    {
                        continue;
                    }
                    let (tx, ty) = track.bbox.center();
                    let dist = ((center.0 - tx).powi(2) + (center.1 - ty).powi(2)).sqrt();
                    if dist <= fallback.max_distance
                        && best.map(|(_, d)| dist < d).unwrap_or(true)
                    {
                        best = Some((ti, dist));
                    }
                }
                if let Some((ti, _)) = best {
                    self.assign(detections, di, ti);
                    track_taken[ti] = true;
                    det_matched[di] = true;
                }
            }
        }

        // Unmatched tracks coast; expired tracks drop.
        let max_coast = params.max_coast_frames;
        let mut kept = Vec::with_capacity(self.tracks.len());
        for (ti, mut track) in std::mem::take(&mut self.tracks).into_iter().enumerate() {
            if !track_taken[ti] {
                track.misses += 1;
            }
            if track.misses <= max_coast {
                kept.push(track);
            }
        }
        self.tracks = kept;

        // Unmatched detections start new tracks with fresh ids.
        for (di, detection) in detections.iter_mut().enumerate() {
            if det_matched[di] {
                continue;
            }
            let id = NEXT_TRACK_ID.fetch_add(1, Ordering::Relaxed);
            detection.track_id = Some(id);
            self.tracks.push(Track {
                id,
                bbox: detection.bbox,
                class_id: detection.class_id,
                misses: 0,
            });
        }
    }

    fn match_by_iou(
        &mut self,
        detections: &mut [Detection],
        di: usize,
        track_taken: &mut [bool],
        det_matched: &mut [bool],
        params: &AlgorithmParams,
    ) {
        let mut best: Option<(usize, f32)> = None;
        for (ti, track) in self.tracks.iter().enumerate() {
            if track_taken[ti] || track.class_id != detections[di].class_id {
                continue;
            }
            let iou = track.bbox.iou(&detections[di].bbox);
            if iou >= params.min_iou && best.map(|(_, b)| iou > b).unwrap_or(true) {
                best = Some((ti, iou));
            }
        }
        if let Some((ti, _)) = best {
            self.assign(detections, di, ti);
            track_taken[ti] = true;
            det_matched[di] = true;
        }
    }

    fn assign(&mut self, detections: &mut [Detection], di: usize, ti: usize) {
        let track = &mut self.tracks[ti];
        track.bbox = detections[di].bbox;
        track.misses = 0;
        detections[di].track_id = Some(track.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(x: f32, y: f32, confidence: f32) -> Detection {
        Detection {
            class_id: 0,
            label: None,
            confidence,
            bbox: BoundingBox {
                x,
                y,
                w: 60.0,
                h: 40.0,
            },
            track_id: None,
        }
    }

    #[test]
    fn overlapping_detections_keep_their_id_across_frames() {
        let mut state = TrackingState::new(TrackerAlgorithm::ByteTrack);

        let mut frame1 = vec![det(100.0, 100.0, 0.9)];
        state.update(&mut frame1);
        let id = frame1[0].track_id.expect("id assigned");

        let mut frame2 = vec![det(108.0, 102.0, 0.9)];
        state.update(&mut frame2);
        assert_eq!(frame2[0].track_id, Some(id));
    }

    #[test]
    fn tracks_coast_through_a_missed_frame() {
        let mut state = TrackingState::new(TrackerAlgorithm::ByteTrack);

        let mut frame1 = vec![det(100.0, 100.0, 0.9)];
        state.update(&mut frame1);
        let id = frame1[0].track_id.unwrap();

        // The object vanishes for one frame (dropped inference, occlusion).
        let mut empty: Vec<Detection> = vec![];
        state.update(&mut empty);
        assert_eq!(state.active_tracks(), 1);

        let mut frame3 = vec![det(104.0, 101.0, 0.9)];
        state.update(&mut frame3);
        assert_eq!(frame3[0].track_id, Some(id));
    }

    #[test]
    fn separate_states_never_share_ids() {
        let mut run1 = TrackingState::new(TrackerAlgorithm::ByteTrack);
        let mut frame = vec![det(10.0, 10.0, 0.9), det(300.0, 200.0, 0.8)];
        run1.update(&mut frame);
        let run1_ids: Vec<u64> = frame.iter().filter_map(|d| d.track_id).collect();

        let mut run2 = TrackingState::new(TrackerAlgorithm::ByteTrack);
        let mut frame = vec![det(10.0, 10.0, 0.9), det(300.0, 200.0, 0.8)];
        run2.update(&mut frame);
        for d in &frame {
            assert!(!run1_ids.contains(&d.track_id.unwrap()));
        }
    }

    #[test]
    fn bytetrack_low_confidence_detections_still_match() {
        let mut state = TrackingState::new(TrackerAlgorithm::ByteTrack);

        let mut frame1 = vec![det(100.0, 100.0, 0.9)];
        state.update(&mut frame1);
        let id = frame1[0].track_id.unwrap();

        // Same object, momentarily low score (blur). Second stage rescues it.
        let mut frame2 = vec![det(105.0, 100.0, 0.3)];
        state.update(&mut frame2);
        assert_eq!(frame2[0].track_id, Some(id));
    }

    #[test]
    fn botsort_centroid_fallback_rescues_fast_movers() {
        let mut state = TrackingState::new(TrackerAlgorithm::BotSort);

        let mut frame1 = vec![det(100.0, 100.0, 0.9)];
        state.update(&mut frame1);
        let id = frame1[0].track_id.unwrap();

        // Jumped far enough that IoU is zero, but the centroid is close.
        let mut frame2 = vec![det(170.0, 100.0, 0.9)];
        state.update(&mut frame2);
        assert_eq!(frame2[0].track_id, Some(id));

        // ByteTrack has no fallback, so the same jump spawns a new track.
        let mut state = TrackingState::new(TrackerAlgorithm::ByteTrack);
        let mut frame1 = vec![det(100.0, 100.0, 0.9)];
        state.update(&mut frame1);
        let id = frame1[0].track_id.unwrap();
        let mut frame2 = vec![det(170.0, 100.0, 0.9)];
        state.update(&mut frame2);
        assert_ne!(frame2[0].track_id, Some(id));
    }

    #[test]
    fn stale_tracks_expire() {
        let mut state = TrackingState::new(TrackerAlgorithm::ByteTrack);
        let mut frame = vec![det(100.0, 100.0, 0.9)];
        state.update(&mut frame);

        let mut empty: Vec<Detection> = vec![];
        for _ in 0..31 {
            state.update(&mut empty);
        }
        assert_eq!(state.active_tracks(), 0);
    }

    #[test]
    fn tracker_names_round_trip() {
        for algorithm in [TrackerAlgorithm::ByteTrack, TrackerAlgorithm::BotSort] {
            assert_eq!(
                algorithm.as_str().parse::<TrackerAlgorithm>().unwrap(),
                algorithm
            );
        }
        assert_eq!(
            "bytetrack.yaml".parse::<TrackerAlgorithm>().unwrap(),
            TrackerAlgorithm::ByteTrack
        );
        assert!("deepsort".parse::<TrackerAlgorithm>().is_err());
    }
}
