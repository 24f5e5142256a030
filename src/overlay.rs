//! Annotation overlay.
//!
//! Draws detection results into a frame's RGB buffer: a class-colored border
//! per bounding box, a confidence bar along the top edge, and a solid tab
//! keyed to the track id when one is assigned. Engines call this to produce
//! the annotated frame the pipeline emits.

use crate::engine::Detection;
use crate::frame::Frame;

const BORDER_THICKNESS: u32 = 2;
const TRACK_TAB_SIZE: u32 = 10;

/// Fixed palette; colors repeat after eight classes.
const PALETTE: [[u8; 3]; 8] = [
    [230, 57, 70],
    [46, 196, 182],
    [255, 183, 3],
    [106, 76, 219],
    [67, 170, 139],
    [244, 140, 6],
    [87, 117, 144],
    [239, 71, 111],
];

pub fn class_color(class_id: u32) -> [u8; 3] {
    PALETTE[(class_id as usize) % PALETTE.len()]
}

/// Draw all detections onto the frame.
pub fn draw_detections(frame: &mut Frame, detections: &[Detection]) {
    for detection in detections {
        let color = class_color(detection.class_id);
        if let Some(rect) = clamp_rect(frame, detection.bbox.to_pixel_rect()) {
            draw_border(frame, rect, color, BORDER_THICKNESS);
            draw_confidence_bar(frame, rect, color, detection.confidence);
        }
    }
}

/// Draw a solid id tab at the top-left corner of each tracked detection.
/// The tab color is keyed to the id so adjacent tracks stay tellable apart.
pub fn draw_track_ids(frame: &mut Frame, detections: &[Detection]) {
    for detection in detections {
        let Some(id) = detection.track_id else {
            continue;
        };
        let Some([x0, y0, _, _]) = clamp_rect(frame, detection.bbox.to_pixel_rect()) else {
            continue;
        };
        let color = PALETTE[(id as usize) % PALETTE.len()];
        let x1 = (x0 + TRACK_TAB_SIZE).min(frame.width.saturating_sub(1));
        let y1 = (y0 + TRACK_TAB_SIZE).min(frame.height.saturating_sub(1));
        fill_rect(frame, [x0, y0, x1, y1], color);
    }
}

/// Clamp a pixel rect to the frame, dropping degenerate boxes.
fn clamp_rect(frame: &Frame, rect: [i64; 4]) -> Option<[u32; 4]> {
    let (w, h) = (frame.width as i64, frame.height as i64);
    let x0 = rect[0].clamp(0, w - 1) as u32;
    let y0 = rect[1].clamp(0, h - 1) as u32;
    let x1 = rect[2].clamp(0, w - 1) as u32;
    let y1 = rect[3].clamp(0, h - 1) as u32;
    if x0 >= x1 || y0 >= y1 {
        return None;
    }
    Some([x0, y0, x1, y1])
}

fn draw_border(frame: &mut Frame, [x0, y0, x1, y1]: [u32; 4], color: [u8; 3], thickness: u32) {
    for t in 0..thickness {
        let xx0 = x0.saturating_add(t);
        let yy0 = y0.saturating_add(t);
        let xx1 = x1.saturating_sub(t);
        let yy1 = y1.saturating_sub(t);
        if xx0 > xx1 || yy0 > yy1 {
            break;
        }
        for x in xx0..=xx1 {
            put_pixel(frame, x, yy0, color);
            put_pixel(frame, x, yy1, color);
        }
        for y in yy0..=yy1 {
            put_pixel(frame, xx0, y, color);
            put_pixel(frame, xx1, y, color);
        }
    }
}

/// Fill a bar along the box's top edge proportional to the score.
fn draw_confidence_bar(frame: &mut Frame, [x0, y0, x1, _]: [u32; 4], color: [u8; 3], score: f32) {
    let width = x1 - x0;
    let filled = (width as f32 * score.clamp(0.0, 1.0)) as u32;
    if filled == 0 || y0 < BORDER_THICKNESS {
        return;
    }
    let bar_y1 = (y0 + 3).min(frame.height.saturating_sub(1));
    fill_rect(frame, [x0, y0, x0 + filled, bar_y1], color);
}

fn fill_rect(frame: &mut Frame, [x0, y0, x1, y1]: [u32; 4], color: [u8; 3]) {
    for y in y0..=y1 {
        for x in x0..=x1 {
            put_pixel(frame, x, y, color);
        }
    }
}

fn put_pixel(frame: &mut Frame, x: u32, y: u32, color: [u8; 3]) {
    if x >= frame.width || y >= frame.height {
        return;
    }
    let offset = ((y * frame.width + x) * 3) as usize;
    frame.pixels_mut()[offset..offset + 3].copy_from_slice(&color);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::BoundingBox;
    use crate::frame::StreamId;

    fn blank_frame(width: u32, height: u32) -> Frame {
        Frame::new(
            vec![0u8; (width * height * 3) as usize],
            width,
            height,
            StreamId::next(),
            1,
        )
        .unwrap()
    }

    fn detection(bbox: BoundingBox, track_id: Option<u64>) -> Detection {
        Detection {
            class_id: 0,
            label: None,
            confidence: 0.9,
            bbox,
            track_id,
        }
    }

    #[test]
    fn border_pixels_take_class_color() {
        let mut frame = blank_frame(64, 64);
        let bbox = BoundingBox {
            x: 10.0,
            y: 10.0,
            w: 20.0,
            h: 20.0,
        };
        draw_detections(&mut frame, &[detection(bbox, None)]);

        let color = class_color(0);
        let offset = ((10 * 64 + 10) * 3) as usize;
        assert_eq!(&frame.pixels()[offset..offset + 3], &color);
    }

    #[test]
    fn out_of_bounds_boxes_are_clamped_not_panicking() {
        let mut frame = blank_frame(32, 32);
        let bbox = BoundingBox {
            x: -10.0,
            y: 28.0,
            w: 100.0,
            h: 100.0,
        };
        draw_detections(&mut frame, &[detection(bbox, Some(3))]);
        draw_track_ids(&mut frame, &[detection(bbox, Some(3))]);
    }

    #[test]
    fn untracked_detections_get_no_tab() {
        let mut frame = blank_frame(64, 64);
        let bbox = BoundingBox {
            x: 20.0,
            y: 20.0,
            w: 10.0,
            h: 10.0,
        };
        let before = frame.pixels().to_vec();
        draw_track_ids(&mut frame, &[detection(bbox, None)]);
        assert_eq!(frame.pixels(), &before[..]);
    }
}
