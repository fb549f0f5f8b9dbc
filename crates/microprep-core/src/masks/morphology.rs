//! Binary morphology with a disk structuring element.
//!
//! Masks are carried as frames holding 0.0/1.0 indicators so they share the
//! crop/statistics helpers of ordinary frames.

use crate::image::Frame;

/// Offsets of a disk structuring element of the given radius.
fn disk_offsets(radius: u32) -> Vec<(i64, i64)> {
    let r = radius as i64;
    let mut offsets = Vec::new();
    for dy in -r..=r {
        for dx in -r..=r {
            if dy * dy + dx * dx <= r * r {
                offsets.push((dy, dx));
            }
        }
    }
    offsets
}

fn transform(mask: &Frame, offsets: &[(i64, i64)], take_max: bool) -> Frame {
    let height = mask.height() as i64;
    let width = mask.width() as i64;
    let mut out = Frame::filled(mask.width(), mask.height(), 0.0);
    for row in 0..height {
        for col in 0..width {
            let mut value = if take_max { 0.0f32 } else { 1.0f32 };
            for &(dy, dx) in offsets {
                let r = row + dy;
                let c = col + dx;
                // Pixels outside the frame count as background
                let sample = if r >= 0 && r < height && c >= 0 && c < width {
                    mask.get(r as u32, c as u32)
                } else {
                    0.0
                };
                if take_max {
                    value = value.max(sample);
                    if value >= 1.0 {
                        break;
                    }
                } else {
                    value = value.min(sample);
                    if value <= 0.0 {
                        break;
                    }
                }
            }
            out.set(row as u32, col as u32, value);
        }
    }
    out
}

pub fn dilate(mask: &Frame, radius: u32) -> Frame {
    transform(mask, &disk_offsets(radius), true)
}

pub fn erode(mask: &Frame, radius: u32) -> Frame {
    transform(mask, &disk_offsets(radius), false)
}

/// Closing (dilate then erode): fills holes smaller than the element.
pub fn closing(mask: &Frame, radius: u32) -> Frame {
    erode(&dilate(mask, radius), radius)
}

/// Opening (erode then dilate): removes specks smaller than the element.
pub fn opening(mask: &Frame, radius: u32) -> Frame {
    dilate(&erode(mask, radius), radius)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opening_removes_single_pixel_specks() {
        let mut mask = Frame::filled(9, 9, 0.0);
        mask.set(4, 4, 1.0);
        let opened = opening(&mask, 1);
        assert_eq!(opened.foreground_fraction(), 0.0);
    }

    #[test]
    fn closing_fills_small_holes() {
        let mut mask = Frame::filled(9, 9, 1.0);
        mask.set(4, 4, 0.0);
        let closed = closing(&mask, 1);
        assert_eq!(closed.get(4, 4), 1.0);
    }

    #[test]
    fn dilation_grows_a_block() {
        let mut mask = Frame::filled(7, 7, 0.0);
        mask.set(3, 3, 1.0);
        let dilated = dilate(&mask, 1);
        assert_eq!(dilated.get(3, 2), 1.0);
        assert_eq!(dilated.get(2, 3), 1.0);
        assert_eq!(dilated.get(1, 3), 0.0);
    }
}
