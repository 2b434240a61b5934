//! Integer-factor box downscale. The frame sampler sends small frames at a
//! low rate; a box average over `factor`×`factor` blocks is plenty and
//! avoids pulling a full resize stack into the hot path.

use crate::frame::RawFrame;

/// Shrink by an integer factor, averaging each block per channel.
///
/// Trailing rows/columns that do not fill a whole block are discarded.
/// Returns `None` when the frame is smaller than one block.
pub fn downscale(frame: &RawFrame, factor: u32) -> Option<RawFrame> {
    assert!(factor > 0);
    if factor == 1 {
        return Some(frame.clone());
    }

    let out_w = frame.width / factor;
    let out_h = frame.height / factor;
    if out_w == 0 || out_h == 0 {
        return None;
    }

    let stride = (frame.width * 3) as usize;
    let block = factor * factor;
    let mut rgb = Vec::with_capacity((out_w * out_h * 3) as usize);

    for oy in 0..out_h {
        for ox in 0..out_w {
            let mut sums = [0u32; 3];
            for dy in 0..factor {
                let row = ((oy * factor + dy) as usize) * stride;
                for dx in 0..factor {
                    let px = row + ((ox * factor + dx) as usize) * 3;
                    sums[0] += frame.rgb[px] as u32;
                    sums[1] += frame.rgb[px + 1] as u32;
                    sums[2] += frame.rgb[px + 2] as u32;
                }
            }
            rgb.push((sums[0] / block) as u8);
            rgb.push((sums[1] / block) as u8);
            rgb.push((sums[2] / block) as u8);
        }
    }

    Some(RawFrame {
        width: out_w,
        height: out_h,
        rgb,
        captured_at: frame.captured_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, color: [u8; 3]) -> RawFrame {
        let mut rgb = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..width * height {
            rgb.extend_from_slice(&color);
        }
        RawFrame::new(width, height, rgb)
    }

    #[test]
    fn output_dimensions_are_one_third() {
        let frame = solid_frame(9, 6, [10, 20, 30]);
        let out = downscale(&frame, 3).unwrap();
        assert_eq!((out.width, out.height), (3, 2));
        assert_eq!(out.rgb.len(), 3 * 2 * 3);
    }

    #[test]
    fn solid_color_survives_averaging() {
        let frame = solid_frame(12, 12, [200, 100, 50]);
        let out = downscale(&frame, 3).unwrap();
        for px in out.rgb.chunks_exact(3) {
            assert_eq!(px, &[200, 100, 50]);
        }
    }

    #[test]
    fn blocks_average_their_pixels() {
        // 2x2 frame, factor 2: one output pixel averaging all four.
        let rgb = vec![
            0, 0, 0, /**/ 100, 100, 100, //
            200, 200, 200, /**/ 100, 100, 100,
        ];
        let frame = RawFrame::new(2, 2, rgb);
        let out = downscale(&frame, 2).unwrap();
        assert_eq!((out.width, out.height), (1, 1));
        assert_eq!(out.rgb, vec![100, 100, 100]);
    }

    #[test]
    fn trailing_pixels_are_discarded() {
        let frame = solid_frame(10, 7, [1, 2, 3]);
        let out = downscale(&frame, 3).unwrap();
        assert_eq!((out.width, out.height), (3, 2));
    }

    #[test]
    fn frame_smaller_than_block_is_rejected() {
        let frame = solid_frame(2, 2, [0, 0, 0]);
        assert!(downscale(&frame, 3).is_none());
    }

    #[test]
    fn factor_one_is_identity() {
        let frame = solid_frame(4, 4, [9, 9, 9]);
        let out = downscale(&frame, 1).unwrap();
        assert_eq!(out.rgb, frame.rgb);
    }
}
