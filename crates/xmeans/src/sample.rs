use crate::color;

/// Upper bound on the number of points handed to the clustering engine.
pub const MAX_SAMPLE_SIZE: usize = 4096; // 64x64

/// Block-averaged CIELAB points, row-major over a `width` x `height` grid.
#[derive(Debug)]
pub struct LabSample {
    pub width: u16,
    pub height: u16,
    pub points: Vec<Vec<f64>>,
}

fn block_count(width: usize, height: usize, n: usize) -> usize {
    width.div_ceil(n) * height.div_ceil(n)
}

/// Side N of the square blocks that get averaged into one sample.
///
/// - 1 if the image already fits in MAX_SAMPLE_SIZE pixels.
/// - Otherwise the smallest N >= ceil(sqrt(total / MAX_SAMPLE_SIZE)) whose
///   block grid fits.
pub fn block_size(width: u16, height: u16) -> usize {
    let (w, h) = (width as usize, height as usize);
    let total = w * h;
    if total <= MAX_SAMPLE_SIZE {
        return 1;
    }

    let mut n = ((total as f64 / MAX_SAMPLE_SIZE as f64).sqrt()).ceil() as usize;
    while block_count(w, h, n) > MAX_SAMPLE_SIZE {
        n += 1;
    }
    n
}

/// Averages RGB pixels block by block in linear light and converts each
/// average to CIELAB. The buffer must match `width * height * 3`.
pub fn sample(width: u16, height: u16, buf: &[u8]) -> LabSample {
    assert!(width > 0);
    assert!(height > 0);
    assert_eq!(buf.len(), width as usize * height as usize * 3);

    let w = width as usize;
    let h = height as usize;
    let n = block_size(width, height);

    let blocks_x = w.div_ceil(n);
    let blocks_y = h.div_ceil(n);
    let mut points = Vec::with_capacity(blocks_x * blocks_y);

    // Per-block-column accumulators for the current block row
    let mut acc = vec![[0.0f64; 3]; blocks_x];
    let mut acc_count = vec![0u32; blocks_x];

    for by in 0..blocks_y {
        let y_start = by * n;
        let y_end = (y_start + n).min(h);

        for y in y_start..y_end {
            let row = &buf[y * w * 3..(y + 1) * w * 3];

            for bx in 0..blocks_x {
                let x_start = bx * n;
                let x_end = (x_start + n).min(w);

                for pixel in row[x_start * 3..x_end * 3].chunks_exact(3) {
                    for (sum, &channel) in acc[bx].iter_mut().zip(pixel) {
                        *sum += fast_srgb8::srgb8_to_f32(channel) as f64;
                    }
                    acc_count[bx] += 1;
                }
            }
        }

        for bx in 0..blocks_x {
            let count = acc_count[bx] as f64;
            let [r, g, b] = acc[bx].map(|sum| sum / count);
            points.push(color::linear_srgb_to_lab(r, g, b).into());

            acc[bx] = [0.0; 3];
            acc_count[bx] = 0;
        }
    }

    debug_assert_eq!(points.len(), blocks_x * blocks_y);

    LabSample {
        width: blocks_x as u16,
        height: blocks_y as u16,
        points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Lab;
    use rgb::RGB8;

    #[test]
    fn block_size_small_images_are_not_averaged() {
        assert_eq!(block_size(1, 1), 1);
        assert_eq!(block_size(64, 64), 1);
        assert_eq!(block_size(4096, 1), 1);
    }

    #[test]
    fn block_size_keeps_grid_within_limit() {
        assert_eq!(block_size(128, 128), 2);
        for (w, h) in [(65, 65), (4097, 1), (1000, 1500), (2796, 1290), (u16::MAX, 3)] {
            let n = block_size(w, h);
            let blocks = block_count(w as usize, h as usize, n);
            assert!(blocks <= MAX_SAMPLE_SIZE, "{w}x{h}: n = {n}, {blocks} blocks");
        }
    }

    #[test]
    fn single_pixel() {
        let sample = sample(1, 1, &[128, 64, 32]);
        assert_eq!((sample.width, sample.height), (1, 1));

        let expected = color::srgb8_to_lab(RGB8::new(128, 64, 32));
        let actual = Lab::from_point(&sample.points[0]);
        assert!((actual.l - expected.l).abs() < 1e-9);
        assert!((actual.a - expected.a).abs() < 1e-9);
        assert!((actual.b - expected.b).abs() < 1e-9);
    }

    #[test]
    fn aligned_blocks_keep_pure_colours() {
        // 128x128: left half red, right half blue, averaged 2x2
        let (w, h) = (128usize, 128usize);
        let mut buf = Vec::with_capacity(w * h * 3);
        for _ in 0..h {
            for x in 0..w {
                let pixel: [u8; 3] = if x < w / 2 { [255, 0, 0] } else { [0, 0, 255] };
                buf.extend_from_slice(&pixel);
            }
        }

        let sample = sample(w as u16, h as u16, &buf);
        assert_eq!((sample.width, sample.height), (64, 64));
        assert_eq!(sample.points.len(), MAX_SAMPLE_SIZE);

        let red = color::srgb8_to_lab(RGB8::new(255, 0, 0));
        let blue = color::srgb8_to_lab(RGB8::new(0, 0, 255));
        for (i, point) in sample.points.iter().enumerate() {
            let expected = if i % 64 < 32 { red } else { blue };
            let actual = Lab::from_point(point);
            assert!((actual.l - expected.l).abs() < 1e-6, "sample {i}: {actual:?}");
            assert!((actual.a - expected.a).abs() < 1e-6, "sample {i}: {actual:?}");
        }
    }

    #[test]
    fn mixed_block_is_averaged_in_linear_light() {
        // 4097x1 needs 2-pixel blocks; the first block mixes black and white
        let mut buf = vec![0u8; 4097 * 3];
        buf[3..6].copy_from_slice(&[255, 255, 255]);

        let sample = sample(4097, 1, &buf);
        assert_eq!(sample.points.len(), 2049);

        // Linear 0.5 is much lighter than sRGB 128 mixing would suggest
        let expected = color::linear_srgb_to_lab(0.5, 0.5, 0.5);
        let actual = Lab::from_point(&sample.points[0]);
        assert!((actual.l - expected.l).abs() < 1e-6, "got {actual:?}");
        assert!(actual.l > 75.0);
    }
}
