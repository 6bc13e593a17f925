//! Face alignment via 4-DOF similarity transform.
//!
//! Aligns detected faces to a canonical 112×112 crop using the five
//! InsightFace reference landmarks and least-squares estimation.

use image::RgbImage;

/// ArcFace reference landmarks for a 112×112 output.
const REFERENCE_LANDMARKS_112: [(f32, f32); 5] = [
    (38.2946, 51.6963), // left eye
    (73.5318, 51.5014), // right eye
    (56.0252, 71.7366), // nose
    (41.5493, 92.3655), // left mouth
    (70.7299, 92.2041), // right mouth
];

const ALIGNED_SIZE: u32 = 112;

/// Estimate a 2×3 similarity transform (4-DOF: scale, rotation, translation)
/// from `src` landmarks to `dst` landmarks using least-squares.
///
/// Returns [a, -b, tx, b, a, ty] representing the matrix:
/// ```text
/// | a  -b  tx |
/// | b   a  ty |
/// ```
fn estimate_similarity_transform(src: &[(f32, f32); 5], dst: &[(f32, f32); 5]) -> [f32; 6] {
    // Minimizing sum ||R*s + t - d||^2 with R = [[a, -b], [b, a]] has a
    // closed-form solution in terms of the point sums, so no linear solver
    // is needed.
    let n = src.len() as f32;

    let mut sum_s = (0.0f32, 0.0f32);
    let mut sum_d = (0.0f32, 0.0f32);
    let mut sum_sq = 0.0f32; // sum of |s|^2
    let mut dot = 0.0f32; // sum of s . d
    let mut cross = 0.0f32; // sum of s x d

    for (&(sx, sy), &(dx, dy)) in src.iter().zip(dst.iter()) {
        sum_s.0 += sx;
        sum_s.1 += sy;
        sum_d.0 += dx;
        sum_d.1 += dy;
        sum_sq += sx * sx + sy * sy;
        dot += sx * dx + sy * dy;
        cross += sx * dy - sy * dx;
    }

    // Variance of the source points about their centroid.
    let spread = sum_sq - (sum_s.0 * sum_s.0 + sum_s.1 * sum_s.1) / n;
    if spread.abs() < 1e-9 {
        // Degenerate landmarks (all coincident): identity-ish fallback.
        return [1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
    }

    let a = (dot - (sum_s.0 * sum_d.0 + sum_s.1 * sum_d.1) / n) / spread;
    let b = (cross - (sum_s.0 * sum_d.1 - sum_s.1 * sum_d.0) / n) / spread;
    let tx = (sum_d.0 - a * sum_s.0 + b * sum_s.1) / n;
    let ty = (sum_d.1 - b * sum_s.0 - a * sum_s.1) / n;

    [a, -b, tx, b, a, ty]
}

/// Apply a 2×3 affine warp to an RGB photo, producing a square output crop.
///
/// Uses bilinear interpolation per channel. Out-of-bounds pixels are black.
fn warp_affine(photo: &RgbImage, matrix: &[f32; 6], out_size: u32) -> RgbImage {
    let (a, tx, b, ty) = (matrix[0], matrix[2], matrix[3], matrix[5]);

    // Invert the 2x2 part: M = [[a, -b], [b, a]], det = a^2 + b^2
    let det = a * a + b * b;
    if det.abs() < 1e-12 {
        return RgbImage::new(out_size, out_size);
    }
    let ia = a / det;
    let ib = b / det;

    let (src_w, src_h) = photo.dimensions();
    let mut output = RgbImage::new(out_size, out_size);

    let sample = |x: i32, y: i32| -> [f32; 3] {
        if x >= 0 && (x as u32) < src_w && y >= 0 && (y as u32) < src_h {
            let p = photo.get_pixel(x as u32, y as u32).0;
            [p[0] as f32, p[1] as f32, p[2] as f32]
        } else {
            [0.0; 3]
        }
    };

    for oy in 0..out_size {
        for ox in 0..out_size {
            // Map output pixel back to source: src = M_inv * (dst - t)
            let dx = ox as f32 - tx;
            let dy = oy as f32 - ty;
            let sx = ia * dx + ib * dy;
            let sy = -ib * dx + ia * dy;

            let x0 = sx.floor() as i32;
            let y0 = sy.floor() as i32;
            let fx = sx - x0 as f32;
            let fy = sy - y0 as f32;

            let tl = sample(x0, y0);
            let tr = sample(x0 + 1, y0);
            let bl = sample(x0, y0 + 1);
            let br = sample(x0 + 1, y0 + 1);

            let mut pixel = [0u8; 3];
            for c in 0..3 {
                let val = tl[c] * (1.0 - fx) * (1.0 - fy)
                    + tr[c] * fx * (1.0 - fy)
                    + bl[c] * (1.0 - fx) * fy
                    + br[c] * fx * fy;
                pixel[c] = val.round().clamp(0.0, 255.0) as u8;
            }
            output.put_pixel(ox, oy, image::Rgb(pixel));
        }
    }

    output
}

/// Align a detected face to the canonical 112×112 ArcFace crop.
pub fn align_face(photo: &RgbImage, landmarks: &[(f32, f32); 5]) -> RgbImage {
    let matrix = estimate_similarity_transform(landmarks, &REFERENCE_LANDMARKS_112);
    warp_affine(photo, &matrix, ALIGNED_SIZE)
}
