//! LBPH (local binary pattern histogram) face matcher.
//!
//! A face region is cropped, resized to a canonical 128x128 grayscale patch,
//! LBP-coded (8 neighbors, radius 1), and summarized as an 8x8 grid of
//! per-cell normalized 256-bin histograms. Matching is mean per-cell
//! chi-square distance scaled x100: identical patches score 0.0, fully
//! disjoint textures approach 200.0. Lower = stronger match.

use crate::types::FaceRegion;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// --- Named constants ---
const PATCH_SIZE: usize = 128;
const GRID_CELLS: usize = 8;
const CELL_SIZE: usize = PATCH_SIZE / GRID_CELLS;
const HIST_BINS: usize = 256;
const DISTANCE_SCALE: f32 = 100.0;

#[derive(Error, Debug)]
pub enum LbphError {
    #[error("face region is empty after clamping to the frame")]
    EmptyRegion,
    #[error("template grid mismatch: {0} vs {1} cells")]
    GridMismatch(usize, usize),
}

/// Trained representation of a face: concatenated per-cell LBP histograms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceTemplate {
    /// Grid side length (cells per axis) this template was built with.
    pub grid: u32,
    /// `grid * grid * 256` normalized histogram values.
    pub histograms: Vec<f32>,
}

/// Stateless LBPH coder: builds templates and scores them.
pub struct LbphCoder;

impl LbphCoder {
    /// Build a template from a face region within a grayscale frame.
    pub fn extract(
        &self,
        gray: &[u8],
        width: u32,
        height: u32,
        region: &FaceRegion,
    ) -> Result<FaceTemplate, LbphError> {
        let (crop, cw, ch) = crop_region(gray, width as usize, height as usize, region)
            .ok_or(LbphError::EmptyRegion)?;
        let patch = resize_bilinear(&crop, cw, ch, PATCH_SIZE, PATCH_SIZE);
        let codes = lbp_code(&patch, PATCH_SIZE);

        let cells = GRID_CELLS * GRID_CELLS;
        let mut histograms = vec![0f32; cells * HIST_BINS];
        let mut cell_counts = vec![0u32; cells];

        // Codes are only defined for interior pixels; the 1px border is skipped.
        for y in 1..PATCH_SIZE - 1 {
            let cell_row = y / CELL_SIZE;
            for x in 1..PATCH_SIZE - 1 {
                let cell = cell_row * GRID_CELLS + x / CELL_SIZE;
                let code = codes[y * PATCH_SIZE + x] as usize;
                histograms[cell * HIST_BINS + code] += 1.0;
                cell_counts[cell] += 1;
            }
        }

        // Normalize each cell histogram to sum 1 so border cells (fewer
        // coded pixels) weigh the same as interior cells.
        for (cell, &count) in cell_counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            let inv = 1.0 / count as f32;
            for bin in &mut histograms[cell * HIST_BINS..(cell + 1) * HIST_BINS] {
                *bin *= inv;
            }
        }

        Ok(FaceTemplate {
            grid: GRID_CELLS as u32,
            histograms,
        })
    }

    /// Chi-square distance between two templates, averaged per cell and
    /// scaled to the terminal's native confidence range.
    pub fn distance(&self, a: &FaceTemplate, b: &FaceTemplate) -> Result<f32, LbphError> {
        if a.grid != b.grid || a.histograms.len() != b.histograms.len() {
            return Err(LbphError::GridMismatch(
                a.histograms.len(),
                b.histograms.len(),
            ));
        }

        let mut chi = 0f32;
        for (&pa, &pb) in a.histograms.iter().zip(b.histograms.iter()) {
            let denom = pa + pb;
            if denom > 0.0 {
                let diff = pa - pb;
                chi += diff * diff / denom;
            }
        }

        let cells = (a.grid * a.grid) as f32;
        Ok(chi / cells * DISTANCE_SCALE)
    }
}

/// Crop a region out of a grayscale frame, clamped to the frame bounds.
/// Returns `None` if nothing remains after clamping.
fn crop_region(
    gray: &[u8],
    width: usize,
    height: usize,
    region: &FaceRegion,
) -> Option<(Vec<u8>, usize, usize)> {
    let x0 = region.x.max(0.0) as usize;
    let y0 = region.y.max(0.0) as usize;
    let x1 = ((region.x + region.width).max(0.0) as usize).min(width);
    let y1 = ((region.y + region.height).max(0.0) as usize).min(height);

    if x0 >= x1 || y0 >= y1 {
        return None;
    }

    let cw = x1 - x0;
    let ch = y1 - y0;
    let mut crop = Vec::with_capacity(cw * ch);
    for y in y0..y1 {
        crop.extend_from_slice(&gray[y * width + x0..y * width + x1]);
    }
    Some((crop, cw, ch))
}

/// Bilinear resize of a grayscale image.
fn resize_bilinear(src: &[u8], sw: usize, sh: usize, dw: usize, dh: usize) -> Vec<u8> {
    let mut dst = vec![0u8; dw * dh];
    let scale_x = sw as f32 / dw as f32;
    let scale_y = sh as f32 / dh as f32;

    for y in 0..dh {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, sh as i32 - 1) as usize;
        let y1 = (y0 + 1).min(sh - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..dw {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, sw as i32 - 1) as usize;
            let x1 = (x0 + 1).min(sw - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = src[y0 * sw + x0] as f32;
            let tr = src[y0 * sw + x1] as f32;
            let bl = src[y1 * sw + x0] as f32;
            let br = src[y1 * sw + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            dst[y * dw + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    dst
}

/// 8-neighbor, radius-1 LBP code image. Border pixels are left as 0 and
/// excluded from histograms by the caller.
fn lbp_code(patch: &[u8], size: usize) -> Vec<u8> {
    // Clockwise from top-left.
    const OFFSETS: [(i32, i32); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
        (-1, 0),
    ];

    let mut codes = vec![0u8; size * size];
    for y in 1..size - 1 {
        for x in 1..size - 1 {
            let center = patch[y * size + x];
            let mut code = 0u8;
            for (bit, &(dx, dy)) in OFFSETS.iter().enumerate() {
                let nx = (x as i32 + dx) as usize;
                let ny = (y as i32 + dy) as usize;
                if patch[ny * size + nx] >= center {
                    code |= 1 << bit;
                }
            }
            codes[y * size + x] = code;
        }
    }
    codes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(x: f32, y: f32, w: f32, h: f32) -> FaceRegion {
        FaceRegion {
            x,
            y,
            width: w,
            height: h,
            confidence: 1.0,
        }
    }

    fn checkerboard(width: usize, height: usize) -> Vec<u8> {
        (0..width * height)
            .map(|i| {
                let x = i % width;
                let y = i / width;
                if (x / 4 + y / 4) % 2 == 0 {
                    220
                } else {
                    30
                }
            })
            .collect()
    }

    #[test]
    fn test_self_distance_is_zero() {
        let frame = checkerboard(200, 200);
        let coder = LbphCoder;
        let a = coder.extract(&frame, 200, 200, &region(10.0, 10.0, 150.0, 150.0)).unwrap();
        let b = coder.extract(&frame, 200, 200, &region(10.0, 10.0, 150.0, 150.0)).unwrap();
        let d = coder.distance(&a, &b).unwrap();
        assert!(d.abs() < 1e-4, "self distance should be 0, got {d}");
    }

    #[test]
    fn test_distinct_textures_score_high() {
        let coder = LbphCoder;
        // Flat patch: every LBP code saturates to 255.
        let flat = vec![128u8; 200 * 200];
        // Horizontal ramp: strictly increasing rows produce one fixed
        // non-saturated code, fully disjoint from the flat histogram.
        let ramp: Vec<u8> = (0..200 * 200).map(|i| (i % 200).min(255) as u8).collect();

        let a = coder.extract(&flat, 200, 200, &region(0.0, 0.0, 200.0, 200.0)).unwrap();
        let b = coder.extract(&ramp, 200, 200, &region(0.0, 0.0, 200.0, 200.0)).unwrap();
        let d = coder.distance(&a, &b).unwrap();
        assert!(d > 70.0, "disjoint textures should exceed the auth threshold, got {d}");
    }

    #[test]
    fn test_grid_mismatch_rejected() {
        let coder = LbphCoder;
        let a = FaceTemplate {
            grid: 8,
            histograms: vec![0.0; 8 * 8 * 256],
        };
        let b = FaceTemplate {
            grid: 4,
            histograms: vec![0.0; 4 * 4 * 256],
        };
        assert!(coder.distance(&a, &b).is_err());
    }

    #[test]
    fn test_empty_region_rejected() {
        let frame = vec![0u8; 100 * 100];
        let coder = LbphCoder;
        // Entirely outside the frame.
        let r = region(500.0, 500.0, 50.0, 50.0);
        assert!(coder.extract(&frame, 100, 100, &r).is_err());
    }

    #[test]
    fn test_region_clamped_to_frame() {
        let frame = checkerboard(100, 100);
        let coder = LbphCoder;
        // Overhangs the right/bottom edge; should clamp, not panic.
        let r = region(60.0, 60.0, 100.0, 100.0);
        assert!(coder.extract(&frame, 100, 100, &r).is_ok());
    }

    #[test]
    fn test_crop_region_bounds() {
        let frame: Vec<u8> = (0..16).collect();
        let (crop, w, h) = crop_region(&frame, 4, 4, &region(1.0, 1.0, 2.0, 2.0)).unwrap();
        assert_eq!((w, h), (2, 2));
        assert_eq!(crop, vec![5, 6, 9, 10]);
    }

    #[test]
    fn test_resize_uniform_stays_uniform() {
        let src = vec![77u8; 10 * 10];
        let dst = resize_bilinear(&src, 10, 10, 32, 32);
        assert!(dst.iter().all(|&p| p == 77));
    }

    #[test]
    fn test_lbp_flat_patch_saturates() {
        let patch = vec![50u8; 16 * 16];
        let codes = lbp_code(&patch, 16);
        // All neighbors equal the center, so every interior code is 0xFF.
        assert!(codes
            .chunks(16)
            .skip(1)
            .take(14)
            .all(|row| row[1..15].iter().all(|&c| c == 0xFF)));
    }

    #[test]
    fn test_template_bincode_round_trip() {
        let frame = checkerboard(150, 150);
        let coder = LbphCoder;
        let t = coder.extract(&frame, 150, 150, &region(0.0, 0.0, 150.0, 150.0)).unwrap();
        let bytes = bincode::serialize(&t).unwrap();
        let back: FaceTemplate = bincode::deserialize(&bytes).unwrap();
        assert_eq!(back.grid, t.grid);
        let d = coder.distance(&t, &back).unwrap();
        assert!(d.abs() < 1e-6);
    }
}
