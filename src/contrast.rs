/// Contrast-limited adaptive histogram equalization (CLAHE)
///
/// The image is split into a grid of tiles. Each tile gets its own clipped
/// histogram and cumulative mapping; every pixel is then mapped by bilinear
/// interpolation between the four nearest tile mappings.
///
/// Not bit-identical to OpenCV's `createCLAHE`: the mapping is stretched from
/// the tile's lowest occupied bin (`(cdf - cdf_min) / (n - cdf_min)`), and the
/// last tile row and column absorb the remainder pixels instead of the image
/// being reflect-padded to a multiple of the grid.

use image::GrayImage;

/// Clip limit used for mammography (relative to a flat histogram)
pub const DEFAULT_CLIP_LIMIT: f32 = 2.0;

/// Tile grid used for mammography (columns, rows)
pub const DEFAULT_TILE_GRID: (u32, u32) = (8, 8);

/// CLAHE parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Clahe {
    pub clip_limit: f32,
    pub tiles_x: u32,
    pub tiles_y: u32,
}

impl Default for Clahe {
    fn default() -> Self {
        Self {
            clip_limit: DEFAULT_CLIP_LIMIT,
            tiles_x: DEFAULT_TILE_GRID.0,
            tiles_y: DEFAULT_TILE_GRID.1,
        }
    }
}

impl Clahe {
    pub fn new(clip_limit: f32, tiles_x: u32, tiles_y: u32) -> Self {
        Self {
            clip_limit,
            tiles_x,
            tiles_y,
        }
    }

    /// Equalize an 8-bit image
    ///
    /// Images smaller than one pixel per tile are returned unchanged.
    pub fn apply(&self, img: &GrayImage) -> GrayImage {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let (tiles_x, tiles_y) = (self.tiles_x as usize, self.tiles_y as usize);
        if w == 0 || h == 0 || tiles_x == 0 || tiles_y == 0 {
            return img.clone();
        }
        let tile_w = w / tiles_x;
        let tile_h = h / tiles_y;
        if tile_w == 0 || tile_h == 0 {
            return img.clone();
        }

        let grey = img.as_raw();
        let maps = self.tile_maps(grey, w, h, tile_w, tile_h);

        let mut out = vec![0u8; w * h];
        let tw = tile_w as f32;
        let th = tile_h as f32;
        let last_x = tiles_x as i32 - 1;
        let last_y = tiles_y as i32 - 1;

        for y in 0..h {
            let fy = (y as f32 + 0.5) / th - 0.5;
            let ty0 = (fy.floor() as i32).clamp(0, last_y) as usize;
            let ty1 = (fy.floor() as i32 + 1).clamp(0, last_y) as usize;
            let ay = fy - fy.floor();

            for x in 0..w {
                let fx = (x as f32 + 0.5) / tw - 0.5;
                let tx0 = (fx.floor() as i32).clamp(0, last_x) as usize;
                let tx1 = (fx.floor() as i32 + 1).clamp(0, last_x) as usize;
                let ax = fx - fx.floor();

                let pixel = grey[y * w + x] as usize;
                let v00 = maps[ty0 * tiles_x + tx0][pixel] as f32;
                let v10 = maps[ty0 * tiles_x + tx1][pixel] as f32;
                let v01 = maps[ty1 * tiles_x + tx0][pixel] as f32;
                let v11 = maps[ty1 * tiles_x + tx1][pixel] as f32;

                let top = v00 * (1.0 - ax) + v10 * ax;
                let bottom = v01 * (1.0 - ax) + v11 * ax;
                let value = top * (1.0 - ay) + bottom * ay;

                out[y * w + x] = value.round().clamp(0.0, 255.0) as u8;
            }
        }

        // Dimensions are unchanged, so the buffer always fits
        GrayImage::from_raw(img.width(), img.height(), out).unwrap_or_else(|| img.clone())
    }

    /// Clipped-histogram CDF lookup table for every tile
    fn tile_maps(&self, grey: &[u8], w: usize, h: usize, tile_w: usize, tile_h: usize) -> Vec<[u8; 256]> {
        let (tiles_x, tiles_y) = (self.tiles_x as usize, self.tiles_y as usize);
        let mut maps = vec![[0u8; 256]; tiles_x * tiles_y];

        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let x0 = tx * tile_w;
                let y0 = ty * tile_h;
                // The last row/column of tiles absorbs the remainder
                let x1 = if tx == tiles_x - 1 { w } else { x0 + tile_w };
                let y1 = if ty == tiles_y - 1 { h } else { y0 + tile_h };
                let tile_pixels = (x1 - x0) * (y1 - y0);

                let mut hist = [0u32; 256];
                for row in y0..y1 {
                    for &v in &grey[row * w + x0..row * w + x1] {
                        hist[v as usize] += 1;
                    }
                }

                // Clip and redistribute the excess evenly
                let clip = ((self.clip_limit * tile_pixels as f32 / 256.0) as u32).max(1);
                let mut excess = 0u32;
                for bin in hist.iter_mut() {
                    if *bin > clip {
                        excess += *bin - clip;
                        *bin = clip;
                    }
                }
                let per_bin = excess / 256;
                let remainder = (excess % 256) as usize;
                for (i, bin) in hist.iter_mut().enumerate() {
                    *bin += per_bin;
                    if i < remainder {
                        *bin += 1;
                    }
                }

                let mut cdf = [0u32; 256];
                cdf[0] = hist[0];
                for i in 1..256 {
                    cdf[i] = cdf[i - 1] + hist[i];
                }
                let cdf_min = cdf.iter().copied().find(|&v| v > 0).unwrap_or(0);
                let denom = cdf[255].saturating_sub(cdf_min);

                let map = &mut maps[ty * tiles_x + tx];
                for (i, slot) in map.iter_mut().enumerate() {
                    *slot = if denom == 0 {
                        i as u8
                    } else {
                        let v = (cdf[i].saturating_sub(cdf_min) as f32 / denom as f32) * 255.0;
                        (v as u32).min(255) as u8
                    };
                }
            }
        }

        maps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clahe_preserves_dimensions() {
        let img = GrayImage::from_pixel(80, 60, image::Luma([128]));
        let out = Clahe::default().apply(&img);
        assert_eq!(out.dimensions(), (80, 60));
    }

    #[test]
    fn test_clahe_uniform_image_stays_uniform() {
        let img = GrayImage::from_pixel(64, 64, image::Luma([128]));
        let out = Clahe::default().apply(&img);
        let first = out.get_pixel(0, 0)[0];
        assert!(out.pixels().all(|p| p[0] == first));
    }

    #[test]
    fn test_clahe_keeps_all_zero_image_black() {
        let img = GrayImage::new(64, 64);
        let out = Clahe::default().apply(&img);
        assert!(out.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn test_clahe_tiny_image_returned_unchanged() {
        let img = GrayImage::from_fn(4, 4, |x, y| image::Luma([(x * 16 + y) as u8]));
        assert_eq!(Clahe::default().apply(&img), img);
    }

    #[test]
    fn test_clahe_keeps_dark_side_darker() {
        let img = GrayImage::from_fn(64, 64, |x, _| image::Luma([if x < 32 { 50 } else { 200 }]));
        let out = Clahe::default().apply(&img);
        assert!(out.get_pixel(0, 0)[0] < out.get_pixel(63, 0)[0]);
        assert!(out.get_pixel(0, 63)[0] < out.get_pixel(63, 63)[0]);
    }
}
