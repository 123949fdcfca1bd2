/// Canvas fitting: aspect-preserving resize followed by centered black padding
///
/// The output is always exactly the target size. Nothing is cropped.

use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::config::TargetSize;

/// Padding added around the resized content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Padding {
    pub top: u32,
    pub bottom: u32,
    pub left: u32,
    pub right: u32,
}

impl Padding {
    /// Split the free space, odd remainder on the trailing side
    pub fn centered(target: TargetSize, content_width: u32, content_height: u32) -> Self {
        let free_y = target.height - content_height;
        let free_x = target.width - content_width;
        let top = free_y / 2;
        let left = free_x / 2;
        Self {
            top,
            bottom: free_y - top,
            left,
            right: free_x - left,
        }
    }
}

/// A fixed-size canvas with the resized image centered on it
#[derive(Debug, Clone, PartialEq)]
pub struct FittedImage {
    pub image: GrayImage,
    pub content_width: u32,
    pub content_height: u32,
    pub padding: Padding,
}

/// Resizes and pads images to a fixed target canvas
#[derive(Debug, Clone, Copy)]
pub struct CanvasFitter {
    target: TargetSize,
}

impl CanvasFitter {
    pub fn new(target: TargetSize) -> Self {
        Self { target }
    }

    /// Size of the resized content before padding, as (width, height)
    ///
    /// Portrait sources fill the canvas height, others fill the width. If the
    /// chosen edge would overflow the other axis of a non-square canvas, the
    /// other edge is filled instead.
    pub fn content_size(&self, src_width: u32, src_height: u32) -> (u32, u32) {
        let (target_h, target_w) = (self.target.height, self.target.width);
        let aspect = src_height as f64 / src_width as f64;

        let fill_height = || (target_h, (target_h as f64 / aspect).round() as u32);
        let fill_width = || ((target_w as f64 * aspect).round() as u32, target_w);

        let (mut new_h, mut new_w) = if aspect > 1.0 { fill_height() } else { fill_width() };
        if new_w > target_w {
            (new_h, new_w) = fill_width();
        } else if new_h > target_h {
            (new_h, new_w) = fill_height();
        }

        (new_w.clamp(1, target_w), new_h.clamp(1, target_h))
    }

    /// Fit an image onto the target canvas
    pub fn fit(&self, img: &GrayImage) -> FittedImage {
        let (content_width, content_height) = self.content_size(img.width().max(1), img.height().max(1));

        let resized = if img.dimensions() == (content_width, content_height) {
            img.clone()
        } else {
            // Bilinear, deterministic for identical input
            imageops::resize(img, content_width, content_height, FilterType::Triangle)
        };

        let padding = Padding::centered(self.target, content_width, content_height);
        let mut canvas = GrayImage::new(self.target.width, self.target.height);
        imageops::replace(&mut canvas, &resized, padding.left as i64, padding.top as i64);

        FittedImage {
            image: canvas,
            content_width,
            content_height,
            padding,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white(width: u32, height: u32) -> GrayImage {
        GrayImage::from_pixel(width, height, image::Luma([255]))
    }

    #[test]
    fn test_portrait_fills_height() {
        let fitter = CanvasFitter::new(TargetSize::new(512, 512));
        let fitted = fitter.fit(&white(300, 600));
        assert_eq!(fitted.image.dimensions(), (512, 512));
        assert_eq!((fitted.content_width, fitted.content_height), (256, 512));
        assert_eq!(fitted.padding, Padding { top: 0, bottom: 0, left: 128, right: 128 });
    }

    #[test]
    fn test_landscape_fills_width() {
        let fitter = CanvasFitter::new(TargetSize::new(512, 512));
        let fitted = fitter.fit(&white(800, 400));
        assert_eq!((fitted.content_width, fitted.content_height), (512, 256));
        assert_eq!(fitted.padding.top, 128);
        assert_eq!(fitted.padding.bottom, 128);
    }

    #[test]
    fn test_odd_remainder_goes_to_bottom_right() {
        let fitter = CanvasFitter::new(TargetSize::new(100, 100));
        // aspect 3/2 -> content 67x100, 33 columns free
        let fitted = fitter.fit(&white(200, 300));
        assert_eq!(fitted.content_width, 67);
        assert_eq!(fitted.padding.left, 16);
        assert_eq!(fitted.padding.right, 17);
    }

    #[test]
    fn test_degenerate_strips_keep_exact_size() {
        let fitter = CanvasFitter::new(TargetSize::new(64, 64));
        for (w, h) in [(1, 1000), (1000, 1), (1, 1), (3, 7)] {
            let fitted = fitter.fit(&white(w, h));
            assert_eq!(fitted.image.dimensions(), (64, 64), "source {}x{}", w, h);
            assert!(fitted.content_width >= 1 && fitted.content_height >= 1);
        }
    }

    #[test]
    fn test_non_square_canvas_never_overflows() {
        let fitter = CanvasFitter::new(TargetSize::new(512, 256));
        for (w, h) in [(100, 120), (120, 100), (50, 400), (400, 50)] {
            let fitted = fitter.fit(&white(w, h));
            assert_eq!(fitted.image.dimensions(), (256, 512));
            assert!(fitted.content_width <= 256 && fitted.content_height <= 512);
        }
    }

    #[test]
    fn test_padding_is_black_and_content_kept() {
        let fitter = CanvasFitter::new(TargetSize::new(64, 64));
        let fitted = fitter.fit(&white(32, 64));
        assert_eq!(fitted.image.get_pixel(0, 32)[0], 0);
        assert_eq!(fitted.image.get_pixel(63, 32)[0], 0);
        assert_eq!(fitted.image.get_pixel(32, 32)[0], 255);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let img = GrayImage::from_fn(123, 77, |x, y| image::Luma([((x * 7 + y * 3) % 256) as u8]));
        let fitter = CanvasFitter::new(TargetSize::new(96, 96));
        assert_eq!(fitter.fit(&img), fitter.fit(&img));
    }
}
