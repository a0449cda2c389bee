use image::GrayImage;
use imageproc::filter::gaussian_blur_f32;

/// Levels whose shorter side would drop below this are not built.
pub const MIN_LEVEL_SIZE: u32 = 16;

/// One resolution of a [`ScalePyramid`].
pub struct PyramidLevel {
    pub image: GrayImage,
    /// Nominal downscale relative to level 0.
    pub scale: f32,
    /// Exact per-axis ratio between level 0 and this level after rounding.
    pub scale_x: f32,
    pub scale_y: f32,
}

impl PyramidLevel {
    /// Maps a pixel coordinate of this level onto level 0.
    /// Pixel centres sit at integer coordinates on every level.
    pub fn to_base(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x + 0.5) * self.scale_x - 0.5,
            (y + 0.5) * self.scale_y - 0.5,
        )
    }
}

/// Image pyramid where every level is derived directly from the input
/// (anti-alias blur sized for the level's scale, then bilinear resampling),
/// so rounding errors do not accumulate down the levels.
pub struct ScalePyramid {
    pub levels: Vec<PyramidLevel>,
}

impl ScalePyramid {
    pub fn build(image: &GrayImage, n_levels: usize, scale_factor: f32) -> Self {
        let (width, height) = image.dimensions();
        let mut levels = Vec::with_capacity(n_levels);

        levels.push(PyramidLevel {
            image: image.clone(),
            scale: 1.0,
            scale_x: 1.0,
            scale_y: 1.0,
        });

        for octave in 1..n_levels {
            let scale = scale_factor.powi(octave as i32);
            let level_width = (width as f32 / scale).round() as u32;
            let level_height = (height as f32 / scale).round() as u32;
            if level_width.min(level_height) < MIN_LEVEL_SIZE {
                break;
            }

            // blur strength that turns the pixel footprint of level 0 into that of the new level
            let sigma = 0.5 * (scale * scale - 1.0).sqrt();
            if !(sigma > 0.0) {
                break;
            }
            let blurred = gaussian_blur_f32(image, sigma);

            let scale_x = width as f32 / level_width as f32;
            let scale_y = height as f32 / level_height as f32;
            let resampled = GrayImage::from_fn(level_width, level_height, |x, y| {
                let sx = ((x as f32 + 0.5) * scale_x - 0.5).clamp(0.0, (width - 1) as f32);
                let sy = ((y as f32 + 0.5) * scale_y - 0.5).clamp(0.0, (height - 1) as f32);
                image::Luma([quantize(bilinear_clamped(&blurred, sx, sy))])
            });

            levels.push(PyramidLevel {
                image: resampled,
                scale,
                scale_x,
                scale_y,
            });
        }

        Self { levels }
    }
}

pub(crate) fn quantize(value: f32) -> u8 {
    (value + 0.5).clamp(0.0, 255.0) as u8
}

/// Bilinear lookup where everything outside the image reads as black.
pub fn bilinear_zero(image: &GrayImage, x: f32, y: f32) -> f32 {
    let (width, height) = (image.width() as i64, image.height() as i64);
    let x0 = x.floor();
    let y0 = y.floor();
    let (fx, fy) = (x - x0, y - y0);
    let (x0, y0) = (x0 as i64, y0 as i64);

    let pixel = |px: i64, py: i64| -> f32 {
        if px >= 0 && py >= 0 && px < width && py < height {
            image.get_pixel(px as u32, py as u32).0[0] as f32
        } else {
            0.0
        }
    };

    let top = pixel(x0, y0) * (1.0 - fx) + pixel(x0 + 1, y0) * fx;
    let bottom = pixel(x0, y0 + 1) * (1.0 - fx) + pixel(x0 + 1, y0 + 1) * fx;
    top * (1.0 - fy) + bottom * fy
}

/// Bilinear lookup replicating the border pixels.
pub fn bilinear_clamped(image: &GrayImage, x: f32, y: f32) -> f32 {
    let max_x = image.width().saturating_sub(1);
    let max_y = image.height().saturating_sub(1);
    let x = x.clamp(0.0, max_x as f32);
    let y = y.clamp(0.0, max_y as f32);
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(max_x), (y0 + 1).min(max_y));
    let (fx, fy) = (x - x0 as f32, y - y0 as f32);

    let pixel = |px: u32, py: u32| image.get_pixel(px, py).0[0] as f32;
    let top = pixel(x0, y0) * (1.0 - fx) + pixel(x1, y0) * fx;
    let bottom = pixel(x0, y1) * (1.0 - fx) + pixel(x1, y1) * fx;
    top * (1.0 - fy) + bottom * fy
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn half_resolution_level_for_sqrt2_factor() {
        let image = GrayImage::from_pixel(200, 120, image::Luma([90]));
        let pyramid = ScalePyramid::build(&image, 4, std::f32::consts::SQRT_2);

        assert_eq!(pyramid.levels.len(), 4);
        let half = &pyramid.levels[2];
        assert_eq!(half.image.dimensions(), (100, 60));
        assert_eq!(half.scale_x, 2.0);
        // uniform input stays uniform up to blur rounding
        assert!(half.image.pixels().all(|p| (88..=90).contains(&p.0[0])));
        assert_eq!(half.to_base(0.0, 0.0), (0.5, 0.5));
    }

    #[test]
    fn stops_before_levels_get_too_small() {
        let image = GrayImage::new(40, 40);
        let pyramid = ScalePyramid::build(&image, 8, 2.0);
        // 40 -> 20 -> 10 (too small)
        assert_eq!(pyramid.levels.len(), 2);
    }

    #[test]
    fn non_shrinking_factor_keeps_only_the_input() {
        let image = GrayImage::from_pixel(64, 64, image::Luma([10]));
        assert_eq!(ScalePyramid::build(&image, 4, 1.0).levels.len(), 1);
        assert_eq!(ScalePyramid::build(&image, 4, 0.8).levels.len(), 1);
    }

    #[test]
    fn bilinear_zero_fades_to_black_outside() {
        let image = GrayImage::from_pixel(4, 4, image::Luma([200]));
        assert_eq!(bilinear_zero(&image, 1.0, 1.0), 200.0);
        assert_eq!(bilinear_zero(&image, 3.5, 1.0), 100.0);
        assert_eq!(bilinear_zero(&image, -2.0, 1.0), 0.0);
        assert_eq!(bilinear_clamped(&image, 3.5, 1.0), 200.0);
    }
}
