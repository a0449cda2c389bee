//! Harris corners with FAST candidates as an option, plus the intensity
//! centroid used to orient them.

use image::{GrayImage, ImageBuffer, Luma};
use imageproc::corners::corners_fast9;
use imageproc::filter::gaussian_blur_f32;
use imageproc::gradients::{horizontal_sobel, vertical_sobel};

use crate::config::DetectorKind;

/// Responses at or below this are treated as flat regardless of the quality level.
pub const MIN_RESPONSE: f32 = 1e-3;

/// Sigma of the structure tensor window.
const WINDOW_SIGMA: f32 = 1.0;

/// A detected corner in level pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corner {
    pub x: f32,
    pub y: f32,
    pub response: f32,
}

#[derive(Debug, Clone, Copy)]
pub struct CornerParams {
    pub detector: DetectorKind,
    pub harris_k: f32,
    pub quality_level: f32,
    pub fast_threshold: u8,
    /// Pixels closer than this to the image edge are never reported.
    pub border: u32,
    pub max_corners: usize,
}

/// One `f32` value per pixel.
pub type ResponseMap = ImageBuffer<Luma<f32>, Vec<f32>>;

#[inline]
fn at(response: &ResponseMap, x: u32, y: u32) -> f32 {
    response.get_pixel(x, y).0[0]
}

/// Harris measure `det(M) - k * trace(M)^2` of the Gaussian weighted structure tensor.
pub fn harris_response(image: &GrayImage, k: f32) -> ResponseMap {
    let (width, height) = image.dimensions();
    let gx = horizontal_sobel(image);
    let gy = vertical_sobel(image);

    let mut ixx = ResponseMap::new(width, height);
    let mut iyy = ResponseMap::new(width, height);
    let mut ixy = ResponseMap::new(width, height);
    for (x, y, dx) in gx.enumerate_pixels() {
        // normalise the Sobel weights so responses are in intensity units
        let dx = dx.0[0] as f32 / 8.0;
        let dy = gy.get_pixel(x, y).0[0] as f32 / 8.0;
        ixx.put_pixel(x, y, Luma([dx * dx]));
        iyy.put_pixel(x, y, Luma([dy * dy]));
        ixy.put_pixel(x, y, Luma([dx * dy]));
    }

    let sxx = gaussian_blur_f32(&ixx, WINDOW_SIGMA);
    let syy = gaussian_blur_f32(&iyy, WINDOW_SIGMA);
    let sxy = gaussian_blur_f32(&ixy, WINDOW_SIGMA);

    ResponseMap::from_fn(width, height, |x, y| {
        let (a, b, c) = (at(&sxx, x, y), at(&syy, x, y), at(&sxy, x, y));
        let trace = a + b;
        Luma([a * b - c * c - k * trace * trace])
    })
}

/// Detects corners as strict local maxima of the Harris response above the
/// quality threshold, refined to sub-pixel precision and sorted strongest first.
pub fn detect_corners(image: &GrayImage, params: &CornerParams) -> Vec<Corner> {
    let (width, height) = image.dimensions();
    let border = params.border.max(1);
    if width <= 2 * border || height <= 2 * border || params.max_corners == 0 {
        return Vec::new();
    }

    let response = harris_response(image, params.harris_k);
    let strongest = response.pixels().map(|p| p.0[0]).fold(f32::MIN, f32::max);
    if strongest <= MIN_RESPONSE {
        return Vec::new();
    }
    let threshold = (params.quality_level * strongest).max(MIN_RESPONSE);

    let candidates: Vec<(u32, u32)> = match params.detector {
        DetectorKind::Harris => (border..height - border)
            .flat_map(|y| (border..width - border).map(move |x| (x, y)))
            .collect(),
        DetectorKind::Fast => {
            let mut fast: Vec<(u32, u32)> = corners_fast9(image, params.fast_threshold)
                .into_iter()
                .map(|c| (c.x, c.y))
                .filter(|&(x, y)| {
                    x >= border && y >= border && x < width - border && y < height - border
                })
                .collect();
            fast.sort_by_key(|&(x, y)| (y, x));
            fast
        }
    };

    let mut corners: Vec<(Corner, u32, u32)> = candidates
        .into_iter()
        .filter_map(|(x, y)| {
            let r = at(&response, x, y);
            if r <= threshold || !is_local_maximum(&response, x, y) {
                return None;
            }
            let (ox, oy) = subpixel_offset(&response, x, y);
            Some((
                Corner {
                    x: x as f32 + ox,
                    y: y as f32 + oy,
                    response: r,
                },
                x,
                y,
            ))
        })
        .collect();

    corners.sort_by(|(a, ax, ay), (b, bx, by)| {
        b.response
            .total_cmp(&a.response)
            .then(ay.cmp(by))
            .then(ax.cmp(bx))
    });
    corners.truncate(params.max_corners);
    corners.into_iter().map(|(corner, _, _)| corner).collect()
}

/// Plateaus keep only their first pixel in raster order.
fn is_local_maximum(response: &ResponseMap, x: u32, y: u32) -> bool {
    let r = at(response, x, y);
    for dy in -1i32..=1 {
        for dx in -1i32..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let neighbour = at(response, (x as i32 + dx) as u32, (y as i32 + dy) as u32);
            let earlier = dy < 0 || (dy == 0 && dx < 0);
            if neighbour > r || (neighbour == r && earlier) {
                return false;
            }
        }
    }
    true
}

/// Vertex of the parabola through the response and its two neighbours, per axis.
fn subpixel_offset(response: &ResponseMap, x: u32, y: u32) -> (f32, f32) {
    let centre = at(response, x, y);
    let offset = |before: f32, after: f32| {
        let curvature = before - 2.0 * centre + after;
        if curvature.abs() > 1e-12 {
            (0.5 * (before - after) / curvature).clamp(-0.5, 0.5)
        } else {
            0.0
        }
    };
    (
        offset(at(response, x - 1, y), at(response, x + 1, y)),
        offset(at(response, x, y - 1), at(response, x, y + 1)),
    )
}

/// Integer offsets inside a disc, precomputed once per radius.
pub struct Disc {
    offsets: Vec<(i32, i32)>,
}

impl Disc {
    pub fn new(radius: f32) -> Self {
        let r = radius.floor() as i32;
        let limit = radius * radius;
        let offsets = (-r..=r)
            .flat_map(|dy| (-r..=r).map(move |dx| (dx, dy)))
            .filter(|&(dx, dy)| (dx * dx + dy * dy) as f32 <= limit)
            .collect();
        Self { offsets }
    }
}

/// Orientation of the patch as the angle from its centre to the intensity centroid.
pub fn intensity_centroid_angle(image: &GrayImage, x: f32, y: f32, disc: &Disc) -> f32 {
    let (cx, cy) = (x.round() as i64, y.round() as i64);
    let (width, height) = (image.width() as i64, image.height() as i64);

    let (mut m10, mut m01) = (0.0f64, 0.0f64);
    for &(dx, dy) in &disc.offsets {
        let (px, py) = (cx + dx as i64, cy + dy as i64);
        if px < 0 || py < 0 || px >= width || py >= height {
            continue;
        }
        let value = image.get_pixel(px as u32, py as u32).0[0] as f64;
        m10 += dx as f64 * value;
        m01 += dy as f64 * value;
    }

    m01.atan2(m10) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_image() -> GrayImage {
        GrayImage::from_fn(64, 64, |x, y| {
            if (20..44).contains(&x) && (20..44).contains(&y) {
                image::Luma([220])
            } else {
                image::Luma([30])
            }
        })
    }

    fn params(detector: DetectorKind) -> CornerParams {
        CornerParams {
            detector,
            harris_k: 0.04,
            quality_level: 0.01,
            fast_threshold: 20,
            border: 3,
            max_corners: 100,
        }
    }

    fn near_square_corner(corner: &Corner) -> bool {
        [19.5f32, 43.5].iter().any(|&cx| (corner.x - cx).abs() < 2.0)
            && [19.5f32, 43.5].iter().any(|&cy| (corner.y - cy).abs() < 2.0)
    }

    #[test]
    fn flat_image_has_no_corners() {
        let image = GrayImage::from_pixel(64, 64, image::Luma([128]));
        assert!(detect_corners(&image, &params(DetectorKind::Harris)).is_empty());
        assert!(detect_corners(&image, &params(DetectorKind::Fast)).is_empty());
    }

    #[test]
    fn harris_response_separates_corners_edges_and_flat_areas() {
        let response = harris_response(&square_image(), 0.04);

        assert_eq!(response.dimensions(), (64, 64));
        assert!(at(&response, 20, 20) > 0.0);
        assert!(at(&response, 32, 20) < 0.0);
        assert_eq!(at(&response, 5, 5), 0.0);
    }

    #[test]
    fn harris_finds_the_four_square_corners() {
        let corners = detect_corners(&square_image(), &params(DetectorKind::Harris));

        assert_eq!(corners.len(), 4, "{corners:?}");
        assert!(corners.iter().all(near_square_corner), "{corners:?}");
        assert!(corners.windows(2).all(|w| w[0].response >= w[1].response));
    }

    #[test]
    fn fast_candidates_land_on_the_square_corners() {
        let corners = detect_corners(&square_image(), &params(DetectorKind::Fast));

        assert!(!corners.is_empty());
        assert!(corners.len() <= 4, "{corners:?}");
        assert!(corners.iter().all(near_square_corner), "{corners:?}");
    }

    #[test]
    fn centroid_points_towards_the_bright_side() {
        // bright right half
        let image = GrayImage::from_fn(41, 41, |x, _| image::Luma([if x > 20 { 255 } else { 0 }]));
        let angle = intensity_centroid_angle(&image, 20.0, 20.0, &Disc::new(10.0));
        assert!(angle.abs() < 1e-3, "{angle}");

        // bright bottom half, y grows downwards
        let image = GrayImage::from_fn(41, 41, |_, y| image::Luma([if y > 20 { 255 } else { 0 }]));
        let angle = intensity_centroid_angle(&image, 20.0, 20.0, &Disc::new(10.0));
        assert!((angle - std::f32::consts::FRAC_PI_2).abs() < 1e-3, "{angle}");
    }
}
