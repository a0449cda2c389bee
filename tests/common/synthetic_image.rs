use image::GrayImage;

const SUPERSAMPLING: u32 = 4;

/// Renders a continuous intensity function, averaging a 4x4 grid of samples
/// per pixel. Pixel `(x, y)` covers `[x, x + 1) x [y, y + 1)`.
pub fn render(width: u32, height: u32, intensity: impl Fn(f64, f64) -> f64) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let mut sum = 0.0;
        for j in 0..SUPERSAMPLING {
            for i in 0..SUPERSAMPLING {
                let sx = x as f64 + (i as f64 + 0.5) / SUPERSAMPLING as f64;
                let sy = y as f64 + (j as f64 + 0.5) / SUPERSAMPLING as f64;
                sum += intensity(sx, sy);
            }
        }
        let mean = sum / (SUPERSAMPLING * SUPERSAMPLING) as f64;
        image::Luma([mean.round().clamp(0.0, 255.0) as u8])
    })
}

/// Board of `cols x rows` square cells, top left cell white, black elsewhere.
pub fn board_intensity(x: f64, y: f64, cell: f64, cols: i64, rows: i64, origin: (f64, f64)) -> f64 {
    let cx = ((x - origin.0) / cell).floor() as i64;
    let cy = ((y - origin.1) / cell).floor() as i64;
    if cx < 0 || cy < 0 || cx >= cols || cy >= rows {
        return 0.0;
    }
    if (cx + cy) % 2 == 0 {
        255.0
    } else {
        0.0
    }
}

/// Periodic `count x count` board of `cell` px cells starting at the origin.
pub fn square_board(cell: f64, count: i64) -> impl Fn(f64, f64) -> f64 + Copy {
    move |x, y| board_intensity(x, y, cell, count, count, (0.0, 0.0))
}

/// 200x200 reference: a 5x4 board of 40 px cells spanning the full width,
/// with black margins above and below.
///
/// An odd by even board has no rotational symmetry, so every junction has a
/// unique context and a rotated view has a single consistent interpretation.
pub fn checkerboard_reference() -> GrayImage {
    render(200, 200, reference_intensity)
}

pub fn reference_intensity(x: f64, y: f64) -> f64 {
    board_intensity(x, y, 40.0, 5, 4, (0.0, 20.0))
}

/// View of the reference scaled by `scale` and rotated clockwise on screen by
/// `angle`, centred on a black canvas of the same size.
pub fn similarity_view(
    reference: impl Fn(f64, f64) -> f64,
    size: u32,
    scale: f64,
    angle: f64,
) -> GrayImage {
    let (sin, cos) = angle.sin_cos();
    let centre = size as f64 / 2.0;
    render(size, size, |u, v| {
        let dx = (u - centre) / scale;
        let dy = (v - centre) / scale;
        let x = cos * dx + sin * dy + centre;
        let y = -sin * dx + cos * dy + centre;
        if x >= 0.0 && y >= 0.0 && x < size as f64 && y < size as f64 {
            reference(x, y)
        } else {
            0.0
        }
    })
}

/// Overlapping rectangles of random gray levels, a generic textured scene.
pub fn patchwork(width: u32, height: u32, seed: u64) -> GrayImage {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(seed);
    let mut image = GrayImage::from_pixel(width, height, image::Luma([128]));
    for _ in 0..(width * height / 1000) {
        let (x0, y0) = (rng.gen_range(0..width), rng.gen_range(0..height));
        let (w, h) = (rng.gen_range(8..48u32), rng.gen_range(8..48u32));
        let value = rng.gen::<u8>();
        for y in y0..(y0 + h).min(height) {
            for x in x0..(x0 + w).min(width) {
                image.put_pixel(x, y, image::Luma([value]));
            }
        }
    }
    image
}

/// Grayscale frame buffer where every pixel carries the same value.
pub fn uniform_buffer(width: u32, height: u32, value: u8) -> Vec<u8> {
    vec![value; (width * height) as usize]
}
