use image::GrayImage;
use once_cell::sync::Lazy;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Distribution, UnitDisc};

use super::pyramid::bilinear_zero;

pub type BinaryDescriptor<const N: usize> = [u8; N];

/// Number of intensity tests per descriptor.
pub const DESCRIPTOR_BITS: usize = 256;
pub const DESCRIPTOR_SIZE: usize = DESCRIPTOR_BITS / u8::BITS as usize;

pub type Descriptor = BinaryDescriptor<DESCRIPTOR_SIZE>;

/// Compute a steered BRIEF (Binary Robust Independent Elementary Features) descriptor.
///
/// The test pattern is rotated by `angle` around `(x, y)` and scaled to `radius`,
/// then sampled bilinearly on a smoothed image. Samples falling outside the
/// image read as 0, so patches near the border stay well defined.
pub fn compute_descriptor(image: &GrayImage, x: f32, y: f32, angle: f32, radius: f32) -> Descriptor {
    let (sin, cos) = angle.sin_cos();
    let steer = |px: f32, py: f32| {
        (
            x + radius * (cos * px - sin * py),
            y + radius * (sin * px + cos * py),
        )
    };

    let mut descriptor = [0; DESCRIPTOR_SIZE];
    for (bit, [p1x, p1y, p2x, p2y]) in BRIEF_PATTERN.iter().enumerate() {
        let (x1, y1) = steer(*p1x, *p1y);
        let (x2, y2) = steer(*p2x, *p2y);

        if bilinear_zero(image, x1, y1) < bilinear_zero(image, x2, y2) {
            descriptor[bit / u8::BITS as usize] |= 1 << (bit % u8::BITS as usize);
        }
    }

    descriptor
}

/// Test point pairs in the unit disc.
/// The values remain consistent accross frames and processes, because every
/// descriptor has to be comparable with the ones computed on the reference.
static BRIEF_PATTERN: Lazy<[[f32; 4]; DESCRIPTOR_BITS]> = Lazy::new(|| {
    // use reproducible random numbers
    let mut rng = StdRng::seed_from_u64(42);

    // uniform over the whole disc so that every test spans a large part of the patch;
    // locally repetitive targets need the wide context to tell their corners apart
    let mut samples = [[0.0; 4]; DESCRIPTOR_BITS];
    for sample in samples.iter_mut() {
        let [ax, ay]: [f64; 2] = UnitDisc.sample(&mut rng);
        let [bx, by]: [f64; 2] = UnitDisc.sample(&mut rng);
        *sample = [ax as f32, ay as f32, bx as f32, by as f32];
    }

    samples
});
