use nalgebra::{DMatrix, Matrix3, Point2, Vector3};
use sample_consensus::{Estimator, Model};

/// A matched point in the reference image and its position in the live frame, in pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointPair {
    pub reference: Point2<f64>,
    pub live: Point2<f64>,
}

impl PointPair {
    pub fn new(reference: Point2<f64>, live: Point2<f64>) -> Self {
        Self { reference, live }
    }
}

/// Plane induced mapping `live ~ H * reference`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography(pub Matrix3<f64>);

impl Homography {
    /// Maps a reference point into the live frame. `None` for points sent to infinity.
    pub fn transfer(&self, point: &Point2<f64>) -> Option<Point2<f64>> {
        let mapped = self.0 * Vector3::new(point.x, point.y, 1.0);
        if mapped.z.abs() < 1e-12 {
            return None;
        }
        Some(Point2::new(mapped.x / mapped.z, mapped.y / mapped.z))
    }
}

impl Model<PointPair> for Homography {
    /// Forward transfer error in live pixels.
    fn residual(&self, data: &PointPair) -> f64 {
        match self.transfer(&data.reference) {
            Some(mapped) => (mapped - data.live).norm(),
            None => f64::INFINITY,
        }
    }
}

/// Direct linear transform over 4 or more point pairs.
#[derive(Debug, Clone, Copy, Default)]
pub struct HomographyEstimator;

impl Estimator<PointPair> for HomographyEstimator {
    const MIN_SAMPLES: usize = 4;
    type Model = Homography;
    type ModelIter = Option<Homography>;

    fn estimate<I>(&self, data: I) -> Self::ModelIter
    where
        I: Iterator<Item = PointPair> + Clone,
    {
        fit_homography(&data.collect::<Vec<_>>())
    }
}

/// Hartley normalisation: centroid to the origin, mean distance `sqrt(2)`.
fn normalizing_transform<'a>(points: impl Iterator<Item = &'a Point2<f64>> + Clone) -> Option<Matrix3<f64>> {
    let n = points.clone().count() as f64;
    let (sx, sy) = points.clone().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let (cx, cy) = (sx / n, sy / n);
    let mean_distance = points
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean_distance < 1e-12 {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_distance;
    Some(Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}

fn apply(transform: &Matrix3<f64>, point: &Point2<f64>) -> Point2<f64> {
    let p = transform * Vector3::new(point.x, point.y, 1.0);
    Point2::new(p.x / p.z, p.y / p.z)
}

/// True when any three of the points are (nearly) collinear.
fn has_collinear_triplet(points: &[Point2<f64>]) -> bool {
    const MIN_AREA: f64 = 1e-3;
    let n = points.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let (a, b, c) = (points[i], points[j], points[k]);
                let area = (b - a).perp(&(c - a)).abs();
                if area < MIN_AREA {
                    return true;
                }
            }
        }
    }
    false
}

/// Least squares homography through the normalised DLT.
///
/// Returns `None` for degenerate input: fewer than 4 pairs, coincident points,
/// or a minimal sample with three collinear points on either side.
pub fn fit_homography(pairs: &[PointPair]) -> Option<Homography> {
    let n = pairs.len();
    if n < HomographyEstimator::MIN_SAMPLES {
        return None;
    }

    let t_reference = normalizing_transform(pairs.iter().map(|p| &p.reference))?;
    let t_live = normalizing_transform(pairs.iter().map(|p| &p.live))?;
    let reference: Vec<_> = pairs.iter().map(|p| apply(&t_reference, &p.reference)).collect();
    let live: Vec<_> = pairs.iter().map(|p| apply(&t_live, &p.live)).collect();

    if n == HomographyEstimator::MIN_SAMPLES
        && (has_collinear_triplet(&reference) || has_collinear_triplet(&live))
    {
        return None;
    }

    // pad to at least 9 rows so the SVD yields the full right singular basis
    let rows = (2 * n).max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (i, (r, l)) in reference.iter().zip(&live).enumerate() {
        let (x, y, u, v) = (r.x, r.y, l.x, l.y);
        let (r0, r1) = (2 * i, 2 * i + 1);

        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    // null vector belongs to the smallest singular value, which nalgebra does not sort
    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let smallest = svd.singular_values.imin();
    let normalized = Matrix3::from_row_iterator(v_t.row(smallest).iter().copied());

    let mut h = t_live.try_inverse()? * normalized * t_reference;
    let scale = h[(2, 2)];
    if scale.abs() > f64::EPSILON {
        h /= scale;
    } else {
        h /= h.norm();
    }

    if !h.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some(Homography(h))
}
