use nalgebra::{Matrix3, Rotation3, Vector3};

type T = f64;

/// Pinhole intrinsic matrix `K` with the principal point in the middle of the frame.
/// Pixel centres sit at integer coordinates, so the middle is `(size - 1) / 2`.
pub fn get_camera_intrinsic(focal: T, width: T, height: T) -> Matrix3<T> {
    Matrix3::new(
        focal,
        0.0,
        (width - 1.0) / 2.0,
        0.0,
        focal,
        (height - 1.0) / 2.0,
        0.0,
        0.0,
        1.0,
    )
}

/// Closest rotation to `m` in the Frobenius sense (`U * V^T` of its SVD),
/// with the sign fixed so the result is a proper rotation.
pub fn nearest_rotation(m: &Matrix3<T>) -> Option<Rotation3<T>> {
    let svd = m.svd(true, true);
    let mut u = svd.u?;
    let v_t = svd.v_t?;
    if (u * v_t).determinant() < 0.0 {
        let flipped = -u.column(2).into_owned();
        u.set_column(2, &flipped);
    }
    Some(Rotation3::from_matrix_unchecked(u * v_t))
}

/// Recovers the pose of a `Z = 0` plane from the homography `g` mapping metric
/// plane coordinates to image pixels.
///
/// `K^-1 * G = lambda * [r1 r2 t]`. The scale comes from the mean norm of the
/// first two columns and its sign from the Cheirality condition: the plane
/// origin has to lie in front of the camera (`t_z > 0`).
pub fn pose_from_plane_homography(
    camera_intrinsic: &Matrix3<T>,
    g: &Matrix3<T>,
) -> Option<(Rotation3<T>, Vector3<T>)> {
    let m = camera_intrinsic.try_inverse()? * g;
    let (h1, h2, h3) = (m.column(0), m.column(1), m.column(2));

    let (n1, n2) = (h1.norm(), h2.norm());
    if n1 < 1e-12 || n2 < 1e-12 {
        return None;
    }

    let mut lambda = 2.0 / (n1 + n2);
    if h3[2] * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1: Vector3<T> = h1 * lambda;
    let r2: Vector3<T> = h2 * lambda;
    let r3 = r1.cross(&r2);
    let rotation = nearest_rotation(&Matrix3::from_columns(&[r1, r2, r3]))?;
    let translation: Vector3<T> = h3 * lambda;

    if translation.z <= 0.0 || !translation.iter().all(|v| v.is_finite()) {
        return None;
    }
    Some((rotation, translation))
}
