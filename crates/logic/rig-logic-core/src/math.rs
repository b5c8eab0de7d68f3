//! Transform helpers on top of nalgebra.
//!
//! Euler angles are XYZ (X applied first), matching `UnitQuaternion::from_euler_angles`.

use nalgebra::{Matrix3, Matrix4, Quaternion, Rotation3, UnitQuaternion, Vector3};

/// Location, rotation and scale of an affine matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Decomposed {
    pub location: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub scale: Vector3<f64>,
}

pub fn rotation_x(angle: f64) -> Matrix4<f64> {
    Rotation3::from_axis_angle(&Vector3::x_axis(), angle).to_homogeneous()
}

/// +90 degrees about X: DNA (Y-up) to scene (Z-up).
pub fn y_up_to_z_up() -> Matrix4<f64> {
    rotation_x(std::f64::consts::FRAC_PI_2)
}

/// -90 degrees about X: scene (Z-up) to DNA (Y-up).
pub fn z_up_to_y_up() -> Matrix4<f64> {
    rotation_x(-std::f64::consts::FRAC_PI_2)
}

pub fn euler_to_quaternion(euler: &Vector3<f64>) -> UnitQuaternion<f64> {
    UnitQuaternion::from_euler_angles(euler.x, euler.y, euler.z)
}

pub fn quaternion_to_euler(rotation: &UnitQuaternion<f64>) -> Vector3<f64> {
    let (x, y, z) = rotation.euler_angles();
    Vector3::new(x, y, z)
}

pub fn loc_rot_scale(
    location: &Vector3<f64>,
    rotation: &UnitQuaternion<f64>,
    scale: &Vector3<f64>,
) -> Matrix4<f64> {
    let mut m = rotation.to_homogeneous();
    for (col, s) in scale.iter().enumerate() {
        for row in 0..3 {
            m[(row, col)] *= s;
        }
    }
    m[(0, 3)] = location.x;
    m[(1, 3)] = location.y;
    m[(2, 3)] = location.z;
    m
}

pub fn translation(m: &Matrix4<f64>) -> Vector3<f64> {
    Vector3::new(m[(0, 3)], m[(1, 3)], m[(2, 3)])
}

pub fn decompose(m: &Matrix4<f64>) -> Decomposed {
    let basis: Matrix3<f64> = m.fixed_view::<3, 3>(0, 0).into_owned();
    let mut scale = Vector3::new(
        basis.column(0).norm(),
        basis.column(1).norm(),
        basis.column(2).norm(),
    );
    if basis.determinant() < 0.0 {
        scale.x = -scale.x;
    }
    let mut normalized = basis;
    for col in 0..3 {
        if scale[col].abs() > f64::EPSILON {
            let s = scale[col];
            normalized.column_mut(col).unscale_mut(s);
        }
    }
    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(normalized));
    Decomposed {
        location: translation(m),
        rotation,
        scale,
    }
}

/// Wrap an angular delta in degrees into `(-180, 180]`.
pub fn wrap_degrees(delta: f64) -> f64 {
    let wrapped = delta - 360.0 * (delta / 360.0).round();
    if wrapped <= -180.0 {
        wrapped + 360.0
    } else {
        wrapped
    }
}

pub fn vector_from_f32(values: [f32; 3]) -> Vector3<f64> {
    Vector3::new(values[0] as f64, values[1] as f64, values[2] as f64)
}

pub fn vector_to_f32(values: &Vector3<f64>) -> [f32; 3] {
    [values.x as f32, values.y as f32, values.z as f32]
}

/// `[x, y, z, w]` as stored in DNA records.
pub fn quaternion_from_xyzw(values: [f32; 4]) -> UnitQuaternion<f64> {
    UnitQuaternion::from_quaternion(Quaternion::new(
        values[3] as f64,
        values[0] as f64,
        values[1] as f64,
        values[2] as f64,
    ))
}

pub fn quaternion_to_xyzw(rotation: &UnitQuaternion<f64>) -> [f32; 4] {
    [
        rotation.i as f32,
        rotation.j as f32,
        rotation.k as f32,
        rotation.w as f32,
    ]
}

/// Angle between two rotations, in radians, ignoring quaternion sign.
pub fn rotation_difference(a: &UnitQuaternion<f64>, b: &UnitQuaternion<f64>) -> f64 {
    let dot = a.coords.dot(&b.coords).abs().min(1.0);
    2.0 * dot.acos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn decompose_inverts_loc_rot_scale() {
        let loc = Vector3::new(1.0, -2.0, 0.5);
        let rot = euler_to_quaternion(&Vector3::new(0.3, -0.2, 1.1));
        let scale = Vector3::new(1.0, 2.0, 0.5);
        let parts = decompose(&loc_rot_scale(&loc, &rot, &scale));

        assert_relative_eq!(parts.location, loc, epsilon = 1e-12);
        assert_relative_eq!(parts.scale, scale, epsilon = 1e-12);
        assert!(rotation_difference(&parts.rotation, &rot) < 1e-9);
    }

    #[test]
    fn euler_order_is_xyz() {
        let euler = Vector3::new(0.4, 0.25, -0.7);
        let q = euler_to_quaternion(&euler);
        let expected = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), -0.7)
            * UnitQuaternion::from_axis_angle(&Vector3::y_axis(), 0.25)
            * UnitQuaternion::from_axis_angle(&Vector3::x_axis(), 0.4);
        assert!(rotation_difference(&q, &expected) < 1e-12);
        assert_relative_eq!(quaternion_to_euler(&q), euler, epsilon = 1e-12);
    }

    #[test]
    fn wrap_degrees_folds_full_turns() {
        assert_relative_eq!(wrap_degrees(181.0 - (-179.0)), 0.0);
        assert_relative_eq!(wrap_degrees(90.0), 90.0);
        assert_relative_eq!(wrap_degrees(-270.0), 90.0);
        assert_relative_eq!(wrap_degrees(180.0), 180.0);
        assert_relative_eq!(wrap_degrees(-180.0), 180.0);
    }

    #[test]
    fn up_axis_conversions_cancel() {
        let m = y_up_to_z_up() * z_up_to_y_up();
        assert_relative_eq!(m, Matrix4::identity(), epsilon = 1e-12);
        let up = y_up_to_z_up().transform_vector(&Vector3::y());
        assert_relative_eq!(up, Vector3::z(), epsilon = 1e-12);
    }
}
