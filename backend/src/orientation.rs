use neobot_shared::{OrientationBasis, Vector3};

/// Length of each drawn axis, in view units.
pub const DISPLAY_AXIS_LENGTH: f64 = 1.5;

type Mat3 = [[f64; 3]; 3];

/// Orientation basis for display, using the gyro vector as (yaw, pitch, roll).
///
/// This is a direct visualization of the gyro reading, not a fused estimate:
/// `accel` is accepted for symmetry with the IMU panel but not used.
pub fn estimate(accel: Vector3, gyro: Vector3) -> OrientationBasis {
    estimate_scaled(accel, gyro, DISPLAY_AXIS_LENGTH)
}

pub fn estimate_scaled(_accel: Vector3, gyro: Vector3, length: f64) -> OrientationBasis {
    let (yaw, pitch, roll) = (gyro.x, gyro.y, gyro.z);
    let r = mul(mul(rot_z(yaw), rot_y(pitch)), rot_x(roll));

    OrientationBasis {
        x_axis: column(&r, 0).scale(length),
        y_axis: column(&r, 1).scale(length),
        z_axis: column(&r, 2).scale(length),
    }
}

fn rot_z(a: f64) -> Mat3 {
    let (s, c) = a.sin_cos();
    [[c, -s, 0.0], [s, c, 0.0], [0.0, 0.0, 1.0]]
}

fn rot_y(a: f64) -> Mat3 {
    let (s, c) = a.sin_cos();
    [[c, 0.0, s], [0.0, 1.0, 0.0], [-s, 0.0, c]]
}

fn rot_x(a: f64) -> Mat3 {
    let (s, c) = a.sin_cos();
    [[1.0, 0.0, 0.0], [0.0, c, -s], [0.0, s, c]]
}

fn mul(a: Mat3, b: Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

fn column(m: &Mat3, j: usize) -> Vector3 {
    Vector3::new(m[0][j], m[1][j], m[2][j])
}
