//! Interpolation helpers for systems that animate values over logical time.

/// Value of a pulse wave at `time` for the given frequency, in `[0, 1]`.
pub fn pulse(time: f64, freq: f64) -> f64 {
    0.5 * (1.0 + (2.0 * std::f64::consts::PI * freq * time).sin())
}

/// Linear interpolation between `a` and `b` by factor `t` in `[0, 1]`.
pub fn lerp(a: f64, b: f64, t: f64) -> f64 {
    (1.0 - t) * a + t * b
}

/// Spherical interpolation between `a` and `b` by factor `t` in `[0, 1]`.
pub fn slerp(a: f64, b: f64, t: f64) -> f64 {
    let theta = (a / b).clamp(-1.0, 1.0).acos() * t;
    a * theta.cos() + b * theta.sin()
}
