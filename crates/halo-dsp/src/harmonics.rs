//! Real spherical harmonics up to third order.
//!
//! Used by the visualization tap consumer: normalization factors, MaxRe
//! weighting and a direction-grid decoder.

use crate::order::AmbisonicOrder;

/// Coefficients for a full third-order evaluation.
pub const SH_COEFFICIENTS: usize = 16;

/// Per-channel SN3D → N3D factor `sqrt(2l + 1)`, in ACN order.
pub fn sn3d_to_n3d_factors(order: AmbisonicOrder) -> Vec<f32> {
    per_band(order, |l| ((2 * l + 1) as f32).sqrt())
}

/// Per-channel MaxRe weight `cos(πl / (2·order + 2))`, in ACN order.
pub fn max_re_weights(order: AmbisonicOrder) -> Vec<f32> {
    let denominator = (2 * order.value() + 2) as f32;
    per_band(order, |l| (std::f32::consts::PI * l as f32 / denominator).cos())
}

fn per_band(order: AmbisonicOrder, factor: impl Fn(usize) -> f32) -> Vec<f32> {
    let mut factors = Vec::with_capacity(order.channel_count());
    for l in 0..=order.value() {
        factors.extend(std::iter::repeat(factor(l)).take(2 * l + 1));
    }
    factors
}

/// Evaluate the 16 real spherical harmonics at a unit direction.
///
/// `y` and `z` are negated first to match the visualizer's screen axes.
pub fn evaluate_sh(x: f32, y: f32, z: f32) -> [f32; SH_COEFFICIENTS] {
    let (y, z) = (-y, -z);
    [
        0.282095,
        0.488603 * y,
        0.488603 * z,
        0.488603 * x,
        1.092548 * x * y,
        1.092548 * y * z,
        0.315392 * (3.0 * z * z - 1.0),
        1.092548 * x * z,
        0.546274 * (x * x - y * y),
        0.590044 * y * (3.0 * x * x - y * y),
        2.890611 * x * y * z,
        0.457046 * y * (5.0 * z * z - 1.0),
        0.373176 * (5.0 * z * z - 3.0) * z,
        0.457046 * x * (5.0 * z * z - 1.0),
        1.445306 * z * (x * x - y * y),
        0.590044 * x * (x * x - 3.0 * y * y),
    ]
}

/// Scale each decoder column by its band's MaxRe weight.
///
/// Columns past the order's channel count are left as they are.
pub fn apply_max_re(decoder: &mut [[f32; SH_COEFFICIENTS]], order: AmbisonicOrder) {
    let weights = max_re_weights(order);
    for row in decoder.iter_mut() {
        for (value, weight) in row.iter_mut().zip(&weights) {
            *value *= weight;
        }
    }
}

/// One MaxRe-weighted decoder row per unit direction.
pub fn decoder_matrix_with_max_re(
    directions: &[[f32; 3]],
    order: AmbisonicOrder,
) -> Vec<[f32; SH_COEFFICIENTS]> {
    let mut decoder: Vec<_> = directions
        .iter()
        .map(|[x, y, z]| evaluate_sh(*x, *y, *z))
        .collect();
    apply_max_re(&mut decoder, order);
    decoder
}

/// Squared decoder response per direction for one frame of N3D coefficients.
pub fn directional_energy(decoder: &[[f32; SH_COEFFICIENTS]], coefficients: &[f32]) -> Vec<f32> {
    decoder
        .iter()
        .map(|row| {
            let amplitude: f32 = row.iter().zip(coefficients).map(|(d, c)| d * c).sum();
            amplitude * amplitude
        })
        .collect()
}
