//! sRGB ⇄ CIELAB under the D65 white point.
//!
//! http://www.brucelindbloom.com/index.html?Eqn_RGB_XYZ_Matrix.html

use crate::types::Lab;
use rgb::RGB8;

const WHITE_X: f64 = 0.95047;
const WHITE_Y: f64 = 1.0;
const WHITE_Z: f64 = 1.08883;

// CIE standard values of 216/24389 and 24389/27
const EPSILON: f64 = 216.0 / 24389.0;
const KAPPA: f64 = 24389.0 / 27.0;

#[inline]
fn f(t: f64) -> f64 {
    if t > EPSILON {
        t.cbrt()
    } else {
        (KAPPA * t + 16.0) / 116.0
    }
}

#[inline]
fn f_inv(t: f64) -> f64 {
    let cubed = t * t * t;
    if cubed > EPSILON {
        cubed
    } else {
        (116.0 * t - 16.0) / KAPPA
    }
}

/// Linear-light sRGB components in `0..=1` to CIELAB.
pub fn linear_srgb_to_lab(r: f64, g: f64, b: f64) -> Lab {
    let x = 0.4124564 * r + 0.3575761 * g + 0.1804375 * b;
    let y = 0.2126729 * r + 0.7151522 * g + 0.0721750 * b;
    let z = 0.0193339 * r + 0.1191920 * g + 0.9503041 * b;

    let fx = f(x / WHITE_X);
    let fy = f(y / WHITE_Y);
    let fz = f(z / WHITE_Z);

    Lab {
        l: 116.0 * fy - 16.0,
        a: 500.0 * (fx - fy),
        b: 200.0 * (fy - fz),
    }
}

/// CIELAB to linear-light sRGB. Out-of-gamut colours give components
/// outside `0..=1`.
pub fn lab_to_linear_srgb(lab: Lab) -> [f64; 3] {
    let fy = (lab.l + 16.0) / 116.0;
    let fx = fy + lab.a / 500.0;
    let fz = fy - lab.b / 200.0;

    let x = f_inv(fx) * WHITE_X;
    let y_ratio = if lab.l > KAPPA * EPSILON {
        fy * fy * fy
    } else {
        lab.l / KAPPA
    };
    let y = y_ratio * WHITE_Y;
    let z = f_inv(fz) * WHITE_Z;

    [
        3.2404542 * x - 1.5371385 * y - 0.4985314 * z,
        -0.9692660 * x + 1.8760108 * y + 0.0415560 * z,
        0.0556434 * x - 0.2040259 * y + 1.0572252 * z,
    ]
}

pub fn srgb8_to_lab(color: RGB8) -> Lab {
    linear_srgb_to_lab(
        fast_srgb8::srgb8_to_f32(color.r) as f64,
        fast_srgb8::srgb8_to_f32(color.g) as f64,
        fast_srgb8::srgb8_to_f32(color.b) as f64,
    )
}

/// Nearest displayable sRGB colour; out-of-gamut components are clipped.
pub fn lab_to_srgb8(lab: Lab) -> RGB8 {
    let [r, g, b] = lab_to_linear_srgb(lab);
    let encode = |c: f64| fast_srgb8::f32_to_srgb8(c.clamp(0.0, 1.0) as f32);
    RGB8::new(encode(r), encode(g), encode(b))
}
