//! Distance functions between two points of equal dimensionality.
//!
//! The colour-difference metrics interpret points as CIELAB triples
//! `[L, a, b]`. Angles are in degrees throughout; trigonometric calls
//! convert at the call site with `to_radians()`.
//!
//! References:
//! - Sharma, Wu, Dalal, "The CIEDE2000 Color-Difference Formula:
//!   Implementation Notes, Supplementary Test Data, and Mathematical
//!   Observations" (2005)
//! - http://www.brucelindbloom.com/index.html?Eqn_DeltaE_CIE94.html

use crate::types::Lab;
use serde::{Deserialize, Serialize};

/// A deterministic, non-negative distance between two points.
///
/// Implementations must not depend on anything but their inputs. Symmetry
/// is not required (CIE94 is not symmetric).
pub trait Distance {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64;

    /// Number of components the metric reads, if it is fixed.
    fn required_dimensions(&self) -> Option<usize> {
        None
    }

    /// True when no point across an axis-aligned plane through the space
    /// is closer than the orthogonal projection of the query onto that
    /// plane. KD-tree searches prune far subtrees only when this holds.
    fn projection_is_lower_bound(&self) -> bool {
        true
    }
}

impl<F> Distance for F
where
    F: Fn(&[f64], &[f64]) -> f64,
{
    #[inline]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        self(a, b)
    }
}

#[inline]
pub(crate) fn squared_euclidean(a: &[f64], b: &[f64]) -> f64 {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[derive(Debug, Copy, Clone, Default)]
pub struct Euclidean;

impl Distance for Euclidean {
    #[inline]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        squared_euclidean(a, b).sqrt()
    }
}

/// Squared Euclidean distance. Not a metric, but what within-cluster
/// variance is usually measured in.
#[derive(Debug, Copy, Clone, Default)]
pub struct SquaredEuclidean;

impl Distance for SquaredEuclidean {
    #[inline]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        squared_euclidean(a, b)
    }
}

/// CIE76: Euclidean distance in CIELAB.
#[derive(Debug, Copy, Clone, Default)]
pub struct Cie76;

impl Cie76 {
    /// https://en.wikipedia.org/wiki/Color_difference#CIE76
    pub const JND: f64 = 2.3;

    pub fn is_perceptible(distance: f64) -> bool {
        distance > Self::JND
    }
}

impl Distance for Cie76 {
    #[inline]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        squared_euclidean(&a[..3], &b[..3]).sqrt()
    }

    fn required_dimensions(&self) -> Option<usize> {
        Some(3)
    }
}

/// CIE94 with the application-specific constants.
///
/// The hue difference is derived from `Δa² + Δb² − ΔC²`, so no hue angle
/// is ever computed. Chroma weights use the first argument as the
/// reference colour, which makes the metric asymmetric.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Cie94 {
    pub kl: f64,
    pub k1: f64,
    pub k2: f64,
}

impl Cie94 {
    pub const JND: f64 = 1.0;

    pub const GRAPHIC_ARTS: Self = Self {
        kl: 1.0,
        k1: 0.045,
        k2: 0.015,
    };

    pub const TEXTILES: Self = Self {
        kl: 2.0,
        k1: 0.048,
        k2: 0.014,
    };

    pub fn is_perceptible(distance: f64) -> bool {
        distance > Self::JND
    }
}

impl Default for Cie94 {
    fn default() -> Self {
        Self::GRAPHIC_ARTS
    }
}

impl Distance for Cie94 {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let x = Lab::from_point(a);
        let y = Lab::from_point(b);

        let dl = x.l - y.l;
        let da = x.a - y.a;
        let db = x.b - y.b;
        let c1 = x.chroma();
        let c2 = y.chroma();
        let dc = c1 - c2;

        // Rounding can push this slightly below zero for near-identical hues
        let dh_squared = (da * da + db * db - dc * dc).max(0.0);

        let sc = 1.0 + self.k1 * c1;
        let sh = 1.0 + self.k2 * c1;

        let tl = dl / self.kl;
        let tc = dc / sc;
        (tl * tl + tc * tc + dh_squared / (sh * sh)).sqrt()
    }

    fn required_dimensions(&self) -> Option<usize> {
        Some(3)
    }

    // Chroma weighting shrinks distances away from the neutral axis
    fn projection_is_lower_bound(&self) -> bool {
        false
    }
}

const POW25_7: f64 = 6_103_515_625.0; // 25^7

/// CIEDE2000 with lightness, chroma and hue weights.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ciede2000 {
    kl: f64,
    kc: f64,
    kh: f64,
}

impl Ciede2000 {
    /// A difference of 1.0 or less is imperceptible to most observers.
    pub const JND: f64 = 1.0;

    /// Weights are clamped to `0.0..=2.0`. A larger weight shrinks the
    /// contribution of its term. A zero weight makes any non-zero
    /// difference in that term infinite.
    pub fn new(kl: f64, kc: f64, kh: f64) -> Self {
        Self {
            kl: kl.clamp(0.0, 2.0),
            kc: kc.clamp(0.0, 2.0),
            kh: kh.clamp(0.0, 2.0),
        }
    }

    pub fn weights(&self) -> (f64, f64, f64) {
        (self.kl, self.kc, self.kh)
    }

    pub fn is_perceptible(distance: f64) -> bool {
        distance > Self::JND
    }
}

impl Default for Ciede2000 {
    fn default() -> Self {
        Self::new(1.0, 1.0, 1.0)
    }
}

/// Hue angle in degrees, normalized to `[0, 360)`.
#[inline]
fn hue_degrees(b: f64, a_prime: f64) -> f64 {
    if b == 0.0 && a_prime == 0.0 {
        return 0.0;
    }
    let h = b.atan2(a_prime).to_degrees();
    if h < 0.0 { h + 360.0 } else { h }
}

#[inline]
fn weighted(delta: f64, denominator: f64) -> f64 {
    if delta == 0.0 { 0.0 } else { delta / denominator }
}

impl Distance for Ciede2000 {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        let x = Lab::from_point(a);
        let y = Lab::from_point(b);

        let avg_l = (x.l + y.l) / 2.0;
        let avg_c = (x.chroma() + y.chroma()) / 2.0;
        let avg_c7 = avg_c.powi(7);
        let g = 0.5 * (1.0 - (avg_c7 / (avg_c7 + POW25_7)).sqrt());

        let a1p = x.a * (1.0 + g);
        let a2p = y.a * (1.0 + g);
        let c1p = a1p.hypot(x.b);
        let c2p = a2p.hypot(y.b);
        let avg_cp = (c1p + c2p) / 2.0;

        let h1p = hue_degrees(x.b, a1p);
        let h2p = hue_degrees(y.b, a2p);
        let chroma_product = c1p * c2p;

        // Hue difference wraps around the shorter arc; undefined (zero)
        // when either colour is achromatic
        let mut dhp = h2p - h1p;
        if chroma_product == 0.0 {
            dhp = 0.0;
        } else if dhp > 180.0 {
            dhp -= 360.0;
        } else if dhp < -180.0 {
            dhp += 360.0;
        }

        let avg_hp = if chroma_product == 0.0 {
            h1p + h2p
        } else if (h1p - h2p).abs() <= 180.0 {
            (h1p + h2p) / 2.0
        } else if h1p + h2p < 360.0 {
            (h1p + h2p + 360.0) / 2.0
        } else {
            (h1p + h2p - 360.0) / 2.0
        };

        let dlp = y.l - x.l;
        let dcp = c2p - c1p;
        let dhp_big = 2.0 * chroma_product.sqrt() * (dhp.to_radians() / 2.0).sin();

        let t = 1.0 - 0.17 * (avg_hp - 30.0).to_radians().cos()
            + 0.24 * (2.0 * avg_hp).to_radians().cos()
            + 0.32 * (3.0 * avg_hp + 6.0).to_radians().cos()
            - 0.20 * (4.0 * avg_hp - 63.0).to_radians().cos();

        let l50 = (avg_l - 50.0).powi(2);
        let sl = 1.0 + 0.015 * l50 / (20.0 + l50).sqrt();
        let sc = 1.0 + 0.045 * avg_cp;
        let sh = 1.0 + 0.015 * avg_cp * t;

        // Rotation term for the blue region
        let d_theta = 30.0 * (-((avg_hp - 275.0) / 25.0).powi(2)).exp();
        let avg_cp7 = avg_cp.powi(7);
        let rc = 2.0 * (avg_cp7 / (avg_cp7 + POW25_7)).sqrt();
        let rt = -rc * (2.0 * d_theta).to_radians().sin();

        let tl = weighted(dlp, self.kl * sl);
        let tc = weighted(dcp, self.kc * sc);
        let th = weighted(dhp_big, self.kh * sh);

        (tl * tl + tc * tc + th * th + rt * tc * th).max(0.0).sqrt()
    }

    fn required_dimensions(&self) -> Option<usize> {
        Some(3)
    }

    fn projection_is_lower_bound(&self) -> bool {
        false
    }
}

/// Metric selection for callers that pick a distance by name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Euclidean,
    SquaredEuclidean,
    Cie76,
    Cie94,
    #[default]
    Ciede2000,
}

impl Metric {
    /// Just-noticeable difference, for the perceptual metrics.
    pub fn jnd(self) -> Option<f64> {
        match self {
            Metric::Euclidean | Metric::SquaredEuclidean => None,
            Metric::Cie76 => Some(Cie76::JND),
            Metric::Cie94 => Some(Cie94::JND),
            Metric::Ciede2000 => Some(Ciede2000::JND),
        }
    }
}

impl Distance for Metric {
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            Metric::Euclidean => Euclidean.distance(a, b),
            Metric::SquaredEuclidean => SquaredEuclidean.distance(a, b),
            Metric::Cie76 => Cie76.distance(a, b),
            Metric::Cie94 => Cie94::GRAPHIC_ARTS.distance(a, b),
            Metric::Ciede2000 => Ciede2000::default().distance(a, b),
        }
    }

    fn required_dimensions(&self) -> Option<usize> {
        match self {
            Metric::Euclidean | Metric::SquaredEuclidean => None,
            Metric::Cie76 | Metric::Cie94 | Metric::Ciede2000 => Some(3),
        }
    }

    fn projection_is_lower_bound(&self) -> bool {
        matches!(
            self,
            Metric::Euclidean | Metric::SquaredEuclidean | Metric::Cie76
        )
    }
}
