use serde::{Deserialize, Serialize};

/// A colour in CIELAB (D65 white point), `l` in `0..=100`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lab {
    pub l: f64,
    pub a: f64,
    pub b: f64,
}

impl Lab {
    /// Reads the first three components of a point.
    ///
    /// Panics if the point has fewer than three components.
    #[inline]
    pub(crate) fn from_point(point: &[f64]) -> Self {
        debug_assert!(point.len() >= 3, "Lab points need 3 components");
        Self {
            l: point[0],
            a: point[1],
            b: point[2],
        }
    }

    #[inline]
    pub fn chroma(self) -> f64 {
        self.a.hypot(self.b)
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.l, self.a, self.b]
    }
}

impl From<[f64; 3]> for Lab {
    fn from([l, a, b]: [f64; 3]) -> Self {
        Self { l, a, b }
    }
}

impl From<Lab> for Vec<f64> {
    fn from(lab: Lab) -> Self {
        lab.to_array().to_vec()
    }
}
