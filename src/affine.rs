//! Affine slice transform.
//!
//! Six scalars `(a, b, c, d, e, f)` define the forward map
//! `(x', y') = (a·x + c·y + e, b·x + d·y + f)` from input pixel coordinates
//! to output pixel coordinates. The warp (see [`crate::warp`]) samples the
//! *input* using the inverse of the homogeneous 3×3 extension of this map.

use crate::error::CoreError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Affine {
    pub const IDENTITY: Affine = Affine { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 };

    /// Parse the wire format: a JSON-encoded array of 6 numbers
    /// `[a, b, c, d, e, f]` (the `transform` field of `alignedslice`).
    pub fn from_json(s: &str) -> Result<Self, CoreError> {
        let values: Vec<f64> = serde_json::from_str(s)
            .map_err(|e| CoreError::RequestMalformed(format!("transform is not a JSON number array: {e}")))?;
        if values.len() != 6 {
            return Err(CoreError::RequestMalformed(format!(
                "transform must have exactly 6 elements, got {}",
                values.len()
            )));
        }
        Ok(Affine { a: values[0], b: values[1], c: values[2], d: values[3], e: values[4], f: values[5] })
    }

    pub fn forward(&self, x: f64, y: f64) -> (f64, f64) {
        (self.a * x + self.c * y + self.e, self.b * x + self.d * y + self.f)
    }

    /// Invert the homogeneous 3×3 extension
    /// `[[a, c, e], [b, d, f], [0, 0, 1]]`. Returns `None` for a singular
    /// matrix (determinant `ad - bc` is zero).
    pub fn inverse(&self) -> Option<Affine> {
        let det = self.a * self.d - self.b * self.c;
        if det == 0.0 {
            return None;
        }
        let inv_a = self.d / det;
        let inv_b = -self.b / det;
        let inv_c = -self.c / det;
        let inv_d = self.a / det;
        let inv_e = -(inv_a * self.e + inv_c * self.f);
        let inv_f = -(inv_b * self.e + inv_d * self.f);
        Some(Affine { a: inv_a, b: inv_b, c: inv_c, d: inv_d, e: inv_e, f: inv_f })
    }
}
