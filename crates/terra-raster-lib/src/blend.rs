//! Interpolation of sparse scalar grids
//!
//! Sample `i` of a grid covers `[i, i + 1)` with its center at `i + 0.5`. Each
//! mode reads a small window of samples around the query position; the window
//! start is `floor(p + offset)` and its width is `size`, which is also the halo
//! a tiled dataset must have loaded around a region.

use std::fmt;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum BlendMode {
    /// Value of the sample containing the point
    Nearest,
    /// Bilinear between the four closest sample centers
    #[default]
    Linear,
    /// Quadratic B-spline over a 3×3 window, smooth but not interpolating
    Smooth,
    /// Catmull-Rom cubic over a 4×4 window
    Cubic,
}

impl BlendMode {
    /// Window start relative to the query position
    pub fn offset(self) -> f64 {
        match self {
            Self::Nearest => 0.0,
            Self::Linear => -0.5,
            Self::Smooth => -1.0,
            Self::Cubic => -1.5,
        }
    }

    /// Window width in samples
    pub fn size(self) -> usize {
        match self {
            Self::Nearest => 1,
            Self::Linear => 2,
            Self::Smooth => 3,
            Self::Cubic => 4,
        }
    }

    /// First sample index and per-sample weights along one axis
    #[inline]
    pub fn weights(self, p: f64) -> (i64, [f64; 4]) {
        let start = (p + self.offset()).floor();
        let t = p + self.offset() - start;
        let w = match self {
            Self::Nearest => [1.0, 0.0, 0.0, 0.0],
            Self::Linear => [1.0 - t, t, 0.0, 0.0],
            Self::Smooth => {
                // Distance from the middle sample center, in [-0.5, 0.5)
                let t = t - 0.5;
                [
                    0.5 * (0.5 - t) * (0.5 - t),
                    0.75 - t * t,
                    0.5 * (0.5 + t) * (0.5 + t),
                    0.0,
                ]
            }
            Self::Cubic => {
                let t2 = t * t;
                let t3 = t2 * t;
                [
                    0.5 * (-t3 + 2.0 * t2 - t),
                    0.5 * (3.0 * t3 - 5.0 * t2 + 2.0),
                    0.5 * (-3.0 * t3 + 4.0 * t2 + t),
                    0.5 * (t3 - t2),
                ]
            }
        };
        (start as i64, w)
    }

    /// Interpolate at `(x, z)` reading samples through `get(ix, iz)`.
    ///
    /// NaN samples with a nonzero weight make the result NaN.
    #[inline]
    pub fn sample(self, x: f64, z: f64, mut get: impl FnMut(i64, i64) -> f64) -> f64 {
        let (x0, wx) = self.weights(x);
        let (z0, wz) = self.weights(z);
        let n = self.size();
        let mut sum = 0.0;
        for (j, &wj) in wz[..n].iter().enumerate() {
            if wj == 0.0 {
                continue;
            }
            for (i, &wi) in wx[..n].iter().enumerate() {
                if wi == 0.0 {
                    continue;
                }
                sum += wi * wj * get(x0 + i as i64, z0 + j as i64);
            }
        }
        sum
    }

    /// Interpolate inside a row-major `width × height` grid, clamping at the edges
    pub fn sample_grid(self, grid: &[f64], width: usize, height: usize, x: f64, z: f64) -> f64 {
        if width == 0 || height == 0 || grid.len() < width * height {
            return f64::NAN;
        }
        self.sample(x, z, |i, j| {
            let i = i.clamp(0, width as i64 - 1) as usize;
            let j = j.clamp(0, height as i64 - 1) as usize;
            grid[j * width + i]
        })
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Nearest => "nearest",
            Self::Linear => "linear",
            Self::Smooth => "smooth",
            Self::Cubic => "cubic",
        })
    }
}

impl FromStr for BlendMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "linear" | "bilinear" => Ok(Self::Linear),
            "smooth" => Ok(Self::Smooth),
            "cubic" | "bicubic" => Ok(Self::Cubic),
            other => Err(format!("unknown blend mode '{other}'")),
        }
    }
}
