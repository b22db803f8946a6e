//! Quadrature over g-space.
//!
//! A correlated-k table stores, for each spectral bin, the inverse cumulative
//! distribution of the absorption coefficient sampled at a handful of
//! abscissas `g` in (0, 1). Integrating over the bin is then a weighted sum
//! with the [`QuadratureGrid`] weights.

use crate::errors::{ExokError, ExokResult};
use crate::interp::{cumsum, is_strictly_increasing};
use is_close::is_close;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

/// How a quadrature was generated.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case", tag = "method")]
pub enum SamplingMethod {
    Legendre,
    SplitLegendre { g_split: f64 },
    Custom,
}

impl fmt::Display for SamplingMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplingMethod::Legendre => write!(f, "legendre"),
            SamplingMethod::SplitLegendre { g_split } => write!(f, "split-legendre({g_split})"),
            SamplingMethod::Custom => write!(f, "custom"),
        }
    }
}

/// Weights, abscissas and cumulative edges of a g-space quadrature.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuadratureGrid {
    weights: Vec<f64>,
    abscissas: Vec<f64>,
    cumulative_edges: Vec<f64>,
    sampling_method: SamplingMethod,
}

/// Value of the Legendre polynomial of degree `n` at `z` and its derivative.
fn legendre_with_derivative(n: usize, z: f64) -> (f64, f64) {
    let mut p1 = 1.0;
    let mut p2 = 0.0;
    for j in 1..=n {
        let p3 = p2;
        p2 = p1;
        p1 = ((2 * j - 1) as f64 * z * p2 - (j - 1) as f64 * p3) / j as f64;
    }
    (p1, n as f64 * (z * p1 - p2) / (z * z - 1.0))
}

/// Nodes and weights of the Gauss-Legendre rule on [-1, 1], ascending.
///
/// Roots are found by Newton iteration on the three-term Legendre
/// recurrence, starting from the usual Chebyshev-like guess.
pub fn legendre_nodes(order: usize) -> (Vec<f64>, Vec<f64>) {
    let n = order;
    let mut nodes = vec![0.0; n];
    let mut weights = vec![0.0; n];
    for i in 0..n.div_ceil(2) {
        let mut z = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        for _ in 0..100 {
            let (p, dp) = legendre_with_derivative(n, z);
            let previous = z;
            z = previous - p / dp;
            if (z - previous).abs() < 1e-15 {
                break;
            }
        }
        let (_, dp) = legendre_with_derivative(n, z);
        let w = 2.0 / ((1.0 - z * z) * dp * dp);
        nodes[i] = -z;
        nodes[n - 1 - i] = z;
        weights[i] = w;
        weights[n - 1 - i] = w;
    }
    if n % 2 == 1 {
        nodes[n / 2] = 0.0;
    }
    (nodes, weights)
}

impl QuadratureGrid {
    /// Gauss-Legendre rule of the given order mapped to [0, 1].
    ///
    /// # Examples
    ///
    /// ```
    /// use exok_core::quadrature::QuadratureGrid;
    ///
    /// let quad = QuadratureGrid::gauss_legendre(8).unwrap();
    /// let total: f64 = quad.weights().iter().sum();
    /// assert!((total - 1.0).abs() < 1e-12);
    /// ```
    pub fn gauss_legendre(order: usize) -> ExokResult<Self> {
        if order == 0 {
            return Err(ExokError::InvalidGrid(
                "quadrature order must be at least 1".to_string(),
            ));
        }
        let (nodes, weights) = legendre_nodes(order);
        let abscissas = nodes.iter().map(|x| 0.5 * (x + 1.0)).collect();
        let weights: Vec<f64> = weights.iter().map(|w| 0.5 * w).collect();
        Ok(Self {
            cumulative_edges: edges_from_weights(&weights),
            weights,
            abscissas,
            sampling_method: SamplingMethod::Legendre,
        })
    }

    /// Gauss-Legendre rule with half the points on `[0, g_split]` and half on
    /// `[g_split, 1]`.
    pub fn split_gauss_legendre(order: usize, g_split: f64) -> ExokResult<Self> {
        if order == 0 || order % 2 == 1 {
            return Err(ExokError::InvalidGrid(format!(
                "split quadrature order must be even and positive, got {order}"
            )));
        }
        if !(g_split > 0.0 && g_split < 1.0) {
            return Err(ExokError::InvalidGrid(format!(
                "g_split must lie in (0, 1), got {g_split}"
            )));
        }
        let (nodes, base) = legendre_nodes(order / 2);
        let mut weights = Vec::with_capacity(order);
        let mut abscissas = Vec::with_capacity(order);
        for (x, w) in nodes.iter().zip(&base) {
            weights.push(w * g_split / 2.0);
            abscissas.push((x + 1.0) / 2.0 * g_split);
        }
        for (x, w) in nodes.iter().zip(&base) {
            weights.push(w * (1.0 - g_split) / 2.0);
            abscissas.push((x + 1.0) / 2.0 * (1.0 - g_split) + g_split);
        }
        Ok(Self {
            cumulative_edges: edges_from_weights(&weights),
            weights,
            abscissas,
            sampling_method: SamplingMethod::SplitLegendre { g_split },
        })
    }

    /// User-supplied weights, with abscissas defaulting to the midpoints of
    /// the cumulative edges.
    ///
    /// # Errors
    ///
    /// `InvalidGrid` if a weight is not positive, the weights do not sum to
    /// one, or the abscissas are not increasing inside their cells.
    pub fn custom(weights: Vec<f64>, abscissas: Option<Vec<f64>>) -> ExokResult<Self> {
        if weights.is_empty() || weights.iter().any(|w| !(*w > 0.0)) {
            return Err(ExokError::InvalidGrid(
                "quadrature weights must be positive".to_string(),
            ));
        }
        let total: f64 = weights.iter().sum();
        if !is_close!(total, 1.0) {
            return Err(ExokError::InvalidGrid(format!(
                "quadrature weights must sum to 1, got {total}"
            )));
        }
        let cumulative_edges = edges_from_weights(&weights);
        let abscissas = match abscissas {
            Some(g) => g,
            None => cumulative_edges
                .windows(2)
                .map(|e| 0.5 * (e[0] + e[1]))
                .collect(),
        };
        if abscissas.len() != weights.len() {
            return Err(ExokError::shape_mismatch(
                "quadrature abscissas",
                &[weights.len()],
                &[abscissas.len()],
            ));
        }
        if !is_strictly_increasing(&abscissas)
            || abscissas.iter().any(|g| !(*g >= 0.0 && *g <= 1.0))
        {
            return Err(ExokError::InvalidGrid(
                "quadrature abscissas must increase within [0, 1]".to_string(),
            ));
        }
        Ok(Self {
            weights,
            abscissas,
            cumulative_edges,
            sampling_method: SamplingMethod::Custom,
        })
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn abscissas(&self) -> &[f64] {
        &self.abscissas
    }

    pub fn cumulative_edges(&self) -> &[f64] {
        &self.cumulative_edges
    }

    pub fn sampling_method(&self) -> SamplingMethod {
        self.sampling_method
    }

    /// Abscissas with the first replaced by 0 and the last by 1, so that the
    /// tabulated k(g) spans the whole of g-space.
    pub fn abscissas_0_to_1(&self) -> Vec<f64> {
        let mut g = self.abscissas.clone();
        if let Some(first) = g.first_mut() {
            *first = 0.0;
        }
        if let Some(last) = g.last_mut() {
            *last = 1.0;
        }
        g
    }

    /// Weighted sum over the g axis.
    pub fn integrate(&self, values: &[f64]) -> f64 {
        self.weights.iter().zip(values).map(|(w, v)| w * v).sum()
    }
}

/// Two quadratures are g-compatible when their arrays are identical.
impl PartialEq for QuadratureGrid {
    fn eq(&self, other: &Self) -> bool {
        self.weights == other.weights
            && self.abscissas == other.abscissas
            && self.cumulative_edges == other.cumulative_edges
    }
}

fn edges_from_weights(weights: &[f64]) -> Vec<f64> {
    let mut edges = Vec::with_capacity(weights.len() + 1);
    edges.push(0.0);
    edges.extend(cumsum(weights));
    edges
}
