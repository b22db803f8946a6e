//! Random overlap of correlated-k distributions.
//!
//! Two species whose absorption lines are spectrally uncorrelated inside a
//! bin are mixed by forming every pairwise sum of their k-coefficients,
//! sorting the sums, and reading the resulting distribution back at the
//! quadrature abscissas.
//!
//! ```text
//!   k_a[Ng], k_b[Ng] --(Ng² sums, w_m·w_l)--> sort --> cumsum(w) --> k_mix[Ng]
//! ```
//!
//! The work is `O(Ng²)` per bin and dominates the cost of mixing gases, so
//! the kernel keeps its scratch buffers between bins.

use crate::errors::{ExokError, ExokResult};
use crate::interp::{argsort_into, interp, rebin};
use crate::quadrature::QuadratureGrid;
use ndarray::{Array3, ArrayView3};

/// How the sorted sums are brought back onto the quadrature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Resampling {
    /// Linear interpolation of k at the abscissas.
    #[default]
    Interpolate,
    /// Conservative average over the cumulative-weight cells.
    Rebin,
}

impl Resampling {
    pub fn from_rebin_flag(use_rebin: bool) -> Self {
        if use_rebin {
            Resampling::Rebin
        } else {
            Resampling::Interpolate
        }
    }
}

/// Mixing kernel bound to one quadrature.
pub struct RandomOverlap<'q> {
    quadrature: &'q QuadratureGrid,
    resampling: Resampling,
    pair_weights: Vec<f64>,
    sums: Vec<f64>,
    order: Vec<usize>,
    sorted_k: Vec<f64>,
    cumulative_g: Vec<f64>,
}

impl<'q> RandomOverlap<'q> {
    pub fn new(quadrature: &'q QuadratureGrid, resampling: Resampling) -> Self {
        let ng = quadrature.len();
        let w = quadrature.weights();
        let mut pair_weights = vec![0.0; ng * ng];
        for l in 0..ng {
            for m in 0..ng {
                pair_weights[l * ng + m] = w[m] * w[l];
            }
        }
        Self {
            quadrature,
            resampling,
            pair_weights,
            sums: vec![0.0; ng * ng],
            order: Vec::with_capacity(ng * ng),
            sorted_k: Vec::with_capacity(ng * ng + 1),
            cumulative_g: Vec::with_capacity(ng * ng + 1),
        }
    }

    /// Mixes one bin. All three slices have the quadrature's length.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if a slice does not have the quadrature's length.
    pub fn mix_into(&mut self, k_a: &[f64], k_b: &[f64], out: &mut [f64]) -> ExokResult<()> {
        let ng = self.quadrature.len();
        for (what, len) in [("first", k_a.len()), ("second", k_b.len()), ("mixed", out.len())] {
            if len != ng {
                return Err(ExokError::shape_mismatch(
                    &format!("random overlap, {what} k-vector"),
                    &[ng],
                    &[len],
                ));
            }
        }
        if k_b.iter().all(|&k| k == 0.0) {
            out.copy_from_slice(k_a);
            return Ok(());
        }
        if k_a.iter().all(|&k| k == 0.0) {
            out.copy_from_slice(k_b);
            return Ok(());
        }

        for l in 0..ng {
            for m in 0..ng {
                self.sums[l * ng + m] = k_a[m] + k_b[l];
            }
        }
        argsort_into(&self.sums, &mut self.order);

        self.sorted_k.clear();
        self.cumulative_g.clear();
        let mut g = 0.0;
        match self.resampling {
            Resampling::Interpolate => {
                for &i in &self.order {
                    g += self.pair_weights[i];
                    self.sorted_k.push(self.sums[i]);
                    self.cumulative_g.push(g);
                }
                for (o, &gi) in out.iter_mut().zip(self.quadrature.abscissas()) {
                    *o = interp(gi, &self.cumulative_g, &self.sorted_k);
                }
            }
            Resampling::Rebin => {
                // sorted sum i fills the cell its own weight spans, [G_i, G_i+1]
                self.cumulative_g.push(0.0);
                for &i in &self.order {
                    g += self.pair_weights[i];
                    self.sorted_k.push(self.sums[i]);
                    self.cumulative_g.push(g);
                }
                self.sorted_k.push(self.sums[self.order[self.order.len() - 1]]);
                let mixed = rebin(
                    &self.sorted_k,
                    &self.cumulative_g,
                    self.quadrature.cumulative_edges(),
                );
                out.copy_from_slice(&mixed);
            }
        }
        Ok(())
    }

    /// Mixes one bin into a new vector.
    pub fn mix(&mut self, k_a: &[f64], k_b: &[f64]) -> ExokResult<Vec<f64>> {
        let mut out = vec![0.0; self.quadrature.len()];
        self.mix_into(k_a, k_b, &mut out)?;
        Ok(out)
    }

    /// Mixes flat arrays of consecutive k-vectors bin by bin.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` unless the three arrays have one length, a multiple of
    /// the quadrature's.
    pub fn mix_rows(&mut self, a: &[f64], b: &[f64], out: &mut [f64]) -> ExokResult<()> {
        let ng = self.quadrature.len();
        if b.len() != a.len() || out.len() != a.len() || ng == 0 || a.len() % ng != 0 {
            return Err(ExokError::shape_mismatch(
                "random overlap rows",
                &[a.len(), a.len(), a.len()],
                &[a.len(), b.len(), out.len()],
            ));
        }
        for ((ka, kb), o) in a
            .chunks_exact(ng)
            .zip(b.chunks_exact(ng))
            .zip(out.chunks_exact_mut(ng))
        {
            self.mix_into(ka, kb, o)?;
        }
        Ok(())
    }
}

/// Mixes two `[layers, Nw, Ng]` opacity profiles.
///
/// # Errors
///
/// `ShapeMismatch` if the profiles differ in shape or if their last axis is
/// not the quadrature's length.
pub fn mix_profiles(
    a: ArrayView3<f64>,
    b: ArrayView3<f64>,
    quadrature: &QuadratureGrid,
    resampling: Resampling,
) -> ExokResult<Array3<f64>> {
    if a.shape() != b.shape() {
        return Err(ExokError::shape_mismatch(
            "random overlap of two profiles",
            a.shape(),
            b.shape(),
        ));
    }
    if a.shape()[2] != quadrature.len() {
        return Err(ExokError::shape_mismatch(
            "random overlap g axis",
            &[quadrature.len()],
            &[a.shape()[2]],
        ));
    }
    let flat_a: Vec<f64> = a.iter().copied().collect();
    let flat_b: Vec<f64> = b.iter().copied().collect();
    let mut flat_out = vec![0.0; flat_a.len()];
    RandomOverlap::new(quadrature, resampling).mix_rows(&flat_a, &flat_b, &mut flat_out)?;
    Array3::from_shape_vec(a.raw_dim(), flat_out)
        .map_err(|e| ExokError::Configuration(format!("random overlap output: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::Array;

    #[test]
    fn test_mixing_with_zero_is_identity() {
        let quad = QuadratureGrid::gauss_legendre(8).unwrap();
        let k: Vec<f64> = (1..=8).map(|i| 1e-25 * i as f64).collect();
        let zero = vec![0.0; 8];
        let mut kernel = RandomOverlap::new(&quad, Resampling::Interpolate);
        assert_eq!(kernel.mix(&k, &zero).unwrap(), k);
        assert_eq!(kernel.mix(&zero, &k).unwrap(), k);

        let mut kernel = RandomOverlap::new(&quad, Resampling::Rebin);
        assert_eq!(kernel.mix(&k, &zero).unwrap(), k);
    }

    #[test]
    fn test_mixing_with_constant_shifts_distribution() {
        let quad = QuadratureGrid::gauss_legendre(8).unwrap();
        let k_a: Vec<f64> = quad.abscissas().iter().map(|g| 10f64.powf(4.0 * g)).collect();
        let k_b = vec![2.0; 8];
        let mixed = RandomOverlap::new(&quad, Resampling::Interpolate).mix(&k_a, &k_b).unwrap();
        for (m, a) in mixed.iter().zip(&k_a) {
            assert_relative_eq!(*m, a + 2.0, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_mixing_conserves_first_moment_of_constants() {
        let quad = QuadratureGrid::gauss_legendre(4).unwrap();
        let mixed = RandomOverlap::new(&quad, Resampling::Interpolate).mix(&[1.0; 4], &[3.0; 4]).unwrap();
        let mean = quad.integrate(&mixed);
        assert_relative_eq!(mean, 4.0, max_relative = 1e-12);
        let total: f64 = quad.weights().iter().sum();
        assert_relative_eq!(total, 1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_mixed_distribution_is_sorted_and_bounded() {
        let quad = QuadratureGrid::gauss_legendre(6).unwrap();
        let k_a = [1.0, 2.0, 4.0, 8.0, 16.0, 32.0];
        let k_b = [0.5, 0.6, 3.0, 9.0, 27.0, 81.0];
        for resampling in [Resampling::Interpolate, Resampling::Rebin] {
            let mixed = RandomOverlap::new(&quad, resampling).mix(&k_a, &k_b).unwrap();
            assert!(mixed.windows(2).all(|w| w[0] <= w[1]));
            assert!(mixed[0] >= k_a[0] + k_b[0]);
            assert!(mixed[5] <= k_a[5] + k_b[5]);
        }
    }

    #[test]
    fn test_mixing_conserves_first_moment() {
        let quad = QuadratureGrid::gauss_legendre(8).unwrap();
        let k_a: Vec<f64> = quad.abscissas().iter().map(|g| 1e-3 * 10f64.powf(6.0 * g)).collect();
        let k_b: Vec<f64> = quad.abscissas().iter().map(|g| 1e-2 * 10f64.powf(4.0 * g)).collect();
        let expected = quad.integrate(&k_a) + quad.integrate(&k_b);

        let rebinned = RandomOverlap::new(&quad, Resampling::Rebin).mix(&k_a, &k_b).unwrap();
        assert_relative_eq!(quad.integrate(&rebinned), expected, max_relative = 1e-12);

        // interpolation only approximates the mean of a steep distribution
        let interpolated = RandomOverlap::new(&quad, Resampling::Interpolate)
            .mix(&k_a, &k_b)
            .unwrap();
        assert_relative_eq!(quad.integrate(&interpolated), expected, max_relative = 0.05);
    }

    #[test]
    fn test_wrong_lengths_are_rejected() {
        let quad = QuadratureGrid::gauss_legendre(4).unwrap();
        let mut kernel = RandomOverlap::new(&quad, Resampling::Rebin);
        assert!(matches!(
            kernel.mix(&[1.0; 4], &[1.0; 3]),
            Err(ExokError::ShapeMismatch { .. })
        ));
        let mut out = [0.0; 4];
        assert!(matches!(
            kernel.mix_into(&[1.0; 4], &[1.0; 4], &mut out[..2]),
            Err(ExokError::ShapeMismatch { .. })
        ));
        let mut rows = [0.0; 6];
        assert!(matches!(
            kernel.mix_rows(&[1.0; 6], &[1.0; 6], &mut rows),
            Err(ExokError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_mix_profiles_shapes() {
        let quad = QuadratureGrid::gauss_legendre(3).unwrap();
        let a = Array::from_elem((2, 4, 3), 1.0);
        let b = Array::from_elem((2, 4, 3), 2.0);
        let mixed = mix_profiles(a.view(), b.view(), &quad, Resampling::Interpolate).unwrap();
        assert_eq!(mixed.shape(), &[2, 4, 3]);
        assert!(mixed.iter().all(|&k| (k - 3.0).abs() < 1e-12));

        let c = Array::from_elem((2, 5, 3), 2.0);
        assert!(matches!(
            mix_profiles(a.view(), c.view(), &quad, Resampling::Interpolate),
            Err(ExokError::ShapeMismatch { .. })
        ));
    }
}
