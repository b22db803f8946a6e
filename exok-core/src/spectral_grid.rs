//! Wavenumber grids.
//!
//! A [`SpectralGrid`] is a set of contiguous wavenumber bins (cm⁻¹) defined by
//! their edges, each with a representative center.
//!
//! ```text
//!   edges:    e0 ---- e1 ---- e2 ---- e3
//!   centers:      c0      c1      c2
//! ```
//!
//! # Examples
//!
//! ```
//! use exok_core::spectral_grid::SpectralGrid;
//!
//! let grid = SpectralGrid::from_edges(vec![1000.0, 1100.0, 1300.0]).unwrap();
//! assert_eq!(grid.centers(), &[1050.0, 1200.0]);
//! assert_eq!(grid.window(999.0, 1300.0), 0..2);
//! ```

use crate::errors::{ExokError, ExokResult};
use crate::interp::{is_strictly_increasing, searchsorted_left};
use is_close::is_close;
use serde::{Deserialize, Serialize};
use std::ops::Range;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(try_from = "RawSpectralGrid")]
pub struct SpectralGrid {
    centers: Vec<f64>,
    edges: Vec<f64>,
}

#[derive(Deserialize)]
struct RawSpectralGrid {
    centers: Vec<f64>,
    edges: Vec<f64>,
}

impl TryFrom<RawSpectralGrid> for SpectralGrid {
    type Error = ExokError;

    fn try_from(raw: RawSpectralGrid) -> ExokResult<Self> {
        SpectralGrid::new(raw.centers, raw.edges)
    }
}

impl SpectralGrid {
    /// Creates a grid from explicit centers and edges.
    ///
    /// # Errors
    ///
    /// `InvalidGrid` if the edges are not strictly increasing, if there is not
    /// exactly one more edge than centers, or if a center lies outside its bin.
    pub fn new(centers: Vec<f64>, edges: Vec<f64>) -> ExokResult<Self> {
        if edges.len() < 2 {
            return Err(ExokError::InvalidGrid(
                "a spectral grid needs at least two edges".to_string(),
            ));
        }
        if edges.len() != centers.len() + 1 {
            return Err(ExokError::InvalidGrid(format!(
                "{} edges cannot bound {} bins",
                edges.len(),
                centers.len()
            )));
        }
        if !is_strictly_increasing(&edges) {
            return Err(ExokError::InvalidGrid(
                "wavenumber edges must be strictly increasing".to_string(),
            ));
        }
        if let Some(i) = (0..centers.len())
            .find(|&i| !(centers[i] >= edges[i] && centers[i] <= edges[i + 1]))
        {
            return Err(ExokError::InvalidGrid(format!(
                "center {} does not lie inside bin [{}, {}]",
                centers[i],
                edges[i],
                edges[i + 1]
            )));
        }
        Ok(Self { centers, edges })
    }

    /// Bins with centers at the edge midpoints.
    pub fn from_edges(edges: Vec<f64>) -> ExokResult<Self> {
        let centers = edges.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
        Self::new(centers, edges)
    }

    /// Bins around given centers.
    ///
    /// Inner edges are the midpoints between centers and the outer edges are
    /// the first and last centers themselves, so the outer bins are half-width
    /// and their centers sit on their outer edge.
    pub fn from_centers(centers: Vec<f64>) -> ExokResult<Self> {
        if centers.len() < 2 {
            return Err(ExokError::InvalidGrid(
                "need at least two wavenumbers to build bins".to_string(),
            ));
        }
        let n = centers.len();
        let mut edges = Vec::with_capacity(n + 1);
        edges.push(centers[0]);
        edges.extend(centers.windows(2).map(|w| 0.5 * (w[0] + w[1])));
        edges.push(centers[n - 1]);
        Self::new(centers, edges)
    }

    pub fn centers(&self) -> &[f64] {
        &self.centers
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of bins.
    pub fn len(&self) -> usize {
        self.centers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.centers.is_empty()
    }

    pub fn widths(&self) -> Vec<f64> {
        self.edges.windows(2).map(|w| w[1] - w[0]).collect()
    }

    /// Bin centers as wavelengths in micron.
    pub fn wavelengths_um(&self) -> Vec<f64> {
        self.centers.iter().map(|wn| 1e4 / wn).collect()
    }

    /// Lowest and highest edges.
    pub fn extent(&self) -> (f64, f64) {
        (self.edges[0], self.edges[self.edges.len() - 1])
    }

    /// Contiguous range of bins selected by a wavenumber window.
    ///
    /// The selected edges are those with `lo < edge <= hi` and the bins are
    /// the ones between consecutive selected edges. The range may be empty.
    pub fn window(&self, lo: f64, hi: f64) -> Range<usize> {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let first = self.edges.partition_point(|&e| e <= lo);
        let last = self.edges.partition_point(|&e| e <= hi);
        if last <= first + 1 {
            return first..first;
        }
        first..last - 1
    }

    /// Sub-grid restricted to a range of bins.
    pub fn slice(&self, range: Range<usize>) -> ExokResult<Self> {
        Self::new(
            self.centers[range.clone()].to_vec(),
            self.edges[range.start..=range.end].to_vec(),
        )
    }

    /// Bin range kept by [`SpectralGrid::clip`].
    pub fn clip_range(&self, lo: f64, hi: f64) -> Range<usize> {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let i_min = searchsorted_left(&self.edges, lo);
        let i_max = searchsorted_left(&self.edges, hi).saturating_sub(1);
        i_min..i_max.max(i_min)
    }

    /// Restricts the grid to the edges lying in `[lo, hi]`.
    pub fn clip(&self, lo: f64, hi: f64) -> ExokResult<Self> {
        self.slice(self.clip_range(lo, hi))
    }

    /// Adds bins below and above the current grid.
    ///
    /// Added bins are defined by their centers. Their edges are midpoints, the
    /// outermost edge being the outermost center, and the bin joining the
    /// existing grid ends on its first (or last) edge.
    ///
    /// # Errors
    ///
    /// `InvalidGrid` if the new bins overlap the existing grid.
    pub fn extend(&self, left: &[f64], right: &[f64]) -> ExokResult<Self> {
        let (lo, hi) = self.extent();
        if left.last().is_some_and(|&wn| wn >= lo) {
            return Err(ExokError::InvalidGrid(
                "the left grid overlaps with the current one".to_string(),
            ));
        }
        if right.first().is_some_and(|&wn| wn <= hi) {
            return Err(ExokError::InvalidGrid(
                "the right grid overlaps with the current one".to_string(),
            ));
        }
        let mut edges = Vec::with_capacity(self.edges.len() + left.len() + right.len());
        if let Some(&first) = left.first() {
            edges.push(first);
            edges.extend(left.windows(2).map(|w| 0.5 * (w[0] + w[1])));
        }
        edges.extend_from_slice(&self.edges);
        if let Some(&last) = right.last() {
            edges.extend(right.windows(2).map(|w| 0.5 * (w[0] + w[1])));
            edges.push(last);
        }
        let mut centers = Vec::with_capacity(edges.len() - 1);
        centers.extend_from_slice(left);
        centers.extend_from_slice(&self.centers);
        centers.extend_from_slice(right);
        if !is_strictly_increasing(&edges) {
            return Err(ExokError::InvalidGrid(
                "extended wavenumber edges must be strictly increasing".to_string(),
            ));
        }
        Ok(Self { centers, edges })
    }

    /// Bin centers equal up to floating-point rounding; edges may differ.
    pub fn same_centers(&self, other: &SpectralGrid) -> bool {
        self.centers.len() == other.centers.len()
            && self
                .centers
                .iter()
                .zip(&other.centers)
                .all(|(&a, &b)| is_close!(a, b))
    }

    /// Equality up to floating-point rounding.
    pub fn approx_eq(&self, other: &SpectralGrid) -> bool {
        self.edges.len() == other.edges.len()
            && self
                .edges
                .iter()
                .zip(&other.edges)
                .all(|(&a, &b)| is_close!(a, b))
            && self
                .centers
                .iter()
                .zip(&other.centers)
                .all(|(&a, &b)| is_close!(a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SpectralGrid {
        SpectralGrid::from_edges(vec![100.0, 200.0, 300.0, 400.0, 500.0]).unwrap()
    }

    #[test]
    fn test_from_edges_invariants() {
        let g = grid();
        assert_eq!(g.len(), 4);
        assert_eq!(g.edges().len(), g.centers().len() + 1);
        assert_eq!(g.centers(), &[150.0, 250.0, 350.0, 450.0]);
        assert_eq!(g.widths(), vec![100.0; 4]);
    }

    #[test]
    fn test_rejects_non_monotonic() {
        let result = SpectralGrid::from_edges(vec![100.0, 300.0, 200.0]);
        assert!(matches!(result, Err(ExokError::InvalidGrid(_))));
    }

    #[test]
    fn test_rejects_center_outside_bin() {
        let result = SpectralGrid::new(vec![250.0], vec![100.0, 200.0]);
        assert!(matches!(result, Err(ExokError::InvalidGrid(_))));
    }

    #[test]
    fn test_from_centers() {
        let g = SpectralGrid::from_centers(vec![1.0, 2.0, 4.0]).unwrap();
        assert_eq!(g.edges(), &[1.0, 1.5, 3.0, 4.0]);
    }

    #[test]
    fn test_window() {
        let g = grid();
        assert_eq!(g.window(150.0, 450.0), 1..3);
        assert_eq!(g.window(100.0, 500.0), 1..4);
        assert_eq!(g.window(0.0, 1000.0), 0..4);
        assert_eq!(g.window(210.0, 250.0), 2..2);
        assert!(g.window(210.0, 250.0).is_empty());
    }

    #[test]
    fn test_clip() {
        let clipped = grid().clip(200.0, 400.0).unwrap();
        assert_eq!(clipped.edges(), &[200.0, 300.0]);
        assert_eq!(clipped.centers(), &[250.0]);
        assert_eq!(grid().clip(0.0, 1000.0).unwrap(), grid());
    }

    #[test]
    fn test_extend() {
        let g = SpectralGrid::from_edges(vec![100.0, 200.0]).unwrap();
        let extended = g.extend(&[50.0, 70.0], &[250.0, 300.0]).unwrap();
        assert_eq!(extended.edges(), &[50.0, 60.0, 100.0, 200.0, 275.0, 300.0]);
        assert_eq!(extended.centers(), &[50.0, 70.0, 150.0, 250.0, 300.0]);
    }

    #[test]
    fn test_extend_overlap_fails() {
        let g = SpectralGrid::from_edges(vec![100.0, 200.0]).unwrap();
        assert!(g.extend(&[150.0], &[]).is_err());
        assert!(g.extend(&[], &[200.0]).is_err());
    }

    #[test]
    fn test_serde_validates() {
        let bad = r#"{"centers":[5.0],"edges":[2.0,1.0]}"#;
        assert!(serde_json::from_str::<SpectralGrid>(bad).is_err());
        let good = serde_json::to_string(&grid()).unwrap();
        assert_eq!(serde_json::from_str::<SpectralGrid>(&good).unwrap(), grid());
    }
}
