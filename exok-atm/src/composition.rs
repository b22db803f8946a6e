//! Gas composition: volume mixing ratios of the species of an atmosphere.

use crate::molar_mass::MolarMassLookup;
use exok_core::errors::{ExokError, ExokResult};
use is_close::is_close;
use serde::{Deserialize, Serialize};

/// Volume mixing ratio of one species, uniform or per layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MixingRatio {
    Scalar(f64),
    Profile(Vec<f64>),
}

impl MixingRatio {
    pub fn at(&self, layer: usize) -> f64 {
        match self {
            MixingRatio::Scalar(x) => *x,
            MixingRatio::Profile(xs) => xs[layer],
        }
    }

    /// Number of layers of a profile.
    pub fn n_layers(&self) -> Option<usize> {
        match self {
            MixingRatio::Scalar(_) => None,
            MixingRatio::Profile(xs) => Some(xs.len()),
        }
    }

    /// Values for `n` layers.
    pub fn to_profile(&self, n: usize) -> Vec<f64> {
        match self {
            MixingRatio::Scalar(x) => vec![*x; n],
            MixingRatio::Profile(xs) => xs.clone(),
        }
    }
}

impl From<f64> for MixingRatio {
    fn from(x: f64) -> Self {
        MixingRatio::Scalar(x)
    }
}

impl From<Vec<f64>> for MixingRatio {
    fn from(xs: Vec<f64>) -> Self {
        MixingRatio::Profile(xs)
    }
}

/// Species and their mixing ratios, in insertion order.
///
/// One species may be the background: its ratio is whatever the others leave,
/// `1 - Σ others`, and follows every change to them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GasComposition {
    species: Vec<(String, MixingRatio)>,
    background: Option<String>,
}

impl GasComposition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a composition from explicit ratios.
    ///
    /// # Errors
    ///
    /// `ShapeMismatch` if two profiles have different lengths.
    pub fn from_ratios<S, R>(
        ratios: impl IntoIterator<Item = (S, R)>,
        background: Option<&str>,
    ) -> ExokResult<Self>
    where
        S: Into<String>,
        R: Into<MixingRatio>,
    {
        let mut composition = Self::new();
        for (name, ratio) in ratios {
            composition.set(name, ratio)?;
        }
        if let Some(background) = background {
            composition.set_background(background);
        }
        Ok(composition)
    }

    /// Sets the ratio of `name`, replacing any previous one.
    ///
    /// Setting the background species turns it into an explicit one.
    pub fn set(
        &mut self,
        name: impl Into<String>,
        ratio: impl Into<MixingRatio>,
    ) -> ExokResult<()> {
        let name = name.into();
        let ratio = ratio.into();
        if let (Some(n), Some(m)) = (ratio.n_layers(), self.n_layers()) {
            let replaces_only_profile = self
                .explicit(&name)
                .is_some_and(|old| old.n_layers().is_some())
                && self.species.iter().filter(|(_, r)| r.n_layers().is_some()).count() == 1;
            if n != m && !replaces_only_profile {
                return Err(ExokError::shape_mismatch(
                    &format!("mixing ratio profile of {name}"),
                    &[m],
                    &[n],
                ));
            }
        }
        if self.background.as_deref() == Some(name.as_str()) {
            self.background = None;
        }
        match self.species.iter_mut().find(|(n, _)| *n == name) {
            Some((_, old)) => *old = ratio,
            None => self.species.push((name, ratio)),
        }
        self.check_total();
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<MixingRatio> {
        if self.background.as_deref() == Some(name) {
            let ratio = self.background_ratio();
            self.background = None;
            return ratio;
        }
        let pos = self.species.iter().position(|(n, _)| n == name)?;
        Some(self.species.remove(pos).1)
    }

    /// Makes `name` the background species, dropping its explicit ratio.
    pub fn set_background(&mut self, name: &str) {
        self.species.retain(|(n, _)| n != name);
        self.background = Some(name.to_string());
        self.check_total();
    }

    pub fn clear_background(&mut self) {
        self.background = None;
    }

    pub fn background(&self) -> Option<&str> {
        self.background.as_deref()
    }

    fn explicit(&self, name: &str) -> Option<&MixingRatio> {
        self.species
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, ratio)| ratio)
    }

    /// Ratio of `name`, derived for the background species.
    pub fn get(&self, name: &str) -> Option<MixingRatio> {
        if self.background.as_deref() == Some(name) {
            return self.background_ratio();
        }
        self.explicit(name).cloned()
    }

    /// `1 - Σ explicit ratios`, clamped at zero.
    pub fn background_ratio(&self) -> Option<MixingRatio> {
        self.background.as_ref()?;
        Some(match self.n_layers() {
            None => MixingRatio::Scalar((1.0 - self.explicit_total(0)).max(0.0)),
            Some(n) => MixingRatio::Profile(
                (0..n)
                    .map(|i| (1.0 - self.explicit_total(i)).max(0.0))
                    .collect(),
            ),
        })
    }

    fn explicit_total(&self, layer: usize) -> f64 {
        self.species.iter().map(|(_, ratio)| ratio.at(layer)).sum()
    }

    fn check_total(&self) {
        let n = self.n_layers().unwrap_or(1);
        let above_one = |total: f64| total > 1.0 && !is_close!(total, 1.0);
        if let Some(i) = (0..n).find(|&i| above_one(self.explicit_total(i))) {
            log::warn!(
                "mixing ratios sum to {} (above 1) in layer {i}",
                self.explicit_total(i)
            );
        }
    }

    /// Number of layers of the profiles, `None` if all ratios are uniform.
    pub fn n_layers(&self) -> Option<usize> {
        self.species.iter().find_map(|(_, ratio)| ratio.n_layers())
    }

    /// All species with their ratios, the background last.
    pub fn iter(&self) -> impl Iterator<Item = (&str, MixingRatio)> + '_ {
        self.species
            .iter()
            .map(|(name, ratio)| (name.as_str(), ratio.clone()))
            .chain(self.background.as_deref().zip(self.background_ratio()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.iter().map(|(name, _)| name).collect()
    }

    pub fn len(&self) -> usize {
        self.species.len() + usize::from(self.background.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Checks the profiles against a column of `n` layers.
    pub fn check_layers(&self, n: usize) -> ExokResult<()> {
        match self.n_layers() {
            Some(m) if m != n => Err(ExokError::shape_mismatch(
                "mixing ratio profiles",
                &[n],
                &[m],
            )),
            _ => Ok(()),
        }
    }

    /// Mean molar mass in kg/mol of each of `n` layers, the ratios being
    /// normalised by their total.
    ///
    /// # Errors
    ///
    /// `Configuration` if a species has no known molar mass or the total
    /// ratio of a layer is zero.
    pub fn mean_molar_mass(
        &self,
        lookup: &impl MolarMassLookup,
        n: usize,
    ) -> ExokResult<Vec<f64>> {
        self.check_layers(n)?;
        let mut weighted = vec![0.0; n];
        let mut total = vec![0.0; n];
        for (name, ratio) in self.iter() {
            let mass = lookup.molar_mass(name).ok_or_else(|| {
                ExokError::Configuration(format!("no molar mass known for {name}"))
            })?;
            for i in 0..n {
                let x = ratio.at(i);
                weighted[i] += x * mass;
                total[i] += x;
            }
        }
        weighted
            .into_iter()
            .zip(total)
            .map(|(w, t)| {
                if t > 0.0 {
                    Ok(w / t)
                } else {
                    Err(ExokError::Configuration(
                        "the mixing ratios of a layer sum to zero".to_string(),
                    ))
                }
            })
            .collect()
    }
}
