use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use thiserror::Error;

use crate::rng::RandomStream;

/// Catalog shipped with the crate; used whenever no override is configured.
pub const BUILTIN_SPECIES_CATALOG: &str = include_str!("data/species_catalog.json");

/// Environment variable pointing at a catalog JSON file on disk.
pub const ENV_CATALOG_PATH: &str = "VERDANT_CATALOG_PATH";

/// Index of a species inside its catalog. Stable for the catalog's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpeciesId(pub u16);

impl fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "species{}", self.0)
    }
}

const fn default_seed_density() -> f32 {
    1.0
}

const fn default_average_spread_distance() -> f32 {
    50.0
}

const fn default_spread_variance() -> f32 {
    150.0
}

const fn default_seeds_per_step() -> u32 {
    2
}

const fn default_num_steps() -> u32 {
    3
}

const fn default_max_initial_age() -> f32 {
    0.0
}

const fn default_max_age() -> f32 {
    10.0
}

const fn default_overlap_priority() -> f32 {
    0.0
}

const fn default_collision_radius() -> f32 {
    100.0
}

const fn default_shade_radius() -> f32 {
    100.0
}

const fn default_min_scale() -> f32 {
    1.0
}

const fn default_max_scale() -> f32 {
    3.0
}

const fn default_max_initial_seed_offset() -> f32 {
    0.0
}

/// Piecewise-linear curve from normalized age in [0, 1] to normalized scale.
/// An empty key list is the identity curve.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GrowthCurve {
    #[serde(default)]
    pub keys: Vec<CurveKey>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CurveKey {
    pub t: f32,
    pub value: f32,
}

impl GrowthCurve {
    pub fn evaluate(&self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        if self.keys.is_empty() {
            return t;
        }
        if t <= self.keys[0].t {
            return self.keys[0].value;
        }
        for pair in self.keys.windows(2) {
            if t <= pair[1].t {
                let span = pair[1].t - pair[0].t;
                let alpha = if span > 0.0 { (t - pair[0].t) / span } else { 1.0 };
                return pair[0].value + (pair[1].value - pair[0].value) * alpha;
            }
        }
        self.keys[self.keys.len() - 1].value
    }

    fn validate(&self) -> Result<(), String> {
        for key in &self.keys {
            if !key.t.is_finite() || !(0.0..=1.0).contains(&key.t) {
                return Err(format!("curve key t {} outside [0, 1]", key.t));
            }
            if !key.value.is_finite() || key.value < 0.0 {
                return Err(format!("curve key value {} must be finite and >= 0", key.value));
            }
        }
        for pair in self.keys.windows(2) {
            if pair[1].t <= pair[0].t {
                return Err(format!(
                    "curve keys must be strictly increasing in t ({} then {})",
                    pair[0].t, pair[1].t
                ));
            }
        }
        Ok(())
    }
}

/// Growth and spacing parameters for one plant species. Distances are in
/// centimeters; a tile of 10_000 units is 100 meters across.
#[derive(Debug, Clone, Deserialize)]
pub struct Species {
    pub name: String,
    /// Initial seeds per 10 m x 10 m of tile area at step zero.
    #[serde(default = "default_seed_density")]
    pub seed_density: f32,
    #[serde(default = "default_average_spread_distance")]
    pub average_spread_distance: f32,
    #[serde(default = "default_spread_variance")]
    pub spread_variance: f32,
    /// Seeds each mature instance scatters per simulation step.
    #[serde(default = "default_seeds_per_step")]
    pub seeds_per_step: u32,
    /// Steps during which this species keeps growing and spreading.
    #[serde(default = "default_num_steps")]
    pub num_steps: u32,
    /// Shade-tolerant species simulate in the second pass and may germinate
    /// under canopies that would kill anything else.
    #[serde(default)]
    pub grows_in_shade: bool,
    #[serde(default = "default_max_initial_age")]
    pub max_initial_age: f32,
    #[serde(default = "default_max_age")]
    pub max_age: f32,
    /// Higher priority wins overlap fights outright.
    #[serde(default = "default_overlap_priority")]
    pub overlap_priority: f32,
    /// Trunk footprint at scale 1.
    #[serde(default = "default_collision_radius")]
    pub collision_radius: f32,
    /// Canopy footprint at scale 1.
    #[serde(default = "default_shade_radius")]
    pub shade_radius: f32,
    #[serde(default = "default_min_scale")]
    pub min_scale: f32,
    #[serde(default = "default_max_scale")]
    pub max_scale: f32,
    #[serde(default)]
    pub growth_curve: GrowthCurve,
    /// Extra random offset applied when seeding next to a shade caster.
    #[serde(default = "default_max_initial_seed_offset")]
    pub max_initial_seed_offset: f32,
}

impl Species {
    /// Larger of the two footprint radii at scale 1.
    pub fn max_radius(&self) -> f32 {
        self.collision_radius.max(self.shade_radius)
    }

    /// Scale reached at `age`, via the growth curve over normalized age.
    pub fn scale_for_age(&self, age: f32) -> f32 {
        let t = if self.max_age > 0.0 {
            (age / self.max_age).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let curve = self.growth_curve.evaluate(t);
        self.min_scale + (self.max_scale - self.min_scale) * curve
    }

    /// Age after `steps` further steps, saturating at `max_age`.
    pub fn age_by_steps(&self, age: f32, steps: u32) -> f32 {
        (age + steps as f32).min(self.max_age)
    }

    pub fn init_age(&self, stream: &mut RandomStream) -> f32 {
        stream.frand_range(0.0, self.max_initial_age)
    }

    /// Step-zero seed count for a square tile of the given edge length.
    pub fn initial_seed_count(&self, tile_size: f32) -> u32 {
        let ten_meter_units = (tile_size * tile_size) / (1000.0 * 1000.0);
        (self.seed_density * ten_meter_units).round().max(0.0) as u32
    }

    fn validate(&self) -> Result<(), CatalogError> {
        let fail = |reason: String| CatalogError::Invalid {
            species: self.name.clone(),
            reason,
        };
        if self.name.is_empty() {
            return Err(CatalogError::Invalid {
                species: "<unnamed>".into(),
                reason: "species name must not be empty".into(),
            });
        }
        let non_negative = [
            ("seed_density", self.seed_density),
            ("average_spread_distance", self.average_spread_distance),
            ("spread_variance", self.spread_variance),
            ("max_initial_age", self.max_initial_age),
            ("collision_radius", self.collision_radius),
            ("shade_radius", self.shade_radius),
            ("min_scale", self.min_scale),
            ("max_initial_seed_offset", self.max_initial_seed_offset),
        ];
        for (field, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(fail(format!("{field} must be finite and >= 0, got {value}")));
            }
        }
        if !self.overlap_priority.is_finite() {
            return Err(fail(format!(
                "overlap_priority must be finite, got {}",
                self.overlap_priority
            )));
        }
        if !self.max_age.is_finite() || self.max_age <= 0.0 {
            return Err(fail(format!("max_age must be finite and > 0, got {}", self.max_age)));
        }
        if self.max_initial_age > self.max_age {
            return Err(fail(format!(
                "max_initial_age {} exceeds max_age {}",
                self.max_initial_age, self.max_age
            )));
        }
        if !self.max_scale.is_finite() || self.max_scale < self.min_scale {
            return Err(fail(format!(
                "scale range [{}, {}] is inverted or non-finite",
                self.min_scale, self.max_scale
            )));
        }
        self.growth_curve.validate().map_err(fail)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SpeciesCatalogFile {
    species: Vec<Species>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to parse species catalog: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("failed to read species catalog from {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("duplicate species name {name:?}")]
    Duplicate { name: String },
    #[error("species {species:?}: {reason}")]
    Invalid { species: String, reason: String },
}

/// Validated set of species plus a per-species change counter. The counters
/// let a spawner detect edits made since its last simulation without keeping
/// a full copy of the previous parameters.
#[derive(Debug, Clone)]
pub struct SpeciesCatalog {
    species: Vec<Species>,
    change_counters: Vec<u32>,
}

impl SpeciesCatalog {
    pub fn new(species: Vec<Species>) -> Result<Self, CatalogError> {
        for (idx, entry) in species.iter().enumerate() {
            entry.validate()?;
            if species[..idx].iter().any(|other| other.name == entry.name) {
                return Err(CatalogError::Duplicate {
                    name: entry.name.clone(),
                });
            }
        }
        let change_counters = vec![0; species.len()];
        Ok(Self {
            species,
            change_counters,
        })
    }

    pub fn builtin() -> Self {
        Self::from_json_str(BUILTIN_SPECIES_CATALOG).expect("builtin species catalog should parse")
    }

    pub fn from_json_str(raw: &str) -> Result<Self, CatalogError> {
        let file: SpeciesCatalogFile = serde_json::from_str(raw)?;
        Self::new(file.species)
    }

    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    pub fn species(&self) -> &[Species] {
        &self.species
    }

    pub fn get(&self, id: SpeciesId) -> Option<&Species> {
        self.species.get(id.0 as usize)
    }

    /// Mutable access bumps the species' change counter so dependents can
    /// tell the catalog moved out from under their last simulation.
    pub fn get_mut(&mut self, id: SpeciesId) -> Option<&mut Species> {
        let idx = id.0 as usize;
        let entry = self.species.get_mut(idx)?;
        self.change_counters[idx] = self.change_counters[idx].wrapping_add(1);
        Some(entry)
    }

    pub fn push(&mut self, entry: Species) -> Result<SpeciesId, CatalogError> {
        entry.validate()?;
        if self.species.iter().any(|other| other.name == entry.name) {
            return Err(CatalogError::Duplicate { name: entry.name });
        }
        self.species.push(entry);
        self.change_counters.push(0);
        Ok(SpeciesId((self.species.len() - 1) as u16))
    }

    pub fn change_counters(&self) -> &[u32] {
        &self.change_counters
    }

    pub fn ids(&self) -> impl Iterator<Item = SpeciesId> + '_ {
        (0..self.species.len()).map(|idx| SpeciesId(idx as u16))
    }
}

#[derive(Debug, Clone, Default)]
pub struct CatalogMetadata {
    pub source_path: Option<PathBuf>,
}

/// Loads the catalog named by `VERDANT_CATALOG_PATH`, falling back to the
/// builtin catalog when the variable is unset or the file is unusable.
pub fn load_catalog_from_env() -> (SpeciesCatalog, CatalogMetadata) {
    match std::env::var(ENV_CATALOG_PATH) {
        Ok(raw_path) if !raw_path.is_empty() => {
            let path = PathBuf::from(raw_path);
            match SpeciesCatalog::from_file(&path) {
                Ok(catalog) => {
                    tracing::info!(
                        target: "verdant::catalog",
                        path = %path.display(),
                        species = catalog.len(),
                        "catalog.loaded"
                    );
                    (
                        catalog,
                        CatalogMetadata {
                            source_path: Some(path),
                        },
                    )
                }
                Err(error) => {
                    tracing::warn!(
                        target: "verdant::catalog",
                        path = %path.display(),
                        %error,
                        "catalog.load_failed_using_builtin"
                    );
                    (SpeciesCatalog::builtin(), CatalogMetadata::default())
                }
            }
        }
        _ => (SpeciesCatalog::builtin(), CatalogMetadata::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal(name: &str) -> Species {
        Species {
            name: name.into(),
            seed_density: 1.0,
            average_spread_distance: 100.0,
            spread_variance: 50.0,
            seeds_per_step: 2,
            num_steps: 3,
            grows_in_shade: false,
            max_initial_age: 1.0,
            max_age: 10.0,
            overlap_priority: 0.0,
            collision_radius: 50.0,
            shade_radius: 80.0,
            min_scale: 1.0,
            max_scale: 2.0,
            growth_curve: GrowthCurve::default(),
            max_initial_seed_offset: 0.0,
        }
    }

    #[test]
    fn builtin_catalog_parses_and_validates() {
        let catalog = SpeciesCatalog::builtin();
        assert!(!catalog.is_empty(), "builtin catalog should ship species");
        assert!(
            catalog.species().iter().any(|s| s.grows_in_shade),
            "builtin catalog should include a shade grower"
        );
    }

    #[test]
    fn identity_curve_tracks_normalized_age() {
        let curve = GrowthCurve::default();
        assert_eq!(curve.evaluate(0.0), 0.0);
        assert_eq!(curve.evaluate(0.25), 0.25);
        assert_eq!(curve.evaluate(1.5), 1.0);
    }

    #[test]
    fn curve_interpolates_between_keys() {
        let curve = GrowthCurve {
            keys: vec![
                CurveKey { t: 0.0, value: 0.2 },
                CurveKey { t: 0.5, value: 0.4 },
                CurveKey { t: 1.0, value: 1.0 },
            ],
        };
        assert!((curve.evaluate(0.25) - 0.3).abs() < 1e-6);
        assert!((curve.evaluate(0.75) - 0.7).abs() < 1e-6);
        // Outside the key range the ends clamp.
        assert_eq!(curve.evaluate(-1.0), 0.2);
        assert_eq!(curve.evaluate(2.0), 1.0);
    }

    #[test]
    fn unsorted_curve_keys_rejected() {
        let mut species = minimal("bad_curve");
        species.growth_curve = GrowthCurve {
            keys: vec![CurveKey { t: 0.6, value: 0.1 }, CurveKey { t: 0.2, value: 0.9 }],
        };
        let err = SpeciesCatalog::new(vec![species]).unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { .. }), "got {err:?}");
    }

    #[test]
    fn inverted_scale_range_rejected() {
        let mut species = minimal("inverted");
        species.min_scale = 3.0;
        species.max_scale = 1.0;
        assert!(SpeciesCatalog::new(vec![species]).is_err());
    }

    #[test]
    fn duplicate_names_rejected() {
        let err = SpeciesCatalog::new(vec![minimal("twin"), minimal("twin")]).unwrap_err();
        assert!(matches!(err, CatalogError::Duplicate { .. }), "got {err:?}");
    }

    #[test]
    fn scale_for_age_spans_scale_range() {
        let species = minimal("span");
        assert_eq!(species.scale_for_age(0.0), 1.0);
        assert_eq!(species.scale_for_age(10.0), 2.0);
        let mid = species.scale_for_age(5.0);
        assert!(mid > 1.0 && mid < 2.0, "mid-age scale {mid}");
    }

    #[test]
    fn age_saturates_at_max() {
        let species = minimal("old");
        assert_eq!(species.age_by_steps(9.5, 3), 10.0);
        assert_eq!(species.age_by_steps(2.0, 1), 3.0);
    }

    #[test]
    fn initial_seed_count_scales_with_area() {
        let mut species = minimal("dense");
        species.seed_density = 0.05;
        // A 10_000-unit tile holds one hundred 10 m x 10 m squares.
        assert_eq!(species.initial_seed_count(10_000.0), 5);
        assert_eq!(species.initial_seed_count(0.0), 0);
    }

    #[test]
    fn get_mut_bumps_change_counter() {
        let mut catalog = SpeciesCatalog::new(vec![minimal("tracked")]).unwrap();
        assert_eq!(catalog.change_counters()[0], 0);
        catalog.get_mut(SpeciesId(0)).unwrap().seed_density = 4.0;
        assert_eq!(catalog.change_counters()[0], 1);
        assert!(catalog.get_mut(SpeciesId(7)).is_none());
    }

    #[test]
    fn catalog_from_json_str_round_trip() {
        let raw = r#"{
            "species": [
                { "name": "pine", "collision_radius": 60.0, "grows_in_shade": false },
                { "name": "moss", "grows_in_shade": true }
            ]
        }"#;
        let catalog = SpeciesCatalog::from_json_str(raw).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.get(SpeciesId(0)).unwrap().collision_radius, 60.0);
        // Unspecified fields take the documented defaults.
        assert_eq!(catalog.get(SpeciesId(1)).unwrap().max_age, 10.0);
    }
}
