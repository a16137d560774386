//! Dimension normalization
//!
//! Every model names its horizontal grid axes differently. This module maps the known
//! naming schemes onto the canonical index pair `i` (latitude-like) and `j`
//! (longitude-like), and renames the catalogue's `member_id` axis to `member`.
//!
//! | Raw dims              | Maps to                                 |
//! |-----------------------|-----------------------------------------|
//! | `x`, `y`              | `i`, `j` (or `j`, `i` for swapped models) |
//! | `ni`, `nj`            | `i`, `j`                                |
//! | `nlon`, `nlat`        | `j`, `i`                                |
//! | `longitude`, `latitude` | `j`, `i`                              |
//! | `lon`, `lat`          | `j`, `i`                                |
//!
//! Which models swap the `x`/`y` assignment is data, not code: see
//! [`DimensionOverrides`]. A field whose spatial dimensions match none of these
//! patterns and are not already `i`/`j` is rejected with
//! [`ArcticError::UnrecognizedDimensions`].

use crate::errors::{ArcticError, ArcticResult};
use crate::field::{GriddedField, I_DIM, J_DIM, MEMBER_DIM, RAW_MEMBER_DIM};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How a model's `x`/`y` dimensions map onto `i`/`j`
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DimOrder {
    /// `x` -> `i`, `y` -> `j`
    #[default]
    Standard,
    /// `x` -> `j`, `y` -> `i`
    Swapped,
}

/// Per-model dimension-order policy table
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DimensionOverrides {
    models: BTreeMap<String, DimOrder>,
}

impl Default for DimensionOverrides {
    /// Models known to store their curvilinear grid with `x` along latitude
    fn default() -> Self {
        Self::empty()
            .with("MIROC6", DimOrder::Swapped)
            .with("MRI-ESM2-0", DimOrder::Swapped)
    }
}

impl DimensionOverrides {
    pub fn empty() -> Self {
        Self {
            models: BTreeMap::new(),
        }
    }

    pub fn with(mut self, model: &str, order: DimOrder) -> Self {
        self.models.insert(model.to_string(), order);
        self
    }

    /// Merge `other` into this table, `other` winning on conflicts
    pub fn extend(&mut self, other: &DimensionOverrides) {
        for (model, order) in &other.models {
            self.models.insert(model.clone(), *order);
        }
    }

    pub fn order_for(&self, model: &str) -> DimOrder {
        self.models.get(model).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &DimOrder)> {
        self.models.iter()
    }
}

/// Which naming scheme a field was recognised as
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DimensionPattern {
    XY(DimOrder),
    NiNj,
    NlonNlat,
    LongitudeLatitude,
    LonLat,
    /// Already `i`/`j`
    Canonical,
}

impl DimensionPattern {
    /// `(raw, canonical)` renames for this pattern
    fn renames(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            DimensionPattern::XY(DimOrder::Standard) => &[("x", I_DIM), ("y", J_DIM)],
            DimensionPattern::XY(DimOrder::Swapped) => &[("x", J_DIM), ("y", I_DIM)],
            DimensionPattern::NiNj => &[("ni", I_DIM), ("nj", J_DIM)],
            DimensionPattern::NlonNlat => &[("nlon", J_DIM), ("nlat", I_DIM)],
            DimensionPattern::LongitudeLatitude => &[("longitude", J_DIM), ("latitude", I_DIM)],
            DimensionPattern::LonLat => &[("lon", J_DIM), ("lat", I_DIM)],
            DimensionPattern::Canonical => &[],
        }
    }
}

/// Identify the naming scheme used by `dims`, first match wins
pub fn detect_pattern(dims: &[String], model: &str, overrides: &DimensionOverrides) -> Option<DimensionPattern> {
    let has = |a: &str, b: &str| dims.iter().any(|d| d == a) && dims.iter().any(|d| d == b);

    if has("x", "y") {
        Some(DimensionPattern::XY(overrides.order_for(model)))
    } else if has("ni", "nj") {
        Some(DimensionPattern::NiNj)
    } else if has("nlon", "nlat") {
        Some(DimensionPattern::NlonNlat)
    } else if has("longitude", "latitude") {
        Some(DimensionPattern::LongitudeLatitude)
    } else if has("lon", "lat") {
        Some(DimensionPattern::LonLat)
    } else if has(I_DIM, J_DIM) {
        Some(DimensionPattern::Canonical)
    } else {
        None
    }
}

/// Rename a field's grid dimensions to `i`/`j` and its member dimension to `member`
///
/// Idempotent: a field that already uses `i`/`j` is returned unchanged.
pub fn normalize_dims(
    mut field: GriddedField,
    model: &str,
    overrides: &DimensionOverrides,
) -> ArcticResult<GriddedField> {
    let dims = field.all_dims();

    if dims.iter().any(|d| d == RAW_MEMBER_DIM) {
        if dims.iter().any(|d| d == MEMBER_DIM) {
            return Err(ArcticError::ShapeMismatch(format!(
                "field '{}' has both '{RAW_MEMBER_DIM}' and '{MEMBER_DIM}' dimensions",
                field.name()
            )));
        }
        field.rename_dims(&[(RAW_MEMBER_DIM, MEMBER_DIM)]);
    }

    let pattern = detect_pattern(&dims, model, overrides).ok_or_else(|| {
        ArcticError::UnrecognizedDimensions {
            model: model.to_string(),
            dims: dims.clone(),
        }
    })?;

    let renames = pattern.renames();
    for (raw, target) in renames {
        let target_taken = dims.iter().any(|d| d == target) && !renames.iter().any(|(r, _)| r == target);
        if target_taken {
            return Err(ArcticError::ShapeMismatch(format!(
                "cannot rename '{raw}' to '{target}' for model {model}: '{target}' already exists"
            )));
        }
    }
    debug!("{model}: {} dims {:?} matched {:?}", field.name(), dims, pattern);
    field.rename_dims(renames);

    Ok(field)
}
