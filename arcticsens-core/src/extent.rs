//! Sea-ice extent, area and volume
//!
//! Models report sea-ice concentration either as a percentage (0-100) or as a fraction
//! (0-1), frequently without saying which. The convention is guessed from the largest
//! value in the field: anything above 2.0 is taken to be a percentage. This is a
//! heuristic, so every function that relies on it returns the decision it made
//! alongside its result (see [`Detected`]), and fields whose maximum sits close to the
//! 2.0 boundary are flagged as ambiguous.

use crate::errors::{ArcticError, ArcticResult};
use crate::field::{GriddedField, I_DIM, J_DIM};
use crate::index::ArcticIndex;
use crate::reduce::{arctic_mean, arctic_reduce, ReductionOp, RegionMask};
use crate::weights::CellArea;
use crate::FloatValue;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Maximum values above this are percentages
pub const PERCENT_THRESHOLD: FloatValue = 2.0;
/// Maxima within this distance of [`PERCENT_THRESHOLD`] are ambiguous
pub const AMBIGUITY_MARGIN: FloatValue = 0.5;

const KM_PER_M: FloatValue = 1e-3;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConcentrationUnit {
    Percent,
    Fraction,
}

/// Outcome of the percent/fraction heuristic
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct UnitDetection {
    pub unit: ConcentrationUnit,
    /// Largest non-null value, `None` for an all-null field
    pub max_value: Option<FloatValue>,
    pub ambiguous: bool,
}

/// A result together with the unit decision that produced it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detected<T> {
    pub value: T,
    pub detection: UnitDetection,
}

impl<T> Detected<T> {
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Detected<U> {
        Detected {
            value: f(self.value),
            detection: self.detection,
        }
    }
}

/// Guess whether a concentration field is in percent or fraction
pub fn detect_concentration_unit(siconc: &GriddedField) -> UnitDetection {
    let max_value = siconc.data().nan_max();
    let detection = match max_value {
        Some(max) => UnitDetection {
            unit: if max > PERCENT_THRESHOLD {
                ConcentrationUnit::Percent
            } else {
                ConcentrationUnit::Fraction
            },
            max_value,
            ambiguous: (max - PERCENT_THRESHOLD).abs() <= AMBIGUITY_MARGIN,
        },
        None => UnitDetection {
            unit: ConcentrationUnit::Fraction,
            max_value: None,
            ambiguous: true,
        },
    };
    if detection.ambiguous {
        warn!(
            "{}: concentration units ambiguous (max {:?}), assuming {:?}",
            siconc.name(),
            detection.max_value,
            detection.unit
        );
    } else {
        debug!("{}: concentration detected as {:?}", siconc.name(), detection.unit);
    }
    detection
}

/// Concentration as a fraction in [0, 1]
pub fn to_fraction(siconc: &GriddedField) -> Detected<GriddedField> {
    let detection = detect_concentration_unit(siconc);
    let mut value = match detection.unit {
        ConcentrationUnit::Percent => siconc.derive(siconc.name(), |v| v / 100.0),
        ConcentrationUnit::Fraction => siconc.clone(),
    };
    value.set_units("1");
    Detected { value, detection }
}

/// Binary extent indicator: 1 where concentration exceeds the cutoff, 0 elsewhere
///
/// Null cells (land, missing data) stay null.
pub fn siextent(siconc: &GriddedField, cutoff_percent: FloatValue) -> ArcticResult<Detected<GriddedField>> {
    if !(cutoff_percent > 0.0 && cutoff_percent <= 100.0) {
        return Err(ArcticError::InvalidConfig(format!(
            "cutoff_percent must be in (0, 100], got {cutoff_percent}"
        )));
    }
    let cutoff = cutoff_percent / 100.0;
    Ok(to_fraction(siconc).map(|fraction| {
        let mut extent = fraction.derive("siextent", |c| {
            if c.is_nan() {
                c
            } else if c > cutoff {
                1.0
            } else {
                0.0
            }
        });
        extent.set_units("1");
        extent
    }))
}

/// Total northern-hemisphere extent in km² from an extent indicator
pub fn total_nh_extent(extent: &GriddedField, area: &CellArea) -> ArcticResult<ArcticIndex> {
    Ok(arctic_reduce(extent, &area.weights(), RegionMask::NORTHERN_HEMISPHERE, ReductionOp::Sum)?
        .renamed("sie_tot_arc", "km2"))
}

/// Total northern-hemisphere sea-ice area (concentration x cell area) in km²
pub fn total_nh_area(siconc: &GriddedField, area: &CellArea) -> ArcticResult<Detected<ArcticIndex>> {
    let Detected { value, detection } = to_fraction(siconc);
    let index = arctic_reduce(&value, &area.weights(), RegionMask::NORTHERN_HEMISPHERE, ReductionOp::Sum)?
        .renamed("sia_tot_arc", "km2");
    Ok(Detected {
        value: index,
        detection,
    })
}

/// Arctic-mean sea-ice volume per cell in km³
///
/// Volume is thickness (m) x fractional concentration x cell area (km²).
pub fn sea_ice_volume(
    sithick: &GriddedField,
    siconc: &GriddedField,
    area: &CellArea,
    min_lat: FloatValue,
) -> ArcticResult<Detected<ArcticIndex>> {
    let Detected { value: fraction, detection } = to_fraction(siconc);
    let (ni, nj) = area.values().dim();
    let grid = (sithick.data().size_of(I_DIM), sithick.data().size_of(J_DIM));
    if grid != (Some(ni), Some(nj)) {
        return Err(ArcticError::ShapeMismatch(format!(
            "cell area is {ni} x {nj}, '{}' grid is {:?}",
            sithick.name(),
            grid
        )));
    }
    let areas = area.values();
    let mut volume = sithick
        .zip_with(&fraction, "sivolume", |thick, conc| thick * KM_PER_M * conc)?
        .scale_by_cell("sivolume", |i, j| areas[[i, j]])?;
    volume.set_units("km3");
    let index = arctic_mean(&volume, min_lat)?.renamed("sivol_arc_mean", "km3");
    Ok(Detected { value: index, detection })
}
