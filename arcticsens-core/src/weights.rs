//! Area weighting
//!
//! Two kinds of weights are used when reducing a field over its grid:
//!
//! - **cos-latitude** weights for atmosphere fields on regular lat/lon grids, where a
//!   cell's area is proportional to the cosine of its latitude;
//! - **explicit cell areas** for ocean and sea-ice fields on irregular grids, taken from
//!   the model's `areacello` (or `areacella`) field and always held in km².
//!
//! ```rust
//! use arcticsens_core::weights::AreaUnit;
//!
//! let unit: AreaUnit = "m2".parse().unwrap();
//! assert_eq!(unit.to_km2_factor(), 1e-6);
//! ```

use crate::coords::{GridIndex, LatitudeGrid};
use crate::errors::{ArcticError, ArcticResult};
use crate::field::{GriddedField, I_DIM, J_DIM};
use crate::FloatValue;
use log::debug;
use ndarray::{Array1, Array2, Ix2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

/// Square metres to square kilometres
pub const M2_TO_KM2: FloatValue = 1e-6;

/// Units a cell-area field may be declared in
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AreaUnit {
    SquareMetres,
    SquareKilometres,
}

impl AreaUnit {
    pub fn to_km2_factor(&self) -> FloatValue {
        match self {
            AreaUnit::SquareMetres => M2_TO_KM2,
            AreaUnit::SquareKilometres => 1.0,
        }
    }
}

impl FromStr for AreaUnit {
    type Err = ArcticError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        match compact.as_str() {
            "m2" | "m^2" | "m**2" | "metre2" | "meter2" => Ok(AreaUnit::SquareMetres),
            "km2" | "km^2" | "km**2" => Ok(AreaUnit::SquareKilometres),
            _ => Err(ArcticError::UnknownUnits {
                quantity: "cell area".to_string(),
                units: s.to_string(),
            }),
        }
    }
}

/// Weight of every grid cell, broadcastable against `[.., i, j]` data
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum AreaWeights {
    /// One weight per latitude row along `axis`, constant along the other index
    Zonal {
        axis: GridIndex,
        values: Array1<FloatValue>,
    },
    /// One weight per cell, indexed `[i, j]`
    Cellwise(Array2<FloatValue>),
}

impl AreaWeights {
    /// Weight of cell `(i, j)`
    pub fn at(&self, i: usize, j: usize) -> FloatValue {
        match self {
            AreaWeights::Zonal {
                axis: GridIndex::I,
                values,
            } => values[i],
            AreaWeights::Zonal {
                axis: GridIndex::J,
                values,
            } => values[j],
            AreaWeights::Cellwise(values) => values[[i, j]],
        }
    }

    /// Check the weights fit an `ni` x `nj` grid
    pub fn check_shape(&self, ni: usize, nj: usize) -> ArcticResult<()> {
        let ok = match self {
            AreaWeights::Zonal {
                axis: GridIndex::I,
                values,
            } => values.len() == ni,
            AreaWeights::Zonal {
                axis: GridIndex::J,
                values,
            } => values.len() == nj,
            AreaWeights::Cellwise(values) => values.dim() == (ni, nj),
        };
        if ok {
            Ok(())
        } else {
            Err(ArcticError::ShapeMismatch(format!(
                "weights do not fit a {ni} x {nj} grid"
            )))
        }
    }

    /// Sum of the weights of all cells for which `keep(i, j)` holds
    ///
    /// Zonal weights do not vary along the longitude-like index, so when the latitude
    /// grid is regular along the same axis the row sum is scaled by the number of cells
    /// in each row rather than summed cell by cell.
    pub fn masked_total(
        &self,
        latitude: &LatitudeGrid,
        ni: usize,
        nj: usize,
        keep: impl Fn(FloatValue) -> bool,
    ) -> FloatValue {
        if let (
            AreaWeights::Zonal { axis, values },
            LatitudeGrid::Regular {
                axis: lat_axis,
                values: lats,
            },
        ) = (self, latitude)
        {
            if axis == lat_axis {
                let row_len = match axis {
                    GridIndex::I => nj,
                    GridIndex::J => ni,
                };
                let rows: FloatValue = values
                    .iter()
                    .zip(lats.iter())
                    .filter(|(_, &lat)| keep(lat))
                    .map(|(&w, _)| w)
                    .sum();
                return rows * row_len as FloatValue;
            }
        }

        let mut total = 0.0;
        for i in 0..ni {
            for j in 0..nj {
                if keep(latitude.at(i, j)) {
                    total += self.at(i, j);
                }
            }
        }
        total
    }
}

/// cos(latitude) weights from a normalized field's latitude coordinate
pub fn cos_latitude_weights(field: &GriddedField) -> ArcticResult<AreaWeights> {
    let weights = match LatitudeGrid::from_field(field)?.map(|lat| lat.to_radians().cos()) {
        LatitudeGrid::Regular { axis, values } => AreaWeights::Zonal { axis, values },
        LatitudeGrid::Curvilinear(values) => AreaWeights::Cellwise(values),
    };
    Ok(weights)
}

/// Physical area of every `(i, j)` cell in km²
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CellArea {
    values: Array2<FloatValue>,
}

impl CellArea {
    pub fn from_km2(values: Array2<FloatValue>) -> Self {
        Self { values }
    }

    /// Read a normalized cell-area field
    ///
    /// The declared units are converted to km². Areas replicated over time or members
    /// are assumed time-invariant and only the first slice is used.
    pub fn from_field(field: &GriddedField) -> ArcticResult<Self> {
        let unit: AreaUnit = field
            .units()
            .ok_or_else(|| ArcticError::UnknownUnits {
                quantity: format!("cell area '{}'", field.name()),
                units: String::new(),
            })?
            .parse()?;

        let data = field.data();
        if !(data.has_dim(I_DIM) && data.has_dim(J_DIM)) {
            return Err(ArcticError::ShapeMismatch(format!(
                "cell area '{}' has dimensions {:?}, expected i and j",
                field.name(),
                data.dims()
            )));
        }
        let slice = data.first_slice(&[I_DIM, J_DIM])?;
        let transposed = slice.dims()[0] == J_DIM;
        let mut values = slice
            .into_values()
            .into_dimensionality::<Ix2>()
            .map_err(|e| ArcticError::ShapeMismatch(e.to_string()))?;
        if transposed {
            values = values.reversed_axes();
        }
        let factor = unit.to_km2_factor();
        debug!("{}: cell area in {:?}, scaling by {factor}", field.name(), unit);
        Ok(Self {
            values: values.mapv(|v| v * factor),
        })
    }

    pub fn values(&self) -> &Array2<FloatValue> {
        &self.values
    }

    pub fn weights(&self) -> AreaWeights {
        AreaWeights::Cellwise(self.values.clone())
    }
}

/// Which cell-area variable applies to a variable's table
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AreaKind {
    /// `areacella`, for atmosphere tables (`Amon`, ...)
    Atmosphere,
    /// `areacello`, for ocean and sea-ice tables (`Omon`, `SImon`, ...)
    Ocean,
}

impl AreaKind {
    /// Classify by the first letter of a `table_id`
    pub fn for_table_id(table_id: &str) -> Option<Self> {
        match table_id.chars().next() {
            Some('A') => Some(AreaKind::Atmosphere),
            Some('S') | Some('O') => Some(AreaKind::Ocean),
            _ => None,
        }
    }

    pub fn variable_name(&self) -> &'static str {
        match self {
            AreaKind::Atmosphere => "areacella",
            AreaKind::Ocean => "areacello",
        }
    }
}

/// How a cell-area entry was matched to a model
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AreaMatch {
    Exact,
    /// Borrowed from a related model whose identifier starts with the requested one
    Prefix(String),
}

/// Cell-area fields by kind and model
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CellAreaTable {
    entries: BTreeMap<AreaKind, BTreeMap<String, GriddedField>>,
}

impl CellAreaTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, kind: AreaKind, model: &str, field: GriddedField) {
        self.entries
            .entry(kind)
            .or_default()
            .insert(model.to_string(), field);
    }

    pub fn with(mut self, kind: AreaKind, model: &str, field: GriddedField) -> Self {
        self.insert(kind, model, field);
        self
    }

    /// Find the cell-area field for `model`
    ///
    /// An exact identifier match wins; otherwise the first entry (in identifier order)
    /// whose identifier starts with `model` is used.
    pub fn find(&self, kind: AreaKind, model: &str) -> ArcticResult<(&GriddedField, AreaMatch)> {
        let missing = || ArcticError::MissingCellArea {
            model: model.to_string(),
        };
        let entries = self.entries.get(&kind).ok_or_else(missing)?;
        if let Some(field) = entries.get(model) {
            return Ok((field, AreaMatch::Exact));
        }
        entries
            .iter()
            .find(|(candidate, _)| candidate.starts_with(model))
            .map(|(candidate, field)| {
                debug!("{model}: using {} from {candidate}", kind.variable_name());
                (field, AreaMatch::Prefix(candidate.clone()))
            })
            .ok_or_else(missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Attributes, LabeledArray, LATITUDE};
    use approx::assert_relative_eq;
    use ndarray::{array, Array3};

    fn area_field(units: &str, values: Array2<FloatValue>, dims: [&str; 2]) -> GriddedField {
        let data = LabeledArray::from_2d(dims, values)
            .unwrap()
            .with_attrs(Attributes::new().with("units", units));
        GriddedField::new("areacello", data)
    }

    #[test]
    fn unit_parsing() {
        assert_eq!("m^2".parse::<AreaUnit>().unwrap(), AreaUnit::SquareMetres);
        assert_eq!("km2".parse::<AreaUnit>().unwrap(), AreaUnit::SquareKilometres);
        assert!(matches!(
            "acres".parse::<AreaUnit>(),
            Err(ArcticError::UnknownUnits { .. })
        ));
    }

    #[test]
    fn square_metres_converted_with_1e_minus_6() {
        let field = area_field("m2", array![[1e6, 2e6], [3e6, 4e6]], ["i", "j"]);
        let area = CellArea::from_field(&field).unwrap();
        assert_relative_eq!(area.values()[[1, 1]], 4.0);
        assert_relative_eq!(area.values()[[0, 1]], 2.0);
    }

    #[test]
    fn km2_kept_and_ji_transposed() {
        let field = area_field("km2", array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]], ["j", "i"]);
        let area = CellArea::from_field(&field).unwrap();
        assert_eq!(area.values().dim(), (3, 2));
        assert_eq!(area.values()[[2, 0]], 3.0);
    }

    #[test]
    fn replicated_area_uses_first_slice() {
        let values = Array3::from_shape_fn((3, 2, 2), |(t, _, _)| (t + 1) as f64 * 1e6);
        let data = LabeledArray::new(vec!["time", "i", "j"], values.into_dyn())
            .unwrap()
            .with_attrs(Attributes::new().with("units", "m2"));
        let area = CellArea::from_field(&GriddedField::new("areacello", data)).unwrap();
        assert_eq!(area.values(), &Array2::from_elem((2, 2), 1.0));
    }

    #[test]
    fn missing_units_rejected() {
        let data = LabeledArray::from_2d(["i", "j"], Array2::ones((2, 2))).unwrap();
        let result = CellArea::from_field(&GriddedField::new("areacello", data));
        assert!(matches!(result, Err(ArcticError::UnknownUnits { .. })));
    }

    #[test]
    fn cos_latitude_regular_grid() {
        let data = LabeledArray::new(vec!["i", "j"], Array2::<f64>::zeros((3, 4)).into_dyn()).unwrap();
        let field = GriddedField::new("tas", data)
            .with_coord(LATITUDE, LabeledArray::from_1d("i", array![0.0, 60.0, 90.0]))
            .unwrap();
        let weights = cos_latitude_weights(&field).unwrap();
        assert!(matches!(weights, AreaWeights::Zonal { axis: GridIndex::I, .. }));
        assert_relative_eq!(weights.at(1, 3), 0.5, epsilon = 1e-12);
        assert_relative_eq!(weights.at(2, 0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn zonal_total_scaled_by_row_length() {
        let latitude = LatitudeGrid::Regular {
            axis: GridIndex::I,
            values: array![60.0, 70.0, 80.0],
        };
        let weights = AreaWeights::Zonal {
            axis: GridIndex::I,
            values: array![1.0, 2.0, 3.0],
        };
        // rows at 70 and 80 kept, 4 longitudes each
        assert_relative_eq!(weights.masked_total(&latitude, 3, 4, |lat| lat >= 70.0), 20.0);

        let cellwise = AreaWeights::Cellwise(Array2::from_shape_fn((3, 4), |(i, _)| (i + 1) as f64));
        assert_relative_eq!(cellwise.masked_total(&latitude, 3, 4, |lat| lat >= 70.0), 20.0);
    }

    #[test]
    fn zonal_total_along_j_scaled_by_column_length() {
        let latitude = LatitudeGrid::Regular {
            axis: GridIndex::J,
            values: array![60.0, 70.0, 80.0, 90.0],
        };
        let weights = AreaWeights::Zonal {
            axis: GridIndex::J,
            values: array![1.0, 2.0, 3.0, 4.0],
        };
        // columns at 70, 80 and 90 kept, 5 cells each along i
        assert_relative_eq!(weights.masked_total(&latitude, 5, 4, |lat| lat >= 70.0), 45.0);

        let cellwise = AreaWeights::Cellwise(Array2::from_shape_fn((5, 4), |(_, j)| (j + 1) as f64));
        assert_relative_eq!(cellwise.masked_total(&latitude, 5, 4, |lat| lat >= 70.0), 45.0);
        assert_eq!(weights.at(3, 2), 3.0);
        assert!(weights.check_shape(5, 4).is_ok());
        assert!(weights.check_shape(4, 5).is_err());
    }

    #[test]
    fn table_kind_classification() {
        assert_eq!(AreaKind::for_table_id("Amon"), Some(AreaKind::Atmosphere));
        assert_eq!(AreaKind::for_table_id("SImon"), Some(AreaKind::Ocean));
        assert_eq!(AreaKind::for_table_id("Ofx"), Some(AreaKind::Ocean));
        assert_eq!(AreaKind::for_table_id("fx"), None);
    }

    #[test]
    fn area_lookup_exact_then_prefix() {
        let area = area_field("m2", Array2::ones((2, 2)), ["i", "j"]);
        let table = CellAreaTable::new()
            .with(AreaKind::Ocean, "CESM2", area.clone())
            .with(AreaKind::Ocean, "EC-Earth3-Veg", area.clone());

        let (_, how) = table.find(AreaKind::Ocean, "CESM2").unwrap();
        assert_eq!(how, AreaMatch::Exact);
        let (_, how) = table.find(AreaKind::Ocean, "EC-Earth3").unwrap();
        assert_eq!(how, AreaMatch::Prefix("EC-Earth3-Veg".to_string()));
        assert!(matches!(
            table.find(AreaKind::Ocean, "NorESM2-LM"),
            Err(ArcticError::MissingCellArea { .. })
        ));
        assert!(table.find(AreaKind::Atmosphere, "CESM2").is_err());
    }
}
