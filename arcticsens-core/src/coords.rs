//! Coordinate normalization
//!
//! Latitude and longitude reach the core in four shapes: as coordinates named
//! `latitude`/`longitude`, as plain data fields with those names, or either of those
//! under the short names `lat`/`lon`. [`normalize_latlon`] turns all four into
//! coordinates named `latitude`/`longitude`.
//!
//! [`validate_normalized`] is the gate every field passes before any reduction: it
//! rejects fields whose grid dimensions are not exactly `i`/`j` or which have no
//! latitude coordinate, instead of letting a reduction run over the wrong axes.

use crate::errors::{ArcticError, ArcticResult};
use crate::field::{GriddedField, I_DIM, J_DIM, LATITUDE, LONGITUDE};
use crate::FloatValue;
use log::debug;
use ndarray::{Array1, Array2, Ix1, Ix2};
use serde::{Deserialize, Serialize};

/// How latitude/longitude were found on a field
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum LatLonSource {
    /// Already a `latitude` coordinate
    Coordinate,
    /// A `latitude` data field, promoted to a coordinate
    PromotedDataField,
    /// A `lat` coordinate, renamed
    RenamedCoordinate,
    /// A `lat` data field, renamed and promoted
    RenamedDataField,
    /// No latitude information at all
    Absent,
}

/// Ensure `latitude`/`longitude` are coordinates, reporting which policy applied
pub fn normalize_latlon_tagged(mut field: GriddedField) -> (GriddedField, LatLonSource) {
    let source = if field.has_coord(LATITUDE) {
        LatLonSource::Coordinate
    } else if field.has_data_field(LATITUDE) {
        field.promote_to_coord(LATITUDE);
        field.promote_to_coord(LONGITUDE);
        LatLonSource::PromotedDataField
    } else if field.has_coord("lat") {
        field.rename_coord("lat", LATITUDE);
        field.rename_coord("lon", LONGITUDE);
        LatLonSource::RenamedCoordinate
    } else if field.has_data_field("lat") {
        field.rename_data_field("lat", LATITUDE);
        field.rename_data_field("lon", LONGITUDE);
        field.promote_to_coord(LATITUDE);
        field.promote_to_coord(LONGITUDE);
        LatLonSource::RenamedDataField
    } else {
        LatLonSource::Absent
    };
    debug!("{}: latitude/longitude {:?}", field.name(), source);
    (field, source)
}

/// Ensure `latitude`/`longitude` are coordinates
///
/// A field with no latitude information passes through unchanged; use
/// [`validate_normalized`] to reject it.
pub fn normalize_latlon(field: GriddedField) -> GriddedField {
    normalize_latlon_tagged(field).0
}

/// Check the post-normalization invariants of a field
///
/// * the non-time, non-member dimensions are exactly `i` and `j`
/// * `latitude` is a coordinate spanning only `i`/`j`
/// * `latitude` is not left behind as a plain data field
pub fn validate_normalized(field: &GriddedField) -> ArcticResult<()> {
    let spatial = field.spatial_dims();
    let canonical = spatial.len() == 2 && spatial.contains(&I_DIM) && spatial.contains(&J_DIM);
    if !canonical {
        return Err(ArcticError::ShapeMismatch(format!(
            "field '{}' has grid dimensions {:?}, expected exactly [\"i\", \"j\"]",
            field.name(),
            spatial
        )));
    }
    if field.has_data_field(LATITUDE) || field.has_data_field(LONGITUDE) {
        return Err(ArcticError::ShapeMismatch(format!(
            "field '{}' stores latitude/longitude as data, not coordinates",
            field.name()
        )));
    }
    LatitudeGrid::from_field(field)?;
    Ok(())
}

/// Which grid index a 1-D latitude runs along
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridIndex {
    I,
    J,
}

impl GridIndex {
    fn from_dim(dim: &str) -> Option<Self> {
        match dim {
            I_DIM => Some(GridIndex::I),
            J_DIM => Some(GridIndex::J),
            _ => None,
        }
    }
}

/// Latitude of every `(i, j)` cell, either 1-D (regular grid) or 2-D (curvilinear)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LatitudeGrid {
    /// One latitude per row along `axis`, constant along the other index
    Regular {
        axis: GridIndex,
        values: Array1<FloatValue>,
    },
    /// One latitude per cell, indexed `[i, j]`
    Curvilinear(Array2<FloatValue>),
}

impl LatitudeGrid {
    /// Read the `latitude` coordinate of a normalized field
    pub fn from_field(field: &GriddedField) -> ArcticResult<Self> {
        let lat = field.coord(LATITUDE).ok_or_else(|| ArcticError::MissingCoordinate {
            name: LATITUDE.to_string(),
        })?;
        let dims: Vec<&str> = lat.dims().iter().map(|d| d.as_str()).collect();
        let shape_err = |e: ndarray::ShapeError| ArcticError::ShapeMismatch(e.to_string());

        match dims.as_slice() {
            [dim] => {
                let axis = GridIndex::from_dim(dim).ok_or_else(|| {
                    ArcticError::ShapeMismatch(format!("latitude runs along '{dim}', not i or j"))
                })?;
                let values = lat.values().clone().into_dimensionality::<Ix1>().map_err(shape_err)?;
                Ok(LatitudeGrid::Regular { axis, values })
            }
            [I_DIM, J_DIM] => {
                let values = lat.values().clone().into_dimensionality::<Ix2>().map_err(shape_err)?;
                Ok(LatitudeGrid::Curvilinear(values))
            }
            [J_DIM, I_DIM] => {
                let values = lat.values().clone().into_dimensionality::<Ix2>().map_err(shape_err)?;
                Ok(LatitudeGrid::Curvilinear(values.reversed_axes()))
            }
            other => Err(ArcticError::ShapeMismatch(format!(
                "latitude has dimensions {other:?}, expected i and/or j"
            ))),
        }
    }

    pub fn is_regular(&self) -> bool {
        matches!(self, LatitudeGrid::Regular { .. })
    }

    /// Latitude of cell `(i, j)`
    pub fn at(&self, i: usize, j: usize) -> FloatValue {
        match self {
            LatitudeGrid::Regular {
                axis: GridIndex::I,
                values,
            } => values[i],
            LatitudeGrid::Regular {
                axis: GridIndex::J,
                values,
            } => values[j],
            LatitudeGrid::Curvilinear(values) => values[[i, j]],
        }
    }

    /// Map latitude values through `f`, keeping the layout
    pub fn map(&self, f: impl Fn(FloatValue) -> FloatValue) -> Self {
        match self {
            LatitudeGrid::Regular { axis, values } => LatitudeGrid::Regular {
                axis: *axis,
                values: values.mapv(f),
            },
            LatitudeGrid::Curvilinear(values) => LatitudeGrid::Curvilinear(values.mapv(f)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::LabeledArray;
    use ndarray::{array, ArrayD, IxDyn};

    fn base(dims: &[&str]) -> GriddedField {
        let data = LabeledArray::new(dims.to_vec(), ArrayD::zeros(IxDyn(&[2, 3, 4]))).unwrap();
        GriddedField::new("tas", data)
    }

    fn lat_1d() -> LabeledArray {
        LabeledArray::from_1d("i", array![70.0, 80.0, 90.0])
    }

    fn lon_1d() -> LabeledArray {
        LabeledArray::from_1d("j", array![0.0, 90.0, 180.0, 270.0])
    }

    #[test]
    fn existing_coordinate_is_noop() {
        let field = base(&["time", "i", "j"]).with_coord(LATITUDE, lat_1d()).unwrap();
        let (out, source) = normalize_latlon_tagged(field.clone());
        assert_eq!(source, LatLonSource::Coordinate);
        assert_eq!(out, field);
    }

    #[test]
    fn data_field_promoted() {
        let field = base(&["time", "i", "j"])
            .with_data_field(LATITUDE, lat_1d())
            .unwrap()
            .with_data_field(LONGITUDE, lon_1d())
            .unwrap();
        let (out, source) = normalize_latlon_tagged(field);
        assert_eq!(source, LatLonSource::PromotedDataField);
        assert!(out.has_coord(LATITUDE) && out.has_coord(LONGITUDE));
        assert!(!out.has_data_field(LATITUDE));
    }

    #[test]
    fn short_coordinate_renamed() {
        let field = base(&["time", "i", "j"])
            .with_coord("lat", lat_1d())
            .unwrap()
            .with_coord("lon", lon_1d())
            .unwrap();
        let (out, source) = normalize_latlon_tagged(field);
        assert_eq!(source, LatLonSource::RenamedCoordinate);
        assert!(out.has_coord(LATITUDE) && out.has_coord(LONGITUDE));
        assert!(!out.has_coord("lat"));
    }

    #[test]
    fn short_data_field_renamed_and_promoted() {
        let field = base(&["time", "i", "j"])
            .with_data_field("lat", lat_1d())
            .unwrap()
            .with_data_field("lon", lon_1d())
            .unwrap();
        let (out, source) = normalize_latlon_tagged(field);
        assert_eq!(source, LatLonSource::RenamedDataField);
        assert!(out.has_coord(LATITUDE));
        assert!(validate_normalized(&out).is_ok());
    }

    #[test]
    fn absent_latitude_rejected_by_validation() {
        let (out, source) = normalize_latlon_tagged(base(&["time", "i", "j"]));
        assert_eq!(source, LatLonSource::Absent);
        assert!(matches!(
            validate_normalized(&out),
            Err(ArcticError::MissingCoordinate { .. })
        ));
    }

    #[test]
    fn unnormalized_dims_rejected() {
        let field = base(&["time", "nlat", "nlon"]);
        assert!(matches!(
            validate_normalized(&field),
            Err(ArcticError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn latitude_grid_orientation() {
        let lat = LabeledArray::from_2d(["j", "i"], array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0], [10.0, 11.0, 12.0]])
            .unwrap();
        let field = base(&["time", "i", "j"]).with_coord(LATITUDE, lat).unwrap();
        let grid = LatitudeGrid::from_field(&field).unwrap();
        assert!(!grid.is_regular());
        // stored [j, i], read back as (i, j)
        assert_eq!(grid.at(2, 0), 3.0);
        assert_eq!(grid.at(0, 3), 10.0);

        let field = base(&["time", "i", "j"]).with_coord(LATITUDE, lat_1d()).unwrap();
        let grid = LatitudeGrid::from_field(&field).unwrap();
        assert!(grid.is_regular());
        assert_eq!(grid.at(1, 3), 80.0);
    }
}
