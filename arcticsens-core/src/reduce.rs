//! Arctic reductions
//!
//! Collapse the `i`/`j` grid of a normalized field into an [`ArcticIndex`], keeping its
//! `member` and `time` dimensions. Cells outside the latitude mask are ignored, as are
//! null data values. A weighted mean divides by the total weight of the masked region.

use crate::coords::{validate_normalized, LatitudeGrid};
use crate::errors::{ArcticError, ArcticResult};
use crate::field::{GriddedField, I_DIM, J_DIM, MEMBER_DIM, TIME_DIM};
use crate::index::ArcticIndex;
use crate::weights::{cos_latitude_weights, AreaWeights};
use crate::FloatValue;
use log::debug;
use ndarray::{Array2, Array4, Axis};
use serde::{Deserialize, Serialize};

/// How weighted cell values are combined
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReductionOp {
    Mean,
    Sum,
}

impl ReductionOp {
    fn suffix(&self) -> &'static str {
        match self {
            ReductionOp::Mean => "mean",
            ReductionOp::Sum => "sum",
        }
    }
}

/// Cells retained by a reduction, by latitude
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum RegionMask {
    /// `latitude >= min_lat`
    AtOrNorthOf(FloatValue),
    /// `latitude > min_lat`
    NorthOf(FloatValue),
}

impl RegionMask {
    /// Northern hemisphere, equator excluded
    pub const NORTHERN_HEMISPHERE: RegionMask = RegionMask::NorthOf(0.0);

    pub fn contains(&self, latitude: FloatValue) -> bool {
        match *self {
            RegionMask::AtOrNorthOf(min_lat) => latitude >= min_lat,
            RegionMask::NorthOf(min_lat) => latitude > min_lat,
        }
    }

    pub fn min_lat(&self) -> FloatValue {
        match *self {
            RegionMask::AtOrNorthOf(min_lat) | RegionMask::NorthOf(min_lat) => min_lat,
        }
    }
}

/// Field data rearranged as `[member, time, i, j]`, with one member row if memberless
fn member_time_grid(field: &GriddedField) -> ArcticResult<Array4<FloatValue>> {
    let data = field.data();
    for dim in data.dims() {
        if ![MEMBER_DIM, TIME_DIM, I_DIM, J_DIM].contains(&dim.as_str()) {
            return Err(ArcticError::ShapeMismatch(format!(
                "cannot reduce '{}' over dimension '{dim}'",
                field.name()
            )));
        }
    }
    let axis = |dim: &str| {
        data.axis_of(dim).ok_or_else(|| ArcticError::MissingCoordinate {
            name: dim.to_string(),
        })
    };
    let mut order = Vec::with_capacity(4);
    if let Some(member_axis) = data.axis_of(MEMBER_DIM) {
        order.push(member_axis);
    }
    order.push(axis(TIME_DIM)?);
    order.push(axis(I_DIM)?);
    order.push(axis(J_DIM)?);

    let shape = data.values().shape();
    let n_member = data.size_of(MEMBER_DIM).unwrap_or(1);
    let dim = (n_member, shape[order[order.len() - 3]], shape[order[order.len() - 2]], shape[order[order.len() - 1]]);

    // iteration over the permuted view is in logical (row-major) order
    let permuted = data.values().view().permuted_axes(order);
    Array4::from_shape_vec(dim, permuted.iter().copied().collect())
        .map_err(|e| ArcticError::ShapeMismatch(e.to_string()))
}

/// Area-weighted reduction of a normalized field over the masked region
///
/// The result is named `<field>_arc_mean` or `<field>_arc_sum`. A mean keeps the field's
/// units; a sum is in field units times weight units, which only the caller knows, so
/// it is labelled with the field units and callers rename it.
pub fn arctic_reduce(
    field: &GriddedField,
    weights: &AreaWeights,
    mask: RegionMask,
    op: ReductionOp,
) -> ArcticResult<ArcticIndex> {
    validate_normalized(field)?;
    let time = field
        .time()
        .ok_or_else(|| ArcticError::MissingCoordinate {
            name: TIME_DIM.to_string(),
        })?
        .clone();
    let members = match (field.data().has_dim(MEMBER_DIM), field.members()) {
        (false, _) => None,
        (true, Some(labels)) => Some(labels.to_vec()),
        (true, None) => {
            return Err(ArcticError::ShapeMismatch(format!(
                "field '{}' has a member dimension without labels",
                field.name()
            )))
        }
    };

    let grid = member_time_grid(field)?;
    let (n_member, n_time, ni, nj) = grid.dim();
    weights.check_shape(ni, nj)?;
    let latitude = LatitudeGrid::from_field(field)?;

    let cells: Vec<(usize, usize, FloatValue)> = (0..ni)
        .flat_map(|i| (0..nj).map(move |j| (i, j)))
        .filter(|&(i, j)| mask.contains(latitude.at(i, j)))
        .map(|(i, j)| (i, j, weights.at(i, j)))
        .collect();
    if cells.is_empty() {
        return Err(ArcticError::EmptyRegion {
            min_lat: mask.min_lat(),
        });
    }
    let total_weight = weights.masked_total(&latitude, ni, nj, |lat| mask.contains(lat));
    debug!(
        "{}: {:?} over {} of {} cells, total weight {total_weight}",
        field.name(),
        op,
        cells.len(),
        ni * nj
    );

    let mut values = Array2::from_elem((n_member, n_time), FloatValue::NAN);
    for (m, member_block) in grid.axis_iter(Axis(0)).enumerate() {
        for (t, step) in member_block.axis_iter(Axis(0)).enumerate() {
            let mut acc = 0.0;
            let mut valid = 0usize;
            for &(i, j, w) in &cells {
                let v = step[[i, j]];
                if !v.is_nan() {
                    acc += v * w;
                    valid += 1;
                }
            }
            if valid > 0 {
                values[[m, t]] = match op {
                    ReductionOp::Sum => acc,
                    ReductionOp::Mean => acc / total_weight,
                };
            }
        }
    }

    let name = format!("{}_arc_{}", field.name(), op.suffix());
    let units = field.units().unwrap_or("");
    ArcticIndex::new(&name, values, time, members, units)
}

/// cos-latitude weighted mean over cells at or north of `min_lat`
pub fn arctic_mean(field: &GriddedField, min_lat: FloatValue) -> ArcticResult<ArcticIndex> {
    validate_normalized(field)?;
    let weights = cos_latitude_weights(field)?;
    arctic_reduce(field, &weights, RegionMask::AtOrNorthOf(min_lat), ReductionOp::Mean)
}
