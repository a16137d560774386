//! Labeled gridded arrays
//!
//! A [`GriddedField`] is the in-memory form of one model's output for one variable: a
//! data array with named dimensions, named coordinates (latitude/longitude once
//! normalized), auxiliary data fields that travel with it, an optional time axis and
//! optional ensemble-member labels.
//!
//! Before normalization a field may carry whatever dimension names the model used
//! (`nlat`/`nlon`, `x`/`y`, ...). After [`crate::dims::normalize_dims`] and
//! [`crate::coords::normalize_latlon`] its spatial dimensions are exactly `i` and `j`
//! and latitude/longitude are coordinates.

use crate::errors::{ArcticError, ArcticResult};
use crate::time::TimeAxis;
use crate::FloatValue;
use ndarray::{Array1, Array2, ArrayD, Axis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TIME_DIM: &str = "time";
pub const MEMBER_DIM: &str = "member";
/// Member dimension name used by the catalogue before normalization
pub const RAW_MEMBER_DIM: &str = "member_id";
pub const I_DIM: &str = "i";
pub const J_DIM: &str = "j";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";

/// Whether a dimension name is one of the non-spatial axes
pub fn is_non_spatial(dim: &str) -> bool {
    dim == TIME_DIM || dim == MEMBER_DIM || dim == RAW_MEMBER_DIM
}

/// String attributes attached to arrays and fields (`units`, `table_id`, ...)
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.0.insert(key.to_string(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(|v| v.as_str())
    }

    pub fn units(&self) -> Option<&str> {
        self.get("units")
    }

    pub fn table_id(&self) -> Option<&str> {
        self.get("table_id")
    }

    pub fn calendar(&self) -> Option<&str> {
        self.get("calendar")
    }

    pub fn source_id(&self) -> Option<&str> {
        self.get("source_id")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// An n-dimensional array with one name per axis
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LabeledArray {
    dims: Vec<String>,
    values: ArrayD<FloatValue>,
    attrs: Attributes,
}

impl LabeledArray {
    pub fn new<S: Into<String>>(dims: Vec<S>, values: ArrayD<FloatValue>) -> ArcticResult<Self> {
        let dims: Vec<String> = dims.into_iter().map(Into::into).collect();
        if dims.len() != values.ndim() {
            return Err(ArcticError::ShapeMismatch(format!(
                "{} dimension names given for an array with {} axes",
                dims.len(),
                values.ndim()
            )));
        }
        for (idx, dim) in dims.iter().enumerate() {
            if dims[..idx].contains(dim) {
                return Err(ArcticError::ShapeMismatch(format!(
                    "dimension '{dim}' appears twice"
                )));
            }
        }
        Ok(Self {
            dims,
            values,
            attrs: Attributes::default(),
        })
    }

    pub fn from_1d(dim: &str, values: Array1<FloatValue>) -> Self {
        Self {
            dims: vec![dim.to_string()],
            values: values.into_dyn(),
            attrs: Attributes::default(),
        }
    }

    pub fn from_2d(dims: [&str; 2], values: Array2<FloatValue>) -> ArcticResult<Self> {
        Self::new(dims.to_vec(), values.into_dyn())
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn dims(&self) -> &[String] {
        &self.dims
    }

    pub fn values(&self) -> &ArrayD<FloatValue> {
        &self.values
    }

    pub fn into_values(self) -> ArrayD<FloatValue> {
        self.values
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    pub fn attrs_mut(&mut self) -> &mut Attributes {
        &mut self.attrs
    }

    pub fn axis_of(&self, dim: &str) -> Option<usize> {
        self.dims.iter().position(|d| d == dim)
    }

    pub fn size_of(&self, dim: &str) -> Option<usize> {
        self.axis_of(dim).map(|axis| self.values.shape()[axis])
    }

    pub fn has_dim(&self, dim: &str) -> bool {
        self.axis_of(dim).is_some()
    }

    fn rename_dim(&mut self, from: &str, to: &str) {
        if let Some(axis) = self.axis_of(from) {
            self.dims[axis] = to.to_string();
        }
    }

    /// Apply `f` elementwise, keeping dimensions and attributes
    pub fn map(&self, f: impl Fn(FloatValue) -> FloatValue) -> Self {
        Self {
            dims: self.dims.clone(),
            values: self.values.mapv(f),
            attrs: self.attrs.clone(),
        }
    }

    /// Largest non-null value, `None` if every value is null
    pub fn nan_max(&self) -> Option<FloatValue> {
        self.values
            .iter()
            .filter(|v| !v.is_nan())
            .fold(None, |acc: Option<FloatValue>, &v| {
                Some(acc.map_or(v, |a| a.max(v)))
            })
    }

    fn select(&self, dim: &str, indices: &[usize]) -> Self {
        match self.axis_of(dim) {
            Some(axis) => Self {
                dims: self.dims.clone(),
                values: self.values.select(Axis(axis), indices),
                attrs: self.attrs.clone(),
            },
            None => self.clone(),
        }
    }

    /// Take index 0 along every dimension not listed in `keep`
    pub fn first_slice(&self, keep: &[&str]) -> ArcticResult<Self> {
        let mut view = self.values.view();
        // Remove from the last axis so earlier axis numbers stay valid
        for axis in (0..self.dims.len()).rev() {
            if keep.contains(&self.dims[axis].as_str()) {
                continue;
            }
            if view.len_of(Axis(axis)) == 0 {
                return Err(ArcticError::ShapeMismatch(format!(
                    "dimension '{}' is empty",
                    self.dims[axis]
                )));
            }
            view = view.index_axis_move(Axis(axis), 0);
        }
        Ok(Self {
            dims: self
                .dims
                .iter()
                .filter(|d| keep.contains(&d.as_str()))
                .cloned()
                .collect(),
            values: view.to_owned(),
            attrs: self.attrs.clone(),
        })
    }
}

/// One model's output for one variable, with its coordinates and metadata
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GriddedField {
    name: String,
    data: LabeledArray,
    coords: BTreeMap<String, LabeledArray>,
    data_fields: BTreeMap<String, LabeledArray>,
    time: Option<TimeAxis>,
    members: Option<Vec<String>>,
    attrs: Attributes,
}

impl GriddedField {
    pub fn new(name: &str, data: LabeledArray) -> Self {
        Self {
            name: name.to_string(),
            data,
            coords: BTreeMap::new(),
            data_fields: BTreeMap::new(),
            time: None,
            members: None,
            attrs: Attributes::default(),
        }
    }

    fn check_dims(&self, name: &str, array: &LabeledArray) -> ArcticResult<()> {
        for (dim, &size) in array.dims().iter().zip(array.values().shape()) {
            match self.data.size_of(dim) {
                Some(expected) if expected == size => {}
                Some(expected) => {
                    return Err(ArcticError::ShapeMismatch(format!(
                        "'{name}' has {size} points along '{dim}', data has {expected}"
                    )))
                }
                None => {
                    return Err(ArcticError::ShapeMismatch(format!(
                        "'{name}' uses dimension '{dim}' which the data does not have"
                    )))
                }
            }
        }
        Ok(())
    }

    /// Attach a coordinate array
    pub fn with_coord(mut self, name: &str, array: LabeledArray) -> ArcticResult<Self> {
        self.check_dims(name, &array)?;
        self.coords.insert(name.to_string(), array);
        Ok(self)
    }

    /// Attach an auxiliary (non-coordinate) data array
    pub fn with_data_field(mut self, name: &str, array: LabeledArray) -> ArcticResult<Self> {
        self.check_dims(name, &array)?;
        self.data_fields.insert(name.to_string(), array);
        Ok(self)
    }

    pub fn with_time(mut self, time: TimeAxis) -> ArcticResult<Self> {
        match self.data.size_of(TIME_DIM) {
            Some(n) if n == time.len() => {
                self.time = Some(time);
                Ok(self)
            }
            Some(n) => Err(ArcticError::ShapeMismatch(format!(
                "time axis has {} values, data has {n} timesteps",
                time.len()
            ))),
            None => Err(ArcticError::ShapeMismatch(format!(
                "field '{}' has no '{TIME_DIM}' dimension",
                self.name
            ))),
        }
    }

    pub fn with_members<S: Into<String>>(mut self, labels: Vec<S>) -> ArcticResult<Self> {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        let dim = self.member_dim().ok_or_else(|| {
            ArcticError::ShapeMismatch(format!("field '{}' has no member dimension", self.name))
        })?;
        let n = self.data.size_of(dim).unwrap_or(0);
        if n != labels.len() {
            return Err(ArcticError::ShapeMismatch(format!(
                "{} member labels for {n} members",
                labels.len()
            )));
        }
        self.members = Some(labels);
        Ok(self)
    }

    pub fn with_attrs(mut self, attrs: Attributes) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &LabeledArray {
        &self.data
    }

    pub fn dims(&self) -> &[String] {
        self.data.dims()
    }

    /// Dimensions of the data and of every attached array
    pub fn all_dims(&self) -> Vec<String> {
        let mut dims: Vec<String> = self.data.dims().to_vec();
        for array in self.coords.values().chain(self.data_fields.values()) {
            for d in array.dims() {
                if !dims.contains(d) {
                    dims.push(d.clone());
                }
            }
        }
        dims
    }

    /// Data dimensions other than time and member
    pub fn spatial_dims(&self) -> Vec<&str> {
        self.data
            .dims()
            .iter()
            .map(|d| d.as_str())
            .filter(|d| !is_non_spatial(d))
            .collect()
    }

    pub fn coord(&self, name: &str) -> Option<&LabeledArray> {
        self.coords.get(name)
    }

    pub fn data_field(&self, name: &str) -> Option<&LabeledArray> {
        self.data_fields.get(name)
    }

    pub fn has_coord(&self, name: &str) -> bool {
        self.coords.contains_key(name)
    }

    pub fn has_data_field(&self, name: &str) -> bool {
        self.data_fields.contains_key(name)
    }

    pub fn time(&self) -> Option<&TimeAxis> {
        self.time.as_ref()
    }

    pub fn members(&self) -> Option<&[String]> {
        self.members.as_deref()
    }

    pub fn member_dim(&self) -> Option<&'static str> {
        if self.data.has_dim(MEMBER_DIM) {
            Some(MEMBER_DIM)
        } else if self.data.has_dim(RAW_MEMBER_DIM) {
            Some(RAW_MEMBER_DIM)
        } else {
            None
        }
    }

    pub fn attrs(&self) -> &Attributes {
        &self.attrs
    }

    /// Units of the data, falling back to the field-level attribute
    pub fn units(&self) -> Option<&str> {
        self.data.attrs().units().or_else(|| self.attrs.units())
    }

    pub fn table_id(&self) -> Option<&str> {
        self.attrs.table_id()
    }

    /// Rename dimensions everywhere they appear
    pub(crate) fn rename_dims(&mut self, renames: &[(&str, &str)]) {
        for (from, to) in renames {
            self.data.rename_dim(from, to);
            for array in self.coords.values_mut().chain(self.data_fields.values_mut()) {
                array.rename_dim(from, to);
            }
        }
    }

    pub(crate) fn rename_coord(&mut self, from: &str, to: &str) {
        if let Some(array) = self.coords.remove(from) {
            self.coords.insert(to.to_string(), array);
        }
    }

    pub(crate) fn rename_data_field(&mut self, from: &str, to: &str) {
        if let Some(array) = self.data_fields.remove(from) {
            self.data_fields.insert(to.to_string(), array);
        }
    }

    /// Move an auxiliary data array into the coordinates
    pub(crate) fn promote_to_coord(&mut self, name: &str) {
        if let Some(array) = self.data_fields.remove(name) {
            self.coords.insert(name.to_string(), array);
        }
    }

    /// New field with the same layout and coordinates but different data values
    pub fn derive(&self, name: &str, f: impl Fn(FloatValue) -> FloatValue) -> Self {
        let mut out = self.clone();
        out.name = name.to_string();
        out.data = self.data.map(f);
        out
    }

    /// New field combining this field's data elementwise with another field on the same grid
    pub fn zip_with(
        &self,
        other: &GriddedField,
        name: &str,
        f: impl Fn(FloatValue, FloatValue) -> FloatValue,
    ) -> ArcticResult<Self> {
        if self.data.dims() != other.data.dims()
            || self.data.values().shape() != other.data.values().shape()
        {
            return Err(ArcticError::ShapeMismatch(format!(
                "cannot combine '{}' {:?} with '{}' {:?}",
                self.name,
                self.data.dims(),
                other.name,
                other.data.dims()
            )));
        }
        let mut out = self.clone();
        out.name = name.to_string();
        let mut values = self.data.values().clone();
        values.zip_mut_with(other.data.values(), |a, &b| *a = f(*a, b));
        out.data.values = values;
        Ok(out)
    }

    /// New field with every value multiplied by the weight of its `(i, j)` cell
    pub fn scale_by_cell(&self, name: &str, weight: impl Fn(usize, usize) -> FloatValue) -> ArcticResult<Self> {
        let (i_axis, j_axis) = match (self.data.axis_of(I_DIM), self.data.axis_of(J_DIM)) {
            (Some(i), Some(j)) => (i, j),
            _ => {
                return Err(ArcticError::ShapeMismatch(format!(
                    "field '{}' has no i/j grid",
                    self.name
                )))
            }
        };
        let mut out = self.clone();
        out.name = name.to_string();
        for (idx, v) in out.data.values.indexed_iter_mut() {
            *v *= weight(idx[i_axis], idx[j_axis]);
        }
        Ok(out)
    }

    pub fn set_units(&mut self, units: &str) {
        self.data.attrs_mut().set("units", units);
    }

    /// Keep only the listed ensemble members, in the order given
    pub fn select_members(&self, labels: &[String]) -> ArcticResult<Self> {
        let (dim, available) = match (self.member_dim(), self.members.as_ref()) {
            (Some(dim), Some(available)) => (dim, available),
            _ => {
                return Err(ArcticError::ShapeMismatch(format!(
                    "field '{}' has no labelled member dimension",
                    self.name
                )))
            }
        };
        let indices = labels
            .iter()
            .map(|label| {
                available.iter().position(|m| m == label).ok_or_else(|| {
                    ArcticError::ShapeMismatch(format!(
                        "member '{label}' not present in field '{}'",
                        self.name
                    ))
                })
            })
            .collect::<ArcticResult<Vec<_>>>()?;

        let mut out = self.clone();
        out.data = self.data.select(dim, &indices);
        for array in out.coords.values_mut().chain(out.data_fields.values_mut()) {
            *array = array.select(dim, &indices);
        }
        out.members = Some(labels.to_vec());
        Ok(out)
    }
}
