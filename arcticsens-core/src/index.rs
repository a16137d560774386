//! Arctic-scale index time series
//!
//! An [`ArcticIndex`] is what the reductions produce: one scalar per timestep (and per
//! ensemble member when the source field had members), with explicit units.

use crate::errors::{ArcticError, ArcticResult};
use crate::time::TimeAxis;
use crate::FloatValue;
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// A single time series borrowed from an index, with its time coordinate
#[derive(Clone, Copy, Debug)]
pub struct Series<'a> {
    pub values: ArrayView1<'a, FloatValue>,
    pub time: &'a TimeAxis,
}

/// A derived Arctic-scale time series, optionally per ensemble member
///
/// Values are stored `[member, time]`. An index without members has a single row.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArcticIndex {
    name: String,
    values: Array2<FloatValue>,
    time: TimeAxis,
    members: Option<Vec<String>>,
    units: String,
}

impl ArcticIndex {
    pub fn new(
        name: &str,
        values: Array2<FloatValue>,
        time: TimeAxis,
        members: Option<Vec<String>>,
        units: &str,
    ) -> ArcticResult<Self> {
        if values.ncols() != time.len() {
            return Err(ArcticError::ShapeMismatch(format!(
                "index '{name}' has {} timesteps but the time axis has {}",
                values.ncols(),
                time.len()
            )));
        }
        let expected_rows = members.as_ref().map_or(1, |m| m.len());
        if values.nrows() != expected_rows {
            return Err(ArcticError::ShapeMismatch(format!(
                "index '{name}' has {} rows for {expected_rows} members",
                values.nrows()
            )));
        }
        Ok(Self {
            name: name.to_string(),
            values,
            time,
            members,
            units: units.to_string(),
        })
    }

    /// Index with a single series and no member dimension
    pub fn from_series(name: &str, values: Vec<FloatValue>, time: TimeAxis, units: &str) -> ArcticResult<Self> {
        let n = values.len();
        let values = Array2::from_shape_vec((1, n), values)
            .map_err(|e| ArcticError::ShapeMismatch(e.to_string()))?;
        Self::new(name, values, time, None, units)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn time(&self) -> &TimeAxis {
        &self.time
    }

    pub fn values(&self) -> &Array2<FloatValue> {
        &self.values
    }

    pub fn members(&self) -> Option<&[String]> {
        self.members.as_deref()
    }

    /// Number of series (1 when there is no member dimension)
    pub fn n_series(&self) -> usize {
        self.values.nrows()
    }

    pub fn series(&self, row: usize) -> Series<'_> {
        Series {
            values: self.values.index_axis(Axis(0), row),
            time: &self.time,
        }
    }

    /// Series of the named member
    pub fn member(&self, label: &str) -> ArcticResult<Series<'_>> {
        let row = self
            .members
            .as_ref()
            .and_then(|m| m.iter().position(|l| l == label))
            .ok_or_else(|| {
                ArcticError::ShapeMismatch(format!("index '{}' has no member '{label}'", self.name))
            })?;
        Ok(self.series(row))
    }

    /// Each series with its member label
    pub fn iter_series(&self) -> impl Iterator<Item = (Option<&str>, Series<'_>)> {
        (0..self.n_series()).map(move |row| {
            let label = self.members.as_ref().map(|m| m[row].as_str());
            (label, self.series(row))
        })
    }

    pub fn renamed(mut self, name: &str, units: &str) -> Self {
        self.name = name.to_string();
        self.units = units.to_string();
        self
    }

    /// Same index under a new name and units, with values replaced
    pub fn with_values(&self, name: &str, values: Array2<FloatValue>, units: &str) -> ArcticResult<Self> {
        Self::new(name, values, self.time.clone(), self.members.clone(), units)
    }

    pub fn select_members(&self, labels: &[String]) -> ArcticResult<Self> {
        let rows = labels
            .iter()
            .map(|label| {
                self.members
                    .as_ref()
                    .and_then(|m| m.iter().position(|l| l == label))
                    .ok_or_else(|| {
                        ArcticError::ShapeMismatch(format!(
                            "index '{}' has no member '{label}'",
                            self.name
                        ))
                    })
            })
            .collect::<ArcticResult<Vec<_>>>()?;
        Self::new(
            &self.name,
            self.values.select(Axis(0), &rows),
            self.time.clone(),
            Some(labels.to_vec()),
            &self.units,
        )
    }
}
