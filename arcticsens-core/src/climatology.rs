//! Monthly climatology and anomalies
//!
//! Timesteps are grouped by the calendar month read from the index's time axis, so
//! series that start mid-year or skip months are handled correctly. Null values are
//! ignored when averaging; a calendar month with no valid values has a null climatology.

use crate::errors::{ArcticError, ArcticResult};
use crate::index::ArcticIndex;
use crate::time::Month;
use crate::FloatValue;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// One value per calendar month, per series
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Climatology {
    name: String,
    /// `[series, month]`, January first
    values: Array2<FloatValue>,
    members: Option<Vec<String>>,
    units: String,
}

impl Climatology {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn units(&self) -> &str {
        &self.units
    }

    pub fn values(&self) -> &Array2<FloatValue> {
        &self.values
    }

    pub fn members(&self) -> Option<&[String]> {
        self.members.as_deref()
    }

    pub fn value(&self, row: usize, month: Month) -> FloatValue {
        self.values[[row, month.index0()]]
    }
}

/// Climatology, anomaly and monthly standard deviation of one index
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Decomposition {
    pub climatology: Climatology,
    pub anomaly: ArcticIndex,
    pub std: Climatology,
}

fn monthly_stat(
    index: &ArcticIndex,
    suffix: &str,
    stat: impl Fn(&[FloatValue]) -> FloatValue,
) -> Climatology {
    let month_indices: Vec<Vec<usize>> = Month::all().map(|m| index.time().indices_for_month(m)).collect();
    let mut values = Array2::from_elem((index.n_series(), 12), FloatValue::NAN);
    for (row, (_, series)) in index.iter_series().enumerate() {
        for (month, indices) in month_indices.iter().enumerate() {
            let samples = valid_samples(series.values, indices);
            if !samples.is_empty() {
                values[[row, month]] = stat(&samples);
            }
        }
    }
    Climatology {
        name: format!("{}_{suffix}", index.name()),
        values,
        members: index.members().map(|m| m.to_vec()),
        units: index.units().to_string(),
    }
}

fn valid_samples(values: ArrayView1<FloatValue>, indices: &[usize]) -> Vec<FloatValue> {
    indices.iter().map(|&t| values[t]).filter(|v| !v.is_nan()).collect()
}

fn mean(samples: &[FloatValue]) -> FloatValue {
    samples.iter().sum::<FloatValue>() / samples.len() as FloatValue
}

/// Mean of every calendar month, named `<index>_clim`
pub fn climatology(index: &ArcticIndex) -> Climatology {
    monthly_stat(index, "clim", mean)
}

/// Population standard deviation of every calendar month, named `<index>_std`
pub fn monthly_std(index: &ArcticIndex) -> Climatology {
    monthly_stat(index, "std", |samples| {
        let mu = mean(samples);
        let var = samples.iter().map(|v| (v - mu).powi(2)).sum::<FloatValue>() / samples.len() as FloatValue;
        var.sqrt()
    })
}

/// Deviation of every timestep from its month's climatology, named `<index>_anom`
pub fn anomaly(index: &ArcticIndex, clim: &Climatology) -> ArcticResult<ArcticIndex> {
    if clim.values.nrows() != index.n_series() || clim.members() != index.members() {
        return Err(ArcticError::ShapeMismatch(format!(
            "climatology '{}' does not match the series of '{}'",
            clim.name,
            index.name()
        )));
    }
    let months = index.time().months();
    let mut values = index.values().clone();
    for ((row, t), v) in values.indexed_iter_mut() {
        *v -= clim.value(row, months[t]);
    }
    index.with_values(&format!("{}_anom", index.name()), values, index.units())
}

/// Split an index into climatology, anomaly and monthly standard deviation
pub fn decompose(index: &ArcticIndex) -> ArcticResult<Decomposition> {
    let climatology = climatology(index);
    let anomaly = anomaly(index, &climatology)?;
    Ok(Decomposition {
        std: monthly_std(index),
        climatology,
        anomaly,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::TimeAxis;
    use approx::assert_relative_eq;

    fn index(start_month: u32, values: Vec<f64>) -> ArcticIndex {
        let n = values.len();
        let time = TimeAxis::monthly(2000, Month::new(start_month).unwrap(), n, None).unwrap();
        ArcticIndex::from_series("tas_arc_mean", values, time, "K").unwrap()
    }

    #[test]
    fn climatology_by_calendar_month() {
        // two years of a month-number signal plus a yearly offset
        let values: Vec<f64> = (0..24).map(|t| (t % 12) as f64 + if t >= 12 { 10.0 } else { 0.0 }).collect();
        let clim = climatology(&index(1, values));
        assert_eq!(clim.name(), "tas_arc_mean_clim");
        assert_relative_eq!(clim.value(0, Month::new(1).unwrap()), 5.0);
        assert_relative_eq!(clim.value(0, Month::new(12).unwrap()), 16.0);

        let std = monthly_std(&index(1, (0..24).map(|t| if t >= 12 { 10.0 } else { 0.0 }).collect()));
        assert_relative_eq!(std.value(0, Month::new(3).unwrap()), 5.0);
    }

    #[test]
    fn month_read_from_time_axis() {
        // starts in July: first value is a July value
        let clim = climatology(&index(7, vec![1.0, 2.0, 3.0]));
        assert_relative_eq!(clim.value(0, Month::new(7).unwrap()), 1.0);
        assert_relative_eq!(clim.value(0, Month::new(9).unwrap()), 3.0);
        assert!(clim.value(0, Month::new(1).unwrap()).is_nan());
    }

    #[test]
    fn nulls_ignored() {
        let values = vec![1.0, f64::NAN, 3.0];
        let time = TimeAxis::new(
            (0..3)
                .map(|y| *TimeAxis::monthly(2000 + y, Month::new(9).unwrap(), 1, None).unwrap().get(0).unwrap())
                .collect(),
        )
        .unwrap();
        let index = ArcticIndex::from_series("x", values, time, "K").unwrap();
        let result = decompose(&index).unwrap();
        assert_relative_eq!(result.climatology.value(0, Month::new(9).unwrap()), 2.0);
        assert!(result.anomaly.values()[[0, 1]].is_nan());
        assert_relative_eq!(result.anomaly.values()[[0, 2]], 1.0);
        assert_eq!(result.anomaly.name(), "x_anom");
        assert_eq!(result.std.name(), "x_std");
    }

    #[test]
    fn anomaly_rejects_other_members() {
        let clim = climatology(&index(1, vec![1.0; 12]));
        let time = TimeAxis::monthly(2000, Month::new(1).unwrap(), 12, None).unwrap();
        let two = ArcticIndex::new(
            "x",
            Array2::zeros((2, 12)),
            time,
            Some(vec!["a".into(), "b".into()]),
            "K",
        )
        .unwrap();
        assert!(anomaly(&two, &clim).is_err());
    }
}
