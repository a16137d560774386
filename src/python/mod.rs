//! Python bindings for the array-level engines
//!
//! These work on bare numpy arrays so they can be called from xarray-based scripts:
//! the caller passes values, latitude and calendar information explicitly.

use arcticsens_core::climatology::decompose as decompose_index;
use arcticsens_core::errors::ArcticError;
use arcticsens_core::extent::{siextent as classify_extent, ConcentrationUnit};
use arcticsens_core::field::{GriddedField, LabeledArray, LATITUDE};
use arcticsens_core::index::ArcticIndex;
use arcticsens_core::reduce::arctic_mean as reduce_arctic_mean;
use arcticsens_core::regression::regress as regress_series;
use arcticsens_core::time::{Month, TimeAxis};
use arcticsens_core::FloatValue;
use ndarray::{Array2, Ix2};
use numpy::{PyArray1, PyArrayDyn, PyReadonlyArray1, PyReadonlyArray3, PyReadonlyArrayDyn, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use std::collections::HashMap;

fn to_py_err(err: ArcticError) -> PyErr {
    PyValueError::new_err(err.to_string())
}

/// Binary sea-ice extent indicator
///
/// Returns the indicator array (same shape as `conc`, nulls preserved) and the
/// detected concentration unit, `"percent"` or `"fraction"`.
#[pyfunction]
fn siextent<'py>(
    py: Python<'py>,
    conc: PyReadonlyArrayDyn<'py, FloatValue>,
    cutoff_percent: FloatValue,
) -> PyResult<(Bound<'py, PyArrayDyn<FloatValue>>, &'static str)> {
    let values = conc.as_array().to_owned();
    let dims: Vec<String> = (0..values.ndim()).map(|n| format!("dim_{n}")).collect();
    let field = GriddedField::new("siconc", LabeledArray::new(dims, values).map_err(to_py_err)?);
    let detected = classify_extent(&field, cutoff_percent).map_err(to_py_err)?;
    let unit = match detected.detection.unit {
        ConcentrationUnit::Percent => "percent",
        ConcentrationUnit::Fraction => "fraction",
    };
    Ok((detected.value.data().values().to_pyarray_bound(py), unit))
}

/// cos-latitude weighted mean of `values[time, i, j]` over cells at or north of `min_lat`
///
/// `latitude` is either 1-D along `i` or 2-D `[i, j]`.
#[pyfunction]
fn arctic_mean<'py>(
    py: Python<'py>,
    values: PyReadonlyArray3<'py, FloatValue>,
    latitude: PyReadonlyArrayDyn<'py, FloatValue>,
    min_lat: FloatValue,
) -> PyResult<Bound<'py, PyArray1<FloatValue>>> {
    let values = values.as_array().to_owned();
    let latitude = latitude.as_array().to_owned();
    let n_time = values.dim().0;

    let latitude = match latitude.ndim() {
        1 => LabeledArray::new(vec!["i"], latitude),
        2 => latitude
            .into_dimensionality::<Ix2>()
            .map_err(|e| ArcticError::ShapeMismatch(e.to_string()))
            .and_then(|lat| LabeledArray::from_2d(["i", "j"], lat)),
        n => Err(ArcticError::ShapeMismatch(format!(
            "latitude must be 1-D or 2-D, got {n} dimensions"
        ))),
    }
    .map_err(to_py_err)?;
    let time = TimeAxis::monthly(1, Month::new(1).map_err(to_py_err)?, n_time, None).map_err(to_py_err)?;

    let index = LabeledArray::new(vec!["time", "i", "j"], values.into_dyn())
        .map(|data| GriddedField::new("values", data))
        .and_then(|field| field.with_coord(LATITUDE, latitude))
        .and_then(|field| field.with_time(time))
        .and_then(|field| reduce_arctic_mean(&field, min_lat))
        .map_err(to_py_err)?;
    Ok(index.series(0).values.to_pyarray_bound(py))
}

fn series_index(values: PyReadonlyArray1<'_, FloatValue>, years: &[i32], months: &[u32]) -> PyResult<ArcticIndex> {
    let time = TimeAxis::from_year_months(years, months).map_err(to_py_err)?;
    ArcticIndex::from_series("series", values.as_array().to_vec(), time, "").map_err(to_py_err)
}

/// Monthly climatology (12 values), anomaly and monthly standard deviation (12 values)
#[pyfunction]
fn decompose<'py>(
    py: Python<'py>,
    values: PyReadonlyArray1<'py, FloatValue>,
    years: Vec<i32>,
    months: Vec<u32>,
) -> PyResult<(
    Bound<'py, PyArray1<FloatValue>>,
    Bound<'py, PyArray1<FloatValue>>,
    Bound<'py, PyArray1<FloatValue>>,
)> {
    let index = series_index(values, &years, &months)?;
    let parts = decompose_index(&index).map_err(to_py_err)?;
    let row = |values: &Array2<FloatValue>| values.row(0).to_owned();
    Ok((
        row(parts.climatology.values()).to_pyarray_bound(py),
        row(parts.anomaly.values()).to_pyarray_bound(py),
        row(parts.std.values()).to_pyarray_bound(py),
    ))
}

/// Regress `y` on `x` for each of `target_months`
///
/// Returns `{month: (slope, intercept, r)}`.
#[pyfunction]
fn regress<'py>(
    x: PyReadonlyArray1<'py, FloatValue>,
    y: PyReadonlyArray1<'py, FloatValue>,
    years: Vec<i32>,
    months: Vec<u32>,
    target_months: Vec<u32>,
) -> PyResult<HashMap<u32, (FloatValue, FloatValue, FloatValue)>> {
    let x = series_index(x, &years, &months)?;
    let y = series_index(y, &years, &months)?;
    let targets = target_months
        .into_iter()
        .map(Month::new)
        .collect::<Result<Vec<_>, _>>()
        .map_err(to_py_err)?;
    let fits = regress_series(x.series(0), y.series(0), &targets).map_err(to_py_err)?;
    Ok(fits
        .into_iter()
        .map(|(month, fit)| (month.number(), (fit.slope, fit.intercept, fit.r)))
        .collect())
}

#[pymodule]
pub fn core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(siextent, m)?)?;
    m.add_function(wrap_pyfunction!(arctic_mean, m)?)?;
    m.add_function(wrap_pyfunction!(decompose, m)?)?;
    m.add_function(wrap_pyfunction!(regress, m)?)?;
    Ok(())
}
