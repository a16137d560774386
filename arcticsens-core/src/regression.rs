//! Month-by-month regression of one index against another
//!
//! For each requested calendar month the timesteps of both series falling in that month
//! are paired by `(year, month)` and fitted with ordinary least squares. Pairs with a
//! null on either side are dropped. Ensemble members are fitted separately and then
//! averaged, and ensemble means can be averaged again across models.

use crate::errors::{ArcticError, ArcticResult};
use crate::index::{ArcticIndex, Series};
use crate::time::Month;
use crate::FloatValue;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ordinary least-squares fit `y = slope * x + intercept`
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    pub slope: FloatValue,
    pub intercept: FloatValue,
    /// Pearson correlation, 0 when `y` is constant
    pub r: FloatValue,
    /// Number of paired samples
    pub n: usize,
}

impl LinearFit {
    pub fn predict(&self, x: FloatValue) -> FloatValue {
        self.slope * x + self.intercept
    }
}

/// Fit `ys` against `xs`
///
/// Returns `None` with fewer than two samples or when `xs` has no spread.
pub fn linear_fit(xs: &[FloatValue], ys: &[FloatValue]) -> Option<LinearFit> {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return None;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let nf = n as FloatValue;
    let x_mean = xs.iter().sum::<FloatValue>() / nf;
    let y_mean = ys.iter().sum::<FloatValue>() / nf;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let (dx, dy) = (x - x_mean, y - y_mean);
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 {
        return None;
    }
    let slope = sxy / sxx;
    let r = if syy == 0.0 {
        0.0
    } else {
        sxy / (sxx.sqrt() * syy.sqrt())
    };
    Some(LinearFit {
        slope,
        intercept: y_mean - slope * x_mean,
        r,
        n,
    })
}

/// Paired non-null `(x, y)` samples falling in `month`, matched by `(year, month)`
fn month_samples(x: &Series, y: &Series, month: Month) -> (Vec<FloatValue>, Vec<FloatValue>) {
    let mut y_by_date = BTreeMap::new();
    for (t, stamp) in y.time.iter().enumerate() {
        y_by_date.entry(stamp.year_month()).or_insert(y.values[t]);
    }
    x.time
        .indices_for_month(month)
        .into_iter()
        .filter_map(|t| {
            let key = x.time.get(t)?.year_month();
            let yv = *y_by_date.get(&key)?;
            Some((x.values[t], yv))
        })
        .filter(|(xv, yv)| !xv.is_nan() && !yv.is_nan())
        .unzip()
}

/// Regress `y` on `x` separately for each of `months`
pub fn regress(x: Series, y: Series, months: &[Month]) -> ArcticResult<BTreeMap<Month, LinearFit>> {
    let mut fits = BTreeMap::new();
    for &month in months {
        let (xs, ys) = month_samples(&x, &y, month);
        let fit = linear_fit(&xs, &ys).ok_or(ArcticError::DegenerateRegression {
            month: month.number(),
            samples: xs.len(),
        })?;
        fits.insert(month, fit);
    }
    Ok(fits)
}

/// Arithmetic mean of several fits for one month
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeanFit {
    pub slope: FloatValue,
    pub intercept: FloatValue,
    pub r: FloatValue,
    /// Number of fits averaged
    pub count: usize,
}

/// Per-month mean of a set of fits
pub fn mean_fits<'a>(fits: impl IntoIterator<Item = (&'a Month, &'a LinearFit)>) -> BTreeMap<Month, MeanFit> {
    let mut sums: BTreeMap<Month, MeanFit> = BTreeMap::new();
    for (month, fit) in fits {
        let entry = sums.entry(*month).or_insert(MeanFit {
            slope: 0.0,
            intercept: 0.0,
            r: 0.0,
            count: 0,
        });
        entry.slope += fit.slope;
        entry.intercept += fit.intercept;
        entry.r += fit.r;
        entry.count += 1;
    }
    for mean in sums.values_mut() {
        let n = mean.count as FloatValue;
        mean.slope /= n;
        mean.intercept /= n;
        mean.r /= n;
    }
    sums
}

/// Fits of one ensemble member
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemberFit {
    /// `None` when neither index has a member dimension
    pub member: Option<String>,
    /// Months this member has too few samples for are absent
    pub fits: BTreeMap<Month, LinearFit>,
}

/// Per-member fits and their ensemble mean
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EnsembleRegression {
    pub members: Vec<MemberFit>,
    pub mean: BTreeMap<Month, MeanFit>,
}

/// Regress `y` on `x` for every ensemble member they share
///
/// Members are matched by label. An index without a member dimension is paired with
/// every member of the other. Each month is treated independently: a member that cannot
/// be fitted in one month is left out of that month's mean only. A month no member can
/// be fitted in is an error.
pub fn regress_members(x: &ArcticIndex, y: &ArcticIndex, months: &[Month]) -> ArcticResult<EnsembleRegression> {
    let pairs: Vec<(Option<String>, Series, Series)> = match (x.members(), y.members()) {
        (None, None) => vec![(None, x.series(0), y.series(0))],
        (Some(labels), None) => labels
            .iter()
            .enumerate()
            .map(|(row, label)| (Some(label.clone()), x.series(row), y.series(0)))
            .collect(),
        (None, Some(labels)) => labels
            .iter()
            .enumerate()
            .map(|(row, label)| (Some(label.clone()), x.series(0), y.series(row)))
            .collect(),
        (Some(labels), Some(_)) => labels
            .iter()
            .enumerate()
            .filter_map(|(row, label)| {
                y.member(label)
                    .ok()
                    .map(|ys| (Some(label.clone()), x.series(row), ys))
            })
            .collect(),
    };
    if pairs.is_empty() {
        return Err(ArcticError::ShapeMismatch(format!(
            "'{}' and '{}' share no ensemble members",
            x.name(),
            y.name()
        )));
    }

    let mut most_samples: BTreeMap<Month, usize> = BTreeMap::new();
    let members: Vec<MemberFit> = pairs
        .into_iter()
        .map(|(member, xs, ys)| {
            let mut fits = BTreeMap::new();
            for &month in months {
                let (mx, my) = month_samples(&xs, &ys, month);
                let seen = most_samples.entry(month).or_insert(0);
                *seen = (*seen).max(mx.len());
                match linear_fit(&mx, &my) {
                    Some(fit) => {
                        fits.insert(month, fit);
                    }
                    None => debug!(
                        "{}: member {:?} has {} usable samples for month {month}, left out",
                        y.name(),
                        member,
                        mx.len()
                    ),
                }
            }
            MemberFit { member, fits }
        })
        .collect();

    let mean = mean_fits(members.iter().flat_map(|m| m.fits.iter()));
    if let Some(&month) = months.iter().find(|month| !mean.contains_key(*month)) {
        return Err(ArcticError::DegenerateRegression {
            month: month.number(),
            samples: most_samples.get(&month).copied().unwrap_or(0),
        });
    }
    Ok(EnsembleRegression { members, mean })
}

/// Per-month mean over models of their ensemble-mean fits
pub fn multi_model_mean<'a>(models: impl IntoIterator<Item = &'a EnsembleRegression>) -> BTreeMap<Month, MeanFit> {
    let mut sums: BTreeMap<Month, (FloatValue, FloatValue, FloatValue, usize)> = BTreeMap::new();
    for model in models {
        for (month, fit) in &model.mean {
            let entry = sums.entry(*month).or_insert((0.0, 0.0, 0.0, 0));
            entry.0 += fit.slope;
            entry.1 += fit.intercept;
            entry.2 += fit.r;
            entry.3 += 1;
        }
    }
    sums.into_iter()
        .map(|(month, (slope, intercept, r, count))| {
            let n = count as FloatValue;
            (
                month,
                MeanFit {
                    slope: slope / n,
                    intercept: intercept / n,
                    r: r / n,
                    count,
                },
            )
        })
        .collect()
}
