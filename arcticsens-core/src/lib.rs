//! Grid normalization and Arctic index computation for multi-model sea-ice analysis
//!
//! The crate turns heterogeneous climate-model output into a small set of standardized
//! time series (Arctic-mean air temperature, total Arctic sea-ice extent, ...) and
//! regresses them against each other month by month across ensemble members and models.
//!
//! Data flows through the modules in this order:
//!
//! 1. [`dims`] and [`coords`] normalize dimension and coordinate names
//! 2. [`weights`] builds area weights (cos-latitude or explicit cell areas)
//! 3. [`reduce`] and [`extent`] reduce fields to [`index::ArcticIndex`] series
//! 4. [`climatology`] splits series into monthly climatology and anomaly
//! 5. [`regression`] regresses pairs of series per calendar month
//!
//! [`pipeline`] strings these together for every model of a [`collection::ModelCollection`].

pub mod climatology;
pub mod collection;
pub mod config;
pub mod coords;
pub mod dims;
pub mod errors;
pub mod extent;
pub mod field;
pub mod index;
pub mod members;
pub mod pipeline;
pub mod reduce;
pub mod regression;
pub mod time;
pub mod weights;

/// Floating point type used for all gridded and derived values
pub type FloatValue = f64;
