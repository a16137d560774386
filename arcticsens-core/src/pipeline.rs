//! Per-model processing of a whole collection
//!
//! For every model the pipeline normalizes the source fields, selects ensemble members,
//! finds the cell areas, computes the Arctic indices, decomposes them and regresses
//! sea-ice extent on Arctic temperature. Models are independent and processed in
//! parallel. A model that fails at any step is reported with the reason and left out of
//! the multi-model mean; it never stops the others.

use crate::climatology::{decompose, Decomposition};
pub use crate::collection::SkippedModel;
use crate::collection::ModelCollection;
use crate::config::AnalysisConfig;
use crate::coords::{normalize_latlon, validate_normalized};
use crate::dims::normalize_dims;
use crate::errors::{ArcticError, ArcticResult};
use crate::extent::{sea_ice_volume, siextent, total_nh_area, total_nh_extent, UnitDetection};
use crate::field::GriddedField;
use crate::index::ArcticIndex;
use crate::members::intersect_members;
use crate::reduce::arctic_mean;
use crate::regression::{multi_model_mean, regress_members, EnsembleRegression, MeanFit};
use crate::time::Month;
use crate::weights::{AreaKind, AreaMatch, CellArea, CellAreaTable};
use log::{debug, info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const TAS: &str = "tas";
pub const SICONC: &str = "siconc";
pub const SITHICK: &str = "sithick";

/// Everything derived for one model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelResult {
    pub model: String,
    pub members: Option<Vec<String>>,
    pub tas_arc_mean: Decomposition,
    pub tas_index: ArcticIndex,
    pub siextent: GriddedField,
    pub sie_tot_arc: Decomposition,
    pub sie_index: ArcticIndex,
    pub sia_tot_arc: ArcticIndex,
    /// Only when the collection has sea-ice thickness
    pub sivol_arc_mean: Option<ArcticIndex>,
    pub concentration: UnitDetection,
    pub area_match: AreaMatch,
    /// Extent regressed on temperature
    pub regression: EnsembleRegression,
}

/// Results of a whole run
///
/// Land cells are null (NaN) in the extent fields. JSON writes them as `null` and
/// cannot read them back, so persist reports with a binary serde format.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub models: BTreeMap<String, ModelResult>,
    pub skipped: Vec<SkippedModel>,
    pub multi_model_mean: BTreeMap<Month, MeanFit>,
}

impl PipelineReport {
    /// Attach every derived index, climatology and anomaly to `collection`
    pub fn attach_to(&self, collection: &mut ModelCollection) -> ArcticResult<()> {
        for (model, result) in &self.models {
            collection.insert_derived("siextent", model, result.siextent.clone())?;
            for index in [&result.tas_index, &result.sie_index, &result.sia_tot_arc]
                .into_iter()
                .chain(result.sivol_arc_mean.as_ref())
            {
                collection.insert_derived(index.name(), model, index.clone())?;
            }
            for parts in [&result.tas_arc_mean, &result.sie_tot_arc] {
                collection.insert_derived(parts.climatology.name(), model, parts.climatology.clone())?;
                collection.insert_derived(parts.anomaly.name(), model, parts.anomaly.clone())?;
                collection.insert_derived(parts.std.name(), model, parts.std.clone())?;
            }
        }
        Ok(())
    }
}

pub struct ArcticPipeline {
    config: AnalysisConfig,
}

impl ArcticPipeline {
    pub fn new(config: AnalysisConfig) -> ArcticResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    fn normalize(&self, field: &GriddedField, model: &str) -> ArcticResult<GriddedField> {
        let field = normalize_latlon(normalize_dims(field.clone(), model, &self.config.dimension_overrides)?);
        validate_normalized(&field)?;
        Ok(field)
    }

    /// Restrict every field to the selected members common to all of them
    fn select_members(&self, model: &str, fields: Vec<GriddedField>) -> ArcticResult<(Vec<GriddedField>, Option<Vec<String>>)> {
        let labelled: Vec<&[String]> = fields.iter().filter_map(|f| f.members()).collect();
        if labelled.is_empty() {
            return Ok((fields, None));
        }
        let common = intersect_members(labelled);
        let chosen = self.config.member_selection().choose(model, &common)?;
        debug!("{model}: using members {chosen:?}");
        let fields = fields
            .into_iter()
            .map(|f| match f.members() {
                Some(_) => f.select_members(&chosen),
                None => Ok(f),
            })
            .collect::<ArcticResult<Vec<_>>>()?;
        Ok((fields, Some(chosen)))
    }

    /// Compute all indices and the regression for one model
    pub fn process_model(&self, model: &str, collection: &ModelCollection, areas: &CellAreaTable) -> ArcticResult<ModelResult> {
        info!("Working on {model}");
        let mut sources = vec![
            self.normalize(collection.field(TAS, model)?, model)?,
            self.normalize(collection.field(SICONC, model)?, model)?,
        ];
        if let Ok(sithick) = collection.field(SITHICK, model) {
            sources.push(self.normalize(sithick, model)?);
        }
        let (mut sources, members) = self.select_members(model, sources)?;
        let sithick = if sources.len() > 2 { sources.pop() } else { None };
        let (siconc, tas) = match (sources.pop(), sources.pop()) {
            (Some(siconc), Some(tas)) => (siconc, tas),
            _ => return Err(ArcticError::Error(format!("{model}: source fields lost during member selection"))),
        };

        let kind = siconc
            .table_id()
            .and_then(AreaKind::for_table_id)
            .unwrap_or(AreaKind::Ocean);
        let (area_field, area_match) = areas.find(kind, model)?;
        let area_field = normalize_dims(area_field.clone(), model, &self.config.dimension_overrides)?;
        let area = CellArea::from_field(&area_field)?;

        let tas_index = arctic_mean(&tas, self.config.min_lat)?;
        let extent = siextent(&siconc, self.config.cutoff_percent)?;
        let sie_index = total_nh_extent(&extent.value, &area)?;
        let sia_tot_arc = total_nh_area(&siconc, &area)?.value;
        let sivol_arc_mean = match &sithick {
            Some(thick) => Some(sea_ice_volume(thick, &siconc, &area, self.config.min_lat)?.value),
            None => None,
        };

        let regression = regress_members(&tas_index, &sie_index, &self.config.months)?;

        Ok(ModelResult {
            model: model.to_string(),
            members,
            tas_arc_mean: decompose(&tas_index)?,
            tas_index,
            siextent: extent.value,
            sie_tot_arc: decompose(&sie_index)?,
            sie_index,
            sia_tot_arc,
            sivol_arc_mean,
            concentration: extent.detection,
            area_match,
            regression,
        })
    }

    /// Process every model of `collection`, recording the ones that fail
    pub fn run(&self, collection: &ModelCollection, areas: &CellAreaTable) -> PipelineReport {
        let models: Vec<String> = collection.models().map(|m| m.to_string()).collect();
        let outcomes: Vec<(String, ArcticResult<ModelResult>)> = models
            .par_iter()
            .map(|model| (model.clone(), self.process_model(model, collection, areas)))
            .collect();

        let mut report = PipelineReport::default();
        for (model, outcome) in outcomes {
            match outcome {
                Ok(result) => {
                    report.models.insert(model, result);
                }
                Err(err) => {
                    warn!("Skipping {model}: {err}");
                    report.skipped.push(SkippedModel {
                        model,
                        reason: err.to_string(),
                    });
                }
            }
        }
        report.multi_model_mean = multi_model_mean(report.models.values().map(|r| &r.regression));
        info!(
            "Processed {} models, skipped {}",
            report.models.len(),
            report.skipped.len()
        );
        report
    }
}
