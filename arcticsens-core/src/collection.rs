//! Per-model collections of fields and derived indices
//!
//! A [`ModelCollection`] maps variable name -> model identifier -> entry. It is built
//! from a [`Catalogue`] (the data-loading layer, which lives outside this crate) and
//! only keeps models that provide every requested variable. Source variables are never
//! replaced: results are added under new variable names (`sie_tot_arc`,
//! `tas_arc_mean_clim`, ...).

use crate::climatology::Climatology;
use crate::config::Experiment;
use crate::errors::{ArcticError, ArcticResult};
use crate::field::GriddedField;
use crate::index::ArcticIndex;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One variable as stored in the archive
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariableRequest {
    pub variable: String,
    /// e.g. `Amon`, `SImon`, `Ofx`
    pub table_id: String,
    /// e.g. `gn`, `gr`
    pub grid_label: String,
}

impl VariableRequest {
    pub fn new(variable: &str, table_id: &str, grid_label: &str) -> Self {
        Self {
            variable: variable.to_string(),
            table_id: table_id.to_string(),
            grid_label: grid_label.to_string(),
        }
    }
}

/// The set of variables wanted for one experiment
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogueQuery {
    pub experiment: Experiment,
    pub variables: Vec<VariableRequest>,
}

/// Source of model output
///
/// Implemented by whatever locates and opens the data; the core only needs to know
/// which models offer a variable and to get a field for a model.
pub trait Catalogue {
    /// Models providing `request` for `experiment`
    fn models(&self, experiment: Experiment, request: &VariableRequest) -> Vec<String>;

    fn load(&self, experiment: Experiment, request: &VariableRequest, model: &str) -> ArcticResult<GriddedField>;
}

/// A catalogue held entirely in memory
#[derive(Clone, Debug, Default)]
pub struct MemoryCatalogue {
    entries: BTreeMap<(Experiment, VariableRequest), BTreeMap<String, GriddedField>>,
}

impl MemoryCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, experiment: Experiment, request: VariableRequest, model: &str, field: GriddedField) {
        self.entries
            .entry((experiment, request))
            .or_default()
            .insert(model.to_string(), field);
    }
}

impl Catalogue for MemoryCatalogue {
    fn models(&self, experiment: Experiment, request: &VariableRequest) -> Vec<String> {
        self.entries
            .get(&(experiment, request.clone()))
            .map(|models| models.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn load(&self, experiment: Experiment, request: &VariableRequest, model: &str) -> ArcticResult<GriddedField> {
        self.entries
            .get(&(experiment, request.clone()))
            .and_then(|models| models.get(model))
            .cloned()
            .ok_or_else(|| ArcticError::MissingVariable {
                variable: request.variable.clone(),
                model: model.to_string(),
            })
    }
}

/// A model left out of a run, with the reason
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedModel {
    pub model: String,
    pub reason: String,
}

/// A value stored in a [`ModelCollection`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CollectionEntry {
    Field(GriddedField),
    Index(ArcticIndex),
    Climatology(Climatology),
}

impl From<GriddedField> for CollectionEntry {
    fn from(value: GriddedField) -> Self {
        CollectionEntry::Field(value)
    }
}

impl From<ArcticIndex> for CollectionEntry {
    fn from(value: ArcticIndex) -> Self {
        CollectionEntry::Index(value)
    }
}

impl From<Climatology> for CollectionEntry {
    fn from(value: Climatology) -> Self {
        CollectionEntry::Climatology(value)
    }
}

/// Variable -> model -> entry, restricted to models providing every source variable
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCollection {
    models: BTreeSet<String>,
    variables: BTreeMap<String, BTreeMap<String, CollectionEntry>>,
}

impl ModelCollection {
    /// Load every model providing all of `query`'s variables
    ///
    /// A model whose data fails to load is left out and reported as skipped; the other
    /// models are still loaded.
    pub fn from_catalogue(catalogue: &impl Catalogue, query: &CatalogueQuery) -> (Self, Vec<SkippedModel>) {
        let common = query
            .variables
            .iter()
            .map(|request| catalogue.models(query.experiment, request).into_iter().collect::<BTreeSet<_>>())
            .reduce(|a, b| a.intersection(&b).cloned().collect())
            .unwrap_or_default();

        let mut fields: BTreeMap<String, BTreeMap<String, GriddedField>> = query
            .variables
            .iter()
            .map(|request| (request.variable.clone(), BTreeMap::new()))
            .collect();
        let mut skipped = Vec::new();
        for model in &common {
            let loaded = query
                .variables
                .iter()
                .map(|request| {
                    catalogue
                        .load(query.experiment, request, model)
                        .map(|field| (request.variable.clone(), field))
                })
                .collect::<ArcticResult<Vec<_>>>();
            match loaded {
                Ok(loaded) => {
                    for (variable, field) in loaded {
                        fields.entry(variable).or_default().insert(model.clone(), field);
                    }
                }
                Err(err) => {
                    warn!("Skipping {model}: {err}");
                    skipped.push(SkippedModel {
                        model: model.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        info!(
            "{} models provide all of {:?} for {}, {} failed to load",
            common.len() - skipped.len(),
            query.variables.iter().map(|r| r.variable.as_str()).collect::<Vec<_>>(),
            query.experiment,
            skipped.len()
        );
        (Self::from_fields(fields), skipped)
    }

    /// Build from already-loaded fields, dropping models that miss any variable
    pub fn from_fields(fields: BTreeMap<String, BTreeMap<String, GriddedField>>) -> Self {
        let models: BTreeSet<String> = fields
            .values()
            .map(|per_model| per_model.keys().cloned().collect::<BTreeSet<_>>())
            .reduce(|a, b| a.intersection(&b).cloned().collect())
            .unwrap_or_default();
        let variables = fields
            .into_iter()
            .map(|(variable, per_model)| {
                let kept = per_model
                    .into_iter()
                    .filter(|(model, _)| models.contains(model))
                    .map(|(model, field)| (model, CollectionEntry::Field(field)))
                    .collect();
                (variable, kept)
            })
            .collect();
        Self { models, variables }
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.models.iter().map(|m| m.as_str())
    }

    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|v| v.as_str())
    }

    pub fn contains_model(&self, model: &str) -> bool {
        self.models.contains(model)
    }

    pub fn get(&self, variable: &str, model: &str) -> Option<&CollectionEntry> {
        self.variables.get(variable).and_then(|per_model| per_model.get(model))
    }

    fn missing(variable: &str, model: &str) -> ArcticError {
        ArcticError::MissingVariable {
            variable: variable.to_string(),
            model: model.to_string(),
        }
    }

    pub fn field(&self, variable: &str, model: &str) -> ArcticResult<&GriddedField> {
        match self.get(variable, model) {
            Some(CollectionEntry::Field(field)) => Ok(field),
            _ => Err(Self::missing(variable, model)),
        }
    }

    pub fn index(&self, variable: &str, model: &str) -> ArcticResult<&ArcticIndex> {
        match self.get(variable, model) {
            Some(CollectionEntry::Index(index)) => Ok(index),
            _ => Err(Self::missing(variable, model)),
        }
    }

    pub fn climatology(&self, variable: &str, model: &str) -> ArcticResult<&Climatology> {
        match self.get(variable, model) {
            Some(CollectionEntry::Climatology(clim)) => Ok(clim),
            _ => Err(Self::missing(variable, model)),
        }
    }

    /// Attach a derived result under a new variable name
    ///
    /// Existing entries are never replaced.
    pub fn insert_derived(&mut self, variable: &str, model: &str, entry: impl Into<CollectionEntry>) -> ArcticResult<()> {
        if !self.models.contains(model) {
            return Err(ArcticError::Error(format!("model {model} is not part of the collection")));
        }
        let per_model = self.variables.entry(variable.to_string()).or_default();
        if per_model.contains_key(model) {
            return Err(ArcticError::DuplicateVariable {
                variable: variable.to_string(),
                model: model.to_string(),
            });
        }
        per_model.insert(model.to_string(), entry.into());
        Ok(())
    }
}
