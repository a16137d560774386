//! Analysis configuration
//!
//! ```toml
//! experiment = "historical"
//! cutoff_percent = 15.0
//! min_lat = 70.0
//! months = [3, 9]
//! max_members = "all"
//! member_suffix = "i1p1f1"
//!
//! [dimension_overrides]
//! "MIROC6" = "swapped"
//! ```
//!
//! Every key is optional; missing keys take the values of [`AnalysisConfig::default`].
//! Entries under `dimension_overrides` are merged over the built-in table.

use crate::dims::DimensionOverrides;
use crate::errors::{ArcticError, ArcticResult};
use crate::members::{MaxMembers, MemberSelection};
use crate::time::Month;
use crate::FloatValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Simulation experiment being analysed
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Experiment {
    #[serde(rename = "historical")]
    Historical,
    #[serde(rename = "piControl")]
    PiControl,
    #[serde(rename = "ssp370")]
    Ssp370,
}

impl Experiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Experiment::Historical => "historical",
            Experiment::PiControl => "piControl",
            Experiment::Ssp370 => "ssp370",
        }
    }
}

impl fmt::Display for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    pub experiment: Experiment,
    /// Concentration above which a cell counts as ice covered, in percent
    pub cutoff_percent: FloatValue,
    /// Southern edge of the Arctic region for mean reductions, degrees north
    pub min_lat: FloatValue,
    /// Calendar months to regress
    pub months: Vec<Month>,
    pub max_members: MaxMembers,
    pub member_suffix: Option<String>,
    pub dimension_overrides: DimensionOverrides,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            experiment: Experiment::Historical,
            cutoff_percent: 15.0,
            min_lat: 70.0,
            months: Month::all().filter(|m| matches!(m.number(), 3 | 9)).collect(),
            max_members: MaxMembers::All,
            member_suffix: None,
            dimension_overrides: DimensionOverrides::default(),
        }
    }
}

impl AnalysisConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> ArcticResult<Self> {
        let mut config: AnalysisConfig = toml::from_str(s)?;
        // user entries override, built-in entries stay
        let user = std::mem::replace(&mut config.dimension_overrides, DimensionOverrides::default());
        config.dimension_overrides.extend(&user);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ArcticResult<()> {
        if !(self.cutoff_percent > 0.0 && self.cutoff_percent <= 100.0) {
            return Err(ArcticError::InvalidConfig(format!(
                "cutoff_percent must be in (0, 100], got {}",
                self.cutoff_percent
            )));
        }
        if !(0.0..=90.0).contains(&self.min_lat) {
            return Err(ArcticError::InvalidConfig(format!(
                "min_lat must be in [0, 90], got {}",
                self.min_lat
            )));
        }
        if self.months.is_empty() {
            return Err(ArcticError::InvalidConfig("months must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn member_selection(&self) -> MemberSelection {
        MemberSelection {
            suffix: self.member_suffix.clone(),
            max_members: self.max_members,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dims::DimOrder;
    use std::num::NonZeroUsize;

    #[test]
    fn defaults() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
        assert_eq!(config.months, vec![Month::new(3).unwrap(), Month::new(9).unwrap()]);
        assert_eq!(config.dimension_overrides.order_for("MIROC6"), DimOrder::Swapped);
    }

    #[test]
    fn full_document() {
        let config = AnalysisConfig::from_toml_str(
            r#"
experiment = "piControl"
cutoff_percent = 30.0
min_lat = 65.0
months = [9]
max_members = 5
member_suffix = "i1p1f1"

[dimension_overrides]
"NEW-MODEL" = "swapped"
"MIROC6" = "standard"
"#,
        )
        .unwrap();
        assert_eq!(config.experiment, Experiment::PiControl);
        assert_eq!(config.max_members, MaxMembers::Count(NonZeroUsize::new(5).unwrap()));
        assert_eq!(config.months, vec![Month::new(9).unwrap()]);
        assert_eq!(config.dimension_overrides.order_for("NEW-MODEL"), DimOrder::Swapped);
        assert_eq!(config.dimension_overrides.order_for("MIROC6"), DimOrder::Standard);
        // built-in entry kept
        assert_eq!(config.dimension_overrides.order_for("MRI-ESM2-0"), DimOrder::Swapped);
        assert_eq!(config.member_selection().suffix.as_deref(), Some("i1p1f1"));
    }

    #[test]
    fn out_of_range_values_rejected() {
        for doc in [
            "cutoff_percent = 0.0",
            "cutoff_percent = 120.0",
            "min_lat = -5.0",
            "min_lat = 91.0",
            "months = []",
        ] {
            assert!(
                matches!(AnalysisConfig::from_toml_str(doc), Err(ArcticError::InvalidConfig(_))),
                "{doc}"
            );
        }
        assert!(matches!(
            AnalysisConfig::from_toml_str("months = [13]"),
            Err(ArcticError::Config(_))
        ));
        assert!(matches!(
            AnalysisConfig::from_toml_str("experiment = \"ssp585\""),
            Err(ArcticError::Config(_))
        ));
    }
}
