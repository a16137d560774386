//! Ensemble-member selection
//!
//! Which realizations of a model take part in the analysis: members can be filtered by
//! a label suffix (`i1p1f1` keeps only the first initialization/physics/forcing
//! variant), are always taken in sorted order, and can be capped at a maximum count.
//! Member sets of several variables of one model are intersected so every variable
//! covers the same realizations.

use crate::errors::{ArcticError, ArcticResult};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::num::NonZeroUsize;

/// Upper bound on the number of members used per model
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum MaxMembers {
    #[default]
    All,
    Count(NonZeroUsize),
}

impl Serialize for MaxMembers {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MaxMembers::All => serializer.serialize_str("all"),
            MaxMembers::Count(n) => serializer.serialize_u64(n.get() as u64),
        }
    }
}

struct MaxMembersVisitor;

impl<'de> Visitor<'de> for MaxMembersVisitor {
    type Value = MaxMembers;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a positive integer or \"all\"")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        usize::try_from(v)
            .ok()
            .and_then(NonZeroUsize::new)
            .map(MaxMembers::Count)
            .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(v), &self))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        u64::try_from(v)
            .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            .and_then(|v| self.visit_u64(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        if v.eq_ignore_ascii_case("all") {
            Ok(MaxMembers::All)
        } else {
            Err(E::invalid_value(de::Unexpected::Str(v), &self))
        }
    }
}

impl<'de> Deserialize<'de> for MaxMembers {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(MaxMembersVisitor)
    }
}

/// Member filtering policy
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberSelection {
    /// Keep only members whose label ends with this suffix
    pub suffix: Option<String>,
    pub max_members: MaxMembers,
}

impl MemberSelection {
    /// Members of `model` to use, sorted
    pub fn choose(&self, model: &str, available: &[String]) -> ArcticResult<Vec<String>> {
        let mut chosen: Vec<String> = available
            .iter()
            .filter(|m| self.suffix.as_ref().map_or(true, |s| m.ends_with(s.as_str())))
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if let MaxMembers::Count(n) = self.max_members {
            chosen.truncate(n.get());
        }
        if chosen.is_empty() {
            return Err(ArcticError::NoMembers {
                model: model.to_string(),
            });
        }
        Ok(chosen)
    }
}

/// Members present in every one of `sets`, sorted
pub fn intersect_members<'a>(sets: impl IntoIterator<Item = &'a [String]>) -> Vec<String> {
    let mut sets = sets.into_iter();
    let Some(first) = sets.next() else {
        return Vec::new();
    };
    let mut common: BTreeSet<&String> = first.iter().collect();
    for set in sets {
        let other: BTreeSet<&String> = set.iter().collect();
        common.retain(|m| other.contains(m));
    }
    common.into_iter().cloned().collect()
}
