//! Protocol parameters.

use crate::actor::ActorCategory;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default number of blocks an unstaking actor waits before deletion.
pub const DEFAULT_UNSTAKING_BLOCKS: i64 = 2016;

/// Default number of blocks an actor may stay paused before forced unstaking.
pub const DEFAULT_MAX_PAUSE_BLOCKS: i64 = 672;

/// A parameter value. Integers cover heights and counts; strings cover
/// big-int amounts and identifiers.
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Str(String),
}

impl ParamValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Int(_) => None,
            ParamValue::Str(s) => Some(s),
        }
    }
}

/// Well-known parameter names.
pub mod names {
    /// Per-category unstaking delay, e.g. `validator_unstaking_blocks`.
    pub fn unstaking_blocks(category: super::ActorCategory) -> String {
        format!("{}_unstaking_blocks", category.name())
    }

    /// Per-category maximum pause duration, e.g. `app_max_pause_blocks`.
    pub fn max_pause_blocks(category: super::ActorCategory) -> String {
        format!("{}_max_pause_blocks", category.name())
    }

    pub const MAX_BLOCK_BYTES: &str = "max_block_bytes";
}

/// The parameter table, ordered for deterministic iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Params(pub BTreeMap<String, ParamValue>);

impl Params {
    /// The genesis defaults every network starts from.
    pub fn defaults() -> Self {
        let mut map = BTreeMap::new();
        for category in ActorCategory::ALL {
            map.insert(
                names::unstaking_blocks(category),
                ParamValue::Int(DEFAULT_UNSTAKING_BLOCKS),
            );
            map.insert(
                names::max_pause_blocks(category),
                ParamValue::Int(DEFAULT_MAX_PAUSE_BLOCKS),
            );
        }
        map.insert(
            names::MAX_BLOCK_BYTES.to_string(),
            ParamValue::Int(4_000_000),
        );
        Params(map)
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: ParamValue) {
        self.0.insert(name.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_every_category() {
        let params = Params::defaults();
        for category in ActorCategory::ALL {
            assert!(params.get(&names::unstaking_blocks(category)).is_some());
            assert!(params.get(&names::max_pause_blocks(category)).is_some());
        }
    }

    #[test]
    fn untagged_json_forms() {
        let int: ParamValue = serde_json::from_str("42").unwrap();
        assert_eq!(int.as_int(), Some(42));
        let s: ParamValue = serde_json::from_str("\"1000\"").unwrap();
        assert_eq!(s.as_str(), Some("1000"));
    }
}
