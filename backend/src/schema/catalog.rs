//! The closed set of operations and their mappings.

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use super::field::Mapping;
use super::rules::item_count;
use super::tables;
use crate::error::{ValidationError, ValidationResult};

/// Maximum number of identifiers a data request may list
pub const MAX_DATA_ITEMS: usize = 50;

const DATA_ITEM_PROPERTIES: [&str; 3] = ["P123 UIDs", "Tickers", "Cusips"];

/// Operation kinds, keyed by the `Main.Operation` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OperationKind {
    RollingScreen,
    RankPerformance,
    ScreenRun,
    ScreenBacktest,
    Data,
    DataUniverse,
    Ranks,
    RanksPeriod,
    RanksMulti,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        OperationKind::RollingScreen,
        OperationKind::RankPerformance,
        OperationKind::ScreenRun,
        OperationKind::ScreenBacktest,
        OperationKind::Data,
        OperationKind::DataUniverse,
        OperationKind::Ranks,
        OperationKind::RanksPeriod,
        OperationKind::RanksMulti,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::RollingScreen => "RollingScreen",
            OperationKind::RankPerformance => "RankPerformance",
            OperationKind::ScreenRun => "ScreenRun",
            OperationKind::ScreenBacktest => "ScreenBacktest",
            OperationKind::Data => "Data",
            OperationKind::DataUniverse => "DataUniverse",
            OperationKind::Ranks => "Ranks",
            OperationKind::RanksPeriod => "RanksPeriod",
            OperationKind::RanksMulti => "RanksMulti",
        }
    }

    /// Case-insensitive lookup.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL.into_iter().find(|k| k.name().eq_ignore_ascii_case(name))
    }

    pub fn spec(&self) -> &'static OperationSpec {
        // ALL and CATALOG share the same order
        &CATALOG[*self as usize]
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whole-section checks run after per-property validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionCheck {
    /// Exactly one identifier list, at most [`MAX_DATA_ITEMS`] long
    DataItems,
}

impl SectionCheck {
    pub fn check(&self, section: &Map<String, Value>) -> ValidationResult<()> {
        match self {
            SectionCheck::DataItems => check_data_items(section),
        }
    }
}

fn check_data_items(section: &Map<String, Value>) -> ValidationResult<()> {
    let constraint = |message: &str| ValidationError::Constraint {
        section: "Default Settings",
        message: message.to_string(),
    };

    let present: Vec<&Value> = DATA_ITEM_PROPERTIES
        .iter()
        .filter_map(|p| section.get(*p))
        .collect();
    match present.as_slice() {
        [] => Err(constraint(
            "needs to contain one of the following properties: \"P123 UIDs\", \"Tickers\" or \"Cusips\"",
        )),
        [items] if item_count(items) > MAX_DATA_ITEMS => Err(constraint(&format!(
            "can only contain at most {} \"P123 UIDs\", \"Tickers\" or \"Cusips\"",
            MAX_DATA_ITEMS
        ))),
        [_] => Ok(()),
        _ => Err(constraint(
            "can only contain one of the following properties: \"P123 UIDs\", \"Tickers\" or \"Cusips\"",
        )),
    }
}

/// Everything the validator needs to know about one operation kind.
#[derive(Debug)]
pub struct OperationSpec {
    pub kind: OperationKind,
    pub settings: Mapping,
    /// `Some` for operations that take an "Iterations" section
    pub iterations: Option<Mapping>,
    pub check: Option<SectionCheck>,
}

impl OperationSpec {
    fn new(kind: OperationKind, settings: Mapping) -> Self {
        Self { kind, settings, iterations: None, check: None }
    }

    fn iterations(mut self, mapping: Mapping) -> Self {
        self.iterations = Some(mapping);
        self
    }

    fn check(mut self, check: SectionCheck) -> Self {
        self.check = Some(check);
        self
    }

    pub fn has_iterations(&self) -> bool {
        self.iterations.is_some()
    }
}

/// Mapping for the "Main" section.
pub static MAIN: Lazy<Mapping> = Lazy::new(tables::main);

static CATALOG: Lazy<Vec<OperationSpec>> = Lazy::new(|| {
    OperationKind::ALL
        .into_iter()
        .map(|kind| match kind {
            OperationKind::RollingScreen => OperationSpec::new(kind, tables::rolling_screen_settings())
                .iterations(tables::rolling_screen_iterations()),
            OperationKind::RankPerformance => OperationSpec::new(kind, tables::rank_perf_settings())
                .iterations(tables::rank_perf_iterations()),
            OperationKind::ScreenRun => OperationSpec::new(kind, tables::screen_run_settings()),
            OperationKind::ScreenBacktest => OperationSpec::new(kind, tables::screen_backtest_settings()),
            OperationKind::Data => OperationSpec::new(kind, tables::data_settings())
                .iterations(tables::data_iterations())
                .check(SectionCheck::DataItems),
            OperationKind::DataUniverse => OperationSpec::new(kind, tables::data_universe_settings()),
            OperationKind::Ranks => OperationSpec::new(kind, tables::ranks_settings()),
            OperationKind::RanksPeriod => OperationSpec::new(kind, tables::ranks_period_settings()),
            OperationKind::RanksMulti => OperationSpec::new(kind, tables::ranks_multi_settings())
                .iterations(tables::ranks_multi_iterations()),
        })
        .collect()
});

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn section(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_from_name_ignores_case() {
        assert_eq!(OperationKind::from_name("rankperformance"), Some(OperationKind::RankPerformance));
        assert_eq!(OperationKind::from_name(" DATA "), Some(OperationKind::Data));
        assert_eq!(OperationKind::from_name("Backtest"), None);
    }

    #[test]
    fn test_catalog_order_matches_kinds() {
        for kind in OperationKind::ALL {
            assert_eq!(kind.spec().kind, kind);
        }
        assert!(OperationKind::Data.spec().has_iterations());
        assert!(!OperationKind::Ranks.spec().has_iterations());
    }

    #[test]
    fn test_data_items_exactly_one() {
        let check = SectionCheck::DataItems;
        assert!(check.check(&section(json!({"Tickers": "AAPL"}))).is_ok());

        let err = check.check(&section(json!({"Start Date": "2020-01-01"}))).unwrap_err();
        assert!(err.to_string().contains("needs to contain one of"));

        let err = check
            .check(&section(json!({"Tickers": "AAPL", "P123 UIDs": 5})))
            .unwrap_err();
        assert!(err.to_string().contains("can only contain one of"));
    }

    #[test]
    fn test_data_items_cap() {
        let fifty: Vec<u64> = (1..=50).collect();
        let fifty_one: Vec<u64> = (1..=51).collect();
        let check = SectionCheck::DataItems;
        assert!(check.check(&section(json!({"P123 UIDs": fifty}))).is_ok());
        let err = check.check(&section(json!({"P123 UIDs": fifty_one}))).unwrap_err();
        assert!(err.to_string().contains("at most 50"));
    }
}
