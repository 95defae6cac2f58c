//! Label tables and the shared mapping fragments.
//!
//! Operation mappings are composed from these fragments in
//! [`super::catalog`]; a later fragment overrides an earlier one key by key.

use serde_json::Value;

use super::field::{FieldSpec, Mapping};
use super::rules::Rule;
use super::transform::Transform;

/// Server-side name of a universe defined inline in the document
pub const API_UNIVERSE: &str = "ApiUniverse";

/// Server-side name of a ranking system defined inline in the document
pub const API_RANKING_SYSTEM: &str = "ApiRankingSystem";

// =============================================================================
// Frequencies
// =============================================================================

/// A rebalance / sampling frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frequency {
    pub label: &'static str,
    pub phrase: &'static str,
    pub days: i64,
}

pub const FREQUENCIES: &[Frequency] = &[
    Frequency { label: "1day", phrase: "Every Day", days: 1 },
    Frequency { label: "1week", phrase: "Every Week", days: 7 },
    Frequency { label: "2weeks", phrase: "Every 2 Weeks", days: 7 * 2 },
    Frequency { label: "3weeks", phrase: "Every 3 Weeks", days: 7 * 3 },
    Frequency { label: "4weeks", phrase: "Every 4 Weeks", days: 7 * 4 },
    Frequency { label: "6weeks", phrase: "Every 6 Weeks", days: 7 * 6 },
    Frequency { label: "8weeks", phrase: "Every 8 Weeks", days: 7 * 8 },
    Frequency { label: "13weeks", phrase: "Every 13 Weeks", days: 7 * 13 },
    Frequency { label: "26weeks", phrase: "Every 26 Weeks", days: 7 * 26 },
    Frequency { label: "52weeks", phrase: "Every 52 Weeks", days: 7 * 52 },
];

/// Find a frequency by label, ignoring case.
pub fn frequency(label: &str) -> Option<&'static Frequency> {
    FREQUENCIES.iter().find(|f| f.label.eq_ignore_ascii_case(label.trim()))
}

// =============================================================================
// Label → API code tables
// =============================================================================

const SCREEN_METHOD: &[(&str, &str)] = &[
    ("long", "long"),
    ("short", "short"),
    ("longshort", "long/short"),
    ("hedged", "hedged"),
];

const TRANS_PRICE: &[(&str, i64)] = &[("open", 1), ("close", 4), ("avghilow", 3)];

const RANKING_METHOD: &[(&str, i64)] = &[("nasnegative", 2), ("nasneutral", 4)];

const ROLLING_FREQUENCIES: &[&str] = &["1week", "4weeks"];

/// Tables translating a human label into the code the API expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Every frequency except daily
    Frequency,
    /// Every frequency
    BacktestFrequency,
    /// Weekly or 4-weekly only
    RollingFrequency,
    ScreenMethod,
    TransPrice,
    RankingMethod,
}

impl Lookup {
    /// Code for `label` (case-insensitive).
    pub fn find(&self, label: &str) -> Option<Value> {
        let label = label.trim().to_lowercase();
        match self {
            Lookup::Frequency => FREQUENCIES[1..]
                .iter()
                .find(|f| f.label == label)
                .map(|f| Value::from(f.phrase)),
            Lookup::BacktestFrequency => frequency(&label).map(|f| Value::from(f.phrase)),
            Lookup::RollingFrequency => ROLLING_FREQUENCIES
                .iter()
                .find(|l| **l == label)
                .and_then(|l| frequency(l))
                .map(|f| Value::from(f.phrase)),
            Lookup::ScreenMethod => SCREEN_METHOD
                .iter()
                .find(|(l, _)| *l == label)
                .map(|(_, code)| Value::from(*code)),
            Lookup::TransPrice => TRANS_PRICE
                .iter()
                .find(|(l, _)| *l == label)
                .map(|(_, code)| Value::from(*code)),
            Lookup::RankingMethod => RANKING_METHOD
                .iter()
                .find(|(l, _)| *l == label)
                .map(|(_, code)| Value::from(*code)),
        }
    }

    /// Accepted labels, for error messages.
    pub fn labels(&self) -> Vec<&'static str> {
        match self {
            Lookup::Frequency => FREQUENCIES[1..].iter().map(|f| f.label).collect(),
            Lookup::BacktestFrequency => FREQUENCIES.iter().map(|f| f.label).collect(),
            Lookup::RollingFrequency => ROLLING_FREQUENCIES.to_vec(),
            Lookup::ScreenMethod => SCREEN_METHOD.iter().map(|(l, _)| *l).collect(),
            Lookup::TransPrice => TRANS_PRICE.iter().map(|(l, _)| *l).collect(),
            Lookup::RankingMethod => RANKING_METHOD.iter().map(|(l, _)| *l).collect(),
        }
    }
}

// =============================================================================
// Mapping fragments
// =============================================================================

const ON_ERROR: &[&str] = &["stop", "continue"];
const VENDORS: &[&str] = &["factset", "compustat"];
const PIT_METHODS: &[&str] = &["prelim", "complete"];
const TYPES: &[&str] = &["stock", "etf"];
const RISK_STATS_PERIODS: &[&str] = &["monthly", "weekly", "daily"];
const RANK_PERF_METHOD: &[&str] = &["long", "short"];
const RANK_COLUMNS: &[&str] = &["ranks", "composite", "factor"];

/// The "Main" section.
pub fn main() -> Mapping {
    Mapping::new()
        .with("Operation", FieldSpec::structural(Rule::Text).required())
        .with("On Error", FieldSpec::structural(Rule::OneOf(ON_ERROR)))
        .with("Precision", FieldSpec::structural(Rule::Precision))
}

/// Vendor, point-in-time method and rank month.
pub fn request_context() -> Mapping {
    Mapping::new()
        .with("Vendor", FieldSpec::api("vendor", Rule::OneOf(VENDORS)))
        .with("PIT Method", FieldSpec::api("pitMethod", Rule::OneOf(PIT_METHODS)))
        .with("Rank Mon", FieldSpec::api("rankMon", Rule::Text))
}

/// Settings every operation accepts.
pub fn common_settings() -> Mapping {
    Mapping::new()
        .with("Type", FieldSpec::structural(Rule::OneOf(TYPES)))
        .layer(&request_context())
}

/// Iteration properties every iterating operation accepts.
pub fn common_iterations() -> Mapping {
    Mapping::new().with("Name", FieldSpec::structural(Rule::Text))
}

/// Properties that build the "screen" sub-object.
pub fn screen_definition() -> Mapping {
    Mapping::new()
        .with(
            "Universe",
            FieldSpec::api("universe", Rule::Universe).transform(Transform::Universe).in_screen(),
        )
        .with(
            "Ranking",
            FieldSpec::api("ranking", Rule::RankingSystem).transform(Transform::Ranking).in_screen(),
        )
        .with(
            "Rules",
            FieldSpec::api("rules", Rule::ScreenRules).transform(Transform::Rules).in_screen(),
        )
        .with(
            "Method",
            FieldSpec::api("method", Rule::Lookup(Lookup::ScreenMethod))
                .transform(Transform::Lookup(Lookup::ScreenMethod))
                .in_screen(),
        )
        .with("Max Num Holdings", FieldSpec::api("maxNumHoldings", Rule::PositiveInt).in_screen())
        .with("Benchmark", FieldSpec::api("benchmark", Rule::Text).in_screen())
}

/// A screen given by identifier rather than by definition.
pub fn screen_id() -> Mapping {
    Mapping::new().with("Screen", FieldSpec::api("screen", Rule::ScreenId))
}

/// Backtest period and trading settings.
pub fn backtest_period() -> Mapping {
    Mapping::new()
        .with(
            "Start Date",
            FieldSpec::api("startDt", Rule::Date).transform(Transform::Date).required(),
        )
        .with("End Date", FieldSpec::api("endDt", Rule::Date).transform(Transform::Date))
        .with(
            "Trans Price",
            FieldSpec::api("transPrice", Rule::Lookup(Lookup::TransPrice))
                .transform(Transform::Lookup(Lookup::TransPrice)),
        )
        .with("Slippage", FieldSpec::api("slippage", Rule::Number))
}

pub fn rolling_screen_settings() -> Mapping {
    common_settings()
        .layer(&screen_id())
        .layer(&screen_definition())
        .layer(&backtest_period())
        .with(
            "Frequency",
            FieldSpec::api("frequency", Rule::Lookup(Lookup::RollingFrequency))
                .transform(Transform::Lookup(Lookup::RollingFrequency)),
        )
        .with("Holding Period", FieldSpec::api("holdingPeriod", Rule::PositiveInt))
}

pub fn rolling_screen_iterations() -> Mapping {
    let mut overridable = rolling_screen_settings().without(&["Type", "Screen"]);
    overridable = overridable.with(
        "Start Date",
        FieldSpec::api("startDt", Rule::Date).transform(Transform::Date),
    );
    common_iterations().layer(&overridable)
}

pub fn rank_perf_settings() -> Mapping {
    common_settings()
        .layer(&screen_definition())
        .layer(&backtest_period())
        .with(
            "Ranking",
            FieldSpec::api("ranking", Rule::RankingSystem)
                .transform(Transform::Ranking)
                .in_screen()
                .required(),
        )
        .with(
            "Rebalance Frequency",
            FieldSpec::api("rebalFreq", Rule::Lookup(Lookup::BacktestFrequency))
                .transform(Transform::Lookup(Lookup::BacktestFrequency)),
        )
        .with("Buckets", FieldSpec::structural(Rule::PositiveInt).required())
        .without(&["Trans Price", "Method", "Max Num Holdings"])
}

pub fn rank_perf_iterations() -> Mapping {
    let overridable = rank_perf_settings()
        .without(&["Type", "Buckets"])
        .with("Ranking", FieldSpec::api("ranking", Rule::RankingSystem).transform(Transform::Ranking).in_screen())
        .with("Start Date", FieldSpec::api("startDt", Rule::Date).transform(Transform::Date));
    common_iterations().layer(&overridable)
}

pub fn screen_run_settings() -> Mapping {
    common_settings()
        .layer(&screen_id())
        .layer(&screen_definition())
        .with("As of Date", FieldSpec::api("asOfDt", Rule::Date).transform(Transform::Date))
}

pub fn screen_backtest_settings() -> Mapping {
    common_settings()
        .layer(&screen_id())
        .layer(&screen_definition())
        .layer(&backtest_period())
        .with(
            "Rebalance Frequency",
            FieldSpec::api("rebalFreq", Rule::Lookup(Lookup::BacktestFrequency))
                .transform(Transform::Lookup(Lookup::BacktestFrequency)),
        )
        .with("Risk Stats Period", FieldSpec::api("riskStatsPeriod", Rule::OneOf(RISK_STATS_PERIODS)))
}

pub fn data_settings() -> Mapping {
    Mapping::new()
        .with(
            "Start Date",
            FieldSpec::api("startDt", Rule::Date).transform(Transform::Date).required(),
        )
        .with("End Date", FieldSpec::api("endDt", Rule::Date).transform(Transform::Date))
        .with(
            "Frequency",
            FieldSpec::api("frequency", Rule::Lookup(Lookup::Frequency))
                .transform(Transform::Lookup(Lookup::Frequency)),
        )
        .with("P123 UIDs", FieldSpec::api("p123Uids", Rule::P123Uids).transform(Transform::Uids))
        .with("Tickers", FieldSpec::api("tickers", Rule::Symbols).transform(Transform::Symbols))
        .with("Cusips", FieldSpec::api("cusips", Rule::Symbols).transform(Transform::Symbols))
        .with("Include Names", FieldSpec::api("includeNames", Rule::Flag))
        .layer(&common_settings())
}

pub fn data_iterations() -> Mapping {
    Mapping::new()
        .with("Formula", FieldSpec::structural(Rule::Formula).required())
        .layer(&common_iterations())
}

pub fn data_universe_settings() -> Mapping {
    Mapping::new()
        .with("As of Date", FieldSpec::structural(Rule::DateOrDates).required())
        .with(
            "Universe",
            FieldSpec::api("universe", Rule::Universe).transform(Transform::Universe).required(),
        )
        .with("Formulas", FieldSpec::structural(Rule::Formulas).required())
        .with("Include Names", FieldSpec::api("includeNames", Rule::Flag))
        .layer(&common_settings())
}

pub fn ranks_settings() -> Mapping {
    Mapping::new()
        .with(
            "Ranking System",
            FieldSpec::api("rankingSystem", Rule::RankingSystem)
                .transform(Transform::Ranking)
                .required(),
        )
        .with("Universe", FieldSpec::api("universe", Rule::Universe).transform(Transform::Universe))
        .with(
            "As of Date",
            FieldSpec::api("asOfDt", Rule::Date).transform(Transform::Date).required(),
        )
        .with("Include Names", FieldSpec::api("includeNames", Rule::Flag))
        .with("Transaction Type", FieldSpec::api("transType", Rule::OneOf(RANK_PERF_METHOD)))
        .with(
            "Ranking Method",
            FieldSpec::api("rankingMethod", Rule::Lookup(Lookup::RankingMethod))
                .transform(Transform::Lookup(Lookup::RankingMethod)),
        )
        .with("Tickers", FieldSpec::api("tickers", Rule::Text))
        .with("Columns", FieldSpec::structural(Rule::OneOf(RANK_COLUMNS)))
        .layer(&common_settings())
}

pub fn ranks_period_settings() -> Mapping {
    ranks_settings()
        .without(&["As of Date", "Columns"])
        .with("Start Date", FieldSpec::structural(Rule::Date).required())
        .with("End Date", FieldSpec::structural(Rule::Date).required())
        .with("Frequency", FieldSpec::structural(Rule::Lookup(Lookup::Frequency)).required())
}

pub fn ranks_multi_settings() -> Mapping {
    ranks_settings().without(&["Ranking System", "Ranking Method", "Columns"])
}

pub fn ranks_multi_iterations() -> Mapping {
    let ranks = ranks_settings();
    let mut mapping = common_iterations();
    for name in ["Ranking System", "Ranking Method"] {
        if let Some(spec) = ranks.get(name) {
            mapping = mapping.with(name, *spec);
        }
    }
    mapping
}
