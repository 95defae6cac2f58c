//! Formula values for every security of a universe on one date.

use async_trait::async_trait;
use serde_json::Value;

use super::response::array;
use super::{Executor, Outcome, RunContext};
use crate::client::Request;
use crate::error::{OperationError, OperationResult};
use crate::output::{Cell, Column, Row, PREVIEW_ROWS};
use crate::schema::rules::{parse_date, DATE_FORMAT};

/// Longest formula shown as a column name
const MAX_COLUMN_NAME: usize = 50;

/// A formula and the name of its column.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedFormula {
    pub name: String,
    pub formula: String,
}

/// Formulas given as plain strings or single `name: formula` pairs.
pub fn named_formulas(value: &Value) -> Vec<NamedFormula> {
    let text = |v: &Value| v.as_str().map_or_else(|| v.to_string(), str::to_string);
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|item| match item {
            Value::Object(named) => named.iter().next().map(|(name, formula)| NamedFormula {
                name: name.clone(),
                formula: text(formula),
            }),
            other => Some(NamedFormula {
                name: text(other),
                formula: text(other),
            }),
        })
        .collect()
}

pub struct DataUniverse;

#[async_trait]
impl Executor for DataUniverse {
    async fn run(&mut self, ctx: &mut RunContext) -> OperationResult<Outcome> {
        let settings = &ctx.document.settings;
        let formulas = named_formulas(settings.value("Formulas").unwrap_or(&Value::Null));
        let include_names = settings.flag("Include Names");
        let as_of = settings
            .value("As of Date")
            .map(|v| v.as_array().and_then(|dates| dates.first()).unwrap_or(v))
            .and_then(parse_date)
            .ok_or_else(|| OperationError::Internal("\"As of Date\" is not a date".into()))?;

        let list = formulas.iter().map(|f| Value::from(f.formula.as_str())).collect();
        ctx.defaults.insert("formulas".to_string(), Value::Array(list));
        ctx.defaults
            .insert("asOfDt".to_string(), Value::from(as_of.format(DATE_FORMAT).to_string()));

        let json = match ctx.submit(Request::DataUniverse, &ctx.defaults).await {
            Ok(json) => json,
            Err(e) => {
                ctx.logger.error(&e.to_string());
                return Ok(Outcome::Failed);
            }
        };

        let rows = universe_rows(&json, include_names)?;
        let widest = |col: usize, min: usize| {
            rows.iter()
                .take(PREVIEW_ROWS)
                .filter_map(|r| r.get(col))
                .map(Cell::width)
                .fold(min, usize::max)
        };
        let mut columns = vec![Column::left("P123 UID", 10), Column::left("Ticker", widest(1, 6))];
        if include_names {
            columns.push(Column::left("Company Name", widest(2, 12)));
        }
        for formula in &formulas {
            let name: String = formula.name.chars().take(MAX_COLUMN_NAME).collect();
            let length = name.chars().count().max(12);
            columns.push(Column::right(name).with_length(length));
        }

        ctx.begin_table(&columns);
        for row in rows {
            ctx.emit(row);
        }
        Ok(Outcome::Success)
    }
}

/// One row per security: identity cells, then one value per formula.
pub fn universe_rows(json: &Value, include_names: bool) -> OperationResult<Vec<Row>> {
    let uids = array(json, "p123Uids")?;
    let tickers = array(json, "tickers")?;
    let names = if include_names { Some(array(json, "names")?) } else { None };
    let data = array(json, "data")?;
    let at = |values: &[Value], idx: usize| values.get(idx).map_or(Cell::Na, Cell::from);

    let rows = uids
        .iter()
        .enumerate()
        .map(|(idx, uid)| {
            let mut row = vec![Cell::from(uid), at(tickers, idx)];
            if let Some(names) = names {
                row.push(at(names, idx));
            }
            for column in data {
                let values = column.as_array().map(Vec::as_slice).unwrap_or_default();
                row.push(at(values, idx));
            }
            row
        })
        .collect();
    Ok(rows)
}
