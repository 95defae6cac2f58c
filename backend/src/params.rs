//! Request parameter generation.
//!
//! Annotated settings become the literal payload: transforms are applied and
//! screen-targeted values are gathered into a nested `screen` object.

use serde_json::{json, Map, Value};

use crate::client::ApiClient;
use crate::document::{Setting, Settings};
use crate::error::{GenerateError, GenerateResult};
use crate::schema::Target;

/// Request payload.
pub type Params = Map<String, Value>;

/// Generate request parameters from a validated section.
///
/// `type_settings` supplies the `Type` of a lazily created screen; for an
/// iteration section that is the document's default settings.
pub async fn generate_params(
    section: &Settings,
    type_settings: &Settings,
    client: &dyn ApiClient,
) -> GenerateResult<Params> {
    let mut params = Params::new();
    for (name, setting) in section.iter() {
        let Setting::Annotated { value, spec } = setting else {
            continue;
        };
        let Some(field) = spec.field else {
            continue;
        };

        let value = match spec.transform {
            Some(transform) => transform
                .apply(value, type_settings, client)
                .await?
                .ok_or_else(|| GenerateError::Unresolved { property: name.to_string() })?,
            None => value.clone(),
        };

        match spec.target {
            Target::TopLevel => {
                params.insert(field.to_string(), value);
            }
            Target::Screen => {
                let screen = params
                    .entry("screen")
                    .or_insert_with(|| json!({ "type": type_settings.str("Type").unwrap_or_default() }));
                let screen = screen.as_object_mut().ok_or(GenerateError::ScreenConflict)?;
                screen.insert(field.to_string(), value);
            }
        }
    }
    Ok(params)
}

/// Overlay iteration parameters on the defaults.
///
/// Every key is a shallow override except `screen`, which is merged key by
/// key when both sides are objects. `defaults` is left untouched.
pub fn merge_iteration(defaults: &Params, iteration: Params) -> Params {
    let mut params = defaults.clone();
    for (key, value) in iteration {
        if key == "screen" {
            if let (Some(Value::Object(base)), Value::Object(over)) = (params.get_mut("screen"), &value) {
                base.extend(over.clone());
                continue;
            }
        }
        params.insert(key, value);
    }
    params
}
