//! Configuration document validation.
//!
//! A document has three sections: `Main`, `Default Settings` and, for
//! iterating operations, `Iterations`. [`process_input`] walks them against
//! the operation's mappings and stops at the first fault. Properties that are
//! forwarded to the API come out annotated with their [`FieldSpec`] so
//! parameter generation can find the right transform.

use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{LoadError, Location, ValidationError, ValidationResult};
use crate::logs::Logger;
use crate::schema::{FieldSpec, Mapping, OperationKind, MAIN};

pub const MAIN_SECTION: &str = "Main";
pub const SETTINGS_SECTION: &str = "Default Settings";
pub const ITERATIONS_SECTION: &str = "Iterations";

/// `Type` used when the document does not set one
pub const DEFAULT_TYPE: &str = "Stock";

// =============================================================================
// Settings
// =============================================================================

/// A validated property value.
#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    /// Consumed by the engine only
    Plain(Value),
    /// Forwarded to the API through `spec`
    Annotated { value: Value, spec: FieldSpec },
}

impl Setting {
    pub fn value(&self) -> &Value {
        match self {
            Setting::Plain(value) | Setting::Annotated { value, .. } => value,
        }
    }
}

/// Validated section, in document order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    entries: Vec<(String, Setting)>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, setting: Setting) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = setting,
            None => self.entries.push((name, setting)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Setting> {
        self.entries.iter().find(|(n, _)| n == name).map(|(_, s)| s)
    }

    /// Raw value of a property.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).map(Setting::value)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.value(name).and_then(Value::as_str)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.value(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Setting)> {
        self.entries.iter().map(|(n, s)| (n.as_str(), s))
    }

    /// Lowercased asset type, `stock` unless set.
    pub fn asset_type(&self) -> String {
        self.str("Type").unwrap_or(DEFAULT_TYPE).trim().to_lowercase()
    }
}

// =============================================================================
// Document
// =============================================================================

/// A validated configuration document.
#[derive(Debug, Clone)]
pub struct Document {
    pub kind: OperationKind,
    /// `On Error` is not `stop`
    pub continue_on_error: bool,
    pub precision: Option<u64>,
    pub settings: Settings,
    pub iterations: Vec<Settings>,
}

/// Validate `raw`, logging the first fault found.
pub fn process_input(raw: &Value, logger: &dyn Logger) -> ValidationResult<Document> {
    validate(raw).map_err(|e| {
        logger.error(&e.to_string());
        e
    })
}

fn validate(raw: &Value) -> ValidationResult<Document> {
    let root = raw.as_object().ok_or(ValidationError::NotADocument)?;
    if !root.contains_key(MAIN_SECTION) {
        return Err(ValidationError::MissingSection(MAIN_SECTION));
    }
    if !root.contains_key(SETTINGS_SECTION) {
        return Err(ValidationError::MissingSection(SETTINGS_SECTION));
    }

    // Main
    let main_data = section_map(root, MAIN_SECTION)?;
    let main_location = Location::Section(MAIN_SECTION);
    let main = process_section(main_location, &MAIN, main_data)?;
    check_required(main_location, &MAIN, main_data)?;

    let kind = main
        .str("Operation")
        .and_then(OperationKind::from_name)
        .ok_or_else(|| ValidationError::UnknownOperation(main.str("Operation").unwrap_or_default().to_string()))?;
    let spec = kind.spec();

    // Section set
    if spec.has_iterations() && !root.contains_key(ITERATIONS_SECTION) {
        return Err(ValidationError::MissingSection(ITERATIONS_SECTION));
    }
    let (allowed, expected): (&[&str], _) = if spec.has_iterations() {
        (
            &[MAIN_SECTION, SETTINGS_SECTION, ITERATIONS_SECTION],
            "\"Main\", \"Default Settings\" and \"Iterations\" sections",
        )
    } else {
        (&[MAIN_SECTION, SETTINGS_SECTION], "\"Main\" and \"Default Settings\" sections")
    };
    if let Some(extra) = root.keys().find(|k| !allowed.contains(&k.as_str())) {
        return Err(ValidationError::UnexpectedSection { section: extra.clone(), expected });
    }

    // Default Settings
    let settings_data = section_map(root, SETTINGS_SECTION)?;
    let settings_location = Location::Section(SETTINGS_SECTION);
    let mut settings = process_section(settings_location, &spec.settings, settings_data)?;
    check_required(settings_location, &spec.settings, settings_data)?;
    if let Some(check) = spec.check {
        check.check(settings_data)?;
    }
    if !settings.contains("Type") {
        settings.insert("Type", Setting::Plain(Value::from(DEFAULT_TYPE)));
    }

    // Iterations
    let mut iterations = Vec::new();
    if let Some(mapping) = &spec.iterations {
        let entries = root
            .get(ITERATIONS_SECTION)
            .and_then(Value::as_array)
            .ok_or(ValidationError::InvalidSection(ITERATIONS_SECTION))?;
        for (idx, entry) in entries.iter().enumerate() {
            let data = entry.as_object().ok_or(ValidationError::InvalidIteration(idx))?;
            let location = Location::Iteration(idx);
            iterations.push(process_section(location, mapping, data)?);
            check_required(location, mapping, data)?;
        }
    }

    let continue_on_error = main
        .str("On Error")
        .map_or(true, |policy| !policy.trim().eq_ignore_ascii_case("stop"));

    Ok(Document {
        kind,
        continue_on_error,
        precision: main.value("Precision").and_then(Value::as_u64),
        settings,
        iterations,
    })
}

fn section_map<'a>(root: &'a Map<String, Value>, name: &'static str) -> ValidationResult<&'a Map<String, Value>> {
    root.get(name)
        .and_then(Value::as_object)
        .ok_or(ValidationError::InvalidSection(name))
}

/// Validate each property of a section against `mapping`.
pub fn process_section(
    location: Location,
    mapping: &Mapping,
    data: &Map<String, Value>,
) -> ValidationResult<Settings> {
    let mut settings = Settings::new();
    for (name, value) in data {
        let spec = mapping.get(name).ok_or_else(|| ValidationError::UnknownProperty {
            location,
            property: name.clone(),
        })?;

        let verdict = spec.rule.check(value);
        if !verdict.is_valid() {
            return Err(ValidationError::InvalidProperty {
                location,
                property: name.clone(),
                reason: verdict.message().map(str::to_string),
            });
        }

        let setting = if spec.field.is_some() {
            Setting::Annotated { value: value.clone(), spec: *spec }
        } else {
            Setting::Plain(value.clone())
        };
        settings.insert(name.clone(), setting);
    }
    Ok(settings)
}

fn check_required(location: Location, mapping: &Mapping, data: &Map<String, Value>) -> ValidationResult<()> {
    match mapping.required().find(|name| !data.contains_key(*name)) {
        Some(name) => Err(ValidationError::MissingProperty {
            location,
            property: name.to_string(),
        }),
        None => Ok(()),
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Parse a document from text; `extension` picks YAML or JSON.
pub fn parse_document(text: &str, extension: &str) -> Result<Value, LoadError> {
    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => Ok(serde_yaml::from_str(text)?),
        "json" => Ok(serde_json::from_str(text)?),
        other => Err(LoadError::UnsupportedFormat(other.to_string())),
    }
}

/// Read a YAML or JSON document from disk.
pub async fn load_document(path: &Path) -> Result<Value, LoadError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_string();
    if !matches!(extension.to_lowercase().as_str(), "yaml" | "yml" | "json") {
        return Err(LoadError::UnsupportedFormat(path.display().to_string()));
    }
    let text = tokio::fs::read_to_string(path).await?;
    parse_document(&text, &extension)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LogCapture;
    use serde_json::json;
    use std::io::Write;

    fn data_doc() -> Value {
        json!({
            "Main": {"Operation": "Data"},
            "Default Settings": {"Start Date": "2020-01-01", "Tickers": "AAPL"},
            "Iterations": [{"Formula": "Close(0)"}]
        })
    }

    fn first_error(doc: Value) -> String {
        let logger = LogCapture::new();
        let err = process_input(&doc, &logger).unwrap_err();
        assert_eq!(logger.errors(), vec![err.to_string()]);
        err.to_string()
    }

    #[test]
    fn test_valid_data_document() {
        let doc = process_input(&data_doc(), &LogCapture::new()).unwrap();
        assert_eq!(doc.kind, OperationKind::Data);
        assert!(doc.continue_on_error);
        assert_eq!(doc.iterations.len(), 1);
        assert_eq!(doc.settings.value("Type"), Some(&json!("Stock")));
        assert!(matches!(doc.settings.get("Tickers"), Some(Setting::Annotated { .. })));
        assert!(matches!(doc.iterations[0].get("Formula"), Some(Setting::Plain(_))));
    }

    #[test]
    fn test_missing_sections() {
        assert_eq!(first_error(json!([1, 2])), "Input is not valid");
        assert_eq!(first_error(json!({"Default Settings": {}})), "\"Main\" section not found");
        assert_eq!(
            first_error(json!({"Main": {"Operation": "Data"}})),
            "\"Default Settings\" section not found"
        );
        let mut doc = data_doc();
        doc.as_object_mut().unwrap().remove("Iterations");
        assert_eq!(first_error(doc), "\"Iterations\" section not found");
    }

    #[test]
    fn test_unknown_operation_and_extra_section() {
        let mut doc = data_doc();
        doc["Main"]["Operation"] = json!("Backtest");
        assert_eq!(first_error(doc), "Invalid value for \"Operation\" property in \"Main\" section");

        let doc = json!({
            "Main": {"Operation": "screenrun"},
            "Default Settings": {"Screen": 1234},
            "Iterations": []
        });
        assert!(first_error(doc).starts_with("Unexpected section \"Iterations\""));
    }

    #[test]
    fn test_property_errors_name_location() {
        let mut doc = data_doc();
        doc["Default Settings"]["Start Date"] = json!("01/01/2020");
        assert_eq!(
            first_error(doc),
            "Invalid value for \"Start Date\" property in \"Default Settings\" section"
        );

        let mut doc = data_doc();
        doc["Iterations"] = json!([{"Formula": "Close(0)"}, {"Formula": "x", "Colour": "red"}]);
        assert_eq!(first_error(doc), "Unrecognized property \"Colour\" in iteration #2");

        let mut doc = data_doc();
        doc["Iterations"] = json!([{"Name": "no formula"}]);
        assert_eq!(
            first_error(doc),
            "iteration #1 does not contain the required property \"Formula\""
        );

        let mut doc = data_doc();
        doc["Iterations"] = json!(["Close(0)"]);
        assert_eq!(first_error(doc), "Iteration #1 is not valid");
    }

    #[test]
    fn test_section_check_runs_after_properties() {
        let mut doc = data_doc();
        doc["Default Settings"]["Cusips"] = json!("037833100");
        assert!(first_error(doc).contains("can only contain one of"));
    }

    #[test]
    fn test_on_error_and_precision() {
        let mut doc = data_doc();
        doc["Main"]["On Error"] = json!("Stop");
        doc["Main"]["Precision"] = json!(4);
        let doc = process_input(&doc, &LogCapture::new()).unwrap();
        assert!(!doc.continue_on_error);
        assert_eq!(doc.precision, Some(4));
    }

    #[test]
    fn test_parse_yaml_keeps_dates_as_strings() {
        let text = "Main:\n  Operation: Data\nDefault Settings:\n  Start Date: 2020-01-01\n  Tickers: AAPL\nIterations:\n  - Formula: Close(0)\n";
        let raw = parse_document(text, "yml").unwrap();
        assert_eq!(raw["Default Settings"]["Start Date"], json!("2020-01-01"));
        assert!(process_input(&raw, &LogCapture::new()).is_ok());
        assert!(matches!(parse_document("", "ini"), Err(LoadError::UnsupportedFormat(_))));
    }

    #[tokio::test]
    async fn test_load_document_from_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{}", data_doc()).unwrap();
        let raw = load_document(file.path()).await.unwrap();
        assert_eq!(raw, data_doc());

        let err = load_document(Path::new("doc.txt")).await.unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedFormat(_)));
    }
}
