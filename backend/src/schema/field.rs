//! Field descriptors and the layered mappings built from them.

use super::rules::Rule;
use super::transform::Transform;

/// Where a generated parameter lands in the request payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    TopLevel,
    /// Inside the nested `screen` object
    Screen,
}

/// How one document property is validated and forwarded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    /// API parameter name; `None` for properties the engine consumes itself
    pub field: Option<&'static str>,
    pub rule: Rule,
    pub transform: Option<Transform>,
    pub required: bool,
    pub target: Target,
}

impl FieldSpec {
    /// A property that is validated but never forwarded.
    pub const fn structural(rule: Rule) -> Self {
        Self {
            field: None,
            rule,
            transform: None,
            required: false,
            target: Target::TopLevel,
        }
    }

    /// A property forwarded to the API as `field`.
    pub const fn api(field: &'static str, rule: Rule) -> Self {
        Self {
            field: Some(field),
            rule,
            transform: None,
            required: false,
            target: Target::TopLevel,
        }
    }

    pub fn transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn in_screen(mut self) -> Self {
        self.target = Target::Screen;
        self
    }
}

/// Ordered property table. Re-declaring a name replaces the earlier
/// descriptor in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    fields: Vec<(&'static str, FieldSpec)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &'static str, spec: FieldSpec) -> Self {
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = spec,
            None => self.fields.push((name, spec)),
        }
        self
    }

    /// Apply every entry of `other` on top of this mapping.
    pub fn layer(self, other: &Mapping) -> Self {
        other
            .fields
            .iter()
            .fold(self, |mapping, (name, spec)| mapping.with(name, *spec))
    }

    pub fn without(mut self, names: &[&str]) -> Self {
        self.fields.retain(|(n, _)| !names.contains(n));
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|(n, _)| *n == name).map(|(_, s)| s)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldSpec)> {
        self.fields.iter().map(|(n, s)| (*n, s))
    }

    /// Names of the required properties, in declaration order.
    pub fn required(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().filter(|(_, s)| s.required).map(|(n, _)| *n)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
