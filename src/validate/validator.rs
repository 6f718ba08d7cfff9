// src/validate/validator.rs
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::schema::{FieldSchema, FieldType, Schema};
use crate::config::ConfigLookup;
use crate::error::ValidationError;
use crate::record::{self, Record, Value};

static EMAIL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").unwrap());
static PHONE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+?[\d\s\-\(\)]{10,}$").unwrap());
static URL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://").unwrap());
static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}").unwrap());

/// Verdict plus every violation found; `errors` is empty iff `valid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            valid: errors.is_empty(),
            errors,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaValidator {
    schema: Schema,
}

impl SchemaValidator {
    pub fn new(
        definition: &serde_json::Value,
        config: &dyn ConfigLookup,
    ) -> Result<Self, ValidationError> {
        Schema::from_definition(definition, config).map(Self::from_schema)
    }

    pub fn from_file(
        path: impl AsRef<Path>,
        config: &dyn ConfigLookup,
    ) -> Result<Self, ValidationError> {
        let path = path.as_ref();
        let schema = Schema::from_file(path, config)?;
        tracing::info!(path = %path.display(), fields = schema.fields.len(), "schema loaded");
        Ok(Self::from_schema(schema))
    }

    pub fn from_schema(schema: Schema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn validate(&self, record: &Record) -> ValidationOutcome {
        let mut errors = Vec::new();

        let missing: Vec<&str> = self
            .schema
            .required_fields()
            .filter(|name| !record.contains_key(name))
            .collect();
        if !missing.is_empty() {
            errors.push(format!("Missing required fields: {}", missing.join(", ")));
        }

        if !self.schema.allow_extra_fields {
            let extra: Vec<&str> = record
                .keys()
                .filter(|k| !self.schema.fields.contains_key(*k) && !record::is_reserved_metadata(k))
                .collect();
            if !extra.is_empty() {
                errors.push(format!("Unexpected fields: {}", extra.join(", ")));
            }
        }

        for field in self.schema.fields.values() {
            if let Some(value) = record.get(&field.name) {
                self.check_field(field, value, &mut errors);
            }
        }

        ValidationOutcome::from_errors(errors)
    }

    fn check_field(&self, field: &FieldSchema, value: &Value, errors: &mut Vec<String>) {
        let name = &field.name;
        if value.is_blank() {
            if field.required {
                errors.push(format!("Field '{name}' is required but got null/empty"));
            }
            return;
        }

        if !type_matches(value, field.field_type, self.schema.strict_mode) {
            errors.push(format!(
                "Field '{name}' has invalid type. Expected {}, got {}",
                field.field_type,
                value.kind_name()
            ));
            return;
        }

        if field.field_type.is_numeric() {
            if let Some(n) = numeric(value) {
                if let Some(min) = field.min.filter(|min| n < *min) {
                    errors.push(format!("Field '{name}' value {value} below minimum {min}"));
                }
                if let Some(max) = field.max.filter(|max| n > *max) {
                    errors.push(format!("Field '{name}' value {value} above maximum {max}"));
                }
            }
        }

        if field.field_type == FieldType::String {
            let len = value.to_string().chars().count();
            if let Some(min) = field.min_length.filter(|min| len < *min) {
                errors.push(format!("Field '{name}' too short (min: {min})"));
            }
            if let Some(max) = field.max_length.filter(|max| len > *max) {
                errors.push(format!("Field '{name}' too long (max: {max})"));
            }
        }

        if let Some(re) = &field.pattern {
            if !re.is_match(&value.to_string()) {
                errors.push(format!("Field '{name}' does not match required pattern"));
            }
        }

        if let Some(allowed) = &field.allowed {
            if !allowed.iter().any(|a| enum_matches(value, a)) {
                let listed: Vec<String> = allowed.iter().map(ToString::to_string).collect();
                errors.push(format!(
                    "Field '{name}' value '{value}' not in allowed values: [{}]",
                    listed.join(", ")
                ));
            }
        }
    }
}

/// Textual values are coerced per tag; other values must carry the tag's own kind.
fn type_matches(value: &Value, ty: FieldType, strict: bool) -> bool {
    match value {
        Value::Text(s) => match ty {
            FieldType::Integer => s.trim().parse::<i64>().is_ok(),
            FieldType::Float => s.trim().parse::<f64>().is_ok(),
            FieldType::Boolean => {
                matches!(s.to_ascii_lowercase().as_str(), "true" | "false" | "1" | "0")
            }
            FieldType::Email => EMAIL.is_match(s),
            FieldType::Phone => PHONE.is_match(s),
            FieldType::Url => URL.is_match(s),
            FieldType::Date | FieldType::Datetime => ISO_DATE.is_match(s),
            FieldType::String => true,
        },
        Value::Int(_) => ty == FieldType::Integer || (ty == FieldType::Float && !strict),
        Value::Float(_) => ty == FieldType::Float,
        Value::Bool(_) => ty == FieldType::Boolean,
        Value::Null => false,
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Int(i) => Some(*i as f64),
        Value::Float(x) => Some(*x),
        Value::Text(s) => s.trim().parse().ok(),
        Value::Bool(_) | Value::Null => None,
    }
}

/// Equal values match; a textual value also matches by its rendered form.
fn enum_matches(value: &Value, allowed: &Value) -> bool {
    value == allowed
        || (matches!(value, Value::Text(_)) && value.to_string() == allowed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textual_coercion_per_tag() {
        assert!(type_matches(&" 42 ".into(), FieldType::Integer, true));
        assert!(!type_matches(&"4.2".into(), FieldType::Integer, true));
        assert!(type_matches(&"4.2".into(), FieldType::Float, true));
        assert!(type_matches(&"TRUE".into(), FieldType::Boolean, true));
        assert!(!type_matches(&"yes".into(), FieldType::Boolean, true));
        assert!(type_matches(&"a@b.co".into(), FieldType::Email, true));
        assert!(!type_matches(&"a@b@c.co".into(), FieldType::Email, true));
        assert!(type_matches(&"+1 (555) 123-4567".into(), FieldType::Phone, true));
        assert!(!type_matches(&"555-1234".into(), FieldType::Phone, true));
        assert!(type_matches(&"https://x.test".into(), FieldType::Url, true));
        assert!(!type_matches(&"ftp://x.test".into(), FieldType::Url, true));
        assert!(type_matches(&"2024-01-31T10:00:00Z".into(), FieldType::Datetime, true));
        assert!(!type_matches(&"31/01/2024".into(), FieldType::Date, true));
    }

    #[test]
    fn native_kinds_and_strict_mode() {
        assert!(type_matches(&Value::Int(3), FieldType::Integer, true));
        assert!(!type_matches(&Value::Int(3), FieldType::Float, true));
        assert!(type_matches(&Value::Int(3), FieldType::Float, false));
        assert!(!type_matches(&Value::Float(3.5), FieldType::Integer, false));
        assert!(!type_matches(&Value::Int(3), FieldType::String, false));
        assert!(type_matches(&Value::Bool(true), FieldType::Boolean, true));
    }

    #[test]
    fn enum_text_matches_rendered_number() {
        assert!(enum_matches(&"1".into(), &Value::Int(1)));
        assert!(!enum_matches(&Value::Int(1), &"1".into()));
        assert!(enum_matches(&Value::Int(1), &Value::Int(1)));
    }
}
