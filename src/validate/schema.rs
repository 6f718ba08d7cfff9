// src/validate/schema.rs
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use crate::config::ConfigLookup;
use crate::error::ValidationError;
use crate::record::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Email,
    Phone,
    Url,
}

impl FieldType {
    pub const ALL: [FieldType; 9] = [
        FieldType::String,
        FieldType::Integer,
        FieldType::Float,
        FieldType::Boolean,
        FieldType::Date,
        FieldType::Datetime,
        FieldType::Email,
        FieldType::Phone,
        FieldType::Url,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Datetime => "datetime",
            FieldType::Email => "email",
            FieldType::Phone => "phone",
            FieldType::Url => "url",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }
}

impl FromStr for FieldType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FieldType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One compiled field definition.
#[derive(Debug, Clone)]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    /// Anchored so it must match the whole value.
    pub pattern: Option<Regex>,
    pub allowed: Option<Vec<Value>>,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            required: false,
            min: None,
            max: None,
            min_length: None,
            max_length: None,
            pattern: None,
            allowed: None,
        }
    }

    fn parse(name: &str, def: &Json) -> Result<Self, ValidationError> {
        let def = def
            .as_object()
            .ok_or_else(|| ValidationError::NotATable(name.to_string()))?;
        let tag = match def.get("type") {
            Some(Json::String(tag)) => tag,
            Some(other) => {
                return Err(ValidationError::UnsupportedType {
                    field: name.to_string(),
                    tag: other.to_string(),
                })
            }
            None => return Err(ValidationError::MissingType(name.to_string())),
        };
        let field_type = tag
            .parse::<FieldType>()
            .map_err(|_| ValidationError::UnsupportedType {
                field: name.to_string(),
                tag: tag.clone(),
            })?;

        let opts = Options { field: name, def };
        Ok(Self {
            name: name.to_string(),
            field_type,
            required: opts.bool("required")?.unwrap_or(false),
            min: opts.number("min")?,
            max: opts.number("max")?,
            min_length: opts.length("min_length")?,
            max_length: opts.length("max_length")?,
            pattern: opts.pattern()?,
            allowed: opts.allowed()?,
        })
    }
}

/// Typed access to the options of one field definition.
struct Options<'a> {
    field: &'a str,
    def: &'a Map<String, Json>,
}

impl Options<'_> {
    fn invalid(&self, option: &'static str, message: impl Into<String>) -> ValidationError {
        ValidationError::InvalidOption {
            field: self.field.to_string(),
            option,
            message: message.into(),
        }
    }

    fn bool(&self, option: &'static str) -> Result<Option<bool>, ValidationError> {
        match self.def.get(option) {
            None => Ok(None),
            Some(Json::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.invalid(option, format!("expected boolean, got {other}"))),
        }
    }

    fn number(&self, option: &'static str) -> Result<Option<f64>, ValidationError> {
        match self.def.get(option) {
            None => Ok(None),
            Some(Json::Number(n)) => n
                .as_f64()
                .map(Some)
                .ok_or_else(|| self.invalid(option, "number out of range")),
            Some(other) => Err(self.invalid(option, format!("expected number, got {other}"))),
        }
    }

    fn length(&self, option: &'static str) -> Result<Option<usize>, ValidationError> {
        match self.def.get(option) {
            None => Ok(None),
            Some(Json::Number(n)) => n
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(Some)
                .ok_or_else(|| self.invalid(option, "expected a non-negative integer")),
            Some(other) => Err(self.invalid(option, format!("expected integer, got {other}"))),
        }
    }

    fn pattern(&self) -> Result<Option<Regex>, ValidationError> {
        match self.def.get("pattern") {
            None => Ok(None),
            Some(Json::String(p)) => Regex::new(&format!("^(?:{p})$"))
                .map(Some)
                .map_err(|e| ValidationError::InvalidPattern {
                    field: self.field.to_string(),
                    message: e.to_string(),
                }),
            Some(other) => Err(self.invalid("pattern", format!("expected string, got {other}"))),
        }
    }

    fn allowed(&self) -> Result<Option<Vec<Value>>, ValidationError> {
        match self.def.get("enum") {
            None => Ok(None),
            Some(Json::Array(items)) => items
                .iter()
                .map(|item| {
                    Value::from_json(item.clone())
                        .ok_or_else(|| self.invalid("enum", "allowed values must be scalars"))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Some),
            Some(other) => Err(self.invalid("enum", format!("expected list, got {other}"))),
        }
    }
}

/// Compiled schema: fields in declaration order plus validator-level flags.
#[derive(Debug, Clone)]
pub struct Schema {
    pub fields: IndexMap<String, FieldSchema>,
    /// When off, integer values also satisfy `float` fields.
    pub strict_mode: bool,
    pub allow_extra_fields: bool,
}

impl Schema {
    /// Compiles a definition with a top-level `fields` table. Flags come from
    /// `validation.schema.*`.
    pub fn from_definition(
        definition: &Json,
        config: &dyn ConfigLookup,
    ) -> Result<Self, ValidationError> {
        let fields = definition
            .get("fields")
            .and_then(Json::as_object)
            .ok_or(ValidationError::MissingFields)?;
        let fields = fields
            .iter()
            .map(|(name, def)| FieldSchema::parse(name, def).map(|f| (name.clone(), f)))
            .collect::<Result<IndexMap<_, _>, _>>()?;
        Ok(Self {
            fields,
            strict_mode: config.get_bool("validation.schema.strict_mode", true),
            allow_extra_fields: config.get_bool("validation.schema.allow_extra_fields", false),
        })
    }

    /// Loads a TOML or JSON schema document.
    pub fn from_file(path: &Path, config: &dyn ConfigLookup) -> Result<Self, ValidationError> {
        if !path.exists() {
            return Err(ValidationError::SchemaFileNotFound(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|e| ValidationError::SchemaParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let definition =
            parse_document(&content, &ext).map_err(|message| ValidationError::SchemaParse {
                path: path.to_path_buf(),
                message,
            })?;
        Self::from_definition(&definition, config)
    }

    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .values()
            .filter(|f| f.required)
            .map(|f| f.name.as_str())
    }
}

/// Extension first; without a usable hint, sniff JSON then TOML.
fn parse_document(s: &str, hint_ext: &str) -> Result<Json, String> {
    let parse_toml = |s: &str| toml::from_str::<Json>(s).map_err(|e| e.to_string());
    let parse_json = |s: &str| serde_json::from_str::<Json>(s).map_err(|e| e.to_string());
    match hint_ext {
        "toml" => parse_toml(s),
        "json" => parse_json(s),
        _ => {
            let looks_json = s.trim_start().starts_with('{');
            if looks_json {
                parse_json(s).or_else(|_| parse_toml(s))
            } else {
                parse_toml(s).or_else(|_| parse_json(s))
            }
        }
    }
}
