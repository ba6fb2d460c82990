use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::datatype::{FieldKind, Value};
use crate::error::{LivelistError, Result};

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
}

/// How a field is filled in when a record is created without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldDefault {
    /// The field must be given explicitly.
    Required,
    Constant(Value),
    /// The commit-time clock; only valid on `Time` fields.
    Now,
    /// A fresh v4 UUID rendered as text; only valid on `Text` fields.
    Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    name: String,
    kind: FieldKind,
    default: FieldDefault,
    indexed: bool,
}
impl Field {
    pub fn new(name: &str, kind: FieldKind) -> Self {
        Self {
            name: name.to_owned(),
            kind,
            default: FieldDefault::Required,
            indexed: false,
        }
    }
    pub fn with_default(mut self, default: FieldDefault) -> Self {
        self.default = default;
        self
    }
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn kind(&self) -> FieldKind {
        self.kind
    }
    pub fn default(&self) -> &FieldDefault {
        &self.default
    }
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }
    /// Produce the default value for this field, if it has one.
    pub fn default_value(&self) -> Option<Value> {
        match &self.default {
            FieldDefault::Required => None,
            FieldDefault::Constant(v) => Some(v.clone()),
            FieldDefault::Now => Some(Value::Time(Utc::now())),
            FieldDefault::Uuid => Some(Value::Text(uuid::Uuid::new_v4().to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    primary_key: Option<String>,
}
impl Schema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            fields: Vec::new(),
            primary_key: None,
        }
    }
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }
    pub fn primary_key(mut self, field_name: &str) -> Self {
        self.primary_key = Some(field_name.to_owned());
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }
    pub fn primary_key_name(&self) -> Option<&str> {
        self.primary_key.as_deref()
    }
    /// Position of a field in storage order.
    pub fn position(&self, field_name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == field_name)
    }
    pub fn primary_key_position(&self) -> Option<usize> {
        self.primary_key.as_deref().and_then(|k| self.position(k))
    }
    /// Like [`Schema::position`] but reports an unknown field as an error.
    pub fn require(&self, field_name: &str) -> Result<usize> {
        self.position(field_name)
            .ok_or_else(|| LivelistError::UnknownField {
                collection: self.name.clone(),
                field: field_name.to_owned(),
            })
    }
    /// Check that the value fits the field at `position`.
    pub fn check(&self, position: usize, value: &Value) -> Result<()> {
        let field = &self.fields[position];
        if field.kind != value.kind() {
            return Err(LivelistError::TypeMismatch {
                field: field.name.clone(),
                expected: field.kind.name(),
                found: value.kind().name(),
            });
        }
        Ok(())
    }
    pub fn validate(&self) -> Result<()> {
        if !IDENTIFIER.is_match(&self.name) {
            return Err(LivelistError::Schema(format!(
                "'{}' is not a valid collection name",
                self.name
            )));
        }
        if self.fields.is_empty() {
            return Err(LivelistError::Schema(format!(
                "collection '{}' declares no fields",
                self.name
            )));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if !IDENTIFIER.is_match(&field.name) {
                return Err(LivelistError::Schema(format!(
                    "'{}' is not a valid field name in '{}'",
                    field.name, self.name
                )));
            }
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(LivelistError::Schema(format!(
                    "field '{}' is declared twice in '{}'",
                    field.name, self.name
                )));
            }
            let fits = match (&field.default, field.kind) {
                (FieldDefault::Required, _) => true,
                (FieldDefault::Constant(v), kind) => v.kind() == kind,
                (FieldDefault::Now, FieldKind::Time) => true,
                (FieldDefault::Uuid, FieldKind::Text) => true,
                _ => false,
            };
            if !fits {
                return Err(LivelistError::Schema(format!(
                    "default of field '{}' does not fit its kind {}",
                    field.name, field.kind
                )));
            }
        }
        if let Some(key) = &self.primary_key {
            if self.position(key).is_none() {
                return Err(LivelistError::Schema(format!(
                    "primary key '{}' is not a field of '{}'",
                    key, self.name
                )));
            }
        }
        Ok(())
    }
}
