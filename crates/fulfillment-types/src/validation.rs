//! Configuration validation for pluggable implementations.
//!
//! Storage and settlement backends receive their configuration as raw TOML
//! tables. Each backend describes the table it expects with a [`Schema`] and
//! the builder validates it before constructing the backend.

use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur during configuration validation.
#[derive(Debug, Error)]
pub enum ValidationError {
	#[error("Missing required field: {0}")]
	MissingField(String),
	#[error("Invalid value for field '{field}': {message}")]
	InvalidValue { field: String, message: String },
	#[error("Type mismatch for field '{field}': expected {expected}, got {actual}")]
	TypeMismatch {
		field: String,
		expected: String,
		actual: String,
	},
}

/// Expected type of a configuration field.
#[derive(Debug)]
pub enum FieldType {
	String,
	/// An integer with optional inclusive bounds.
	Integer { min: Option<i64>, max: Option<i64> },
	/// A float with optional inclusive bounds. Integers are accepted too.
	Float { min: Option<f64>, max: Option<f64> },
	/// A monetary amount written as a string ("0.50") or a number.
	Decimal,
	Boolean,
	Table(Schema),
}

/// Custom check run after the type check passes.
pub type FieldValidator = Box<dyn Fn(&toml::Value) -> Result<(), String> + Send + Sync>;

pub struct Field {
	pub name: String,
	pub field_type: FieldType,
	pub validator: Option<FieldValidator>,
}

impl std::fmt::Debug for Field {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Field")
			.field("name", &self.name)
			.field("field_type", &self.field_type)
			.field("validator", &self.validator.is_some())
			.finish()
	}
}

impl Field {
	pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
		Self {
			name: name.into(),
			field_type,
			validator: None,
		}
	}

	pub fn with_validator<F>(mut self, validator: F) -> Self
	where
		F: Fn(&toml::Value) -> Result<(), String> + Send + Sync + 'static,
	{
		self.validator = Some(Box::new(validator));
		self
	}

	fn check(&self, prefix: &str, value: &toml::Value) -> Result<(), ValidationError> {
		let name = qualified(prefix, &self.name);
		check_type(&name, value, &self.field_type)?;
		if let Some(validator) = &self.validator {
			validator(value).map_err(|message| ValidationError::InvalidValue {
				field: name,
				message,
			})?;
		}
		Ok(())
	}
}

/// Required and optional fields of a TOML table.
#[derive(Debug)]
pub struct Schema {
	pub required: Vec<Field>,
	pub optional: Vec<Field>,
}

impl Schema {
	pub fn new(required: Vec<Field>, optional: Vec<Field>) -> Self {
		Self { required, optional }
	}

	/// Validates a TOML value against this schema.
	///
	/// Nested tables are validated recursively and error messages carry the
	/// dotted path of the offending field.
	pub fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		self.validate_at("", config)
	}

	fn validate_at(&self, prefix: &str, config: &toml::Value) -> Result<(), ValidationError> {
		let table = config
			.as_table()
			.ok_or_else(|| ValidationError::TypeMismatch {
				field: if prefix.is_empty() {
					"root".to_string()
				} else {
					prefix.to_string()
				},
				expected: "table".to_string(),
				actual: config.type_str().to_string(),
			})?;

		for field in &self.required {
			let value = table
				.get(&field.name)
				.ok_or_else(|| ValidationError::MissingField(qualified(prefix, &field.name)))?;
			field.check(prefix, value)?;
		}

		for field in &self.optional {
			if let Some(value) = table.get(&field.name) {
				field.check(prefix, value)?;
			}
		}

		Ok(())
	}
}

fn qualified(prefix: &str, name: &str) -> String {
	if prefix.is_empty() {
		name.to_string()
	} else {
		format!("{}.{}", prefix, name)
	}
}

fn mismatch(field: &str, expected: &str, value: &toml::Value) -> ValidationError {
	ValidationError::TypeMismatch {
		field: field.to_string(),
		expected: expected.to_string(),
		actual: value.type_str().to_string(),
	}
}

fn check_type(
	field: &str,
	value: &toml::Value,
	expected: &FieldType,
) -> Result<(), ValidationError> {
	match expected {
		FieldType::String => {
			if !value.is_str() {
				return Err(mismatch(field, "string", value));
			}
		},
		FieldType::Boolean => {
			if !value.is_bool() {
				return Err(mismatch(field, "boolean", value));
			}
		},
		FieldType::Integer { min, max } => {
			let v = value
				.as_integer()
				.ok_or_else(|| mismatch(field, "integer", value))?;
			if let Some(min) = min.filter(|min| v < *min) {
				return Err(ValidationError::InvalidValue {
					field: field.to_string(),
					message: format!("Value {} is less than minimum {}", v, min),
				});
			}
			if let Some(max) = max.filter(|max| v > *max) {
				return Err(ValidationError::InvalidValue {
					field: field.to_string(),
					message: format!("Value {} is greater than maximum {}", v, max),
				});
			}
		},
		FieldType::Float { min, max } => {
			let v = value
				.as_float()
				.or_else(|| value.as_integer().map(|i| i as f64))
				.ok_or_else(|| mismatch(field, "float", value))?;
			if let Some(min) = min.filter(|min| v < *min) {
				return Err(ValidationError::InvalidValue {
					field: field.to_string(),
					message: format!("Value {} is less than minimum {}", v, min),
				});
			}
			if let Some(max) = max.filter(|max| v > *max) {
				return Err(ValidationError::InvalidValue {
					field: field.to_string(),
					message: format!("Value {} is greater than maximum {}", v, max),
				});
			}
		},
		FieldType::Decimal => {
			let parsed = match value {
				toml::Value::String(s) => Decimal::from_str(s).ok(),
				toml::Value::Integer(i) => Some(Decimal::from(*i)),
				toml::Value::Float(f) => Decimal::try_from(*f).ok(),
				_ => return Err(mismatch(field, "decimal", value)),
			};
			if parsed.is_none() {
				return Err(ValidationError::InvalidValue {
					field: field.to_string(),
					message: "not a decimal amount".to_string(),
				});
			}
		},
		FieldType::Table(schema) => schema.validate_at(field, value)?,
	}

	Ok(())
}

/// A configuration schema that can validate TOML values.
pub trait ConfigSchema: Send + Sync {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError>;
}

#[cfg(test)]
mod tests {
	use super::*;

	fn parse(s: &str) -> toml::Value {
		toml::from_str(s).unwrap()
	}

	#[test]
	fn test_required_field_missing() {
		let schema = Schema::new(vec![Field::new("name", FieldType::String)], vec![]);
		let err = schema.validate(&parse("other = 1")).unwrap_err();
		assert!(matches!(err, ValidationError::MissingField(f) if f == "name"));
	}

	#[test]
	fn test_float_bounds_accept_integers() {
		let schema = Schema::new(
			vec![Field::new(
				"rate",
				FieldType::Float {
					min: Some(0.0),
					max: Some(1.0),
				},
			)],
			vec![],
		);
		assert!(schema.validate(&parse("rate = 1")).is_ok());
		assert!(schema.validate(&parse("rate = 0.9")).is_ok());
		assert!(schema.validate(&parse("rate = 1.5")).is_err());
	}

	#[test]
	fn test_decimal_field() {
		let schema = Schema::new(vec![], vec![Field::new("fee", FieldType::Decimal)]);
		assert!(schema.validate(&parse(r#"fee = "0.50""#)).is_ok());
		assert!(schema.validate(&parse("fee = 3")).is_ok());
		assert!(schema.validate(&parse(r#"fee = "abc""#)).is_err());
		assert!(schema.validate(&parse("fee = true")).is_err());
	}

	#[test]
	fn test_nested_errors_carry_path() {
		let schema = Schema::new(
			vec![Field::new(
				"outer",
				FieldType::Table(Schema::new(
					vec![Field::new("inner", FieldType::Boolean)],
					vec![],
				)),
			)],
			vec![],
		);
		let err = schema.validate(&parse("[outer]\ninner = 3")).unwrap_err();
		assert!(err.to_string().contains("outer.inner"));
	}

	#[test]
	fn test_custom_validator() {
		let schema = Schema::new(
			vec![Field::new("mode", FieldType::String).with_validator(|v| {
				match v.as_str() {
					Some("fast") | Some("slow") => Ok(()),
					_ => Err("must be fast or slow".to_string()),
				}
			})],
			vec![],
		);
		assert!(schema.validate(&parse(r#"mode = "fast""#)).is_ok());
		assert!(schema.validate(&parse(r#"mode = "medium""#)).is_err());
	}
}
