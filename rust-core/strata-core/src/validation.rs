//! # Validation Module
//!
//! Structured validation errors and the [`Validate`] trait used by the
//! parameter and body parsing middleware.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Only handles validation rules and error representation
//! - **O**: Types opt in by implementing `Validate`
//! - **L**: Failures of every kind convert to the same `ApiError` shape

use crate::api_error::{ApiError, HandlerError};
use serde::Serialize;
use std::collections::HashMap;

/// Error code for categorizing validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    /// Required field is missing
    Required,
    /// Value is invalid type
    InvalidType,
    /// Value is too short
    TooShort,
    /// Value is too long
    TooLong,
    /// Value is below minimum
    TooSmall,
    /// Value is above maximum
    TooLarge,
    /// Value doesn't match pattern
    InvalidFormat,
    /// Value is not in allowed set
    InvalidChoice,
    /// Custom validation failed
    Custom,
}

/// A single validation error for a specific field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field name (e.g., "email", "items[2].sku")
    pub field: String,
    /// Human-readable error message
    pub message: String,
    /// Machine-readable error code
    pub code: ValidationCode,
}

impl FieldError {
    /// Create a new field error
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: ValidationCode) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
        }
    }

    /// Create a "required field" error
    pub fn required(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            message: format!("{field} is required"),
            field,
            code: ValidationCode::Required,
        }
    }

    /// Create a "too short" error
    pub fn too_short(field: impl Into<String>, min: usize) -> Self {
        let field = field.into();
        Self {
            message: format!("{field} must be at least {min} characters"),
            field,
            code: ValidationCode::TooShort,
        }
    }

    /// Create a "too long" error
    pub fn too_long(field: impl Into<String>, max: usize) -> Self {
        let field = field.into();
        Self {
            message: format!("{field} must be at most {max} characters"),
            field,
            code: ValidationCode::TooLong,
        }
    }

    /// Create a "below minimum" error
    pub fn too_small(field: impl Into<String>, min: impl std::fmt::Display) -> Self {
        let field = field.into();
        Self {
            message: format!("{field} must be at least {min}"),
            field,
            code: ValidationCode::TooSmall,
        }
    }

    /// Create an "above maximum" error
    pub fn too_large(field: impl Into<String>, max: impl std::fmt::Display) -> Self {
        let field = field.into();
        Self {
            message: format!("{field} must be at most {max}"),
            field,
            code: ValidationCode::TooLarge,
        }
    }

    /// Create an "invalid format" error
    pub fn invalid_format(field: impl Into<String>, expected: &str) -> Self {
        let field = field.into();
        Self {
            message: format!("{field} must be a valid {expected}"),
            field,
            code: ValidationCode::InvalidFormat,
        }
    }

    /// Create an "invalid choice" error
    pub fn invalid_choice(field: impl Into<String>, allowed: &[&str]) -> Self {
        let field = field.into();
        Self {
            message: format!("{field} must be one of: {}", allowed.join(", ")),
            field,
            code: ValidationCode::InvalidChoice,
        }
    }
}

/// Collection of validation errors
///
/// Allows aggregating multiple field errors for a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    /// List of field-level errors
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Create an empty error collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field error
    pub fn add(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    /// Add a required field error
    pub fn add_required(&mut self, field: impl Into<String>) {
        self.add(FieldError::required(field));
    }

    /// Move all errors of `other` into this collection, prefixing their fields
    pub fn merge_prefixed(&mut self, prefix: &str, other: Self) {
        self.errors.extend(other.errors.into_iter().map(|mut error| {
            error.field = format!("{prefix}.{}", error.field);
            error
        }));
    }

    /// Check if there are any errors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the number of errors
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// `Ok(())` when empty, otherwise `Err(self)`
    ///
    /// # Errors
    ///
    /// Returns the collection itself when it holds at least one error.
    pub fn into_result(self) -> ValidationResult<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }

    /// Group errors by field
    #[must_use]
    pub fn by_field(&self) -> HashMap<String, Vec<&FieldError>> {
        let mut map: HashMap<String, Vec<&FieldError>> = HashMap::new();
        for error in &self.errors {
            map.entry(error.field.clone()).or_default().push(error);
        }
        map
    }

    /// Convert into a 400 `ApiError` with one entry per failing field
    #[must_use]
    pub fn into_api_error(self, message: &str) -> ApiError {
        self.errors
            .into_iter()
            .fold(ApiError::bad_request(message), |api, error| {
                api.with_field(error.field, error.message)
            })
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        errors.into_api_error("Validation failed")
    }
}

impl From<ValidationErrors> for HandlerError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Api(errors.into())
    }
}

/// Result type for validation operations
pub type ValidationResult<T> = std::result::Result<T, ValidationErrors>;

/// Declarative validation run after parsing parameters or a body
pub trait Validate {
    /// Whether a value of this type is expected at all
    ///
    /// `false` only for `()`, which marks "no params" or "no body".
    const EXPECTED: bool = true;

    /// Check the value, collecting every failing field
    ///
    /// # Errors
    ///
    /// Returns all failing fields at once.
    fn validate(&self) -> ValidationResult<()> {
        Ok(())
    }
}

impl Validate for () {
    const EXPECTED: bool = false;
}

impl<T: Validate> Validate for Vec<T> {
    fn validate(&self) -> ValidationResult<()> {
        let mut errors = ValidationErrors::new();
        for (index, row) in self.iter().enumerate() {
            if let Err(row_errors) = row.validate() {
                errors.merge_prefixed(&format!("[{index}]"), row_errors);
            }
        }
        errors.into_result()
    }
}

impl<T: Validate> Validate for Option<T> {
    fn validate(&self) -> ValidationResult<()> {
        self.as_ref().map_or(Ok(()), Validate::validate)
    }
}

impl Validate for serde_json::Value {}
