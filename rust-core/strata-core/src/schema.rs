//! # Schema Descriptors
//!
//! Runtime JSON-schema fragments describing parameter, body and response
//! types. Captured at registration time so OpenAPI generation never has to
//! inspect values.
//!
//! Implement [`ApiSchema`] by hand or with `#[derive(ApiSchema)]`.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// JSON schema primitive type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    /// `null`, used for `()`
    Null,
    /// `boolean`
    Boolean,
    /// `integer`
    Integer,
    /// `number`
    Number,
    /// `string`
    String,
    /// `array`
    Array,
    /// `object`
    Object,
}

/// A JSON schema fragment
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Primitive type; `None` means any value
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<SchemaType>,
    /// Type name, for named structs and enums
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Format hint (`int64`, `uuid`, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
    /// Free-form description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Whether `null` is accepted
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub nullable: bool,
    /// Allowed values, for string enums
    #[serde(rename = "enum", skip_serializing_if = "Vec::is_empty")]
    pub enum_values: Vec<String>,
    /// Object properties
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, Schema>,
    /// Required object properties, in declaration order
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    /// Array element schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<Schema>>,
    /// Map value schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<Box<Schema>>,
}

impl Schema {
    /// Schema of the given primitive type
    #[must_use]
    pub fn of(kind: SchemaType) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    /// Accepts any value
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// `null`
    #[must_use]
    pub fn null() -> Self {
        Self::of(SchemaType::Null)
    }

    /// `string`
    #[must_use]
    pub fn string() -> Self {
        Self::of(SchemaType::String)
    }

    /// `integer`
    #[must_use]
    pub fn integer() -> Self {
        Self::of(SchemaType::Integer)
    }

    /// `number`
    #[must_use]
    pub fn number() -> Self {
        Self::of(SchemaType::Number)
    }

    /// `boolean`
    #[must_use]
    pub fn boolean() -> Self {
        Self::of(SchemaType::Boolean)
    }

    /// `object` with no properties yet
    #[must_use]
    pub fn object() -> Self {
        Self::of(SchemaType::Object)
    }

    /// `array` of `items`
    #[must_use]
    pub fn array(items: Self) -> Self {
        Self {
            items: Some(Box::new(items)),
            ..Self::of(SchemaType::Array)
        }
    }

    /// `object` mapping string keys to `values`
    #[must_use]
    pub fn map(values: Self) -> Self {
        Self {
            additional_properties: Some(Box::new(values)),
            ..Self::object()
        }
    }

    /// Whether this describes `()`, i.e. no payload at all
    #[must_use]
    pub fn is_unit(&self) -> bool {
        self.kind == Some(SchemaType::Null)
    }

    /// Set the title
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the format
    #[must_use]
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Set the description
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Mark as nullable
    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Restrict to a set of string values
    #[must_use]
    pub fn with_enum_values<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_values = values.into_iter().map(Into::into).collect();
        self
    }

    /// Add an object property
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, schema: Self, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, schema);
        self
    }
}

/// Types that can describe their JSON shape
pub trait ApiSchema {
    /// The schema of this type
    fn schema() -> Schema;
}

impl ApiSchema for () {
    fn schema() -> Schema {
        Schema::null()
    }
}

impl ApiSchema for bool {
    fn schema() -> Schema {
        Schema::boolean()
    }
}

macro_rules! integer_schema {
    ($format:literal: $($ty:ty),*) => {
        $(impl ApiSchema for $ty {
            fn schema() -> Schema {
                Schema::integer().with_format($format)
            }
        })*
    };
}

integer_schema!("int32": i8, i16, i32, u8, u16, u32);
integer_schema!("int64": i64, u64, isize, usize);

impl ApiSchema for f32 {
    fn schema() -> Schema {
        Schema::number().with_format("float")
    }
}

impl ApiSchema for f64 {
    fn schema() -> Schema {
        Schema::number().with_format("double")
    }
}

impl ApiSchema for String {
    fn schema() -> Schema {
        Schema::string()
    }
}

impl ApiSchema for str {
    fn schema() -> Schema {
        Schema::string()
    }
}

impl ApiSchema for char {
    fn schema() -> Schema {
        Schema::string()
    }
}

impl ApiSchema for uuid::Uuid {
    fn schema() -> Schema {
        Schema::string().with_format("uuid")
    }
}

impl ApiSchema for serde_json::Value {
    fn schema() -> Schema {
        Schema::any()
    }
}

impl<T: ApiSchema> ApiSchema for Option<T> {
    fn schema() -> Schema {
        T::schema().nullable()
    }
}

impl<T: ApiSchema> ApiSchema for Vec<T> {
    fn schema() -> Schema {
        Schema::array(T::schema())
    }
}

impl<T: ApiSchema> ApiSchema for [T] {
    fn schema() -> Schema {
        Schema::array(T::schema())
    }
}

impl<T: ApiSchema + ?Sized> ApiSchema for Box<T> {
    fn schema() -> Schema {
        T::schema()
    }
}

impl<T: ApiSchema + ?Sized> ApiSchema for std::sync::Arc<T> {
    fn schema() -> Schema {
        T::schema()
    }
}

impl<T: ApiSchema, S> ApiSchema for HashMap<String, T, S> {
    fn schema() -> Schema {
        Schema::map(T::schema())
    }
}

impl<T: ApiSchema> ApiSchema for BTreeMap<String, T> {
    fn schema() -> Schema {
        Schema::map(T::schema())
    }
}
