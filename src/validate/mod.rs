//! Declarative record validation.
//!
//! A [`Schema`] is compiled once (type tags checked, patterns built) and a
//! [`SchemaValidator`] then checks records against it without short-circuiting,
//! so one pass reports every defect of a record.

pub mod schema;
pub mod validator;

pub use schema::{FieldSchema, FieldType, Schema};
pub use validator::{SchemaValidator, ValidationOutcome};
