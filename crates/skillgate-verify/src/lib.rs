//! # skillgate-verify
//!
//! JSON Schema validation for skill inputs and outputs.
//!
//! [`JsonSchemaValidator`] implements the
//! [`SchemaValidator`](skillgate_core::traits::SchemaValidator) trait. The
//! kernel calls it with a skill's declared input schema before the executor
//! runs and with the declared output schema afterwards.

pub mod engine;

pub use engine::JsonSchemaValidator;
