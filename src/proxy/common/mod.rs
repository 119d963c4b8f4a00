// Common utilities shared by mappers and handlers

pub mod common_utils;
pub mod error_classifier;
pub mod json_schema;
pub mod model_mapping;
pub mod redaction;
