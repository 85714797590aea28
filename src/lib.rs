//! Bidirectional XML mapping compiler: reflected object models and XML
//! schema sets in, one canonical mapping graph out, and the graph back out
//! as schemas.
pub mod annotations;
pub mod config;
pub mod default_value;
pub mod error;
pub mod mapping;
pub mod model;
pub mod names;
pub mod reflection;
pub mod schema_export;
pub mod schema_import;
pub mod type_desc;
pub mod xsd;

pub mod cli;
pub mod jq_exec;
pub mod path_de;

pub use config::{ExportOptions, ImportOptions, Options};
pub use error::{MappingError, MappingResult};
pub use mapping::{Accessor, Mapping, MappingGraph, MappingId, MappingKind};
pub use reflection::ReflectionImporter;
pub use schema_export::SchemaExporter;
pub use schema_import::SchemaImporter;
