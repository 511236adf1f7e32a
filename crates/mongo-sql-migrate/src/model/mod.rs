//! Model definitions and the model registry.

mod definition;
pub mod registry;

pub use definition::{
    global_type_name, parse_uid, Attribute, AttributeKind, ModelDefinition, RefTarget, Reference,
    ScalarType, Synthetic, TimestampOption, UidKind, ADMIN_PLUGIN, DEFAULT_TIMESTAMPS,
};
pub use registry::ModelRegistry;
