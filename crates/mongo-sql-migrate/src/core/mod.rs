//! Core abstractions shared by the engine and the store adapters.
//!
//! - [`value`]: SQL values and flat rows handed to target stores
//! - [`traits`]: source/target store traits and the source [`Document`]

pub mod traits;
pub mod value;

pub use traits::{Document, SourceStore, TargetStore, KEY_FIELD};
pub use value::{Row, SqlValue};
