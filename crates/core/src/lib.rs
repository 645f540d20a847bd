//! Shared data model for the columnar table store: the tagged `Value`
//! type and its total order, column/table schema metadata, the unified
//! error type, and the interface-only transaction hooks the engine calls
//! through but never implements.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod schema;
pub mod traits;
pub mod types;
pub mod value;

pub use error::{Error, Result};
pub use schema::{ColumnDescriptor, ColumnDescriptorSnapshot, ForeignKey, TableSchema, UniqueKey};
pub use traits::{AlwaysVisible, UndoLog, VisibilityOracle};
pub use types::{Boundary, LogicalType, PersistencyMode, RecId, ResourceState, ShardId};
pub use value::{LazyString, TableRef, Value};
