//! Column storage: the codec pipeline that turns a column of [`Value`]s
//! into one of the specialized on-disk/in-memory representations named in
//! spec §4.B, plus the statistics oracle that drives codec selection.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;

pub use codec::{build_column, CachedReader, CodecError, ColumnStorage};
pub use columnstore_core::Value;
