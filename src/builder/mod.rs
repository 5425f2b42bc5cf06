pub mod insert;
pub mod sql;
pub mod update;

pub use insert::{InsertBuilder, InsertStatement};
pub use sql::{Placeholders, SqlDialect};
pub use update::{RowPatch, UpdateBuilder, UpdateStatement};
