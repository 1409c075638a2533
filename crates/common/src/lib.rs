// gridsync-common: cell values, schemas and store operation shapes shared by
// the gridsync crates.

pub mod address;
pub mod cell;
pub mod schema;
pub mod types;

pub use address::{CellAddress, CellRange};
pub use cell::{CellValue, EditInput};
pub use schema::{ColumnSchema, ColumnType, SheetSchema};
