//! Import queries

pub mod get_import;
pub mod list_imports;
pub mod stream_import;

pub use get_import::{GetImportError, GetImportQuery};
pub use list_imports::{ListImportsError, ListImportsQuery};
pub use stream_import::{StreamImportError, StreamImportQuery};
