pub mod atomic;
pub mod config;
pub mod error_log;
pub mod sink;
pub mod spreadsheet;
pub mod table;

pub use config::{ExportConfig, FieldMapping, Projection, ProjectionFormat};
pub use error_log::load_error_ids;
pub use sink::FileSink;
