//! Concrete implementations of the port traits.

pub mod cached_data_adapter;
pub mod csv_adapter;
pub mod csv_report_adapter;
pub mod file_config_adapter;
pub mod memory_cache;
#[cfg(feature = "sqlite")]
pub mod sqlite_adapter;
