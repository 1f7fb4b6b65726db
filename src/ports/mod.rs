//! Port traits: the seams between the domain and its collaborators.

pub mod cache_port;
pub mod config_port;
pub mod data_port;
pub mod report_port;
