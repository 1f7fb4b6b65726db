//! Core domain types and computation.

pub mod error;
pub mod price;
pub mod series;
pub mod rolling;
pub mod signal;
pub mod breakout;
pub mod cross_section;
pub mod strategy;
pub mod portfolio;
pub mod backtest;
pub mod metrics;
pub mod blend;
pub mod universe;
pub mod pipeline;
pub mod config_validation;
