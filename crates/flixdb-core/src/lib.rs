pub mod config;
pub mod data_processor;
pub mod deadline;
pub mod error;
pub mod math;
pub mod traits;
pub mod types;

pub use error::{Error, ErrorBody, Result, Stage};
