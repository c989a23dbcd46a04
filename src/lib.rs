// No unsafe here!
#![forbid(unsafe_code)]

#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate log;
extern crate serde;

pub mod error;

// Shared (structs) between binaries
pub mod shared_interface;
pub mod cli;

// Feature pipeline
pub mod normalize;
pub mod feature_extraction;
pub mod reconcile;

// Classification and display state
pub mod model;
pub mod trend;
pub mod pipeline;

pub mod synthetic;

pub use error::{MalformedRecord, PipelineError, Result};
