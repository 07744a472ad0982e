#![forbid(unsafe_code)]

//! Core types shared by every Hagalund crate: algorithm and namespace
//! constants, resource limits and the error taxonomy.

pub mod algorithm;
pub mod error;
pub mod limits;
pub mod ns;

pub use error::{Error, Result};
pub use limits::Limits;
