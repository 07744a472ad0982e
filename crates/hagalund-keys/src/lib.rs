#![forbid(unsafe_code)]

//! Key material and `<ds:KeyInfo>` handling for the Hagalund XML signature
//! library.

pub mod key;
pub mod keyinfo;

pub use key::{Key, KeyData};
pub use keyinfo::{KeyInfo, KeyInfoClause};
