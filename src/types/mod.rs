//! Shared types for Umbrella IAM

mod error;
mod lookup;

pub use error::{ErrorBody, IamError, Result};
pub use lookup::Lookup;
