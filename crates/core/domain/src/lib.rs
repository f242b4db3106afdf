pub mod data;

pub use data::{DecodeError, DecodeFailure, Reading};
