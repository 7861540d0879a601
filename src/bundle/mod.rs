//! Bundle assembly and relay submission

mod assembler;
mod submitter;

pub use assembler::{Bundle, BundleAssembler};
pub use submitter::{BundleSubmitter, RelayResponse};
