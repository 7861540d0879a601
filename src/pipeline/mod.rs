//! Bundle construction pipeline
//!
//! One run:
//! 1. Validates the transaction count before any network access
//! 2. Reads nonce, gas price and block height from the node concurrently
//! 3. Builds and signs the fee transaction, then the user transactions
//! 4. Assembles the bundle with its block window and submits it once

mod engine;

pub use engine::BundlePipeline;
