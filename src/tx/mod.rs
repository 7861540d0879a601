//! Transaction construction: gas pricing, nonce allocation, records and signing

mod builder;
mod gas;
mod nonce;
mod signer;

pub use builder::{
    parse_native_amount, FeeTransactionFactory, TransactionBuilder, TransactionIntent,
    TransactionRecord,
};
pub use gas::GasOracle;
pub use nonce::NonceAllocator;
pub use signer::{SignedTransaction, TransactionSigner};

#[cfg(test)]
pub(crate) use gas::DEFAULT_GAS_LIMIT;
#[cfg(test)]
pub(crate) use signer::tests as signer_tests;
