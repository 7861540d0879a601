//! Signing of bundle transactions with the single bundle identity
//!
//! The key is loaded once, lives only inside [`TransactionSigner`] and never
//! appears in logs or errors. Signatures are RFC6979 deterministic, so the
//! same record always produces the same raw transaction.

use super::builder::TransactionRecord;
use super::gas::DEFAULT_GAS_LIMIT;
use crate::error::{BundlerError, BundlerResult};

use ethers::signers::{LocalWallet, Signer};
use ethers::types::{Address, Bytes, H256};
use ethers::utils::keccak256;
use std::fmt;
use tracing::debug;

/// A raw signed transaction, ready for the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    nonce: u64,
    hash: H256,
    raw: Bytes,
}

impl SignedTransaction {
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Transaction hash as the chain will see it
    pub fn hash(&self) -> H256 {
        self.hash
    }

    #[cfg(test)]
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    /// `0x`-prefixed hex of the raw transaction
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(&self.raw))
    }
}

/// Holds the signing key for one run
pub struct TransactionSigner {
    wallet: LocalWallet,
}

impl TransactionSigner {
    /// Load the key from the environment variable `var`
    pub fn from_env(var: &str, chain_id: u64) -> BundlerResult<Self> {
        let key = std::env::var(var).map_err(|_| {
            BundlerError::Signing(format!("No signing key configured. Set {}", var))
        })?;
        Self::from_key(&key, chain_id)
            .map_err(|_| BundlerError::Signing(format!("Invalid private key in {}", var)))
    }

    /// Build a signer from a hex private key
    pub fn from_key(key: &str, chain_id: u64) -> BundlerResult<Self> {
        let wallet = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|_| BundlerError::Signing("Invalid private key".to_string()))?
            .with_chain_id(chain_id);

        debug!("Signer loaded for {:?} on chain {}", wallet.address(), chain_id);
        Ok(Self { wallet })
    }

    pub fn address(&self) -> Address {
        self.wallet.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.wallet.chain_id()
    }

    /// Sign `record`, refusing anything that would not be a valid transaction
    pub fn sign(&self, record: &TransactionRecord) -> BundlerResult<SignedTransaction> {
        self.check(record)?;

        let tx = record.to_typed(self.address());
        let signature = self
            .wallet
            .sign_transaction_sync(&tx)
            .map_err(|e| BundlerError::Signing(format!("nonce {}: {}", record.nonce, e)))?;

        let recovered = signature.recover(tx.sighash()).map_err(|e| {
            BundlerError::Signing(format!("nonce {}: unrecoverable signature: {}", record.nonce, e))
        })?;
        if recovered != self.address() {
            return Err(BundlerError::Signing(format!(
                "nonce {}: signature recovers to {:?}",
                record.nonce, recovered
            )));
        }

        let raw = tx.rlp_signed(&signature);
        let hash = H256::from(keccak256(&raw));

        debug!(nonce = record.nonce, hash = ?hash, "Signed transaction");
        Ok(SignedTransaction {
            nonce: record.nonce,
            hash,
            raw,
        })
    }

    fn check(&self, record: &TransactionRecord) -> BundlerResult<()> {
        if record.chain_id == 0 {
            return Err(BundlerError::Signing(format!(
                "nonce {}: record is not bound to a chain",
                record.nonce
            )));
        }
        if record.chain_id != self.chain_id() {
            return Err(BundlerError::Signing(format!(
                "nonce {}: record is for chain {} but signer is on chain {}",
                record.nonce,
                record.chain_id,
                self.chain_id()
            )));
        }
        if record.gas_limit < DEFAULT_GAS_LIMIT {
            return Err(BundlerError::Signing(format!(
                "nonce {}: gas limit {} is below the intrinsic {}",
                record.nonce, record.gas_limit, DEFAULT_GAS_LIMIT
            )));
        }
        Ok(())
    }
}

impl fmt::Debug for TransactionSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionSigner")
            .field("address", &self.address())
            .field("chain_id", &self.chain_id())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ethers::types::transaction::eip2718::TypedTransaction;
    use ethers::types::U256;
    use ethers::utils::rlp::Rlp;

    /// Well-known development key, address 0x90F8bf6A479f320ead074411a4B0e7944Ea8c9C1
    pub(crate) const TEST_KEY: &str =
        "0x4f3edf983ac636a65a842ce7c78d9aa706d3b113bce9c46f30d7d21715b23b1d";

    pub(crate) fn decode(signed: &SignedTransaction) -> (TypedTransaction, Address) {
        let (tx, sig) = TypedTransaction::decode_signed(&Rlp::new(signed.raw())).unwrap();
        let from = sig.recover(tx.sighash()).unwrap();
        (tx, from)
    }

    fn record(nonce: u64) -> TransactionRecord {
        TransactionRecord {
            to: "0xEaed24a5b97Db3193749EbD5477F96F05b5bA22c".parse().unwrap(),
            value: U256::from(100),
            data: Bytes::default(),
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price: U256::from(3_000_000_000u64),
            nonce,
            chain_id: 56,
        }
    }

    #[test]
    fn test_signing_is_deterministic() {
        let signer = TransactionSigner::from_key(TEST_KEY, 56).unwrap();

        let first = signer.sign(&record(5)).unwrap();
        let second = signer.sign(&record(5)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.hash(), second.hash());
    }

    #[test]
    fn test_signed_bytes_round_trip_fields() {
        let signer = TransactionSigner::from_key(TEST_KEY, 56).unwrap();
        let signed = signer.sign(&record(5)).unwrap();

        assert!(signed.to_hex().starts_with("0x"));
        let (tx, from) = decode(&signed);
        assert_eq!(from, signer.address());
        assert_eq!(tx.nonce().copied(), Some(U256::from(5)));
        assert_eq!(tx.value().copied(), Some(U256::from(100)));
        assert_eq!(tx.chain_id().map(|id| id.as_u64()), Some(56));
    }

    #[test]
    fn test_fails_closed_on_malformed_records() {
        let signer = TransactionSigner::from_key(TEST_KEY, 56).unwrap();

        let mut low_gas = record(0);
        low_gas.gas_limit = 20_999;
        assert!(matches!(signer.sign(&low_gas), Err(BundlerError::Signing(_))));

        let mut unbound = record(0);
        unbound.chain_id = 0;
        assert!(matches!(signer.sign(&unbound), Err(BundlerError::Signing(_))));

        let mut other_chain = record(0);
        other_chain.chain_id = 1;
        assert!(matches!(signer.sign(&other_chain), Err(BundlerError::Signing(_))));
    }

    #[test]
    fn test_key_never_in_debug_or_errors() {
        let signer = TransactionSigner::from_key(TEST_KEY, 56).unwrap();
        let debug = format!("{:?}", signer);
        assert!(!debug.contains(&TEST_KEY[2..]));

        let err = TransactionSigner::from_key("0xnot-a-key", 56).unwrap_err();
        assert!(!err.to_string().contains("not-a-key"));
    }

    #[test]
    fn test_missing_env_key() {
        let err = TransactionSigner::from_env("FEE_BUNDLER_TEST_UNSET_KEY", 56).unwrap_err();
        assert!(err.to_string().contains("FEE_BUNDLER_TEST_UNSET_KEY"));
    }
}
