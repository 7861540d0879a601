//! Bundle assembly: fee transaction first, then user transactions in order

use crate::error::{BundlerError, BundlerResult};
use crate::tx::SignedTransaction;

use serde::Serialize;

/// Smallest bundle: the fee transaction alone
pub const MIN_BUNDLE_TXS: usize = 1;
/// Largest bundle the relay accepts, fee transaction included
pub const MAX_BUNDLE_TXS: usize = 50;

/// An ordered set of signed transactions valid up to `max_block_number`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    transactions: Vec<SignedTransaction>,
    max_block_number: u64,
}

impl Bundle {
    #[cfg(test)]
    pub fn transactions(&self) -> &[SignedTransaction] {
        &self.transactions
    }

    #[cfg(test)]
    pub fn fee_transaction(&self) -> &SignedTransaction {
        &self.transactions[0]
    }

    pub fn max_block_number(&self) -> u64 {
        self.max_block_number
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Relay wire form of the bundle
    pub fn payload(&self) -> BundlePayload {
        BundlePayload {
            txs: self.transactions.iter().map(SignedTransaction::to_hex).collect(),
            max_block_number: self.max_block_number,
        }
    }
}

/// JSON body posted to the relay
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundlePayload {
    pub txs: Vec<String>,
    pub max_block_number: u64,
}

/// Pairs signed transactions with the block-height validity window
#[derive(Debug, Clone, Copy)]
pub struct BundleAssembler {
    block_window: u64,
}

impl BundleAssembler {
    /// Create an assembler whose bundles stay valid for `block_window` blocks
    pub fn new(block_window: u64) -> Self {
        Self { block_window }
    }

    /// Check that `user_tx_count` user transactions plus the fee transaction fit a bundle
    pub fn check_count(user_tx_count: usize) -> BundlerResult<usize> {
        let total = user_tx_count.saturating_add(1);
        if !(MIN_BUNDLE_TXS..=MAX_BUNDLE_TXS).contains(&total) {
            return Err(BundlerError::TransactionCount {
                min: MIN_BUNDLE_TXS,
                max: MAX_BUNDLE_TXS,
                actual: total,
            });
        }
        Ok(total)
    }

    /// Highest block the bundle may land in
    pub fn max_block_number(&self, current_block: u64) -> BundlerResult<u64> {
        current_block.checked_add(self.block_window).ok_or_else(|| {
            BundlerError::Validation(format!(
                "block {} + window {} overflows",
                current_block, self.block_window
            ))
        })
    }

    /// Assemble the bundle, fee transaction strictly first
    pub fn assemble(
        &self,
        fee: SignedTransaction,
        users: Vec<SignedTransaction>,
        current_block: u64,
    ) -> BundlerResult<Bundle> {
        Self::check_count(users.len())?;
        let max_block_number = self.max_block_number(current_block)?;

        let mut transactions = Vec::with_capacity(users.len() + 1);
        transactions.push(fee);
        transactions.extend(users);

        let in_nonce_order = transactions
            .windows(2)
            .all(|pair| pair[0].nonce().checked_add(1) == Some(pair[1].nonce()));
        if !in_nonce_order {
            return Err(BundlerError::Validation(
                "bundle nonces are not contiguous from the fee transaction".to_string(),
            ));
        }

        Ok(Bundle {
            transactions,
            max_block_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tx::signer_tests::TEST_KEY;
    use crate::tx::{TransactionRecord, TransactionSigner, DEFAULT_GAS_LIMIT};
    use ethers::types::{Bytes, U256};

    fn signed(signer: &TransactionSigner, nonce: u64) -> SignedTransaction {
        let record = TransactionRecord {
            to: "0xEaed24a5b97Db3193749EbD5477F96F05b5bA22c".parse().unwrap(),
            value: U256::zero(),
            data: Bytes::default(),
            gas_limit: DEFAULT_GAS_LIMIT,
            gas_price: U256::one(),
            nonce,
            chain_id: 56,
        };
        signer.sign(&record).unwrap()
    }

    #[test]
    fn test_check_count_bounds() {
        for users in 0..=49 {
            assert_eq!(BundleAssembler::check_count(users).unwrap(), users + 1);
        }
        assert!(matches!(
            BundleAssembler::check_count(50),
            Err(BundlerError::TransactionCount { actual: 51, .. })
        ));
        assert!(BundleAssembler::check_count(usize::MAX).is_err());
    }

    #[test]
    fn test_max_block_number() {
        let assembler = BundleAssembler::new(100);
        assert_eq!(assembler.max_block_number(1000).unwrap(), 1100);
        assert!(assembler.max_block_number(u64::MAX).is_err());
    }

    #[test]
    fn test_fee_first_then_users() {
        let signer = TransactionSigner::from_key(TEST_KEY, 56).unwrap();
        let fee = signed(&signer, 10);
        let users = vec![signed(&signer, 11), signed(&signer, 12)];

        let bundle = BundleAssembler::new(100)
            .assemble(fee.clone(), users.clone(), 1000)
            .unwrap();

        assert_eq!(bundle.len(), 3);
        assert_eq!(bundle.fee_transaction(), &fee);
        assert_eq!(&bundle.transactions()[1..], users.as_slice());
        assert_eq!(bundle.max_block_number(), 1100);
    }

    #[test]
    fn test_fee_only_bundle() {
        let signer = TransactionSigner::from_key(TEST_KEY, 56).unwrap();
        let bundle = BundleAssembler::new(5)
            .assemble(signed(&signer, 0), Vec::new(), 7)
            .unwrap();
        assert_eq!(bundle.len(), 1);
        assert_eq!(bundle.payload().txs.len(), 1);
    }

    #[test]
    fn test_rejects_out_of_order() {
        let signer = TransactionSigner::from_key(TEST_KEY, 56).unwrap();
        let result = BundleAssembler::new(100).assemble(
            signed(&signer, 11),
            vec![signed(&signer, 10)],
            1000,
        );
        assert!(matches!(result, Err(BundlerError::Validation(_))));
    }

    #[test]
    fn test_payload_wire_shape() {
        let signer = TransactionSigner::from_key(TEST_KEY, 56).unwrap();
        let fee = signed(&signer, 3);
        let bundle = BundleAssembler::new(100).assemble(fee.clone(), Vec::new(), 1).unwrap();

        let json = serde_json::to_value(bundle.payload()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "txs": [fee.to_hex()], "maxBlockNumber": 101 })
        );
    }
}
