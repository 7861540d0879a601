//! Transaction records built from caller intents
//!
//! A [`TransactionRecord`] fixes every field that goes into the signed bytes.
//! Values come in as decimal strings in the native unit and are converted
//! exactly; anything that would lose precision is rejected.

use super::gas::DEFAULT_GAS_LIMIT;
use crate::error::{BundlerError, BundlerResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionRequest, U256};
use serde::Deserialize;
use tracing::debug;

/// Decimal places of the native unit
pub const NATIVE_DECIMALS: usize = 18;

/// A transaction requested by the caller
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransactionIntent {
    pub to: Address,
    /// Amount in native units, e.g. "0.5"
    #[serde(default = "zero_value")]
    pub value: String,
    /// Raw call data
    #[serde(default)]
    pub data: Option<Bytes>,
    /// Zero-argument function to call, e.g. "totalSupply()"
    #[serde(default)]
    pub function: Option<String>,
    #[serde(default)]
    pub gas: Option<u64>,
    /// Gas price override in wei
    #[serde(default)]
    pub gas_price: Option<String>,
}

fn zero_value() -> String {
    "0".to_string()
}

impl TransactionIntent {
    /// A plain value transfer
    #[cfg(test)]
    pub fn transfer(to: Address, value: impl Into<String>) -> Self {
        Self {
            to,
            value: value.into(),
            data: None,
            function: None,
            gas: None,
            gas_price: None,
        }
    }

    /// Call data for this intent
    pub fn payload(&self) -> BundlerResult<Bytes> {
        match (&self.data, &self.function) {
            (Some(_), Some(function)) => Err(BundlerError::encoding(
                "function",
                function.as_str(),
                "both data and function are set",
            )),
            (Some(data), None) => Ok(data.clone()),
            (None, Some(function)) => encode_selector(function),
            (None, None) => Ok(Bytes::default()),
        }
    }
}

/// Selector-only call data for a zero-argument function signature
fn encode_selector(function: &str) -> BundlerResult<Bytes> {
    let signature = function.trim();
    let well_formed = signature
        .strip_suffix("()")
        .map(|name| {
            !name.is_empty()
                && !name.starts_with(|c: char| c.is_ascii_digit())
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        })
        .unwrap_or(false);

    if !well_formed {
        return Err(BundlerError::encoding(
            "function",
            function,
            "expected a zero-argument signature such as totalSupply()",
        ));
    }

    Ok(Bytes::from(ethers::utils::id(signature).to_vec()))
}

/// Convert a decimal native-unit amount to wei without rounding
pub fn parse_native_amount(field: &'static str, value: &str) -> BundlerResult<U256> {
    let amount = value.trim();
    let invalid = |reason: &str| BundlerError::encoding(field, value, reason);

    if amount.is_empty() {
        return Err(invalid("empty amount"));
    }

    let (whole, fraction) = match amount.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (amount, ""),
    };

    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("no digits"));
    }
    if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
        return Err(invalid("only unsigned decimal digits are allowed"));
    }

    // Zeros past the last representable digit are still exact.
    let fraction = if fraction.len() > NATIVE_DECIMALS {
        let (kept, rest) = fraction.split_at(NATIVE_DECIMALS);
        if rest.chars().any(|c| c != '0') {
            return Err(invalid("more than 18 decimal places"));
        }
        kept
    } else {
        fraction
    };

    let digits = format!("{}{:0<width$}", whole, fraction, width = NATIVE_DECIMALS);
    U256::from_dec_str(&digits).map_err(|e| invalid(&e.to_string()))
}

/// Parse an integer wei amount
fn parse_wei(field: &'static str, value: &str) -> BundlerResult<U256> {
    let amount = value.trim();
    if amount.is_empty() || !amount.chars().all(|c| c.is_ascii_digit()) {
        return Err(BundlerError::encoding(field, value, "expected an integer amount in wei"));
    }
    U256::from_dec_str(amount).map_err(|e| BundlerError::encoding(field, value, e.to_string()))
}

/// Fully specified legacy transaction, bound to one chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    pub to: Address,
    /// Amount in wei
    pub value: U256,
    pub data: Bytes,
    pub gas_limit: u64,
    pub gas_price: U256,
    pub nonce: u64,
    pub chain_id: u64,
}

impl TransactionRecord {
    /// Unsigned EIP-155 legacy transaction for this record
    pub fn to_typed(&self, from: Address) -> TypedTransaction {
        let request = TransactionRequest::new()
            .from(from)
            .to(self.to)
            .value(self.value)
            .data(self.data.clone())
            .gas(self.gas_limit)
            .gas_price(self.gas_price)
            .nonce(self.nonce)
            .chain_id(self.chain_id);

        TypedTransaction::Legacy(request)
    }
}

/// Builds chain-bound records from intents
#[derive(Debug, Clone, Copy)]
pub struct TransactionBuilder {
    chain_id: u64,
}

impl TransactionBuilder {
    /// Create a builder for `chain_id`
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Build the record for `intent` at `nonce`
    pub fn build(
        &self,
        intent: &TransactionIntent,
        nonce: u64,
        gas_price_default: U256,
    ) -> BundlerResult<TransactionRecord> {
        let value = parse_native_amount("value", &intent.value)?;
        let data = intent.payload()?;
        let gas_limit = intent.gas.unwrap_or(DEFAULT_GAS_LIMIT);
        let gas_price = match &intent.gas_price {
            Some(price) => parse_wei("gas_price", price)?,
            None => gas_price_default,
        };

        Ok(self.record(intent.to, value, data, gas_limit, gas_price, nonce))
    }

    fn record(
        &self,
        to: Address,
        value: U256,
        data: Bytes,
        gas_limit: u64,
        gas_price: U256,
        nonce: u64,
    ) -> TransactionRecord {
        TransactionRecord {
            to,
            value,
            data,
            gas_limit,
            gas_price,
            nonce,
            chain_id: self.chain_id,
        }
    }
}

/// Produces the single fee transfer that leads every bundle
#[derive(Debug, Clone)]
pub struct FeeTransactionFactory {
    builder: TransactionBuilder,
    collector: Address,
    base_fee_per_tx: U256,
}

impl FeeTransactionFactory {
    /// Create a factory charging `base_fee_per_tx` native units per user transaction
    pub fn new(
        builder: TransactionBuilder,
        collector: Address,
        base_fee_per_tx: &str,
    ) -> BundlerResult<Self> {
        let base_fee_per_tx = parse_native_amount("base_fee_per_tx", base_fee_per_tx)?;
        Ok(Self {
            builder,
            collector,
            base_fee_per_tx,
        })
    }

    /// Builder shared with user transactions
    pub fn builder(&self) -> TransactionBuilder {
        self.builder
    }

    /// Fee in wei owed for `user_tx_count` user transactions
    pub fn fee_amount(&self, user_tx_count: usize) -> BundlerResult<U256> {
        self.base_fee_per_tx
            .checked_mul(U256::from(user_tx_count))
            .ok_or_else(|| {
                BundlerError::encoding(
                    "fee",
                    format!("{} * {}", self.base_fee_per_tx, user_tx_count),
                    "overflows 256 bits",
                )
            })
    }

    /// Build the fee record. A bundle with no user transactions still gets one, worth zero.
    pub fn build(
        &self,
        user_tx_count: usize,
        nonce: u64,
        gas_price: U256,
    ) -> BundlerResult<TransactionRecord> {
        let fee = self.fee_amount(user_tx_count)?;
        debug!(
            fee = %ethers::utils::format_ether(fee),
            user_tx_count,
            "Built fee transaction"
        );

        Ok(self.builder.record(
            self.collector,
            fee,
            Bytes::default(),
            DEFAULT_GAS_LIMIT,
            gas_price,
            nonce,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> Address {
        s.parse().unwrap()
    }

    fn collector() -> Address {
        addr("0xEaed24a5b97Db3193749EbD5477F96F05b5bA22c")
    }

    #[test]
    fn test_parse_native_amount() {
        assert_eq!(parse_native_amount("v", "0").unwrap(), U256::zero());
        assert_eq!(parse_native_amount("v", "1").unwrap(), U256::exp10(18));
        assert_eq!(
            parse_native_amount("v", "0.0000000000000001").unwrap(),
            U256::from(100)
        );
        assert_eq!(
            parse_native_amount("v", "0.001").unwrap(),
            U256::from(1_000_000_000_000_000u64)
        );
        assert_eq!(
            parse_native_amount("v", ".5").unwrap(),
            U256::from(500_000_000_000_000_000u64)
        );
        assert_eq!(
            parse_native_amount("v", "0.0000000000000000010").unwrap(),
            U256::one()
        );
    }

    #[test]
    fn test_parse_native_amount_rejects_inexact() {
        for bad in ["", ".", "-1", "1e18", "0.1.2", "abc", "0.0000000000000000001", " 1 2"] {
            let err = parse_native_amount("value", bad).unwrap_err();
            assert!(matches!(err, BundlerError::Encoding { field: "value", .. }), "{bad}");
        }
    }

    #[test]
    fn test_build_defaults() {
        let builder = TransactionBuilder::new(56);
        let intent = TransactionIntent::transfer(collector(), "0.0000000000000001");

        let record = builder.build(&intent, 9, U256::from(5)).unwrap();
        assert_eq!(record.value, U256::from(100));
        assert_eq!(record.gas_limit, DEFAULT_GAS_LIMIT);
        assert_eq!(record.gas_price, U256::from(5));
        assert_eq!(record.nonce, 9);
        assert_eq!(record.chain_id, 56);
        assert!(record.data.is_empty());
    }

    #[test]
    fn test_build_contract_call_overrides() {
        let builder = TransactionBuilder::new(56);
        let intent = TransactionIntent {
            function: Some("totalSupply()".to_string()),
            gas: Some(22_000),
            gas_price: Some("7000000000".to_string()),
            ..TransactionIntent::transfer(addr("0xbb4CdB9CBd36B01bD1cBaEBF2De08d9173bc095c"), "0")
        };

        let record = builder.build(&intent, 1, U256::from(5)).unwrap();
        assert_eq!(record.data.as_ref(), &[0x18, 0x16, 0x0d, 0xdd]);
        assert_eq!(record.gas_limit, 22_000);
        assert_eq!(record.gas_price, U256::from(7_000_000_000u64));
        assert_eq!(record.value, U256::zero());
    }

    #[test]
    fn test_payload_conflicts_and_bad_signatures() {
        let mut intent = TransactionIntent::transfer(collector(), "0");
        intent.data = Some(Bytes::from(vec![1, 2, 3]));
        intent.function = Some("totalSupply()".to_string());
        assert!(intent.payload().is_err());

        intent.data = None;
        intent.function = Some("transfer(address,uint256)".to_string());
        assert!(intent.payload().is_err());

        intent.function = Some("()".to_string());
        assert!(intent.payload().is_err());
    }

    #[test]
    fn test_bad_gas_price_override() {
        let builder = TransactionBuilder::new(56);
        let mut intent = TransactionIntent::transfer(collector(), "0");
        intent.gas_price = Some("1.5".to_string());
        assert!(matches!(
            builder.build(&intent, 0, U256::one()),
            Err(BundlerError::Encoding { field: "gas_price", .. })
        ));
    }

    #[test]
    fn test_fee_amount_scales_with_count() {
        let factory =
            FeeTransactionFactory::new(TransactionBuilder::new(56), collector(), "0.001").unwrap();

        assert_eq!(factory.fee_amount(0).unwrap(), U256::zero());
        assert_eq!(
            factory.fee_amount(2).unwrap(),
            parse_native_amount("fee", "0.002").unwrap()
        );
        assert_eq!(
            factory.fee_amount(49).unwrap(),
            parse_native_amount("fee", "0.049").unwrap()
        );
    }

    #[test]
    fn test_fee_record_shape() {
        let factory =
            FeeTransactionFactory::new(TransactionBuilder::new(56), collector(), "0.001").unwrap();

        let record = factory.build(0, 4, U256::from(3)).unwrap();
        assert_eq!(record.to, collector());
        assert_eq!(record.value, U256::zero());
        assert_eq!(record.gas_limit, DEFAULT_GAS_LIMIT);
        assert_eq!(record.gas_price, U256::from(3));
        assert_eq!(record.nonce, 4);
        assert!(record.data.is_empty());
    }
}
