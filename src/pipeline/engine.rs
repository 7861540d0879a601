//! Bundle pipeline: validate, price, sequence, sign, assemble, submit
//!
//! Stages run strictly forward. Any failure ends the run before submission,
//! so the relay either receives the complete bundle or nothing.

use crate::bundle::{Bundle, BundleAssembler, BundleSubmitter, RelayResponse};
use crate::chain::NodeRpc;
use crate::config::Settings;
use crate::error::{BundlerError, BundlerResult, PipelineError, Stage, StageExt};
use crate::tx::{
    FeeTransactionFactory, GasOracle, NonceAllocator, SignedTransaction, TransactionBuilder,
    TransactionIntent, TransactionRecord, TransactionSigner,
};

use ethers::types::U256;
use futures::future::OptionFuture;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

/// Builds and submits one fee-prefixed bundle per run
pub struct BundlePipeline {
    /// Node used for block height
    rpc: Arc<dyn NodeRpc>,
    /// Bundle identity, shared read-only with signing tasks
    signer: Arc<TransactionSigner>,
    gas_oracle: GasOracle,
    nonces: NonceAllocator,
    builder: TransactionBuilder,
    fee_factory: FeeTransactionFactory,
    assembler: BundleAssembler,
    submitter: BundleSubmitter,
}

impl BundlePipeline {
    /// Create a new pipeline
    pub fn new(
        rpc: Arc<dyn NodeRpc>,
        signer: Arc<TransactionSigner>,
        fee_factory: FeeTransactionFactory,
        assembler: BundleAssembler,
        submitter: BundleSubmitter,
    ) -> BundlerResult<Self> {
        let builder = fee_factory.builder();
        if builder.chain_id() != signer.chain_id() {
            return Err(BundlerError::Config(format!(
                "Builder is on chain {} but signer is on chain {}",
                builder.chain_id(),
                signer.chain_id()
            )));
        }

        Ok(Self {
            gas_oracle: GasOracle::new(rpc.clone()),
            nonces: NonceAllocator::new(rpc.clone()),
            rpc,
            signer,
            builder,
            fee_factory,
            assembler,
            submitter,
        })
    }

    /// Create a pipeline from loaded settings
    pub fn from_settings(
        settings: &Settings,
        rpc: Arc<dyn NodeRpc>,
        signer: Arc<TransactionSigner>,
    ) -> BundlerResult<Self> {
        let fee_factory = FeeTransactionFactory::new(
            TransactionBuilder::new(settings.chain.chain_id),
            settings.fee.collector,
            &settings.fee.base_fee_per_tx,
        )?;

        Self::new(
            rpc,
            signer,
            fee_factory,
            BundleAssembler::new(settings.relay.block_window),
            BundleSubmitter::from_config(&settings.relay)?,
        )
    }

    /// Build, sign and submit the bundle for `intents`
    #[instrument(skip_all, fields(user_txs = intents.len()))]
    pub async fn run(&self, intents: &[TransactionIntent]) -> Result<RelayResponse, PipelineError> {
        let result = self.execute(intents).await;

        if let Err(e) = &result {
            crate::metrics::record_bundle_failed(e.stage.as_str());
            error!(
                stage = %e.stage,
                retryable = e.source.is_retryable(),
                "Bundle run failed: {}",
                e.source
            );
        }

        result
    }

    async fn execute(&self, intents: &[TransactionIntent]) -> Result<RelayResponse, PipelineError> {
        let bundle = self.prepare(intents).await?;

        let response = self.submitter.submit(&bundle).await.at(Stage::Submit)?;
        crate::metrics::record_bundle_submitted(bundle.len());

        Ok(response)
    }

    /// Run every stage up to and including assembly, without submitting
    pub async fn prepare(&self, intents: &[TransactionIntent]) -> Result<Bundle, PipelineError> {
        // Nothing touches the network before the count is known to fit.
        let total = BundleAssembler::check_count(intents.len()).at(Stage::Validate)?;
        let address = self.signer.address();
        let needs_default_price = intents.iter().any(|intent| intent.gas_price.is_none());

        info!("Building bundle of {} transactions for {:?}", total, address);

        let (pending, fee_gas_price, default_gas_price, current_block) = tokio::try_join!(
            async { self.nonces.fetch_pending(address).await.at(Stage::AllocateNonces) },
            async { self.gas_oracle.current_gas_price().await.at(Stage::BuildFeeTx) },
            async {
                OptionFuture::from(needs_default_price.then(|| self.gas_oracle.current_gas_price()))
                    .await
                    .transpose()
                    .at(Stage::BuildUserTxs)
            },
            async { self.rpc.block_number().await.at(Stage::ComputeBlockWindow) },
        )?;

        let nonces = NonceAllocator::allocate(pending, total).at(Stage::AllocateNonces)?;
        let (&fee_nonce, user_nonces) = nonces
            .split_first()
            .ok_or_else(|| BundlerError::Validation("no nonces allocated".to_string()))
            .at(Stage::AllocateNonces)?;
        debug!(first = fee_nonce, count = nonces.len(), "Allocated nonces");

        let fee_record = self
            .fee_factory
            .build(intents.len(), fee_nonce, fee_gas_price)
            .at(Stage::BuildFeeTx)?;
        let fee_tx = self.signer.sign(&fee_record).at(Stage::SignFeeTx)?;
        debug!(hash = ?fee_tx.hash(), nonce = fee_nonce, "Signed fee transaction");

        // Only missing when every intent carries its own price.
        let default_gas_price = default_gas_price.unwrap_or_default();
        let records = intents
            .iter()
            .zip(user_nonces)
            .map(|(intent, &nonce)| self.builder.build(intent, nonce, default_gas_price))
            .collect::<BundlerResult<Vec<_>>>()
            .at(Stage::BuildUserTxs)?;
        let max_cost = std::iter::once(&fee_record)
            .chain(&records)
            .map(|r| GasOracle::calculate_cost(r.gas_limit, r.gas_price).saturating_add(r.value))
            .fold(U256::zero(), U256::saturating_add);
        info!(
            "Bundle spends up to {} native units",
            ethers::utils::format_ether(max_cost)
        );

        let user_txs = self.sign_all(records).await.at(Stage::SignUserTxs)?;
        crate::metrics::record_tx_signed(user_txs.len() + 1);

        let max_block_number = self
            .assembler
            .max_block_number(current_block)
            .at(Stage::ComputeBlockWindow)?;
        info!(current_block, max_block_number, "Computed block window");

        self.assembler
            .assemble(fee_tx, user_txs, current_block)
            .at(Stage::Assemble)
    }

    /// Sign records on blocking tasks, returned in nonce order
    async fn sign_all(
        &self,
        records: Vec<TransactionRecord>,
    ) -> BundlerResult<Vec<SignedTransaction>> {
        let mut tasks = JoinSet::new();
        for record in records {
            let signer = self.signer.clone();
            tasks.spawn_blocking(move || signer.sign(&record));
        }

        let mut signed = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let tx = joined
                .map_err(|e| BundlerError::Signing(format!("signing task failed: {}", e)))??;
            signed.push(tx);
        }

        signed.sort_by_key(SignedTransaction::nonce);
        Ok(signed)
    }
}
