use alloy::{
    eips::eip2718::Encodable2718,
    network::{EthereumWallet, ReceiptResponse, TransactionBuilder},
    primitives::{Address, B256, Bytes, I256, TxHash, U256},
    providers::Provider,
    rpc::types::eth::TransactionRequest,
    signers::local::PrivateKeySigner,
    sol_types::SolCall,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::{
    client::{
        contracts::{IPredictionRounds, IPyth},
        rpc::Rpc,
    },
    error::LedgerError,
    types::RoundTuple,
};

/// Per-transaction inputs chosen by the caller. The nonce is always a fresh
/// pending-inclusive read; callers never cache it across submissions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TxParams {
    pub nonce: u64,
    pub gas_limit: u64,
    pub gas_price: u128,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: TxHash,
    pub success: bool,
    pub block_number: Option<u64>,
}

/// Reads and writes against the round contract and the oracle contract.
#[async_trait]
pub trait Ledger: Send + Sync {
    async fn current_round_id(&self) -> Result<u64, LedgerError>;

    async fn round_by_id(&self, round_id: u64) -> Result<RoundTuple, LedgerError>;

    /// Queued work items that must exist before a round can open.
    async fn pending_work_count(&self) -> Result<u64, LedgerError>;

    /// Next nonce for the judge account, counting transactions still pending.
    async fn current_nonce(&self) -> Result<u64, LedgerError>;

    async fn current_gas_price(&self) -> Result<u128, LedgerError>;

    /// Fee the oracle contract charges to post `payload`.
    async fn quote_update_fee(&self, payload: &Bytes) -> Result<U256, LedgerError>;

    async fn submit_start_round(&self, params: TxParams) -> Result<TxHash, LedgerError>;

    async fn submit_oracle_update(
        &self,
        payload: &Bytes,
        fee: U256,
        params: TxParams,
    ) -> Result<TxHash, LedgerError>;

    async fn submit_finalize(
        &self,
        feed_id: B256,
        params: TxParams,
    ) -> Result<TxHash, LedgerError>;

    /// Block until the transaction is mined or `timeout` expires.
    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<TxReceipt, LedgerError>;
}

pub struct EvmLedger {
    rpc: Rpc,
    signer: PrivateKeySigner,
    wallet: EthereumWallet,
    chain_id: u64,
    round_contract: Address,
    oracle_contract: Address,
}

impl EvmLedger {
    pub fn new(
        rpc: Rpc,
        signer: PrivateKeySigner,
        chain_id: u64,
        round_contract: Address,
        oracle_contract: Address,
    ) -> Self {
        let wallet = EthereumWallet::from(signer.clone());
        Self {
            rpc,
            signer,
            wallet,
            chain_id,
            round_contract,
            oracle_contract,
        }
    }

    pub fn signer_address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_and_send(
        &self,
        op: &str,
        to: Address,
        input: Vec<u8>,
        value: U256,
        params: TxParams,
    ) -> Result<TxHash, LedgerError> {
        let mut tx = TransactionRequest::default()
            .with_to(to)
            .with_input(input)
            .with_value(value)
            .with_chain_id(self.chain_id)
            .with_nonce(params.nonce)
            .with_gas_limit(params.gas_limit)
            .with_gas_price(params.gas_price);
        tx.from = Some(self.signer.address());

        let signed = tx
            .build(&self.wallet)
            .await
            .map_err(|err| LedgerError::Signing(format!("{} signing failed: {}", op, err)))?;
        let raw = signed.encoded_2718();

        let pending = tokio::time::timeout(
            self.rpc.timeout(),
            self.rpc.client().send_raw_transaction(&raw),
        )
        .await
        .map_err(|_| LedgerError::Rejected(format!("{} broadcast timed out", op)))?
        .map_err(|err| LedgerError::from_submit_message(err.to_string()))?;

        let tx_hash = *pending.tx_hash();
        debug!(
            op,
            %tx_hash,
            nonce = params.nonce,
            gas_limit = params.gas_limit,
            "broadcast"
        );
        Ok(tx_hash)
    }
}

fn to_u64(value: U256, field: &str) -> Result<u64, LedgerError> {
    u64::try_from(value)
        .map_err(|_| LedgerError::Read(format!("{} overflows u64: {}", field, value)))
}

fn to_i64(value: U256, field: &str) -> Result<i64, LedgerError> {
    i64::try_from(value)
        .map_err(|_| LedgerError::Read(format!("{} overflows i64: {}", field, value)))
}

fn signed_to_i64(value: I256, field: &str) -> Result<i64, LedgerError> {
    i64::try_from(value)
        .map_err(|_| LedgerError::Read(format!("{} overflows i64: {}", field, value)))
}

#[async_trait]
impl Ledger for EvmLedger {
    async fn current_round_id(&self) -> Result<u64, LedgerError> {
        let ret = self
            .rpc
            .view(
                self.round_contract,
                IPredictionRounds::currentPredictionRoundCall {},
            )
            .await?;
        to_u64(ret._0, "currentPredictionRound")
    }

    async fn round_by_id(&self, round_id: u64) -> Result<RoundTuple, LedgerError> {
        let r = self
            .rpc
            .view(
                self.round_contract,
                IPredictionRounds::predictionRoundsCall {
                    roundId: U256::from(round_id),
                },
            )
            .await?;

        Ok((
            to_u64(r.forBlockNumber, "forBlockNumber")?,
            to_i64(r.startTime, "startTime")?,
            to_i64(r.submissionDeadline, "submissionDeadline")?,
            to_u64(r.predictionCount, "predictionCount")?,
            r.finalized,
            r.winnerAgent,
            signed_to_i64(r.actualPrice, "actualPrice")?,
        ))
    }

    async fn pending_work_count(&self) -> Result<u64, LedgerError> {
        let ret = self
            .rpc
            .view(
                self.round_contract,
                IPredictionRounds::getCurrentMempoolCountCall {},
            )
            .await?;
        to_u64(ret._0, "getCurrentMempoolCount")
    }

    async fn current_nonce(&self) -> Result<u64, LedgerError> {
        self.rpc
            .bounded(
                "eth_getTransactionCount",
                self.rpc
                    .client()
                    .get_transaction_count(self.signer.address())
                    .pending(),
            )
            .await
    }

    async fn current_gas_price(&self) -> Result<u128, LedgerError> {
        self.rpc
            .bounded("eth_gasPrice", self.rpc.client().get_gas_price())
            .await
    }

    async fn quote_update_fee(&self, payload: &Bytes) -> Result<U256, LedgerError> {
        let ret = self
            .rpc
            .view(
                self.oracle_contract,
                IPyth::getUpdateFeeCall {
                    updateData: vec![payload.clone()],
                },
            )
            .await?;
        Ok(ret.feeAmount)
    }

    async fn submit_start_round(&self, params: TxParams) -> Result<TxHash, LedgerError> {
        let input = IPredictionRounds::startNewRoundCall {}.abi_encode();
        self.sign_and_send("startNewRound", self.round_contract, input, U256::ZERO, params)
            .await
    }

    async fn submit_oracle_update(
        &self,
        payload: &Bytes,
        fee: U256,
        params: TxParams,
    ) -> Result<TxHash, LedgerError> {
        let input = IPyth::updatePriceFeedsCall {
            updateData: vec![payload.clone()],
        }
        .abi_encode();
        self.sign_and_send("updatePriceFeeds", self.oracle_contract, input, fee, params)
            .await
    }

    async fn submit_finalize(
        &self,
        feed_id: B256,
        params: TxParams,
    ) -> Result<TxHash, LedgerError> {
        let input = IPredictionRounds::finalizeRoundAndMineBlockCall {
            priceFeedId: feed_id,
        }
        .abi_encode();
        self.sign_and_send(
            "finalizeRoundAndMineBlock",
            self.round_contract,
            input,
            U256::ZERO,
            params,
        )
        .await
    }

    async fn wait_for_receipt(
        &self,
        tx_hash: TxHash,
        timeout: Duration,
    ) -> Result<TxReceipt, LedgerError> {
        let poll = async {
            loop {
                match self.rpc.client().get_transaction_receipt(tx_hash).await {
                    Ok(Some(receipt)) => {
                        return TxReceipt {
                            tx_hash,
                            success: receipt.status(),
                            block_number: receipt.block_number(),
                        };
                    }
                    Ok(None) => {}
                    Err(err) => debug!(%tx_hash, error = %err, "receipt poll failed"),
                }
                tokio::time::sleep(self.rpc.receipt_poll()).await;
            }
        };

        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| LedgerError::ConfirmationTimeout {
                hash: tx_hash,
                secs: timeout.as_secs(),
            })
    }
}
