use alloy::{
    network::TransactionBuilder,
    primitives::{Address, Bytes},
    providers::{Provider, ProviderBuilder, RootProvider},
    rpc::types::eth::TransactionRequest,
    sol_types::SolCall,
    transports::http::{Client, Http},
};
use anyhow::{Context, Result};
use std::{fmt::Display, future::IntoFuture, time::Duration};

use crate::error::LedgerError;

pub type HttpProvider = RootProvider<Http<Client>>;

/// HTTP provider with a bound on every request.
pub struct Rpc {
    inner: HttpProvider,
    timeout: Duration,
    receipt_poll: Duration,
}

impl Rpc {
    pub fn new(rpc_url: &str, timeout_ms: u64, receipt_poll_ms: u64) -> Result<Self> {
        let url = rpc_url
            .parse()
            .with_context(|| format!("invalid rpc url: {}", rpc_url))?;
        let inner = ProviderBuilder::new().on_http(url);

        Ok(Self {
            inner,
            timeout: Duration::from_millis(timeout_ms),
            receipt_poll: Duration::from_millis(receipt_poll_ms),
        })
    }

    pub fn client(&self) -> &HttpProvider {
        &self.inner
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn receipt_poll(&self) -> Duration {
        self.receipt_poll
    }

    /// Run one request under the configured timeout, folding both failure
    /// modes into a read error.
    pub async fn bounded<F, T, E>(&self, what: &str, request: F) -> Result<T, LedgerError>
    where
        F: IntoFuture<Output = std::result::Result<T, E>>,
        E: Display,
    {
        tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| {
                LedgerError::Read(format!(
                    "{} timed out after {}ms",
                    what,
                    self.timeout.as_millis()
                ))
            })?
            .map_err(|err| LedgerError::Read(format!("{} failed: {}", what, err)))
    }

    /// `eth_call` a view function and decode its return value.
    pub async fn view<C: SolCall>(&self, to: Address, call: C) -> Result<C::Return, LedgerError> {
        let request = TransactionRequest::default()
            .with_to(to)
            .with_input(Bytes::from(call.abi_encode()));
        let raw = self
            .bounded(C::SIGNATURE, self.inner.call(&request))
            .await?;
        C::abi_decode_returns(raw.as_ref(), true)
            .map_err(|err| LedgerError::Read(format!("{} decode failed: {}", C::SIGNATURE, err)))
    }
}
