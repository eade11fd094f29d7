use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::{
    domain::{Address, RegistryKind, Wei},
    error::RpcErrorObject,
    protocol::{
        ReadCall, ReadValue, RegistryBindings, SubmitCall, SubmitRequest, TransactionOutcome,
        TxReceipt,
    },
};
use tracing::{debug, warn};
use url::Url;

use crate::{GatewayError, LedgerGateway};

const READ_METHOD: &str = "registry_read";
const SUBMIT_METHOD: &str = "registry_submit";

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a, P> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: P,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorObject>,
}

#[derive(Debug, Serialize)]
struct ReadParams<'a> {
    contract: &'a Address,
    registry: RegistryKind,
    call: &'a ReadCall,
}

#[derive(Debug, Serialize)]
struct SubmitParams<'a> {
    contract: &'a Address,
    registry: RegistryKind,
    from: &'a Address,
    value: Wei,
    gas: u64,
    call: &'a SubmitCall,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum SubmitResult {
    Confirmed {
        tx_hash: String,
        #[serde(default)]
        fee_paid: Option<Wei>,
    },
    Reverted {
        reason: String,
    },
}

pub struct HttpLedgerGateway {
    http: Client,
    rpc_url: Url,
    bindings: RegistryBindings,
    listing: Vec<RegistryKind>,
    next_id: AtomicU64,
}

impl HttpLedgerGateway {
    pub fn new(rpc_url: Url, bindings: RegistryBindings) -> Self {
        Self::with_client(Client::new(), rpc_url, bindings)
    }

    pub fn with_client(http: Client, rpc_url: Url, bindings: RegistryBindings) -> Self {
        Self {
            http,
            rpc_url,
            bindings,
            listing: vec![RegistryKind::Zombie],
            next_id: AtomicU64::new(1),
        }
    }

    pub fn with_listing(mut self, registries: &[RegistryKind]) -> Self {
        self.listing = registries.to_vec();
        self
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R, GatewayError>
    where
        P: Serialize + Send,
        R: DeserializeOwned + Send,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id,
            method,
            params,
        };

        let response = self
            .http
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(GatewayError::transport)?
            .error_for_status()
            .map_err(GatewayError::transport)?;

        let body: JsonRpcResponse<R> = response.json().await.map_err(|err| GatewayError::Decode {
            cause: err.to_string(),
        })?;

        match (body.result, body.error) {
            (_, Some(error)) if error.is_revert() => Err(GatewayError::Reverted {
                message: error.message,
            }),
            (_, Some(error)) => Err(GatewayError::Transport {
                cause: format!("rpc error {}: {}", error.code, error.message),
            }),
            (Some(result), None) => Ok(result),
            (None, None) => Err(GatewayError::Decode {
                cause: format!("rpc response {id} carried neither result nor error"),
            }),
        }
    }
}

#[async_trait]
impl LedgerGateway for HttpLedgerGateway {
    async fn read(
        &self,
        registry: RegistryKind,
        call: ReadCall,
    ) -> Result<ReadValue, GatewayError> {
        debug!(registry = %registry, method = call.method_name(), "ledger read");
        let params = ReadParams {
            contract: self.bindings.contract_for(registry),
            registry,
            call: &call,
        };
        self.call(READ_METHOD, params).await
    }

    async fn submit(&self, request: SubmitRequest) -> TransactionOutcome {
        let registry = request.call.registry();
        debug!(
            registry = %registry,
            method = request.call.method_name(),
            from = %request.from,
            fee = %request.fee,
            "ledger submit"
        );
        let params = SubmitParams {
            contract: self.bindings.contract_for(registry),
            registry,
            from: &request.from,
            value: request.fee,
            gas: request.gas_limit,
            call: &request.call,
        };

        match self.call::<_, SubmitResult>(SUBMIT_METHOD, params).await {
            Ok(SubmitResult::Confirmed { tx_hash, fee_paid }) => {
                TransactionOutcome::Confirmed(TxReceipt {
                    tx_hash,
                    fee_paid: fee_paid.unwrap_or(request.fee),
                })
            }
            Ok(SubmitResult::Reverted { reason }) => TransactionOutcome::Reverted { reason },
            Err(GatewayError::Reverted { message }) => {
                TransactionOutcome::Reverted { reason: message }
            }
            Err(err) => {
                warn!(method = request.call.method_name(), error = %err, "submit did not reach ledger");
                TransactionOutcome::TransportFailed {
                    cause: err.to_string(),
                }
            }
        }
    }

    fn supports_listing(&self, registry: RegistryKind) -> bool {
        self.listing.contains(&registry)
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
