//! Method dispatch from RPC requests onto the service binder.

use std::sync::Arc;

use pigeon_ipc::{
    SendMessageRequest, ServiceCallback, ServiceControl, ServiceEvent, ServiceEvents,
    ServiceIdentity, ServiceMessaging, ServiceRouting,
};
use pigeon_service::ServiceBinder;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use tokio::sync::{broadcast, Mutex};

use super::types::{RpcError, RpcRequest, RpcResponse};

/// Initialization outcomes land in the daemon log; remote clients observe
/// them through `poll_events` and `get_status`.
struct LoggingCallback;

impl ServiceCallback for LoggingCallback {
    fn on_initialization_complete(&self, result: pigeon_ipc::InitResult) {
        log::info!(
            "daemon: initialization complete, generation {}",
            result.generation
        );
    }

    fn on_initialization_error(&self, error: &str) {
        log::error!("daemon: initialization failed: {error}");
    }
}

#[derive(Deserialize)]
struct DestinationParams {
    destination_hash: String,
}

#[derive(Deserialize)]
struct StorePeerIdentityParams {
    identity_hash: String,
    public_key_hex: String,
}

#[derive(Deserialize)]
struct ResolvePeerNameParams {
    peer_hash: String,
    #[serde(default)]
    cached: Option<String>,
}

#[derive(Deserialize)]
struct ConversationActiveParams {
    active: bool,
}

pub struct RpcDispatcher {
    binder: Arc<ServiceBinder>,
    // One event cursor per daemon; `poll_events` drains whatever accumulated
    // since the previous poll.
    events: Mutex<Option<broadcast::Receiver<ServiceEvent>>>,
}

impl RpcDispatcher {
    pub fn new(binder: Arc<ServiceBinder>) -> Self {
        Self {
            binder,
            events: Mutex::new(None),
        }
    }

    pub async fn handle(&self, request: RpcRequest) -> RpcResponse {
        let id = request.id;
        match self.dispatch(&request).await {
            Ok(result) => RpcResponse::ok(id, result),
            Err(error) => RpcResponse::err(id, error),
        }
    }

    async fn dispatch(&self, request: &RpcRequest) -> Result<JsonValue, RpcError> {
        match request.method.as_str() {
            "initialize" => {
                let params = request
                    .params
                    .as_ref()
                    .ok_or_else(|| RpcError::invalid_request("initialize requires a config"))?;
                let config_json = serde_json::to_string(params)
                    .map_err(|err| RpcError::invalid_request(err.to_string()))?;
                self.binder
                    .initialize(&config_json, Arc::new(LoggingCallback))
                    .await?;
                Ok(json!({ "accepted": true }))
            }
            "shutdown" => {
                self.binder.shutdown().await?;
                Ok(json!({ "accepted": true }))
            }
            "get_status" => Ok(JsonValue::String(self.binder.get_status().await?)),
            "get_debug_info" => {
                let info = self.binder.get_debug_info().await?;
                serde_json::to_value(info).map_err(internal)
            }
            "send_message" => {
                let request: SendMessageRequest = self.params(request)?;
                let message_id = self.binder.send_message(request).await?;
                Ok(json!({ "message_id": message_id }))
            }
            "has_path" => {
                let params: DestinationParams = self.params(request)?;
                let known = self.binder.has_path(&params.destination_hash).await?;
                Ok(json!({ "has_path": known }))
            }
            "request_path" => {
                let params: DestinationParams = self.params(request)?;
                self.binder.request_path(&params.destination_hash).await?;
                Ok(json!({ "requested": true }))
            }
            "hop_count" => {
                let params: DestinationParams = self.params(request)?;
                let hops = self.binder.hop_count(&params.destination_hash).await?;
                Ok(json!({ "hops": hops }))
            }
            "path_table" => {
                let table = self.binder.path_table().await?;
                serde_json::to_value(table).map_err(internal)
            }
            "announce" => {
                self.binder.announce().await?;
                Ok(json!({ "announced": true }))
            }
            "get_identity" => {
                let identity = self.binder.get_identity().await?;
                serde_json::to_value(identity).map_err(internal)
            }
            "store_peer_identity" => {
                let params: StorePeerIdentityParams = self.params(request)?;
                let public_key = hex::decode(&params.public_key_hex)
                    .map_err(|err| RpcError::invalid_request(format!("bad public key: {err}")))?;
                self.binder
                    .store_peer_identity(&params.identity_hash, &public_key)
                    .await?;
                Ok(json!({ "stored": true }))
            }
            "poll_events" => {
                let events = self.drain_events().await?;
                serde_json::to_value(events).map_err(internal)
            }
            "resolve_peer_name" => {
                let params: ResolvePeerNameParams = self.params(request)?;
                let name = self
                    .binder
                    .resolve_peer_name(&params.peer_hash, params.cached.as_deref());
                Ok(json!({ "name": name }))
            }
            "set_conversation_active" => {
                let params: ConversationActiveParams = self.params(request)?;
                self.binder.set_conversation_active(params.active);
                Ok(json!({ "active": params.active }))
            }
            other => Err(RpcError::unknown_method(other)),
        }
    }

    fn params<T: serde::de::DeserializeOwned>(&self, request: &RpcRequest) -> Result<T, RpcError> {
        let params = request
            .params
            .clone()
            .ok_or_else(|| RpcError::invalid_request("missing params"))?;
        serde_json::from_value(params).map_err(|err| RpcError::invalid_request(err.to_string()))
    }

    async fn drain_events(&self) -> Result<Vec<ServiceEvent>, RpcError> {
        let mut guard = self.events.lock().await;
        if guard.is_none() {
            *guard = Some(self.binder.subscribe().await?);
        }
        let rx = guard.as_mut().expect("subscription just installed");

        let mut drained = Vec::new();
        loop {
            match rx.try_recv() {
                Ok(event) => drained.push(event),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    log::warn!("daemon: event cursor lagged, dropped {skipped} events");
                }
                Err(broadcast::error::TryRecvError::Empty)
                | Err(broadcast::error::TryRecvError::Closed) => break,
            }
        }
        Ok(drained)
    }
}

fn internal(err: serde_json::Error) -> RpcError {
    RpcError::new("INTERNAL", err.to_string(), false)
}
