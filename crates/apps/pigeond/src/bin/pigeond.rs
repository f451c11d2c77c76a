use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use pigeon_daemon::rpc::{codec, RpcDispatcher, RpcRequest};
use pigeon_ipc::{InitResult, ServiceCallback, ServiceControl};
use pigeon_service::config::ConfigApplyFlag;
use pigeon_service::engine::{EngineFactory, ProtocolEngine, StubEngine};
use pigeon_service::locks::NoopLocks;
use pigeon_service::ServiceBinder;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};

#[derive(Parser, Debug)]
#[command(name = "pigeond", version, about = "Pigeon mesh service daemon")]
struct Args {
    /// RPC listen address
    #[arg(long, default_value = "127.0.0.1:4246")]
    rpc: String,

    /// Storage root for identities, events and config state
    #[arg(long, default_value = "pigeon-data")]
    storage: PathBuf,

    /// Initialize the engine at startup, from the given config file or with
    /// a default configuration rooted at --storage
    #[arg(long, value_name = "CONFIG_JSON", num_args = 0..=1, default_missing_value = "")]
    auto_initialize: Option<PathBuf>,
}

struct StartupCallback;

impl ServiceCallback for StartupCallback {
    fn on_initialization_complete(&self, result: InitResult) {
        log::info!(
            "pigeond: startup initialization complete, generation {}",
            result.generation
        );
    }

    fn on_initialization_error(&self, error: &str) {
        log::error!("pigeond: startup initialization failed: {error}");
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let addr: SocketAddr = args.rpc.parse().expect("valid --rpc address");

    let factory: Arc<dyn EngineFactory> =
        Arc::new(|| -> Arc<dyn ProtocolEngine> { Arc::new(StubEngine::default()) });
    let binder = ServiceBinder::new(factory, Arc::new(NoopLocks));

    // A flag left behind means a previous configuration apply never settled;
    // do not auto-apply on top of whatever state that left on disk.
    let apply_flag = ConfigApplyFlag::new(&args.storage);
    let auto_initialize = if apply_flag.is_marked() {
        log::warn!("pigeond: stale config-apply flag found, skipping auto-initialize");
        if let Err(err) = apply_flag.clear() {
            log::warn!("pigeond: could not clear config-apply flag: {err}");
        }
        None
    } else {
        args.auto_initialize
    };

    if let Some(config_path) = auto_initialize {
        let blob = if config_path.as_os_str().is_empty() {
            json!({ "storagePath": args.storage.display().to_string() }).to_string()
        } else {
            match std::fs::read_to_string(&config_path) {
                Ok(blob) => blob,
                Err(err) => {
                    log::error!("pigeond: cannot read {}: {err}", config_path.display());
                    std::process::exit(1);
                }
            }
        };
        if let Err(err) = binder.initialize(&blob, Arc::new(StartupCallback)).await {
            log::error!("pigeond: auto-initialize rejected: {err}");
        }
    }

    let dispatcher = Arc::new(RpcDispatcher::new(binder));
    run_rpc_loop(addr, dispatcher).await;
}

async fn run_rpc_loop(addr: SocketAddr, dispatcher: Arc<RpcDispatcher>) {
    let listener = TcpListener::bind(addr).await.expect("bind rpc listener");
    println!("pigeond listening on {addr}");

    loop {
        let (stream, peer_addr) = listener.accept().await.expect("accept rpc socket");
        handle_connection(stream, peer_addr, dispatcher.as_ref()).await;
    }
}

async fn handle_connection(mut stream: TcpStream, peer_addr: SocketAddr, dispatcher: &RpcDispatcher) {
    loop {
        let payload = match codec::read_frame(&mut stream).await {
            Ok(Some(payload)) => payload,
            Ok(None) => break,
            Err(err) => {
                log::warn!("pigeond: rpc read error peer={peer_addr} err={err}");
                break;
            }
        };
        let request: RpcRequest = match codec::decode_payload(&payload) {
            Ok(request) => request,
            Err(err) => {
                emit_access_log(peer_addr, None, None, 0, false, Some(&err.to_string()));
                break;
            }
        };

        let method = request.method.clone();
        let request_id = request.id;
        let started_at = std::time::Instant::now();
        let response = dispatcher.handle(request).await;
        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        emit_access_log(
            peer_addr,
            Some(&method),
            Some(request_id),
            elapsed_ms,
            response.error.is_none(),
            response.error.as_ref().map(|e| e.message.as_str()),
        );

        if let Err(err) = codec::write_frame(&mut stream, &response).await {
            log::warn!("pigeond: rpc write error peer={peer_addr} err={err}");
            break;
        }
    }
}

fn emit_access_log(
    peer_addr: SocketAddr,
    method: Option<&str>,
    request_id: Option<u64>,
    elapsed_ms: u64,
    ok: bool,
    error: Option<&str>,
) {
    let payload = json!({
        "event": "rpc_request",
        "peer": peer_addr.to_string(),
        "method": method,
        "request_id": request_id,
        "elapsed_ms": elapsed_ms,
        "ok": ok,
        "error": error,
    });
    eprintln!("{payload}");
}
