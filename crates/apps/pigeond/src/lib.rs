//! Daemon-side plumbing for `pigeond`: the framed-msgpack RPC surface over
//! a [`pigeon_service::ServiceBinder`].

pub mod rpc;
