//! Protocol Buffer definitions and generated code for the subscription RPC.
//!
//! Types are generated at build time by [`tonic-build`] from
//! `proto/subscription_service.proto`.

#![allow(clippy::all)]

tonic::include_proto!("configserv.v1");
