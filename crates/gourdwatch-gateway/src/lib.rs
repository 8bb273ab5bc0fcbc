//! # GourdWatch Gateway
//! HTTP API for monitoring records, gourd types, push registration and
//! scheduler status. Authentication happens upstream; this layer trusts the
//! `X-User-Id` / `X-User-Role` headers the auth proxy sets.

pub mod routes;
pub mod server;

pub use server::{AppState, Principal, build_router, serve};
