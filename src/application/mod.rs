//! Application layer: the intake service that records and announces new requests, and
//! the orchestration worker that drives them to a terminal status.
//!
//! Both sides talk to storage, the router and partner systems only through the ports in
//! `crate::domain::ports`.

pub mod retry;
pub mod service;
pub mod worker;
