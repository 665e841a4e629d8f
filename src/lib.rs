//! Local-first task storage and synchronization for Eisenhower-quadrant
//! task management.
//!
//! The core is one storage contract ([`store::TaskStore`]) with three
//! backends, a durable change queue, and a sync coordinator reconciling the
//! two against a remote. UI layers sit on [`service::TaskService`] and the
//! pure [`filter`] functions.

pub mod config;
pub mod error;
pub mod filter;
pub mod queue;
pub mod server;
pub mod service;
pub mod store;
pub mod sync;
pub mod types;
