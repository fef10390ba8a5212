//! # Stockroom
//!
//! Equipment and asset tracking back office on the `may` coroutine runtime:
//! product catalog, asset intake from CSV uploads or JSON, auto-generated
//! asset tags, and a stock ledger that records every hand-out and return.
//!
//! Layers, bottom up:
//!
//! - [`connection`], [`executor`], [`transaction`], [`pool`]: `may_postgres`
//!   plumbing
//! - [`store`]: storage capabilities with PostgreSQL and in-memory backends
//! - [`registry`], [`ledger`], [`intake`]: the workflow
//! - [`api`] and [`server`]: the REST surface
//! - [`migration`]: embedded schema migrations

pub mod api;
pub mod app;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod intake;
pub mod ledger;
pub mod metrics;
pub mod migration;
pub mod model;
pub mod pool;
pub mod registry;
pub mod server;
pub mod store;
pub mod transaction;

pub use app::App;
pub use config::{Backend, StockroomConfig};
pub use error::StockError;
pub use executor::{DbError, DbExecutor, PgExecutor};
pub use pool::DbPool;
pub use store::{MemoryStore, PgStore, Store};
