//! # mipirobot-app
//!
//! Application layer — the session controller and **port definitions** (traits).
//!
//! ## Responsibilities
//! - Define **port traits** that adapters must implement (driven/outbound ports):
//!   - `Transport` — scan, connect, GATT write/read, link-loss notification
//!   - `EventPublisher` — deliver controller events to observers
//! - Define the **driving/inbound port** as a service struct:
//!   - `SessionController` — discovery, connection lifecycle, command
//!     dispatch and gain synchronisation
//! - Provide **in-process infrastructure** (event bus) that doesn't need IO
//!
//! ## Dependency rule
//! Depends on `mipirobot-domain` only (plus `tokio` for tasks, timers and channels).
//! Never imports adapter crates. Adapters depend on *this* crate, not the reverse.

pub mod config;
pub mod event_bus;
pub mod ports;
pub mod services;
