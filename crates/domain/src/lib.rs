//! # mipirobot-domain
//!
//! Pure domain model for the mipirobot operator link.
//!
//! ## Responsibilities
//! - Foundational types: typed identifiers, error conventions, timestamps
//! - Define **Peripherals** (robots seen during a scan) and the ordered,
//!   de-duplicated discovered set
//! - Define **Directional commands** and the "currently held" command indicator
//! - Define the **Parameter set** (three control-loop gains), its bounds and the
//!   parameter store that holds the current value and the operator's draft
//! - Define **Sessions**, connection states and observer **Events**
//! - Encode and decode **wire payloads** exchanged with the robot
//!
//! ## Dependency rule
//! This crate has **no internal dependencies**.
//! It must never import anything from `app`, adapters, or external IO crates.
//! All IO boundaries are expressed as traits in the `app` crate (ports).

pub mod error;
pub mod id;
pub mod time;

pub mod codec;
pub mod command;
pub mod event;
pub mod parameter_store;
pub mod parameters;
pub mod peripheral;
pub mod protocol;
pub mod session;
