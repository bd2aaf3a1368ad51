//! # contactdb
//!
//! Contact records and the slow backing loader behind the contact cache.
//!
//! ## Components
//! - **Contact**: record whose fields are derived from its id
//! - **SlowLoader**: blocks for a fixed delay, then synthesizes a contact
//! - **CancelToken**: interrupts an in-progress delay

#![warn(missing_docs)]

mod contact;
mod error;
mod loader;

pub use contact::Contact;
pub use error::{Error, Result};
pub use loader::{CancelToken, LoaderConfig, SlowLoader, DEFAULT_DELAY};
