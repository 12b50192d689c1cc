//! Core domain + application logic for the auto-responder.
//!
//! Transport and speech synthesis live behind ports (traits) implemented in
//! adapter crates; everything here is testable with in-memory fakes.

pub mod config;
pub mod credentials;
pub mod domain;
pub mod errors;
pub mod interaction;
pub mod knowledge;
pub mod lifecycle;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod responder;
pub mod selector;
pub mod settings;
pub mod similarity;
pub mod speech;
pub mod supervisor;

pub use errors::{Error, Result};
