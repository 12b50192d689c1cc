//! Transport-facing abstractions: the event feed coming in, the send port going out.

pub mod port;
pub mod types;
