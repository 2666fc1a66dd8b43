//! Command handlers
//!
//! The operations a host application calls, with serializable responses.

pub mod recording;
