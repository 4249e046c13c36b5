//! # Unit Components
//!
//! Tests for each layer of the bridge, leaf to root: transport, SoC devices,
//! the reference simulator, the scheduler and session establishment.



/// Session establishment: direct sessions, the multiplexer and end-to-end runs.
pub mod session;




/// Transport: messages, framing and sockets.
pub mod transport;
