//! Session establishment tests.

/// Direct and routed sessions over real sockets, driven through a full run.
pub mod end_to_end;
