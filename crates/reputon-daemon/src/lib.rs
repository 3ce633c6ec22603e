// crates/reputon-daemon/src/lib.rs
//
// reputon-daemon: Node process for the Reputon protocol.
//
// The binary in main.rs is a thin shell over these modules so the
// integration tests can drive the same wiring.

pub mod config;
pub mod logging;
pub mod node;
pub mod runtime;
