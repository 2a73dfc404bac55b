//! Wire protocol for the chess matchmaking/relay server.
//!
//! Records are UTF-8 text delimited by a single ETX (0x03) byte. This crate
//! owns only the framing, the fixed wire vocabulary, the localized string
//! catalog, and the Elo arithmetic — the connection/session state machine
//! lives in the `chess-server` binary.

pub mod constants;
pub mod elo;
pub mod framer;
pub mod lang;
pub mod wire;

pub use constants::*;
pub use framer::{FrameBuffer, FrameError, ReadOutcome};
