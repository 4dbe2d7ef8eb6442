//! lancom - send one file between two hosts over a raw TCP stream.
//!
//! One side connects (initiative), the other listens (passive); either may be
//! the sender. After a challenge/response handshake the sender writes a
//! fixed-layout header and the file body in fixed-size blocks, and the
//! receiver answers with a completion token.

pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod session;
pub mod streaming;
pub mod transport;

pub use config::Config;
pub use error::{Result, TransferError};
pub use session::{ReceiveOutcome, Role, SendReport, Session};
pub use transport::RoleMode;
