//! The lancom wire protocol and block transfer engine.
//!
//! # Session
//!
//! ```text
//! passive                              initiative
//!    | ---------- CHALLENGE_TOKEN ---------> |
//!    | <--------- RESPONSE_TOKEN ----------- |
//!
//! sender                               receiver
//!    | ---------- header frame ------------> |
//!    | ---------- block 1..block_count ----> |
//!    | ---------- tail block --------------> |
//!    | <--------- FINISH_TOKEN ------------- |
//! ```
//!
//! Either role may be passive or initiative; the handshake follows the
//! connection direction, the header and body follow the data direction.

pub mod completion;
pub mod handshake;
pub mod protocol;
pub mod receiver;
pub mod sender;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use completion::{await_completion, signal_completion, AckStatus};
pub use handshake::negotiate;
pub use protocol::{
    read_full, read_header, write_header, Header, HeaderRead, CHALLENGE_TOKEN,
    DEFAULT_BLOCK_SIZE, FINISH_TOKEN, HEADER_FIXED_LEN, MAX_BLOCK_SIZE, RESPONSE_TOKEN, SIGN,
};
pub use receiver::{Receiver, ReceiverConfig};
pub use sender::{Sender, SenderConfig};
pub use state::{BodyReport, TransferState};
