//! VISCA protocol engine
//!
//! Implements the controller side of the VISCA camera control protocol over
//! TCP or serial transports.
//!
//! Commands are pipelined: each is ACKed into one of the camera's sockets and
//! later completes or fails there. Inquiries are answered directly, one at a
//! time. Any reply that cannot be correlated with an outstanding operation
//! means the two ends disagree about state, and the connection is closed.

mod codec;
/// Common PTZ commands and inquiries
pub mod commands;
mod dispatch;
mod error;
mod frame;
mod message;
mod params;
mod session;
mod sockets;
/// Byte streams to the camera
pub mod transport;

pub use codec::ViscaCodec;
pub use dispatch::{Dispatcher, Reply, RetryPolicy};
pub use error::{Desync, ViscaError};
pub use frame::{ErrorReply, Frame, HexBytes, Malformed, REPLY_START, TERMINATOR};
pub use message::{validate_message, Command, Inquiry, Origin};
pub use params::{
    Answer, AnswerTemplate, ByteTemplate, FieldRule, Options, Param, ParamValue, MAX_PARAM_NIBBLES,
};
pub use session::{ConnectionStatus, Session, SessionConfig, SessionHandle};
pub use sockets::{SocketError, SocketRegistry, SOCKET_COUNT};
pub use transport::{list_serial_ports, Endpoint, PortInfo, Transport};

/// Conventional VISCA-over-IP port
pub const DEFAULT_TCP_PORT: u16 = 5678;

/// Default baud rate for RS-232 VISCA
pub const DEFAULT_SERIAL_BAUD: u32 = 9600;

/// Longest legal VISCA message, terminator included
pub const MAX_MESSAGE_LEN: usize = 16;

/// Resends allowed after buffer-full errors
pub const DEFAULT_BUFFER_FULL_RETRIES: u32 = 3;

/// Default timeout for opening the transport in milliseconds
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Default depth of the submission channel
pub const DEFAULT_REQUEST_QUEUE_DEPTH: usize = 64;
