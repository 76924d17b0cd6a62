//! Protocol errors

use thiserror::Error;

use super::frame::HexBytes;

/// Errors reported to the caller of a single command or inquiry
#[derive(Error, Debug)]
pub enum ViscaError {
    /// Rejected locally before transmission
    #[error("attempt to send invalid message: {0}")]
    InvalidMessage(String),

    /// Camera command buffer stayed full past the retry bound
    #[error("command buffer full: {0} was not executed")]
    BufferFull(String),

    /// Camera could not parse the message
    #[error("camera reported a syntax error in {0}")]
    SyntaxError(String),

    /// Camera cannot run the command in its current state
    #[error("{0} can't be executed now")]
    NotExecutable(String),

    /// Answer did not match the inquiry's template
    #[error("response to {description} is incompatible with expected format: {detail}")]
    IncompatibleAnswer {
        /// Inquiry that was answered
        description: String,
        /// What did not match
        detail: String,
    },

    /// The connection went away before the operation finished
    #[error("message not fully processed: {0}")]
    Closed(String),

    /// No session to send through
    #[error("Not connected to camera")]
    NotConnected,

    /// Transport did not open in time
    #[error("Connection timeout")]
    Timeout,

    /// Session configuration could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serial port could not be opened
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// Transport I/O failure
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Conditions under which the engine's view of outstanding operations no
/// longer matches the camera's. Every one of these closes the connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Desync {
    /// ACK arrived with no command awaiting one
    #[error("received ACK for socket {socket} without a pending command")]
    AckWithoutPendingCommand {
        /// Socket named in the ACK
        socket: u8,
    },

    /// ACK with trailing bytes
    #[error("received malformed ACK {0}, closing to avoid send/receive decoherence")]
    MalformedAck(HexBytes),

    /// ACK names a socket that is still executing
    #[error("received ACK for socket {socket}, which is still executing a command")]
    SocketAlreadyOccupied {
        /// Socket named in the ACK
        socket: u8,
    },

    /// Completion for a socket with nothing executing
    #[error("received Completion in empty socket {socket}")]
    CompletionInEmptySocket {
        /// Socket named in the Completion
        socket: u8,
    },

    /// Socket error for a socket with nothing executing
    #[error("received error response in empty socket {socket}")]
    ErrorInEmptySocket {
        /// Socket named in the error
        socket: u8,
    },

    /// Answer arrived with no inquiry outstanding
    #[error("received inquiry response {0} without a pending inquiry")]
    InquiryResponseWithoutPendingInquiry(HexBytes),

    /// General error with nothing awaiting a first reply
    #[error("received unexpected error {0} with no messages awaiting initial response")]
    GeneralErrorWithNothingPending(HexBytes),

    /// Error code or generality not recognized
    #[error("received error response {0} with unrecognized format")]
    UnrecognizedError(HexBytes),

    /// Error frame not exactly four bytes
    #[error("received error response {0} of unexpected length")]
    ErrorOfUnexpectedLength(HexBytes),

    /// Reply not starting with `90`
    #[error("bad return start byte in {0}")]
    BadStartByte(HexBytes),

    /// Reply of no known shape
    #[error("received response {0} with unrecognized format")]
    UnrecognizedFormat(HexBytes),

    /// Input ran past the frame limit with no terminator
    #[error("received {0} bytes without a message terminator")]
    Oversized(usize),

    /// Stream ended or the host closed the session
    #[error("socket was closed")]
    TransportClosed,

    /// Read or write failed
    #[error("transport error: {0}")]
    Transport(String),
}
