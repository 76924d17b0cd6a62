//! # ViscaLink Core Library
//!
//! Controller-side engine for PTZ cameras speaking VISCA.

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//!
//! This library provides:
//! - Reply frame classification and a tokio codec for VISCA byte streams
//! - Nibble-level parameter encoding for commands and inquiry answers
//! - Correlation of replies with outstanding operations, including
//!   buffer-full retransmission
//! - A connection session over TCP or serial with status reporting
//! - A catalogue of common PTZ commands and inquiries
//!
//! ## Example
//!
//! ```rust,ignore
//! use visca_core::protocol::{commands, Endpoint, Options, Session, SessionConfig};
//!
//! let config = SessionConfig {
//!     endpoint: Endpoint::tcp("192.168.0.90"),
//!     ..Default::default()
//! };
//! let camera = Session::connect(config);
//!
//! camera
//!     .send_command(&commands::preset_recall(), &Options::new().with("preset", 3))
//!     .await?;
//! let zoom = camera.send_inquiry(&commands::zoom_position_inquiry()).await?;
//! println!("zoom: {:?}", zoom.number("position"));
//! ```

/// VISCA protocol engine
pub mod protocol;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Items most hosts need
pub mod prelude {
    pub use crate::protocol::commands;
    pub use crate::protocol::{
        Answer, Command, ConnectionStatus, Endpoint, Inquiry, Options, Session, SessionConfig,
        SessionHandle, ViscaError,
    };
}
