//! Dispatch queue and retry policy
//!
//! Correlates every reply frame with the operation that caused it, using two
//! independent structures:
//!
//! - `awaiting_ack`: commands on the wire that have not had their initial
//!   response, strictly in send order. General errors (socket 0) and ACKs
//!   always refer to its head.
//! - `sockets`: commands the camera has ACKed, keyed by socket. Completion
//!   and socket-bound errors refer to these.
//!
//! At most one inquiry is on the wire at a time; others wait in
//! `queued_inquiries` unsent. Each transmitted operation gets a sequence
//! number so a general error can be pinned on whichever of the awaiting-ack
//! head and the outstanding inquiry went out first.
//!
//! The dispatcher never touches the transport. Bytes it wants written are
//! collected in an outbox that the session drains after every call, so the
//! whole state machine runs synchronously in tests.

use std::collections::VecDeque;
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

use super::error::{Desync, ViscaError};
use super::frame::{ErrorReply, Frame, HexBytes};
use super::message::Inquiry;
use super::params::Answer;
use super::sockets::SocketRegistry;
use super::DEFAULT_BUFFER_FULL_RETRIES;

/// Where an operation's result is delivered
pub type Reply<T> = oneshot::Sender<Result<T, ViscaError>>;

/// Bound on transparent retransmission after a buffer-full error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Resends allowed per operation; 0 disables retry
    pub max_buffer_full_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_buffer_full_retries: DEFAULT_BUFFER_FULL_RETRIES,
        }
    }
}

struct PendingCommand {
    seq: u64,
    description: String,
    bytes: Vec<u8>,
    retries: u32,
    reply: Reply<()>,
}

struct PendingInquiry {
    seq: u64,
    inquiry: Inquiry,
    bytes: Vec<u8>,
    retries: u32,
    reply: Reply<Answer>,
}

/// Which outstanding operation a general error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    AckHead,
    Inquiry,
}

/// The correlation state machine for one connection
pub struct Dispatcher {
    awaiting_ack: VecDeque<PendingCommand>,
    sockets: SocketRegistry<PendingCommand>,
    inquiry: Option<PendingInquiry>,
    queued_inquiries: VecDeque<PendingInquiry>,
    next_seq: u64,
    policy: RetryPolicy,
    outbox: Vec<Vec<u8>>,
}

impl Dispatcher {
    /// Idle dispatcher applying `policy` to buffer-full errors
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            awaiting_ack: VecDeque::new(),
            sockets: SocketRegistry::new(),
            inquiry: None,
            queued_inquiries: VecDeque::new(),
            next_seq: 0,
            policy,
            outbox: Vec::new(),
        }
    }

    /// Bytes to write, in order, since the last call
    pub fn take_outbound(&mut self) -> Vec<Vec<u8>> {
        std::mem::take(&mut self.outbox)
    }

    /// Commands sent but not yet ACKed
    pub fn awaiting_ack(&self) -> usize {
        self.awaiting_ack.len()
    }

    /// Commands ACKed and still executing
    pub fn executing(&self) -> usize {
        self.sockets.occupied()
    }

    /// An inquiry has been sent and awaits its answer
    pub fn inquiry_outstanding(&self) -> bool {
        self.inquiry.is_some()
    }

    /// Inquiries held back until the outstanding one is answered
    pub fn queued_inquiries(&self) -> usize {
        self.queued_inquiries.len()
    }

    /// True when nothing is outstanding or queued
    pub fn is_idle(&self) -> bool {
        self.awaiting_ack.is_empty()
            && self.sockets.occupied() == 0
            && self.inquiry.is_none()
            && self.queued_inquiries.is_empty()
    }

    fn seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    /// Operations on the wire still waiting for their initial response
    fn in_flight(&self) -> usize {
        self.awaiting_ack.len() + usize::from(self.inquiry.is_some())
    }

    /// Send a command immediately; it is pipelined behind anything in flight
    pub fn submit_command(&mut self, description: String, bytes: Vec<u8>, reply: Reply<()>) {
        let seq = self.seq();
        debug!(seq, %description, bytes = %HexBytes::from(&bytes[..]), "sending command");
        self.outbox.push(bytes.clone());
        self.awaiting_ack.push_back(PendingCommand {
            seq,
            description,
            bytes,
            retries: 0,
            reply,
        });
    }

    /// Send an inquiry, or queue it unsent behind the outstanding one
    pub fn submit_inquiry(&mut self, inquiry: Inquiry, bytes: Vec<u8>, reply: Reply<Answer>) {
        let pending = PendingInquiry {
            seq: 0,
            inquiry,
            bytes,
            retries: 0,
            reply,
        };
        if self.inquiry.is_some() {
            debug!(
                description = pending.inquiry.description(),
                queued = self.queued_inquiries.len() + 1,
                "inquiry queued behind outstanding inquiry"
            );
            self.queued_inquiries.push_back(pending);
        } else {
            self.start_inquiry(pending);
        }
    }

    fn start_inquiry(&mut self, mut pending: PendingInquiry) {
        pending.seq = self.seq();
        debug!(
            seq = pending.seq,
            description = pending.inquiry.description(),
            bytes = %HexBytes::from(&pending.bytes[..]),
            "sending inquiry"
        );
        self.outbox.push(pending.bytes.clone());
        self.inquiry = Some(pending);
    }

    /// Send the next queued inquiry once the outstanding one is settled
    fn advance_inquiries(&mut self) {
        if self.inquiry.is_none() {
            if let Some(next) = self.queued_inquiries.pop_front() {
                self.start_inquiry(next);
            }
        }
    }

    /// Apply one received frame. An `Err` means the connection must close.
    pub fn handle_frame(&mut self, frame: Frame) -> Result<(), Desync> {
        let result = match frame {
            Frame::Ack { socket } => self.on_ack(socket),
            Frame::Completion { socket } => self.on_completion(socket),
            Frame::Answer { bytes, .. } => self.on_answer(bytes),
            Frame::Error(ErrorReply::BufferFull) => self.on_buffer_full(),
            Frame::Error(ErrorReply::SyntaxError) => self.on_syntax_error(),
            Frame::Error(ErrorReply::NotExecutable { socket }) => self.on_not_executable(socket),
            Frame::NetworkChange => {
                debug!("ignoring network change notification");
                Ok(())
            }
            Frame::Malformed(m) => Err(Desync::from(m)),
        };
        if let Err(ref desync) = result {
            error!(%desync, "protocol desynchronized");
        }
        result
    }

    fn on_ack(&mut self, socket: u8) -> Result<(), Desync> {
        let command = self
            .awaiting_ack
            .pop_front()
            .ok_or(Desync::AckWithoutPendingCommand { socket })?;
        debug!(socket, description = %command.description, "command accepted");
        self.sockets.assign(socket, command).map_err(|(_, command)| {
            // Keep it queued so closing the connection fails it
            self.awaiting_ack.push_front(command);
            Desync::SocketAlreadyOccupied { socket }
        })
    }

    fn on_completion(&mut self, socket: u8) -> Result<(), Desync> {
        let command = self
            .sockets
            .release(socket)
            .map_err(|_| Desync::CompletionInEmptySocket { socket })?;
        debug!(socket, description = %command.description, "command completed");
        let _ = command.reply.send(Ok(()));
        Ok(())
    }

    fn on_answer(&mut self, bytes: Vec<u8>) -> Result<(), Desync> {
        let pending = self
            .inquiry
            .take()
            .ok_or_else(|| Desync::InquiryResponseWithoutPendingInquiry(HexBytes(bytes.clone())))?;
        let result = pending.inquiry.decode_answer(&bytes);
        match &result {
            Ok(answer) => debug!(
                description = pending.inquiry.description(),
                fields = answer.len(),
                "inquiry answered"
            ),
            Err(e) => warn!(%e, "inquiry answer rejected"),
        }
        let _ = pending.reply.send(result);
        self.advance_inquiries();
        Ok(())
    }

    fn on_not_executable(&mut self, socket: u8) -> Result<(), Desync> {
        let command = self
            .sockets
            .release(socket)
            .map_err(|_| Desync::ErrorInEmptySocket { socket })?;
        warn!(socket, description = %command.description, "command not executable");
        let _ = command
            .reply
            .send(Err(ViscaError::NotExecutable(command.description)));
        Ok(())
    }

    /// The earliest-sent operation still awaiting its initial response
    fn general_error_target(&self) -> Option<Target> {
        match (self.awaiting_ack.front(), &self.inquiry) {
            (Some(command), Some(inquiry)) => {
                if command.seq < inquiry.seq {
                    Some(Target::AckHead)
                } else {
                    Some(Target::Inquiry)
                }
            }
            (Some(_), None) => Some(Target::AckHead),
            (None, Some(_)) => Some(Target::Inquiry),
            (None, None) => None,
        }
    }

    fn on_syntax_error(&mut self) -> Result<(), Desync> {
        match self.general_error_target() {
            Some(Target::AckHead) => {
                if let Some(command) = self.awaiting_ack.pop_front() {
                    warn!(description = %command.description, "camera reported syntax error");
                    let _ = command
                        .reply
                        .send(Err(ViscaError::SyntaxError(command.description)));
                }
                Ok(())
            }
            Some(Target::Inquiry) => {
                if let Some(pending) = self.inquiry.take() {
                    let description = pending.inquiry.description().to_string();
                    warn!(%description, "camera reported syntax error");
                    let _ = pending.reply.send(Err(ViscaError::SyntaxError(description)));
                }
                self.advance_inquiries();
                Ok(())
            }
            None => Err(Desync::GeneralErrorWithNothingPending(HexBytes(vec![
                0x90, 0x60, 0x02, 0xFF,
            ]))),
        }
    }

    fn on_buffer_full(&mut self) -> Result<(), Desync> {
        let target = self.general_error_target().ok_or_else(|| {
            Desync::GeneralErrorWithNothingPending(HexBytes(vec![0x90, 0x60, 0x03, 0xFF]))
        })?;

        // Resending is only safe when nothing else went out behind it
        let sole = self.in_flight() == 1;
        let max = self.policy.max_buffer_full_retries;

        match target {
            Target::AckHead => {
                let Some(mut command) = self.awaiting_ack.pop_front() else {
                    return Ok(());
                };
                if sole && command.retries < max {
                    command.retries += 1;
                    command.seq = self.seq();
                    warn!(
                        description = %command.description,
                        attempt = command.retries,
                        "command buffer full, resending"
                    );
                    self.outbox.push(command.bytes.clone());
                    self.awaiting_ack.push_front(command);
                } else {
                    warn!(description = %command.description, sole, "command buffer full, giving up");
                    let _ = command
                        .reply
                        .send(Err(ViscaError::BufferFull(command.description)));
                }
            }
            Target::Inquiry => {
                let Some(mut pending) = self.inquiry.take() else {
                    return Ok(());
                };
                if sole && pending.retries < max {
                    pending.retries += 1;
                    pending.seq = self.seq();
                    warn!(
                        description = pending.inquiry.description(),
                        attempt = pending.retries,
                        "command buffer full, resending inquiry"
                    );
                    self.outbox.push(pending.bytes.clone());
                    self.inquiry = Some(pending);
                } else {
                    let description = pending.inquiry.description().to_string();
                    warn!(%description, sole, "command buffer full, giving up");
                    let _ = pending.reply.send(Err(ViscaError::BufferFull(description)));
                    self.advance_inquiries();
                }
            }
        }
        Ok(())
    }

    /// Fail everything outstanding or queued. Used when the connection closes.
    pub fn fail_all(&mut self, reason: &str) {
        let mut failed = 0usize;
        for command in self.awaiting_ack.drain(..) {
            let _ = command.reply.send(Err(ViscaError::Closed(reason.to_string())));
            failed += 1;
        }
        for (_, command) in self.sockets.drain() {
            let _ = command.reply.send(Err(ViscaError::Closed(reason.to_string())));
            failed += 1;
        }
        for pending in self.inquiry.take().into_iter().chain(self.queued_inquiries.drain(..)) {
            let _ = pending.reply.send(Err(ViscaError::Closed(reason.to_string())));
            failed += 1;
        }
        self.outbox.clear();
        if failed > 0 {
            debug!(failed, %reason, "failed outstanding operations");
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
