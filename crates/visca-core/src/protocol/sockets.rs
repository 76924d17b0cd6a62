//! Socket registry
//!
//! The camera runs accepted commands in a small fixed bank of sockets and
//! names the socket in its ACK. This is bookkeeping only: which operation
//! occupies which socket. Retry and failure policy live in the dispatcher.

use thiserror::Error;

/// Socket ids are the low nibble of a reply's second byte
pub const SOCKET_COUNT: usize = 16;

/// Misuse of a socket slot
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketError {
    /// Assigned while another operation holds it
    #[error("socket {0} is already occupied")]
    Occupied(u8),

    /// Released while nothing holds it
    #[error("socket {0} is empty")]
    Empty(u8),

    /// Id past the end of the bank
    #[error("socket {0} is out of range")]
    OutOfRange(u8),
}

/// Operations currently executing, indexed by socket
#[derive(Debug)]
pub struct SocketRegistry<T> {
    slots: [Option<T>; SOCKET_COUNT],
}

impl<T> SocketRegistry<T> {
    /// All sockets empty
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Bind an operation to a socket. On failure the operation is handed back.
    pub fn assign(&mut self, socket: u8, operation: T) -> Result<(), (SocketError, T)> {
        match self.slots.get_mut(usize::from(socket)) {
            None => Err((SocketError::OutOfRange(socket), operation)),
            Some(Some(_)) => Err((SocketError::Occupied(socket), operation)),
            Some(slot) => {
                *slot = Some(operation);
                Ok(())
            }
        }
    }

    /// Free a socket, returning the operation that occupied it
    pub fn release(&mut self, socket: u8) -> Result<T, SocketError> {
        self.slots
            .get_mut(usize::from(socket))
            .ok_or(SocketError::OutOfRange(socket))?
            .take()
            .ok_or(SocketError::Empty(socket))
    }

    /// Operation occupying `socket`, if any
    pub fn get(&self, socket: u8) -> Option<&T> {
        self.slots.get(usize::from(socket)).and_then(Option::as_ref)
    }

    /// True when `socket` holds an operation
    pub fn is_occupied(&self, socket: u8) -> bool {
        self.get(socket).is_some()
    }

    /// Number of occupied sockets
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Empty every socket, yielding `(socket, operation)` pairs
    pub fn drain(&mut self) -> Vec<(u8, T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.take().map(|op| (i as u8, op)))
            .collect()
    }
}

impl<T> Default for SocketRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_then_release() {
        let mut sockets = SocketRegistry::new();
        sockets.assign(1, "zoom").unwrap();
        assert!(sockets.is_occupied(1));
        assert_eq!(sockets.get(1), Some(&"zoom"));
        assert_eq!(sockets.occupied(), 1);

        assert_eq!(sockets.release(1), Ok("zoom"));
        assert!(!sockets.is_occupied(1));
        assert_eq!(sockets.occupied(), 0);
    }

    #[test]
    fn test_assign_occupied_hands_operation_back() {
        let mut sockets = SocketRegistry::new();
        sockets.assign(2, "first").unwrap();
        let (err, op) = sockets.assign(2, "second").unwrap_err();
        assert_eq!(err, SocketError::Occupied(2));
        assert_eq!(op, "second");
        assert_eq!(sockets.get(2), Some(&"first"));
    }

    #[test]
    fn test_release_empty() {
        let mut sockets: SocketRegistry<()> = SocketRegistry::new();
        assert_eq!(sockets.release(3), Err(SocketError::Empty(3)));
    }

    #[test]
    fn test_out_of_range() {
        let mut sockets = SocketRegistry::new();
        assert_eq!(
            sockets.assign(16, ()).unwrap_err().0,
            SocketError::OutOfRange(16)
        );
        assert_eq!(sockets.release(16), Err(SocketError::OutOfRange(16)));
    }

    #[test]
    fn test_every_socket_usable() {
        let mut sockets = SocketRegistry::new();
        for y in 0u8..16 {
            sockets.assign(y, y).unwrap();
        }
        assert_eq!(sockets.occupied(), SOCKET_COUNT);

        let drained = sockets.drain();
        assert_eq!(drained.len(), SOCKET_COUNT);
        assert_eq!(drained[5], (5, 5));
        assert_eq!(sockets.occupied(), 0);
    }
}
