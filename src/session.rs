//! Session table.
//!
//! A fixed-capacity registry keyed by (owner, direction). Opening a session
//! binds a fresh [`Socket`] to the physical stream buffer for that direction:
//! write sessions feed the link's TX buffer, read sessions drain its RX buffer.
//! The table never grows; a full table reports [`VcpError::SlotExhausted`].

use crate::error::{VcpError, VcpResult};
use crate::osal::StreamBuffer;
use crate::socket::{Doorbell, Socket, SocketOptions};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Number of sessions the engine can hold at once.
pub const SESSION_CAPACITY: usize = 6;

/// Direction of data flow for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Bytes arriving from the hardware.
    Read,
    /// Bytes headed for the hardware.
    Write,
}

impl Direction {
    /// Index of the physical stream buffer this direction binds to
    /// (0 = toward hardware, 1 = from hardware).
    pub const fn buffer_index(self) -> usize {
        match self {
            Direction::Write => 0,
            Direction::Read => 1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Opaque identity of a session's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(usize);

impl OwnerId {
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Identity derived from the address of `owner`.
    pub fn of<T: ?Sized>(owner: &T) -> Self {
        Self(owner as *const T as *const () as usize)
    }

    pub const fn raw(self) -> usize {
        self.0
    }
}

/// Stable handle to a table slot.
///
/// The generation changes every time the slot is reused, so a stale handle
/// never aliases a newer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    pub slot: usize,
    pub generation: u32,
}

#[derive(Debug)]
struct Entry {
    owner: OwnerId,
    direction: Direction,
    socket: Arc<Socket>,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Summary of one live session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub handle: SessionHandle,
    pub owner: OwnerId,
    pub direction: Direction,
}

/// Fixed-capacity (owner, direction) → socket registry.
#[derive(Debug)]
pub struct SessionTable {
    slots: Mutex<Vec<Slot>>,
    buffers: [Arc<StreamBuffer>; 2],
    options: SocketOptions,
    doorbell: Option<Doorbell>,
}

impl SessionTable {
    /// Create a table binding write sessions to `tx` and read sessions to `rx`.
    ///
    /// `doorbell`, when given, is rung after every chunk a write socket
    /// pushes into `tx`.
    pub fn new(
        capacity: usize,
        tx: Arc<StreamBuffer>,
        rx: Arc<StreamBuffer>,
        options: SocketOptions,
        doorbell: Option<Doorbell>,
    ) -> Self {
        let slots = (0..capacity).map(|_| Slot::default()).collect();
        Self {
            slots: Mutex::new(slots),
            buffers: [tx, rx],
            options,
            doorbell,
        }
    }

    /// Open a session and return its socket.
    ///
    /// # Errors
    ///
    /// - `VcpError::AlreadyOpen` if the key is already live
    /// - `VcpError::SlotExhausted` if no slot is free
    pub fn open(&self, owner: OwnerId, direction: Direction) -> VcpResult<Arc<Socket>> {
        let mut slots = self.slots.lock();

        let duplicate = slots.iter().filter_map(|s| s.entry.as_ref()).any(|e| {
            e.owner == owner && e.direction == direction
        });
        if duplicate {
            return Err(VcpError::AlreadyOpen(direction));
        }

        let capacity = slots.len();
        let (index, slot) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.entry.is_none())
            .ok_or(VcpError::SlotExhausted { capacity })?;

        slot.generation = slot.generation.wrapping_add(1);
        let handle = SessionHandle {
            slot: index,
            generation: slot.generation,
        };
        let doorbell = match direction {
            Direction::Write => self.doorbell.clone(),
            Direction::Read => None,
        };
        let socket = Arc::new(Socket::bound(
            direction,
            owner,
            self.buffers[direction.buffer_index()].clone(),
            self.options,
            doorbell,
            Some(handle),
        ));
        slot.entry = Some(Entry {
            owner,
            direction,
            socket: socket.clone(),
        });
        tracing::debug!(slot = index, owner = owner.raw(), %direction, "session opened");
        Ok(socket)
    }

    /// Release the session for (owner, direction).
    ///
    /// The socket handed out by `open` is unbound; further calls on it fail
    /// with `VcpError::SessionClosed`. Closing a key that is not open returns
    /// `VcpError::InvalidArgs` and changes nothing.
    pub fn close(&self, owner: OwnerId, direction: Direction) -> VcpResult<()> {
        let mut slots = self.slots.lock();
        let (index, slot) = slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| {
                s.entry
                    .as_ref()
                    .is_some_and(|e| e.owner == owner && e.direction == direction)
            })
            .ok_or(VcpError::InvalidArgs("no open session for this owner and direction"))?;

        if let Some(entry) = slot.entry.take() {
            entry.socket.unbind();
        }
        tracing::debug!(slot = index, owner = owner.raw(), %direction, "session closed");
        Ok(())
    }

    /// Force-release every live session. Returns how many were released.
    pub fn close_all(&self) -> usize {
        let mut slots = self.slots.lock();
        let mut released = 0;
        for slot in slots.iter_mut() {
            if let Some(entry) = slot.entry.take() {
                entry.socket.unbind();
                released += 1;
            }
        }
        released
    }

    /// Socket for a live session, if the handle is still current.
    pub fn get(&self, handle: SessionHandle) -> Option<Arc<Socket>> {
        let slots = self.slots.lock();
        let slot = slots.get(handle.slot)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.entry.as_ref().map(|e| e.socket.clone())
    }

    pub fn is_open(&self, owner: OwnerId, direction: Direction) -> bool {
        self.slots
            .lock()
            .iter()
            .filter_map(|s| s.entry.as_ref())
            .any(|e| e.owner == owner && e.direction == direction)
    }

    /// Live sessions, in slot order.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.slots
            .lock()
            .iter()
            .enumerate()
            .filter_map(|(index, s)| {
                s.entry.as_ref().map(|e| SessionInfo {
                    handle: SessionHandle {
                        slot: index,
                        generation: s.generation,
                    },
                    owner: e.owner,
                    direction: e.direction,
                })
            })
            .collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.slots.lock().iter().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.lock().len()
    }
}
