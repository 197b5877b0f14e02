//! Generation-checked arena of live socket entries.
//!
//! Applications never see socket entries, only [`SocketHandle`]s. A handle
//! pairs the arena slot with the generation the slot carried when the entry
//! was inserted; removing an entry bumps the slot's generation, so a handle
//! held past close resolves to nothing instead of whatever socket reuses
//! the slot. The handle also round-trips losslessly through the 64-bit
//! token the multiplexer attaches to events.

use slab::Slab;

use crate::backend::Token;
use crate::socket::SocketEntry;

/// Opaque identifier for a socket owned by a [`Proactor`](crate::Proactor).
///
/// Handles are plain copyable values; holding one does not keep the socket
/// alive. After the socket closes, every operation on the handle reports a
/// stale-handle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketHandle {
    index: u32,
    generation: u32,
}

impl SocketHandle {
    pub(crate) fn to_token(self) -> Token {
        Token((u64::from(self.generation) << 32) | u64::from(self.index))
    }

    pub(crate) fn from_token(token: Token) -> Self {
        Self {
            index: (token.0 & u64::from(u32::MAX)) as u32,
            generation: (token.0 >> 32) as u32,
        }
    }
}

/// Arena of socket entries addressed by generation-checked handles.
#[derive(Default)]
pub(crate) struct Registry {
    slots: Slab<SocketEntry>,
    generations: Vec<u32>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sockets.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Inserts an entry and returns its handle.
    pub fn insert(&mut self, entry: SocketEntry) -> SocketHandle {
        let index = self.slots.insert(entry);
        if index >= self.generations.len() {
            self.generations.resize(index + 1, 0);
        }
        SocketHandle {
            index: index as u32,
            generation: self.generations[index],
        }
    }

    /// Resolves a handle, failing the generation check for stale handles.
    pub fn get(&self, handle: SocketHandle) -> Option<&SocketEntry> {
        let index = handle.index as usize;
        if self.generations.get(index) != Some(&handle.generation) {
            return None;
        }
        self.slots.get(index)
    }

    /// Mutable variant of [`get`](Self::get).
    pub fn get_mut(&mut self, handle: SocketHandle) -> Option<&mut SocketEntry> {
        let index = handle.index as usize;
        if self.generations.get(index) != Some(&handle.generation) {
            return None;
        }
        self.slots.get_mut(index)
    }

    /// Removes an entry, bumping the slot generation so the handle and any
    /// in-flight events referencing it go stale.
    pub fn remove(&mut self, handle: SocketHandle) -> Option<SocketEntry> {
        let index = handle.index as usize;
        if self.generations.get(index) != Some(&handle.generation) {
            return None;
        }
        let entry = self.slots.try_remove(index)?;
        self.generations[index] = self.generations[index].wrapping_add(1);
        Some(entry)
    }

    /// Snapshot of every live handle, in slot order.
    pub fn handles(&self) -> Vec<SocketHandle> {
        self.slots
            .iter()
            .map(|(index, _)| SocketHandle {
                index: index as u32,
                generation: self.generations[index],
            })
            .collect()
    }
}
