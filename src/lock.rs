//! Write locking of table buffers.
//!
//! Each buffer carries a [`LockFlag`]. A locked table rejects writes until the
//! caller enters an unlocked scope with [`Table::unlocked`] or
//! [`Table::force_unlocked`]. The returned [`Unlocked`] guard records the
//! previous state of every part it touches and restores it when dropped, so
//! nested scopes never re-lock a part that an outer scope still needs.
//!
//! Buffers that are views of another buffer refuse to unlock unless forced.
//! Writes through a force-unlocked view reach the shared storage. Buffers a
//! table shares with the table it was derived from are copied on unlock.
//!
//! The flags are atomics but the scope mechanism does not arbitrate between
//! concurrent writers; callers serialise writes to a shared buffer themselves.

use crate::error::{LockError, Result};
use crate::table::Table;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};

/// Lockable parts of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Part {
    X,
    Y,
    Metas,
    W,
}

impl Part {
    pub const ALL: [Part; 4] = [Part::X, Part::Y, Part::Metas, Part::W];
}

impl fmt::Display for Part {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Part::X => "X",
            Part::Y => "Y",
            Part::Metas => "metas",
            Part::W => "W",
        };
        write!(f, "{}", name)
    }
}

/// Writability flag of one buffer handle.
#[derive(Debug)]
pub struct LockFlag {
    writable: AtomicBool,
}

impl LockFlag {
    pub fn new(writable: bool) -> Self {
        LockFlag {
            writable: AtomicBool::new(writable),
        }
    }

    pub fn is_writable(&self) -> bool {
        self.writable.load(Ordering::Acquire)
    }

    pub fn set_writable(&self, writable: bool) {
        self.writable.store(writable, Ordering::Release);
    }
}

/// An unlocked scope over a table. Derefs to the table; restores the
/// recorded lock state of each part on drop.
pub struct Unlocked<'a> {
    table: &'a mut Table,
    restore: Vec<(Part, bool)>,
}

impl<'a> Unlocked<'a> {
    pub(crate) fn acquire(table: &'a mut Table, parts: &[Part], force: bool) -> Result<Self> {
        let parts = if parts.is_empty() { &Part::ALL[..] } else { parts };
        let mut restore: Vec<(Part, bool)> = Vec::with_capacity(parts.len());

        for &part in parts {
            let was_writable = table.part_writable(part);
            if !was_writable {
                if table.part_is_view(part) && !force {
                    for (done, previous) in restore.into_iter().rev() {
                        table.set_part_writable(done, previous);
                    }
                    return Err(LockError::ViewNotUnlockable(part).into());
                }
                if table.part_is_shared(part) {
                    table.detach_part(part);
                }
                table.set_part_writable(part, true);
            }
            restore.push((part, was_writable));
        }

        log::trace!("unlocked {:?} of table '{}' (forced: {})", parts, table.name(), force);
        Ok(Unlocked { table, restore })
    }
}

impl Deref for Unlocked<'_> {
    type Target = Table;

    fn deref(&self) -> &Table {
        self.table
    }
}

impl DerefMut for Unlocked<'_> {
    fn deref_mut(&mut self) -> &mut Table {
        self.table
    }
}

impl Drop for Unlocked<'_> {
    fn drop(&mut self) {
        for (part, previous) in self.restore.drain(..).rev() {
            self.table.set_part_writable(part, previous);
        }
        log::trace!("restored lock state of table '{}'", self.table.name());
    }
}
