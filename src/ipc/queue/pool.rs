/*!
 * Message Pool
 *
 * Storage and accounting for the buffers of one queue. Two layouts:
 * - Arena: byte budget of pool_size plus ~5% bookkeeping, each message
 *   charged its size plus a fixed header; unbounded message count.
 * - Slotted: `limit` equal slots of pool_size / limit bytes each, allocated
 *   up front and recycled, so steady-state alloc and free reuse one buffer.
 *
 * Buffers are reference counted: alloc yields one reference, every delivery
 * adds one, every free consumes one. Counters and pool accounting are only
 * mutated with the nucleus lock held. Releasing a slotted buffer takes its
 * storage back, so readers copy out before dropping their reference.
 */

use super::types::QueueLimit;
use crate::core::errors::{CoreError, CoreResult};
use crate::core::limits::{ARENA_OVERHEAD_DIVISOR, MSG_HEADER_SIZE};
use crate::core::types::Size;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

pub type PoolId = u64;

/// Pool layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PoolLayout {
    Arena { capacity: Size },
    Slotted { slot_size: Size, slots: usize },
}

/// Shared state of one buffer
pub(crate) struct MessageCell {
    pool: PoolId,
    slot: Option<usize>,
    /// Bytes charged against the pool
    charge: Size,
    size: AtomicUsize,
    refs: AtomicUsize,
    released: AtomicBool,
    data: RwLock<Box<[u8]>>,
}

impl MessageCell {
    #[inline]
    pub(crate) fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    pub(crate) fn set_size(&self, size: usize) {
        self.size.store(size, Ordering::Release);
    }

    #[inline]
    pub(crate) fn refcount(&self) -> usize {
        self.refs.load(Ordering::Acquire)
    }

    pub(crate) fn retain(&self) {
        self.refs.fetch_add(1, Ordering::AcqRel);
    }

    /// Drop one reference; true when none remain
    pub(crate) fn unref(&self) -> bool {
        self.refs.fetch_sub(1, Ordering::AcqRel) == 1
    }

    pub(crate) fn capacity(&self) -> usize {
        self.data.read().len()
    }

    /// Copy up to `dest.len()` bytes of the message; returns bytes copied
    pub(crate) fn copy_to(&self, dest: &mut [u8]) -> usize {
        let data = self.data.read();
        let len = self.size().min(dest.len()).min(data.len());
        dest[..len].copy_from_slice(&data[..len]);
        len
    }
}

/// Handle on a pool buffer
///
/// One handle stands for one reference. Handles are not cloneable: each
/// receiver of a broadcast gets its own and must free it.
pub struct MessageBuf {
    cell: Arc<MessageCell>,
}

impl MessageBuf {
    pub(crate) fn from_cell(cell: Arc<MessageCell>) -> Self {
        Self { cell }
    }

    pub(crate) fn cell(&self) -> &Arc<MessageCell> {
        &self.cell
    }

    /// Message size; for a fresh buffer, the requested allocation size
    pub fn len(&self) -> usize {
        self.cell.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Usable payload bytes
    pub fn capacity(&self) -> usize {
        self.cell.capacity()
    }

    /// Outstanding references
    pub fn refcount(&self) -> usize {
        self.cell.refcount()
    }

    /// Copy `data` into the start of the buffer; returns bytes written
    pub fn fill(&self, data: &[u8]) -> usize {
        let mut payload = self.cell.data.write();
        let len = data.len().min(payload.len());
        payload[..len].copy_from_slice(&data[..len]);
        len
    }

    /// Full payload, for in-place writes before sending
    pub fn payload_mut(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.cell.data.write()
    }

    /// Full payload
    pub fn payload(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.cell.data.read()
    }

    /// The message bytes (`len()` of them)
    pub fn to_vec(&self) -> Vec<u8> {
        let data = self.cell.data.read();
        data[..self.len().min(data.len())].to_vec()
    }
}

impl fmt::Debug for MessageBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBuf")
            .field("pool", &self.cell.pool)
            .field("size", &self.len())
            .field("refs", &self.refcount())
            .finish()
    }
}

/// Space granted by `MessagePool::reserve`
struct Reservation {
    slot: Option<usize>,
    charge: Size,
    /// Recycled slot storage; arena reservations bring their own
    storage: Option<Box<[u8]>>,
}

pub(crate) struct MessagePool {
    id: PoolId,
    layout: PoolLayout,
    used: Size,
    /// Idle slots with their storage; popped from the back
    free_slots: Vec<(usize, Box<[u8]>)>,
}

impl MessagePool {
    pub(crate) fn new(pool_size: Size, limit: QueueLimit) -> CoreResult<Self> {
        if pool_size == 0 {
            return Err(CoreError::invalid("Message pool size must be non-zero"));
        }

        let (layout, free_slots) = match limit {
            QueueLimit::Unlimited => {
                let capacity = pool_size
                    .checked_add(pool_size / ARENA_OVERHEAD_DIVISOR)
                    .ok_or_else(|| {
                        CoreError::invalid(format!("Pool size {} leaves no room for bookkeeping", pool_size))
                    })?;
                (PoolLayout::Arena { capacity }, Vec::new())
            }
            QueueLimit::Messages(slots) => {
                let slot_size = pool_size.checked_div(slots).unwrap_or(0);
                if slot_size == 0 {
                    return Err(CoreError::invalid(format!(
                        "Pool of {} bytes cannot hold {} slots",
                        pool_size, slots
                    )));
                }
                // Slot 0 ends up last, so it is handed out first
                let mut free_slots = Vec::new();
                free_slots
                    .try_reserve_exact(slots)
                    .map_err(|_| CoreError::no_memory(format!("Cannot track {} pool slots", slots)))?;
                for slot in (0..slots).rev() {
                    free_slots.push((slot, slot_storage(slot_size)?));
                }
                (PoolLayout::Slotted { slot_size, slots }, free_slots)
            }
        };

        let pool = Self {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            layout,
            used: 0,
            free_slots,
        };
        debug!(pool = pool.id, layout = ?layout, "Message pool created");
        Ok(pool)
    }

    pub(crate) fn layout(&self) -> PoolLayout {
        self.layout
    }

    /// Total bytes the pool can account
    pub(crate) fn size(&self) -> Size {
        match self.layout {
            PoolLayout::Arena { capacity } => capacity,
            // Never above pool_size
            PoolLayout::Slotted { slot_size, slots } => slot_size * slots,
        }
    }

    pub(crate) fn used(&self) -> Size {
        self.used
    }

    pub(crate) fn owns(&self, cell: &MessageCell) -> bool {
        cell.pool == self.id
    }

    /// Claim room for a `size` byte message; nothing is allocated on failure
    fn reserve(&mut self, size: Size) -> CoreResult<Reservation> {
        let reservation = match self.layout {
            PoolLayout::Arena { capacity } => {
                let charge = size.checked_add(MSG_HEADER_SIZE);
                let fits = charge
                    .and_then(|charge| self.used.checked_add(charge))
                    .is_some_and(|total| total <= capacity);
                match charge {
                    Some(charge) if fits => Reservation {
                        slot: None,
                        charge,
                        storage: None,
                    },
                    _ => {
                        return Err(CoreError::no_memory(format!(
                            "{} bytes requested, {} of {} in use",
                            size, self.used, capacity
                        )))
                    }
                }
            }
            PoolLayout::Slotted { slot_size, .. } => {
                if size > slot_size {
                    return Err(CoreError::no_memory(format!(
                        "{} bytes exceed the {} byte slot",
                        size, slot_size
                    )));
                }
                let (slot, storage) = self
                    .free_slots
                    .pop()
                    .ok_or_else(|| CoreError::no_memory("All pool slots in use"))?;
                Reservation {
                    slot: Some(slot),
                    charge: slot_size,
                    storage: Some(storage),
                }
            }
        };
        self.used += reservation.charge;
        trace!(pool = self.id, size, charge = reservation.charge, used = self.used, "Buffer reserved");
        Ok(reservation)
    }

    fn cell(&self, reservation: Reservation, size: Size, refs: usize, data: Box<[u8]>) -> Arc<MessageCell> {
        Arc::new(MessageCell {
            pool: self.id,
            slot: reservation.slot,
            charge: reservation.charge,
            size: AtomicUsize::new(size),
            refs: AtomicUsize::new(refs),
            released: AtomicBool::new(false),
            data: RwLock::new(data),
        })
    }

    /// Allocate a zeroed buffer owned by the caller
    pub(crate) fn alloc(&mut self, size: Size) -> CoreResult<MessageBuf> {
        let mut reservation = self.reserve(size)?;
        let data = match reservation.storage.take() {
            Some(mut storage) => {
                storage[..size].fill(0);
                storage
            }
            // Within the arena budget
            None => vec![0u8; size].into_boxed_slice(),
        };
        Ok(MessageBuf::from_cell(self.cell(reservation, size, 1, data)))
    }

    /// Wrap already-staged bytes; the result carries no reference yet
    pub(crate) fn adopt(&mut self, data: Vec<u8>) -> CoreResult<Arc<MessageCell>> {
        let size = data.len();
        let mut reservation = self.reserve(size)?;
        let data = match reservation.storage.take() {
            Some(mut storage) => {
                storage[..size].copy_from_slice(&data);
                storage
            }
            None => data.into_boxed_slice(),
        };
        Ok(self.cell(reservation, size, 0, data))
    }

    /// Return a buffer's space to the pool; idempotent
    pub(crate) fn release(&mut self, cell: &MessageCell) {
        if !self.owns(cell) || cell.released.swap(true, Ordering::AcqRel) {
            return;
        }
        self.used = self.used.saturating_sub(cell.charge);
        if let Some(slot) = cell.slot {
            let storage = match cell.data.try_write() {
                Some(mut data) => std::mem::take(&mut *data),
                None => Box::default(),
            };
            // A payload guard still held by a stale handle keeps the old storage
            let storage = if storage.len() == cell.charge {
                storage
            } else {
                vec![0u8; cell.charge].into_boxed_slice()
            };
            self.free_slots.push((slot, storage));
        }
        trace!(pool = self.id, charge = cell.charge, used = self.used, "Buffer released");
    }

    /// Drop one reference held through `buf`
    pub(crate) fn free(&mut self, buf: &MessageBuf) -> CoreResult<()> {
        let cell = buf.cell();
        if !self.owns(cell) {
            return Err(CoreError::invalid("Buffer does not belong to this queue's pool"));
        }
        if cell.refcount() == 0 {
            return Err(CoreError::invalid("Buffer already freed"));
        }
        if cell.unref() {
            self.release(cell);
        }
        Ok(())
    }
}

fn slot_storage(slot_size: Size) -> CoreResult<Box<[u8]>> {
    let mut storage = Vec::new();
    storage
        .try_reserve_exact(slot_size)
        .map_err(|_| CoreError::no_memory(format!("Cannot allocate a {} byte pool slot", slot_size)))?;
    storage.resize(slot_size, 0);
    Ok(storage.into_boxed_slice())
}
