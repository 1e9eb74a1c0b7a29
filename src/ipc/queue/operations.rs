/*!
 * Queue Operations
 * Buffer management, send/write, receive/read, flush and inquiry
 */

use super::pool::{MessageBuf, MessageCell};
use super::types::{Delivery, QueueInfo, ReadRequest, SendMode};
use super::{MessageQueue, QueueState};
use crate::core::clock::Deadline;
use crate::core::errors::{CoreError, CoreResult};
use crate::sync::wait_on;
use crate::thread::ThreadContext;
use std::sync::Arc;
use tracing::{debug, trace};

impl QueueState {
    /// Hand `cell` to the head waiter, or to all of them for broadcast
    ///
    /// Each receiver gets its own reference. Returns how many were woken.
    fn deliver(&mut self, cell: &Arc<MessageCell>, mode: SendMode) -> usize {
        let mut woken = 0;
        loop {
            cell.retain();
            if self.waiters.grant_one(Delivery::Message(Arc::clone(cell))).is_none() {
                // No taker for that reference
                cell.unref();
                break;
            }
            woken += 1;
            if mode != SendMode::Broadcast {
                break;
            }
        }
        woken
    }

    fn enqueue(&mut self, cell: Arc<MessageCell>, mode: SendMode) {
        match mode {
            SendMode::Urgent => self.pending.push_front(cell),
            _ => self.pending.push_back(cell),
        }
    }

    fn check_limit(&self) -> CoreResult<()> {
        if self.limit.is_reached(self.pending.len()) {
            return Err(CoreError::no_memory(format!(
                "queue '{}' holds {} pending messages (limit reached)",
                self.name,
                self.pending.len()
            )));
        }
        Ok(())
    }
}

impl MessageQueue {
    /// Allocate a buffer of `size` bytes from the queue's pool
    ///
    /// The caller holds the only reference until it sends or frees it.
    pub fn alloc(&self, size: usize) -> CoreResult<MessageBuf> {
        self.with_state(|queue| queue.pool.alloc(size))
    }

    /// Drop the reference held through `buf`
    ///
    /// The space returns to the pool once the last reference is gone.
    /// Freeing a buffer whose references are all gone, or one from
    /// another queue, fails with InvalidArgument.
    pub fn free(&self, buf: &MessageBuf) -> CoreResult<()> {
        self.with_state(|queue| queue.pool.free(buf))
    }

    /// Post an allocated buffer carrying `size` bytes
    ///
    /// The sender's reference is transferred: to the woken receivers, to the
    /// pending list, or (broadcast with nobody waiting) released. Returns
    /// the number of receivers woken.
    pub fn send(&self, buf: &MessageBuf, size: usize, mode: SendMode) -> CoreResult<usize> {
        self.with_state(|queue| {
            let cell = buf.cell();
            if queue.waiters.is_empty() && mode != SendMode::Broadcast {
                queue.check_limit()?;
            }
            if !queue.pool.owns(cell) || cell.refcount() == 0 {
                return Err(CoreError::invalid("Not a live buffer of this queue"));
            }
            if size > cell.capacity() {
                return Err(CoreError::invalid(format!(
                    "size {} exceeds the {} byte buffer",
                    size,
                    cell.capacity()
                )));
            }

            cell.set_size(size);
            cell.unref();
            let woken = queue.deliver(cell, mode);

            if woken == 0 {
                if mode == SendMode::Broadcast {
                    if cell.refcount() == 0 {
                        queue.pool.release(cell);
                    }
                } else {
                    queue.enqueue(Arc::clone(cell), mode);
                }
            }
            trace!(queue = %queue.name, size, ?mode, woken, "Message sent");
            Ok(woken)
        })
    }

    /// Copy `data` into a new message and post it
    ///
    /// A local reader already blocked in `read` gets the bytes copied
    /// straight into its destination, truncated to fit.
    pub fn write(&self, data: &[u8], mode: SendMode) -> CoreResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let mut staged = Some(data.to_vec());

        self.with_state(|queue| {
            let direct = queue
                .waiters
                .peek()
                .filter(|w| w.request().capacity > 0 && w.thread().pid() == self.pid)
                .map(|w| (w.id(), w.request().capacity));

            if let Some((waiter, capacity)) = direct {
                let mut bytes = staged.take().unwrap_or_default();
                bytes.truncate(capacity);
                let copied = bytes.len();
                queue.waiters.grant_to(waiter, Delivery::Copied(bytes));
                trace!(queue = %queue.name, copied, "Direct copy to local reader");
                return Ok(1);
            }

            let nwaiters = queue.waiters.count();
            if nwaiters == 0 && mode == SendMode::Broadcast {
                return Ok(0);
            }
            if nwaiters == 0 {
                queue.check_limit()?;
            }

            let cell = queue.pool.adopt(staged.take().unwrap_or_default())?;
            if nwaiters == 0 {
                queue.enqueue(cell, mode);
                return Ok(0);
            }
            Ok(queue.deliver(&cell, mode))
        })
    }

    /// Receive the next message by reference
    ///
    /// The returned buffer must be freed by the caller.
    pub fn receive(&self, thread: &ThreadContext, deadline: Deadline) -> CoreResult<MessageBuf> {
        check_context(thread, deadline)?;

        let mut guard = self.nucleus.lock();
        let queue = self.state_mut(&mut guard)?;
        if let Some(cell) = queue.pending.pop_front() {
            cell.retain();
            return Ok(MessageBuf::from_cell(cell));
        }
        if deadline.is_poll() {
            return Err(CoreError::WouldBlock);
        }

        let request = ReadRequest {
            capacity: 0,
            pid: thread.pid(),
        };
        match self.wait(&mut guard, thread, deadline, request)? {
            Delivery::Message(cell) => Ok(MessageBuf::from_cell(cell)),
            Delivery::Copied(_) => Err(CoreError::invalid("direct copy granted to a receive")),
        }
    }

    /// Receive the next message into `dest`, truncating; returns bytes copied
    pub fn read(&self, thread: &ThreadContext, dest: &mut [u8], deadline: Deadline) -> CoreResult<usize> {
        check_context(thread, deadline)?;
        if dest.is_empty() {
            return Ok(0);
        }

        let mut guard = self.nucleus.lock();
        let queue = self.state_mut(&mut guard)?;
        // Pending messages hold no reference; a delivered one holds ours
        let (cell, delivered) = match queue.pending.pop_front() {
            Some(cell) => (cell, false),
            None => {
                if deadline.is_poll() {
                    return Err(CoreError::WouldBlock);
                }
                let request = ReadRequest {
                    capacity: dest.len(),
                    pid: thread.pid(),
                };
                match self.wait(&mut guard, thread, deadline, request)? {
                    Delivery::Copied(bytes) => {
                        drop(guard);
                        let len = bytes.len().min(dest.len());
                        dest[..len].copy_from_slice(&bytes[..len]);
                        return Ok(len);
                    }
                    Delivery::Message(cell) => (cell, true),
                }
            }
        };
        drop(guard);

        // Copy before giving the buffer back: release recycles slot storage
        let len = cell.copy_to(dest);

        let mut guard = self.nucleus.lock();
        let last = !delivered || cell.unref();
        if last {
            // Gone with the queue if it was deleted meanwhile
            if let Some(queue) = guard.ipc.queues.get_mut(&self.id) {
                queue.pool.release(&cell);
            }
        }
        Ok(len)
    }

    fn wait(
        &self,
        guard: &mut parking_lot::MutexGuard<'_, crate::nucleus::NucleusState>,
        thread: &ThreadContext,
        deadline: Deadline,
        request: ReadRequest,
    ) -> CoreResult<Delivery> {
        let id = self.id;
        wait_on(guard, thread, deadline, request, |state| {
            state.ipc.queues.get_mut(&id).map(|q| &mut q.waiters)
        })
        .map_err(|e| {
            debug!(queue = id, thread = thread.id(), error = %e, "Receive ended without a message");
            e
        })
    }

    /// Release every pending message; returns how many were dropped
    pub fn flush(&self) -> CoreResult<usize> {
        self.with_state(|queue| {
            let flushed = queue.drain_pending();
            if flushed > 0 {
                debug!(queue = %queue.name, flushed, "Queue flushed");
            }
            Ok(flushed)
        })
    }

    pub fn inquire(&self) -> CoreResult<QueueInfo> {
        self.with_state(|queue| {
            Ok(QueueInfo {
                id: self.id,
                name: queue.name.clone(),
                waiters: queue.waiters.count(),
                pending: queue.pending.len(),
                order: queue.waiters.order(),
                limit: queue.limit,
                pool_size: queue.pool.size(),
                used_mem: queue.pool.used(),
            })
        })
    }
}

fn check_context(thread: &ThreadContext, deadline: Deadline) -> CoreResult<()> {
    if !deadline.is_poll() && !thread.can_block() {
        return Err(CoreError::InvalidContext(format!(
            "{} cannot wait for messages from an atomic section",
            thread.name()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::core::clock::Deadline;
    use crate::core::config::NucleusConfig;
    use crate::core::errors::CoreError;
    use crate::ipc::queue::{MessageQueue, QueueAttr, SendMode};
    use crate::nucleus::Nucleus;
    use crate::thread::ThreadAttr;

    fn setup(limit: usize) -> (Nucleus, crate::thread::ThreadContext, MessageQueue) {
        let nucleus = Nucleus::new(NucleusConfig::single_cpu()).unwrap();
        let thread = nucleus.spawn_thread(ThreadAttr::new(10)).unwrap();
        let queue = MessageQueue::create(&nucleus, &thread, QueueAttr::new(4096).with_limit(limit)).unwrap();
        (nucleus, thread, queue)
    }

    #[test]
    fn test_pending_receive_takes_reference() {
        let (_n, thread, queue) = setup(0);
        let buf = queue.alloc(5).unwrap();
        buf.fill(b"abcde");
        assert_eq!(queue.send(&buf, 5, SendMode::Normal).unwrap(), 0);
        assert_eq!(buf.refcount(), 0);
        assert!(queue.free(&buf).is_err());

        let got = queue.receive(&thread, Deadline::NonBlocking).unwrap();
        assert_eq!(got.to_vec(), b"abcde");
        assert_eq!(got.refcount(), 1);
        queue.free(&got).unwrap();
        assert_eq!(queue.inquire().unwrap().used_mem, 0);
    }

    #[test]
    fn test_oversized_send_rejected() {
        let (_n, _thread, queue) = setup(0);
        let buf = queue.alloc(4).unwrap();
        assert!(matches!(queue.send(&buf, 5, SendMode::Normal), Err(CoreError::InvalidArgument(_))));
        // Buffer untouched
        assert_eq!(buf.refcount(), 1);
        queue.free(&buf).unwrap();
    }

    #[test]
    fn test_broadcast_without_waiters_releases() {
        let (_n, _thread, queue) = setup(0);
        let buf = queue.alloc(16).unwrap();
        assert_eq!(queue.send(&buf, 16, SendMode::Broadcast).unwrap(), 0);
        let info = queue.inquire().unwrap();
        assert_eq!((info.pending, info.used_mem), (0, 0));

        assert_eq!(queue.write(b"dropped", SendMode::Broadcast).unwrap(), 0);
        assert_eq!(queue.inquire().unwrap().pending, 0);
    }

    #[test]
    fn test_read_copies_pending_and_truncates() {
        let (_n, thread, queue) = setup(0);
        queue.write(b"0123456789", SendMode::Normal).unwrap();
        let mut dest = [0u8; 4];
        assert_eq!(queue.read(&thread, &mut dest, Deadline::NonBlocking).unwrap(), 4);
        assert_eq!(&dest, b"0123");
        assert_eq!(queue.inquire().unwrap().used_mem, 0);
        assert_eq!(queue.read(&thread, &mut [], Deadline::NonBlocking).unwrap(), 0);
    }

    #[test]
    fn test_write_respects_limit() {
        let (_n, _thread, queue) = setup(2);
        queue.write(b"a", SendMode::Normal).unwrap();
        queue.write(b"b", SendMode::Normal).unwrap();
        assert!(matches!(queue.write(b"c", SendMode::Normal), Err(CoreError::NoMemory(_))));
        assert_eq!(queue.write(b"", SendMode::Normal).unwrap(), 0);
        assert_eq!(queue.flush().unwrap(), 2);
    }
}
