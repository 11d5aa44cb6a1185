//! A byte-capacity-bounded blocking queue of [`StreamFrame`]s — the raw and
//! render FIFOs that sit between AVRender's ingest/decode/render stages
//! (§4.7). Capacity is measured in payload bytes, matching the spec's
//! `*_fifo_size` configuration knobs.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use device_protocol::StreamFrame;

struct State {
    queue: VecDeque<StreamFrame>,
    used_bytes: usize,
    quit: bool,
}

pub struct FrameFifo {
    capacity: usize,
    state: Mutex<State>,
    cond: Condvar,
}

impl FrameFifo {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State {
                queue: VecDeque::new(),
                used_bytes: 0,
                quit: false,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a frame of `size` bytes would fit without blocking.
    pub fn fifo_enough(&self, size: usize) -> bool {
        let st = self.state.lock().unwrap();
        st.used_bytes + size <= self.capacity
    }

    pub fn level(&self) -> usize {
        self.state.lock().unwrap().used_bytes
    }

    /// Blocks until there is room for `frame`, then enqueues it. Returns
    /// `false` if the fifo quit while waiting.
    pub fn push(&self, frame: StreamFrame) -> bool {
        let size = frame.size();
        let mut st = self.state.lock().unwrap();
        loop {
            if st.quit {
                return false;
            }
            if st.used_bytes + size <= self.capacity || self.capacity == 0 {
                st.used_bytes += size;
                st.queue.push_back(frame);
                drop(st);
                self.cond.notify_all();
                return true;
            }
            st = self.cond.wait(st).unwrap();
        }
    }

    /// Blocks until a frame is available. Returns `None` once the fifo has
    /// quit and drained.
    pub fn pop(&self) -> Option<StreamFrame> {
        let mut st = self.state.lock().unwrap();
        loop {
            if let Some(frame) = st.queue.pop_front() {
                st.used_bytes = st.used_bytes.saturating_sub(frame.size());
                drop(st);
                self.cond.notify_all();
                return Some(frame);
            }
            if st.quit {
                return None;
            }
            st = self.cond.wait(st).unwrap();
        }
    }

    /// Drains every queued frame and returns them, so a caller can free any
    /// pool-tracked buffers they still own before they're dropped.
    pub fn flush(&self) -> Vec<StreamFrame> {
        let mut st = self.state.lock().unwrap();
        let drained: Vec<StreamFrame> = st.queue.drain(..).collect();
        st.used_bytes = 0;
        drop(st);
        self.cond.notify_all();
        drained
    }

    pub fn quit(&self) {
        let mut st = self.state.lock().unwrap();
        st.quit = true;
        drop(st);
        self.cond.notify_all();
    }

    pub fn reopen(&self) {
        let mut st = self.state.lock().unwrap();
        st.quit = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_protocol::FrameKind;

    #[test]
    fn fifo_enough_reflects_remaining_capacity() {
        let fifo = FrameFifo::new(100);
        assert!(fifo.fifo_enough(100));
        fifo.push(StreamFrame::new(FrameKind::Audio, 0, vec![0u8; 60]));
        assert!(fifo.fifo_enough(40));
        assert!(!fifo.fifo_enough(41));
    }

    #[test]
    fn pop_returns_frames_in_order() {
        let fifo = FrameFifo::new(1000);
        fifo.push(StreamFrame::new(FrameKind::Video, 0, vec![1]));
        fifo.push(StreamFrame::new(FrameKind::Video, 33, vec![2]));
        assert_eq!(fifo.pop().unwrap().pts, 0);
        assert_eq!(fifo.pop().unwrap().pts, 33);
    }

    #[test]
    fn flush_clears_level() {
        let fifo = FrameFifo::new(1000);
        fifo.push(StreamFrame::new(FrameKind::Audio, 0, vec![0u8; 500]));
        let drained = fifo.flush();
        assert_eq!(fifo.level(), 0);
        assert_eq!(drained.len(), 1);
    }
}
