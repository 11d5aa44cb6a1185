//! Fixed-slot, by-value blocking message queue (§4.2).

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use device_protocol::{CoreError, CoreResult};

struct State {
    slots: VecDeque<Vec<u8>>,
    capacity: usize,
    quit: bool,
    users: usize,
}

/// Copies fixed-size messages between a bounded number of producers and
/// consumers. `send` blocks while full; `recv` blocks while empty unless
/// `no_wait` is set.
pub struct MsgQueue {
    each_size: usize,
    state: Mutex<State>,
    cond: Condvar,
}

impl MsgQueue {
    pub fn new(capacity: usize, each_size: usize) -> Self {
        Self {
            each_size,
            state: Mutex::new(State {
                slots: VecDeque::with_capacity(capacity),
                capacity,
                quit: false,
                users: 0,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn each_size(&self) -> usize {
        self.each_size
    }

    /// Copies up to `each_size` bytes of `msg` into the next free slot,
    /// blocking while the queue is full.
    pub fn send(&self, msg: &[u8]) -> CoreResult<()> {
        if msg.len() > self.each_size {
            return Err(CoreError::InvalidArg(format!(
                "message of {} bytes exceeds slot size {}",
                msg.len(),
                self.each_size
            )));
        }
        let mut st = self.state.lock().unwrap();
        st.users += 1;
        loop {
            if st.quit {
                st.users -= 1;
                self.cond.notify_all();
                return Err(CoreError::WrongState("queue is quitting".into()));
            }
            if st.slots.len() < st.capacity {
                st.slots.push_back(msg.to_vec());
                st.users -= 1;
                drop(st);
                self.cond.notify_all();
                return Ok(());
            }
            st = self.cond.wait(st).unwrap();
        }
    }

    /// Copies out the head message. Returns `Ok(None)` if `no_wait` is set
    /// and the queue is empty, or if the queue quit while waiting.
    pub fn recv(&self, no_wait: bool) -> CoreResult<Option<Vec<u8>>> {
        let mut st = self.state.lock().unwrap();
        st.users += 1;
        loop {
            if let Some(msg) = st.slots.pop_front() {
                st.users -= 1;
                drop(st);
                self.cond.notify_all();
                return Ok(Some(msg));
            }
            if st.quit {
                st.users -= 1;
                self.cond.notify_all();
                return Ok(None);
            }
            if no_wait {
                st.users -= 1;
                self.cond.notify_all();
                return Ok(None);
            }
            st = self.cond.wait(st).unwrap();
        }
    }

    /// Like [`MsgQueue::recv`], but gives up and returns `Ok(None)` once
    /// `timeout` has elapsed without a message arriving.
    pub fn recv_timeout(&self, timeout: Duration) -> CoreResult<Option<Vec<u8>>> {
        let deadline = Instant::now() + timeout;
        let mut st = self.state.lock().unwrap();
        st.users += 1;
        loop {
            if let Some(msg) = st.slots.pop_front() {
                st.users -= 1;
                drop(st);
                self.cond.notify_all();
                return Ok(Some(msg));
            }
            if st.quit {
                st.users -= 1;
                self.cond.notify_all();
                return Ok(None);
            }
            let now = Instant::now();
            if now >= deadline {
                st.users -= 1;
                self.cond.notify_all();
                return Ok(None);
            }
            let (guard, timeout_result) = self.cond.wait_timeout(st, deadline - now).unwrap();
            st = guard;
            if timeout_result.timed_out() && st.slots.is_empty() && !st.quit {
                st.users -= 1;
                self.cond.notify_all();
                return Ok(None);
            }
        }
    }

    /// Wakes all waiters and, once they have drained (`users == 0`), clears
    /// buffered messages and allows the queue to be reused.
    pub fn reset(&self) {
        let mut st = self.state.lock().unwrap();
        st.quit = true;
        self.cond.notify_all();
        while st.users > 0 {
            st = self.cond.wait(st).unwrap();
        }
        st.slots.clear();
        st.quit = false;
    }

    /// Sets `quit` and blocks until every waiter has drained.
    pub fn destroy(&self) {
        let mut st = self.state.lock().unwrap();
        st.quit = true;
        self.cond.notify_all();
        while st.users > 0 {
            st = self.cond.wait(st).unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn recv_preserves_bytes_sent() {
        let q = MsgQueue::new(4, 8);
        q.send(b"hello").unwrap();
        let got = q.recv(false).unwrap().unwrap();
        assert_eq!(&got, b"hello");
    }

    #[test]
    fn no_wait_recv_on_empty_returns_none() {
        let q = MsgQueue::new(4, 8);
        assert!(q.recv(true).unwrap().is_none());
    }

    #[test]
    fn send_blocks_while_full_then_succeeds() {
        let q = Arc::new(MsgQueue::new(1, 4));
        q.send(b"a").unwrap();
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.send(b"b"));
        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.recv(false).unwrap().unwrap(), b"a");
        handle.join().unwrap().unwrap();
        assert_eq!(q.recv(false).unwrap().unwrap(), b"b");
    }

    #[test]
    fn destroy_wakes_blocked_recv() {
        let q = Arc::new(MsgQueue::new(1, 4));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.recv(false).unwrap());
        thread::sleep(Duration::from_millis(20));
        q.destroy();
        assert!(handle.join().unwrap().is_none());
    }

    #[test]
    fn message_larger_than_slot_is_rejected() {
        let q = MsgQueue::new(1, 4);
        assert!(q.send(b"toolong").is_err());
    }

    #[test]
    fn recv_timeout_returns_none_on_expiry() {
        let q = MsgQueue::new(1, 4);
        let start = std::time::Instant::now();
        assert!(q.recv_timeout(Duration::from_millis(20)).unwrap().is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn recv_timeout_returns_message_delivered_before_expiry() {
        let q = Arc::new(MsgQueue::new(1, 4));
        let q2 = q.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            q2.send(b"hi").unwrap();
        });
        let got = q.recv_timeout(Duration::from_millis(500)).unwrap().unwrap();
        assert_eq!(&got, b"hi");
        handle.join().unwrap();
    }
}
