//! Bounded queue primitives shared by the capture and render pipelines.

mod data_queue;
mod msg_queue;

pub use data_queue::{DataQueue, ReadGuard, Reservation};
pub use msg_queue::MsgQueue;
