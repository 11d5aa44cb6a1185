//! The thread-naming/sizing hook (§6): lets a host size each logical
//! thread by name. Modeled as a trait rather than a bare function pointer
//! so a host can carry state (e.g. a core-affinity map) behind it.

use std::thread::{Builder, JoinHandle};

/// Sizing/placement hint for one logical thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadHint {
    pub stack_bytes: usize,
    pub priority: i32,
    pub core: Option<u8>,
}

/// Logical thread names the orchestrator and capture/render pipelines are
/// known to ask about (§6). Hosts may also receive names outside this set;
/// `ThreadSizing::size_for` takes a plain `&str` for forward compatibility.
pub const KNOWN_THREAD_NAMES: &[&str] = &[
    "pc_task", "pc_send", "aenc", "venc", "adec", "vdec", "arender", "vrender", "SrcRead",
    "buffer_in",
];

/// Implemented by a host that wants to size or pin specific logical
/// threads. The default no-op leaves every thread at the runtime default.
pub trait ThreadSizing: Send + Sync {
    fn size_for(&self, name: &str) -> Option<ThreadHint>;
}

/// The default hook: every thread keeps the runtime's default sizing.
pub struct DefaultThreadSizing;

impl ThreadSizing for DefaultThreadSizing {
    fn size_for(&self, _name: &str) -> Option<ThreadHint> {
        None
    }
}

/// Spawns a named `std::thread`, applying `scheduler`'s stack size hint for
/// `name` when one is given. Priority/core hints have no portable
/// `std::thread` equivalent and are left for a host-specific scheduler to
/// apply out of band (e.g. via `size_for` plus its own affinity call after
/// the handle is returned).
pub fn spawn_sized<F>(
    name: &str,
    scheduler: &dyn ThreadSizing,
    body: F,
) -> std::io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    let mut builder = Builder::new().name(name.to_string());
    if let Some(hint) = scheduler.size_for(name) {
        builder = builder.stack_size(hint.stack_bytes);
    }
    builder.spawn(body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sizing_is_a_no_op_for_every_known_name() {
        let sizing = DefaultThreadSizing;
        for name in KNOWN_THREAD_NAMES {
            assert!(sizing.size_for(name).is_none());
        }
    }

    struct PinEverythingToCoreZero;
    impl ThreadSizing for PinEverythingToCoreZero {
        fn size_for(&self, _name: &str) -> Option<ThreadHint> {
            Some(ThreadHint {
                stack_bytes: 4096,
                priority: 0,
                core: Some(0),
            })
        }
    }

    #[test]
    fn custom_sizing_hook_can_pin_a_thread() {
        let sizing = PinEverythingToCoreZero;
        let hint = sizing.size_for("arender").unwrap();
        assert_eq!(hint.core, Some(0));
    }

    #[test]
    fn spawn_sized_applies_the_stack_hint_and_name() {
        let sizing = PinEverythingToCoreZero;
        let handle = spawn_sized("arender", &sizing, || {}).unwrap();
        assert_eq!(handle.thread().name(), Some("arender"));
        handle.join().unwrap();
    }

    #[test]
    fn spawn_sized_with_default_sizing_still_spawns() {
        let sizing = DefaultThreadSizing;
        let handle = spawn_sized("vrender", &sizing, || {}).unwrap();
        handle.join().unwrap();
    }
}
