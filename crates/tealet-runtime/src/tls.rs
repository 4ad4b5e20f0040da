//! Per-thread tealet registry
//!
//! Every OS thread that touches the engine gets one registry, built on first
//! use: its Main tealet, the Current pointer, the tealet that last switched
//! in, the value in flight, and the handoff slot that keeps the tealet we
//! just left alive until we are off its stack.

use std::cell::RefCell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tealet_core::{ktrace, RegistryId, StackSwitch};

use crate::arch::{Native, SavedRegs};
use crate::tealet::{Tealet, Value, WeakTealet};

/// Counters shared between a registry and the tealets it created
///
/// Tealets may be dropped on any thread, so these are atomics.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) active: AtomicUsize,
    pub(crate) total: AtomicUsize,
}

impl Counters {
    pub(crate) fn created(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn destroyed(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Snapshot of a thread's tealet counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Live tealets, Main included
    pub active: usize,
    /// Tealets ever created on this thread, Main included
    pub total: usize,
}

pub(crate) struct Registry {
    pub(crate) id: RegistryId,
    pub(crate) counters: Arc<Counters>,
    pub(crate) main: Tealet,
    current: RefCell<Tealet>,
    previous: RefCell<Option<WeakTealet>>,
    transfer: RefCell<Option<Value>>,
    handoff: RefCell<Option<Tealet>>,
}

thread_local! {
    static REGISTRY: Registry = Registry::new();
}

/// Run `f` against this thread's registry, creating it if needed
///
/// Panics if called while the thread's locals are being destroyed; paths
/// that can run at teardown use [`try_with_registry`].
#[inline]
pub(crate) fn with_registry<R>(f: impl FnOnce(&Registry) -> R) -> R {
    REGISTRY.with(f)
}

/// Like [`with_registry`], but `None` once the registry is gone
#[inline]
pub(crate) fn try_with_registry<R>(f: impl FnOnce(&Registry) -> R) -> Option<R> {
    REGISTRY.try_with(f).ok()
}

impl Registry {
    fn new() -> Self {
        let id = RegistryId::next();
        let counters = Arc::new(Counters::default());
        let main = Tealet::new_main(id, Arc::clone(&counters));
        tealet_core::kdebug!("registry {} created, main tealet {}", id, main.id());
        Registry {
            id,
            counters,
            current: RefCell::new(main.clone()),
            main,
            previous: RefCell::new(None),
            transfer: RefCell::new(None),
            handoff: RefCell::new(None),
        }
    }

    #[inline]
    pub(crate) fn current(&self) -> Tealet {
        self.current.borrow().clone()
    }

    #[inline]
    pub(crate) fn is_current(&self, t: &Tealet) -> bool {
        *self.current.borrow() == *t
    }

    #[inline]
    pub(crate) fn previous(&self) -> Option<Tealet> {
        self.previous.borrow().as_ref().and_then(WeakTealet::upgrade)
    }

    pub(crate) fn stats(&self) -> Stats {
        Stats {
            active: self.counters.active.load(Ordering::Relaxed),
            total: self.counters.total.load(Ordering::Relaxed),
        }
    }

    /// Hand the transfer value over to whoever resumes next
    #[inline]
    pub(crate) fn take_transfer(&self) -> Value {
        self.transfer
            .borrow_mut()
            .take()
            .unwrap_or_else(|| Box::new(()))
    }

    /// Move control from the Current tealet to `to`
    ///
    /// The caller has already checked that `to` can be resumed. Returns the
    /// value delivered by whoever later switches back. No strong reference
    /// to the suspending tealet is kept on its own stack while it sleeps, so
    /// dropping every handle to a suspended tealet really releases it.
    pub(crate) fn transfer(&self, to: &Tealet, arg: Value) -> Value {
        let from_regs: *mut SavedRegs;
        {
            let from = self.current.replace(to.clone());
            debug_assert!(from != *to);
            ktrace!("switch {} -> {}", from.id(), to.id());
            from_regs = from.regs_ptr();
            self.transfer.replace(Some(arg));
            let stale = self.handoff.replace(Some(from));
            debug_assert!(stale.is_none());
        }
        let to_regs = to.regs_ptr();

        // Safety: `from` is held by the handoff slot until the other side
        // is running, `to` by Current and the caller's handle.
        unsafe { Native::switch(from_regs, to_regs) };

        self.after_switch();
        self.take_transfer()
    }

    /// Final transfer out of a tealet that just reached EXIT
    ///
    /// The exiting tealet goes to the handoff slot; its stack is unmapped by
    /// whoever runs next, since nothing can free the stack it stands on.
    pub(crate) fn exit_to(&self, me: Tealet, to: Tealet, value: Value) -> ! {
        let from_regs = me.regs_ptr();
        let to_regs = to.regs_ptr();
        ktrace!("exit {} -> {}", me.id(), to.id());

        self.transfer.replace(Some(value));
        let old_current = self.current.replace(to);
        let stale = self.handoff.replace(Some(me));
        debug_assert!(stale.is_none());
        drop((old_current, stale));

        // Safety: the handoff slot holds the exiting tealet until the target
        // has resumed and reaped it; the target is held by Current.
        unsafe { Native::switch(from_regs, to_regs) };

        tealet_core::kerror!("exited tealet was resumed");
        std::process::abort()
    }

    /// Housekeeping every resumed context does first
    ///
    /// Demotes the tealet we came from to a weak `previous` and unmaps its
    /// stack if it has exited. Dropping the strong handoff reference may
    /// destroy it; that is safe now that we run on our own stack.
    pub(crate) fn after_switch(&self) {
        let Some(from) = self.handoff.borrow_mut().take() else {
            return;
        };
        if from.state().is_terminated() {
            from.release_stack();
        }
        let stale = self.previous.replace(Some(from.downgrade()));
        drop(stale);
        drop(from);
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        // The thread is ending on its main stack; anything still suspended
        // is dropped with the handles below.
        if let Some(from) = self.handoff.get_mut().take() {
            if from.state().is_terminated() {
                from.release_stack();
            }
        }
        tealet_core::kdebug!("registry {} destroyed", self.id);
    }
}
