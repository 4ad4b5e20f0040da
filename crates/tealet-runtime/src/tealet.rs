//! The tealet engine
//!
//! A [`Tealet`] is a handle to one stackful execution context. Each tealet
//! gets its own mmap'd stack the first time it is anchored (`stub`) or run,
//! so contexts never share or copy stack memory and resuming is a single
//! register swap.
//!
//! ```text
//! STUB --run--> RUN --(return | Tealet::exit | panic)--> EXIT
//! ```
//!
//! Handles are `Send + Sync` so they can be stored anywhere, but every
//! operation checks the calling thread's registry against the tealet's owner
//! and fails with [`TealetError::CrossThread`] on a mismatch.

use std::any::Any;
use std::cell::UnsafeCell;
use std::convert::Infallible;
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use tealet_core::{
    kdebug, kerror, kwarn, MemoryError, RegistryId, SpinLock, StackMemory, StackSwitch, TealetError,
    TealetId, TealetResult, TealetState,
};

use crate::arch::{Native, SavedRegs};
use crate::config::{self, StackConfig};
use crate::memory::Stack;
use crate::tls::{self, Counters, Registry, Stats};

/// Value carried by a transfer
pub type Value = Box<dyn Any + Send>;

/// Type-erased user data attached to a tealet
pub type Data = dyn Any + Send + Sync;

type Body = Box<dyn FnOnce(Tealet, Value) -> Exit>;

/// Where a tealet's function hands control when it returns
pub enum Exit {
    /// Hand `value` to the thread's Main tealet
    Main(Value),
    /// Hand `value` to a specific RUN tealet of the same thread
    To(Tealet, Value),
}

impl Exit {
    /// Exit to Main with `value`
    pub fn main<T: Any + Send>(value: T) -> Self {
        Exit::Main(Box::new(value))
    }

    /// Exit to `target` with `value`
    pub fn to<T: Any + Send>(target: Tealet, value: T) -> Self {
        Exit::To(target, Box::new(value))
    }
}

impl fmt::Debug for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exit::Main(_) => write!(f, "Exit::Main(..)"),
            Exit::To(t, _) => write!(f, "Exit::To({}, ..)", t.id()),
        }
    }
}

/// Unwind payload raised by [`Tealet::exit`]
struct ExitRequest(Exit);

/// Delivered to Main when a tealet's function panics
pub struct Panicked(pub Box<dyn Any + Send>);

impl Panicked {
    /// Panic message, when the payload is a string
    pub fn message(&self) -> Option<&str> {
        if let Some(s) = self.0.downcast_ref::<&'static str>() {
            Some(s)
        } else {
            self.0.downcast_ref::<String>().map(String::as_str)
        }
    }
}

impl fmt::Debug for Panicked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Panicked")
            .field(&self.message().unwrap_or("<non-string payload>"))
            .finish()
    }
}

/// Best-effort description of where a tealet is suspended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// Call site of the `switch`/`run` that suspended the tealet
    pub location: &'static Location<'static>,
    /// Approximate stack pointer at that call
    pub stack_pointer: usize,
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (sp={:#x})", self.location, self.stack_pointer)
    }
}

struct TealetInner {
    id: TealetId,
    owner: RegistryId,
    is_main: bool,
    state: AtomicU8,
    anchored: AtomicBool,
    config: StackConfig,
    counters: Arc<Counters>,

    // Owner thread only; guarded by the registry check in every operation
    regs: UnsafeCell<SavedRegs>,
    stack: UnsafeCell<Option<Stack>>,
    body: UnsafeCell<Option<Body>>,

    // Readable from anywhere
    data: SpinLock<Option<Weak<Data>>>,
    frame: SpinLock<Option<Frame>>,
}

// Safety: the UnsafeCell fields are only touched on the owner thread, which
// every public operation verifies before doing anything else. `body` is only
// populated between `run` and the first instruction of the new context.
unsafe impl Send for TealetInner {}
unsafe impl Sync for TealetInner {}

impl Drop for TealetInner {
    fn drop(&mut self) {
        self.counters.destroyed();
        let state = TealetState::from(*self.state.get_mut());
        if state.is_active() && !self.is_main {
            kwarn!(
                "tealet {} dropped while suspended, its frames leak",
                self.id
            );
        } else {
            kdebug!("tealet {} destroyed in state {}", self.id, state);
        }
    }
}

/// Handle to a tealet
///
/// Cloning is cheap and yields another handle to the same tealet. Equality
/// is identity.
#[derive(Clone)]
pub struct Tealet {
    inner: Arc<TealetInner>,
}

impl PartialEq for Tealet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Tealet {}

impl fmt::Debug for Tealet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tealet")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("main", &self.inner.is_main)
            .finish()
    }
}

impl Tealet {
    fn from_parts(owner: RegistryId, is_main: bool, config: StackConfig, counters: Arc<Counters>) -> Self {
        counters.created();
        let state = if is_main { TealetState::Run } else { TealetState::Stub };
        Tealet {
            inner: Arc::new(TealetInner {
                id: TealetId::next(),
                owner,
                is_main,
                state: AtomicU8::new(state.into()),
                anchored: AtomicBool::new(false),
                config,
                counters,
                regs: UnsafeCell::new(SavedRegs::default()),
                stack: UnsafeCell::new(None),
                body: UnsafeCell::new(None),
                data: SpinLock::new(None),
                frame: SpinLock::new(None),
            }),
        }
    }

    pub(crate) fn new_main(owner: RegistryId, counters: Arc<Counters>) -> Self {
        Self::from_parts(owner, true, StackConfig::default(), counters)
    }

    /// Create a STUB tealet on the calling thread with the global stack config
    pub fn new() -> Self {
        Self::with_stack(*config::global())
    }

    /// Create a STUB tealet with a specific stack geometry
    pub fn with_config(cfg: &StackConfig) -> TealetResult<Self> {
        cfg.validate().map_err(|e| {
            kwarn!("rejecting stack config {:?}: {}", cfg, e);
            TealetError::Memory(MemoryError::InvalidSize)
        })?;
        Ok(Self::with_stack(*cfg))
    }

    fn with_stack(cfg: StackConfig) -> Self {
        let t = tls::with_registry(|reg| {
            Self::from_parts(reg.id, false, cfg, Arc::clone(&reg.counters))
        });
        kdebug!("created tealet {} stack={}", t.id(), cfg.stack_size);
        t
    }

    /// Create a STUB with the same stack placement as `stub`
    ///
    /// The copy gets the same stack geometry and is anchored if `stub` is.
    pub fn duplicate(stub: &Tealet) -> TealetResult<Self> {
        tls::with_registry(|reg| {
            stub.check_owner(reg)?;
            let state = stub.state();
            if !state.is_stub() || stub.inner.is_main {
                return Err(TealetError::invalid_state("duplicate", state));
            }
            let dup = Self::from_parts(reg.id, false, stub.inner.config, Arc::clone(&reg.counters));
            if stub.is_anchored() {
                dup.anchor()?;
            }
            kdebug!("duplicated tealet {} as {}", stub.id(), dup.id());
            Ok(dup)
        })
    }

    /// The calling thread's Current tealet
    pub fn current() -> Tealet {
        tls::with_registry(Registry::current)
    }

    /// The calling thread's Current tealet, `None` during thread teardown
    pub fn try_current() -> Option<Tealet> {
        tls::try_with_registry(Registry::current)
    }

    /// The calling thread's Main tealet, created on first use
    pub fn main() -> Tealet {
        tls::with_registry(|reg| reg.main.clone())
    }

    /// The tealet that last transferred control on this thread
    pub fn previous() -> Option<Tealet> {
        tls::with_registry(Registry::previous)
    }

    /// Leave the Current tealet from any call depth
    ///
    /// Unwinds every frame between here and the tealet's function, running
    /// destructors, then hands control to the target of `exit` as if the
    /// function had returned it. Only returns, with a state error, when the
    /// Current tealet is Main.
    ///
    /// A `catch_unwind` on the way up intercepts the exit. Code that catches
    /// panics inside a tealet should re-raise payloads for which
    /// [`is_exit_unwind`](Self::is_exit_unwind) holds.
    pub fn exit(exit: Exit) -> TealetResult<Infallible> {
        let current = Tealet::current();
        if current.is_main() {
            return Err(TealetError::invalid_state("exit", current.state()));
        }
        kdebug!("tealet {} unwinding for {:?}", current.id(), exit);
        drop(current);
        panic::resume_unwind(Box::new(ExitRequest(exit)))
    }

    /// Whether a caught unwind payload came from [`Tealet::exit`]
    pub fn is_exit_unwind(payload: &(dyn Any + Send)) -> bool {
        payload.is::<ExitRequest>()
    }

    /// Counters for the calling thread
    pub fn stats() -> Stats {
        tls::with_registry(Registry::stats)
    }

    #[inline]
    pub fn id(&self) -> TealetId {
        self.inner.id
    }

    #[inline]
    pub fn state(&self) -> TealetState {
        TealetState::from(self.inner.state.load(Ordering::Acquire))
    }

    #[inline]
    pub fn is_main(&self) -> bool {
        self.inner.is_main
    }

    /// Registry (thread) this tealet belongs to
    #[inline]
    pub fn owner(&self) -> RegistryId {
        self.inner.owner
    }

    /// Usable stack bytes requested for this tealet
    #[inline]
    pub fn stack_size(&self) -> usize {
        self.inner.config.stack_size
    }

    /// Whether a stack has been mapped for this tealet
    #[inline]
    pub fn is_anchored(&self) -> bool {
        self.inner.anchored.load(Ordering::Acquire)
    }

    /// Anchor a STUB: map its stack and park a fresh context at its entry
    ///
    /// Idempotent while STUB.
    pub fn stub(&self) -> TealetResult<()> {
        tls::with_registry(|reg| {
            self.check_owner(reg)?;
            let state = self.state();
            if !state.is_stub() {
                return Err(TealetError::invalid_state("stub", state));
            }
            self.anchor()
        })
    }

    /// Bind `f` and start it, returning what is later handed back
    ///
    /// `f` runs on this tealet's own stack with a handle to it and `arg`.
    #[track_caller]
    pub fn run<F>(&self, f: F, arg: Value) -> TealetResult<Value>
    where
        F: FnOnce(Tealet, Value) -> Exit + 'static,
    {
        self.run_at(f, arg, Location::caller())
    }

    /// [`run`](Self::run) recording an explicit caller location
    pub fn run_at<F>(&self, f: F, arg: Value, location: &'static Location<'static>) -> TealetResult<Value>
    where
        F: FnOnce(Tealet, Value) -> Exit + 'static,
    {
        tls::with_registry(|reg| {
            self.check_owner(reg)?;
            let state = self.state();
            if !state.is_stub() || self.inner.is_main {
                return Err(TealetError::invalid_state("run", state));
            }
            self.anchor()?;

            // Safety: owner thread, and the context has not started yet
            unsafe { *self.inner.body.get() = Some(Box::new(f)) };
            self.set_state(TealetState::Run);
            kdebug!("run tealet {}", self.id());

            reg.current().record_frame(location);
            Ok(reg.transfer(self, arg))
        })
    }

    /// Suspend the caller and resume this tealet with `arg`
    ///
    /// Returns the value handed back when something switches to the caller
    /// again. Switching to the Current tealet returns `arg` unchanged.
    #[track_caller]
    pub fn switch(&self, arg: Value) -> TealetResult<Value> {
        self.switch_at(arg, Location::caller())
    }

    /// [`switch`](Self::switch) recording an explicit caller location
    pub fn switch_at(&self, arg: Value, location: &'static Location<'static>) -> TealetResult<Value> {
        tls::with_registry(|reg| {
            self.check_owner(reg)?;
            if reg.is_current(self) {
                return Ok(arg);
            }
            let state = self.state();
            if !state.is_active() {
                return Err(TealetError::invalid_state("switch", state));
            }
            reg.current().record_frame(location);
            Ok(reg.transfer(self, arg))
        })
    }

    /// Where this tealet is suspended
    ///
    /// For the Current tealet this is the caller of `frame` itself; for a
    /// suspended RUN tealet, the call that suspended it; otherwise `None`.
    #[track_caller]
    pub fn frame(&self) -> Option<Frame> {
        let here = Location::caller();
        let is_current = tls::try_with_registry(|reg| reg.is_current(self)).unwrap_or(false);
        if is_current {
            let marker = 0u8;
            return Some(Frame {
                location: here,
                stack_pointer: &marker as *const u8 as usize,
            });
        }
        if self.state().is_active() {
            self.inner.frame.get_cloned()
        } else {
            None
        }
    }

    /// Attach type-erased user data without extending its lifetime
    pub fn set_data(&self, data: Option<Weak<Data>>) {
        self.inner.data.replace(data);
    }

    /// User data, if set and still alive
    pub fn data(&self) -> Option<Arc<Data>> {
        self.inner.data.lock().as_ref().and_then(Weak::upgrade)
    }

    // ------------------------------------------------------------------

    fn check_owner(&self, reg: &Registry) -> TealetResult<()> {
        if self.inner.owner == reg.id {
            Ok(())
        } else {
            Err(TealetError::CrossThread {
                owner: self.inner.owner,
                caller: reg.id,
            })
        }
    }

    #[inline]
    fn set_state(&self, state: TealetState) {
        self.inner.state.store(state.into(), Ordering::Release);
    }

    fn record_frame(&self, location: &'static Location<'static>) {
        let marker = 0u8;
        self.inner.frame.replace(Some(Frame {
            location,
            stack_pointer: &marker as *const u8 as usize,
        }));
    }

    /// Map the stack and prepare the entry context if not done yet
    fn anchor(&self) -> TealetResult<()> {
        if self.is_anchored() {
            return Ok(());
        }
        let cfg = &self.inner.config;
        let stack = Stack::allocate(cfg.stack_size, cfg.guard_pages)?;
        let top = stack.top();
        // Safety: owner thread, context not started
        unsafe {
            *self.inner.stack.get() = Some(stack);
            Native::init(
                &mut *self.inner.regs.get(),
                top,
                tealet_entry,
                Arc::as_ptr(&self.inner) as usize,
            );
        }
        self.inner.anchored.store(true, Ordering::Release);
        kdebug!("anchored tealet {}", self.id());
        Ok(())
    }

    pub(crate) fn downgrade(&self) -> WeakTealet {
        WeakTealet(Arc::downgrade(&self.inner))
    }

    #[inline]
    pub(crate) fn regs_ptr(&self) -> *mut SavedRegs {
        self.inner.regs.get()
    }

    /// Unmap the stack of an exited tealet
    pub(crate) fn release_stack(&self) {
        debug_assert!(self.state().is_terminated());
        // Safety: owner thread, and nothing runs on an EXIT tealet's stack
        // once control has moved elsewhere
        let stack = unsafe { (*self.inner.stack.get()).take() };
        drop(stack);
    }

    fn take_body(&self) -> Option<Body> {
        // Safety: owner thread, called once at context start
        unsafe { (*self.inner.body.get()).take() }
    }

    /// Pick where an exiting tealet hands control
    fn exit_target(&self, reg: &Registry, exit: Exit) -> (Tealet, Value) {
        match exit {
            Exit::Main(value) => (reg.main.clone(), value),
            Exit::To(target, value) => {
                let state = target.state();
                if target.owner() != reg.id || !state.is_active() || target == *self {
                    kwarn!(
                        "tealet {} exit target {} invalid ({}), falling back to main",
                        self.id(),
                        target.id(),
                        state
                    );
                    (reg.main.clone(), value)
                } else {
                    (target, value)
                }
            }
        }
    }
}

impl Default for Tealet {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-owning tealet reference, used for the registry's `previous`
#[derive(Clone)]
pub(crate) struct WeakTealet(Weak<TealetInner>);

impl WeakTealet {
    pub(crate) fn upgrade(&self) -> Option<Tealet> {
        self.0.upgrade().map(|inner| Tealet { inner })
    }
}

/// First Rust code on a fresh tealet stack
///
/// `raw` is the `TealetInner` pointer stashed by `anchor`. While the body
/// runs, the only handle this frame holds is the one moved into it, so a
/// suspended tealet is owned by its users alone. Every owned local is moved
/// into `exit_to` before the final switch, since this frame is never unwound.
extern "C" fn tealet_entry(raw: usize) -> ! {
    tls::with_registry(|reg| -> () {
        reg.after_switch();

        let me = reg.current();
        debug_assert_eq!(Arc::as_ptr(&me.inner) as usize, raw);
        let id = me.id();
        let arg = reg.take_transfer();

        let exit = match me.take_body() {
            Some(body) => match panic::catch_unwind(AssertUnwindSafe(move || body(me, arg))) {
                Ok(exit) => exit,
                Err(payload) => match payload.downcast::<ExitRequest>() {
                    Ok(request) => request.0,
                    Err(payload) => {
                        let panicked = Panicked(payload);
                        kerror!(
                            "tealet {} panicked: {}",
                            id,
                            panicked.message().unwrap_or("<non-string payload>")
                        );
                        Exit::Main(Box::new(panicked))
                    }
                },
            },
            None => {
                drop(me);
                kerror!("tealet {} started without a function", id);
                Exit::Main(arg)
            }
        };

        // Back on this stack, so Current is this tealet again
        let me = reg.current();
        me.set_state(TealetState::Exit);
        me.inner.frame.replace(None);
        let (target, value) = me.exit_target(reg, exit);
        kdebug!("tealet {} exited", id);
        reg.exit_to(me, target, value)
    });
    std::process::abort()
}
