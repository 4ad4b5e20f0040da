//! Greenlets: parent/child lightweight threads built on tealets
//!
//! Each greenlet wraps one anchored tealet. Its function starts lazily on the
//! first switch, and when it finishes its result goes to the nearest living
//! ancestor. Dropping the last user handle to a suspended greenlet kills it
//! by throwing the exit failure into it. If that cannot happen here (another
//! thread) the greenlet is queued on its main greenlet and killed by the next
//! greenlet created on that thread. Once that thread has exited nothing can
//! run the greenlet again, and it is abandoned.

use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crossbeam_queue::SegQueue;
use tealet_core::{kdebug, kwarn, SpinLock, TealetError, TealetId};
use tealet_runtime::{Data, Exit, Frame, Tealet, Value};

use crate::args::{Args, Payload, Reply};
use crate::error::{GreenletError, GreenletResult};
use crate::failure::{Failure, FailureKind};

/// A greenlet's function
pub type RunFn = Box<dyn FnOnce(Args) -> GreenletResult<Args> + Send>;

/// Outcome of tearing a greenlet down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Teardown {
    /// Exit failure thrown in; the greenlet ran to completion
    Completed,
    /// Owned by another thread; queued on its main greenlet
    Deferred,
    /// The greenlet is the one running; nothing done
    Illegal,
    /// Not started, or already finished
    Inactive,
    /// Owning thread has exited; the greenlet's frames are left as they are
    Abandoned,
}

struct GreenletInner {
    tealet: Tealet,
    run: SpinLock<Option<RunFn>>,
    /// `None` only for a main greenlet, which is its own parent
    parent: SpinLock<Option<Greenlet>>,
    /// `None` only for a main greenlet
    main: Option<Weak<GreenletInner>>,
    /// Teardown requests from other threads; main greenlets only
    garbage: Option<SegQueue<Greenlet>>,
    /// Live user handles; reaching zero tears the greenlet down
    handles: AtomicUsize,
    /// Set on a main greenlet when its thread's locals are destroyed
    thread_exited: AtomicBool,
}

/// Handle to a greenlet
///
/// Cloning counts as another user handle. When the last one is dropped the
/// greenlet is killed (see [`Greenlet::kill`]).
pub struct Greenlet {
    inner: Arc<GreenletInner>,
}

/// The thread's main greenlet; dropping it retires the thread
struct MainSlot(RefCell<Option<Greenlet>>);

impl Drop for MainSlot {
    fn drop(&mut self) {
        if let Some(main) = self.0.get_mut().take() {
            housekeeping(&main.inner);
            main.inner.thread_exited.store(true, Ordering::Release);
            kdebug!("main greenlet {} retired with its thread", main.id());
        }
    }
}

thread_local! {
    static MAIN_GREENLET: MainSlot = const { MainSlot(RefCell::new(None)) };
}

impl Greenlet {
    /// Create a greenlet that will run `run` on its first switch
    ///
    /// `parent` defaults to the calling thread's current greenlet. Pending
    /// teardowns queued by other threads are processed first.
    pub fn new<F>(run: F, parent: Option<&Greenlet>) -> GreenletResult<Greenlet>
    where
        F: FnOnce(Args) -> GreenletResult<Args> + Send + 'static,
    {
        Self::with_run(Some(Box::new(run)), parent)
    }

    /// Create a greenlet with no function
    ///
    /// Switching to it goes straight to its parent.
    pub fn without_run(parent: Option<&Greenlet>) -> GreenletResult<Greenlet> {
        Self::with_run(None, parent)
    }

    fn with_run(run: Option<RunFn>, parent: Option<&Greenlet>) -> GreenletResult<Greenlet> {
        let parent = match parent {
            Some(p) => p.clone(),
            None => Greenlet::current()?,
        };
        let caller = Tealet::current().owner();
        if parent.inner.tealet.owner() != caller {
            return Err(TealetError::CrossThread {
                owner: parent.inner.tealet.owner(),
                caller,
            }
            .into());
        }

        let main = parent.main_inner().ok_or(TealetError::Foreign)?;
        housekeeping(&main);

        let tealet = Tealet::new();
        tealet.stub()?;
        let inner = Arc::new(GreenletInner {
            tealet,
            run: SpinLock::new(run),
            parent: SpinLock::new(Some(parent)),
            main: Some(Arc::downgrade(&main)),
            garbage: None,
            handles: AtomicUsize::new(0),
            thread_exited: AtomicBool::new(false),
        });
        attach(&inner);
        let g = Greenlet::adopt(inner);
        kdebug!("greenlet {} created", g.id());
        Ok(g)
    }

    /// The calling thread's current greenlet
    ///
    /// The Main tealet gets its main greenlet on first use. Any other tealet
    /// that is not wrapped by a greenlet is foreign.
    pub fn current() -> GreenletResult<Greenlet> {
        let tealet = Tealet::try_current().ok_or(TealetError::Foreign)?;
        if let Some(inner) = lookup(&tealet) {
            return Ok(Greenlet::adopt(inner));
        }
        if tealet.is_main() {
            if let Some(main) = main_greenlet(tealet) {
                return Ok(main);
            }
        }
        Err(TealetError::Foreign.into())
    }

    /// [`current`](Self::current), or `None` inside a foreign tealet
    pub fn try_current() -> Option<Greenlet> {
        Self::current().ok()
    }

    /// Switch to this greenlet, starting it if needed
    #[track_caller]
    pub fn switch(&self, args: Args) -> GreenletResult<Reply> {
        let location = Location::caller();
        switch_payload(&self.inner, Payload::Values(args), location)?.into_reply()
    }

    /// Raise a failure inside this greenlet
    ///
    /// `kind` defaults to [`FailureKind::Exit`]. A greenlet that has not
    /// started yet never runs its function; it finishes with the failure.
    #[track_caller]
    pub fn throw(
        &self,
        kind: Option<FailureKind>,
        value: Option<Value>,
        trace: Option<String>,
    ) -> GreenletResult<Reply> {
        let failure = Failure {
            kind: kind.unwrap_or(FailureKind::Exit),
            value,
            trace,
        };
        let location = Location::caller();
        switch_payload(&self.inner, Payload::Failure(failure), location)?.into_reply()
    }

    /// Kill this greenlet: throw the exit failure in and wait for it to finish
    ///
    /// Runs automatically when the last handle is dropped.
    #[track_caller]
    pub fn kill(&self) -> Teardown {
        teardown(&self.inner, Location::caller())
    }

    /// Finished (function returned or failed)
    pub fn dead(&self) -> bool {
        self.inner.tealet.state().is_terminated()
    }

    /// Started and not finished
    pub fn is_alive(&self) -> bool {
        self.inner.tealet.state().is_active()
    }

    pub fn is_main(&self) -> bool {
        self.inner.main.is_none()
    }

    pub fn id(&self) -> TealetId {
        self.inner.tealet.id()
    }

    /// Underlying tealet
    pub fn tealet(&self) -> &Tealet {
        &self.inner.tealet
    }

    /// Where this greenlet is suspended
    ///
    /// The caller of `frame` for the running greenlet; the `switch`/`throw`
    /// call it is parked in otherwise.
    #[track_caller]
    pub fn frame(&self) -> Option<Frame> {
        self.inner.tealet.frame()
    }

    /// Parent greenlet; `None` for a main greenlet
    pub fn parent(&self) -> Option<Greenlet> {
        self.inner.parent.get_cloned()
    }

    /// Reparent, refusing cycles and parents owned by another thread
    pub fn set_parent(&self, parent: &Greenlet) -> GreenletResult<()> {
        if self.is_main() {
            return Err(GreenletError::CyclicParent);
        }
        if parent.inner.tealet.owner() != self.inner.tealet.owner() {
            return Err(TealetError::CrossThread {
                owner: self.inner.tealet.owner(),
                caller: parent.inner.tealet.owner(),
            }
            .into());
        }
        let mut p = Some(parent.clone());
        while let Some(g) = p {
            if Arc::ptr_eq(&g.inner, &self.inner) {
                return Err(GreenletError::CyclicParent);
            }
            p = g.parent();
        }
        let old = self.inner.parent.replace(Some(parent.clone()));
        drop(old);
        Ok(())
    }

    /// Turn a strong inner reference into a counted user handle
    fn adopt(inner: Arc<GreenletInner>) -> Greenlet {
        inner.handles.fetch_add(1, Ordering::AcqRel);
        Greenlet { inner }
    }

    fn main_inner(&self) -> Option<Arc<GreenletInner>> {
        self.inner.main_inner()
    }
}

impl Clone for Greenlet {
    fn clone(&self) -> Self {
        Greenlet::adopt(Arc::clone(&self.inner))
    }
}

impl Drop for Greenlet {
    fn drop(&mut self) {
        if self.inner.handles.fetch_sub(1, Ordering::AcqRel) == 1 {
            let outcome = teardown(&self.inner, Location::caller());
            kdebug!("greenlet {} released: {:?}", self.inner.tealet.id(), outcome);
        }
    }
}

impl PartialEq for Greenlet {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Greenlet {}

impl fmt::Debug for Greenlet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Greenlet")
            .field("id", &self.inner.tealet.id())
            .field("state", &self.inner.tealet.state())
            .field("main", &self.is_main())
            .finish()
    }
}

impl GreenletInner {
    fn main_inner(self: &Arc<Self>) -> Option<Arc<GreenletInner>> {
        match &self.main {
            None => Some(Arc::clone(self)),
            Some(main) => main.upgrade(),
        }
    }

    /// Parent as a handle; a main greenlet is its own parent
    fn parent_or_self(self: &Arc<Self>) -> Greenlet {
        match self.parent.get_cloned() {
            Some(p) => p,
            None => Greenlet::adopt(Arc::clone(self)),
        }
    }

    /// Nearest ancestor that is running
    fn living_parent(self: &Arc<Self>) -> Greenlet {
        let mut p = self.parent_or_self();
        while !p.is_alive() {
            p = p.inner.parent_or_self();
        }
        p
    }
}

/// Greenlet wrapping `tealet`, if any
fn lookup(tealet: &Tealet) -> Option<Arc<GreenletInner>> {
    tealet.data()?.downcast::<GreenletInner>().ok()
}

/// Make `inner` discoverable from its tealet without keeping it alive
fn attach(inner: &Arc<GreenletInner>) {
    let weak: Weak<Data> = Arc::downgrade(inner) as Weak<Data>;
    inner.tealet.set_data(Some(weak));
}

/// The thread's main greenlet, created around `main` on first use
///
/// `None` once the thread's locals are being torn down.
fn main_greenlet(main: Tealet) -> Option<Greenlet> {
    MAIN_GREENLET.try_with(|MainSlot(slot)| {
        if let Some(g) = slot.borrow().as_ref() {
            return g.clone();
        }
        let inner = Arc::new(GreenletInner {
            tealet: main,
            run: SpinLock::new(None),
            parent: SpinLock::new(None),
            main: None,
            garbage: Some(SegQueue::new()),
            handles: AtomicUsize::new(0),
            thread_exited: AtomicBool::new(false),
        });
        attach(&inner);
        let g = Greenlet::adopt(inner);
        kdebug!("main greenlet {} created", g.id());
        *slot.borrow_mut() = Some(g.clone());
        g
    })
    .ok()
}

/// Tear down everything other threads queued on `main`
fn housekeeping(main: &Arc<GreenletInner>) {
    let Some(garbage) = &main.garbage else {
        return;
    };
    let mut drained = 0usize;
    while let Some(g) = garbage.pop() {
        drained += 1;
        g.kill();
    }
    if drained > 0 {
        kdebug!("housekeeping tore down {} deferred greenlet(s)", drained);
    }
}

/// Deliver `payload` to `target`, starting or redirecting as needed
fn switch_payload(
    target: &Arc<GreenletInner>,
    payload: Payload,
    location: &'static Location<'static>,
) -> GreenletResult<Payload> {
    let caller = Tealet::current().owner();
    if target.tealet.owner() != caller {
        return Err(TealetError::CrossThread {
            owner: target.tealet.owner(),
            caller,
        }
        .into());
    }

    let pending = target.run.lock().take();
    let value = match pending {
        Some(run) => {
            let me = Arc::clone(target);
            target
                .tealet
                .run_at(move |t, arg| greenlet_main(t, me, run, arg), payload.into_value(), location)?
        }
        None if !target.tealet.state().is_active() => {
            let parent = target.living_parent();
            return switch_payload(&parent.inner, payload, location);
        }
        None => target.tealet.switch_at(payload.into_value(), location)?,
    };
    Ok(Payload::from_value(value))
}

/// Body of every greenlet's tealet
///
/// An unwind from [`Tealet::exit`] passes through untouched, so the
/// greenlet ends where the exit says instead of at its parent.
fn greenlet_main(tealet: Tealet, me: Arc<GreenletInner>, run: RunFn, arg: Value) -> Exit {
    drop(tealet);

    let outcome = match Payload::from_value(arg) {
        Payload::Values(args) => match panic::catch_unwind(AssertUnwindSafe(move || run(args))) {
            Ok(Ok(result)) => Payload::Values(result),
            Ok(Err(GreenletError::Raised(failure))) => Payload::Failure(failure),
            Ok(Err(other)) => Payload::Failure(Failure::new(FailureKind::Error).with_value(other.to_string())),
            Err(payload) if Tealet::is_exit_unwind(&*payload) => panic::resume_unwind(payload),
            Err(payload) => Payload::Failure(Failure::panic(payload)),
        },
        Payload::Failure(failure) => {
            // thrown into before it ever started: the function never runs
            drop(run);
            Payload::Failure(failure)
        }
    };
    let outcome = match outcome {
        Payload::Failure(f) if f.is_exit() => Payload::Values(Args::one(f)),
        other => other,
    };

    let parent = me.living_parent();
    let target = parent.inner.tealet.clone();
    kdebug!("greenlet {} finished, handing over to {}", me.tealet.id(), target.id());
    drop(parent);
    drop(me);
    Exit::To(target, outcome.into_value())
}

/// Kill `inner` if it is suspended somewhere
fn teardown(inner: &Arc<GreenletInner>, location: &'static Location<'static>) -> Teardown {
    // Thread locals already gone: nothing can be switched any more
    let Some(current) = Tealet::try_current() else {
        return Teardown::Inactive;
    };
    if !inner.tealet.state().is_active() {
        return Teardown::Inactive;
    }
    if current == inner.tealet {
        return Teardown::Illegal;
    }
    if current.owner() != inner.tealet.owner() {
        return defer(inner);
    }
    drop(current);

    let killer = match Greenlet::current() {
        Ok(g) => g,
        Err(e) => {
            kwarn!("cannot kill greenlet {} from here: {}", inner.tealet.id(), e);
            return defer(inner);
        }
    };

    let old = inner.parent.replace(Some(killer));
    let result = switch_payload(inner, Payload::Failure(Failure::exit()), location);
    let killer = inner.parent.replace(old);
    drop(killer);

    match result {
        Ok(Payload::Values(_)) => Teardown::Completed,
        Ok(Payload::Failure(f)) => {
            kwarn!("greenlet {} raised while being killed: {}", inner.tealet.id(), f);
            Teardown::Completed
        }
        Err(e) => {
            kwarn!("killing greenlet {} failed: {}", inner.tealet.id(), e);
            Teardown::Completed
        }
    }
}

/// Queue `inner` on its main greenlet for the owning thread to kill
fn defer(inner: &Arc<GreenletInner>) -> Teardown {
    let main = match inner.main_inner() {
        Some(main) if !main.thread_exited.load(Ordering::Acquire) => main,
        _ => {
            kwarn!(
                "greenlet {} outlived its thread, dropping without teardown",
                inner.tealet.id()
            );
            return Teardown::Abandoned;
        }
    };
    let Some(garbage) = &main.garbage else {
        return Teardown::Abandoned;
    };
    garbage.push(Greenlet::adopt(Arc::clone(inner)));
    if main.thread_exited.load(Ordering::Acquire) {
        // retired while we pushed: nobody will drain this any more
        while let Some(g) = garbage.pop() {
            drop(g);
        }
        return Teardown::Abandoned;
    }
    kdebug!("greenlet {} teardown deferred", inner.tealet.id());
    Teardown::Deferred
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;

    fn parent_of_current() -> Greenlet {
        Greenlet::current().unwrap().parent().unwrap()
    }

    #[test]
    fn test_current_is_main_greenlet() {
        let g = Greenlet::current().unwrap();
        assert!(g.is_main());
        assert!(g.is_alive());
        assert!(!g.dead());
        assert!(g.parent().is_none());
        assert_eq!(g.tealet(), &Tealet::main());
        assert_eq!(Greenlet::current().unwrap(), g);
    }

    #[test]
    fn test_lazy_start_and_round_trip() {
        let started = Arc::new(AtomicUsize::new(0));
        let s = started.clone();
        let g = Greenlet::new(
            move |mut args| {
                s.fetch_add(1, Ordering::SeqCst);
                let x = args.take::<i32>(0).unwrap();
                let back = parent_of_current().switch(Args::one(x * 2))?;
                let y = back.into_one::<i32>().unwrap();
                Ok(Args::one(y * 2))
            },
            None,
        )
        .unwrap();

        assert_eq!(started.load(Ordering::SeqCst), 0);
        assert!(!g.is_alive());
        assert!(!g.dead());

        let r = g.switch(Args::one(2i32)).unwrap();
        assert_eq!(r.into_one::<i32>(), Some(4));
        assert!(g.is_alive());

        let r = g.switch(Args::one(3i32)).unwrap();
        assert_eq!(r.into_one::<i32>(), Some(6));
        assert!(g.dead());
        assert_eq!(started.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_keywords_reach_the_function() {
        let g = Greenlet::new(
            |args| {
                assert!(args.positional.is_empty());
                Ok(Args::new().kwarg("seen", args.keyword.len()))
            },
            None,
        )
        .unwrap();
        match g.switch(Args::new().kwarg("a", 1u8).kwarg("b", 2u8)).unwrap() {
            Reply::Keywords(mut k) => {
                let seen = k.remove("seen").unwrap().downcast::<usize>().unwrap();
                assert_eq!(*seen, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_throw_custom_into_suspended() {
        let g = Greenlet::new(
            |_| match parent_of_current().switch(Args::new()) {
                Err(GreenletError::Raised(f)) => Ok(Args::one(f.kind.to_string())),
                Ok(_) => Ok(Args::one(String::from("no failure"))),
                Err(e) => Err(e),
            },
            None,
        )
        .unwrap();
        g.switch(Args::new()).unwrap();

        let r = g
            .throw(Some(FailureKind::Custom("ValueError".into())), None, None)
            .unwrap();
        assert_eq!(r.into_one::<String>().as_deref(), Some("ValueError"));
        assert!(g.dead());
    }

    #[test]
    fn test_default_throw_is_exit_and_caught() {
        let g = Greenlet::new(
            |_| {
                parent_of_current().switch(Args::new())?;
                Ok(Args::one("not reached"))
            },
            None,
        )
        .unwrap();
        g.switch(Args::new()).unwrap();

        let r = g.throw(None, None, None).unwrap();
        let f = r.into_one::<Failure>().unwrap();
        assert!(f.is_exit());
        assert!(g.dead());
    }

    #[test]
    fn test_throw_into_unstarted_skips_function() {
        let ran = Arc::new(AtomicUsize::new(0));
        let r2 = ran.clone();
        let g = Greenlet::new(
            move |a| {
                r2.fetch_add(1, Ordering::SeqCst);
                Ok(a)
            },
            None,
        )
        .unwrap();

        let err = g
            .throw(Some(FailureKind::Error), Some(Box::new("early")), None)
            .unwrap_err();
        assert_eq!(err.failure().and_then(Failure::message), Some("early"));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
        assert!(g.dead());
    }

    #[test]
    fn test_error_and_panic_propagate_to_parent() {
        let g = Greenlet::new(
            |_| Err(Failure::new(FailureKind::Error).with_value("bad").into()),
            None,
        )
        .unwrap();
        let err = g.switch(Args::new()).unwrap_err();
        assert_eq!(err.failure().map(|f| &f.kind), Some(&FailureKind::Error));
        assert_eq!(err.to_string(), "error: bad");

        let p = Greenlet::new(|_| -> GreenletResult<Args> { panic!("kaboom") }, None).unwrap();
        let err = p.switch(Args::new()).unwrap_err();
        let f = err.failure().unwrap();
        assert_eq!(f.kind, FailureKind::Panic);
        assert_eq!(f.message(), Some("kaboom"));
        assert!(p.dead());
    }

    #[test]
    fn test_result_goes_to_living_ancestor() {
        // child's parent finishes first; the child's result skips it
        let child_slot: Arc<SpinLock<Option<Greenlet>>> = Arc::new(SpinLock::new(None));
        let slot = child_slot.clone();
        let mid = Greenlet::new(
            move |_| {
                let child = Greenlet::new(
                    |_| {
                        parent_of_current().switch(Args::new())?;
                        Ok(Args::one("from child"))
                    },
                    None,
                )?;
                child.switch(Args::new())?;
                slot.replace(Some(child));
                Ok(Args::one("from mid"))
            },
            None,
        )
        .unwrap();

        let r = mid.switch(Args::new()).unwrap();
        assert_eq!(r.into_one::<&str>(), Some("from mid"));
        assert!(mid.dead());

        let child = child_slot.replace(None).unwrap();
        assert_eq!(child.parent(), Some(mid.clone()));
        let r = child.switch(Args::new()).unwrap();
        assert_eq!(r.into_one::<&str>(), Some("from child"));
        assert!(Greenlet::current().unwrap().is_main());
    }

    #[test]
    fn test_dead_target_resumes_suspended_parent() {
        let slot: Arc<SpinLock<Option<Greenlet>>> = Arc::new(SpinLock::new(None));
        let s = slot.clone();
        let mid = Greenlet::new(
            move |_| {
                let child = Greenlet::new(|_| Ok(Args::new()), None)?;
                child.switch(Args::new())?;
                s.replace(Some(child));
                let got = parent_of_current().switch(Args::new())?;
                Ok(Args::one(format!("mid got {:?}", got.into_one::<i32>())))
            },
            None,
        )
        .unwrap();

        mid.switch(Args::new()).unwrap();
        assert!(mid.is_alive());
        let child = slot.replace(None).unwrap();
        assert!(child.dead());
        assert_eq!(child.parent(), Some(mid.clone()));

        // the dead child hands the value to mid, which is not the caller
        let r = child.switch(Args::one(9i32)).unwrap();
        assert_eq!(r.into_one::<String>().as_deref(), Some("mid got Some(9)"));
        assert!(mid.dead());
        assert!(Greenlet::current().unwrap().is_main());
    }

    #[test]
    fn test_dead_target_skips_exited_ancestors() {
        // leaf -> mid -> top: leaf and mid finish, top stays suspended
        let slot: Arc<SpinLock<Option<Greenlet>>> = Arc::new(SpinLock::new(None));
        let s = slot.clone();
        let top = Greenlet::new(
            move |_| {
                let mid = Greenlet::new(
                    move |_| {
                        let leaf = Greenlet::new(|_| Ok(Args::new()), None)?;
                        leaf.switch(Args::new())?;
                        s.replace(Some(leaf));
                        Ok(Args::new())
                    },
                    None,
                )?;
                mid.switch(Args::new())?;
                drop(mid);
                let n = parent_of_current().switch(Args::new())?.into_one::<i32>();
                Ok(Args::one(n.unwrap_or(0) + 1))
            },
            None,
        )
        .unwrap();

        top.switch(Args::new()).unwrap();
        let leaf = slot.replace(None).unwrap();
        let mid = leaf.parent().unwrap();
        assert!(leaf.dead());
        assert!(mid.dead());
        assert!(top.is_alive());
        assert_eq!(mid.parent(), Some(top.clone()));

        let r = leaf.switch(Args::one(11i32)).unwrap();
        assert_eq!(r.into_one::<i32>(), Some(12));
        assert!(top.dead());
    }

    #[test]
    fn test_tealet_exit_is_not_a_panic() {
        let g = Greenlet::new(
            |_| {
                let _ = Tealet::exit(Exit::main(5u8));
                Ok(Args::one(0u8))
            },
            None,
        )
        .unwrap();
        let r = g.switch(Args::new()).unwrap();
        assert_eq!(r.into_one::<u8>(), Some(5));
        assert!(g.dead());
    }

    #[test]
    fn test_switch_to_dead_redirects_to_parent() {
        let g = Greenlet::new(|a| Ok(a), None).unwrap();
        g.switch(Args::new()).unwrap();
        assert!(g.dead());
        // parent is main, the caller: the switch comes straight back
        let r = g.switch(Args::one(5u8)).unwrap();
        assert_eq!(r.into_one::<u8>(), Some(5));

        let idle = Greenlet::without_run(None).unwrap();
        let r = idle.switch(Args::one(6u8)).unwrap();
        assert_eq!(r.into_one::<u8>(), Some(6));
    }

    fn suspended_with_exit_counter(counter: &Arc<AtomicUsize>) -> Greenlet {
        let c = counter.clone();
        let g = Greenlet::new(
            move |_| {
                let r = parent_of_current().switch(Args::new());
                if matches!(&r, Err(e) if e.is_exit()) {
                    c.fetch_add(1, Ordering::SeqCst);
                }
                r.map(Reply::into_args)
            },
            None,
        )
        .unwrap();
        g.switch(Args::new()).unwrap();
        assert!(g.is_alive());
        g
    }

    #[test]
    fn test_drop_kills_exactly_once() {
        let exits = Arc::new(AtomicUsize::new(0));
        let g = suspended_with_exit_counter(&exits);
        let t = g.tealet().clone();
        let g2 = g.clone();

        drop(g);
        assert_eq!(exits.load(Ordering::SeqCst), 0);
        drop(g2);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert!(t.state().is_terminated());

        let g = suspended_with_exit_counter(&exits);
        assert_eq!(g.kill(), Teardown::Completed);
        assert_eq!(g.kill(), Teardown::Inactive);
        drop(g);
        assert_eq!(exits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_kill_current_is_illegal() {
        let g = Greenlet::new(
            |_| {
                let me = Greenlet::current()?;
                Ok(Args::one(me.kill()))
            },
            None,
        )
        .unwrap();
        let r = g.switch(Args::new()).unwrap();
        assert_eq!(r.into_one::<Teardown>(), Some(Teardown::Illegal));

        let unstarted = Greenlet::new(|a| Ok(a), None).unwrap();
        assert_eq!(unstarted.kill(), Teardown::Inactive);
        assert_eq!(Greenlet::current().unwrap().kill(), Teardown::Illegal);
    }

    #[test]
    fn test_foreign_drop_is_deferred_until_housekeeping() {
        let exits = Arc::new(AtomicUsize::new(0));
        let g = suspended_with_exit_counter(&exits);
        let t = g.tealet().clone();

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let err = g.switch(Args::new()).unwrap_err();
            assert!(matches!(err, GreenletError::Tealet(TealetError::CrossThread { .. })));
            tx.send(g.kill()).unwrap();
            drop(g);
        })
        .join()
        .unwrap();

        assert_eq!(rx.recv().unwrap(), Teardown::Deferred);
        assert_eq!(exits.load(Ordering::SeqCst), 0);
        assert!(t.state().is_active());

        // creating any greenlet on this thread drains the queue
        let _other = Greenlet::new(|a| Ok(a), None).unwrap();
        assert_eq!(exits.load(Ordering::SeqCst), 1);
        assert!(t.state().is_terminated());
    }

    #[test]
    fn test_greenlet_outliving_its_thread_is_abandoned() {
        let exits = Arc::new(AtomicUsize::new(0));
        let e = exits.clone();
        let g = thread::spawn(move || suspended_with_exit_counter(&e))
            .join()
            .unwrap();

        assert!(g.is_alive());
        let main = g.parent().unwrap();
        assert!(main.is_main());
        assert!(main.inner.thread_exited.load(Ordering::Acquire));

        assert_eq!(g.kill(), Teardown::Abandoned);
        assert_eq!(main.inner.garbage.as_ref().map(SegQueue::len), Some(0));
        assert_eq!(exits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_foreign_tealet_has_no_greenlet() {
        let t = Tealet::new();
        let out = t
            .run(
                |_, _| {
                    let foreign = matches!(
                        Greenlet::current(),
                        Err(GreenletError::Tealet(TealetError::Foreign))
                    );
                    Exit::main(foreign && Greenlet::try_current().is_none())
                },
                Box::new(()),
            )
            .unwrap();
        assert!(*out.downcast::<bool>().unwrap());
    }

    #[test]
    fn test_set_parent_rejects_cycles() {
        let a = Greenlet::new(|x| Ok(x), None).unwrap();
        let b = Greenlet::new(|x| Ok(x), Some(&a)).unwrap();
        assert_eq!(b.parent(), Some(a.clone()));

        assert!(matches!(a.set_parent(&b), Err(GreenletError::CyclicParent)));
        assert!(matches!(a.set_parent(&a), Err(GreenletError::CyclicParent)));
        let main = Greenlet::current().unwrap();
        assert!(matches!(main.set_parent(&a), Err(GreenletError::CyclicParent)));

        let c = Greenlet::new(|x| Ok(x), None).unwrap();
        b.set_parent(&c).unwrap();
        assert_eq!(b.parent(), Some(c));
    }

    #[test]
    fn test_frame_of_suspended_greenlet() {
        let main = Greenlet::current().unwrap();
        let here = main.frame().unwrap();
        assert_eq!(here.location.file(), file!());

        let g = Greenlet::new(
            |_| {
                parent_of_current().switch(Args::new())?;
                Ok(Args::new())
            },
            None,
        )
        .unwrap();
        assert!(g.frame().is_none());
        g.switch(Args::new()).unwrap();

        let f = g.frame().unwrap();
        assert_eq!(f.location.file(), file!());
        assert!(f.location.line() < here.location.line() + 20);
        g.switch(Args::new()).unwrap();
        assert!(g.frame().is_none());
    }
}
