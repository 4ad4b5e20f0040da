//! Stochastic tealet switching
//!
//! Every tealet (Main included) runs the same recursive worker. At each step
//! it randomly returns, descends, switches to another tealet, spawns a new
//! one at its current depth, or leaves with [`Tealet::exit`] once the pool
//! is full. When the operation target is reached everything unwinds and
//! exits back to Main.
//!
//! The `stress` binary and this crate's tests drive the same [`run`].

use std::cell::RefCell;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tealet::{kdebug, kerror, Exit, Tealet, Value};

/// Pool capacity, Main included
pub const MAX_TEALETS: usize = 127;
pub const DEFAULT_OPERATIONS: usize = 10_000;
pub const DEFAULT_MAX_DEPTH: usize = 20;
pub const DEFAULT_SEED: u64 = 42;
const REPORT_INTERVAL: usize = 1_000;

/// Parameters of one stress run
#[derive(Debug, Clone, Copy)]
pub struct StressConfig {
    pub operations: usize,
    pub max_depth: usize,
    pub seed: u64,
    pub verbose: bool,
}

impl Default for StressConfig {
    fn default() -> Self {
        StressConfig {
            operations: DEFAULT_OPERATIONS,
            max_depth: DEFAULT_MAX_DEPTH,
            seed: DEFAULT_SEED,
            verbose: false,
        }
    }
}

/// What a run did and what it left behind
#[derive(Debug, Clone, Default)]
pub struct Report {
    pub operations: usize,
    pub spawned: usize,
    /// Spawns issued from inside a worker tealet rather than Main
    pub nested_spawns: usize,
    /// Workers that left through `Tealet::exit` to another worker
    pub left: usize,
    pub switches: usize,
    /// Switches between two worker tealets
    pub peer_switches: usize,
    pub deepest: usize,
    pub baseline_active: usize,
    pub active: usize,
    pub ended_on_main: bool,
    pub run_time: Duration,
    pub total_time: Duration,
}

impl Report {
    /// Everything exited and control is back on Main
    pub fn drained(&self) -> bool {
        self.active == self.baseline_active && self.ended_on_main
    }
}

struct Pool {
    slots: Vec<Tealet>,
    rng: StdRng,
    target: usize,
    max_depth: usize,
    shutdown: bool,
    verbose: bool,
    report: Report,
}

impl Pool {
    /// A pool member other than the Current tealet
    fn pick(&mut self) -> Option<Tealet> {
        let me = Tealet::current();
        for _ in 0..10 {
            let idx = self.rng.gen_range(0..self.slots.len());
            if self.slots[idx] != me {
                return Some(self.slots[idx].clone());
            }
        }
        None
    }

    fn remove(&mut self, t: &Tealet) {
        if let Some(idx) = self.slots.iter().position(|s| s == t) {
            self.slots.swap_remove(idx);
        }
    }

    fn progress(&self) {
        let stats = Tealet::stats();
        println!("\n=== Progress ===");
        println!("Operations:       {}", self.report.operations);
        println!("Tealets in pool:  {}", self.slots.len());
        println!("Active tealets:   {}", stats.active);
        println!("Created tealets:  {}", stats.total);
    }
}

thread_local! {
    static POOL: RefCell<Option<Pool>> = const { RefCell::new(None) };
}

/// Run `f` against the pool; never switches while borrowed
fn with_pool<R>(f: impl FnOnce(&mut Pool) -> R) -> R {
    POOL.with(|p| {
        let mut guard = p.borrow_mut();
        match guard.as_mut() {
            Some(pool) => f(pool),
            None => {
                kerror!("stress pool used before initialization");
                std::process::exit(2);
            }
        }
    })
}

enum Decision {
    Unwind,
    Return,
    Descend,
    Switch(Option<Tealet>),
    Spawn,
    Leave,
    Retry,
}

fn worker(depth: usize) {
    let mut scratch = [0u8; 256];
    for (i, b) in scratch.iter_mut().enumerate() {
        *b = depth.wrapping_add(i) as u8;
    }
    std::hint::black_box(&mut scratch);

    with_pool(|p| {
        p.report.operations += 1;
        p.report.deepest = p.report.deepest.max(depth);
        if p.verbose && p.report.operations % REPORT_INTERVAL == 0 {
            p.progress();
        }
        if p.report.operations >= p.target && !p.shutdown {
            kdebug!("target reached at depth {} in tealet {}", depth, Tealet::current().id());
            p.shutdown = true;
        }
    });

    loop {
        let is_main = Tealet::current().is_main();
        let decision = with_pool(|p| {
            if p.shutdown {
                return Decision::Unwind;
            }
            let full = p.slots.len() >= MAX_TEALETS;
            match p.rng.gen_range(0..5) {
                0 if depth > 0 => Decision::Return,
                1 if depth < p.max_depth => Decision::Descend,
                2 if p.slots.len() > 1 => Decision::Switch(p.pick()),
                3 if !full => Decision::Spawn,
                4 if !is_main && full => Decision::Leave,
                _ => Decision::Retry,
            }
        });

        match decision {
            Decision::Unwind | Decision::Return => return,
            Decision::Descend => worker(depth + 1),
            Decision::Switch(Some(target)) => {
                with_pool(|p| {
                    p.report.switches += 1;
                    if !is_main && !target.is_main() {
                        p.report.peer_switches += 1;
                    }
                });
                if let Err(e) = target.switch(Box::new(())) {
                    kdebug!("switch to {} refused: {}", target.id(), e);
                }
            }
            Decision::Spawn => {
                with_pool(|p| {
                    if !is_main {
                        p.report.nested_spawns += 1;
                    }
                });
                let t = Tealet::new();
                if let Err(e) = t.run(worker_entry, Box::new(depth)) {
                    kerror!("spawn failed: {}", e);
                }
            }
            Decision::Leave => leave(depth),
            Decision::Switch(None) | Decision::Retry => {}
        }
    }
}

/// Drop out of the pool and hand control to a random member
fn leave(depth: usize) {
    let me = Tealet::current();
    let exit = with_pool(|p| {
        p.remove(&me);
        match p.pick() {
            Some(target) => {
                p.report.left += 1;
                Exit::to(target, ())
            }
            None => Exit::main(()),
        }
    });
    kdebug!("tealet {} leaving from depth {}", me.id(), depth);
    drop(me);

    if let Err(e) = Tealet::exit(exit) {
        kerror!("leave failed: {}", e);
    }
}

fn worker_entry(me: Tealet, _arg: Value) -> Exit {
    let n = with_pool(|p| {
        p.slots.push(me.clone());
        p.report.spawned += 1;
        p.report.spawned
    });
    kdebug!("worker #{} is tealet {}", n, me.id());
    drop(me);

    worker(0);

    let me = Tealet::current();
    with_pool(|p| p.remove(&me));
    Exit::main(())
}

/// Run the scenario on the calling thread, which must be on its Main tealet
pub fn run(cfg: &StressConfig) -> Report {
    let baseline = Tealet::stats();
    POOL.with(|p| {
        *p.borrow_mut() = Some(Pool {
            slots: vec![Tealet::main()],
            rng: StdRng::seed_from_u64(cfg.seed),
            target: cfg.operations,
            max_depth: cfg.max_depth,
            shutdown: false,
            verbose: cfg.verbose,
            report: Report::default(),
        });
    });

    let start = Instant::now();
    worker(0);
    let run_time = start.elapsed();

    // let every suspended worker see the shutdown and exit
    let rest: Vec<Tealet> = with_pool(|p| p.slots.clone());
    for t in &rest {
        if !t.is_main() && t.state().is_active() {
            if let Err(e) = t.switch(Box::new(())) {
                kerror!("unwinding tealet {} failed: {}", t.id(), e);
            }
        }
    }
    drop(rest);

    let pool = POOL.with(|p| p.borrow_mut().take());
    let mut report = pool.map(|p| p.report).unwrap_or_default();
    report.run_time = run_time;
    report.total_time = start.elapsed();
    report.baseline_active = baseline.active;
    report.active = Tealet::stats().active;
    report.ended_on_main = Tealet::current().is_main();
    report
}
