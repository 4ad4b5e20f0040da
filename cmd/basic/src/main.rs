//! Basic tealet example
//!
//! Walks through raw tealets (run, switch, exit) and then the greenlet layer
//! (lazy start, parent hand-off, throw, kill on drop).
//!
//! # Environment Variables
//!
//! - `TEALET_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `TEALET_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use tealet::{Args, Exit, FailureKind, Greenlet, GreenletError, Tealet, Value};
use tealet::{kinfo, kdebug};

// TEALET_LOG_LEVEL=debug TEALET_FLUSH_EPRINT=1 cargo run -p tealet-basic
fn main() {
    println!("=== Tealet Basic Example ===\n");

    raw_tealets();
    greenlets();

    let stats = tealet::stats();
    println!("\nLive tealets: {} (created {})", stats.active, stats.total);
    println!("\n=== Example Complete ===");
}

fn int(v: Value) -> i64 {
    v.downcast::<i64>().map(|b| *b).unwrap_or(-1)
}

fn raw_tealets() {
    println!("--- tealets ---");

    let counter = Tealet::new();
    let main = Tealet::main();
    let reply = counter
        .run(
            move |me, arg| {
                kdebug!("[tealet {}] started with {}", me.id(), int_ref(&arg));
                drop(me);
                let mut n = int(arg);
                for _ in 0..3 {
                    n = match main.switch(Box::new(n + 1)) {
                        Ok(v) => int(v),
                        Err(_) => break,
                    };
                }
                drop(main);
                Exit::main(n * 100)
            },
            Box::new(0i64),
        )
        .map(int);
    println!("run    -> {:?}", reply);

    for step in [10i64, 20, 30] {
        let reply = counter.switch(Box::new(step)).map(int);
        println!("switch({}) -> {:?}  [{}]", step, reply, counter.state());
    }

    let err = counter.switch(Box::new(0i64)).unwrap_err();
    println!("switch on finished tealet: {}", err);
}

fn int_ref(v: &Value) -> i64 {
    v.downcast_ref::<i64>().copied().unwrap_or(-1)
}

fn greenlets() {
    println!("\n--- greenlets ---");

    let main = match Greenlet::current() {
        Ok(g) => g,
        Err(e) => {
            println!("no main greenlet: {}", e);
            return;
        }
    };

    let producer = Greenlet::new(
        |_| {
            let parent = Greenlet::current()?.parent().ok_or(GreenletError::CyclicParent)?;
            for word in ["alpha", "beta", "gamma"] {
                kdebug!("[producer] yielding {}", word);
                parent.switch(Args::one(word))?;
            }
            Ok(Args::new().kwarg("done", true))
        },
        Some(&main),
    );
    let producer = match producer {
        Ok(g) => g,
        Err(e) => {
            println!("cannot create greenlet: {}", e);
            return;
        }
    };

    while !producer.dead() {
        match producer.switch(Args::new()) {
            Ok(reply) => println!("producer -> {:?}", reply),
            Err(e) => {
                println!("producer failed: {}", e);
                break;
            }
        }
    }

    let listener = Greenlet::new(
        |_| {
            let parent = Greenlet::current()?.parent().ok_or(GreenletError::CyclicParent)?;
            match parent.switch(Args::new()) {
                Err(GreenletError::Raised(f)) => Ok(Args::one(format!("caught {}", f.kind))),
                other => other.map(|r| r.into_args()),
            }
        },
        None,
    );
    if let Ok(listener) = listener {
        let _ = listener.switch(Args::new());
        let reply = listener.throw(Some(FailureKind::Custom("Interrupt".into())), None, None);
        println!("throw -> {:?}", reply.map(|r| r.into_one::<String>()));
    }

    let sleeper = Greenlet::new(
        |_| {
            let parent = Greenlet::current()?.parent().ok_or(GreenletError::CyclicParent)?;
            let r = parent.switch(Args::new());
            if matches!(&r, Err(e) if e.is_exit()) {
                kinfo!("[sleeper] killed while suspended");
            }
            r.map(|r| r.into_args())
        },
        None,
    );
    if let Ok(sleeper) = sleeper {
        let _ = sleeper.switch(Args::new());
        println!("sleeper alive: {}", sleeper.is_alive());
        let t = sleeper.tealet().clone();
        drop(sleeper);
        println!("sleeper after drop: {}", t.state());
    }
}
