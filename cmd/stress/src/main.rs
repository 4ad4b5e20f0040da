//! Stress test - stochastic tealet switching
//!
//! ```text
//! stress [-n OPS] [-d DEPTH] [-s SEED] [-v]
//! ```
//!
//! `TEALET_STRESS_OPS` and `TEALET_STRESS_DEPTH` set the defaults.

use tealet::{env_get, kerror};
use tealet_stress::{StressConfig, DEFAULT_MAX_DEPTH, DEFAULT_OPERATIONS, DEFAULT_SEED, MAX_TEALETS};

fn parse_options() -> StressConfig {
    let mut cfg = StressConfig {
        operations: env_get("TEALET_STRESS_OPS", DEFAULT_OPERATIONS),
        max_depth: env_get("TEALET_STRESS_DEPTH", DEFAULT_MAX_DEPTH),
        ..StressConfig::default()
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-n" | "--operations" => {
                if let Some(n) = args.next().and_then(|s| s.parse().ok()) {
                    cfg.operations = n;
                }
            }
            "-d" | "--depth" => {
                if let Some(d) = args.next().and_then(|s| s.parse().ok()) {
                    cfg.max_depth = d;
                }
            }
            "-s" | "--seed" => {
                if let Some(s) = args.next().and_then(|s| s.parse().ok()) {
                    cfg.seed = s;
                }
            }
            "-v" | "--verbose" => cfg.verbose = true,
            "-h" | "--help" => {
                println!("Usage: stress [-n OPS] [-d DEPTH] [-s SEED] [-v]");
                println!("  -n, --operations <num>   Target operations (default: {})", DEFAULT_OPERATIONS);
                println!("  -d, --depth <num>        Max recursion depth (default: {})", DEFAULT_MAX_DEPTH);
                println!("  -s, --seed <num>         RNG seed (default: {})", DEFAULT_SEED);
                println!("  -v, --verbose            Progress reports");
                std::process::exit(0);
            }
            other => println!("ignoring unknown argument {:?}", other),
        }
    }
    cfg
}

fn main() {
    println!("=== Tealet Stress Test ===\n");

    let cfg = parse_options();
    println!("Target operations:   {}", cfg.operations);
    println!("Max recursion depth: {}", cfg.max_depth);
    println!("Pool size:           {}", MAX_TEALETS);

    let report = tealet_stress::run(&cfg);

    println!("\n=== Results ===");
    println!("Operations:       {}", report.operations);
    println!("Deepest call:     {}", report.deepest);
    println!("Tealets spawned:  {} ({} from workers)", report.spawned, report.nested_spawns);
    println!("Left early:       {}", report.left);
    println!("Switches:         {} ({} worker to worker)", report.switches, report.peer_switches);
    println!("Run time:         {:?}", report.run_time);
    println!("Total time:       {:?}", report.total_time);
    println!("Active tealets:   {} (baseline {})", report.active, report.baseline_active);

    if !report.drained() {
        kerror!(
            "tealets leaked: {} still active",
            report.active.saturating_sub(report.baseline_active)
        );
        std::process::exit(1);
    }
    println!("\n=== Stress Test Complete ===");
}
