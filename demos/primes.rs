//! Computes primes ten times, either sequentially or on the worker pool.
//!
//! ```text
//! cargo run --example primes -- parallel -j 4
//! cargo run --example primes -- iterative
//! ```

use std::time::Instant;

use bakery::{Build, Config, Context, Resource, Task};
use clap::Parser;

const LIMIT: i64 = 20_000;

fn primes(max: i64) -> Vec<i64> {
    (2..max)
        .filter(|&n| (2..n).take_while(|i| i * i <= n).all(|i| n % i != 0))
        .collect()
}

fn batch(count: usize) -> Vec<Task> {
    (0..count)
        .map(|i| {
            Task::call(format!("primes-{i}"), || {
                Ok(Resource::from(primes(LIMIT)))
            })
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    #[cfg(feature = "logging")]
    bakery::init_logging()?;

    let config = Config::parse();
    let context = Context::new(config.jobs)?;
    let mut build = Build::new(&context, config);

    build.target("parallel").default().parallel(|_| Ok(batch(10)))?;
    build.target("iterative").queue(|_| Ok(batch(10)))?;

    let s = Instant::now();
    let outcome = build.run()?;

    for (name, result) in outcome.results() {
        let runs = result.as_list().map_or(0, <[Resource]>::len);
        println!(
            "{name}: {runs} runs on {} threads in {}ms",
            context.pool().threads(),
            s.elapsed().as_millis()
        );
    }

    std::process::exit(outcome.exit_code());
}
