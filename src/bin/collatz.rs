//! Collatz step counts for 1..=N, a plain CPU baseline

use clap::Parser;
use std::io::{BufWriter, Write};

#[derive(Parser, Debug)]
#[command(name = "collatz", version)]
struct Cli {
    /// Largest starting value.
    #[arg(default_value_t = 1_000_000)]
    limit: u64,
}

/// Steps until `n` reaches 1
fn steps(mut n: u64) -> u32 {
    let mut steps = 0;
    while n > 1 {
        n = if n % 2 == 0 { n / 2 } else { 3 * n + 1 };
        steps += 1;
    }
    steps
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let out: Vec<u32> = (1..=cli.limit).map(steps).collect();

    let mut stdout = BufWriter::new(std::io::stdout().lock());
    for count in out {
        write!(stdout, "{} ", count)?;
    }
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}
