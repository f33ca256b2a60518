use crate::enlist::hasher::HashConfig;
use clap::{Arg, ArgMatches, Command};

pub const ARG_HASH_MEMORY_KIB: &str = "hash-memory-kib";
pub const ARG_HASH_ITERATIONS: &str = "hash-iterations";
pub const ARG_HASH_PARALLELISM: &str = "hash-parallelism";

// Argon2 recommended parameters, see `HashConfig::default`.
const DEFAULT_MEMORY_KIB: &str = "19456";
const DEFAULT_ITERATIONS: &str = "2";
const DEFAULT_PARALLELISM: &str = "1";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_HASH_MEMORY_KIB)
                .long(ARG_HASH_MEMORY_KIB)
                .help("Argon2 memory cost in KiB")
                .env("ENLIST_HASH_MEMORY_KIB")
                .default_value(DEFAULT_MEMORY_KIB)
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_HASH_ITERATIONS)
                .long(ARG_HASH_ITERATIONS)
                .help("Argon2 time cost (passes)")
                .env("ENLIST_HASH_ITERATIONS")
                .default_value(DEFAULT_ITERATIONS)
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_HASH_PARALLELISM)
                .long(ARG_HASH_PARALLELISM)
                .help("Argon2 parallelism (lanes)")
                .env("ENLIST_HASH_PARALLELISM")
                .default_value(DEFAULT_PARALLELISM)
                .value_parser(clap::value_parser!(u32)),
        )
}

/// Parse the work factor; out-of-range values are rejected later by the hasher.
#[must_use]
pub fn parse(matches: &ArgMatches) -> HashConfig {
    let mut config = HashConfig::default();

    if let Some(memory_kib) = matches.get_one::<u32>(ARG_HASH_MEMORY_KIB) {
        config = config.with_memory_kib(*memory_kib);
    }
    if let Some(iterations) = matches.get_one::<u32>(ARG_HASH_ITERATIONS) {
        config = config.with_iterations(*iterations);
    }
    if let Some(parallelism) = matches.get_one::<u32>(ARG_HASH_PARALLELISM) {
        config = config.with_parallelism(*parallelism);
    }

    config
}
