//! Logging setup for the CLI: `env_logger` on stderr, with the level taken from the `-v` count.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use log::LevelFilter;

/// Maps the number of `-v` flags to a level filter. Warnings are always shown.
pub fn level_for(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Install the logger. `RUST_LOG` is honored unless `-v` was given. Later calls leave the installed logger
/// in place.
pub fn init(verbosity: u8) {
    let mut builder = env_logger::Builder::from_default_env();

    if verbosity > 0 || std::env::var("RUST_LOG").is_err() {
        builder.filter_level(level_for(verbosity));
    }

    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_should_raise_the_level() {
        assert_eq!(level_for(0), LevelFilter::Warn);
        assert_eq!(level_for(1), LevelFilter::Info);
        assert_eq!(level_for(2), LevelFilter::Debug);
        assert_eq!(level_for(9), LevelFilter::Trace);
    }

    #[test]
    fn init_should_tolerate_repeated_calls() {
        init(1);
        init(3);
        assert!(log::max_level() >= LevelFilter::Warn);
    }
}
