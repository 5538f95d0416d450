//! Depot, a resolver for build artifacts spread over several repositories.
//!
//! The binary is a thin shell over the [`artifact`] crate: it loads the
//! [`depot_config::CONFIG`], builds a repository reflection from a repository
//! configuration file and hands the parsed command line to one of the
//! subcommands in [`cli`].

#![warn(missing_docs)]

pub mod cli;
