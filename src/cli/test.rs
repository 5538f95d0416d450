use clap::Parser;
use tracing_subscriber::filter::LevelFilter;

use super::logging::level_of;
use super::{Args, LogArgs};

fn parse(args: &[&str]) -> Result<Args, clap::Error> {
    Args::try_parse_from(std::iter::once("depot").chain(args.iter().copied()))
}

#[test]
fn subcommands_parse_their_arguments() -> anyhow::Result<()> {
    parse(&[
        "resolve",
        "com.acme:app#[1.0,2.0)",
        "--scope",
        "runtime",
        "--strategy",
        "nearest-path",
        "--parts",
        "jar,sources:jar",
        "--strict",
        "--json",
        "-r",
        "repositories.toml",
    ])?;
    parse(&["merge", "base.toml", "team.toml", "--development", "-o", "out.toml"])?;
    parse(&["setup", "com.acme:views#1.0", "-o", "setup"])?;
    Ok(())
}

#[test]
fn invalid_values_are_rejected() {
    assert!(parse(&["resolve", "com.acme:app#1.0", "--scope", "system"]).is_err());
    assert!(parse(&["resolve", "com.acme:app#1.0", "--strategy", "newest"]).is_err());
    assert!(parse(&["resolve", "not a coordinate"]).is_err());
    assert!(parse(&["setup", "com.acme:views#1.0"]).is_err());
    assert!(parse(&["merge"]).is_err());
}

#[test]
fn verbosity_flags_pick_the_level() -> anyhow::Result<()> {
    let flags = |args: &[&str]| -> anyhow::Result<LogArgs> { Ok(parse(args)?.log) };

    let plain = flags(&["merge", "a.toml"])?;
    assert_eq!(level_of(plain, None), LevelFilter::INFO);
    assert_eq!(level_of(plain, Some("warn")), LevelFilter::WARN);
    // directives are left to the env filter
    assert_eq!(level_of(plain, Some("artifact=trace")), LevelFilter::INFO);

    let verbose = flags(&["merge", "a.toml", "-vv"])?;
    assert_eq!(level_of(verbose, None), LevelFilter::TRACE);

    let quiet = flags(&["-v", "merge", "a.toml", "-qq"])?;
    assert_eq!(level_of(quiet, Some("trace")), LevelFilter::ERROR);
    Ok(())
}
