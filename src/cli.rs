//! CLI argument parsing

use clap::{Parser, Subcommand};
use std::time::Duration;

/// Parse a duration such as `2s`, `500ms`, `1m` or a bare number of seconds
fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (num, unit) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => s.split_at(idx),
        None => (s, "s"),
    };
    let value: f64 = num
        .parse()
        .map_err(|_| format!("Invalid duration: '{}'", s))?;
    let secs = match unit {
        "ms" => value / 1000.0,
        "s" => value,
        "m" => value * 60.0,
        "h" => value * 3600.0,
        _ => return Err(format!("Invalid duration unit '{}' (use ms, s, m or h)", unit)),
    };
    Duration::try_from_secs_f64(secs).map_err(|e| format!("Invalid duration '{}': {}", s, e))
}

/// Parse a bit count, accepting only positive values
fn parse_bits(s: &str) -> Result<usize, String> {
    match s.parse::<usize>() {
        Ok(0) => Err("bit count must be positive".to_string()),
        Ok(n) => Ok(n),
        Err(e) => Err(format!("Invalid number: {}", e)),
    }
}

/// Generate dynamic help text for the device argument
fn device_help() -> String {
    format!(
        "Device to use, e.g. auto, truerng:mode=normal, bitbabbler:bitrate=2500000 [available: {}]",
        rngcap_acquire::source_names_short()
    )
}

#[derive(Parser)]
#[command(name = "rngcap")]
#[command(author, version, about = "Hardware random number generator capture", long_about = None)]
pub struct Cli {
    /// Verbosity level (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List connected devices
    List,

    /// Check whether a supported device is connected
    Detect,

    /// Read one sample and print it as hex
    Read {
        /// Device to use
        #[arg(short, long, default_value = "auto", help = device_help())]
        device: String,

        /// Number of bits to read
        #[arg(short, long, default_value = "1024", value_parser = parse_bits)]
        bits: usize,

        /// TrueRNG capture mode (overrides mode= in the device string)
        #[arg(short, long)]
        mode: Option<String>,
    },

    /// Read samples at a fixed interval until interrupted
    Collect {
        /// Device to use
        #[arg(short, long, default_value = "auto", help = device_help())]
        device: String,

        /// Number of bits per sample
        #[arg(short, long, default_value = "1024", value_parser = parse_bits)]
        bits: usize,

        /// Interval between samples (e.g. 2s, 500ms)
        #[arg(short, long, default_value = "1s", value_parser = parse_duration)]
        interval: Duration,

        /// TrueRNG capture mode (overrides mode= in the device string)
        #[arg(short, long)]
        mode: Option<String>,

        /// Keep the device open and reconnect after disconnects
        #[arg(short, long)]
        reconnect: bool,
    },

    /// List supported device families and capture modes
    ListSources,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("2s"), Ok(Duration::from_secs(2)));
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1m"), Ok(Duration::from_secs(60)));
        assert_eq!(parse_duration("3"), Ok(Duration::from_secs(3)));
        assert_eq!(parse_duration("1.5s"), Ok(Duration::from_millis(1500)));
        assert!(parse_duration("soon").is_err());
        assert!(parse_duration("2d").is_err());
    }

    #[test]
    fn test_parse_bits() {
        assert_eq!(parse_bits("2048"), Ok(2048));
        assert!(parse_bits("0").is_err());
        assert!(parse_bits("-1").is_err());
    }

    #[test]
    fn test_collect_args() {
        let cli = Cli::try_parse_from([
            "rngcap",
            "collect",
            "--bits",
            "10",
            "--interval",
            "2s",
            "--reconnect",
            "-d",
            "truerng",
        ])
        .unwrap();
        match cli.command {
            Commands::Collect {
                device,
                bits,
                interval,
                reconnect,
                mode,
            } => {
                assert_eq!(device, "truerng");
                assert_eq!(bits, 10);
                assert_eq!(interval, Duration::from_secs(2));
                assert!(reconnect);
                assert_eq!(mode, None);
            }
            _ => panic!("expected collect"),
        }
    }
}
