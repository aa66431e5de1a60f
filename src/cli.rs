//! Command-line arguments.

use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};
use subject_browser::data::chain::DEFAULT_MAX_MILES;

#[derive(Parser)]
#[command(
    name = "subject-browser",
    version,
    about = "Filter a hearing-study subject roster and recommend hearing-aid fittings"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Roster to load (.csv, .json or .parquet).
    #[arg(
        long,
        short = 'i',
        env = "SUBJECT_BROWSER_INPUT",
        value_name = "PATH",
        global = true
    )]
    pub input: Option<PathBuf>,

    /// Treat the input as a table exported by this tool: no header repair,
    /// no age derivation.
    #[arg(long, global = true)]
    pub filtered_export: bool,

    /// More logging (-v for debug, -vv for trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Errors only.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Command {
    /// Scrub the roster, apply a filter list and export the result.
    Filter(FilterArgs),

    /// Thresholds and fitting recommendation for one subject.
    Subject(SubjectArgs),

    /// Fitting recommendation for every subject.
    Recommend,

    /// Distinct values of one column.
    Values(ValuesArgs),
}

#[derive(Args)]
pub struct FilterArgs {
    /// Filter list (`column,operator,value` CSV), applied after the scrub.
    #[arg(long, value_name = "PATH")]
    pub spec: Option<PathBuf>,

    /// Keep subjects whose air-conduction thresholds fall in a window at
    /// one frequency, both ears. Repeatable.
    #[arg(long = "ac-window", value_name = "FREQ:LOW:HIGH", value_parser = parse_ac_window)]
    pub ac_window: Vec<(u32, (i64, i64))>,

    /// Distance cap of the scrub preset.
    #[arg(
        long,
        env = "SUBJECT_BROWSER_MAX_MILES",
        default_value_t = DEFAULT_MAX_MILES,
        value_name = "MILES"
    )]
    pub max_miles: i64,

    /// Skip the scrub preset.
    #[arg(long)]
    pub no_scrub: bool,

    /// Where to write the filtered table (default: filtered_db_<timestamp>.csv).
    #[arg(long, short = 'o', value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Print the trace only; write nothing.
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct SubjectArgs {
    #[arg(long)]
    pub id: i64,

    /// Print JSON instead of text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args)]
pub struct ValuesArgs {
    #[arg(long)]
    pub column: String,
}

fn parse_ac_window(raw: &str) -> Result<(u32, (i64, i64)), String> {
    let parts: Vec<&str> = raw.split(':').map(str::trim).collect();
    let [frequency, lower, upper] = parts.as_slice() else {
        return Err(format!("expected FREQ:LOW:HIGH, got '{raw}'"));
    };
    let frequency = frequency
        .parse()
        .map_err(|_| format!("bad frequency '{frequency}'"))?;
    let lower: i64 = lower.parse().map_err(|_| format!("bad lower bound '{lower}'"))?;
    let upper: i64 = upper.parse().map_err(|_| format!("bad upper bound '{upper}'"))?;
    if lower > upper {
        return Err(format!("lower bound {lower} is above upper bound {upper}"));
    }
    Ok((frequency, (lower, upper)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ac_window_argument() {
        assert_eq!(parse_ac_window("2000:20:60"), Ok((2000, (20, 60))));
        assert!(parse_ac_window("2000:60:20").is_err());
        assert!(parse_ac_window("2000:20").is_err());
        assert!(parse_ac_window("x:1:2").is_err());
    }

    #[test]
    fn parses_filter_command() {
        let cli = Cli::try_parse_from([
            "subject-browser",
            "-i",
            "roster.csv",
            "filter",
            "--max-miles",
            "40",
            "--ac-window",
            "500:10:50",
        ])
        .unwrap();
        let Command::Filter(args) = cli.command else {
            panic!("expected filter");
        };
        assert_eq!(args.max_miles, 40);
        assert_eq!(args.ac_window, vec![(500, (10, 50))]);
        assert!(!args.no_scrub);
    }
}
