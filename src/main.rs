mod cli;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use log::LevelFilter;
use subject_browser::audiology::{Side, recommend_all};
use subject_browser::data::chain::FilterSpec;
use subject_browser::data::export::{default_export_name, write_csv};
use subject_browser::{ConfigError, LoadMode, Session};

use crate::cli::{Cli, Command, FilterArgs, SubjectArgs, ValuesArgs};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    match run(cli) {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins over the flags when set.
fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let input = cli
        .input
        .context("no roster given; pass --input or set SUBJECT_BROWSER_INPUT")?;
    let mode = if cli.filtered_export {
        LoadMode::FilteredExport
    } else {
        LoadMode::FullExport
    };

    let mut session = Session::default();
    session.load(&input, mode)?;

    match cli.command {
        Command::Filter(args) => run_filter(&mut session, args),
        Command::Subject(args) => run_subject(&session, &args),
        Command::Recommend => run_recommend(&session),
        Command::Values(args) => run_values(&session, &args),
    }
}

fn run_filter(session: &mut Session, args: FilterArgs) -> Result<ExitCode> {
    let mut complete = true;

    if !args.no_scrub {
        let report = session.apply_spec(&FilterSpec::scrub(args.max_miles))?;
        println!("Scrub\n{report}\n");
        complete &= report.is_complete();
    }

    if let Some(path) = &args.spec {
        session.set_slots(&FilterSpec::load(path)?)?;
        match session.apply_filters() {
            Ok(report) => {
                println!("Filters\n{report}\n");
                complete &= report.is_complete();
            }
            Err(ConfigError::NoFiltersSet) => log::warn!("{} holds no filters", path.display()),
            Err(e) => return Err(e).with_context(|| format!("filter list {}", path.display())),
        }
    }

    if !args.ac_window.is_empty() {
        let limits: BTreeMap<u32, (i64, i64)> = args.ac_window.into_iter().collect();
        let report = session.apply_spec(&FilterSpec::ac_threshold_window(&limits))?;
        println!("AC window\n{report}\n");
        complete &= report.is_complete();
    }

    if !args.dry_run {
        let output = args
            .output
            .unwrap_or_else(|| PathBuf::from(default_export_name(Local::now().naive_local())));
        if let Some(table) = &session.table {
            write_csv(table, &output)?;
            println!(
                "Wrote {} of {} candidates to {}",
                table.len(),
                session.source_rows,
                output.display()
            );
        }
    }

    Ok(if complete { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn run_subject(session: &Session, args: &SubjectArgs) -> Result<ExitCode> {
    let view = session.select_subject(args.id)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(ExitCode::SUCCESS);
    }

    println!("Subject {}", args.id);
    for map in [&view.thresholds.ac, &view.thresholds.bc] {
        for side in Side::ALL {
            let points: Vec<String> = map
                .series(side)
                .iter()
                .map(|p| format!("{}:{} ({})", p.frequency, p.threshold, p.degree))
                .collect();
            println!(
                "  {side:<5} {}  {}",
                map.conduction.abbreviation(),
                points.join("  ")
            );
        }
    }
    for side in Side::ALL {
        let rec = view.recommendation.side(side);
        let matrix = rec.matrix.map_or("-", |m| m.label());
        print!("  {side:<5} matrix {matrix}  coupling {}  vent {}", rec.coupling, rec.vent);
        match &rec.missing {
            Some(missing) => println!("  ({missing})"),
            None => println!(),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_recommend(session: &Session) -> Result<ExitCode> {
    let Some(table) = &session.table else {
        return Ok(ExitCode::SUCCESS);
    };
    let mut failures = 0;
    println!("Subject Id\tRight\tLeft");
    for entry in recommend_all(table) {
        match entry.outcome {
            Ok(rec) => {
                let cell = |side: Side| {
                    let r = rec.side(side);
                    format!("{}/{}/{}", r.matrix.map_or("-", |m| m.label()), r.coupling, r.vent)
                };
                println!("{}\t{}\t{}", entry.subject_id, cell(Side::Right), cell(Side::Left));
            }
            Err(error) => {
                failures += 1;
                log::warn!("subject {}: {error}", entry.subject_id);
            }
        }
    }
    Ok(if failures == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn run_values(session: &Session, args: &ValuesArgs) -> Result<ExitCode> {
    for value in session.unique_values(&args.column)? {
        println!("{value}");
    }
    Ok(ExitCode::SUCCESS)
}
