//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - builds or reloads calibration grids
//! - runs the Bayesian age estimation
//! - prints reports/plots
//! - writes optional exports

use std::path::{Path, PathBuf};

use clap::Parser;

use crate::cli::{Command, EstimateArgs, MakeGridsArgs};
use crate::domain::{EstimatorConfig, RunConfig};
use crate::error::AppError;
use crate::grid::CalibrationGrid;
use crate::io::config::save_config;
use crate::io::grid_file::grid_pair_paths;

pub mod pipeline;

/// Entry point for the `stellar-age` binary.
pub fn run() -> Result<(), AppError> {
    // We want `stellar-age -b 0.65 -r -4.5` to behave like
    // `stellar-age estimate -b 0.65 -r -4.5`.
    //
    // Clap requires a subcommand name, so we do a small, explicit rewrite of the
    // argv list before parsing. This preserves a clean clap structure while
    // retaining the requested UX.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Estimate(args) => handle_estimate(args),
        Command::MakeGrids(args) => handle_make_grids(args),
    }
}

fn handle_estimate(args: EstimateArgs) -> Result<(), AppError> {
    let config = run_config_from_args(&args)?;
    let output = pipeline::run_estimate(&config)?;

    let queries: Vec<_> = output
        .runs
        .iter()
        .map(|r| (r.kind, r.measurement.clone()))
        .collect();
    println!("{}", crate::report::format_run_header(&queries));

    for run in &output.runs {
        let label = format!("{} age", run.kind.display_name());
        println!("{}", crate::report::format_posterior(&label, &run.posterior));
    }
    if let Some(combined) = &output.combined {
        println!("{}", crate::report::format_posterior("combined age", combined));
    }

    if config.plot {
        let plot = crate::plot::render_posterior_plot(
            &output.runs[0].ages,
            output.final_posterior(),
            config.plot_width,
            config.plot_height,
        );
        println!("{plot}");
    }

    if config.save_csv {
        for run in &output.runs {
            let path = PathBuf::from(format!(
                "{}_{}.csv",
                config.file_stem,
                run.kind.display_name()
            ));
            crate::io::export::write_posterior_csv(&path, &run.ages, &run.posterior.density)?;
            println!("Wrote {}", path.display());
        }
        if let Some(combined) = &output.combined {
            let path = PathBuf::from(format!("{}_combined.csv", config.file_stem));
            crate::io::export::write_posterior_csv(&path, &output.runs[0].ages, &combined.density)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

fn handle_make_grids(args: MakeGridsArgs) -> Result<(), AppError> {
    let clusters = match &args.clusters {
        Some(path) => {
            let ingest = crate::io::ingest::load_clusters_csv(path)?;
            print!(
                "{}",
                crate::report::format_ingest_summary(&path.display().to_string(), &ingest)
            );
            ingest.clusters
        }
        None => {
            println!("Using the embedded synthetic calibration sample (seed {}).", args.seed);
            crate::data::synthetic_clusters(args.indicator, args.seed)
        }
    };

    if let Some(i) = args.omit_cluster {
        if let Some(cluster) = clusters.get(i) {
            println!("Leave-one-out: omitting cluster '{}' ({} Myr).", cluster.name, cluster.age);
        }
    }

    let build = CalibrationGrid::build(args.indicator, &clusters, args.omit_cluster)?;

    let stem = Path::new(&args.output);
    build.grid.save(stem)?;
    let (median_grid, sigma_grid) = grid_pair_paths(stem);

    let residual_dist = PathBuf::from(format!("{}_residuals.json", args.output));
    build.residuals.save(&residual_dist)?;

    let config_path = PathBuf::from(format!("{}.json", args.output));
    let config = EstimatorConfig {
        indicator: args.indicator,
        median_grid,
        sigma_grid,
        residual_dist,
    };
    save_config(&config_path, &config)?;

    println!(
        "Saved {} calibration: {} and {} + residuals, config {}",
        args.indicator.display_name(),
        config.median_grid.display(),
        config.sigma_grid.display(),
        config_path.display()
    );
    Ok(())
}

fn run_config_from_args(args: &EstimateArgs) -> Result<RunConfig, AppError> {
    let li = match args.li {
        // EW values in (0, 3) are log10(EW/mA); convert and say so.
        Some(v) if v > 0.0 && v < 3.0 => {
            let ew = 10f64.powf(v);
            println!("Interpreting lithium EW {v} as log10(EW/mA) = {ew:.2} mA.");
            Some(ew)
        }
        other => other,
    };

    if args.rhk.is_none() && li.is_none() {
        return Err(AppError::input("At least one indicator is required: --rhk and/or --li."));
    }

    Ok(RunConfig {
        bv: args.bv,
        rhk: args.rhk,
        li,
        bv_err: args.bv_err,
        li_err: args.li_err,
        upper_limit: args.upper_limit,
        max_age: args.max_age,
        calcium_config: args.calcium_config.clone(),
        lithium_config: args.lithium_config.clone(),
        sample_seed: args.seed,
        file_stem: args.output.clone(),
        save_csv: args.save,
        plot: args.plot && !args.no_plot,
        plot_width: args.width,
        plot_height: args.height,
    })
}

/// Rewrite argv so `stellar-age` defaults to `stellar-age estimate`.
///
/// Rules:
/// - `stellar-age`                   -> `stellar-age estimate`
/// - `stellar-age -b 0.65 ...`       -> `stellar-age estimate -b 0.65 ...`
/// - `stellar-age --help/--version`  -> unchanged (top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("estimate".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(
        arg1.as_str(),
        "-h" | "--help" | "-V" | "--version" | "help"
    );
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "estimate" | "make-grids");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "estimate flags".
    if arg1.starts_with('-') {
        argv.insert(1, "estimate".to_string());
        return argv;
    }

    // Otherwise, leave as-is.
    argv
}
