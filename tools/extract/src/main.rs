//! Constant extraction.
//!
//! Resolves the numeric values of the OS constants referenced by interface
//! definition files, for every architecture of one OS, and writes them to
//! per-file constant tables next to the definitions.
//!
//! Pipeline: validate setup → prepare backend → per-arch jobs (parse +
//! prepare) → per-file jobs (probe) → drain in order → persist tables →
//! cross-arch availability check.

mod cli;
mod collect;
mod config;
mod consistency;
mod extractor;
mod job;
mod scheduler;
mod signal;
mod source;
mod target;
#[cfg(test)]
mod testutil;
mod verbose;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;

use config::Config;
use extractor::Extractors;
use job::ArchSpec;
use source::{DefinitionSource, SysDir};
use target::TargetRegistry;
use verbose::{Timer, vprintln};

fn main() -> Result<ExitCode> {
    let cli = cli::Cli::parse();
    verbose::init(cli.quiet, cli.verbose);
    run(&cli)
}

fn run(cli: &cli::Cli) -> Result<ExitCode> {
    let config = Config::discover()?;
    if let Some(path) = &config.path {
        vprintln!("  using {}", path.display());
    }

    let mut registry = TargetRegistry::builtin();
    registry.apply(&config.targets)?;
    let extractors = Extractors::builtin();

    let os = cli.os.as_str();
    let extractor = extractors.get(os).ok_or_else(|| anyhow!("unknown os: {os}"))?;
    let Some(source_dir) = cli.sourcedir.clone() else {
        bail!("provide path to kernel checkout via --sourcedir");
    };

    let sys_dir = cli
        .sys_dir
        .clone()
        .or_else(|| config.sys_dir.clone())
        .unwrap_or_else(|| PathBuf::from("sys"));
    let source = SysDir::new(&sys_dir);
    let os_dir = source.os_dir(os);

    let requested = cli.arches();
    let arches = if requested.is_empty() {
        registry.arches(os)
    } else {
        requested.clone()
    };
    let all_files = source.file_list(os)?;

    // Per-arch parameters; build mode gives each arch its own directory.
    let mut specs = Vec::new();
    let mut build_dirs = Vec::new();
    for arch in &arches {
        let target = registry
            .get(os, arch)
            .ok_or_else(|| anyhow!("unknown arch: {arch}"))?;
        let build_dir = if cli.build {
            Some(
                tempfile::Builder::new()
                    .prefix("sysconst-kernel-build")
                    .tempdir()
                    .context("failed to create temp dir")?,
            )
        } else {
            None
        };
        let build_path = match (&build_dir, &cli.builddir) {
            (Some(dir), _) => dir.path().to_path_buf(),
            (None, Some(dir)) => dir.clone(),
            (None, None) => source_dir.clone(),
        };
        specs.push(Arc::new(ArchSpec {
            target,
            source_dir: source_dir.clone(),
            include_dirs: cli.includedirs.clone(),
            build_dir: build_path,
            build: cli.build,
        }));
        build_dirs.push(build_dir);
    }

    {
        let _t = Timer::start("backend preparation");
        extractor.prepare(&source_dir, cli.build, &specs)?;
    }

    let (jobs, handles): (Vec<_>, Vec<_>) = specs
        .into_iter()
        .zip(build_dirs)
        .map(|(spec, build_dir)| {
            let files = job::select_files(&all_files, &cli.files, spec.arch());
            job::arch_job(spec, &files, &os_dir, build_dir)
        })
        .unzip();

    let workers = scheduler::Workers {
        extractor,
        source: &source,
        count: cli.jobs.or(config.jobs).unwrap_or(0),
    };
    let collected = {
        let _t = Timer::start("extraction");
        workers.execute(jobs, || collect::drain(handles))
    };

    let summary = collect::persist(&collected.tables, &os_dir, cli.check)?;
    let stale: Vec<&PathBuf> = if cli.check { summary.stale().collect() } else { Vec::new() };

    let verdict = collect::verdict(&collected, !requested.is_empty(), &stale);
    for line in &verdict.report {
        println!("{line}");
    }
    Ok(if verdict.failed { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}
