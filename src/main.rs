// Copyright (C) 2026 by GiGa infosystems

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use color_eyre::{
    Result,
    eyre::{Report, WrapErr, bail},
};
use log::info;

use cargo_depdiff::cleanup::{self, SharedCleanupContext};
use cargo_depdiff::constraint::VersionConstraint;
use cargo_depdiff::diff::{DEFAULT_TOOL, DiffEngine, ExternalTool, TreeSummary, output_json};
use cargo_depdiff::http::HttpClient;
use cargo_depdiff::local::LockedPackages;
use cargo_depdiff::pipeline::{Pipeline, Request};
use cargo_depdiff::resolve::Resolver;
use cargo_depdiff::source::{CratesIo, SparseIndex};

/// The exit code after an interruption with Ctrl-C
const INTERRUPTED: i32 = 130;

#[derive(Parser, Debug)]
#[command(name = "cargo", bin_name = "cargo")]
enum CargoCli {
    Depdiff(Args),
}

/// Show the differences between the locked version of a dependency and another published version
/// of it
///
/// The published version is downloaded into a temporary directory that is removed afterwards, the
/// `Cargo.lock` is never changed.
#[derive(clap::Args, Debug)]
#[command(about, long_about)]
struct Args {
    /// The name of the dependency to compare
    name: Option<String>,
    /// The published version to compare against
    ///
    /// Accepts semver requirements (`^1.2`, `>= 1.0, < 2.0`), `~> 1.2` for "at least 1.2, below
    /// 2.0", bare versions for exactly that version, and `any` for the latest stable version.
    #[arg(short = 'v', long = "version", value_name = "REQ", default_value = "any")]
    constraint: String,
    /// The path to the manifest of the project
    ///
    /// Defaults to the `Cargo.toml` cargo finds from the current directory. It is assumed a
    /// `Cargo.lock` is present.
    #[arg(long)]
    manifest_path: Option<PathBuf>,
    /// Additional sparse registry indexes to search, such as `sparse+https://index.crates.io/`
    #[arg(
        long = "index",
        value_name = "URL",
        env = "CARGO_DEPDIFF_INDEX",
        value_delimiter = ','
    )]
    indexes: Vec<String>,
    /// Don't search crates.io
    #[arg(long)]
    no_crates_io: bool,
    /// The command comparing the two directories, which get appended to it
    ///
    /// Exit codes 0 & 1 are treated as success, as `diff` uses 1 for "differences found".
    #[arg(
        short,
        long,
        value_name = "CMD",
        env = "CARGO_DEPDIFF_TOOL",
        default_value = DEFAULT_TOOL
    )]
    tool: String,
    /// Print a JSON summary of added, removed & changed files instead of running `--tool`
    #[arg(short, long)]
    summary: bool,
    /// The timeout for every network request in seconds
    #[arg(long, value_name = "SECS", default_value_t = 30)]
    timeout: u64,
    /// The directory to create the temporary workspace in
    ///
    /// Defaults to the system's temporary directory.
    #[arg(long, value_name = "DIR")]
    scratch_dir: Option<PathBuf>,
}

struct AppContext {
    request: Request,
    manifest_path: Option<PathBuf>,
    resolver: Resolver,
    engine: Box<dyn DiffEngine>,
    scratch_dir: Option<PathBuf>,
    cleanup: SharedCleanupContext,
}

impl TryFrom<Args> for AppContext {
    type Error = Report;

    fn try_from(args: Args) -> Result<Self> {
        let constraint = args.constraint.parse::<VersionConstraint>()?;
        let request = Request::new(args.name.unwrap_or_default(), constraint)?;

        if let Some(ref manifest_path) = args.manifest_path
            && manifest_path.extension() != Some("toml".as_ref())
        {
            bail!("A manifest path should end in \".toml\", found {manifest_path:?}");
        }

        let http = HttpClient::new(Duration::from_secs(args.timeout))?;
        let mut resolver = Resolver::default();
        if !args.no_crates_io {
            resolver.push(CratesIo::new(http.clone())?);
        }
        for index in args.indexes.iter().filter(|index| !index.trim().is_empty()) {
            resolver.push(SparseIndex::new(index.trim(), http.clone()));
        }
        if resolver.is_empty() {
            bail!("No package sources to search, use `--index` or drop `--no-crates-io`");
        }

        let engine: Box<dyn DiffEngine> = if args.summary {
            Box::new(TreeSummary)
        } else {
            Box::new(args.tool.parse::<ExternalTool>()?)
        };

        Ok(AppContext {
            request,
            manifest_path: args.manifest_path,
            resolver,
            engine,
            scratch_dir: args.scratch_dir,
            cleanup: cleanup::new_shared(),
        })
    }
}

impl AppContext {
    /// Remove the workspace & exit when interrupted
    fn handle_interruptions(&self) -> Result<()> {
        let ctx = self.cleanup.clone();
        ctrlc::set_handler(move || {
            cleanup::lock(&ctx).cleanup();
            std::process::exit(INTERRUPTED);
        })
        .wrap_err("Failed to set the Ctrl-C handler")
    }

    fn run(&self) -> Result<()> {
        let locked = LockedPackages::gather(self.manifest_path.as_deref())?;

        let mut pipeline = Pipeline::new(&locked, &self.resolver, self.engine.as_ref())
            .cleanup_context(self.cleanup.clone());
        if let Some(ref dir) = self.scratch_dir {
            pipeline = pipeline.workspace_in(dir);
        }

        let outcome = pipeline.run(&self.request)?;
        info!("Compared {} with {}", outcome.local, outcome.remote);

        if log::log_enabled!(log::Level::Debug) {
            output_json(&outcome)?;
        }

        Ok(())
    }
}

fn run() -> Result<()> {
    color_eyre::install()?;

    let CargoCli::Depdiff(args) = CargoCli::parse();
    let ctx = AppContext::try_from(args)?;
    ctx.handle_interruptions()?;
    ctx.run()
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("CARGO_DEPDIFF_LOG", "warn"),
    )
    .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ERROR: {err}");
            // The whole report, with the error chain & where it was raised
            if log::log_enabled!(log::Level::Debug) {
                eprintln!("{err:?}");
            }
            ExitCode::FAILURE
        }
    }
}
