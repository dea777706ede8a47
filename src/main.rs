mod cache;
mod classifier;
mod cli;
mod db;
mod error;
mod fiscal;
mod fmt;
mod importer;
mod ledger;
mod models;
mod normalizer;
mod reports;
mod settings;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Upload {
            file,
            plan,
            name,
            json,
        } => cli::upload::run(&file, &plan, name.as_deref(), json),
        Commands::Request { input } => cli::upload::request(input.as_deref()),
        Commands::Delete { plan } => cli::files::delete(&plan),
        Commands::Files => cli::files::list(),
        Commands::Summary {
            plan,
            month,
            year,
            page,
            limit,
        } => cli::report::summary(plan, month, year, page, limit),
        Commands::Fiscal => cli::report::fiscal(),
        Commands::Costs => cli::report::costs(),
        Commands::Coverage => cli::report::coverage(),
        Commands::Metrics => cli::report::metrics(),
        Commands::Employees {
            search,
            page,
            limit,
        } => cli::report::employees(search, page, limit),
        Commands::Charges {
            search,
            plan,
            page,
            limit,
        } => cli::report::charges(search, plan, page, limit),
        Commands::History { subscriber } => cli::report::history(&subscriber),
        Commands::Export {
            output,
            search,
            plan,
        } => cli::export::run(&output, search.as_deref(), plan.as_deref()),
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
