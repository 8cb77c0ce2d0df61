//! tablesync CLI entry point.

use clap::Parser;
use std::process::ExitCode;
use tablesync::cli::commands::{self, GlobalArgs};
use tablesync::cli::{Cli, Commands};
use tablesync::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // Resolve effective JSON mode: --json OR non-TTY stdout
    let json = cli.json || !std::io::IsTerminal::is_terminal(&std::io::stdout());

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,hyper=info,reqwest=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    let globals = GlobalArgs {
        config: cli.config.as_deref(),
        state: cli.state.as_deref(),
        json,
        dry_run: cli.dry_run,
        quiet: cli.quiet,
    };

    match &cli.command {
        Commands::Run(args) => commands::run::execute(args, &globals),
        Commands::Record {
            table,
            record_id,
            depth,
        } => commands::record::execute(table, record_id, *depth, &globals),
        Commands::PopulateSourceIds { match_field } => {
            commands::populate::execute(match_field, &globals)
        }
        Commands::State { command } => commands::state::execute(*command, &globals),
        Commands::Completions { shell } => commands::completions::execute(shell),
        Commands::Version => commands::version::execute(json),
    }
}
