mod cli;
mod commands;

use clap::Parser;
use cli::{Cli, Command};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

fn main() {
    // Logs go to stderr so the LSP transport on stdout stays clean.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Parse => commands::parse::run(&cli.project),
        Command::Lint => commands::lint::run(&cli.project),
        Command::Run { env, select, seeds } => {
            commands::run::run(&cli.project, env.as_deref(), &select, seeds)
        }
        Command::Docs { search } => commands::docs::run(&cli.project, search.as_deref()),
        Command::Lsp => commands::lsp::run(),
        Command::Clean => commands::clean::run(&cli.project),
    };

    match outcome {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            std::process::exit(1);
        }
    }
}
