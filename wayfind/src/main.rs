use commands::command_argument_builder;
use tracing_subscriber::EnvFilter;
use wayfind::handlers::{handle_routes, handle_sweep};

mod commands;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    // RUST_LOG wins; otherwise info, or warn when quiet
    let default_level = if quiet { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let code = match chosen_command.subcommand() {
        Some(("sweep", primary_command)) => handle_sweep(primary_command).await,
        Some(("routes", primary_command)) => handle_routes(primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    };
    std::process::exit(code);
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
