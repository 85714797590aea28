use colored::Colorize;
use tracing_subscriber::EnvFilter;
use xsd_map::cli;

fn main() {
    let command_line_interface = cli::CommandLineInterface::load();

    let filter = match command_line_interface.log_level() {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Err(error) = command_line_interface.run() {
        eprintln!("{} {error:#}", "error:".red().bold());
        std::process::exit(1);
    }
}
