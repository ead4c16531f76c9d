use crate::demo::{run_demo, run_templates, DemoArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use dossier_engine::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Dossier Workflow Engine",
    about = "Run and demonstrate the dossier workflow engine from the command line",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Print the canonical step template per product category
    Templates,
    /// Run an end-to-end CLI demo covering the dossier lifecycle and the
    /// quote negotiation
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Templates => run_templates(),
        Command::Demo(args) => run_demo(args),
    }
}
