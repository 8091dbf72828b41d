use lockbridge::client::status;
use lockbridge::server::serve;
use lockbridge::server::{FocusArgs, ServeArgs};
use clap::Subcommand;
use tracing::info;

use clap::Parser;

#[derive(Debug, Parser)]
struct Opts {
    #[clap(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Answer the controller on a serial device.
    Serve(ServeArgs),

    /// Print whether the session is locked. Exits with 1 when locked.
    Status {
        /// Print a JSON report instead.
        #[clap(long)]
        json: bool,

        #[clap(flatten)]
        focus: FocusArgs,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Opts::parse();
    info!(?args, "Loaded args");

    match args.cmd {
        Command::Serve(serve_args) => serve(serve_args),
        Command::Status { json, focus } => {
            let code = status(focus, json)?;
            std::process::exit(code)
        }
    }
}
