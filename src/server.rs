use std::{
    fs::OpenOptions,
    io::Read,
    sync::mpsc::{self, Sender},
    thread,
    time::Duration,
};

use anyhow::Context;
use clap::Args;
use tracing::{debug, info, warn};

use crate::message::CommandKind;

pub mod directory;
pub mod dispatcher;
pub mod lock;
pub mod queue;
pub mod serial;
pub mod sink;

use directory::JsonDirectory;
use dispatcher::{Dispatcher, DispatcherConfig};
use lock::{FocusCommand, TitleDetector};
use queue::LatestQueue;
use serial::{FrameReader, ReadError, SerialLink};
use sink::StdoutSink;

/// How to find the title of the focused window.
#[derive(Debug, Clone, Args)]
pub struct FocusArgs {
    /// Program printing the focused window title on stdout.
    #[clap(long, default_value = "xdotool")]
    pub focus_cmd: String,

    /// Arguments passed to the focus program.
    #[clap(
        long,
        value_delimiter = ',',
        default_value = "getactivewindow,getwindowname"
    )]
    pub focus_args: Vec<String>,
}

impl FocusArgs {
    pub fn detector(&self) -> TitleDetector<FocusCommand> {
        TitleDetector::new(FocusCommand::new(
            self.focus_cmd.clone(),
            self.focus_args.clone(),
        ))
    }
}

#[derive(Debug, Args)]
pub struct ServeArgs {
    /// Serial device the controller is attached to. Line settings must already be configured.
    #[clap()]
    port: String,

    /// JSON file holding the enrolled users.
    #[clap(long)]
    users: String,

    /// Milliseconds between polls of the command queue.
    #[clap(long, default_value = "10")]
    interval_ms: u64,

    /// Extra attempts for a failed write to the controller.
    #[clap(long, default_value = "0")]
    write_retries: u32,

    /// Print uids of presented cards, for enrolling new users.
    #[clap(long)]
    show_uids: bool,

    #[clap(flatten)]
    focus: FocusArgs,
}

pub fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let directory = JsonDirectory::load(&args.users)?;
    if directory.is_empty() {
        warn!(args.users, "User directory is empty");
    }

    info!(args.port, "Opening controller");
    let device = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&args.port)
        .with_context(|| format!("opening serial device {}", args.port))?;
    let reader = device
        .try_clone()
        .with_context(|| format!("cloning serial device {}", args.port))?;

    let queue = LatestQueue::new();
    let (stop, stopped) = mpsc::channel();
    let pump_queue = queue.clone();
    let pump = thread::Builder::new()
        .name("serial-reader".to_owned())
        .spawn(move || pump_frames(FrameReader::new(reader), &pump_queue, stop))
        .context("spawning serial reader")?;

    let config = DispatcherConfig {
        interval: Duration::from_millis(args.interval_ms),
        write_retries: args.write_retries,
    };
    let mut dispatcher = Dispatcher::new(
        queue,
        args.focus.detector(),
        directory,
        SerialLink::new(device),
        config,
    );
    if args.show_uids {
        dispatcher.attach_sink(Box::new(StdoutSink));
    }
    println!("Listening for controller on {}", args.port);
    dispatcher.run(&stopped);

    match pump.join() {
        Ok(result) => result,
        Err(_) => anyhow::bail!("serial reader panicked"),
    }
}

/// Moves controller requests into the queue until the device closes.
///
/// Dropping `_stop` on return ends the dispatcher as well.
pub fn pump_frames<R: Read>(
    mut reader: FrameReader<R>,
    queue: &LatestQueue,
    _stop: Sender<()>,
) -> anyhow::Result<()> {
    loop {
        let message = match reader.next_frame() {
            Ok(Some(message)) => message,
            Ok(None) => {
                info!("Controller closed the connection");
                return Ok(());
            }
            Err(ReadError::Frame(e)) => {
                warn!(error = %e, "Skipping malformed frame");
                continue;
            }
            Err(ReadError::Io(e)) => return Err(e).context("reading from controller"),
        };

        let kind = message.kind();
        let value = match std::str::from_utf8(message.payload()) {
            Ok(value) => value.to_owned(),
            Err(_) if kind == CommandKind::ComputerStatus => String::new(),
            Err(_) => {
                warn!(%kind, "Dropping request with non-text uid");
                continue;
            }
        };
        if value.is_empty() && kind != CommandKind::ComputerStatus {
            warn!(%kind, "Dropping request with empty uid");
            continue;
        }
        debug!(%kind, "Queued controller request");
        if queue.push(kind, value).is_some() {
            debug!(%kind, "Replaced pending request");
        }
    }
}
