use std::{
    sync::mpsc::{Receiver, RecvTimeoutError},
    time::{Duration, Instant},
};

use tracing::{debug, error, info, warn};

use super::{
    directory::CredentialDirectory,
    lock::LockStateDetector,
    queue::CommandQueue,
    serial::{SerialTransport, TransportError},
    sink::UidSink,
};
use crate::message::{CommandKind, ComputerStatus, Message};

pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    /// Time between polls of the command queue.
    pub interval: Duration,
    /// Extra attempts made for an outbound write that failed.
    pub write_retries: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            write_retries: 0,
        }
    }
}

/// What a single dispatch cycle did.
#[derive(Debug, Default)]
pub struct CycleReport {
    pub sent: Vec<Message>,
    pub uid_forwarded: Option<String>,
    pub failures: Vec<(CommandKind, TransportError)>,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        self.sent.is_empty() && self.uid_forwarded.is_none() && self.failures.is_empty()
    }
}

/// Drains the command queue and answers the controller.
pub struct Dispatcher<Q, L, D, T> {
    queue: Q,
    detector: L,
    directory: D,
    transport: T,
    sink: Option<Box<dyn UidSink + Send>>,
    config: DispatcherConfig,
}

impl<Q, L, D, T> Dispatcher<Q, L, D, T>
where
    Q: CommandQueue,
    L: LockStateDetector,
    D: CredentialDirectory,
    T: SerialTransport,
{
    pub fn new(
        queue: Q,
        detector: L,
        directory: D,
        transport: T,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            queue,
            detector,
            directory,
            transport,
            sink: None,
            config,
        }
    }

    pub fn attach_sink(&mut self, sink: Box<dyn UidSink + Send>) {
        self.sink = Some(sink);
    }

    pub fn detach_sink(&mut self) -> Option<Box<dyn UidSink + Send>> {
        self.sink.take()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Answer to a card presented for login.
    ///
    /// Locked with a known user sends the password. Anything else reports the
    /// session as unlocked, including an unknown card on a locked session.
    pub fn password_response(&self, uid: &str) -> Message {
        if self.detector.is_locked() {
            if let Some(user) = self.directory.lookup(uid) {
                info!(uid, "Sending password for locked session");
                return Message::password(&user.password);
            }
            warn!(uid, "Unknown card while locked, reporting unlocked");
        } else {
            debug!(uid, "Session unlocked, not sending password");
        }
        Message::status(ComputerStatus::Unlocked)
    }

    pub fn status_response(&self) -> Message {
        Message::status(self.detector.status())
    }

    /// Returns whether a sink received the uid.
    pub fn forward_uid(&self, uid: &str) -> bool {
        match &self.sink {
            Some(sink) => {
                sink.update_uid_label(uid);
                true
            }
            None => {
                debug!(uid, "No uid display attached");
                false
            }
        }
    }

    /// Services each command kind once, in order. A failed write doesn't stop the
    /// remaining kinds from being serviced.
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        for kind in CommandKind::ALL {
            let Some(value) = self.queue.read_next(kind) else {
                continue;
            };
            let message = match kind {
                CommandKind::Password => self.password_response(&value),
                CommandKind::ComputerStatus => self.status_response(),
                CommandKind::Uid => {
                    if self.forward_uid(&value) {
                        report.uid_forwarded = Some(value);
                    }
                    continue;
                }
            };
            match self.send(&message) {
                Ok(()) => report.sent.push(message),
                Err(e) => report.failures.push((kind, e)),
            }
        }
        report
    }

    fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        let mut attempt = 0;
        loop {
            match self.transport.write(message) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.config.write_retries => {
                    attempt += 1;
                    warn!(kind = %message.kind(), attempt, error = %e, "Write failed, retrying");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Runs cycles every `interval` until `stop` receives a value or its sender is dropped.
    pub fn run(&mut self, stop: &Receiver<()>) {
        info!(interval = ?self.config.interval, "Dispatcher started");
        loop {
            match stop.recv_timeout(self.config.interval) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
            let started = Instant::now();
            let report = self.run_cycle();
            for (kind, e) in &report.failures {
                error!(%kind, error = %e, "Failed to answer controller");
            }
            let elapsed = started.elapsed();
            if elapsed > self.config.interval {
                warn!(
                    ?elapsed,
                    interval = ?self.config.interval,
                    "Dispatch cycle overran interval"
                );
            }
        }
        info!("Dispatcher stopped");
    }
}
