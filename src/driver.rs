//! Single-threaded event loop around the engine.
//! The spawned task owns the `TimerEngine`; everything else talks to it
//! through an `EngineHandle` mailbox, so timer callbacks and commands never interleave.
use crate::engine::{EngineError, TimerEngine, TimerSnapshot};
use crate::ipc::Inbound;
use crate::models::{FinishedEntry, TrackedItem};
use scopeguard::guard;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub enum Command {
    Start(TrackedItem),
    Pause,
    Resume,
    Stop(oneshot::Sender<Result<FinishedEntry, EngineError>>),
    Adjust(i64),
    Comment(String),
    Save,
    Inbound(Inbound),
    Snapshot(oneshot::Sender<TimerSnapshot>),
    Shutdown(oneshot::Sender<()>),
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Start(_) => "start",
            Command::Pause => "pause",
            Command::Resume => "resume",
            Command::Stop(_) => "stop",
            Command::Adjust(_) => "adjust",
            Command::Comment(_) => "comment",
            Command::Save => "save",
            Command::Inbound(_) => "inbound",
            Command::Snapshot(_) => "snapshot",
            Command::Shutdown(_) => "shutdown",
        }
    }
}

/// Cloneable mailbox address of a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl EngineHandle {
    /// Fire-and-forget. Returns false when the engine task is gone.
    pub fn send(&self, cmd: Command) -> bool {
        let name = cmd.name();
        if self.tx.send(cmd).is_err() {
            warn!("[DRIVER] Dropped {} command: engine task has exited", name);
            return false;
        }
        true
    }

    pub fn start(&self, item: TrackedItem) -> bool {
        self.send(Command::Start(item))
    }

    pub fn pause(&self) -> bool {
        self.send(Command::Pause)
    }

    pub fn resume(&self) -> bool {
        self.send(Command::Resume)
    }

    pub fn adjust(&self, delta_ms: i64) -> bool {
        self.send(Command::Adjust(delta_ms))
    }

    pub fn comment(&self, text: impl Into<String>) -> bool {
        self.send(Command::Comment(text.into()))
    }

    pub fn save(&self) -> bool {
        self.send(Command::Save)
    }

    pub fn inbound(&self, msg: Inbound) -> bool {
        self.send(Command::Inbound(msg))
    }

    /// `None` when the engine task is gone.
    pub async fn stop(&self) -> Option<Result<FinishedEntry, EngineError>> {
        let (tx, rx) = oneshot::channel();
        if !self.send(Command::Stop(tx)) {
            return None;
        }
        rx.await.ok()
    }

    pub async fn snapshot(&self) -> Option<TimerSnapshot> {
        let (tx, rx) = oneshot::channel();
        if !self.send(Command::Snapshot(tx)) {
            return None;
        }
        rx.await.ok()
    }

    /// Flush the session and end the loop; resolves after the flush.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.send(Command::Shutdown(tx)) {
            let _ = rx.await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Handle with no engine behind it; the caller reads the commands.
    #[cfg(test)]
    pub(crate) fn detached() -> (Self, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

pub fn spawn(engine: TimerEngine) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(run_loop(engine, rx));
    (EngineHandle { tx }, task)
}

async fn sleep_for(ms: Option<u64>) {
    match ms {
        Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        None => std::future::pending::<()>().await,
    }
}

async fn run_loop(engine: TimerEngine, mut rx: mpsc::UnboundedReceiver<Command>) {
    // Whatever ends the loop, the session is flushed on the way out
    let mut engine = guard(engine, |mut engine| {
        engine.flush();
        info!("[DRIVER] Engine loop stopped");
    });
    let mut shutdown_ack = None;
    info!("[DRIVER] Engine loop started");

    loop {
        let wait = engine
            .next_deadline()
            .map(|due| due.saturating_sub(engine.now_ms()));

        tokio::select! {
            cmd = rx.recv() => match cmd {
                None => {
                    debug!("[DRIVER] All handles dropped");
                    break;
                }
                Some(Command::Shutdown(ack)) => {
                    shutdown_ack = Some(ack);
                    break;
                }
                Some(cmd) => handle_command(&mut engine, cmd),
            },
            _ = sleep_for(wait) => {
                engine.fire_due();
            }
        }
    }

    drop(engine);
    if let Some(ack) = shutdown_ack {
        let _ = ack.send(());
    }
}

fn handle_command(engine: &mut TimerEngine, cmd: Command) {
    let outcome = match cmd {
        Command::Start(item) => engine.start(item),
        Command::Pause => engine.pause(),
        Command::Resume => engine.resume(),
        Command::Stop(reply) => {
            let _ = reply.send(engine.stop());
            Ok(())
        }
        Command::Adjust(delta) => engine.adjust(delta).map(|_| ()),
        Command::Comment(text) => engine.set_comment(&text),
        Command::Save => {
            if let Err(e) = engine.save_state() {
                warn!("[DRIVER] Explicit save failed: {}", e);
            }
            Ok(())
        }
        Command::Inbound(msg) => {
            engine.handle_inbound(msg);
            Ok(())
        }
        Command::Snapshot(reply) => {
            let _ = reply.send(engine.snapshot());
            Ok(())
        }
        // handled by the loop
        Command::Shutdown(_) => Ok(()),
    };
    if let Err(e) = outcome {
        debug!("[DRIVER] Command ignored: {}", e);
    }
}
