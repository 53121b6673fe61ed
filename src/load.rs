//! Background loading.
//!
//! Each load runs the converter on its own worker thread. The worker talks
//! to the host only through a single FIFO channel of [`HostEvent`]s, which
//! the host drains on its own thread with [`LoadHandle::pump`] (non
//! blocking) or [`LoadHandle::wait`].
//!
//! Image path resolution is the one synchronous request: the worker sends
//! [`HostEvent::ResolvePath`] with a reply channel and blocks until the host
//! answers. The host must answer from `pump`/`wait` without ever waiting on
//! the worker. Dropping the handle drops any unanswered request, which
//! releases the worker.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::asset::{AssetBridge, BinaryAsset};
use crate::convert::convert_with_cancel;
use crate::error::{Error, Result};
use crate::writer::ConvertOptions;

/// Cooperative abort flag shared between the host and a worker.
///
/// The converter checks it on every start and end tag.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Messages from a worker to the host, in the order they were produced.
#[derive(Debug)]
pub enum HostEvent {
    /// Blocking request: answer with the local path for `name`.
    ResolvePath {
        name: String,
        reply: SyncSender<String>,
    },
    /// A decoded binary. Always precedes the terminal event.
    Asset(BinaryAsset),
    Completed {
        name: String,
        markup: String,
    },
    Failed {
        reason: String,
    },
    Cancelled,
}

impl HostEvent {
    fn is_terminal(&self) -> bool {
        matches!(
            self,
            HostEvent::Completed { .. } | HostEvent::Failed { .. } | HostEvent::Cancelled
        )
    }
}

/// Host-side collaborator of a background load.
///
/// Every method runs on the thread that pumps the [`LoadHandle`].
/// `resolve_asset_path` is called while the worker is blocked and must
/// return promptly.
pub trait Host {
    /// Local path under which the asset `name` will be available.
    fn resolve_asset_path(&mut self, name: &str) -> String;

    /// Store a decoded binary.
    fn deliver_asset(&mut self, name: &str, data: Vec<u8>);

    /// Called once with the finished document.
    fn on_completed(&mut self, name: &str, markup: String);

    /// Called once when the source cannot be read or converted.
    fn on_failed(&mut self, reason: &str);

    /// Called once when a cancelled load has stopped.
    fn on_cancelled(&mut self, _name: &str) {}
}

/// State of a load as seen by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Worker-side bridge that forwards asset traffic to the host channel.
struct ChannelBridge {
    events: Sender<HostEvent>,
}

impl AssetBridge for ChannelBridge {
    fn resolve_asset_path(&mut self, name: &str) -> String {
        let (reply, response) = mpsc::sync_channel(1);
        let request = HostEvent::ResolvePath {
            name: name.to_string(),
            reply,
        };
        if self.events.send(request).is_err() {
            return String::new();
        }
        // Fails only when the host dropped the request.
        response.recv().unwrap_or_default()
    }

    fn deliver_asset(&mut self, asset: BinaryAsset) {
        let _ = self.events.send(HostEvent::Asset(asset));
    }
}

/// A running (or finished) background load.
pub struct LoadHandle {
    name: String,
    cancel: CancelFlag,
    events: Option<Receiver<HostEvent>>,
    worker: Option<JoinHandle<()>>,
    status: LoadStatus,
}

impl LoadHandle {
    /// Load an FB2 file. The file is opened on the worker; failure to open
    /// it is reported through [`Host::on_failed`].
    pub fn spawn_file(path: impl AsRef<Path>, options: ConvertOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let name = path.display().to_string();
        Self::spawn_with(name, options, move || {
            let mut bytes = Vec::new();
            File::open(&path)?.read_to_end(&mut bytes)?;
            Ok(bytes)
        })
    }

    /// Load FB2 markup from any byte stream.
    pub fn spawn_reader<R>(
        name: impl Into<String>,
        mut source: R,
        options: ConvertOptions,
    ) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        Self::spawn_with(name.into(), options, move || {
            let mut bytes = Vec::new();
            source.read_to_end(&mut bytes)?;
            Ok(bytes)
        })
    }

    fn spawn_with<F>(name: String, options: ConvertOptions, read: F) -> Result<Self>
    where
        F: FnOnce() -> io::Result<Vec<u8>> + Send + 'static,
    {
        let cancel = CancelFlag::new();
        let (tx, rx) = mpsc::channel();

        let worker = {
            let name = name.clone();
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("fb2-load".to_string())
                .spawn(move || run(name, options, cancel, tx, read))?
        };
        debug!(%name, "load started");

        Ok(Self {
            name,
            cancel,
            events: Some(rx),
            worker: Some(worker),
            status: LoadStatus::Running,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Status as of the last dispatched event.
    pub fn status(&self) -> LoadStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == LoadStatus::Running
    }

    /// Ask the worker to stop. No document is delivered afterwards, even
    /// one that is already queued.
    pub fn cancel(&self) {
        debug!(name = %self.name, "cancel requested");
        self.cancel.cancel();
    }

    /// Dispatch every event that is ready, without blocking.
    pub fn pump<H: Host + ?Sized>(&mut self, host: &mut H) -> LoadStatus {
        while self.is_running() {
            let Some(events) = self.events.as_ref() else {
                break;
            };
            match events.try_recv() {
                Ok(event) => self.dispatch(event, host),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => self.worker_gone(host),
            }
        }
        self.status
    }

    /// Dispatch events until the load reaches a terminal state.
    pub fn wait<H: Host + ?Sized>(&mut self, host: &mut H) -> LoadStatus {
        while self.is_running() {
            let Some(events) = self.events.as_ref() else {
                break;
            };
            match events.recv() {
                Ok(event) => self.dispatch(event, host),
                Err(_) => self.worker_gone(host),
            }
        }
        self.status
    }

    fn dispatch<H: Host + ?Sized>(&mut self, event: HostEvent, host: &mut H) {
        let terminal = event.is_terminal();
        match event {
            HostEvent::ResolvePath { name, reply } => {
                let path = host.resolve_asset_path(&name);
                let _ = reply.send(path);
            }
            HostEvent::Asset(asset) => {
                if !self.cancel.is_cancelled() {
                    host.deliver_asset(&asset.name, asset.data);
                }
            }
            HostEvent::Completed { name, markup } => {
                if self.cancel.is_cancelled() {
                    debug!(%name, "discarding document of cancelled load");
                    self.status = LoadStatus::Cancelled;
                    host.on_cancelled(&name);
                } else {
                    self.status = LoadStatus::Completed;
                    host.on_completed(&name, markup);
                }
            }
            HostEvent::Failed { reason } => {
                self.status = LoadStatus::Failed;
                host.on_failed(&reason);
            }
            HostEvent::Cancelled => {
                self.status = LoadStatus::Cancelled;
                host.on_cancelled(&self.name);
            }
        }
        if terminal {
            self.join();
        }
    }

    fn worker_gone<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.status = LoadStatus::Failed;
        host.on_failed(&Error::WorkerGone.to_string());
        self.join();
    }

    fn join(&mut self) {
        self.events = None;
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            warn!(name = %self.name, "load worker panicked");
        }
    }
}

impl Drop for LoadHandle {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.cancel.cancel();
            // Unanswered path requests are dropped with the receiver, which
            // unblocks the worker before the join.
            self.join();
        }
    }
}

fn run<F>(
    name: String,
    options: ConvertOptions,
    cancel: CancelFlag,
    events: Sender<HostEvent>,
    read: F,
) where
    F: FnOnce() -> io::Result<Vec<u8>>,
{
    let bytes = match read() {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(%name, "cannot read source: {e}");
            let reason = format!("Cannot read file {name}: {e}.");
            let _ = events.send(HostEvent::Failed { reason });
            return;
        }
    };

    let bridge = ChannelBridge {
        events: events.clone(),
    };
    let event = match convert_with_cancel(&bytes, bridge, &options, Some(cancel)) {
        Ok(markup) => {
            info!(%name, bytes = markup.len(), "document converted");
            HostEvent::Completed { name, markup }
        }
        Err(Error::Cancelled) => {
            debug!(%name, "load cancelled");
            HostEvent::Cancelled
        }
        Err(e) => {
            warn!(%name, "load failed: {e}");
            HostEvent::Failed {
                reason: e.to_string(),
            }
        }
    };
    let _ = events.send(event);
}

/// Serializes loads for one document view: at most one load is active.
#[derive(Default)]
pub struct Loader {
    options: ConvertOptions,
    active: Option<LoadHandle>,
}

impl Loader {
    pub fn new(options: ConvertOptions) -> Self {
        Self {
            options,
            active: None,
        }
    }

    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.ensure_idle()?;
        self.active = Some(LoadHandle::spawn_file(path, self.options.clone())?);
        Ok(())
    }

    pub fn load_reader<R>(&mut self, name: impl Into<String>, source: R) -> Result<()>
    where
        R: Read + Send + 'static,
    {
        self.ensure_idle()?;
        self.active = Some(LoadHandle::spawn_reader(name, source, self.options.clone())?);
        Ok(())
    }

    pub fn is_loading(&self) -> bool {
        self.active.as_ref().is_some_and(LoadHandle::is_running)
    }

    pub fn cancel(&self) {
        if let Some(load) = &self.active {
            load.cancel();
        }
    }

    /// Dispatch ready events of the active load. Returns `None` when idle.
    pub fn pump<H: Host + ?Sized>(&mut self, host: &mut H) -> Option<LoadStatus> {
        let status = self.active.as_mut()?.pump(host);
        if status != LoadStatus::Running {
            self.active = None;
        }
        Some(status)
    }

    /// Block until the active load finishes. Returns `None` when idle.
    pub fn wait<H: Host + ?Sized>(&mut self, host: &mut H) -> Option<LoadStatus> {
        let status = self.active.take()?.wait(host);
        Some(status)
    }

    fn ensure_idle(&mut self) -> Result<()> {
        if self.is_loading() {
            return Err(Error::LoadInProgress);
        }
        self.active = None;
        Ok(())
    }
}
