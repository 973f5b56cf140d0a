use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tokio::time::{sleep, timeout};
use tracing::debug;

use crate::config::ViewerSettings;
use crate::locator::LocatorResolver;
use crate::preflight::{Preflight, PreflightError};
use crate::render::RenderError;
use crate::resource::Resource;

use super::machine::{Effect, Signal, ViewerMachine};
use super::session::ViewerSession;

const COMMAND_QUEUE: usize = 32;

#[derive(Debug)]
pub enum ViewerCommand {
    Open(Resource),
    Close,
    TryAlternate,
    OpenOriginal,
    FrameLoaded {
        generation: u64,
        revision: u32,
    },
    FrameFailed {
        generation: u64,
        revision: u32,
        error: RenderError,
    },
}

/// Command side of a running viewer. Cloning shares the same session.
#[derive(Clone)]
pub struct ViewerHandle {
    commands: mpsc::Sender<ViewerCommand>,
    session: watch::Receiver<Option<ViewerSession>>,
}

impl ViewerHandle {
    pub async fn send(&self, command: ViewerCommand) -> anyhow::Result<()> {
        self.commands
            .send(command)
            .await
            .ok()
            .context("Viewer controller stopped")
    }

    pub async fn open(&self, resource: Resource) -> anyhow::Result<()> {
        self.send(ViewerCommand::Open(resource)).await
    }

    pub async fn close(&self) -> anyhow::Result<()> {
        self.send(ViewerCommand::Close).await
    }

    pub async fn try_alternate(&self) -> anyhow::Result<()> {
        self.send(ViewerCommand::TryAlternate).await
    }

    pub async fn open_original(&self) -> anyhow::Result<()> {
        self.send(ViewerCommand::OpenOriginal).await
    }

    pub async fn frame_loaded(&self, generation: u64, revision: u32) -> anyhow::Result<()> {
        self.send(ViewerCommand::FrameLoaded {
            generation,
            revision,
        })
        .await
    }

    pub async fn frame_failed(
        &self,
        generation: u64,
        revision: u32,
        error: RenderError,
    ) -> anyhow::Result<()> {
        self.send(ViewerCommand::FrameFailed {
            generation,
            revision,
            error,
        })
        .await
    }

    pub fn session(&self) -> Option<ViewerSession> {
        self.session.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<ViewerSession>> {
        self.session.clone()
    }
}

/// Starts a viewer task. The returned receiver yields URLs the page should
/// open in a new tab. The task stops once every handle is dropped.
pub fn spawn_viewer(
    resolver: Arc<LocatorResolver>,
    preflight: Arc<dyn Preflight>,
    settings: ViewerSettings,
) -> (ViewerHandle, mpsc::UnboundedReceiver<String>) {
    let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
    let (signal_tx, signal_rx) = mpsc::unbounded_channel();
    let (session_tx, session_rx) = watch::channel(None);
    let (navigate_tx, navigate_rx) = mpsc::unbounded_channel();

    let controller = ViewerController {
        machine: ViewerMachine::new(resolver.hosts().clone(), settings.clone()),
        resolver,
        preflight,
        preflight_timeout: Duration::from_millis(settings.preflight_timeout_ms),
        signals: signal_tx,
        tasks: Vec::new(),
        session: session_tx,
        navigate: navigate_tx,
    };
    tokio::spawn(controller.run(command_rx, signal_rx));

    (
        ViewerHandle {
            commands: command_tx,
            session: session_rx,
        },
        navigate_rx,
    )
}

struct ViewerController {
    machine: ViewerMachine,
    resolver: Arc<LocatorResolver>,
    preflight: Arc<dyn Preflight>,
    preflight_timeout: Duration,
    signals: mpsc::UnboundedSender<(u64, Signal)>,
    tasks: Vec<(u64, AbortHandle)>,
    session: watch::Sender<Option<ViewerSession>>,
    navigate: mpsc::UnboundedSender<String>,
}

impl ViewerController {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<ViewerCommand>,
        mut signals: mpsc::UnboundedReceiver<(u64, Signal)>,
    ) {
        loop {
            let effects = tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.apply(command),
                    None => break,
                },
                Some((generation, signal)) = signals.recv() => {
                    self.machine.handle(generation, signal)
                }
            };
            self.execute(effects);
            self.publish();
        }

        let effects = self.machine.close();
        self.execute(effects);
        debug!("[Viewer] Controller stopped");
    }

    fn publish(&self) {
        let snapshot = self.machine.snapshot();
        self.session.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    fn apply(&mut self, command: ViewerCommand) -> Vec<Effect> {
        match command {
            ViewerCommand::Open(resource) => self.machine.open(resource),
            ViewerCommand::Close => self.machine.close(),
            ViewerCommand::TryAlternate => self.machine.try_alternate(),
            ViewerCommand::OpenOriginal => self.machine.open_original(),
            ViewerCommand::FrameLoaded {
                generation,
                revision,
            } => self
                .machine
                .handle(generation, Signal::FrameLoaded { revision }),
            ViewerCommand::FrameFailed {
                generation,
                revision,
                error,
            } => self
                .machine
                .handle(generation, Signal::FrameFailed { revision, error }),
        }
    }

    fn execute(&mut self, effects: Vec<Effect>) {
        self.tasks.retain(|(_, handle)| !handle.is_finished());

        for effect in effects {
            match effect {
                Effect::Resolve {
                    generation,
                    locator,
                } => {
                    let resolver = self.resolver.clone();
                    self.spawn_tagged(generation, async move {
                        Signal::Resolved(resolver.resolve(&locator).await)
                    });
                }
                Effect::Preflight { generation, url } => {
                    let preflight = self.preflight.clone();
                    let limit = self.preflight_timeout;
                    self.spawn_tagged(generation, async move {
                        let result = timeout(limit, preflight.check(&url))
                            .await
                            .unwrap_or(Err(PreflightError::NetworkError));
                        Signal::PreflightFinished(result)
                    });
                }
                Effect::Resign {
                    generation,
                    locator,
                } => {
                    let resolver = self.resolver.clone();
                    self.spawn_tagged(generation, async move {
                        Signal::Resigned(resolver.resign(&locator).await)
                    });
                }
                Effect::ArmTimer {
                    generation,
                    kind,
                    after,
                } => {
                    self.spawn_tagged(generation, async move {
                        sleep(after).await;
                        Signal::TimerFired(kind)
                    });
                }
                Effect::CancelTimers { generation } => {
                    self.tasks.retain(|(owner, handle)| {
                        if *owner == generation {
                            handle.abort();
                            false
                        } else {
                            true
                        }
                    });
                }
                Effect::OpenExternal { url } => {
                    if self.navigate.send(url).is_err() {
                        debug!("[Viewer] Navigation dropped, no listener");
                    }
                }
            }
        }
    }

    fn spawn_tagged<F>(&mut self, generation: u64, work: F)
    where
        F: Future<Output = Signal> + Send + 'static,
    {
        let signals = self.signals.clone();
        let task = tokio::spawn(async move {
            let signal = work.await;
            let _ = signals.send((generation, signal));
        });
        self.tasks.push((generation, task.abort_handle()));
    }
}
