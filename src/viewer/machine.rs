use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::{DocumentHostMode, ViewerSettings};
use crate::locator::{classify, HostCategory, HostTable, ResolutionError, ResolvedLocator};
use crate::preflight::PreflightError;
use crate::render::{guess_type, RenderError};
use crate::resource::Resource;

use super::session::{SessionMeta, SessionStatus, ViewerSession};

const TIMED_OUT_MESSAGE: &str = "The preview took too long to prepare.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Hard cap on the loading indicator.
    Safety,
    /// Swap a document-host embed to its alternate if it has not loaded.
    Alternate,
}

/// Side effects requested by the machine. The controller executes them and
/// feeds results back as [`Signal`]s tagged with the same generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Resolve { generation: u64, locator: String },
    Preflight { generation: u64, url: String },
    Resign { generation: u64, locator: String },
    ArmTimer { generation: u64, kind: TimerKind, after: Duration },
    CancelTimers { generation: u64 },
    OpenExternal { url: String },
}

#[derive(Debug, Clone)]
pub enum Signal {
    Resolved(Result<ResolvedLocator, ResolutionError>),
    PreflightFinished(Result<(), PreflightError>),
    Resigned(Result<String, ResolutionError>),
    TimerFired(TimerKind),
    /// Renderer events carry the embed revision they were painted for.
    FrameLoaded { revision: u32 },
    FrameFailed { revision: u32, error: RenderError },
}

struct ActiveSession {
    session: ViewerSession,
    resolved: Option<ResolvedLocator>,
    swapped_to_alternate: bool,
    resign_attempted: bool,
    frame_loaded: bool,
    safety_fired: bool,
}

impl ActiveSession {
    fn fail(&mut self, message: impl Into<String>) {
        self.session.status = SessionStatus::Failed;
        self.session.error_message = Some(message.into());
        self.session.loading = false;
    }

    fn show(&mut self, url: String, hosts: &HostTable) {
        self.session.kind = Some(guess_type(&url, self.session.mime.as_deref(), hosts));
        self.session.url = url;
        self.session.revision += 1;
        self.session.loading = true;
        self.session.error_message = None;
        self.frame_loaded = false;
    }

    fn swap_to_alternate(&mut self, hosts: &HostTable) -> bool {
        let Some(alternate) = self.session.meta.alternate_embed.clone() else {
            return false;
        };
        self.show(alternate, hosts);
        self.session.status = SessionStatus::Degraded;
        self.swapped_to_alternate = true;
        true
    }
}

/// Lifecycle of the single open preview.
///
/// The machine is the only writer of session state. Every asynchronous result
/// arrives through [`ViewerMachine::handle`] with the generation it was issued
/// for; results from a superseded or closed session are dropped unapplied.
pub struct ViewerMachine {
    hosts: Arc<HostTable>,
    settings: ViewerSettings,
    generation: u64,
    active: Option<ActiveSession>,
}

impl ViewerMachine {
    pub fn new(hosts: Arc<HostTable>, settings: ViewerSettings) -> Self {
        Self {
            hosts,
            settings,
            generation: 0,
            active: None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn session(&self) -> Option<&ViewerSession> {
        self.active.as_ref().map(|active| &active.session)
    }

    pub fn snapshot(&self) -> Option<ViewerSession> {
        self.session().cloned()
    }

    pub fn open(&mut self, resource: Resource) -> Vec<Effect> {
        let mut effects = self.teardown();
        self.generation += 1;
        let generation = self.generation;

        let raw = resource.locator().unwrap_or("").trim().to_string();
        let host_category = classify(&raw, &self.hosts);
        info!(
            "[Viewer] Opening session {} ({:?}): {}",
            generation, host_category, raw
        );

        self.active = Some(ActiveSession {
            session: ViewerSession {
                generation,
                title: resource.title,
                url: String::new(),
                mime: resource.mime,
                kind: None,
                meta: SessionMeta {
                    raw: raw.clone(),
                    host_category,
                    primary_embed: None,
                    alternate_embed: None,
                    is_proxied: false,
                },
                status: SessionStatus::Loading,
                loading: true,
                revision: 0,
                error_message: None,
            },
            resolved: None,
            swapped_to_alternate: false,
            resign_attempted: false,
            frame_loaded: false,
            safety_fired: false,
        });

        effects.push(Effect::ArmTimer {
            generation,
            kind: TimerKind::Safety,
            after: Duration::from_millis(self.settings.safety_timeout_ms),
        });
        effects.push(Effect::Resolve {
            generation,
            locator: raw,
        });
        effects
    }

    /// Manual close always wins. Anything issued before it is invalidated.
    pub fn close(&mut self) -> Vec<Effect> {
        let effects = self.teardown();
        self.generation += 1;
        effects
    }

    /// Manual "try alternate viewer". Empty when nothing changed.
    pub fn try_alternate(&mut self) -> Vec<Effect> {
        let hosts = self.hosts.clone();
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };
        if !active.session.is_settled() || !active.swap_to_alternate(&hosts) {
            return Vec::new();
        }
        info!(
            "[Viewer] Session {} switched to alternate viewer on request",
            active.session.generation
        );
        self.rearm_safety()
    }

    /// Manual "open original in a new tab".
    pub fn open_original(&self) -> Vec<Effect> {
        let Some(active) = self.active.as_ref() else {
            return Vec::new();
        };
        if !active.session.is_settled() {
            return Vec::new();
        }
        let url = active
            .resolved
            .as_ref()
            .map(|resolved| resolved.final_url.clone())
            .unwrap_or_else(|| active.session.meta.raw.clone());
        vec![Effect::OpenExternal { url }]
    }

    pub fn handle(&mut self, generation: u64, signal: Signal) -> Vec<Effect> {
        let current = self
            .active
            .as_ref()
            .is_some_and(|active| active.session.generation == generation);
        if !current {
            debug!(
                "[Viewer] Discarding stale {:?} from generation {} (active {})",
                signal, generation, self.generation
            );
            return Vec::new();
        }

        let mut effects = match signal {
            Signal::Resolved(Ok(resolved)) => self.on_resolved(resolved),
            Signal::Resolved(Err(err)) => {
                self.with_active(|active, _| active.fail(err.to_string()));
                Vec::new()
            }
            Signal::PreflightFinished(result) => self.on_preflight(result),
            Signal::Resigned(result) => self.on_resigned(result),
            Signal::TimerFired(kind) => {
                self.on_timer(kind);
                Vec::new()
            }
            Signal::FrameLoaded { revision } => {
                if self.is_current_embed(revision) {
                    self.with_active(|active, _| {
                        active.frame_loaded = true;
                        active.session.loading = false;
                    });
                }
                Vec::new()
            }
            Signal::FrameFailed { revision, error } => {
                if self.is_current_embed(revision) {
                    self.on_frame_failed(error);
                }
                Vec::new()
            }
        };
        effects.extend(self.rearm_safety());
        effects
    }

    fn teardown(&mut self) -> Vec<Effect> {
        match self.active.take() {
            Some(active) => {
                debug!("[Viewer] Tearing down session {}", active.session.generation);
                vec![Effect::CancelTimers {
                    generation: active.session.generation,
                }]
            }
            None => Vec::new(),
        }
    }

    fn is_current_embed(&self, revision: u32) -> bool {
        let current = self.session().map_or(0, |session| session.revision);
        if current != revision {
            debug!(
                "[Viewer] Discarding renderer event for embed {} (showing {})",
                revision, current
            );
        }
        current == revision
    }

    /// A swap after the safety timer fired turns the loading indicator back
    /// on; it needs a fresh cap.
    fn rearm_safety(&mut self) -> Vec<Effect> {
        let after = Duration::from_millis(self.settings.safety_timeout_ms);
        let Some(active) = self.active.as_mut() else {
            return Vec::new();
        };
        if !active.safety_fired || !active.session.loading {
            return Vec::new();
        }
        active.safety_fired = false;
        vec![Effect::ArmTimer {
            generation: active.session.generation,
            kind: TimerKind::Safety,
            after,
        }]
    }

    fn with_active<R>(&mut self, f: impl FnOnce(&mut ActiveSession, &HostTable) -> R) -> Option<R> {
        let hosts = self.hosts.clone();
        self.active.as_mut().map(|active| f(active, &hosts))
    }

    fn on_resolved(&mut self, resolved: ResolvedLocator) -> Vec<Effect> {
        let generation = self.generation;
        let loading = self
            .session()
            .is_some_and(|session| session.status == SessionStatus::Loading);
        if !loading {
            debug!("[Viewer] Session {} already settled, ignoring resolution", generation);
            return Vec::new();
        }
        let is_document = resolved.host_category == HostCategory::DocumentHost;

        if is_document && self.settings.document_host_mode == DocumentHostMode::Link {
            info!(
                "[Viewer] Session {} opens document host externally",
                generation
            );
            let mut effects = vec![Effect::OpenExternal {
                url: resolved.primary_embed.clone(),
            }];
            effects.extend(self.close());
            return effects;
        }

        let alternate_after = Duration::from_millis(self.settings.alternate_timeout_ms);
        self.with_active(|active, hosts| {
            if let Some(err) = &resolved.degraded {
                warn!(
                    "[Viewer] Session {} continues with unsigned locator: {}",
                    generation, err
                );
            }

            let meta = &mut active.session.meta;
            meta.primary_embed = Some(resolved.primary_embed.clone());
            meta.alternate_embed = resolved.alternate_embed.clone();
            meta.is_proxied = resolved.is_proxied;

            active.show(resolved.primary_embed.clone(), hosts);
            active.session.status = SessionStatus::Ready;

            let mut effects = Vec::new();
            if resolved.is_proxied {
                effects.push(Effect::Preflight {
                    generation,
                    url: resolved.final_url.clone(),
                });
            }
            if is_document && resolved.alternate_embed.is_some() {
                effects.push(Effect::ArmTimer {
                    generation,
                    kind: TimerKind::Alternate,
                    after: alternate_after,
                });
            }
            active.resolved = Some(resolved);
            effects
        })
        .unwrap_or_default()
    }

    fn on_preflight(&mut self, result: Result<(), PreflightError>) -> Vec<Effect> {
        let generation = self.generation;
        self.with_active(|active, _| match result {
            Ok(()) => Vec::new(),
            Err(PreflightError::Unauthorized) if !active.resign_attempted => {
                active.resign_attempted = true;
                info!("[Viewer] Session {} unauthorized, re-signing once", generation);
                vec![Effect::Resign {
                    generation,
                    locator: active.session.meta.raw.clone(),
                }]
            }
            Err(err) => {
                warn!("[Viewer] Session {} preflight failed: {}", generation, err);
                active.fail(err.user_message());
                Vec::new()
            }
        })
        .unwrap_or_default()
    }

    fn on_resigned(&mut self, result: Result<String, ResolutionError>) -> Vec<Effect> {
        let generation = self.generation;
        self.with_active(|active, hosts| match result {
            Ok(url) => {
                if let Some(resolved) = active.resolved.as_mut() {
                    resolved.final_url = url.clone();
                    resolved.primary_embed = url.clone();
                }
                active.session.meta.primary_embed = Some(url.clone());
                active.show(url.clone(), hosts);
                vec![Effect::Preflight { generation, url }]
            }
            Err(err) => {
                warn!("[Viewer] Session {} re-sign failed: {}", generation, err);
                active.fail(PreflightError::Unauthorized.user_message());
                Vec::new()
            }
        })
        .unwrap_or_default()
    }

    fn on_timer(&mut self, kind: TimerKind) {
        self.with_active(|active, hosts| match kind {
            TimerKind::Safety => {
                active.safety_fired = true;
                active.session.loading = false;
                if active.session.status == SessionStatus::Loading {
                    active.fail(TIMED_OUT_MESSAGE);
                }
            }
            TimerKind::Alternate => {
                if active.frame_loaded
                    || active.swapped_to_alternate
                    || active.session.status != SessionStatus::Ready
                {
                    return;
                }
                if active.swap_to_alternate(hosts) {
                    info!(
                        "[Viewer] Session {} primary embed silent, using alternate",
                        active.session.generation
                    );
                }
            }
        });
    }

    fn on_frame_failed(&mut self, err: RenderError) {
        self.with_active(|active, hosts| {
            let escalate = active.session.meta.host_category == HostCategory::DocumentHost
                && !active.swapped_to_alternate
                && active.swap_to_alternate(hosts);
            if !escalate {
                active.fail(err.to_string());
            }
        });
    }
}
