//! Filesystem watching and diff passes.
//!
//! ## Lifecycle of a file
//!
//! Every file moves through `Unseen -> Seeded -> Stable`. The first successful
//! load stores a snapshot without comparing anything. Every later load is
//! diffed against the stored snapshot, the resulting events are recorded, and
//! the snapshot is replaced.
//!
//! ## Debouncing
//!
//! Raw notifications arrive in bursts while a file is being written. Each
//! notification for a file cancels that file's pending timer and starts a new
//! one; only a timer that runs out triggers a diff pass. A file settling
//! again while its pass is still running gets exactly one follow-up pass.

use crate::audit::{self, AuditTrail};
use crate::config::WatchSettings;
use crate::diff::diff;
use crate::error::{ReportError, ReportResult};
use crate::tabular::{self, TabularLoader};
use notify::{Config as NotifyConfig, Event, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher};
use reportwatch_snapshot::SnapshotStore;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Where a file is in its observation lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePhase {
    /// Never loaded successfully.
    Unseen,
    /// Snapshot stored, no comparison made yet.
    Seeded,
    /// At least one diff pass completed.
    Stable,
}

/// What a single diff pass did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// First sighting: snapshot stored, nothing compared.
    Seeded { rows: usize },
    /// Compared against the previous snapshot.
    Compared { changes: usize, recorded: usize },
}

/// Counters for health reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatchStats {
    pub active: bool,
    pub notifications: u64,
    pub passes: u64,
    pub changes: u64,
    pub failures: u64,
}

#[derive(Debug, Default)]
struct WatchState {
    active: AtomicBool,
    notifications: AtomicU64,
    passes: AtomicU64,
    changes: AtomicU64,
    failures: AtomicU64,
    phases: RwLock<HashMap<String, FilePhase>>,
}

impl WatchState {
    fn set_phase(&self, file_id: &str, phase: FilePhase) {
        let mut phases = self.phases.write().unwrap_or_else(|e| e.into_inner());
        phases.insert(file_id.to_string(), phase);
    }

    fn phase(&self, file_id: &str) -> Option<FilePhase> {
        let phases = self.phases.read().unwrap_or_else(|e| e.into_inner());
        phases.get(file_id).copied()
    }
}

/// Files with a diff pass running, each flagged when another settled
/// trigger arrived meanwhile.
#[derive(Debug, Default)]
struct InFlight {
    rerun: HashMap<String, bool>,
}

impl InFlight {
    /// Whether a pass should start now. Otherwise a single rerun is queued.
    fn begin(&mut self, file_id: &str) -> bool {
        match self.rerun.get_mut(file_id) {
            Some(flag) => {
                *flag = true;
                false
            }
            None => {
                self.rerun.insert(file_id.to_string(), false);
                true
            }
        }
    }

    /// Whether the queued rerun should start now that a pass finished.
    fn finish(&mut self, file_id: &str) -> bool {
        match self.rerun.get_mut(file_id) {
            Some(flag) if *flag => {
                *flag = false;
                true
            }
            _ => {
                self.rerun.remove(file_id);
                false
            }
        }
    }
}

/// Watches the report tree and turns file changes into recorded events.
#[derive(Debug)]
pub struct WatchController {
    root: PathBuf,
    snapshots: Arc<SnapshotStore>,
    audit: AuditTrail,
    loader: TabularLoader,
    settings: WatchSettings,
    state: WatchState,
}

impl WatchController {
    pub fn new(
        root: impl Into<PathBuf>,
        snapshots: Arc<SnapshotStore>,
        audit: AuditTrail,
        loader: TabularLoader,
        settings: WatchSettings,
    ) -> Self {
        Self {
            root: root.into(),
            snapshots,
            audit,
            loader,
            settings,
            state: WatchState::default(),
        }
    }

    /// The watched root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Current phase of a file.
    pub fn phase(&self, file_id: &str) -> FilePhase {
        match self.state.phase(file_id) {
            Some(phase) => phase,
            // Edits can seed a file the watcher has not loaded itself.
            None if self.snapshots.contains(file_id) => FilePhase::Seeded,
            None => FilePhase::Unseen,
        }
    }

    pub fn stats(&self) -> WatchStats {
        WatchStats {
            active: self.state.active.load(Ordering::SeqCst),
            notifications: self.state.notifications.load(Ordering::SeqCst),
            passes: self.state.passes.load(Ordering::SeqCst),
            changes: self.state.changes.load(Ordering::SeqCst),
            failures: self.state.failures.load(Ordering::SeqCst),
        }
    }

    /// Run one load -> compare -> snapshot update cycle for a file.
    ///
    /// A failed load leaves the snapshot untouched. Failed audit records are
    /// logged and do not hold back the snapshot update.
    pub async fn diff_pass(&self, file_id: &str) -> ReportResult<PassOutcome> {
        let path = tabular::resolve(&self.root, file_id)?;
        let guard = self.snapshots.lock(file_id).await;

        let current = match self.loader.load(&path).await {
            Ok(rows) => rows,
            Err(e) => {
                self.state.failures.fetch_add(1, Ordering::SeqCst);
                return Err(e);
            }
        };
        self.state.passes.fetch_add(1, Ordering::SeqCst);

        let Some(previous) = self.snapshots.get(file_id) else {
            let rows = current.len();
            self.snapshots.put(&guard, current);
            self.state.set_phase(file_id, FilePhase::Seeded);
            info!(file = %file_id, rows, "Seeded snapshot");
            return Ok(PassOutcome::Seeded { rows });
        };

        let events = diff(
            file_id,
            &previous.rows,
            &current,
            &self.settings.automated_identity,
            audit::now(),
        );
        let recorded = self.audit.append_all(&events).await;

        self.snapshots.put(&guard, current);
        self.state.set_phase(file_id, FilePhase::Stable);
        self.state
            .changes
            .fetch_add(events.len() as u64, Ordering::SeqCst);

        if events.is_empty() {
            debug!(file = %file_id, "No changes detected");
        } else {
            info!(file = %file_id, changes = events.len(), recorded, "Detected changes");
        }

        Ok(PassOutcome::Compared {
            changes: events.len(),
            recorded,
        })
    }

    /// Run a diff pass over every file currently under the root.
    ///
    /// Returns how many passes succeeded.
    pub async fn seed_all(&self) -> ReportResult<usize> {
        let files = tabular::discover(&self.root)?;
        let mut seeded = 0;
        for file_id in &files {
            match self.diff_pass(file_id).await {
                Ok(_) => seeded += 1,
                Err(e) => warn!(file = %file_id, code = %e.kind(), error = %e, "Initial load failed"),
            }
        }
        info!(files = files.len(), seeded, "Initial scan complete");
        Ok(seeded)
    }

    /// Watch the root until `shutdown` is cancelled.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) -> ReportResult<()> {
        let root = self.root.canonicalize()?;
        let (tx, mut notifications) = mpsc::unbounded_channel::<PathBuf>();
        let _watcher = self.start_watcher(&root, tx)?;

        self.state.active.store(true, Ordering::SeqCst);
        info!(
            root = %root.display(),
            debounce_ms = self.settings.debounce.as_millis() as u64,
            polling = self.settings.poll_interval.is_some(),
            "Watching reports directory"
        );

        if self.settings.seed_on_start {
            if let Err(e) = self.seed_all().await {
                warn!(error = %e, "Initial scan failed");
            }
        }

        let (settled_tx, mut settled) = mpsc::unbounded_channel::<(String, u64)>();
        let (done_tx, mut done) = mpsc::unbounded_channel::<String>();
        let mut pending: HashMap<String, (u64, CancellationToken)> = HashMap::new();
        let mut in_flight = InFlight::default();
        let mut generation: u64 = 0;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(path) = notifications.recv() => {
                    let Some(file_id) = file_id_for(&root, &path) else {
                        continue;
                    };
                    self.state.notifications.fetch_add(1, Ordering::SeqCst);
                    generation += 1;

                    let token = CancellationToken::new();
                    if let Some((_, stale)) = pending.insert(file_id.clone(), (generation, token.clone())) {
                        stale.cancel();
                    }
                    debug!(file = %file_id, "Change notification, waiting for settlement");

                    let debounce = self.settings.debounce;
                    let settled_tx = settled_tx.clone();
                    let ticket = generation;
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = token.cancelled() => {}
                            _ = tokio::time::sleep(debounce) => {
                                let _ = settled_tx.send((file_id, ticket));
                            }
                        }
                    });
                }
                Some((file_id, ticket)) = settled.recv() => {
                    let current = pending.get(&file_id).map(|(g, _)| *g);
                    if current != Some(ticket) {
                        continue;
                    }
                    pending.remove(&file_id);

                    if in_flight.begin(&file_id) {
                        self.spawn_pass(file_id, done_tx.clone());
                    } else {
                        debug!(file = %file_id, "Diff pass still running, queued one rerun");
                    }
                }
                Some(file_id) = done.recv() => {
                    if in_flight.finish(&file_id) {
                        self.spawn_pass(file_id, done_tx.clone());
                    }
                }
            }
        }

        for (_, (_, token)) in pending {
            token.cancel();
        }
        self.state.active.store(false, Ordering::SeqCst);
        info!("Stopped watching reports directory");
        Ok(())
    }

    fn spawn_pass(self: &Arc<Self>, file_id: String, done: mpsc::UnboundedSender<String>) {
        let controller = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = controller.diff_pass(&file_id).await {
                warn!(file = %file_id, code = %e.kind(), error = %e, "Diff pass skipped");
            }
            let _ = done.send(file_id);
        });
    }

    fn start_watcher(
        &self,
        root: &Path,
        tx: mpsc::UnboundedSender<PathBuf>,
    ) -> ReportResult<Box<dyn Watcher + Send>> {
        let handler = move |result: notify::Result<Event>| match result {
            Ok(event) if is_trigger(&event.kind) => {
                for path in event.paths {
                    let _ = tx.send(path);
                }
            }
            Ok(_) => {}
            Err(e) => error!(error = %e, "Watcher error"),
        };

        let mut watcher: Box<dyn Watcher + Send> = match self.settings.poll_interval {
            Some(interval) => Box::new(PollWatcher::new(
                handler,
                NotifyConfig::default().with_poll_interval(interval),
            )?),
            None => Box::new(RecommendedWatcher::new(handler, NotifyConfig::default())?),
        };
        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(ReportError::from)?;
        Ok(watcher)
    }
}

/// Create and modify notifications trigger a pass; removals and reads do not.
fn is_trigger(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

/// Map a notification path to a file identifier, if it names a watched file.
fn file_id_for(root: &Path, path: &Path) -> Option<String> {
    if !tabular::is_tabular(path) {
        return None;
    }
    let id = reportwatch_util::path::relative_id(path, root)?;
    let hidden = id
        .split('/')
        .any(reportwatch_util::path::is_ignored_name);
    (!hidden).then_some(id)
}
