use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{Receiver, Sender},
        Arc, Mutex,
    },
    thread,
    time::Duration,
};
use tracing::{error, info, warn};

use crate::catalog::{self, CatalogEntry};
use crate::config::Settings;
use crate::error::{EngineError, Result};
use crate::library::{self, ModDescriptor};
use crate::lifecycle::{self, BatchReport, PackReport, ToggleOutcome};
use crate::loader::{self, LoaderState};
use crate::notify;
use crate::store::ModStore;
use crate::update::{self, UpdateCheck, UpdateStatus};
use crate::worker::WorkerPool;

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Results and progress delivered back from background workers over a
/// single-consumer channel; the owning control thread drains and applies
/// them between operations.
#[derive(Debug)]
pub enum EngineEvent {
    Status(String),
    CatalogLoaded(Vec<CatalogEntry>),
    InstallFinished {
        title: String,
        outcome: std::result::Result<String, String>,
    },
    SweepFinished {
        checks: Vec<UpdateCheck>,
        installed: Vec<String>,
    },
}

/// Everything lifecycle operations mutate, behind the engine's single lock.
/// No globals: workers and the sweep timer reach this state only through the
/// same mutex as user-initiated operations.
pub struct EngineState {
    pub settings: Settings,
    pub store: ModStore,
    pub catalog: Vec<CatalogEntry>,
}

struct Shared {
    data_dir: PathBuf,
    state: Mutex<EngineState>,
    busy: Mutex<HashSet<String>>,
    events: Sender<EngineEvent>,
    running: AtomicBool,
}

/// The serialized lifecycle engine. Mutating operations take the state lock
/// for their whole duration (filesystem copies included) and release it on
/// every exit path; a second operation on a mod already in flight is refused
/// with `Busy` instead of being started concurrently.
pub struct Engine {
    shared: Arc<Shared>,
    pool: WorkerPool,
    events_rx: Receiver<EngineEvent>,
}

impl Engine {
    pub fn open(data_dir: PathBuf) -> anyhow::Result<Self> {
        let settings = Settings::load_or_create(&data_dir)?;
        let store = ModStore::open(&data_dir)?;
        let (events, events_rx) = std::sync::mpsc::channel();
        let shared = Arc::new(Shared {
            data_dir,
            state: Mutex::new(EngineState {
                settings,
                store,
                catalog: Vec::new(),
            }),
            busy: Mutex::new(HashSet::new()),
            events,
            running: AtomicBool::new(true),
        });
        Ok(Self {
            shared,
            pool: WorkerPool::new(3),
            events_rx,
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.shared.data_dir
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, EngineState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn claim(&self, id: &str) -> Result<BusyGuard> {
        BusyGuard::claim(&self.shared, id)
    }

    fn report(&self, context: &str, message: &str) {
        error!(%context, "{message}");
        let state = self.lock_state();
        notify::report_error(&state.settings, context, message);
        drop(state);
        let _ = self
            .shared
            .events
            .send(EngineEvent::Status(format!("{context}: {message}")));
    }

    /// Drains events queued by background workers, applying the ones that
    /// update engine state, and hands them back for display.
    pub fn drain_events(&self) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events_rx.try_recv() {
            if let EngineEvent::CatalogLoaded(entries) = &event {
                self.set_catalog(entries.clone());
            }
            events.push(event);
        }
        events
    }

    pub fn settings(&self) -> Settings {
        self.lock_state().settings.clone()
    }

    pub fn update_settings(&self, apply: impl FnOnce(&mut Settings)) -> anyhow::Result<()> {
        let mut state = self.lock_state();
        apply(&mut state.settings);
        state.settings.save(&self.shared.data_dir)
    }

    fn require_game_path(state: &EngineState) -> Result<PathBuf> {
        state
            .settings
            .valid_game_path()
            .map(Path::to_path_buf)
            .ok_or(EngineError::GamePathUnset)
    }

    // -- catalog ----------------------------------------------------------

    pub fn refresh_catalog(&self) -> Result<usize> {
        let entries = catalog::fetch_catalog()?;
        let count = entries.len();
        self.lock_state().catalog = entries;
        Ok(count)
    }

    pub fn refresh_catalog_async(&self) {
        let shared = Arc::clone(&self.shared);
        self.pool.submit(move || match catalog::fetch_catalog() {
            Ok(entries) => {
                let _ = shared.events.send(EngineEvent::CatalogLoaded(entries));
            }
            Err(err) => {
                let _ = shared
                    .events
                    .send(EngineEvent::Status(format!("catalog refresh failed: {err}")));
            }
        });
    }

    pub fn catalog(&self) -> Vec<CatalogEntry> {
        self.lock_state().catalog.clone()
    }

    /// Replaces the in-memory catalog snapshot, the same application step a
    /// `CatalogLoaded` event performs.
    pub fn set_catalog(&self, entries: Vec<CatalogEntry>) {
        self.lock_state().catalog = entries;
    }

    pub fn installed(&self) -> Vec<ModDescriptor> {
        library::installed_mods(&self.lock_state().store)
    }

    /// Registers unmanaged plugin-directory contents as third-party mods.
    pub fn absorb(&self) -> Result<Vec<ModDescriptor>> {
        let state = self.lock_state();
        let game_path = Self::require_game_path(&state)?;
        let absorbed = catalog::absorb_existing(&state.store, &game_path)?;
        if !absorbed.is_empty() {
            library::refresh_cache(&state.store, &self.shared.data_dir);
        }
        Ok(absorbed)
    }

    // -- lifecycle --------------------------------------------------------

    pub fn install_titles(&self, titles: &[String]) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        for title in titles {
            let result = self.install_title(title);
            if let Err(err) = &result {
                self.report("install", &format!("{title}: {err}"));
            }
            report.record(title, result.map(|_| ()));
        }
        Ok(report)
    }

    fn install_title(&self, title: &str) -> Result<ModDescriptor> {
        let (entry, game_path) = {
            let state = self.lock_state();
            let game_path = Self::require_game_path(&state)?;
            let entry = catalog::find_by_title(&state.catalog, title)
                .cloned()
                .ok_or_else(|| EngineError::NotInCatalog(title.to_string()))?;
            (entry, game_path)
        };
        let _busy = self.claim(&entry.resolved_id()?)?;
        let release = update::query_release(&entry.download).ok();

        let state = self.lock_state();
        lifecycle::install(
            &state.store,
            &self.shared.data_dir,
            &game_path,
            &entry,
            release.as_ref(),
        )
    }

    /// Dispatches an install to the worker pool; the result arrives as an
    /// `InstallFinished` event. The mod's id stays claimed until the worker
    /// finishes, so overlapping requests for the same mod are refused.
    pub fn install_title_async(&self, title: &str) -> Result<()> {
        let (entry, game_path) = {
            let state = self.lock_state();
            let game_path = Self::require_game_path(&state)?;
            let entry = catalog::find_by_title(&state.catalog, title)
                .cloned()
                .ok_or_else(|| EngineError::NotInCatalog(title.to_string()))?;
            (entry, game_path)
        };
        let busy = BusyGuard::claim(&self.shared, &entry.resolved_id()?)?;
        let shared = Arc::clone(&self.shared);
        let title = title.to_string();
        self.pool.submit(move || {
            let _busy = busy;
            let release = update::query_release(&entry.download).ok();
            let state = shared
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let result = lifecycle::install(
                &state.store,
                &shared.data_dir,
                &game_path,
                &entry,
                release.as_ref(),
            );
            drop(state);
            let outcome = result
                .map(|descriptor| descriptor.id)
                .map_err(|err| err.to_string());
            let _ = shared.events.send(EngineEvent::InstallFinished { title, outcome });
        });
        Ok(())
    }

    pub fn import(&self, archive: &Path) -> Result<ModDescriptor> {
        let state = self.lock_state();
        let game_path = Self::require_game_path(&state)?;
        lifecycle::import_package(&state.store, &self.shared.data_dir, &game_path, archive)
    }

    pub fn enable(&self, id: &str) -> Result<ToggleOutcome> {
        let _busy = self.claim(id)?;
        let state = self.lock_state();
        let game_path = Self::require_game_path(&state)?;
        lifecycle::enable(&state.store, &self.shared.data_dir, &game_path, id)
    }

    pub fn disable(&self, id: &str) -> Result<ToggleOutcome> {
        let _busy = self.claim(id)?;
        let state = self.lock_state();
        let game_path = Self::require_game_path(&state)?;
        lifecycle::disable(&state.store, &self.shared.data_dir, &game_path, id)
    }

    pub fn uninstall(&self, id: &str) -> Result<()> {
        let _busy = self.claim(id)?;
        let state = self.lock_state();
        let game_path = Self::require_game_path(&state)?;
        lifecycle::uninstall(&state.store, &self.shared.data_dir, &game_path, id)
    }

    pub fn apply_pack(&self, name: &str) -> Result<PackReport> {
        let titles =
            lifecycle::pack_titles(name).ok_or_else(|| EngineError::NotInCatalog(name.to_string()))?;
        let state = self.lock_state();
        let game_path = Self::require_game_path(&state)?;
        let report = lifecycle::apply_pack(
            &state.store,
            &self.shared.data_dir,
            &game_path,
            name,
            titles,
            &state.catalog,
        );
        drop(state);
        for (member, reason) in &report.members.failed {
            self.report("apply-pack", &format!("{member}: {reason}"));
        }
        Ok(report)
    }

    // -- updates ----------------------------------------------------------

    pub fn check_updates(&self) -> Vec<UpdateCheck> {
        let state = self.lock_state();
        let installed = library::installed_mods(&state.store);
        let catalog = state.catalog.clone();
        drop(state);
        // release queries are network-bound; run them off the lock
        update::check_all(&installed, &catalog)
    }

    /// Installs every mod the check pass found stale. Failures are reported
    /// per mod and the rest of the batch continues.
    pub fn apply_updates(&self) -> Result<BatchReport> {
        let checks = self.check_updates();
        let stale: Vec<String> = checks
            .into_iter()
            .filter(|check| matches!(check.status, UpdateStatus::Available { .. }))
            .map(|check| check.title)
            .collect();
        if stale.is_empty() {
            return Ok(BatchReport::default());
        }
        info!(count = stale.len(), "applying mod updates");
        self.install_titles(&stale)
    }

    // -- loader -----------------------------------------------------------

    pub fn loader_state(&self) -> Result<LoaderState> {
        let state = self.lock_state();
        let game_path = Self::require_game_path(&state)?;
        Ok(loader::state(&game_path))
    }

    pub fn loader_install(&self) -> Result<String> {
        let mut state = self.lock_state();
        let game_path = Self::require_game_path(&state)?;
        let version = loader::install_or_update(&self.shared.data_dir, &game_path, &mut state.settings)?;
        if let Err(err) = state.settings.save(&self.shared.data_dir) {
            warn!("failed to persist loader version: {err}");
        }
        Ok(version)
    }

    pub fn loader_toggle(&self) -> Result<LoaderState> {
        let state = self.lock_state();
        let game_path = Self::require_game_path(&state)?;
        loader::toggle(&game_path)
    }

    pub fn loader_uninstall(&self) -> Result<()> {
        let mut state = self.lock_state();
        let game_path = Self::require_game_path(&state)?;
        loader::uninstall(&game_path, &mut state.settings)?;
        if let Err(err) = state.settings.save(&self.shared.data_dir) {
            warn!("failed to persist loader removal: {err}");
        }
        Ok(())
    }

    // -- periodic sweep ---------------------------------------------------

    /// Starts the hourly silent update sweep. The sweep takes the same state
    /// lock as user operations, so it can never interleave with one.
    pub fn start_periodic_sweep(&self) {
        let shared = Arc::clone(&self.shared);
        thread::Builder::new()
            .name("tacklebox-sweep-timer".to_string())
            .spawn(move || {
                let tick = Duration::from_secs(1);
                let mut elapsed = Duration::ZERO;
                while shared.running.load(Ordering::Relaxed) {
                    thread::sleep(tick);
                    elapsed += tick;
                    if elapsed < SWEEP_INTERVAL {
                        continue;
                    }
                    elapsed = Duration::ZERO;
                    run_sweep(&shared);
                }
            })
            .expect("spawn sweep timer");
    }

    /// One silent sweep, exactly what the hourly timer runs.
    pub fn run_sweep_now(&self) {
        run_sweep(&self.shared);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shared.running.store(false, Ordering::Relaxed);
    }
}

fn run_sweep(shared: &Arc<Shared>) {
    let (auto_update, catalog, store, data_dir, game_path) = {
        let state = shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(game_path) = state.settings.valid_game_path().map(Path::to_path_buf) else {
            return;
        };
        (
            state.settings.auto_update,
            state.catalog.clone(),
            state.store.clone(),
            shared.data_dir.clone(),
            game_path,
        )
    };
    if !auto_update {
        return;
    }

    let installed = library::installed_mods(&store);
    let checks = update::check_all(&installed, &catalog);
    let stale: Vec<CatalogEntry> = checks
        .iter()
        .filter(|check| matches!(check.status, UpdateStatus::Available { .. }))
        .filter_map(|check| catalog::find_by_title(&catalog, &check.title).cloned())
        .collect();

    let mut installed_titles = Vec::new();
    if !stale.is_empty() {
        let state = shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let report = lifecycle::install_many(&state.store, &data_dir, &game_path, &stale);
        installed_titles = report.succeeded;
        for (title, reason) in &report.failed {
            warn!(%title, "silent update failed: {reason}");
        }
        drop(state);
    }
    let _ = shared.events.send(EngineEvent::SweepFinished {
        checks,
        installed: installed_titles,
    });
}

/// Marks a mod id as having an operation in flight; cleared on drop so the
/// claim survives early returns and failures alike.
struct BusyGuard {
    shared: Arc<Shared>,
    id: String,
}

impl BusyGuard {
    fn claim(shared: &Arc<Shared>, id: &str) -> Result<Self> {
        let mut busy = shared
            .busy
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !busy.insert(id.to_string()) {
            return Err(EngineError::Busy(id.to_string()));
        }
        Ok(Self {
            shared: Arc::clone(shared),
            id: id.to_string(),
        })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        if let Ok(mut busy) = self.shared.busy.lock() {
            busy.remove(&self.id);
        }
    }
}
