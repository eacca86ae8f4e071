//! Session manager: runs commands for a user's terminal session.
//!
//! One `exec` call produces one output stream. The stream is fed by a task
//! that owns the whole lifecycle: cwd re-derivation, classification, launch,
//! registration, pumping, and the closing meta with the recomputed cwd.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use bytes::Bytes;
use termbridge_core::{
    BridgeConfig, ExecutionId, OutputMessage, Session, SessionStore, StoreError, User, UserId,
    WorkspaceContext, WorkspaceResolver, unix_now,
};
use termbridge_exec::{
    Builtin, Classification, Classifier, ExecError, Launcher, ProcessRegistry, PumpConfig,
    SearchPath, pump,
};
use tokio::{
    sync::{Mutex, OwnedMutexGuard, mpsc},
    task::JoinHandle,
};
use tokio_stream::wrappers::ReceiverStream;

use crate::cwd;

/// Stream of wire messages for one exec call.
pub type ExecStream = ReceiverStream<OutputMessage>;

/// Session manager error.
#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("A command is already running in this session")]
    Busy,
    #[error("Process not found: {0}")]
    UnknownProcessId(ExecutionId),
    #[error("Exec error: {0}")]
    Exec(ExecError),
}

impl From<ExecError> for ManagerError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::UnknownProcessId(id) => Self::UnknownProcessId(id),
            other => Self::Exec(other),
        }
    }
}

/// What a client needs to render a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptInfo {
    pub cwd: String,
    pub user: String,
}

/// Everything one exec task needs once it is detached from the request.
struct ExecJob {
    user: User,
    root: Option<PathBuf>,
    session: Session,
    command: String,
    tx: mpsc::Sender<OutputMessage>,
}

/// Orchestrates sessions, the process registry and the exec pipeline.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    workspaces: Arc<dyn WorkspaceResolver>,
    classifier: Classifier,
    launcher: Launcher,
    registry: ProcessRegistry,
    config: BridgeConfig,
    foreground: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl SessionManager {
    /// Create a manager that launches through the host shell.
    #[must_use]
    pub fn new(
        store: Arc<dyn SessionStore>,
        workspaces: Arc<dyn WorkspaceResolver>,
        search: Arc<SearchPath>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            store,
            workspaces,
            classifier: Classifier::new(Arc::clone(&search)),
            launcher: Launcher::detect(search),
            registry: ProcessRegistry::new(),
            config,
            foreground: Mutex::new(HashMap::new()),
        }
    }

    /// Create a manager after discovering the toolchain search path.
    pub async fn discover(
        store: Arc<dyn SessionStore>,
        workspaces: Arc<dyn WorkspaceResolver>,
        config: BridgeConfig,
    ) -> Self {
        let search = SearchPath::discover(&config.extra_search_paths).await;
        tracing::info!(
            augmentations = search.augmentations().len(),
            "Discovered toolchain search path"
        );
        Self::new(store, workspaces, Arc::new(search), config)
    }

    /// Replace the launcher.
    #[must_use]
    pub fn with_launcher(mut self, launcher: Launcher) -> Self {
        self.launcher = launcher;
        self
    }

    /// Replace the classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = classifier;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    #[must_use]
    pub const fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    /// Run a command line in the user's session.
    ///
    /// The returned stream ends after the closing meta, or after a single
    /// error message if the process could not be started.
    ///
    /// # Errors
    /// Returns `Busy` while another command of this session is running, or a
    /// storage error if the session cannot be loaded.
    pub async fn exec(
        self: &Arc<Self>,
        user: &User,
        ctx: &WorkspaceContext,
        command: &str,
    ) -> Result<ExecStream, ManagerError> {
        let guard = self
            .foreground_lock(&user.id)
            .await
            .try_lock_owned()
            .map_err(|_| ManagerError::Busy)?;

        let root = self.resolve_root(user, ctx).await;
        let mut session = self.prepare_session(&user.id, root.as_deref()).await?;
        session.touch();
        self.store.save(session.clone()).await?;

        let (tx, rx) = mpsc::channel(self.config.stream_capacity.max(1));
        let job = ExecJob {
            user: user.clone(),
            root,
            session,
            command: command.to_string(),
            tx,
        };
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run(job, guard).await });

        Ok(ReceiverStream::new(rx))
    }

    /// Forward stdin to a running execution of this user.
    ///
    /// # Errors
    /// Returns `UnknownProcessId` if the id is not a live execution of `user`.
    pub async fn stdin(
        &self,
        user: &User,
        process_id: &ExecutionId,
        input: impl Into<Bytes>,
    ) -> Result<(), ManagerError> {
        self.registry
            .send_input(&user.id, process_id, input.into())
            .await?;
        Ok(())
    }

    /// Kill a running execution's process group.
    ///
    /// # Errors
    /// Returns `UnknownProcessId` if the id is not a live execution of `user`.
    pub async fn interrupt(
        &self,
        user: &User,
        process_id: &ExecutionId,
    ) -> Result<(), ManagerError> {
        self.registry.interrupt(&user.id, process_id).await?;
        Ok(())
    }

    /// Current prompt for the user's session, creating the session if needed.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn prompt(
        &self,
        user: &User,
        ctx: &WorkspaceContext,
    ) -> Result<PromptInfo, ManagerError> {
        let root = self.resolve_root(user, ctx).await;
        let session = self.prepare_session(&user.id, root.as_deref()).await?;
        Ok(PromptInfo {
            cwd: cwd::display_cwd(&session.cwd, root.as_deref()),
            user: user.name.clone(),
        })
    }

    /// Forget a user's session (logout).
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn end_session(&self, user_id: &str) -> Result<(), ManagerError> {
        self.store.remove(user_id).await?;
        self.foreground.lock().await.remove(user_id);
        tracing::info!(user = user_id, "Session ended");
        Ok(())
    }

    /// Evict sessions idle for longer than the TTL.
    ///
    /// Sessions with a running command are kept.
    ///
    /// # Errors
    /// Returns error if the store fails.
    pub async fn evict_idle(&self) -> Result<usize, ManagerError> {
        let ttl = i64::try_from(self.config.session_ttl_secs).unwrap_or(i64::MAX);
        let cutoff = unix_now().saturating_sub(ttl);
        let idle = self.store.idle_since(cutoff).await?;

        let mut evicted = 0;
        let mut foreground = self.foreground.lock().await;
        for user_id in idle {
            let busy = foreground
                .get(&user_id)
                .is_some_and(|lock| lock.try_lock().is_err());
            if busy {
                continue;
            }
            self.store.remove(&user_id).await?;
            foreground.remove(&user_id);
            evicted += 1;
        }
        drop(foreground);

        if evicted > 0 {
            tracing::info!(evicted, "Evicted idle sessions");
        }
        Ok(evicted)
    }

    /// Run [`Self::evict_idle`] periodically until the manager is dropped.
    #[must_use]
    pub fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let period = self.config.sweep_interval();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(manager) = weak.upgrade() else {
                    break;
                };
                if let Err(e) = manager.evict_idle().await {
                    tracing::warn!(error = %e, "Session sweep failed");
                }
            }
        })
    }

    async fn foreground_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.foreground.lock().await;
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    async fn resolve_root(&self, user: &User, ctx: &WorkspaceContext) -> Option<PathBuf> {
        let root = self.workspaces.resolve_root(user, ctx).await?;
        cwd::verified_dir(&root)
    }

    /// Load or create the session and re-derive its cwd against `root`.
    async fn prepare_session(
        &self,
        user_id: &str,
        root: Option<&Path>,
    ) -> Result<Session, ManagerError> {
        let fallback = cwd::default_dir(self.config.default_cwd.as_deref());
        let Some(mut session) = self.store.load(user_id).await? else {
            let start = root.map_or(fallback, Path::to_path_buf);
            let session = Session::new(user_id, start, root.map(Path::to_path_buf));
            self.store.save(session.clone()).await?;
            tracing::info!(user = user_id, cwd = %session.cwd.display(), "Session created");
            return Ok(session);
        };

        let cwd = if session.root.as_deref() == root {
            cwd::rederive(&session.cwd, root, &fallback)
        } else {
            tracing::debug!(user = user_id, root = ?root, "Workspace changed");
            root.map_or(fallback, Path::to_path_buf)
        };
        if cwd != session.cwd {
            tracing::debug!(
                user = user_id,
                from = %session.cwd.display(),
                to = %cwd.display(),
                "Session cwd reset"
            );
        }
        session.cwd = cwd;
        session.root = root.map(Path::to_path_buf);
        Ok(session)
    }

    async fn run(&self, job: ExecJob, _guard: OwnedMutexGuard<()>) {
        let ExecJob {
            user,
            root,
            mut session,
            command,
            tx,
        } = job;

        let exit_code = match self.classifier.classify(&command, &session.cwd).await {
            Classification::Empty => 0,
            Classification::Builtin(Builtin::Cd { target }) => {
                let home = dirs::home_dir();
                match cwd::resolve_cd(
                    &session.cwd,
                    root.as_deref(),
                    home.as_deref(),
                    target.as_deref(),
                ) {
                    Ok(dir) => {
                        session.cwd = dir;
                        session.touch();
                        if let Err(e) = self.store.save(session.clone()).await {
                            tracing::error!(user = %user.id, error = %e, "Failed to save session");
                            let _ = tx.send(OutputMessage::error(e.to_string())).await;
                            return;
                        }
                        0
                    }
                    Err(e) => {
                        let _ = tx.send(OutputMessage::output(e.message())).await;
                        1
                    }
                }
            }
            Classification::Blocked(blocked) => {
                tracing::debug!(user = %user.id, program = %blocked.program, kind = ?blocked.kind, "Command blocked");
                let _ = tx.send(OutputMessage::output(blocked.message.clone())).await;
                blocked.exit_code()
            }
            Classification::Dispatchable(cmd) => {
                let process = match self.launcher.spawn(&cmd.line, &session.cwd) {
                    Ok(process) => process,
                    Err(e) => {
                        tracing::warn!(user = %user.id, command = %cmd.line, error = %e, "Launch failed");
                        let _ = tx.send(OutputMessage::error(e.to_string())).await;
                        return;
                    }
                };

                let reg = self.registry.register(&user.id, &cmd.line).await;
                let id = reg.id.clone();
                if tx.send(OutputMessage::started(id.clone())).await.is_err() {
                    tracing::debug!(process_id = %id, "Client left before start");
                }

                let outcome = pump(
                    process,
                    reg.relay,
                    reg.interrupt_rx,
                    &tx,
                    PumpConfig::from(&self.config),
                )
                .await;
                self.registry.remove(&id).await;
                tracing::info!(
                    user = %user.id,
                    process_id = %id,
                    exit_code = outcome.exit_code,
                    interrupted = outcome.interrupted,
                    disconnected = outcome.disconnected,
                    "Command finished"
                );
                outcome.exit_code
            }
        };

        let fallback = cwd::default_dir(self.config.default_cwd.as_deref());
        let cwd = cwd::rederive(&session.cwd, root.as_deref(), &fallback);
        let _ = tx
            .send(OutputMessage::finished(
                cwd::display_cwd(&cwd, root.as_deref()),
                user.name.clone(),
                exit_code,
            ))
            .await;
    }
}
