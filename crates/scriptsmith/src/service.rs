//! Entry points for callers: synchronous test generation, queued code
//! generation with polling, history access and user management.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;

use crate::access::{self, Operation, Role, User};
use crate::broadcast::{TaskProgressBroadcaster, TaskProgressEvent};
use crate::capability::Capabilities;
use crate::config::{Browser, Config};
use crate::db::{self, user_repo, Database};
use crate::error::{ConfigError, Result, ScriptsmithError, ValidationError};
use crate::extract::ArchiveExtractor;
use crate::graph::{GenerationState, Graph, GraphVariant, NodeId, NoopProgress};
use crate::history::{self, HistoryRecord};
use crate::requirement::validate_requirement;
use crate::task::{TaskHandle, TaskStatus, TaskStore, TaskTracker};
use crate::worker::{CodeGenerationJob, CodeGenerationRunner, ProjectSource, QueuedJob, WorkerPool};

pub const MIN_USERNAME_CHARS: usize = 2;
pub const MAX_USERNAME_CHARS: usize = 150;
pub const MIN_PASSWORD_CHARS: usize = 6;
pub const MAX_QUERY_CHARS: usize = 100;
/// Upper bound on rows returned by one history search.
pub const HISTORY_SEARCH_LIMIT: u64 = 500;

/// A finished synchronous run and the history row it produced.
#[derive(Debug, Clone)]
pub struct GenerationRun {
    pub state: GenerationState,
    pub visited: Vec<NodeId>,
    pub history: HistoryRecord,
}

/// A stored script packaged for download.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScriptAttachment {
    pub filename: String,
    pub content_type: String,
    pub content: String,
}

/// Task status, history and accounts over one database, without workers.
///
/// Opening it never starts the pool and never recovers queued work, so a
/// second process can poll or search while another one runs jobs.
#[derive(Clone)]
pub struct Records {
    db: Database,
    tracker: TaskTracker,
}

impl Records {
    /// Opens the configured database.
    pub fn open(config: &Config) -> Result<Self> {
        Ok(Self::new(config, open_database(config)?))
    }

    pub fn new(config: &Config, db: Database) -> Self {
        let tracker = TaskTracker::new(TaskStore::new(db.clone()))
            .with_retention(retention(config));
        Self { db, tracker }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn poll(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        Ok(self.tracker.poll(handle)?)
    }

    pub fn download_script(&self, user: &User, history_id: i64) -> Result<ScriptAttachment> {
        user.require(Operation::DownloadScript)?;
        let record = self.history_record(history_id)?;

        let filename = format!("test_script_{}.py", record.id);
        let content_type = mime_guess::from_path(&filename)
            .first_raw()
            .unwrap_or("text/x-python")
            .to_string();
        Ok(ScriptAttachment {
            filename,
            content_type,
            content: record.script,
        })
    }

    /// Substring search over all users' history, newest first.
    pub fn search_history(&self, user: &User, query: &str) -> Result<Vec<HistoryRecord>> {
        user.require(Operation::SearchHistory)?;
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(ValidationError::QueryTooLong {
                max: MAX_QUERY_CHARS,
            }
            .into());
        }
        Ok(history::search(&self.db, query, HISTORY_SEARCH_LIMIT)?)
    }

    /// Checks a username and password.
    pub fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        let denied = || ScriptsmithError::AccessDenied("invalid username or password".to_string());
        let row = user_repo::find_by_username(&self.db, username)?.ok_or_else(denied)?;
        if !access::verify_password(password, &row.password_hash) {
            return Err(denied());
        }
        Ok(User::try_from(row)?)
    }

    /// Looks up a user by name without a password check.
    pub fn find_user(&self, username: &str) -> Result<User> {
        let row = user_repo::find_by_username(&self.db, username)?
            .ok_or_else(|| ScriptsmithError::NotFound(format!("user '{}'", username)))?;
        Ok(User::try_from(row)?)
    }

    pub fn create_user(
        &self,
        admin: &User,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<User> {
        admin.require(Operation::ManageUsers)?;
        register_user(&self.db, username, password, role)
    }

    /// Deletes a user and, through the foreign key, all of their history.
    pub fn delete_user(&self, admin: &User, user_id: i64) -> Result<()> {
        admin.require(Operation::ManageUsers)?;
        if admin.id == user_id {
            return Err(ValidationError::CannotDeleteSelf.into());
        }
        if !user_repo::delete(&self.db, user_id)? {
            return Err(ScriptsmithError::NotFound(format!("user {}", user_id)));
        }
        info!(user_id, "User deleted");
        Ok(())
    }

    pub fn list_users(&self, admin: &User) -> Result<Vec<User>> {
        admin.require(Operation::ManageUsers)?;
        user_repo::list(&self.db)?
            .into_iter()
            .map(|row| User::try_from(row).map_err(ScriptsmithError::from))
            .collect()
    }

    fn history_record(&self, history_id: i64) -> Result<HistoryRecord> {
        history::find(&self.db, history_id)?
            .ok_or_else(|| ScriptsmithError::NotFound(format!("history record {}", history_id)))
    }
}

/// Owns the graph, the task store and the worker pool for one process.
///
/// Read-side calls go through the embedded [`Records`].
pub struct Orchestrator {
    records: Records,
    graph: Graph,
    store: TaskStore,
    pool: WorkerPool,
    broadcaster: TaskProgressBroadcaster,
    default_browser: Browser,
    retention: chrono::Duration,
}

impl Orchestrator {
    /// Opens the configured database and wires production capabilities.
    pub fn open(config: &Config) -> Result<Self> {
        let db = open_database(config)?;
        let capabilities = Capabilities::from_config(config)?;
        Self::new(config, db, capabilities)
    }

    /// Starts the worker pool, takes over work left by processes that
    /// stopped and sweeps expired tasks.
    pub fn new(config: &Config, db: Database, capabilities: Capabilities) -> Result<Self> {
        let broadcaster = TaskProgressBroadcaster::default();
        let store = TaskStore::new(db.clone()).with_broadcaster(broadcaster.clone());

        let runner = Arc::new(CodeGenerationRunner::new(
            capabilities.clone(),
            ArchiveExtractor::new(config.archive.clone()),
            store.clone(),
        ));
        let pool = WorkerPool::new(runner, config.worker_count)?;

        let orchestrator = Self {
            records: Records::new(config, db),
            graph: Graph::new(capabilities),
            store,
            pool,
            broadcaster,
            default_browser: config.default_browser,
            retention: retention(config),
        };

        orchestrator.purge_expired_tasks()?;
        let resumed = orchestrator.pool.resume(&orchestrator.store)?;
        if resumed > 0 {
            info!(resumed, "Resumed queued code generation tasks");
        }
        Ok(orchestrator)
    }

    /// Live task transitions.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskProgressEvent> {
        self.broadcaster.subscribe()
    }

    pub fn records(&self) -> &Records {
        &self.records
    }

    pub fn database(&self) -> &Database {
        self.records.database()
    }

    /// Runs the test-generation graph inline and records the run.
    pub fn run_test_generation(
        &self,
        user: &User,
        requirement: &str,
        browser: Browser,
    ) -> Result<GenerationRun> {
        user.require(Operation::GenerateTests)?;
        let requirement = validate_requirement(requirement)?;
        self.run_and_record(user, requirement, browser)
    }

    /// Validates the request, stores a `PENDING` task and hands the job to
    /// the pool without waiting for a free worker. Archive contents are
    /// validated by the worker.
    pub fn enqueue_code_generation(
        &self,
        user: &User,
        requirement: &str,
        browser: Browser,
        source: ProjectSource,
    ) -> Result<TaskHandle> {
        user.require(Operation::GenerateCode)?;
        let requirement = validate_requirement(requirement)?;

        let job = CodeGenerationJob {
            user_id: user.id,
            requirement,
            browser,
            source,
        };
        let handle = self.store.create(&job)?;

        if let Err(e) = self.pool.submit(QueuedJob {
            handle: handle.clone(),
            job,
        }) {
            self.store.mark_failure(&handle, &e.to_string())?;
            return Err(e.into());
        }

        info!(task = %handle, user = user.id, "Code generation queued");
        Ok(handle)
    }

    pub fn poll(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        self.records.poll(handle)
    }

    /// Runs the stored requirement again with the default browser and
    /// records a new history row.
    pub fn rerun(&self, user: &User, history_id: i64) -> Result<GenerationRun> {
        user.require(Operation::Rerun)?;
        let record = self.records.history_record(history_id)?;
        self.run_and_record(user, record.bare_requirement().to_string(), self.default_browser)
    }

    pub fn download_script(&self, user: &User, history_id: i64) -> Result<ScriptAttachment> {
        self.records.download_script(user, history_id)
    }

    pub fn search_history(&self, user: &User, query: &str) -> Result<Vec<HistoryRecord>> {
        self.records.search_history(user, query)
    }

    pub fn authenticate(&self, username: &str, password: &str) -> Result<User> {
        self.records.authenticate(username, password)
    }

    pub fn find_user(&self, username: &str) -> Result<User> {
        self.records.find_user(username)
    }

    pub fn create_user(
        &self,
        admin: &User,
        username: &str,
        password: &str,
        role: Role,
    ) -> Result<User> {
        self.records.create_user(admin, username, password, role)
    }

    pub fn delete_user(&self, admin: &User, user_id: i64) -> Result<()> {
        self.records.delete_user(admin, user_id)
    }

    pub fn list_users(&self, admin: &User) -> Result<Vec<User>> {
        self.records.list_users(admin)
    }

    /// Deletes finished tasks older than the retention window.
    pub fn purge_expired_tasks(&self) -> Result<usize> {
        Ok(self
            .store
            .purge_finished_before(chrono::Utc::now() - self.retention)?)
    }

    /// Stops accepting jobs and waits for in-flight ones. Jobs still queued
    /// stay `PENDING` and are released to the next process.
    pub fn shutdown(self) {
        self.pool.shutdown();
        self.pool.wait();
    }

    fn run_and_record(&self, user: &User, requirement: String, browser: Browser) -> Result<GenerationRun> {
        let run = self.graph.run(
            GraphVariant::TestGeneration,
            GenerationState::new(requirement, browser),
            &NoopProgress,
        )?;
        let history = history::record_test_generation(self.database(), user.id, &run.state)?;
        Ok(GenerationRun {
            state: run.state,
            visited: run.visited,
            history,
        })
    }
}

fn open_database(config: &Config) -> Result<Database> {
    let path = config
        .resolved_database_path()
        .ok_or_else(|| ConfigError::Validation {
            message: "no database_path configured and no home directory found".to_string(),
        })?;
    Ok(Database::open(&path)?)
}

fn retention(config: &Config) -> chrono::Duration {
    chrono::Duration::hours(config.task_retention_hours as i64)
}

/// Creates a user directly. Used for bootstrapping the first admin and by
/// [`Records::create_user`].
pub fn register_user(db: &Database, username: &str, password: &str, role: Role) -> Result<User> {
    let username = username.trim();
    let len = username.chars().count();
    if !(MIN_USERNAME_CHARS..=MAX_USERNAME_CHARS).contains(&len) {
        return Err(ValidationError::UsernameLength {
            len,
            min: MIN_USERNAME_CHARS,
            max: MAX_USERNAME_CHARS,
        }
        .into());
    }
    if password.chars().count() < MIN_PASSWORD_CHARS {
        return Err(ValidationError::PasswordTooShort {
            min: MIN_PASSWORD_CHARS,
        }
        .into());
    }

    let id = user_repo::insert(
        db,
        username,
        role.as_str(),
        &access::hash_password(password)?,
        &db::now_rfc3339(),
    )
    .map_err(|e| {
        if e.is_unique_violation() {
            ScriptsmithError::from(ValidationError::DuplicateUsername(username.to_string()))
        } else {
            ScriptsmithError::from(e)
        }
    })?;

    info!(user_id = id, role = role.as_str(), "User created");
    Ok(User::new(id, username, role))
}
