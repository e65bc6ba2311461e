//! Test harness for isolated orchestrator runs.
//!
//! Each `TestHarness` owns a temp directory holding the SQLite file, three
//! users (admin, developer, qa) and scripted capabilities, so tests never
//! reach a text-generation endpoint or a browser.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use scriptsmith::capability::{
    ArtifactCategory, Capabilities, CodeGenerator, DebugRequest, DebugResult, ExecutionReport,
    GeneratedCode, IntegrationGuideGenerator, ScriptDebugger, ScriptExecutor, ScriptGenerator,
    ScriptRequest,
};
use scriptsmith::config::{Browser, Config};
use scriptsmith::db::Database;
use scriptsmith::error::CapabilityError;
use scriptsmith::extract::{ExtractedProject, Framework};
use scriptsmith::{register_user, Orchestrator, Records, Role, TaskHandle, TaskState, TaskStatus, User};

use super::builders::ConfigBuilder;

pub const GENERATED_SCRIPT: &str = "page.goto('https://www.amazon.com')\nprint('[PASS] Loaded')";
pub const FIXED_SCRIPT: &str = "page.goto('https://www.amazon.com/ap/signin')\nprint('[PASS] Signed in')";
pub const DEBUG_ANALYSIS: &str = "The sign-in selector changed.";
pub const GENERATED_ROUTES: &str = "@app.route('/wishlist')\ndef wishlist():\n    return 'wishlist'";

/// Blocks code generation until released. Open by default.
pub struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    pub fn new() -> Self {
        Self {
            open: Mutex::new(true),
            cond: Condvar::new(),
        }
    }

    pub fn close(&self) {
        *self.open.lock().unwrap() = false;
    }

    pub fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.cond.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
    }
}

/// Returns queued reports in order, then passes every later run.
pub struct ScriptedExecutor {
    reports: Mutex<VecDeque<ExecutionReport>>,
    calls: AtomicUsize,
    scripts: Mutex<Vec<(String, Browser)>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            reports: Mutex::new(VecDeque::new()),
            calls: AtomicUsize::new(0),
            scripts: Mutex::new(Vec::new()),
        }
    }

    pub fn push(&self, report: ExecutionReport) {
        self.reports.lock().unwrap().push_back(report);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn scripts(&self) -> Vec<(String, Browser)> {
        self.scripts.lock().unwrap().clone()
    }
}

impl ScriptExecutor for ScriptedExecutor {
    fn execute(&self, script: &str, browser: Browser) -> Result<ExecutionReport, CapabilityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.scripts.lock().unwrap().push((script.to_string(), browser));
        Ok(self.reports.lock().unwrap().pop_front().unwrap_or_else(|| {
            ExecutionReport::passed(format!(
                "[PASS] Script executed successfully in {}",
                browser
            ))
        }))
    }
}

struct FixedScript;

impl ScriptGenerator for FixedScript {
    fn generate_script(&self, _request: &ScriptRequest<'_>) -> Result<String, CapabilityError> {
        Ok(GENERATED_SCRIPT.to_string())
    }
}

struct FixedDebugger;

impl ScriptDebugger for FixedDebugger {
    fn debug_script(&self, _request: &DebugRequest<'_>) -> Result<DebugResult, CapabilityError> {
        Ok(DebugResult {
            script: FIXED_SCRIPT.to_string(),
            analysis: DEBUG_ANALYSIS.to_string(),
        })
    }
}

struct GatedCode {
    gate: Arc<Gate>,
}

impl CodeGenerator for GatedCode {
    fn generate_code(
        &self,
        _requirement: &str,
        _project: &ExtractedProject,
        _framework: Framework,
    ) -> Result<GeneratedCode, CapabilityError> {
        self.gate.wait();
        Ok(GeneratedCode::new().with(ArtifactCategory::Routes, GENERATED_ROUTES))
    }
}

struct FixedGuide;

impl IntegrationGuideGenerator for FixedGuide {
    fn integration_guide(
        &self,
        _requirement: &str,
        _code: &GeneratedCode,
        framework: Framework,
    ) -> Result<String, CapabilityError> {
        Ok(format!("Register the new route in your {} app.", framework.display_name()))
    }
}

/// Test harness providing an isolated orchestrator.
pub struct TestHarness {
    temp_dir: TempDir,
    pub config: Config,
    pub orchestrator: Orchestrator,
    pub executor: Arc<ScriptedExecutor>,
    pub gate: Arc<Gate>,
    pub admin: User,
    pub developer: User,
    pub qa: User,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_setup(|_| {})
    }

    /// Runs `setup` against the database after users exist and before the
    /// orchestrator starts.
    pub fn with_setup(setup: impl FnOnce(&Database)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("scriptsmith.db");
        let config = ConfigBuilder::new()
            .database_path(db_path.to_str().expect("utf-8 temp path"))
            .build();

        let db = Database::open(&db_path).expect("Failed to open database");
        let admin = register_user(&db, "admin", "admin-pass", Role::Admin).unwrap();
        let developer = register_user(&db, "dev", "dev-pass", Role::Developer).unwrap();
        let qa = register_user(&db, "qa", "qa-pass", Role::Qa).unwrap();
        setup(&db);

        let executor = Arc::new(ScriptedExecutor::new());
        let gate = Arc::new(Gate::new());
        let orchestrator = Orchestrator::new(&config, db, Self::capabilities(&executor, &gate))
            .expect("Failed to start orchestrator");

        Self {
            temp_dir,
            config,
            orchestrator,
            executor,
            gate,
            admin,
            developer,
            qa,
        }
    }

    /// A second orchestrator on the same database file, as another process
    /// would open it. It shares this harness's gate and executor.
    pub fn open_second_orchestrator(&self) -> Orchestrator {
        let db = Database::open(&self.db_path()).expect("Failed to open database");
        Orchestrator::new(&self.config, db, Self::capabilities(&self.executor, &self.gate))
            .expect("Failed to start second orchestrator")
    }

    /// A worker-free reader on the same database file.
    pub fn open_records(&self) -> Records {
        Records::open(&self.config).expect("Failed to open records")
    }

    fn capabilities(executor: &Arc<ScriptedExecutor>, gate: &Arc<Gate>) -> Capabilities {
        Capabilities {
            script_generator: Arc::new(FixedScript),
            debugger: Arc::new(FixedDebugger),
            executor: Arc::clone(executor) as Arc<dyn ScriptExecutor>,
            code_generator: Arc::new(GatedCode {
                gate: Arc::clone(gate),
            }),
            integration_guide: Arc::new(FixedGuide),
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("scriptsmith.db")
    }

    /// Polls until the task settles or ten seconds pass.
    pub fn wait_for(&self, handle: &TaskHandle) -> TaskStatus {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let status = self.orchestrator.poll(handle).expect("poll failed");
            if status.is_settled() {
                return status;
            }
            assert!(
                Instant::now() < deadline,
                "task {} did not settle: {:?}",
                handle,
                status
            );
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Polls until the task reaches `state` or ten seconds pass.
    pub fn wait_for_state(&self, handle: &TaskHandle, state: TaskState) {
        let deadline = Instant::now() + Duration::from_secs(10);
        loop {
            let status = self.orchestrator.poll(handle).expect("poll failed");
            if status.state() == Some(state) {
                return;
            }
            assert!(
                Instant::now() < deadline,
                "task {} never reached {:?}: {:?}",
                handle,
                state,
                status
            );
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    /// Releases any held job and stops the pool.
    pub fn shutdown(self) {
        self.gate.release();
        self.orchestrator.shutdown();
    }
}
