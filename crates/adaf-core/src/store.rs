//! Filesystem store rooted at `<repo>/.adaf`.
//!
//! One JSON file per entity, written atomically (tmp + rename in the same
//! directory). Numeric IDs are claimed with exclusive file creation so
//! concurrent processes never collide; listings are directory scans sorted
//! by numeric ID. The store never retries I/O; corrupt records are skipped
//! in listings and reported through the accumulator on the result.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StoreError;
use crate::ids::new_short_hex;
use crate::issue::{Decision, Issue, IssueStatus, WikiEntry};
use crate::loop_run::{LoopMessage, LoopRun};
use crate::plan::{validate_plan_id, Plan, PlanStatus};
use crate::project::Project;
use crate::session::Session;
use crate::spawn::{Ask, Spawn};
use crate::stats::{LoopStats, ProfileStats};
use crate::turn::Turn;

/// Name of the store directory under the repository root.
pub const STORE_DIR: &str = ".adaf";

/// Subdirectories created by `init`.
const SUBDIRS: &[&str] = &[
    "turns",
    "loopruns",
    "spawns",
    "asks",
    "plans",
    "issues",
    "wiki",
    "decisions",
    "messages",
    "sessions",
    "recordings",
    "stats/profile",
    "stats/loop",
];

/// Bounded retries for numeric-ID claims and short-hex draws.
const MAX_ID_RETRIES: usize = 10;

// ---------------------------------------------------------------------------
// Record plumbing
// ---------------------------------------------------------------------------

/// A numbered entity persisted as `<dir>/<id>.json`.
pub(crate) trait Record: Serialize + DeserializeOwned {
    const DIR: &'static str;
    const WHAT: &'static str;
    fn record_id(&self) -> u64;
    fn set_record_id(&mut self, id: u64);
}

macro_rules! impl_record {
    ($ty:ty, $dir:literal, $what:literal) => {
        impl Record for $ty {
            const DIR: &'static str = $dir;
            const WHAT: &'static str = $what;
            fn record_id(&self) -> u64 {
                self.id
            }
            fn set_record_id(&mut self, id: u64) {
                self.id = id;
            }
        }
    };
}

impl_record!(Turn, "turns", "turn");
impl_record!(LoopRun, "loopruns", "loop run");
impl_record!(Spawn, "spawns", "spawn");
impl_record!(Ask, "asks", "ask");
impl_record!(Issue, "issues", "issue");
impl_record!(WikiEntry, "wiki", "wiki entry");
impl_record!(Decision, "decisions", "decision");
impl_record!(LoopMessage, "messages", "loop message");
impl_record!(Session, "sessions", "session");

/// A record that was skipped during a listing because it failed to parse.
#[derive(Debug, Clone)]
pub struct CorruptRecord {
    pub path: PathBuf,
    pub detail: String,
}

/// A listing result: parsed records plus whatever had to be skipped.
#[derive(Debug, Clone)]
pub struct Listing<T> {
    pub records: Vec<T>,
    pub corrupt: Vec<CorruptRecord>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Initialize a new store under `repo_root`, writing `project.json`.
    /// Fails if the store is already initialized.
    pub fn init(repo_root: &Path, project: &Project) -> Result<Self, StoreError> {
        let root = repo_root.join(STORE_DIR);
        if root.join("project.json").exists() {
            return Err(StoreError::AlreadyInitialized(root));
        }
        for sub in SUBDIRS {
            fs::create_dir_all(root.join(sub))
                .map_err(|e| StoreError::io(format!("create {sub} dir"), e))?;
        }
        let store = Self { root };
        store.write_project(project)?;
        Ok(store)
    }

    /// Open an existing store; fails if `init` has not run.
    pub fn open(repo_root: &Path) -> Result<Self, StoreError> {
        let root = repo_root.join(STORE_DIR);
        if !root.join("project.json").exists() {
            return Err(StoreError::NotInitialized(root));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn entity_dir(&self, dir: &str) -> PathBuf {
        self.root.join(dir)
    }

    // -----------------------------------------------------------------
    // Project
    // -----------------------------------------------------------------

    pub fn project(&self) -> Result<Project, StoreError> {
        read_json(&self.root.join("project.json"), "project")
    }

    pub fn write_project(&self, project: &Project) -> Result<(), StoreError> {
        write_json_atomic(&self.root.join("project.json"), project, "project")
    }

    // -----------------------------------------------------------------
    // Generic numbered CRUD
    // -----------------------------------------------------------------

    /// Claim the next numeric ID and persist the record. The ID claim uses
    /// exclusive creation; a concurrent claimer forces a re-scan.
    pub(crate) fn create_record<T: Record>(&self, record: &mut T) -> Result<(), StoreError> {
        let dir = self.entity_dir(T::DIR);
        for _ in 0..MAX_ID_RETRIES {
            let id = self.max_id(T::DIR)? + 1;
            record.set_record_id(id);
            let data = encode(record, T::WHAT)?;
            let path = dir.join(format!("{id}.json"));
            match write_file_exclusive(&path, data.as_bytes()) {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(err) => {
                    return Err(StoreError::io(format!("create {} {id}", T::WHAT), err));
                }
            }
        }
        Err(StoreError::IdExhausted(T::WHAT))
    }

    pub(crate) fn get_record<T: Record>(&self, id: u64) -> Result<T, StoreError> {
        let path = self.entity_dir(T::DIR).join(format!("{id}.json"));
        if !path.exists() {
            return Err(StoreError::not_found(T::WHAT, id));
        }
        read_json(&path, T::WHAT)
    }

    pub(crate) fn update_record<T: Record>(&self, record: &T) -> Result<(), StoreError> {
        let id = record.record_id();
        let path = self.entity_dir(T::DIR).join(format!("{id}.json"));
        if !path.exists() {
            return Err(StoreError::not_found(T::WHAT, id));
        }
        write_json_atomic(&path, record, T::WHAT)
    }

    pub(crate) fn delete_record<T: Record>(&self, id: u64) -> Result<(), StoreError> {
        let path = self.entity_dir(T::DIR).join(format!("{id}.json"));
        if !path.exists() {
            return Err(StoreError::not_found(T::WHAT, id));
        }
        fs::remove_file(&path).map_err(|e| StoreError::io(format!("delete {} {id}", T::WHAT), e))
    }

    pub(crate) fn list_records<T: Record>(&self) -> Result<Listing<T>, StoreError> {
        let dir = self.entity_dir(T::DIR);
        let mut ids = list_numeric_ids(&dir)?;
        ids.sort_unstable();

        let mut records = Vec::with_capacity(ids.len());
        let mut corrupt = Vec::new();
        for id in ids {
            let path = dir.join(format!("{id}.json"));
            match read_json::<T>(&path, T::WHAT) {
                Ok(record) => records.push(record),
                Err(err) => corrupt.push(CorruptRecord {
                    path,
                    detail: err.to_string(),
                }),
            }
        }
        Ok(Listing { records, corrupt })
    }

    /// Largest claimed numeric ID in a directory, 0 when empty.
    fn max_id(&self, dir: &str) -> Result<u64, StoreError> {
        let ids = list_numeric_ids(&self.entity_dir(dir))?;
        Ok(ids.into_iter().max().unwrap_or(0))
    }

    /// Draw a short hex not yet used by any record in `dir`.
    pub(crate) fn fresh_hex(&self, dir: &str) -> Result<String, StoreError> {
        let existing = self.existing_hexes(dir)?;
        for _ in 0..MAX_ID_RETRIES {
            let hex = new_short_hex();
            if !existing.contains(&hex) {
                return Ok(hex);
            }
        }
        Err(StoreError::IdExhausted("short hex"))
    }

    fn existing_hexes(&self, dir: &str) -> Result<Vec<String>, StoreError> {
        #[derive(serde::Deserialize)]
        struct HexOnly {
            #[serde(default)]
            hex_id: String,
        }

        let dir = self.entity_dir(dir);
        let mut hexes = Vec::new();
        for id in list_numeric_ids(&dir)? {
            let path = dir.join(format!("{id}.json"));
            if let Ok(rec) = read_json::<HexOnly>(&path, "record") {
                if !rec.hex_id.is_empty() {
                    hexes.push(rec.hex_id);
                }
            }
        }
        Ok(hexes)
    }

    // -----------------------------------------------------------------
    // Turns
    // -----------------------------------------------------------------

    pub fn create_turn(&self, turn: &mut Turn) -> Result<(), StoreError> {
        if turn.hex_id.is_empty() {
            turn.hex_id = self.fresh_hex("turns")?;
        }
        self.create_record(turn)
    }

    pub fn get_turn(&self, id: u64) -> Result<Turn, StoreError> {
        self.get_record(id)
    }

    pub fn update_turn(&self, turn: &Turn) -> Result<(), StoreError> {
        self.update_record(turn)
    }

    pub fn list_turns(&self) -> Result<Listing<Turn>, StoreError> {
        self.list_records()
    }

    /// Path of a turn's verbatim recording.
    pub fn recording_path(&self, turn_id: u64) -> PathBuf {
        self.root.join("recordings").join(format!("{turn_id}.ndjson"))
    }

    // -----------------------------------------------------------------
    // Loop runs & messages
    // -----------------------------------------------------------------

    pub fn create_loop_run(&self, run: &mut LoopRun) -> Result<(), StoreError> {
        if run.hex_id.is_empty() {
            run.hex_id = self.fresh_hex("loopruns")?;
        }
        self.create_record(run)
    }

    pub fn get_loop_run(&self, id: u64) -> Result<LoopRun, StoreError> {
        self.get_record(id)
    }

    pub fn update_loop_run(&self, run: &LoopRun) -> Result<(), StoreError> {
        self.update_record(run)
    }

    pub fn list_loop_runs(&self) -> Result<Listing<LoopRun>, StoreError> {
        self.list_records()
    }

    pub fn create_loop_message(&self, message: &mut LoopMessage) -> Result<(), StoreError> {
        self.create_record(message)
    }

    pub fn list_loop_messages(&self, run_id: u64) -> Result<Vec<LoopMessage>, StoreError> {
        let listing: Listing<LoopMessage> = self.list_records()?;
        Ok(listing
            .records
            .into_iter()
            .filter(|m| m.run_id == run_id)
            .collect())
    }

    // -----------------------------------------------------------------
    // Spawns & asks
    // -----------------------------------------------------------------

    pub fn create_spawn(&self, spawn: &mut Spawn) -> Result<(), StoreError> {
        self.create_record(spawn)
    }

    pub fn get_spawn(&self, id: u64) -> Result<Spawn, StoreError> {
        self.get_record(id)
    }

    pub fn update_spawn(&self, spawn: &Spawn) -> Result<(), StoreError> {
        self.update_record(spawn)
    }

    pub fn list_spawns(&self) -> Result<Listing<Spawn>, StoreError> {
        self.list_records()
    }

    pub fn create_ask(&self, ask: &mut Ask) -> Result<(), StoreError> {
        self.create_record(ask)
    }

    pub fn get_ask(&self, id: u64) -> Result<Ask, StoreError> {
        self.get_record(id)
    }

    pub fn update_ask(&self, ask: &Ask) -> Result<(), StoreError> {
        self.update_record(ask)
    }

    pub fn list_asks(&self, spawn_id: u64) -> Result<Vec<Ask>, StoreError> {
        let listing: Listing<Ask> = self.list_records()?;
        Ok(listing
            .records
            .into_iter()
            .filter(|a| a.spawn_id == spawn_id)
            .collect())
    }

    // -----------------------------------------------------------------
    // Sessions
    // -----------------------------------------------------------------

    pub fn create_session(&self, session: &mut Session) -> Result<(), StoreError> {
        self.create_record(session)
    }

    pub fn get_session(&self, id: u64) -> Result<Session, StoreError> {
        self.get_record(id)
    }

    pub fn update_session(&self, session: &Session) -> Result<(), StoreError> {
        self.update_record(session)
    }

    pub fn list_sessions(&self) -> Result<Listing<Session>, StoreError> {
        self.list_records()
    }

    pub fn session_socket_path(&self, session_id: u64) -> PathBuf {
        self.root.join("sessions").join(format!("{session_id}.sock"))
    }

    pub fn session_pid_path(&self, session_id: u64) -> PathBuf {
        self.root.join("sessions").join(format!("{session_id}.pid"))
    }

    pub fn session_log_path(&self, session_id: u64) -> PathBuf {
        self.root.join("sessions").join(format!("{session_id}.log"))
    }

    /// Directory for a session's signal marker files.
    pub fn session_signal_dir(&self, session_id: u64) -> PathBuf {
        self.root.join("sessions").join(session_id.to_string())
    }

    // -----------------------------------------------------------------
    // Plans (slug-keyed)
    // -----------------------------------------------------------------

    fn plan_path(&self, id: &str) -> PathBuf {
        self.root.join("plans").join(format!("{id}.json"))
    }

    pub fn create_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        validate_plan_id(&plan.id)?;
        if plan.status == PlanStatus::Active {
            if let Some(existing) = self.active_plan()? {
                return Err(StoreError::Validation(format!(
                    "plan {:?} is already active; freeze or finish it first",
                    existing.id
                )));
            }
        }
        let data = encode(plan, "plan")?;
        match write_file_exclusive(&self.plan_path(&plan.id), data.as_bytes()) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StoreError::Validation(format!(
                    "plan {:?} already exists",
                    plan.id
                )));
            }
            Err(err) => return Err(StoreError::io(format!("create plan {:?}", plan.id), err)),
        }
        if plan.status == PlanStatus::Active {
            self.set_active_plan(&plan.id)?;
        }
        Ok(())
    }

    pub fn get_plan(&self, id: &str) -> Result<Plan, StoreError> {
        let path = self.plan_path(id);
        if !path.exists() {
            return Err(StoreError::not_found("plan", id));
        }
        read_json(&path, "plan")
    }

    pub fn update_plan(&self, plan: &Plan) -> Result<(), StoreError> {
        let path = self.plan_path(&plan.id);
        if !path.exists() {
            return Err(StoreError::not_found("plan", &plan.id));
        }
        write_json_atomic(&path, plan, "plan")
    }

    pub fn list_plans(&self) -> Result<Vec<Plan>, StoreError> {
        let dir = self.entity_dir("plans");
        let mut plans: Vec<Plan> = Vec::new();
        for path in list_json_files(&dir)? {
            plans.push(read_json(&path, "plan")?);
        }
        plans.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(plans)
    }

    /// Delete a plan. Only done/cancelled plans are deletable.
    pub fn delete_plan(&self, id: &str) -> Result<(), StoreError> {
        let plan = self.get_plan(id)?;
        if !plan.status.is_deletable() {
            return Err(StoreError::Validation(format!(
                "plan {id:?} is {:?}; only done/cancelled plans can be deleted",
                plan.status.as_str()
            )));
        }
        fs::remove_file(self.plan_path(id))
            .map_err(|e| StoreError::io(format!("delete plan {id:?}"), e))
    }

    pub fn active_plan(&self) -> Result<Option<Plan>, StoreError> {
        let project = self.project()?;
        if project.active_plan.is_empty() {
            return Ok(None);
        }
        match self.get_plan(&project.active_plan) {
            Ok(plan) => Ok(Some(plan)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Record the active plan on the project; empty string clears.
    pub fn set_active_plan(&self, id: &str) -> Result<(), StoreError> {
        if !id.is_empty() {
            self.get_plan(id)?;
        }
        let mut project = self.project()?;
        project.active_plan = id.to_string();
        self.write_project(&project)
    }

    /// Mark a plan done: non-terminal issues and wiki entries of the plan
    /// are re-scoped to shared.
    pub fn complete_plan(&self, id: &str) -> Result<(), StoreError> {
        let mut plan = self.get_plan(id)?;
        plan.status = PlanStatus::Done;
        plan.updated_at = Utc::now();
        self.update_plan(&plan)?;
        self.clear_active_if(id)?;

        let issues: Listing<Issue> = self.list_records()?;
        for mut issue in issues.records {
            if issue.plan_id == id && !issue.status.is_terminal() {
                issue.plan_id.clear();
                issue.updated_at = Utc::now();
                self.update_record(&issue)?;
            }
        }
        let wiki: Listing<WikiEntry> = self.list_records()?;
        for mut entry in wiki.records {
            if entry.plan_id == id {
                entry.plan_id.clear();
                entry.updated_at = Utc::now();
                self.update_record(&entry)?;
            }
        }
        Ok(())
    }

    /// Cancel a plan: its open/in-progress issues become wontfix.
    pub fn cancel_plan(&self, id: &str) -> Result<(), StoreError> {
        let mut plan = self.get_plan(id)?;
        plan.status = PlanStatus::Cancelled;
        plan.updated_at = Utc::now();
        self.update_plan(&plan)?;
        self.clear_active_if(id)?;

        let issues: Listing<Issue> = self.list_records()?;
        for mut issue in issues.records {
            if issue.plan_id == id && !issue.status.is_terminal() {
                issue.status = IssueStatus::Wontfix;
                issue.updated_at = Utc::now();
                self.update_record(&issue)?;
            }
        }
        Ok(())
    }

    fn clear_active_if(&self, id: &str) -> Result<(), StoreError> {
        let project = self.project()?;
        if project.active_plan == id {
            self.set_active_plan("")?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Issues / wiki / decisions
    // -----------------------------------------------------------------

    pub fn create_issue(&self, issue: &mut Issue) -> Result<(), StoreError> {
        self.create_record(issue)
    }

    pub fn get_issue(&self, id: u64) -> Result<Issue, StoreError> {
        self.get_record(id)
    }

    pub fn update_issue(&self, issue: &Issue) -> Result<(), StoreError> {
        self.update_record(issue)
    }

    pub fn list_issues(&self) -> Result<Listing<Issue>, StoreError> {
        self.list_records()
    }

    pub fn create_wiki_entry(&self, entry: &mut WikiEntry) -> Result<(), StoreError> {
        self.create_record(entry)
    }

    pub fn list_wiki_entries(&self) -> Result<Listing<WikiEntry>, StoreError> {
        self.list_records()
    }

    pub fn create_decision(&self, decision: &mut Decision) -> Result<(), StoreError> {
        self.create_record(decision)
    }

    pub fn list_decisions(&self) -> Result<Listing<Decision>, StoreError> {
        self.list_records()
    }

    // -----------------------------------------------------------------
    // Stats files
    // -----------------------------------------------------------------

    fn profile_stats_path(&self, profile: &str) -> PathBuf {
        self.root.join("stats").join("profile").join(format!("{profile}.json"))
    }

    fn loop_stats_path(&self, loop_name: &str) -> PathBuf {
        self.root.join("stats").join("loop").join(format!("{loop_name}.json"))
    }

    pub fn read_profile_stats(&self, profile: &str) -> Result<Option<ProfileStats>, StoreError> {
        read_json_if_exists(&self.profile_stats_path(profile), "profile stats")
    }

    pub fn write_profile_stats(&self, stats: &ProfileStats) -> Result<(), StoreError> {
        write_json_atomic(
            &self.profile_stats_path(&stats.profile),
            stats,
            "profile stats",
        )
    }

    pub fn read_loop_stats(&self, loop_name: &str) -> Result<Option<LoopStats>, StoreError> {
        read_json_if_exists(&self.loop_stats_path(loop_name), "loop stats")
    }

    pub fn write_loop_stats(&self, stats: &LoopStats) -> Result<(), StoreError> {
        write_json_atomic(&self.loop_stats_path(&stats.loop_name), stats, "loop stats")
    }

    /// Remove all stats files (used by `stats migrate` before re-deriving).
    pub fn clear_stats(&self) -> Result<(), StoreError> {
        for sub in ["stats/profile", "stats/loop"] {
            for path in list_json_files(&self.entity_dir(sub))? {
                fs::remove_file(&path)
                    .map_err(|e| StoreError::io(format!("remove {path:?}"), e))?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File helpers
// ---------------------------------------------------------------------------

fn encode<T: Serialize>(value: &T, what: &str) -> Result<String, StoreError> {
    serde_json::to_string_pretty(value).map_err(|e| StoreError::encode(format!("encode {what}"), e))
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, StoreError> {
    let data = fs::read_to_string(path)
        .map_err(|e| StoreError::io(format!("read {what} {path:?}"), e))?;
    serde_json::from_str(&data).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

fn read_json_if_exists<T: DeserializeOwned>(
    path: &Path,
    what: &str,
) -> Result<Option<T>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path, what).map(Some)
}

/// Serialize to a sibling tmp file, then rename into place. Rename within
/// one directory is atomic, so partial writes are never observable.
pub(crate) fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
    what: &str,
) -> Result<(), StoreError> {
    let data = encode(value, what)?;
    let tmp = path.with_extension("json.tmp");
    let mut file = fs::File::create(&tmp)
        .map_err(|e| StoreError::io(format!("create tmp for {what}"), e))?;
    file.write_all(data.as_bytes())
        .map_err(|e| StoreError::io(format!("write tmp for {what}"), e))?;
    file.sync_all()
        .map_err(|e| StoreError::io(format!("sync tmp for {what}"), e))?;
    fs::rename(&tmp, path).map_err(|e| StoreError::io(format!("rename {what} into place"), e))
}

/// Create a file exclusively (O_EXCL); used for ID claims.
pub(crate) fn write_file_exclusive(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(data)?;
    file.flush()
}

/// Numeric IDs present in a directory (from `<id>.json` filenames).
pub(crate) fn list_numeric_ids(dir: &Path) -> Result<Vec<u64>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(StoreError::io(format!("read dir {dir:?}"), err)),
    };

    let mut ids = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(format!("read dir entry in {dir:?}"), e))?;
        let path = entry.path();
        if path.extension().and_then(|s| s.to_str()) != Some("json") {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if let Ok(id) = stem.parse::<u64>() {
                ids.push(id);
            }
        }
    }
    Ok(ids)
}

/// All `.json` files in a directory, sorted by name.
pub(crate) fn list_json_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(vec![]),
        Err(err) => return Err(StoreError::io(format!("read dir {dir:?}"), err)),
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| StoreError::io(format!("read dir entry in {dir:?}"), e))?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) == Some("json") {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
