//! Schedule persistence: `Get`, `GetAll`, `GetEnabled`, `Save`, `Delete`,
//! `UpdateRunTimes`. The default implementation is a JSON file at
//! `~/.workflow-engine/schedules.json`, protected by a per-process mutex.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use waveforge_core::model::WorkflowSchedule;

use crate::error::{ScheduleError, ScheduleResult};

#[async_trait]
pub trait SchedulePersistence: Send + Sync {
    async fn get(&self, id: &str) -> ScheduleResult<Option<WorkflowSchedule>>;
    async fn get_all(&self) -> ScheduleResult<Vec<WorkflowSchedule>>;
    async fn get_enabled(&self) -> ScheduleResult<Vec<WorkflowSchedule>>;
    async fn save(&self, schedule: WorkflowSchedule) -> ScheduleResult<()>;
    async fn delete(&self, id: &str) -> ScheduleResult<()>;
    async fn update_run_times(
        &self,
        id: &str,
        last_run: Option<DateTime<Utc>>,
        next_run: Option<DateTime<Utc>>,
    ) -> ScheduleResult<()>;
}

/// Default location: `~/.workflow-engine/schedules.json`.
pub fn default_store_path() -> PathBuf {
    dirs_home().join(".workflow-engine").join("schedules.json")
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}

/// JSON-file-backed store, all access serialized through one in-process lock (this
/// process is the only writer the file format assumes).
pub struct JsonFileSchedules {
    path: PathBuf,
    state: Arc<Mutex<Vec<WorkflowSchedule>>>,
}

impl JsonFileSchedules {
    pub fn open(path: impl Into<PathBuf>) -> ScheduleResult<Self> {
        let path = path.into();
        let schedules = load(&path)?;
        Ok(Self { path, state: Arc::new(Mutex::new(schedules)) })
    }

    fn persist(&self, schedules: &[WorkflowSchedule]) -> ScheduleResult<()> {
        save(&self.path, schedules)
    }
}

fn load(path: &Path) -> ScheduleResult<Vec<WorkflowSchedule>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = std::fs::read_to_string(path)
        .map_err(|source| ScheduleError::StoreRead { path: path.display().to_string(), source })?;
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&contents)?)
}

fn save(path: &Path, schedules: &[WorkflowSchedule]) -> ScheduleResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|source| ScheduleError::StoreWrite { path: path.display().to_string(), source })?;
    }
    let json = serde_json::to_string_pretty(schedules)?;
    std::fs::write(path, json)
        .map_err(|source| ScheduleError::StoreWrite { path: path.display().to_string(), source })
}

#[async_trait]
impl SchedulePersistence for JsonFileSchedules {
    async fn get(&self, id: &str) -> ScheduleResult<Option<WorkflowSchedule>> {
        Ok(self.state.lock().iter().find(|s| s.id == id).cloned())
    }

    async fn get_all(&self) -> ScheduleResult<Vec<WorkflowSchedule>> {
        Ok(self.state.lock().clone())
    }

    async fn get_enabled(&self) -> ScheduleResult<Vec<WorkflowSchedule>> {
        Ok(self.state.lock().iter().filter(|s| s.enabled).cloned().collect())
    }

    async fn save(&self, schedule: WorkflowSchedule) -> ScheduleResult<()> {
        let mut guard = self.state.lock();
        match guard.iter_mut().find(|s| s.id == schedule.id) {
            Some(existing) => *existing = schedule,
            None => guard.push(schedule),
        }
        self.persist(&guard)
    }

    async fn delete(&self, id: &str) -> ScheduleResult<()> {
        let mut guard = self.state.lock();
        let before = guard.len();
        guard.retain(|s| s.id != id);
        if guard.len() == before {
            return Err(ScheduleError::NotFound(id.to_string()));
        }
        self.persist(&guard)
    }

    async fn update_run_times(
        &self,
        id: &str,
        last_run: Option<DateTime<Utc>>,
        next_run: Option<DateTime<Utc>>,
    ) -> ScheduleResult<()> {
        let mut guard = self.state.lock();
        let schedule = guard.iter_mut().find(|s| s.id == id).ok_or_else(|| ScheduleError::NotFound(id.to_string()))?;
        schedule.last_run_at = last_run;
        schedule.next_run_at = next_run;
        self.persist(&guard)
    }
}

/// Purely in-memory store, used by the manual-dispatch path (synthetic schedules never
/// touch disk) and by tests.
#[derive(Default)]
pub struct InMemorySchedules {
    state: Mutex<Vec<WorkflowSchedule>>,
}

#[async_trait]
impl SchedulePersistence for InMemorySchedules {
    async fn get(&self, id: &str) -> ScheduleResult<Option<WorkflowSchedule>> {
        Ok(self.state.lock().iter().find(|s| s.id == id).cloned())
    }

    async fn get_all(&self) -> ScheduleResult<Vec<WorkflowSchedule>> {
        Ok(self.state.lock().clone())
    }

    async fn get_enabled(&self) -> ScheduleResult<Vec<WorkflowSchedule>> {
        Ok(self.state.lock().iter().filter(|s| s.enabled).cloned().collect())
    }

    async fn save(&self, schedule: WorkflowSchedule) -> ScheduleResult<()> {
        let mut guard = self.state.lock();
        match guard.iter_mut().find(|s| s.id == schedule.id) {
            Some(existing) => *existing = schedule,
            None => guard.push(schedule),
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> ScheduleResult<()> {
        self.state.lock().retain(|s| s.id != id);
        Ok(())
    }

    async fn update_run_times(
        &self,
        id: &str,
        last_run: Option<DateTime<Utc>>,
        next_run: Option<DateTime<Utc>>,
    ) -> ScheduleResult<()> {
        let mut guard = self.state.lock();
        if let Some(schedule) = guard.iter_mut().find(|s| s.id == id) {
            schedule.last_run_at = last_run;
            schedule.next_run_at = next_run;
        }
        Ok(())
    }
}
