//! In-memory task registry keyed by tag.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::{TagMatcher, Task, TaskState};
use crate::registry::VolumeRegistry;
use crate::{Error, Result};

/// What happened to a task record read from volume storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// First sighting of the tag
    Registered,
    /// A strictly newer copy replaced the registered one
    Replaced,
    /// The registered copy is as new or newer; the record was dropped
    Kept,
}

/// Registered tasks, unique by tag.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    tasks: BTreeMap<String, Task>,
}

impl TaskRegistry {
    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Register a task under its tag.
    ///
    /// The tag stays occupied while the task is removing, until the commit
    /// pass purges it.
    pub fn register(&mut self, task: Task) -> Result<()> {
        if self.tasks.contains_key(task.tag()) {
            return Err(Error::TagCollision(format!(
                "task {} already registered",
                task.tag()
            )));
        }
        self.tasks.insert(task.tag().to_string(), task);
        Ok(())
    }

    /// Register a task read from a volume metadata file.
    ///
    /// The same task is normally declared in up to two volumes. When the
    /// copies disagree, the one with the newer `modified` timestamp wins and
    /// is touched, so every volume referring to it gets rewritten on commit.
    pub fn restore(&mut self, mut task: Task, volumes: &VolumeRegistry) -> RestoreOutcome {
        let Some(existing) = self.tasks.get_mut(task.tag()) else {
            task.untouch(volumes);
            self.tasks.insert(task.tag().to_string(), task);
            return RestoreOutcome::Registered;
        };
        match task.modified().cmp(&existing.modified()) {
            Ordering::Greater => {
                tracing::warn!(task = %task.tag(), "replacing stale copy of task with a newer one");
                task.touch(volumes);
                *existing = task;
                RestoreOutcome::Replaced
            }
            Ordering::Less => {
                tracing::warn!(task = %task.tag(), "dropping stale copy of task");
                existing.touch(volumes);
                RestoreOutcome::Kept
            }
            Ordering::Equal => RestoreOutcome::Kept,
        }
    }

    pub fn get(&self, tag: &str) -> Option<&Task> {
        self.tasks.get(tag)
    }

    pub fn get_mut(&mut self, tag: &str) -> Option<&mut Task> {
        self.tasks.get_mut(tag)
    }

    /// Every registered task (any state), ordered by tag.
    pub fn registered(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    /// Tasks with a leg in the given volume, in any state.
    pub fn referring<'a>(&'a self, volume_tag: &'a str) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks.values().filter(move |t| t.refers(volume_tag))
    }

    /// Apply the pending lifecycle transition of every task referring to a volume.
    pub fn commit_referring(&mut self, volume_tag: &str) {
        for task in self.tasks.values_mut().filter(|t| t.refers(volume_tag)) {
            task.commit();
        }
    }

    /// Drop every reclaimed task. Returns how many were dropped.
    pub fn purge_reclaimed(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, t| t.state() != TaskState::Reclaimed);
        before - self.tasks.len()
    }

    /// Tasks not marked for deletion.
    pub fn live(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values().filter(|t| t.live())
    }

    /// Live tasks with both legs resolving.
    pub fn intact<'a>(
        &'a self,
        volumes: &'a VolumeRegistry,
    ) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks.values().filter(move |t| t.intact(volumes))
    }

    /// Live tasks with a leg in a volume that is missing or being removed.
    pub fn stale<'a>(&'a self, volumes: &'a VolumeRegistry) -> impl Iterator<Item = &'a Task> + 'a {
        self.tasks
            .values()
            .filter(move |t| t.live() && !t.intact(volumes))
    }

    /// Live tasks whose tag matches any of the patterns.
    pub fn lookup(&self, matcher: &TagMatcher) -> Vec<&Task> {
        self.live().filter(|t| matcher.matches(t.tag())).collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Endpoint, Filters, Operation, Rclone, TaskRecord, Volume};
    use crate::test_utils::TestEnv;
    use chrono::{Duration, Utc};
    use std::path::Path;

    fn record(tag: &str, source: Endpoint, offset_secs: i64) -> TaskRecord {
        TaskRecord {
            tag: tag.to_string(),
            modified: Utc::now() + Duration::seconds(offset_secs),
            operation: Operation::Copy(Rclone {
                source,
                destination: Endpoint::local("/mirror"),
                encryption: None,
                options: Vec::new(),
            }),
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    #[test]
    fn test_register_rejects_duplicate_tag() {
        let mut tasks = TaskRegistry::default();
        let task = Task::from_record(record("0000abcd", Endpoint::local("/a"), 0));
        tasks.register(task.clone()).unwrap();
        let err = tasks.register(task).unwrap_err();
        assert!(matches!(err, Error::TagCollision(_)));
    }

    #[test]
    fn test_restore_untouches() {
        let volumes = VolumeRegistry::default();
        let mut tasks = TaskRegistry::default();
        let task = Task::from_record(record("0000abcd", Endpoint::local("/a"), 0));
        assert_eq!(tasks.restore(task, &volumes), RestoreOutcome::Registered);
        assert_eq!(tasks.get("0000abcd").unwrap().generation(), 0);
    }

    // === Last-write-wins ===

    #[test]
    fn test_restore_newer_copy_wins() {
        let volumes = VolumeRegistry::default();
        let mut tasks = TaskRegistry::default();
        let old = Task::from_record(record("0000abcd", Endpoint::local("/old"), -60));
        let new = Task::from_record(record("0000abcd", Endpoint::local("/new"), 0));

        tasks.restore(old, &volumes);
        assert_eq!(tasks.restore(new, &volumes), RestoreOutcome::Replaced);

        let task = tasks.get("0000abcd").unwrap();
        assert_eq!(task.operation().legs()[0], &Endpoint::local("/new"));
        assert_eq!(task.generation(), 1);
    }

    #[test]
    fn test_restore_older_copy_dropped() {
        let volumes = VolumeRegistry::default();
        let mut tasks = TaskRegistry::default();
        let new = Task::from_record(record("0000abcd", Endpoint::local("/new"), 0));
        let old = Task::from_record(record("0000abcd", Endpoint::local("/old"), -60));

        tasks.restore(new, &volumes);
        assert_eq!(tasks.restore(old, &volumes), RestoreOutcome::Kept);

        let task = tasks.get("0000abcd").unwrap();
        assert_eq!(task.operation().legs()[0], &Endpoint::local("/new"));
        // The winner is touched so the stale volume gets rewritten
        assert_eq!(task.generation(), 1);
    }

    #[test]
    fn test_restore_identical_copy_is_quiet() {
        let volumes = VolumeRegistry::default();
        let mut tasks = TaskRegistry::default();
        let rec = record("0000abcd", Endpoint::local("/a"), 0);
        tasks.restore(Task::from_record(rec.clone()), &volumes);
        assert_eq!(
            tasks.restore(Task::from_record(rec), &volumes),
            RestoreOutcome::Kept
        );
        assert_eq!(tasks.get("0000abcd").unwrap().generation(), 0);
    }

    // === Classification ===

    #[test]
    fn test_intact_and_stale() {
        let env = TestEnv::new();
        let mut volumes = VolumeRegistry::default();
        let volume = Volume::new(&env.root("v"), false).unwrap();
        let vtag = volume.tag().to_string();
        volumes.register(volume).unwrap();

        let mut tasks = TaskRegistry::default();
        let bound = Task::new(
            record("x", Endpoint::volume(&vtag, Path::new("docs")).unwrap(), 0).operation,
            Filters::default(),
        );
        let dangling = Task::new(
            record("y", Endpoint::volume("ffffffff", Path::new("docs")).unwrap(), 0).operation,
            Filters::default(),
        );
        let bound_tag = bound.tag().to_string();
        let dangling_tag = dangling.tag().to_string();
        tasks.register(bound).unwrap();
        tasks.register(dangling).unwrap();

        let intact: Vec<&str> = tasks.intact(&volumes).map(|t| t.tag()).collect();
        let stale: Vec<&str> = tasks.stale(&volumes).map(|t| t.tag()).collect();
        assert_eq!(intact, vec![bound_tag.as_str()]);
        assert_eq!(stale, vec![dangling_tag.as_str()]);
        assert_eq!(tasks.referring(&vtag).count(), 1);
    }

    #[test]
    fn test_lookup_skips_removing_and_purge() {
        let volumes = VolumeRegistry::default();
        let mut tasks = TaskRegistry::default();
        tasks.register(Task::from_record(record("aaaa0001", Endpoint::local("/a"), 0))).unwrap();
        tasks.register(Task::from_record(record("aaaa0002", Endpoint::local("/b"), 0))).unwrap();

        let matcher = TagMatcher::single("aaaa").unwrap();
        assert_eq!(tasks.lookup(&matcher).len(), 2);

        tasks.get_mut("aaaa0002").unwrap().delete(&volumes);
        assert_eq!(tasks.lookup(&matcher).len(), 1);
        assert_eq!(tasks.len(), 2);

        tasks.get_mut("aaaa0002").unwrap().commit();
        assert_eq!(tasks.purge_reclaimed(), 1);
        assert!(tasks.get("aaaa0002").is_none());
    }
}
