mod common;

use bongo_core::task::{ScheduledTask, TaskError, TaskState};
use common::FakeScheduler;
use std::sync::Arc;

#[test]
fn missing_task_fails_at_construction() {
    let scheduler = Arc::new(FakeScheduler::with_task("Other", "\\"));
    let err = ScheduledTask::open("BongoCat", scheduler.clone()).unwrap_err();
    assert!(matches!(err, TaskError::NotFound(name) if name == "BongoCat"));
    // Only the existence query ran.
    assert_eq!(scheduler.scripts.lock().len(), 1);
}

#[test]
fn invalid_name_is_rejected_before_running_anything() {
    let scheduler = Arc::new(FakeScheduler::default());
    let err = ScheduledTask::open("x\"; Stop-Computer; \"", scheduler.clone()).unwrap_err();
    assert!(matches!(err, TaskError::InvalidName(_)));
    assert!(scheduler.scripts.lock().is_empty());
}

#[test]
fn folder_is_read_from_task_info() {
    let scheduler = Arc::new(FakeScheduler::with_task("BongoCat", "\\Apps\\"));
    let task = ScheduledTask::open("BongoCat", scheduler).unwrap();
    assert_eq!(task.folder(), "\\Apps\\");
    assert_eq!(task.full_path(), "\\Apps\\BongoCat");
    assert!(task.exists().unwrap());
}

#[test]
fn enable_then_disable_succeeds() {
    let scheduler = Arc::new(FakeScheduler::with_task("BongoCat", "\\"));
    let task = ScheduledTask::open("BongoCat", scheduler.clone())
        .unwrap()
        .with_debug(true);

    task.set_enabled(false).unwrap();
    assert_eq!(scheduler.enabled("BongoCat"), Some(false));
    assert_eq!(task.state().unwrap(), TaskState::Disabled);

    task.set_enabled(true).unwrap();
    assert_eq!(scheduler.enabled("BongoCat"), Some(true));
    assert_eq!(task.state().unwrap(), TaskState::Ready);

    let scripts = scheduler.scripts.lock();
    assert!(scripts
        .iter()
        .any(|s| s == "Disable-ScheduledTask -TaskName 'BongoCat' -TaskPath '\\'"));
}

#[test]
fn failed_command_is_an_error_not_a_panic() {
    let scheduler = Arc::new(FakeScheduler::with_task("BongoCat", "\\"));
    let task = ScheduledTask::open("BongoCat", scheduler.clone()).unwrap();
    *scheduler.fail_mutations.lock() = true;

    for enabled in [true, false] {
        match task.set_enabled(enabled) {
            Err(TaskError::CommandFailed { code, stderr, .. }) => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "Access is denied.");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
    assert_eq!(scheduler.enabled("BongoCat"), Some(true));
}

#[test]
fn task_removed_after_construction() {
    let scheduler = Arc::new(FakeScheduler::with_task("BongoCat", "\\"));
    let task = ScheduledTask::open("BongoCat", scheduler.clone()).unwrap();
    scheduler.tasks.lock().clear();
    assert!(!task.exists().unwrap());
    assert!(task.set_enabled(true).is_err());
    assert!(matches!(task.state(), Err(TaskError::NotFound(_))));
}

#[test]
fn names_with_dollar_signs_are_passed_verbatim() {
    let name = "Bongo$(Stop-Process -Name explorer)";
    let scheduler = Arc::new(FakeScheduler::with_task(name, "\\"));
    let task = ScheduledTask::open(name, scheduler.clone()).unwrap();
    task.set_enabled(false).unwrap();
    assert_eq!(scheduler.enabled(name), Some(false));

    let scripts = scheduler.scripts.lock();
    assert!(scripts
        .iter()
        .all(|s| s.contains("-TaskName 'Bongo$(Stop-Process -Name explorer)'")));
    assert!(scripts.iter().all(|s| !s.contains('"')));
}

#[test]
fn quotes_in_names_are_doubled() {
    let name = "Cat's task";
    let scheduler = Arc::new(FakeScheduler::with_task(name, "\\"));
    let task = ScheduledTask::open(name, scheduler.clone()).unwrap();
    task.set_enabled(false).unwrap();
    assert_eq!(scheduler.enabled(name), Some(false));
    assert!(scheduler.scripts.lock()[0].ends_with("-TaskName 'Cat''s task'"));
}
