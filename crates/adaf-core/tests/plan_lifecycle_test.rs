#![allow(clippy::expect_used, clippy::unwrap_used)]

use adaf_core::issue::{Issue, IssueStatus, WikiEntry};
use adaf_core::plan::{Plan, PlanStatus};
use adaf_core::project::Project;
use adaf_core::store::Store;
use chrono::Utc;

fn init_store(dir: &std::path::Path) -> Store {
    let project = Project::new("demo", dir.to_string_lossy(), Utc::now());
    Store::init(dir, &project).expect("init store")
}

fn plan(id: &str, status: PlanStatus) -> Plan {
    Plan {
        id: id.to_string(),
        title: format!("plan {id}"),
        description: String::new(),
        status,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

fn issue(plan_id: &str, status: IssueStatus) -> Issue {
    Issue {
        id: 0,
        plan_id: plan_id.to_string(),
        title: "an issue".to_string(),
        body: String::new(),
        status,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

#[test]
fn at_most_one_active_plan() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());

    store
        .create_plan(&plan("p1", PlanStatus::Active))
        .expect("create p1");
    let err = store
        .create_plan(&plan("p2", PlanStatus::Active))
        .expect_err("second active plan");
    assert!(err.to_string().contains("already active"), "got: {err}");

    // Frozen plans can coexist.
    store
        .create_plan(&plan("p2", PlanStatus::Frozen))
        .expect("create frozen p2");

    let active = store.active_plan().expect("active").expect("some");
    assert_eq!(active.id, "p1");
}

#[test]
fn set_active_plan_empty_clears() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    store
        .create_plan(&plan("p1", PlanStatus::Active))
        .expect("create");
    store.set_active_plan("").expect("clear");
    assert!(store.active_plan().expect("active").is_none());
}

#[test]
fn only_done_or_cancelled_plans_are_deletable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    store
        .create_plan(&plan("p1", PlanStatus::Active))
        .expect("create");

    let err = store.delete_plan("p1").expect_err("delete active");
    assert!(
        err.to_string().contains("only done/cancelled"),
        "got: {err}"
    );

    store.complete_plan("p1").expect("complete");
    store.delete_plan("p1").expect("delete done plan");
    assert!(store.get_plan("p1").is_err());
}

#[test]
fn completing_a_plan_rescopes_open_issues_and_wiki_to_shared() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    store
        .create_plan(&plan("p1", PlanStatus::Active))
        .expect("create plan");

    let mut open = issue("p1", IssueStatus::Open);
    store.create_issue(&mut open).expect("create open");
    let mut done = issue("p1", IssueStatus::Done);
    store.create_issue(&mut done).expect("create done");
    let mut entry = WikiEntry {
        id: 0,
        plan_id: "p1".to_string(),
        title: "notes".to_string(),
        body: String::new(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    store.create_wiki_entry(&mut entry).expect("create wiki");

    store.complete_plan("p1").expect("complete");

    let issues = store.list_issues().expect("list").records;
    let reopened = issues.iter().find(|i| i.id == open.id).expect("open issue");
    assert_eq!(reopened.plan_id, "", "open issue re-scoped to shared");
    let finished = issues.iter().find(|i| i.id == done.id).expect("done issue");
    assert_eq!(finished.plan_id, "p1", "terminal issue keeps its scope");

    let wiki = store.list_wiki_entries().expect("wiki").records;
    assert_eq!(wiki[0].plan_id, "", "wiki entry re-scoped to shared");

    // Active plan cleared as part of completion.
    assert!(store.active_plan().expect("active").is_none());
}

#[test]
fn cancelling_a_plan_wontfixes_open_issues() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    store
        .create_plan(&plan("p1", PlanStatus::Active))
        .expect("create plan");

    let mut open = issue("p1", IssueStatus::Open);
    store.create_issue(&mut open).expect("create open");
    let mut in_progress = issue("p1", IssueStatus::InProgress);
    store.create_issue(&mut in_progress).expect("create wip");
    let mut done = issue("p1", IssueStatus::Done);
    store.create_issue(&mut done).expect("create done");

    store.cancel_plan("p1").expect("cancel");

    let issues = store.list_issues().expect("list").records;
    for i in &issues {
        if i.id == done.id {
            assert_eq!(i.status, IssueStatus::Done);
        } else {
            assert_eq!(i.status, IssueStatus::Wontfix, "issue {} wontfixed", i.id);
        }
    }
}

#[test]
fn invalid_slug_is_rejected_without_state_change() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = init_store(dir.path());
    let err = store
        .create_plan(&plan("Bad Slug", PlanStatus::Active))
        .expect_err("invalid slug");
    assert!(err.to_string().contains("invalid plan id"), "got: {err}");
    assert!(store.list_plans().expect("list").is_empty());
}
