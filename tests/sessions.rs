// ABOUTME: Integration tests for the editing session manager.
// ABOUTME: Covers session lifecycle, per-user caps, teardown, and the expiration sweep.

mod support;

use slipway::proxy::RouteTable;
use slipway::runtime::preview_image;
use slipway::session::{
    CommitOptions, CreateSession, SessionErrorKind, SessionManager, SessionSettings,
    TeardownOutcome, TeardownStep,
};
use slipway::store::{SessionStatus, Store};
use slipway::types::{SessionId, SiteName, UserId};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use support::{FakeContainers, FakeGit, FlakyStore};

struct Harness {
    store: Arc<FlakyStore>,
    git: Arc<FakeGit>,
    containers: Arc<FakeContainers>,
    routes: Arc<RouteTable>,
    manager: Arc<SessionManager>,
}

impl Harness {
    fn new() -> Self {
        Self::with_settings(SessionSettings {
            restart_delay: Duration::from_millis(1),
            teardown_timeout: Duration::from_secs(5),
            ..SessionSettings::default()
        })
    }

    fn with_settings(settings: SessionSettings) -> Self {
        support::init_tracing();
        let store = FlakyStore::new();
        let git = FakeGit::new();
        let containers = FakeContainers::new();
        let routes = Arc::new(RouteTable::new(
            settings.domain.clone(),
            None,
            Duration::from_secs(3600),
        ));
        let manager = Arc::new(SessionManager::new(
            store.clone(),
            git.clone(),
            containers.clone(),
            routes.clone(),
            settings,
        ));
        Self {
            store,
            git,
            containers,
            routes,
            manager,
        }
    }

    fn request(&self, user: i64, site: &str) -> CreateSession {
        CreateSession::new(
            UserId::new(user),
            SiteName::new(site).unwrap(),
            site_path(site),
        )
    }
}

fn site_path(site: &str) -> PathBuf {
    PathBuf::from("/srv/sites").join(site)
}

#[tokio::test]
async fn create_session_starts_preview_and_route() {
    let h = Harness::new();

    let session = h.manager.create_session(h.request(7, "blog")).await.unwrap();

    assert_eq!(session.status, SessionStatus::Active);
    assert_eq!(session.branch_name.as_str(), "edit-0001");
    assert_eq!(
        session.container_name.as_deref(),
        Some("slipway-preview-blog-edit-0001")
    );
    assert_eq!(session.preview_port, Some(5000 + session.id.get() as u16));
    assert_eq!(
        session.preview_url.as_deref(),
        Some("https://edit-0001-blog.localhost")
    );
    assert!(session.base_commit.is_some());
    assert_eq!(session.base_commit, session.current_commit);
    assert!(session.expires_at.unwrap() > session.created_at);

    let route = h.routes.route(session.id).unwrap();
    assert_eq!(route.host, "edit-0001-blog.localhost");
    assert_eq!(Some(route.port), session.preview_port);

    let stored = h.manager.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored, session);
}

#[tokio::test]
async fn create_session_returns_existing_active_session() {
    let h = Harness::new();

    let first = h.manager.create_session(h.request(7, "blog")).await.unwrap();
    let second = h.manager.create_session(h.request(7, "blog")).await.unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(h.git.with(|g| g.branches.len()), 1);

    let active = h
        .manager
        .get_active_session(UserId::new(7), &SiteName::new("blog").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(active.id, first.id);
}

#[tokio::test]
async fn session_cap_evicts_least_recently_active() {
    let h = Harness::with_settings(SessionSettings {
        max_sessions_per_user: 2,
        ..SessionSettings::default()
    });

    let a = h.manager.create_session(h.request(3, "alpha")).await.unwrap();
    let b = h.manager.create_session(h.request(3, "beta")).await.unwrap();
    h.manager.update_activity(a.id).await.unwrap();
    let c = h.manager.create_session(h.request(3, "gamma")).await.unwrap();

    let active = h.store.active_sessions_for_user(UserId::new(3)).await.unwrap();
    let ids: Vec<SessionId> = active.iter().map(|s| s.id).collect();
    assert_eq!(active.len(), 2);
    assert!(ids.contains(&a.id));
    assert!(ids.contains(&c.id));

    assert!(h.manager.get_session(b.id).await.unwrap().is_none());
    assert!(!h.git.has_branch(&b.branch_name));
    assert!(h.routes.route(b.id).is_none());
}

#[tokio::test]
async fn sessions_of_other_users_do_not_count_toward_cap() {
    let h = Harness::with_settings(SessionSettings {
        max_sessions_per_user: 1,
        ..SessionSettings::default()
    });

    let mine = h.manager.create_session(h.request(1, "blog")).await.unwrap();
    let theirs = h.manager.create_session(h.request(2, "blog")).await.unwrap();

    assert_ne!(mine.id, theirs.id);
    assert!(h.manager.get_session(mine.id).await.unwrap().is_some());
    assert!(h.manager.get_session(theirs.id).await.unwrap().is_some());
}

#[tokio::test]
async fn preview_failure_tears_down_new_session() {
    let h = Harness::new();
    h.containers.with(|c| c.preview_fails = true);

    let err = h.manager.create_session(h.request(7, "blog")).await.unwrap_err();
    assert_eq!(err.kind(), SessionErrorKind::Upstream);

    assert!(
        h.manager
            .get_active_session(UserId::new(7), &SiteName::new("blog").unwrap())
            .await
            .unwrap()
            .is_none()
    );
    assert!(h.git.with(|g| g.branches.is_empty()));
    assert!(h.routes.routes().is_empty());
}

#[tokio::test]
async fn unrecorded_preview_is_removed_with_its_session() {
    let h = Harness::new();
    h.store.faults(|f| f.fail_update_session = true);

    let err = h.manager.create_session(h.request(7, "blog")).await.unwrap_err();
    assert_eq!(err.kind(), SessionErrorKind::Persistence);

    let container = "slipway-preview-blog-edit-0001";
    assert!(h.containers.calls().contains(&format!("preview {container}")));
    assert!(h.containers.container(container).is_none());
    assert!(!h.containers.with(|c| c.images.contains(&preview_image(container))));
    assert!(h.routes.routes().is_empty());
    assert!(
        h.store
            .active_sessions_for_user(UserId::new(7))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn session_without_runnable_preview_has_no_route() {
    let h = Harness::new();
    h.containers.with(|c| c.nothing_to_preview = true);

    let session = h.manager.create_session(h.request(7, "static")).await.unwrap();

    assert_eq!(session.container_name, None);
    assert_eq!(session.preview_port, None);
    assert_eq!(session.preview_url, None);
    assert!(h.routes.route(session.id).is_none());
}

#[tokio::test]
async fn commit_without_changes_is_a_no_op() {
    let h = Harness::new();
    let session = h.manager.create_session(h.request(7, "blog")).await.unwrap();

    let hash = h
        .manager
        .commit_session(session.id, &site_path("blog"), CommitOptions::default())
        .await
        .unwrap();

    assert_eq!(hash, "");
    let stored = h.manager.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.commits_count, 0);
    assert_eq!(stored.last_commit, None);
    assert!(h.manager.branch_commits(session.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn commit_records_audit_row_and_counters() {
    let h = Harness::new();
    let session = h.manager.create_session(h.request(7, "blog")).await.unwrap();
    h.git.with(|g| g.pending_changes = 3);

    let hash = h
        .manager
        .commit_session(session.id, &site_path("blog"), CommitOptions::default())
        .await
        .unwrap();
    assert!(!hash.is_empty());

    let stored = h.manager.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.commits_count, 1);
    assert_eq!(stored.current_commit.as_deref(), Some(hash.as_str()));
    assert!(stored.last_commit.is_some());
    assert!(stored.last_save.is_some());
    assert_ne!(stored.current_commit, stored.base_commit);

    let commits = h.manager.branch_commits(session.id).await.unwrap();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].commit_hash, hash);
    assert_eq!(commits[0].files_changed, 3);
    assert_eq!(commits[0].author, "user-7");
    assert_eq!(commits[0].message, slipway::git::DEFAULT_COMMIT_MESSAGE);
    assert_eq!(commits[0].branch_name, session.branch_name);
}

#[tokio::test]
async fn commit_uses_given_message_and_author() {
    let h = Harness::new();
    let session = h.manager.create_session(h.request(7, "blog")).await.unwrap();
    h.git.with(|g| g.pending_changes = 1);

    h.manager
        .commit_session(
            session.id,
            &site_path("blog"),
            CommitOptions {
                message: Some("Fix header".to_string()),
                author: Some("Ana".to_string()),
            },
        )
        .await
        .unwrap();

    let commits = h.manager.branch_commits(session.id).await.unwrap();
    assert_eq!(commits[0].message, "Fix header");
    assert_eq!(commits[0].author, "Ana");

    let history = h.manager.commit_history(session.id, 5).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].hash, commits[0].commit_hash);
}

#[tokio::test]
async fn commit_on_unknown_session_is_not_found() {
    let h = Harness::new();

    let err = h
        .manager
        .commit_session(SessionId::new(99), &site_path("blog"), CommitOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SessionErrorKind::NotFound);

    let err = h.manager.update_activity(SessionId::new(99)).await.unwrap_err();
    assert_eq!(err.kind(), SessionErrorKind::NotFound);
}

#[tokio::test]
async fn promote_merges_and_tears_down_but_keeps_branch() {
    let h = Harness::new();
    let session = h.manager.create_session(h.request(7, "blog")).await.unwrap();
    let container = session.container_name.clone().unwrap();

    let outcome = h
        .manager
        .deploy_session(session.id, &site_path("blog"))
        .await
        .unwrap();

    assert_eq!(outcome.branch, session.branch_name);
    assert_eq!(h.git.with(|g| g.merged.clone()), vec!["edit-0001".to_string()]);
    assert!(h.manager.get_session(session.id).await.unwrap().is_none());
    assert!(h.routes.route(session.id).is_none());
    assert!(h.containers.container(&container).is_none());
    assert!(!h.containers.with(|c| c.images.contains(&preview_image(&container))));

    let report = outcome.cleanup;
    assert!(report.is_clean());
    assert_eq!(report.outcome(TeardownStep::Branch), Some(&TeardownOutcome::Skipped));
    assert_eq!(report.outcome(TeardownStep::Record), Some(&TeardownOutcome::Done));
}

#[tokio::test]
async fn edit_commit_promote_keeps_single_audit_row() {
    let h = Harness::new();
    let session = h.manager.create_session(h.request(1, "blog")).await.unwrap();
    h.git.with(|g| g.pending_changes = 1);

    let hash = h
        .manager
        .commit_session(
            session.id,
            &site_path("blog"),
            CommitOptions {
                message: Some("fix typo".to_string()),
                author: None,
            },
        )
        .await
        .unwrap();

    h.manager
        .deploy_session(session.id, &site_path("blog"))
        .await
        .unwrap();

    assert!(h.manager.get_session(session.id).await.unwrap().is_none());
    let commits = h.manager.branch_commits(session.id).await.unwrap();
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].message, "fix typo");
    assert_eq!(commits[0].commit_hash, hash);
}

#[tokio::test]
async fn failed_merge_leaves_session_failed_with_branch() {
    let h = Harness::new();
    let session = h.manager.create_session(h.request(7, "blog")).await.unwrap();
    h.git.with(|g| g.fail_merge = true);

    let err = h
        .manager
        .deploy_session(session.id, &site_path("blog"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), SessionErrorKind::Upstream);

    let stored = h.manager.get_session(session.id).await.unwrap().unwrap();
    assert_eq!(stored.status, SessionStatus::Failed);
    assert!(h.git.has_branch(&session.branch_name));
}

#[tokio::test]
async fn cancel_deletes_branch_and_record() {
    let h = Harness::new();
    let session = h.manager.create_session(h.request(7, "blog")).await.unwrap();

    let report = h
        .manager
        .cancel_session(session.id, &site_path("blog"))
        .await
        .unwrap();

    for step in [
        TeardownStep::ProxyRoute,
        TeardownStep::Container,
        TeardownStep::Image,
        TeardownStep::Branch,
        TeardownStep::Record,
    ] {
        assert_eq!(report.outcome(step), Some(&TeardownOutcome::Done), "{step}");
    }
    assert!(!h.git.has_branch(&session.branch_name));
    assert!(h.manager.get_session(session.id).await.unwrap().is_none());
}

#[tokio::test]
async fn cleanup_twice_is_harmless() {
    let h = Harness::new();
    let session = h.manager.create_session(h.request(7, "blog")).await.unwrap();

    let first = h.manager.cleanup_session(session.id).await;
    assert!(first.is_clean());

    let second = h.manager.cleanup_session(session.id).await;
    assert!(second.is_clean());
    assert_eq!(second.steps().len(), 5);
    assert!(
        second
            .steps()
            .iter()
            .all(|(_, outcome)| *outcome == TeardownOutcome::Skipped)
    );
}

#[tokio::test]
async fn cleanup_continues_past_failed_steps() {
    let h = Harness::new();
    let session = h.manager.create_session(h.request(7, "blog")).await.unwrap();
    h.containers.with(|c| c.fail_stop = true);

    let report = h.manager.cleanup_session(session.id).await;

    assert!(!report.is_clean());
    assert!(matches!(
        report.outcome(TeardownStep::Container),
        Some(TeardownOutcome::Failed(_))
    ));
    assert_eq!(report.outcome(TeardownStep::Branch), Some(&TeardownOutcome::Done));
    assert_eq!(report.outcome(TeardownStep::Record), Some(&TeardownOutcome::Done));
    assert!(h.manager.get_session(session.id).await.unwrap().is_none());
}

#[tokio::test]
async fn restart_preview_recreates_container() {
    let h = Harness::new();
    let session = h.manager.create_session(h.request(7, "blog")).await.unwrap();
    let name = session.container_name.clone().unwrap();
    let before = h.containers.container(&name).unwrap();

    assert!(h.manager.restart_preview_container(session.id).await);

    let after = h.containers.container(&name).unwrap();
    assert!(after.running);
    assert_ne!(after.id, before.id);
    assert!(h.containers.calls().contains(&format!("stop {name}")));
}

#[tokio::test]
async fn restart_preview_of_unknown_session_reports_false() {
    let h = Harness::new();
    assert!(!h.manager.restart_preview_container(SessionId::new(5)).await);
}

#[tokio::test]
async fn sweep_removes_only_expired_auto_cleanup_sessions() {
    let h = Harness::new();

    let mut expired = h.request(1, "blog");
    expired.expiration_minutes = Some(0);
    let expired = h.manager.create_session(expired).await.unwrap();

    let mut pinned = h.request(2, "blog");
    pinned.expiration_minutes = Some(0);
    pinned.auto_cleanup = false;
    let pinned = h.manager.create_session(pinned).await.unwrap();

    let fresh = h.manager.create_session(h.request(3, "blog")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let report = h.manager.sweep_expired().await;

    assert_eq!(report.expired.len(), 1);
    assert_eq!(report.expired[0].session_id(), expired.id);
    assert!(h.manager.get_session(expired.id).await.unwrap().is_none());
    assert!(h.manager.get_session(pinned.id).await.unwrap().is_some());
    assert!(h.manager.get_session(fresh.id).await.unwrap().is_some());
}

#[tokio::test]
async fn scheduler_sweeps_until_stopped() {
    let h = Harness::with_settings(SessionSettings {
        cleanup_interval: Duration::from_millis(20),
        ..SessionSettings::default()
    });

    let mut request = h.request(1, "blog");
    request.expiration_minutes = Some(0);
    let session = h.manager.create_session(request).await.unwrap();

    assert!(h.manager.start_cleanup_scheduler());
    assert!(!h.manager.start_cleanup_scheduler());
    assert!(h.manager.is_cleanup_scheduler_running());

    let mut swept = false;
    for _ in 0..100 {
        if h.manager.get_session(session.id).await.unwrap().is_none() {
            swept = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(swept, "scheduler never removed the expired session");

    h.manager.stop_cleanup_scheduler().await;
    assert!(!h.manager.is_cleanup_scheduler_running());

    // Stopping twice is fine
    h.manager.stop_cleanup_scheduler().await;
}
