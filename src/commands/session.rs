// ABOUTME: Editing-session commands plus the expiration sweep and scheduler loop.
// ABOUTME: Teardown problems are printed as warnings; they never fail a command.

use super::app::App;
use crate::cli::SessionCommand;
use slipway::error::Result;
use slipway::output::Output;
use slipway::session::{CleanupReport, CommitOptions, CreateSession, SessionError};
use slipway::store::{EditingSession, SessionMode};
use slipway::types::{SessionId, UserId};

pub async fn session(app: &App, command: SessionCommand, mut output: Output) -> Result<()> {
    match command {
        SessionCommand::Create {
            site,
            user,
            branch,
            expires,
            preview,
            no_auto_cleanup,
        } => {
            output.start_timer();
            let site = app.site(&site).await?;
            let mut request = CreateSession::new(
                UserId::new(user),
                site.name.clone(),
                app.config.site_path(&site.name),
            );
            request.base_name = branch;
            request.expiration_minutes = expires;
            request.mode = if preview {
                SessionMode::Preview
            } else {
                SessionMode::Edit
            };
            request.auto_cleanup = !no_auto_cleanup;

            let session = app.sessions.create_session(request).await?;
            output.record(&describe(&session), &session);
            Ok(())
        }
        SessionCommand::Commit {
            id,
            message,
            author,
        } => {
            let session = load(app, SessionId::new(id)).await?;
            let hash = app
                .sessions
                .commit_session(session.id, &session.site_path, CommitOptions { message, author })
                .await?;
            if hash.is_empty() {
                output.success("Nothing to commit");
            } else {
                output.success(&format!("Committed {hash} on {}", session.branch_name));
            }
            Ok(())
        }
        SessionCommand::Promote { id, deploy } => {
            output.start_timer();
            let session = load(app, SessionId::new(id)).await?;
            let promoted = app
                .sessions
                .deploy_session(session.id, &session.site_path)
                .await?;
            report_teardown(&output, &promoted.cleanup);
            output.success(&format!("Merged {} into main", promoted.branch));

            if deploy {
                super::deploy::deploy(app, session.site_name.as_str(), output).await?;
            }
            Ok(())
        }
        SessionCommand::Cancel { id } => {
            let session = load(app, SessionId::new(id)).await?;
            let report = app
                .sessions
                .cancel_session(session.id, &session.site_path)
                .await?;
            report_teardown(&output, &report);
            output.success(&format!("Cancelled session {}", session.id));
            Ok(())
        }
        SessionCommand::Show { id, history } => {
            let session = load(app, SessionId::new(id)).await?;
            output.record(&describe(&session), &session);

            for commit in app.sessions.branch_commits(session.id).await? {
                output.progress(&format!(
                    "    {} {} ({} files) {}",
                    short(&commit.commit_hash),
                    commit.author,
                    commit.files_changed,
                    commit.message
                ));
            }

            if history > 0 {
                match app.sessions.commit_history(session.id, history).await {
                    Ok(log) => {
                        output.progress("  history:");
                        for entry in log {
                            output.progress(&format!(
                                "    {} {} {}",
                                short(&entry.hash),
                                entry.author,
                                entry.message
                            ));
                        }
                    }
                    Err(e) => output.warn(&format!("could not read history: {e}")),
                }
            }
            Ok(())
        }
    }
}

pub async fn sweep(app: &App, output: Output) -> Result<()> {
    let report = app.sessions.sweep_expired().await;
    for cleanup in &report.expired {
        report_teardown(&output, cleanup);
    }
    output.success(&format!(
        "Removed {} expired session(s) and {} stale route(s)",
        report.expired.len(),
        report.routes_removed
    ));
    Ok(())
}

pub async fn serve(app: &App, output: Output) -> Result<()> {
    app.sessions.start_cleanup_scheduler();
    output.progress(&format!(
        "Sweeping expired sessions every {}s; press Ctrl-C to stop",
        app.sessions.settings().cleanup_interval.as_secs()
    ));

    tokio::signal::ctrl_c().await?;
    app.sessions.stop_cleanup_scheduler().await;
    output.success("Cleanup scheduler stopped");
    Ok(())
}

async fn load(app: &App, id: SessionId) -> Result<EditingSession> {
    Ok(app
        .sessions
        .get_session(id)
        .await?
        .ok_or(SessionError::NotFound(id))?)
}

fn report_teardown(output: &Output, report: &CleanupReport) {
    for (step, message) in report.failures() {
        output.warn(&format!(
            "session {}: {step} teardown failed: {message}",
            report.session_id()
        ));
    }
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}

fn describe(session: &EditingSession) -> String {
    let mut text = format!(
        "session {} ({}, {}) on {} branch {}",
        session.id, session.status, session.mode, session.site_name, session.branch_name
    );
    if let Some(url) = &session.preview_url {
        text.push_str(&format!("\n  preview: {url}"));
    }
    if let Some(expires) = session.expires_at {
        text.push_str(&format!(
            "\n  expires: {}",
            expires.format("%Y-%m-%d %H:%M:%S UTC")
        ));
    }
    text.push_str(&format!("\n  commits: {}", session.commits_count));
    text
}
