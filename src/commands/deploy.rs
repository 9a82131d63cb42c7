// ABOUTME: Site commands: deploy, stop, and status.
// ABOUTME: Deploy failures are recorded by the orchestrator and surfaced as a command error.

use super::app::App;
use slipway::error::{Error, Result};
use slipway::output::Output;
use slipway::store::{Site, Store};

pub async fn deploy(app: &App, site: &str, mut output: Output) -> Result<()> {
    output.start_timer();
    let site = app.site(site).await?;

    output.progress(&format!(
        "Deploying {} from {} ({})",
        site.name, site.repo_url, site.branch
    ));

    let outcome = app.orchestrator.deploy(site.id).await?;
    if !outcome.success {
        if let Some(log) = app.orchestrator.build_log_path(&site.name) {
            output.progress(&format!("  Build log: {}", log.display()));
        }
        return Err(Error::DeployFailed {
            site: site.name.to_string(),
            deployment: outcome.deployment_id,
            message: outcome.error.unwrap_or_default(),
        });
    }

    let deployed = app.site(site.name.as_str()).await?;
    output.success(&format!(
        "Deployed {} (deployment {}) on port {}",
        deployed.name,
        outcome.deployment_id,
        deployed
            .port
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string())
    ));
    Ok(())
}

pub async fn stop(app: &App, site: &str, output: Output) -> Result<()> {
    let site = app.site(site).await?;
    app.orchestrator.stop(site.id).await?;
    output.success(&format!("Stopped {}", site.name));
    Ok(())
}

pub async fn status(app: &App, output: Output) -> Result<()> {
    let sites = app.store.sites().await?;
    for site in &sites {
        output.record(&describe(site), site);

        let actions = app.store.site_actions(site.id).await?;
        if !actions.is_empty() {
            let names: Vec<&str> = actions.iter().map(|a| a.name.as_str()).collect();
            output.progress(&format!("    actions: {}", names.join(", ")));
        }
    }
    Ok(())
}

fn describe(site: &Site) -> String {
    let port = site
        .port
        .map(|p| format!(":{p}"))
        .unwrap_or_default();
    let deployed = site
        .last_deployed_at
        .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "never".to_string());
    format!(
        "{:<24} {:<9} {}{}  last deployed {}",
        site.name,
        site.status.to_string(),
        site.container_id.as_deref().unwrap_or("-"),
        port,
        deployed
    )
}
