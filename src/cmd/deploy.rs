//! `kiln deploy`.

use anyhow::Result;
use console::style;
use kiln::config::KilnConfig;
use kiln_common::BuildId;

use super::super::Cli;
use super::open_console;
use super::render::{print_build_row, print_stale_status_warning};

pub async fn cmd_deploy(cli: &Cli, config: &KilnConfig, build_id: &str, ingress: bool) -> Result<()> {
    let (console, repo) = open_console(cli, config).await?;
    let build_id = BuildId::from(build_id);
    let ingress = ingress || config.toml.deploy.ingress_enabled;

    // The build list may lag the status endpoint.
    if console.store().contains(&build_id)
        && let Err(e) = console.reconcile(&build_id).await
    {
        print_stale_status_warning(&e);
    }

    let receipt = console.deploy(&build_id, ingress).await?;
    println!(
        "{} {}",
        style("Deployed").green().bold(),
        receipt.message.as_deref().unwrap_or("deploy accepted")
    );

    // A deploy is one-shot; refresh so the list reflects the backend.
    console.refresh_builds(&repo).await?;
    if let Some(build) = console.store().get(&build_id) {
        print_build_row(&build);
    }
    Ok(())
}
