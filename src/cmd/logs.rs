//! `kiln logs`: one timeline per build, live or persisted.

use anyhow::{Result, bail};
use console::style;
use kiln::config::KilnConfig;
use kiln::{Console, SelectedView, StoreEvent};
use kiln_common::BuildId;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::warn;

use super::super::Cli;
use super::open_console;
use super::render::{print_line, styled_status};

pub async fn cmd_logs(cli: &Cli, config: &KilnConfig, build_id: &str) -> Result<()> {
    let (console, _repo) = open_console(cli, config).await?;
    let build_id = BuildId::from(build_id);
    if !console.store().contains(&build_id) {
        bail!("Build {} not found", build_id);
    }
    follow(&console, &build_id).await
}

/// Print one store event if it belongs to `build_id`.
fn render(event: &StoreEvent, build_id: &BuildId) {
    if event.build_id() != build_id {
        return;
    }
    match event {
        StoreEvent::LineAppended { line, .. } => print_line(line),
        StoreEvent::StatusChanged { to, .. } => {
            println!("{} {}", style("status →").dim(), styled_status(*to));
        }
        StoreEvent::LinesReset { lines, .. } => lines.iter().for_each(print_line),
        StoreEvent::Registered { .. } => {}
    }
}

/// Select `build_id` and print its timeline. Live builds are followed until
/// the stream closes or the user interrupts.
pub async fn follow(console: &Console, build_id: &BuildId) -> Result<()> {
    let mut events = console.store().subscribe();

    match console.select(build_id).await? {
        SelectedView::Historical { lines, error } => {
            lines.iter().for_each(print_line);
            if let Some(build) = console.store().get(build_id) {
                println!();
                println!(
                    "{} {}  {}",
                    style("Build").bold(),
                    styled_status(build.status()),
                    build.duration()
                );
            }
            if let Some(e) = error {
                return Err(e.into());
            }
        }
        SelectedView::Live(mut subscription) => {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(event) => render(&event, build_id),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "terminal fell behind the log stream");
                        }
                        Err(RecvError::Closed) => break,
                    },
                    _ = subscription.closed() => break,
                    _ = tokio::signal::ctrl_c() => {
                        println!();
                        println!("{}", style("Interrupted.").yellow());
                        break;
                    }
                }
            }
            // Events published before close are still queued.
            loop {
                match events.try_recv() {
                    Ok(event) => render(&event, build_id),
                    Err(TryRecvError::Lagged(_)) => continue,
                    Err(_) => break,
                }
            }
            subscription.close();
            console.teardown().await;
        }
    }
    Ok(())
}
