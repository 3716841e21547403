//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module     | Commands handled                      |
//! |------------|---------------------------------------|
//! | `builds`   | `Commits`, `Build`, `Builds`, `Status` |
//! | `logs`     | `Logs` (and `Build --follow`)         |
//! | `deploy`   | `Deploy`                              |
//! | `config`   | `Config`                              |
//! | `render`   | shared terminal output                |

pub mod builds;
pub mod config;
pub mod deploy;
pub mod logs;
pub mod render;

pub use builds::{cmd_build, cmd_builds, cmd_commits, cmd_status};
pub use config::cmd_config;
pub use deploy::cmd_deploy;
pub use logs::cmd_logs;

use anyhow::Result;
use kiln::Console;
use kiln::config::KilnConfig;
use kiln_common::RepoRef;

use super::Cli;

/// Console plus the repository it operates on, with the store populated from
/// the backend's build list.
pub(crate) async fn open_console(cli: &Cli, config: &KilnConfig) -> Result<(Console, RepoRef)> {
    let repo = config.repo(cli.repo.as_deref(), cli.branch.as_deref())?;
    let console = Console::from_config(config);
    console.refresh_builds(&repo).await?;
    Ok((console, repo))
}
