//! Commit listing, build triggering, build listing and status commands.

use anyhow::{Result, bail};
use console::style;
use kiln::Console;
use kiln::config::KilnConfig;
use kiln_common::{BuildId, Commit, RepoRef};

use super::super::Cli;
use super::render::{print_build_header, print_build_row, print_stale_status_warning, styled_status};
use super::{logs, open_console};

pub async fn cmd_commits(cli: &Cli, config: &KilnConfig) -> Result<()> {
    let repo = config.repo(cli.repo.as_deref(), cli.branch.as_deref())?;
    let console = Console::from_config(config);
    let commits = console.recent_commits(&repo).await?;

    println!();
    println!(
        "{} {} ({})",
        style("Recent commits on").bold(),
        style(repo.slug()).cyan(),
        repo.branch
    );
    println!();
    if commits.is_empty() {
        println!("No commits found.");
    }
    for commit in &commits {
        let date = commit
            .date
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!(
            "{}  {:<16} {:<16} {}",
            style(commit.short_hash()).yellow(),
            date,
            commit.author,
            commit.title()
        );
    }
    println!();
    Ok(())
}

/// Resolve a full hash or unique prefix against the recent commit list.
/// `None` picks the newest commit.
fn pick_commit(commits: Vec<Commit>, wanted: Option<&str>, repo: &RepoRef) -> Result<Commit> {
    let Some(prefix) = wanted else {
        return match commits.into_iter().next() {
            Some(commit) => Ok(commit),
            None => bail!("No commits found on {} ({})", repo.slug(), repo.branch),
        };
    };

    let mut matches: Vec<Commit> = commits
        .into_iter()
        .filter(|c| c.hash.starts_with(prefix))
        .collect();
    match matches.len() {
        0 => bail!(
            "Commit '{}' is not among the recent commits on {} ({})",
            prefix,
            repo.slug(),
            repo.branch
        ),
        1 => Ok(matches.remove(0)),
        n => bail!("Commit prefix '{}' is ambiguous ({} matches)", prefix, n),
    }
}

pub async fn cmd_build(cli: &Cli, config: &KilnConfig, commit: Option<&str>, follow: bool) -> Result<()> {
    let (console, repo) = open_console(cli, config).await?;
    let commits = console.recent_commits(&repo).await?;
    let commit = pick_commit(commits, commit, &repo)?;

    let build_id = console.trigger_build(&repo, &commit).await?;
    println!(
        "{} {} for {} {}",
        style("Started build").green().bold(),
        style(build_id.as_str()).cyan(),
        style(commit.short_hash()).yellow(),
        commit.title()
    );

    if follow {
        println!();
        logs::follow(&console, &build_id).await?;
    }
    Ok(())
}

pub async fn cmd_builds(cli: &Cli, config: &KilnConfig) -> Result<()> {
    let (console, repo) = open_console(cli, config).await?;
    let builds = console.store().list();

    println!();
    if builds.is_empty() {
        println!("No builds found for {}.", repo.slug());
        println!();
        return Ok(());
    }
    print_build_header();
    for build in &builds {
        print_build_row(build);
    }
    println!();
    Ok(())
}

pub async fn cmd_status(cli: &Cli, config: &KilnConfig, build_id: &str) -> Result<()> {
    let (console, _repo) = open_console(cli, config).await?;
    let build_id = BuildId::from(build_id);
    if !console.store().contains(&build_id) {
        bail!("Build {} not found", build_id);
    }

    if let Err(e) = console.reconcile(&build_id).await {
        print_stale_status_warning(&e);
    }

    if let Some(build) = console.store().get(&build_id) {
        println!();
        println!("Build:    {}", style(build.id.as_str()).cyan());
        println!("Commit:   {} {}", style(&build.commit_hash).yellow(), build.commit_message);
        println!("Status:   {}", styled_status(build.status()));
        println!("Duration: {}", build.duration());
        if build.is_deployable() {
            println!();
            println!("Deploy with: kiln deploy {}", build.id);
        }
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit(hash: &str) -> Commit {
        Commit {
            hash: hash.to_string(),
            message: "msg".to_string(),
            author: "dev".to_string(),
            date: None,
        }
    }

    fn repo() -> RepoRef {
        RepoRef::new("acme", "shop", "main")
    }

    #[test]
    fn test_pick_newest_by_default() {
        let picked = pick_commit(vec![commit("aaa111"), commit("bbb222")], None, &repo()).unwrap();
        assert_eq!(picked.hash, "aaa111");
    }

    #[test]
    fn test_pick_by_prefix() {
        let picked =
            pick_commit(vec![commit("aaa111"), commit("bbb222")], Some("bbb"), &repo()).unwrap();
        assert_eq!(picked.hash, "bbb222");
    }

    #[test]
    fn test_pick_ambiguous_or_missing() {
        let commits = vec![commit("abc111"), commit("abc222")];
        assert!(pick_commit(commits.clone(), Some("abc"), &repo()).is_err());
        assert!(pick_commit(commits, Some("fff"), &repo()).is_err());
        assert!(pick_commit(Vec::new(), None, &repo()).is_err());
    }
}
