//! Configuration view and validation commands: `kiln config`.

use anyhow::Result;
use console::style;
use std::path::Path;

use kiln::config::{ENV_GITHUB_TOKEN, ENV_TOKEN, KilnConfig, KilnToml};

use super::super::ConfigCommands;

fn print_toml(toml: &KilnToml) {
    println!("[api]");
    match &toml.api.base_url {
        Some(url) => println!("  base_url = \"{}\"", url),
        None => println!("  base_url = (unset)"),
    }
    println!();
    println!("[repo]");
    println!("  owner = \"{}\"", toml.repo.owner);
    println!("  name = \"{}\"", toml.repo.name);
    println!("  branch = \"{}\"", toml.repo.branch);
    println!("  private = {}", toml.repo.private);
    println!();
    println!("[stream]");
    println!("  status_poll_secs = {}", toml.stream.status_poll_secs);
    println!();
    println!("[commits]");
    println!("  limit = {}", toml.commits.limit);
    println!("  github_api_url = \"{}\"", toml.commits.github_api_url);
    println!("  use_proxy = {}", toml.commits.use_proxy);
    println!();
    println!("[deploy]");
    println!("  ingress_enabled = {}", toml.deploy.ingress_enabled);
    println!();
}

fn presence(value: &Option<String>) -> &'static str {
    if value.is_some() { "set" } else { "not set" }
}

pub fn cmd_config(project_dir: &Path, command: Option<ConfigCommands>) -> Result<()> {
    match command {
        None | Some(ConfigCommands::Show) => {
            let config = KilnConfig::new(project_dir)?;

            println!();
            println!("{}", style("Kiln Configuration").bold().cyan());
            println!("==================");
            println!();
            match &config.source {
                Some(path) => println!("Config file: {}", path.display()),
                None => {
                    println!(
                        "No kiln.toml found at {}",
                        KilnConfig::project_file(project_dir).display()
                    );
                    println!("Using default configuration.");
                }
            }
            println!();
            print_toml(&config.toml);

            println!("Effective values (with env overrides):");
            println!("  api_url = \"{}\"", config.api_url);
            println!("  {} = {}", ENV_TOKEN, presence(&config.token));
            println!("  {} = {}", ENV_GITHUB_TOKEN, presence(&config.github_token));
            match config.poll_interval() {
                Some(every) => println!("  status poll = every {}s", every.as_secs()),
                None => println!("  status poll = disabled"),
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            let config = KilnConfig::new(project_dir)?;
            let warnings = config.validate();
            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("{}", style("Configuration warnings:").yellow());
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            let config_path = KilnConfig::project_file(project_dir);
            if config_path.exists() {
                println!("kiln.toml already exists at {}", config_path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            KilnToml::default().save(&config_path)?;

            println!("Created kiln.toml at {}", config_path.display());
            println!();
            println!("You can now customize:");
            println!("  - [api] base_url");
            println!("  - [repo] owner, name, branch, private");
            println!("  - [stream] status_poll_secs");
            println!("  - [commits] limit, github_api_url, use_proxy");
            println!("  - [deploy] ingress_enabled");
            println!();
            println!("Credentials are read from {} and {}.", ENV_TOKEN, ENV_GITHUB_TOKEN);
            println!();
        }
    }

    Ok(())
}
