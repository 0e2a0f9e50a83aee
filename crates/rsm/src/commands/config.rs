//! Config command - configuration management.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde_json::json;

use super::Context;

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the merged configuration and where it came from
    Show,

    /// Show configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Path => cmd_path(ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.config;
    let session = loaded.config.session();
    let storage = loaded.config.storage();

    // Fail on values the session manager would reject.
    let manager = session.to_manager_config()?;

    if ctx.json_output {
        let sources: Vec<_> = loaded
            .loaded_from()
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        let output = json!({
            "sources": sources,
            "session": session,
            "storage": storage,
            "warnings": loaded.warnings,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    println!("# rsm Configuration\n");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("No config files loaded (using defaults)\n");
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
        println!();
    }

    println!("Session:");
    println!("  strategy:        {}", manager.persistence_strategy);
    println!("  timeout:         {}s", manager.timeout_secs());
    println!(
        "  skip attributes: {}",
        manager.skip_attributes.as_deref().unwrap_or("-")
    );
    println!("  skip urls:       {}", manager.skip_urls.as_deref().unwrap_or("-"));
    match manager.max_id_attempts {
        Some(max) => println!("  id attempts:     {}", max),
        None => println!("  id attempts:     unbounded"),
    }
    println!();

    println!("Storage:");
    println!("  url:     {}", ctx.url.as_deref().unwrap_or(&storage.url));
    println!("  timeout: {}ms", storage.timeout_ms);
    println!();

    if !loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &loaded.warnings {
            println!("  ⚠ {}", w);
        }
        println!();
    }

    if ctx.verbose {
        println!("---\nRaw config:\n");
        if let Ok(toml_str) = loaded.config.to_toml() {
            println!("{}", toml_str);
        }
    }

    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    match &ctx.config_dir {
        Some(dir) => println!("{}", dir.join("config.toml").display()),
        None => eprintln!("Could not determine config directory"),
    }
    Ok(())
}
