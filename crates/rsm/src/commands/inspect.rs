//! Inspect command - decode a stored session.

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use clap::Args;
use console::{Style, style};
use rsm_codec::{PersistedSession, SessionMetadata};
use serde::Serialize;
use serde_json::{Map, Value};

use super::Context;

/// Arguments for the inspect command.
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Session id (the storage key)
    pub id: String,
}

#[derive(Serialize)]
struct InspectOutput {
    id: String,
    attr_hash: i64,
    creation_time: i64,
    last_accessed_time: i64,
    this_accessed_time: i64,
    max_inactive_interval: i32,
    is_new: bool,
    is_valid: bool,
    principal_name: Option<String>,
    principal_roles: Option<Vec<String>>,
    attributes: Map<String, Value>,
}

impl InspectOutput {
    fn new(record: PersistedSession, metadata: SessionMetadata) -> Self {
        Self {
            attributes: record
                .attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
            id: record.id,
            attr_hash: metadata.attr_hash,
            creation_time: record.creation_time,
            last_accessed_time: record.last_accessed_time,
            this_accessed_time: record.this_accessed_time,
            max_inactive_interval: record.max_inactive_interval,
            is_new: record.is_new,
            is_valid: record.is_valid,
            principal_name: record.principal_name,
            principal_roles: record.principal_roles,
        }
    }
}

/// Run the inspect command.
pub async fn run(args: InspectArgs, ctx: &Context) -> Result<()> {
    let manager = ctx.manager().await?;
    let loaded = manager.load(&args.id).await;
    manager.close().await;

    let Some((record, metadata)) = loaded? else {
        bail!("session '{}' not found", args.id);
    };
    let output = InspectOutput::new(record, metadata);

    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    println!();
    println!("{}", style(format!("Session {}", output.id)).bold());
    println!("  {} {}", dim.apply_to("created:      "), timestamp(output.creation_time));
    println!("  {} {}", dim.apply_to("last access:  "), timestamp(output.last_accessed_time));
    println!("  {} {}", dim.apply_to("this access:  "), timestamp(output.this_accessed_time));
    println!("  {} {}s", dim.apply_to("max inactive: "), output.max_inactive_interval);
    println!("  {} {} / {}", dim.apply_to("new / valid:  "), output.is_new, output.is_valid);
    println!("  {} {}", dim.apply_to("attr hash:    "), output.attr_hash);

    match &output.principal_name {
        Some(name) => {
            let roles = output.principal_roles.as_deref().unwrap_or_default();
            println!("  {} {} [{}]", dim.apply_to("principal:    "), name, roles.join(", "));
        }
        None => println!("  {} -", dim.apply_to("principal:    ")),
    }

    println!();
    if output.attributes.is_empty() {
        println!("No attributes");
    } else {
        println!("Attributes:");
        for (name, value) in &output.attributes {
            println!("  {:<24} {}", name, value);
        }
    }
    println!();

    Ok(())
}

/// Render epoch milliseconds as RFC 3339, falling back to the raw number.
fn timestamp(millis: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| millis.to_string())
}
