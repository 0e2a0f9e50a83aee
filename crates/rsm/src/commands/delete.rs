//! Delete command - remove a stored session.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use super::Context;

/// Arguments for the delete command.
#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Session id (the storage key)
    pub id: String,
}

#[derive(Serialize)]
struct DeleteOutput<'a> {
    id: &'a str,
    removed: bool,
}

/// Run the delete command.
pub async fn run(args: DeleteArgs, ctx: &Context) -> Result<()> {
    let manager = ctx.manager().await?;
    let removed = manager.remove_id(&args.id).await;
    manager.close().await;
    let removed = removed?;

    if ctx.json_output {
        let output = DeleteOutput {
            id: &args.id,
            removed,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else if removed {
        println!("Deleted session {}", args.id);
    } else {
        println!("Session {} not found", args.id);
    }

    Ok(())
}
