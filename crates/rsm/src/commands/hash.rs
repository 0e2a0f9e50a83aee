//! Hash command - attribute hash of a JSON object.

use std::path::PathBuf;

use anyhow::{Context as _, Result, bail};
use clap::Args;
use rsm_codec::{AttributeValue, Attributes, attributes_hash};
use serde_json::{Value, json};

use super::Context;

/// Arguments for the hash command.
#[derive(Args, Debug)]
pub struct HashArgs {
    /// JSON file holding an object of attribute names to values
    pub file: PathBuf,
}

/// Run the hash command.
pub async fn run(args: HashArgs, ctx: &Context) -> Result<()> {
    let contents = std::fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let json: Value = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not valid JSON", args.file.display()))?;

    let attributes = to_attributes(json)?;
    let hash = attributes_hash(&attributes)?;

    if ctx.json_output {
        let output = json!({ "attr_hash": hash, "attributes": attributes.len() });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", hash);
    }
    Ok(())
}

fn to_attributes(json: Value) -> Result<Attributes> {
    let Value::Object(map) = json else {
        bail!("expected a JSON object of attributes");
    };

    let mut attributes = Attributes::new();
    for (name, value) in map {
        let value = AttributeValue::try_from(value)
            .with_context(|| format!("attribute '{}' cannot be stored", name))?;
        // Nil attributes are never persisted, so they never reach the hash.
        if !value.is_nil() {
            attributes.insert(name, value);
        }
    }
    Ok(attributes)
}
