//! Offline payload inspection

use anyhow::{Context, Result};
use clap::ValueEnum;
use crypto_oms::decoder::SafeDecoder;
use crypto_oms::mapper::{map_to_oms_order, map_to_oms_position};
use serde_json::Value;
use std::io::Read;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RecordKind {
    Order,
    Position,
}

pub fn run(input: Option<PathBuf>, map: Option<RecordKind>) -> Result<()> {
    let raw = match &input {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read stdin")?;
            buffer
        }
    };

    let value = SafeDecoder::parse(&raw)?;
    println!("{}", serde_json::to_string_pretty(&value)?);

    let Some(kind) = map else {
        return Ok(());
    };
    // A bare envelope is unwrapped to its data
    let records: Vec<&Value> = match value.get("data").unwrap_or(&value) {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    for record in records {
        let mapped = match kind {
            RecordKind::Order => serde_json::to_string_pretty(&map_to_oms_order(record)?)?,
            RecordKind::Position => serde_json::to_string_pretty(&map_to_oms_position(record)?)?,
        };
        println!("{mapped}");
    }
    Ok(())
}
