//! Batch input
//!
//! A batch is read either as JSON Lines (one Maxwell payload per line) or
//! as a Kinesis trigger event whose records carry base64-encoded payloads.

use anyhow::{bail, Context, Result};
use base64::Engine;
use clap::ValueEnum;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::AsyncReadExt;

/// Magic prefix of KPL-aggregated Kinesis records.
const KPL_MAGIC: [u8; 4] = [0xF3, 0x89, 0x9A, 0xC2];

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BatchFormat {
    /// One JSON payload per line
    #[value(name = "jsonl")]
    Jsonl,
    /// Kinesis trigger event: {"Records": [{"kinesis": {"data": "<base64>"}}]}
    #[value(name = "kinesis")]
    Kinesis,
}

#[derive(Deserialize)]
struct KinesisEvent {
    #[serde(rename = "Records")]
    records: Vec<KinesisRecord>,
}

#[derive(Deserialize)]
struct KinesisRecord {
    kinesis: KinesisData,
}

#[derive(Deserialize)]
struct KinesisData {
    data: String,
}

/// Read the whole input, `-` meaning stdin.
pub async fn read_input(path: &str) -> Result<String> {
    if path == "-" {
        let mut content = String::new();
        tokio::io::stdin()
            .read_to_string(&mut content)
            .await
            .context("Failed to read batch from stdin")?;
        Ok(content)
    } else {
        tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read batch file {path}"))
    }
}

/// Read and parse a batch.
pub async fn read_batch(path: &str, format: BatchFormat) -> Result<Vec<Value>> {
    let content = read_input(path).await?;
    parse_batch(&content, format).with_context(|| format!("Failed to parse batch from {path}"))
}

pub fn parse_batch(content: &str, format: BatchFormat) -> Result<Vec<Value>> {
    match format {
        BatchFormat::Jsonl => parse_jsonl(content),
        BatchFormat::Kinesis => parse_kinesis_event(content),
    }
}

/// Parse JSON Lines, skipping blank lines.
pub fn parse_jsonl(content: &str) -> Result<Vec<Value>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("Invalid JSON on line {}", i + 1))
        })
        .collect()
}

/// Parse a Kinesis trigger event into its decoded payloads.
pub fn parse_kinesis_event(content: &str) -> Result<Vec<Value>> {
    let event: KinesisEvent =
        serde_json::from_str(content).context("Invalid Kinesis event document")?;

    event
        .records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            decode_kinesis_data(&record.kinesis.data)
                .with_context(|| format!("Invalid Kinesis record {i}"))
        })
        .collect()
}

/// Decode one record's base64 data into a payload.
pub fn decode_kinesis_data(data: &str) -> Result<Value> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .context("Record data is not valid base64")?;

    if bytes.starts_with(&KPL_MAGIC) {
        bail!("KPL-aggregated records are not supported");
    }

    serde_json::from_slice(&bytes).context("Record data is not valid JSON")
}
