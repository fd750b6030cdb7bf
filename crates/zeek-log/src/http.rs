//! Typed Zeek HTTP entries, from TSV or JSON-lines logs.

use std::io::BufRead;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::error;

use crate::header::TsvHeader;

/// One HTTP log entry, reduced to the fields proxy-pair analysis consumes.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HttpRecord {
    /// Unix seconds; Zeek logs fractional seconds and the fraction is
    /// discarded.
    #[serde(deserialize_with = "zeek_time")]
    pub ts: i64,
    #[serde(rename = "id.orig_h")]
    pub src_ip: String,
    #[serde(rename = "id.resp_h")]
    pub dst_ip: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub user_agent: String,
}

fn zeek_time<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Ok(secs as i64)
}

/// Parses one TSV body line with explicit per-field dispatch: header names
/// map straight onto record fields, fields the record does not carry are
/// skipped, and empty/unset markers leave the default value in place.
///
/// Returns `None` for comment lines, short lines, and entries whose
/// timestamp does not parse.
pub fn parse_tsv_line(line: &str, header: &TsvHeader) -> Option<HttpRecord> {
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let columns: Vec<&str> = line.split(header.separator.as_str()).collect();
    if columns.len() < header.fields.len() {
        return None;
    }

    let mut record = HttpRecord::default();
    for (name, raw) in header.fields.iter().zip(&columns) {
        if *raw == header.empty_field || *raw == header.unset_field {
            continue;
        }
        match name.as_str() {
            "ts" => match parse_zeek_time(raw) {
                Some(ts) => record.ts = ts,
                None => {
                    error!(value = raw, "unparsable timestamp in http log; dropping entry");
                    return None;
                }
            },
            "id.orig_h" => record.src_ip = (*raw).to_string(),
            "id.resp_h" => record.dst_ip = (*raw).to_string(),
            "host" => record.host = (*raw).to_string(),
            "method" => record.method = (*raw).to_string(),
            "uri" => record.uri = (*raw).to_string(),
            "user_agent" => record.user_agent = (*raw).to_string(),
            _ => {}
        }
    }

    Some(record)
}

fn parse_zeek_time(raw: &str) -> Option<i64> {
    raw.split('.').next()?.parse::<i64>().ok()
}

/// Parses one JSON log line. Unparsable lines are logged and dropped.
pub fn parse_json_line(line: &str) -> Option<HttpRecord> {
    match serde_json::from_str(line) {
        Ok(record) => Some(record),
        Err(err) => {
            error!(error = %err, "unparsable JSON in http log; dropping entry");
            None
        }
    }
}

/// Reads a whole HTTP log, sniffing the format from the first line:
/// a comment preamble means TSV, a `{` means JSON-lines.
pub fn read_http_log<R: BufRead>(mut reader: R) -> Result<Vec<HttpRecord>> {
    let (header, first) = TsvHeader::parse(&mut reader)?;
    let mut records = Vec::new();

    let first = match first {
        Some(first) => first,
        None => return Ok(records),
    };

    if first.trim_start().starts_with('{') {
        records.extend(parse_json_line(&first));
        for line in reader.lines() {
            let line = line.context("failed reading http log line")?;
            if line.trim().is_empty() {
                continue;
            }
            records.extend(parse_json_line(&line));
        }
    } else {
        if header.fields.is_empty() {
            bail!("tsv http log is missing its #fields header");
        }
        records.extend(parse_tsv_line(&first, &header));
        for line in reader.lines() {
            let line = line.context("failed reading http log line")?;
            records.extend(parse_tsv_line(&line, &header));
        }
    }

    Ok(records)
}
