//! Completion report generation
//!
//! Collects what each admin completion carried and prints it as an ASCII
//! table or as JSON.

use crate::config::OutputFormat;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use spdk_bridge::engine::{Completion, IdentifyController};
use std::fmt::Write;

/// One completed admin command
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRecord {
    pub seq: usize,
    pub command: String,
    pub opcode: u8,
    pub succeeded: bool,
    pub status: String,
    pub sct: u8,
    pub sc: u8,
    pub dnr: bool,
    pub raw_status: u16,
    pub cdw0: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identify: Option<IdentifyController>,
}

impl CompletionRecord {
    /// Copy everything out of a completion while it is still valid
    pub fn capture(seq: usize, command: &str, opcode: u8, cpl: &Completion<'_>) -> Self {
        let status = cpl.status();
        Self {
            seq,
            command: command.to_string(),
            opcode,
            succeeded: cpl.succeeded(),
            status: cpl.nvme_status().to_string(),
            sct: status.sct(),
            sc: status.sc(),
            dnr: status.dnr(),
            raw_status: *cpl.raw_status(),
            cdw0: cpl.cdw0(),
            identify: None,
        }
    }
}

/// Everything one admin run produced
#[derive(Debug, Clone, Serialize)]
pub struct AdminReport {
    pub generated_at: DateTime<Utc>,
    pub bridge_version: String,
    pub channel: u32,
    pub device: String,
    pub pool_size: usize,
    /// Submissions that hit an exhausted pool and had to wait for a poll
    pub retries: usize,
    pub completions: Vec<CompletionRecord>,
}

impl AdminReport {
    pub fn failed(&self) -> usize {
        self.completions.iter().filter(|c| !c.succeeded).count()
    }
}

pub fn render(report: &AdminReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(report).context("Failed to serialize report")
        }
        OutputFormat::Text => Ok(render_text(report)),
    }
}

fn render_text(report: &AdminReport) -> String {
    let mut out = String::new();

    // writing into a String cannot fail
    let _ = writeln!(out, "Admin completions");
    let _ = writeln!(
        out,
        "  device {} on channel {} (pool of {}), generated {}",
        report.device,
        report.channel,
        report.pool_size,
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{:>4}  {:<12} {:>6}  {:<32} {:>6}  {:>10}",
        "#", "command", "opc", "status", "raw", "cdw0"
    );
    let _ = writeln!(out, "{}", "-".repeat(78));

    for c in &report.completions {
        let status = if c.dnr {
            format!("{} (dnr)", c.status)
        } else {
            c.status.clone()
        };
        let _ = writeln!(
            out,
            "{:>4}  {:<12} {:>#6x}  {:<32} {:>#6x}  {:>#10x}",
            c.seq, c.command, c.opcode, status, c.raw_status, c.cdw0
        );
        if let Some(id) = &c.identify {
            let _ = writeln!(
                out,
                "      vid {:04x} ssvid {:04x} sn '{}' mn '{}' fr '{}'",
                id.vid, id.ssvid, id.serial, id.model, id.firmware
            );
        }
    }

    let _ = writeln!(out, "{}", "-".repeat(78));
    let _ = writeln!(
        out,
        "{} completed, {} failed, {} retried",
        report.completions.len(),
        report.failed(),
        report.retries
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AdminReport {
        AdminReport {
            generated_at: Utc::now(),
            bridge_version: spdk_bridge::VERSION.to_string(),
            channel: 0,
            device: "nvme0n1".to_string(),
            pool_size: 1,
            retries: 1,
            completions: vec![
                CompletionRecord {
                    seq: 0,
                    command: "keep-alive".to_string(),
                    opcode: 0x18,
                    succeeded: true,
                    status: "generic: Success".to_string(),
                    sct: 0,
                    sc: 0,
                    dnr: false,
                    raw_status: 0,
                    cdw0: 0,
                    identify: None,
                },
                CompletionRecord {
                    seq: 1,
                    command: "custom".to_string(),
                    opcode: 0x80,
                    succeeded: false,
                    status: "generic: InvalidOpcode".to_string(),
                    sct: 0,
                    sc: 1,
                    dnr: true,
                    raw_status: 0x8002,
                    cdw0: 0,
                    identify: None,
                },
            ],
        }
    }

    #[test]
    fn test_text_report() {
        let text = render(&sample(), OutputFormat::Text).unwrap();
        assert!(text.contains("device nvme0n1 on channel 0"));
        assert!(text.contains("keep-alive"));
        assert!(text.contains("InvalidOpcode (dnr)"));
        assert!(text.contains("2 completed, 1 failed, 1 retried"));
    }

    #[test]
    fn test_json_report() {
        let json = render(&sample(), OutputFormat::Json).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["completions"][1]["raw_status"], 0x8002);
        assert_eq!(value["completions"][1]["dnr"], true);
        assert!(value["completions"][0].get("identify").is_none());
    }
}
