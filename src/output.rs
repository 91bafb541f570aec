use std::io::{self, Write};

use serde::Serialize;

use crate::organizer::OrganizeReport;
use crate::pipeline::RunSummary;
use crate::progress::{ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(summary: &RunSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_organize(report: &OrganizeReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

pub struct TextOutput;

impl TextOutput {
    pub fn print_run(summary: &RunSummary) {
        println!("{CYAN}harvest summary{RESET}");
        println!(
            "total={} fetched={} skipped={} failed={}",
            summary.total, summary.fetched, summary.skipped, summary.failed
        );
        if summary.organized + summary.organize_failed > 0 {
            println!(
                "organized={} organize_failed={}",
                summary.organized, summary.organize_failed
            );
        }
        for item in &summary.items {
            let color = match item.outcome.as_str() {
                "fetched" => GREEN,
                "skipped" => YELLOW,
                _ => RED,
            };
            println!("{color}  {} {}{RESET}", item.outcome, item.identifier);
            if let Some(error) = &item.error {
                println!("{color}    {error}{RESET}");
            }
        }
        if summary.cancelled {
            println!("{YELLOW}run interrupted; remaining items stay queued{RESET}");
        }
        if summary.failed > 0 {
            println!("{YELLOW}{} item(s) remain queued; run again to retry{RESET}", summary.failed);
        }
    }

    pub fn print_organize(report: &OrganizeReport) {
        println!("{CYAN}organize summary{RESET}");
        println!("organized={} failed={}", report.organized, report.failed);
        for archive in &report.archives {
            match &archive.error {
                None => println!(
                    "{GREEN}  {} -> {} ({} members){RESET}",
                    archive.archive,
                    archive.partition.as_deref().unwrap_or("-"),
                    archive.members
                ),
                Some(error) => println!("{RED}  {} skipped: {error}{RESET}", archive.archive),
            }
        }
    }
}
