//! deviceinfo - prints device diagnostics grouped by tab.

use std::fmt::Write as _;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, Level};
use tracing_subscriber::EnvFilter;

use deviceinfo::{DeviceInfo, DeviceReport, ProbeConfig, Tab};

/// Device diagnostics viewer.
#[derive(Parser)]
#[command(name = "deviceinfo", about = "Shows device, SoC, memory, screen, battery, bluetooth and camera details", version)]
struct Args {
    /// Tab to print (device, soc, memory, screen, battery, bluetooth, camera).
    /// Repeat for several tabs. Defaults to all of them.
    #[arg(short, long = "tab", value_name = "TAB")]
    tabs: Vec<Tab>,

    /// Print the report as JSON.
    #[arg(long)]
    json: bool,

    /// JSON file with probe paths. Flags below take precedence.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the proc filesystem.
    #[arg(long, value_name = "DIR")]
    proc_root: Option<PathBuf>,

    /// Path to the sysfs filesystem.
    #[arg(long, value_name = "DIR")]
    sys_root: Option<PathBuf>,

    /// Path to the /etc directory.
    #[arg(long, value_name = "DIR")]
    etc_root: Option<PathBuf>,

    /// Mount point reported under "Storage".
    #[arg(long, value_name = "DIR")]
    storage_path: Option<PathBuf>,

    /// Increase logging verbosity (-v for debug, -vv for trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn probe_config(&self) -> Result<ProbeConfig> {
        let mut config = match &self.config {
            Some(path) => ProbeConfig::from_file(path)?,
            None => ProbeConfig::default(),
        };
        if let Some(dir) = &self.proc_root {
            config.proc_root = dir.clone();
        }
        if let Some(dir) = &self.sys_root {
            config.sys_root = dir.clone();
        }
        if let Some(dir) = &self.etc_root {
            config.etc_root = dir.clone();
        }
        if let Some(dir) = &self.storage_path {
            config.storage_path = dir.clone();
        }
        Ok(config)
    }

    fn selected_tabs(&self) -> Vec<Tab> {
        if self.tabs.is_empty() {
            return Tab::ALL.to_vec();
        }
        let mut tabs = Vec::with_capacity(self.tabs.len());
        for tab in &self.tabs {
            if !tabs.contains(tab) {
                tabs.push(*tab);
            }
        }
        tabs
    }
}

/// Initializes the tracing subscriber. Default level is WARN.
fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::WARN,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("deviceinfo={}", level).parse()?);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Renders the report as aligned `label: value` rows under tab and section headings.
fn render_text(report: &DeviceReport) -> String {
    let mut out = String::new();
    for (i, tab_report) in report.tabs.iter().enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let _ = writeln!(out, "== {} ==", tab_report.tab);
        if tab_report.sections.iter().all(|s| s.is_empty()) {
            let _ = writeln!(out, "{}", tab_report.tab.empty_message());
            continue;
        }

        for section in tab_report.sections.iter().filter(|s| !s.is_empty()) {
            let _ = writeln!(out, "[{}]", section.title);
            let width = section
                .properties
                .iter()
                .map(|p| p.label.chars().count())
                .max()
                .unwrap_or(0);
            for property in &section.properties {
                let _ = writeln!(
                    out,
                    "  {:<width$}  {}",
                    property.label,
                    property.value,
                    width = width
                );
            }
        }
    }
    out
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet)?;

    let config = args.probe_config()?;
    debug!(?config, "probe configuration");

    let tabs = args.selected_tabs();
    let info = DeviceInfo::new(config);
    let report = info.report(&tabs);
    info!(tabs = tabs.len(), "report gathered");

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", json);
    } else {
        print!("{}", render_text(&report));
    }
    Ok(())
}
