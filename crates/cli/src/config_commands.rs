use std::path::{Path, PathBuf};

use {
    anyhow::{Result, bail},
    clap::Subcommand,
    fontbot_config::{Diagnostic, Severity, ValidationResult, validate},
};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration file and report errors/warnings.
    Check {
        /// Config file to check instead of the discovered one.
        #[arg(long)]
        file: Option<PathBuf>,
        /// Show informational diagnostics in addition to errors and warnings.
        #[arg(long)]
        verbose: bool,
    },
    /// Print where config and data are read from.
    Paths,
}

pub fn handle_config(action: ConfigAction, config_dir: Option<&Path>, store: &Path) -> Result<()> {
    match action {
        ConfigAction::Check { file, verbose } => check(file.as_deref(), config_dir, verbose),
        ConfigAction::Paths => {
            let file = fontbot_config::find_config_file(config_dir);
            println!(
                "config file: {}",
                file.map_or_else(|| "(none, using defaults)".into(), |p| p.display().to_string())
            );
            if let Some(dir) = config_dir
                .map(Path::to_path_buf)
                .or_else(fontbot_config::config_dir)
            {
                println!("config dir:  {}", dir.display());
            }
            println!("store:       {}", store.display());
            Ok(())
        },
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(file: Option<&Path>, config_dir: Option<&Path>, verbose: bool) -> Result<()> {
    let result = validate(file, config_dir);

    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults.\n");
    }

    let shown = print_diagnostics(&result, verbose);
    if shown > 0 {
        eprintln!();
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        bail!("configuration has {errors} error(s)");
    }
    Ok(())
}

/// Print diagnostics to stderr; returns how many were shown.
pub fn print_diagnostics(result: &ValidationResult, verbose: bool) -> usize {
    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }
        eprintln!("  {}", render(d));
        shown += 1;
    }
    shown
}

fn render(d: &Diagnostic) -> String {
    let color = match d.severity {
        Severity::Error => RED,
        Severity::Warning => YELLOW,
        Severity::Info => CYAN,
    };
    let label = d.severity;
    if d.path.is_empty() {
        format!("{BOLD}{color}{label}{RESET} {}", d.message)
    } else {
        format!("{BOLD}{color}{label}{RESET} {}: {}", d.path, d.message)
    }
}
