use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::config::Config;

const CONFIG_TEMPLATE: &str = r#"# oz configuration
#
# Every setting has a default; uncomment only what you want to change.
# Environment variables override this file, e.g.
#   OZ_STREAM__TICK_INTERVAL_MS=100
#   OZ_HISTORY_FILE=~/notes/history.json

# history_file = "~/.local/share/oz/history.json"

# ── Rendering ────────────────────────────────────────────────────

[render]
# Code blocks longer than this many lines start collapsed.
# collapse_threshold_lines = 20
# smart_punctuation = true
# hard_breaks = true
# autolink = true

[highlight]
# enabled = true
# theme = "base16-ocean.dark"   # any bundled syntect theme

# ── Live streaming ───────────────────────────────────────────────

[stream]
# tick_interval_ms = 200
# min_height = 120
# max_height = 600
# line_height = 20

# ── History browser ──────────────────────────────────────────────

[history]
# batch_size = 20
# stagger_ms = 30
# search_debounce_ms = 250
# newest_first = true

[tui]
# Append the next batch when within this many rows of the bottom.
# scroll_threshold_rows = 8
# notice_ms = 2500
"#;

pub fn run() -> Result<()> {
    let config_dir = Config::config_dir()?;
    let config_path = config_dir.join("config.toml");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create config directory: {}", config_dir.display()))?;

    if config_path.exists() {
        println!("Existing config file found:");
        println!("  {}", config_path.display());
        print!("\nOverwrite? (Existing file will be backed up) [y/N] ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Setup cancelled.");
            return Ok(());
        }

        let backup = backup_file(&config_path)?;
        println!("  Backed up to {}", backup.display());
    }

    write_template(&config_path)?;
    println!("Created {}", config_path.display());

    println!("\nNext steps:");
    println!("  1. Render a response:  oz render answer.md");
    println!("  2. Replay a stream:    cat answer.md | oz stream --record");
    println!("  3. Browse history:     oz history");

    Ok(())
}

fn write_template(path: &Path) -> Result<()> {
    std::fs::write(path, CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write {}", path.display()))
}

/// Move a file to <name>.bak, appending a timestamp if .bak already exists.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let mut backup = path.with_extension("toml.bak");

    if backup.exists() {
        let timestamp = chrono::Local::now().format("%Y%m%d-%H%M%S");
        backup = path.with_extension(format!("toml.bak.{timestamp}"));
    }

    std::fs::rename(path, &backup).with_context(|| {
        format!("Failed to back up {} to {}", path.display(), backup.display())
    })?;

    Ok(backup)
}
