//! Build script for the `k2ctl` manual pages.
//!
//! Renders `k2ctl.1` plus one `k2ctl-<subcommand>.1` page per subcommand into
//! the build output directory.

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::{Command, CommandFactory};
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn render(command: Command, target: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let mut buffer = Vec::new();
    Man::new(command).render(&mut buffer)?;
    fs::write(target, buffer)?;
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir = env::var_os("OUT_DIR")
        .map(PathBuf::from)
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set"))?;

    let command = Cli::command();
    for sub in command.get_subcommands() {
        let page = format!("k2ctl-{}.1", sub.get_name());
        let named = sub.clone().name(format!("k2ctl-{}", sub.get_name()));
        render(named, &out_dir.join(page))?;
    }
    render(command, &out_dir.join("k2ctl.1"))
}
