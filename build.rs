//! Build script rendering the `rigstack` man pages into `OUT_DIR`.
//!
//! One page is written for the top-level command and one per provider
//! subcommand (`rigstack-aws.1`, `rigstack-paperspace.1`).

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn render(command: clap::Command, out_dir: &Path, title: &str) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    Man::new(command).title(title).render(&mut buffer)?;
    fs::write(out_dir.join(format!("{title}.1")), buffer)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir =
        PathBuf::from(env::var_os("OUT_DIR").ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "OUT_DIR was not set")
        })?);

    let root = Cli::command();
    for provider in root.get_subcommands() {
        let title = format!("rigstack-{}", provider.get_name());
        render(provider.clone(), &out_dir, &title)?;
    }
    render(root, &out_dir, "rigstack")?;

    Ok(())
}
