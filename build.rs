//! Build script rendering the `varta` man page.
//!
//! Packaging picks the man page up from the build output directory, so it is
//! generated here with clap-mangen from the same parser definitions the
//! binary uses.

use std::env;
use std::error::Error;
use std::io::Write;

use camino::Utf8PathBuf;
use cap_std::{ambient_authority, fs_utf8::Dir};
use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

use cli::Cli;

fn main() -> Result<(), Box<dyn Error>> {
    let mut stdout = std::io::stdout();
    writeln!(stdout, "cargo:rerun-if-changed=build.rs")?;
    writeln!(stdout, "cargo:rerun-if-changed=src/cli/mod.rs")?;

    let out_dir = Utf8PathBuf::from(env::var("OUT_DIR")?);
    let mut rendered = Vec::new();
    Man::new(Cli::command()).render(&mut rendered)?;

    let dir = Dir::open_ambient_dir(&out_dir, ambient_authority())?;
    dir.write("varta.1", rendered)?;
    Ok(())
}
