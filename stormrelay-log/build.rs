use std::env;
use std::fs;
use std::io;
use std::path::Path;

/// Collects the library names of all workspace crates next to this one.
fn workspace_crates() -> io::Result<Vec<String>> {
    let mut crates = Vec::new();

    for entry in fs::read_dir("../")? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }

        if let Some(name) = entry.file_name().to_str()
            && name.starts_with("stormrelay")
        {
            crates.push(name.replace('-', "_"));
        }
    }

    crates.sort();
    Ok(crates)
}

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=../");

    let names: Vec<String> = workspace_crates()?
        .iter()
        .map(|name| format!("{name:?}"))
        .collect();
    let source = format!("const CRATE_NAMES: &[&str] = &[{}];\n", names.join(", "));

    let out_dir = env::var("OUT_DIR").map_err(io::Error::other)?;
    fs::write(Path::new(&out_dir).join("constants.gen.rs"), source)
}
