//! docpool init command
//!
//! Writes a configuration file with every default spelled out.

use docpool_foundation::DocpoolConfig;
use std::fs;
use std::path::Path;

/// Write `DocpoolConfig::default()` as TOML to `path`
pub fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        println!("✓ {} already exists.", path.display());
        println!("  Use --force to overwrite.");
        return Ok(());
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let body = DocpoolConfig::default().to_toml_string()?;
    fs::write(path, format!("# docpool configuration\n\n{}", body))?;
    println!("✓ Created {}", path.display());
    Ok(())
}
