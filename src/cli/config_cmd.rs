use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::core::config::ExporterConfig;

fn resolve(path: Option<&Path>) -> PathBuf {
    path.map(Path::to_path_buf)
        .unwrap_or_else(ExporterConfig::config_path)
}

/// Write a config file populated with defaults.
pub fn init(path: Option<&Path>) -> Result<()> {
    let path = resolve(path);
    if path.exists() {
        eprintln!("Config file already exists at {}", path.display());
        eprintln!("Remove it first if you want to regenerate.");
        return Ok(());
    }

    ExporterConfig::default().save(&path)?;
    println!("Generated config at {}", path.display());
    Ok(())
}

pub fn check(path: Option<&Path>) -> Result<()> {
    let resolved = resolve(path);
    if !resolved.exists() {
        eprintln!("No config file found at {}", resolved.display());
        eprintln!("Run `cloudcost-exporter config init` to create one.");
        return Ok(());
    }

    let config = ExporterConfig::load(Some(&resolved))?;
    let issues = config.validate();
    if !issues.is_empty() {
        eprintln!("Config issues found in {}:", resolved.display());
        for issue in &issues {
            eprintln!("  - {}", issue);
        }
        bail!("{} config issue(s)", issues.len());
    }

    println!("Config is valid: {}", resolved.display());
    println!("  OpenCost:   {}", config.opencost_url);
    println!("  Window:     {}", config.window);
    println!("  Cache:      ttl {} / max stale {}", config.cache_ttl, config.max_stale);
    if config.currency_symbols.is_empty() {
        println!("  Currencies: none");
    } else {
        println!("  Currencies: {}", config.currency_symbols.join(", "));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("cloudcost-exporter-{}-{}", name, std::process::id()))
            .join("config.toml")
    }

    #[test]
    fn init_writes_loadable_defaults() {
        let path = temp_path("init");
        let _ = std::fs::remove_file(&path);

        init(Some(&path)).unwrap();
        let loaded = ExporterConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded, ExporterConfig::default());
        check(Some(&path)).unwrap();

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn init_does_not_overwrite() {
        let path = temp_path("keep");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "port = 9200\n").unwrap();

        init(Some(&path)).unwrap();
        assert_eq!(ExporterConfig::load(Some(&path)).unwrap().port, 9200);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn check_fails_on_invalid_values() {
        let path = temp_path("invalid");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "cache_ttl = \"soon\"\nlog_format = \"xml\"\n").unwrap();

        let err = check(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("2 config issue(s)"));

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }
}
