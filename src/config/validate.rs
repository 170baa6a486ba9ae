// src/config/validate.rs

use globset::Glob;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{KinotifyError, Result};
use crate::kernel::KernelVersion;
use crate::watch::decoder::{HEADER_SIZE, NAME_MAX};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::KinotifyError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.watcher, raw.default, raw.watch))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_watcher_section(cfg)?;
    validate_watch_roots(cfg)?;
    validate_patterns(cfg)?;
    Ok(())
}

fn validate_watcher_section(cfg: &RawConfigFile) -> Result<()> {
    let w = &cfg.watcher;

    if w.batch_size == 0 {
        return Err(KinotifyError::ConfigError(
            "[watcher].batch_size must be >= 1 (got 0)".to_string(),
        ));
    }

    // One record with the longest possible name has to fit.
    let min_buffer = HEADER_SIZE + NAME_MAX + 1;
    if w.read_buffer_size < min_buffer {
        return Err(KinotifyError::ConfigError(format!(
            "[watcher].read_buffer_size must be >= {min_buffer} (got {})",
            w.read_buffer_size
        )));
    }

    if w.max_pending_moves == 0 {
        return Err(KinotifyError::ConfigError(
            "[watcher].max_pending_moves must be >= 1 (got 0)".to_string(),
        ));
    }

    if w.output_capacity == 0 {
        return Err(KinotifyError::ConfigError(
            "[watcher].output_capacity must be >= 1 (got 0)".to_string(),
        ));
    }

    w.min_kernel_version
        .parse::<KernelVersion>()
        .map_err(|e| KinotifyError::ConfigError(format!("[watcher].min_kernel_version: {e}")))?;

    Ok(())
}

fn validate_watch_roots(cfg: &RawConfigFile) -> Result<()> {
    for (idx, root) in cfg.watch.iter().enumerate() {
        if root.path.as_os_str().is_empty() {
            return Err(KinotifyError::ConfigError(format!(
                "[[watch]] entry #{} has an empty `path`",
                idx + 1
            )));
        }
    }
    Ok(())
}

fn validate_patterns(cfg: &RawConfigFile) -> Result<()> {
    let patterns = cfg
        .default
        .exclude
        .iter()
        .chain(cfg.watch.iter().flat_map(|root| root.exclude.iter()));
    for pat in patterns {
        Glob::new(pat)?;
    }
    Ok(())
}
