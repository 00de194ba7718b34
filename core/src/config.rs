//! Interpreter settings.
//!
//! Sources, lowest precedence first: built-in defaults, an optional TOML file,
//! `LAMA_*` environment variables, and finally whatever the caller (the CLI)
//! sets on the returned value.

use std::path::Path;

use anyhow::{Context, Result, bail, ensure};
use serde::{Deserialize, Serialize};

use crate::vm::DEFAULT_STACK_WORDS;

pub const DEFAULT_GC_THRESHOLD: usize = 64 * 1024;
pub const DEFAULT_HEAP_LIMIT: usize = 16 * 1024 * 1024;

pub const ENV_STACK_WORDS: &str = "LAMA_STACK_WORDS";
pub const ENV_GC_THRESHOLD: &str = "LAMA_GC_THRESHOLD";
pub const ENV_HEAP_LIMIT: &str = "LAMA_HEAP_LIMIT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterpreterConfig {
    /// Operand stack capacity in words.
    pub stack_words: usize,
    /// Live-object count that triggers the first collection.
    pub gc_threshold: usize,
    /// Live objects allowed after a collection before allocation fails.
    pub heap_limit: usize,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            stack_words: DEFAULT_STACK_WORDS,
            gc_threshold: DEFAULT_GC_THRESHOLD,
            heap_limit: DEFAULT_HEAP_LIMIT,
        }
    }
}

impl InterpreterConfig {
    pub fn from_toml_str(src: &str) -> Result<Self> {
        toml::from_str(src).context("invalid interpreter config")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let src = std::fs::read_to_string(path).with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&src).with_context(|| format!("in {}", path.display()))
    }

    /// Applies `LAMA_STACK_WORDS`, `LAMA_GC_THRESHOLD` and `LAMA_HEAP_LIMIT`
    /// from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Same as [`with_env_overrides`](Self::with_env_overrides) over an
    /// arbitrary variable lookup.
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        for (key, field) in [
            (ENV_STACK_WORDS, &mut self.stack_words),
            (ENV_GC_THRESHOLD, &mut self.gc_threshold),
            (ENV_HEAP_LIMIT, &mut self.heap_limit),
        ] {
            let Some(raw) = lookup(key) else { continue };
            let raw = raw.trim();
            if raw.is_empty() {
                continue;
            }
            match raw.replace('_', "").parse::<usize>() {
                Ok(v) => *field = v,
                Err(_) => bail!("{key} must be a non-negative integer, got {raw:?}"),
            }
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.stack_words > 0, "stack_words must be greater than zero");
        ensure!(self.heap_limit > 0, "heap_limit must be greater than zero");
        Ok(())
    }
}
