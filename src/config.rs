// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! Conversion settings shared by the CLI and batch runner

use crate::document::{RootMode, Rgb};
use crate::io::{StepProtocol, StlMode};
use crate::scene::SceneGraphBuilder;
use crate::tessellate::TessellationParams;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// File picked up by [`ExchangeConfig::load`] from the working directory
pub const CONFIG_FILE: &str = "cadex.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub max_depth: usize,
    pub root_mode: RootMode,
    pub step_protocol: StepProtocol,
    pub stl_mode: StlMode,
    /// Batch workers; `None` lets rayon decide
    pub parallelism: Option<usize>,
    /// Color of scene nodes with no colored ancestor
    pub default_color: Rgb,
    pub tessellation: TessellationParams,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            max_depth: crate::document::MAX_DEPTH,
            root_mode: RootMode::default(),
            step_protocol: StepProtocol::default(),
            stl_mode: StlMode::default(),
            parallelism: None,
            default_color: Rgb::NEUTRAL,
            tessellation: TessellationParams::default(),
        }
    }
}

impl ExchangeConfig {
    /// Load configuration from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config: ExchangeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// `cadex.toml` when present, otherwise defaults, then environment overrides
    pub fn load() -> Result<Self> {
        let local = PathBuf::from(CONFIG_FILE);
        let config = if local.exists() {
            Self::from_file(&local)?
        } else {
            Self::default()
        };
        config.with_env_overrides()
    }

    /// Explicit file when given, otherwise [`load`](Self::load)
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path)?.with_env_overrides(),
            None => Self::load(),
        }
    }

    /// Apply `CADEX_*` environment variables
    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(precision) = std::env::var("CADEX_PRECISION") {
            self.tessellation.precision = precision
                .parse()
                .with_context(|| format!("CADEX_PRECISION is not a number: {:?}", precision))?;
        }

        if let Ok(parallelism) = std::env::var("CADEX_PARALLELISM") {
            self.parallelism = parallelism.parse().ok().filter(|&n| n > 0);
        }

        if let Ok(depth) = std::env::var("CADEX_MAX_DEPTH") {
            self.max_depth = depth
                .parse()
                .with_context(|| format!("CADEX_MAX_DEPTH is not an integer: {:?}", depth))?;
        }

        if let Ok(protocol) = std::env::var("CADEX_STEP_PROTOCOL") {
            self.step_protocol = protocol
                .parse()
                .with_context(|| format!("Invalid CADEX_STEP_PROTOCOL: {:?}", protocol))?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Save configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.tessellation.precision > 0.0) {
            bail!("tessellation precision must be positive, got {}", self.tessellation.precision);
        }
        if !(self.tessellation.angular_deflection > 0.0) {
            bail!(
                "angular deflection must be positive, got {}",
                self.tessellation.angular_deflection
            );
        }
        if self.max_depth == 0 {
            bail!("max_depth must be at least 1");
        }
        Ok(())
    }

    /// Scene builder carrying these tessellation, color and depth settings
    pub fn scene_builder(&self) -> SceneGraphBuilder {
        SceneGraphBuilder::new(self.tessellation)
            .with_default_color(self.default_color)
            .with_max_depth(self.max_depth)
    }
}
