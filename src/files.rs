use std::path::Path;

use clap::ValueEnum;
use color_eyre::eyre::{
    Error,
    WrapErr,
    bail,
};
use pstd_solver::SceneConfig;
use serde::Serialize;

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn to_string_pretty<T: Serialize>(&self, value: &T) -> Result<String, Error> {
        Ok(match self {
            Self::Toml => toml::to_string_pretty(value)?,
            Self::Json => serde_json::to_string_pretty(value)?,
        })
    }
}

/// Reads a scene file. The format is chosen by the file extension.
pub fn read_scene(path: &Path) -> Result<SceneConfig, Error> {
    let Some(format) = ConfigFormat::from_path(path)
    else {
        bail!("Unknown scene file format: {}", path.display());
    };

    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Could not read scene file: {}", path.display()))?;

    let config = match format {
        ConfigFormat::Toml => toml::from_str(&text)?,
        ConfigFormat::Json => serde_json::from_str(&text)?,
    };
    tracing::debug!(path = %path.display(), ?format, "read scene");

    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use crate::files::ConfigFormat;

    #[test]
    fn it_picks_the_format_by_extension() {
        assert!(matches!(
            ConfigFormat::from_path(Path::new("scene.toml")),
            Some(ConfigFormat::Toml)
        ));
        assert!(matches!(
            ConfigFormat::from_path(Path::new("dir/scene.json")),
            Some(ConfigFormat::Json)
        ));
        assert!(ConfigFormat::from_path(Path::new("scene.yaml")).is_none());
        assert!(ConfigFormat::from_path(Path::new("scene")).is_none());
    }
}
