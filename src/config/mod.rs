use crate::{
    enums::{Interpolation, SortBy, TransformKind},
    geometry::DEFAULT_DIRECTION_EPSILON,
};
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    #[serde(default)]
    pub copy: CopyConfig,
    pub export: ExportConfig,
}

impl AppConfig {
    /// Layer the embedded defaults, an optional `roi-copy.toml` and
    /// `ROI_COPY_*` environment variables.
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::from_file("roi-copy.toml")
    }

    pub fn from_file(path: &str) -> Result<Self, config::ConfigError> {
        use config::Config;
        let s = Config::builder()
            .add_source(config::File::from_str(
                include_str!("defaults.toml"),
                config::FileFormat::Toml,
            ))
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("ROI_COPY")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        s.try_deserialize()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    // Also configurable via RUST_LOG and ROI_COPY_LOGGING__LEVEL
    pub level: String,
}

/// Settings of the copy engine.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CopyConfig {
    /// Largest direction cosine difference still treated as equal orientation.
    pub direction_epsilon: f64,
    /// Slice order used when loading a series.
    pub sort_by: SortBy,
    /// Interpolation for intensity images. Masks always use nearest neighbour.
    pub intensity_interpolation: Interpolation,
    /// Whether cross Frame of Reference copies expect a registration.
    pub transform: TransformKind,
    /// Worker threads of the resampler; the global rayon pool when unset.
    pub resampler_threads: Option<usize>,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            direction_epsilon: DEFAULT_DIRECTION_EPSILON,
            sort_by: SortBy::default(),
            intensity_interpolation: Interpolation::default(),
            transform: TransformKind::default(),
            resampler_threads: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    /// Directory exported ROI files are written to.
    pub directory: PathBuf,
    /// Prepended to labels and file names of exported ROIs.
    pub name_prefix: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_match_code_defaults() {
        let config = AppConfig::from_file("does-not-exist.toml").unwrap();
        assert_eq!(config.copy, CopyConfig::default());
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.export.name_prefix.as_deref(), Some("copy"));
    }

    #[test]
    fn partial_copy_section_keeps_defaults() {
        let config: CopyConfig = config::Config::builder()
            .add_source(config::File::from_str(
                "direction_epsilon = 0.001\nintensity_interpolation = \"b_spline\"",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.direction_epsilon, 0.001);
        assert_eq!(config.intensity_interpolation, Interpolation::BSpline);
        assert_eq!(config.sort_by, SortBy::ImagePositionPatient);
        assert_eq!(config.resampler_threads, None);
    }
}
