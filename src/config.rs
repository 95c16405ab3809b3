use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::aggregate::scale::ColorScale;
use crate::regions::{CoordinateSystem, RegionFormat, RegionOptions};

/// Settings for one aggregation run.
///
/// Stored as a JSON object on disk; every field is optional:
/// ```json
/// {
///   "level": "2",
///   "crs": "web-mercator",
///   "exclude_ids": ["FR", "IT", "DE", "NL"],
///   "convert_coordinates": true,
///   "scale": "temperature"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub id_property: String,
    pub level_property: String,
    pub level: Option<String>,
    pub crs: Option<CoordinateSystem>,
    pub region_format: Option<RegionFormat>,
    pub intensity_column: String,
    pub exclude_ids: Vec<String>,
    pub strict_wkt: bool,
    pub convert_coordinates: bool,
    pub scale: Option<ColorScale>,
    pub sample_rate: f64,
    pub http_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let regions = RegionOptions::default();
        Self {
            id_property: regions.id_property,
            level_property: regions.level_property,
            level: None,
            crs: None,
            region_format: None,
            intensity_column: regions.intensity_column,
            exclude_ids: Vec::new(),
            strict_wkt: false,
            convert_coordinates: false,
            scale: None,
            sample_rate: 1.0,
            http_timeout_secs: 30,
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise returns the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None => Ok(Self::default()),
        }
    }

    /// Applies region flags given on the command line. Unset flags keep the
    /// loaded values; excluded ids are added to the configured ones.
    pub fn override_regions(
        &mut self,
        level: Option<String>,
        crs: Option<CoordinateSystem>,
        format: Option<RegionFormat>,
        exclude: Vec<String>,
    ) {
        if level.is_some() {
            self.level = level;
        }
        if crs.is_some() {
            self.crs = crs;
        }
        if format.is_some() {
            self.region_format = format;
        }
        self.exclude_ids.extend(exclude);
    }

    pub fn region_options(&self) -> RegionOptions {
        RegionOptions {
            id_property: self.id_property.clone(),
            level_property: self.level_property.clone(),
            level: self.level.clone(),
            crs: self.crs,
            format: self.region_format,
            exclude_ids: self.exclude_ids.clone(),
            intensity_column: self.intensity_column.clone(),
            strict_wkt: self.strict_wkt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{ "level": "2", "crs": "european-laea", "scale": "temperature" }"#).unwrap();

        assert_eq!(config.level.as_deref(), Some("2"));
        assert_eq!(config.crs, Some(CoordinateSystem::EuropeanLaea));
        assert_eq!(config.scale, Some(ColorScale::Temperature));
        assert_eq!(config.id_property, "NUTS_ID");
        assert_eq!(config.sample_rate, 1.0);
    }

    #[test]
    fn test_load_from_file() {
        let path = format!("{}/nuts_mapper_config_test.json", env::temp_dir().display());
        fs::write(&path, r#"{ "exclude_ids": ["FR"], "region_format": "wkt-csv" }"#).unwrap();

        let config = PipelineConfig::load(&path).unwrap();
        let options = config.region_options();
        assert_eq!(options.exclude_ids, vec!["FR"]);
        assert_eq!(options.format, Some(RegionFormat::WktCsv));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_override_regions_keeps_unset_values() {
        let mut config = PipelineConfig {
            level: Some("2".into()),
            crs: Some(CoordinateSystem::EuropeanLaea),
            exclude_ids: vec!["FR".into()],
            ..Default::default()
        };

        config.override_regions(None, Some(CoordinateSystem::WebMercator), Some(RegionFormat::WktCsv), vec!["IT".into()]);

        assert_eq!(config.level.as_deref(), Some("2"));
        assert_eq!(config.crs, Some(CoordinateSystem::WebMercator));
        assert_eq!(config.region_format, Some(RegionFormat::WktCsv));
        assert_eq!(config.exclude_ids, vec!["FR", "IT"]);
    }

    #[test]
    fn test_load_missing_file_is_error() {
        assert!(PipelineConfig::load("/no/such/config.json").is_err());
        assert_eq!(PipelineConfig::load_or_default(None).unwrap(), PipelineConfig::default());
    }
}
