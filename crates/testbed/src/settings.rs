//! Fixture configuration
//!
//! A fixture lists the JSON files it wants loaded through
//! [`TestAppSettings`]. Files are read relative to the current directory,
//! then environment variables are layered on top (`__` separates sections,
//! so `OPTIONS__RATE` overrides `options.rate`).

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use testbed_di::DIContainer;
use tracing::debug;

use crate::error::TestBedResult;

/// One configuration file to load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestAppSettings {
    pub filename: Option<String>,
    /// A missing optional file is skipped instead of failing the build
    pub is_optional: bool,
}

impl TestAppSettings {
    pub fn required(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            is_optional: false,
        }
    }

    pub fn optional(filename: impl Into<String>) -> Self {
        Self {
            filename: Some(filename.into()),
            is_optional: true,
        }
    }

    fn named_file(&self) -> Option<&str> {
        self.filename.as_deref().filter(|name| !name.is_empty())
    }
}

/// Loaded configuration root
#[derive(Debug, Clone)]
pub struct Configuration {
    inner: Config,
}

impl Configuration {
    pub fn from_config(inner: Config) -> Self {
        Self { inner }
    }

    /// Deserialize the section at `name`; `Ok(None)` when it does not exist
    pub fn section<T: DeserializeOwned>(&self, name: &str) -> TestBedResult<Option<T>> {
        match self.inner.get::<T>(name) {
            Ok(value) => Ok(Some(value)),
            Err(config::ConfigError::NotFound(_)) => Ok(None),
            Err(err) => Err(err.into()),
        }
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.inner.get_string(key).ok()
    }

    pub fn inner(&self) -> &Config {
        &self.inner
    }
}

/// Build the configuration root for a fixture.
///
/// Returns `Ok(None)` unless every settings entry names a file. `configure`
/// may add further sources; they are applied after the files and before the
/// environment.
pub fn build_configuration<F>(
    settings: &[TestAppSettings],
    base_path: &Path,
    configure: F,
) -> TestBedResult<Option<Configuration>>
where
    F: FnOnce(ConfigBuilder<DefaultState>) -> ConfigBuilder<DefaultState>,
{
    if !settings.iter().all(|setting| setting.named_file().is_some()) {
        debug!("Skipping configuration: a settings entry has no file name");
        return Ok(None);
    }

    let mut builder = Config::builder();
    for setting in settings {
        if let Some(filename) = setting.named_file() {
            let path = base_path.join(filename);
            debug!(path = %path.display(), optional = setting.is_optional, "Adding configuration file");
            builder = builder.add_source(
                File::from(path)
                    .format(FileFormat::Json)
                    .required(!setting.is_optional),
            );
        }
    }

    let builder = configure(builder).add_source(Environment::default().separator("__"));
    Ok(Some(Configuration::from_config(builder.build()?)))
}

/// A bound configuration section, resolvable from a fixture container
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options<T> {
    value: T,
}

impl<T> Options<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }

    pub fn value(&self) -> &T {
        &self.value
    }
}

impl<T> Deref for Options<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

/// Register `Options<T>` bound from `section`.
///
/// Falls back to `T::default()` when there is no configuration or no such
/// section.
pub fn configure_options<T>(
    services: &DIContainer,
    configuration: Option<&Configuration>,
    section: &str,
) -> TestBedResult<()>
where
    T: DeserializeOwned + Default + Send + Sync + 'static,
{
    let value = match configuration {
        Some(configuration) => configuration.section::<T>(section)?.unwrap_or_default(),
        None => T::default(),
    };
    services.register_instance(Arc::new(Options::new(value)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct RateOptions {
        rate: i32,
    }

    #[test]
    fn test_unnamed_settings_skip_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let settings = vec![TestAppSettings::default()];

        let configuration = build_configuration(&settings, dir.path(), |b| b).unwrap();
        assert!(configuration.is_none());
    }

    #[test]
    fn test_missing_optional_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let settings = vec![TestAppSettings::optional("absent.json")];

        let configuration = build_configuration(&settings, dir.path(), |b| b).unwrap();
        assert!(configuration.is_some());
    }

    #[test]
    fn test_missing_required_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let settings = vec![TestAppSettings::required("absent.json")];

        assert!(build_configuration(&settings, dir.path(), |b| b).is_err());
    }

    #[test]
    fn test_section_binding() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("appsettings.json"), r#"{ "calc": { "rate": 10 } }"#).unwrap();
        let settings = vec![TestAppSettings::required("appsettings.json")];

        let configuration = build_configuration(&settings, dir.path(), |b| b)
            .unwrap()
            .unwrap();

        let options = configuration.section::<RateOptions>("calc").unwrap();
        assert_eq!(options, Some(RateOptions { rate: 10 }));
        assert_eq!(configuration.section::<RateOptions>("missing").unwrap(), None);
    }

    #[test]
    fn test_configure_options_defaults_without_configuration() {
        let services = DIContainer::new();
        configure_options::<RateOptions>(&services, None, "calc").unwrap();

        let options = services.resolve::<Options<RateOptions>>().unwrap();
        assert_eq!(options.rate, 0);
    }
}
