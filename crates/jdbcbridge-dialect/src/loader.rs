//! Locating driver artifacts (module files) for a dialect's native driver.
//!
//! A loader knows the driver class its artifacts provide and where the latest
//! release lives. Fetching is left to the caller; [`LocalArtifacts`] serves
//! files already placed in a directory.

#![allow(clippy::result_large_err)]

use jdbcbridge_core::{ConfigError, Error, Result};
use std::io;
use std::path::{Path, PathBuf};
use url::Url;

pub trait ArtifactLoader {
    /// Driver class name provided by the artifacts.
    fn default_driver(&self) -> &str;

    /// Location configured for this loader, if any.
    fn find_latest_local(&self) -> Option<String> {
        None
    }

    /// Location of the latest upstream release.
    fn find_latest_default(&self) -> String;

    /// The configured location, else the upstream one. Must be `https`.
    fn find_latest(&self) -> Result<Url> {
        let latest = self
            .find_latest_local()
            .unwrap_or_else(|| self.find_latest_default());
        validate_url(&latest)
    }

    /// Module paths for the latest artifacts, found under `dir`.
    fn load_latest(&self, dir: &Path) -> Result<Vec<PathBuf>>;
}

pub fn validate_url(location: &str) -> Result<Url> {
    let url = Url::parse(location).map_err(|e| {
        Error::Config(ConfigError {
            message: format!("invalid artifact URL {}: {}", location, e),
            source: Some(Box::new(e)),
        })
    })?;
    if url.scheme() != "https" {
        return Err(Error::config(format!(
            "URL must start with 'https://': {}",
            location
        )));
    }
    Ok(url)
}

/// File name an artifact URL downloads to.
pub fn artifact_file_name(url: &Url) -> Result<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| Error::config(format!("artifact URL names no file: {}", url)))
}

/// Artifacts already downloaded into a directory, named after their URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalArtifacts {
    driver: String,
    default_url: String,
    local_url: Option<String>,
}

impl LocalArtifacts {
    pub fn new(driver: impl Into<String>, default_url: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            default_url: default_url.into(),
            local_url: None,
        }
    }

    /// Pin a release other than the default.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.local_url = Some(url.into());
        self
    }

    pub fn sqlite() -> Self {
        Self::new(
            "org.sqlite.JDBC",
            "https://github.com/xerial/sqlite-jdbc/releases/download/3.46.1.3/sqlite-jdbc-3.46.1.3.jar",
        )
    }

    pub fn postgresql() -> Self {
        Self::new(
            "org.postgresql.Driver",
            "https://github.com/pgjdbc/pgjdbc/releases/download/REL42.7.4/postgresql-42.7.4.jar",
        )
    }

    pub fn mssql() -> Self {
        Self::new(
            "com.microsoft.sqlserver.jdbc.SQLServerDriver",
            "https://github.com/microsoft/mssql-jdbc/releases/download/v12.8.1/mssql-jdbc-12.8.1.jre11.jar",
        )
    }
}

impl ArtifactLoader for LocalArtifacts {
    fn default_driver(&self) -> &str {
        &self.driver
    }

    fn find_latest_local(&self) -> Option<String> {
        self.local_url.clone()
    }

    fn find_latest_default(&self) -> String {
        self.default_url.clone()
    }

    fn load_latest(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        let url = self.find_latest()?;
        let path = dir.join(artifact_file_name(&url)?);
        if !path.is_file() {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "driver artifact {} not found; download {} first",
                    path.display(),
                    url
                ),
            )));
        }
        tracing::debug!(driver = %self.driver, path = %path.display(), "using local driver artifact");
        Ok(vec![path])
    }
}
