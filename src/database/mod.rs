//! The public command surface over one logical database.
//!
//! `Database` validates its connection parameters when it is built and connects lazily on the
//! first verb. Every verb takes a declarative [`Command`](crate::types::Command) mapping, builds
//! the matching typed request and either calls a driver primitive or dispatches a named command.

mod ops;
pub mod reports;

use std::path::Path;

use once_cell::sync::OnceCell;

use crate::command::Dispatcher;
use crate::config::ConnectionConfig;
use crate::driver::{Driver, MemoryDriver};
use crate::errors::DbError;

pub use reports::{FindAndModifyReport, IndexReport, UpdateReport};

pub struct Database<D: Driver = MemoryDriver> {
    config: ConnectionConfig,
    driver: OnceCell<D>,
}

impl<D: Driver> Database<D> {
    /// # Errors
    /// Returns `DbError::Config` when the parameters fail validation.
    pub fn new(config: ConnectionConfig) -> Result<Self, DbError> {
        config.validate()?;
        Ok(Self { config, driver: OnceCell::new() })
    }

    /// Load parameters from `path` (or the default locations) plus environment overrides.
    ///
    /// # Errors
    /// Any configuration loading or validation failure.
    pub fn open(path: Option<&Path>) -> Result<Self, DbError> {
        Self::new(ConnectionConfig::load(path)?)
    }

    /// Use an already constructed driver instead of connecting lazily.
    ///
    /// # Errors
    /// Returns `DbError::Config` when the parameters fail validation.
    pub fn with_driver(config: ConnectionConfig, driver: D) -> Result<Self, DbError> {
        config.validate()?;
        Ok(Self { config, driver: OnceCell::with_value(driver) })
    }

    #[must_use]
    pub const fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.driver.get().is_some()
    }

    /// The driver, connecting on first use.
    ///
    /// # Errors
    /// Whatever `Driver::connect` reports; a failed connect is retried on the next call.
    pub fn driver(&self) -> Result<&D, DbError> {
        self.driver.get_or_try_init(|| {
            log::info!(
                "connecting to {} (database '{}')",
                self.config.connection_uri(),
                self.config.name
            );
            D::connect(&self.config).inspect_err(|e| log::error!("connect failed: {e}"))
        })
    }

    fn dispatcher(&self) -> Result<Dispatcher<'_, D>, DbError> {
        Ok(Dispatcher::new(self.driver()?))
    }
}

impl<D: Driver> std::fmt::Debug for Database<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.config.name)
            .field("hosts", &self.config.hosts)
            .field("connected", &self.is_connected())
            .finish()
    }
}
