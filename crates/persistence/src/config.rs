//! Environment configuration and per-request session construction.
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | `STOCKER_PERSISTENCE` | `memory` | `memory` or `postgres` |
//! | `DATABASE_URL` | none | required for `postgres` |
//! | `STOCKER_DB_MAX_CONNECTIONS` | `5` | pool size for `postgres` |
//! | `STOCKER_UOW_CONTEXT` | `default` | context name used when none is given |

use std::sync::Arc;

use thiserror::Error;

use crate::error::SessionError;
use crate::session::{InMemorySession, InMemoryStore, SessionRef};
use crate::uow::{DEFAULT_CONTEXT, UnitOfWork, UnitOfWorkBuilder};

const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },

    #[error("failed to connect: {0}")]
    Connect(#[from] SessionError),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistenceConfig {
    pub backend: Backend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub default_context: String,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            database_url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            default_context: DEFAULT_CONTEXT.to_string(),
        }
    }
}

impl PersistenceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("STOCKER_PERSISTENCE").as_deref().map(str::trim) {
            None | Some("") => Backend::Memory,
            Some(v) if v.eq_ignore_ascii_case("memory") => Backend::Memory,
            Some(v) if v.eq_ignore_ascii_case("postgres") => Backend::Postgres,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "STOCKER_PERSISTENCE",
                    value: other.to_string(),
                });
            }
        };

        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if backend == Backend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }

        let max_connections = match lookup("STOCKER_DB_MAX_CONNECTIONS") {
            None => DEFAULT_MAX_CONNECTIONS,
            Some(raw) => match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::Invalid {
                        var: "STOCKER_DB_MAX_CONNECTIONS",
                        value: raw,
                    });
                }
            },
        };

        let default_context = lookup("STOCKER_UOW_CONTEXT")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CONTEXT.to_string());

        Ok(Self {
            backend,
            database_url,
            max_connections,
            default_context,
        })
    }
}

#[derive(Clone)]
enum Backing {
    InMemory(Arc<InMemoryStore>),
    #[cfg(feature = "postgres")]
    Postgres(sqlx::PgPool),
}

/// Opens one fresh session per unit of work over a shared backend.
///
/// Units of work created without an explicit context use the configured
/// `STOCKER_UOW_CONTEXT`.
#[derive(Clone)]
pub struct SessionFactory {
    backing: Backing,
    default_context: String,
}

impl core::fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let backend = match &self.backing {
            Backing::InMemory(_) => "in_memory",
            #[cfg(feature = "postgres")]
            Backing::Postgres(_) => "postgres",
        };
        f.debug_struct("SessionFactory")
            .field("backend", &backend)
            .field("default_context", &self.default_context)
            .finish()
    }
}

impl SessionFactory {
    pub fn in_memory() -> Self {
        Self {
            backing: Backing::InMemory(InMemoryStore::arc()),
            default_context: DEFAULT_CONTEXT.to_string(),
        }
    }

    /// Connect the configured backend.
    ///
    /// Without the `postgres` feature a `postgres` backend falls back to memory.
    pub async fn connect(config: &PersistenceConfig) -> Result<Self, ConfigError> {
        let backing = match config.backend {
            Backend::Memory => Backing::InMemory(InMemoryStore::arc()),
            Backend::Postgres => {
                #[cfg(feature = "postgres")]
                {
                    let url = config
                        .database_url
                        .as_deref()
                        .ok_or(ConfigError::Missing("DATABASE_URL"))?;
                    let pool = sqlx::postgres::PgPoolOptions::new()
                        .max_connections(config.max_connections)
                        .connect(url)
                        .await
                        .map_err(|e| SessionError::Database(format!("connect: {e}")))?;
                    crate::session::postgres::ensure_schema(&pool).await?;
                    Backing::Postgres(pool)
                }
                #[cfg(not(feature = "postgres"))]
                {
                    tracing::warn!(
                        "STOCKER_PERSISTENCE=postgres but postgres feature not enabled, falling back to in-memory"
                    );
                    Backing::InMemory(InMemoryStore::arc())
                }
            }
        };
        Ok(Self {
            backing,
            default_context: config.default_context.clone(),
        })
    }

    pub fn with_default_context(mut self, context: impl Into<String>) -> Self {
        self.default_context = context.into();
        self
    }

    pub fn default_context(&self) -> &str {
        &self.default_context
    }

    pub fn open_session(&self) -> SessionRef {
        match &self.backing {
            Backing::InMemory(store) => InMemorySession::arc(store.clone()) as SessionRef,
            #[cfg(feature = "postgres")]
            Backing::Postgres(pool) => {
                Arc::new(crate::session::postgres::PgSession::new(pool.clone())) as SessionRef
            }
        }
    }

    /// Builder over a fresh session, seeded with the default context.
    pub fn builder(&self) -> UnitOfWorkBuilder {
        UnitOfWork::builder()
            .context(self.default_context.clone())
            .session(self.open_session())
    }

    /// Unit of work over a fresh session, logging through `tracing`.
    pub fn unit_of_work(&self, context: impl Into<String>) -> UnitOfWork {
        UnitOfWork::new(context, self.open_session())
    }

    /// Like [`unit_of_work`](Self::unit_of_work) with the configured default context.
    pub fn default_unit_of_work(&self) -> UnitOfWork {
        self.unit_of_work(self.default_context.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_to_memory() {
        let cfg = PersistenceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(cfg, PersistenceConfig::default());
    }

    #[test]
    fn postgres_requires_database_url() {
        let err = PersistenceConfig::from_lookup(lookup(&[("STOCKER_PERSISTENCE", "postgres")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));

        let cfg = PersistenceConfig::from_lookup(lookup(&[
            ("STOCKER_PERSISTENCE", "Postgres"),
            ("DATABASE_URL", "postgres://localhost/stocker"),
            ("STOCKER_DB_MAX_CONNECTIONS", "12"),
            ("STOCKER_UOW_CONTEXT", "sales"),
        ]))
        .unwrap();
        assert_eq!(cfg.backend, Backend::Postgres);
        assert_eq!(cfg.max_connections, 12);
        assert_eq!(cfg.default_context, "sales");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            PersistenceConfig::from_lookup(lookup(&[("STOCKER_PERSISTENCE", "mongo")])),
            Err(ConfigError::Invalid { var: "STOCKER_PERSISTENCE", .. })
        ));
        assert!(matches!(
            PersistenceConfig::from_lookup(lookup(&[("STOCKER_DB_MAX_CONNECTIONS", "0")])),
            Err(ConfigError::Invalid { var: "STOCKER_DB_MAX_CONNECTIONS", .. })
        ));
    }

    #[tokio::test]
    async fn memory_factory_shares_store_across_sessions() {
        let factory = SessionFactory::connect(&PersistenceConfig::default()).await.unwrap();
        let a = factory.open_session();
        let b = factory.open_session();
        assert!(!Arc::ptr_eq(&a, &b));

        let uow = factory.unit_of_work("cms");
        assert_eq!(uow.context(), "cms");
        assert!(!uow.has_active_transaction());
    }

    #[tokio::test]
    async fn configured_context_seeds_units_of_work() {
        let cfg = PersistenceConfig::from_lookup(lookup(&[("STOCKER_UOW_CONTEXT", "hr")])).unwrap();
        let factory = SessionFactory::connect(&cfg).await.unwrap();
        assert_eq!(factory.default_context(), "hr");

        assert_eq!(factory.default_unit_of_work().context(), "hr");
        assert_eq!(factory.builder().build().unwrap().context(), "hr");
        assert_eq!(factory.builder().context("cms").build().unwrap().context(), "cms");

        let renamed = SessionFactory::in_memory().with_default_context("sales");
        assert_eq!(renamed.default_unit_of_work().context(), "sales");
        assert_eq!(SessionFactory::in_memory().default_unit_of_work().context(), "default");
    }
}
