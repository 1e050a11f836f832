//! Execution environment context.
//!
//! Everything an operator needs at init — pool handle, inbox, storage,
//! backend parameters — is passed explicitly through [`ExecEnv`]; there are
//! no ambient globals. Missing entries fail the requesting operator's init
//! with a configuration error naming the key, which aborts plan startup on
//! that worker.
//!
//! The env only exists at runtime: it is deliberately not serializable, which
//! keeps channel handles and pool references out of any persisted plan.

use std::collections::HashMap;
use std::sync::Arc;

use weft_error::{Result, WeftError};

use crate::exchange::pool::{ConnectionPool, ExchangeInbox};
use crate::exchange::WorkerId;
use crate::fragment::CancelToken;
use crate::storage::TableStore;

#[derive(Debug, Clone, Default)]
pub struct ExecEnv {
    inner: Arc<EnvInner>,
}

#[derive(Debug, Default)]
struct EnvInner {
    worker_id: Option<WorkerId>,
    pool: Option<Arc<dyn ConnectionPool>>,
    inbox: Option<Arc<ExchangeInbox>>,
    table_store: Option<Arc<dyn TableStore>>,
    cancel: CancelToken,
    params: HashMap<String, String>,
}

impl ExecEnv {
    pub fn builder() -> ExecEnvBuilder {
        ExecEnvBuilder {
            inner: EnvInner::default(),
        }
    }

    /// The executing worker's own id.
    pub fn worker_id(&self) -> Result<WorkerId> {
        self.inner
            .worker_id
            .ok_or_else(|| WeftError::config("Execution environment is missing the worker id"))
    }

    pub fn connection_pool(&self) -> Result<Arc<dyn ConnectionPool>> {
        self.inner.pool.clone().ok_or_else(|| {
            WeftError::config("Execution environment is missing the connection pool")
        })
    }

    pub fn exchange_inbox(&self) -> Result<Arc<ExchangeInbox>> {
        self.inner.inbox.clone().ok_or_else(|| {
            WeftError::config("Execution environment is missing the exchange inbox")
        })
    }

    pub fn table_store(&self) -> Result<Arc<dyn TableStore>> {
        self.inner.table_store.clone().ok_or_else(|| {
            WeftError::config("Execution environment is missing the table store")
        })
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.inner.cancel
    }

    /// A backend-specific string parameter, e.g. a local database file path.
    pub fn param(&self, key: &str) -> Result<&str> {
        self.inner
            .params
            .get(key)
            .map(|s| s.as_str())
            .ok_or_else(|| {
                WeftError::config(format!(
                    "Execution environment is missing required parameter '{key}'"
                ))
            })
    }

    pub fn param_opt(&self, key: &str) -> Option<&str> {
        self.inner.params.get(key).map(|s| s.as_str())
    }
}

pub struct ExecEnvBuilder {
    inner: EnvInner,
}

impl ExecEnvBuilder {
    pub fn worker_id(mut self, id: WorkerId) -> Self {
        self.inner.worker_id = Some(id);
        self
    }

    pub fn connection_pool(mut self, pool: Arc<dyn ConnectionPool>) -> Self {
        self.inner.pool = Some(pool);
        self
    }

    pub fn exchange_inbox(mut self, inbox: Arc<ExchangeInbox>) -> Self {
        self.inner.inbox = Some(inbox);
        self
    }

    pub fn table_store(mut self, store: Arc<dyn TableStore>) -> Self {
        self.inner.table_store = Some(store);
        self
    }

    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.inner.cancel = cancel;
        self
    }

    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.inner.params.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ExecEnv {
        ExecEnv {
            inner: Arc::new(self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_error::ErrorKind;

    #[test]
    fn missing_entries_are_config_errors() {
        let env = ExecEnv::default();
        assert_eq!(ErrorKind::Config, env.worker_id().unwrap_err().kind());
        assert_eq!(ErrorKind::Config, env.connection_pool().unwrap_err().kind());
        assert_eq!(ErrorKind::Config, env.param("db.path").unwrap_err().kind());
    }

    #[test]
    fn params_round_trip() {
        let env = ExecEnv::builder()
            .worker_id(WorkerId::new(3))
            .param("db.path", "/tmp/weft.db")
            .build();
        assert_eq!(WorkerId::new(3), env.worker_id().unwrap());
        assert_eq!("/tmp/weft.db", env.param("db.path").unwrap());
        assert!(env.param_opt("other").is_none());
    }
}
