use std::{path::PathBuf, time::Duration};

use crate::{
    backoff::BackoffPolicy,
    types::{Error, Result},
};

/// Client configuration handed to [`Connect::connect`](crate::client::Connect::connect).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Deadline for a single cluster request; slower requests surface as `Unavailable`.
    pub timeout: Duration,
    pub ca_path: Option<PathBuf>,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    /// Lifetime of a transaction lock. A primary lock older than this may be rolled back by
    /// any reader that trips over it.
    pub lock_ttl: Duration,
    /// Mutations per prewrite or commit request.
    pub commit_batch_size: usize,
    /// How long snapshot reads wait for a lock held by another transaction.
    pub read_lock_backoff: BackoffPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(2),
            ca_path: None,
            cert_path: None,
            key_path: None,
            lock_ttl: Duration::from_secs(3),
            commit_batch_size: 64,
            read_lock_backoff: BackoffPolicy::no_jitter(2, 500, 10),
        }
    }
}

impl Config {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables TLS with the given CA, client certificate and client key.
    pub fn with_security(
        mut self,
        ca_path: impl Into<PathBuf>,
        cert_path: impl Into<PathBuf>,
        key_path: impl Into<PathBuf>,
    ) -> Self {
        self.ca_path = Some(ca_path.into());
        self.cert_path = Some(cert_path.into());
        self.key_path = Some(key_path.into());
        self
    }

    pub fn with_lock_ttl(mut self, lock_ttl: Duration) -> Self {
        self.lock_ttl = lock_ttl;
        self
    }

    pub fn with_commit_batch_size(mut self, commit_batch_size: usize) -> Self {
        self.commit_batch_size = commit_batch_size;
        self
    }

    pub fn with_read_lock_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.read_lock_backoff = backoff;
        self
    }

    /// Whether all three TLS paths are set.
    pub fn is_secure(&self) -> bool {
        self.ca_path.is_some() && self.cert_path.is_some() && self.key_path.is_some()
    }

    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(Error::Config("timeout must be non-zero".into()));
        }
        if self.commit_batch_size == 0 {
            return Err(Error::Config("commit batch size must be non-zero".into()));
        }
        let tls = [&self.ca_path, &self.cert_path, &self.key_path];
        let set = tls.iter().filter(|p| p.is_some()).count();
        if set != 0 && set != tls.len() {
            return Err(Error::Config(
                "ca, cert and key paths must be set together".into(),
            ));
        }
        Ok(())
    }
}

/// Concurrency control used by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransactionMode {
    /// Conflicts are detected at prewrite.
    #[default]
    Optimistic,
    /// Keys are locked as they are read for update; prewrite converts those locks.
    Pessimistic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionOptions {
    pub mode: TransactionMode,
    /// How long to wait for a lock held by another transaction before failing. Disabled by
    /// default: contention fails fast.
    pub lock_backoff: BackoffPolicy,
}

impl TransactionOptions {
    pub fn new_optimistic() -> Self {
        Self {
            mode: TransactionMode::Optimistic,
            ..Default::default()
        }
    }

    pub fn new_pessimistic() -> Self {
        Self {
            mode: TransactionMode::Pessimistic,
            ..Default::default()
        }
    }

    pub fn with_lock_backoff(mut self, lock_backoff: BackoffPolicy) -> Self {
        self.lock_backoff = lock_backoff;
        self
    }

    /// Retries lock waits up to `retries` times, doubling from 2ms to at most 500ms.
    pub fn with_lock_retries(self, retries: u32) -> Self {
        self.with_lock_backoff(BackoffPolicy::no_jitter(2, 500, retries))
    }

    pub fn is_pessimistic(&self) -> bool {
        self.mode == TransactionMode::Pessimistic
    }
}
