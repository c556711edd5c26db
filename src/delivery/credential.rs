//! # Credential supply.
//!
//! The core treats the API key as opaque: a [`CredentialSource`] produces it,
//! [`CachedCredential`] avoids resolving it on every drain while still
//! picking up external refreshes once the TTL expires.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Environment variable read by [`EnvCredential::default`].
pub const ENV_API_KEY: &str = "JOBVISOR_API_KEY";

/// Supplier of the current credential.
pub trait CredentialSource: Send + Sync + 'static {
    fn resolve(&self) -> Option<String>;
}

impl<F> CredentialSource for F
where
    F: Fn() -> Option<String> + Send + Sync + 'static,
{
    fn resolve(&self) -> Option<String> {
        self()
    }
}

/// Reads the credential from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvCredential {
    var: String,
}

impl EnvCredential {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for EnvCredential {
    fn default() -> Self {
        Self::new(ENV_API_KEY)
    }
}

impl CredentialSource for EnvCredential {
    fn resolve(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|v| !v.is_empty())
    }
}

struct Cached {
    at: Instant,
    value: Option<String>,
}

/// TTL cache in front of a [`CredentialSource`].
pub struct CachedCredential {
    source: Box<dyn CredentialSource>,
    ttl: Duration,
    cached: Mutex<Option<Cached>>,
}

impl CachedCredential {
    pub fn new(source: Box<dyn CredentialSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Returns the cached credential, resolving again once the TTL expired.
    ///
    /// A missing credential is cached as well, so an absent key is not
    /// re-resolved on every tick either.
    pub fn get(&self) -> Option<String> {
        let mut cached = self.cached.lock().unwrap_or_else(|e| e.into_inner());
        match cached.as_ref() {
            Some(c) if c.at.elapsed() < self.ttl => c.value.clone(),
            _ => {
                let value = self.source.resolve();
                *cached = Some(Cached {
                    at: Instant::now(),
                    value: value.clone(),
                });
                value
            }
        }
    }

    /// Drops the cached value; the next `get` resolves again.
    pub fn invalidate(&self) {
        *self.cached.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(calls: Arc<AtomicUsize>) -> Box<dyn CredentialSource> {
        Box::new(move || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            Some(format!("key-{n}"))
        })
    }

    #[test]
    fn reuses_value_within_ttl() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cred = CachedCredential::new(counting(calls.clone()), Duration::from_secs(300));

        assert_eq!(cred.get().as_deref(), Some("key-0"));
        assert_eq!(cred.get().as_deref(), Some("key-0"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        cred.invalidate();
        assert_eq!(cred.get().as_deref(), Some("key-1"));
    }

    #[test]
    fn zero_ttl_resolves_every_time() {
        let calls = Arc::new(AtomicUsize::new(0));
        let cred = CachedCredential::new(counting(calls.clone()), Duration::ZERO);
        cred.get();
        cred.get();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unset_env_var_yields_none() {
        let src = EnvCredential::new("JOBVISOR_TEST_SURELY_UNSET_VARIABLE");
        assert!(src.resolve().is_none());
    }
}
