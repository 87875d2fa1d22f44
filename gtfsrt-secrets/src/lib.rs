//! Secret resolution for authenticated feeds.
//!
//! The store backend is external; this crate defines the [`SecretStore`]
//! trait, a process-lifetime memoizing [`SecretResolver`], and the startup
//! pass that populates `AuthSpec::resolved_value` on every flattened feed.
//! The cache has no TTL: secret rotation requires a restart.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use gtfsrt_config::FeedSpec;

/// Error fetching or resolving a secret.
#[derive(Debug, Error)]
pub enum SecretError {
    /// The backing store could not produce the secret. Fatal at startup.
    #[error("failed to fetch secret {secret_name:?}: {message}")]
    Unavailable {
        secret_name: String,
        message: String,
    },
}

impl SecretError {
    pub fn unavailable(secret_name: impl Into<String>, message: impl Into<String>) -> Self {
        SecretError::Unavailable {
            secret_name: secret_name.into(),
            message: message.into(),
        }
    }
}

/// External secret store the resolver reads from.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Stable scope identifier used in cache keys (e.g. a project id).
    fn scope(&self) -> &str;

    /// Fetch the current value of a named secret.
    async fn fetch(&self, secret_name: &str) -> Result<String, SecretError>;
}

/// Store that reads secrets from `SECRET_{name}` environment variables.
/// Intended for development and tests; deployments plug in a managed store
/// through [`SecretStore`].
pub struct EnvSecretStore;

#[async_trait]
impl SecretStore for EnvSecretStore {
    fn scope(&self) -> &str {
        "env"
    }

    async fn fetch(&self, secret_name: &str) -> Result<String, SecretError> {
        let var = format!("SECRET_{secret_name}");
        std::env::var(&var)
            .map_err(|_| SecretError::unavailable(secret_name, format!("{var} is not set")))
    }
}

/// Memoizing resolver over a [`SecretStore`].
///
/// Each distinct `(scope, secret_name)` pair is fetched at most once per
/// process; distinct names resolve concurrently during the startup pass.
pub struct SecretResolver {
    store: Arc<dyn SecretStore>,
    cache: Mutex<HashMap<(String, String), String>>,
}

impl SecretResolver {
    pub fn new(store: Arc<dyn SecretStore>) -> Self {
        Self {
            store,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a secret, consulting the cache first.
    pub async fn get(&self, secret_name: &str) -> Result<String, SecretError> {
        let key = (self.store.scope().to_string(), secret_name.to_string());

        {
            let cache = self.cache.lock().await;
            if let Some(value) = cache.get(&key) {
                return Ok(value.clone());
            }
        }

        let value = self.store.fetch(secret_name).await?;

        let mut cache = self.cache.lock().await;
        cache.entry(key).or_insert_with(|| value.clone());
        Ok(value)
    }

    /// Resolve every referenced secret and populate `resolved_value` on each
    /// feed's auth. Any unresolvable reference fails the whole pass.
    pub async fn resolve_feed_specs(&self, specs: &mut [FeedSpec]) -> Result<(), SecretError> {
        let names: HashSet<String> = specs
            .iter()
            .filter_map(|s| s.auth.as_ref())
            .map(|a| a.secret_name.clone())
            .collect();

        if names.is_empty() {
            return Ok(());
        }
        info!(count = names.len(), "resolving feed secrets");

        let fetches = names.iter().map(|name| async move {
            let value = self.get(name).await?;
            Ok::<_, SecretError>((name.clone(), value))
        });
        let resolved: HashMap<String, String> =
            futures::future::try_join_all(fetches).await?.into_iter().collect();

        for spec in specs.iter_mut() {
            if let Some(auth) = spec.auth.as_mut() {
                // try_join_all above guarantees every referenced name resolved
                if let Some(secret) = resolved.get(&auth.secret_name) {
                    auth.resolved_value = Some(auth.render(secret));
                    debug!(feed_id = %spec.id, secret = %auth.secret_name, "credential resolved");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfsrt_config::{AuthPlacement, AuthSpec, FeedType};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingStore {
        fetches: AtomicU32,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl SecretStore for CountingStore {
        fn scope(&self) -> &str {
            "test"
        }

        async fn fetch(&self, secret_name: &str) -> Result<String, SecretError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(secret_name) {
                return Err(SecretError::unavailable(secret_name, "not found"));
            }
            Ok(format!("value-of-{secret_name}"))
        }
    }

    fn feed_with_auth(id: &str, secret_name: &str, template: Option<&str>) -> FeedSpec {
        FeedSpec {
            id: id.to_string(),
            name: id.to_string(),
            url: "https://example.com/rt".parse().unwrap(),
            feed_type: FeedType::TripUpdates,
            agency_id: "agency".to_string(),
            agency_name: "Agency".to_string(),
            system_id: None,
            system_name: None,
            schedule_url: None,
            interval_seconds: 20,
            timeout_seconds: 30,
            retry: Default::default(),
            auth: Some(AuthSpec {
                placement: AuthPlacement::Header,
                secret_name: secret_name.to_string(),
                key: "Authorization".to_string(),
                value: template.map(String::from),
                resolved_value: None,
            }),
        }
    }

    #[tokio::test]
    async fn test_memoizes_per_secret_name() {
        let store = Arc::new(CountingStore {
            fetches: AtomicU32::new(0),
            fail_on: None,
        });
        let resolver = SecretResolver::new(store.clone());

        let mut specs = vec![
            feed_with_auth("a", "shared", None),
            feed_with_auth("b", "shared", Some("Bearer ${SECRET}")),
            feed_with_auth("c", "other", None),
        ];
        resolver.resolve_feed_specs(&mut specs).await.unwrap();

        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
        assert_eq!(
            specs[0].auth.as_ref().unwrap().resolved_value.as_deref(),
            Some("value-of-shared")
        );
        assert_eq!(
            specs[1].auth.as_ref().unwrap().resolved_value.as_deref(),
            Some("Bearer value-of-shared")
        );
        assert_eq!(
            specs[2].auth.as_ref().unwrap().resolved_value.as_deref(),
            Some("value-of-other")
        );

        // A later lookup hits the cache.
        resolver.get("shared").await.unwrap();
        assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_secret_is_fatal() {
        let store = Arc::new(CountingStore {
            fetches: AtomicU32::new(0),
            fail_on: Some("missing"),
        });
        let resolver = SecretResolver::new(store);

        let mut specs = vec![feed_with_auth("a", "missing", None)];
        let err = resolver.resolve_feed_specs(&mut specs).await.unwrap_err();
        assert!(err.to_string().contains("missing"));
        assert!(specs[0].auth.as_ref().unwrap().resolved_value.is_none());
    }

    #[tokio::test]
    async fn test_feeds_without_auth_are_untouched() {
        let store = Arc::new(CountingStore {
            fetches: AtomicU32::new(0),
            fail_on: None,
        });
        let resolver = SecretResolver::new(store.clone());

        let mut spec = feed_with_auth("a", "unused", None);
        spec.auth = None;
        let mut specs = vec![spec];
        resolver.resolve_feed_specs(&mut specs).await.unwrap();
        assert_eq!(store.fetches.load(Ordering::SeqCst), 0);
    }
}
