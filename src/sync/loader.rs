use serde_json::Value;
use tracing::{debug, warn};

use super::cache::LocalCache;
use super::envelope::{upgrade, Envelope, Migration};
use super::remote::{RemoteStore, Resource};

/// Where a loaded document came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Remote,
    Cache,
    /// Neither side had it; the migration's defaults were used
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Loaded {
    pub envelope: Envelope,
    pub source: Source,
}

/// Load a document: the server first, the local cache when the server is
/// unreachable. The value is migrated before it is returned and the
/// migrated form is written back where it came from.
pub async fn load(
    remote: &dyn RemoteStore,
    cache: &dyn LocalCache,
    resource: &Resource,
    migration: &dyn Migration,
) -> Loaded {
    match remote.fetch(resource).await {
        Ok(stored) => {
            let envelope = stored.map(Envelope::from_value).unwrap_or_else(Envelope::empty);
            let migrated = upgrade(envelope, migration);

            if migrated.changed {
                if let Err(e) = remote.push(resource, &migrated.envelope).await {
                    debug!(resource = %resource, error = %e, "Failed to write back migrated document");
                }
            }
            write_cache(cache, resource, &migrated.envelope);

            Loaded {
                envelope: migrated.envelope,
                source: Source::Remote,
            }
        }
        Err(e) => {
            debug!(resource = %resource, error = %e, "Remote unavailable, reading local cache");
            load_cached(cache, resource, migration)
        }
    }
}

fn load_cached(cache: &dyn LocalCache, resource: &Resource, migration: &dyn Migration) -> Loaded {
    let key = resource.cache_key();
    let cached = match cache.read(key) {
        Ok(cached) => cached,
        Err(e) => {
            warn!(key, error = %e, "Failed to read local cache");
            None
        }
    };

    let parsed = cached.and_then(|text| match serde_json::from_str::<Value>(&text) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(key, error = %e, "Removing malformed cache entry");
            if let Err(e) = cache.remove(key) {
                warn!(key, error = %e, "Failed to remove cache entry");
            }
            None
        }
    });

    let Some(value) = parsed else {
        return Loaded {
            envelope: upgrade(Envelope::empty(), migration).envelope,
            source: Source::Empty,
        };
    };

    let migrated = upgrade(Envelope::from_value(value), migration);
    if migrated.changed {
        write_cache(cache, resource, &migrated.envelope);
    }

    Loaded {
        envelope: migrated.envelope,
        source: Source::Cache,
    }
}

pub(crate) fn write_cache(cache: &dyn LocalCache, resource: &Resource, envelope: &Envelope) {
    let key = resource.cache_key();
    if let Err(e) = cache.write(key, &envelope.to_value().to_string()) {
        warn!(key, error = %e, "Failed to write local cache");
    }
}
