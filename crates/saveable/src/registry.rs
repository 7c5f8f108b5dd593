//! Provider registration, save and restore

use framestate_core::{Error, Result, Value};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Saved values by key. A key holds one value per provider registered under
/// it at save time.
pub type SavedState = HashMap<String, Vec<Value>>;

/// Predicate deciding whether a value may be saved
pub type CanBeSaved = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Produces the value to save, `None` for nothing, or an error that fails
/// the whole save
pub type ValueProvider = Arc<dyn Fn() -> Result<Option<Value>> + Send + Sync>;

struct Inner {
    can_be_saved: CanBeSaved,
    restored: Mutex<FxHashMap<String, Vec<Value>>>,
    providers: Mutex<FxHashMap<String, Vec<(u64, ValueProvider)>>>,
    next_provider: AtomicU64,
}

/// Registry of value providers keyed by stable identity
///
/// Cloning the registry clones a handle.
#[derive(Clone)]
pub struct SaveableStateRegistry {
    inner: Arc<Inner>,
}

impl SaveableStateRegistry {
    /// Create a registry
    ///
    /// `restored` is the map a previous [`perform_save`](Self::perform_save)
    /// produced, if any. `can_be_saved` defaults to [`Value::is_saveable`].
    pub fn new(restored: Option<SavedState>, can_be_saved: Option<CanBeSaved>) -> Self {
        let restored = restored
            .unwrap_or_default()
            .into_iter()
            .filter(|(_, values)| !values.is_empty())
            .collect();
        Self {
            inner: Arc::new(Inner {
                can_be_saved: can_be_saved.unwrap_or_else(|| Arc::new(Value::is_saveable) as CanBeSaved),
                restored: Mutex::new(restored),
                providers: Mutex::new(FxHashMap::default()),
                next_provider: AtomicU64::new(0),
            }),
        }
    }

    /// True if `value` may be saved
    pub fn can_be_saved(&self, value: &Value) -> bool {
        (self.inner.can_be_saved)(value)
    }

    /// Take the next restored value for `key`
    ///
    /// Values registered under the same key are handed out in the order they
    /// were saved; each is returned once.
    pub fn consume_restored(&self, key: &str) -> Option<Value> {
        let mut restored = self.inner.restored.lock();
        let values = restored.get_mut(key)?;
        let value = values.remove(0);
        if values.is_empty() {
            restored.remove(key);
        }
        Some(value)
    }

    /// Put back a value taken with [`consume_restored`](Self::consume_restored)
    ///
    /// The value goes to the front, so the next consumer of `key` gets it.
    pub fn return_restored(&self, key: &str, value: Value) {
        self.inner
            .restored
            .lock()
            .entry(key.to_string())
            .or_default()
            .insert(0, value);
        tracing::debug!(key = %key, "restored value returned");
    }

    /// Register a provider under `key`
    ///
    /// Several providers may share a key. Fails with [`Error::InvalidKey`]
    /// if the key is blank.
    pub fn register_provider(
        &self,
        key: impl Into<String>,
        provider: impl Fn() -> Option<Value> + Send + Sync + 'static,
    ) -> Result<RegistrationHandle> {
        self.register_fallible_provider(key, move || Ok(provider()))
    }

    /// Register a provider that can fail
    ///
    /// An error from the provider fails [`perform_save`](Self::perform_save)
    /// instead of dropping the key from the save.
    pub fn register_fallible_provider(
        &self,
        key: impl Into<String>,
        provider: impl Fn() -> Result<Option<Value>> + Send + Sync + 'static,
    ) -> Result<RegistrationHandle> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(Error::InvalidKey(format!("{key:?} is blank")));
        }
        let id = self.inner.next_provider.fetch_add(1, Ordering::Relaxed);
        let provider: ValueProvider = Arc::new(provider);
        self.inner
            .providers
            .lock()
            .entry(key.clone())
            .or_default()
            .push((id, provider));
        tracing::debug!(key = %key, provider = id, "save provider registered");
        Ok(RegistrationHandle {
            registry: Arc::clone(&self.inner),
            key,
            id,
        })
    }

    /// Collect the values of every registered provider
    ///
    /// The result also carries restored values nobody consumed, so a save
    /// taken before every component came back loses nothing. A key with one
    /// provider that returns `None` is left out; with several providers each
    /// `None` is kept as [`Value::Null`] to preserve positions.
    ///
    /// Fails with [`Error::CannotBeSaved`] on the first value the save
    /// predicate rejects, or with the first error a provider returns.
    pub fn perform_save(&self) -> Result<SavedState> {
        let mut saved: SavedState = self
            .inner
            .restored
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let providers: Vec<(String, Vec<ValueProvider>)> = self
            .inner
            .providers
            .lock()
            .iter()
            .map(|(key, list)| (key.clone(), list.iter().map(|(_, p)| Arc::clone(p)).collect()))
            .collect();

        for (key, list) in providers {
            if let [provider] = list.as_slice() {
                if let Some(value) = provider()? {
                    self.check(&key, &value)?;
                    saved.insert(key, vec![value]);
                }
                continue;
            }
            let mut values = Vec::with_capacity(list.len());
            for provider in &list {
                let value = provider()?.unwrap_or(Value::Null);
                self.check(&key, &value)?;
                values.push(value);
            }
            saved.insert(key, values);
        }

        tracing::debug!(keys = saved.len(), "state saved");
        Ok(saved)
    }

    fn check(&self, key: &str, value: &Value) -> Result<()> {
        if self.can_be_saved(value) {
            return Ok(());
        }
        Err(Error::CannotBeSaved {
            key: key.to_string(),
            type_name: value.type_name().to_string(),
        })
    }
}

impl Default for SaveableStateRegistry {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl std::fmt::Debug for SaveableStateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveableStateRegistry")
            .field("providers", &self.inner.providers.lock().len())
            .field("restored", &self.inner.restored.lock().len())
            .finish()
    }
}

/// Registration of a value provider
///
/// The provider stays registered until [`unregister`](Self::unregister) is
/// called; dropping the handle leaves it in place. Clones refer to the same
/// registration, and unregistering it a second time does nothing.
#[must_use = "keep the handle to unregister the provider later"]
#[derive(Clone)]
pub struct RegistrationHandle {
    registry: Arc<Inner>,
    key: String,
    id: u64,
}

impl RegistrationHandle {
    /// Key the provider was registered under
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Remove the provider. The key may be registered again afterwards.
    pub fn unregister(self) {
        let mut providers = self.registry.providers.lock();
        if let Some(list) = providers.get_mut(&self.key) {
            list.retain(|(id, _)| *id != self.id);
            if list.is_empty() {
                providers.remove(&self.key);
            }
        }
        tracing::debug!(key = %self.key, provider = self.id, "save provider unregistered");
    }
}

impl std::fmt::Debug for RegistrationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
