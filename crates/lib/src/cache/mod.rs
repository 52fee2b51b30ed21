//! The cache context.
//!
//! [`Cache`] ties the entity store, the type policies, the reactive variables and the watches
//! together. It is a cheap-to-clone handle; clones share one cache. Every call runs to
//! completion before returning, and the notifications it causes are delivered before it returns
//! unless a [`batch`](Cache::batch) is open or a notification round is already in progress, in
//! which case they join that round.
//!
//! Field policies run while the store is locked and must not call back into the cache.
//! Watch callbacks and variable observers run with no lock held and may.

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Arc, Mutex, RwLock, Weak},
};

use handle_trait::Handle;
use serde_json::Value;

use crate::{
    CacheConfig, Result,
    locks::{lock, read, write},
    policy::{Dependencies, FieldResolver, TypePolicies},
    query::{self, QueryResultReader, QueryResultWriter, QueryShape, ReadOutcome, SelectionSet},
    reactive::{
        Delivery, Dispatcher, ReactiveVar, SubscriberId, VarListener, VarRegistry, VarValue,
    },
    store::{EntityKey, EntityRecord, EntityStore, FieldKey, Fields, StoreError, StoreValue},
};

pub mod evict;
pub mod watch;

pub use evict::{EvictOptions, EvictTarget};
pub use watch::WatchId;

use watch::{Watch, WatchCallback, Watches};

/// Shared state behind a [`Cache`] handle.
pub(crate) struct CacheInner {
    config: CacheConfig,
    policies: Arc<TypePolicies>,
    store: RwLock<EntityStore>,
    vars: VarRegistry,
    watches: Mutex<Watches>,
    /// Extra gc roots with their retain counts
    retained: Mutex<BTreeMap<EntityKey, usize>>,
}

impl std::fmt::Debug for CacheInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInner")
            .field("config", &self.config)
            .field("records", &read(&self.store).len())
            .field("vars", &self.vars)
            .field("watches", &format!("<{} watches>", lock(&self.watches).len()))
            .field("retained", &lock(&self.retained).len())
            .finish()
    }
}

/// Normalized entity cache.
///
/// ```
/// use normcache::{
///     Cache, CacheConfig, FieldSelection, ReadOutcome, SelectionSet,
///     policy::{TypePolicies, TypePolicy},
/// };
/// use serde_json::json;
///
/// let policies = TypePolicies::new().add_type("Country", TypePolicy::new().key_fields(["code"]));
/// let cache = Cache::new(CacheConfig::default(), policies);
///
/// let shape = SelectionSet::new().field(
///     FieldSelection::new("countries").select(SelectionSet::new().scalars(["code", "name"])),
/// );
/// let result = json!({"countries": [{"__typename": "Country", "code": "FR", "name": "France"}]});
/// cache.write_query(&shape, &json!({}), &result)?;
///
/// assert_eq!(
///     cache.read_query(&shape, &json!({}))?,
///     ReadOutcome::Complete(json!({"countries": [{"code": "FR", "name": "France"}]}))
/// );
/// # Ok::<(), normcache::Error>(())
/// ```
#[derive(Clone, Debug, Handle)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

impl Cache {
    /// Creates an empty cache. Policies are fixed for the lifetime of the cache.
    pub fn new(config: CacheConfig, policies: TypePolicies) -> Self {
        let policies = Arc::new(policies);
        let store = EntityStore::new(policies.clone(), config.root_typename.clone());
        tracing::debug!(root_typename = %config.root_typename, "Creating cache");
        Self {
            inner: Arc::new(CacheInner {
                config,
                policies,
                store: RwLock::new(store),
                vars: VarRegistry::new(Arc::new(Dispatcher::new())),
                watches: Mutex::new(Watches::default()),
                retained: Mutex::new(BTreeMap::new()),
            }),
        }
    }

    /// Creates an empty cache with the default configuration.
    pub fn with_policies(policies: TypePolicies) -> Self {
        Self::new(CacheConfig::default(), policies)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    pub fn policies(&self) -> &TypePolicies {
        &self.inner.policies
    }

    // === Reactive variables ===

    /// Create a named reactive variable. Watches reading it go stale on every `set`.
    pub fn make_var<T: VarValue>(
        &self,
        name: impl Into<String>,
        initial: T,
    ) -> Result<ReactiveVar<T>> {
        let inner: Weak<CacheInner> = Arc::downgrade(&self.inner);
        let listener: Weak<dyn VarListener> = inner;
        Ok(self.inner.vars.create(name, initial, Some(listener))?)
    }

    /// Typed handle to an existing variable.
    pub fn var<T: VarValue>(&self, name: &str) -> Result<ReactiveVar<T>> {
        Ok(self.inner.vars.get(name)?)
    }

    pub fn vars(&self) -> &VarRegistry {
        &self.inner.vars
    }

    // === Writes ===

    /// Normalize a query result into the store.
    ///
    /// Top-level fields of `result` are stored on ROOT under their name and the arguments the
    /// shape gives them, resolved against `variables`. The write is atomic.
    pub fn write_query(
        &self,
        shape: &QueryShape,
        variables: &Value,
        result: &Value,
    ) -> Result<()> {
        let changed = {
            let mut store = write(&self.inner.store);
            query::write_result(&mut store, &self.inner.config, shape, variables, result)?
        };
        tracing::debug!(changed = changed.len(), "Wrote query result");
        self.inner.notify_changed(&changed);
        Ok(())
    }

    /// Write a single entity payload, storing every field it carries.
    ///
    /// Fails with `NoIdentityPolicy` for types stored inline, since nothing would hold them.
    pub fn write_entity(&self, typename: &str, object: &Value) -> Result<EntityKey> {
        let is_root = typename == self.inner.config.root_typename;
        if !is_root && !self.inner.policies.has_identity(typename) {
            return Err(StoreError::NoIdentityPolicy {
                typename: typename.to_string(),
            }
            .into());
        }

        let (key, changed) = {
            let mut store = write(&self.inner.store);
            let (value, changes) =
                QueryResultWriter::new(&store, &self.inner.config, &Value::Null)
                    .write_entity(typename, object)?;
            let key = value
                .as_ref_key()
                .cloned()
                .ok_or_else(|| StoreError::NoIdentityPolicy {
                    typename: typename.to_string(),
                })?;
            (key, store.apply(changes))
        };
        tracing::debug!(key = %key, changed = changed.len(), "Wrote entity");
        self.inner.notify_changed(&changed);
        Ok(key)
    }

    // === Reads ===

    /// Rebuild the result tree of `shape` from the store.
    pub fn read_query(&self, shape: &QueryShape, variables: &Value) -> Result<ReadOutcome> {
        let store = read(&self.inner.store);
        let (outcome, _) =
            query::read_result(&store, &self.inner.vars, &self.inner.config, shape, variables)?;
        Ok(outcome)
    }

    /// Read `selection` from the record at `key`, as a fragment of that entity.
    pub fn read_entity(
        &self,
        key: &EntityKey,
        selection: &SelectionSet,
        variables: &Value,
    ) -> Result<ReadOutcome> {
        let (outcome, _) = self.inner.read_from(key, selection, variables)?;
        Ok(outcome)
    }

    /// Resolve one field of a record, applying its read policy. `None` is Missing.
    pub fn read_field(
        &self,
        key: &EntityKey,
        name: &str,
        args: Option<&Value>,
    ) -> Result<Option<StoreValue>> {
        let store = read(&self.inner.store);
        let resolver = FieldResolver::new(&store, &self.inner.vars);
        let field = match args {
            Some(args) => FieldKey::with_args(name, args),
            None => FieldKey::new(name),
        };
        let owner = resolver.owner_for(key);
        resolver.resolve(owner, &field, args)
    }

    /// A copy of a stored record.
    pub fn record(&self, key: &EntityKey) -> Option<EntityRecord> {
        read(&self.inner.store).get(key).cloned()
    }

    /// Key a payload object would be stored under, without writing it.
    ///
    /// Only the type discriminator and the key fields are looked at. `None` for objects without
    /// a type discriminator and for types stored inline.
    pub fn identify(&self, object: &Value) -> Result<Option<EntityKey>> {
        let Some(typename) = object
            .get(&self.inner.config.typename_field)
            .and_then(Value::as_str)
        else {
            return Ok(None);
        };
        let mut fields = Fields::new();
        for name in self.inner.policies.key_fields(typename).unwrap_or_default() {
            match object.get(name.as_str()) {
                None => {}
                Some(value @ (Value::Array(_) | Value::Object(_))) => {
                    return Err(StoreError::InvalidIdentity {
                        typename: typename.to_string(),
                        field: name.clone(),
                        reason: format!(
                            "identity fields must be scalars, found {}",
                            query::writer::json_type(value)
                        ),
                    }
                    .into());
                }
                Some(value) => {
                    fields.insert(FieldKey::new(name.as_str()), StoreValue::Json(value.clone()));
                }
            }
        }
        read(&self.inner.store).identify(typename, &fields)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        read(&self.inner.store).contains(key)
    }

    /// Number of stored records, ROOT included once written.
    pub fn len(&self) -> usize {
        read(&self.inner.store).len()
    }

    pub fn is_empty(&self) -> bool {
        read(&self.inner.store).is_empty()
    }

    /// Diagnostic JSON snapshot of every record.
    pub fn extract(&self) -> Value {
        read(&self.inner.store).to_json()
    }

    // === Eviction and gc ===

    /// Remove `target`, returning how many records or fields were removed.
    ///
    /// The removal happens regardless of `options`; `broadcast` only decides whether watches
    /// depending on the changed record are notified.
    pub fn evict(&self, target: impl Into<EvictTarget>, options: EvictOptions) -> usize {
        let target = target.into();
        let removed = target.apply(&mut write(&self.inner.store));
        let broadcast = options
            .broadcast
            .unwrap_or(self.inner.config.broadcast_by_default);
        tracing::debug!(evicted = ?target, removed, broadcast, "Evicted");

        if removed > 0 && broadcast {
            self.inner.notify_changed(&BTreeSet::from([target.owner().clone()]));
        }
        removed
    }

    /// Remove every record not reachable from ROOT or a retained key.
    ///
    /// Returns the number of records removed. Running it twice in a row removes nothing the
    /// second time. Watches are not notified.
    pub fn gc(&self) -> usize {
        let roots: Vec<EntityKey> = std::iter::once(EntityKey::Root)
            .chain(lock(&self.inner.retained).keys().cloned())
            .collect();
        let mut store = write(&self.inner.store);
        let live = evict::reachable(&store, roots);
        let removed = store.remove_unless(|key| live.contains(key));
        tracing::debug!(removed = removed.len(), live = live.len(), "Garbage collected");
        removed.len()
    }

    /// Keep `key` and everything it references alive through [`gc`](Self::gc).
    ///
    /// Retains are counted; returns the new count.
    pub fn retain(&self, key: &EntityKey) -> usize {
        let mut retained = lock(&self.inner.retained);
        let count = retained.entry(key.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// Undo one [`retain`](Self::retain). Returns false if `key` was not retained.
    pub fn release(&self, key: &EntityKey) -> bool {
        let mut retained = lock(&self.inner.retained);
        match retained.get_mut(key) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                retained.remove(key);
                true
            }
            None => false,
        }
    }

    // === Watches ===

    /// Register a read that is re-delivered to `callback` when its inputs change.
    ///
    /// The current outcome is computed immediately but not delivered.
    pub fn watch(
        &self,
        shape: QueryShape,
        variables: Value,
        callback: impl Fn(&ReadOutcome) + Send + Sync + 'static,
    ) -> Result<WatchId> {
        self.inner
            .register_watch(EntityKey::Root, shape, variables, Arc::new(callback))
    }

    /// Like [`watch`](Self::watch), with `selection` read from the record at `key`.
    ///
    /// The entity need not exist yet; its fields read as missing until it is written.
    pub fn watch_entity(
        &self,
        key: EntityKey,
        selection: SelectionSet,
        variables: Value,
        callback: impl Fn(&ReadOutcome) + Send + Sync + 'static,
    ) -> Result<WatchId> {
        self.inner
            .register_watch(key, selection, variables, Arc::new(callback))
    }

    /// Remove a watch. Deliveries already queued for it are skipped.
    pub fn unwatch(&self, id: WatchId) -> bool {
        lock(&self.inner.watches).remove(id)
    }

    /// Run `f`, delivering each affected watch and observer once at the end.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.vars.dispatcher().batch(f)
    }
}

impl CacheInner {
    fn dispatcher(&self) -> &Arc<Dispatcher> {
        self.vars.dispatcher()
    }

    fn read_from(
        &self,
        root: &EntityKey,
        selection: &SelectionSet,
        variables: &Value,
    ) -> Result<(ReadOutcome, Dependencies)> {
        let store = read(&self.store);
        QueryResultReader::new(&store, &self.vars, &self.config, variables)
            .read_from(root, selection)
    }

    fn register_watch(
        &self,
        root: EntityKey,
        shape: QueryShape,
        variables: Value,
        callback: WatchCallback,
    ) -> Result<WatchId> {
        let (last, deps) = self.read_from(&root, &shape, &variables)?;
        let id = WatchId(self.dispatcher().next_subscriber_id());
        tracing::debug!(watch = %id, root = %root, "Registered watch");
        lock(&self.watches).insert(
            id,
            Watch {
                root: Arc::new(root),
                shape: Arc::new(shape),
                variables: Arc::new(variables),
                callback,
                last,
                deps,
                forced: false,
            },
        );
        Ok(id)
    }

    /// Queue every watch reading one of `changed`, then deliver.
    fn notify_changed(self: &Arc<Self>, changed: &BTreeSet<EntityKey>) {
        if changed.is_empty() {
            return;
        }
        let affected = lock(&self.watches).touching(changed);
        for id in affected {
            self.dispatcher().enqueue(
                id.subscriber(),
                watch_delivery(Arc::downgrade(self), id, false),
            );
        }
        self.dispatcher().flush();
    }

    /// Re-read a watch and call it back if warranted.
    ///
    /// A `forced` delivery calls back even when the outcome is unchanged.
    fn deliver(&self, id: WatchId, forced: bool) {
        let Some((root, shape, variables)) = lock(&self.watches).get_mut(id).map(|watch| {
            (
                watch.root.clone(),
                watch.shape.clone(),
                watch.variables.clone(),
            )
        }) else {
            return;
        };

        let (outcome, deps) = match self.read_from(&root, &shape, &variables) {
            Ok(read) => read,
            Err(err) => {
                tracing::warn!(watch = %id, error = %err, "Watch read failed");
                return;
            }
        };

        let callback = {
            let mut watches = lock(&self.watches);
            let Some(watch) = watches.get_mut(id) else {
                return;
            };
            let forced = std::mem::take(&mut watch.forced) || forced;
            watch.deps = deps;
            if !forced && watch.last == outcome {
                tracing::trace!(watch = %id, "Watch outcome unchanged");
                return;
            }
            watch.last = outcome.clone();
            watch.callback.clone()
        };
        tracing::trace!(watch = %id, complete = outcome.is_complete(), "Delivering watch");
        callback(&outcome);
    }
}

impl VarListener for CacheInner {
    fn var_changed(self: Arc<Self>, name: &str) -> Vec<(SubscriberId, Delivery)> {
        let affected = lock(&self.watches).force_readers_of(name);
        // The variable's own set() queues these and flushes.
        affected
            .into_iter()
            .map(|id| {
                (
                    id.subscriber(),
                    watch_delivery(Arc::downgrade(&self), id, true),
                )
            })
            .collect()
    }
}

fn watch_delivery(cache: Weak<CacheInner>, id: WatchId, forced: bool) -> Delivery {
    Arc::new(move || {
        if let Some(cache) = cache.upgrade() {
            cache.deliver(id, forced);
        }
    })
}
