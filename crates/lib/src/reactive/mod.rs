//! Reactive variables.
//!
//! A [`ReactiveVar`] is a named cell holding the latest value of `T` plus a version counter that
//! increases on every [`set`](ReactiveVar::set). Any number of observers may subscribe. A `set`
//! notifies them synchronously, in registration order, before it returns. The one exception is
//! a `set` made while notifications are already being delivered, which is queued behind the
//! current round (see [`dispatch`]).
//!
//! Variables created through a [`Cache`](crate::Cache) also invalidate every watch whose read
//! depended on them. Variables are never removed; overwrite them to reset.
//!
//! ```
//! use std::sync::{Arc, Mutex};
//! use normcache::ReactiveVar;
//!
//! let code = ReactiveVar::new("code", String::new());
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! code.subscribe(move |value: &String| sink.lock().unwrap().push(value.clone()));
//!
//! code.set("US".to_string());
//! assert_eq!(code.get(), "US");
//! assert_eq!(code.version(), 1);
//! assert_eq!(*seen.lock().unwrap(), vec!["US".to_string()]);
//! ```

use std::{
    any::Any,
    collections::BTreeMap,
    fmt,
    sync::{
        Arc, RwLock, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use serde::Serialize;
use serde_json::Value;

use crate::locks::{read, write};

pub mod dispatch;
pub mod errors;

pub use dispatch::{Delivery, Dispatcher, SubscriberId};
pub use errors::VarError;

/// Values a reactive variable can hold.
///
/// `Serialize` lets field policies read a variable by name as JSON.
pub trait VarValue: Clone + Serialize + Send + Sync + 'static {}

impl<T> VarValue for T where T: Clone + Serialize + Send + Sync + 'static {}

/// Receives the name of a variable whenever its version increases.
///
/// The returned deliveries are queued together with the variable's own observers, all in
/// subscriber order.
pub trait VarListener: Send + Sync {
    fn var_changed(self: Arc<Self>, name: &str) -> Vec<(SubscriberId, Delivery)>;
}

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct VarCell<T> {
    name: String,
    value: RwLock<T>,
    version: AtomicU64,
    observers: RwLock<Vec<(SubscriberId, Observer<T>)>>,
    dispatcher: Arc<Dispatcher>,
    listener: Option<Weak<dyn VarListener>>,
}

/// Handle to a named reactive cell. Clones share the same cell.
pub struct ReactiveVar<T> {
    cell: Arc<VarCell<T>>,
}

impl<T> Clone for ReactiveVar<T> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<T> fmt::Debug for ReactiveVar<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveVar")
            .field("name", &self.cell.name)
            .field("version", &self.cell.version.load(Ordering::Acquire))
            .field("type", &std::any::type_name::<T>())
            .finish()
    }
}

impl<T: VarValue> ReactiveVar<T> {
    /// A standalone variable with its own dispatcher, not attached to any cache.
    pub fn new(name: impl Into<String>, initial: T) -> Self {
        Self::with_parts(name.into(), initial, Arc::new(Dispatcher::new()), None)
    }

    fn with_parts(
        name: String,
        initial: T,
        dispatcher: Arc<Dispatcher>,
        listener: Option<Weak<dyn VarListener>>,
    ) -> Self {
        Self {
            cell: Arc::new(VarCell {
                name,
                value: RwLock::new(initial),
                version: AtomicU64::new(0),
                observers: RwLock::new(Vec::new()),
                dispatcher,
                listener,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// A copy of the current value.
    pub fn get(&self) -> T {
        read(&self.cell.value).clone()
    }

    /// Borrow the current value without copying it.
    ///
    /// `f` must not call [`set`](Self::set) on this variable.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&read(&self.cell.value))
    }

    /// Number of times the variable has been set.
    pub fn version(&self) -> u64 {
        self.cell.version.load(Ordering::Acquire)
    }

    /// Store a new value, bump the version and notify observers and dependent watches.
    ///
    /// Observers and watches are queued in the order they were registered. Setting an equal
    /// value still notifies.
    pub fn set(&self, value: T) {
        *write(&self.cell.value) = value;
        let version = self.cell.version.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::debug!(var = %self.cell.name, version, "Reactive variable set");

        let mut deliveries: Vec<(SubscriberId, Delivery)> = read(&self.cell.observers)
            .iter()
            .map(|(id, _)| (*id, observer_delivery(Arc::downgrade(&self.cell), *id)))
            .collect();
        if let Some(listener) = self.cell.listener.as_ref().and_then(Weak::upgrade) {
            deliveries.extend(listener.var_changed(&self.cell.name));
        }
        deliveries.sort_by_key(|(id, _)| *id);
        for (id, delivery) in deliveries {
            self.cell.dispatcher.enqueue(id, delivery);
        }
        self.cell.dispatcher.flush();
    }

    /// Replace the value with one computed from the current value.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = self.with(f);
        self.set(next);
    }

    /// Register an observer called with the latest value after every `set`.
    pub fn subscribe(&self, observer: impl Fn(&T) + Send + Sync + 'static) -> SubscriberId {
        let id = self.cell.dispatcher.next_subscriber_id();
        write(&self.cell.observers).push((id, Arc::new(observer)));
        id
    }

    /// Remove an observer. Deliveries already queued for it are skipped.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut observers = write(&self.cell.observers);
        let before = observers.len();
        observers.retain(|(observer_id, _)| *observer_id != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        read(&self.cell.observers).len()
    }

    /// Apply several changes with one notification per observer at the end.
    ///
    /// Covers every variable sharing this variable's dispatcher, which for cache variables means
    /// every variable and watch of the cache.
    pub fn batch<R>(&self, f: impl FnOnce() -> R) -> R {
        self.cell.dispatcher.batch(f)
    }
}

fn observer_delivery<T: VarValue>(cell: Weak<VarCell<T>>, id: SubscriberId) -> Delivery {
    Arc::new(move || {
        let Some(cell) = cell.upgrade() else {
            return;
        };
        let observer = read(&cell.observers)
            .iter()
            .find(|(observer_id, _)| *observer_id == id)
            .map(|(_, observer)| observer.clone());
        if let Some(observer) = observer {
            // Copy out so the observer may set this variable again.
            let value = read(&cell.value).clone();
            observer(&value);
        }
    })
}

/// Type-erased view of a variable used for lookups by name.
trait ErasedVar: Send + Sync {
    fn version(&self) -> u64;
    fn snapshot(&self) -> Result<Value, VarError>;
    fn value_type(&self) -> &'static str;
}

impl<T: VarValue> ErasedVar for VarCell<T> {
    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    fn snapshot(&self) -> Result<Value, VarError> {
        serde_json::to_value(&*read(&self.value)).map_err(|e| VarError::SerializationFailed {
            name: self.name.clone(),
            reason: e.to_string(),
        })
    }

    fn value_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

struct VarEntry {
    erased: Arc<dyn ErasedVar>,
    any: Arc<dyn Any + Send + Sync>,
}

/// Named variables of one cache, sharing one dispatcher.
pub struct VarRegistry {
    dispatcher: Arc<Dispatcher>,
    vars: RwLock<BTreeMap<String, VarEntry>>,
}

impl fmt::Debug for VarRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VarRegistry")
            .field("vars", &self.names())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl VarRegistry {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            vars: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Create a variable. Names are unique within a registry.
    pub fn create<T: VarValue>(
        &self,
        name: impl Into<String>,
        initial: T,
        listener: Option<Weak<dyn VarListener>>,
    ) -> Result<ReactiveVar<T>, VarError> {
        let name = name.into();
        let mut vars = write(&self.vars);
        if vars.contains_key(&name) {
            return Err(VarError::AlreadyExists { name });
        }

        let var = ReactiveVar::with_parts(name.clone(), initial, self.dispatcher.clone(), listener);
        let erased: Arc<dyn ErasedVar> = var.cell.clone();
        let any: Arc<dyn Any + Send + Sync> = var.cell.clone();
        vars.insert(name.clone(), VarEntry { erased, any });
        tracing::debug!(var = %name, value_type = std::any::type_name::<T>(), "Created reactive variable");
        Ok(var)
    }

    /// Typed handle to an existing variable.
    pub fn get<T: VarValue>(&self, name: &str) -> Result<ReactiveVar<T>, VarError> {
        let vars = read(&self.vars);
        let entry = vars.get(name).ok_or_else(|| VarError::NotFound {
            name: name.to_string(),
        })?;
        let cell = entry
            .any
            .clone()
            .downcast::<VarCell<T>>()
            .map_err(|_| VarError::TypeMismatch {
                name: name.to_string(),
                expected: std::any::type_name::<T>().to_string(),
                actual: entry.erased.value_type().to_string(),
            })?;
        Ok(ReactiveVar { cell })
    }

    /// Current value of a variable as JSON.
    pub fn snapshot(&self, name: &str) -> Result<Value, VarError> {
        read(&self.vars)
            .get(name)
            .ok_or_else(|| VarError::NotFound {
                name: name.to_string(),
            })?
            .erased
            .snapshot()
    }

    pub fn version(&self, name: &str) -> Option<u64> {
        read(&self.vars).get(name).map(|entry| entry.erased.version())
    }

    pub fn contains(&self, name: &str) -> bool {
        read(&self.vars).contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        read(&self.vars).keys().cloned().collect()
    }
}
