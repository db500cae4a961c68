//! One pool per runner shape, created on first use and kept for the life of the process.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::intrusive::PoolNode;
use crate::pool::Pool;

/// Population of one shape's pool, as seen by [`pool_sizes`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PoolReport {
    /// Type name of the pooled runner.
    pub shape: &'static str,
    /// Resident runners.
    pub size: usize,
    /// Cap on resident runners.
    pub capacity: usize,
}

/// A registered pool with its element type erased.
trait ErasedPool: Send + Sync {
    fn report(&self) -> PoolReport;
    fn set_capacity(&self, capacity: usize);
    fn as_any(&self) -> &dyn Any;
}

pub(crate) struct SharedPool<T: PoolNode> {
    shape: &'static str,
    pool: Mutex<Pool<T>>,
}

impl<T: PoolNode + Send + Sync + 'static> SharedPool<T> {
    pub(crate) fn try_acquire(&self) -> Option<Arc<T>> {
        self.pool.lock().try_acquire()
    }

    pub(crate) fn try_release(&self, node: Arc<T>) -> bool {
        let released = self.pool.lock().try_release(node);
        if !released {
            tracing::trace!(shape = self.shape, "pool full, dropping runner");
        }
        released
    }

    pub(crate) fn size(&self) -> usize {
        self.pool.lock().size()
    }

    /// Tops the pool up to `target` when it holds fewer than `threshold` nodes.
    pub(crate) fn prewarm(&self, threshold: usize, target: usize, make: impl Fn() -> Arc<T>) {
        let mut pool = self.pool.lock();
        if pool.size() >= threshold {
            return;
        }

        let before = pool.size();
        while pool.size() < target {
            if !pool.try_release(make()) {
                break;
            }
        }
        tracing::trace!(
            shape = self.shape,
            created = pool.size() - before,
            "prewarmed pool"
        );
    }
}

impl<T: PoolNode + Send + Sync + 'static> ErasedPool for SharedPool<T> {
    fn report(&self) -> PoolReport {
        let pool = self.pool.lock();
        PoolReport {
            shape: self.shape,
            size: pool.size(),
            capacity: pool.capacity(),
        }
    }

    fn set_capacity(&self, capacity: usize) {
        self.pool.lock().set_capacity(capacity);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

static POOLS: Lazy<RwLock<HashMap<TypeId, &'static dyn ErasedPool>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Returns the pool for `T`, creating it on first use.
pub(crate) fn pool<T: PoolNode + Send + Sync + 'static>(
    shape: &'static str,
) -> &'static SharedPool<T> {
    let id = TypeId::of::<T>();

    if let Some(&entry) = POOLS.read().get(&id) {
        return downcast(entry);
    }

    let mut pools = POOLS.write();
    let entry = *pools.entry(id).or_insert_with(|| {
        let capacity = Config::current().get_max_pool_size();
        tracing::trace!(shape, capacity, "registering pool");
        let leaked: &'static SharedPool<T> = Box::leak(Box::new(SharedPool {
            shape,
            pool: Mutex::new(Pool::new(capacity)),
        }));
        leaked as &'static dyn ErasedPool
    });
    downcast(entry)
}

fn downcast<T: PoolNode + Send + Sync + 'static>(
    entry: &'static dyn ErasedPool,
) -> &'static SharedPool<T> {
    match entry.as_any().downcast_ref::<SharedPool<T>>() {
        Some(pool) => pool,
        None => unreachable!("pool registered under a foreign type id"),
    }
}

/// Applies a new cap to every registered pool.
pub(crate) fn apply_capacity(capacity: usize) {
    for pool in POOLS.read().values() {
        pool.set_capacity(capacity);
    }
}

/// Reports the population of every registered pool.
///
/// Polling does not touch the pools beyond briefly locking each one.
pub fn pool_sizes() -> Vec<PoolReport> {
    let mut reports: Vec<PoolReport> = POOLS.read().values().map(|p| p.report()).collect();
    reports.sort_by(|a, b| a.shape.cmp(b.shape));
    reports
}

/// Reports the pool whose shape name contains `needle`, if exactly one does.
pub fn pool_size_of(needle: &str) -> Option<PoolReport> {
    let mut matching = pool_sizes().into_iter().filter(|r| r.shape.contains(needle));
    let first = matching.next()?;
    match matching.next() {
        Some(_) => None,
        None => Some(first),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intrusive::Link;
    use intrusive_collections::intrusive_adapter;

    struct Widget {
        link: Link,
    }

    intrusive_adapter!(WidgetAdapter = Arc<Widget>: Widget { link: Link });

    impl PoolNode for Widget {
        type Adapter = WidgetAdapter;

        fn link(&self) -> &Link {
            &self.link
        }
    }

    fn widget() -> Arc<Widget> {
        Arc::new(Widget { link: Link::new() })
    }

    #[test]
    fn same_type_same_pool() {
        let a = pool::<Widget>("registry::Widget");
        let b = pool::<Widget>("registry::Widget");
        assert!(std::ptr::eq(a, b));

        assert!(a.try_release(widget()));
        assert_eq!(b.size(), 1);
        assert!(b.try_acquire().is_some());

        let report = pool_size_of("registry::Widget").unwrap();
        assert_eq!(report.size, 0);
    }

    #[test]
    fn prewarm_fills_to_target() {
        struct Gadget {
            link: Link,
        }

        intrusive_adapter!(GadgetAdapter = Arc<Gadget>: Gadget { link: Link });

        impl PoolNode for Gadget {
            type Adapter = GadgetAdapter;

            fn link(&self) -> &Link {
                &self.link
            }
        }

        let p = pool::<Gadget>("registry::Gadget");
        let make = || Arc::new(Gadget { link: Link::new() });

        p.prewarm(2, 4, make);
        assert_eq!(p.size(), 4);

        p.try_acquire();
        p.try_acquire();
        p.try_acquire();
        p.prewarm(2, 4, make);
        assert_eq!(p.size(), 4);

        p.try_acquire();
        p.prewarm(2, 4, make);
        assert_eq!(p.size(), 3);
    }
}
