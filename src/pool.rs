use std::fmt;
use std::sync::Arc;

use intrusive_collections::SinglyLinkedList;

use crate::intrusive::PoolNode;

/// A bounded LIFO free list of reusable objects.
///
/// The list is intrusive: every node carries its own [`Link`](crate::Link), so pushing and
/// popping never allocate. The pool never constructs objects either. When [`try_acquire`]
/// reports nothing, the caller builds a fresh one.
///
/// `capacity` is a soft cap. Releasing into a full pool drops the object instead of storing
/// it, and lowering the capacity never evicts resident objects.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use pooled_task::{intrusive_adapter, Link, Pool, PoolNode};
///
/// struct Buffer {
///     link: Link,
///     id: u32,
/// }
///
/// intrusive_adapter!(BufferAdapter = Arc<Buffer>: Buffer { link: Link });
///
/// impl PoolNode for Buffer {
///     type Adapter = BufferAdapter;
///
///     fn link(&self) -> &Link {
///         &self.link
///     }
/// }
///
/// let mut pool = Pool::new(2);
/// assert!(pool.try_acquire().is_none());
///
/// assert!(pool.try_release(Arc::new(Buffer { link: Link::new(), id: 1 })));
/// assert_eq!(pool.try_acquire().map(|b| b.id), Some(1));
/// ```
///
/// [`try_acquire`]: Pool::try_acquire
pub struct Pool<T: PoolNode> {
    list: SinglyLinkedList<T::Adapter>,
    size: usize,
    capacity: usize,
}

impl<T: PoolNode> Pool<T> {
    /// Creates an empty pool holding at most `capacity` objects.
    pub fn new(capacity: usize) -> Pool<T> {
        Pool {
            list: SinglyLinkedList::new(T::Adapter::default()),
            size: 0,
            capacity,
        }
    }

    /// Pops the most recently released object, if any.
    pub fn try_acquire(&mut self) -> Option<Arc<T>> {
        let node = self.list.pop_front()?;
        self.size -= 1;
        Some(node)
    }

    /// Pushes an object back into the pool.
    ///
    /// Returns `false` if the pool is full or the object is already resident in a pool. The
    /// rejected object is simply dropped by the caller.
    pub fn try_release(&mut self, node: Arc<T>) -> bool {
        if self.size >= self.capacity || node.link().is_linked() {
            return false;
        }

        self.list.push_front(node);
        self.size += 1;
        true
    }

    /// Number of resident objects.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Returns `true` if no object is resident.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Maximum number of resident objects.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the cap. Objects already resident stay.
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
    }
}

impl<T: PoolNode> fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .finish()
    }
}
