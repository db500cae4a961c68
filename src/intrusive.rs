use std::sync::Arc;

use intrusive_collections::singly_linked_list::{AtomicLink, AtomicLinkOps};
use intrusive_collections::{Adapter, DefaultPointerOps};

/// The free-list link embedded in every poolable object.
///
/// The link is only meaningful while the object is resident in a [`Pool`]. It records
/// residency, so an object can never be pushed into two pools, or twice into the same pool.
///
/// [`Pool`]: crate::Pool
pub type Link = AtomicLink;

/// An object that can live in a [`Pool`](crate::Pool).
///
/// The adapter ties `Arc<Self>` to the embedded [`Link`] and is usually generated with
/// [`intrusive_adapter!`](crate::intrusive_adapter):
///
/// ```
/// use std::sync::Arc;
/// use pooled_task::{intrusive_adapter, Link, PoolNode};
///
/// struct Buffer {
///     link: Link,
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
/// ```
pub trait PoolNode: Sized {
    /// Adapter between `Arc<Self>` and its link.
    type Adapter: Adapter<LinkOps = AtomicLinkOps, PointerOps = DefaultPointerOps<Arc<Self>>>
        + Default
        + Send
        + Sync;

    /// Returns the link embedded in this object.
    fn link(&self) -> &Link;
}
