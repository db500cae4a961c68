use parking_lot::RwLock;

use crate::error::Error;
use crate::registry;

/// Process-wide pooling configuration.
///
/// Built like a task builder and applied with [`install`](Config::install):
///
/// ```
/// use pooled_task::Config;
///
/// Config::new()
///     .max_pool_size(1024)
///     .prewarm(8, 16)
///     .install()
///     .unwrap();
///
/// assert_eq!(Config::current().get_max_pool_size(), 1024);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    max_pool_size: usize,
    prewarm: Option<Prewarm>,
}

/// Refill policy for result-runner pools.
///
/// When a pool holds fewer than `threshold` runners on acquire it is refilled up to `target`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Prewarm {
    /// Refill below this many resident runners.
    pub threshold: usize,
    /// Refill up to this many resident runners.
    pub target: usize,
}

static CURRENT: RwLock<Config> = parking_lot::const_rwlock(Config::new());

impl Config {
    /// The defaults: unbounded pools, result-runner pools prewarmed from 16 up to 32.
    pub const fn new() -> Config {
        Config {
            max_pool_size: usize::MAX,
            prewarm: Some(Prewarm {
                threshold: 16,
                target: 32,
            }),
        }
    }

    /// The configuration in effect.
    pub fn current() -> Config {
        *CURRENT.read()
    }

    /// Caps every pool at `size` resident runners.
    pub fn max_pool_size(mut self, size: usize) -> Config {
        self.max_pool_size = size;
        self
    }

    /// Sets the refill policy for result-runner pools.
    pub fn prewarm(mut self, threshold: usize, target: usize) -> Config {
        self.prewarm = Some(Prewarm { threshold, target });
        self
    }

    /// Turns prewarming off.
    pub fn no_prewarm(mut self) -> Config {
        self.prewarm = None;
        self
    }

    /// Returns the pool cap.
    pub fn get_max_pool_size(&self) -> usize {
        self.max_pool_size
    }

    /// Returns the refill policy.
    pub fn get_prewarm(&self) -> Option<Prewarm> {
        self.prewarm
    }

    fn validate(&self) -> Result<(), Error> {
        if self.max_pool_size == 0 {
            return Err(Error::InvalidConfig("max_pool_size must be positive"));
        }
        if let Some(p) = self.prewarm {
            if p.target < p.threshold {
                return Err(Error::InvalidConfig(
                    "prewarm target must not be below its threshold",
                ));
            }
        }
        Ok(())
    }

    /// Makes this the process-wide configuration and applies the cap to existing pools.
    pub fn install(self) -> Result<(), Error> {
        self.validate()?;
        *CURRENT.write() = self;
        registry::apply_capacity(self.max_pool_size);
        tracing::debug!(config = ?self, "installed pool configuration");
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Config {
        Config::new()
    }
}

/// Caps every current and future pool at `size` resident runners.
pub fn set_max_pool_size(size: usize) -> Result<(), Error> {
    Config::current().max_pool_size(size).install()
}
