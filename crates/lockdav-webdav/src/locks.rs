//! Process-wide hierarchical write locks.
//!
//! The table maps a resource path to the locks held directly on it. An
//! `infinite`-depth lock also covers every descendant when [`LockManager::locked`]
//! walks up from a path; a `zero`-depth lock covers only its own path.
//!
//! Expiry is lazy: whenever an operation touches a table entry, locks whose
//! deadline has passed are dropped first. Nothing sweeps in the background,
//! so an expired lock nobody asks about stays in memory until its path is
//! looked up again.
//!
//! Every public operation holds the table mutex for its whole
//! check-then-act sequence, so two concurrent LOCK requests can never both
//! observe an unlocked resource.

use lockdav_vfs::path;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use uuid::Uuid;

/// Whether other locks may coexist on the same resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockScope {
    Exclusive,
    Shared,
}

impl LockScope {
    pub fn as_str(self) -> &'static str {
        match self {
            LockScope::Exclusive => "exclusive",
            LockScope::Shared => "shared",
        }
    }
}

/// How far down the namespace a lock reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockDepth {
    Zero,
    Infinite,
}

impl LockDepth {
    /// Whether a lock held `distance` levels above a path covers that path.
    pub fn covers(self, distance: usize) -> bool {
        match self {
            LockDepth::Infinite => true,
            LockDepth::Zero => distance == 0,
        }
    }

    /// Value of the `D:depth` element.
    pub fn as_str(self) -> &'static str {
        match self {
            LockDepth::Zero => "0",
            LockDepth::Infinite => "infinity",
        }
    }
}

/// Requested lifetime of a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockTimeout {
    Infinite,
    Seconds(u64),
}

/// Client-supplied lock owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Owner {
    Href(String),
    Text(String),
}

/// A single lock. Values handed out by [`LockManager`] are snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lock {
    pub resource: String,
    pub scope: LockScope,
    pub depth: LockDepth,
    pub owner: Option<Owner>,
    /// Bare UUID; clients see it as `opaquelocktoken:<token>`.
    pub token: String,
    /// Applied lifetime, `None` for infinite.
    pub timeout: Option<Duration>,
    /// Absolute expiry, `None` for infinite.
    pub deadline: Option<Instant>,
    /// Identity of the requester.
    pub uid: Option<String>,
}

impl Lock {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Token as it appears on the wire.
    pub fn wire_token(&self) -> String {
        format!("opaquelocktoken:{}", self.token)
    }
}

/// Parameters of a LOCK request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRequest {
    pub scope: LockScope,
    pub depth: LockDepth,
    pub owner: Option<Owner>,
    /// `None` applies the configured default.
    pub timeout: Option<LockTimeout>,
    pub uid: Option<String>,
}

impl LockRequest {
    pub fn new(scope: LockScope, depth: LockDepth) -> Self {
        Self {
            scope,
            depth,
            owner: None,
            timeout: None,
            uid: None,
        }
    }
}

/// Lock manager settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockConfig {
    /// Lifetime applied when a request names none. `None` means infinite.
    pub default_timeout: Option<Duration>,
}

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// The monotonic system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        *self.offset.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

type LockTable = HashMap<String, Vec<Lock>>;

/// The lock table.
#[derive(Debug)]
pub struct LockManager {
    table: Mutex<LockTable>,
    config: LockConfig,
    clock: Box<dyn Clock>,
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new(LockConfig::default())
    }
}

impl LockManager {
    pub fn new(config: LockConfig) -> Self {
        Self::with_clock(config, Box::new(SystemClock))
    }

    pub fn with_clock(config: LockConfig, clock: Box<dyn Clock>) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            config,
            clock,
        }
    }

    pub fn now(&self) -> Instant {
        self.clock.now()
    }

    /// Time left before `lock` expires, `None` for infinite locks.
    pub fn remaining(&self, lock: &Lock) -> Option<Duration> {
        lock.deadline
            .map(|deadline| deadline.saturating_duration_since(self.now()))
    }

    /// Locks constraining `resource`.
    ///
    /// Locks held directly on the path win. Otherwise ancestors are tried
    /// from the parent outwards (the root last), returning the locks of the
    /// first ancestor whose depth reaches `resource`.
    pub fn locked(&self, resource: &str) -> Option<Vec<Lock>> {
        let now = self.now();
        let mut table = self.table.lock();

        if let Some(locks) = live_locks(&mut table, resource, now) {
            return Some(locks.clone());
        }

        let mut item = resource;
        let mut distance = 1;
        while let Some(parent) = path::parent(item) {
            if let Some(locks) = live_locks(&mut table, parent, now) {
                let matched: Vec<Lock> = locks
                    .iter()
                    .filter(|lock| lock.depth.covers(distance))
                    .cloned()
                    .collect();
                if !matched.is_empty() {
                    trace!(resource = %resource, ancestor = %parent, "inherited lock");
                    return Some(matched);
                }
            }
            distance += 1;
            item = parent;
        }
        None
    }

    /// Every live lock whose scope reaches `resource`: locks held on the
    /// path itself plus ancestor locks whose depth covers it.
    pub fn covering(&self, resource: &str) -> Vec<Lock> {
        let now = self.now();
        let mut table = self.table.lock();
        let mut found = live_locks(&mut table, resource, now).cloned().unwrap_or_default();

        let mut item = resource;
        let mut distance = 1;
        while let Some(parent) = path::parent(item) {
            if let Some(locks) = live_locks(&mut table, parent, now) {
                found.extend(locks.iter().filter(|l| l.depth.covers(distance)).cloned());
            }
            distance += 1;
            item = parent;
        }
        found
    }

    /// Live locks held strictly below `resource`.
    pub fn locked_below(&self, resource: &str) -> Vec<Lock> {
        let now = self.now();
        let mut table = self.table.lock();
        let descendants: Vec<String> = table
            .keys()
            .filter(|key| path::is_descendant(key, resource))
            .cloned()
            .collect();

        let mut found = Vec::new();
        for key in &descendants {
            if let Some(locks) = live_locks(&mut table, key, now) {
                found.extend(locks.iter().cloned());
            }
        }
        found
    }

    /// Try to take a new lock on `resource`.
    ///
    /// Returns `None` when an existing lock on the path, on an ancestor
    /// whose depth reaches it, or below it is incompatible with the
    /// requested scope.
    pub fn lock(&self, resource: &str, request: LockRequest) -> Option<Lock> {
        let now = self.now();
        let mut table = self.table.lock();

        if let Some(existing) = live_locks(&mut table, resource, now) {
            let conflict = request.scope == LockScope::Exclusive
                || existing.iter().any(|l| l.scope == LockScope::Exclusive);
            if conflict {
                debug!(resource = %resource, "lock refused: resource already locked");
                return None;
            }
        }

        if ancestor_locked(&mut table, resource, request.scope, now) {
            debug!(resource = %resource, "lock refused: ancestor locked");
            return None;
        }

        if child_locked(&mut table, resource, request.scope, now) {
            debug!(resource = %resource, "lock refused: descendant locked");
            return None;
        }

        let timeout = match request.timeout {
            Some(LockTimeout::Infinite) => None,
            Some(LockTimeout::Seconds(secs)) => Some(Duration::from_secs(secs)),
            None => self.config.default_timeout,
        };
        let lock = Lock {
            resource: resource.to_string(),
            scope: request.scope,
            depth: request.depth,
            owner: request.owner,
            token: Uuid::new_v4().to_string(),
            timeout,
            deadline: timeout.map(|t| now + t),
            uid: request.uid,
        };

        debug!(
            resource = %resource,
            token = %lock.token,
            scope = lock.scope.as_str(),
            depth = lock.depth.as_str(),
            "lock granted"
        );
        table
            .entry(resource.to_string())
            .or_default()
            .push(lock.clone());
        Some(lock)
    }

    /// Release the lock on `resource` matching `token` and `uid`.
    pub fn unlock(&self, resource: &str, token: &str, uid: Option<&str>) -> bool {
        let now = self.now();
        let mut table = self.table.lock();
        if live_locks(&mut table, resource, now).is_none() {
            return false;
        }
        let Some(locks) = table.get_mut(resource) else {
            return false;
        };
        let Some(index) = locks
            .iter()
            .position(|l| l.token == token && l.uid.as_deref() == uid)
        else {
            return false;
        };

        locks.remove(index);
        if locks.is_empty() {
            table.remove(resource);
        }
        debug!(resource = %resource, token = %token, "lock released");
        true
    }

    /// Drop every lock on `resource` and below it.
    pub fn unlock_all(&self, resource: &str) {
        let mut table = self.table.lock();
        let before = table.len();
        table.retain(|key, _| key != resource && !path::is_descendant(key, resource));
        let dropped = before - table.len();
        if dropped > 0 {
            debug!(resource = %resource, entries = dropped, "released subtree locks");
        }
    }

    /// Push the deadline of `lock` to now plus the default timeout.
    ///
    /// Infinite locks stay infinite; without a default timeout this does
    /// nothing. Returns the refreshed lock.
    pub fn refresh(&self, lock: &Lock) -> Option<Lock> {
        let default = self.config.default_timeout?;
        let now = self.now();
        let mut table = self.table.lock();
        let stored = table
            .get_mut(&lock.resource)?
            .iter_mut()
            .find(|l| l.token == lock.token && !l.is_expired(now))?;
        if stored.deadline.is_some() {
            stored.timeout = Some(default);
            stored.deadline = Some(now + default);
            debug!(resource = %stored.resource, token = %stored.token, "lock refreshed");
        }
        Some(stored.clone())
    }

    /// Number of paths holding locks (expired entries included).
    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Purge expired locks on `resource` and return what is left.
fn live_locks<'t>(table: &'t mut LockTable, resource: &str, now: Instant) -> Option<&'t Vec<Lock>> {
    let locks = table.get_mut(resource)?;
    locks.retain(|lock| !lock.is_expired(now));
    if locks.is_empty() {
        trace!(resource = %resource, "dropped expired lock entry");
        table.remove(resource);
        return None;
    }
    table.get(resource)
}

/// Whether an ancestor lock reaching `resource` conflicts with a new lock
/// of `scope`.
fn ancestor_locked(table: &mut LockTable, resource: &str, scope: LockScope, now: Instant) -> bool {
    let mut item = resource;
    let mut distance = 1;
    while let Some(parent) = path::parent(item) {
        let conflict = live_locks(table, parent, now).is_some_and(|locks| {
            locks.iter().filter(|l| l.depth.covers(distance)).any(|l| {
                scope == LockScope::Exclusive || l.scope == LockScope::Exclusive
            })
        });
        if conflict {
            return true;
        }
        distance += 1;
        item = parent;
    }
    false
}

/// Whether a lock below `resource` conflicts with a new lock of `scope`.
fn child_locked(table: &mut LockTable, resource: &str, scope: LockScope, now: Instant) -> bool {
    let descendants: Vec<String> = table
        .keys()
        .filter(|key| path::is_descendant(key, resource))
        .cloned()
        .collect();

    descendants.iter().any(|key| {
        live_locks(table, key, now).is_some_and(|locks| {
            scope == LockScope::Exclusive || locks.iter().any(|l| l.scope == LockScope::Exclusive)
        })
    })
}
