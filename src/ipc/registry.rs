/*!
 * Object Registry
 *
 * Name to queue id bindings. Threads binding to a name that is not yet
 * registered wait on the registry until a matching register call grants
 * them the id.
 */

use crate::core::errors::{CoreError, CoreResult};
use crate::core::limits::{MAX_OBJECT_NAME_LEN, QUEUE_NAME_PREFIX};
use crate::core::types::QueueId;
use crate::sync::{WaitOrder, WaitQueue};
use ahash::AHashMap;
use tracing::debug;

pub struct Registry {
    names: AHashMap<String, QueueId>,
    binders: WaitQueue<String, QueueId>,
    next_anon: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            names: AHashMap::new(),
            binders: WaitQueue::new(WaitOrder::Priority),
            next_anon: 0,
        }
    }

    /// Validate a caller-supplied name, or generate one
    pub fn make_name(&mut self, name: Option<&str>) -> CoreResult<String> {
        match name {
            Some(name) => {
                if name.is_empty() || name.len() > MAX_OBJECT_NAME_LEN {
                    return Err(CoreError::invalid(format!(
                        "Object name must be 1..={} bytes (got {})",
                        MAX_OBJECT_NAME_LEN,
                        name.len()
                    )));
                }
                Ok(name.to_string())
            }
            None => loop {
                self.next_anon += 1;
                let name = format!("{}@{}", QUEUE_NAME_PREFIX, self.next_anon);
                if !self.names.contains_key(&name) {
                    break Ok(name);
                }
            },
        }
    }

    /// Bind `name` to `id`, granting every thread waiting for it
    pub fn register(&mut self, name: &str, id: QueueId) -> CoreResult<usize> {
        if self.names.contains_key(name) {
            return Err(CoreError::AlreadyExists(format!("name '{}'", name)));
        }
        self.names.insert(name.to_string(), id);
        let woken = self.binders.grant_matching(|wanted| wanted == name, |_| id);
        debug!(name, id, woken, "Name registered");
        Ok(woken)
    }

    pub fn lookup(&self, name: &str) -> Option<QueueId> {
        self.names.get(name).copied()
    }

    pub fn unregister(&mut self, name: &str) -> Option<QueueId> {
        let id = self.names.remove(name);
        if id.is_some() {
            debug!(name, "Name unregistered");
        }
        id
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Threads blocked in bind
    pub(crate) fn binders_mut(&mut self) -> &mut WaitQueue<String, QueueId> {
        &mut self.binders
    }

    pub fn pending_binds(&self) -> usize {
        self.binders.count()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
