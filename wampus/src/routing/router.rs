use log::debug;

use crate::{
    core::{
        hash::HashMap,
        id::Id,
    },
    routing::key::{
        RouteKey,
        RouteKind,
    },
};

/// A handle to a route installed in a [`MessageRouter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RouteHandle(u64);

/// What should happen to a route after a message is delivered to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDisposition {
    Keep,
    Remove,
}

struct Route<H> {
    keys: Vec<RouteKey>,
    handler: H,
}

#[derive(Default)]
struct RouteNode {
    // Routes registered without an ID, matching every message of the kind.
    handles: Vec<RouteHandle>,
    by_id: HashMap<Id, Vec<RouteHandle>>,
}

impl RouteNode {
    fn is_empty(&self) -> bool {
        self.handles.is_empty() && self.by_id.is_empty()
    }
}

fn remove_handle(handles: &mut Vec<RouteHandle>, handle: RouteHandle) {
    handles.retain(|existing| *existing != handle);
}

/// Matches inbound messages to the handlers waiting for them.
///
/// Routes are indexed by message kind, then by correlation ID. A route is installed under one or
/// more keys and lives until it is removed explicitly, either by the owner or by the handler
/// returning [`RouteDisposition::Remove`].
///
/// Not synchronized; the owner serializes all access.
pub struct MessageRouter<H> {
    next_handle: u64,
    routes: HashMap<RouteHandle, Route<H>>,
    index: HashMap<RouteKind, RouteNode>,
}

impl<H> Default for MessageRouter<H> {
    fn default() -> Self {
        Self {
            next_handle: 0,
            routes: HashMap::default(),
            index: HashMap::default(),
        }
    }
}

impl<H> MessageRouter<H> {
    /// The number of installed routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Installs a handler under all of the given keys.
    pub fn add_route(&mut self, keys: Vec<RouteKey>, handler: H) -> RouteHandle {
        self.next_handle += 1;
        let handle = RouteHandle(self.next_handle);
        for key in &keys {
            let node = self.index.entry(key.kind).or_default();
            match key.id {
                Some(id) => node.by_id.entry(id).or_default().push(handle),
                None => node.handles.push(handle),
            }
        }
        debug!("Added route {handle:?} for {keys:?}");
        self.routes.insert(handle, Route { keys, handler });
        handle
    }

    /// Removes a route, returning its handler if it was still installed.
    pub fn remove_route(&mut self, handle: RouteHandle) -> Option<H> {
        let route = self.routes.remove(&handle)?;
        for key in &route.keys {
            let node = match self.index.get_mut(&key.kind) {
                Some(node) => node,
                None => continue,
            };
            match key.id {
                Some(id) => {
                    if let Some(handles) = node.by_id.get_mut(&id) {
                        remove_handle(handles, handle);
                        if handles.is_empty() {
                            node.by_id.remove(&id);
                        }
                    }
                }
                None => remove_handle(&mut node.handles, handle),
            }
            if node.is_empty() {
                self.index.remove(&key.kind);
            }
        }
        debug!("Removed route {handle:?}");
        Some(route.handler)
    }

    fn matching_handles(&self, key: &RouteKey) -> Vec<RouteHandle> {
        let node = match self.index.get(&key.kind) {
            Some(node) => node,
            None => return Vec::new(),
        };
        let mut handles = node.handles.clone();
        if let Some(by_id) = key.id.and_then(|id| node.by_id.get(&id)) {
            for handle in by_id {
                // A single route may be installed at both levels.
                if !handles.contains(handle) {
                    handles.push(*handle);
                }
            }
        }
        handles
    }

    /// Delivers a message dispatched under `key` to every matching route, general routes first.
    ///
    /// Returns whether at least one route matched.
    pub fn dispatch<F>(&mut self, key: &RouteKey, mut deliver: F) -> bool
    where
        F: FnMut(RouteHandle, &mut H) -> RouteDisposition,
    {
        let handles = self.matching_handles(key);
        let mut matched = false;
        for handle in handles {
            let disposition = match self.routes.get_mut(&handle) {
                Some(route) => deliver(handle, &mut route.handler),
                None => continue,
            };
            matched = true;
            if disposition == RouteDisposition::Remove {
                self.remove_route(handle);
            }
        }
        matched
    }

    /// Visits every installed route, for terminal events.
    pub fn broadcast_all<F>(&mut self, mut visit: F)
    where
        F: FnMut(RouteHandle, &mut H),
    {
        for (handle, route) in self.routes.iter_mut() {
            visit(*handle, &mut route.handler);
        }
    }

    /// Removes every route.
    pub fn clear(&mut self) {
        self.routes.clear();
        self.index.clear();
    }
}
