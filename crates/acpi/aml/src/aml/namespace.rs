//! The ACPI namespace.
//!
//! Nodes live in an arena and are addressed by generation-checked
//! [`NodeHandle`]s, so a handle to a node removed when a method frame
//! unwinds can never alias a node created later in the same slot. The arena
//! sits behind a reader-writer lock: the namespace is mostly read after boot,
//! but methods may create and remove nodes while other threads evaluate.

extern crate alloc;

use alloc::collections::BTreeMap;
use alloc::format;
use alloc::vec::Vec;

use spin::RwLock;

use super::path::{AmlName, NameSeg};
use super::value::Object;
use crate::AmlError;

/// Upper bound on alias chains, so a cycle cannot hang resolution.
const MAX_ALIAS_DEPTH: usize = 16;

/// Stable reference to a namespace node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHandle {
    index: u32,
    generation: u32,
}

/// A single node in the ACPI namespace.
#[derive(Debug)]
struct Node {
    name: NameSeg,
    parent: Option<NodeHandle>,
    children: BTreeMap<NameSeg, NodeHandle>,
    object: Object,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<Node>,
}

#[derive(Debug, Default)]
struct Arena {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

impl Arena {
    fn get(&self, handle: NodeHandle) -> Option<&Node> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.node.as_ref()
    }

    fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.node.as_mut()
    }

    fn insert(&mut self, node: Node) -> NodeHandle {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeHandle {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeHandle {
            index,
            generation: 0,
        }
    }

    fn release(&mut self, handle: NodeHandle) -> Option<Node> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        Some(node)
    }

    /// Follows `Object::Alias` links starting at `handle`.
    fn follow(&self, mut handle: NodeHandle) -> Option<NodeHandle> {
        for _ in 0..MAX_ALIAS_DEPTH {
            match &self.get(handle)?.object {
                Object::Alias(target) => handle = *target,
                _ => return Some(handle),
            }
        }
        None
    }
}

/// The hierarchical ACPI namespace.
pub struct Namespace {
    arena: RwLock<Arena>,
    root: NodeHandle,
}

impl Namespace {
    /// Create a namespace containing only the root scope.
    #[must_use]
    pub fn new() -> Self {
        let mut arena = Arena::default();
        let root = arena.insert(Node {
            name: NameSeg::ROOT,
            parent: None,
            children: BTreeMap::new(),
            object: Object::Device,
        });
        Self {
            arena: RwLock::new(arena),
            root,
        }
    }

    /// The root scope.
    #[must_use]
    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// Number of live nodes, root included.
    #[must_use]
    pub fn len(&self) -> usize {
        let arena = self.arena.read();
        arena.slots.len() - arena.free.len()
    }

    /// Always `false`: the root node cannot be removed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `handle` still refers to a live node.
    #[must_use]
    pub fn contains(&self, handle: NodeHandle) -> bool {
        self.arena.read().get(handle).is_some()
    }

    /// Create a child named `name` under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::NameCollision`] if `parent` already has a child of
    /// that name and [`AmlError::NameNotFound`] if `parent` is stale.
    pub fn add_child(
        &self,
        parent: NodeHandle,
        name: NameSeg,
        object: Object,
    ) -> Result<NodeHandle, AmlError> {
        let mut arena = self.arena.write();
        let parent = arena.follow(parent).ok_or_else(stale)?;
        let existing = arena.get(parent).ok_or_else(stale)?.children.get(&name).copied();
        if existing.is_some() {
            drop(arena);
            let mut path = self.path_of(parent);
            path.push(name);
            return Err(AmlError::NameCollision(format!("{path}")));
        }
        let child = arena.insert(Node {
            name,
            parent: Some(parent),
            children: BTreeMap::new(),
            object,
        });
        if let Some(node) = arena.get_mut(parent) {
            node.children.insert(name, child);
        }
        Ok(child)
    }

    /// Create a scope node that lookups can start from but that is not
    /// listed among `parent`'s children, so nothing outside can name it.
    ///
    /// Each method invocation runs in one of these: names it creates are
    /// private to that invocation and vanish when the scope is removed with
    /// [`Namespace::remove`].
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::NameNotFound`] if `parent` is stale.
    pub fn add_private_scope(&self, parent: NodeHandle, name: NameSeg) -> Result<NodeHandle, AmlError> {
        let mut arena = self.arena.write();
        let parent = arena.follow(parent).ok_or_else(stale)?;
        arena.get(parent).ok_or_else(stale)?;
        Ok(arena.insert(Node {
            name,
            parent: Some(parent),
            children: BTreeMap::new(),
            object: Object::Uninitialized,
        }))
    }

    /// Look up a direct child of `parent`.
    #[must_use]
    pub fn lookup_child(&self, parent: NodeHandle, name: NameSeg) -> Option<NodeHandle> {
        let arena = self.arena.read();
        let parent = arena.follow(parent)?;
        arena.get(parent)?.children.get(&name).copied()
    }

    /// The parent scope of `handle`, or `None` for the root.
    #[must_use]
    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.arena.read().get(handle)?.parent
    }

    /// The local name of `handle`.
    #[must_use]
    pub fn name(&self, handle: NodeHandle) -> Option<NameSeg> {
        self.arena.read().get(handle).map(|n| n.name)
    }

    /// Resolve `name` relative to `scope`.
    ///
    /// A single relative segment is searched for in its starting scope (the
    /// scope after any `^` hops) and then in each enclosing scope up to the
    /// root. Rooted names and multi-segment names are resolved exactly.
    /// Aliases met along the path are followed; the final node is returned
    /// as-is.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::NameNotFound`] if no node matches.
    pub fn resolve(&self, scope: NodeHandle, name: &AmlName) -> Result<NodeHandle, AmlError> {
        let not_found = || AmlError::NameNotFound(format!("{name}"));
        let arena = self.arena.read();

        if name.uses_search_rule() {
            let seg = name.last().ok_or_else(not_found)?;
            let mut current = Some(self.start_scope(&arena, scope, name).ok_or_else(not_found)?);
            while let Some(s) = current {
                let Some(target) = arena.follow(s) else { break };
                let node = arena.get(target).ok_or_else(not_found)?;
                if let Some(&child) = node.children.get(&seg) {
                    return Ok(child);
                }
                current = arena.get(s).and_then(|n| n.parent);
            }
            return Err(not_found());
        }

        let mut current = self.start_scope(&arena, scope, name).ok_or_else(not_found)?;
        for (i, seg) in name.segments().iter().enumerate() {
            let target = arena.follow(current).ok_or_else(not_found)?;
            current = *arena
                .get(target)
                .ok_or_else(not_found)?
                .children
                .get(seg)
                .ok_or_else(not_found)?;
            if i + 1 == name.segments().len() {
                return Ok(current);
            }
        }
        if name.is_null() {
            return Err(not_found());
        }
        Ok(current)
    }

    /// Resolve the scope a new object named `name` should be created in,
    /// returning that scope and the new object's local name.
    ///
    /// The search rule never applies to definitions: a bare segment is
    /// created in `scope` itself.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::NameNotFound`] if an intermediate scope is missing
    /// or `name` is the null name.
    pub fn resolve_parent(
        &self,
        scope: NodeHandle,
        name: &AmlName,
    ) -> Result<(NodeHandle, NameSeg), AmlError> {
        let not_found = || AmlError::NameNotFound(format!("{name}"));
        let seg = name.last().ok_or_else(not_found)?;
        let parent_path = name.parent_path();
        let parent = if parent_path.segments().is_empty() {
            let arena = self.arena.read();
            self.start_scope(&arena, scope, &parent_path)
                .ok_or_else(not_found)?
        } else {
            self.resolve(scope, &parent_path)?
        };
        let parent = self.arena.read().follow(parent).ok_or_else(not_found)?;
        Ok((parent, seg))
    }

    fn start_scope(&self, arena: &Arena, scope: NodeHandle, name: &AmlName) -> Option<NodeHandle> {
        if name.is_absolute() {
            return Some(self.root);
        }
        let mut current = scope;
        for _ in 0..name.parent_count() {
            current = arena.get(current)?.parent?;
        }
        Some(current)
    }

    /// The object stored at `handle`, following aliases.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::NameNotFound`] if the handle is stale or an alias
    /// chain is broken.
    pub fn object(&self, handle: NodeHandle) -> Result<Object, AmlError> {
        let arena = self.arena.read();
        let target = arena.follow(handle).ok_or_else(stale)?;
        Ok(arena.get(target).ok_or_else(stale)?.object.clone())
    }

    /// The node an alias chain starting at `handle` ends on.
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::NameNotFound`] if the chain is broken.
    pub fn follow_alias(&self, handle: NodeHandle) -> Result<NodeHandle, AmlError> {
        self.arena.read().follow(handle).ok_or_else(stale)
    }

    /// Replace the object stored at `handle` (or at its alias target).
    ///
    /// # Errors
    ///
    /// Returns [`AmlError::NameNotFound`] if the handle is stale.
    pub fn set_object(&self, handle: NodeHandle, object: Object) -> Result<(), AmlError> {
        let mut arena = self.arena.write();
        let target = arena.follow(handle).ok_or_else(stale)?;
        arena.get_mut(target).ok_or_else(stale)?.object = object;
        Ok(())
    }

    /// Remove `handle` and everything below it.
    ///
    /// Removing the root or a stale handle is a no-op.
    pub fn remove(&self, handle: NodeHandle) {
        if handle == self.root {
            return;
        }
        let mut arena = self.arena.write();
        let Some(node) = arena.get(handle) else { return };
        let (name, parent) = (node.name, node.parent);
        if let Some(parent) = parent.and_then(|p| arena.get_mut(p)) {
            if parent.children.get(&name) == Some(&handle) {
                parent.children.remove(&name);
            }
        }
        let mut pending = alloc::vec![handle];
        while let Some(h) = pending.pop() {
            if let Some(node) = arena.release(h) {
                pending.extend(node.children.into_values());
            }
        }
    }

    /// Absolute path of `handle`, e.g. `\_SB_.PCI0`.
    #[must_use]
    pub fn path_of(&self, handle: NodeHandle) -> AmlName {
        let arena = self.arena.read();
        let mut segments = Vec::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            let Some(node) = arena.get(h) else { break };
            if node.parent.is_some() {
                segments.push(node.name);
            }
            current = node.parent;
        }
        segments.reverse();
        AmlName::new(true, 0, segments)
    }

    /// Direct children of `handle` in name order.
    #[must_use]
    pub fn children(&self, handle: NodeHandle) -> Vec<(NameSeg, NodeHandle)> {
        self.arena
            .read()
            .get(handle)
            .map(|n| n.children.iter().map(|(k, v)| (*k, *v)).collect())
            .unwrap_or_default()
    }

    /// Depth-first walk below `start` (excluding `start`).
    ///
    /// `visit` receives each node and its depth (1 for direct children) and
    /// returns whether to descend into that node. The lock is not held while
    /// `visit` runs, so it may query or modify the namespace.
    pub fn walk(&self, start: NodeHandle, mut visit: impl FnMut(NodeHandle, usize) -> bool) {
        let mut stack: Vec<(NodeHandle, usize)> = self
            .children(start)
            .into_iter()
            .rev()
            .map(|(_, h)| (h, 1))
            .collect();
        while let Some((handle, depth)) = stack.pop() {
            if !self.contains(handle) {
                continue;
            }
            if visit(handle, depth) {
                stack.extend(
                    self.children(handle)
                        .into_iter()
                        .rev()
                        .map(|(_, h)| (h, depth + 1)),
                );
            }
        }
    }
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

fn stale() -> AmlError {
    AmlError::NameNotFound(alloc::string::String::from("<stale node>"))
}
