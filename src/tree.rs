//! A hierarchical, thread-guarded store of named nodes carrying value maps.
//!
//! Nodes live in an arena owned by [`Tree`] and refer to each other through
//! [`NodeId`] handles, so parent links are plain data and destroying a node can
//! never leave a dangling pointer behind. Handles are never reused: a stale
//! handle fails with `NotFound` instead of silently addressing a newer node.
//!
//! Every node guards its value map and its child list with two independent
//! locks; its parent handle, name and reference each have their own small lock.
//! The arena index is locked only long enough to fetch or insert an `Arc` to a
//! node. No operation ever holds more than one node's child list at a time,
//! and whenever two locks are held together the order is fixed:
//!
//! * a child's parent slot before any parent's child list (reparenting),
//! * the value map of the lower handle before the higher one (assign, merge).
//!
//! Path walks lock each child list one at a time, so a concurrent structural
//! edit elsewhere in the tree can become visible part way through a walk.
//! The ancestor check of [`Tree::set_parent`] also runs before the parent slot
//! is locked: two concurrent moves in opposite directions can close a cycle.
//! Every recursive walk (leaf names, deep copy, subtree encoding) therefore
//! fails with `StructuralIntegrity` on a node it reaches twice.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::hash::BuildHasherDefault;
use std::sync::{Arc, Mutex, MutexGuard};

use seahash::SeaHasher;
use tracing::{debug, trace};

use crate::codec::{Codec, FieldReader};
use crate::datatype::Value;
use crate::error::{ArborError, Result};
use crate::path::{join_steps, Path};

pub type NodeHasher = BuildHasherDefault<SeaHasher>;

/// Variables local to one node, kept in key order so encodings are stable.
pub type VarMap = BTreeMap<String, Value>;

// ------------- NodeId -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct HandleGenerator {
    lower_bound: u64,
}
impl HandleGenerator {
    fn generate(&mut self) -> NodeId {
        self.lower_bound += 1;
        NodeId(self.lower_bound)
    }
}

// ------------- Node -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    /// An ordinary node.
    Plain,
    /// A node that also carries a non-owning reference to another node,
    /// used to build an alternate index over the same data.
    Index,
}

#[derive(Debug)]
struct Node {
    kind: NodeKind,
    name: Mutex<String>,
    parent: Mutex<Option<NodeId>>,
    children: Mutex<Vec<NodeId>>,
    vars: Mutex<VarMap>,
    reference: Mutex<Option<NodeId>>,
}

impl Node {
    fn new(kind: NodeKind, name: String, vars: VarMap, reference: Option<NodeId>) -> Self {
        Self {
            kind,
            name: Mutex::new(name),
            parent: Mutex::new(None),
            children: Mutex::new(Vec::new()),
            vars: Mutex::new(vars),
            reference: Mutex::new(reference),
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| ArborError::Lock(format!("{what} lock poisoned")))
}

// ------------- Tree -------------
#[derive(Debug, Default)]
pub struct Tree {
    handle_generator: Mutex<HandleGenerator>,
    nodes: Mutex<HashMap<NodeId, Arc<Node>, NodeHasher>>,
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, id: NodeId) -> Result<Arc<Node>> {
        lock(&self.nodes, "arena")?
            .get(&id)
            .cloned()
            .ok_or_else(|| ArborError::NotFound(format!("node {id}")))
    }
    fn insert(&self, node: Node) -> Result<NodeId> {
        let id = lock(&self.handle_generator, "handle generator")?.generate();
        lock(&self.nodes, "arena")?.insert(id, Arc::new(node));
        Ok(id)
    }
    fn forget(&self, id: NodeId) -> Result<()> {
        lock(&self.nodes, "arena")?.remove(&id);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.lock().map(|nodes| nodes.len()).unwrap_or(0)
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }
    /// Every node without a parent, in handle order.
    pub fn roots(&self) -> Result<Vec<NodeId>> {
        let nodes: Vec<(NodeId, Arc<Node>)> = lock(&self.nodes, "arena")?
            .iter()
            .map(|(id, node)| (*id, Arc::clone(node)))
            .collect();
        let mut roots = Vec::new();
        for (id, node) in nodes {
            if lock(&node.parent, "parent")?.is_none() {
                roots.push(id);
            }
        }
        roots.sort();
        Ok(roots)
    }

    // ------------- construction -------------
    pub fn create_root(&self, name: impl Into<String>) -> Result<NodeId> {
        self.create_node(name, None)
    }
    /// Creates a node, linked on both sides to `parent` when one is given.
    pub fn create_node(&self, name: impl Into<String>, parent: Option<NodeId>) -> Result<NodeId> {
        self.create(NodeKind::Plain, name.into(), VarMap::new(), None, parent)
    }
    pub fn create_index_node(
        &self,
        name: impl Into<String>,
        parent: Option<NodeId>,
        reference: Option<NodeId>,
    ) -> Result<NodeId> {
        if let Some(target) = reference {
            self.node(target)?;
        }
        self.create(NodeKind::Index, name.into(), VarMap::new(), reference, parent)
    }
    fn create(
        &self,
        kind: NodeKind,
        name: String,
        vars: VarMap,
        reference: Option<NodeId>,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        if let Some(p) = parent {
            self.node(p)?;
        }
        let id = self.insert(Node::new(kind, name, vars, reference))?;
        debug!(node = %id, ?kind, parent = ?parent, "node created");
        if parent.is_some() {
            if let Err(e) = self.set_parent(id, parent) {
                self.forget(id)?;
                return Err(e);
            }
        }
        Ok(id)
    }

    // ------------- local fields -------------
    pub fn kind(&self, id: NodeId) -> Result<NodeKind> {
        Ok(self.node(id)?.kind)
    }
    pub fn name(&self, id: NodeId) -> Result<String> {
        let node = self.node(id)?;
        let name = lock(&node.name, "name")?.clone();
        Ok(name)
    }
    pub fn rename(&self, id: NodeId, name: impl Into<String>) -> Result<()> {
        let node = self.node(id)?;
        *lock(&node.name, "name")? = name.into();
        Ok(())
    }
    pub fn parent(&self, id: NodeId) -> Result<Option<NodeId>> {
        let node = self.node(id)?;
        let parent = *lock(&node.parent, "parent")?;
        Ok(parent)
    }
    pub fn children(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let node = self.node(id)?;
        let children = lock(&node.children, "children")?.clone();
        Ok(children)
    }
    pub fn is_leaf(&self, id: NodeId) -> Result<bool> {
        let node = self.node(id)?;
        let leaf = lock(&node.children, "children")?.is_empty();
        Ok(leaf)
    }
    /// The node an index node points at, or `None` for plain nodes, unset
    /// references and references to nodes destroyed since.
    pub fn reference(&self, id: NodeId) -> Result<Option<NodeId>> {
        let node = self.node(id)?;
        let reference = *lock(&node.reference, "reference")?;
        Ok(reference.filter(|target| self.contains(*target)))
    }
    pub fn set_reference(&self, id: NodeId, target: Option<NodeId>) -> Result<()> {
        let node = self.node(id)?;
        if node.kind != NodeKind::Index {
            return Err(ArborError::InvalidArgument(format!(
                "node {id} is not an index node"
            )));
        }
        if let Some(target) = target {
            self.node(target)?;
        }
        *lock(&node.reference, "reference")? = target;
        Ok(())
    }

    // ------------- linking -------------
    fn is_self_or_ancestor(&self, candidate: NodeId, of: NodeId) -> Result<bool> {
        let mut at = Some(of);
        // more hops than nodes means the parent chain is circular
        let mut hops = self.len() + 1;
        while let Some(id) = at {
            if id == candidate {
                return Ok(true);
            }
            if hops == 0 {
                return Err(ArborError::StructuralIntegrity(format!(
                    "parent chain of {of} does not end in a root"
                )));
            }
            hops -= 1;
            at = match self.node(id) {
                Ok(node) => *lock(&node.parent, "parent")?,
                Err(_) => None,
            };
        }
        Ok(false)
    }

    /// Moves `id` under `parent`, or detaches it when `parent` is `None`.
    ///
    /// Both sides of the link change together: the node leaves its old
    /// parent's child list, and is appended to the new parent's child list
    /// unless already present.
    pub fn set_parent(&self, id: NodeId, parent: Option<NodeId>) -> Result<()> {
        let node = self.node(id)?;
        let new_parent = match parent {
            Some(p) => {
                if self.is_self_or_ancestor(id, p)? {
                    return Err(ArborError::StructuralIntegrity(format!(
                        "{p} cannot become the parent of its ancestor {id}"
                    )));
                }
                Some(self.node(p)?)
            }
            None => None,
        };
        let mut slot = lock(&node.parent, "parent")?;
        if *slot != parent {
            if let Some(old) = *slot {
                if let Ok(old_parent) = self.node(old) {
                    lock(&old_parent.children, "children")?.retain(|c| *c != id);
                }
            }
            debug!(node = %id, from = ?*slot, to = ?parent, "node reparented");
            *slot = parent;
        }
        if let Some(new_parent) = new_parent {
            let mut siblings = lock(&new_parent.children, "children")?;
            if !siblings.contains(&id) {
                siblings.push(id);
            }
        }
        Ok(())
    }
    pub fn add_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        self.set_parent(child, Some(parent))?;
        let node = self.node(parent)?;
        let mut children = lock(&node.children, "children")?;
        let mut seen = HashSet::with_capacity(children.len());
        children.retain(|c| seen.insert(*c));
        Ok(())
    }
    /// Removes `child` from `parent`'s list. The child's parent handle is
    /// cleared only when it pointed at `parent`; an absent child is a no-op.
    pub fn remove_child(&self, parent: NodeId, child: NodeId) -> Result<()> {
        let parent_node = self.node(parent)?;
        match self.node(child) {
            Ok(child_node) => {
                let mut slot = lock(&child_node.parent, "parent")?;
                lock(&parent_node.children, "children")?.retain(|c| *c != child);
                if *slot == Some(parent) {
                    *slot = None;
                }
            }
            Err(_) => {
                lock(&parent_node.children, "children")?.retain(|c| *c != child);
            }
        }
        Ok(())
    }
    /// Linear scan by exact name; with duplicate names the last one wins.
    pub fn find_child(&self, parent: NodeId, name: &str) -> Result<Option<NodeId>> {
        for child in self.children(parent)?.into_iter().rev() {
            match self.name(child) {
                Ok(n) if n == name => return Ok(Some(child)),
                _ => (),
            }
        }
        Ok(None)
    }
    fn detach(&self, id: NodeId, node: &Node) -> Result<()> {
        let mut slot = lock(&node.parent, "parent")?;
        if let Some(old) = slot.take() {
            if let Ok(old_parent) = self.node(old) {
                lock(&old_parent.children, "children")?.retain(|c| *c != id);
            }
        }
        Ok(())
    }

    // ------------- variables -------------
    /// Returns a copy; later writes to the node do not affect it.
    pub fn get_var(&self, id: NodeId, key: &str) -> Result<Option<Value>> {
        let node = self.node(id)?;
        let value = lock(&node.vars, "vars")?.get(key).cloned();
        Ok(value)
    }
    /// Returns the value previously stored under `key`.
    pub fn put_var(
        &self,
        id: NodeId,
        key: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>> {
        let node = self.node(id)?;
        let previous = lock(&node.vars, "vars")?.insert(key.into(), value.into());
        Ok(previous)
    }
    pub fn remove_var(&self, id: NodeId, key: &str) -> Result<Option<Value>> {
        let node = self.node(id)?;
        let removed = lock(&node.vars, "vars")?.remove(key);
        Ok(removed)
    }
    pub fn clear_vars(&self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        lock(&node.vars, "vars")?.clear();
        Ok(())
    }
    pub fn var_names(&self, id: NodeId) -> Result<Vec<String>> {
        let node = self.node(id)?;
        let names = lock(&node.vars, "vars")?.keys().cloned().collect();
        Ok(names)
    }
    pub fn vars(&self, id: NodeId) -> Result<VarMap> {
        let node = self.node(id)?;
        let vars = lock(&node.vars, "vars")?.clone();
        Ok(vars)
    }
    /// Replaces the variables of `target` with a copy of those of `source`.
    pub fn assign_vars(&self, target: NodeId, source: NodeId) -> Result<()> {
        self.with_both_var_maps(target, source, |target, source| {
            target.clone_from(source);
        })
    }
    /// Copies every variable of `source` into `target`, overwriting clashes.
    pub fn merge_vars(&self, target: NodeId, source: NodeId) -> Result<()> {
        self.with_both_var_maps(target, source, |target, source| {
            for (key, value) in source {
                target.insert(key.clone(), value.clone());
            }
        })
    }
    // the map of the lower handle is always locked first
    fn with_both_var_maps<F>(&self, target: NodeId, source: NodeId, f: F) -> Result<()>
    where
        F: FnOnce(&mut VarMap, &VarMap),
    {
        let target_node = self.node(target)?;
        let source_node = self.node(source)?;
        if target == source {
            return Ok(());
        }
        if target < source {
            let mut target_vars = lock(&target_node.vars, "vars")?;
            let source_vars = lock(&source_node.vars, "vars")?;
            f(&mut target_vars, &source_vars);
        } else {
            let source_vars = lock(&source_node.vars, "vars")?;
            let mut target_vars = lock(&target_node.vars, "vars")?;
            f(&mut target_vars, &source_vars);
        }
        Ok(())
    }

    // ------------- addressing -------------
    pub fn root_of(&self, id: NodeId) -> Result<NodeId> {
        let mut at = id;
        let mut hops = self.len() + 1;
        while let Some(parent) = self.parent(at)? {
            if hops == 0 {
                return Err(ArborError::StructuralIntegrity(format!(
                    "parent chain of {id} does not end in a root"
                )));
            }
            hops -= 1;
            at = parent;
        }
        Ok(at)
    }
    /// Names from the root down to `id`, leaving out an empty root name.
    pub fn steps(&self, id: NodeId) -> Result<Vec<String>> {
        let mut steps = Vec::new();
        let mut at = Some(id);
        let mut hops = self.len() + 1;
        while let Some(node) = at {
            if hops == 0 {
                return Err(ArborError::StructuralIntegrity(format!(
                    "parent chain of {id} does not end in a root"
                )));
            }
            hops -= 1;
            let parent = self.parent(node)?;
            let name = self.name(node)?;
            if parent.is_some() || !name.is_empty() {
                steps.push(name);
            }
            at = parent;
        }
        steps.reverse();
        Ok(steps)
    }
    pub fn path_of(&self, id: NodeId) -> Result<String> {
        Ok(join_steps(false, &self.steps(id)?))
    }

    fn start_of(&self, from: NodeId, path: &Path) -> Result<NodeId> {
        if path.is_absolute() {
            self.root_of(from)
        } else {
            self.node(from)?;
            Ok(from)
        }
    }
    fn walk(&self, start: NodeId, steps: &[String]) -> Result<Option<NodeId>> {
        let mut at = start;
        for step in steps {
            trace!(at = %at, %step, "path step");
            match self.find_child(at, step)? {
                Some(child) => at = child,
                None => return Ok(None),
            }
        }
        Ok(Some(at))
    }
    /// Resolves a path of node names without creating anything.
    pub fn node_at_path(&self, from: NodeId, path: &str) -> Result<Option<NodeId>> {
        let path = Path::parse(path)?;
        let start = self.start_of(from, &path)?;
        self.walk(start, path.steps())
    }
    /// Reads the variable named by the last step; `None` when any step on
    /// the way is missing.
    pub fn get_var_at_path(&self, from: NodeId, path: &str) -> Result<Option<Value>> {
        let path = Path::parse(path)?;
        let (nodes, var) = path.split_variable()?;
        let start = self.start_of(from, &path)?;
        match self.walk(start, nodes)? {
            Some(node) => self.get_var(node, var),
            None => Ok(None),
        }
    }
    /// Writes the variable named by the last step, creating every missing
    /// node on the way. Returns the node that holds the variable.
    pub fn put_var_at_path(
        &self,
        from: NodeId,
        path: &str,
        value: impl Into<Value>,
    ) -> Result<NodeId> {
        let path = Path::parse(path)?;
        let (nodes, var) = path.split_variable()?;
        let mut at = self.start_of(from, &path)?;
        for step in nodes {
            trace!(at = %at, %step, "path step");
            at = match self.find_child(at, step)? {
                Some(child) => child,
                None => self.create_node(step.as_str(), Some(at))?,
            };
        }
        self.put_var(at, var, value)?;
        Ok(at)
    }

    /// De-duplicated names of all leaf descendants, in first-seen order.
    pub fn unique_leaf_node_names(&self, id: NodeId) -> Result<Vec<String>> {
        let mut visited = HashSet::new();
        self.leaf_names(id, &mut visited)
    }
    fn leaf_names(&self, id: NodeId, visited: &mut HashSet<NodeId>) -> Result<Vec<String>> {
        if !visited.insert(id) {
            return Err(ArborError::StructuralIntegrity(format!(
                "node {id} is reachable twice below one root"
            )));
        }
        let mut names: Vec<String> = Vec::new();
        for child in self.children(id)? {
            let found = if self.is_leaf(child)? {
                vec![self.name(child)?]
            } else {
                let below = self.leaf_names(child, visited)?;
                if below.is_empty() {
                    return Err(ArborError::StructuralIntegrity(format!(
                        "branch {child} has children but reports no leaves"
                    )));
                }
                below
            };
            for name in found {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
        Ok(names)
    }

    // ------------- copy and destroy -------------
    /// Duplicates only the local fields of `id` (name, variables, reference).
    ///
    /// The copy shares the parent handle and child list of the original
    /// without either side knowing: the parent does not list the copy, and
    /// the children still point at the original. Use [`Tree::deep_copy`]
    /// unless that is exactly what is wanted.
    pub fn shallow_copy(&self, id: NodeId) -> Result<NodeId> {
        let node = self.node(id)?;
        let name = lock(&node.name, "name")?.clone();
        let vars = lock(&node.vars, "vars")?.clone();
        let reference = *lock(&node.reference, "reference")?;
        let parent = *lock(&node.parent, "parent")?;
        let children = lock(&node.children, "children")?.clone();
        let copy = Node::new(node.kind, name, vars, reference);
        *lock(&copy.parent, "parent")? = parent;
        *lock(&copy.children, "children")? = children;
        let copy = self.insert(copy)?;
        debug!(node = %id, copy = %copy, "node shallow copied");
        Ok(copy)
    }

    fn snapshot(&self, id: NodeId) -> Result<HashMap<NodeId, Vec<NodeId>>> {
        let mut plan = HashMap::new();
        let mut pending = vec![id];
        while let Some(at) = pending.pop() {
            let children = self.children(at)?;
            pending.extend(children.iter().copied());
            if plan.insert(at, children).is_some() {
                return Err(ArborError::StructuralIntegrity(format!(
                    "node {at} is reachable twice below {id}"
                )));
            }
        }
        Ok(plan)
    }
    fn copy_one(&self, source: NodeId, name: Option<String>, parent: Option<NodeId>) -> Result<NodeId> {
        let node = self.node(source)?;
        let name = match name {
            Some(name) => name,
            None => lock(&node.name, "name")?.clone(),
        };
        let vars = lock(&node.vars, "vars")?.clone();
        let reference = *lock(&node.reference, "reference")?;
        self.create(node.kind, name, vars, reference, parent)
    }
    fn copy_below(
        &self,
        plan: &HashMap<NodeId, Vec<NodeId>>,
        source: NodeId,
        copy: NodeId,
    ) -> Result<()> {
        let children = plan.get(&source).map(Vec::as_slice).unwrap_or_default();
        for &child in children {
            let child_copy = self.copy_one(child, None, Some(copy))?;
            self.copy_below(plan, child, child_copy)?;
        }
        Ok(())
    }
    fn unused_child_name(&self, parent: NodeId, name: &str) -> Result<String> {
        let mut taken = HashSet::new();
        for sibling in self.children(parent)? {
            taken.insert(self.name(sibling)?);
        }
        if !taken.contains(name) {
            return Ok(name.to_string());
        }
        let mut n = 1usize;
        loop {
            let candidate = format!("{name}_{n}");
            if !taken.contains(&candidate) {
                return Ok(candidate);
            }
            n += 1;
        }
    }
    /// Recursively duplicates the subtree under `id` and attaches the copy to
    /// `parent`. The copied root is renamed when `parent` already has a child
    /// of the same name. Either the whole copy is returned, or every node
    /// created along the way is destroyed again before the error surfaces.
    ///
    /// Index nodes keep their reference as it is: a copied index node still
    /// points at the original target, even when that target was copied too.
    pub fn deep_copy(&self, id: NodeId, parent: Option<NodeId>) -> Result<NodeId> {
        let plan = self.snapshot(id)?;
        self.copy_planned(&plan, id, parent)
    }
    fn copy_planned(
        &self,
        plan: &HashMap<NodeId, Vec<NodeId>>,
        id: NodeId,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        let name = self.name(id)?;
        let name = match parent {
            Some(p) => self.unused_child_name(p, &name)?,
            None => name,
        };
        let copy = self.copy_one(id, Some(name), parent)?;
        self.populate(copy, || self.copy_below(plan, id, copy))?;
        debug!(node = %id, copy = %copy, nodes = plan.len(), "subtree deep copied");
        Ok(copy)
    }
    /// Runs `fill` to create everything below the freshly created `root`.
    /// When it fails, `root` and whatever was created below it are destroyed.
    fn populate<F>(&self, root: NodeId, fill: F) -> Result<NodeId>
    where
        F: FnOnce() -> Result<()>,
    {
        match fill() {
            Ok(()) => Ok(root),
            Err(e) => {
                debug!(node = %root, error = %e, "partial subtree rolled back");
                self.deep_destroy(root)?;
                Err(e)
            }
        }
    }

    /// Unlinks `id` from its parent, orphans its immediate children and
    /// removes it from the tree. The children survive as roots.
    pub fn shallow_destroy(&self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        self.detach(id, &node)?;
        let children = std::mem::take(&mut *lock(&node.children, "children")?);
        for child in children {
            if let Ok(child_node) = self.node(child) {
                let mut slot = lock(&child_node.parent, "parent")?;
                if *slot == Some(id) {
                    *slot = None;
                }
            }
        }
        self.forget(id)?;
        debug!(node = %id, "node shallow destroyed");
        Ok(())
    }
    /// Unlinks `id` from its parent and removes it with all its descendants.
    /// Only children whose parent handle points back are descended into.
    pub fn deep_destroy(&self, id: NodeId) -> Result<()> {
        let node = self.node(id)?;
        self.detach(id, &node)?;
        let mut pending = vec![(id, node)];
        let mut destroyed = 0usize;
        while let Some((at, node)) = pending.pop() {
            let children = std::mem::take(&mut *lock(&node.children, "children")?);
            for child in children {
                if let Ok(child_node) = self.node(child) {
                    let owned = *lock(&child_node.parent, "parent")? == Some(at);
                    if owned {
                        pending.push((child, child_node));
                    }
                }
            }
            self.forget(at)?;
            destroyed += 1;
        }
        debug!(node = %id, destroyed, "subtree deep destroyed");
        Ok(())
    }

    // ------------- codec -------------
    pub fn encode_vars(&self, id: NodeId) -> Result<String> {
        encode_var_map(&self.vars(id)?, &Codec::default())
    }
    /// Replaces the variables of `id` with the decoded map; on a decoding
    /// error the node is left untouched.
    pub fn decode_vars(&self, id: NodeId, text: &str) -> Result<()> {
        let vars = decode_var_map(text)?;
        let node = self.node(id)?;
        *lock(&node.vars, "vars")? = vars;
        Ok(())
    }
    pub fn encode_subtree(&self, id: NodeId) -> Result<String> {
        self.encode_subtree_with(id, &Codec::default())
    }
    /// Name, index flag, variable map, child count, then every child's own
    /// subtree code. References are arena handles and are not carried.
    pub fn encode_subtree_with(&self, id: NodeId, codec: &Codec) -> Result<String> {
        let mut visited = HashSet::new();
        self.encode_node(id, codec, &mut visited)
    }
    fn encode_node(
        &self,
        id: NodeId,
        codec: &Codec,
        visited: &mut HashSet<NodeId>,
    ) -> Result<String> {
        if !visited.insert(id) {
            return Err(ArborError::StructuralIntegrity(format!(
                "node {id} is reachable twice below one root"
            )));
        }
        let kind = self.kind(id)?;
        let mut writer = codec.writer();
        writer
            .push(&self.name(id)?)
            .push(if kind == NodeKind::Index { "1" } else { "0" })
            .push(&encode_var_map(&self.vars(id)?, codec)?);
        let children = self.children(id)?;
        writer.push_count(children.len());
        for child in children {
            writer.push(&self.encode_node(child, codec, visited)?);
        }
        writer.finish()
    }
    /// Rebuilds an encoded subtree under `parent`. The text is fully decoded
    /// before any node is created.
    pub fn decode_subtree(&self, text: &str, parent: Option<NodeId>) -> Result<NodeId> {
        let image = SubtreeImage::decode(text)?;
        let root = self.create(image.kind, image.name.clone(), image.vars.clone(), None, parent)?;
        self.populate(root, || self.build(&image, root))
    }
    fn build(&self, image: &SubtreeImage, at: NodeId) -> Result<()> {
        for child in &image.children {
            let id = self.create(child.kind, child.name.clone(), child.vars.clone(), None, Some(at))?;
            self.build(child, id)?;
        }
        Ok(())
    }
}

/// Count, then every (key, encoded value) pair in key order.
pub fn encode_var_map(vars: &VarMap, codec: &Codec) -> Result<String> {
    let mut writer = codec.writer();
    writer.push_count(vars.len());
    for (key, value) in vars {
        writer.push(key).push(&value.encode_with(codec)?);
    }
    writer.finish()
}
pub fn decode_var_map(text: &str) -> Result<VarMap> {
    let mut reader = FieldReader::open(text)?;
    let count = reader.next_count_of("variable count", 2)?;
    let mut vars = VarMap::new();
    for _ in 0..count {
        let key = reader.next("variable name")?;
        let value = Value::decode(reader.next("variable value")?)?;
        if vars.insert(key.to_string(), value).is_some() {
            return Err(ArborError::Codec(format!("variable {key:?} appears twice")));
        }
    }
    reader.finish()?;
    Ok(vars)
}

#[derive(Debug)]
struct SubtreeImage {
    name: String,
    kind: NodeKind,
    vars: VarMap,
    children: Vec<SubtreeImage>,
}
impl SubtreeImage {
    fn decode(text: &str) -> Result<Self> {
        let mut reader = FieldReader::open(text)?;
        let name = reader.next("node name")?.to_string();
        let kind = match reader.next("index flag")? {
            "0" => NodeKind::Plain,
            "1" => NodeKind::Index,
            other => return Err(ArborError::Codec(format!("bad index flag {other:?}"))),
        };
        let vars = decode_var_map(reader.next("variables")?)?;
        let count = reader.next_count_of("child count", 1)?;
        let mut children = Vec::with_capacity(count);
        for _ in 0..count {
            children.push(Self::decode(reader.next("child")?)?);
        }
        reader.finish()?;
        Ok(Self {
            name,
            kind,
            vars,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Tree, NodeId, NodeId) {
        let tree = Tree::new();
        let root = tree.create_root("").unwrap();
        tree.put_var_at_path(root, "A/x/deep/v", 1.0).unwrap();
        tree.put_var_at_path(root, "A/y/v", 2.0).unwrap();
        let a = tree.find_child(root, "A").unwrap().unwrap();
        (tree, root, a)
    }

    #[test]
    fn a_copy_failing_midway_is_rolled_back() {
        let (tree, root, a) = sample();
        let plan = tree.snapshot(a).unwrap();
        let y = tree.find_child(a, "y").unwrap().unwrap();
        tree.deep_destroy(y).unwrap();
        let before = tree.len();

        // x and its child are copied before the stale y is reached
        let result = tree.copy_planned(&plan, a, Some(root));
        assert!(matches!(result, Err(ArborError::NotFound(_))));
        assert_eq!(tree.len(), before);
        assert_eq!(tree.children(root).unwrap(), vec![a]);
    }

    #[test]
    fn a_failing_fill_destroys_what_it_created() {
        let (tree, root, _a) = sample();
        let before = tree.len();
        let top = tree.create_node("partial", Some(root)).unwrap();
        let result = tree.populate(top, || {
            let child = tree.create_node("child", Some(top))?;
            tree.create_node("grandchild", Some(child))?;
            Err(ArborError::Codec("stopped".into()))
        });
        assert!(matches!(result, Err(ArborError::Codec(_))));
        assert_eq!(tree.len(), before);
        assert!(!tree.contains(top));
        assert_eq!(tree.find_child(root, "partial").unwrap(), None);
    }
}
