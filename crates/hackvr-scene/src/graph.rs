//! Scene graph: an arena of objects forming a forest rooted at `$global`.
//!
//! Objects live in stable slots; the id → slot index map and the
//! parent/children links are index-valued, so destroying an object never
//! invalidates other handles. `$global` (the unreparentable root) and
//! `$camera` always exist. Destroying a non-leaf reparents its children to
//! `$global` with their world transforms preserved.
//!
//! All world-transform math here works on *committed* transforms: transitions
//! and tracking are sampling-time layers owned by the scene facade. In-flight
//! transitions keep their local-space endpoints across a reparent.

use std::collections::HashMap;

use glam::{Mat4, Quat};

use hackvr_protocol::{GeomId, Ident, ObjectId, ReparentMode};

use crate::error::SceneError;
use crate::math::Transform;
use crate::track::TrackLayer;
use crate::transition::TransitionSet;

/// The mutable property bag of an object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectProps {
    pub clickable: bool,
    pub textinput: bool,
    pub href: Option<String>,
}

/// One scene object.
#[derive(Debug, Clone)]
pub struct Object {
    pub id: ObjectId,
    pub transform: Transform,
    pub geometry: Option<GeomId>,
    pub track: TrackLayer,
    pub transitions: TransitionSet,
    pub props: ObjectProps,
    parent: usize,
    children: Vec<usize>,
}

impl Object {
    fn new(id: ObjectId, parent: usize) -> Self {
        Self {
            id,
            transform: Transform::IDENTITY,
            geometry: None,
            track: TrackLayer::default(),
            transitions: TransitionSet::default(),
            props: ObjectProps::default(),
            parent,
            children: Vec::new(),
        }
    }
}

const GLOBAL_SLOT: usize = 0;

/// Arena-backed scene graph.
#[derive(Debug)]
pub struct SceneGraph {
    slots: Vec<Option<Object>>,
    index: HashMap<ObjectId, usize>,
    free: Vec<usize>,
}

impl SceneGraph {
    pub fn new() -> Self {
        let mut graph = Self {
            slots: Vec::new(),
            index: HashMap::new(),
            free: Vec::new(),
        };
        let global = graph.insert(Object::new(Ident::global(), GLOBAL_SLOT));
        debug_assert_eq!(global, GLOBAL_SLOT);
        let camera = graph.insert(Object::new(Ident::camera(), GLOBAL_SLOT));
        graph.slots[GLOBAL_SLOT]
            .as_mut()
            .expect("root slot")
            .children
            .push(camera);
        graph
    }

    fn insert(&mut self, object: Object) -> usize {
        let slot = match self.free.pop() {
            Some(slot) => {
                self.slots[slot] = Some(object);
                slot
            }
            None => {
                self.slots.push(Some(object));
                self.slots.len() - 1
            }
        };
        let id = self.slots[slot].as_ref().expect("just inserted").id.clone();
        self.index.insert(id, slot);
        slot
    }

    fn slot_of(&self, id: &ObjectId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &ObjectId) -> Option<&Object> {
        self.slot_of(id).and_then(|slot| self.slots[slot].as_ref())
    }

    pub fn get_mut(&mut self, id: &ObjectId) -> Option<&mut Object> {
        let slot = self.slot_of(id)?;
        self.slots[slot].as_mut()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.index.keys()
    }

    /// The parent's id, or `None` for `$global`.
    pub fn parent_of(&self, id: &ObjectId) -> Option<&ObjectId> {
        let slot = self.slot_of(id)?;
        if slot == GLOBAL_SLOT {
            return None;
        }
        let parent_slot = self.slots[slot].as_ref()?.parent;
        self.slots[parent_slot].as_ref().map(|parent| &parent.id)
    }

    pub fn children_of(&self, id: &ObjectId) -> Vec<&ObjectId> {
        let Some(slot) = self.slot_of(id) else {
            return Vec::new();
        };
        let Some(object) = self.slots[slot].as_ref() else {
            return Vec::new();
        };
        object
            .children
            .iter()
            .filter_map(|&child| self.slots[child].as_ref())
            .map(|child| &child.id)
            .collect()
    }

    /// Depth of an object below the root (`$global` is 0).
    pub fn depth(&self, id: &ObjectId) -> Option<usize> {
        let mut slot = self.slot_of(id)?;
        let mut depth = 0;
        while slot != GLOBAL_SLOT {
            slot = self.slots[slot].as_ref()?.parent;
            depth += 1;
        }
        Some(depth)
    }

    /// Whether `ancestor` is on `id`'s parent chain (an object is not its
    /// own ancestor here).
    pub fn is_ancestor(&self, ancestor: &ObjectId, id: &ObjectId) -> bool {
        let Some(ancestor_slot) = self.slot_of(ancestor) else {
            return false;
        };
        let Some(mut slot) = self.slot_of(id) else {
            return false;
        };
        while slot != GLOBAL_SLOT {
            let parent = match self.slots[slot].as_ref() {
                Some(object) => object.parent,
                None => return false,
            };
            if parent == ancestor_slot {
                return true;
            }
            slot = parent;
        }
        false
    }

    /// Committed world transform (transitions and tracking excluded).
    pub fn world_transform(&self, id: &ObjectId) -> Option<Mat4> {
        let mut slot = self.slot_of(id)?;
        let mut chain = Vec::new();
        loop {
            let object = self.slots[slot].as_ref()?;
            chain.push(object.transform);
            if slot == GLOBAL_SLOT {
                break;
            }
            slot = object.parent;
        }
        let mut matrix = Mat4::IDENTITY;
        for transform in chain.iter().rev() {
            matrix *= transform.to_matrix(Quat::IDENTITY);
        }
        Some(matrix)
    }

    /// Create an object parented to `$global`. `cap` bounds the population.
    pub fn create(
        &mut self,
        id: ObjectId,
        geometry: Option<GeomId>,
        cap: usize,
    ) -> Result<(), SceneError> {
        if id.is_reserved() {
            return Err(SceneError::ForbiddenIdentifier);
        }
        if self.index.contains_key(&id) {
            return Err(SceneError::DuplicateCreate);
        }
        if self.len() >= cap {
            return Err(SceneError::LimitExceeded("object"));
        }
        let mut object = Object::new(id, GLOBAL_SLOT);
        object.geometry = geometry;
        let slot = self.insert(object);
        self.slots[GLOBAL_SLOT]
            .as_mut()
            .expect("root slot")
            .children
            .push(slot);
        Ok(())
    }

    /// Destroy an object. Children are handed to `$global` with their world
    /// transforms preserved. `$global` and `$camera` cannot be destroyed.
    pub fn destroy(&mut self, id: &ObjectId) -> Result<(), SceneError> {
        if *id == Ident::global() || *id == Ident::camera() {
            return Err(SceneError::ForbiddenIdentifier);
        }
        let slot = self
            .slot_of(id)
            .ok_or(SceneError::MissingEntity("object"))?;

        let children = self.slots[slot].as_ref().expect("live slot").children.clone();
        for child in children {
            let child_id = self.slots[child].as_ref().expect("live child").id.clone();
            let world = self.world_transform(&child_id).expect("child world");
            let object = self.slots[child].as_mut().expect("live child");
            object.transform = Transform::from_matrix(world);
            object.parent = GLOBAL_SLOT;
            self.slots[GLOBAL_SLOT]
                .as_mut()
                .expect("root slot")
                .children
                .push(child);
        }

        let parent = self.slots[slot].as_ref().expect("live slot").parent;
        if let Some(parent_object) = self.slots[parent].as_mut() {
            parent_object.children.retain(|&child| child != slot);
        }
        self.index.remove(id);
        self.slots[slot] = None;
        self.free.push(slot);
        Ok(())
    }

    /// Move `child` under `new_parent`. `World` mode preserves the child's
    /// world transform by rewriting its local one; `Local` keeps the local
    /// transform and lets the world pose change. Cycles (including
    /// self-parenting) are rejected, as is reparenting `$global`. `depth_cap`
    /// bounds the nesting level of the deepest node after the move.
    pub fn reparent(
        &mut self,
        child: &ObjectId,
        new_parent: &ObjectId,
        mode: ReparentMode,
        depth_cap: usize,
    ) -> Result<(), SceneError> {
        if *child == Ident::global() {
            return Err(SceneError::UnreparentableRoot);
        }
        let child_slot = self
            .slot_of(child)
            .ok_or(SceneError::MissingEntity("object"))?;
        let parent_slot = self
            .slot_of(new_parent)
            .ok_or(SceneError::MissingEntity("object"))?;
        if child_slot == parent_slot || self.is_ancestor(child, new_parent) {
            return Err(SceneError::CycleRejected);
        }

        let parent_depth = self.depth(new_parent).expect("parent depth");
        if parent_depth + 1 + self.subtree_height(child_slot) > depth_cap {
            return Err(SceneError::LimitExceeded("nesting"));
        }

        if mode == ReparentMode::World {
            let child_world = self.world_transform(child).expect("child world");
            let parent_world = self.world_transform(new_parent).expect("parent world");
            let local = parent_world.inverse() * child_world;
            self.slots[child_slot].as_mut().expect("live child").transform =
                Transform::from_matrix(local);
        }

        let old_parent = self.slots[child_slot].as_ref().expect("live child").parent;
        if let Some(object) = self.slots[old_parent].as_mut() {
            object.children.retain(|&slot| slot != child_slot);
        }
        self.slots[child_slot].as_mut().expect("live child").parent = parent_slot;
        self.slots[parent_slot]
            .as_mut()
            .expect("live parent")
            .children
            .push(child_slot);
        Ok(())
    }

    /// Height of a subtree: 0 for a leaf.
    fn subtree_height(&self, slot: usize) -> usize {
        let Some(object) = self.slots[slot].as_ref() else {
            return 0;
        };
        object
            .children
            .iter()
            .map(|&child| 1 + self.subtree_height(child))
            .max()
            .unwrap_or(0)
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
