//! Arena-backed doubly linked lists.
//!
//! Nodes live in a single [`Arena`] and are addressed by [`NodeId`]. Several
//! [`List`]s can thread through the same arena, which is what lets the
//! eviction list move an entry between its active and inactive segments by
//! relinking it instead of reallocating it.
//!
//! A node must be linked into at most one list at a time. The owning
//! structure is responsible for remembering which list that is.

use core::fmt;

/// Index of a node inside an [`Arena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

#[derive(Debug, Default, Clone, Copy)]
struct Links {
    prev: Option<NodeId>,
    next: Option<NodeId>,
}

struct Slot<T> {
    value: T,
    links: Links,
}

/// Slab storage for list nodes. Freed slots are recycled.
pub(crate) struct Arena<T> {
    slots: Vec<Option<Slot<T>>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Arena<T> {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Stores `value` in a detached node and returns its id.
    pub(crate) fn insert(&mut self, value: T) -> NodeId {
        let slot = Slot {
            value,
            links: Links::default(),
        };
        self.len += 1;
        match self.free.pop() {
            Some(idx) => {
                self.slots[idx] = Some(slot);
                NodeId(idx)
            }
            None => {
                self.slots.push(Some(slot));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    /// Frees a node. The node must already be unlinked from its list.
    pub(crate) fn remove(&mut self, id: NodeId) -> Option<T> {
        let slot = self.slots.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        self.len -= 1;
        Some(slot.value)
    }

    pub(crate) fn get(&self, id: NodeId) -> Option<&T> {
        self.slot(id).map(|s| &s.value)
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .map(|s| &mut s.value)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.len = 0;
    }

    fn slot(&self, id: NodeId) -> Option<&Slot<T>> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    fn links(&self, id: NodeId) -> Links {
        self.slot(id).map(|s| s.links).unwrap_or_default()
    }

    fn links_mut(&mut self, id: NodeId) -> Option<&mut Links> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .map(|s| &mut s.links)
    }
}

impl<T> fmt::Debug for Arena<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arena")
            .field("len", &self.len)
            .field("slots", &self.slots.len())
            .finish()
    }
}

/// A doubly linked list of arena nodes. Front is most recently used.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct List {
    head: Option<NodeId>,
    tail: Option<NodeId>,
    len: usize,
}

impl List {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Least recently used node.
    pub(crate) fn back(&self) -> Option<NodeId> {
        self.tail
    }

    /// Node linked before `id` (towards the front).
    pub(crate) fn prev<T>(arena: &Arena<T>, id: NodeId) -> Option<NodeId> {
        arena.links(id).prev
    }

    /// Links a detached node at the front.
    pub(crate) fn push_front<T>(&mut self, arena: &mut Arena<T>, id: NodeId) {
        let old_head = self.head;
        if let Some(links) = arena.links_mut(id) {
            links.prev = None;
            links.next = old_head;
        }
        match old_head {
            Some(head) => {
                if let Some(links) = arena.links_mut(head) {
                    links.prev = Some(id);
                }
            }
            None => self.tail = Some(id),
        }
        self.head = Some(id);
        self.len += 1;
    }

    /// Detaches `id` from this list, leaving the node allocated.
    pub(crate) fn unlink<T>(&mut self, arena: &mut Arena<T>, id: NodeId) {
        let Links { prev, next } = arena.links(id);
        match prev {
            Some(p) => {
                if let Some(links) = arena.links_mut(p) {
                    links.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(links) = arena.links_mut(n) {
                    links.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(links) = arena.links_mut(id) {
            *links = Links::default();
        }
        self.len -= 1;
    }

    pub(crate) fn move_to_front<T>(&mut self, arena: &mut Arena<T>, id: NodeId) {
        if self.head == Some(id) {
            return;
        }
        self.unlink(arena, id);
        self.push_front(arena, id);
    }

    /// Forgets all links. The arena must be cleared separately.
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Walks from back to front.
    #[cfg(test)]
    pub(crate) fn ids_from_back<T>(&self, arena: &Arena<T>) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.len);
        let mut cursor = self.tail;
        while let Some(id) = cursor {
            out.push(id);
            cursor = Self::prev(arena, id);
        }
        out
    }
}
