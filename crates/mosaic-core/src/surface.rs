//! The rendering surface the engine manipulates.
//!
//! In a browser this is the DOM. The engine only needs a handful of
//! operations on it, all expressed here; [`crate::MemorySurface`] is an
//! in-memory implementation.

use std::fmt;

use futures::channel::mpsc::UnboundedReceiver;

/// Opaque handle to a node of the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a child node looks like to the settle predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeContent {
    /// A text node.
    Text(String),
    /// An element, with its computed visibility.
    Element { tag: String, visible: bool },
}

impl NodeContent {
    /// Whether this node shows something to the user.
    pub fn is_meaningful(&self) -> bool {
        match self {
            Self::Text(text) => !text.trim().is_empty(),
            Self::Element { visible, .. } => *visible,
        }
    }
}

/// A change observed under a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// The observed node.
    pub target: NodeId,
    /// Number of children added by this change.
    pub added: usize,
    /// Number of children removed by this change.
    pub removed: usize,
}

/// Document scroll offset.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

impl ScrollPosition {
    /// Create a new position.
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Operations the engine performs on the page.
pub trait RenderSurface: Send + Sync {
    /// Element hosting a slot.
    fn slot_element(&self, slot: &str) -> Option<NodeId>;

    /// Direct children of a node.
    fn children(&self, node: NodeId) -> Vec<NodeContent>;

    /// Subscribe to child-list changes of a node. Dropping the receiver
    /// disconnects the observer.
    fn observe(&self, node: NodeId) -> UnboundedReceiver<MutationRecord>;

    /// Deep-clone a node without its `id` and `class` attributes and insert the
    /// clone right after the original.
    fn clone_after(&self, node: NodeId) -> Option<NodeId>;

    /// Hide or show a node.
    fn set_hidden(&self, node: NodeId, hidden: bool);

    /// Detach a node.
    fn remove_node(&self, node: NodeId);

    /// Current scroll offset.
    fn scroll_position(&self) -> ScrollPosition;

    /// Scroll the document.
    fn scroll_to(&self, position: ScrollPosition);

    /// Append markup to the document body. Scripts inside it do not run.
    fn insert_markup(&self, markup: &str) -> NodeId;

    /// Run a script, inserted as a child of `parent`.
    fn execute_script(&self, parent: NodeId, source: &str);

    /// Stylesheet link with the given href.
    fn find_stylesheet(&self, href: &str) -> Option<NodeId>;

    /// Insert a stylesheet link into the document head.
    fn insert_stylesheet(&self, href: &str) -> NodeId;

    /// Remove and return the inline configuration marker of a slot.
    fn take_slot_config(&self, slot: &str) -> Option<String>;
}
