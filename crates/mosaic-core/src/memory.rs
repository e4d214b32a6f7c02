//! In-memory rendering surface.

use std::collections::{BTreeMap, HashMap};

use futures::channel::mpsc::{self, UnboundedReceiver, UnboundedSender};
use parking_lot::Mutex;

use crate::surface::{MutationRecord, NodeContent, NodeId, RenderSurface, ScrollPosition};

/// Tag of the inline slot configuration marker.
pub const SLOT_CONFIG_TAG: &str = "script";

/// `type` attribute of the inline slot configuration marker.
pub const SLOT_CONFIG_TYPE: &str = "mosaic/slot-config";

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: Option<String>,
    hidden: bool,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

impl Node {
    fn element(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            attrs: BTreeMap::new(),
            text: None,
            hidden: false,
            parent: None,
            children: Vec::new(),
        }
    }

    fn text(content: &str) -> Self {
        Self {
            text: Some(content.to_string()),
            ..Self::element("#text")
        }
    }
}

struct Dom {
    nodes: HashMap<NodeId, Node>,
    head: NodeId,
    body: NodeId,
    next_id: u64,
    scroll: ScrollPosition,
    executed_scripts: Vec<String>,
    observers: HashMap<NodeId, Vec<UnboundedSender<MutationRecord>>>,
}

impl Dom {
    fn new() -> Self {
        let mut dom = Self {
            nodes: HashMap::new(),
            head: NodeId(0),
            body: NodeId(0),
            next_id: 0,
            scroll: ScrollPosition::default(),
            executed_scripts: Vec::new(),
            observers: HashMap::new(),
        };
        dom.head = dom.alloc(Node::element("head"));
        dom.body = dom.alloc(Node::element("body"));
        dom
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(id, node);
        id
    }

    fn append(&mut self, parent: NodeId, mut node: Node) -> NodeId {
        node.parent = Some(parent);
        let id = self.alloc(node);
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children.push(id);
        }
        self.notify(parent, 1, 0);
        id
    }

    fn detach(&mut self, node: NodeId) {
        let parent = self.nodes.get(&node).and_then(|n| n.parent);
        if let Some(parent) = parent {
            if let Some(p) = self.nodes.get_mut(&parent) {
                p.children.retain(|c| *c != node);
            }
            self.notify(parent, 0, 1);
        }
        self.drop_subtree(node);
    }

    fn drop_subtree(&mut self, node: NodeId) {
        if let Some(removed) = self.nodes.remove(&node) {
            self.observers.remove(&node);
            for child in removed.children {
                self.drop_subtree(child);
            }
        }
    }

    fn deep_clone(&mut self, node: NodeId, parent: Option<NodeId>) -> Option<NodeId> {
        let mut copy = self.nodes.get(&node)?.clone();
        let children = std::mem::take(&mut copy.children);
        copy.parent = parent;
        let id = self.alloc(copy);
        for child in children {
            if let Some(cloned) = self.deep_clone(child, Some(id)) {
                if let Some(n) = self.nodes.get_mut(&id) {
                    n.children.push(cloned);
                }
            }
        }
        Some(id)
    }

    fn notify(&mut self, target: NodeId, added: usize, removed: usize) {
        if let Some(senders) = self.observers.get_mut(&target) {
            let record = MutationRecord {
                target,
                added,
                removed,
            };
            senders.retain(|tx| tx.unbounded_send(record.clone()).is_ok());
        }
    }

    fn is_visible(&self, node: &Node) -> bool {
        !node.hidden && node.tag != "script" && node.tag != "style"
    }

    fn find(&self, pred: impl Fn(&Node) -> bool) -> Option<NodeId> {
        let mut ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        ids.sort();
        ids.into_iter()
            .find(|id| self.nodes.get(id).map_or(false, |n| pred(n)))
    }
}

/// A small DOM kept in memory.
///
/// Slots are `div` elements with an `id` equal to the slot name. Stylesheets
/// are `link` elements in the head. Content is added through the
/// `append_*` helpers, which notify observers like a real mutation observer.
pub struct MemorySurface {
    dom: Mutex<Dom>,
}

impl MemorySurface {
    /// Create an empty document.
    pub fn new() -> Self {
        Self {
            dom: Mutex::new(Dom::new()),
        }
    }

    /// The document body.
    pub fn body(&self) -> NodeId {
        self.dom.lock().body
    }

    /// Add a slot element to the body.
    pub fn add_slot(&self, slot: &str) -> NodeId {
        let mut dom = self.dom.lock();
        let body = dom.body;
        let mut node = Node::element("div");
        node.attrs.insert("id".to_string(), slot.to_string());
        node.attrs.insert("class".to_string(), "mosaic-slot".to_string());
        dom.append(body, node)
    }

    /// Put an inline configuration marker into a slot.
    pub fn add_slot_config(&self, slot: &str, json: &str) -> Option<NodeId> {
        let slot_id = self.slot_element(slot)?;
        let mut dom = self.dom.lock();
        let mut node = Node::element(SLOT_CONFIG_TAG);
        node.attrs.insert("type".to_string(), SLOT_CONFIG_TYPE.to_string());
        node.text = Some(json.to_string());
        Some(dom.append(slot_id, node))
    }

    /// Append a text node.
    pub fn append_text(&self, parent: NodeId, text: &str) -> NodeId {
        self.dom.lock().append(parent, Node::text(text))
    }

    /// Append an element.
    pub fn append_element(&self, parent: NodeId, tag: &str, visible: bool) -> NodeId {
        let mut node = Node::element(tag);
        node.hidden = !visible;
        self.dom.lock().append(parent, node)
    }

    /// Remove every child of a node.
    pub fn clear_children(&self, node: NodeId) {
        let mut dom = self.dom.lock();
        let children = dom
            .nodes
            .get_mut(&node)
            .map(|n| std::mem::take(&mut n.children))
            .unwrap_or_default();
        let removed = children.len();
        for child in children {
            dom.drop_subtree(child);
        }
        if removed > 0 {
            dom.notify(node, 0, removed);
        }
    }

    /// Whether a node is still attached.
    pub fn contains(&self, node: NodeId) -> bool {
        self.dom.lock().nodes.contains_key(&node)
    }

    /// Whether a node is hidden.
    pub fn is_hidden(&self, node: NodeId) -> bool {
        self.dom.lock().nodes.get(&node).map_or(false, |n| n.hidden)
    }

    /// Attribute of a node.
    pub fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.dom.lock().nodes.get(&node)?.attrs.get(name).cloned()
    }

    /// Text of a node (markup for inserted fragments).
    pub fn text(&self, node: NodeId) -> Option<String> {
        self.dom.lock().nodes.get(&node)?.text.clone()
    }

    /// Node ids of the children of `node`.
    pub fn child_ids(&self, node: NodeId) -> Vec<NodeId> {
        self.dom
            .lock()
            .nodes
            .get(&node)
            .map(|n| n.children.clone())
            .unwrap_or_default()
    }

    /// Sibling following `node`.
    pub fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let dom = self.dom.lock();
        let parent = dom.nodes.get(&node)?.parent?;
        let siblings = &dom.nodes.get(&parent)?.children;
        let pos = siblings.iter().position(|c| *c == node)?;
        siblings.get(pos + 1).copied()
    }

    /// Scripts executed so far, in order.
    pub fn executed_scripts(&self) -> Vec<String> {
        self.dom.lock().executed_scripts.clone()
    }

    /// Number of stylesheet links in the head.
    pub fn stylesheet_count(&self) -> usize {
        let dom = self.dom.lock();
        let head = dom.head;
        dom.nodes
            .get(&head)
            .map(|h| {
                h.children
                    .iter()
                    .filter(|c| dom.nodes.get(*c).map_or(false, |n| n.tag == "link"))
                    .count()
            })
            .unwrap_or(0)
    }
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemorySurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySurface")
            .field("nodes", &self.dom.lock().nodes.len())
            .finish()
    }
}

impl RenderSurface for MemorySurface {
    fn slot_element(&self, slot: &str) -> Option<NodeId> {
        self.dom.lock().find(|n| {
            n.tag == "div" && n.attrs.get("id").map_or(false, |id| id == slot)
        })
    }

    fn children(&self, node: NodeId) -> Vec<NodeContent> {
        let dom = self.dom.lock();
        let Some(parent) = dom.nodes.get(&node) else {
            return Vec::new();
        };
        parent
            .children
            .iter()
            .filter_map(|c| dom.nodes.get(c))
            .map(|child| match &child.text {
                Some(text) if child.tag == "#text" => NodeContent::Text(text.clone()),
                _ => NodeContent::Element {
                    tag: child.tag.clone(),
                    visible: dom.is_visible(child),
                },
            })
            .collect()
    }

    fn observe(&self, node: NodeId) -> UnboundedReceiver<MutationRecord> {
        let (tx, rx) = mpsc::unbounded();
        self.dom.lock().observers.entry(node).or_default().push(tx);
        rx
    }

    fn clone_after(&self, node: NodeId) -> Option<NodeId> {
        let mut dom = self.dom.lock();
        let parent = dom.nodes.get(&node)?.parent?;
        let clone = dom.deep_clone(node, Some(parent))?;
        if let Some(c) = dom.nodes.get_mut(&clone) {
            c.attrs.remove("id");
            c.attrs.remove("class");
        }
        if let Some(p) = dom.nodes.get_mut(&parent) {
            let pos = p.children.iter().position(|c| *c == node).map_or(p.children.len(), |i| i + 1);
            p.children.insert(pos, clone);
        }
        Some(clone)
    }

    fn set_hidden(&self, node: NodeId, hidden: bool) {
        if let Some(n) = self.dom.lock().nodes.get_mut(&node) {
            n.hidden = hidden;
        }
    }

    fn remove_node(&self, node: NodeId) {
        self.dom.lock().detach(node);
    }

    fn scroll_position(&self) -> ScrollPosition {
        self.dom.lock().scroll
    }

    fn scroll_to(&self, position: ScrollPosition) {
        self.dom.lock().scroll = position;
    }

    fn insert_markup(&self, markup: &str) -> NodeId {
        let mut dom = self.dom.lock();
        let body = dom.body;
        let mut node = Node::element("div");
        node.text = Some(markup.to_string());
        dom.append(body, node)
    }

    fn execute_script(&self, parent: NodeId, source: &str) {
        let mut dom = self.dom.lock();
        let mut node = Node::element("script");
        node.text = Some(source.to_string());
        dom.append(parent, node);
        dom.executed_scripts.push(source.to_string());
    }

    fn find_stylesheet(&self, href: &str) -> Option<NodeId> {
        self.dom.lock().find(|n| {
            n.tag == "link" && n.attrs.get("href").map_or(false, |h| h == href)
        })
    }

    fn insert_stylesheet(&self, href: &str) -> NodeId {
        let mut dom = self.dom.lock();
        let head = dom.head;
        let mut node = Node::element("link");
        node.attrs.insert("rel".to_string(), "stylesheet".to_string());
        node.attrs.insert("href".to_string(), href.to_string());
        dom.append(head, node)
    }

    fn take_slot_config(&self, slot: &str) -> Option<String> {
        let slot_id = self.slot_element(slot)?;
        let mut dom = self.dom.lock();
        let marker = dom.nodes.get(&slot_id)?.children.iter().copied().find(|c| {
            dom.nodes.get(c).map_or(false, |n| {
                n.tag == SLOT_CONFIG_TAG
                    && n.attrs.get("type").map_or(false, |t| t == SLOT_CONFIG_TYPE)
            })
        })?;
        let text = dom.nodes.get(&marker).and_then(|n| n.text.clone());
        dom.detach(marker);
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_slot_lookup() {
        let surface = MemorySurface::new();
        let navbar = surface.add_slot("navbar");

        assert_eq!(surface.slot_element("navbar"), Some(navbar));
        assert_eq!(surface.slot_element("footer"), None);
    }

    #[test]
    fn test_children_visibility() {
        let surface = MemorySurface::new();
        let slot = surface.add_slot("body");
        surface.append_text(slot, "  ");
        surface.append_element(slot, "div", false);
        surface.append_element(slot, "p", true);

        let children = surface.children(slot);

        assert_eq!(children.len(), 3);
        assert!(!children[0].is_meaningful());
        assert!(!children[1].is_meaningful());
        assert!(children[2].is_meaningful());
    }

    #[test]
    fn test_clone_after_strips_identity() {
        let surface = MemorySurface::new();
        let slot = surface.add_slot("body");
        surface.append_text(slot, "old content");

        let clone = surface.clone_after(slot).unwrap();

        assert_eq!(surface.next_sibling(slot), Some(clone));
        assert_eq!(surface.attribute(clone, "id"), None);
        assert_eq!(surface.attribute(clone, "class"), None);
        assert_eq!(surface.children(clone), vec![NodeContent::Text("old content".into())]);
        assert_eq!(surface.slot_element("body"), Some(slot));
    }

    #[tokio::test]
    async fn test_observe_reports_mutations() {
        let surface = MemorySurface::new();
        let slot = surface.add_slot("body");
        let mut rx = surface.observe(slot);

        surface.append_element(slot, "div", true);
        surface.clear_children(slot);

        let first = rx.next().await.unwrap();
        assert_eq!(first.added, 1);
        let second = rx.next().await.unwrap();
        assert_eq!(second.removed, 1);
    }

    #[test]
    fn test_stylesheets() {
        let surface = MemorySurface::new();
        let link = surface.insert_stylesheet("/a.css");

        assert_eq!(surface.find_stylesheet("/a.css"), Some(link));
        assert_eq!(surface.stylesheet_count(), 1);

        surface.remove_node(link);

        assert_eq!(surface.find_stylesheet("/a.css"), None);
        assert!(!surface.contains(link));
    }

    #[test]
    fn test_take_slot_config_consumes_marker() {
        let surface = MemorySurface::new();
        surface.add_slot("footer");
        surface.add_slot_config("footer", r#"{"css_bundle": "/f.css"}"#);

        assert_eq!(surface.take_slot_config("footer").as_deref(), Some(r#"{"css_bundle": "/f.css"}"#));
        assert_eq!(surface.take_slot_config("footer"), None);
    }

    #[test]
    fn test_execute_script_records() {
        let surface = MemorySurface::new();
        let host = surface.insert_markup("<div class=\"spinner\"></div>");
        surface.execute_script(host, "console.log(1)");

        assert_eq!(surface.executed_scripts(), vec!["console.log(1)"]);
        assert_eq!(surface.child_ids(host).len(), 1);
    }
}
