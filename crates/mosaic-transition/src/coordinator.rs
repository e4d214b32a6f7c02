//! Transition coordination.
//!
//! A transition starts with the first routing signal or page transaction and
//! settles once every blocker has resolved. Blockers are spawned tasks: slot
//! content observers, the spinner's minimum-visible timer and arbitrary async
//! actions. On settle the inert slot copies are dropped, hidden slots are shown
//! again, the spinner is removed and the scroll position is restored.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Weak};

use futures::StreamExt;
use mosaic_core::{
    NodeContent, NodeId, PageEvent, PageEventBus, RenderSurface, ScrollPosition, SpinnerSettings,
};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::effect::SlotEffect;
use crate::error::TransitionError;
use crate::spinner::SpinnerMarkup;

/// Identifier of a pending blocker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockerId(u64);

#[derive(Default)]
struct State {
    next_blocker: u64,
    blockers: HashSet<BlockerId>,
    in_transition: bool,
    fake_slots: Vec<NodeId>,
    hidden_slots: Vec<NodeId>,
    spinner: Option<NodeId>,
    spinner_timer: Option<JoinHandle<()>>,
    scroll: Option<ScrollPosition>,
}

/// Coordinates slot transitions and the page spinner.
pub struct TransitionCoordinator {
    surface: Arc<dyn RenderSurface>,
    bus: Arc<PageEventBus>,
    spinner: SpinnerSettings,
    state: Mutex<State>,
    this: Weak<Self>,
}

impl TransitionCoordinator {
    /// Create a coordinator and subscribe it to the routing signals of `bus`.
    pub fn new(surface: Arc<dyn RenderSurface>, bus: Arc<PageEventBus>, spinner: SpinnerSettings) -> Arc<Self> {
        let coordinator = Arc::new_cyclic(|this| Self {
            surface,
            bus: bus.clone(),
            spinner,
            state: Mutex::new(State::default()),
            this: this.clone(),
        });

        let weak = Arc::downgrade(&coordinator);
        bus.subscribe(move |event| {
            let Some(coordinator) = weak.upgrade() else {
                return;
            };
            match event {
                PageEvent::BeforeRouting => coordinator.begin_transition(),
                PageEvent::AppChange => coordinator.on_app_change(),
                _ => {}
            }
        });

        coordinator
    }

    /// Prepare a slot for what the pending routing decision does to it.
    pub fn handle_page_transaction(&self, slot: &str, effect: SlotEffect) -> Result<(), TransitionError> {
        if slot.is_empty() {
            return Err(TransitionError::MissingSlotName);
        }
        if effect == SlotEffect::Default {
            return Ok(());
        }

        let node = self
            .surface
            .slot_element(slot)
            .ok_or_else(|| TransitionError::SlotNotFound(slot.to_string()))?;

        debug!(slot, %effect, "page transaction");
        self.begin_transition();
        if effect.removes() {
            self.keep_copy(slot, node);
        }
        if effect.renders() {
            self.await_content(slot, node);
        }
        Ok(())
    }

    /// Hold the transition open until `action` completes.
    pub fn handle_async_action<F>(&self, action: F) -> BlockerId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.begin_transition();
        self.add_blocker(action)
    }

    /// Activation decisions of a cycle have been applied.
    ///
    /// Settles right away when nothing is pending.
    pub fn on_app_change(&self) {
        let idle = {
            let state = self.state.lock();
            state.in_transition && state.blockers.is_empty()
        };
        if idle {
            self.settle();
        }
    }

    /// Number of pending blockers.
    pub fn pending_blockers(&self) -> usize {
        self.state.lock().blockers.len()
    }

    /// Whether no transition is in progress.
    pub fn is_settled(&self) -> bool {
        !self.state.lock().in_transition
    }

    /// The spinner node, while shown.
    pub fn spinner_node(&self) -> Option<NodeId> {
        self.state.lock().spinner
    }

    /// Inert slot copies currently on the page.
    pub fn fake_slots(&self) -> Vec<NodeId> {
        self.state.lock().fake_slots.clone()
    }

    fn begin_transition(&self) {
        let mut state = self.state.lock();
        if !state.in_transition {
            state.in_transition = true;
            state.scroll = Some(self.surface.scroll_position());
        }
    }

    fn keep_copy(&self, slot: &str, node: NodeId) {
        let Some(copy) = self.surface.clone_after(node) else {
            warn!(slot, "slot could not be copied");
            return;
        };
        self.surface.set_hidden(node, true);

        let mut state = self.state.lock();
        state.fake_slots.push(copy);
        state.hidden_slots.push(node);
    }

    fn await_content(&self, slot: &str, node: NodeId) {
        let mut mutations = self.surface.observe(node);
        let surface = Arc::clone(&self.surface);
        let slot = slot.to_string();

        self.add_blocker(async move {
            while let Some(record) = mutations.next().await {
                if record.added == 0 {
                    continue;
                }
                if surface.children(node).iter().any(NodeContent::is_meaningful) {
                    debug!(slot = %slot, "slot content rendered");
                    return;
                }
            }
            debug!(slot = %slot, "slot observer closed");
        });
    }

    fn add_blocker<F>(&self, blocker: F) -> BlockerId
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let (id, first) = {
            let mut state = self.state.lock();
            let id = BlockerId(state.next_blocker);
            state.next_blocker += 1;
            state.blockers.insert(id);
            (id, state.blockers.len() == 1)
        };
        if first {
            self.start_spinner_timer();
        }

        let this = self.this.clone();
        tokio::spawn(async move {
            blocker.await;
            if let Some(coordinator) = this.upgrade() {
                coordinator.remove_blocker(id);
            }
        });
        id
    }

    fn remove_blocker(&self, id: BlockerId) {
        let empty = {
            let mut state = self.state.lock();
            state.blockers.remove(&id);
            state.blockers.is_empty()
        };
        if empty {
            self.settle();
        }
    }

    fn start_spinner_timer(&self) {
        if !self.spinner.enabled {
            return;
        }

        let mut state = self.state.lock();
        if state.spinner_timer.is_some() || state.spinner.is_some() {
            return;
        }

        let this = self.this.clone();
        let delay = self.spinner.show_after();
        state.spinner_timer = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(coordinator) = this.upgrade() {
                coordinator.show_spinner();
            }
        }));
    }

    fn show_spinner(&self) {
        {
            let mut state = self.state.lock();
            state.spinner_timer = None;
            if state.blockers.is_empty() || state.spinner.is_some() {
                return;
            }

            let spinner = SpinnerMarkup::from_settings(&self.spinner);
            let node = self.surface.insert_markup(&spinner.markup);
            for script in &spinner.scripts {
                self.surface.execute_script(node, script);
            }
            state.spinner = Some(node);
        }

        debug!("spinner shown");
        let min_visible = self.spinner.min_visible();
        self.add_blocker(tokio::time::sleep(min_visible));
    }

    fn settle(&self) {
        let (fake_slots, hidden_slots, spinner, timer, scroll) = {
            let mut state = self.state.lock();
            if !state.in_transition || !state.blockers.is_empty() {
                return;
            }
            state.in_transition = false;
            (
                std::mem::take(&mut state.fake_slots),
                std::mem::take(&mut state.hidden_slots),
                state.spinner.take(),
                state.spinner_timer.take(),
                state.scroll.take(),
            )
        };

        if let Some(timer) = timer {
            timer.abort();
        }
        for copy in fake_slots {
            self.surface.remove_node(copy);
        }
        for node in hidden_slots {
            self.surface.set_hidden(node, false);
        }
        if let Some(spinner) = spinner {
            self.surface.remove_node(spinner);
        }
        if let Some(scroll) = scroll {
            self.surface.scroll_to(scroll);
        }

        debug!("slots settled");
        self.bus.emit(PageEvent::SlotsSettled);
    }
}

impl std::fmt::Debug for TransitionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TransitionCoordinator")
            .field("blockers", &state.blockers.len())
            .field("in_transition", &state.in_transition)
            .field("spinner", &state.spinner)
            .finish()
    }
}
