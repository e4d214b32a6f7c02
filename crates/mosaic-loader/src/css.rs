//! Stylesheet reference counting.
//!
//! Several fragments (or several instances of one fragment) may share a
//! stylesheet. The link stays in the page while at least one of them is
//! mounted. Removal of an unused link is deferred while a route change is in
//! flight so the outgoing content keeps its styles until the slots settle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use mosaic_core::{
    CssSettings, LifecycleCallbacks, LifecycleStage, MountProps, NodeId, PageEvent, PageEventBus,
    RenderSurface, SubscriptionId,
};
use parking_lot::Mutex;
use tracing::debug;

use crate::module::LoadError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Usage {
    count: usize,
    pending_removal: bool,
}

/// Tracks stylesheet usage across fragment mounts.
pub struct CssTracker {
    surface: Arc<dyn RenderSurface>,
    usage: Mutex<HashMap<String, Usage>>,
    routing: AtomicBool,
    delay_removal: bool,
}

impl CssTracker {
    /// Create a tracker.
    pub fn new(surface: Arc<dyn RenderSurface>, settings: &CssSettings) -> Self {
        Self {
            surface,
            usage: Mutex::new(HashMap::new()),
            routing: AtomicBool::new(false),
            delay_removal: settings.delay_removal,
        }
    }

    /// Follow route changes on the page bus.
    ///
    /// Between `BeforeRouting` and `SlotsSettled` removals are deferred; pending
    /// removals are flushed once the slots settle.
    pub fn attach(self: &Arc<Self>, bus: &PageEventBus) -> SubscriptionId {
        let tracker = Arc::clone(self);
        bus.subscribe(move |event| match event {
            PageEvent::BeforeRouting => tracker.routing.store(true, Ordering::SeqCst),
            PageEvent::SlotsSettled => {
                tracker.routing.store(false, Ordering::SeqCst);
                tracker.flush_pending();
            }
            _ => {}
        })
    }

    /// Record a mount of a fragment using `href`.
    pub fn mount(&self, href: &str) {
        let mut usage = self.usage.lock();
        let entry = usage.entry(href.to_string()).or_default();
        if entry.count == 0 && self.surface.find_stylesheet(href).is_none() {
            self.surface.insert_stylesheet(href);
            debug!(href, "stylesheet inserted");
        }
        entry.count += 1;
        entry.pending_removal = false;
    }

    /// Record an unmount of a fragment using `href`.
    pub fn unmount(&self, href: &str) {
        let mut usage = self.usage.lock();
        let Some(entry) = usage.get_mut(href) else {
            return;
        };
        entry.count = entry.count.saturating_sub(1);
        if entry.count > 0 {
            return;
        }

        if self.delay_removal || self.routing.load(Ordering::SeqCst) {
            entry.pending_removal = true;
            debug!(href, "stylesheet removal deferred");
        } else {
            usage.remove(href);
            self.remove_link(href);
        }
    }

    /// Remove links that are still unused.
    pub fn flush_pending(&self) {
        let mut usage = self.usage.lock();
        let stale: Vec<String> = usage
            .iter()
            .filter(|(_, u)| u.pending_removal && u.count == 0)
            .map(|(href, _)| href.clone())
            .collect();
        for href in stale {
            usage.remove(&href);
            self.remove_link(&href);
        }
    }

    /// Insert a link ahead of the first mount.
    ///
    /// Fails with [`LoadError::StylesheetAlreadyLoaded`] when the link exists.
    pub fn preload(&self, href: &str) -> Result<NodeId, LoadError> {
        if self.surface.find_stylesheet(href).is_some() {
            return Err(LoadError::StylesheetAlreadyLoaded(href.to_string()));
        }
        Ok(self.surface.insert_stylesheet(href))
    }

    /// Current number of mounted users of a stylesheet.
    pub fn usage_count(&self, href: &str) -> usize {
        self.usage.lock().get(href).map_or(0, |u| u.count)
    }

    /// Whether removal of an unused stylesheet is waiting for the slots to settle.
    pub fn is_pending_removal(&self, href: &str) -> bool {
        self.usage.lock().get(href).map_or(false, |u| u.pending_removal)
    }

    /// Decorate callbacks so mounts and unmounts track `href`.
    pub fn decorate(self: &Arc<Self>, callbacks: LifecycleCallbacks, href: &str) -> LifecycleCallbacks {
        CssTrackedApp::new(Arc::clone(self), href).decorate(callbacks)
    }

    fn remove_link(&self, href: &str) {
        if let Some(link) = self.surface.find_stylesheet(href) {
            self.surface.remove_node(link);
            debug!(href, "stylesheet removed");
        }
    }
}

impl std::fmt::Debug for CssTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CssTracker")
            .field("tracked", &self.usage.lock().len())
            .field("delay_removal", &self.delay_removal)
            .finish()
    }
}

/// Callbacks decorator binding a fragment to its stylesheet.
#[derive(Debug, Clone)]
pub struct CssTrackedApp {
    tracker: Arc<CssTracker>,
    href: String,
}

impl CssTrackedApp {
    /// Create a decorator for `href`.
    pub fn new(tracker: Arc<CssTracker>, href: impl Into<String>) -> Self {
        Self {
            tracker,
            href: href.into(),
        }
    }

    /// The stylesheet URL.
    pub fn href(&self) -> &str {
        &self.href
    }

    /// Wrap mount and unmount; `create_new` results are decorated too.
    pub fn decorate(&self, callbacks: LifecycleCallbacks) -> LifecycleCallbacks {
        let LifecycleCallbacks {
            bootstrap,
            mount,
            unmount,
            create_new,
        } = callbacks;

        let this = self.clone();
        let mount = LifecycleStage::from_fn(move |props: MountProps| {
            let this = this.clone();
            let mount = mount.clone();
            async move {
                this.tracker.mount(&this.href);
                mount.run(props).await
            }
        });

        let this = self.clone();
        let unmount = LifecycleStage::from_fn(move |props: MountProps| {
            let this = this.clone();
            let unmount = unmount.clone();
            async move {
                let result = unmount.run(props).await;
                this.tracker.unmount(&this.href);
                result
            }
        });

        let decorated = LifecycleCallbacks::new(bootstrap, mount, unmount);
        match create_new {
            Some(create) => {
                let this = self.clone();
                decorated.with_create_new(move |props| {
                    let this = this.clone();
                    let create = create.clone();
                    async move {
                        let callbacks = create(props).await?;
                        Ok(this.decorate(callbacks))
                    }
                })
            }
            None => decorated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mosaic_core::{LifecycleError, MemorySurface};
    use serde_json::json;

    const HREF: &str = "/navbar.css";

    fn tracker() -> (Arc<MemorySurface>, Arc<CssTracker>) {
        let surface = Arc::new(MemorySurface::new());
        let tracker = Arc::new(CssTracker::new(surface.clone(), &CssSettings::default()));
        (surface, tracker)
    }

    // === Reference Counting Tests ===

    #[test]
    fn test_mount_twice_unmount_once_keeps_link() {
        let (surface, tracker) = tracker();

        tracker.mount(HREF);
        tracker.mount(HREF);
        assert_eq!(tracker.usage_count(HREF), 2);
        assert_eq!(surface.stylesheet_count(), 1);

        tracker.unmount(HREF);

        assert_eq!(tracker.usage_count(HREF), 1);
        assert!(surface.find_stylesheet(HREF).is_some());
    }

    #[test]
    fn test_last_unmount_removes_link() {
        let (surface, tracker) = tracker();

        tracker.mount(HREF);
        tracker.unmount(HREF);
        tracker.unmount(HREF);

        assert_eq!(tracker.usage_count(HREF), 0);
        assert!(surface.find_stylesheet(HREF).is_none());
    }

    #[test]
    fn test_mount_adopts_existing_link() {
        let (surface, tracker) = tracker();
        tracker.preload(HREF).unwrap();

        tracker.mount(HREF);

        assert_eq!(surface.stylesheet_count(), 1);
        assert_eq!(tracker.usage_count(HREF), 1);
    }

    #[test]
    fn test_preload_conflict() {
        let (_, tracker) = tracker();
        tracker.preload(HREF).unwrap();

        assert_eq!(
            tracker.preload(HREF),
            Err(LoadError::StylesheetAlreadyLoaded(HREF.to_string()))
        );
    }

    // === Deferred Removal Tests ===

    #[test]
    fn test_removal_deferred_during_routing() {
        let (surface, tracker) = tracker();
        let bus = PageEventBus::new();
        tracker.attach(&bus);

        tracker.mount(HREF);
        bus.emit(PageEvent::BeforeRouting);
        tracker.unmount(HREF);

        assert!(tracker.is_pending_removal(HREF));
        assert!(surface.find_stylesheet(HREF).is_some());

        bus.emit(PageEvent::SlotsSettled);

        assert!(surface.find_stylesheet(HREF).is_none());
        assert!(!tracker.is_pending_removal(HREF));
    }

    #[test]
    fn test_remount_cancels_pending_removal() {
        let (surface, tracker) = tracker();
        let bus = PageEventBus::new();
        tracker.attach(&bus);

        tracker.mount(HREF);
        bus.emit(PageEvent::BeforeRouting);
        tracker.unmount(HREF);
        tracker.mount(HREF);
        bus.emit(PageEvent::SlotsSettled);

        assert_eq!(tracker.usage_count(HREF), 1);
        assert_eq!(surface.stylesheet_count(), 1);
    }

    #[test]
    fn test_delay_removal_setting() {
        let surface = Arc::new(MemorySurface::new());
        let tracker = CssTracker::new(surface.clone(), &CssSettings { delay_removal: true });

        tracker.mount(HREF);
        tracker.unmount(HREF);

        assert!(tracker.is_pending_removal(HREF));
        tracker.flush_pending();
        assert!(surface.find_stylesheet(HREF).is_none());
    }

    // === Decorator Tests ===

    #[tokio::test]
    async fn test_decorated_callbacks_track_stylesheet() {
        let (surface, tracker) = tracker();
        let callbacks = tracker.decorate(LifecycleCallbacks::noop(), HREF);

        callbacks.mount.run(MountProps::default()).await.unwrap();
        assert_eq!(tracker.usage_count(HREF), 1);

        callbacks.unmount.run(MountProps::default()).await.unwrap();
        assert!(surface.find_stylesheet(HREF).is_none());
    }

    #[tokio::test]
    async fn test_unmount_failure_still_releases_stylesheet() {
        let (_, tracker) = tracker();
        let failing = LifecycleCallbacks::new(
            LifecycleStage::new(),
            LifecycleStage::new(),
            LifecycleStage::from_fn(|_| async { Err(LifecycleError::failed("boom")) }),
        );
        let callbacks = tracker.decorate(failing, HREF);

        callbacks.mount.run(MountProps::default()).await.unwrap();
        assert!(callbacks.unmount.run(MountProps::default()).await.is_err());
        assert_eq!(tracker.usage_count(HREF), 0);
    }

    #[tokio::test]
    async fn test_create_new_is_decorated() {
        let (_, tracker) = tracker();
        let callbacks = LifecycleCallbacks::noop()
            .with_create_new(|_| async { Ok(LifecycleCallbacks::noop()) });
        let decorated = tracker.decorate(callbacks, HREF);

        let create = decorated.create_new.clone().unwrap();
        let instance = create(json!({})).await.unwrap();
        instance.mount.run(MountProps::default()).await.unwrap();

        assert_eq!(tracker.usage_count(HREF), 1);
    }
}
