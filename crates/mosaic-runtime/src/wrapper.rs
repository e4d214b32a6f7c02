//! Wrapper/wrapped application pair sharing one slot.

use std::sync::{Arc, Weak};

use mosaic_core::{
    deep_merge, LifecycleCallbacks, LifecycleError, LifecycleResult, LifecycleStage, LifecycleState, MountProps,
    RenderApp,
};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

/// One side of a wrapper pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WrapperSide {
    Wrapper,
    Wrapped,
}

#[derive(Debug)]
struct Sides {
    wrapper: LifecycleState,
    wrapped: LifecycleState,
    last_mounted: Option<WrapperSide>,
    /// The wrapped application is already on the page; mount it directly once.
    wrapped_rendered: bool,
}

/// Combined lifecycle of a wrapper and the application it wraps.
///
/// The wrapper mounts first and receives a [`RenderApp`] handle in its mount
/// props. Calling the handle unmounts the wrapper and mounts the wrapped
/// application in the same slot. Unmounting the pair unmounts whichever side
/// was mounted last.
pub struct WrappedApp {
    wrapper: LifecycleCallbacks,
    wrapped: LifecycleCallbacks,
    wrapper_props: Value,
    sides: Mutex<Sides>,
    this: Weak<Self>,
}

impl WrappedApp {
    /// Pair `wrapper` with the application it wraps.
    pub fn new(wrapper: LifecycleCallbacks, wrapped: LifecycleCallbacks) -> WrappedAppBuilder {
        WrappedAppBuilder {
            wrapper,
            wrapped,
            wrapper_props: Value::Null,
            wrapped_rendered: false,
        }
    }

    /// State of one side.
    pub fn state_of(&self, side: WrapperSide) -> LifecycleState {
        let sides = self.sides.lock();
        match side {
            WrapperSide::Wrapper => sides.wrapper,
            WrapperSide::Wrapped => sides.wrapped,
        }
    }

    /// Side that reached `mounted` last, if still mounted.
    pub fn last_mounted(&self) -> Option<WrapperSide> {
        self.sides.lock().last_mounted
    }

    /// Lifecycle callbacks driving the pair.
    pub fn lifecycle(self: &Arc<Self>) -> LifecycleCallbacks {
        let bootstrap = {
            let app = Arc::clone(self);
            LifecycleStage::from_fn(move |props| {
                let app = app.clone();
                async move { app.bootstrap(props).await }
            })
        };
        let mount = {
            let app = Arc::clone(self);
            LifecycleStage::from_fn(move |props| {
                let app = app.clone();
                async move { app.mount(props).await }
            })
        };
        let unmount = {
            let app = Arc::clone(self);
            LifecycleStage::from_fn(move |props| {
                let app = app.clone();
                async move { app.unmount(props).await }
            })
        };
        LifecycleCallbacks::new(bootstrap, mount, unmount)
    }

    async fn bootstrap(&self, props: MountProps) -> LifecycleResult {
        let side = if self.sides.lock().wrapped_rendered {
            WrapperSide::Wrapped
        } else {
            WrapperSide::Wrapper
        };
        self.bootstrap_side(side, props).await
    }

    async fn bootstrap_side(&self, side: WrapperSide, props: MountProps) -> LifecycleResult {
        if self.state_of(side).is_bootstrapped() {
            return Ok(());
        }
        debug!(app = %props.app_name, ?side, "bootstrapping");
        self.callbacks_of(side).bootstrap.run(props).await?;
        self.set_state(side, LifecycleState::Bootstrapped);
        Ok(())
    }

    async fn mount(&self, props: MountProps) -> LifecycleResult {
        let wrapped_rendered = std::mem::take(&mut self.sides.lock().wrapped_rendered);
        if wrapped_rendered {
            return self.mount_wrapped(props, Value::Null).await;
        }

        self.bootstrap_side(WrapperSide::Wrapper, props.clone()).await?;
        self.set_state(WrapperSide::Wrapper, LifecycleState::Bootstrapped);

        let this = self.this.clone();
        let base = props.clone();
        let render_app = RenderApp::new(move |extra| {
            let this = this.clone();
            let base = base.clone();
            async move {
                match this.upgrade() {
                    Some(app) => app.render_wrapped(base, extra).await,
                    None => Err(LifecycleError::failed("wrapped application dropped")),
                }
            }
        });

        let wrapper_props = MountProps {
            props: deep_merge(&props.props, &self.wrapper_props),
            render_app: Some(render_app),
            ..props
        };
        self.wrapper.mount.run(wrapper_props).await?;

        let mut sides = self.sides.lock();
        if sides.wrapper == LifecycleState::Bootstrapped {
            sides.wrapper = LifecycleState::Mounted;
            sides.last_mounted = Some(WrapperSide::Wrapper);
        }
        Ok(())
    }

    async fn render_wrapped(&self, base: MountProps, extra: Value) -> LifecycleResult {
        // Claim the handover under the lock so a repeated render is a no-op.
        let previous = {
            let mut sides = self.sides.lock();
            match sides.wrapper {
                state @ (LifecycleState::Bootstrapped | LifecycleState::Mounted) => {
                    sides.wrapper = LifecycleState::Unmounted;
                    state
                }
                _ => {
                    debug!(app = %base.app_name, "slot already handed over");
                    return Ok(());
                }
            }
        };

        debug!(app = %base.app_name, "wrapper hands over the slot");
        let props = MountProps {
            render_app: None,
            ..base.clone()
        };
        if let Err(err) = self.wrapper.unmount.run(props).await {
            self.set_state(WrapperSide::Wrapper, previous);
            return Err(err);
        }
        self.mount_wrapped(base, extra).await
    }

    async fn mount_wrapped(&self, base: MountProps, extra: Value) -> LifecycleResult {
        if self.state_of(WrapperSide::Wrapped) == LifecycleState::Mounted {
            return Ok(());
        }
        let props = MountProps {
            props: deep_merge(&base.props, &extra),
            render_app: None,
            ..base
        };
        self.bootstrap_side(WrapperSide::Wrapped, props.clone()).await?;
        self.wrapped.mount.run(props).await?;

        let mut sides = self.sides.lock();
        sides.wrapped = LifecycleState::Mounted;
        sides.last_mounted = Some(WrapperSide::Wrapped);
        Ok(())
    }

    async fn unmount(&self, props: MountProps) -> LifecycleResult {
        let Some(side) = self.sides.lock().last_mounted.take() else {
            return Ok(());
        };
        self.callbacks_of(side).unmount.run(props).await?;
        self.set_state(side, LifecycleState::Unmounted);
        Ok(())
    }

    fn callbacks_of(&self, side: WrapperSide) -> &LifecycleCallbacks {
        match side {
            WrapperSide::Wrapper => &self.wrapper,
            WrapperSide::Wrapped => &self.wrapped,
        }
    }

    fn set_state(&self, side: WrapperSide, state: LifecycleState) {
        let mut sides = self.sides.lock();
        match side {
            WrapperSide::Wrapper => sides.wrapper = state,
            WrapperSide::Wrapped => sides.wrapped = state,
        }
    }
}

impl std::fmt::Debug for WrappedApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedApp")
            .field("sides", &*self.sides.lock())
            .finish()
    }
}

/// Builder for [`WrappedApp`].
#[derive(Debug)]
pub struct WrappedAppBuilder {
    wrapper: LifecycleCallbacks,
    wrapped: LifecycleCallbacks,
    wrapper_props: Value,
    wrapped_rendered: bool,
}

impl WrappedAppBuilder {
    /// Extra props merged into the wrapper's mount props.
    pub fn with_wrapper_props(mut self, props: Value) -> Self {
        self.wrapper_props = props;
        self
    }

    /// Mark the wrapped application as already rendered on the page.
    pub fn with_wrapped_rendered(mut self, rendered: bool) -> Self {
        self.wrapped_rendered = rendered;
        self
    }

    /// Build the shared state machine.
    pub fn build(self) -> Arc<WrappedApp> {
        Arc::new_cyclic(|this| WrappedApp {
            wrapper: self.wrapper,
            wrapped: self.wrapped,
            wrapper_props: self.wrapper_props,
            sides: Mutex::new(Sides {
                wrapper: LifecycleState::Loaded,
                wrapped: LifecycleState::Loaded,
                last_mounted: None,
                wrapped_rendered: self.wrapped_rendered,
            }),
            this: this.clone(),
        })
    }

    /// Build and return the combined callbacks.
    pub fn callbacks(self) -> LifecycleCallbacks {
        self.build().lifecycle()
    }
}
