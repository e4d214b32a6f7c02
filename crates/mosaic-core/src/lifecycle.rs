//! Fragment lifecycle callbacks.
//!
//! A fragment exposes three stages: bootstrap, mount and unmount. Each stage
//! is an ordered sequence of async steps run one after another; an empty
//! sequence is a no-op.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde_json::Value;

/// Lifecycle state of an application instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LifecycleState {
    #[default]
    NotLoaded,
    Loaded,
    Bootstrapped,
    Mounted,
    Unmounted,
    /// Loading or a lifecycle step failed; the slot is left empty.
    Broken,
}

impl LifecycleState {
    /// Whether bootstrap already ran for this instance.
    pub fn is_bootstrapped(&self) -> bool {
        matches!(self, Self::Bootstrapped | Self::Mounted | Self::Unmounted)
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::NotLoaded => "not-loaded",
            Self::Loaded => "loaded",
            Self::Bootstrapped => "bootstrapped",
            Self::Mounted => "mounted",
            Self::Unmounted => "unmounted",
            Self::Broken => "broken",
        };
        write!(f, "{}", name)
    }
}

/// Lifecycle stage names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Load,
    Bootstrap,
    Mount,
    Unmount,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Load => write!(f, "load"),
            Self::Bootstrap => write!(f, "bootstrap"),
            Self::Mount => write!(f, "mount"),
            Self::Unmount => write!(f, "unmount"),
        }
    }
}

/// Error raised by a lifecycle step.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LifecycleError {
    #[error("{0}")]
    Failed(String),

    #[error("{phase} of '{unit}' failed: {message}")]
    Phase {
        unit: String,
        phase: LifecyclePhase,
        message: String,
    },
}

impl LifecycleError {
    /// Create a step failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Attach unit and phase information.
    pub fn in_phase(self, unit: impl Into<String>, phase: LifecyclePhase) -> Self {
        match self {
            Self::Failed(message) => Self::Phase {
                unit: unit.into(),
                phase,
                message,
            },
            other => other,
        }
    }
}

/// Result of a lifecycle step.
pub type LifecycleResult = Result<(), LifecycleError>;

/// Handle injected into a wrapper's mount props; hands the slot over to the
/// wrapped application with the given extra props.
#[derive(Clone)]
pub struct RenderApp(Arc<dyn Fn(Value) -> BoxFuture<'static, LifecycleResult> + Send + Sync>);

impl RenderApp {
    /// Create a new handle.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        Self(Arc::new(move |extra| f(extra).boxed()))
    }

    /// Unmount the wrapper and mount the wrapped application.
    pub async fn render(&self, extra_props: Value) -> LifecycleResult {
        (self.0)(extra_props).await
    }
}

impl fmt::Debug for RenderApp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RenderApp")
    }
}

/// Input passed to every lifecycle step.
#[derive(Debug, Clone, Default)]
pub struct MountProps {
    /// Application name.
    pub app_name: String,
    /// Slot the application renders into.
    pub slot_name: String,
    /// Merged application props.
    pub props: Value,
    /// Present only on a wrapper's mount.
    pub render_app: Option<RenderApp>,
}

impl MountProps {
    /// Create props for an application in a slot.
    pub fn new(app_name: impl Into<String>, slot_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            slot_name: slot_name.into(),
            props: Value::Null,
            render_app: None,
        }
    }

    /// Set the application props.
    pub fn with_props(mut self, props: Value) -> Self {
        self.props = props;
        self
    }

    /// Attach a render-app handle.
    pub fn with_render_app(mut self, render_app: RenderApp) -> Self {
        self.render_app = Some(render_app);
        self
    }
}

/// One async step of a lifecycle stage.
pub type LifecycleStep = Arc<dyn Fn(MountProps) -> BoxFuture<'static, LifecycleResult> + Send + Sync>;

/// Ordered sequence of async steps.
#[derive(Clone, Default)]
pub struct LifecycleStage {
    steps: Vec<LifecycleStep>,
}

impl LifecycleStage {
    /// Create an empty (no-op) stage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stage with a single step.
    pub fn from_fn<F, Fut>(f: F) -> Self
    where
        F: Fn(MountProps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        Self::new().then(f)
    }

    /// Append a step.
    pub fn then<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(MountProps) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = LifecycleResult> + Send + 'static,
    {
        self.steps.push(Arc::new(move |props| f(props).boxed()));
        self
    }

    /// Append a pre-built step.
    pub fn push_step(&mut self, step: LifecycleStep) {
        self.steps.push(step);
    }

    /// Number of steps.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Whether the stage is a no-op.
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Run every step in order, stopping at the first failure.
    pub async fn run(&self, props: MountProps) -> LifecycleResult {
        for step in &self.steps {
            step(props.clone()).await?;
        }
        Ok(())
    }
}

impl fmt::Debug for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LifecycleStage({} steps)", self.steps.len())
    }
}

/// Spawns a new, independent instance of a fragment.
pub type CreateNew =
    Arc<dyn Fn(Value) -> BoxFuture<'static, Result<LifecycleCallbacks, LifecycleError>> + Send + Sync>;

/// The lifecycle surface of a fragment.
#[derive(Clone, Default)]
pub struct LifecycleCallbacks {
    pub bootstrap: LifecycleStage,
    pub mount: LifecycleStage,
    pub unmount: LifecycleStage,
    /// Optional factory for additional instances.
    pub create_new: Option<CreateNew>,
}

impl LifecycleCallbacks {
    /// Callbacks that do nothing. Used for server-render-only applications.
    pub fn noop() -> Self {
        Self::default()
    }

    /// Create callbacks from the three stages.
    pub fn new(bootstrap: LifecycleStage, mount: LifecycleStage, unmount: LifecycleStage) -> Self {
        Self {
            bootstrap,
            mount,
            unmount,
            create_new: None,
        }
    }

    /// Attach a `create_new` factory.
    pub fn with_create_new<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<LifecycleCallbacks, LifecycleError>> + Send + 'static,
    {
        self.create_new = Some(Arc::new(move |props| f(props).boxed()));
        self
    }

    /// Whether every stage is empty.
    pub fn is_noop(&self) -> bool {
        self.bootstrap.is_empty() && self.mount.is_empty() && self.unmount.is_empty()
    }
}

impl fmt::Debug for LifecycleCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleCallbacks")
            .field("bootstrap", &self.bootstrap)
            .field("mount", &self.mount)
            .field("unmount", &self.unmount)
            .field("create_new", &self.create_new.is_some())
            .finish()
    }
}
