use crate::category::Category;
use std::fmt;
use std::sync::Arc;

type ActionFn = dyn Fn() -> anyhow::Result<()> + Send + Sync;
type FrameFn = dyn Fn(u64) -> anyhow::Result<()> + Send + Sync;

/// Identity of a handle, derived from the address of its shared allocation.
///
/// Only the data pointer is kept, so two handles compare equal exactly when
/// they are clones of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(usize);

impl HandleId {
    fn of<T: ?Sized>(arc: &Arc<T>) -> Self {
        HandleId(Arc::as_ptr(arc) as *const () as usize)
    }
}

/// A zero-argument unit of work.
///
/// Cloning an `Action` yields the same action for removal purposes; building
/// two actions from identical closures yields two different ones.
#[derive(Clone)]
pub struct Action {
    run: Arc<ActionFn>,
}

impl Action {
    pub fn new(f: impl Fn() + Send + Sync + 'static) -> Self {
        Self::try_new(move || {
            f();
            Ok(())
        })
    }

    /// An action whose failures are reported to the scheduler's error handler.
    pub fn try_new(f: impl Fn() -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        Self { run: Arc::new(f) }
    }

    pub fn id(&self) -> HandleId {
        HandleId::of(&self.run)
    }

    pub(crate) fn run(&self) -> anyhow::Result<()> {
        (self.run)()
    }
}

impl PartialEq for Action {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Action {}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Action").field(&self.id()).finish()
    }
}

/// A callback that receives the timestamp of the frame being dispatched.
#[derive(Clone)]
pub struct FrameCallback {
    run: Arc<FrameFn>,
}

impl FrameCallback {
    pub fn new(f: impl Fn(u64) + Send + Sync + 'static) -> Self {
        Self::try_new(move |frame_time_nanos| {
            f(frame_time_nanos);
            Ok(())
        })
    }

    pub fn try_new(f: impl Fn(u64) -> anyhow::Result<()> + Send + Sync + 'static) -> Self {
        Self { run: Arc::new(f) }
    }

    pub fn id(&self) -> HandleId {
        HandleId::of(&self.run)
    }

    pub(crate) fn run(&self, frame_time_nanos: u64) -> anyhow::Result<()> {
        (self.run)(frame_time_nanos)
    }
}

impl PartialEq for FrameCallback {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for FrameCallback {}

impl fmt::Debug for FrameCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FrameCallback").field(&self.id()).finish()
    }
}

/// Opaque cancellation group.
///
/// The label is for diagnostics only; equality is by identity.
#[derive(Clone)]
pub struct Token {
    label: Arc<str>,
}

impl Token {
    pub fn new(label: &str) -> Self {
        Self {
            label: Arc::from(label),
        }
    }

    pub fn id(&self) -> HandleId {
        HandleId::of(&self.label)
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl PartialEq for Token {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Token {}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("label", &self.label())
            .field("id", &self.id())
            .finish()
    }
}

/// What a queued entry runs when it is dispatched.
#[derive(Clone, Debug)]
pub enum Payload {
    Action(Action),
    Frame(FrameCallback),
}

impl Payload {
    pub fn id(&self) -> HandleId {
        match self {
            Payload::Action(action) => action.id(),
            Payload::Frame(callback) => callback.id(),
        }
    }

    pub(crate) fn invoke(&self, frame_time_nanos: u64) -> anyhow::Result<()> {
        match self {
            Payload::Action(action) => action.run(),
            Payload::Frame(callback) => callback.run(frame_time_nanos),
        }
    }
}

/// One pending scheduled unit. Never mutated after creation.
#[derive(Clone, Debug)]
pub struct CallbackEntry {
    pub category: Category,
    pub due_time_nanos: u64,
    pub sequence: u64,
    pub payload: Payload,
    pub token: Option<Token>,
}

impl CallbackEntry {
    pub fn action_id(&self) -> HandleId {
        self.payload.id()
    }

    /// `None` filters match anything; a present filter requires identity.
    pub fn matches(&self, action: Option<HandleId>, token: Option<&Token>) -> bool {
        let action_matches = action.is_none_or(|id| id == self.action_id());
        let token_matches = match token {
            None => true,
            Some(token) => self.token.as_ref() == Some(token),
        };
        action_matches && token_matches
    }

    pub(crate) fn sort_key(&self) -> (u64, u64) {
        (self.due_time_nanos, self.sequence)
    }
}
