use std::{
    fmt::Debug,
    future::Future,
    panic::{resume_unwind, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use futures::{
    future::{self, BoxFuture, Either},
    FutureExt,
};

use crate::{
    builder::Blueprint,
    errors::{ActivationError, TeardownError, TeardownFailure},
    initiator::{timeout_signal, Initiator, Interruption},
    resources::Resources,
    teardown::{TeardownEntry, TeardownStack},
    types::DynError,
};

/// Lifecycle state of a [Container]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationState {
    Idle,
    /// Factories are running
    Activating,
    Active,
    /// Teardowns are running
    Deactivating,
    /// The future driving an activation, deactivation or scope was dropped
    /// before it completed - [Container::deactivate] tears down what is left
    Abandoned,
}

struct Activation {
    state: ActivationState,
    stack: TeardownStack,
}

/// The mutable record of the current activation
///
/// The lock is only ever held for a single state transition or stack operation,
/// never across an await.
pub(crate) struct ActivationGuard {
    activation: Mutex<Activation>,
}

impl ActivationGuard {
    pub(crate) fn new() -> Self {
        ActivationGuard {
            activation: Mutex::new(Activation {
                state: ActivationState::Idle,
                stack: TeardownStack::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Activation> {
        // A teardown never runs under the lock, so a poisoned record is still consistent
        self.activation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn state(&self) -> ActivationState {
        self.lock().state
    }

    fn set_state(&self, state: ActivationState) {
        self.lock().state = state;
    }

    /// Moves from Idle to Activating, or fails if any activation is in place
    pub(crate) fn try_begin(&self) -> Result<(), ActivationError> {
        let mut activation = self.lock();
        match activation.state {
            ActivationState::Idle => {
                activation.state = ActivationState::Activating;
                Ok(())
            }
            ActivationState::Deactivating => Err(ActivationError::Busy(activation.state)),
            ActivationState::Activating | ActivationState::Active | ActivationState::Abandoned => {
                Err(ActivationError::AlreadyActive)
            }
        }
    }

    /// Moves an active or abandoned activation to Deactivating
    ///
    /// Returns false if there is nothing to tear down. Fails while another
    /// activation or deactivation is in flight.
    fn try_begin_teardown(&self) -> Result<bool, ActivationError> {
        let mut activation = self.lock();
        match activation.state {
            ActivationState::Idle => Ok(false),
            ActivationState::Active | ActivationState::Abandoned => {
                activation.state = ActivationState::Deactivating;
                Ok(true)
            }
            ActivationState::Activating | ActivationState::Deactivating => {
                Err(ActivationError::Busy(activation.state))
            }
        }
    }

    fn abandon(&self) {
        let mut activation = self.lock();
        if activation.state != ActivationState::Idle {
            activation.state = ActivationState::Abandoned;
        }
    }

    pub(crate) fn push(&self, entry: TeardownEntry) {
        self.lock().stack.push(entry);
    }

    pub(crate) fn live_teardowns(&self) -> usize {
        self.lock().stack.len()
    }

    /// Runs every pushed teardown, most recent first
    ///
    /// A failing teardown does not stop the unwind. Entries are popped one at a
    /// time so an entry which has not run yet stays on the stack.
    pub(crate) async fn unwind(&self) -> Vec<TeardownFailure> {
        let mut failures = Vec::new();
        loop {
            let entry = self.lock().stack.pop();
            let Some(entry) = entry else {
                break;
            };

            if let Err(failure) = entry.run().await {
                failures.push(failure);
            }
        }
        failures
    }
}

/// Marks the activation [ActivationState::Abandoned] unless disarmed before it is dropped
struct AbandonOnDrop<'a> {
    guard: &'a ActivationGuard,
    armed: bool,
}

impl<'a> AbandonOnDrop<'a> {
    fn new(guard: &'a ActivationGuard) -> Self {
        AbandonOnDrop { guard, armed: true }
    }

    fn finish(mut self, state: ActivationState) {
        self.armed = false;
        self.guard.set_state(state);
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::debug!("Activation future dropped - marking the container abandoned");
            self.guard.abandon();
        }
    }
}

/// Activates the dependencies of a [Blueprint] and tears them down again
///
/// A container holds at most one activation at a time. The settings are handed
/// to every activation through [Resources::settings].
pub struct Container<S = ()> {
    blueprint: Arc<Blueprint>,
    settings: Arc<S>,
    init_timeout: Option<Duration>,
    guard: ActivationGuard,
}
impl<S> Debug for Container<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("dependencies", &self.blueprint.len())
            .field("state", &self.state())
            .field("init_timeout", &self.init_timeout)
            .finish()
    }
}

impl<S> Container<S> {
    pub fn new(blueprint: Arc<Blueprint>, settings: S) -> Self {
        Container {
            blueprint,
            settings: Arc::new(settings),
            init_timeout: None,
            guard: ActivationGuard::new(),
        }
    }

    /// Fails an activation which takes longer than `timeout`
    pub fn with_init_timeout(mut self, timeout: Duration) -> Self {
        self.init_timeout = Some(timeout);
        self
    }

    pub fn blueprint(&self) -> &Arc<Blueprint> {
        &self.blueprint
    }

    pub fn settings(&self) -> &S {
        &self.settings
    }

    pub fn state(&self) -> ActivationState {
        self.guard.state()
    }

    /// Builds every declared dependency in resolution order
    ///
    /// On failure everything built so far has been torn down again and the
    /// container is idle. If the returned future is dropped before it completes
    /// the container is left [ActivationState::Abandoned].
    pub async fn activate(&self) -> Result<Resources<S>, ActivationError> {
        self.run_activation(None).await
    }

    /// Like [Container::activate], but stops as soon as `cancel` completes
    ///
    /// The factory running at that point is dropped and the dependencies built
    /// so far are torn down.
    pub async fn activate_until<Cancel>(&self, cancel: Cancel) -> Result<Resources<S>, ActivationError>
    where
        Cancel: Future<Output = ()> + Send,
    {
        self.run_activation(Some(cancel.boxed())).await
    }

    async fn run_activation(
        &self,
        cancel: Option<BoxFuture<'_, ()>>,
    ) -> Result<Resources<S>, ActivationError> {
        let plan = self.blueprint.validate()?;
        self.guard.try_begin()?;
        let activation = AbandonOnDrop::new(&self.guard);

        tracing::debug!("Activating container with {} dependencies", plan.len());
        let initiator = Initiator::new(self.blueprint.descriptors(), plan, &self.guard);
        match initiator.initiate(self.interruption(cancel)).await {
            Ok(live) => {
                activation.finish(ActivationState::Active);
                Ok(Resources::new(live, self.settings.clone()))
            }
            Err(error) => {
                activation.finish(ActivationState::Idle);
                Err(error.into())
            }
        }
    }

    fn interruption<'a>(&self, cancel: Option<BoxFuture<'a, ()>>) -> BoxFuture<'a, Interruption> {
        let cancelled = match cancel {
            Some(cancel) => cancel.map(|()| Interruption::Cancelled).boxed(),
            None => future::pending().boxed(),
        };

        let timed_out = match self.init_timeout {
            Some(timeout) => timeout_signal(timeout)
                .map(move |()| Interruption::TimedOut(timeout))
                .boxed(),
            None => future::pending().boxed(),
        };

        future::select(cancelled, timed_out)
            .map(|either| either.factor_first().0)
            .boxed()
    }

    /// Tears down the current activation, most recently built first
    ///
    /// Every teardown runs even if an earlier one fails, the failures are
    /// returned as [ActivationError::Teardown]. The container is idle afterwards,
    /// also when some teardowns failed.
    ///
    /// Also cleans up an [ActivationState::Abandoned] container. Deactivating an
    /// idle container does nothing. While an activation or deactivation is still
    /// in flight this fails with [ActivationError::Busy] and changes nothing.
    pub async fn deactivate(&self) -> Result<(), ActivationError> {
        if !self.guard.try_begin_teardown()? {
            return Ok(());
        }
        let deactivation = AbandonOnDrop::new(&self.guard);

        let count = self.guard.live_teardowns();
        tracing::debug!("Deactivating container - tearing down {count} dependencies");
        let failures = self.guard.unwind().await;
        deactivation.finish(ActivationState::Idle);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TeardownError { failures }.into())
        }
    }

    /// Activates the container for the duration of `body`
    ///
    /// The container is deactivated when the body returns, fails or panics. An
    /// error of the body is returned with the teardown failures attached; a panic
    /// resumes after the teardown.
    ///
    /// Dropping the returned future skips the teardown and leaves the container
    /// [ActivationState::Abandoned] until [Container::deactivate] is called. Use
    /// [Container::scope_until] to stop a scope early and still tear it down.
    pub async fn scope<Body, BodyFuture, T, E>(&self, body: Body) -> Result<T, ActivationError>
    where
        Body: FnOnce(Resources<S>) -> BodyFuture,
        BodyFuture: Future<Output = Result<T, E>>,
        E: Into<DynError>,
    {
        self.scope_until(future::pending(), body).await
    }

    /// Like [Container::scope], but stops as soon as `cancel` completes
    ///
    /// Cancelling during activation fails like [Container::activate_until].
    /// Cancelling while the body runs drops the body, tears the container down and
    /// returns [ActivationError::ScopeCancelled].
    pub async fn scope_until<Cancel, Body, BodyFuture, T, E>(
        &self,
        cancel: Cancel,
        body: Body,
    ) -> Result<T, ActivationError>
    where
        Cancel: Future<Output = ()> + Send,
        Body: FnOnce(Resources<S>) -> BodyFuture,
        BodyFuture: Future<Output = Result<T, E>>,
        E: Into<DynError>,
    {
        let mut cancel = cancel.boxed().fuse();
        let resources = self.activate_until(&mut cancel).await?;
        let in_scope = AbandonOnDrop::new(&self.guard);

        let body = Box::pin(AssertUnwindSafe(async move { body(resources).await }).catch_unwind());
        let outcome = match future::select(body, &mut cancel).await {
            Either::Left((outcome, _)) => Some(outcome),
            Either::Right(((), _)) => {
                tracing::debug!("Scope cancelled - tearing down");
                None
            }
        };

        let teardown = self.deactivate().await;
        in_scope.disarm();

        match outcome {
            Some(Ok(Ok(value))) => {
                teardown?;
                Ok(value)
            }
            Some(Ok(Err(error))) => Err(ActivationError::Scope {
                error: Arc::new(error.into()),
                suppressed: suppressed(teardown),
            }),
            Some(Err(payload)) => {
                if let Err(error) = teardown {
                    tracing::warn!("Teardown after a panicking scope failed - {error}");
                }
                resume_unwind(payload)
            }
            None => Err(ActivationError::ScopeCancelled {
                suppressed: suppressed(teardown),
            }),
        }
    }
}

/// Teardown failures to attach to the error ending a scope
fn suppressed(teardown: Result<(), ActivationError>) -> Vec<TeardownFailure> {
    match teardown {
        Ok(()) => Vec::new(),
        Err(ActivationError::Teardown(error)) => error.failures,
        Err(error) => {
            tracing::warn!("Scope could not deactivate the container - {error}");
            Vec::new()
        }
    }
}

impl<S> Drop for Container<S> {
    fn drop(&mut self) {
        let live = self.guard.live_teardowns();
        if live > 0 {
            tracing::warn!("Container dropped with {live} dependencies which were never torn down");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{dependency::Dependency, errors::InitError, Arguments};

    #[derive(Default)]
    struct Counts {
        built: AtomicUsize,
        closed: AtomicUsize,
    }

    impl Counts {
        fn built(&self) -> usize {
            self.built.load(Ordering::SeqCst)
        }

        fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }
    }

    /// A dependency taking `delay` to build, counting builds and teardowns
    fn counted(name: &str, counts: &Arc<Counts>, delay: Duration) -> Dependency<String> {
        let build_counts = counts.clone();
        let exit_counts = counts.clone();
        let value = name.to_string();

        Dependency::new(name, move |_: Arguments| {
            let counts = build_counts.clone();
            let value = value.clone();
            async move {
                tokio::time::sleep(delay).await;
                counts.built.fetch_add(1, Ordering::SeqCst);
                Ok::<_, DynError>(value)
            }
        })
        .on_exit_sync(move |_: Arc<String>| {
            exit_counts.closed.fetch_add(1, Ordering::SeqCst);
            Ok::<_, DynError>(())
        })
    }

    fn stuck(name: &str) -> Dependency<()> {
        Dependency::new(name, |_: Arguments| async {
            future::pending::<()>().await;
            Ok::<_, DynError>(())
        })
    }

    fn never_finishes() -> future::Pending<Result<(), DynError>> {
        future::pending()
    }

    #[tokio::test]
    async fn second_activation_is_rejected() {
        let counts = Arc::new(Counts::default());
        let blueprint = Blueprint::builder()
            .register(counted("a", &counts, Duration::ZERO))
            .build();
        let container = Container::new(blueprint, ());

        container.activate().await.unwrap();
        assert_eq!(container.state(), ActivationState::Active);
        assert!(matches!(
            container.activate().await.unwrap_err(),
            ActivationError::AlreadyActive
        ));
        // No factory or teardown ran for the rejected activation
        assert_eq!(counts.built(), 1);
        assert_eq!(counts.closed(), 0);
        assert_eq!(container.state(), ActivationState::Active);

        container.deactivate().await.unwrap();
        assert_eq!(counts.closed(), 1);
        assert_eq!(container.state(), ActivationState::Idle);

        // Deactivating again is a no-op
        container.deactivate().await.unwrap();
        assert_eq!(counts.closed(), 1);
        assert_eq!(counts.built(), 1);
    }

    #[tokio::test]
    async fn deactivate_refuses_activation_in_flight() {
        let counts = Arc::new(Counts::default());
        let blueprint = Blueprint::builder()
            .register(counted("fast", &counts, Duration::ZERO))
            .register(counted("slow", &counts, Duration::from_millis(100)))
            .build();
        let container = Container::new(blueprint, ());

        let (first, (deactivated, second)) = tokio::join!(container.activate(), async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            (container.deactivate().await, container.activate().await)
        });

        assert!(matches!(
            deactivated,
            Err(ActivationError::Busy(ActivationState::Activating))
        ));
        assert!(matches!(second, Err(ActivationError::AlreadyActive)));
        let resources = first.unwrap();
        assert_eq!(resources.len(), 2);
        assert_eq!(counts.built(), 2);
        assert_eq!(counts.closed(), 0);
        assert_eq!(container.state(), ActivationState::Active);

        container.deactivate().await.unwrap();
        assert_eq!(counts.closed(), 2);
    }

    #[tokio::test]
    async fn dropped_activation_is_cleaned_by_deactivate() {
        let counts = Arc::new(Counts::default());
        let blueprint = Blueprint::builder()
            .register(counted("a", &counts, Duration::ZERO))
            .register(stuck("b").reference("a", "a"))
            .build();
        let container = Container::new(blueprint, ());

        let abandoned =
            tokio::time::timeout(Duration::from_millis(20), container.activate()).await;
        assert!(abandoned.is_err());
        assert_eq!(container.state(), ActivationState::Abandoned);
        assert!(matches!(
            container.activate().await.unwrap_err(),
            ActivationError::AlreadyActive
        ));

        container.deactivate().await.unwrap();
        assert_eq!(counts.closed(), 1);
        assert_eq!(container.state(), ActivationState::Idle);
    }

    #[tokio::test]
    async fn init_timeout_unwinds() {
        let counts = Arc::new(Counts::default());
        let blueprint = Blueprint::builder()
            .register(counted("a", &counts, Duration::ZERO))
            .register(stuck("b"))
            .build();
        let container = Container::new(blueprint, ()).with_init_timeout(Duration::from_millis(20));

        let err = container.activate().await.unwrap_err();
        assert!(matches!(
            err,
            ActivationError::Init(InitError::Timeout { ref product, .. }) if product == "b"
        ));
        assert_eq!(counts.closed(), 1);
        assert_eq!(container.state(), ActivationState::Idle);
    }

    #[tokio::test]
    async fn cancelled_activation_unwinds() {
        let counts = Arc::new(Counts::default());
        let blueprint = Blueprint::builder()
            .register(counted("a", &counts, Duration::ZERO))
            .register(stuck("b"))
            .register(counted("c", &counts, Duration::ZERO))
            .build();
        let container = Container::new(blueprint, ());

        let err = container
            .activate_until(tokio::time::sleep(Duration::from_millis(10)))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ActivationError::Init(InitError::Cancelled { ref product, .. }) if product == "b"
        ));
        assert_eq!(counts.built(), 1);
        assert_eq!(counts.closed(), 1);
    }

    #[tokio::test]
    async fn invalid_blueprint_leaves_container_idle() {
        let blueprint = Blueprint::builder()
            .register(stuck("x").reference("missing", "missing"))
            .build();
        let container = Container::new(blueprint, ());

        assert!(matches!(
            container.activate().await.unwrap_err(),
            ActivationError::DependencyGraph(_)
        ));
        assert_eq!(container.state(), ActivationState::Idle);
    }

    #[tokio::test]
    async fn scope_tears_down_after_body() {
        let counts = Arc::new(Counts::default());
        let blueprint = Blueprint::builder()
            .register(counted("a", &counts, Duration::ZERO))
            .build();
        let container = Container::new(blueprint, 7_u32);

        let value = container
            .scope(|resources| async move {
                let a = resources.require::<String>("a")?;
                Ok::<_, DynError>(format!("{a}{}", resources.settings()))
            })
            .await
            .unwrap();

        assert_eq!(value, "a7");
        assert_eq!(counts.closed(), 1);
        assert_eq!(container.state(), ActivationState::Idle);
    }

    #[tokio::test]
    async fn cancelled_scope_tears_down() {
        let counts = Arc::new(Counts::default());
        let blueprint = Blueprint::builder()
            .register(counted("a", &counts, Duration::ZERO))
            .build();
        let container = Container::new(blueprint, ());

        let err = container
            .scope_until(tokio::time::sleep(Duration::from_millis(20)), |_| {
                never_finishes()
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ActivationError::ScopeCancelled { ref suppressed } if suppressed.is_empty()
        ));
        assert_eq!(counts.closed(), 1);
        assert_eq!(container.state(), ActivationState::Idle);
    }

    #[tokio::test]
    async fn dropped_scope_is_abandoned_until_deactivated() {
        let counts = Arc::new(Counts::default());
        let blueprint = Blueprint::builder()
            .register(counted("a", &counts, Duration::ZERO))
            .build();
        let container = Container::new(blueprint, ());

        let dropped = tokio::time::timeout(
            Duration::from_millis(20),
            container.scope(|_| never_finishes()),
        )
        .await;
        assert!(dropped.is_err());
        assert_eq!(counts.closed(), 0);
        assert_eq!(container.state(), ActivationState::Abandoned);

        container.deactivate().await.unwrap();
        assert_eq!(counts.closed(), 1);
        assert_eq!(container.state(), ActivationState::Idle);
        container.activate().await.unwrap();
        container.deactivate().await.unwrap();
        assert_eq!(counts.built(), 2);
    }
}
