use std::{
    collections::HashMap,
    future::Future,
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    thread,
    time::Duration,
};

use futures::future::{self, BoxFuture, Either};
use futures_channel::oneshot;

use crate::{
    container::ActivationGuard,
    dependency::{Argument, Arguments, Descriptor},
    errors::{InitError, RequireError, TeardownFailure},
    scheduler::Plan,
    teardown::TeardownEntry,
    types::{DynError, Instance},
};

/// Why an initiation stopped before its factories completed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Interruption {
    Cancelled,
    TimedOut(Duration),
}

/// Runs the factories of a blueprint in plan order
///
/// Each produced value with a teardown is pushed onto the guard's stack as soon
/// as it exists, so whatever happens to the initiation afterwards the guard
/// can still tear it down.
pub(crate) struct Initiator<'a> {
    descriptors: &'a [Descriptor],
    plan: &'a Plan,
    guard: &'a ActivationGuard,
}

impl<'a> Initiator<'a> {
    pub(crate) fn new(
        descriptors: &'a [Descriptor],
        plan: &'a Plan,
        guard: &'a ActivationGuard,
    ) -> Self {
        Initiator {
            descriptors,
            plan,
            guard,
        }
    }

    /// Constructs every dependency strictly one after another
    ///
    /// Returns the produced values in initialization order. On failure or
    /// interruption everything produced so far is torn down before returning.
    pub(crate) async fn initiate(
        self,
        mut interrupt: BoxFuture<'_, Interruption>,
    ) -> Result<Vec<(String, Instance)>, InitError> {
        let total = self.plan.len();
        tracing::debug!("Initializing {total} dependencies");

        let mut produced: HashMap<&str, Instance> = HashMap::with_capacity(total);
        let mut live = Vec::with_capacity(total);

        for (complete, &index) in self.plan.order().iter().enumerate() {
            let descriptor = &self.descriptors[index];
            let name = descriptor.name();

            let args = match resolve_arguments(descriptor, &produced) {
                Ok(args) => args,
                Err(error) => return Err(self.factory_failed(name, error.into()).await),
            };

            tracing::debug!("Constructing '{name}' [{complete} of {total} complete]");
            let construction = descriptor.factory().construct(args);

            let instance = match future::select(construction, interrupt.as_mut()).await {
                Either::Left((Ok(instance), _)) => instance,
                Either::Left((Err(error), _)) => return Err(self.factory_failed(name, error).await),
                Either::Right((interruption, construction)) => {
                    // The factory must not outlive the unwind
                    drop(construction);
                    return Err(self.interrupted(name, interruption).await);
                }
            };

            tracing::debug!("Constructed instance of '{name}' ({})", instance.info.type_name);
            if let Some(teardown) = descriptor.teardown() {
                self.guard
                    .push(TeardownEntry::new(name, instance.clone(), teardown.clone()));
            }

            produced.insert(name, instance.clone());
            live.push((name.to_string(), instance));
        }

        tracing::debug!("All {total} dependencies constructed");
        Ok(live)
    }

    async fn factory_failed(&self, product: &str, error: DynError) -> InitError {
        tracing::debug!("Factory for '{product}' failed - error: {error}");
        let suppressed = self.unwind(product).await;

        InitError::FactoryFailed {
            product: product.to_string(),
            error: Arc::new(error),
            suppressed,
        }
    }

    async fn interrupted(&self, product: &str, interruption: Interruption) -> InitError {
        tracing::info!(?interruption, "Initiation interrupted while building '{product}'");
        let suppressed = self.unwind(product).await;

        match interruption {
            Interruption::Cancelled => InitError::Cancelled {
                product: product.to_string(),
                suppressed,
            },
            Interruption::TimedOut(timeout) => InitError::Timeout {
                product: product.to_string(),
                timeout,
                suppressed,
            },
        }
    }

    async fn unwind(&self, product: &str) -> Vec<TeardownFailure> {
        let count = self.guard.live_teardowns();
        tracing::debug!("'{product}' was not built - tearing down {count} dependencies");
        self.guard.unwind().await
    }
}

/// Substitutes references with the values already produced for them
fn resolve_arguments(
    descriptor: &Descriptor,
    produced: &HashMap<&str, Instance>,
) -> Result<Arguments, RequireError> {
    let mut values = Vec::with_capacity(descriptor.arguments().len());
    for (param, argument) in descriptor.arguments() {
        let value = match argument {
            Argument::Literal(instance) => instance.clone(),
            Argument::Reference(target) => produced
                .get(target.as_str())
                .cloned()
                .ok_or_else(|| RequireError::Missing(target.clone()))?,
        };
        values.push((param.clone(), value));
    }

    Ok(Arguments::from_pairs(values))
}

/// Resolves once `timeout` has passed
///
/// The timer thread exits once the timeout passes or the returned future is dropped.
pub(crate) fn timeout_signal(timeout: Duration) -> impl Future<Output = ()> + Send + 'static {
    let (timeout_tx, timeout_rx) = oneshot::channel::<()>();
    let (alive_tx, alive_rx) = mpsc::channel::<()>();
    thread::spawn(move || {
        if wait_for_timeout(timeout, &alive_rx) {
            let _ = timeout_tx.send(());
        }
    });

    async move {
        let _alive = alive_tx;
        let _ = timeout_rx.await;
    }
}

/// Blocks until `timeout` passes or every sender of `alive` is gone
///
/// Returns true only if the timeout passed.
fn wait_for_timeout(timeout: Duration, alive: &mpsc::Receiver<()>) -> bool {
    matches!(alive.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use futures::FutureExt;

    use super::*;
    use crate::{
        dependency::Dependency, dependency_graph::DependencyGraph, errors::InitError,
    };

    type Log = Arc<Mutex<Vec<String>>>;

    fn tracked(name: &'static str, refs: &[&str], log: &Log, fail: bool) -> Descriptor {
        let build_log = log.clone();
        let exit_log = log.clone();
        refs.iter()
            .enumerate()
            .fold(
                Dependency::from_fn(name, move |args: Arguments| {
                    build_log.lock().unwrap().push(format!("build {name}"));
                    if fail {
                        return Err::<String, DynError>(format!("{name} is down").into());
                    }
                    let mut value = name.to_string();
                    for param in args.params() {
                        value.push_str(&format!("+{}", args.get::<String>(param)?));
                    }
                    Ok(value)
                }),
                |dep, (i, target)| dep.reference(format!("arg{i}"), *target),
            )
            .on_exit_sync(move |value: Arc<String>| {
                exit_log.lock().unwrap().push(format!("exit {value}"));
                Ok::<_, DynError>(())
            })
            .into_descriptor()
    }

    fn plan(descriptors: &[Descriptor]) -> Plan {
        let graph = DependencyGraph::new(descriptors).unwrap();
        graph.check().unwrap();
        Plan::new(&graph)
    }

    fn never() -> BoxFuture<'static, Interruption> {
        future::pending().boxed()
    }

    #[tokio::test]
    async fn threads_produced_values_into_dependents() {
        let log = Log::default();
        let descriptors = [
            tracked("a", &[], &log, false),
            tracked("b", &["a"], &log, false),
        ];
        let plan = plan(&descriptors);
        let guard = ActivationGuard::new();

        let live = Initiator::new(&descriptors, &plan, &guard)
            .initiate(never())
            .await
            .unwrap();

        let values: Vec<_> = live
            .iter()
            .map(|(name, instance)| (name.as_str(), instance.downcast::<String>().unwrap()))
            .collect();
        assert_eq!(values[0].0, "a");
        assert_eq!(values[1].1.as_str(), "b+a");
        assert_eq!(guard.live_teardowns(), 2);
    }

    #[tokio::test]
    async fn failure_unwinds_in_reverse_and_stops() {
        let log = Log::default();
        let descriptors = [
            tracked("a", &[], &log, false),
            tracked("b", &["a"], &log, false),
            tracked("c", &["b"], &log, true),
            tracked("d", &["c"], &log, false),
        ];
        let plan = plan(&descriptors);
        let guard = ActivationGuard::new();

        let err = Initiator::new(&descriptors, &plan, &guard)
            .initiate(never())
            .await
            .unwrap_err();

        assert_eq!(err.product(), "c");
        assert_eq!(err.factory_error().unwrap().to_string(), "c is down");
        assert!(err.suppressed().is_empty());
        assert_eq!(
            *log.lock().unwrap(),
            ["build a", "build b", "build c", "exit b+a", "exit a"]
        );
        assert_eq!(guard.live_teardowns(), 0);
    }

    #[tokio::test]
    async fn interruption_drops_pending_factory_and_unwinds() {
        let log = Log::default();
        let stuck = Dependency::new("stuck", |_: Arguments| async {
            future::pending::<()>().await;
            Ok::<_, DynError>(())
        })
        .reference("a", "a")
        .into_descriptor();
        let descriptors = [tracked("a", &[], &log, false), stuck];
        let plan = plan(&descriptors);
        let guard = ActivationGuard::new();

        let err = Initiator::new(&descriptors, &plan, &guard)
            .initiate(future::ready(Interruption::TimedOut(Duration::from_millis(5))).boxed())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            InitError::Timeout { ref product, timeout, .. }
                if product == "stuck" && timeout == Duration::from_millis(5)
        ));
        assert_eq!(*log.lock().unwrap(), ["build a", "exit a"]);
    }

    #[tokio::test]
    async fn timeout_signal_fires() {
        tokio::time::timeout(Duration::from_secs(5), timeout_signal(Duration::from_millis(10)))
            .await
            .unwrap();
    }

    #[test]
    fn timer_stops_when_signal_is_dropped() {
        let (alive_tx, alive_rx) = mpsc::channel::<()>();
        let waiter = thread::spawn(move || {
            let started = std::time::Instant::now();
            (wait_for_timeout(Duration::from_secs(60), &alive_rx), started.elapsed())
        });

        thread::sleep(Duration::from_millis(10));
        drop(alive_tx);
        let (timed_out, waited) = waiter.join().unwrap();

        assert!(!timed_out);
        assert!(waited < Duration::from_secs(1));
    }

    #[test]
    fn timer_reports_timeout_while_signal_is_alive() {
        let (_alive_tx, alive_rx) = mpsc::channel::<()>();
        assert!(wait_for_timeout(Duration::from_millis(10), &alive_rx));
    }
}
