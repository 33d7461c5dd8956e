use log::{debug, warn};
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout_at, Instant};

use crate::models::resource::Observed;
use crate::utils::error::Error;

/// Polls a remote resource until a predicate over its observed state holds.
pub struct ConditionWaiter {
    poll_interval: Duration,
}

impl ConditionWaiter {
    pub fn new(poll_interval: Duration) -> Self {
        ConditionWaiter { poll_interval }
    }

    /// Calls `fetch` until it returns a state satisfying `predicate`, or until `timeout` is spent.
    ///
    /// `fetch` returning `Ok(None)` means the resource is not visible yet and is retried like any
    /// other unsatisfying state. Errors from `fetch` are logged and retried as well. On timeout
    /// the error carries a summary of the last state seen, or the last fetch error if that came
    /// later.
    ///
    /// # Arguments
    /// - `condition` - Human-readable description of what is awaited, used in logs and errors.
    /// - `timeout` - Total budget for the wait, including the time spent in `fetch`.
    /// - `fetch` - Reads the current state of the resource.
    /// - `predicate` - Decides whether the state is the one awaited.
    pub async fn wait<T, F, Fut, P>(
        &self,
        condition: &str,
        timeout: Duration,
        mut fetch: F,
        predicate: P,
    ) -> Result<T, Error>
    where
        T: Observed,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>, Error>>,
        P: Fn(&T) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut last_state: Option<String> = None;

        loop {
            match timeout_at(deadline, fetch()).await {
                Ok(Ok(Some(state))) => {
                    if predicate(&state) {
                        debug!("{}: satisfied by {}", condition, state.summary());
                        return Ok(state);
                    }
                    last_state = Some(state.summary());
                }
                Ok(Ok(None)) => debug!("{}: resource not found yet", condition),
                Ok(Err(err)) => {
                    warn!("{}: {}, retrying", condition, err);
                    // a lookup that keeps failing is the most useful thing to report on timeout
                    last_state = Some(format!("error: {}", err));
                }
                // the fetch itself ran past the deadline
                Err(_) => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(Error::TimeoutError {
                    condition: condition.to_string(),
                    timeout,
                    last_state,
                });
            }

            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::time::Duration;

    use super::ConditionWaiter;
    use crate::models::resource::{Observed, PodPhase};
    use crate::utils::error::Error;

    #[derive(Debug, Clone)]
    struct Phase(PodPhase);

    impl Observed for Phase {
        fn summary(&self) -> String {
            format!("phase {}", self.0)
        }
    }

    fn waiter() -> ConditionWaiter {
        ConditionWaiter::new(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn resolves_once_predicate_holds() {
        let polls = Cell::new(0);

        let state = waiter()
            .wait(
                "pod to run",
                Duration::from_secs(1),
                || {
                    polls.set(polls.get() + 1);
                    let phase = if polls.get() < 3 {
                        PodPhase::Pending
                    } else {
                        PodPhase::Running
                    };
                    async move { Ok(Some(Phase(phase))) }
                },
                |state: &Phase| state.0 == PodPhase::Running,
            )
            .await
            .unwrap();

        assert_eq!(state.0, PodPhase::Running);
        assert_eq!(polls.get(), 3);
    }

    #[tokio::test]
    async fn treats_not_found_and_errors_as_not_ready() {
        let polls = Cell::new(0);

        let result = waiter()
            .wait(
                "pod to exist",
                Duration::from_secs(1),
                || {
                    polls.set(polls.get() + 1);
                    let answer = match polls.get() {
                        1 => Ok(None),
                        2 => Err(Error::ConnectionError("connection reset".to_string())),
                        _ => Ok(Some(Phase(PodPhase::Pending))),
                    };
                    async move { answer }
                },
                |_| true,
            )
            .await;

        tokio_test::assert_ok!(result);
        assert_eq!(polls.get(), 3);
    }

    #[tokio::test]
    async fn times_out_with_last_observed_state() {
        let result = waiter()
            .wait(
                "pod to run",
                Duration::from_millis(30),
                || async { Ok(Some(Phase(PodPhase::Pending))) },
                |state: &Phase| state.0 == PodPhase::Running,
            )
            .await;

        let err = tokio_test::assert_err!(result);
        match err {
            Error::TimeoutError {
                condition,
                last_state,
                ..
            } => {
                assert_eq!(condition, "pod to run");
                assert_eq!(last_state.as_deref(), Some("phase Pending"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn times_out_without_state_when_never_found() {
        let result = waiter()
            .wait(
                "pod to exist",
                Duration::from_millis(20),
                || async { Ok(None::<Phase>) },
                |_| true,
            )
            .await;

        assert!(matches!(
            result,
            Err(Error::TimeoutError {
                last_state: None,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn times_out_with_last_fetch_error() {
        let result = waiter()
            .wait(
                "pod to exist",
                Duration::from_millis(20),
                || async {
                    Err::<Option<Phase>, _>(Error::ConnectionError("forbidden".to_string()))
                },
                |_| true,
            )
            .await;

        let err = tokio_test::assert_err!(result);
        match &err {
            Error::TimeoutError { last_state, .. } => assert_eq!(
                last_state.as_deref(),
                Some("error: Kubernetes connection error: forbidden")
            ),
            other => panic!("unexpected error: {}", other),
        }
        assert!(err.to_string().contains("forbidden"));
    }

    #[tokio::test]
    async fn bounds_a_hanging_fetch() {
        let result = waiter()
            .wait(
                "job to finish",
                Duration::from_millis(20),
                || futures::future::pending::<Result<Option<Phase>, Error>>(),
                |_| true,
            )
            .await;

        assert!(matches!(result, Err(Error::TimeoutError { .. })));
    }
}
