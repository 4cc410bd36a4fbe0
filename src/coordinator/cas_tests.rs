// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `cas.rs`

#[cfg(test)]
mod tests {
    use super::super::{converge, CasResource, Outcome, Postcondition};
    use crate::errors::{ApiError, ErrorCode, FirewallError, Result};
    use crate::retry::{RetryPolicy, RetryScheduler};
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    /// A remote integer with scripted faults.
    #[derive(Default)]
    struct Register {
        value: Mutex<Option<i64>>,
        /// Scripted read results: `None` lets the read through
        read_errors: Mutex<VecDeque<Option<FirewallError>>>,
        write_errors: Mutex<VecDeque<FirewallError>>,
        lost_writes: Mutex<u32>,
        writes: Mutex<u32>,
    }

    impl Register {
        fn with_value(value: i64) -> Self {
            let register = Self::default();
            *register.value.lock().unwrap() = Some(value);
            register
        }

        fn writes(&self) -> u32 {
            *self.writes.lock().unwrap()
        }
    }

    #[async_trait]
    impl CasResource for Register {
        type State = i64;

        async fn read(&self, _cancel: &CancellationToken) -> Result<Option<i64>> {
            if let Some(Some(err)) = self.read_errors.lock().unwrap().pop_front() {
                return Err(err);
            }
            Ok(*self.value.lock().unwrap())
        }

        async fn write(&self, _expected: &i64, next: &i64, _cancel: &CancellationToken) -> Result<()> {
            *self.writes.lock().unwrap() += 1;
            if let Some(err) = self.write_errors.lock().unwrap().pop_front() {
                return Err(err);
            }
            let mut lost = self.lost_writes.lock().unwrap();
            if *lost > 0 {
                *lost -= 1;
            } else {
                *self.value.lock().unwrap() = Some(*next);
            }
            Ok(())
        }
    }

    struct Equals(i64);

    impl Postcondition<i64> for Equals {
        fn holds(&self, state: &i64) -> bool {
            *state == self.0
        }

        fn next(&self, _current: &i64) -> Result<i64> {
            Ok(self.0)
        }
    }

    struct Refuse;

    impl Postcondition<i64> for Refuse {
        fn holds(&self, _state: &i64) -> bool {
            false
        }

        fn next(&self, _current: &i64) -> Result<i64> {
            Err(FirewallError::Configuration("refused".into()))
        }
    }

    fn scheduler(max_attempts: u32) -> RetryScheduler {
        RetryScheduler::with_rng(
            RetryPolicy {
                max_attempts,
                ..RetryPolicy::default()
            },
            StdRng::seed_from_u64(1),
        )
    }

    fn transient() -> FirewallError {
        ApiError::new(ErrorCode::Conflict, "concurrent modification").into()
    }

    fn terminal() -> FirewallError {
        ApiError::new(ErrorCode::Unauthorized, "bad token").into()
    }

    async fn run(register: &Register, goal: &dyn Postcondition<i64>, max: u32) -> Result<Outcome> {
        converge(register, goal, &scheduler(max), &CancellationToken::new(), "set register").await
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_held_writes_nothing() {
        let register = Register::with_value(5);
        let outcome = run(&register, &Equals(5), 3).await.unwrap();
        assert_eq!(outcome, Outcome::Held { attempts: 1, submissions: 0 });
        assert_eq!(register.writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_write() {
        let register = Register::with_value(1);
        let outcome = run(&register, &Equals(5), 3).await.unwrap();
        assert_eq!(outcome, Outcome::Held { attempts: 1, submissions: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_write_is_retried() {
        let register = Register::with_value(1);
        *register.lost_writes.lock().unwrap() = 2;

        let outcome = run(&register, &Equals(5), 5).await.unwrap();
        assert_eq!(outcome, Outcome::Held { attempts: 3, submissions: 3 });
        assert_eq!(*register.value.lock().unwrap(), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion() {
        let register = Register::with_value(1);
        *register.lost_writes.lock().unwrap() = 10;

        let outcome = run(&register, &Equals(5), 4).await.unwrap();
        assert_eq!(outcome, Outcome::Exhausted { attempts: 4, submissions: 4 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_resource() {
        let register = Register::default();
        let outcome = run(&register, &Equals(5), 3).await.unwrap();
        assert_eq!(outcome, Outcome::Missing { attempts: 1, submissions: 0 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_write_error_aborts() {
        let register = Register::with_value(1);
        register.write_errors.lock().unwrap().push_back(terminal());

        let err = run(&register, &Equals(5), 5).await.unwrap_err();
        assert!(err.has_code(ErrorCode::Unauthorized));
        assert_eq!(register.writes(), 1, "no retry after a terminal error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_write_error_is_retried() {
        let register = Register::with_value(1);
        register.write_errors.lock().unwrap().push_back(transient());

        let outcome = run(&register, &Equals(5), 5).await.unwrap();
        assert_eq!(outcome.attempts(), 2);
        assert_eq!(outcome.submissions(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_read_error_aborts() {
        let register = Register::with_value(1);
        register.read_errors.lock().unwrap().push_back(Some(terminal()));

        assert!(run(&register, &Equals(5), 5).await.is_err());
        assert_eq!(register.writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_read_error_is_retried() {
        let register = Register::with_value(1);
        register.read_errors.lock().unwrap().push_back(Some(transient()));

        let outcome = run(&register, &Equals(5), 5).await.unwrap();
        assert_eq!(outcome, Outcome::Held { attempts: 2, submissions: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_verification_read_is_retried() {
        let register = Register::with_value(1);
        register
            .read_errors
            .lock()
            .unwrap()
            .extend([None, Some(transient())]);

        let outcome = run(&register, &Equals(5), 5).await.unwrap();
        assert_eq!(outcome, Outcome::Held { attempts: 2, submissions: 1 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_error_aborts_without_write() {
        let register = Register::with_value(1);
        let err = run(&register, &Refuse, 5).await.unwrap_err();
        assert!(matches!(err, FirewallError::Configuration(_)));
        assert_eq!(register.writes(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_during_backoff() {
        let register = Register::with_value(1);
        *register.lost_writes.lock().unwrap() = 10;
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = converge(&register, &Equals(5), &scheduler(10), &token, "set register")
            .await
            .unwrap_err();
        assert!(matches!(err, FirewallError::Cancelled));
        assert!(register.writes() < 10);
    }
}
