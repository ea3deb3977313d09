//! Role readiness gate
//!
//! A freshly created IAM role is not assumable until the change propagates.
//! [`RoleAssumer::wait_until_assumable`] polls assume-role with a per-attempt
//! timeout and capped exponential backoff until it succeeds or the overall
//! deadline passes.

use crate::cloud::{ServiceError, TemporaryCredentials, TokenService};
use crate::progress::{ProgressEvent, ProgressHandler};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Pause before the first attempt
    pub initial_delay: Duration,
    /// Upper bound for a single assume-role call
    pub attempt_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// No attempt starts after this much time has passed
    pub max_wait: Duration,
}

impl Default for ReadinessPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            attempt_timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(8),
            max_wait: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Error)]
#[error("Role {role_arn} could not be assumed after {attempts} attempt(s) over {elapsed:?}: {last_error}. Try running again")]
pub struct ReadinessError {
    pub role_arn: String,
    pub attempts: u32,
    pub elapsed: Duration,
    #[source]
    pub last_error: ServiceError,
}

/// Result of a successful readiness wait
#[derive(Debug, Clone)]
pub struct RoleReady {
    pub credentials: TemporaryCredentials,
    pub attempts: u32,
    pub elapsed: Duration,
}

pub struct RoleAssumer<'a> {
    tokens: &'a dyn TokenService,
    policy: ReadinessPolicy,
}

impl<'a> RoleAssumer<'a> {
    pub fn new(tokens: &'a dyn TokenService, policy: ReadinessPolicy) -> Self {
        Self { tokens, policy }
    }

    /// One assume-role attempt bounded by the attempt timeout
    pub async fn assume(
        &self,
        role_arn: &str,
        session_name: &str,
    ) -> Result<TemporaryCredentials, ServiceError> {
        tokio::time::timeout(
            self.policy.attempt_timeout,
            self.tokens.assume_role(role_arn, session_name),
        )
        .await
        .map_err(|_| ServiceError::Timeout(self.policy.attempt_timeout))?
    }

    pub async fn wait_until_assumable(
        &self,
        role_arn: &str,
        session_name: &str,
        progress: &dyn ProgressHandler,
    ) -> Result<RoleReady, ReadinessError> {
        let start = Instant::now();
        if !self.policy.initial_delay.is_zero() {
            debug!(delay_ms = self.policy.initial_delay.as_millis(), "Waiting for role propagation");
            tokio::time::sleep(self.policy.initial_delay).await;
        }

        let mut backoff = self.policy.initial_backoff;
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.assume(role_arn, session_name).await {
                Ok(credentials) => {
                    let elapsed = start.elapsed();
                    info!(
                        role_arn,
                        attempts,
                        elapsed_ms = elapsed.as_millis(),
                        "Role assumed"
                    );
                    return Ok(RoleReady {
                        credentials,
                        attempts,
                        elapsed,
                    });
                }
                Err(e) => {
                    let elapsed = start.elapsed();
                    if elapsed + backoff > self.policy.max_wait {
                        return Err(ReadinessError {
                            role_arn: role_arn.to_string(),
                            attempts,
                            elapsed,
                            last_error: e,
                        });
                    }
                    progress.on_progress(&ProgressEvent::ReadinessRetry {
                        attempt: attempts,
                        backoff,
                        error: e.to_string(),
                    });
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(self.policy.max_backoff);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::CallerIdentity;
    use crate::progress::NoOpHandler;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Fails the first `failures` calls, then succeeds
    struct FlakyTokens {
        failures: u32,
        calls: AtomicU32,
        hang: bool,
    }

    impl FlakyTokens {
        fn new(failures: u32) -> Self {
            Self {
                failures,
                calls: AtomicU32::new(0),
                hang: false,
            }
        }
    }

    #[async_trait]
    impl TokenService for FlakyTokens {
        async fn caller_identity(&self) -> Result<CallerIdentity, ServiceError> {
            unreachable!("not used by readiness")
        }

        async fn assume_role(
            &self,
            _role_arn: &str,
            _session_name: &str,
        ) -> Result<TemporaryCredentials, ServiceError> {
            if self.hang {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.failures {
                return Err(ServiceError::rejected("AccessDenied"));
            }
            Ok(TemporaryCredentials {
                access_key_id: "AKIA".to_string(),
                secret_access_key: "secret".to_string(),
                session_token: "token".to_string(),
                expiration: None,
            })
        }
    }

    fn fast_policy(max_wait: Duration) -> ReadinessPolicy {
        ReadinessPolicy {
            initial_delay: Duration::ZERO,
            attempt_timeout: Duration::from_millis(50),
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_wait,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let tokens = FlakyTokens::new(3);
        let assumer = RoleAssumer::new(&tokens, fast_policy(Duration::from_secs(5)));

        let ready = assumer
            .wait_until_assumable("arn:aws:iam::1:role/r", "s", &NoOpHandler)
            .await
            .unwrap();
        assert_eq!(ready.attempts, 4);
        assert_eq!(ready.credentials.access_key_id, "AKIA");
    }

    #[tokio::test]
    async fn test_gives_up_after_deadline() {
        let tokens = FlakyTokens::new(u32::MAX);
        let assumer = RoleAssumer::new(&tokens, fast_policy(Duration::from_millis(20)));

        let err = assumer
            .wait_until_assumable("arn:aws:iam::1:role/r", "s", &NoOpHandler)
            .await
            .unwrap_err();
        assert!(err.attempts >= 1);
        assert_eq!(err.role_arn, "arn:aws:iam::1:role/r");
        assert!(err.to_string().contains("Try running again"));
    }

    #[tokio::test]
    async fn test_zero_wait_makes_single_attempt() {
        let tokens = FlakyTokens::new(1);
        let assumer = RoleAssumer::new(&tokens, fast_policy(Duration::ZERO));

        let err = assumer
            .wait_until_assumable("arn", "s", &NoOpHandler)
            .await
            .unwrap_err();
        assert_eq!(err.attempts, 1);
        assert_eq!(tokens.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_attempt_timeout() {
        let tokens = FlakyTokens {
            hang: true,
            ..FlakyTokens::new(0)
        };
        let assumer = RoleAssumer::new(&tokens, fast_policy(Duration::ZERO));

        let err = assumer.assume("arn", "s").await.unwrap_err();
        assert!(matches!(err, ServiceError::Timeout(_)));
    }
}
