//! Wrapping callables with a rate limit check.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use super::limiter::RateLimiter;
use crate::error::QuotaExceeded;

/// A callable guarded by a rate limiter.
///
/// Each call derives a key from its arguments and checks it against the
/// limiter first. A denied call never reaches the wrapped function and
/// returns [`QuotaExceeded`]; an allowed call returns the function's output
/// unchanged, errors included.
pub struct RateLimited<F, K> {
    inner: F,
    limiter: Arc<RateLimiter>,
    key_extractor: K,
}

/// Wrap `f` so every call is first checked against `limiter` under the key
/// produced by `key_extractor`.
pub fn with_rate_limit<F, K>(f: F, limiter: Arc<RateLimiter>, key_extractor: K) -> RateLimited<F, K> {
    RateLimited {
        inner: f,
        limiter,
        key_extractor,
    }
}

impl<F, K> RateLimited<F, K> {
    /// Get the limiter guarding this callable.
    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    fn admit<A>(&self, args: &A) -> Result<(), QuotaExceeded>
    where
        K: Fn(&A) -> String,
    {
        let key = (self.key_extractor)(args);
        if self.limiter.is_allowed(&key) {
            return Ok(());
        }

        let policy = self.limiter.policy().key_prefix();
        let rejection = QuotaExceeded::new(policy, &key, self.limiter.get_reset_time(&key));
        debug!(
            policy = %policy,
            key = %key,
            retry_after_minutes = rejection.retry_after_minutes,
            "Rejected rate limited call"
        );
        Err(rejection)
    }

    /// Invoke a synchronous callable if its key has quota left.
    pub fn call<A, R>(&self, args: A) -> Result<R, QuotaExceeded>
    where
        F: Fn(A) -> R,
        K: Fn(&A) -> String,
    {
        self.admit(&args)?;
        Ok((self.inner)(args))
    }

    /// Invoke an asynchronous callable if its key has quota left.
    ///
    /// The quota check happens before the future is created and never
    /// suspends.
    pub async fn call_async<A, Fut>(&self, args: A) -> Result<Fut::Output, QuotaExceeded>
    where
        F: Fn(A) -> Fut,
        Fut: Future,
        K: Fn(&A) -> String,
    {
        self.admit(&args)?;
        Ok((self.inner)(args).await)
    }
}

impl<F, K> std::fmt::Debug for RateLimited<F, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimited")
            .field("limiter", &self.limiter)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::CatalogConfig;
    use crate::ratelimit::{PolicyName, Policy};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug)]
    struct Submission {
        email: String,
    }

    fn form_limiter(clock: &ManualClock) -> Arc<RateLimiter> {
        let settings = CatalogConfig::default().settings(PolicyName::Form);
        let policy = Policy::from_millis(settings.max_requests, settings.window_ms, "form").unwrap();
        Arc::new(RateLimiter::with_clock(policy, Arc::new(clock.clone())))
    }

    #[tokio::test]
    async fn test_eleventh_submission_rejected_before_call() {
        let clock = ManualClock::default();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let submit = with_rate_limit(
            move |submission: Submission| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    submission.email
                }
            },
            form_limiter(&clock),
            |_: &Submission| "user@example.com".to_string(),
        );

        for _ in 0..10 {
            let submission = Submission {
                email: "user@example.com".to_string(),
            };
            assert_eq!(submit.call_async(submission).await.unwrap(), "user@example.com");
        }

        clock.advance(Duration::from_secs(60));
        let err = submit
            .call_async(Submission {
                email: "user@example.com".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(calls.load(Ordering::SeqCst), 10);
        assert_eq!(err.policy, "form");
        assert_eq!(err.key, "user@example.com");
        assert_eq!(err.retry_after, Duration::from_secs(240));
        assert_eq!(err.retry_after_minutes, 4);
    }

    #[tokio::test]
    async fn test_inner_error_passes_through() {
        let clock = ManualClock::default();
        let guarded = with_rate_limit(
            |n: u32| async move {
                if n == 0 {
                    Err("zero is not allowed")
                } else {
                    Ok(n * 2)
                }
            },
            form_limiter(&clock),
            |n: &u32| n.to_string(),
        );

        assert_eq!(guarded.call_async(4).await, Ok(Ok(8)));
        assert_eq!(guarded.call_async(0).await, Ok(Err("zero is not allowed")));
    }

    #[test]
    fn test_sync_call() {
        let clock = ManualClock::default();
        let policy = Policy::from_millis(2, 1000, "upload").unwrap();
        let limiter = Arc::new(RateLimiter::with_clock(policy, Arc::new(clock.clone())));

        let upload = with_rate_limit(
            |(user, bytes): (&str, usize)| format!("{user}:{bytes}"),
            Arc::clone(&limiter),
            |(user, _): &(&str, usize)| user.to_string(),
        );

        assert_eq!(upload.call(("alice", 10)).unwrap(), "alice:10");
        assert_eq!(upload.call(("alice", 20)).unwrap(), "alice:20");
        assert!(upload.call(("alice", 30)).is_err());
        assert_eq!(upload.call(("bob", 5)).unwrap(), "bob:5");

        clock.advance(Duration::from_millis(1000));
        assert!(upload.call(("alice", 30)).is_ok());
        assert_eq!(upload.limiter().get_remaining("alice"), 1);
    }

    #[tokio::test]
    async fn test_concurrent_async_calls_respect_limit() {
        let policy = Policy::from_millis(5, 60_000, "api").unwrap();
        let limiter = Arc::new(RateLimiter::new(policy));
        let guarded = Arc::new(with_rate_limit(
            |n: usize| async move { n },
            limiter,
            |_: &usize| "shared".to_string(),
        ));

        let results = futures::future::join_all((0..20).map(|n| {
            let guarded = Arc::clone(&guarded);
            async move { guarded.call_async(n).await }
        }))
        .await;

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 5);
    }
}
