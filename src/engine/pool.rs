//! Bounded Connection Pool
//!
//! A semaphore caps the number of connections in use; idle connections are parked
//! in a vector and reused. Connections are opened lazily by the caller-supplied
//! connect future. The [`Pooled`] guard returns its connection when dropped, so a
//! connection is released on every exit path including early `?` returns.

use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::sync::Mutex;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::{AskError, Result};

/// Bounded pool of connections of type `C`
pub struct Pool<C> {
    permits: Semaphore,
    idle: Mutex<Vec<C>>,
    size: usize,
    is_usable: fn(&C) -> bool,
}

impl<C> std::fmt::Debug for Pool<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pool")
            .field("size", &self.size)
            .field("available", &self.permits.available_permits())
            .field("closed", &self.permits.is_closed())
            .finish()
    }
}

impl<C> Pool<C> {
    /// Create a pool allowing at most `size` connections in use at once
    #[must_use]
    pub fn new(size: usize) -> Self {
        Self::with_check(size, |_| true)
    }

    /// Create a pool that discards idle connections failing `is_usable`
    #[must_use]
    pub fn with_check(size: usize, is_usable: fn(&C) -> bool) -> Self {
        let size = size.max(1);
        Self { permits: Semaphore::new(size), idle: Mutex::new(Vec::new()), size, is_usable }
    }

    /// Maximum number of connections in use at once
    #[must_use]
    pub const fn size(&self) -> usize {
        self.size
    }

    /// Number of parked idle connections
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().map_or(0, |idle| idle.len())
    }

    /// Whether [`Pool::close`] has been called
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Acquire a connection, opening a new one with `connect` when none is idle
    ///
    /// Waits while `size` connections are already in use.
    ///
    /// # Errors
    /// Returns `AskError::ConnectionFailed` if the pool is closed, or whatever
    /// `connect` fails with.
    pub async fn acquire_with<F, Fut>(&self, connect: F) -> Result<Pooled<'_, C>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<C>>,
    {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AskError::connection_failed("Connection pool is closed"))?;

        let conn = match self.take_idle() {
            Some(conn) => conn,
            None => connect().await?,
        };

        Ok(Pooled { pool: self, conn: Some(conn), discard: false, _permit: permit })
    }

    fn take_idle(&self) -> Option<C> {
        let mut idle = self.idle.lock().ok()?;
        while let Some(conn) = idle.pop() {
            if (self.is_usable)(&conn) {
                return Some(conn);
            }
        }
        None
    }

    fn park(&self, conn: C) {
        if self.is_closed() {
            return;
        }
        if let Ok(mut idle) = self.idle.lock() {
            idle.push(conn);
        }
    }

    /// Close the pool: wake waiters with an error and drop idle connections
    pub fn close(&self) {
        self.permits.close();
        if let Ok(mut idle) = self.idle.lock() {
            idle.clear();
        }
    }
}

/// Scoped connection borrowed from a [`Pool`]
pub struct Pooled<'a, C> {
    pool: &'a Pool<C>,
    conn: Option<C>,
    discard: bool,
    _permit: SemaphorePermit<'a>,
}

impl<C> Pooled<'_, C> {
    /// Drop the connection instead of returning it to the pool
    pub fn discard(&mut self) {
        self.discard = true;
    }
}

impl<C> Deref for Pooled<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        // Only `Drop` takes the connection out
        self.conn.as_ref().unwrap_or_else(|| unreachable!("pooled connection already released"))
    }
}

impl<C> DerefMut for Pooled<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().unwrap_or_else(|| unreachable!("pooled connection already released"))
    }
}

impl<C> Drop for Pooled<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            if !self.discard {
                self.pool.park(conn);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    async fn open(counter: &AtomicUsize) -> Result<usize> {
        Ok(counter.fetch_add(1, Ordering::SeqCst))
    }

    #[tokio::test]
    async fn test_connection_is_reused() {
        let pool: Pool<usize> = Pool::new(2);
        let opened = AtomicUsize::new(0);

        {
            let conn = pool.acquire_with(|| open(&opened)).await.unwrap();
            assert_eq!(*conn, 0);
        }
        assert_eq!(pool.idle_count(), 1);

        let conn = pool.acquire_with(|| open(&opened)).await.unwrap();
        assert_eq!(*conn, 0);
        assert_eq!(opened.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_released_on_error_path() {
        let pool: Pool<usize> = Pool::new(1);
        let opened = AtomicUsize::new(0);

        let failing = async {
            let _conn = pool.acquire_with(|| open(&opened)).await?;
            Err::<(), _>(AskError::execution("boom"))
        };
        assert!(failing.await.is_err());

        // The single permit must be available again
        let conn = tokio::time::timeout(Duration::from_millis(100), pool.acquire_with(|| open(&opened)))
            .await
            .expect("pool should not be exhausted");
        assert!(conn.is_ok());
    }

    #[tokio::test]
    async fn test_bounded_concurrency() {
        let pool: Pool<usize> = Pool::new(1);
        let opened = AtomicUsize::new(0);

        let held = pool.acquire_with(|| open(&opened)).await.unwrap();
        let waiting =
            tokio::time::timeout(Duration::from_millis(50), pool.acquire_with(|| open(&opened))).await;
        assert!(waiting.is_err(), "second acquire should wait while the first is held");
        drop(held);
    }

    #[tokio::test]
    async fn test_discarded_connection_is_not_parked() {
        let pool: Pool<usize> = Pool::new(1);
        let opened = AtomicUsize::new(0);

        let mut conn = pool.acquire_with(|| open(&opened)).await.unwrap();
        conn.discard();
        drop(conn);
        assert_eq!(pool.idle_count(), 0);
    }

    #[tokio::test]
    async fn test_unusable_idle_connections_are_skipped() {
        let pool: Pool<usize> = Pool::with_check(2, |conn| *conn != 0);
        let opened = AtomicUsize::new(0);

        drop(pool.acquire_with(|| open(&opened)).await.unwrap());
        let conn = pool.acquire_with(|| open(&opened)).await.unwrap();
        assert_eq!(*conn, 1);
    }

    #[tokio::test]
    async fn test_closed_pool_rejects_acquire() {
        let pool: Pool<usize> = Pool::new(1);
        let opened = AtomicUsize::new(0);

        pool.close();
        let err = pool.acquire_with(|| open(&opened)).await.err().unwrap();
        assert_eq!(err.error_code(), "CONNECTION_FAILED");
        assert_eq!(opened.load(Ordering::SeqCst), 0);
    }
}
