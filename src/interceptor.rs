// ============================================================================
// Pre-save interception
// ============================================================================
//
// The host persistence layer depends on `PreSaveInterceptor` and asks it
// before every single-row save. `SharedBuffer` is the interceptor backed by a
// transaction buffer; hosts wire it in wherever their save hook lives.
//
// ============================================================================

use crate::channel::ExecutionChannel;
use crate::core::{BatchError, Result};
use crate::entity::EntityView;
use crate::transaction::{BatchConfig, CommitPlan, CommitReport, TransactionBuffer};
use std::future::Future;
use std::sync::{Arc, Mutex};

/// Capability the host entity layer calls right before persisting an entity.
pub trait PreSaveInterceptor: Send + Sync {
    /// `Ok(true)`: save it now through the normal path. `Ok(false)`: it was
    /// deferred and must not be saved now.
    fn before_save(&self, entity: &dyn EntityView) -> Result<bool>;
}

/// Run `save` unless the interceptor defers the entity.
///
/// Returns `Ok(None)` when the save was deferred.
pub async fn persist_or_defer<I, V, F, Fut, T, E>(
    interceptor: &I,
    entity: &V,
    save: F,
) -> std::result::Result<Option<T>, E>
where
    I: PreSaveInterceptor + ?Sized,
    V: EntityView,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: From<BatchError>,
{
    if interceptor.before_save(entity)? {
        save().await.map(Some)
    } else {
        Ok(None)
    }
}

/// Cloneable handle to one unit of work's buffer.
///
/// Registration only needs `&self`, so the handle can sit behind a host's
/// shared save hook. The lock is never held while statements execute.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    inner: Arc<Mutex<TransactionBuffer>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_buffer(buffer: TransactionBuffer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(buffer)),
        }
    }

    pub fn with_config(config: BatchConfig) -> Result<Self> {
        Ok(Self::from_buffer(TransactionBuffer::with_config(config)?))
    }

    pub fn start(&self) -> Result<()> {
        self.inner.lock()?.start();
        Ok(())
    }

    pub fn register<V: EntityView + ?Sized>(&self, entity: &V) -> Result<bool> {
        self.inner.lock()?.register(entity)
    }

    pub fn plan(&self) -> Result<Option<CommitPlan>> {
        self.inner.lock()?.plan()
    }

    /// Take the buffered saves under the lock, then execute them without it.
    pub async fn commit<C: ExecutionChannel + ?Sized>(&self, channel: &C) -> Result<CommitReport> {
        let plan = self.plan()?;
        match plan {
            Some(plan) => plan.execute(channel).await,
            None => Ok(CommitReport::default()),
        }
    }

    pub fn abort(&self) -> Result<usize> {
        Ok(self.inner.lock()?.abort())
    }

    pub fn is_collecting(&self) -> Result<bool> {
        Ok(self.inner.lock()?.is_collecting())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.inner.lock()?.len())
    }

    /// Run `f` with exclusive access to the buffer, e.g. to change settings.
    pub fn with_buffer<R>(&self, f: impl FnOnce(&mut TransactionBuffer) -> R) -> Result<R> {
        let mut buffer = self.inner.lock()?;
        Ok(f(&mut buffer))
    }
}

impl PreSaveInterceptor for SharedBuffer {
    fn before_save(&self, entity: &dyn EntityView) -> Result<bool> {
        self.register(entity)
    }
}
