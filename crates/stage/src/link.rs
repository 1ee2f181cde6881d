//! Upstream/downstream composition.
//!
//! Anything that can take items is a [`Target`]. A stage is one itself, so
//! stages chain by handing an `Arc` of the next stage to the previous one.

use std::sync::Arc;

use crossbeam::channel::Sender;

use crate::error::StageError;

/// Receives items, singly or as an ordered batch.
///
/// Downstream of a stage, `post_batch` is called once per completed batch
/// with a non-empty `Vec`. Implementations must not block indefinitely: every
/// blocked delivery pins an executor thread and an in-flight permit.
pub trait Target<T>: Send + Sync {
    fn post(&self, item: T) -> Result<(), StageError> {
        self.post_batch(vec![item])
    }

    fn post_batch(&self, items: Vec<T>) -> Result<(), StageError>;
}

impl<T, X> Target<T> for Arc<X>
where
    X: Target<T> + ?Sized,
{
    fn post(&self, item: T) -> Result<(), StageError> {
        (**self).post(item)
    }

    fn post_batch(&self, items: Vec<T>) -> Result<(), StageError> {
        (**self).post_batch(items)
    }
}

/// Forward each batch into a channel.
impl<T: Send> Target<T> for Sender<Vec<T>> {
    fn post_batch(&self, items: Vec<T>) -> Result<(), StageError> {
        self.send(items)
            .map_err(|_| StageError::Delivery("batch receiver disconnected".into()))
    }
}

/// Adapts a closure into a [`Target`].
pub struct FnTarget<F>(pub F);

impl<T, F> Target<T> for FnTarget<F>
where
    F: Fn(Vec<T>) -> Result<(), StageError> + Send + Sync,
{
    fn post_batch(&self, items: Vec<T>) -> Result<(), StageError> {
        (self.0)(items)
    }
}
