//! Key generation strategies.
//!
//! A generator produces the next identifier value for a key field when an
//! entry enters the `Added` state without one. Generation is synchronous by
//! default; [`AsyncKeyGenerator`] covers allocators that must await an
//! external source (a sequence block, a server round-trip). Cancellation
//! exists only on the asynchronous path and surfaces as
//! [`CoreError::KeyGenerationCanceled`], leaving the entry untouched.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};

use entitrack_metadata::Value;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};

/// A boxed future returned by asynchronous generators.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Produces the next value for a generated key field.
pub trait KeyGenerator: Send + Sync {
    /// Generates the next key value.
    fn generate(&self) -> CoreResult<Value>;
}

/// Produces the next value for a generated key field asynchronously.
///
/// Every synchronous generator is usable asynchronously through the blanket
/// implementation.
pub trait AsyncKeyGenerator: Send + Sync {
    /// Generates the next key value.
    fn generate_async(&self) -> BoxFuture<'_, CoreResult<Value>>;
}

impl<G: KeyGenerator> AsyncKeyGenerator for G {
    fn generate_async(&self) -> BoxFuture<'_, CoreResult<Value>> {
        let result = self.generate();
        Box::pin(std::future::ready(result))
    }
}

/// Generates random 128-bit identifiers as 16-byte values.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidKeyGenerator;

impl KeyGenerator for UuidKeyGenerator {
    fn generate(&self) -> CoreResult<Value> {
        Ok(Value::Bytes(Uuid::new_v4().into_bytes().to_vec()))
    }
}

/// Generates monotonically decreasing negative integers.
///
/// Negative values mark keys as temporary: the backing store assigns the
/// real value during synchronization and the staged result arrives through
/// the store-generated sidecar.
#[derive(Debug)]
pub struct SequenceKeyGenerator {
    next: AtomicI64,
}

impl SequenceKeyGenerator {
    /// Creates a generator starting at -1.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(-1),
        }
    }
}

impl Default for SequenceKeyGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyGenerator for SequenceKeyGenerator {
    fn generate(&self) -> CoreResult<Value> {
        Ok(Value::Integer(self.next.fetch_sub(1, Ordering::SeqCst)))
    }
}

/// A generator that always reports cancellation.
///
/// Stands in for an awaited allocator whose caller gave up; useful in
/// tests and as the canonical producer of the canceled error.
#[derive(Debug, Default, Clone, Copy)]
pub struct CanceledKeyGenerator;

impl AsyncKeyGenerator for CanceledKeyGenerator {
    fn generate_async(&self) -> BoxFuture<'_, CoreResult<Value>> {
        Box::pin(std::future::ready(Err(CoreError::KeyGenerationCanceled)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_generator_produces_distinct_bytes() {
        let generator = UuidKeyGenerator;
        let a = generator.generate().unwrap();
        let b = generator.generate().unwrap();
        assert_ne!(a, b);
        if let Value::Bytes(bytes) = a {
            assert_eq!(bytes.len(), 16);
        } else {
            panic!("expected bytes");
        }
    }

    #[test]
    fn sequence_generator_counts_down() {
        let generator = SequenceKeyGenerator::new();
        assert_eq!(generator.generate().unwrap(), Value::Integer(-1));
        assert_eq!(generator.generate().unwrap(), Value::Integer(-2));
        assert_eq!(generator.generate().unwrap(), Value::Integer(-3));
    }

    #[tokio::test]
    async fn sync_generator_usable_async() {
        let generator = SequenceKeyGenerator::new();
        let value = generator.generate_async().await.unwrap();
        assert_eq!(value, Value::Integer(-1));
    }

    #[tokio::test]
    async fn canceled_generator_propagates() {
        let generator = CanceledKeyGenerator;
        let err = generator.generate_async().await.unwrap_err();
        assert!(matches!(err, CoreError::KeyGenerationCanceled));
    }
}
