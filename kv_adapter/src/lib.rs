//! Thin typed wrapper over the external key-value store used by the
//! deception filesystem's state hypervisor and blob store.
//!
//! Mirrors the shape of a block-device driver trait: one abstract
//! interface (`KvStore`), one production backend (`RedisStore`), and
//! one in-memory double for tests (`fake::FakeStore`). Callers never
//! talk to `redis` directly outside this crate.

pub mod fake;
mod redis_store;
mod scripts;

pub use redis_store::RedisStore;
pub use scripts::{ScriptArg, ScriptName};

use std::collections::HashMap;

/// Classification of a failed KV operation, per spec: the adapter
/// never retries on its own, it only tells the caller whether retrying
/// could plausibly help.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("retryable store error: {0}")]
    Retryable(String),
    #[error("fatal store error: {0}")]
    Fatal(String),
}

impl KvError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, KvError::Retryable(_))
    }
}

/// Return value of a server-side script evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptValue {
    Int(i64),
    Str(String),
    Arr(Vec<String>),
}

impl ScriptValue {
    pub fn into_int(self) -> Option<i64> {
        match self {
            ScriptValue::Int(i) => Some(i),
            _ => None,
        }
    }
}

/// Vocabulary of commands the core needs from the external store:
/// an atomic counter, hash maps (inode metadata), sorted sets
/// (directory entries), opaque byte strings (blobs), existence/
/// delete, short-lived expiring keys (single-flight locks), and
/// evaluation of named server-side scripts.
pub trait KvStore: Send + Sync {
    /// Atomically increment a named counter and return the new value.
    fn incr(&self, key: &str) -> Result<i64, KvError>;

    /// Initialize a counter to `value` if it doesn't already exist; a
    /// no-op otherwise. Used to reserve low ids (e.g. the root inode)
    /// before the counter is ever `incr`'d.
    fn seed_counter(&self, key: &str, value: i64) -> Result<(), KvError>;

    /// Current value of a counter without incrementing it; 0 if unset.
    fn get_counter(&self, key: &str) -> Result<i64, KvError>;

    fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError>;
    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, KvError>;
    fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError>;
    fn hdel(&self, key: &str, field: &str) -> Result<(), KvError>;

    /// Directory entries: `name` is the member, `child_id` is the score.
    fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), KvError>;
    fn zrem(&self, key: &str, member: &str) -> Result<(), KvError>;
    fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, KvError>;
    /// All (member, score) pairs. Order is whatever the store returns;
    /// callers that need name order must sort themselves (see DESIGN.md).
    fn zrange_all(&self, key: &str) -> Result<Vec<(String, i64)>, KvError>;

    fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;
    fn set_bytes(&self, key: &str, value: &[u8]) -> Result<(), KvError>;
    fn exists(&self, key: &str) -> Result<bool, KvError>;
    fn del(&self, key: &str) -> Result<(), KvError>;

    /// `SET key value NX PX ttl_ms` — true if the lock was acquired.
    fn set_nx_px(&self, key: &str, value: &str, ttl_ms: usize) -> Result<bool, KvError>;

    /// Evaluate a named server-side script atomically.
    fn eval_script(
        &self,
        script: ScriptName,
        keys: &[&str],
        args: &[ScriptArg<'_>],
    ) -> Result<ScriptValue, KvError>;
}

/// Negative script return codes, per the Atomic Script Library contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptError {
    AlreadyExists,
    ParentMissing,
    NotFound,
    NotEmpty,
    InvariantViolation,
}

impl ScriptError {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(ScriptError::AlreadyExists),
            -2 => Some(ScriptError::ParentMissing),
            -3 => Some(ScriptError::NotFound),
            -4 => Some(ScriptError::NotEmpty),
            -5 => Some(ScriptError::InvariantViolation),
            _ => None,
        }
    }
}
