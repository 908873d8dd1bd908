use std::collections::HashMap;

use r2d2::Pool;
use redis::{Commands, RedisError, RetryMethod, Script};

use crate::scripts::{ScriptArg, ScriptName};
use crate::{KvError, KvStore, ScriptValue};

/// Production `KvStore` backed by Redis (or a Redis-protocol-compatible
/// store), connection-pooled with `r2d2`.
pub struct RedisStore {
    pool: Pool<redis::Client>,
    scripts: HashMap<ScriptName, Script>,
}

impl RedisStore {
    pub fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let pool = Pool::builder().max_size(16).build(client)?;
        let scripts = ScriptName::all()
            .iter()
            .map(|&name| (name, Script::new(name.source())))
            .collect();
        Ok(Self { pool, scripts })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<redis::Client>, KvError> {
        self.pool
            .get()
            .map_err(|e| KvError::Retryable(format!("pool checkout failed: {e}")))
    }
}

/// Classify a `redis::RedisError` the way the adapter contract requires:
/// transient/busy conditions are retryable, auth/type/protocol errors
/// are fatal. Delegates to the crate's own `retry_method()` classifier
/// rather than re-deriving it from `ErrorKind` by hand.
fn classify(err: RedisError) -> KvError {
    match err.retry_method() {
        RetryMethod::NoRetry => KvError::Fatal(err.to_string()),
        _ => KvError::Retryable(err.to_string()),
    }
}

impl KvStore for RedisStore {
    fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut conn = self.conn()?;
        conn.incr(key, 1).map_err(classify)
    }

    fn seed_counter(&self, key: &str, value: i64) -> Result<(), KvError> {
        let mut conn = self.conn()?;
        let _: bool = conn.set_nx(key, value).map_err(classify)?;
        Ok(())
    }

    fn get_counter(&self, key: &str) -> Result<i64, KvError> {
        let mut conn = self.conn()?;
        let value: Option<i64> = conn.get(key).map_err(classify)?;
        Ok(value.unwrap_or(0))
    }

    fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError> {
        let mut conn = self.conn()?;
        conn.hset(key, field, value).map_err(classify)
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, KvError> {
        let mut conn = self.conn()?;
        conn.hget(key, field).map_err(classify)
    }

    fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError> {
        let mut conn = self.conn()?;
        conn.hgetall(key).map_err(classify)
    }

    fn hdel(&self, key: &str, field: &str) -> Result<(), KvError> {
        let mut conn = self.conn()?;
        conn.hdel(key, field).map_err(classify)
    }

    fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), KvError> {
        let mut conn = self.conn()?;
        conn.zadd(key, member, score).map_err(classify)
    }

    fn zrem(&self, key: &str, member: &str) -> Result<(), KvError> {
        let mut conn = self.conn()?;
        conn.zrem(key, member).map_err(classify)
    }

    fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, KvError> {
        let mut conn = self.conn()?;
        let score: Option<f64> = conn.zscore(key, member).map_err(classify)?;
        Ok(score.map(|s| s as i64))
    }

    fn zrange_all(&self, key: &str) -> Result<Vec<(String, i64)>, KvError> {
        let mut conn = self.conn()?;
        let pairs: Vec<(String, f64)> = conn.zrange_withscores(key, 0, -1).map_err(classify)?;
        Ok(pairs.into_iter().map(|(m, s)| (m, s as i64)).collect())
    }

    fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let mut conn = self.conn()?;
        conn.get(key).map_err(classify)
    }

    fn set_bytes(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let mut conn = self.conn()?;
        conn.set(key, value).map_err(classify)
    }

    fn exists(&self, key: &str) -> Result<bool, KvError> {
        let mut conn = self.conn()?;
        conn.exists(key).map_err(classify)
    }

    fn del(&self, key: &str) -> Result<(), KvError> {
        let mut conn = self.conn()?;
        conn.del(key).map_err(classify)
    }

    fn set_nx_px(&self, key: &str, value: &str, ttl_ms: usize) -> Result<bool, KvError> {
        let mut conn = self.conn()?;
        let opts = redis::SetOptions::default()
            .conditional_set(redis::ExistenceCheck::NX)
            .with_expiration(redis::SetExpiry::PX(ttl_ms as u64));
        let result: redis::RedisResult<Option<String>> = conn.set_options(key, value, opts);
        match result {
            Ok(Some(_)) => Ok(true),
            Ok(None) => Ok(false),
            Err(e) => Err(classify(e)),
        }
    }

    fn eval_script(
        &self,
        script: ScriptName,
        keys: &[&str],
        args: &[ScriptArg<'_>],
    ) -> Result<ScriptValue, KvError> {
        let mut conn = self.conn()?;
        let s = self.scripts.get(&script).expect("all scripts registered");
        let mut invocation = s.prepare_invoke();
        for k in keys {
            invocation.key(*k);
        }
        for a in args {
            invocation.arg(a.to_arg_string());
        }
        let value: redis::Value = invocation.invoke(&mut *conn).map_err(classify)?;
        convert_value(value)
    }
}

fn convert_value(value: redis::Value) -> Result<ScriptValue, KvError> {
    match value {
        redis::Value::Int(i) => Ok(ScriptValue::Int(i)),
        redis::Value::BulkString(b) => Ok(ScriptValue::Str(
            String::from_utf8(b).map_err(|e| KvError::Fatal(format!("non-utf8 script reply: {e}")))?,
        )),
        redis::Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match convert_value(item)? {
                    ScriptValue::Str(s) => out.push(s),
                    ScriptValue::Int(i) => out.push(i.to_string()),
                    ScriptValue::Arr(_) => {
                        return Err(KvError::Fatal("nested array script reply".into()))
                    }
                }
            }
            Ok(ScriptValue::Arr(out))
        }
        redis::Value::Nil => Ok(ScriptValue::Int(0)),
        other => Err(KvError::Fatal(format!("unexpected script reply: {other:?}"))),
    }
}
