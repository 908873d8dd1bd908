//! In-memory double for `KvStore`, the test-only counterpart of the
//! production `RedisStore`. Implements the five atomic scripts in
//! plain Rust under one mutex, so unit tests can exercise C2/C3/C4
//! without a live Redis.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::scripts::{ScriptArg, ScriptName};
use crate::{KvError, KvStore, ScriptValue};

#[derive(Default)]
struct State {
    counters: HashMap<String, i64>,
    hashes: HashMap<String, HashMap<String, String>>,
    zsets: HashMap<String, HashMap<String, i64>>,
    strings: HashMap<String, Vec<u8>>,
}

pub struct FakeStore {
    state: Mutex<State>,
}

impl Default for FakeStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    fn arg_str<'a>(args: &'a [ScriptArg<'a>], i: usize) -> &'a str {
        match &args[i] {
            ScriptArg::Str(s) => s,
            ScriptArg::Int(_) => panic!("expected string arg at {i}"),
        }
    }

    fn arg_i64(args: &[ScriptArg<'_>], i: usize) -> i64 {
        match &args[i] {
            ScriptArg::Int(n) => *n,
            ScriptArg::Str(s) => s.parse().expect("expected int-like string arg"),
        }
    }

    fn run_create_entry(&self, keys: &[&str], args: &[ScriptArg<'_>]) -> i64 {
        let mut st = self.state.lock().unwrap();
        let next_inode_key = keys[0].to_string();
        let dir_key = keys[1].to_string();
        let parent = Self::arg_i64(args, 0);
        let name = Self::arg_str(args, 1).to_string();
        let mode = Self::arg_str(args, 2).to_string();
        let etype = Self::arg_str(args, 3).to_string();
        let ts = Self::arg_str(args, 4).to_string();
        let uid = Self::arg_str(args, 5).to_string();
        let gid = Self::arg_str(args, 6).to_string();
        let symlink_target = if args.len() > 7 {
            Self::arg_str(args, 7).to_string()
        } else {
            String::new()
        };

        let parent_key = format!("fs:inode:{parent}");
        match st.hashes.get(&parent_key) {
            None => return -2,
            Some(h) => {
                if h.get("type").map(|s| s.as_str()) != Some("dir") {
                    return -2;
                }
            }
        }
        if st.zsets.get(&dir_key).and_then(|z| z.get(&name)).is_some() {
            return -1;
        }
        // Plain `INCR` semantics, matching `incr()` and the real store:
        // an unseeded counter starts at 0. Callers that need low ids
        // reserved (e.g. the root inode) must `seed_counter` first.
        let counter = st.counters.entry(next_inode_key).or_insert(0);
        *counter += 1;
        let new_id = *counter;

        let nlink = if etype == "dir" { "2" } else { "1" }.to_string();
        let inode_key = format!("fs:inode:{new_id}");
        let mut fields = HashMap::new();
        fields.insert("mode".into(), mode);
        fields.insert("type".into(), etype.clone());
        fields.insert("uid".into(), uid);
        fields.insert("gid".into(), gid);
        fields.insert("size".into(), symlink_target.len().to_string());
        fields.insert("ctime".into(), ts.clone());
        fields.insert("mtime".into(), ts.clone());
        fields.insert("atime".into(), ts.clone());
        fields.insert("nlink".into(), nlink);
        fields.insert("parent".into(), parent.to_string());
        fields.insert("name".into(), name.clone());
        if !symlink_target.is_empty() {
            fields.insert("symlink_target".into(), symlink_target);
        }
        st.hashes.insert(inode_key, fields);
        st.zsets.entry(dir_key).or_default().insert(name, new_id);

        if etype == "dir" {
            let p = st.hashes.get_mut(&parent_key).unwrap();
            let n: i64 = p.get("nlink").and_then(|s| s.parse().ok()).unwrap_or(0);
            p.insert("nlink".into(), (n + 1).to_string());
        }
        let p = st.hashes.get_mut(&parent_key).unwrap();
        p.insert("mtime".into(), ts.clone());
        p.insert("ctime".into(), ts);
        new_id
    }

    fn run_delete_entry(&self, keys: &[&str], args: &[ScriptArg<'_>]) -> i64 {
        let mut st = self.state.lock().unwrap();
        let dir_key = keys[0].to_string();
        let parent = Self::arg_i64(args, 0);
        let name = Self::arg_str(args, 1).to_string();
        let ts = Self::arg_str(args, 2).to_string();

        let child_id = match st.zsets.get(&dir_key).and_then(|z| z.get(&name)).copied() {
            Some(id) => id,
            None => return -3,
        };
        let child_key = format!("fs:inode:{child_id}");
        let child_type = st.hashes[&child_key]["type"].clone();

        st.zsets.get_mut(&dir_key).unwrap().remove(&name);

        if child_type == "dir" {
            let child_dir_key = format!("fs:dir:{child_id}");
            let has_children = st
                .zsets
                .get(&child_dir_key)
                .map(|z| !z.is_empty())
                .unwrap_or(false);
            if has_children {
                st.zsets.get_mut(&dir_key).unwrap().insert(name, child_id);
                return -4;
            }
            st.hashes.remove(&child_key);
            st.zsets.remove(&child_dir_key);
            let parent_key = format!("fs:inode:{parent}");
            let p = st.hashes.get_mut(&parent_key).unwrap();
            let n: i64 = p.get("nlink").and_then(|s| s.parse().ok()).unwrap_or(0);
            p.insert("nlink".into(), (n - 1).to_string());
        } else {
            let h = st.hashes.get_mut(&child_key).unwrap();
            let n: i64 = h.get("nlink").and_then(|s| s.parse().ok()).unwrap_or(0) - 1;
            h.insert("nlink".into(), n.to_string());
            if n <= 0 {
                st.hashes.remove(&child_key);
            }
        }
        let parent_key = format!("fs:inode:{parent}");
        if let Some(p) = st.hashes.get_mut(&parent_key) {
            p.insert("mtime".into(), ts.clone());
            p.insert("ctime".into(), ts);
        }
        child_id
    }

    fn run_rename_entry(&self, keys: &[&str], args: &[ScriptArg<'_>]) -> i64 {
        let mut st = self.state.lock().unwrap();
        let old_dir_key = keys[0].to_string();
        let new_dir_key = keys[1].to_string();
        let old_parent = Self::arg_i64(args, 0);
        let old_name = Self::arg_str(args, 1).to_string();
        let new_parent = Self::arg_i64(args, 2);
        let new_name = Self::arg_str(args, 3).to_string();
        let ts = Self::arg_str(args, 4).to_string();

        let child_id = match st
            .zsets
            .get(&old_dir_key)
            .and_then(|z| z.get(&old_name))
            .copied()
        {
            Some(id) => id,
            None => return -3,
        };
        let child_key = format!("fs:inode:{child_id}");
        let child_type = st.hashes[&child_key]["type"].clone();

        if let Some(dest_id) = st
            .zsets
            .get(&new_dir_key)
            .and_then(|z| z.get(&new_name))
            .copied()
        {
            let dest_key = format!("fs:inode:{dest_id}");
            let dest_type = st.hashes[&dest_key]["type"].clone();
            if dest_type != child_type {
                return -5;
            }
            if dest_type == "dir" {
                let dest_dir_key = format!("fs:dir:{dest_id}");
                let has_children = st
                    .zsets
                    .get(&dest_dir_key)
                    .map(|z| !z.is_empty())
                    .unwrap_or(false);
                if has_children {
                    return -4;
                }
                st.zsets.remove(&dest_dir_key);
                let np_key = format!("fs:inode:{new_parent}");
                let np = st.hashes.get_mut(&np_key).unwrap();
                let n: i64 = np.get("nlink").and_then(|s| s.parse().ok()).unwrap_or(0);
                np.insert("nlink".into(), (n - 1).to_string());
            }
            st.zsets.get_mut(&new_dir_key).unwrap().remove(&new_name);
            st.hashes.remove(&dest_key);
        }

        st.zsets.get_mut(&old_dir_key).unwrap().remove(&old_name);
        st.zsets
            .entry(new_dir_key)
            .or_default()
            .insert(new_name.clone(), child_id);
        {
            let h = st.hashes.get_mut(&child_key).unwrap();
            h.insert("ctime".into(), ts.clone());
            h.insert("parent".into(), new_parent.to_string());
            h.insert("name".into(), new_name);
        }

        if child_type == "dir" && old_parent != new_parent {
            let op_key = format!("fs:inode:{old_parent}");
            let op = st.hashes.get_mut(&op_key).unwrap();
            let n: i64 = op.get("nlink").and_then(|s| s.parse().ok()).unwrap_or(0);
            op.insert("nlink".into(), (n - 1).to_string());

            let np_key = format!("fs:inode:{new_parent}");
            let np = st.hashes.get_mut(&np_key).unwrap();
            let n: i64 = np.get("nlink").and_then(|s| s.parse().ok()).unwrap_or(0);
            np.insert("nlink".into(), (n + 1).to_string());
        }
        for pid in [old_parent, new_parent] {
            let pk = format!("fs:inode:{pid}");
            if let Some(p) = st.hashes.get_mut(&pk) {
                p.insert("mtime".into(), ts.clone());
                p.insert("ctime".into(), ts.clone());
            }
        }
        child_id
    }

    fn run_write_content(&self, keys: &[&str], args: &[ScriptArg<'_>], refuse_if_set: bool) -> i64 {
        let mut st = self.state.lock().unwrap();
        let inode_key = keys[0].to_string();
        let new_hash = Self::arg_str(args, 0).to_string();
        let new_size = Self::arg_str(args, 1).to_string();
        let ts = Self::arg_str(args, 2).to_string();

        let h = match st.hashes.get_mut(&inode_key) {
            Some(h) => h,
            None => return -3,
        };
        if refuse_if_set {
            if let Some(existing) = h.get("content_hash") {
                if !existing.is_empty() {
                    return -5;
                }
            }
        } else if h.get("type").map(|s| s.as_str()) != Some("file") {
            return -5;
        }
        h.insert("content_hash".into(), new_hash);
        h.insert("size".into(), new_size);
        h.insert("mtime".into(), ts.clone());
        h.insert("ctime".into(), ts);
        1
    }

    fn run_set_mode(&self, keys: &[&str], args: &[ScriptArg<'_>]) -> i64 {
        let mut st = self.state.lock().unwrap();
        let inode_key = keys[0].to_string();
        let mode = Self::arg_str(args, 0).to_string();
        let ts = Self::arg_str(args, 1).to_string();
        match st.hashes.get_mut(&inode_key) {
            None => -3,
            Some(h) => {
                h.insert("mode".into(), mode);
                h.insert("ctime".into(), ts);
                1
            }
        }
    }

    fn run_set_owner(&self, keys: &[&str], args: &[ScriptArg<'_>]) -> i64 {
        let mut st = self.state.lock().unwrap();
        let inode_key = keys[0].to_string();
        let uid = Self::arg_str(args, 0).to_string();
        let gid = Self::arg_str(args, 1).to_string();
        let ts = Self::arg_str(args, 2).to_string();
        match st.hashes.get_mut(&inode_key) {
            None => -3,
            Some(h) => {
                if uid != "-1" {
                    h.insert("uid".into(), uid);
                }
                if gid != "-1" {
                    h.insert("gid".into(), gid);
                }
                h.insert("ctime".into(), ts);
                1
            }
        }
    }

    fn run_set_times(&self, keys: &[&str], args: &[ScriptArg<'_>]) -> i64 {
        let mut st = self.state.lock().unwrap();
        let inode_key = keys[0].to_string();
        let atime = Self::arg_str(args, 0).to_string();
        let mtime = Self::arg_str(args, 1).to_string();
        let ts = Self::arg_str(args, 2).to_string();
        match st.hashes.get_mut(&inode_key) {
            None => -3,
            Some(h) => {
                if atime != "-1" {
                    h.insert("atime".into(), atime);
                }
                if mtime != "-1" {
                    h.insert("mtime".into(), mtime);
                }
                h.insert("ctime".into(), ts);
                1
            }
        }
    }
}

impl KvStore for FakeStore {
    fn incr(&self, key: &str) -> Result<i64, KvError> {
        let mut st = self.state.lock().unwrap();
        let v = st.counters.entry(key.to_string()).or_insert(0);
        *v += 1;
        Ok(*v)
    }

    fn seed_counter(&self, key: &str, value: i64) -> Result<(), KvError> {
        let mut st = self.state.lock().unwrap();
        st.counters.entry(key.to_string()).or_insert(value);
        Ok(())
    }

    fn get_counter(&self, key: &str) -> Result<i64, KvError> {
        let st = self.state.lock().unwrap();
        Ok(st.counters.get(key).copied().unwrap_or(0))
    }

    fn hset(&self, key: &str, field: &str, value: &str) -> Result<(), KvError> {
        let mut st = self.state.lock().unwrap();
        st.hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    fn hget(&self, key: &str, field: &str) -> Result<Option<String>, KvError> {
        let st = self.state.lock().unwrap();
        Ok(st.hashes.get(key).and_then(|h| h.get(field)).cloned())
    }

    fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, KvError> {
        let st = self.state.lock().unwrap();
        Ok(st.hashes.get(key).cloned().unwrap_or_default())
    }

    fn hdel(&self, key: &str, field: &str) -> Result<(), KvError> {
        let mut st = self.state.lock().unwrap();
        if let Some(h) = st.hashes.get_mut(key) {
            h.remove(field);
        }
        Ok(())
    }

    fn zadd(&self, key: &str, member: &str, score: i64) -> Result<(), KvError> {
        let mut st = self.state.lock().unwrap();
        st.zsets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string(), score);
        Ok(())
    }

    fn zrem(&self, key: &str, member: &str) -> Result<(), KvError> {
        let mut st = self.state.lock().unwrap();
        if let Some(z) = st.zsets.get_mut(key) {
            z.remove(member);
        }
        Ok(())
    }

    fn zscore(&self, key: &str, member: &str) -> Result<Option<i64>, KvError> {
        let st = self.state.lock().unwrap();
        Ok(st.zsets.get(key).and_then(|z| z.get(member)).copied())
    }

    fn zrange_all(&self, key: &str) -> Result<Vec<(String, i64)>, KvError> {
        let st = self.state.lock().unwrap();
        Ok(st
            .zsets
            .get(key)
            .map(|z| z.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default())
    }

    fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let st = self.state.lock().unwrap();
        Ok(st.strings.get(key).cloned())
    }

    fn set_bytes(&self, key: &str, value: &[u8]) -> Result<(), KvError> {
        let mut st = self.state.lock().unwrap();
        st.strings.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool, KvError> {
        let st = self.state.lock().unwrap();
        Ok(st.hashes.contains_key(key) || st.strings.contains_key(key) || st.zsets.contains_key(key))
    }

    fn del(&self, key: &str) -> Result<(), KvError> {
        let mut st = self.state.lock().unwrap();
        st.hashes.remove(key);
        st.strings.remove(key);
        st.zsets.remove(key);
        Ok(())
    }

    fn set_nx_px(&self, key: &str, value: &str, _ttl_ms: usize) -> Result<bool, KvError> {
        let mut st = self.state.lock().unwrap();
        if st.strings.contains_key(key) {
            return Ok(false);
        }
        st.strings.insert(key.to_string(), value.as_bytes().to_vec());
        Ok(true)
    }

    fn eval_script(
        &self,
        script: ScriptName,
        keys: &[&str],
        args: &[ScriptArg<'_>],
    ) -> Result<ScriptValue, KvError> {
        let code = match script {
            ScriptName::CreateEntry => self.run_create_entry(keys, args),
            ScriptName::DeleteEntry => self.run_delete_entry(keys, args),
            ScriptName::RenameEntry => self.run_rename_entry(keys, args),
            ScriptName::WriteContent => self.run_write_content(keys, args, false),
            ScriptName::MaterializeGhost => self.run_write_content(keys, args, true),
            ScriptName::SetMode => self.run_set_mode(keys, args),
            ScriptName::SetOwner => self.run_set_owner(keys, args),
            ScriptName::SetTimes => self.run_set_times(keys, args),
        };
        Ok(ScriptValue::Int(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_exists_after_manual_seed() {
        let store = FakeStore::new();
        store.hset("fs:inode:1", "type", "dir").unwrap();
        store.hset("fs:inode:1", "nlink", "2").unwrap();
        assert!(store.exists("fs:inode:1").unwrap());
    }

    #[test]
    fn create_entry_allocates_monotonic_ids() {
        let store = FakeStore::new();
        store.hset("fs:inode:1", "type", "dir").unwrap();
        store.hset("fs:inode:1", "nlink", "2").unwrap();
        store.seed_counter("fs:next_inode", 1).unwrap();

        let r1 = store
            .eval_script(
                ScriptName::CreateEntry,
                &["fs:next_inode", "fs:dir:1"],
                &[1i64.into(), "a".into(), "33188".into(), "file".into(), "100".into(), "0".into(), "0".into()],
            )
            .unwrap()
            .into_int()
            .unwrap();
        let r2 = store
            .eval_script(
                ScriptName::CreateEntry,
                &["fs:next_inode", "fs:dir:1"],
                &[1i64.into(), "b".into(), "33188".into(), "file".into(), "100".into(), "0".into(), "0".into()],
            )
            .unwrap()
            .into_int()
            .unwrap();
        assert!(r2 > r1);
    }
}
