//! In-memory virtual filesystem with a simulated persistent store.

use bytes::Bytes;
use embridge_engine::{EngineError, EngineResult, FileStat, VirtualFs};
use futures::future::{FutureExt, LocalBoxFuture};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

const DIR_MODE: u32 = 0o040_777;
const FILE_MODE: u32 = 0o100_666;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Node {
    Dir { mtime_ms: u64 },
    File { data: Bytes, mtime_ms: u64 },
}

impl Node {
    fn dir() -> Self {
        Node::Dir { mtime_ms: now_ms() }
    }

    fn is_dir(&self) -> bool {
        matches!(self, Node::Dir { .. })
    }
}

/// Durable storage shared across engine instances.
///
/// Stands in for a browser's IndexedDB: it outlives any one engine, so a
/// restarted worker can repopulate its persistent mounts from it. Cloning
/// shares the same store.
#[derive(Debug, Clone, Default)]
pub struct PersistentStore {
    nodes: Arc<Mutex<BTreeMap<String, Node>>>,
}

impl PersistentStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the store holds an entry at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.nodes.lock().contains_key(path)
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.nodes.lock().len()
    }

    /// Returns true if nothing has been flushed yet.
    pub fn is_empty(&self) -> bool {
        self.nodes.lock().is_empty()
    }
}

/// The engine-side filesystem of [`crate::MemoryEngine`].
#[derive(Debug)]
pub struct MemoryFs {
    nodes: BTreeMap<String, Node>,
    mounts: BTreeSet<String>,
    store: PersistentStore,
}

impl MemoryFs {
    /// Creates a filesystem holding only `/`, backed by `store`.
    pub fn new(store: PersistentStore) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::dir());
        Self {
            nodes,
            mounts: BTreeSet::new(),
            store,
        }
    }

    fn node(&self, path: &str) -> EngineResult<&Node> {
        self.nodes
            .get(path)
            .ok_or_else(|| fs_error("ENOENT", "no such file or directory", path))
    }

    fn require_parent_dir(&self, path: &str) -> EngineResult<()> {
        match self.nodes.get(&parent(path)) {
            Some(node) if node.is_dir() => Ok(()),
            Some(_) => Err(fs_error("ENOTDIR", "not a directory", path)),
            None => Err(fs_error("ENOENT", "no such file or directory", path)),
        }
    }

    /// Paths strictly below `path`.
    fn descendants(&self, path: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|p| is_below(p, path))
            .cloned()
            .collect()
    }

    fn flush(&self, mount: &str) {
        let mut store = self.store.nodes.lock();
        store.retain(|p, _| !is_below(p, mount));
        for (p, node) in self.nodes.iter().filter(|(p, _)| is_below(p, mount)) {
            store.insert(p.clone(), node.clone());
        }
    }

    fn populate(&mut self, mount: &str) {
        self.nodes.retain(|p, _| !is_below(p, mount));
        let store = self.store.nodes.lock();
        for (p, node) in store.iter().filter(|(p, _)| is_below(p, mount)) {
            self.nodes.insert(p.clone(), node.clone());
        }
    }
}

impl VirtualFs for MemoryFs {
    fn read_file(&mut self, path: &str) -> EngineResult<Bytes> {
        let path = normalize(path)?;
        match self.node(&path)? {
            Node::File { data, .. } => Ok(data.clone()),
            Node::Dir { .. } => Err(fs_error("EISDIR", "illegal operation on a directory", &path)),
        }
    }

    fn write_file(&mut self, path: &str, data: &[u8]) -> EngineResult<()> {
        let path = normalize(path)?;
        self.require_parent_dir(&path)?;
        if self.nodes.get(&path).is_some_and(Node::is_dir) {
            return Err(fs_error("EISDIR", "illegal operation on a directory", &path));
        }
        self.nodes.insert(
            path,
            Node::File {
                data: Bytes::copy_from_slice(data),
                mtime_ms: now_ms(),
            },
        );
        Ok(())
    }

    fn mkdir(&mut self, path: &str) -> EngineResult<()> {
        let path = normalize(path)?;
        if self.nodes.contains_key(&path) {
            return Err(fs_error("EEXIST", "file already exists", &path));
        }
        self.require_parent_dir(&path)?;
        self.nodes.insert(path, Node::dir());
        Ok(())
    }

    fn unlink(&mut self, path: &str) -> EngineResult<()> {
        let path = normalize(path)?;
        if self.node(&path)?.is_dir() {
            return Err(fs_error("EISDIR", "illegal operation on a directory", &path));
        }
        self.nodes.remove(&path);
        Ok(())
    }

    fn rename(&mut self, old_path: &str, new_path: &str) -> EngineResult<()> {
        let old_path = normalize(old_path)?;
        let new_path = normalize(new_path)?;
        let node = self.node(&old_path)?.clone();
        if old_path == "/" || self.mounts.contains(&old_path) {
            return Err(fs_error("EBUSY", "resource busy or locked", &old_path));
        }
        if is_below(&new_path, &old_path) {
            return Err(fs_error("EINVAL", "invalid argument", &new_path));
        }
        self.require_parent_dir(&new_path)?;
        match self.nodes.get(&new_path) {
            Some(existing) if existing.is_dir() != node.is_dir() => {
                return Err(fs_error("EEXIST", "file already exists", &new_path));
            }
            Some(existing) if existing.is_dir() && !self.descendants(&new_path).is_empty() => {
                return Err(fs_error("ENOTEMPTY", "directory not empty", &new_path));
            }
            _ => {}
        }

        let moved: Vec<(String, Node)> = self
            .descendants(&old_path)
            .into_iter()
            .filter_map(|p| self.nodes.remove(&p).map(|n| (p, n)))
            .collect();
        self.nodes.remove(&old_path);
        self.nodes.insert(new_path.clone(), node);
        for (p, n) in moved {
            let suffix = &p[old_path.len()..];
            self.nodes.insert(format!("{new_path}{suffix}"), n);
        }
        Ok(())
    }

    fn rmdir(&mut self, path: &str) -> EngineResult<()> {
        let path = normalize(path)?;
        if !self.node(&path)?.is_dir() {
            return Err(fs_error("ENOTDIR", "not a directory", &path));
        }
        if path == "/" || self.mounts.contains(&path) {
            return Err(fs_error("EBUSY", "resource busy or locked", &path));
        }
        if !self.descendants(&path).is_empty() {
            return Err(fs_error("ENOTEMPTY", "directory not empty", &path));
        }
        self.nodes.remove(&path);
        Ok(())
    }

    fn stat(&mut self, path: &str) -> EngineResult<FileStat> {
        let path = normalize(path)?;
        Ok(match self.node(&path)? {
            Node::Dir { mtime_ms } => FileStat {
                size: 0,
                is_dir: true,
                mode: DIR_MODE,
                mtime_ms: *mtime_ms,
            },
            Node::File { data, mtime_ms } => FileStat {
                size: data.len() as u64,
                is_dir: false,
                mode: FILE_MODE,
                mtime_ms: *mtime_ms,
            },
        })
    }

    fn read_dir(&mut self, path: &str) -> EngineResult<Vec<String>> {
        let path = normalize(path)?;
        if !self.node(&path)?.is_dir() {
            return Err(fs_error("ENOTDIR", "not a directory", &path));
        }
        let mut entries = vec![".".to_string(), "..".to_string()];
        entries.extend(
            self.nodes
                .keys()
                .filter(|p| p.as_str() != "/" && parent(p) == path)
                .map(|p| file_name(p).to_string()),
        );
        Ok(entries)
    }

    fn unmount(&mut self, path: &str) -> EngineResult<()> {
        let path = normalize(path)?;
        if !self.mounts.remove(&path) {
            return Err(fs_error("EINVAL", "not mounted", &path));
        }
        self.nodes.retain(|p, _| !is_below(p, &path));
        Ok(())
    }

    fn mount_persistent(&mut self, path: &str) -> EngineResult<()> {
        let path = normalize(path)?;
        if !self.node(&path)?.is_dir() {
            return Err(fs_error("ENOTDIR", "not a directory", &path));
        }
        if path == "/" || self.mounts.contains(&path) {
            return Err(fs_error("EBUSY", "resource busy or locked", &path));
        }
        self.mounts.insert(path);
        Ok(())
    }

    fn sync_fs(&mut self, populate: bool) -> LocalBoxFuture<'_, EngineResult<()>> {
        async move {
            tokio::task::yield_now().await;
            let mounts: Vec<String> = self.mounts.iter().cloned().collect();
            for mount in &mounts {
                if populate {
                    self.populate(mount);
                } else {
                    self.flush(mount);
                }
            }
            tracing::debug!(populate, mounts = mounts.len(), "synchronized persistent mounts");
            Ok(())
        }
        .boxed_local()
    }
}

fn fs_error(code: &str, text: &str, path: &str) -> EngineError {
    EngineError::new(format!("{code}: {text}, '{path}'"))
}

/// Resolves `.`, `..` and repeated separators. Paths must be absolute.
fn normalize(path: &str) -> EngineResult<String> {
    if !path.starts_with('/') {
        return Err(fs_error("EINVAL", "path must be absolute", path));
    }
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    Ok(format!("/{}", parts.join("/")))
}

fn parent(path: &str) -> String {
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(i) => path[..i].to_string(),
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn is_below(path: &str, ancestor: &str) -> bool {
    if ancestor == "/" {
        return path != "/";
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fs() -> MemoryFs {
        MemoryFs::new(PersistentStore::new())
    }

    #[test]
    fn files_and_directories() {
        let mut fs = fs();
        fs.mkdir("/data").unwrap();
        fs.write_file("/data/a.txt", b"hello").unwrap();

        assert_eq!(fs.read_file("/data/./a.txt").unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(fs.read_dir("/data").unwrap(), vec![".", "..", "a.txt"]);
        let stat = fs.stat("/data/a.txt").unwrap();
        assert_eq!(stat.size, 5);
        assert!(!stat.is_dir);
        assert!(fs.stat("/data").unwrap().is_dir);

        assert!(fs.rmdir("/data").unwrap_err().message().starts_with("ENOTEMPTY"));
        fs.unlink("/data/a.txt").unwrap();
        fs.rmdir("/data").unwrap();
        assert!(fs.read_file("/data/a.txt").unwrap_err().message().starts_with("ENOENT"));
    }

    #[test]
    fn rename_moves_subtrees() {
        let mut fs = fs();
        fs.mkdir("/a").unwrap();
        fs.mkdir("/a/b").unwrap();
        fs.write_file("/a/b/f", b"x").unwrap();
        fs.rename("/a", "/z").unwrap();

        assert_eq!(fs.read_file("/z/b/f").unwrap(), Bytes::from_static(b"x"));
        assert!(fs.stat("/a").is_err());
        assert!(fs.rename("/z", "/z/inner").is_err());
    }

    #[test]
    fn write_requires_parent() {
        let mut fs = fs();
        let err = fs.write_file("/missing/f", b"x").unwrap_err();
        assert_eq!(err.message(), "ENOENT: no such file or directory, '/missing/f'");
        assert!(fs.mkdir("relative").is_err());
    }

    #[tokio::test]
    async fn sync_round_trips_through_store() {
        let store = PersistentStore::new();
        let mut first = MemoryFs::new(store.clone());
        first.mkdir("/persist").unwrap();
        first.mount_persistent("/persist").unwrap();
        first.write_file("/persist/db", b"pages").unwrap();
        first.write_file("/scratch", b"gone").unwrap();
        first.sync_fs(false).await.unwrap();
        assert!(store.contains("/persist/db"));
        assert!(!store.contains("/scratch"));

        let mut second = MemoryFs::new(store);
        second.mkdir("/persist").unwrap();
        second.mount_persistent("/persist").unwrap();
        assert!(second.read_file("/persist/db").is_err());
        second.sync_fs(true).await.unwrap();
        assert_eq!(second.read_file("/persist/db").unwrap(), Bytes::from_static(b"pages"));
    }

    #[test]
    fn unmount_drops_contents() {
        let mut fs = fs();
        fs.mkdir("/m").unwrap();
        fs.mount_persistent("/m").unwrap();
        fs.write_file("/m/f", b"1").unwrap();
        assert!(fs.mount_persistent("/m").is_err());
        fs.unmount("/m").unwrap();
        assert!(fs.read_file("/m/f").is_err());
        assert!(fs.unmount("/m").is_err());
        assert_eq!(normalize("//a/../b/").unwrap(), "/b");
    }
}
