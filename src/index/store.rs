use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::core::names;
use crate::core::{Entry, EntryId, EntryKind, VolumeId};

/// Entry 仓库：slab + freelist，外加 path key → id 的身份索引。
///
/// 身份 key 由调用方按卷的大小写规则生成（[`names::path_key`]），
/// 同一个 key 至多对应一个 Entry。
#[derive(Debug, Default)]
pub struct EntryStore {
    slots: Vec<Option<Entry>>,
    free: Vec<u32>,
    by_key: HashMap<String, EntryId>,
    len: usize,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, id: EntryId) -> Option<&Entry> {
        self.slots.get(id.index()).and_then(|s| s.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: EntryId) -> Option<&mut Entry> {
        self.slots.get_mut(id.index()).and_then(|s| s.as_mut())
    }

    pub fn id_of(&self, key: &str) -> Option<EntryId> {
        self.by_key.get(key).copied()
    }

    /// 分配槽位并写入；key 已存在时返回 `Err(已有 id)`，不覆盖。
    pub(crate) fn insert(
        &mut self,
        key: String,
        path: PathBuf,
        kind: EntryKind,
        volume: Option<VolumeId>,
    ) -> Result<EntryId, EntryId> {
        if let Some(existing) = self.by_key.get(&key) {
            return Err(*existing);
        }
        let id = match self.free.pop() {
            Some(slot) => EntryId(slot),
            None => {
                self.slots.push(None);
                EntryId((self.slots.len() - 1) as u32)
            }
        };
        self.slots[id.index()] = Some(Entry::new(id, path, kind, volume));
        self.by_key.insert(key, id);
        self.len += 1;
        Ok(id)
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<Entry> {
        let id = self.by_key.remove(key)?;
        let entry = self.slots.get_mut(id.index()).and_then(Option::take);
        if entry.is_some() {
            self.free.push(id.0);
            self.len -= 1;
        }
        entry
    }

    /// 只改身份 key（路径重写时用），不动槽位
    pub(crate) fn rekey(&mut self, old_key: &str, new_key: String) -> Option<EntryId> {
        let id = self.by_key.remove(old_key)?;
        self.by_key.insert(new_key, id);
        Some(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.slots.iter().filter_map(|s| s.as_ref())
    }

    /// `dir` 之下（不含自身）的所有 entry id
    pub fn descendants_of(&self, dir: &Path) -> Vec<EntryId> {
        self.iter()
            .filter(|e| e.canonical_path != dir && e.canonical_path.starts_with(dir))
            .map(|e| e.id)
            .collect()
    }

    /// 直接子项：按父路径过滤，无需走搜索
    pub fn children_of(&self, dir: &Path) -> Vec<&Entry> {
        self.iter().filter(|e| e.parent() == Some(dir)).collect()
    }

    pub fn key_count(&self) -> usize {
        self.by_key.len()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.by_key.clear();
        self.len = 0;
    }

    /// 估算堆占用（粗估、偏保守）：slab 槽位 + entry 自身 + key map
    pub fn estimated_bytes(&self) -> u64 {
        use std::mem::size_of;
        let slots = self.slots.capacity() as u64 * size_of::<Option<Entry>>() as u64;
        let entries: u64 = self
            .iter()
            .map(|e| e.estimated_bytes() - size_of::<Entry>() as u64)
            .sum();
        let ctrl = 16u64;
        let map = self.by_key.capacity() as u64 * (size_of::<(String, EntryId)>() as u64 + ctrl)
            + self.by_key.keys().map(|k| k.capacity() as u64).sum::<u64>();
        slots + entries + map + self.free.capacity() as u64 * 4
    }
}

/// 便捷：按给定大小写规则生成 key 后查 id
pub fn lookup(store: &EntryStore, path: &Path, case_insensitive: bool) -> Option<EntryId> {
    store.id_of(&names::path_key(path, case_insensitive))
}
