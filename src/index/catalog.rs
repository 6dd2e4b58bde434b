use std::path::Path;

use crate::core::names::path_key;
use crate::core::{Entry, EntryId, EntryKind, Volume, VolumeId};
use crate::index::store::{self, EntryStore};
use crate::index::trie::Trie;
use crate::scan::ScanSink;

/// 路径落在哪个卷、按什么大小写规则比较
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Placement {
    pub volume: Option<VolumeId>,
    pub case_insensitive: bool,
}

impl From<&Volume> for Placement {
    fn from(v: &Volume) -> Self {
        Self {
            volume: Some(v.id),
            case_insensitive: v.case_insensitive,
        }
    }
}

/// Entry Store + 前缀索引（base name trie + token trie）。
///
/// 所有结构变更都在这里成对完成：store 与两棵 trie 之间不允许出现孤儿。
#[derive(Debug, Default)]
pub struct Catalog {
    pub(crate) store: EntryStore,
    pub(crate) names: Trie,
    pub(crate) words: Trie,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self) -> &EntryStore {
        &self.store
    }

    pub fn names(&self) -> &Trie {
        &self.names
    }

    pub fn words(&self) -> &Trie {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn lookup(&self, path: &Path, at: Placement) -> Option<&Entry> {
        let id = store::lookup(&self.store, path, at.case_insensitive)?;
        self.store.get(id)
    }

    /// 已存在则原样返回 `(id, false)`，保证同一路径只有一个 Entry。
    pub fn upsert(&mut self, path: &Path, kind: EntryKind, at: Placement) -> (EntryId, bool) {
        let key = path_key(path, at.case_insensitive);
        let id = match self.store.insert(key, path.to_path_buf(), kind, at.volume) {
            Ok(id) => id,
            Err(existing) => return (existing, false),
        };
        if let Some(e) = self.store.get(id) {
            self.names.insert(&e.base_name, id);
            for tok in &e.name_tokens {
                self.words.insert(tok, id);
            }
        }
        (id, true)
    }

    fn detach(&mut self, key: &str) -> Option<Entry> {
        let e = self.store.remove(key)?;
        self.names.remove(&e.base_name, e.id);
        for tok in &e.name_tokens {
            self.words.remove(tok, e.id);
        }
        Some(e)
    }

    /// 移除 `path` 及其（若为目录）所有已索引后代，返回被移除的 entry。
    pub fn remove_subtree(&mut self, path: &Path, at: Placement) -> Vec<Entry> {
        let mut removed = Vec::new();
        let key = path_key(path, at.case_insensitive);
        if let Some(e) = self.detach(&key) {
            let is_dir = e.kind == EntryKind::Dir;
            removed.push(e);
            if !is_dir {
                return removed;
            }
        }
        for id in self.store.descendants_of(path) {
            let Some(key) = self
                .store
                .get(id)
                .map(|d| path_key(&d.canonical_path, at.case_insensitive))
            else {
                continue;
            };
            if let Some(e) = self.detach(&key) {
                removed.push(e);
            }
        }
        removed
    }

    /// 改名/移动：一次 `&mut self` 调用内完成 store 与 trie 的全部更新。
    ///
    /// 旧路径未被索引时返回 None（调用方决定是否改走 upsert）。
    /// 目标路径上已有的其它 entry 视为被覆盖，先行移除。
    pub fn rename(
        &mut self,
        old: &Path,
        old_at: Placement,
        new: &Path,
        new_at: Placement,
        kind: EntryKind,
    ) -> Option<EntryId> {
        let old_key = path_key(old, old_at.case_insensitive);
        let id = self.store.id_of(&old_key)?;
        let new_key = path_key(new, new_at.case_insensitive);

        if let Some(existing) = self.store.id_of(&new_key) {
            if existing != id {
                self.remove_subtree(new, new_at);
            }
        }

        // 后代：只重写路径与 key，base name 不变，trie 不动
        for d in self.store.descendants_of(old) {
            let Some(e) = self.store.get(d) else {
                continue;
            };
            let Ok(rel) = e.canonical_path.strip_prefix(old) else {
                continue;
            };
            let moved = new.join(rel);
            let from_key = path_key(&e.canonical_path, old_at.case_insensitive);
            self.store.rekey(&from_key, path_key(&moved, new_at.case_insensitive));
            if let Some(e) = self.store.get_mut(d) {
                e.depth = crate::core::entry::path_depth(&moved);
                e.canonical_path = moved;
                e.volume_id = new_at.volume;
            }
        }

        let fresh = Entry::new(id, new.to_path_buf(), kind, new_at.volume);
        let prev = self.store.get_mut(id)?;
        let old_entry = std::mem::replace(prev, fresh);
        self.store.rekey(&old_key, new_key);

        let (new_name, new_tokens) = match self.store.get(id) {
            Some(e) => (e.base_name.clone(), e.name_tokens.clone()),
            None => return None,
        };
        self.names.rename(&old_entry.base_name, &new_name, id);
        for tok in &old_entry.name_tokens {
            self.words.remove(tok, id);
        }
        for tok in &new_tokens {
            self.words.insert(tok, id);
        }
        Some(id)
    }

    /// 校验“无孤儿”不变量：trie 终点 ↔ store 双向一致。
    pub fn check_consistency(&self) -> Result<(), String> {
        let mut problem: Option<String> = None;
        self.names.for_each_terminal(|id| {
            if problem.is_none() && self.store.get(id).is_none() {
                problem = Some(format!("name trie references missing entry {:?}", id));
            }
        });
        self.words.for_each_terminal(|id| {
            if problem.is_none() && self.store.get(id).is_none() {
                problem = Some(format!("word trie references missing entry {:?}", id));
            }
        });
        if let Some(p) = problem {
            return Err(p);
        }

        for e in self.store.iter() {
            if !self.names.contains(&e.base_name, e.id) {
                return Err(format!(
                    "entry {:?} ({}) missing from name trie",
                    e.id,
                    e.canonical_path.display()
                ));
            }
        }
        if self.names.terminal_count() != self.store.len() {
            return Err(format!(
                "name trie holds {} ids but store holds {} entries",
                self.names.terminal_count(),
                self.store.len()
            ));
        }
        if self.store.key_count() != self.store.len() {
            return Err(format!(
                "identity map holds {} keys but store holds {} entries",
                self.store.key_count(),
                self.store.len()
            ));
        }
        Ok(())
    }

    pub fn clear(&mut self) {
        self.store.clear();
        self.names.clear();
        self.words.clear();
    }

    pub fn estimated_bytes(&self) -> u64 {
        self.store.estimated_bytes() + self.names.estimated_bytes() + self.words.estimated_bytes()
    }
}

impl ScanSink for Catalog {
    fn record(&mut self, path: &Path, kind: EntryKind, at: Placement) -> bool {
        self.upsert(path, kind, at).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const AT: Placement = Placement {
        volume: None,
        case_insensitive: false,
    };

    #[test]
    fn upsert_is_idempotent() {
        let mut c = Catalog::new();
        let p = PathBuf::from("/docs/plan.md");
        let (a, fresh) = c.upsert(&p, EntryKind::File, AT);
        assert!(fresh);
        let (b, fresh) = c.upsert(&p, EntryKind::File, AT);
        assert!(!fresh);
        assert_eq!(a, b);
        assert_eq!(c.len(), 1);
        assert!(c.check_consistency().is_ok());
    }

    #[test]
    fn word_trie_tracks_tokens() {
        let mut c = Catalog::new();
        let (id, _) = c.upsert(Path::new("/m/The Intern.mp4"), EntryKind::File, AT);
        assert!(c.words().lookup_prefix("int").contains(&id));
        assert!(c.words().lookup_prefix("mp").contains(&id));
        assert!(!c.names().lookup_prefix("int").contains(&id));
    }

    #[test]
    fn remove_directory_takes_descendants() {
        let mut c = Catalog::new();
        c.upsert(Path::new("/w"), EntryKind::Dir, AT);
        c.upsert(Path::new("/w/a.txt"), EntryKind::File, AT);
        c.upsert(Path::new("/w/sub"), EntryKind::Dir, AT);
        c.upsert(Path::new("/w/sub/b.txt"), EntryKind::File, AT);
        c.upsert(Path::new("/wx.txt"), EntryKind::File, AT);

        let removed = c.remove_subtree(Path::new("/w"), AT);
        assert_eq!(removed.len(), 4);
        assert_eq!(c.len(), 1);
        assert!(c.names().lookup_prefix("b").is_empty());
        assert!(c.check_consistency().is_ok());
    }

    #[test]
    fn rename_updates_entry_and_tries_together() {
        let mut c = Catalog::new();
        let (id, _) = c.upsert(Path::new("/d/old_name.txt"), EntryKind::File, AT);
        let got = c.rename(
            Path::new("/d/old_name.txt"),
            AT,
            Path::new("/d/fresh.txt"),
            AT,
            EntryKind::File,
        );
        assert_eq!(got, Some(id));
        assert!(c.lookup(Path::new("/d/old_name.txt"), AT).is_none());
        let e = c.lookup(Path::new("/d/fresh.txt"), AT).unwrap();
        assert_eq!(e.id, id);
        assert_eq!(e.base_name, "fresh.txt");
        assert!(c.names().lookup_prefix("old").is_empty());
        assert!(c.words().lookup_prefix("name").is_empty());
        assert!(c.words().lookup_prefix("fresh").contains(&id));
        assert!(c.check_consistency().is_ok());
    }

    #[test]
    fn rename_directory_rewrites_descendant_paths() {
        let mut c = Catalog::new();
        c.upsert(Path::new("/r/proj"), EntryKind::Dir, AT);
        let (child, _) = c.upsert(Path::new("/r/proj/src/main.rs"), EntryKind::File, AT);
        c.rename(
            Path::new("/r/proj"),
            AT,
            Path::new("/r/archive/proj2"),
            AT,
            EntryKind::Dir,
        );
        let e = c.store().get(child).unwrap();
        assert_eq!(e.canonical_path, PathBuf::from("/r/archive/proj2/src/main.rs"));
        assert_eq!(e.depth, 6);
        assert!(c
            .lookup(Path::new("/r/archive/proj2/src/main.rs"), AT)
            .is_some());
        assert!(c.lookup(Path::new("/r/proj/src/main.rs"), AT).is_none());
        assert!(c.check_consistency().is_ok());
    }

    #[test]
    fn rename_over_existing_target_replaces_it() {
        let mut c = Catalog::new();
        let (a, _) = c.upsert(Path::new("/x/a.txt"), EntryKind::File, AT);
        c.upsert(Path::new("/x/b.txt"), EntryKind::File, AT);
        c.rename(
            Path::new("/x/a.txt"),
            AT,
            Path::new("/x/b.txt"),
            AT,
            EntryKind::File,
        );
        assert_eq!(c.len(), 1);
        assert_eq!(c.lookup(Path::new("/x/b.txt"), AT).unwrap().id, a);
        assert!(c.check_consistency().is_ok());
    }

    #[test]
    fn consistency_check_flags_orphan_terminal() {
        let mut c = Catalog::new();
        c.upsert(Path::new("/ok.txt"), EntryKind::File, AT);
        c.names.insert("ghost", EntryId(999));
        assert!(c.check_consistency().is_err());
    }
}
