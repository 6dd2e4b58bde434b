use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::core::names;
use crate::core::volume::VolumeId;

/// Entry 在 slab 中的槽位号。删除后槽位会被复用，调用方不应跨会话保存。
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct EntryId(pub u32);

impl EntryId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Dir,
}

impl EntryKind {
    pub fn from_file_type(ft: std::fs::FileType) -> Self {
        if ft.is_dir() {
            EntryKind::Dir
        } else {
            EntryKind::File
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EntryKind::File => "file",
            EntryKind::Dir => "folder",
        }
    }
}

/// 一个被索引的文件系统对象
#[derive(Clone, Debug, Serialize)]
pub struct Entry {
    pub id: EntryId,
    pub canonical_path: PathBuf,
    /// 原始大小写的 base name（展示用）
    pub base_name: String,
    /// NFC + 小写后的 base name（trie key / 比较用）
    #[serde(skip)]
    pub folded_name: String,
    pub name_tokens: Vec<String>,
    /// 路径分量数（根 `/` 为 1）
    pub depth: usize,
    pub volume_id: Option<VolumeId>,
    pub kind: EntryKind,
}

impl Entry {
    pub(crate) fn new(
        id: EntryId,
        canonical_path: PathBuf,
        kind: EntryKind,
        volume_id: Option<VolumeId>,
    ) -> Self {
        let base_name = names::base_name(&canonical_path);
        let folded_name = names::fold(&base_name);
        let name_tokens = names::tokenize(&folded_name);
        let depth = path_depth(&canonical_path);
        Self {
            id,
            canonical_path,
            base_name,
            folded_name,
            name_tokens,
            depth,
            volume_id,
            kind,
        }
    }

    /// 用于“忽略扩展名”的精确匹配：仅文件有 stem；`.bashrc` 这类点开头的名字不拆。
    pub fn folded_stem(&self) -> Option<&str> {
        if self.kind != EntryKind::File {
            return None;
        }
        names::stem(&self.folded_name)
    }

    pub fn parent(&self) -> Option<&Path> {
        self.canonical_path.parent()
    }

    /// 估算堆占用（粗估，不低估）
    pub fn estimated_bytes(&self) -> u64 {
        use std::mem::size_of;
        let tokens: usize = self.name_tokens.iter().map(|t| t.capacity()).sum();
        (size_of::<Entry>()
            + self.canonical_path.capacity()
            + self.base_name.capacity()
            + self.folded_name.capacity()
            + self.name_tokens.capacity() * size_of::<String>()
            + tokens) as u64
    }
}

#[inline]
pub fn path_depth(path: &Path) -> usize {
    path.components().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_derives_name_fields_from_path() {
        let e = Entry::new(
            EntryId(3),
            PathBuf::from("/Users/me/Documents/Quarterly-Report_v2.DOCX"),
            EntryKind::File,
            None,
        );
        assert_eq!(e.base_name, "Quarterly-Report_v2.DOCX");
        assert_eq!(e.folded_name, "quarterly-report_v2.docx");
        assert_eq!(e.name_tokens, vec!["quarterly", "report", "v2", "docx"]);
        assert_eq!(e.depth, 5);
        assert_eq!(e.folded_stem(), Some("quarterly-report_v2"));
    }

    #[test]
    fn directories_have_no_stem() {
        let e = Entry::new(
            EntryId(0),
            PathBuf::from("/data/archive.d"),
            EntryKind::Dir,
            None,
        );
        assert_eq!(e.folded_stem(), None);
    }
}
