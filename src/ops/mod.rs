//! 文件操作协作者：先校验名字，再动磁盘，最后经 SessionIndex 同步索引。
//! 校验失败时磁盘与索引都不变。

use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::core::names::validate_name;
use crate::core::EntryId;
use crate::error::{IndexError, Result};
use crate::index::SessionIndex;

/// 一次成功改名的凭据，交给 [`undo_rename`] 撤销
#[derive(Clone, Debug, Serialize)]
pub struct RenameReceipt {
    pub from: PathBuf,
    pub to: PathBuf,
    pub id: EntryId,
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> IndexError + '_ {
    move |e| {
        if e.kind() == ErrorKind::NotFound {
            IndexError::PathNotFound(path.to_path_buf())
        } else {
            IndexError::io(path, e)
        }
    }
}

fn already_exists(path: &Path) -> IndexError {
    IndexError::io(
        path,
        std::io::Error::new(ErrorKind::AlreadyExists, "target already exists"),
    )
}

/// 父目录不存在时一并创建并入库
fn ensure_dir(index: &mut SessionIndex, dir: &Path) -> Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(dir).map_err(|e| IndexError::io(dir, e))?;
    index.add(dir)?;
    Ok(())
}

/// 在 `dir` 下创建文件（已存在则覆盖内容），随后入库
pub fn create_file(index: &mut SessionIndex, dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    validate_name(name)?;
    ensure_dir(index, dir)?;
    let path = dir.join(name);
    std::fs::write(&path, content).map_err(|e| IndexError::io(&path, e))?;
    index.add(&path)?;
    tracing::info!("Created file {:?}", path);
    Ok(path)
}

/// 在 `dir` 下创建目录（已存在视为成功），随后入库
pub fn create_folder(index: &mut SessionIndex, dir: &Path, name: &str) -> Result<PathBuf> {
    validate_name(name)?;
    ensure_dir(index, dir)?;
    let path = dir.join(name);
    std::fs::create_dir_all(&path).map_err(|e| IndexError::io(&path, e))?;
    index.add(&path)?;
    tracing::info!("Created folder {:?}", path);
    Ok(path)
}

/// 创建目录并在其中放入若干空文件。所有名字先统一校验，任一不合法则什么都不创建。
pub fn create_folder_with_files(
    index: &mut SessionIndex,
    dir: &Path,
    name: &str,
    files: &[&str],
) -> Result<Vec<PathBuf>> {
    validate_name(name)?;
    for file in files {
        validate_name(file)?;
    }
    let folder = create_folder(index, dir, name)?;
    let mut created = Vec::with_capacity(files.len() + 1);
    for file in files {
        created.push(create_file(index, &folder, file, "")?);
    }
    created.insert(0, folder);
    Ok(created)
}

/// 同目录内改名
pub fn rename_item(index: &mut SessionIndex, path: &Path, new_name: &str) -> Result<RenameReceipt> {
    validate_name(new_name)?;
    let current = path.file_name().map(|n| n.to_string_lossy().into_owned());
    if current.as_deref() == Some(new_name) {
        return Err(IndexError::InvalidName {
            name: new_name.to_string(),
            reason: "name unchanged",
        });
    }
    let Some(parent) = path.parent() else {
        return Err(IndexError::PathNotFound(path.to_path_buf()));
    };
    let to = parent.join(new_name);
    move_path(index, path, &to)
}

/// 把改名倒回去：同样经过 `SessionIndex::rename`
pub fn undo_rename(index: &mut SessionIndex, receipt: &RenameReceipt) -> Result<RenameReceipt> {
    move_path(index, &receipt.to, &receipt.from)
}

fn move_path(index: &mut SessionIndex, from: &Path, to: &Path) -> Result<RenameReceipt> {
    if std::fs::symlink_metadata(from).is_err() {
        index.remove(from);
        return Err(IndexError::PathNotFound(from.to_path_buf()));
    }
    // 大小写不敏感卷上只改大小写时 exists() 为真，放行
    if to.exists() && !same_file(from, to) {
        return Err(already_exists(to));
    }
    std::fs::rename(from, to).map_err(io_err(from))?;
    let id = match index.rename(from, to) {
        Ok(id) => id,
        Err(err) => {
            // 索引没跟上就把磁盘改回去，两边保持一致
            if let Err(e) = std::fs::rename(to, from) {
                tracing::error!("Failed to roll back rename {:?} -> {:?}: {}", to, from, e);
            }
            return Err(err);
        }
    };
    tracing::info!("Renamed {:?} -> {:?}", from, to);
    Ok(RenameReceipt {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        id,
    })
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(x), Ok(y)) => x == y,
        _ => false,
    }
}

/// 删除文件或整个目录，并移除索引中的对应子树。返回移除的 entry 数。
pub fn delete_item(index: &mut SessionIndex, path: &Path) -> Result<usize> {
    let md = match std::fs::symlink_metadata(path) {
        Ok(md) => md,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            index.remove(path);
            return Err(IndexError::PathNotFound(path.to_path_buf()));
        }
        Err(e) => return Err(IndexError::io(path, e)),
    };
    if md.is_dir() {
        std::fs::remove_dir_all(path).map_err(io_err(path))?;
    } else {
        std::fs::remove_file(path).map_err(io_err(path))?;
    }
    let removed = index.remove(path);
    tracing::info!("Deleted {:?} ({} entries dropped)", path, removed);
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, VolumeConfig};
    use crate::core::VolumeClass;

    fn unique_tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let p = std::env::temp_dir().join(format!("fd-seek-{}-{}", tag, nanos));
        std::fs::create_dir_all(&p).unwrap();
        std::fs::canonicalize(p).unwrap()
    }

    fn session(root: &Path) -> SessionIndex {
        let mut vc = VolumeConfig::new(root, VolumeClass::Data);
        vc.case_insensitive = Some(false);
        SessionIndex::new(Config {
            volumes: vec![vc],
            user_roots: vec![],
            ..Config::default()
        })
    }

    #[test]
    fn created_items_are_searchable_immediately() {
        let root = unique_tmp_dir("ops-create");
        let mut idx = session(&root);

        let file = create_file(&mut idx, &root.join("new/project"), "notes.txt", "hi").unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hi");
        let folder = create_folder(&mut idx, &root, "Archive").unwrap();
        assert!(folder.is_dir());

        assert!(idx.get(&file).is_some());
        assert!(idx.get(&root.join("new/project")).is_some());
        assert_eq!(idx.search_indexed("notes", 1).unwrap()[0].entry.canonical_path, file);
        assert_eq!(idx.search_indexed("archive", 1).unwrap()[0].entry.canonical_path, folder);
    }

    #[test]
    fn invalid_names_touch_nothing() {
        let root = unique_tmp_dir("ops-invalid");
        let mut idx = session(&root);
        for bad in ["", "   ", "../escape", "a|b", "con:x", "..", "a/b"] {
            assert!(
                matches!(
                    create_file(&mut idx, &root, bad, ""),
                    Err(IndexError::InvalidName { .. })
                ),
                "{:?}",
                bad
            );
        }
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
        assert!(idx.is_empty());
    }

    #[test]
    fn rename_then_undo_restores_disk_and_index() {
        let root = unique_tmp_dir("ops-rename");
        let mut idx = session(&root);
        let file = create_file(&mut idx, &root, "draft.md", "").unwrap();

        let receipt = rename_item(&mut idx, &file, "final.md").unwrap();
        assert!(!file.exists());
        assert!(receipt.to.exists());
        assert!(idx.get(&file).is_none());
        assert_eq!(idx.get(&receipt.to).unwrap().id, receipt.id);

        let back = undo_rename(&mut idx, &receipt).unwrap();
        assert_eq!(back.id, receipt.id);
        assert!(file.exists());
        assert!(idx.get(&receipt.to).is_none());
        assert_eq!(idx.get(&file).unwrap().base_name, "draft.md");
        assert!(idx.check_consistency().is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn undo_back_to_a_name_that_only_exists_on_disk() {
        let root = unique_tmp_dir("ops-undo-odd");
        let mut idx = session(&root);
        let odd = root.join("what?.txt");
        std::fs::write(&odd, "q").unwrap();
        idx.add(&odd).unwrap();

        let receipt = rename_item(&mut idx, &odd, "ok.txt").unwrap();
        undo_rename(&mut idx, &receipt).unwrap();

        assert!(odd.exists());
        assert!(!root.join("ok.txt").exists());
        assert_eq!(idx.get(&odd).unwrap().id, receipt.id);
        assert!(idx.get(&root.join("ok.txt")).is_none());
        assert!(idx.check_consistency().is_ok());
    }

    #[test]
    fn folder_with_files_is_created_and_indexed() {
        let root = unique_tmp_dir("ops-bundle");
        let mut idx = session(&root);

        let created =
            create_folder_with_files(&mut idx, &root, "Trip", &["plan.md", "budget.csv"]).unwrap();
        assert_eq!(
            created,
            vec![root.join("Trip"), root.join("Trip/plan.md"), root.join("Trip/budget.csv")]
        );
        assert!(root.join("Trip/budget.csv").is_file());
        assert_eq!(idx.len(), 3);
        assert_eq!(
            idx.search_indexed("budget", 1).unwrap()[0].entry.canonical_path,
            root.join("Trip/budget.csv")
        );
    }

    #[test]
    fn folder_with_a_bad_file_name_creates_nothing() {
        let root = unique_tmp_dir("ops-bundle-bad");
        let mut idx = session(&root);

        assert!(matches!(
            create_folder_with_files(&mut idx, &root, "Trip", &["plan.md", "a|b"]),
            Err(IndexError::InvalidName { .. })
        ));
        assert_eq!(std::fs::read_dir(&root).unwrap().count(), 0);
        assert!(idx.is_empty());
    }

    #[test]
    fn rename_refuses_to_clobber() {
        let root = unique_tmp_dir("ops-clobber");
        let mut idx = session(&root);
        let a = create_file(&mut idx, &root, "a.txt", "a").unwrap();
        create_file(&mut idx, &root, "b.txt", "b").unwrap();

        assert!(matches!(
            rename_item(&mut idx, &a, "b.txt"),
            Err(IndexError::Io { .. })
        ));
        assert!(matches!(
            rename_item(&mut idx, &a, "a.txt"),
            Err(IndexError::InvalidName { .. })
        ));
        assert_eq!(std::fs::read_to_string(root.join("b.txt")).unwrap(), "b");
        assert_eq!(idx.len(), 2);
    }

    #[test]
    fn vanished_source_is_purged() {
        let root = unique_tmp_dir("ops-vanished");
        let mut idx = session(&root);
        let a = create_file(&mut idx, &root, "a.txt", "").unwrap();
        std::fs::remove_file(&a).unwrap();

        assert!(matches!(
            rename_item(&mut idx, &a, "b.txt"),
            Err(IndexError::PathNotFound(_))
        ));
        assert!(idx.is_empty());
    }

    #[test]
    fn delete_folder_drops_its_subtree() {
        let root = unique_tmp_dir("ops-delete");
        let mut idx = session(&root);
        let dir = create_folder(&mut idx, &root, "tmpdir").unwrap();
        create_file(&mut idx, &dir, "x.txt", "").unwrap();
        create_file(&mut idx, &root, "keep.txt", "").unwrap();

        assert_eq!(delete_item(&mut idx, &dir).unwrap(), 2);
        assert!(!dir.exists());
        assert_eq!(idx.len(), 1);
        assert!(matches!(
            delete_item(&mut idx, &dir),
            Err(IndexError::PathNotFound(_))
        ));
    }
}
