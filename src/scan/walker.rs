use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use wildmatch::WildMatch;

use crate::core::EntryKind;
use crate::scan::state::SoftFailure;

/// 列目录选项（从 Config 派生，批内并行共享只读引用）
pub struct ListOptions {
    skip: Vec<WildMatch>,
    pub follow_links: bool,
}

impl ListOptions {
    pub fn new(skip_dirs: &[String], follow_links: bool) -> Self {
        Self {
            skip: skip_dirs
                .iter()
                .map(|p| WildMatch::new(&p.to_lowercase()))
                .collect(),
            follow_links,
        }
    }

    /// 命中跳过名单的目录照常入库，但不下钻
    pub fn should_skip(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.skip.iter().any(|w| w.matches(&lower))
    }
}

/// 单个子项
#[derive(Clone, Debug)]
pub struct DirChild {
    pub path: PathBuf,
    pub kind: EntryKind,
    /// 需要入队下钻的目录：已经解析为规范路径（链接目标）
    pub descend: Option<PathBuf>,
    /// 子项级软失败（例如断链、环）
    pub failure: Option<SoftFailure>,
}

/// 一次列目录的结果
#[derive(Debug)]
pub struct Listing {
    pub dir: PathBuf,
    pub outcome: Result<Vec<DirChild>, SoftFailure>,
}

fn classify_io(kind: ErrorKind) -> SoftFailure {
    match kind {
        ErrorKind::PermissionDenied => SoftFailure::PermissionDenied,
        ErrorKind::NotFound => SoftFailure::Vanished,
        _ => SoftFailure::Unreadable,
    }
}

fn classify(err: &ignore::Error) -> SoftFailure {
    match err {
        ignore::Error::Loop { .. } => SoftFailure::BrokenLinkOrCycle,
        ignore::Error::WithPath { err, .. } | ignore::Error::WithDepth { err, .. } => classify(err),
        _ => err
            .io_error()
            .map(|e| classify_io(e.kind()))
            .unwrap_or(SoftFailure::Unreadable),
    }
}

fn error_path(err: &ignore::Error) -> Option<&Path> {
    match err {
        ignore::Error::WithPath { path, .. } => Some(path.as_path()),
        ignore::Error::WithDepth { err, .. } => error_path(err),
        _ => None,
    }
}

/// 列出 `dir` 的直接子项（不递归、不跟随链接、不应用 ignore 规则）。
///
/// 只做 IO，不碰索引：可以在 rayon 线程里并行调用。
pub fn list_dir(dir: &Path, opts: &ListOptions) -> Listing {
    let walker = WalkBuilder::new(dir)
        .max_depth(Some(1))
        .standard_filters(false)
        .follow_links(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .build();

    let mut children = Vec::new();
    for item in walker {
        let ent = match item {
            Ok(ent) => ent,
            Err(err) => {
                let failure = classify(&err);
                // depth 0 / 路径即目录本身 = 目录打不开
                let top_level = matches!(err, ignore::Error::WithDepth { depth: 0, .. })
                    || error_path(&err) == Some(dir);
                if top_level {
                    return Listing {
                        dir: dir.to_path_buf(),
                        outcome: Err(failure),
                    };
                }
                tracing::debug!("skip unreadable child in {:?}: {}", dir, err);
                continue;
            }
        };
        if ent.depth() == 0 {
            continue;
        }
        let Some(ft) = ent.file_type() else {
            continue;
        };
        let path = ent.path().to_path_buf();
        let name = ent.file_name().to_string_lossy();

        let mut child = DirChild {
            path: path.clone(),
            kind: EntryKind::from_file_type(ft),
            descend: None,
            failure: None,
        };

        if ft.is_dir() {
            if !opts.should_skip(&name) {
                child.descend = Some(path);
            }
        } else if ft.is_symlink() {
            // 链接：按目标类型归类；仅在 follow_links 时才下钻
            match std::fs::metadata(&path) {
                Ok(md) if md.is_dir() => {
                    child.kind = EntryKind::Dir;
                    if opts.follow_links && !opts.should_skip(&name) {
                        match std::fs::canonicalize(&path) {
                            Ok(target) => child.descend = Some(target),
                            Err(_) => child.failure = Some(SoftFailure::BrokenLinkOrCycle),
                        }
                    }
                }
                Ok(_) => {}
                Err(_) => child.failure = Some(SoftFailure::BrokenLinkOrCycle),
            }
        }
        children.push(child);
    }

    Listing {
        dir: dir.to_path_buf(),
        outcome: Ok(children),
    }
}
