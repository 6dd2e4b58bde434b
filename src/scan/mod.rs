pub mod state;
pub mod walker;

pub use state::{FrontierItem, Priority, ScanState, SoftFailure};
pub use walker::{list_dir, DirChild, ListOptions, Listing};

use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::core::{volume_for, EntryKind, ScanPolicy, Volume};
use crate::index::catalog::Placement;

/// 扫描结果的落点。扫描器只产出 (路径, 类型, 归属)，索引结构由实现方维护。
pub trait ScanSink {
    /// 返回 true 表示新入库
    fn record(&mut self, path: &Path, kind: EntryKind, at: Placement) -> bool;
}

#[derive(Clone, Debug, Default)]
pub struct StepReport {
    pub directories: usize,
    pub entries_added: usize,
    pub soft_failures: usize,
}

/// 渐进式扫描器（无状态）：进度全部在各卷的 [`ScanState`] 里，由调用方持有。
///
/// 每一步弹出一个目录、列出直接子项、入库、按策略把子目录入队。
/// 一批目录的列目录 IO 用 rayon 并行，结构变更随后按弹出顺序串行应用。
pub struct Scanner {
    opts: ListOptions,
    batch: usize,
    user_roots: Vec<PathBuf>,
}

impl Scanner {
    pub fn new(opts: ListOptions, batch: usize, user_roots: Vec<PathBuf>) -> Self {
        Self {
            opts,
            batch: batch.max(1),
            user_roots,
        }
    }

    pub fn is_user_relevant(&self, path: &Path) -> bool {
        self.user_roots.iter().any(|r| path.starts_with(r))
    }

    /// 最多扫描 `max_dirs` 个目录。`pending` 表示有查询在等结果（Bounded 卷可越过深度上限）。
    pub fn run(
        &self,
        scans: &mut [ScanState],
        volumes: &[Volume],
        sink: &mut impl ScanSink,
        max_dirs: usize,
        pending: bool,
    ) -> StepReport {
        let mut report = StepReport::default();

        while report.directories < max_dirs {
            let want = (max_dirs - report.directories).min(self.batch);
            let picked = pick_next(scans, want, pending);
            if picked.is_empty() {
                break;
            }

            let listings: Vec<Listing> = picked
                .par_iter()
                .map(|(_, item)| list_dir(&item.path, &self.opts))
                .collect();

            for ((slot, item), listing) in picked.into_iter().zip(listings) {
                let st = &mut scans[slot];
                let Some(volume) = volumes.get(st.volume.index()) else {
                    continue;
                };
                self.apply(st, volume, volumes, sink, item, listing, &mut report);
            }
        }

        for st in scans.iter_mut() {
            if st.refresh_exhausted() {
                tracing::info!(
                    "{} exhausted: {} directories visited, {} soft failures",
                    st.volume,
                    st.directories_visited(),
                    st.failure_total()
                );
            }
        }

        if report.directories > 0 {
            tracing::debug!(
                "Scan batch: {} dirs, {} new entries, {} soft failures",
                report.directories,
                report.entries_added,
                report.soft_failures
            );
        }
        report
    }

    #[allow(clippy::too_many_arguments)]
    fn apply(
        &self,
        st: &mut ScanState,
        volume: &Volume,
        volumes: &[Volume],
        sink: &mut impl ScanSink,
        item: FrontierItem,
        listing: Listing,
        report: &mut StepReport,
    ) {
        st.mark_visited(item.path.clone());
        report.directories += 1;

        let children = match listing.outcome {
            Ok(children) => children,
            Err(failure) => {
                tracing::debug!("Soft failure {:?} listing {:?}", failure, listing.dir);
                st.record_failure(failure);
                report.soft_failures += 1;
                return;
            }
        };

        let placement_of = |p: &Path| -> Placement {
            volume_for(volumes, p)
                .map(Placement::from)
                .unwrap_or_else(|| Placement::from(volume))
        };

        let mut added = 0u64;
        if item.is_seed && sink.record(&item.path, EntryKind::Dir, placement_of(&item.path)) {
            added += 1;
        }

        for child in children {
            if let Some(failure) = child.failure {
                st.record_failure(failure);
                report.soft_failures += 1;
            }
            if sink.record(&child.path, child.kind, placement_of(&child.path)) {
                added += 1;
            }

            let Some(target) = child.descend else {
                continue;
            };
            // 只在本卷内下钻：嵌套挂载点归它自己的卷扫描
            if volume_for(volumes, &target).map(|v| v.id) != Some(volume.id) {
                continue;
            }
            let user_relevant = item.priority == Priority::UserRelevant || self.is_user_relevant(&target);
            if st.policy == ScanPolicy::Bounded && !user_relevant {
                continue;
            }
            let priority = if user_relevant {
                Priority::UserRelevant
            } else {
                Priority::Generic
            };
            let depth = if self.user_roots.iter().any(|r| *r == target) {
                0
            } else {
                item.depth + 1
            };
            let fresh = st.enqueue(target.clone(), priority, depth, false);
            if !fresh && target != child.path {
                // 链接目标已入过队：环或别名
                st.record_failure(SoftFailure::BrokenLinkOrCycle);
                report.soft_failures += 1;
            }
        }

        st.record_entries(added);
        report.entries_added += added as usize;
    }
}

/// 跨卷取出至多 `want` 个目录：每次取全局最优的队首 (priority, depth)，平手取卷序靠前者。
fn pick_next(scans: &mut [ScanState], want: usize, pending: bool) -> Vec<(usize, FrontierItem)> {
    let mut out = Vec::with_capacity(want);
    while out.len() < want {
        let mut best: Option<(usize, (Priority, usize))> = None;
        for (slot, st) in scans.iter_mut().enumerate() {
            if let Some(head) = st.peek(pending) {
                let key = (head.priority, head.depth);
                if best.map_or(true, |(_, b)| key < b) {
                    best = Some((slot, key));
                }
            }
        }
        let Some((slot, _)) = best else {
            break;
        };
        match scans[slot].pop(pending) {
            Some(item) => out.push((slot, item)),
            None => break,
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{VolumeClass, VolumeId};
    use crate::index::catalog::Catalog;

    fn unique_tmp_dir(tag: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let p = std::env::temp_dir().join(format!("fd-seek-{}-{}", tag, nanos));
        std::fs::create_dir_all(&p).unwrap();
        std::fs::canonicalize(p).unwrap()
    }

    fn volume(root: &Path, class: VolumeClass) -> Volume {
        Volume {
            id: VolumeId(0),
            mount_point: root.to_path_buf(),
            class,
            case_insensitive: false,
        }
    }

    fn scanner(user_roots: Vec<PathBuf>) -> Scanner {
        Scanner::new(ListOptions::new(&[".git".to_string()], false), 4, user_roots)
    }

    #[test]
    fn picks_best_head_across_volumes() {
        let a = Volume {
            id: VolumeId(0),
            mount_point: PathBuf::from("/va"),
            class: VolumeClass::Data,
            case_insensitive: false,
        };
        let b = Volume {
            id: VolumeId(1),
            mount_point: PathBuf::from("/vb"),
            class: VolumeClass::Data,
            case_insensitive: false,
        };
        let roots = vec![PathBuf::from("/vb/home")];
        let mut scans = vec![
            ScanState::seeded(&a, &roots, 8),
            ScanState::seeded(&b, &roots, 8),
        ];
        scans[0].enqueue(PathBuf::from("/va/x"), Priority::Generic, 2, false);
        scans[1].enqueue(PathBuf::from("/vb/y"), Priority::Generic, 1, false);

        let picked = pick_next(&mut scans, 5, false);
        let order: Vec<_> = picked
            .iter()
            .map(|(slot, item)| (*slot, item.path.to_string_lossy().into_owned()))
            .collect();
        // 用户目录最先；同 (priority, depth) 时卷序靠前者先出
        assert_eq!(
            order,
            vec![
                (1, "/vb/home".to_string()),
                (0, "/va".to_string()),
                (1, "/vb".to_string()),
                (1, "/vb/y".to_string()),
                (0, "/va/x".to_string()),
            ]
        );
        assert!(pick_next(&mut scans, 5, false).is_empty());
    }

    #[test]
    fn exhaustive_scan_indexes_whole_tree_and_resumes() {
        let root = unique_tmp_dir("scan-exhaustive");
        std::fs::create_dir_all(root.join("a/b/c")).unwrap();
        std::fs::write(root.join("a/one.txt"), b"1").unwrap();
        std::fs::write(root.join("a/b/c/two.txt"), b"2").unwrap();

        let vols = vec![volume(&root, VolumeClass::Data)];
        let mut scans = vec![ScanState::seeded(&vols[0], &[], 8)];
        let mut cat = Catalog::new();
        let sc = scanner(vec![]);

        // 一步只扫根目录
        let r = sc.run(&mut scans, &vols, &mut cat, 1, false);
        assert_eq!(r.directories, 1);
        assert!(!scans[0].exhausted());
        assert_eq!(cat.len(), 1); // a/

        let r = sc.run(&mut scans, &vols, &mut cat, 100, false);
        assert_eq!(r.directories, 3);
        assert!(scans[0].exhausted());
        assert_eq!(scans[0].directories_visited(), 4);
        // a, one.txt, b, c, two.txt
        assert_eq!(cat.len(), 5);
        assert!(cat.check_consistency().is_ok());

        let r = sc.run(&mut scans, &vols, &mut cat, 100, false);
        assert_eq!(r.directories, 0);
    }

    #[test]
    fn bounded_scan_never_leaves_user_roots() {
        let root = unique_tmp_dir("scan-bounded");
        let docs = root.join("home/me/Documents");
        std::fs::create_dir_all(docs.join("deep")).unwrap();
        std::fs::write(docs.join("deep/plan.txt"), b"p").unwrap();
        std::fs::create_dir_all(root.join("opt/noise")).unwrap();
        std::fs::write(root.join("opt/noise/plan.txt"), b"n").unwrap();

        let vols = vec![volume(&root, VolumeClass::System)];
        let roots = vec![docs.clone()];
        let mut scans = vec![ScanState::seeded(&vols[0], &roots, 8)];
        let mut cat = Catalog::new();
        let sc = scanner(roots);

        sc.run(&mut scans, &vols, &mut cat, 100, true);
        assert!(scans[0].exhausted());
        assert!(scans[0].has_visited(&docs));
        assert!(!scans[0].has_visited(&root));
        assert!(!scans[0].is_discovered(&root.join("opt")));
        // Documents 自身 + deep + plan.txt
        assert_eq!(cat.len(), 3);
    }

    #[test]
    fn unreadable_directory_is_counted_and_skipped() {
        let root = unique_tmp_dir("scan-soft");
        std::fs::create_dir_all(root.join("gone")).unwrap();
        std::fs::write(root.join("keep.txt"), b"k").unwrap();

        let vols = vec![volume(&root, VolumeClass::Data)];
        let mut scans = vec![ScanState::seeded(&vols[0], &[], 8)];
        let mut cat = Catalog::new();
        let sc = scanner(vec![]);

        sc.run(&mut scans, &vols, &mut cat, 1, false);
        std::fs::remove_dir(root.join("gone")).unwrap();
        let r = sc.run(&mut scans, &vols, &mut cat, 10, false);
        assert_eq!(r.soft_failures, 1);
        assert_eq!(
            scans[0].failures().get(&SoftFailure::Vanished).copied(),
            Some(1)
        );
        assert!(scans[0].exhausted());
    }

    #[test]
    fn skip_listed_directories_are_indexed_not_descended() {
        let root = unique_tmp_dir("scan-skip");
        std::fs::create_dir_all(root.join(".git/objects")).unwrap();

        let vols = vec![volume(&root, VolumeClass::Data)];
        let mut scans = vec![ScanState::seeded(&vols[0], &[], 8)];
        let mut cat = Catalog::new();
        scanner(vec![]).run(&mut scans, &vols, &mut cat, 10, false);

        assert_eq!(scans[0].directories_visited(), 1);
        assert_eq!(cat.names().lookup_exact(".git").len(), 1);
        assert!(cat.names().lookup_exact("objects").is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycle_is_broken_by_discovered_set() {
        let root = unique_tmp_dir("scan-cycle");
        std::fs::create_dir_all(root.join("a")).unwrap();
        std::os::unix::fs::symlink(&root, root.join("a/back")).unwrap();

        let vols = vec![volume(&root, VolumeClass::Data)];
        let mut scans = vec![ScanState::seeded(&vols[0], &[], 8)];
        let mut cat = Catalog::new();
        let sc = Scanner::new(ListOptions::new(&[], true), 4, vec![]);
        sc.run(&mut scans, &vols, &mut cat, 100, false);

        assert!(scans[0].exhausted());
        assert_eq!(scans[0].directories_visited(), 2);
        assert_eq!(
            scans[0].failures().get(&SoftFailure::BrokenLinkOrCycle).copied(),
            Some(1)
        );
    }
}
