use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::core::names;
use crate::core::{platform_case_insensitive, volume_for, Entry, EntryId, EntryKind, Volume, VolumeId};
use crate::error::{IndexError, Result};
use crate::index::catalog::{Catalog, Placement};
use crate::query::{MatchEngine, MatchOutcome, Query, Scorer, SearchResult};
use crate::scan::{list_dir, ListOptions, ScanState, Scanner, SoftFailure, StepReport};
use crate::stats::{IndexStats, MemoryReport, QueryStats, VolumeStats};

/// 目录列举过滤
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ListFilter {
    Folders,
    Files,
    All,
}

impl ListFilter {
    fn accepts(self, kind: EntryKind) -> bool {
        match self {
            ListFilter::Folders => kind == EntryKind::Dir,
            ListFilter::Files => kind == EntryKind::File,
            ListFilter::All => true,
        }
    }
}

/// 会话级索引：进程内唯一的所有者。
///
/// 所有结构变更都经过 `&mut self`：扫描（查询驱动或显式预热）与
/// add / remove / rename 不会与某次 search 的读阶段交错。
pub struct SessionIndex {
    config: Config,
    volumes: Vec<Volume>,
    user_roots: Vec<PathBuf>,
    catalog: Catalog,
    scans: Vec<ScanState>,
    scanner: Scanner,
    scorer: Scorer,
    engine: MatchEngine,
    queries: QueryStats,
}

impl SessionIndex {
    /// 卷与用户目录都先规范化；不存在的卷跳过并告警。
    pub fn new(config: Config) -> Self {
        let mut volumes: Vec<Volume> = Vec::new();
        for vc in &config.volumes {
            let mount_point = match std::fs::canonicalize(&vc.mount_point) {
                Ok(p) => p,
                Err(e) => {
                    warn!("Skipping volume {:?}: {}", vc.mount_point, e);
                    continue;
                }
            };
            if volumes.iter().any(|v| v.mount_point == mount_point) {
                continue;
            }
            volumes.push(Volume {
                id: VolumeId(volumes.len() as u16),
                mount_point,
                class: vc.class,
                case_insensitive: vc.case_insensitive(),
            });
        }

        let mut user_roots: Vec<PathBuf> = Vec::new();
        for r in &config.user_roots {
            match std::fs::canonicalize(r) {
                Ok(p) if !user_roots.contains(&p) => user_roots.push(p),
                Ok(_) => {}
                Err(e) => debug!("Ignoring user root {:?}: {}", r, e),
            }
        }

        let scans = Self::seed(&volumes, &user_roots, config.bounded_max_depth);
        let scanner = Scanner::new(
            ListOptions::new(&config.skip_dirs, config.follow_links),
            config.scan_batch,
            user_roots.clone(),
        );
        let scorer = Scorer::new(config.scoring.clone(), user_roots.clone());
        let engine = MatchEngine::new(config.min_confidence);

        info!(
            "Session index ready: {} volumes, {} user roots",
            volumes.len(),
            user_roots.len()
        );
        for v in &volumes {
            debug!("{} {:?} {:?} -> {:?}", v.id, v.mount_point, v.class, v.policy());
        }

        Self {
            config,
            volumes,
            user_roots,
            catalog: Catalog::new(),
            scans,
            scanner,
            scorer,
            engine,
            queries: QueryStats::default(),
        }
    }

    fn seed(volumes: &[Volume], user_roots: &[PathBuf], max_depth: usize) -> Vec<ScanState> {
        volumes
            .iter()
            .map(|v| ScanState::seeded(v, user_roots, max_depth))
            .collect()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn volumes(&self) -> &[Volume] {
        &self.volumes
    }

    pub fn user_roots(&self) -> &[PathBuf] {
        &self.user_roots
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn scan_state(&self, id: VolumeId) -> Option<&ScanState> {
        self.scans.get(id.index())
    }

    pub fn len(&self) -> usize {
        self.catalog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.catalog.is_empty()
    }

    /// 卷外路径按平台默认的大小写规则比较，且不带卷号
    fn placement(&self, path: &Path) -> Placement {
        volume_for(&self.volumes, path)
            .map(Placement::from)
            .unwrap_or(Placement {
                volume: None,
                case_insensitive: platform_case_insensitive(),
            })
    }

    pub fn get(&self, path: &Path) -> Option<&Entry> {
        let path = names::canonical_path(path);
        self.catalog.lookup(&path, self.placement(&path))
    }

    fn kind_on_disk(path: &Path) -> Result<EntryKind> {
        // 链接按目标类型归类；断链当作文件
        match std::fs::metadata(path).or_else(|_| std::fs::symlink_metadata(path)) {
            Ok(md) if md.is_dir() => Ok(EntryKind::Dir),
            Ok(_) => Ok(EntryKind::File),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(IndexError::PathNotFound(path.to_path_buf()))
            }
            Err(e) => Err(IndexError::io(path, e)),
        }
    }

    /// 把磁盘上已存在的路径入库（create 之后调用）。已存在时返回原 id。
    pub fn add(&mut self, path: &Path) -> Result<EntryId> {
        let path = names::canonical_path(path);
        let kind = Self::kind_on_disk(&path)?;
        let at = self.placement(&path);
        let (id, fresh) = self.catalog.upsert(&path, kind, at);
        if fresh {
            debug!("Indexed {:?} as {:?} ({})", path, id, kind.label());
        }
        Ok(id)
    }

    /// 移除 `path` 及其已索引后代，返回移除数量（未索引时为 0）。
    pub fn remove(&mut self, path: &Path) -> usize {
        let path = names::canonical_path(path);
        let at = self.placement(&path);
        let removed = self.catalog.remove_subtree(&path, at);
        if !removed.is_empty() {
            debug!("Removed {} entries under {:?}", removed.len(), path);
        }
        removed.len()
    }

    /// 改名/移动已经在磁盘上完成后调用；撤销即 `rename(new, old)`。
    ///
    /// 名字校验归调用方（见 `ops::rename_item`）：磁盘上已经存在的名字照单全收。
    /// - 新路径不存在：清掉两端的陈旧 entry，返回 `PathNotFound`
    /// - 旧路径未被索引：新路径直接入库
    /// - 目录改名：旧路径下尚未扫描的目录换成新路径重新入队
    pub fn rename(&mut self, old: &Path, new: &Path) -> Result<EntryId> {
        let old = names::canonical_path(old);
        let new = names::canonical_path(new);
        let old_at = self.placement(&old);
        let new_at = self.placement(&new);

        let kind = match Self::kind_on_disk(&new) {
            Ok(kind) => kind,
            Err(err @ IndexError::PathNotFound(_)) => {
                let purged = self.catalog.remove_subtree(&old, old_at).len()
                    + self.catalog.remove_subtree(&new, new_at).len();
                warn!("Rename target {:?} vanished, purged {} stale entries", new, purged);
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        if kind == EntryKind::Dir {
            self.rekey_pending_scans(&old, old_at.volume, &new, new_at.volume);
        }
        if let Some(id) = self.catalog.rename(&old, old_at, &new, new_at, kind) {
            debug!("Renamed {:?} -> {:?}", old, new);
            return Ok(id);
        }
        let (id, _) = self.catalog.upsert(&new, kind, new_at);
        debug!("Rename source {:?} was not indexed, indexed {:?} directly", old, new);
        Ok(id)
    }

    /// 把 `old` 下还在 frontier / deferred 里的目录改挂到 `new` 下（保持优先级与深度）
    fn rekey_pending_scans(
        &mut self,
        old: &Path,
        from: Option<VolumeId>,
        new: &Path,
        to: Option<VolumeId>,
    ) {
        let drained = match from.and_then(|v| self.scans.get_mut(v.index())) {
            Some(st) => {
                let drained = st.drain_under(old);
                st.refresh_exhausted();
                drained
            }
            None => return,
        };
        if drained.is_empty() {
            return;
        }
        let Some(st) = to.and_then(|v| self.scans.get_mut(v.index())) else {
            debug!(
                "Dropped {} pending directories moved outside every volume",
                drained.len()
            );
            return;
        };
        let mut moved = 0usize;
        for item in drained {
            let Ok(rel) = item.path.strip_prefix(old) else {
                continue;
            };
            let path = if rel.as_os_str().is_empty() {
                new.to_path_buf()
            } else {
                new.join(rel)
            };
            if st.enqueue(path, item.priority, item.depth, item.is_seed) {
                moved += 1;
            }
        }
        st.refresh_exhausted();
        debug!("Re-queued {} pending directories under {:?}", moved, new);
    }

    /// 查询入口：匹配 → 不够则按批扫描（受 scan_budget 约束）→ 再匹配。
    pub fn search(&mut self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let raw = names::validate_query(query)?;
        let q = Query::parse(raw);
        let started = Instant::now();
        self.queries.queries += 1;
        if k == 0 {
            return Ok(Vec::new());
        }

        // 可信结果够 want 个就不再为本次查询扫描
        let want = k.min(self.config.confident_k.max(1));
        let mut budget = self.config.scan_budget;
        let mut scanned = 0usize;
        let outcome = loop {
            let outcome = self.match_once(&q, k)?;
            if outcome.confident >= want || budget == 0 || !self.has_scan_work(true) {
                break outcome;
            }
            let step = budget.min(self.config.scan_batch.max(1));
            let report = self.scanner.run(
                &mut self.scans,
                &self.volumes,
                &mut self.catalog,
                step,
                true,
            );
            if report.directories == 0 {
                break outcome;
            }
            budget -= report.directories.min(budget);
            scanned += report.directories;
        };

        let micros = started.elapsed().as_micros() as u64;
        self.queries.scan_dirs_for_queries += scanned as u64;
        self.queries.last_query_micros = micros;
        debug!(
            "Query {:?}: {} results ({} confident), strategies {:?}, {} dirs scanned, {}us",
            q.raw,
            outcome.results.len(),
            outcome.confident,
            outcome.attempted,
            scanned,
            micros
        );
        Ok(outcome.results)
    }

    /// 只查当前已索引内容，不触发扫描
    pub fn search_indexed(&mut self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let raw = names::validate_query(query)?;
        let q = Query::parse(raw);
        self.queries.queries += 1;
        Ok(self.match_once(&q, k)?.results)
    }

    /// 不一致 = 逻辑缺陷：记录、整体重建、把错误交给调用方
    fn match_once(&mut self, q: &Query, k: usize) -> Result<MatchOutcome> {
        match self.engine.run(q, k, &self.catalog, &self.scorer) {
            Err(IndexError::IndexInconsistency(msg)) => {
                error!("Index inconsistency during query {:?}: {}", q.raw, msg);
                self.rebuild();
                Err(IndexError::IndexInconsistency(msg))
            }
            other => other,
        }
    }

    fn has_scan_work(&self, pending: bool) -> bool {
        self.scans.iter().any(|s| s.has_work(pending))
    }

    /// 显式预热：最多扫描 `max_dirs` 个目录（不越过 Bounded 卷的深度上限）
    pub fn scan_steps(&mut self, max_dirs: usize) -> StepReport {
        self.scanner.run(
            &mut self.scans,
            &self.volumes,
            &mut self.catalog,
            max_dirs,
            false,
        )
    }

    /// 直接列出单个目录并把子项入库（不改变任何卷的扫描进度）
    pub fn index_dir(&mut self, dir: &Path) -> Result<usize> {
        let dir = std::fs::canonicalize(dir).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => IndexError::PathNotFound(dir.to_path_buf()),
            _ => IndexError::io(dir, e),
        })?;
        let opts = ListOptions::new(&[], false);
        let children = match list_dir(&dir, &opts).outcome {
            Ok(children) => children,
            Err(SoftFailure::Vanished) => return Err(IndexError::PathNotFound(dir)),
            Err(failure) => {
                debug!("Cannot list {:?}: {:?}", dir, failure);
                return Ok(0);
            }
        };
        let mut added = 0;
        for child in children {
            let at = self.placement(&child.path);
            if self.catalog.upsert(&child.path, child.kind, at).1 {
                added += 1;
            }
        }
        Ok(added)
    }

    /// 按父路径过滤已索引的直接子项：目录在前，再按名字排序；跳过隐藏名。
    pub fn entries_in(&self, dir: &Path, filter: ListFilter) -> Vec<&Entry> {
        let dir = std::fs::canonicalize(dir).unwrap_or_else(|_| names::canonical_path(dir));
        let mut out: Vec<&Entry> = self
            .catalog
            .store()
            .children_of(&dir)
            .into_iter()
            .filter(|e| !e.base_name.starts_with('.') && filter.accepts(e.kind))
            .collect();
        out.sort_by(|a, b| {
            (a.kind != EntryKind::Dir)
                .cmp(&(b.kind != EntryKind::Dir))
                .then_with(|| a.folded_name.cmp(&b.folded_name))
                .then_with(|| a.base_name.cmp(&b.base_name))
        });
        out
    }

    pub fn check_consistency(&self) -> Result<()> {
        self.catalog
            .check_consistency()
            .map_err(IndexError::IndexInconsistency)
    }

    /// 清空索引并按当前配置重新播种；下一次查询从头扫描
    pub fn rebuild(&mut self) {
        let dropped = self.catalog.len();
        self.catalog.clear();
        self.scans = Self::seed(&self.volumes, &self.user_roots, self.config.bounded_max_depth);
        self.queries.rebuilds += 1;
        info!("Session index rebuilt ({} entries dropped)", dropped);
    }

    pub fn stats(&self) -> IndexStats {
        let volumes = self
            .scans
            .iter()
            .filter_map(|st| {
                let v = self.volumes.get(st.volume.index())?;
                Some((
                    v.id,
                    VolumeStats {
                        mount_point: v.mount_point.clone(),
                        class: v.class,
                        policy: st.policy,
                        exhausted: st.exhausted(),
                        directories_visited: st.directories_visited(),
                        frontier: st.frontier_len(),
                        deferred: st.deferred_len(),
                        soft_failures: st.failures().clone(),
                        entries_recorded: st.entries_recorded(),
                    },
                ))
            })
            .collect();

        let store_bytes = self.catalog.store().estimated_bytes();
        let trie_bytes = self.catalog.names().estimated_bytes() + self.catalog.words().estimated_bytes();
        IndexStats {
            entries_indexed: self.catalog.len(),
            volumes,
            memory: MemoryReport {
                trie_nodes: self.catalog.names().node_count() + self.catalog.words().node_count(),
                store_bytes,
                trie_bytes,
                estimated_bytes: store_bytes + trie_bytes,
                process_rss_bytes: MemoryReport::read_process_rss(),
            },
            queries: self.queries.clone(),
        }
    }
}
