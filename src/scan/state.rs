use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::core::{ScanPolicy, Volume, VolumeId};

/// 出队优先级：用户相关目录在前，通用目录在后
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub enum Priority {
    UserRelevant = 0,
    Generic = 1,
}

/// 前沿中的一个待扫目录
///
/// 排序键 (priority, depth, seq)：用户相关优先，其次浅层，再按发现顺序。
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd)]
pub struct FrontierItem {
    pub priority: Priority,
    /// 相对最近种子目录的深度（种子为 0）
    pub depth: usize,
    pub seq: u64,
    pub path: PathBuf,
    /// 种子目录自身在列目录成功后入库
    pub is_seed: bool,
}

/// 扫描软失败：不会中断查询，只计入 stats
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SoftFailure {
    PermissionDenied,
    /// 扫描中途被删除
    Vanished,
    /// 符号链接指向已发现目录（环）或链接已断
    BrokenLinkOrCycle,
    Unreadable,
}

/// 单卷的可恢复扫描进度
///
/// ## 不变量
/// - 目录至多入队一次（`discovered` 去重，含 deferred）
/// - `visited` 只增不减
/// - `exhausted == true` ⇒ frontier 与 deferred 均为空
#[derive(Debug)]
pub struct ScanState {
    pub volume: VolumeId,
    pub policy: ScanPolicy,
    frontier: BinaryHeap<Reverse<FrontierItem>>,
    /// Bounded 卷超过深度上限的目录：只有“有查询在等结果”时才放回 frontier
    deferred: VecDeque<FrontierItem>,
    discovered: HashSet<PathBuf>,
    visited: HashSet<PathBuf>,
    exhausted: bool,
    seq: u64,
    max_depth: usize,
    failures: BTreeMap<SoftFailure, u64>,
    entries_recorded: u64,
}

impl ScanState {
    /// 按卷策略播种：
    /// - Bounded：只播卷内的用户目录
    /// - Exhaustive：播卷根，同时把卷内用户目录作为高优先级种子
    pub fn seeded(volume: &Volume, user_roots: &[PathBuf], max_depth: usize) -> Self {
        let mut st = Self {
            volume: volume.id,
            policy: volume.policy(),
            frontier: BinaryHeap::new(),
            deferred: VecDeque::new(),
            discovered: HashSet::new(),
            visited: HashSet::new(),
            exhausted: false,
            seq: 0,
            max_depth,
            failures: BTreeMap::new(),
            entries_recorded: 0,
        };

        for root in user_roots.iter().filter(|r| volume.contains(r)) {
            st.enqueue(root.clone(), Priority::UserRelevant, 0, true);
        }
        if st.policy == ScanPolicy::Exhaustive {
            st.enqueue(volume.mount_point.clone(), Priority::Generic, 0, false);
        }
        st.refresh_exhausted();
        st
    }

    /// 返回 false 表示该目录已经入过队（或已扫过），本次忽略
    pub fn enqueue(&mut self, path: PathBuf, priority: Priority, depth: usize, is_seed: bool) -> bool {
        if !self.discovered.insert(path.clone()) {
            return false;
        }
        let item = FrontierItem {
            priority,
            depth,
            seq: self.seq,
            path,
            is_seed,
        };
        self.seq += 1;
        if self.policy == ScanPolicy::Bounded && depth > self.max_depth {
            self.deferred.push_back(item);
        } else {
            self.frontier.push(Reverse(item));
        }
        self.exhausted = false;
        true
    }

    pub fn is_discovered(&self, path: &Path) -> bool {
        self.discovered.contains(path)
    }

    /// 当前可出队的最优项（不弹出）。`pending` 为真时把 deferred 视为可用。
    pub fn peek(&mut self, pending: bool) -> Option<&FrontierItem> {
        if self.frontier.is_empty() && pending {
            self.promote_deferred();
        }
        self.frontier.peek().map(|r| &r.0)
    }

    pub fn pop(&mut self, pending: bool) -> Option<FrontierItem> {
        if self.frontier.is_empty() && pending {
            self.promote_deferred();
        }
        self.frontier.pop().map(|r| r.0)
    }

    fn promote_deferred(&mut self) {
        if self.deferred.is_empty() {
            return;
        }
        tracing::debug!(
            "{}: promoting {} deferred directories for a pending query",
            self.volume,
            self.deferred.len()
        );
        self.frontier
            .extend(self.deferred.drain(..).map(Reverse));
    }

    /// 取出 `dir` 自身及其下所有尚未扫描的目录（frontier 与 deferred），
    /// 同时从 `discovered` 中去掉；目录改名后由调用方换成新路径重新入队。
    pub fn drain_under(&mut self, dir: &Path) -> Vec<FrontierItem> {
        let (moved, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.frontier)
            .into_iter()
            .map(|r| r.0)
            .partition(|item| item.path.starts_with(dir));
        self.frontier = kept.into_iter().map(Reverse).collect();

        let mut moved = moved;
        let (deferred_moved, deferred_kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|item| item.path.starts_with(dir));
        self.deferred = deferred_kept.into();
        moved.extend(deferred_moved);

        for item in &moved {
            self.discovered.remove(&item.path);
        }
        moved.sort();
        moved
    }

    pub fn mark_visited(&mut self, path: PathBuf) {
        self.visited.insert(path);
    }

    pub fn has_visited(&self, path: &Path) -> bool {
        self.visited.contains(path)
    }

    pub fn record_failure(&mut self, kind: SoftFailure) {
        *self.failures.entry(kind).or_insert(0) += 1;
    }

    pub fn record_entries(&mut self, n: u64) {
        self.entries_recorded += n;
    }

    /// 每步结束后调用；首次变为 exhausted 时返回 true
    pub fn refresh_exhausted(&mut self) -> bool {
        let now = self.frontier.is_empty() && self.deferred.is_empty();
        let flipped = now && !self.exhausted;
        self.exhausted = now;
        flipped
    }

    pub fn has_work(&self, pending: bool) -> bool {
        !self.frontier.is_empty() || (pending && !self.deferred.is_empty())
    }

    pub fn exhausted(&self) -> bool {
        self.exhausted
    }

    pub fn directories_visited(&self) -> usize {
        self.visited.len()
    }

    pub fn frontier_len(&self) -> usize {
        self.frontier.len()
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn failures(&self) -> &BTreeMap<SoftFailure, u64> {
        &self.failures
    }

    pub fn failure_total(&self) -> u64 {
        self.failures.values().sum()
    }

    pub fn entries_recorded(&self) -> u64 {
        self.entries_recorded
    }
}
