use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use crate::core::{ScanPolicy, VolumeClass, VolumeId};
use crate::scan::SoftFailure;

/// `SessionIndex::stats()` 的快照。只读数据，渲染交给调用方（Display / JSON）。
#[derive(Clone, Debug, Serialize)]
pub struct IndexStats {
    pub entries_indexed: usize,
    pub volumes: BTreeMap<VolumeId, VolumeStats>,
    pub memory: MemoryReport,
    pub queries: QueryStats,
}

#[derive(Clone, Debug, Serialize)]
pub struct VolumeStats {
    pub mount_point: PathBuf,
    pub class: VolumeClass,
    pub policy: ScanPolicy,
    pub exhausted: bool,
    pub directories_visited: usize,
    /// 待扫目录数
    pub frontier: usize,
    /// Bounded 卷因深度上限延后的目录数
    pub deferred: usize,
    pub soft_failures: BTreeMap<SoftFailure, u64>,
    pub entries_recorded: u64,
}

impl VolumeStats {
    pub fn soft_failure_total(&self) -> u64 {
        self.soft_failures.values().sum()
    }
}

/// 内存占用统计（估算值 + 进程 RSS）
#[derive(Clone, Debug, Default, Serialize)]
pub struct MemoryReport {
    /// 两棵 trie 的节点总数
    pub trie_nodes: usize,
    pub store_bytes: u64,
    pub trie_bytes: u64,
    pub estimated_bytes: u64,
    /// 进程级 RSS（从 /proc/self/statm 读取，按 4096 字节页估算）
    pub process_rss_bytes: u64,
}

impl MemoryReport {
    /// 从 /proc/self/statm 读取进程 RSS；非 Linux 返回 0。
    ///
    /// 页大小按 4096 字节换算（不查询 sysconf），大页内核上数值偏小，只作粗略参考。
    pub fn read_process_rss() -> u64 {
        std::fs::read_to_string("/proc/self/statm")
            .ok()
            .and_then(|s| {
                // statm 格式: size resident shared text lib data dt (单位: 页)
                let parts: Vec<&str> = s.split_whitespace().collect();
                parts.get(1)?.parse::<u64>().ok()
            })
            .map(|pages| pages * 4096)
            .unwrap_or(0)
    }
}

/// 查询侧计数器（会话级累计）
#[derive(Clone, Debug, Default, Serialize)]
pub struct QueryStats {
    pub queries: u64,
    /// 为满足查询而扫描的目录数
    pub scan_dirs_for_queries: u64,
    pub rebuilds: u64,
    pub last_query_micros: u64,
}

pub fn human_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

fn policy_label(p: ScanPolicy) -> &'static str {
    match p {
        ScanPolicy::Bounded => "bounded",
        ScanPolicy::Exhaustive => "exhaustive",
    }
}

impl fmt::Display for IndexStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "╔══════════════════════════════════════════════════╗")?;
        writeln!(f, "║           fd-seek Index Report                   ║")?;
        writeln!(f, "╠══════════════════════════════════════════════════╣")?;
        writeln!(
            f,
            "║ Entries indexed: {:>31} ║",
            self.entries_indexed
        )?;
        writeln!(
            f,
            "║ Process RSS:     {:>31} ║",
            human_bytes(self.memory.process_rss_bytes)
        )?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        for (id, v) in &self.volumes {
            writeln!(f, "║ {:<6} {:<41} ║", id.to_string(), v.mount_point.display())?;
            writeln!(
                f,
                "║   policy:       {:>10}   exhausted: {:>5}      ║",
                policy_label(v.policy),
                v.exhausted
            )?;
            writeln!(
                f,
                "║   visited:      {:>10}   frontier:  {:>8}   ║",
                v.directories_visited,
                v.frontier
            )?;
            writeln!(
                f,
                "║   deferred:     {:>10}   failures:  {:>8}   ║",
                v.deferred,
                v.soft_failure_total()
            )?;
        }
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Memory:                                          ║")?;
        writeln!(
            f,
            "║   store:        {:>10}                       ║",
            human_bytes(self.memory.store_bytes)
        )?;
        writeln!(
            f,
            "║   tries:        {:>10}  ({:>10} nodes)    ║",
            human_bytes(self.memory.trie_bytes),
            self.memory.trie_nodes
        )?;
        writeln!(
            f,
            "║   estimated:    {:>10}                       ║",
            human_bytes(self.memory.estimated_bytes)
        )?;
        writeln!(f, "╠──────────────────────────────────────────────────╣")?;
        writeln!(f, "║ Queries:                                         ║")?;
        writeln!(
            f,
            "║   served:       {:>10}                       ║",
            self.queries.queries
        )?;
        writeln!(
            f,
            "║   scan dirs:    {:>10}                       ║",
            self.queries.scan_dirs_for_queries
        )?;
        writeln!(
            f,
            "║   rebuilds:     {:>10}                       ║",
            self.queries.rebuilds
        )?;
        writeln!(f, "╚══════════════════════════════════════════════════╝")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_bytes_picks_unit() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(2048), "2.00 KB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.00 MB");
    }

    #[test]
    fn report_renders_and_serializes() {
        let mut volumes = BTreeMap::new();
        let mut failures = BTreeMap::new();
        failures.insert(SoftFailure::PermissionDenied, 2);
        volumes.insert(
            VolumeId(0),
            VolumeStats {
                mount_point: PathBuf::from("/data"),
                class: VolumeClass::Data,
                policy: ScanPolicy::Exhaustive,
                exhausted: true,
                directories_visited: 7,
                frontier: 0,
                deferred: 0,
                soft_failures: failures,
                entries_recorded: 40,
            },
        );
        let stats = IndexStats {
            entries_indexed: 40,
            volumes,
            memory: MemoryReport::default(),
            queries: QueryStats::default(),
        };

        let text = stats.to_string();
        assert!(text.contains("fd-seek Index Report"));
        assert!(text.contains("exhaustive"));

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["entries_indexed"], 40);
        assert_eq!(json["volumes"]["0"]["exhausted"], true);
        assert_eq!(json["volumes"]["0"]["soft_failures"]["permission_denied"], 2);
    }
}
