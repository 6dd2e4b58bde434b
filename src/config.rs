use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::core::volume::{discover_mounts, platform_case_insensitive, VolumeClass};

/// 默认不下钻的目录名（小写，支持 `*` / `?` 通配）
pub const DEFAULT_SKIP_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    "$recycle*",
    "system32",
    "windows",
    "programdata",
    "appdata",
];

#[derive(Clone, Debug, Deserialize)]
pub struct VolumeConfig {
    pub mount_point: PathBuf,
    #[serde(default = "default_volume_class")]
    pub class: VolumeClass,
    /// 未设置时按平台推断（Windows / macOS 视为大小写不敏感）
    #[serde(default)]
    pub case_insensitive: Option<bool>,
}

fn default_volume_class() -> VolumeClass {
    VolumeClass::Data
}

impl VolumeConfig {
    pub fn new(mount_point: impl Into<PathBuf>, class: VolumeClass) -> Self {
        Self {
            mount_point: mount_point.into(),
            class,
            case_insensitive: None,
        }
    }

    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive
            .unwrap_or_else(platform_case_insensitive)
    }
}

/// 置信度打分权重。只有相对顺序（exact > prefix > word > substring）是契约，数值可调。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub exact: f64,
    pub prefix: f64,
    pub word: f64,
    pub substring: f64,
    pub length_bonus: f64,
    pub location_bonus: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            exact: 1.0,
            prefix: 0.8,
            word: 0.6,
            substring: 0.4,
            length_bonus: 0.1,
            location_bonus: 0.05,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 为空时由 [`Config::discover`] 通过 sysinfo 填充
    pub volumes: Vec<VolumeConfig>,
    /// 用户相关目录：Bounded 卷的种子 + 位置加分
    pub user_roots: Vec<PathBuf>,
    /// 达到该数量的可信结果即停止扫描 / 跳过更贵的策略
    pub confident_k: usize,
    pub min_confidence: f64,
    /// 单次查询最多扫描的目录数
    pub scan_budget: usize,
    /// 每批并行列目录的数量
    pub scan_batch: usize,
    /// Bounded 卷相对种子目录的下钻深度上限
    pub bounded_max_depth: usize,
    pub follow_links: bool,
    pub skip_dirs: Vec<String>,
    pub scoring: ScoringWeights,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            volumes: Vec::new(),
            user_roots: Vec::new(),
            confident_k: 10,
            min_confidence: 0.3,
            scan_budget: 512,
            scan_batch: num_cpus::get().max(1) * 4,
            bounded_max_depth: 8,
            follow_links: false,
            skip_dirs: DEFAULT_SKIP_DIRS.iter().map(|s| s.to_string()).collect(),
            scoring: ScoringWeights::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg: Config = toml::from_str(&text)?;
        Ok(cfg)
    }

    /// 补全未显式配置的部分：卷来自 sysinfo，用户目录来自 dirs。
    pub fn discover(mut self) -> Self {
        if self.volumes.is_empty() {
            self.volumes = discover_mounts()
                .into_iter()
                .map(|(mount, class)| VolumeConfig::new(mount, class))
                .collect();
        }
        if self.user_roots.is_empty() {
            self.user_roots = default_user_roots();
        }
        self
    }
}

/// home / desktop / documents / downloads
pub fn default_user_roots() -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = Vec::new();
    for dir in [
        dirs::desktop_dir(),
        dirs::document_dir(),
        dirs::download_dir(),
        dirs::home_dir(),
    ]
    .into_iter()
    .flatten()
    {
        if !roots.contains(&dir) {
            roots.push(dir);
        }
    }
    roots
}
