use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct VolumeId(pub u16);

impl VolumeId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for VolumeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vol{}", self.0)
    }
}

/// 卷分类：system（启动卷，高流量）/ data（其余卷）
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeClass {
    System,
    Data,
}

/// 扫描策略
/// - Bounded：只从用户相关目录出发，超过深度上限的目录延后（除非有查询在等结果）
/// - Exhaustive：整棵树最终都会入队
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanPolicy {
    Bounded,
    Exhaustive,
}

impl VolumeClass {
    pub fn policy(self) -> ScanPolicy {
        match self {
            VolumeClass::System => ScanPolicy::Bounded,
            VolumeClass::Data => ScanPolicy::Exhaustive,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Volume {
    pub id: VolumeId,
    pub mount_point: PathBuf,
    pub class: VolumeClass,
    pub case_insensitive: bool,
}

impl Volume {
    pub fn policy(&self) -> ScanPolicy {
        self.class.policy()
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.mount_point)
    }
}

/// 路径所属卷：挂载点最长前缀匹配。
pub fn volume_for<'a>(volumes: &'a [Volume], path: &Path) -> Option<&'a Volume> {
    volumes
        .iter()
        .filter(|v| v.contains(path))
        .max_by_key(|v| v.mount_point.components().count())
}

pub fn platform_case_insensitive() -> bool {
    cfg!(any(target_os = "windows", target_os = "macos"))
}

/// 伪文件系统 / 系统内部挂载点：不作为可搜索卷
const PSEUDO_MOUNT_PREFIXES: &[&str] = &[
    "/proc", "/sys", "/dev", "/run", "/snap", "/boot", "/System/Volumes",
];

/// 启动卷：`/`，Windows 上为 %SystemDrive%
pub fn is_boot_mount(mount: &Path) -> bool {
    if mount == Path::new("/") {
        return true;
    }
    if cfg!(target_os = "windows") {
        let sys_drive = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
        let m = mount.to_string_lossy().to_uppercase();
        return m.trim_end_matches('\\') == sys_drive.to_uppercase();
    }
    false
}

/// 发现本机卷：(挂载点, 分类)。启动卷为 system，其余为 data。
pub fn discover_mounts() -> Vec<(PathBuf, VolumeClass)> {
    let disks = sysinfo::Disks::new_with_refreshed_list();
    let mut out: Vec<(PathBuf, VolumeClass)> = Vec::new();
    for disk in disks.list() {
        let mount = disk.mount_point().to_path_buf();
        let skip = PSEUDO_MOUNT_PREFIXES
            .iter()
            .any(|p| mount.starts_with(p));
        if skip || out.iter().any(|(m, _)| *m == mount) {
            continue;
        }
        let class = if is_boot_mount(&mount) {
            VolumeClass::System
        } else {
            VolumeClass::Data
        };
        out.push((mount, class));
    }
    // system 卷放最前面，其余按挂载点排序，保证 VolumeId 稳定
    out.sort_by(|a, b| {
        (a.1 != VolumeClass::System)
            .cmp(&(b.1 != VolumeClass::System))
            .then_with(|| a.0.cmp(&b.0))
    });
    tracing::debug!("Discovered {} volumes", out.len());
    out
}
