use std::path::{Component, Path, PathBuf};

use unicode_normalization::UnicodeNormalization;

use crate::error::{IndexError, Result};

/// Windows 文件系统不允许的字符；为了跨卷一致，所有平台都拒绝。
const ILLEGAL_NAME_CHARS: &[char] = &['<', '>', ':', '"', '|', '?', '*'];
const TRAVERSAL_PATTERNS: &[&str] = &["../", "..\\"];

/// 统一的名字折叠：NFC + 小写。trie key、token、比较全部走这里。
pub fn fold(name: &str) -> String {
    name.nfc().collect::<String>().to_lowercase()
}

/// 按非字母数字边界切词（输入应已 fold），去重但保留首次出现顺序。
pub fn tokenize(folded: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tok in folded.split(|c: char| !c.is_alphanumeric()) {
        if tok.is_empty() || out.iter().any(|t| t == tok) {
            continue;
        }
        out.push(tok.to_string());
    }
    out
}

/// 最后一个 `.` 之前的部分；点开头（隐藏文件）或无扩展名时返回 None。
pub fn stem(folded: &str) -> Option<&str> {
    match folded.rfind('.') {
        Some(0) | None => None,
        Some(i) => Some(&folded[..i]),
    }
}

pub fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Entry 身份 key：规范化路径，大小写不敏感卷上再做小写折叠。
pub fn path_key(path: &Path, case_insensitive: bool) -> String {
    let s: String = path.to_string_lossy().nfc().collect();
    if case_insensitive {
        s.to_lowercase()
    } else {
        s
    }
}

/// 纯词法规范化：补全为绝对路径，消掉 `.` 与 `..`，不触碰文件系统。
pub fn normalize_lexical(path: &Path) -> PathBuf {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut out = PathBuf::new();
    for comp in abs.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// 规范路径：父目录走 `fs::canonicalize`（解析 /tmp → /private/tmp 之类），
/// 叶子保持原样（它可能是符号链接，也可能已经被删除）。父目录不可解析时退回词法结果。
pub fn canonical_path(path: &Path) -> PathBuf {
    let lexical = normalize_lexical(path);
    let (Some(parent), Some(name)) = (lexical.parent(), lexical.file_name()) else {
        return lexical;
    };
    match std::fs::canonicalize(parent) {
        Ok(p) => p.join(name),
        Err(_) => lexical,
    }
}

/// 创建/重命名目标名的安全校验（目录穿越、非法字符、空白名）。
pub fn validate_name(name: &str) -> Result<()> {
    let invalid = |reason: &'static str| IndexError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.trim().is_empty() {
        return Err(invalid("name is empty"));
    }
    if name == "." || name == ".." {
        return Err(invalid("name is a relative path component"));
    }
    if TRAVERSAL_PATTERNS.iter().any(|p| name.contains(p)) {
        return Err(invalid("name contains a path traversal sequence"));
    }
    if name.contains('/') || name.contains('\\') {
        return Err(invalid("name contains a path separator"));
    }
    if name.chars().any(|c| ILLEGAL_NAME_CHARS.contains(&c)) {
        return Err(invalid("name contains an illegal character"));
    }
    if name.chars().any(char::is_control) {
        return Err(invalid("name contains a control character"));
    }
    Ok(())
}

/// 查询串校验，返回 trim 后的原文。
///
/// 空串 / 控制字符 → `InvalidQuery`；路径穿越或分隔符 → `InvalidName`
/// （查询的是 base name，不可能含分隔符）。
pub fn validate_query(query: &str) -> Result<&str> {
    // 先查原文：首尾的 \t \n 也算控制字符，不能被 trim 掉
    if query.chars().any(char::is_control) {
        return Err(IndexError::InvalidQuery(
            "query contains control characters".into(),
        ));
    }
    let q = query.trim();
    if q.is_empty() {
        return Err(IndexError::InvalidQuery("query is empty".into()));
    }
    if TRAVERSAL_PATTERNS.iter().any(|p| q.contains(p)) || q.contains('/') || q.contains('\\')
    {
        return Err(IndexError::InvalidName {
            name: q.to_string(),
            reason: "query contains a path separator or traversal sequence",
        });
    }
    Ok(q)
}
