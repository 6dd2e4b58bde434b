use std::collections::BTreeSet;

use crate::core::names;
use crate::core::EntryId;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct NodeId(u32);

impl NodeId {
    const ROOT: NodeId = NodeId(0);

    #[inline]
    fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Default)]
struct TrieNode {
    /// 按 char 有序：DFS 收集顺序稳定，查找用二分
    children: Vec<(char, NodeId)>,
    terminals: BTreeSet<EntryId>,
}

impl TrieNode {
    fn child(&self, c: char) -> Option<NodeId> {
        self.children
            .binary_search_by(|(k, _)| k.cmp(&c))
            .ok()
            .map(|i| self.children[i].1)
    }
}

/// 前缀树：节点放在 arena（Vec）里，用 NodeId 互相引用。
///
/// ## 约定
/// - 所有 key 先经过 [`names::fold`]（NFC + 小写），调用方传原始名字即可。
/// - 删除只清空终点集合，不回收节点（会话级生命周期，内存换结构简单）。
#[derive(Debug)]
pub struct Trie {
    nodes: Vec<TrieNode>,
    /// 终点集合里的 id 总数
    terminal_count: usize,
}

impl Default for Trie {
    fn default() -> Self {
        Self::new()
    }
}

impl Trie {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            terminal_count: 0,
        }
    }

    fn walk(&self, key: &str) -> Option<NodeId> {
        let mut cur = NodeId::ROOT;
        for c in key.chars() {
            cur = self.nodes[cur.index()].child(c)?;
        }
        Some(cur)
    }

    fn walk_or_create(&mut self, key: &str) -> NodeId {
        let mut cur = NodeId::ROOT;
        for c in key.chars() {
            let node = &self.nodes[cur.index()];
            cur = match node.children.binary_search_by(|(k, _)| k.cmp(&c)) {
                Ok(i) => node.children[i].1,
                Err(i) => {
                    let id = NodeId(self.nodes.len() as u32);
                    self.nodes.push(TrieNode::default());
                    self.nodes[cur.index()].children.insert(i, (c, id));
                    id
                }
            };
        }
        cur
    }

    pub fn insert(&mut self, name: &str, id: EntryId) {
        let key = names::fold(name);
        let node = self.walk_or_create(&key);
        if self.nodes[node.index()].terminals.insert(id) {
            self.terminal_count += 1;
        }
    }

    /// 返回 true 表示确实移除了
    pub fn remove(&mut self, name: &str, id: EntryId) -> bool {
        let key = names::fold(name);
        let Some(node) = self.walk(&key) else {
            return false;
        };
        let removed = self.nodes[node.index()].terminals.remove(&id);
        if removed {
            self.terminal_count -= 1;
        }
        removed
    }

    /// remove + insert；调用方持有 `&mut self`，读者不可能看到中间态
    pub fn rename(&mut self, old_name: &str, new_name: &str, id: EntryId) {
        self.remove(old_name, id);
        self.insert(new_name, id);
    }

    /// 子树内所有终点集合的并集（DFS）
    pub fn lookup_prefix(&self, prefix: &str) -> BTreeSet<EntryId> {
        let mut out = BTreeSet::new();
        let key = names::fold(prefix);
        let Some(start) = self.walk(&key) else {
            return out;
        };
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            let node = &self.nodes[n.index()];
            out.extend(node.terminals.iter().copied());
            stack.extend(node.children.iter().rev().map(|(_, c)| *c));
        }
        out
    }

    /// 恰好等于 `name` 的终点集合
    pub fn lookup_exact(&self, name: &str) -> BTreeSet<EntryId> {
        let key = names::fold(name);
        self.walk(&key)
            .map(|n| self.nodes[n.index()].terminals.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, name: &str, id: EntryId) -> bool {
        let key = names::fold(name);
        self.walk(&key)
            .is_some_and(|n| self.nodes[n.index()].terminals.contains(&id))
    }

    /// 所有终点引用的 id（一致性校验用）
    pub fn for_each_terminal(&self, mut f: impl FnMut(EntryId)) {
        for node in &self.nodes {
            for id in &node.terminals {
                f(*id);
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn terminal_count(&self) -> usize {
        self.terminal_count
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.push(TrieNode::default());
        self.terminal_count = 0;
    }

    /// 估算堆占用（粗估、偏保守）
    pub fn estimated_bytes(&self) -> u64 {
        use std::mem::size_of;
        let btree_slot = size_of::<EntryId>() as u64 + 8;
        let mut bytes = self.nodes.capacity() as u64 * size_of::<TrieNode>() as u64;
        for node in &self.nodes {
            bytes += node.children.capacity() as u64 * size_of::<(char, NodeId)>() as u64;
            bytes += node.terminals.len() as u64 * btree_slot;
        }
        bytes
    }
}
