use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::core::names;
use crate::core::{EntryId, EntryKind};
use crate::error::{IndexError, Result};
use crate::index::catalog::Catalog;
use crate::query::scorer::{Scorer, SearchResult};

/// 匹配策略，声明顺序即尝试顺序（也是基础分从高到低的顺序）
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    Exact,
    Prefix,
    Word,
    Substring,
}

impl Strategy {
    pub fn label(self) -> &'static str {
        match self {
            Strategy::Exact => "exact",
            Strategy::Prefix => "prefix",
            Strategy::Word => "word",
            Strategy::Substring => "substring",
        }
    }
}

/// 解析后的查询：折叠一次，各策略共享
#[derive(Clone, Debug)]
pub struct Query {
    pub raw: String,
    pub folded: String,
    pub tokens: Vec<String>,
}

impl Query {
    /// 不做校验；调用方先过 [`names::validate_query`]
    pub fn parse(raw: &str) -> Self {
        let folded = names::fold(raw.trim());
        let tokens = names::tokenize(&folded);
        Self {
            raw: raw.trim().to_string(),
            folded,
            tokens,
        }
    }

    pub fn char_len(&self) -> usize {
        self.folded.chars().count()
    }
}

/// 策略 = 纯函数：只读索引，返回候选 id 集合
pub type StrategyFn = fn(&Query, &Catalog) -> BTreeSet<EntryId>;

pub const STRATEGIES: [(Strategy, StrategyFn); 4] = [
    (Strategy::Exact, exact),
    (Strategy::Prefix, prefix),
    (Strategy::Word, word),
    (Strategy::Substring, substring),
];

/// base name 完全相等，或文件的 stem 相等（`report` 命中 `report.docx`）
fn exact(q: &Query, c: &Catalog) -> BTreeSet<EntryId> {
    let mut out = c.names().lookup_exact(&q.folded);
    let with_ext = format!("{}.", q.folded);
    for id in c.names().lookup_prefix(&with_ext) {
        let Some(e) = c.store().get(id) else {
            // 留给 run() 报不一致
            out.insert(id);
            continue;
        };
        if e.kind == EntryKind::File && e.folded_stem() == Some(q.folded.as_str()) {
            out.insert(id);
        }
    }
    out
}

fn prefix(q: &Query, c: &Catalog) -> BTreeSet<EntryId> {
    c.names().lookup_prefix(&q.folded)
}

/// 每个查询 token 都必须是某个名字 token 的前缀
fn word(q: &Query, c: &Catalog) -> BTreeSet<EntryId> {
    let mut tokens = q.tokens.iter();
    let Some(first) = tokens.next() else {
        return BTreeSet::new();
    };
    let mut acc = c.words().lookup_prefix(first);
    for tok in tokens {
        if acc.is_empty() {
            break;
        }
        let hits = c.words().lookup_prefix(tok);
        acc.retain(|id| hits.contains(id));
    }
    acc
}

/// 线性扫描，最后兜底
fn substring(q: &Query, c: &Catalog) -> BTreeSet<EntryId> {
    c.store()
        .iter()
        .filter(|e| e.folded_name.contains(&q.folded))
        .map(|e| e.id)
        .collect()
}

/// 一次匹配的产出
#[derive(Debug, Default)]
pub struct MatchOutcome {
    /// 已过滤（≥ min_confidence）、已排序、已截断到 k
    pub results: Vec<SearchResult>,
    /// 截断前达到 min_confidence 的候选数
    pub confident: usize,
    pub attempted: Vec<Strategy>,
}

/// 按序执行策略，够数即停
pub struct MatchEngine {
    strategies: Vec<(Strategy, StrategyFn)>,
    min_confidence: f64,
}

impl MatchEngine {
    pub fn new(min_confidence: f64) -> Self {
        Self {
            strategies: STRATEGIES.to_vec(),
            min_confidence,
        }
    }

    pub fn min_confidence(&self) -> f64 {
        self.min_confidence
    }

    pub fn run(&self, query: &Query, k: usize, catalog: &Catalog, scorer: &Scorer) -> Result<MatchOutcome> {
        let mut outcome = MatchOutcome::default();
        if k == 0 {
            return Ok(outcome);
        }

        // id → (最先命中的策略, 置信度)
        let mut hits: BTreeMap<EntryId, (Strategy, f64)> = BTreeMap::new();
        for (strategy, f) in &self.strategies {
            if *strategy == Strategy::Substring && outcome.confident >= k {
                break;
            }
            outcome.attempted.push(*strategy);

            let mut own_confident = 0usize;
            for id in f(query, catalog) {
                if hits.contains_key(&id) {
                    continue;
                }
                let entry = catalog.store().get(id).ok_or_else(|| {
                    IndexError::IndexInconsistency(format!(
                        "{} strategy returned {:?} which is not in the entry store",
                        strategy.label(),
                        id
                    ))
                })?;
                let confidence = scorer.confidence(*strategy, query, entry);
                if confidence >= self.min_confidence {
                    own_confident += 1;
                }
                hits.insert(id, (*strategy, confidence));
            }
            outcome.confident += own_confident;
            if own_confident >= k {
                break;
            }
        }

        let mut results = Vec::with_capacity(hits.len());
        for (id, (strategy, confidence)) in hits {
            if confidence < self.min_confidence {
                continue;
            }
            let Some(entry) = catalog.store().get(id) else {
                continue;
            };
            results.push(SearchResult {
                entry: entry.clone(),
                strategy,
                confidence,
            });
        }
        Scorer::rank(&mut results);
        results.truncate(k);
        outcome.results = results;
        Ok(outcome)
    }
}
