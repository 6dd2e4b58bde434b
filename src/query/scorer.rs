use serde::Serialize;
use std::path::PathBuf;

use crate::config::ScoringWeights;
use crate::core::Entry;
use crate::query::engine::{Query, Strategy};

/// 一条排好序的搜索结果
#[derive(Clone, Debug, Serialize)]
pub struct SearchResult {
    pub entry: Entry,
    pub strategy: Strategy,
    pub confidence: f64,
}

/// 置信度 = 策略基础分 + 长度接近度加分 + 用户目录加分，截断到 [0, 1]。
pub struct Scorer {
    weights: ScoringWeights,
    user_roots: Vec<PathBuf>,
}

impl Scorer {
    pub fn new(weights: ScoringWeights, user_roots: Vec<PathBuf>) -> Self {
        Self {
            weights,
            user_roots,
        }
    }

    pub fn base(&self, strategy: Strategy) -> f64 {
        match strategy {
            Strategy::Exact => self.weights.exact,
            Strategy::Prefix => self.weights.prefix,
            Strategy::Word => self.weights.word,
            Strategy::Substring => self.weights.substring,
        }
    }

    fn length_ratio(query: &Query, entry: &Entry) -> f64 {
        let q = query.char_len() as f64;
        let n = entry.folded_name.chars().count() as f64;
        let longest = q.max(n);
        if longest == 0.0 {
            return 0.0;
        }
        1.0 - (q - n).abs() / longest
    }

    pub fn in_user_root(&self, entry: &Entry) -> bool {
        self.user_roots
            .iter()
            .any(|r| entry.canonical_path.starts_with(r))
    }

    pub fn confidence(&self, strategy: Strategy, query: &Query, entry: &Entry) -> f64 {
        let mut c = self.base(strategy) + self.weights.length_bonus * Self::length_ratio(query, entry);
        if self.in_user_root(entry) {
            c += self.weights.location_bonus;
        }
        c.clamp(0.0, 1.0)
    }

    /// 确定性排序：置信度降序 → depth 升序 → 路径字典序
    pub fn rank(results: &mut [SearchResult]) {
        results.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.entry.depth.cmp(&b.entry.depth))
                .then_with(|| a.entry.canonical_path.cmp(&b.entry.canonical_path))
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EntryId, EntryKind};

    fn entry(id: u32, path: &str) -> Entry {
        Entry::new(EntryId(id), PathBuf::from(path), EntryKind::File, None)
    }

    fn scorer() -> Scorer {
        Scorer::new(
            ScoringWeights::default(),
            vec![PathBuf::from("/home/me/Documents")],
        )
    }

    #[test]
    fn length_bonus_rewards_close_lengths() {
        let s = scorer();
        let q = Query::parse("report");
        let short = entry(1, "/x/report.md");
        let long = entry(2, "/x/report_for_the_board.md");
        assert!(
            s.confidence(Strategy::Prefix, &q, &short) > s.confidence(Strategy::Prefix, &q, &long)
        );
    }

    #[test]
    fn location_bonus_applies_under_user_roots() {
        let s = scorer();
        let q = Query::parse("plan");
        let inside = entry(1, "/home/me/Documents/plan.txt");
        let outside = entry(2, "/srv/plan.txt");
        let d = s.confidence(Strategy::Word, &q, &inside) - s.confidence(Strategy::Word, &q, &outside);
        assert!((d - 0.05).abs() < 1e-9);
    }

    #[test]
    fn strategy_order_survives_bonuses() {
        let s = scorer();
        let q = Query::parse("ab");
        // 最好情形的低层策略 < 最差情形的高层策略
        let best = entry(1, "/home/me/Documents/ab");
        let worst = entry(2, "/srv/abxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxxx");
        assert!(s.confidence(Strategy::Prefix, &q, &best) < s.confidence(Strategy::Exact, &q, &worst));
        assert!(s.confidence(Strategy::Word, &q, &best) < s.confidence(Strategy::Prefix, &q, &worst));
        assert!(s.confidence(Strategy::Substring, &q, &best) < s.confidence(Strategy::Word, &q, &worst));
    }

    #[test]
    fn confidence_is_clamped() {
        let s = scorer();
        let q = Query::parse("plan.txt");
        let e = entry(1, "/home/me/Documents/plan.txt");
        assert_eq!(s.confidence(Strategy::Exact, &q, &e), 1.0);
    }

    #[test]
    fn ranking_breaks_ties_by_depth_then_path() {
        let mk = |id, p: &str, c| SearchResult {
            entry: entry(id, p),
            strategy: Strategy::Prefix,
            confidence: c,
        };
        let mut v = vec![
            mk(1, "/a/b/c/x.txt", 0.9),
            mk(2, "/z/x.txt", 0.9),
            mk(3, "/a/x.txt", 0.9),
            mk(4, "/q/q/y.txt", 0.95),
        ];
        Scorer::rank(&mut v);
        let order: Vec<u32> = v.iter().map(|r| r.entry.id.0).collect();
        assert_eq!(order, vec![4, 3, 2, 1]);
    }
}
