use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::MatchError;
use crate::models::{Hits, Invoice, Invoices, Payment, TotalCaching};

/// 候选数超过该值时改用显式栈遍历，避免递归过深
pub const DEFAULT_RECURSION_LIMIT: usize = 512;

/// 搜索参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchOptions {
    pub recursion_limit: usize,
    /// 命中数达到上限后提前结束搜索
    pub max_hits: Option<usize>,
    pub total_caching: TotalCaching,
}

impl Default for MatchOptions {
    fn default() -> Self {
        Self {
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            max_hits: None,
            total_caching: TotalCaching::default(),
        }
    }
}

/// 查找所有金额之和恰好等于付款金额的发票组合
pub fn find_hits(payment: &Payment, candidates: &Invoices) -> Result<Hits, MatchError> {
    find_hits_with(payment, candidates, &MatchOptions::default())
}

/// 同 [`find_hits`]，使用指定搜索参数
///
/// 候选集先复制再按金额降序排序，大额在前可以让包含分支更早触及目标从而剪掉更大的子树。
/// 命中路径不再向下扩展，但同层的排除分支仍会继续搜索，因此金额相同的不同发票组合各自成为一个命中。
/// 命中按深度优先、先包含后排除的发现顺序返回。
pub fn find_hits_with(
    payment: &Payment,
    candidates: &Invoices,
    options: &MatchOptions,
) -> Result<Hits, MatchError> {
    if !payment.is_valid_target() {
        return Err(MatchError::InvalidArgument(format!(
            "payment {} amount {} must be a positive non-zero decimal",
            payment.reference(),
            payment.amount()
        )));
    }
    if candidates.is_empty() {
        return Err(MatchError::InvalidArgument(
            "candidate invoice list must not be empty".to_string(),
        ));
    }

    // 复制候选集，不改变调用方的顺序
    let mut values = Invoices::from_vec(candidates.as_slice().to_vec(), options.total_caching);
    values.sort_by_amount_desc();

    let payment = Arc::new(payment.clone());
    let mut hits = Hits::new(Arc::clone(&payment));
    let mut search = Search::new(payment.amount().clone(), values.as_slice(), options);

    let iterative = values.len() > options.recursion_limit;
    if iterative {
        search.run_iterative(&mut hits);
    } else {
        search.descend(&BigDecimal::zero(), 0, &mut hits);
    }
    hits.set_nodes_visited(search.nodes);

    tracing::debug!(
        "付款 {}: {} 张候选发票, 命中 {} 组, 访问节点 {}, 显式栈={}",
        payment.reference(),
        values.len(),
        hits.len(),
        search.nodes,
        iterative
    );

    Ok(hits)
}

/// 路径上每个位置的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Included,
    Excluded,
}

/// 单次搜索的上下文，不在调用之间共享
struct Search<'a> {
    target: BigDecimal,
    values: &'a [Invoice],
    path: Vec<Slot>,
    max_hits: Option<usize>,
    caching: TotalCaching,
    found: usize,
    nodes: u64,
}

/// 显式栈中的待访问节点；`above` 为进入该节点时上一层的选择
struct Frame {
    level: usize,
    current: BigDecimal,
    above: Option<Slot>,
}

impl<'a> Search<'a> {
    fn new(target: BigDecimal, values: &'a [Invoice], options: &MatchOptions) -> Self {
        Self {
            target,
            values,
            path: vec![Slot::Excluded; values.len()],
            max_hits: options.max_hits,
            caching: options.total_caching,
            found: 0,
            nodes: 0,
        }
    }

    fn exhausted(&self) -> bool {
        self.max_hits.is_some_and(|max| self.found >= max)
    }

    fn descend(&mut self, current: &BigDecimal, level: usize, hits: &mut Hits) {
        if self.exhausted() {
            return;
        }
        self.nodes += 1;

        let new_value = current + self.values[level].amount();
        if new_value == self.target {
            self.record(level, hits);
        }

        if level + 1 >= self.values.len() {
            return;
        }

        // 超过目标的包含分支整棵剪掉
        if new_value < self.target {
            self.path[level] = Slot::Included;
            self.descend(&new_value, level + 1, hits);
        }

        self.path[level] = Slot::Excluded;
        self.descend(current, level + 1, hits);
    }

    fn run_iterative(&mut self, hits: &mut Hits) {
        let mut stack = vec![Frame {
            level: 0,
            current: BigDecimal::zero(),
            above: None,
        }];

        while let Some(frame) = stack.pop() {
            if self.exhausted() {
                break;
            }
            let level = frame.level;
            if let Some(slot) = frame.above {
                self.path[level - 1] = slot;
            }
            self.nodes += 1;

            let new_value = &frame.current + self.values[level].amount();
            if new_value == self.target {
                self.record(level, hits);
            }

            if level + 1 >= self.values.len() {
                continue;
            }

            // 排除分支先入栈，保证包含分支先被访问
            stack.push(Frame {
                level: level + 1,
                current: frame.current,
                above: Some(Slot::Excluded),
            });
            if new_value < self.target {
                stack.push(Frame {
                    level: level + 1,
                    current: new_value,
                    above: Some(Slot::Included),
                });
            }
        }
    }

    fn record(&mut self, level: usize, hits: &mut Hits) {
        let items: Vec<Invoice> = self.path[..level]
            .iter()
            .zip(self.values)
            .filter(|(slot, _)| **slot == Slot::Included)
            .map(|(_, invoice)| invoice.clone())
            .chain(std::iter::once(self.values[level].clone()))
            .collect();
        hits.record(Invoices::from_vec(items, self.caching));
        self.found += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use std::collections::HashSet;
    use std::str::FromStr;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 31).unwrap()
    }

    fn pool(amounts: &[i64]) -> Invoices {
        amounts
            .iter()
            .enumerate()
            .map(|(i, a)| Invoice::new(i as i64 + 1, date(), BigDecimal::from(*a)))
            .collect()
    }

    fn payment(amount: i64) -> Payment {
        Payment::new("PAY-1", date(), BigDecimal::from(amount))
    }

    fn amounts(hits: &Hits) -> Vec<Vec<i64>> {
        hits.iter()
            .map(|hit| {
                hit.invoices()
                    .iter()
                    .map(|i| i.amount().to_string().parse().unwrap())
                    .collect::<Vec<i64>>()
            })
            .collect()
    }

    #[test]
    fn finds_both_subsets_for_nine() {
        let hits = find_hits(&payment(9), &pool(&[1, 3, 5, 6])).unwrap();

        assert_eq!(amounts(&hits), vec![vec![6, 3], vec![5, 3, 1]]);
        assert_eq!(hits.best_hit().unwrap().serials(), vec![3, 2, 1]);
    }

    #[test]
    fn unreachable_target_yields_no_hits() {
        let hits = find_hits(&payment(999), &pool(&[100, 200, 300])).unwrap();

        assert!(hits.is_empty());
        assert!(hits.best_hit().is_none());
    }

    #[test]
    fn equal_amounts_are_distinct_items() {
        let hits = find_hits(&payment(10), &pool(&[5, 5, 10])).unwrap();

        assert_eq!(amounts(&hits), vec![vec![10], vec![5, 5]]);
        assert_eq!(hits.best_hit().unwrap().serials(), vec![1, 2]);
    }

    #[test]
    fn same_value_subsets_are_reported_per_index_set() {
        let hits = find_hits(&payment(5), &pool(&[5, 5, 5])).unwrap();
        let serials: Vec<Vec<i64>> = hits.iter().map(|h| h.serials()).collect();
        assert_eq!(serials, vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn empty_candidates_are_rejected() {
        let err = find_hits(&payment(10), &Invoices::new()).unwrap_err();
        assert!(matches!(err, MatchError::InvalidArgument(_)));
    }

    #[test]
    fn non_positive_payment_is_rejected() {
        for amount in [0, -5] {
            let err = find_hits(&payment(amount), &pool(&[5])).unwrap_err();
            assert!(matches!(err, MatchError::InvalidArgument(_)));
        }
    }

    #[test]
    fn caller_collection_is_untouched() {
        let candidates = pool(&[1, 3, 5, 6]);
        let before = candidates.clone();
        find_hits(&payment(9), &candidates).unwrap();
        assert_eq!(candidates, before);
    }

    #[test]
    fn decimal_match_is_exact_and_scale_insensitive() {
        let candidates: Invoices = ["0.10", "0.20", "0.7"]
            .iter()
            .enumerate()
            .map(|(i, a)| Invoice::new(i as i64, date(), BigDecimal::from_str(a).unwrap()))
            .collect();
        let target = Payment::new("P", date(), BigDecimal::from_str("0.3").unwrap());

        let hits = find_hits(&target, &candidates).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits.get(0).unwrap().grand_total(), BigDecimal::from_str("0.30").unwrap());
    }

    #[test]
    fn every_hit_sums_to_target_without_reuse() {
        let amounts: Vec<i64> = (0..14).map(|i| (i * 37 % 23) + 1).collect();
        let candidates = pool(&amounts);
        let hits = find_hits(&payment(40), &candidates).unwrap();
        assert!(!hits.is_empty());

        let known: HashSet<i64> = candidates.iter().map(Invoice::serial).collect();
        for hit in &hits {
            assert_eq!(hit.grand_total(), BigDecimal::from(40));
            let serials = hit.serials();
            let unique: HashSet<i64> = serials.iter().copied().collect();
            assert_eq!(unique.len(), serials.len());
            assert!(unique.is_subset(&known));
        }
    }

    #[test]
    fn repeated_search_is_idempotent() {
        let candidates = pool(&[2, 4, 6, 8, 10, 12]);
        let first = find_hits(&payment(18), &candidates).unwrap();
        let second = find_hits(&payment(18), &candidates).unwrap();
        assert_eq!(amounts(&first), amounts(&second));
    }

    #[test]
    fn explicit_stack_matches_recursion() {
        let amounts: Vec<i64> = (0..16).map(|i| (i * 37 % 23) + 1).collect();
        let candidates = pool(&amounts);
        let iterative = MatchOptions {
            recursion_limit: 0,
            ..MatchOptions::default()
        };

        let recursive_hits = find_hits(&payment(40), &candidates).unwrap();
        let iterative_hits = find_hits_with(&payment(40), &candidates, &iterative).unwrap();

        let a: Vec<Vec<i64>> = recursive_hits.iter().map(|h| h.serials()).collect();
        let b: Vec<Vec<i64>> = iterative_hits.iter().map(|h| h.serials()).collect();
        assert_eq!(a, b);
        assert_eq!(recursive_hits.nodes_visited(), iterative_hits.nodes_visited());
    }

    #[test]
    fn overshooting_include_branches_are_pruned() {
        let hits = find_hits(&payment(3), &pool(&[1000, 1000, 1000, 1, 2])).unwrap();

        assert_eq!(amounts(&hits), vec![vec![2, 1]]);
        assert_eq!(hits.nodes_visited(), 6);
    }

    #[test]
    fn deep_candidate_sets_use_the_explicit_stack() {
        let candidates = pool(&vec![1000; 5000]);
        let hits = find_hits(&payment(1), &candidates).unwrap();

        assert!(hits.is_empty());
        assert_eq!(hits.nodes_visited(), 5000);
    }

    #[test]
    fn max_hits_stops_early() {
        let options = MatchOptions {
            max_hits: Some(1),
            ..MatchOptions::default()
        };
        let hits = find_hits_with(&payment(9), &pool(&[1, 3, 5, 6]), &options).unwrap();
        assert_eq!(amounts(&hits), vec![vec![6, 3]]);
    }

    #[test]
    fn hit_collections_follow_the_caching_mode() {
        let options = MatchOptions {
            total_caching: TotalCaching::Sticky,
            ..MatchOptions::default()
        };
        let hits = find_hits_with(&payment(10), &pool(&[5, 5, 10]), &options).unwrap();
        for hit in &hits {
            assert_eq!(hit.invoices().caching(), TotalCaching::Sticky);
        }
    }
}
