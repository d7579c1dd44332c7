//! Line diffing between two versions of the input text.
//!
//! Matching blocks come from a longest-common-substring recursion in the
//! Ratcliff/Obershelp style (longest block first), with junk heuristics off:
//! short repeated lines (single words, numbers) are common in reading
//! material and must still anchor the alignment.

use std::collections::{BTreeSet, HashMap};
use std::sync::OnceLock;

use regex::Regex;

/// A run of `size` equal elements starting at `a[a_start]` and `b[b_start]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MatchingBlock {
    pub a_start: usize,
    pub b_start: usize,
    pub size: usize,
}

pub struct SequenceMatcher<'a, T> {
    a: &'a [T],
    b: &'a [T],
    b2j: HashMap<&'a T, Vec<usize>>,
}

impl<'a, T: Eq + std::hash::Hash> SequenceMatcher<'a, T> {
    pub fn new(a: &'a [T], b: &'a [T]) -> Self {
        let mut b2j: HashMap<&T, Vec<usize>> = HashMap::new();
        for (j, item) in b.iter().enumerate() {
            b2j.entry(item).or_default().push(j);
        }
        Self { a, b, b2j }
    }

    /// Longest block in `a[alo..ahi]` x `b[blo..bhi]`, earliest on ties.
    fn find_longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> MatchingBlock {
        let mut best = MatchingBlock {
            a_start: alo,
            b_start: blo,
            size: 0,
        };
        // j2len[j] = length of the match ending at a[i-1], b[j]
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next_j2len = HashMap::new();
            if let Some(indices) = self.b2j.get(&self.a[i]) {
                for &j in indices {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next_j2len.insert(j, k);
                    if k > best.size {
                        best = MatchingBlock {
                            a_start: i + 1 - k,
                            b_start: j + 1 - k,
                            size: k,
                        };
                    }
                }
            }
            j2len = next_j2len;
        }
        best
    }

    /// Non-adjacent matching blocks in ascending order, closed by a
    /// zero-size sentinel at `(a.len(), b.len())`.
    pub fn matching_blocks(&self) -> Vec<MatchingBlock> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut queue = vec![(0, la, 0, lb)];
        let mut blocks = Vec::new();
        while let Some((alo, ahi, blo, bhi)) = queue.pop() {
            let block = self.find_longest_match(alo, ahi, blo, bhi);
            if block.size == 0 {
                continue;
            }
            let (i, j, k) = (block.a_start, block.b_start, block.size);
            blocks.push(block);
            if alo < i && blo < j {
                queue.push((alo, i, blo, j));
            }
            if i + k < ahi && j + k < bhi {
                queue.push((i + k, ahi, j + k, bhi));
            }
        }
        blocks.sort();

        let mut merged: Vec<MatchingBlock> = Vec::with_capacity(blocks.len() + 1);
        for block in blocks {
            match merged.last_mut() {
                Some(last)
                    if last.a_start + last.size == block.a_start
                        && last.b_start + last.size == block.b_start =>
                {
                    last.size += block.size;
                }
                _ => merged.push(block),
            }
        }
        merged.push(MatchingBlock {
            a_start: la,
            b_start: lb,
            size: 0,
        });
        merged
    }
}

/// Indices of `new` that were inserted, replaced, or sit right after a
/// deletion. Ascending, unique, all `< new.len()`.
pub fn modified_lines(old: &[String], new: &[String]) -> Vec<usize> {
    let matcher = SequenceMatcher::new(old, new);
    let mut modified = Vec::new();
    let (mut last_a, mut last_b) = (0, 0);
    for block in matcher.matching_blocks() {
        if block.b_start > last_b {
            modified.extend(last_b..block.b_start);
        } else if block.a_start > last_a && block.b_start < new.len() {
            modified.push(block.b_start);
        }
        last_a = block.a_start + block.size;
        last_b = block.b_start + block.size;
    }
    modified
}

/// [`modified_lines`], plus the still-unvisited indices of a previous
/// modification set (those after `pointer` and inside the new bounds).
pub fn accumulate_modified_lines(
    previous: &[usize],
    pointer: usize,
    new_len: usize,
    current: Vec<usize>,
) -> Vec<usize> {
    let carried: Vec<usize> = previous
        .iter()
        .copied()
        .filter(|&line| line > pointer && line < new_len)
        .collect();
    if carried.is_empty() {
        return current;
    }
    current
        .into_iter()
        .chain(carried)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn blank_area_regex() -> &'static Regex {
    static BLANK_AREA: OnceLock<Regex> = OnceLock::new();
    BLANK_AREA.get_or_init(|| Regex::new(r"(\s+?)\n+").expect("valid blank-area regex"))
}

/// Whitespace runs that end at a line break, in order of appearance.
pub fn blank_areas(text: &str) -> Vec<&str> {
    blank_area_regex()
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .collect()
}

/// Whether the whitespace layout around line breaks differs.
pub fn blank_areas_changed(old_text: &str, new_text: &str) -> bool {
    blank_areas(old_text) != blank_areas(new_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_replacement() {
        assert_eq!(modified_lines(&lines(&["a", "b", "c"]), &lines(&["a", "X", "c"])), vec![1]);
    }

    #[test]
    fn test_deletion_marks_following_line() {
        assert_eq!(modified_lines(&lines(&["a", "b", "c"]), &lines(&["a", "c"])), vec![1]);
    }

    #[test]
    fn test_insertion() {
        assert_eq!(modified_lines(&lines(&["a", "b"]), &lines(&["a", "b", "c"])), vec![2]);
        assert_eq!(modified_lines(&lines(&["b", "c"]), &lines(&["a", "b", "c"])), vec![0]);
    }

    #[test]
    fn test_deletion_at_end_is_not_reported() {
        assert!(modified_lines(&lines(&["a", "b", "c"]), &lines(&["a", "b"])).is_empty());
    }

    #[test]
    fn test_shift_keeps_indices_in_bounds() {
        // "c" falls off the end while "x" is inserted at the top.
        let modified = modified_lines(&lines(&["a", "b", "c"]), &lines(&["x", "a", "b"]));
        assert_eq!(modified, vec![0]);
    }

    #[test]
    fn test_identical_and_empty() {
        let same = lines(&["a", "b"]);
        assert!(modified_lines(&same, &same).is_empty());
        assert_eq!(modified_lines(&[], &lines(&["a", "b"])), vec![0, 1]);
        assert!(modified_lines(&lines(&["a", "b"]), &[]).is_empty());
    }

    #[test]
    fn test_repeated_short_lines_are_significant() {
        let old: Vec<String> = (0..300).map(|i| if i % 2 == 0 { "1".into() } else { "2".into() }).collect();
        let mut new = old.clone();
        new[250] = "3".into();
        assert_eq!(modified_lines(&old, &new), vec![250]);
    }

    #[test]
    fn test_matching_blocks_sentinel() {
        let a = lines(&["a", "b", "c", "d"]);
        let b = lines(&["a", "x", "c", "d"]);
        let blocks = SequenceMatcher::new(&a, &b).matching_blocks();
        assert_eq!(
            blocks,
            vec![
                MatchingBlock { a_start: 0, b_start: 0, size: 1 },
                MatchingBlock { a_start: 2, b_start: 2, size: 2 },
                MatchingBlock { a_start: 4, b_start: 4, size: 0 },
            ]
        );
    }

    #[test]
    fn test_accumulate_keeps_unvisited_previous_changes() {
        let merged = accumulate_modified_lines(&[1, 5, 7, 12], 4, 10, vec![2, 7]);
        assert_eq!(merged, vec![2, 5, 7]);
        assert_eq!(accumulate_modified_lines(&[1, 2], 4, 10, vec![3]), vec![3]);
    }

    #[test]
    fn test_blank_areas() {
        assert_eq!(blank_areas("a  \nb\n\nc"), vec!["  ", "\n"]);
        assert!(!blank_areas_changed("a\nb\n", "x\ny\n"));
        assert!(blank_areas_changed("a\nb\n", "a \nb\n"));
        assert!(blank_areas_changed("a\nb", "a\n\nb"));
    }
}
