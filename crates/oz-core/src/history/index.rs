use std::sync::Arc;

use super::entry::HistoryEntry;

/// Gap characters allowed per query character in a subsequence match.
const MAX_GAP_PER_CHAR: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Tier {
    Prefix,
    Substring,
    Subsequence,
    Typo,
}

/// Edits tolerated per query word, growing with the word's length.
fn typo_budget(len: usize) -> usize {
    match len {
        0..=3 => 0,
        4..=7 => 1,
        _ => 2,
    }
}

/// Fuzzy search over a sorted entry collection.
///
/// Results rank prefix matches, then other substring matches, then in-order
/// subsequence matches by tightness, then word-level typo matches by edit
/// distance. Equal relevance keeps collection order, so results follow
/// whatever sort the collection was built with.
#[derive(Debug, Clone, Default)]
pub struct SearchIndex {
    entries: Vec<Arc<HistoryEntry>>,
    lowered: Vec<String>,
    words: Vec<Vec<Vec<char>>>,
}

impl SearchIndex {
    pub fn build(entries: &[Arc<HistoryEntry>]) -> Self {
        let lowered: Vec<String> = entries.iter().map(|e| e.text().to_lowercase()).collect();
        let words = lowered.iter().map(|text| split_words(text)).collect();
        Self {
            entries: entries.to_vec(),
            lowered,
            words,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True if the index covers exactly `entries`, in the same order.
    pub fn is_bound_to(&self, entries: &[Arc<HistoryEntry>]) -> bool {
        self.entries.len() == entries.len()
            && self
                .entries
                .iter()
                .zip(entries)
                .all(|(a, b)| Arc::ptr_eq(a, b))
    }

    pub fn search(&self, query: &str) -> Vec<Arc<HistoryEntry>> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return self.entries.clone();
        }
        let needle_chars: Vec<char> = needle.chars().collect();
        let needle_words = split_words(&needle);

        let mut hits: Vec<(Tier, usize, usize)> = self
            .lowered
            .iter()
            .enumerate()
            .filter_map(|(position, text)| {
                match_score(text, &needle, &needle_chars)
                    .or_else(|| {
                        typo_distance(&self.words[position], &needle_words)
                            .map(|edits| (Tier::Typo, edits))
                    })
                    .map(|(tier, score)| (tier, score, position))
            })
            .collect();
        hits.sort_unstable();
        hits.into_iter()
            .map(|(_, _, position)| Arc::clone(&self.entries[position]))
            .collect()
    }
}

fn match_score(text: &str, needle: &str, needle_chars: &[char]) -> Option<(Tier, usize)> {
    if let Some(at) = text.find(needle) {
        let tier = if at == 0 { Tier::Prefix } else { Tier::Substring };
        return Some((tier, 0));
    }
    let gap = tightest_window(text, needle_chars)?;
    (gap <= needle_chars.len() * MAX_GAP_PER_CHAR).then_some((Tier::Subsequence, gap))
}

/// Smallest number of skipped characters over all greedy subsequence matches.
fn tightest_window(text: &str, needle: &[char]) -> Option<usize> {
    let first = *needle.first()?;
    let chars: Vec<char> = text.chars().collect();
    let mut best: Option<usize> = None;

    for start in (0..chars.len()).filter(|&i| chars[i] == first) {
        let mut cur = start + 1;
        let mut last = start;
        let mut matched = true;
        for &nc in &needle[1..] {
            match chars[cur..].iter().position(|&c| c == nc) {
                Some(offset) => {
                    last = cur + offset;
                    cur = last + 1;
                }
                None => {
                    matched = false;
                    break;
                }
            }
        }
        if !matched {
            // Later starts cannot succeed either.
            break;
        }
        let gap = (last - start + 1) - needle.len();
        best = Some(best.map_or(gap, |b: usize| b.min(gap)));
        if gap == 0 {
            break;
        }
    }
    best
}

fn split_words(text: &str) -> Vec<Vec<char>> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(|word| word.chars().collect())
        .collect()
}

/// Total edits when every query word is within its budget of some text word.
fn typo_distance(text_words: &[Vec<char>], needle_words: &[Vec<char>]) -> Option<usize> {
    if needle_words.is_empty() {
        return None;
    }
    needle_words.iter().try_fold(0, |total, needle| {
        let budget = typo_budget(needle.len());
        let best = text_words
            .iter()
            .filter(|word| needle.len() <= word.len() + budget)
            .map(|word| word_distance(needle, word))
            .min()?;
        (best <= budget).then_some(total + best)
    })
}

/// Distance to the whole word, or to its start when the query is shorter.
fn word_distance(needle: &[char], word: &[char]) -> usize {
    let full = edit_distance(needle, word);
    if word.len() > needle.len() {
        full.min(edit_distance(needle, &word[..needle.len()]))
    } else {
        full
    }
}

/// Optimal string alignment distance: insertions, deletions, substitutions
/// and adjacent transpositions each cost one.
fn edit_distance(a: &[char], b: &[char]) -> usize {
    let mut d = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    for (i, row) in d.iter_mut().enumerate() {
        row[0] = i;
    }
    for (j, cell) in d[0].iter_mut().enumerate() {
        *cell = j;
    }
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            let mut best = (d[i - 1][j] + 1)
                .min(d[i][j - 1] + 1)
                .min(d[i - 1][j - 1] + cost);
            if i > 1 && j > 1 && a[i - 1] == b[j - 2] && a[i - 2] == b[j - 1] {
                best = best.min(d[i - 2][j - 2] + 1);
            }
            d[i][j] = best;
        }
    }
    d[a.len()][b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(texts: &[&str]) -> Vec<Arc<HistoryEntry>> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Arc::new(HistoryEntry::new(i as i64, *t, i as i64)))
            .collect()
    }

    fn texts(results: &[Arc<HistoryEntry>]) -> Vec<&str> {
        results.iter().map(|e| e.text()).collect()
    }

    #[test]
    fn test_prefix_ranks_first() {
        let index = SearchIndex::build(&entries(&["a rust book", "Rust tips", "nothing"]));
        assert_eq!(texts(&index.search("rust")), vec!["Rust tips", "a rust book"]);
    }

    #[test]
    fn test_equal_relevance_keeps_order() {
        let index = SearchIndex::build(&entries(&["x cat", "y cat", "z cat"]));
        assert_eq!(texts(&index.search("cat")), vec!["x cat", "y cat", "z cat"]);
    }

    #[test]
    fn test_subsequence_after_substring() {
        let index = SearchIndex::build(&entries(&["c_a_t here", "the cat"]));
        assert_eq!(texts(&index.search("cat")), vec!["the cat", "c_a_t here"]);
    }

    #[test]
    fn test_spread_limit() {
        let index = SearchIndex::build(&entries(&["c.................a..................t"]));
        assert!(index.search("cat").is_empty());
    }

    #[test]
    fn test_transposed_letters_match() {
        let index = SearchIndex::build(&entries(&["python venv setup", "rust notes"]));
        assert_eq!(texts(&index.search("pyhton")), vec!["python venv setup"]);
        assert_eq!(texts(&index.search("venv setpu")), vec!["python venv setup"]);
    }

    #[test]
    fn test_substituted_letter_matches() {
        let index = SearchIndex::build(&entries(&["python venv setup"]));
        assert_eq!(index.search("pithon").len(), 1);
        // Partial words are compared against word starts.
        assert_eq!(index.search("pyhto").len(), 1);
    }

    #[test]
    fn test_typo_budget_bounds() {
        let index = SearchIndex::build(&entries(&["the cat sat", "python"]));
        // Short words must match exactly.
        assert!(index.search("cxt").is_empty());
        // Two edits exceed the budget of a six letter word.
        assert!(index.search("pxthxn").is_empty());
    }

    #[test]
    fn test_typos_rank_last() {
        let index = SearchIndex::build(&entries(&["python guide", "p_y_h_t_o_n", "pyhton notes"]));
        assert_eq!(
            texts(&index.search("pyhton")),
            vec!["pyhton notes", "p_y_h_t_o_n", "python guide"]
        );
    }

    #[test]
    fn test_edit_distance() {
        let chars = |s: &str| s.chars().collect::<Vec<_>>();
        assert_eq!(edit_distance(&chars("pyhton"), &chars("python")), 1);
        assert_eq!(edit_distance(&chars("pithon"), &chars("python")), 1);
        assert_eq!(edit_distance(&chars("kitten"), &chars("sitting")), 3);
        assert_eq!(edit_distance(&chars(""), &chars("abc")), 3);
    }

    #[test]
    fn test_tightest_window_prefers_later_start() {
        assert_eq!(tightest_window("c x x x cat", &['c', 'a', 't']), Some(0));
    }

    #[test]
    fn test_case_insensitive() {
        let index = SearchIndex::build(&entries(&["Hello WORLD"]));
        assert_eq!(index.search("world").len(), 1);
        assert_eq!(index.search("HELLO").len(), 1);
    }

    #[test]
    fn test_empty_query_returns_all() {
        let all = entries(&["a", "b"]);
        let index = SearchIndex::build(&all);
        assert_eq!(index.search("  ").len(), 2);
    }

    #[test]
    fn test_is_bound_to() {
        let all = entries(&["a", "b"]);
        let index = SearchIndex::build(&all);
        assert!(index.is_bound_to(&all));
        let reversed: Vec<_> = all.iter().rev().cloned().collect();
        assert!(!index.is_bound_to(&reversed));
        assert!(!index.is_bound_to(&entries(&["a", "b"])));
    }
}
