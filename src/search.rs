use serde::Serialize;

use crate::{
    catalog::{CatalogEntry, CatalogStore},
    error::Result,
    normalize::normalize,
};

pub const SCORE_EXACT: u32 = 40;
pub const SCORE_PREFIX: u32 = 30;
pub const SCORE_WORD: u32 = 20;
pub const SCORE_PARTIAL: u32 = 10;

#[derive(Debug, Clone)]
pub struct SearchParams {
    pub query: String,
    pub limit: usize,
    pub offset: usize,
}

/// Read-only projection of a catalog entry, without internal ids.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub rank: usize,
    pub score: u32,
    pub source_feed_id: i64,
    pub source_item_id: i64,
    pub display_name: String,
    pub byte_size: Option<u64>,
    pub mime_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchPage {
    pub hits: Vec<SearchHit>,
    /// Matching documents disregarding pagination.
    pub total: usize,
}

/// Score a candidate key against the normalized query, highest tier wins.
///
/// Assumes the candidate filter already accepted the key; a key matching
/// none of the upper tiers is still a partial match.
pub fn score_key(search_key: &str, normalized_query: &str) -> u32 {
    if search_key == normalized_query {
        return SCORE_EXACT;
    }
    if search_key.starts_with(normalized_query)
        && boundary_at(search_key, normalized_query.len())
    {
        return SCORE_PREFIX;
    }
    for (at, _) in search_key.match_indices(normalized_query) {
        if boundary_before(search_key, at)
            && boundary_at(search_key, at + normalized_query.len())
        {
            return SCORE_WORD;
        }
    }
    SCORE_PARTIAL
}

/// Whether the character starting at `at` fails to extend a word
/// (end of string or non-alphanumeric).
fn boundary_at(key: &str, at: usize) -> bool {
    key[at..].chars().next().is_none_or(|c| !c.is_alphanumeric())
}

fn boundary_before(key: &str, at: usize) -> bool {
    key[..at].chars().next_back().is_none_or(|c| !c.is_alphanumeric())
}

/// Whether every character of `query` occurs in `key` in order, separated
/// by arbitrary characters.
///
/// This is the candidate filter. It subsumes plain substring containment:
/// contiguous matches pass it and land in the upper score tiers, while
/// matches that are only in-order (multi-token queries like "kgf tamil"
/// against "kgf chapter 2 tamil", or scattered ones like "hit" against
/// "exhibit a") can never score above partial and sort below.
fn chars_in_order(key: &str, query: &str) -> bool {
    let mut key_chars = key.chars();
    'query: for wanted in query.chars() {
        for candidate in key_chars.by_ref() {
            if candidate == wanted {
                continue 'query;
            }
        }
        return false;
    }
    true
}

fn candidates(
    catalog: &CatalogStore,
    normalized_query: &str,
) -> Result<Vec<CatalogEntry>> {
    catalog.matching(|e| chars_in_order(&e.search_key, normalized_query))
}

/// Rank every candidate for the query, then paginate.
///
/// Ordering is total and stable for a fixed dataset and query: score
/// descending, search key length ascending, display name ascending,
/// source item id ascending. Zero matches is a valid outcome.
pub fn execute_search(
    catalog: &CatalogStore,
    params: &SearchParams,
) -> Result<SearchPage> {
    let normalized_query = normalize(&params.query);
    let found = candidates(catalog, &normalized_query)?;

    let mut scored: Vec<(u32, CatalogEntry)> = found
        .into_iter()
        .map(|e| (score_key(&e.search_key, &normalized_query), e))
        .collect();
    scored.sort_by(|(score_a, a), (score_b, b)| {
        score_b
            .cmp(score_a)
            .then(a.search_key.len().cmp(&b.search_key.len()))
            .then(a.display_name.cmp(&b.display_name))
            .then(a.source_item_id.cmp(&b.source_item_id))
    });

    let total = scored.len();
    let hits = scored
        .into_iter()
        .skip(params.offset)
        .take(params.limit)
        .enumerate()
        .map(|(i, (score, entry))| SearchHit {
            rank: params.offset + i + 1,
            score,
            source_feed_id: entry.source_feed_id,
            source_item_id: entry.source_item_id,
            display_name: entry.display_name,
            byte_size: entry.byte_size,
            mime_type: entry.mime_type,
        })
        .collect();

    Ok(SearchPage { hits, total })
}

/// Total matching documents under the same candidate policy as
/// [`execute_search`], disregarding pagination.
pub fn count(catalog: &CatalogStore, query: &str) -> Result<usize> {
    let normalized_query = normalize(query);
    Ok(candidates(catalog, &normalized_query)?.len())
}

/// Format results for human-readable terminal output.
pub fn format_human(page: &SearchPage) {
    if page.hits.is_empty() {
        println!("No results found.");
        return;
    }

    for hit in &page.hits {
        println!(
            "{:>3}. [{:>2}] {} ({}) feed {} item {}",
            hit.rank,
            hit.score,
            hit.display_name,
            format_size(hit.byte_size),
            hit.source_feed_id,
            hit.source_item_id,
        );
    }
    println!("\n{} of {} result(s)", page.hits.len(), page.total);
}

/// Human-readable byte size, `?` when the feed reported none.
pub fn format_size(byte_size: Option<u64>) -> String {
    let Some(bytes) = byte_size else {
        return "?".to_string();
    };
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> (tempfile::TempDir, CatalogStore) {
        let tmp = tempfile::tempdir().unwrap();
        let store =
            CatalogStore::open(&tmp.path().join("catalog.redb")).unwrap();
        (tmp, store)
    }

    fn insert_key(store: &CatalogStore, item: i64, key: &str, name: &str) {
        let entry = CatalogEntry {
            source_feed_id: 1,
            source_item_id: item,
            content_id: item,
            content_unique_id: format!("uniq-{item}"),
            display_name: name.to_string(),
            byte_size: Some(100),
            caption: String::new(),
            mime_type: None,
            search_key: key.to_string(),
            indexed_at: 1_700_000_000,
        };
        assert!(store.insert_if_absent(&entry).unwrap());
    }

    fn ranking_fixture() -> (tempfile::TempDir, CatalogStore) {
        let (tmp, store) = test_store();
        insert_key(&store, 1, "shit", "Shit.mkv");
        insert_key(&store, 2, "hit", "HIT.mkv");
        insert_key(&store, 3, "exhibit a", "Exhibit A.mkv");
        insert_key(&store, 4, "the hit list", "The Hit List.mkv");
        insert_key(&store, 5, "hit 2", "Hit 2.mkv");
        insert_key(&store, 6, "hitman", "Hitman.mkv");
        (tmp, store)
    }

    fn search(store: &CatalogStore, query: &str, limit: usize, offset: usize) -> SearchPage {
        execute_search(
            store,
            &SearchParams {
                query: query.to_string(),
                limit,
                offset,
            },
        )
        .unwrap()
    }

    #[test]
    fn score_tiers() {
        assert_eq!(score_key("hit", "hit"), SCORE_EXACT);
        assert_eq!(score_key("hit 2", "hit"), SCORE_PREFIX);
        assert_eq!(score_key("the hit list", "hit"), SCORE_WORD);
        assert_eq!(score_key("hitman", "hit"), SCORE_PARTIAL);
        assert_eq!(score_key("shit", "hit"), SCORE_PARTIAL);
        assert_eq!(score_key("exhibit a", "hit"), SCORE_PARTIAL);
    }

    #[test]
    fn score_word_at_end_of_key() {
        assert_eq!(score_key("the last hit", "hit"), SCORE_WORD);
    }

    #[test]
    fn score_phrase_query() {
        assert_eq!(score_key("money heist s1", "money heist"), SCORE_PREFIX);
        assert_eq!(
            score_key("the money heist saga", "money heist"),
            SCORE_WORD
        );
    }

    #[test]
    fn ranking_is_deterministic() {
        let (_tmp, store) = ranking_fixture();
        let page = search(&store, "hit", 10, 0);

        let names: Vec<&str> =
            page.hits.iter().map(|h| h.display_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "HIT.mkv",
                "Hit 2.mkv",
                "The Hit List.mkv",
                "Shit.mkv",
                "Hitman.mkv",
                "Exhibit A.mkv",
            ]
        );
        assert_eq!(page.total, 6);

        let scores: Vec<u32> = page.hits.iter().map(|h| h.score).collect();
        assert_eq!(scores, vec![40, 30, 20, 10, 10, 10]);
    }

    #[test]
    fn query_is_normalized_before_matching() {
        let (_tmp, store) = ranking_fixture();
        let page = search(&store, "  HIT++ ", 10, 0);
        assert_eq!(page.hits[0].display_name, "HIT.mkv");
        assert_eq!(page.hits[0].score, SCORE_EXACT);
    }

    #[test]
    fn pagination_reproduces_full_list() {
        let (_tmp, store) = ranking_fixture();
        let full = search(&store, "hit", 100, 0);

        let mut paged = Vec::new();
        let page_size = 2;
        let mut offset = 0;
        loop {
            let page = search(&store, "hit", page_size, offset);
            assert_eq!(page.total, full.total);
            if page.hits.is_empty() {
                break;
            }
            paged.extend(page.hits);
            offset += page_size;
        }

        let full_ids: Vec<i64> =
            full.hits.iter().map(|h| h.source_item_id).collect();
        let paged_ids: Vec<i64> =
            paged.iter().map(|h| h.source_item_id).collect();
        assert_eq!(full_ids, paged_ids);
        assert_eq!(count(&store, "hit").unwrap(), full.total);
    }

    #[test]
    fn ranks_are_offset_aware() {
        let (_tmp, store) = ranking_fixture();
        let page = search(&store, "hit", 2, 2);
        let ranks: Vec<usize> = page.hits.iter().map(|h| h.rank).collect();
        assert_eq!(ranks, vec![3, 4]);
    }

    #[test]
    fn offset_past_end_is_empty_with_total() {
        let (_tmp, store) = ranking_fixture();
        let page = search(&store, "hit", 10, 50);
        assert!(page.hits.is_empty());
        assert_eq!(page.total, 6);
    }

    #[test]
    fn zero_matches_is_a_valid_outcome() {
        let (_tmp, store) = ranking_fixture();
        let page = search(&store, "nonexistent", 10, 0);
        assert!(page.hits.is_empty());
        assert_eq!(page.total, 0);
        assert_eq!(count(&store, "nonexistent").unwrap(), 0);
    }

    #[test]
    fn multi_token_query_matches_in_order() {
        let (_tmp, store) = test_store();
        insert_key(&store, 1, "kgf chapter 2 tamil 1080p", "KGF.mkv");
        insert_key(&store, 2, "unrelated film", "Other.mkv");

        // "kgf tamil" is not a contiguous substring of the key; the
        // in-order containment still admits it, at partial score.
        let page = search(&store, "KGF Tamil", 10, 0);
        assert_eq!(page.total, 1);
        assert_eq!(page.hits[0].display_name, "KGF.mkv");
        assert_eq!(page.hits[0].score, SCORE_PARTIAL);
        assert_eq!(count(&store, "KGF Tamil").unwrap(), 1);
    }

    #[test]
    fn candidate_filter_requires_order() {
        let (_tmp, store) = test_store();
        insert_key(&store, 1, "kgf chapter 2 tamil", "KGF.mkv");

        assert_eq!(search(&store, "tamil kgf", 10, 0).total, 0);
    }

    #[test]
    fn contiguous_match_outranks_scattered_match() {
        let (_tmp, store) = test_store();
        insert_key(&store, 1, "money heist s1e1", "MH.mkv");
        insert_key(&store, 2, "money from the heist", "Loose.mkv");

        // Both are candidates, but only the contiguous phrase reaches an
        // upper tier.
        let page = search(&store, "money heist", 10, 0);
        assert_eq!(page.total, 2);
        assert_eq!(page.hits[0].display_name, "MH.mkv");
        assert_eq!(page.hits[0].score, SCORE_PREFIX);
        assert_eq!(page.hits[1].display_name, "Loose.mkv");
        assert_eq!(page.hits[1].score, SCORE_PARTIAL);
    }

    #[test]
    fn partials_tie_break_on_key_length_then_name() {
        let (_tmp, store) = test_store();
        insert_key(&store, 1, "abcquery", "Longer1.mkv");
        insert_key(&store, 2, "xqueryb", "B.mkv");
        insert_key(&store, 3, "xquerya", "A.mkv");

        let page = search(&store, "query", 10, 0);
        let names: Vec<&str> =
            page.hits.iter().map(|h| h.display_name.as_str()).collect();
        // Same score (partial): 7-char keys before the 8-char one, names
        // break the tie between equal-length keys.
        assert_eq!(names, vec!["A.mkv", "B.mkv", "Longer1.mkv"]);
    }

    #[test]
    fn format_size_units() {
        assert_eq!(format_size(None), "?");
        assert_eq!(format_size(Some(512)), "512 B");
        assert_eq!(format_size(Some(2048)), "2.0 KiB");
        assert_eq!(format_size(Some(1_288_490_188)), "1.2 GiB");
    }
}
