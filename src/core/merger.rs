/*!
 * Match merging and missing-span derivation
 *
 * Folds the per-partition raw match streams into a single ordered,
 * non-overlapping span list and derives the complementary missing spans.
 */

use crate::core::{MatchSpan, MissingSpan, RawMatch};

/// Merge raw matches from all partitions into ordered match spans
///
/// A block reported by more than one partition keeps its lowest local
/// offset (duplicates arise only inside the partition overlap strip).
/// Runs with consecutive block indices and block-strided local offsets
/// coalesce into one span.
pub fn merge_raw_matches(mut raw: Vec<RawMatch>, block_size: u32) -> Vec<MatchSpan> {
    raw.sort_unstable_by_key(|m| (m.block_index, m.local_offset));
    raw.dedup_by_key(|m| m.block_index);

    let mut spans: Vec<MatchSpan> = Vec::new();
    for raw_match in raw {
        if let Some(last) = spans.last_mut() {
            let stride = last.block_len() as u64 * block_size as u64;
            if raw_match.block_index == last.end_block + 1
                && raw_match.local_offset == last.local_offset + stride
            {
                last.end_block = raw_match.block_index;
                continue;
            }
        }
        spans.push(MatchSpan {
            start_block: raw_match.block_index,
            end_block: raw_match.block_index,
            local_offset: raw_match.local_offset,
        });
    }
    spans
}

/// Derive the missing spans: every block of `[0, block_count)` not covered
/// by a matched span, in ascending order
pub fn missing_spans(matched: &[MatchSpan], block_count: u32) -> Vec<MissingSpan> {
    let mut missing = Vec::new();
    let mut next = 0u32;

    for span in matched {
        if span.start_block > next {
            missing.push(MissingSpan::new(next, span.start_block - 1));
        }
        next = span.end_block + 1;
    }
    if next < block_count {
        missing.push(MissingSpan::new(next, block_count - 1));
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(block_index: u32, local_offset: u64) -> RawMatch {
        RawMatch {
            block_index,
            local_offset,
        }
    }

    #[test]
    fn test_coalesce_consecutive_runs() {
        let spans = merge_raw_matches(vec![raw(0, 0), raw(1, 4), raw(2, 8)], 4);
        assert_eq!(
            spans,
            vec![MatchSpan {
                start_block: 0,
                end_block: 2,
                local_offset: 0,
            }]
        );
    }

    #[test]
    fn test_offset_gap_breaks_run() {
        // Blocks are consecutive but the local bytes are not contiguous
        let spans = merge_raw_matches(vec![raw(0, 0), raw(1, 100)], 4);
        assert_eq!(spans.len(), 2);
        assert_eq!(spans[1].local_offset, 100);
    }

    #[test]
    fn test_duplicate_keeps_lowest_offset() {
        let spans = merge_raw_matches(vec![raw(3, 900), raw(3, 12), raw(3, 500)], 4);
        assert_eq!(
            spans,
            vec![MatchSpan {
                start_block: 3,
                end_block: 3,
                local_offset: 12,
            }]
        );
    }

    #[test]
    fn test_unordered_input_is_sorted() {
        let spans = merge_raw_matches(vec![raw(2, 8), raw(0, 0), raw(1, 4)], 4);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start_block, 0);
        assert_eq!(spans[0].end_block, 2);
    }

    #[test]
    fn test_missing_complement() {
        let matched = vec![
            MatchSpan {
                start_block: 2,
                end_block: 3,
                local_offset: 0,
            },
            MatchSpan {
                start_block: 6,
                end_block: 6,
                local_offset: 64,
            },
        ];
        let missing = missing_spans(&matched, 9);
        assert_eq!(
            missing,
            vec![
                MissingSpan::new(0, 1),
                MissingSpan::new(4, 5),
                MissingSpan::new(7, 8),
            ]
        );

        // Disjoint partition of [0, block_count)
        let matched_blocks: u32 = matched.iter().map(MatchSpan::block_len).sum();
        let missing_blocks: u32 = missing.iter().map(|s| s.block_len()).sum();
        assert_eq!(matched_blocks + missing_blocks, 9);
    }

    #[test]
    fn test_missing_everything_when_no_matches() {
        assert_eq!(missing_spans(&[], 5), vec![MissingSpan::new(0, 4)]);
        assert!(missing_spans(&[], 0).is_empty());
    }

    #[test]
    fn test_missing_nothing_when_fully_matched() {
        let matched = vec![MatchSpan {
            start_block: 0,
            end_block: 4,
            local_offset: 0,
        }];
        assert!(missing_spans(&matched, 5).is_empty());
    }
}
