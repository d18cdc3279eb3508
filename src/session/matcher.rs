//! Literal substring search over the accumulated output buffer.

/// Position of a pattern occurrence in the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Found {
    /// Index into the pattern list.
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

/// Find the earliest occurrence of any pattern at or after `from`.
///
/// Ties at the same offset go to the pattern listed first.
pub(crate) fn find_earliest<P: AsRef<[u8]>>(
    haystack: &[u8],
    from: usize,
    patterns: &[P],
) -> Option<Found> {
    let from = from.min(haystack.len());
    let mut best: Option<Found> = None;

    for (index, pattern) in patterns.iter().enumerate() {
        let needle = pattern.as_ref();
        let Some(offset) = find(&haystack[from..], needle) else {
            continue;
        };
        let start = from + offset;
        if best.map_or(true, |b| start < b.start) {
            best = Some(Found {
                index,
                start,
                end: start + needle.len(),
            });
        }
    }

    best
}

/// Where the next search may resume without missing a match that straddles
/// the end of what has been searched so far.
pub(crate) fn resume_offset<P: AsRef<[u8]>>(haystack_len: usize, patterns: &[P]) -> usize {
    let longest = patterns
        .iter()
        .map(|p| p.as_ref().len())
        .max()
        .unwrap_or(1)
        .max(1);
    haystack_len.saturating_sub(longest - 1)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earliest_match_wins() {
        let found = find_earliest(b"user$ root# ", 0, &["# ", "$ "]).unwrap();
        assert_eq!(found.index, 1);
        assert_eq!((found.start, found.end), (4, 6));
    }

    #[test]
    fn test_tie_goes_to_first_pattern() {
        let found = find_earliest(b"Command (m for help):", 0, &["Command", "Comm"]).unwrap();
        assert_eq!(found.index, 0);
        assert_eq!(found.end, 7);
    }

    #[test]
    fn test_matches_across_newlines() {
        let found = find_earliest(b"Last\r\nsector", 0, &["Last\r\nsector"]).unwrap();
        assert_eq!(found.start, 0);
    }

    #[test]
    fn test_case_sensitive() {
        assert!(find_earliest(b"command", 0, &["Command"]).is_none());
    }

    #[test]
    fn test_search_from_offset() {
        assert!(find_earliest(b"$ abc", 1, &["$"]).is_none());
        assert_eq!(find_earliest(b"$ abc", 2, &["abc"]).unwrap().start, 2);
        assert!(find_earliest(b"abc", 10, &["abc"]).is_none());
    }

    #[test]
    fn test_resume_offset_keeps_overlap() {
        // "Part" seen so far; "ition" may still arrive.
        let patterns = ["Partition"];
        let resume = resume_offset(4, &patterns);
        assert_eq!(resume, 0);

        let buf = b"xxxxxxxxxxPart";
        let resume = resume_offset(buf.len(), &patterns);
        assert_eq!(resume, 6);
        let mut grown = buf.to_vec();
        grown.extend_from_slice(b"ition number");
        assert_eq!(find_earliest(&grown, resume, &patterns).unwrap().start, 10);
    }
}
