//! Hierarchical splitting into a chunk tree.

use crate::chunking::{LEVEL_SIZES, MAX_OVERLAP};
use crate::core::{find_char_boundary, Chunk};
use crate::parse::sections::Section;
use std::ops::Range;

/// Maps a byte offset range of the document text to a page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSpan {
    /// 1-based page number (0 for page-less sources).
    pub page: u32,
    /// Byte offset where the page starts.
    pub start: usize,
}

/// Splits document text into a three-level chunk tree.
///
/// The root carries the whole document; interior nodes carry
/// section-preferring slices; leaves carry the retrieval-unit text with
/// bounded overlap. Only leaves (level 0) are embedded.
#[derive(Debug, Clone)]
pub struct HierarchicalChunker {
    sizes: [usize; 3],
    overlap: usize,
}

impl Default for HierarchicalChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchicalChunker {
    /// Creates a chunker with the default size sequence and overlap.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sizes: LEVEL_SIZES,
            overlap: MAX_OVERLAP,
        }
    }

    /// Creates a chunker with custom sizes; overlap is clamped to the
    /// maximum and must stay below the leaf size.
    #[must_use]
    pub fn with_config(sizes: [usize; 3], overlap: usize) -> Self {
        let overlap = overlap.min(MAX_OVERLAP).min(sizes[2].saturating_sub(1));
        Self { sizes, overlap }
    }

    /// Chunks the document text into a tree, returning all nodes with the
    /// root first. Returns an empty vector for empty/whitespace text.
    #[must_use]
    pub fn chunk(
        &self,
        document: &str,
        text: &str,
        sections: &[Section],
        pages: &[PageSpan],
    ) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let section_starts: Vec<usize> = sections.iter().map(|s| s.start_offset).collect();
        let mut chunks: Vec<Chunk> = Vec::new();

        #[allow(clippy::cast_possible_truncation)]
        let root_level = self.sizes.len() as u8;
        let mut root = Chunk::new(
            document,
            page_at(pages, 0),
            text.to_string(),
            0..text.len(),
            root_level,
        );

        let child_ids =
            self.split_level(document, text, 0..text.len(), 0, &section_starts, pages, &mut chunks);
        root.children_ids = child_ids.clone();
        for id in &child_ids {
            if let Some(child) = chunks.iter_mut().find(|c| &c.id == id) {
                child.parent_id = Some(root.id.clone());
            }
        }

        let mut result = vec![root];
        result.append(&mut chunks);
        result
    }

    /// Splits `range` at size level `depth`, recursing until leaves.
    fn split_level(
        &self,
        document: &str,
        text: &str,
        range: Range<usize>,
        depth: usize,
        section_starts: &[usize],
        pages: &[PageSpan],
        out: &mut Vec<Chunk>,
    ) -> Vec<String> {
        let size = self.sizes[depth];
        let is_leaf_level = depth + 1 == self.sizes.len();
        #[allow(clippy::cast_possible_truncation)]
        let level = (self.sizes.len() - 1 - depth) as u8;
        let overlap = if is_leaf_level { self.overlap } else { 0 };

        let segments = split_ranges(text, &range, size, overlap, section_starts);
        let mut ids = Vec::with_capacity(segments.len());

        for seg in segments {
            let content = text[seg.clone()].to_string();
            if content.trim().is_empty() {
                continue;
            }
            let mut chunk = Chunk::new(document, page_at(pages, seg.start), content, seg.clone(), level);

            if !is_leaf_level {
                let child_ids =
                    self.split_level(document, text, seg, depth + 1, section_starts, pages, out);
                for id in &child_ids {
                    if let Some(child) = out.iter_mut().find(|c| &c.id == id) {
                        child.parent_id = Some(chunk.id.clone());
                    }
                }
                chunk.children_ids = child_ids;
            }

            ids.push(chunk.id.clone());
            out.push(chunk);
        }

        ids
    }
}

/// Page number covering a byte offset.
fn page_at(pages: &[PageSpan], offset: usize) -> u32 {
    pages
        .iter()
        .rev()
        .find(|p| p.start <= offset)
        .map_or(0, |p| p.page)
}

/// Splits a range into segments of roughly `size` characters, preferring
/// section starts, then paragraph breaks, newlines, sentence ends and
/// spaces, falling back to a char boundary.
fn split_ranges(
    text: &str,
    range: &Range<usize>,
    size: usize,
    overlap: usize,
    section_starts: &[usize],
) -> Vec<Range<usize>> {
    let mut segments = Vec::new();
    if range.len() <= size {
        segments.push(range.clone());
        return segments;
    }

    let mut start = range.start;
    while start < range.end {
        let target = (start + size).min(range.end);
        let end = if target >= range.end {
            range.end
        } else {
            best_boundary(text, start, target, size, section_starts)
        };
        segments.push(start..end);
        if end >= range.end {
            break;
        }
        // Step back for overlap, staying on a char boundary and making
        // forward progress
        let next = find_char_boundary(text, end.saturating_sub(overlap));
        start = if next > start { next } else { end };
    }
    segments
}

/// Best split point in `(window_start, target]`, searching back up to 20%
/// of the chunk size.
fn best_boundary(
    text: &str,
    seg_start: usize,
    target: usize,
    size: usize,
    section_starts: &[usize],
) -> usize {
    let search_start = find_char_boundary(text, target.saturating_sub(size / 5).max(seg_start + 1));
    let search_end = find_char_boundary(text, target);
    if search_start >= search_end {
        return find_char_boundary(text, target);
    }

    // A section heading starting inside the window is the strongest cut
    if let Some(&cut) = section_starts
        .iter()
        .filter(|&&s| s > search_start && s <= search_end)
        .max()
    {
        return cut;
    }

    let window = &text[search_start..search_end];
    if let Some(pos) = window.rfind("\n\n") {
        return search_start + pos + 2;
    }
    if let Some(pos) = window.rfind('\n') {
        return search_start + pos + 1;
    }
    for (i, c) in window.char_indices().rev() {
        if matches!(c, '.' | '!' | '?') {
            let after = search_start + i + c.len_utf8();
            if after >= text.len() || text[after..].starts_with([' ', '\n']) {
                return after;
            }
        }
    }
    if let Some(pos) = window.rfind(' ') {
        return search_start + pos + 1;
    }
    find_char_boundary(text, target)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_simple(text: &str) -> Vec<Chunk> {
        HierarchicalChunker::new().chunk("doc", text, &[], &[])
    }

    #[test]
    fn test_empty_text_no_chunks() {
        assert!(chunk_simple("").is_empty());
        assert!(chunk_simple("   \n\n  ").is_empty());
    }

    #[test]
    fn test_small_text_tree() {
        let chunks = chunk_simple("A short paragraph of text.");
        // root (3) -> one 1024-slice (2) -> one 512-slice (1) -> one leaf (0)
        assert_eq!(chunks.len(), 4);
        let levels: Vec<u8> = chunks.iter().map(|c| c.level).collect();
        assert!(levels.contains(&3));
        assert!(levels.contains(&0));
    }

    #[test]
    fn test_leaves_cover_text() {
        let text = "word ".repeat(600); // 3000 chars
        let chunks = chunk_simple(&text);
        let leaves: Vec<&Chunk> = chunks.iter().filter(|c| c.is_leaf()).collect();
        assert!(leaves.len() > 10);
        // Every byte of the text is inside some leaf
        let mut covered = vec![false; text.len()];
        for leaf in &leaves {
            for slot in &mut covered[leaf.byte_range.clone()] {
                *slot = true;
            }
        }
        assert!(covered.iter().all(|&c| c), "leaves must cover the document");
    }

    #[test]
    fn test_leaf_sizes_bounded() {
        let text = "lorem ipsum dolor sit amet, consectetur adipiscing elit. ".repeat(100);
        let chunks = chunk_simple(&text);
        for leaf in chunks.iter().filter(|c| c.is_leaf()) {
            // Leaves target 128 chars; boundary search gives some slack
            assert!(leaf.size() <= 192, "leaf too large: {}", leaf.size());
        }
    }

    #[test]
    fn test_parent_child_lineage() {
        let text = "sentence one. ".repeat(200);
        let chunks = chunk_simple(&text);
        let by_id: std::collections::HashMap<&str, &Chunk> =
            chunks.iter().map(|c| (c.id.as_str(), c)).collect();

        for chunk in &chunks {
            if chunk.level < 3 {
                let parent_id = chunk.parent_id.as_deref().unwrap_or_else(|| {
                    panic!("non-root chunk missing parent: level {}", chunk.level)
                });
                let parent = by_id[parent_id];
                assert_eq!(parent.level, chunk.level + 1);
                assert!(parent.children_ids.contains(&chunk.id));
            }
        }
        // Every leaf walks up to the root
        let root = chunks.iter().find(|c| c.level == 3).unwrap();
        for leaf in chunks.iter().filter(|c| c.is_leaf()) {
            let mut cursor = leaf.parent_id.as_deref();
            let mut hops = 0;
            while let Some(id) = cursor {
                if id == root.id {
                    break;
                }
                cursor = by_id[id].parent_id.as_deref();
                hops += 1;
                assert!(hops < 10, "lineage loop");
            }
            assert!(cursor.is_some(), "leaf not connected to root");
        }
    }

    #[test]
    fn test_ids_stable_across_runs() {
        let text = "stable content. ".repeat(100);
        let a = chunk_simple(&text);
        let b = chunk_simple(&text);
        let ids_a: Vec<&str> = a.iter().map(|c| c.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }

    #[test]
    fn test_section_boundary_preferred() {
        let mut text = "intro text. ".repeat(40); // ~480 chars
        let section_offset = text.len();
        text.push_str("# 2 Next Section\n");
        text.push_str(&"more body. ".repeat(40));

        let sections = vec![Section {
            level: 1,
            number: "2".to_string(),
            title: "Next Section".to_string(),
            start_offset: section_offset,
        }];
        let chunks = HierarchicalChunker::new().chunk("doc", &text, &sections, &[]);
        // Some interior chunk should start exactly at the section heading
        assert!(
            chunks
                .iter()
                .any(|c| c.byte_range.start == section_offset && !c.is_leaf()),
            "no chunk aligned with section start"
        );
    }

    #[test]
    fn test_page_attribution() {
        let text = "p1 text here. ".repeat(20) + &"p2 text here. ".repeat(20);
        let pages = vec![
            PageSpan { page: 1, start: 0 },
            PageSpan {
                page: 2,
                start: 280,
            },
        ];
        let chunks = HierarchicalChunker::new().chunk("doc", &text, &[], &pages);
        let leaves: Vec<&Chunk> = chunks.iter().filter(|c| c.is_leaf()).collect();
        assert_eq!(leaves.first().unwrap().page, 1);
        assert_eq!(leaves.last().unwrap().page, 2);
    }

    #[test]
    fn test_overlap_bounded() {
        let text = "abcdefghij ".repeat(100);
        let chunks = chunk_simple(&text);
        let mut leaves: Vec<&Chunk> = chunks.iter().filter(|c| c.is_leaf()).collect();
        leaves.sort_by_key(|c| c.byte_range.start);
        for pair in leaves.windows(2) {
            if pair[0].byte_range.end > pair[1].byte_range.start {
                let overlap = pair[0].byte_range.end - pair[1].byte_range.start;
                assert!(overlap <= MAX_OVERLAP, "overlap {overlap} too large");
            }
        }
    }

    #[test]
    fn test_with_config_clamps_overlap() {
        let chunker = HierarchicalChunker::with_config([1024, 512, 128], 500);
        assert!(chunker.overlap <= MAX_OVERLAP);
    }
}
