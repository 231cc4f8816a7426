//! Extraction of `<lattice_update>` blocks from model replies.
//!
//! The legacy tag name `<index_update>` is accepted as an alias on input;
//! only `<lattice_update>` is ever emitted in prompts.

use crate::proposal::model::Proposal;
use tracing::warn;

const OPEN_TAGS: &[&str] = &["lattice_update", "index_update"];

struct Block {
    body: String,
}

/// Find every well-formed `<lattice_update>...</lattice_update>` (or legacy
/// `<index_update>`) span in `text`, case-insensitively and non-greedily.
fn find_blocks(text: &str) -> Vec<Block> {
    // ASCII-only folding: OPEN_TAGS are fixed ASCII, and to_lowercase() can
    // change a character's UTF-8 byte length (e.g. U+212A), which would
    // desync these offsets from text's own byte boundaries.
    let lower = text.to_ascii_lowercase();
    let mut blocks = Vec::new();
    let mut cursor = 0usize;

    while cursor < lower.len() {
        let mut best: Option<(usize, usize, &str)> = None;
        for tag in OPEN_TAGS {
            let open_tag = format!("<{tag}>");
            if let Some(rel) = lower[cursor..].find(&open_tag) {
                let start = cursor + rel;
                if best.is_none_or(|(s, _, _)| start < s) {
                    best = Some((start, open_tag.len(), tag));
                }
            }
        }
        let Some((start, open_len, tag)) = best else {
            break;
        };
        let close_tag = format!("</{tag}>");
        let body_start = start + open_len;
        let Some(rel_close) = lower[body_start..].find(&close_tag) else {
            // Unterminated block; nothing further to extract from this tag.
            cursor = body_start;
            continue;
        };
        let body_end = body_start + rel_close;
        blocks.push(Block {
            body: text[body_start..body_end].to_string(),
        });
        cursor = body_end + close_tag.len();
    }
    blocks
}

/// Parse every extracted block as a [`Proposal`], skipping malformed ones
/// with a warning. Malformed blocks never abort extraction of the rest.
#[must_use]
pub fn parse_all_proposals(text: &str) -> Vec<Proposal> {
    find_blocks(text)
        .into_iter()
        .filter_map(|block| match serde_json::from_str::<Proposal>(block.body.trim()) {
            Ok(p) => Some(p),
            Err(e) => {
                warn!(error = %e, "skipping malformed lattice_update block");
                None
            }
        })
        .collect()
}

/// Parse the first well-formed proposal in `text`, or `None` if there is no
/// block, or every block is malformed.
#[must_use]
pub fn parse_first_proposal(text: &str) -> Option<Proposal> {
    parse_all_proposals(text).into_iter().next()
}

/// Remove every `<lattice_update>`/`<index_update>` span (tags and body)
/// from `text`, returning the visible prose.
#[must_use]
pub fn strip_proposal_blocks(text: &str) -> String {
    let lower = text.to_ascii_lowercase();
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0usize;

    loop {
        let mut best: Option<(usize, usize, String)> = None;
        for tag in OPEN_TAGS {
            let open_tag = format!("<{tag}>");
            if let Some(rel) = lower[cursor..].find(&open_tag) {
                let start = cursor + rel;
                if best.as_ref().is_none_or(|(s, _, _)| start < *s) {
                    best = Some((start, open_tag.len(), (*tag).to_string()));
                }
            }
        }
        let Some((start, open_len, tag)) = best else {
            out.push_str(&text[cursor..]);
            break;
        };
        out.push_str(&text[cursor..start]);
        let close_tag = format!("</{tag}>");
        let body_start = start + open_len;
        match lower[body_start..].find(&close_tag) {
            Some(rel_close) => {
                cursor = body_start + rel_close + close_tag.len();
            }
            None => {
                // Unterminated tag: drop the rest of the text with it.
                cursor = text.len();
                break;
            }
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_well_formed_block() {
        let text = r#"Hello! <lattice_update>{"reinforce":["n1"]}</lattice_update>"#;
        let p = parse_first_proposal(text).unwrap();
        assert_eq!(p.reinforce, vec!["n1".to_string()]);
    }

    #[test]
    fn accepts_legacy_index_update_alias() {
        let text = r#"<index_update>{"reinforce":["n1"]}</index_update>"#;
        let p = parse_first_proposal(text).unwrap();
        assert_eq!(p.reinforce, vec!["n1".to_string()]);
    }

    #[test]
    fn case_insensitive_delimiters() {
        let text = r#"<LATTICE_UPDATE>{"reinforce":["n1"]}</LATTICE_UPDATE>"#;
        assert!(parse_first_proposal(text).is_some());
    }

    #[test]
    fn malformed_block_skipped_without_aborting_others() {
        let text = r#"<lattice_update>{ invalid json </lattice_update> then
            <lattice_update>{"reinforce":["n2"]}</lattice_update>"#;
        let all = parse_all_proposals(text);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].reinforce, vec!["n2".to_string()]);
    }

    #[test]
    fn no_blocks_returns_empty() {
        assert!(parse_all_proposals("just prose, no tags").is_empty());
        assert!(parse_first_proposal("just prose, no tags").is_none());
    }

    #[test]
    fn strip_removes_tags_and_body_leaving_prose() {
        let text = r#"Ok. <lattice_update>{"reinforce":["n1"]}</lattice_update>"#;
        assert_eq!(strip_proposal_blocks(text), "Ok.");
    }

    #[test]
    fn strip_leaves_prose_untouched_when_no_blocks() {
        assert_eq!(strip_proposal_blocks("Hello!"), "Hello!");
    }

    #[test]
    fn non_ascii_prose_does_not_desync_offsets() {
        // U+212A KELVIN SIGN lowercases to ASCII 'k', shrinking by 2 bytes;
        // a byte-length-changing fold here would panic or corrupt the body.
        let text = "Temp is 300\u{212A} today. <lattice_update>{\"reinforce\":[\"n1\"]}</lattice_update>";
        let p = parse_first_proposal(text).unwrap();
        assert_eq!(p.reinforce, vec!["n1".to_string()]);
        assert_eq!(strip_proposal_blocks(text), "Temp is 300\u{212A} today.");
    }

    #[test]
    fn non_greedy_stops_at_first_close_tag() {
        let text = r#"<lattice_update>{"reinforce":["a"]}</lattice_update>garbage</lattice_update>"#;
        let blocks = find_blocks(text);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].body, r#"{"reinforce":["a"]}"#);
    }
}
