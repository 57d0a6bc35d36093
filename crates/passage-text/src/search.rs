use passage_core::{ChunkKey, ContentType};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct LexicalHit {
	pub key: ChunkKey,
	pub score: u32,
	pub text: String,
	pub content_type: ContentType,
}

/// Occurrences of `keywords` in `chunk_lower`, plus 2 when the whole query
/// phrase appears verbatim. Zero when no keyword occurs.
pub fn score_chunk(chunk_lower: &str, keywords: &[String], phrase_lower: &str) -> u32 {
	let occurrences: usize = keywords.iter().map(|k| chunk_lower.matches(k.as_str()).count()).sum();
	if occurrences == 0 {
		return 0;
	}
	let bonus = if !phrase_lower.is_empty() && chunk_lower.contains(phrase_lower) { 2 } else { 0 };
	u32::try_from(occurrences).unwrap_or(u32::MAX).saturating_add(bonus)
}

/// Score descending, then chunk ordinal, then source name.
pub fn rank(hits: &mut [LexicalHit]) {
	hits.sort_by(|a, b| {
		b.score
			.cmp(&a.score)
			.then(a.key.ordinal.cmp(&b.key.ordinal))
			.then_with(|| a.key.source.cmp(&b.key.source))
	});
}

#[cfg(test)]
mod tests {
	use super::*;

	fn kw(words: &[&str]) -> Vec<String> {
		words.iter().map(|s| s.to_string()).collect()
	}

	#[test]
	fn counts_occurrences_and_phrase_bonus() {
		let text = "claims line: call the claims line on 0345 604 6473";
		assert_eq!(score_chunk(text, &kw(&["claims", "line"]), "nothing here"), 4);
		assert_eq!(score_chunk(text, &kw(&["claims", "line"]), "claims line"), 6);
		assert_eq!(score_chunk(text, &kw(&["termite"]), "claims line"), 0);
	}

	#[test]
	fn ties_break_by_ordinal_then_source() {
		let hit = |source: &str, ordinal: usize, score: u32| LexicalHit {
			key: ChunkKey::new(source, ordinal),
			score,
			text: String::new(),
			content_type: ContentType::Text,
		};
		let mut hits = vec![hit("b.txt", 0, 3), hit("a.txt", 2, 3), hit("a.txt", 0, 3), hit("c.txt", 5, 9)];
		rank(&mut hits);
		let order: Vec<String> = hits.iter().map(|h| h.key.to_string()).collect();
		assert_eq!(order, vec!["c.txt#5", "a.txt#0", "b.txt#0", "a.txt#2"]);
	}
}
