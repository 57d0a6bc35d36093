//! Query-type specific extraction over retrieved passages.
//!
//! - contact: telephone-number-shaped substrings
//! - claims: step-like or procedural sentences, with a keyword context window as fallback
//! - coverage: inclusion and exclusion statements, exclusions first

use std::sync::LazyLock;

use regex::Regex;

pub const MAX_CLAIM_SENTENCES: usize = 8;
pub const CLAIMS_CONTEXT_BEFORE: usize = 300;
pub const CLAIMS_CONTEXT_AFTER: usize = 500;
pub const MAX_CLAIMS_CHARS: usize = 1500;

/// UK numbers (`0345 604 6473`, `03456046473`), international (`+44 345 604 6473`)
/// and North American (`(555) 123-4567`, `555-123-4567`) shapes.
static PHONE_NUMBER: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(
		r"\+\d{1,3}[\s-]?\d{3,4}[\s-]?\d{3}[\s-]?\d{3,4}\b|\b0\d{3}\s?\d{3}\s?\d{4}\b|\b\d{4}\s?\d{3}\s?\d{4}\b|\(\d{3}\)\s?\d{3}[\s-]\d{4}\b|\b\d{3}-\d{3}-\d{4}\b",
	)
	.ok()
});

static ORDINAL_MARKER: LazyLock<Option<Regex>> = LazyLock::new(|| {
	Regex::new(r"(?i)^\s*(?:\d+[.):]|[a-h][.)]|step\s+\d+|first(?:ly)?\b|second(?:ly)?\b|third(?:ly)?\b|then\b|next\b|finally\b|after\s+that\b)")
		.ok()
});

const IMPERATIVE_VERBS: &[&str] = &[
	"call", "contact", "report", "notify", "phone", "submit", "send", "provide", "keep", "take", "complete", "fill",
	"tell", "write", "email", "visit", "ring", "gather", "photograph", "arrange", "register", "log",
];

const PROCEDURAL_TERMS: &[&str] = &["claim", "report", "notify", "as soon as", "immediately", "within"];

const COVERAGE_TERMS: &[&str] = &["cover", "insured", "include", "protect", "pays for", "we will pay"];

const EXCLUSION_TERMS: &[&str] = &[
	"not cover", "exclude", "exclusion", "except", "does not", "do not", "will not", "won't", "isn't", "aren't",
	"not insured", "not included",
];

/// Phone numbers in order of appearance, whitespace-normalised, without duplicates.
pub fn find_phone_numbers(text: &str) -> Vec<String> {
	let mut out: Vec<String> = Vec::new();
	let Some(re) = PHONE_NUMBER.as_ref() else { return out };
	for m in re.find_iter(text) {
		let number = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
		if !out.contains(&number) {
			out.push(number);
		}
	}
	out
}

pub fn has_phone_number(text: &str) -> bool {
	PHONE_NUMBER.as_ref().is_some_and(|re| re.is_match(text))
}

/// Split on line breaks and on `.`, `!`, `?` followed by whitespace. Sentences keep
/// their terminal punctuation; blank pieces are dropped.
pub fn split_sentences(text: &str) -> Vec<&str> {
	let mut sentences = Vec::new();
	let mut start = 0;
	let mut chars = text.char_indices().peekable();
	while let Some((i, c)) = chars.next() {
		let boundary = match c {
			'\n' => Some(i),
			'.' | '!' | '?' if is_list_marker(&text[start..i]) => None,
			'.' | '!' | '?' => match chars.peek() {
				Some((_, next)) if next.is_whitespace() => Some(i + c.len_utf8()),
				None => Some(i + c.len_utf8()),
				_ => None,
			},
			_ => None,
		};
		if let Some(end) = boundary {
			let piece = text[start..end].trim();
			if !piece.is_empty() {
				sentences.push(piece);
			}
			start = if c == '\n' { i + 1 } else { end };
		}
	}
	let tail = text[start..].trim();
	if !tail.is_empty() {
		sentences.push(tail);
	}
	sentences
}

// "3" in "3. Call us" or "b" in "b. Send photos".
fn is_list_marker(piece: &str) -> bool {
	let piece = piece.trim();
	(!piece.is_empty() && piece.len() <= 3 && piece.bytes().all(|b| b.is_ascii_digit()))
		|| (piece.len() == 1 && piece.bytes().all(|b| b.is_ascii_alphabetic()))
}

/// Ordinal markers ("1.", "Step 2", "Then") or an imperative opening verb.
pub fn is_step_like(sentence: &str) -> bool {
	if ORDINAL_MARKER.as_ref().is_some_and(|re| re.is_match(sentence)) {
		return true;
	}
	let first = sentence
		.trim_start_matches(|c: char| !c.is_alphanumeric())
		.split(|c: char| !c.is_alphanumeric())
		.next()
		.unwrap_or("")
		.to_lowercase();
	IMPERATIVE_VERBS.contains(&first.as_str())
}

/// Number of step-like sentences in a passage; used to prefer procedural passages.
pub fn step_score(text: &str) -> usize {
	split_sentences(text).into_iter().filter(|s| is_step_like(s)).count()
}

fn mentions_any(sentence_lower: &str, terms: &[&str]) -> bool {
	terms.iter().any(|t| sentence_lower.contains(t))
}

/// Assemble a claims answer from passages ordered best first.
///
/// Takes up to eight sentences that are step-like or procedural. When none
/// qualify, falls back to the text around the first keyword hit in the best
/// passage. The result is capped at 1,500 characters.
pub fn extract_claims(passages: &[&str], keywords: &[String]) -> Option<String> {
	let mut picked: Vec<&str> = Vec::new();
	for passage in passages {
		for sentence in split_sentences(passage) {
			if picked.len() == MAX_CLAIM_SENTENCES {
				break;
			}
			let lower = sentence.to_lowercase();
			let relevant = is_step_like(sentence) || mentions_any(&lower, PROCEDURAL_TERMS);
			if relevant && !picked.contains(&sentence) {
				picked.push(sentence);
			}
		}
	}
	if !picked.is_empty() {
		return Some(cap_at_sentence(&picked, MAX_CLAIMS_CHARS));
	}

	let best = passages.first()?;
	let window = keyword_window(best, keywords, CLAIMS_CONTEXT_BEFORE, CLAIMS_CONTEXT_AFTER)?;
	Some(window.chars().take(MAX_CLAIMS_CHARS).collect())
}

/// `before` characters preceding and `after` characters following the first keyword hit.
pub fn keyword_window<'a>(text: &'a str, keywords: &[String], before: usize, after: usize) -> Option<&'a str> {
	let lower = text.to_lowercase();
	// Lowercasing can change byte lengths; only trust byte offsets when it did not.
	let hit_byte = keywords.iter().filter_map(|k| lower.find(k.as_str())).min()?;
	let hit_char = if lower.len() == text.len() { text[..hit_byte].chars().count() } else { lower[..hit_byte].chars().count() };

	let bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
	let char_len = bounds.len() - 1;
	let start = hit_char.saturating_sub(before).min(char_len);
	let end = (hit_char + after).min(char_len);
	Some(&text[bounds[start]..bounds[end]])
}

/// Join sentences with spaces, stopping before the one that would exceed `max_chars`.
fn cap_at_sentence(sentences: &[&str], max_chars: usize) -> String {
	let mut out = String::new();
	let mut used = 0;
	for sentence in sentences {
		let len = sentence.chars().count() + usize::from(!out.is_empty());
		if used + len > max_chars {
			if out.is_empty() {
				out = sentence.chars().take(max_chars).collect();
			}
			break;
		}
		if !out.is_empty() {
			out.push(' ');
		}
		out.push_str(sentence);
		used += len;
	}
	out
}

/// Coverage statements from the passages: exclusions first, then inclusions.
pub fn extract_coverage(passages: &[&str]) -> Vec<String> {
	let mut exclusions = Vec::new();
	let mut inclusions = Vec::new();
	for passage in passages {
		for sentence in split_sentences(passage) {
			let lower = sentence.to_lowercase();
			let target = if mentions_any(&lower, EXCLUSION_TERMS) {
				&mut exclusions
			} else if mentions_any(&lower, COVERAGE_TERMS) {
				&mut inclusions
			} else {
				continue;
			};
			if !target.iter().any(|s: &String| s == sentence) {
				target.push(sentence.to_string());
			}
		}
	}
	exclusions.extend(inclusions);
	exclusions
}

/// True if the passage states an exclusion.
pub fn mentions_exclusion(text: &str) -> bool {
	mentions_any(&text.to_lowercase(), EXCLUSION_TERMS)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn finds_phone_number_shapes() {
		let text = "Call 0345 604 6473 or +44 345 604 6473. In the US: (555) 123-4567 or 555-123-4567. Ref 2024.";
		assert_eq!(
			find_phone_numbers(text),
			vec!["0345 604 6473", "+44 345 604 6473", "(555) 123-4567", "555-123-4567"]
		);
		assert!(has_phone_number("ring 03456046473 today"));
		assert!(!has_phone_number("policy number 12345"));
	}

	#[test]
	fn duplicate_numbers_are_reported_once() {
		assert_eq!(find_phone_numbers("0345 604 6473 ... 0345\n604 6473"), vec!["0345 604 6473"]);
	}

	#[test]
	fn splits_sentences_without_breaking_decimals() {
		let s = split_sentences("Excess is £99.50 per claim. Call us!\nStep 2: send photos");
		assert_eq!(s, vec!["Excess is £99.50 per claim.", "Call us!", "Step 2: send photos"]);
	}

	#[test]
	fn recognises_step_language() {
		assert!(is_step_like("1. Call the claims line"));
		assert!(is_step_like("Step 3 send the form"));
		assert!(is_step_like("Then wait for an assessor."));
		assert!(is_step_like("Report the theft to the police."));
		assert!(!is_step_like("The policy covers storm damage."));
	}

	#[test]
	fn claims_prefers_procedural_sentences_and_caps_count() {
		let passage = (1..=12).map(|i| format!("{i}. Do thing {i}.")).collect::<Vec<_>>().join("\n");
		let out = extract_claims(&[passage.as_str()], &[]).unwrap();
		assert!(out.starts_with("1. Do thing 1."));
		assert!(out.contains("8. Do thing 8."));
		assert!(!out.contains("9. Do thing 9."));
	}

	#[test]
	fn claims_falls_back_to_keyword_window() {
		let text = format!("{}zebra{}", "x".repeat(400), "y".repeat(600));
		let out = extract_claims(&[text.as_str()], &["zebra".to_string()]).unwrap();
		assert_eq!(out.chars().count(), 300 + 500);
		assert!(out.starts_with(&"x".repeat(300)));
		assert!(out[300..].starts_with("zebra"));
	}

	#[test]
	fn claims_answer_is_capped() {
		let long = (0..40).map(|i| format!("Call team {i} {}.", "z".repeat(250))).collect::<Vec<_>>().join(" ");
		let out = extract_claims(&[long.as_str()], &[]).unwrap();
		assert!(out.chars().count() <= MAX_CLAIMS_CHARS);
		assert!(out.ends_with('.'));
	}

	#[test]
	fn coverage_lists_exclusions_first() {
		let out = extract_coverage(&["Storm damage is covered. Termite damage is not covered. Wear and tear is excluded."]);
		assert_eq!(out, vec!["Termite damage is not covered.", "Wear and tear is excluded.", "Storm damage is covered."]);
	}
}
