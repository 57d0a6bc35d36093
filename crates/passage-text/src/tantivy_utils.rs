use tantivy::tokenizer::{LowerCaser, SimpleTokenizer, StopWordFilter, TextAnalyzer, TokenStream};

pub const STOP_WORDS: &[&str] = &[
	"a","an","and","are","as","at","be","by","for","from","has","he","in","is","it","its","of","on","that","the","to","was","will","with","or","but","not","this","these","they","them","their","there","then","than","so","if","when","where","why","how","what","which","who","whom","whose","can","could","should","would","may","might","must","shall","do","does","did","have","had","having",
	"i","me","my","we","our","you","your","about","into","any","am","been","get",
];

/// Simple tokenizer + lowercasing + stop-word removal, shared by indexing and queries.
pub fn build_analyzer() -> TextAnalyzer {
	TextAnalyzer::builder(SimpleTokenizer::default())
		.filter(LowerCaser)
		.filter(StopWordFilter::remove(STOP_WORDS.iter().map(|s| s.to_string())))
		.build()
}

/// Distinct keywords of `text`, in first-occurrence order.
pub fn keywords(analyzer: &TextAnalyzer, text: &str) -> Vec<String> {
	let mut analyzer = analyzer.clone();
	let mut stream = analyzer.token_stream(text);
	let mut out: Vec<String> = Vec::new();
	while stream.advance() {
		let token = &stream.token().text;
		if !out.iter().any(|k| k == token) {
			out.push(token.clone());
		}
	}
	out
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn drops_stop_words_and_duplicates() {
		let analyzer = build_analyzer();
		assert_eq!(keywords(&analyzer, "What is the phone number for the Claims line? Claims!"), vec!["phone", "number", "claims", "line"]);
		assert!(keywords(&analyzer, "what is the").is_empty());
	}
}
