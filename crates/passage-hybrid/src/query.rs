//! Query classification and semantic query expansion.

use passage_core::QueryType;

const CLAIMS_TERMS: &[&str] = &["claim", "claims", "claiming", "claimed"];

const CONTACT_TERMS: &[&str] = &["contact", "phone", "call", "number", "reach", "telephone", "helpline", "ring", "email"];

const COVERAGE_TERMS: &[&str] = &[
    "cover", "covered", "covers", "coverage", "insured", "exclusion", "exclusions", "excluded", "exclude",
    "termite", "termites", "pest", "pests", "insect", "insects", "vermin", "woodworm", "beetle", "infestation",
];

const PEST_TERMS: &[&str] = &["termite", "termites", "pest", "pests", "insect", "insects", "vermin", "woodworm", "beetle"];

fn words(query: &str) -> Vec<String> {
    query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn mentions(words: &[String], terms: &[&str]) -> bool {
    words.iter().any(|w| terms.contains(&w.as_str()))
}

/// Keyword-set classification; claims wins over contact, contact over coverage.
pub fn classify(query: &str) -> QueryType {
    let words = words(query);
    if mentions(&words, CLAIMS_TERMS) {
        QueryType::Claims
    } else if mentions(&words, CONTACT_TERMS) {
        QueryType::Contact
    } else if mentions(&words, COVERAGE_TERMS) {
        QueryType::Coverage
    } else {
        QueryType::Generic
    }
}

/// Query text used for the semantic search: the query plus related terms for its type.
pub fn expand_query(query: &str, query_type: QueryType) -> String {
    let extra = match query_type {
        QueryType::Generic => return query.to_string(),
        QueryType::Claims => "claim process claim procedure how to register a claim contact",
        QueryType::Contact => "customer service phone number contact helpline call",
        QueryType::Coverage if mentions(&words(query), PEST_TERMS) => {
            "termite damage insect damage pest control vermin woodworm infestation exclusions"
        }
        QueryType::Coverage => "insurance coverage policy terms conditions what is covered exclusions",
    };
    format!("{query} {extra}")
}
