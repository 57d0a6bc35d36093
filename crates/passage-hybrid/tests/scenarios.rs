use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use passage_core::{ChunkKey, Embedder, Error, QueryType, Result, Settings};
use passage_embed::FakeEmbedder;
use passage_hybrid::{PassageEngine, RetrievalOutcome, RetrievalResult};

const DIM: usize = 384;

/// Embedding backend that is always down.
struct OfflineEmbedder;

impl Embedder for OfflineEmbedder {
    fn dim(&self) -> usize {
        DIM
    }
    fn model_id(&self) -> &str {
        "offline"
    }
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Error::Embedding("model server unreachable".into()))
    }
}

/// Every text maps to the same point, so all distances tie.
struct ConstantEmbedder;

impl Embedder for ConstantEmbedder {
    fn dim(&self) -> usize {
        DIM
    }
    fn model_id(&self) -> &str {
        "constant"
    }
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0 / (DIM as f32).sqrt(); DIM])
    }
}

/// Fails on any text mentioning "poison", otherwise defers to the fake embedder.
struct PickyEmbedder(FakeEmbedder);

impl Embedder for PickyEmbedder {
    fn dim(&self) -> usize {
        DIM
    }
    fn model_id(&self) -> &str {
        "picky"
    }
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.to_lowercase().contains("poison") {
            return Err(Error::Embedding("tokenizer rejected input".into()));
        }
        self.0.embed(text)
    }
}

struct Workspace {
    _tmp: tempfile::TempDir,
    root: PathBuf,
}

impl Workspace {
    fn new() -> anyhow::Result<Self> {
        let tmp = tempfile::tempdir()?;
        let root = tmp.path().to_path_buf();
        fs::create_dir_all(root.join("corpus"))?;
        Ok(Self { _tmp: tmp, root })
    }

    fn write(&self, name: &str, content: &str) -> anyhow::Result<()> {
        let path = self.root.join("corpus").join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    fn remove(&self, name: &str) -> anyhow::Result<()> {
        fs::remove_file(self.root.join("corpus").join(name))?;
        Ok(())
    }

    fn data(&self) -> PathBuf {
        self.root.join("data")
    }

    fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        settings.paths.corpus_dir = self.root.join("corpus").display().to_string();
        settings.paths.data_dir = self.data().display().to_string();
        settings
    }

    fn open(&self, embedder: Arc<dyn Embedder>) -> anyhow::Result<PassageEngine> {
        Ok(PassageEngine::open(self.settings(), &self.root, embedder)?)
    }
}

fn fake() -> Arc<dyn Embedder> {
    Arc::new(FakeEmbedder::new(DIM))
}

fn found(outcome: RetrievalOutcome) -> RetrievalResult {
    match outcome {
        RetrievalOutcome::Found(result) => result,
        other => panic!("expected passages, got {other:?}"),
    }
}

fn current_index_file(data: &Path) -> anyhow::Result<PathBuf> {
    let generation = fs::read_to_string(data.join("vectors").join("CURRENT"))?;
    Ok(data.join("vectors").join(generation.trim()).join("index.bin"))
}

#[test]
fn contact_lookup_works_without_any_vectors() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    ws.write("contacts.txt", "For help, contact customer support on 0345 604 6473. Lines are open weekdays.")?;
    ws.write("hours.txt", "Our office opens at nine and closes at five.")?;
    let engine = ws.open(Arc::new(OfflineEmbedder))?;

    let delta = engine.sync()?;
    assert_eq!(delta.added, vec!["contacts.txt", "hours.txt"]);
    assert_eq!(delta.degraded.len(), 2, "every chunk failed to embed");
    assert_eq!(engine.status().vector_records, 0);

    let result = found(engine.search("How do I contact support?", None)?);
    assert_eq!(result.query_type, QueryType::Contact);
    assert_eq!(result.strategy, "lexical");
    assert_eq!(result.contacts, vec!["0345 604 6473"]);
    assert!(result.passages[0].text.contains("0345 604 6473"));
    Ok(())
}

#[test]
fn empty_corpus_has_no_information() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    let engine = ws.open(fake())?;
    let delta = engine.sync()?;
    assert!(delta.is_noop());

    let outcome = engine.search("what does my policy cover?", None)?;
    assert!(matches!(outcome, RetrievalOutcome::NoInformation { query_type: QueryType::Coverage, .. }));
    assert!(outcome.found().is_none());
    Ok(())
}

#[test]
fn updated_document_serves_only_new_content() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    ws.write("policy.txt", "The excess is 100 pounds per incident.")?;
    let engine = ws.open(fake())?;
    assert_eq!(engine.sync()?.added, vec!["policy.txt"]);

    ws.write("policy.txt", "The excess is 250 pounds per incident.")?;
    let delta = engine.sync()?;
    assert_eq!(delta.changed, vec!["policy.txt"]);
    assert!(delta.added.is_empty());

    let result = found(engine.search("excess", None)?);
    assert!(result.passages.iter().all(|p| p.text.contains("250") && !p.text.contains("100")));
    assert_eq!(engine.status().vector_records, 1);
    Ok(())
}

#[test]
fn ambiguous_semantic_ranking_lets_keywords_decide() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    ws.write("doc1.txt", "Gardening tips for planting spring bulbs.")?;
    ws.write("doc2.txt", "Flood damage to the basement is handled by the household team.")?;
    ws.write("doc3.txt", "Car renewal reminders are sent a month early.")?;
    let engine = ws.open(Arc::new(ConstantEmbedder))?;
    engine.sync()?;

    let result = found(engine.search("basement flood", None)?);
    assert_eq!(result.strategy, "lexical+semantic");
    assert_eq!(result.passages[0].key, ChunkKey::new("doc2.txt", 0));
    assert_eq!(result.passages.len(), 3, "the chunk found by both tiers appears once");
    assert!(result.passages[0].lexical_score.is_some() && result.passages[0].semantic_distance.is_some());
    Ok(())
}

#[test]
fn second_sync_changes_nothing() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    ws.write("a.txt", "Storm damage is covered.")?;
    ws.write("nested/b.md", "Keep receipts for repairs.")?;
    let engine = ws.open(fake())?;
    engine.sync()?;
    let manifest = fs::read(ws.data().join("manifest.json"))?;
    let generation = engine.status().vector_generation;

    let delta = engine.sync()?;
    assert!(delta.is_noop());
    assert_eq!(delta.unchanged, vec!["a.txt", "nested/b.md"]);
    assert_eq!(fs::read(ws.data().join("manifest.json"))?, manifest);
    assert_eq!(engine.status().vector_generation, generation);
    Ok(())
}

#[test]
fn corrupt_vectors_fall_back_to_keywords_until_rebuilt() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    ws.write("policy.txt", "The excess is 250 pounds per incident.")?;
    ws.open(fake())?.sync()?;

    fs::write(current_index_file(&ws.data())?, b"definitely not an index")?;

    let engine = ws.open(fake())?;
    let status = engine.status();
    assert!(!status.vectors_available);
    assert_eq!(status.indexed_documents, 0, "manifest reset for a full rebuild");

    let result = found(engine.search("excess", None)?);
    assert_eq!(result.strategy, "lexical");

    let delta = engine.sync()?;
    assert_eq!(delta.added, vec!["policy.txt"]);
    assert!(engine.status().vectors_available);
    assert_eq!(found(engine.search("excess", None)?).strategy, "semantic");
    Ok(())
}

#[test]
fn unembeddable_chunk_is_degraded_not_lost() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    ws.write("garden.txt", "Keep pets away from poison ivy near the fence.")?;
    ws.write("roof.txt", "Roof tiles are checked every spring.")?;
    let engine = ws.open(Arc::new(PickyEmbedder(FakeEmbedder::new(DIM))))?;

    let delta = engine.sync()?;
    assert_eq!(delta.degraded.len(), 1);
    assert_eq!(delta.degraded[0].key, ChunkKey::new("garden.txt", 0));
    assert_eq!(engine.indexed_documents(), vec!["garden.txt", "roof.txt"]);
    assert_eq!(engine.status().vector_records, 1);

    let result = found(engine.search("poison ivy", None)?);
    assert_eq!(result.sources, vec!["garden.txt"]);
    Ok(())
}

#[test]
fn missing_documents_are_reported_and_pruned_only_on_request() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    ws.write("keep.txt", "Windows are covered against breakage.")?;
    ws.write("gone.txt", "Garden sheds are covered up to 500 pounds.")?;
    ws.open(fake())?.sync()?;
    ws.remove("gone.txt")?;

    let delta = ws.open(fake())?.sync()?;
    assert_eq!(delta.missing, vec!["gone.txt"]);
    assert!(delta.pruned.is_empty());

    let mut settings = ws.settings();
    settings.indexing.prune_missing = true;
    let engine = PassageEngine::open(settings, &ws.root, fake())?;
    let delta = engine.sync()?;
    assert_eq!(delta.pruned, vec!["gone.txt"]);
    assert_eq!(engine.indexed_documents(), vec!["keep.txt"]);
    let result = found(engine.search("garden sheds", None)?);
    assert!(result.sources.iter().all(|s| s != "gone.txt"));
    Ok(())
}

#[test]
fn bad_documents_do_not_block_the_rest() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    ws.write("broken.json", "{ \"answer\": ")?;
    ws.write("fine.txt", "Accidental damage cover is optional.")?;
    let engine = ws.open(fake())?;

    let delta = engine.sync()?;
    assert_eq!(delta.failed.len(), 1);
    assert_eq!(delta.failed[0].name, "broken.json");
    assert_eq!(delta.added, vec!["fine.txt"]);
    assert_eq!(engine.indexed_documents(), vec!["fine.txt"]);
    Ok(())
}

#[test]
fn uploaded_json_is_indexed_and_searchable() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    let engine = ws.open(fake())?;
    let faq = br#"[{"question": "Is woodworm covered?", "answer": "Woodworm damage is not covered."}]"#;

    let delta = engine.index_document("uploads/faq.json", faq, "application/json")?;
    assert_eq!(delta.added, vec!["uploads/faq.json"]);
    let again = engine.index_document("uploads/faq.json", faq, "application/json")?;
    assert_eq!(again.unchanged, vec!["uploads/faq.json"]);

    let result = found(engine.search("am I covered for woodworm?", None)?);
    assert_eq!(result.query_type, QueryType::Coverage);
    assert!(result.highlights[0].contains("not covered"));

    let rejected = engine.index_document("uploads/bad.json", b"{oops", "json")?;
    assert_eq!(rejected.failed.len(), 1);
    assert!(!engine.indexed_documents().contains(&"uploads/bad.json".to_string()));
    Ok(())
}

#[test]
fn type_hint_overrides_classifier_and_budget_holds() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    for i in 0..4 {
        ws.write(&format!("steps{i}.txt"), &format!("{i}. Call the claims line and report the loss. {}", "Details follow. ".repeat(25)))?;
    }
    let engine = ws.open(fake())?;
    engine.sync()?;

    let result = found(engine.search("report the loss", Some(QueryType::Claims))?);
    assert_eq!(result.query_type, QueryType::Claims);
    assert!(!result.highlights.is_empty());
    let total: usize = result.passages.iter().map(|p| p.char_len()).sum();
    assert!(total <= engine.settings().retrieval.extended_budget_chars);
    Ok(())
}

#[test]
fn contacts_come_only_from_passages_within_budget() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    for i in 0..5 {
        let mut text = format!("Contact support desk {i} on 0345 604 647{i}. ");
        text.push_str(&"Lines are open on weekdays and the team can help with your policy. ".repeat(8));
        text.truncate(490);
        ws.write(&format!("desk{i}.txt"), &text)?;
    }
    let engine = ws.open(fake())?;
    engine.sync()?;

    let result = found(engine.search("how do I contact support", None)?);
    assert_eq!(result.query_type, QueryType::Contact);
    assert!(result.passages.len() < 5, "the extended budget cannot hold five passages");
    assert!(!result.contacts.is_empty());
    for number in &result.contacts {
        assert!(
            result.passages.iter().any(|p| p.text.contains(number.as_str())),
            "{number} is not in any returned passage"
        );
    }
    assert_eq!(result.contacts.len(), result.passages.len());
    let mut sources: Vec<String> = result.passages.iter().map(|p| p.key.source.clone()).collect();
    sources.sort();
    sources.dedup();
    assert_eq!(result.sources, sources);
    Ok(())
}

#[test]
fn searches_during_resync_see_one_version_per_document() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    let version = |marker: &str| format!("Clause {marker}: the excess for storm damage is set out here. ").repeat(20);
    for i in 0..3 {
        ws.write(&format!("policy{i}.txt"), &version("alpha"))?;
    }
    let engine = ws.open(fake())?;
    engine.sync()?;
    for i in 0..3 {
        ws.write(&format!("policy{i}.txt"), &version("omega"))?;
    }

    let syncing = AtomicBool::new(true);
    let (engine, syncing) = (&engine, &syncing);
    let delta = std::thread::scope(|s| -> anyhow::Result<_> {
        let readers: Vec<_> = (0..3)
            .map(|_| {
                s.spawn(move || -> anyhow::Result<usize> {
                    let mut searches = 0;
                    while searches == 0 || syncing.load(Ordering::Acquire) {
                        if let RetrievalOutcome::Found(result) = engine.search("storm excess", None)? {
                            let mut versions: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
                            for p in &result.passages {
                                let marker = if p.text.contains("omega") { "omega" } else { "alpha" };
                                versions.entry(p.key.source.as_str()).or_default().insert(marker);
                            }
                            assert!(versions.values().all(|v| v.len() == 1), "mixed versions: {versions:?}");
                        }
                        searches += 1;
                    }
                    Ok(searches)
                })
            })
            .collect();
        let delta = engine.sync();
        syncing.store(false, Ordering::Release);
        for reader in readers {
            reader.join().map_err(|_| anyhow::anyhow!("reader thread panicked"))??;
        }
        Ok(delta?)
    })?;

    assert_eq!(delta.changed.len(), 3);
    let result = found(engine.search("storm excess", None)?);
    assert!(result.passages.iter().all(|p| p.text.contains("omega") && !p.text.contains("alpha")));
    Ok(())
}

#[test]
fn failed_manifest_write_leaves_document_unindexed() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    ws.write("policy.txt", "The excess is 250 pounds per incident.")?;
    let engine = ws.open(fake())?;

    // A directory where the manifest belongs makes the atomic rename fail.
    let blocker = ws.data().join("manifest.json");
    fs::create_dir_all(blocker.join("held"))?;
    assert!(engine.sync().is_err());
    assert!(engine.indexed_documents().is_empty());

    fs::remove_dir_all(&blocker)?;
    let delta = engine.sync()?;
    assert_eq!(delta.added, vec!["policy.txt"]);
    assert_eq!(ws.open(fake())?.indexed_documents(), vec!["policy.txt"]);
    Ok(())
}

#[test]
fn unreadable_pdf_is_reported_not_indexed() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    ws.write("schedule.pdf", "%PDF-1.7 but nothing else")?;
    ws.write("notes.txt", "Bicycles are covered away from home.")?;
    let engine = ws.open(fake())?;

    let delta = engine.sync()?;
    assert_eq!(delta.added, vec!["notes.txt"]);
    assert_eq!(delta.failed.len(), 1);
    assert_eq!(delta.failed[0].name, "schedule.pdf");
    assert!(delta.failed[0].reason.contains("schedule.pdf"));

    let upload = engine.index_document("uploads/scan.pdf", b"not a pdf at all", "application/pdf")?;
    assert_eq!(upload.failed.len(), 1);
    assert_eq!(engine.indexed_documents(), vec!["notes.txt"]);
    Ok(())
}

#[test]
fn mismatched_embedder_is_rejected_at_open() -> anyhow::Result<()> {
    let ws = Workspace::new()?;
    let err = PassageEngine::open(ws.settings(), &ws.root, Arc::new(FakeEmbedder::new(16))).err();
    assert!(matches!(err, Some(Error::DimensionMismatch { expected: 384, actual: 16 })));
    Ok(())
}
