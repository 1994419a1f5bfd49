use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use campus_index::config::Config;
use campus_index::embedding::HashProvider;
use campus_index::extract::{DefaultExtractor, ExtractError, FileType, TextExtractor};
use campus_index::{Engine, Error, IngestRequest, PartitionKind, Scope, SearchMode, Uploader};
use campus_index_core::embedding::{EmbedError, EmbeddingProvider};
use campus_index_core::rank::Score;
use tempfile::TempDir;
use walkdir::WalkDir;

/// Extractor that ignores the file and returns fixed text.
struct FixedExtractor(&'static str);

impl TextExtractor for FixedExtractor {
    fn extract(&self, _path: &Path, _file_type: FileType) -> Result<String, ExtractError> {
        Ok(self.0.to_string())
    }
}

/// Provider that drops the last vector of every batch.
struct ShortProvider(HashProvider);

#[async_trait]
impl EmbeddingProvider for ShortProvider {
    fn model_name(&self) -> &str {
        "short"
    }

    fn dims(&self) -> usize {
        self.0.dims()
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors = self.0.embed(texts).await?;
        vectors.pop();
        Ok(vectors)
    }
}

fn test_config(tmp: &TempDir) -> Config {
    let mut config = Config::for_root(tmp.path().join("storage"));
    config.chunking.min_passage_chars = 10;
    config
}

fn engine_with(tmp: &TempDir, extractor: Arc<dyn TextExtractor>) -> Engine {
    Engine::new(test_config(tmp), Arc::new(HashProvider::new(64)), extractor)
}

fn engine(tmp: &TempDir) -> Engine {
    engine_with(tmp, Arc::new(DefaultExtractor))
}

fn write_upload(tmp: &TempDir, name: &str, text: &str) -> PathBuf {
    let dir = tmp.path().join("uploads");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path
}

async fn ingest_text(engine: &Engine, tmp: &TempDir, name: &str, text: &str, scope: Scope) -> String {
    let path = write_upload(tmp, name, text);
    let request = IngestRequest::new(path, scope, Uploader::new("u1", "faculty"));
    engine.ingest(request).await.unwrap().document_id
}

/// Every file under `root` with its contents.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| (e.path().to_path_buf(), std::fs::read(e.path()).unwrap()))
        .collect()
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_short_event_text_is_one_passage() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);
    let text = "Event A happens Monday. Event B happens Tuesday.";

    let path = write_upload(&tmp, "week.txt", &format!("  {}\n", text));
    let record = engine
        .ingest(IngestRequest::new(path, Scope::CollegeEvent, Uploader::new("u1", "admin")))
        .await
        .unwrap();
    assert_eq!(record.chunk_count, 1);
    assert_eq!(record.storage_type, PartitionKind::CollegeEvent);
    assert_eq!(record.event_type.as_deref(), Some("general"));
    assert_eq!(record.partition, "college-events");

    let results = engine
        .query("Event Monday", &Scope::CollegeEvent, SearchMode::All, 5)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, text);
    assert_eq!(results[0].chunk_index, 0);
    assert!(matches!(results[0].score, Score::Distance(_)));
}

#[tokio::test]
async fn test_subject_mode_only_sees_subject_documents() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);

    let general = ingest_text(
        &engine,
        &tmp,
        "handbook.txt",
        "The Computer Science handbook lists lab hours. Sorting is covered in week one.",
        Scope::department("Computer Science"),
    )
    .await;
    let subject = ingest_text(
        &engine,
        &tmp,
        "sorting.txt",
        "Merge sort and quick sort are sorting algorithms. Sorting is covered in week one.",
        Scope::subject("Computer Science", "Algorithms"),
    )
    .await;

    let results = engine
        .query(
            "sorting algorithms",
            &Scope::subject("Computer Science", "Algorithms"),
            SearchMode::Subject,
            10,
        )
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.document_id == subject));
    assert_eq!(results[0].subject.as_deref(), Some("Algorithms"));
    assert_eq!(results[0].storage_type, PartitionKind::Subject);

    let general_only = engine
        .query(
            "sorting algorithms",
            &Scope::department("Computer Science"),
            SearchMode::General,
            10,
        )
        .await
        .unwrap();
    assert!(general_only.iter().all(|r| r.document_id == general));

    let everything = engine
        .query(
            "sorting algorithms",
            &Scope::department("Computer Science"),
            SearchMode::All,
            10,
        )
        .await
        .unwrap();
    assert!(everything.iter().any(|r| r.document_id == general));
    assert!(everything.iter().any(|r| r.document_id == subject));
}

#[tokio::test]
async fn test_empty_extraction_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let engine = engine_with(&tmp, Arc::new(FixedExtractor("")));
    let path = write_upload(&tmp, "blank.txt", "ignored");

    let err = engine
        .ingest(IngestRequest::new(
            path,
            Scope::department("Physics"),
            Uploader::new("u1", "faculty"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::EmptyContent { .. }), "got {:?}", err);

    let partition_dir = tmp.path().join("storage/Physics");
    assert!(files_in(&partition_dir).is_empty());
    assert!(engine.list_all_documents().unwrap().is_empty());
    assert!(engine
        .list_documents(&Scope::department("Physics"))
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_embedding_mismatch_rolls_back_upload() {
    let tmp = TempDir::new().unwrap();
    let engine = Engine::new(
        test_config(&tmp),
        Arc::new(ShortProvider(HashProvider::new(16))),
        Arc::new(DefaultExtractor),
    );
    let path = write_upload(&tmp, "notes.txt", "Optics lecture notes for the first week.");

    let err = engine
        .ingest(IngestRequest::new(
            path,
            Scope::department("Physics"),
            Uploader::new("u1", "faculty"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Embedding(EmbedError::CountMismatch { .. })), "got {:?}", err);
    assert!(files_in(&tmp.path().join("storage/Physics")).is_empty());
}

#[tokio::test]
async fn test_unsupported_format_writes_nothing() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);
    let path = write_upload(&tmp, "slides.pptx", "binary");

    let err = engine
        .ingest(IngestRequest::new(
            path,
            Scope::department("Physics"),
            Uploader::new("u1", "faculty"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedFormat(ref ext) if ext == "pptx"));
    assert!(!tmp.path().join("storage/Physics").exists());
}

#[tokio::test]
async fn test_top_k_larger_than_passage_count() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp);
    config.chunking.chunk_size = 60;
    config.chunking.overlap = 0;
    let engine = Engine::new(config, Arc::new(HashProvider::new(64)), Arc::new(DefaultExtractor));

    let text = "The campus library opens at eight. The campus gym opens at six. \
                The campus cafe opens at seven. The campus lab opens at nine.";
    let path = write_upload(&tmp, "hours.txt", text);
    let record = engine
        .ingest(IngestRequest::new(
            path,
            Scope::department("Facilities"),
            Uploader::new("u1", "staff"),
        ))
        .await
        .unwrap();
    assert!(record.chunk_count > 1);

    let results = engine
        .query("campus opens", &Scope::department("Facilities"), SearchMode::All, 100)
        .await
        .unwrap();
    assert_eq!(results.len(), record.chunk_count);

    let indices: Vec<usize> = {
        let mut v: Vec<usize> = results.iter().map(|r| r.chunk_index).collect();
        v.sort();
        v
    };
    assert_eq!(indices, (0..record.chunk_count).collect::<Vec<_>>());
    assert!(results
        .windows(2)
        .all(|w| w[0].score.value() <= w[1].score.value()));
}

#[tokio::test]
async fn test_query_empty_partition_returns_nothing() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);
    engine.init().unwrap();

    let results = engine
        .query("anything", &Scope::department("History"), SearchMode::All, 5)
        .await
        .unwrap();
    assert!(results.is_empty());
    assert!(!tmp.path().join("storage/History").exists());

    let results = engine
        .query("   ", &Scope::CollegeEvent, SearchMode::All, 5)
        .await
        .unwrap();
    assert!(results.is_empty());
}

#[tokio::test]
async fn test_delete_unknown_id_touches_nothing() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);
    ingest_text(
        &engine,
        &tmp,
        "syllabus.txt",
        "Thermodynamics syllabus for the spring term.",
        Scope::department("Physics"),
    )
    .await;

    let root = tmp.path().join("storage");
    let before = snapshot(&root);
    let scope = Scope::department("Physics");
    assert!(!engine
        .delete("6f1c1c8e-8a43-4a8e-9a8e-2d7c5b0f4e11", &scope)
        .await
        .unwrap());
    assert!(!engine.delete("../../etc", &scope).await.unwrap());
    assert_eq!(snapshot(&root), before);
}

#[tokio::test]
async fn test_delete_then_query() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);
    let scope = Scope::subject("Physics", "Optics");
    let id = ingest_text(
        &engine,
        &tmp,
        "lenses.txt",
        "Thin lenses bend light toward a focal point.",
        scope.clone(),
    )
    .await;

    // Deleting through the department scope still reaches the subject partition.
    assert!(engine
        .delete(&id, &Scope::department("Physics"))
        .await
        .unwrap());

    let partition_dir = tmp.path().join("storage/Physics/Optics");
    assert_eq!(files_in(&partition_dir), vec!["catalog.jsonl"]);
    assert!(engine.list_documents(&scope).unwrap().is_empty());
    assert!(engine.list_all_documents().unwrap().is_empty());

    let results = engine
        .query("lenses focal point", &scope, SearchMode::Subject, 5)
        .await
        .unwrap();
    assert!(results.is_empty());
    assert!(!engine.delete(&id, &scope).await.unwrap());
}

#[tokio::test]
async fn test_department_events_rank_by_similarity() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);
    let scope = Scope::department_event("Civil Engineering");

    let path = write_upload(
        &tmp,
        "bridge.txt",
        "Bridge design seminar for civil students. The seminar covers bridge loads.",
    );
    let bridge = engine
        .ingest(
            IngestRequest::new(path, scope.clone(), Uploader::new("u1", "hod"))
                .with_event_type("seminar"),
        )
        .await
        .unwrap();
    assert_eq!(bridge.partition, "department-events/civil_engineering");

    ingest_text(
        &engine,
        &tmp,
        "sports.txt",
        "Annual sports day with football and cricket matches on the main field.",
        scope.clone(),
    )
    .await;

    let results = engine
        .query("bridge seminar", &scope, SearchMode::All, 5)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert_eq!(results[0].document_id, bridge.document_id);
    assert!(results.iter().all(|r| matches!(r.score, Score::Similarity(_))));
    assert!(results
        .windows(2)
        .all(|w| w[0].score.value() >= w[1].score.value()));

    let grouped = engine
        .list_events(PartitionKind::DepartmentEvent, Some("Civil Engineering"))
        .unwrap();
    assert_eq!(grouped.keys().collect::<Vec<_>>(), vec!["department", "seminar"]);
    assert_eq!(grouped["seminar"][0].document_id, bridge.document_id);

    let everywhere = engine
        .list_events(PartitionKind::DepartmentEvent, None)
        .unwrap();
    assert_eq!(everywhere.values().map(Vec::len).sum::<usize>(), 2);
}

#[tokio::test]
async fn test_corrupt_document_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);
    let scope = Scope::department("Chemistry");

    let path = write_upload(&tmp, "acids.txt", "Acids donate protons in solution.");
    let broken = engine
        .ingest(IngestRequest::new(path, scope.clone(), Uploader::new("u1", "faculty")))
        .await
        .unwrap();
    let healthy = ingest_text(
        &engine,
        &tmp,
        "bases.txt",
        "Bases accept protons in solution.",
        scope.clone(),
    )
    .await;

    std::fs::write(&broken.artifacts.index, b"not an index").unwrap();

    let results = engine
        .query("protons in solution", &scope, SearchMode::All, 5)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.document_id == healthy));
}

#[tokio::test]
async fn test_index_with_nan_rows_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);
    let scope = Scope::department("Chemistry");

    let path = write_upload(&tmp, "salts.txt", "Salts form when acids meet bases.");
    let broken = engine
        .ingest(IngestRequest::new(path, scope.clone(), Uploader::new("u1", "faculty")))
        .await
        .unwrap();
    let healthy = ingest_text(
        &engine,
        &tmp,
        "buffers.txt",
        "Buffers resist changes when acids meet bases.",
        scope.clone(),
    )
    .await;

    // Header is 17 bytes; poison the first component of every row.
    let mut bytes = std::fs::read(&broken.artifacts.index).unwrap();
    let row_bytes = broken.embedding_dimension * 4;
    for row in 0..broken.chunk_count {
        let at = 17 + row * row_bytes;
        bytes[at..at + 4].copy_from_slice(&f32::NAN.to_le_bytes());
    }
    std::fs::write(&broken.artifacts.index, &bytes).unwrap();

    let results = engine
        .query("acids meet bases", &scope, SearchMode::All, 5)
        .await
        .unwrap();
    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.document_id == healthy));
}

const TWO_TOPICS: &str = "Tuition fees are due in March. Parking permits cost forty dollars.";

fn two_passage_engine(tmp: &TempDir, tune: impl FnOnce(&mut Config)) -> Engine {
    let mut config = test_config(tmp);
    config.chunking.chunk_size = 60;
    config.chunking.overlap = 0;
    tune(&mut config);
    Engine::new(config, Arc::new(HashProvider::new(64)), Arc::new(DefaultExtractor))
}

#[tokio::test]
async fn test_max_distance_drops_far_passages() {
    let scope = Scope::department("Finance");

    let tmp = TempDir::new().unwrap();
    let loose = two_passage_engine(&tmp, |c| c.retrieval.max_distance = 4.0);
    ingest_text(&loose, &tmp, "notice.txt", TWO_TOPICS, scope.clone()).await;
    let results = loose
        .query("Tuition fees are due in March", &scope, SearchMode::All, 10)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);

    let tmp = TempDir::new().unwrap();
    let tight = two_passage_engine(&tmp, |c| c.retrieval.max_distance = 0.5);
    ingest_text(&tight, &tmp, "notice.txt", TWO_TOPICS, scope.clone()).await;
    let results = tight
        .query("Tuition fees are due in March", &scope, SearchMode::All, 10)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "Tuition fees are due in March");
    assert!(results[0].score.value() <= 0.5);
}

#[tokio::test]
async fn test_min_similarity_drops_weak_event_passages() {
    let scope = Scope::department_event("Finance");

    let tmp = TempDir::new().unwrap();
    let loose = two_passage_engine(&tmp, |c| c.retrieval.min_similarity = -1.0);
    ingest_text(&loose, &tmp, "notice.txt", TWO_TOPICS, scope.clone()).await;
    let results = loose
        .query("Parking permits cost forty dollars", &scope, SearchMode::All, 10)
        .await
        .unwrap();
    assert_eq!(results.len(), 2);

    let tmp = TempDir::new().unwrap();
    let tight = two_passage_engine(&tmp, |c| c.retrieval.min_similarity = 0.5);
    ingest_text(&tight, &tmp, "notice.txt", TWO_TOPICS, scope.clone()).await;
    let results = tight
        .query("Parking permits cost forty dollars", &scope, SearchMode::All, 10)
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, "Parking permits cost forty dollars.");
    assert!(matches!(results[0].score, Score::Similarity(s) if s >= 0.5));
}

#[tokio::test]
async fn test_listings() {
    let tmp = TempDir::new().unwrap();
    let engine = engine(&tmp);

    ingest_text(
        &engine,
        &tmp,
        "a.txt",
        "Graph traversal with breadth first search.",
        Scope::subject("Computer Science", "Algorithms"),
    )
    .await;
    ingest_text(
        &engine,
        &tmp,
        "b.txt",
        "Dynamic programming solves overlapping subproblems.",
        Scope::subject("Computer Science", "Algorithms"),
    )
    .await;
    ingest_text(
        &engine,
        &tmp,
        "c.txt",
        "Linked lists and hash tables store records.",
        Scope::subject("Computer Science", "Data Structures"),
    )
    .await;
    let newest = ingest_text(
        &engine,
        &tmp,
        "d.txt",
        "Department meeting minutes for the autumn term.",
        Scope::department("Computer Science"),
    )
    .await;

    let subjects = engine.list_subjects("Computer Science").unwrap();
    let counts: Vec<(&str, usize)> = subjects
        .iter()
        .map(|s| (s.subject.as_str(), s.document_count))
        .collect();
    assert_eq!(counts, vec![("Algorithms", 2), ("Data Structures", 1)]);

    let all = engine.list_all_documents().unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[0].document_id, newest);

    let dept = engine
        .list_documents(&Scope::department("Computer Science"))
        .unwrap();
    assert_eq!(dept.len(), 1);

    let retrieved = engine
        .retrieve_context(
            "overlapping subproblems",
            &Scope::department("Computer Science"),
            SearchMode::All,
        )
        .await
        .unwrap();
    assert!(retrieved.context.contains("Dynamic programming"));
    assert!(!retrieved.sources.is_empty());
}
