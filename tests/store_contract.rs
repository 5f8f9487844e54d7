use std::time::Duration;

use scribble::ml::VariantTag;
use scribble::project::{ClassIndex, ClassLabels, ProjectMeta};
use scribble::store::{
    ArtifactMap, DocumentStore, LocalStore, ProjectStore, StoreError, StoredSample,
};
use tempfile::tempdir;

fn meta(name: &str) -> ProjectMeta {
    let labels = ClassLabels::new(["cat".into(), "dog".into(), "fish".into()]).unwrap();
    ProjectMeta::new(name, labels, false)
}

fn class(n: u8) -> ClassIndex {
    ClassIndex::try_from(n).unwrap()
}

fn collect(store: &dyn ProjectStore, name: &str) -> Vec<StoredSample> {
    store
        .stream_samples(name)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

fn create_and_duplicate(store: &dyn ProjectStore) {
    assert!(!store.project_exists("zoo").unwrap());
    store.create_project(&meta("zoo")).unwrap();
    assert!(store.project_exists("zoo").unwrap());
    assert!(matches!(
        store.create_project(&meta("zoo")),
        Err(StoreError::AlreadyExists(name)) if name == "zoo"
    ));
    let loaded = store.load_meta("zoo").unwrap();
    assert_eq!(loaded, meta("zoo"));
}

fn unknown_projects_are_not_found(store: &dyn ProjectStore) {
    let not_found = |result: Result<(), StoreError>| {
        assert!(
            matches!(result, Err(StoreError::NotFound(ref name)) if name == "ghost"),
            "{result:?}"
        );
    };
    not_found(store.load_meta("ghost").map(drop));
    not_found(store.load_artifacts("ghost").map(drop));
    not_found(store.save_sample("ghost", class(1), b"x").map(drop));
    not_found(store.stream_samples("ghost").map(drop));
    not_found(store.save_artifacts("ghost", &ArtifactMap::new()));
    not_found(store.save_meta(&meta("ghost")));
    not_found(store.delete_project("ghost").map(drop));
}

fn samples_are_immediately_visible(store: &dyn ProjectStore) {
    store.create_project(&meta("zoo")).unwrap();
    assert!(collect(store, "zoo").is_empty());
    assert_eq!(store.save_sample("zoo", class(2), b"first").unwrap(), 1);
    assert_eq!(collect(store, "zoo").len(), 1);
    assert_eq!(store.save_sample("zoo", class(2), b"second").unwrap(), 2);
    assert_eq!(store.save_sample("zoo", class(1), b"third").unwrap(), 1);

    let samples = collect(store, "zoo");
    let keys: Vec<(u8, u64)> = samples
        .iter()
        .map(|s| (s.class_index.get(), s.sequence))
        .collect();
    assert_eq!(keys, vec![(1, 1), (2, 1), (2, 2)]);
    assert_eq!(samples[2].blob, b"second");
    // Streams restart from the beginning.
    assert_eq!(collect(store, "zoo"), samples);
    assert_eq!(store.load_meta("zoo").unwrap().counters, [1, 2, 0]);
}

fn artifacts_round_trip_byte_identical(store: &dyn ProjectStore) {
    store.create_project(&meta("zoo")).unwrap();
    assert!(store.load_artifacts("zoo").unwrap().is_empty());
    let mut artifacts = ArtifactMap::new();
    artifacts.insert(VariantTag::Svm, vec![0, 159, 146, 150, 255, 10]);
    artifacts.insert(VariantTag::NaiveBayes, b"{\"json\":true}".to_vec());
    store.save_artifacts("zoo", &artifacts).unwrap();
    assert_eq!(store.load_artifacts("zoo").unwrap(), artifacts);

    artifacts.remove(&VariantTag::Svm);
    artifacts.insert(VariantTag::RandomForest, Vec::new());
    store.save_artifacts("zoo", &artifacts).unwrap();
    assert_eq!(store.load_artifacts("zoo").unwrap(), artifacts);
}

fn meta_updates_keep_counters(store: &dyn ProjectStore) {
    store.create_project(&meta("zoo")).unwrap();
    store.save_sample("zoo", class(3), b"a").unwrap();
    let mut updated = meta("zoo");
    updated.persistent = true;
    updated.active_variant = VariantTag::DecisionTree;
    store.save_meta(&updated).unwrap();

    let loaded = store.load_meta("zoo").unwrap();
    assert!(loaded.persistent);
    assert_eq!(loaded.active_variant, VariantTag::DecisionTree);
    assert_eq!(loaded.counters, [0, 0, 1]);
    assert_eq!(store.save_sample("zoo", class(3), b"b").unwrap(), 2);
}

fn delete_removes_everything(store: &dyn ProjectStore) {
    store.create_project(&meta("zoo")).unwrap();
    for n in 1..=3 {
        store.save_sample("zoo", class(n), b"x").unwrap();
        store.save_sample("zoo", class(n), b"y").unwrap();
    }
    let mut artifacts = ArtifactMap::new();
    artifacts.insert(VariantTag::Knn, b"model".to_vec());
    store.save_artifacts("zoo", &artifacts).unwrap();

    assert_eq!(store.delete_project("zoo").unwrap(), 6);
    assert!(!store.project_exists("zoo").unwrap());
    assert!(matches!(store.stream_samples("zoo").map(drop), Err(StoreError::NotFound(_))));

    store.create_project(&meta("zoo")).unwrap();
    assert!(collect(store, "zoo").is_empty());
    assert!(store.load_artifacts("zoo").unwrap().is_empty());
    assert_eq!(store.save_sample("zoo", class(1), b"fresh").unwrap(), 1);
}

fn projects_are_isolated(store: &dyn ProjectStore) {
    store.create_project(&meta("one")).unwrap();
    store.create_project(&meta("two")).unwrap();
    store.save_sample("one", class(1), b"x").unwrap();
    assert!(collect(store, "two").is_empty());
    assert_eq!(store.delete_project("two").unwrap(), 0);
    assert_eq!(collect(store, "one").len(), 1);
}

fn concurrent_saves_are_gap_free(store: &dyn ProjectStore) {
    store.create_project(&meta("zoo")).unwrap();
    let per_thread = 25;
    let threads = 8;
    let mut sequences: Vec<u64> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..threads)
            .map(|_| {
                scope.spawn(|| {
                    (0..per_thread)
                        .map(|_| store.save_sample("zoo", class(1), b"x").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect()
    });
    sequences.sort_unstable();
    let expected: Vec<u64> = (1..=(per_thread * threads) as u64).collect();
    assert_eq!(sequences, expected);
}

fn concurrent_creates_admit_one_winner(store: &dyn ProjectStore) {
    let outcomes: Vec<Result<(), StoreError>> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| store.create_project(&meta("zoo"))))
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().unwrap())
            .collect()
    });
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1, "{outcomes:?}");
    assert!(
        outcomes
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(StoreError::AlreadyExists(_)))),
        "{outcomes:?}"
    );
    assert_eq!(store.load_meta("zoo").unwrap(), meta("zoo"));
}

type Case = fn(&dyn ProjectStore);

const CASES: [(&str, Case); 9] = [
    ("create_and_duplicate", create_and_duplicate),
    ("unknown_projects_are_not_found", unknown_projects_are_not_found),
    ("samples_are_immediately_visible", samples_are_immediately_visible),
    ("artifacts_round_trip_byte_identical", artifacts_round_trip_byte_identical),
    ("meta_updates_keep_counters", meta_updates_keep_counters),
    ("delete_removes_everything", delete_removes_everything),
    ("projects_are_isolated", projects_are_isolated),
    ("concurrent_saves_are_gap_free", concurrent_saves_are_gap_free),
    ("concurrent_creates_admit_one_winner", concurrent_creates_admit_one_winner),
];

#[test]
fn local_store_satisfies_contract() {
    for (name, case) in CASES {
        let dir = tempdir().unwrap();
        let store = LocalStore::open(dir.path().join("projects")).unwrap();
        eprintln!("local: {name}");
        case(&store);
    }
}

#[test]
fn in_memory_document_store_satisfies_contract() {
    for (name, case) in CASES {
        let store = DocumentStore::open_in_memory(Duration::from_secs(5)).unwrap();
        eprintln!("document (memory): {name}");
        case(&store);
    }
}

#[test]
fn file_document_store_satisfies_contract() {
    for (name, case) in CASES {
        let dir = tempdir().unwrap();
        let store = DocumentStore::open(dir.path().join("projects.db"), Duration::from_secs(5))
            .unwrap();
        eprintln!("document (file): {name}");
        case(&store);
    }
}

#[test]
fn local_store_rejects_path_like_names() {
    let dir = tempdir().unwrap();
    let store = LocalStore::open(dir.path()).unwrap();
    assert!(matches!(
        store.create_project(&meta("../escape")),
        Err(StoreError::InvalidName(_))
    ));
}
