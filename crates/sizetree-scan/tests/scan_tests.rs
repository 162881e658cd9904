use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::{Semaphore, mpsc};

use sizetree_scan::{
    BoxFuture, CancellationToken, FileSearch, FileStat, FsStat, ScanConfig, ScanError, ScanEvent,
    ScanOrchestrator, ScanOutcome, ScanResult, ScanState, SearchQuery, TreeEntry, WalkSearch,
    WorkerPool,
};

/// Returns the next list on every call, repeating the last one.
struct ScriptedSearch {
    calls: AtomicUsize,
    results: Vec<ScanResult<Vec<PathBuf>>>,
}

impl ScriptedSearch {
    fn new(results: Vec<ScanResult<Vec<PathBuf>>>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            results,
        }
    }
}

impl FileSearch for ScriptedSearch {
    fn find<'a>(
        &'a self,
        _query: &'a SearchQuery,
        _token: CancellationToken,
    ) -> BoxFuture<'a, ScanResult<Vec<PathBuf>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let index = call.min(self.results.len() - 1);
        let result = match &self.results[index] {
            Ok(paths) => Ok(paths.clone()),
            Err(err) => Err(ScanError::Other {
                message: err.to_string(),
            }),
        };
        Box::pin(async move { result })
    }
}

/// Sizes from a map; each stat reports its path and then waits for a permit.
struct GatedStat {
    sizes: HashMap<PathBuf, u64>,
    gate: Arc<Semaphore>,
    started: mpsc::UnboundedSender<PathBuf>,
}

impl FileStat for GatedStat {
    fn stat<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, io::Result<u64>> {
        Box::pin(async move {
            let _ = self.started.send(path.to_path_buf());
            self.gate.acquire().await.unwrap().forget();
            self.sizes
                .get(path)
                .copied()
                .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
        })
    }
}

fn config(root: &Path, workers: usize) -> ScanConfig {
    ScanConfig::builder()
        .root(root)
        .workers(workers)
        .build()
        .unwrap()
}

fn names(orchestrator: &ScanOrchestrator) -> Vec<String> {
    orchestrator
        .files()
        .iter()
        .map(|f| f.name.to_string())
        .collect()
}

#[tokio::test]
async fn test_scan_sorts_by_size_and_drops_missing() {
    let temp = TempDir::new().unwrap();
    let a = temp.path().join("a");
    let b = temp.path().join("b");
    fs::write(&a, vec![0u8; 100]).unwrap();
    fs::write(&b, vec![0u8; 1500]).unwrap();

    let search = ScriptedSearch::new(vec![Ok(vec![
        a.clone(),
        b.clone(),
        temp.path().join("missing"),
    ])]);
    let orchestrator =
        ScanOrchestrator::new(config(temp.path(), 2), Arc::new(search), Arc::new(FsStat))
            .unwrap();

    assert_eq!(orchestrator.refresh().await, ScanOutcome::Completed { files: 2 });
    assert_eq!(orchestrator.state(), ScanState::Completed);

    let files = orchestrator.files();
    assert_eq!(files.len(), 2);
    assert_eq!((files[0].path.as_path(), files[0].size), (b.as_path(), 1500));
    assert_eq!((files[1].path.as_path(), files[1].size), (a.as_path(), 100));
    assert!(files[0].human_readable_size.starts_with("1.5"));
}

#[tokio::test]
async fn test_full_scan_of_directory_tree() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("src")).unwrap();
    fs::create_dir_all(root.join("node_modules/dep")).unwrap();
    fs::write(root.join("src/lib.rs"), vec![b'x'; 300]).unwrap();
    fs::write(root.join("src/main.rs"), vec![b'x'; 100]).unwrap();
    fs::write(root.join("notes.md"), vec![b'x'; 600]).unwrap();
    fs::write(root.join("node_modules/dep/index.js"), vec![b'x'; 5000]).unwrap();

    let config = ScanConfig::builder()
        .root(root)
        .workers(3usize)
        .exclude_patterns(vec!["**/node_modules".to_string()])
        .build()
        .unwrap();
    let orchestrator =
        ScanOrchestrator::new(config, Arc::new(WalkSearch), Arc::new(FsStat)).unwrap();

    assert_eq!(orchestrator.refresh().await, ScanOutcome::Completed { files: 3 });
    assert_eq!(names(&orchestrator), ["notes.md", "lib.rs", "main.rs"]);

    let tree = orchestrator.tree();
    let labels: Vec<&str> = tree.iter().map(TreeEntry::label).collect();
    assert_eq!(labels, [".md", ".rs"]);

    let rs = orchestrator
        .groups()
        .into_iter()
        .find(|g| g.extension == ".rs")
        .unwrap();
    assert_eq!(rs.total_size, 400);
    assert_eq!(rs.count(), 2);
    assert!((rs.percent - 40.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_new_scan_supersedes_scan_in_flight() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let gate = Arc::new(Semaphore::new(0));
    let stat = GatedStat {
        sizes: HashMap::from([(PathBuf::from("/s/old.txt"), 10), (PathBuf::from("/s/new.txt"), 20)]),
        gate: Arc::clone(&gate),
        started: started_tx,
    };
    let search = ScriptedSearch::new(vec![
        Ok(vec![PathBuf::from("/s/old.txt")]),
        Ok(vec![PathBuf::from("/s/new.txt")]),
    ]);
    let orchestrator = Arc::new(
        ScanOrchestrator::new(config(Path::new("/s"), 2), Arc::new(search), Arc::new(stat))
            .unwrap(),
    );
    let mut events = orchestrator.subscribe();

    let first = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.refresh().await }
    });
    assert_eq!(started_rx.recv().await.unwrap(), PathBuf::from("/s/old.txt"));

    let second = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.refresh().await }
    });
    assert_eq!(started_rx.recv().await.unwrap(), PathBuf::from("/s/new.txt"));

    gate.add_permits(10);
    let first = tokio::time::timeout(Duration::from_secs(5), first).await.unwrap().unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), second).await.unwrap().unwrap();

    assert_eq!(first, ScanOutcome::Cancelled);
    assert_eq!(second, ScanOutcome::Completed { files: 1 });
    assert_eq!(names(&orchestrator), ["new.txt"]);
    assert_eq!(orchestrator.state(), ScanState::Completed);

    let mut published = Vec::new();
    while let Ok(event) = events.try_recv() {
        if let ScanEvent::Published { generation, .. } = event {
            published.push(generation);
        }
    }
    assert_eq!(published, [2]);
}

/// An orchestrator over its own 2-unit pool whose stats wait on `gate`.
fn gated_orchestrator(
    root: &str,
    files: &[&str],
    gate: &Arc<Semaphore>,
) -> (ScanOrchestrator, mpsc::UnboundedReceiver<PathBuf>) {
    let (started_tx, started_rx) = mpsc::unbounded_channel();
    let paths: Vec<PathBuf> = files.iter().map(|f| Path::new(root).join(f)).collect();
    let stat = GatedStat {
        sizes: paths.iter().map(|p| (p.clone(), 10)).collect(),
        gate: Arc::clone(gate),
        started: started_tx,
    };
    let pool = WorkerPool::new(2, Arc::new(stat), 4).unwrap();
    let search = ScriptedSearch::new(vec![Ok(paths)]);
    let orchestrator =
        ScanOrchestrator::with_pool(config(Path::new(root), 2), pool, Arc::new(search));
    (orchestrator, started_rx)
}

#[tokio::test]
async fn test_cancelling_one_orchestrator_leaves_another_intact() {
    let x_gate = Arc::new(Semaphore::new(0));
    let y_gate = Arc::new(Semaphore::new(0));
    let (x, mut x_started) = gated_orchestrator("/x", &["1", "2", "3", "4"], &x_gate);
    let (y, mut y_started) = gated_orchestrator("/y", &["only"], &y_gate);
    let (x, y) = (Arc::new(x), Arc::new(y));

    let x_run = tokio::spawn({
        let x = Arc::clone(&x);
        async move { x.refresh().await }
    });
    x_started.recv().await.unwrap();

    let y_run = tokio::spawn({
        let y = Arc::clone(&y);
        async move { y.refresh().await }
    });
    y_started.recv().await.unwrap();

    y.cancel();
    y_gate.add_permits(10);
    let y_outcome = tokio::time::timeout(Duration::from_secs(5), y_run).await.unwrap().unwrap();
    assert_eq!(y_outcome, ScanOutcome::Cancelled);
    assert!(y.files().is_empty());

    x_gate.add_permits(10);
    let x_outcome = tokio::time::timeout(Duration::from_secs(5), x_run).await.unwrap().unwrap();
    assert_eq!(x_outcome, ScanOutcome::Completed { files: 4 });
    assert_eq!(x.files().len(), 4);
}

#[tokio::test]
async fn test_hiding_cancels_and_keeps_previous_results() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let gate = Arc::new(Semaphore::new(1));
    let stat = GatedStat {
        sizes: HashMap::from([(PathBuf::from("/h/keep.txt"), 42)]),
        gate: Arc::clone(&gate),
        started: started_tx,
    };
    let search = ScriptedSearch::new(vec![Ok(vec![PathBuf::from("/h/keep.txt")])]);
    let orchestrator = Arc::new(
        ScanOrchestrator::new(config(Path::new("/h"), 1), Arc::new(search), Arc::new(stat))
            .unwrap(),
    );

    assert_eq!(orchestrator.refresh().await, ScanOutcome::Completed { files: 1 });
    started_rx.recv().await.unwrap();

    let running = tokio::spawn({
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.refresh().await }
    });
    started_rx.recv().await.unwrap();
    assert_eq!(orchestrator.state(), ScanState::Scanning);

    assert_eq!(orchestrator.set_visible(false).await, None);
    gate.add_permits(1);

    let outcome = tokio::time::timeout(Duration::from_secs(5), running).await.unwrap().unwrap();
    assert_eq!(outcome, ScanOutcome::Cancelled);
    assert_eq!(orchestrator.state(), ScanState::Cancelled);
    assert_eq!(names(&orchestrator), ["keep.txt"]);

    assert_eq!(orchestrator.refresh().await, ScanOutcome::Skipped);
}

#[tokio::test]
async fn test_failed_search_keeps_previous_results() {
    let search = ScriptedSearch::new(vec![
        Ok(vec![PathBuf::from("/f/a.txt")]),
        Err(ScanError::Other {
            message: "disk on fire".to_string(),
        }),
    ]);
    let stat = GatedStat {
        sizes: HashMap::from([(PathBuf::from("/f/a.txt"), 7)]),
        gate: Arc::new(Semaphore::new(100)),
        started: mpsc::unbounded_channel().0,
    };
    let orchestrator =
        ScanOrchestrator::new(config(Path::new("/f"), 1), Arc::new(search), Arc::new(stat))
            .unwrap();

    assert_eq!(orchestrator.refresh().await, ScanOutcome::Completed { files: 1 });
    let outcome = orchestrator.refresh().await;
    assert_eq!(
        outcome,
        ScanOutcome::Failed {
            message: "disk on fire".to_string()
        }
    );
    assert_eq!(orchestrator.state(), ScanState::Idle);
    assert_eq!(names(&orchestrator), ["a.txt"]);
}

#[tokio::test]
async fn test_search_in_folder_rescans() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("inner")).unwrap();
    fs::write(temp.path().join("top.txt"), "top").unwrap();
    fs::write(temp.path().join("inner/deep.txt"), "deep").unwrap();

    let orchestrator = ScanOrchestrator::new(
        config(temp.path(), 2),
        Arc::new(WalkSearch),
        Arc::new(FsStat),
    )
    .unwrap();

    assert_eq!(orchestrator.refresh().await, ScanOutcome::Completed { files: 2 });

    let inner = temp.path().join("inner");
    let outcome = orchestrator.search_in_folder(&inner).await;
    assert_eq!(outcome, ScanOutcome::Completed { files: 1 });
    assert_eq!(orchestrator.root(), inner);
    assert_eq!(names(&orchestrator), ["deep.txt"]);
}
