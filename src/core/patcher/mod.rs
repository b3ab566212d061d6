/*!
 * Multi-source patcher
 *
 * Reconstructs the reference file from matched local spans and missing
 * spans fetched concurrently from several block repositories. One worker
 * thread per repository performs the fetches, a coordinator schedules
 * spans and handles retries, and a single writer drains a reorder buffer
 * so the sink sees bytes in strictly ascending block order.
 *
 * Backpressure: a span occupies a scheduling slot from first assignment
 * until the writer has emitted it, so the reorder buffer never holds more
 * than `repositories × per_repo_inflight` spans.
 */

pub mod reorder;
pub mod repository;

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use rand::Rng;

use crate::config::PatchConfig;
use crate::core::checksum::read_full;
use crate::core::index::BlockIndex;
use crate::core::merger;
use crate::core::{MatchSpan, MissingSpan, PatchStats};
use crate::error::{Result, SyncError};
use reorder::ReorderBuffer;
use repository::BlockRepository;

/// Cooperative cancellation signal shared by the caller and the patcher
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Scheduling state for one missing sub-span
#[derive(Debug, Clone)]
struct SpanJob {
    span: MissingSpan,
    attempt: u32,
    failed_workers: Vec<usize>,
    has_slot: bool,
}

impl SpanJob {
    fn new(span: MissingSpan) -> Self {
        Self {
            span,
            attempt: 0,
            failed_workers: Vec::new(),
            has_slot: false,
        }
    }
}

/// Work handed to a repository worker
struct Assignment {
    span: MissingSpan,
    attempt: u32,
}

/// Completion message from a worker back to the coordinator
struct FetchOutcome {
    worker: usize,
    span: MissingSpan,
    result: Result<Vec<u8>>,
}

/// One step of the writer's emission plan, ordered by start block
#[derive(Debug, Clone, Copy)]
enum PlanEntry {
    /// Copy a matched span from the local file
    Local(MatchSpan),

    /// Emit a fetched span from the reorder buffer
    Fetched(MissingSpan),
}

/// Reconstructs one reference file from local matches and remote blocks
pub struct MultiSourcePatcher<W: Write> {
    sink: W,
    index: Arc<BlockIndex>,
    repositories: Vec<BlockRepository>,
    matched: Vec<MatchSpan>,
    local_path: Option<PathBuf>,
    config: PatchConfig,
    cancel: CancelToken,
}

impl<W: Write> std::fmt::Debug for MultiSourcePatcher<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiSourcePatcher")
            .field("index", &self.index)
            .field("repositories", &self.repositories.len())
            .field("matched", &self.matched)
            .field("local_path", &self.local_path)
            .field("config", &self.config)
            .field("cancel", &self.cancel)
            .finish()
    }
}

impl<W: Write> MultiSourcePatcher<W> {
    pub fn new(
        sink: W,
        index: Arc<BlockIndex>,
        repositories: Vec<BlockRepository>,
        config: PatchConfig,
    ) -> Result<Self> {
        config.validate()?;
        if repositories.is_empty() {
            return Err(SyncError::Usage(
                "at least one block repository is required".to_string(),
            ));
        }
        Ok(Self {
            sink,
            index,
            repositories,
            matched: Vec::new(),
            local_path: None,
            config,
            cancel: CancelToken::new(),
        })
    }

    /// Provide a local file whose matched spans can be copied instead of
    /// fetched. `matched` must be the merger's ordered output.
    pub fn with_local_source(mut self, path: impl Into<PathBuf>, matched: Vec<MatchSpan>) -> Self {
        self.local_path = Some(path.into());
        self.matched = matched;
        self
    }

    /// Token for cancelling the patch from another thread
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run the patch to completion
    ///
    /// On success the sink has received exactly `file_size` bytes. On
    /// error the sink holds a clean prefix ending on a span boundary.
    pub fn patch(mut self) -> Result<PatchStats> {
        let index = Arc::clone(&self.index);
        let missing = merger::missing_spans(&self.matched, index.block_count());
        let jobs = split_missing(&missing, self.config.max_range_blocks);
        let plan = build_plan(&self.matched, &jobs);
        tracing::debug!(
            "patching {} blocks: {} matched spans, {} missing sub-spans across {} repositories",
            index.block_count(),
            self.matched.len(),
            jobs.len(),
            self.repositories.len()
        );

        let buffer = ReorderBuffer::new();
        let (results_tx, results_rx) = bounded::<FetchOutcome>(self.repositories.len());
        let (drained_tx, drained_rx) = unbounded::<u32>();

        let repositories = &self.repositories;
        let config = &self.config;
        let cancel = &self.cancel;
        let local_path = self.local_path.as_deref();
        let sink = &mut self.sink;
        let index_ref: &BlockIndex = &index;

        let mut stats = PatchStats::default();
        let mut writer_result: Result<()> = Ok(());

        thread::scope(|s| {
            let mut assign_txs = Vec::with_capacity(repositories.len());
            for (worker, repo) in repositories.iter().enumerate() {
                let (tx, rx) = bounded::<Assignment>(config.per_repo_inflight);
                assign_txs.push(tx);
                let results_tx = results_tx.clone();
                let cancel = cancel.clone();
                s.spawn(move || repository_worker(repo, worker, rx, results_tx, cancel, config));
            }
            drop(results_tx);

            let coordinator = {
                let buffer = &buffer;
                let cancel = cancel.clone();
                s.spawn(move || {
                    coordinate(jobs, assign_txs, results_rx, drained_rx, buffer, cancel, config)
                })
            };

            writer_result = emit_stream(
                sink,
                &plan,
                index_ref,
                local_path,
                &buffer,
                &drained_tx,
                cancel,
                &mut stats,
            );
            drop(drained_tx);

            match coordinator.join() {
                Ok(requests) => stats.requests = requests,
                Err(_) => {
                    if writer_result.is_ok() {
                        writer_result =
                            Err(SyncError::Other("patch coordinator panicked".to_string()));
                    }
                }
            }
        });

        writer_result?;
        Ok(stats)
    }
}

/// Split missing spans so no request exceeds the range cap
fn split_missing(missing: &[MissingSpan], max_range_blocks: u32) -> Vec<MissingSpan> {
    let mut out = Vec::new();
    for span in missing {
        let mut start = span.start_block;
        loop {
            let end = span
                .end_block
                .min(start.saturating_add(max_range_blocks - 1));
            out.push(MissingSpan::new(start, end));
            match end.checked_add(1) {
                Some(next) if next <= span.end_block => start = next,
                _ => break,
            }
        }
    }
    out
}

/// Interleave matched and missing sub-spans into one ordered plan
fn build_plan(matched: &[MatchSpan], fetched: &[MissingSpan]) -> Vec<PlanEntry> {
    let mut plan = Vec::with_capacity(matched.len() + fetched.len());
    let (mut i, mut j) = (0, 0);
    while i < matched.len() || j < fetched.len() {
        let take_local = match (matched.get(i), fetched.get(j)) {
            (Some(m), Some(f)) => m.start_block < f.start_block,
            (Some(_), None) => true,
            _ => false,
        };
        if take_local {
            plan.push(PlanEntry::Local(matched[i]));
            i += 1;
        } else {
            plan.push(PlanEntry::Fetched(fetched[j]));
            j += 1;
        }
    }
    plan
}

/// Exponential backoff with jitter for retried assignments
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let shift = (attempt.saturating_sub(1)).min(10);
    let exp = base.saturating_mul(1 << shift);
    exp + exp.mul_f64(rand::rng().random_range(0.0..0.5))
}

/// Fetch loop run by one thread per repository
fn repository_worker(
    repository: &BlockRepository,
    worker: usize,
    assignments: Receiver<Assignment>,
    results: Sender<FetchOutcome>,
    cancel: CancelToken,
    config: &PatchConfig,
) {
    for assignment in assignments.iter() {
        if cancel.is_cancelled() {
            break;
        }
        if assignment.attempt > 0 {
            thread::sleep(backoff_delay(config.backoff_base, assignment.attempt));
        }
        tracing::debug!(
            "repository {} fetching blocks {}..={} (attempt {})",
            repository.id(),
            assignment.span.start_block,
            assignment.span.end_block,
            assignment.attempt
        );
        let result = repository.fetch_span(&assignment.span);
        let outcome = FetchOutcome {
            worker,
            span: assignment.span,
            result,
        };
        if results.send(outcome).is_err() {
            break;
        }
    }
}

/// Pick a worker for a job: least-loaded with spare capacity, preferring
/// repositories that have not failed this span, round-robin on ties
fn pick_worker(
    inflight: &[usize],
    cap: usize,
    failed_workers: &[usize],
    rr_cursor: &mut usize,
) -> Option<usize> {
    let n = inflight.len();
    for pass in 0..2 {
        let mut best: Option<usize> = None;
        for k in 0..n {
            let w = (*rr_cursor + k) % n;
            if inflight[w] >= cap {
                continue;
            }
            if pass == 0 && failed_workers.contains(&w) {
                continue;
            }
            match best {
                None => best = Some(w),
                Some(b) if inflight[w] < inflight[b] => best = Some(w),
                _ => {}
            }
        }
        if let Some(w) = best {
            *rr_cursor = (w + 1) % n;
            return Some(w);
        }
    }
    None
}

/// Scheduling loop: assigns spans, retries failures on alternate
/// repositories, and parks verified results in the reorder buffer.
/// Returns the number of range requests issued.
fn coordinate(
    jobs: Vec<MissingSpan>,
    assign_txs: Vec<Sender<Assignment>>,
    results_rx: Receiver<FetchOutcome>,
    drained_rx: Receiver<u32>,
    buffer: &ReorderBuffer,
    cancel: CancelToken,
    config: &PatchConfig,
) -> u64 {
    let worker_count = assign_txs.len();
    let slots_total = worker_count * config.per_repo_inflight;

    let mut pending: BTreeMap<u32, SpanJob> = jobs
        .into_iter()
        .map(|span| (span.start_block, SpanJob::new(span)))
        .collect();
    let mut assigned: BTreeMap<u32, SpanJob> = BTreeMap::new();
    let mut inflight = vec![0usize; worker_count];
    let mut slots_used = 0usize;
    let mut rr_cursor = 0usize;
    let mut requests = 0u64;

    loop {
        if cancel.is_cancelled() {
            buffer.poison(SyncError::Cancelled);
            break;
        }

        // Dispatch in ascending block order while capacity allows
        let dispatchable: Vec<u32> = pending.keys().copied().collect();
        for start in dispatchable {
            let job = &pending[&start];
            if !job.has_slot && slots_used >= slots_total {
                continue;
            }
            let Some(worker) = pick_worker(
                &inflight,
                config.per_repo_inflight,
                &job.failed_workers,
                &mut rr_cursor,
            ) else {
                break;
            };

            let mut job = pending.remove(&start).expect("job disappeared");
            if !job.has_slot {
                job.has_slot = true;
                slots_used += 1;
            }
            inflight[worker] += 1;
            requests += 1;
            let assignment = Assignment {
                span: job.span,
                attempt: job.attempt,
            };
            assigned.insert(start, job);
            if assign_txs[worker].send(assignment).is_err() {
                // Worker gone; undo and fail the patch
                buffer.poison(SyncError::Other(
                    "repository worker exited unexpectedly".to_string(),
                ));
                return requests;
            }
        }

        if pending.is_empty() && assigned.is_empty() {
            break;
        }

        select! {
            recv(results_rx) -> msg => {
                let Ok(outcome) = msg else { break };
                inflight[outcome.worker] -= 1;
                let start = outcome.span.start_block;
                let mut job = match assigned.remove(&start) {
                    Some(job) => job,
                    None => continue,
                };
                match outcome.result {
                    Ok(bytes) => {
                        buffer.insert(start, bytes);
                    }
                    Err(error) => {
                        job.attempt += 1;
                        if !job.failed_workers.contains(&outcome.worker) {
                            job.failed_workers.push(outcome.worker);
                        }
                        tracing::warn!(
                            "blocks {}..={} failed on repository {} (attempt {}): {}",
                            job.span.start_block,
                            job.span.end_block,
                            outcome.worker,
                            job.attempt,
                            error
                        );
                        if job.attempt > config.retry_budget || error.is_fatal() {
                            buffer.poison(SyncError::NoSource {
                                start_block: job.span.start_block,
                                end_block: job.span.end_block,
                            });
                            break;
                        }
                        pending.insert(start, job);
                    }
                }
            }
            recv(drained_rx) -> msg => {
                match msg {
                    Ok(_) => slots_used = slots_used.saturating_sub(1),
                    // Writer done or failed; wind down
                    Err(_) => break,
                }
            }
            default(Duration::from_millis(100)) => {}
        }
    }

    requests
}

/// Single writer: copies local matches and drains fetched spans in strict
/// ascending block order
#[allow(clippy::too_many_arguments)]
fn emit_stream<W: Write>(
    sink: &mut W,
    plan: &[PlanEntry],
    index: &BlockIndex,
    local_path: Option<&Path>,
    buffer: &ReorderBuffer,
    drained_tx: &Sender<u32>,
    cancel: &CancelToken,
    stats: &mut PatchStats,
) -> Result<()> {
    let block_size = index.block_size() as usize;
    let mut local = match local_path {
        Some(path) => Some(File::open(path)?),
        None => None,
    };
    let mut block_buf = vec![0u8; block_size];

    for entry in plan {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }
        match entry {
            PlanEntry::Local(span) => {
                let file = local.as_mut().ok_or_else(|| {
                    SyncError::Usage("matched spans given without a local file".to_string())
                })?;
                for block in span.start_block..=span.end_block {
                    let out_len = index.block_byte_len(block) as usize;
                    let offset = span.local_offset
                        + (block - span.start_block) as u64 * block_size as u64;
                    file.seek(SeekFrom::Start(offset))?;
                    let read = read_full(file, &mut block_buf[..out_len])?;
                    // A match against a zero-padded window can run past the
                    // local end; the missing bytes are zeros by definition
                    block_buf[read..out_len].fill(0);
                    sink.write_all(&block_buf[..out_len])?;
                    stats.bytes_written += out_len as u64;
                    stats.bytes_local += out_len as u64;
                    stats.blocks_matched += 1;
                }
            }
            PlanEntry::Fetched(span) => {
                let bytes = buffer.take(span.start_block)?;
                sink.write_all(&bytes)?;
                stats.bytes_written += bytes.len() as u64;
                stats.bytes_fetched += bytes.len() as u64;
                stats.blocks_fetched += span.block_len();
                let _ = drained_tx.send(span.start_block);
            }
        }
    }

    sink.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::repository::{
        repository_for_source, BlockRepository, BlockVerifier, ByteRange, FileRequester,
        RangeResolver, Requester,
    };
    use super::*;
    use crate::config::HashAlgorithm;
    use crate::core::checksum::ChecksumGenerator;
    use crate::config::MatchConfig;
    use crate::core::matcher::match_local_file;
    use std::sync::atomic::AtomicUsize;

    fn build_index(data: &[u8], block_size: u32) -> Arc<BlockIndex> {
        let generator = ChecksumGenerator::new(block_size, HashAlgorithm::Blake3);
        let generated = generator.generate(data).unwrap();
        Arc::new(BlockIndex::new(
            generated.descriptors,
            block_size,
            generated.file_size,
            HashAlgorithm::Blake3,
            generated.root_hash,
        ))
    }

    fn write_temp(data: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(data).unwrap();
        file.flush().unwrap();
        file
    }

    fn file_repositories(
        sources: &[&tempfile::NamedTempFile],
        index: &Arc<BlockIndex>,
    ) -> Vec<BlockRepository> {
        sources
            .iter()
            .enumerate()
            .map(|(id, file)| {
                repository_for_source(
                    id as u32,
                    file.path().to_str().unwrap(),
                    index,
                    Duration::from_secs(5),
                )
                .unwrap()
            })
            .collect()
    }

    fn quick_config() -> PatchConfig {
        PatchConfig {
            backoff_base: Duration::from_millis(1),
            ..Default::default()
        }
    }

    /// Requester that fails a fixed number of times before delegating
    struct FlakyRequester {
        inner: FileRequester,
        failures_left: AtomicUsize,
    }

    impl Requester for FlakyRequester {
        fn fetch(&self, range: ByteRange) -> crate::error::Result<Vec<u8>> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(SyncError::Repository("injected failure".to_string()));
            }
            self.inner.fetch(range)
        }

        fn location(&self) -> String {
            "flaky".to_string()
        }
    }

    /// Requester that always returns zeros of the right length
    struct ZeroRequester;

    impl Requester for ZeroRequester {
        fn fetch(&self, range: ByteRange) -> crate::error::Result<Vec<u8>> {
            Ok(vec![0u8; range.len() as usize])
        }

        fn location(&self) -> String {
            "zeros".to_string()
        }
    }

    fn custom_repository(
        id: u32,
        requester: Box<dyn Requester>,
        index: &Arc<BlockIndex>,
    ) -> BlockRepository {
        BlockRepository::new(
            id,
            requester,
            RangeResolver::new(index.block_size(), index.file_size()),
            BlockVerifier::new(Arc::clone(index)),
        )
    }

    #[test]
    fn test_split_missing_caps_span_length() {
        let jobs = split_missing(&[MissingSpan::new(0, 40)], 16);
        assert_eq!(
            jobs,
            vec![
                MissingSpan::new(0, 15),
                MissingSpan::new(16, 31),
                MissingSpan::new(32, 40),
            ]
        );

        let jobs = split_missing(&[MissingSpan::new(3, 3), MissingSpan::new(9, 12)], 16);
        assert_eq!(jobs, vec![MissingSpan::new(3, 3), MissingSpan::new(9, 12)]);
    }

    #[test]
    fn test_build_plan_interleaves_in_order() {
        let matched = vec![
            MatchSpan { start_block: 0, end_block: 1, local_offset: 0 },
            MatchSpan { start_block: 4, end_block: 4, local_offset: 64 },
        ];
        let fetched = vec![MissingSpan::new(2, 3), MissingSpan::new(5, 7)];
        let plan = build_plan(&matched, &fetched);

        let starts: Vec<u32> = plan
            .iter()
            .map(|entry| match entry {
                PlanEntry::Local(span) => span.start_block,
                PlanEntry::Fetched(span) => span.start_block,
            })
            .collect();
        assert_eq!(starts, vec![0, 2, 4, 5]);
    }

    #[test]
    fn test_backoff_grows_with_attempts() {
        let base = Duration::from_millis(100);
        let first = backoff_delay(base, 1);
        let third = backoff_delay(base, 3);
        assert!(first >= base && first < base * 2);
        assert!(third >= base * 4 && third < base * 8);
    }

    #[test]
    fn test_patch_everything_from_one_repository() {
        let reference: Vec<u8> = (0u32..5000).flat_map(|i| i.to_le_bytes()).collect();
        let index = build_index(&reference, 64);
        let source = write_temp(&reference);
        let repositories = file_repositories(&[&source], &index);

        let mut output = Vec::new();
        let stats = MultiSourcePatcher::new(&mut output, Arc::clone(&index), repositories, quick_config())
            .unwrap()
            .patch()
            .unwrap();

        assert_eq!(output, reference);
        assert_eq!(stats.bytes_written, reference.len() as u64);
        assert_eq!(stats.bytes_fetched, reference.len() as u64);
        assert_eq!(stats.blocks_matched, 0);
    }

    #[test]
    fn test_patch_uses_local_matches() {
        let reference = b"AAAABBBBCCCCDDDD".to_vec();
        let index = build_index(&reference, 4);
        // Local file has blocks 0, 1, 3 but not 2
        let local = write_temp(b"AAAABBBBxxxxDDDD");
        let outcome =
            match_local_file(local.path(), &index, &MatchConfig::default()).unwrap();
        assert_eq!(outcome.missing, vec![MissingSpan::new(2, 2)]);

        let source = write_temp(&reference);
        let repositories = file_repositories(&[&source], &index);

        let mut output = Vec::new();
        let stats = MultiSourcePatcher::new(&mut output, Arc::clone(&index), repositories, quick_config())
            .unwrap()
            .with_local_source(local.path(), outcome.matched)
            .patch()
            .unwrap();

        assert_eq!(output, reference);
        assert_eq!(stats.blocks_matched, 3);
        assert_eq!(stats.blocks_fetched, 1);
        assert_eq!(stats.bytes_fetched, 4);
    }

    #[test]
    fn test_patch_fully_local_issues_no_requests() {
        let reference = b"hello, world!\n".to_vec();
        let index = build_index(&reference, 4);
        let local = write_temp(&reference);
        let outcome =
            match_local_file(local.path(), &index, &MatchConfig::default()).unwrap();
        assert!(outcome.missing.is_empty());

        let source = write_temp(&reference);
        let repositories = file_repositories(&[&source], &index);

        let mut output = Vec::new();
        let stats = MultiSourcePatcher::new(&mut output, Arc::clone(&index), repositories, quick_config())
            .unwrap()
            .with_local_source(local.path(), outcome.matched)
            .patch()
            .unwrap();

        assert_eq!(output, reference);
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.bytes_fetched, 0);
    }

    #[test]
    fn test_patch_races_two_repositories() {
        let reference: Vec<u8> = (0u32..60_000).flat_map(|i| i.to_le_bytes()).collect();
        let index = build_index(&reference, 4096);
        let source_a = write_temp(&reference);
        let source_b = write_temp(&reference);
        let repositories = file_repositories(&[&source_a, &source_b], &index);

        let mut output = Vec::new();
        let stats = MultiSourcePatcher::new(&mut output, Arc::clone(&index), repositories, quick_config())
            .unwrap()
            .patch()
            .unwrap();

        assert_eq!(output, reference);
        // Total fetched bytes equal the reference exactly: no re-fetches
        assert_eq!(stats.bytes_fetched, reference.len() as u64);
    }

    #[test]
    fn test_patch_survives_flaky_repository() {
        let reference: Vec<u8> = (0u32..20_000).flat_map(|i| i.to_le_bytes()).collect();
        let index = build_index(&reference, 1024);
        let source = write_temp(&reference);

        let flaky = custom_repository(
            0,
            Box::new(FlakyRequester {
                inner: FileRequester::new(source.path().to_path_buf()),
                failures_left: AtomicUsize::new(3),
            }),
            &index,
        );
        let good = repository_for_source(
            1,
            source.path().to_str().unwrap(),
            &index,
            Duration::from_secs(5),
        )
        .unwrap();

        let mut output = Vec::new();
        let stats = MultiSourcePatcher::new(
            &mut output,
            Arc::clone(&index),
            vec![flaky, good],
            quick_config(),
        )
        .unwrap()
        .patch()
        .unwrap();

        assert_eq!(output, reference);
        assert!(stats.requests > 0);
    }

    #[test]
    fn test_patch_rejects_corrupt_repository_and_recovers() {
        let reference = b"AAAABBBBCCCCDDDD".to_vec();
        let index = build_index(&reference, 4);
        let source = write_temp(&reference);

        let malicious = custom_repository(0, Box::new(ZeroRequester), &index);
        let honest = repository_for_source(
            1,
            source.path().to_str().unwrap(),
            &index,
            Duration::from_secs(5),
        )
        .unwrap();

        let mut output = Vec::new();
        MultiSourcePatcher::new(
            &mut output,
            Arc::clone(&index),
            vec![malicious, honest],
            quick_config(),
        )
        .unwrap()
        .patch()
        .unwrap();

        assert_eq!(output, reference);
    }

    #[test]
    fn test_patch_fails_with_no_source_when_all_repositories_lie() {
        let reference = b"AAAABBBBCCCCDDDD".to_vec();
        let index = build_index(&reference, 4);

        let bad_a = custom_repository(0, Box::new(ZeroRequester), &index);
        let bad_b = custom_repository(1, Box::new(ZeroRequester), &index);

        let mut output = Vec::new();
        let err = MultiSourcePatcher::new(
            &mut output,
            Arc::clone(&index),
            vec![bad_a, bad_b],
            quick_config(),
        )
        .unwrap()
        .patch()
        .unwrap_err();

        assert!(matches!(err, SyncError::NoSource { .. }));
        // Nothing was emitted past a block boundary
        assert_eq!(output.len() % 4, 0);
        assert!(output.len() < reference.len());
    }

    #[test]
    fn test_cancellation_stops_the_patch() {
        let reference: Vec<u8> = (0u32..50_000).flat_map(|i| i.to_le_bytes()).collect();
        let index = build_index(&reference, 1024);
        let source = write_temp(&reference);
        let repositories = file_repositories(&[&source], &index);

        let mut output = Vec::new();
        let patcher = MultiSourcePatcher::new(
            &mut output,
            Arc::clone(&index),
            repositories,
            quick_config(),
        )
        .unwrap();
        patcher.cancel_token().cancel();
        let err = patcher.patch().unwrap_err();

        assert!(matches!(err, SyncError::Cancelled));
        assert_eq!(output.len() % 1024, 0);
    }

    #[test]
    fn test_empty_repository_list_rejected() {
        let index = build_index(b"data", 4);
        let err = MultiSourcePatcher::new(Vec::<u8>::new(), index, Vec::new(), quick_config())
            .unwrap_err();
        assert!(matches!(err, SyncError::Usage(_)));
    }
}
