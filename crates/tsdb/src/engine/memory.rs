//! In-process engine.
//!
//! Keeps every database in memory, keyed by its file path, and answers the
//! `select`, `join`, `aggregate` and `meta:names` queries with the same record
//! stream the native engine produces. The database file itself is only a
//! marker so that create, open and remove behave as they do on disk.
//!
//! Fault injection hooks (busy writes, short reads, forgotten series, failed
//! cursors, raw result bytes, engine panics) let tests drive the binding
//! through error paths.

use super::{Engine, EngineResult, OpenParams, RawCursor, RawDatabase, RawSession};
use crate::bridge::{forward_engine_log, EngineLogLevel, PanicState};
use crate::config::CreateOptions;
use crate::query::metadata::META_NAMES;
use crate::query::AggregateFunction;
use crate::sample::{self, SeriesId, Timestamp, MAX_TUPLE_ELEMENTS};
use crate::series;
use crate::status::Status;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Clone, Copy)]
struct Point {
    series: SeriesId,
    timestamp: Timestamp,
    value: f64,
}

/// Series names and points of one database.
#[derive(Debug, Default)]
struct Store {
    names: Vec<String>,
    ids: HashMap<String, SeriesId>,
    /// Series registered through the write path, as opposed to query output names.
    listed: BTreeSet<SeriesId>,
    points: Vec<Point>,
}

impl Store {
    fn register(&mut self, name: &str) -> SeriesId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        self.names.push(name.to_string());
        let id = self.names.len() as SeriesId;
        self.ids.insert(name.to_string(), id);
        id
    }

    fn name(&self, id: SeriesId) -> Option<&str> {
        let ix = usize::try_from(id).ok()?.checked_sub(1)?;
        self.names.get(ix).map(String::as_str)
    }

    /// Points of series matching `filter`, with their names.
    fn matching<'a>(&'a self, filter: &SeriesFilter<'_>) -> Vec<(&'a str, Point)> {
        self.points
            .iter()
            .filter(|p| filter.range.contains(p.timestamp))
            .filter_map(|p| {
                let name = self.name(p.series)?;
                filter.accepts(name).then_some((name, *p))
            })
            .collect()
    }
}

#[derive(Debug)]
struct CursorState {
    records: VecDeque<Vec<u8>>,
    error: Option<Status>,
}

impl CursorState {
    fn failed(status: Status) -> Self {
        Self {
            records: VecDeque::new(),
            error: Some(status),
        }
    }
}

#[derive(Debug, Default)]
struct State {
    next_handle: u64,
    stores: HashMap<PathBuf, Store>,
    databases: HashMap<RawDatabase, PathBuf>,
    sessions: HashMap<RawSession, RawDatabase>,
    cursors: HashMap<RawCursor, CursorState>,
    busy_writes: u32,
    chunk_limit: Option<usize>,
    forgotten: HashSet<String>,
    raw_results: VecDeque<Vec<u8>>,
}

impl State {
    fn next_handle(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn store(&self, session: RawSession) -> Option<&Store> {
        let db = self.sessions.get(&session)?;
        self.stores.get(self.databases.get(db)?)
    }

    fn store_mut(&mut self, session: RawSession) -> Option<&mut Store> {
        let db = self.sessions.get(&session)?;
        let path = self.databases.get(db)?;
        self.stores.get_mut(path)
    }
}

/// In-memory engine producing the native record stream.
#[derive(Debug)]
pub struct MemoryEngine {
    panic: Arc<PanicState>,
    state: Mutex<State>,
    calls: AtomicU64,
}

impl MemoryEngine {
    /// Creates an engine that reports panics to `panic`.
    pub fn new(panic: Arc<PanicState>) -> Self {
        Self {
            panic,
            state: Mutex::new(State::default()),
            calls: AtomicU64::new(0),
        }
    }

    /// Returns the panic state this engine reports to.
    pub fn panic_state(&self) -> &Arc<PanicState> {
        &self.panic
    }

    /// Number of engine calls made through the [`Engine`] trait.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Number of cursors not yet closed.
    pub fn open_cursors(&self) -> usize {
        self.lock().cursors.len()
    }

    /// Number of sessions not yet destroyed.
    pub fn open_sessions(&self) -> usize {
        self.lock().sessions.len()
    }

    /// Number of databases not yet closed.
    pub fn open_databases(&self) -> usize {
        self.lock().databases.len()
    }

    /// Rejects the next `count` writes with [`Status::Busy`].
    pub fn set_busy_writes(&self, count: u32) {
        self.lock().busy_writes = count;
    }

    /// Caps the number of bytes a single read may return.
    pub fn set_chunk_limit(&self, limit: Option<usize>) {
        self.lock().chunk_limit = limit;
    }

    /// Makes id resolution fail for `series` in every database.
    pub fn forget_series(&self, series: &str) {
        let name = series::normalize(series).unwrap_or_else(|| series.to_string());
        self.lock().forgotten.insert(name);
    }

    /// Puts every open cursor into an error state.
    pub fn fail_cursors(&self, status: Status) {
        for cursor in self.lock().cursors.values_mut() {
            cursor.error = Some(status);
        }
    }

    /// Makes the next query return `bytes` verbatim in a single read.
    pub fn push_raw_result(&self, bytes: Vec<u8>) {
        self.lock().raw_results.push_back(bytes);
    }

    /// Raises an engine panic.
    pub fn raise_panic(&self, message: &str) {
        forward_engine_log(EngineLogLevel::Error, message);
        self.panic.record_panic(message);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn count_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

impl Engine for MemoryEngine {
    fn create_database(&self, name: &str, dir: &Path, options: &CreateOptions) -> Status {
        self.count_call();
        let file = dir.join(format!("{}.akumuli", name));
        if file.exists() {
            forward_engine_log(
                EngineLogLevel::Error,
                &format!("Database {} already exists", file.display()),
            );
            return Status::General;
        }
        let contents = format!(
            "volumes={}\nvolume_size={}\nallocate={}\n",
            options.volumes, options.volume_size, options.allocate
        );
        match fs::write(&file, contents) {
            Ok(()) => {
                forward_engine_log(
                    EngineLogLevel::Info,
                    &format!("Created database {}", file.display()),
                );
                Status::Success
            }
            Err(err) => {
                forward_engine_log(
                    EngineLogLevel::Error,
                    &format!("Can't create {}: {}", file.display(), err),
                );
                Status::Io
            }
        }
    }

    fn remove_database(&self, file: &Path) -> Status {
        self.count_call();
        let mut state = self.lock();
        if state.databases.values().any(|open| open == file) {
            return Status::Busy;
        }
        if !file.exists() {
            return Status::NotFound;
        }
        if fs::remove_file(file).is_err() {
            return Status::Io;
        }
        state.stores.remove(file);
        forward_engine_log(
            EngineLogLevel::Info,
            &format!("Removed database {}", file.display()),
        );
        Status::Success
    }

    fn open_database(&self, file: &Path, params: &OpenParams) -> EngineResult<RawDatabase> {
        self.count_call();
        if !file.exists() {
            return Err(Status::NotFound);
        }
        let mut state = self.lock();
        let db = RawDatabase(state.next_handle());
        state.stores.entry(file.to_path_buf()).or_default();
        state.databases.insert(db, file.to_path_buf());
        match (&params.wal, &params.wal_path) {
            (Some(wal), Some(path)) => forward_engine_log(
                EngineLogLevel::Info,
                &format!(
                    "Opened {} with WAL at {} ({} volumes of {} bytes)",
                    file.display(),
                    path.display(),
                    wal.volumes,
                    wal.volume_size
                ),
            ),
            _ => forward_engine_log(
                EngineLogLevel::Info,
                &format!("Opened {} without WAL", file.display()),
            ),
        }
        Ok(db)
    }

    fn close_database(&self, db: RawDatabase) {
        self.count_call();
        let mut state = self.lock();
        if state.databases.remove(&db).is_some() {
            state.sessions.retain(|_, owner| *owner != db);
        }
    }

    fn create_session(&self, db: RawDatabase) -> EngineResult<RawSession> {
        self.count_call();
        let mut state = self.lock();
        if !state.databases.contains_key(&db) {
            return Err(Status::Closed);
        }
        let session = RawSession(state.next_handle());
        state.sessions.insert(session, db);
        Ok(session)
    }

    fn destroy_session(&self, session: RawSession) {
        self.count_call();
        self.lock().sessions.remove(&session);
    }

    fn series_to_id(&self, session: RawSession, series: &str) -> EngineResult<SeriesId> {
        self.count_call();
        let name = series::normalize(series).ok_or(Status::BadData)?;
        let mut state = self.lock();
        let store = state.store_mut(session).ok_or(Status::Closed)?;
        let id = store.register(&name);
        store.listed.insert(id);
        Ok(id)
    }

    fn id_to_series(&self, session: RawSession, id: SeriesId) -> Option<String> {
        self.count_call();
        let state = self.lock();
        let name = state.store(session)?.name(id)?;
        if state.forgotten.contains(name) {
            return None;
        }
        Some(name.to_string())
    }

    fn write(
        &self,
        session: RawSession,
        series_id: SeriesId,
        timestamp: Timestamp,
        value: f64,
    ) -> Status {
        self.count_call();
        let mut state = self.lock();
        if state.busy_writes > 0 {
            state.busy_writes -= 1;
            return Status::Busy;
        }
        let Some(store) = state.store_mut(session) else {
            return Status::Closed;
        };
        if store.name(series_id).is_none() {
            return Status::BadArg;
        }
        store.points.push(Point {
            series: series_id,
            timestamp,
            value,
        });
        Status::Success
    }

    fn query(&self, session: RawSession, query: &str) -> RawCursor {
        self.count_call();
        let mut state = self.lock();
        let cursor = RawCursor(state.next_handle());

        let result = if let Some(raw) = state.raw_results.pop_front() {
            Ok(vec![raw])
        } else {
            match state.store_mut(session) {
                Some(store) => run_query(store, query),
                None => Err(Status::Closed),
            }
        };

        let cursor_state = match result {
            Ok(records) => CursorState {
                records: records.into(),
                error: None,
            },
            Err(status) => {
                forward_engine_log(
                    EngineLogLevel::Error,
                    &format!("Query failed with {}: {}", status, query),
                );
                CursorState::failed(status)
            }
        };
        state.cursors.insert(cursor, cursor_state);
        cursor
    }

    fn cursor_read(&self, cursor: RawCursor, buf: &mut [u8]) -> usize {
        self.count_call();
        let mut state = self.lock();
        let limit = state
            .chunk_limit
            .map_or(buf.len(), |limit| limit.min(buf.len()));
        let Some(cursor) = state.cursors.get_mut(&cursor) else {
            return 0;
        };
        if cursor.error.is_some() {
            return 0;
        }

        let mut written = 0;
        while let Some(record) = cursor.records.front() {
            if written + record.len() > limit {
                break;
            }
            buf[written..written + record.len()].copy_from_slice(record);
            written += record.len();
            cursor.records.pop_front();
        }
        if written == 0 && !cursor.records.is_empty() {
            cursor.error = Some(Status::Overflow);
        }
        written
    }

    fn cursor_is_done(&self, cursor: RawCursor) -> bool {
        self.count_call();
        self.lock()
            .cursors
            .get(&cursor)
            .map_or(true, |c| c.error.is_some() || c.records.is_empty())
    }

    fn cursor_error(&self, cursor: RawCursor) -> Option<Status> {
        self.count_call();
        match self.lock().cursors.get(&cursor) {
            Some(c) => c.error,
            None => Some(Status::NotFound),
        }
    }

    fn cursor_close(&self, cursor: RawCursor) {
        self.count_call();
        self.lock().cursors.remove(&cursor);
    }
}

/// Time bounds of a query. `from > to` walks backwards over `(to, from]`.
#[derive(Debug, Clone, Copy, Default)]
struct Range {
    from: Option<Timestamp>,
    to: Option<Timestamp>,
}

impl Range {
    fn parse(root: &Map<String, Value>) -> EngineResult<Self> {
        let Some(range) = root.get("range") else {
            return Ok(Self::default());
        };
        let range = range.as_object().ok_or(Status::QueryParsingError)?;
        let bound = |key: &str| match range.get(key) {
            None => Ok(None),
            Some(v) => v.as_u64().map(Some).ok_or(Status::QueryParsingError),
        };
        Ok(Self {
            from: bound("from")?,
            to: bound("to")?,
        })
    }

    fn is_backward(&self) -> bool {
        matches!((self.from, self.to), (Some(from), Some(to)) if from > to)
    }

    fn contains(&self, ts: Timestamp) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) if from > to => ts > to && ts <= from,
            (Some(from), Some(to)) => ts >= from && ts < to,
            (Some(from), None) => ts >= from,
            (None, Some(to)) => ts < to,
            (None, None) => true,
        }
    }
}

/// Metric, range and tag restrictions shared by every query kind.
struct SeriesFilter<'q> {
    metrics: Vec<&'q str>,
    range: Range,
    tag: Option<(&'q str, Vec<&'q str>)>,
}

impl<'q> SeriesFilter<'q> {
    fn parse(metrics: Vec<&'q str>, root: &'q Map<String, Value>) -> EngineResult<Self> {
        let tag = match root.get("where") {
            None => None,
            Some(clause) => {
                let clause = clause.as_object().ok_or(Status::QueryParsingError)?;
                let mut entries = clause.iter();
                let (tag, values) = entries.next().ok_or(Status::QueryParsingError)?;
                if entries.next().is_some() {
                    return Err(Status::NotImplemented);
                }
                let values = match values {
                    Value::String(one) => vec![one.as_str()],
                    Value::Array(many) => many
                        .iter()
                        .map(|v| v.as_str().ok_or(Status::QueryParsingError))
                        .collect::<EngineResult<_>>()?,
                    _ => return Err(Status::QueryParsingError),
                };
                Some((tag.as_str(), values))
            }
        };
        Ok(Self {
            metrics,
            range: Range::parse(root)?,
            tag,
        })
    }

    fn accepts(&self, name: &str) -> bool {
        let metric = series::metric(name);
        if !self.metrics.is_empty() && !self.metrics.iter().any(|m| *m == metric) {
            return false;
        }
        match &self.tag {
            Some((tag, values)) => series::tags(name)
                .iter()
                .any(|t| t.name == *tag && values.iter().any(|v| *v == t.value)),
            None => true,
        }
    }
}

/// Output ordering, value filter and paging clauses.
struct Output {
    by_time: bool,
    filters: Vec<(String, f64)>,
    limit: Option<usize>,
    offset: usize,
}

impl Output {
    fn parse(root: &Map<String, Value>) -> EngineResult<Self> {
        let by_time = match root.get("order-by").map(|v| v.as_str()) {
            None | Some(Some("series")) => false,
            Some(Some("time")) => true,
            Some(_) => return Err(Status::QueryParsingError),
        };
        let mut filters = Vec::new();
        if let Some(filter) = root.get("filter") {
            let filter = filter.as_object().ok_or(Status::QueryParsingError)?;
            for (op, threshold) in filter {
                let threshold = threshold.as_f64().ok_or(Status::QueryParsingError)?;
                if !matches!(op.as_str(), "gt" | "ge" | "lt" | "le") {
                    return Err(Status::QueryParsingError);
                }
                filters.push((op.clone(), threshold));
            }
        }
        let count = |key: &str| match root.get(key) {
            None => Ok(None),
            Some(v) => v
                .as_u64()
                .map(|n| Some(n as usize))
                .ok_or(Status::QueryParsingError),
        };
        Ok(Self {
            by_time,
            filters,
            limit: count("limit")?,
            offset: count("offset")?.unwrap_or(0),
        })
    }

    fn keeps(&self, value: f64) -> bool {
        self.filters.iter().all(|(op, threshold)| match op.as_str() {
            "gt" => value > *threshold,
            "ge" => value >= *threshold,
            "lt" => value < *threshold,
            _ => value <= *threshold,
        })
    }

    fn page<T>(&self, rows: Vec<T>) -> impl Iterator<Item = T> {
        rows.into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
    }
}

fn run_query(store: &mut Store, query: &str) -> EngineResult<Vec<Vec<u8>>> {
    let parsed: Value = serde_json::from_str(query).map_err(|_| Status::QueryParsingError)?;
    let root = parsed.as_object().ok_or(Status::QueryParsingError)?;

    if root.contains_key("group-aggregate") {
        return Err(Status::NotImplemented);
    }
    if root.contains_key("group-by-tag") || root.contains_key("pivot-by-tag") {
        return Err(Status::NotImplemented);
    }

    if let Some(target) = root.get("select") {
        let target = target.as_str().ok_or(Status::QueryParsingError)?;
        if let Some(rest) = target.strip_prefix(META_NAMES) {
            let metric = match rest.strip_prefix(':') {
                Some(metric) => vec![metric],
                None if rest.is_empty() => Vec::new(),
                None => return Err(Status::QueryParsingError),
            };
            return select_names(store, &SeriesFilter::parse(metric, root)?);
        }
        return select(
            store,
            &SeriesFilter::parse(vec![target], root)?,
            &Output::parse(root)?,
        );
    }

    if let Some(metrics) = root.get("join") {
        let metrics = metrics
            .as_array()
            .ok_or(Status::QueryParsingError)?
            .iter()
            .map(|m| m.as_str().ok_or(Status::QueryParsingError))
            .collect::<EngineResult<Vec<_>>>()?;
        if metrics.is_empty() || metrics.len() > MAX_TUPLE_ELEMENTS {
            return Err(Status::BadArg);
        }
        let output = Output::parse(root)?;
        if !output.filters.is_empty() {
            return Err(Status::NotImplemented);
        }
        return join(store, &SeriesFilter::parse(metrics, root)?, &output);
    }

    if let Some(target) = root.get("aggregate") {
        let target = target.as_object().ok_or(Status::QueryParsingError)?;
        let mut entries = target.iter();
        let (metric, func) = entries.next().ok_or(Status::QueryParsingError)?;
        if entries.next().is_some() {
            return Err(Status::NotImplemented);
        }
        let func: AggregateFunction = func
            .as_str()
            .and_then(|f| f.parse().ok())
            .ok_or(Status::QueryParsingError)?;
        let filter = SeriesFilter::parse(vec![metric.as_str()], root)?;
        return aggregate(store, &filter, func);
    }

    Err(Status::QueryParsingError)
}

fn select(store: &Store, filter: &SeriesFilter<'_>, output: &Output) -> EngineResult<Vec<Vec<u8>>> {
    let mut rows = store.matching(filter);
    rows.retain(|(_, p)| output.keeps(p.value));
    let backward = filter.range.is_backward();
    rows.sort_by(|(a_name, a), (b_name, b)| {
        let (a_ts, b_ts) = if backward {
            (b.timestamp, a.timestamp)
        } else {
            (a.timestamp, b.timestamp)
        };
        if output.by_time {
            a_ts.cmp(&b_ts).then_with(|| a_name.cmp(b_name))
        } else {
            a_name.cmp(b_name).then_with(|| a_ts.cmp(&b_ts))
        }
    });

    Ok(output
        .page(rows)
        .map(|(_, p)| {
            let mut record = Vec::with_capacity(sample::HEADER_SIZE);
            sample::encode_scalar(&mut record, p.series, p.timestamp, p.value);
            record
        })
        .collect())
}

fn join(
    store: &mut Store,
    filter: &SeriesFilter<'_>,
    output: &Output,
) -> EngineResult<Vec<Vec<u8>>> {
    let width = filter.metrics.len();
    let mut grouped: BTreeMap<(String, Timestamp), Vec<Option<f64>>> = BTreeMap::new();
    for (name, p) in store.matching(filter) {
        let metric = series::metric(name);
        let Some(slot) = filter.metrics.iter().position(|m| *m == metric) else {
            continue;
        };
        let tagset = name.split_once(' ').map_or("", |(_, tags)| tags).to_string();
        grouped
            .entry((tagset, p.timestamp))
            .or_insert_with(|| vec![None; width])[slot] = Some(p.value);
    }

    let mut rows: Vec<_> = grouped.into_iter().collect();
    let backward = filter.range.is_backward();
    rows.sort_by(|((a_tags, a_ts), _), ((b_tags, b_ts), _)| {
        let (a_ts, b_ts) = if backward { (b_ts, a_ts) } else { (a_ts, b_ts) };
        if output.by_time {
            a_ts.cmp(b_ts).then_with(|| a_tags.cmp(b_tags))
        } else {
            a_tags.cmp(b_tags).then_with(|| a_ts.cmp(b_ts))
        }
    });

    let head = filter.metrics.join("|");
    let mut records = Vec::new();
    for ((tagset, timestamp), values) in output.page(rows) {
        let id = store.register(&format!("{} {}", head, tagset));
        let mut record = Vec::new();
        sample::encode_tuple(&mut record, id, timestamp, &values);
        records.push(record);
    }
    Ok(records)
}

fn aggregate(
    store: &mut Store,
    filter: &SeriesFilter<'_>,
    func: AggregateFunction,
) -> EngineResult<Vec<Vec<u8>>> {
    let mut per_series: BTreeMap<String, Vec<Point>> = BTreeMap::new();
    for (name, p) in store.matching(filter) {
        per_series.entry(name.to_string()).or_default().push(p);
    }

    let mut records = Vec::new();
    for (name, mut points) in per_series {
        points.sort_by_key(|p| p.timestamp);
        let Some((timestamp, value)) = reduce(&points, func) else {
            continue;
        };
        let out_name = match name.split_once(' ') {
            Some((metric, tags)) => format!("{}:{} {}", metric, func, tags),
            None => format!("{}:{}", name, func),
        };
        let id = store.register(&out_name);
        let mut record = Vec::with_capacity(sample::HEADER_SIZE);
        sample::encode_scalar(&mut record, id, timestamp, value);
        records.push(record);
    }
    Ok(records)
}

/// Reduces time-ordered points to `(timestamp, value)`.
fn reduce(points: &[Point], func: AggregateFunction) -> Option<(Timestamp, f64)> {
    let first = points.first()?;
    let last = points.last()?;
    let min = points.iter().min_by(|a, b| a.value.total_cmp(&b.value))?;
    let max = points.iter().max_by(|a, b| a.value.total_cmp(&b.value))?;
    let sum: f64 = points.iter().map(|p| p.value).sum();
    let result = match func {
        AggregateFunction::Count => (last.timestamp, points.len() as f64),
        AggregateFunction::Max => (max.timestamp, max.value),
        AggregateFunction::Min => (min.timestamp, min.value),
        AggregateFunction::Mean => (last.timestamp, sum / points.len() as f64),
        AggregateFunction::Sum => (last.timestamp, sum),
        AggregateFunction::MinTimestamp => (min.timestamp, min.timestamp as f64),
        AggregateFunction::MaxTimestamp => (max.timestamp, max.timestamp as f64),
        AggregateFunction::First => (first.timestamp, first.value),
        AggregateFunction::Last => (last.timestamp, last.value),
    };
    Some(result)
}

fn select_names(store: &Store, filter: &SeriesFilter<'_>) -> EngineResult<Vec<Vec<u8>>> {
    let mut names: Vec<(&str, SeriesId)> = store
        .listed
        .iter()
        .filter_map(|id| store.name(*id).map(|name| (name, *id)))
        .filter(|(name, _)| filter.accepts(name))
        .collect();
    names.sort();
    Ok(names
        .into_iter()
        .map(|(_, id)| {
            let mut record = Vec::with_capacity(sample::HEADER_SIZE);
            sample::encode_series(&mut record, id);
            record
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        engine: MemoryEngine,
        session: RawSession,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let engine = MemoryEngine::new(Arc::new(PanicState::new()));
        assert_eq!(
            engine.create_database("test", dir.path(), &CreateOptions::default()),
            Status::Success
        );
        let db = engine
            .open_database(&dir.path().join("test.akumuli"), &OpenParams::default())
            .unwrap();
        let session = engine.create_session(db).unwrap();
        Fixture {
            _dir: dir,
            engine,
            session,
        }
    }

    fn put(f: &Fixture, series: &str, ts: Timestamp, value: f64) {
        let id = f.engine.series_to_id(f.session, series).unwrap();
        assert_eq!(f.engine.write(f.session, id, ts, value), Status::Success);
    }

    fn read_all(f: &Fixture, query: &str) -> Vec<(String, Option<Timestamp>, Vec<f64>)> {
        let cursor = f.engine.query(f.session, query);
        assert_eq!(f.engine.cursor_error(cursor), None, "query {}", query);
        let mut buf = vec![0u8; 1024];
        let mut rows = Vec::new();
        while !f.engine.cursor_is_done(cursor) {
            let len = f.engine.cursor_read(cursor, &mut buf);
            let mut pos = 0;
            while pos < len {
                let (row, used) = sample::decode(&buf[..len], pos, |id| {
                    f.engine.id_to_series(f.session, id)
                })
                .unwrap();
                rows.push((row.series.unwrap_or_default(), row.timestamp, row.values));
                pos += used;
            }
        }
        f.engine.cursor_close(cursor);
        rows
    }

    #[test]
    fn test_series_normalized_and_tag_required() {
        let f = fixture();
        let a = f.engine.series_to_id(f.session, "cpu b=2 a=1").unwrap();
        let b = f.engine.series_to_id(f.session, "cpu  a=1 b=2").unwrap();
        assert_eq!(a, b);
        assert_eq!(
            f.engine.id_to_series(f.session, a).as_deref(),
            Some("cpu a=1 b=2")
        );
        assert_eq!(f.engine.series_to_id(f.session, "cpu"), Err(Status::BadData));
    }

    #[test]
    fn test_select_range_and_order() {
        let f = fixture();
        put(&f, "m host=b", 2, 20.0);
        put(&f, "m host=a", 3, 3.0);
        put(&f, "m host=a", 1, 1.0);
        put(&f, "other host=a", 1, 9.0);

        let rows = read_all(&f, r#"{"select":"m","range":{"from":0,"to":10}}"#);
        let keys: Vec<_> = rows.iter().map(|(s, t, _)| (s.as_str(), t.unwrap())).collect();
        assert_eq!(keys, vec![("m host=a", 1), ("m host=a", 3), ("m host=b", 2)]);

        let rows = read_all(
            &f,
            r#"{"select":"m","range":{"from":0,"to":10},"order-by":"time"}"#,
        );
        let ts: Vec<_> = rows.iter().map(|(_, t, _)| t.unwrap()).collect();
        assert_eq!(ts, vec![1, 2, 3]);

        let rows = read_all(&f, r#"{"select":"m","range":{"from":10,"to":0},"order-by":"time"}"#);
        let ts: Vec<_> = rows.iter().map(|(_, t, _)| t.unwrap()).collect();
        assert_eq!(ts, vec![3, 2, 1]);

        let rows = read_all(&f, r#"{"select":"m","range":{"from":2,"to":3}}"#);
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn test_select_where_filter_and_paging() {
        let f = fixture();
        for ts in 0..10 {
            put(&f, "m host=a", ts, ts as f64);
            put(&f, "m host=b", ts, ts as f64);
        }
        let rows = read_all(
            &f,
            r#"{"select":"m","where":{"host":["b"]},"filter":{"ge":2.0,"lt":8.0},"limit":3,"offset":1}"#,
        );
        let values: Vec<f64> = rows.iter().map(|(_, _, v)| v[0]).collect();
        assert_eq!(values, vec![3.0, 4.0, 5.0]);
        assert!(rows.iter().all(|(s, _, _)| s == "m host=b"));
    }

    #[test]
    fn test_join_produces_sparse_tuples() {
        let f = fixture();
        put(&f, "cpu host=a", 1, 0.5);
        put(&f, "mem host=a", 1, 64.0);
        put(&f, "mem host=a", 2, 65.0);

        let rows = read_all(&f, r#"{"join":["cpu","mem"],"range":{"from":0,"to":10}}"#);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "cpu|mem host=a");
        assert_eq!(rows[0].2, vec![0.5, 64.0]);
        assert!(rows[1].2[0].is_nan());
        assert_eq!(rows[1].2[1], 65.0);
    }

    #[test]
    fn test_aggregate() {
        let f = fixture();
        put(&f, "m host=a", 1, 4.0);
        put(&f, "m host=a", 2, 8.0);
        put(&f, "m host=b", 1, 1.0);

        let rows = read_all(&f, r#"{"aggregate":{"m":"sum"}}"#);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, "m:sum host=a");
        assert_eq!(rows[0].2, vec![12.0]);
        assert_eq!(rows[1].2, vec![1.0]);
    }

    #[test]
    fn test_metadata_lists_written_series_only() {
        let f = fixture();
        put(&f, "mem server=2", 1, 1.0);
        put(&f, "mem server=1", 1, 1.0);
        put(&f, "cpu server=1", 1, 1.0);
        read_all(&f, r#"{"aggregate":{"mem":"max"}}"#);

        let names: Vec<_> = read_all(&f, r#"{"select":"meta:names"}"#)
            .into_iter()
            .map(|(s, _, v)| {
                assert!(v.is_empty());
                s
            })
            .collect();
        assert_eq!(names, vec!["cpu server=1", "mem server=1", "mem server=2"]);

        let names: Vec<_> = read_all(
            &f,
            r#"{"select":"meta:names:mem","where":{"server":["2"]}}"#,
        )
        .into_iter()
        .map(|(s, _, _)| s)
        .collect();
        assert_eq!(names, vec!["mem server=2"]);
    }

    #[test]
    fn test_bad_queries_fail_the_cursor() {
        let f = fixture();
        let cases = [
            ("not json", Status::QueryParsingError),
            (r#"{"unknown":1}"#, Status::QueryParsingError),
            (
                r#"{"group-aggregate":{"metric":["m"],"step":1,"func":["max"]}}"#,
                Status::NotImplemented,
            ),
            (r#"{"aggregate":{"m":"median"}}"#, Status::QueryParsingError),
        ];
        for (query, status) in cases {
            let cursor = f.engine.query(f.session, query);
            assert_eq!(f.engine.cursor_error(cursor), Some(status), "{}", query);
            assert!(f.engine.cursor_is_done(cursor));
            f.engine.cursor_close(cursor);
        }
        assert_eq!(f.engine.open_cursors(), 0);
    }

    #[test]
    fn test_read_copies_whole_records() {
        let f = fixture();
        for ts in 0..3 {
            put(&f, "m host=a", ts, 1.0);
        }
        f.engine.set_chunk_limit(Some(sample::HEADER_SIZE * 2 - 1));
        let cursor = f.engine.query(f.session, r#"{"select":"m"}"#);
        let mut buf = vec![0u8; 1024];
        assert_eq!(f.engine.cursor_read(cursor, &mut buf), sample::HEADER_SIZE);
        assert!(!f.engine.cursor_is_done(cursor));
    }

    #[test]
    fn test_busy_writes() {
        let f = fixture();
        let id = f.engine.series_to_id(f.session, "m host=a").unwrap();
        f.engine.set_busy_writes(2);
        assert_eq!(f.engine.write(f.session, id, 1, 1.0), Status::Busy);
        assert_eq!(f.engine.write(f.session, id, 1, 1.0), Status::Busy);
        assert_eq!(f.engine.write(f.session, id, 1, 1.0), Status::Success);
        assert_eq!(f.engine.write(f.session, 999, 1, 1.0), Status::BadArg);
    }

    #[test]
    fn test_remove_refuses_open_database() {
        let dir = TempDir::new().unwrap();
        let engine = MemoryEngine::new(Arc::new(PanicState::new()));
        let file = dir.path().join("db.akumuli");
        assert_eq!(
            engine.create_database("db", dir.path(), &CreateOptions::default()),
            Status::Success
        );
        assert_eq!(
            engine.create_database("db", dir.path(), &CreateOptions::default()),
            Status::General
        );
        let db = engine.open_database(&file, &OpenParams::default()).unwrap();
        assert_eq!(engine.remove_database(&file), Status::Busy);
        engine.close_database(db);
        assert_eq!(engine.remove_database(&file), Status::Success);
        assert!(!file.exists());
        assert_eq!(engine.remove_database(&file), Status::NotFound);
        assert_eq!(
            engine.open_database(&file, &OpenParams::default()),
            Err(Status::NotFound)
        );
    }
}
