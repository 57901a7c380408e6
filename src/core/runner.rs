//! Asynchronous query runner
//!
//! A [`QueryRunner`] owns a base query containing a `[WHERE]` token and runs
//! it with a caller-supplied filter on a private copy of a registered
//! connection. In async mode the query runs on a spawned tokio task and the
//! outcome is published to registered handlers from that task.
//!
//! Status protocol: `Idle -> Running -> Complete | Aborted`, back to `Idle`
//! through [`QueryRunner::clear`]. Starting a run while one is in flight is
//! ignored.

use super::connection::DbConnection;
use super::dates;
use super::error::{DatabaseError, Result};
use super::parameter::Parameter;
use super::provider::CancelHandle;
use super::query_builder::WhereClause;
use super::registry::ConnectionRegistry;
use super::table::DataTable;
use chrono::NaiveDateTime;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Token in the base query replaced by the rendered WHERE clause
pub const WHERE_TOKEN: &str = "[WHERE]";

/// Registry key and SQL a runner executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryTemplate {
    pub connection_key: String,
    pub base_query: String,
}

impl QueryTemplate {
    pub fn new(connection_key: impl Into<String>, base_query: impl Into<String>) -> Self {
        Self {
            connection_key: connection_key.into(),
            base_query: base_query.into(),
        }
    }

    /// Base query with the clause substituted for `[WHERE]`
    pub fn render(&self, clause: &WhereClause) -> String {
        self.base_query.replace(WHERE_TOKEN, &clause.sql)
    }
}

/// Runner status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    /// Stopped by the user
    Aborted,
    Complete,
}

/// Outcome of a run, delivered to handlers
#[derive(Debug, Clone)]
pub struct SearchEvent {
    pub status: RunStatus,
    pub data: Option<Arc<DataTable>>,
    pub rows_affected: usize,
    pub elapsed: Duration,
    /// Error text when the query failed
    pub error: Option<String>,
}

impl SearchEvent {
    pub fn message_elapsed_time(&self) -> String {
        message_elapsed_time(self.elapsed)
    }

    pub fn message_rows_affected(&self) -> String {
        message_rows_affected(self.rows_affected)
    }

    pub fn message_rows_affected_elapsed_time(&self) -> String {
        message_rows_affected_elapsed_time(self.rows_affected, self.elapsed)
    }
}

/// `Query Time: 1 minutes and 5.042 seconds` or `Query Time: 5.042 seconds`
pub fn message_elapsed_time(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let minutes = total / 60;
    let seconds = total % 60;
    let millis = elapsed.subsec_millis();
    if minutes > 0 {
        format!(
            "Query Time: {} minutes and {}.{:03} seconds",
            minutes, seconds, millis
        )
    } else {
        format!("Query Time: {}.{:03} seconds", seconds, millis)
    }
}

/// `Rows Returned: 1,234`
pub fn message_rows_affected(rows: usize) -> String {
    let digits = rows.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    format!("Rows Returned: {}", grouped)
}

pub fn message_rows_affected_elapsed_time(rows: usize, elapsed: Duration) -> String {
    format!(
        "{} ... {}",
        message_rows_affected(rows),
        message_elapsed_time(elapsed)
    )
}

/// Callback receiving [`SearchEvent`]s
pub type SearchHandler = Arc<dyn Fn(&SearchEvent) + Send + Sync>;

#[derive(Default)]
struct RunState {
    status: RunStatus,
    run_id: u64,
    data: Option<Arc<DataTable>>,
    elapsed: Duration,
    error: Option<String>,
    started: Option<Instant>,
    cancel: Option<watch::Sender<bool>>,
    cancel_handle: Option<CancelHandle>,
    task: Option<JoinHandle<()>>,
}

impl RunState {
    fn event(&self) -> SearchEvent {
        SearchEvent {
            status: self.status,
            data: self.data.clone(),
            rows_affected: self.data.as_ref().map_or(0, |d| d.len()),
            elapsed: self.elapsed,
            error: self.error.clone(),
        }
    }
}

struct RunnerInner {
    registry: Arc<ConnectionRegistry>,
    template: QueryTemplate,
    is_async: AtomicBool,
    state: Mutex<RunState>,
    handlers: RwLock<Vec<SearchHandler>>,
}

impl RunnerInner {
    fn raise(&self, event: &SearchEvent) {
        let handlers: Vec<SearchHandler> = self.handlers.read().clone();
        for handler in handlers {
            handler(event);
        }
    }

    /// Remember the cancel hook of the run's physical connection. Fails when
    /// the run was aborted before the statement could start.
    fn publish_cancel_handle(&self, run_id: u64, handle: Option<CancelHandle>) -> Result<()> {
        let mut state = self.state.lock();
        if state.run_id != run_id || state.status != RunStatus::Running {
            return Err(DatabaseError::Cancelled);
        }
        state.cancel_handle = handle;
        Ok(())
    }

    async fn query(
        &self,
        run_id: u64,
        conn: &mut DbConnection,
        sql: &str,
        params: Vec<Parameter>,
    ) -> Result<DataTable> {
        conn.open().await?;
        self.publish_cancel_handle(run_id, conn.cancel_handle())?;
        conn.get_data_table(sql, params).await
    }

    async fn execute(
        &self,
        run_id: u64,
        sql: String,
        params: Vec<Parameter>,
        mut cancel: watch::Receiver<bool>,
    ) -> Result<()> {
        let mut conn = match self.registry.detached(&self.template.connection_key).await {
            Ok(conn) => conn,
            Err(e) => return self.complete(run_id, Err(e)),
        };

        let outcome = tokio::select! {
            result = self.query(run_id, &mut conn, &sql, params) => Some(result),
            _ = cancelled(&mut cancel) => None,
        };

        if outcome.is_none() {
            if let Some(handle) = conn.cancel_handle() {
                handle.cancel();
            }
        }
        if let Err(e) = conn.close().await {
            warn!(key = %self.template.connection_key, error = %e, "closing runner connection failed");
        }

        match outcome {
            Some(result) => self.complete(run_id, result),
            None => {
                debug!(run_id, "query run aborted");
                Err(DatabaseError::Cancelled)
            }
        }
    }

    fn complete(&self, run_id: u64, result: Result<DataTable>) -> Result<()> {
        let mut state = self.state.lock();
        if state.run_id != run_id || state.status != RunStatus::Running {
            debug!(run_id, "ignoring completion of a stale run");
            return result.map(|_| ());
        }

        state.status = RunStatus::Complete;
        state.elapsed = state.started.take().map(|s| s.elapsed()).unwrap_or_default();
        state.cancel = None;
        state.cancel_handle = None;
        let outcome = match result {
            Ok(table) => {
                state.data = Some(Arc::new(table));
                state.error = None;
                Ok(())
            }
            Err(e) => {
                warn!(key = %self.template.connection_key, error = %e, "query run failed");
                state.data = None;
                state.error = Some(e.to_string());
                Err(e)
            }
        };
        let event = state.event();
        drop(state);

        info!(
            rows = event.rows_affected,
            elapsed_ms = event.elapsed.as_millis() as u64,
            "query run complete"
        );
        self.raise(&event);
        outcome
    }
}

async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Runs a templated query, inline or on a background task
#[derive(Clone)]
pub struct QueryRunner {
    inner: Arc<RunnerInner>,
}

impl QueryRunner {
    pub fn new(registry: Arc<ConnectionRegistry>, template: QueryTemplate) -> Self {
        Self {
            inner: Arc::new(RunnerInner {
                registry,
                template,
                is_async: AtomicBool::new(false),
                state: Mutex::new(RunState::default()),
                handlers: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn template(&self) -> &QueryTemplate {
        &self.inner.template
    }

    pub fn is_async(&self) -> bool {
        self.inner.is_async.load(Ordering::SeqCst)
    }

    pub fn set_async(&self, is_async: bool) {
        self.inner.is_async.store(is_async, Ordering::SeqCst);
    }

    /// Register a completion/abort handler
    pub fn on_event<F>(&self, handler: F)
    where
        F: Fn(&SearchEvent) + Send + Sync + 'static,
    {
        self.inner.handlers.write().push(Arc::new(handler));
    }

    pub fn status(&self) -> RunStatus {
        self.inner.state.lock().status
    }

    /// Result of the last completed run
    pub fn data(&self) -> Option<Arc<DataTable>> {
        self.inner.state.lock().data.clone()
    }

    pub fn rows_affected(&self) -> usize {
        self.inner.state.lock().data.as_ref().map_or(0, |d| d.len())
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.state.lock().elapsed
    }

    /// Error text of the last failed run
    pub fn error(&self) -> Option<String> {
        self.inner.state.lock().error.clone()
    }

    pub fn message_elapsed_time(&self) -> String {
        message_elapsed_time(self.elapsed())
    }

    pub fn message_rows_affected(&self) -> String {
        message_rows_affected(self.rows_affected())
    }

    pub fn message_rows_affected_elapsed_time(&self) -> String {
        message_rows_affected_elapsed_time(self.rows_affected(), self.elapsed())
    }

    pub fn start_of_day(dt: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
        dt.map(dates::start_of_day)
    }

    pub fn end_of_day(dt: Option<NaiveDateTime>) -> Option<NaiveDateTime> {
        dt.map(dates::end_of_day)
    }

    /// Run the base query without a filter
    pub async fn run(&self) -> Result<()> {
        self.run_where(WhereClause::empty()).await
    }

    /// Run the base query with `clause` in place of `[WHERE]`.
    ///
    /// Does nothing while a run is in flight. In sync mode the call returns
    /// once the query finished, with its error if it failed. In async mode it
    /// returns as soon as the task is spawned.
    pub async fn run_where(&self, clause: WhereClause) -> Result<()> {
        let sql = self.inner.template.render(&clause);
        let (tx, rx) = watch::channel(false);

        let run_id = {
            let mut state = self.inner.state.lock();
            if state.status == RunStatus::Running {
                debug!("query run already in progress");
                return Ok(());
            }
            state.status = RunStatus::Running;
            state.run_id += 1;
            state.data = None;
            state.error = None;
            state.elapsed = Duration::ZERO;
            state.started = Some(Instant::now());
            state.cancel = Some(tx);
            state.cancel_handle = None;
            state.run_id
        };
        debug!(run_id, sql = %sql, "starting query run");

        if !self.is_async() {
            return self.inner.execute(run_id, sql, clause.params, rx).await;
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(async move {
            // Outcome already recorded and published
            let _ = inner.execute(run_id, sql, clause.params, rx).await;
        });
        let mut state = self.inner.state.lock();
        if state.run_id == run_id {
            state.task = Some(task);
        }
        Ok(())
    }

    /// Stop the current run. Returns `false` when nothing was running.
    ///
    /// The database is asked to cancel the statement, the run's connection is
    /// closed by its task, and handlers receive an `Aborted` event without
    /// data.
    pub fn abort(&self) -> bool {
        let mut state = self.inner.state.lock();
        if state.status != RunStatus::Running {
            return false;
        }

        state.status = RunStatus::Aborted;
        state.elapsed = state.started.take().map(|s| s.elapsed()).unwrap_or_default();
        state.data = None;
        state.error = None;
        if let Some(cancel) = state.cancel.take() {
            let _ = cancel.send(true);
        }
        if let Some(handle) = state.cancel_handle.take() {
            handle.cancel();
        }
        let event = state.event();
        drop(state);

        info!(key = %self.inner.template.connection_key, "query run aborted");
        self.inner.raise(&event);
        true
    }

    /// Wait for the background task of the last async run to finish
    pub async fn wait(&self) {
        let task = self.inner.state.lock().task.take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "query task failed to join");
            }
        }
    }

    /// Reset to `Idle`, aborting a run in flight
    pub fn clear(&self) {
        self.abort();
        let mut state = self.inner.state.lock();
        state.status = RunStatus::Idle;
        state.data = None;
        state.error = None;
        state.elapsed = Duration::ZERO;
        state.started = None;
    }
}

impl std::fmt::Debug for QueryRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryRunner")
            .field("template", &self.inner.template)
            .field("async", &self.is_async())
            .field("status", &self.status())
            .finish()
    }
}
