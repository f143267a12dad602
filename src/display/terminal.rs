//! Line-oriented terminal renderer.
//!
//! Every callback becomes one timestamped line; streamed translation
//! fragments are written inline on a single line that the next event
//! terminates.  Completed pairs move from the active table into a bounded
//! history, printed by [`TerminalDisplay::render_summary`].

use std::collections::{BTreeMap, VecDeque};
use std::io::Write;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Local};

use super::{DisplaySink, UnattachedText};
use crate::session::{TaskId, TaskStatus, Trigger};

/// A finished source/translation pair kept in the history.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedResult {
    pub id: TaskId,
    pub source: String,
    pub translation: String,
    pub completed_at: DateTime<Local>,
}

#[derive(Debug)]
struct ActiveTask {
    trigger: Trigger,
    status: TaskStatus,
    source: Option<String>,
}

struct TerminalState<W> {
    out: W,
    active: BTreeMap<TaskId, ActiveTask>,
    history: VecDeque<CompletedResult>,
    history_len: usize,
    /// A delta line is open and needs a newline before the next event.
    mid_line: bool,
}

impl<W: Write> TerminalState<W> {
    fn line(&mut self, text: &str) {
        self.end_delta_line();
        let stamp = Local::now().format("%H:%M:%S");
        if let Err(e) = writeln!(self.out, "[{stamp}] {text}") {
            log::debug!("display: write failed: {e}");
        }
        let _ = self.out.flush();
    }

    fn end_delta_line(&mut self) {
        if self.mid_line {
            let _ = writeln!(self.out);
            self.mid_line = false;
        }
    }
}

pub struct TerminalDisplay<W: Write + Send> {
    state: Mutex<TerminalState<W>>,
}

impl TerminalDisplay<std::io::Stdout> {
    pub fn stdout(history_len: usize) -> Self {
        Self::new(std::io::stdout(), history_len)
    }
}

impl<W: Write + Send> TerminalDisplay<W> {
    pub fn new(out: W, history_len: usize) -> Self {
        Self {
            state: Mutex::new(TerminalState {
                out,
                active: BTreeMap::new(),
                history: VecDeque::new(),
                history_len: history_len.max(1),
                mid_line: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TerminalState<W>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recent results, oldest first.
    pub fn history(&self) -> Vec<CompletedResult> {
        self.lock().history.iter().cloned().collect()
    }

    /// Ids of tasks shown as in progress.
    pub fn active_ids(&self) -> Vec<TaskId> {
        self.lock().active.keys().copied().collect()
    }

    /// Print the active table followed by the result history.
    pub fn render_summary(&self) {
        let mut st = self.lock();
        st.end_delta_line();

        let mut text = String::new();
        if !st.active.is_empty() {
            text.push_str("── in progress ──\n");
            for (id, task) in &st.active {
                text.push_str(&format!(
                    "  {:>5}  {:<22} {:<14} {}\n",
                    id.to_string(),
                    task.status.label(),
                    task.trigger.label(),
                    task.source.as_deref().unwrap_or("")
                ));
            }
        }
        text.push_str(&format!("── last {} results ──\n", st.history.len()));
        for r in &st.history {
            text.push_str(&format!(
                "  {:>5}  {}  {} → {}\n",
                r.id.to_string(),
                r.completed_at.format("%H:%M:%S"),
                r.source,
                r.translation
            ));
        }

        if let Err(e) = st.out.write_all(text.as_bytes()) {
            log::debug!("display: write failed: {e}");
        }
        let _ = st.out.flush();
    }

    /// Consume the display and return the writer.
    pub fn into_inner(self) -> W {
        self.state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .out
    }
}

impl<W: Write + Send> DisplaySink for TerminalDisplay<W> {
    fn add_task(&self, id: TaskId, trigger: Trigger) {
        let mut st = self.lock();
        st.active.insert(
            id,
            ActiveTask {
                trigger,
                status: TaskStatus::Created,
                source: None,
            },
        );
        st.line(&format!("{id} started ({})", trigger.label()));
    }

    fn update_task_status(&self, id: TaskId, status: TaskStatus) {
        let mut st = self.lock();
        if let Some(task) = st.active.get_mut(&id) {
            task.status = status;
        }
        st.line(&format!("{id} {}", status.label()));
    }

    fn set_task_source(&self, id: TaskId, source: &str) {
        let mut st = self.lock();
        if let Some(task) = st.active.get_mut(&id) {
            task.source = Some(source.to_owned());
        }
        st.line(&format!("{id} heard: {source}"));
    }

    fn complete_task(&self, id: TaskId, source: &str, translation: &str) {
        let mut st = self.lock();
        st.active.remove(&id);
        st.history.push_back(CompletedResult {
            id,
            source: source.to_owned(),
            translation: translation.to_owned(),
            completed_at: Local::now(),
        });
        while st.history.len() > st.history_len {
            st.history.pop_front();
        }
        st.line(&format!("{id} {source} → {translation}"));
    }

    fn evict_task(&self, id: TaskId) {
        let mut st = self.lock();
        if let Some(task) = st.active.remove(&id) {
            st.line(&format!("{id} dropped ({})", task.status.label()));
        }
    }

    fn speech_started(&self) {
        self.lock().line("listening…");
    }

    fn translation_delta(&self, delta: &str) {
        let mut st = self.lock();
        if !st.mid_line {
            let _ = write!(st.out, "    … ");
            st.mid_line = true;
        }
        let _ = write!(st.out, "{delta}");
        let _ = st.out.flush();
    }

    fn show_unattached(&self, kind: UnattachedText, text: &str) {
        self.lock()
            .line(&format!("(unattached {}) {text}", kind.label()));
    }

    fn show_error(&self, message: &str) {
        self.lock().line(&format!("error: {message}"));
    }
}
