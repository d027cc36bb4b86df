//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::io;
use std::sync::Arc;

use horizon_listmodel::ListModel;
use parking_lot::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::MakeWriter;

/// A log sink that keeps everything written to it.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock()).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Runs `f` with a subscriber on the current thread, returning its result
/// and every line logged under the engine's targets.
pub fn with_captured_logs<R>(f: impl FnOnce() -> R) -> (R, String) {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("horizon_listmodel=info"))
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    let result = tracing::subscriber::with_default(subscriber, f);
    (result, logs.contents())
}

/// Event log filled by [`record_signals`].
pub type SignalLog = Arc<Mutex<Vec<String>>>;

/// Records every structural and data signal of `model` as a short string.
pub fn record_signals(model: &ListModel) -> SignalLog {
    let log: SignalLog = Arc::new(Mutex::new(Vec::new()));
    let signals = model.signals();

    let l = log.clone();
    signals
        .rows_inserted
        .connect(move |(first, last)| l.lock().push(format!("inserted {first}-{last}")));
    let l = log.clone();
    signals
        .rows_removed
        .connect(move |(first, last)| l.lock().push(format!("removed {first}-{last}")));
    let l = log.clone();
    signals
        .rows_moved
        .connect(move |(from, to, n)| l.lock().push(format!("moved {from}->{to} x{n}")));
    let l = log.clone();
    signals
        .data_changed
        .connect(move |(first, last, roles)| l.lock().push(format!("changed {first}-{last} {roles:?}")));
    let l = log.clone();
    signals.count_changed.connect(move |_| l.lock().push("count".into()));
    log
}
