use log::Level;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// One line of the run narrative.
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    pub level: Level,
    pub prefix: Option<String>,
    pub text: String,
}

/// Final destination of reports. Only the sink's drain task ever calls it.
pub trait ReportWriter: Send + 'static {
    fn write(&mut self, report: Report);
}

/// Writes reports through the `log` facade under the `job` target.
pub struct LogWriter;

impl ReportWriter for LogWriter {
    fn write(&mut self, report: Report) {
        match report.prefix {
            Some(prefix) => log::log!(target: "job", report.level, "{} {}", prefix, report.text),
            None => log::log!(target: "job", report.level, "{}", report.text),
        }
    }
}

/// Clonable handle that listeners and the orchestrator write to concurrently. Reports are
/// queued and drained in order by a single task owning the `ReportWriter`.
#[derive(Clone)]
pub struct ReportSink {
    sender: UnboundedSender<Report>,
}

impl ReportSink {
    /// Starts the drain task. It finishes, handing the writer back, once every clone of the
    /// returned sink has been dropped.
    pub fn spawn<W: ReportWriter>(writer: W) -> (ReportSink, JoinHandle<W>) {
        let (sender, receiver) = unbounded_channel();
        let drain = tokio::spawn(drain(receiver, writer));

        (ReportSink { sender }, drain)
    }

    pub fn write(&self, level: Level, prefix: Option<&str>, text: impl Into<String>) {
        let report = Report {
            level,
            prefix: prefix.map(str::to_string),
            text: text.into(),
        };

        // only fails once the drain task is gone, i.e. during runtime shutdown
        if self.sender.send(report).is_err() {
            log::warn!("report sink is closed, dropping report");
        }
    }

    pub fn debug(&self, text: impl Into<String>) {
        self.write(Level::Debug, None, text);
    }

    pub fn info(&self, text: impl Into<String>) {
        self.write(Level::Info, None, text);
    }

    pub fn warn(&self, text: impl Into<String>) {
        self.write(Level::Warn, None, text);
    }
}

async fn drain<W: ReportWriter>(mut receiver: UnboundedReceiver<Report>, mut writer: W) -> W {
    while let Some(report) = receiver.recv().await {
        writer.write(report);
    }

    writer
}
