use std::marker::PhantomData;
use std::sync::{Arc, Mutex, OnceLock};
use tracing::Level;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{Layer, Registry};

/// Structured log entry for testing and analysis
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: Vec<(String, String)>,
}

/// Captures log entries for verification in tests
#[derive(Debug, Clone)]
pub struct LogCapture {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl Default for LogCapture {
    fn default() -> Self {
        Self::new()
    }
}

impl LogCapture {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn into_layer<S>(self) -> CaptureLayer<S>
    where
        S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    {
        CaptureLayer {
            capture: self,
            _phantom: PhantomData,
        }
    }
}

pub struct CaptureLayer<S> {
    capture: LogCapture,
    _phantom: PhantomData<S>,
}

impl<S> Layer<S> for CaptureLayer<S>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let entry = LogEntry {
            level: *metadata.level(),
            target: metadata.target().to_string(),
            message: visitor.message.unwrap_or_default(),
            fields: visitor.fields,
        };

        self.capture.entries.lock().unwrap().push(entry);
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: Option<String>,
    fields: Vec<(String, String)>,
}

impl tracing::field::Visit for FieldVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        let value_str = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(value_str);
        } else {
            self.fields.push((field.name().to_string(), value_str));
        }
    }
}

/// Initialize logging for the application
pub fn init_logging() {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,parlor_web=debug"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set global default subscriber");
}

/// Initialize test logging with a shared capture
pub fn init_test_logging() -> LogCapture {
    static CAPTURE: OnceLock<LogCapture> = OnceLock::new();
    static REGISTERED: OnceLock<()> = OnceLock::new();

    let capture = CAPTURE.get_or_init(LogCapture::new);

    REGISTERED.get_or_init(|| {
        let layer = capture.clone().into_layer::<Registry>();
        let registry = Registry::default().with(layer);
        tracing::subscriber::set_global_default(registry)
            .expect("Failed to set global default test subscriber");
    });

    capture.clear();
    capture.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, error, info, warn};

    #[test]
    fn test_log_capture_records_levels_in_order() {
        let capture = LogCapture::new();
        let layer = capture.clone().into_layer::<Registry>();
        let registry = Registry::default().with(layer);

        tracing::subscriber::with_default(registry, || {
            debug!("binding updated");
            info!("move applied");
            warn!("expiry sweep failed");
            error!("backend unreachable");
        });

        let entries = capture.entries();
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].level, Level::DEBUG);
        assert_eq!(entries[1].level, Level::INFO);
        assert!(entries[1].message.contains("move applied"));
        assert_eq!(entries[2].level, Level::WARN);
        assert_eq!(entries[3].level, Level::ERROR);
    }

    #[test]
    fn test_log_capture_records_fields() {
        let capture = LogCapture::new();
        let layer = capture.clone().into_layer::<Registry>();
        let registry = Registry::default().with(layer);

        tracing::subscriber::with_default(registry, || {
            info!(session_id = "abc123", version = 4, "move applied");
        });

        let entries = capture.entries();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].message.contains("move applied"));
        assert!(entries[0]
            .fields
            .iter()
            .any(|(k, v)| k == "session_id" && v.contains("abc123")));
        assert!(entries[0]
            .fields
            .iter()
            .any(|(k, v)| k == "version" && v.contains('4')));
    }

    #[test]
    fn test_log_capture_clear() {
        let capture = LogCapture::new();

        let layer = capture.clone().into_layer::<Registry>();
        let registry = Registry::default().with(layer);
        tracing::subscriber::with_default(registry, || {
            info!("first message");
        });
        assert_eq!(capture.entries().len(), 1);

        capture.clear();
        assert_eq!(capture.entries().len(), 0);
    }
}
