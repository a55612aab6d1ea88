//! HTTP session synchronization for two-player turn games.
//!
//! Stateless polling over warp: clients create a session, poll its view
//! with `ETag`/`If-None-Match`, and submit moves guarded by an expected
//! version. Seats bind to opaque identities on first contact. Storage is
//! either process-local or an Upstash-style REST KV; with the remote
//! backend several processes can serve the same sessions, where two
//! writers racing a whole record resolve as last writer wins.

pub mod errors;
pub mod etag;
pub mod handlers;
pub mod logging;
pub mod middleware;
pub mod remote;
pub mod rules;
pub mod seats;
pub mod server;
pub mod session;
pub mod settings;
pub mod store;

pub use errors::{ErrorResponse, ErrorSeverity, IntoErrorResponse};
pub use logging::{LogCapture, LogEntry, init_logging, init_test_logging};
pub use middleware::with_request_logging;
pub use remote::{KvClient, RemoteSeatStore, RemoteStateStore};
pub use rules::{ChessRules, MoveApplied, PositionReport, Rules, RulesError, SessionStatus, Side};
pub use seats::{BindOutcome, SeatAssignment, SeatHolder, SeatRole};
pub use server::{AppContext, ServerConfig, ServerError, ServerHandle, WebServer};
pub use session::{
    MoveCommand, MoveOutcome, MoveRejection, ReadOutcome, SessionError, SessionService,
    SessionView, ViewBundle, Viewer,
};
pub use settings::{AppSettings, StorageBackend};
pub use store::{
    MemorySeatStore, MemoryStateStore, MoveRecord, SeatRegistry, Session, SessionId, StateStore,
    StoreError,
};

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::layer::SubscriberExt;

    #[tokio::test]
    async fn context_provides_a_working_service() {
        let ctx = AppContext::new_for_tests();

        let sessions = ctx.sessions();
        let bundle = sessions.create().await.expect("create session");

        assert_eq!(bundle.view.version, 0);
        assert_eq!(ctx.config().port(), 0);
    }

    #[tokio::test]
    async fn remote_settings_build_a_kv_backed_context() {
        let capture = LogCapture::new();
        let layer = capture.clone().into_layer::<tracing_subscriber::Registry>();
        let registry = tracing_subscriber::Registry::default().with(layer);

        let ctx = tracing::subscriber::with_default(registry, || {
            let settings = AppSettings::resolve(
                Some("https://kv.example.test".into()),
                Some("secret-token".into()),
                Some(600),
            );
            AppContext::new(ServerConfig::for_tests(), settings)
        });

        assert_eq!(ctx.config().port(), 0);
        let picked_remote = capture.entries().iter().any(|entry| {
            entry
                .fields
                .iter()
                .any(|(key, value)| key == "backend" && value.contains("remote_kv"))
        });
        assert!(picked_remote, "expected the remote backend to be selected");
    }
}
