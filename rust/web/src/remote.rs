//! Remote REST KV backends. The target is an Upstash-style HTTP API:
//! `POST {base}/set/{key}?EX={ttl}` with the value as the request body,
//! `POST {base}/get/{key}` answering `{"result": <string|null>}`, bearer
//! token auth. Values are the JSON records from [`crate::store`], one key
//! per session (`session:<id>`) and one per seat assignment (`seats:<id>`),
//! both expiring after the configured TTL.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::seats::SeatAssignment;
use crate::store::{SeatRegistry, Session, StateStore, StoreError};

/// Thin transport over the KV's REST commands, shared by both backends.
#[derive(Clone)]
pub struct KvClient {
    http: Client,
    base_url: String,
    token: String,
    ttl_secs: u64,
}

#[derive(Debug, Deserialize)]
struct KvResult {
    result: Option<String>,
}

impl KvClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, ttl_secs: u64) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            http: Client::new(),
            base_url,
            token: token.into(),
            ttl_secs,
        }
    }

    /// Store `value` under `key` with the configured expiry. The value
    /// travels in the request body, so it never needs path encoding.
    async fn set(&self, key: &str, value: String) -> Result<(), StoreError> {
        let path = format!("set/{key}?EX={}", self.ttl_secs);
        self.command(&path, Some(value)).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.command(&format!("get/{key}"), None).await
    }

    async fn command(&self, path: &str, body: Option<String>) -> Result<Option<String>, StoreError> {
        let url = format!("{}/{}", self.base_url, path);
        let mut request = self.http.post(&url).bearer_auth(&self.token);
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend {
                status: status.as_u16(),
                detail,
            });
        }

        let payload: KvResult = response
            .json()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(payload.result)
    }
}

pub struct RemoteStateStore {
    kv: KvClient,
}

impl RemoteStateStore {
    pub fn new(kv: KvClient) -> Self {
        Self { kv }
    }

    fn key(id: &str) -> String {
        format!("session:{id}")
    }

    fn encode(session: &Session) -> Result<String, StoreError> {
        serde_json::to_string(session).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    fn decode(raw: String) -> Result<Session, StoreError> {
        serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}

#[async_trait]
impl StateStore for RemoteStateStore {
    async fn create(&self, session: Session) -> Result<Session, StoreError> {
        // Get-then-set: the KV has no conditional write. Ids are generated
        // server-side, so colliding creates are a non-issue in practice.
        if let Some(raw) = self.kv.get(&Self::key(&session.id)).await? {
            return Self::decode(raw);
        }
        self.kv
            .set(&Self::key(&session.id), Self::encode(&session)?)
            .await?;
        Ok(session)
    }

    async fn get(&self, id: &str) -> Result<Option<Session>, StoreError> {
        match self.kv.get(&Self::key(id)).await? {
            Some(raw) => Ok(Some(Self::decode(raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        self.kv
            .set(&Self::key(&session.id), Self::encode(session)?)
            .await
    }
}

pub struct RemoteSeatStore {
    kv: KvClient,
}

impl RemoteSeatStore {
    pub fn new(kv: KvClient) -> Self {
        Self { kv }
    }

    fn key(id: &str) -> String {
        format!("seats:{id}")
    }
}

#[async_trait]
impl SeatRegistry for RemoteSeatStore {
    async fn get(&self, id: &str) -> Result<SeatAssignment, StoreError> {
        match self.kv.get(&Self::key(id)).await? {
            Some(raw) => serde_json::from_str(&raw).map_err(|e| StoreError::Corrupt(e.to_string())),
            None => Ok(SeatAssignment::default()),
        }
    }

    async fn put(&self, id: &str, assignment: &SeatAssignment) -> Result<(), StoreError> {
        let raw =
            serde_json::to_string(assignment).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        self.kv.set(&Self::key(id), raw).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::SocketAddr;
    use std::sync::{Arc, Mutex};
    use warp::Filter;

    type Shared = Arc<Mutex<HashMap<String, String>>>;

    /// In-process stand-in for the KV's REST API, backed by a plain map.
    fn spawn_fake_kv() -> (SocketAddr, Shared) {
        let data: Shared = Arc::new(Mutex::new(HashMap::new()));

        let set_data = Arc::clone(&data);
        let set = warp::post()
            .and(warp::path("set"))
            .and(warp::path::param::<String>())
            .and(warp::path::end())
            .and(warp::body::bytes())
            .map(move |key: String, body: warp::hyper::body::Bytes| {
                let value = String::from_utf8_lossy(&body).to_string();
                set_data
                    .lock()
                    .expect("lock fake kv")
                    .insert(key, value);
                warp::reply::json(&serde_json::json!({ "result": "OK" }))
            });

        let get_data = Arc::clone(&data);
        let get = warp::post()
            .and(warp::path("get"))
            .and(warp::path::param::<String>())
            .and(warp::path::end())
            .map(move |key: String| {
                let value = get_data.lock().expect("lock fake kv").get(&key).cloned();
                warp::reply::json(&serde_json::json!({ "result": value }))
            });

        let (addr, server) = warp::serve(set.or(get)).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);
        (addr, data)
    }

    fn client_for(addr: SocketAddr) -> KvClient {
        KvClient::new(format!("http://{addr}/"), "test-token", 60)
    }

    #[tokio::test]
    async fn session_records_round_trip_through_the_kv() {
        let (addr, data) = spawn_fake_kv();
        let store = RemoteStateStore::new(client_for(addr));

        let created = store
            .create(Session::new("remote-1", "startpos"))
            .await
            .expect("create");
        assert_eq!(created.version, 0);

        let raw = data
            .lock()
            .expect("lock fake kv")
            .get("session:remote-1")
            .cloned()
            .expect("stored");
        assert!(raw.contains("\"turnOwner\":\"first\""));

        let mut updated = created.clone();
        updated.version = 3;
        store.save(&updated).await.expect("save");

        let loaded = store.get("remote-1").await.expect("get").expect("present");
        assert_eq!(loaded.version, 3);
        assert!(store.get("remote-9").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn create_returns_the_existing_record() {
        let (addr, _data) = spawn_fake_kv();
        let store = RemoteStateStore::new(client_for(addr));

        store
            .create(Session::new("remote-2", "startpos"))
            .await
            .expect("create");
        let replay = store
            .create(Session::new("remote-2", "a different position"))
            .await
            .expect("create again");
        assert_eq!(replay.position, "startpos");
    }

    #[tokio::test]
    async fn seat_assignments_round_trip_and_default_when_absent() {
        let (addr, _data) = spawn_fake_kv();
        let seats = RemoteSeatStore::new(client_for(addr));

        assert_eq!(
            seats.get("remote-3").await.expect("get"),
            SeatAssignment::default()
        );

        let mut assignment = SeatAssignment::default();
        assignment.bind("alice-token", Some("Alice"));
        seats.put("remote-3", &assignment).await.expect("put");

        let loaded = seats.get("remote-3").await.expect("get");
        assert_eq!(loaded, assignment);
    }

    #[tokio::test]
    async fn backend_failures_carry_the_status() {
        let always_fail = warp::any().map(|| {
            warp::reply::with_status(
                "kv exploded",
                warp::http::StatusCode::INTERNAL_SERVER_ERROR,
            )
        });
        let (addr, server) = warp::serve(always_fail).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let store = RemoteStateStore::new(client_for(addr));
        match store.get("remote-4").await {
            Err(StoreError::Backend { status, detail }) => {
                assert_eq!(status, 500);
                assert_eq!(detail, "kv exploded");
            }
            other => panic!("expected a backend error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_backend_is_a_transport_error() {
        // Bind and immediately drop a listener to get a port nothing serves
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        drop(listener);

        let store = RemoteStateStore::new(client_for(addr));
        assert!(matches!(
            store.get("remote-5").await,
            Err(StoreError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn corrupt_payloads_surface_as_corrupt() {
        let (addr, data) = spawn_fake_kv();
        data.lock()
            .expect("lock fake kv")
            .insert("session:remote-6".to_string(), "{not json".to_string());

        let store = RemoteStateStore::new(client_for(addr));
        assert!(matches!(
            store.get("remote-6").await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[test]
    fn keys_are_namespaced_per_record_kind() {
        assert_eq!(RemoteStateStore::key("abc"), "session:abc");
        assert_eq!(RemoteSeatStore::key("abc"), "seats:abc");
    }

    #[test]
    fn base_url_loses_trailing_slashes() {
        let kv = KvClient::new("https://kv.example.test///", "t", 5);
        assert_eq!(kv.base_url, "https://kv.example.test");
    }
}
