//! Firestore backend, over the REST v1 API.
//!
//! Records are documents in the top-level `datas` collection; the record id
//! is the document id Firestore assigns on create. Documents carry only the
//! three record fields, so Firestore records have no timestamps.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{Backend, COLLECTION, RecordStore, StoreError};
use crate::config::FirestoreConfig;
use crate::record::{NewRecord, Record, RecordPatch};

mod auth;
pub mod value;

pub use auth::Credentials;
use auth::TokenSource;
use value::{FsValue, decode_fields};

const PRODUCTION_URL: &str = "https://firestore.googleapis.com/v1";
const EMULATOR_TOKEN: &str = "owner";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    name: String,
    #[serde(default)]
    fields: BTreeMap<String, FsValue>,
}

#[derive(Debug, Serialize)]
struct DocumentWrite {
    fields: BTreeMap<String, FsValue>,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    document: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl Document {
    fn into_record(self) -> Record {
        let id = self.name.rsplit('/').next().unwrap_or_default().to_owned();
        let mut fields = decode_fields(self.fields);
        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => String::new(),
        };
        let data = fields.remove("data").unwrap_or(Value::Null);
        let metadata = match fields.remove("metadata") {
            None | Some(Value::Null) => json!({}),
            Some(metadata) => metadata,
        };
        Record { id, kind, data, metadata, created_at: None, updated_at: None }
    }
}

pub struct FirestoreStore {
    http: reqwest::Client,
    documents: Url,
    tokens: TokenSource,
}

impl FirestoreStore {
    /// Targets the emulator when one is configured, production otherwise.
    pub fn new(config: &FirestoreConfig) -> Result<Self, StoreError> {
        let (base, credentials) = match (&config.emulator_host, &config.service_account) {
            (Some(host), _) => (
                format!("http://{host}/v1"),
                Credentials::Static(EMULATOR_TOKEN.into()),
            ),
            (None, Some(key)) => (PRODUCTION_URL.to_owned(), Credentials::ServiceAccount(key.clone())),
            (None, None) => {
                return Err(StoreError::Backend(
                    "firestore needs either an emulator host or service account credentials".into(),
                ));
            }
        };
        Self::with_base_url(&base, &config.project_id, credentials)
    }

    /// `base` is the API root including the version, e.g.
    /// `https://firestore.googleapis.com/v1`.
    pub fn with_base_url(base: &str, project_id: &str, credentials: Credentials) -> Result<Self, StoreError> {
        let mut documents = Url::parse(base)
            .map_err(|e| StoreError::Backend(format!("invalid firestore url `{base}`: {e}")))?;
        documents
            .path_segments_mut()
            .map_err(|()| StoreError::Backend(format!("invalid firestore url `{base}`")))?
            .pop_if_empty()
            .extend(["projects", project_id, "databases", "(default)", "documents"]);

        let http = reqwest::Client::new();
        let tokens = TokenSource::new(http.clone(), credentials);
        Ok(Self { http, documents, tokens })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.documents.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.extend(segments);
        }
        url
    }

    fn collection_url(&self) -> Url {
        self.url(&[COLLECTION])
    }

    fn document_url(&self, id: &str) -> Url {
        self.url(&[COLLECTION, id])
    }

    fn run_query_url(&self) -> Url {
        let mut url = self.documents.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop().push("documents:runQuery");
        }
        url
    }

    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder, StoreError> {
        let token = self.tokens.token().await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    /// Sends `req`; `404` becomes `Ok(None)`, any other failure status an
    /// error carrying Firestore's message.
    async fn send(req: RequestBuilder) -> Result<Option<reqwest::Response>, StoreError> {
        let res = req.send().await?;
        let status = res.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if status.is_success() {
            return Ok(Some(res));
        }
        let body = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|e| e.error.message)
            .unwrap_or(body);
        Err(StoreError::Backend(format!("firestore returned {status}: {message}")))
    }

    async fn fetch(&self, id: &str) -> Result<Option<Record>, StoreError> {
        if !is_document_id(id) {
            return Ok(None);
        }
        let req = self.request(Method::GET, self.document_url(id)).await?;
        match Self::send(req).await? {
            Some(res) => Ok(Some(res.json::<Document>().await?.into_record())),
            None => Ok(None),
        }
    }
}

/// `.` and `..` are dropped from URL paths, so they would address the
/// collection rather than a document.
fn is_document_id(id: &str) -> bool {
    !matches!(id, "" | "." | "..")
}

fn missing(what: &str) -> StoreError {
    StoreError::Backend(format!("firestore {what} returned no document"))
}

#[async_trait]
impl RecordStore for FirestoreStore {
    async fn create(&self, record: NewRecord) -> Result<Record, StoreError> {
        let fields = record.validate()?;
        let mut write = BTreeMap::new();
        write.insert("type".to_owned(), FsValue::StringValue(fields.kind));
        write.insert("data".to_owned(), FsValue::from(&fields.data));
        write.insert("metadata".to_owned(), FsValue::from(&fields.metadata));

        let req = self
            .request(Method::POST, self.collection_url())
            .await?
            .json(&DocumentWrite { fields: write });
        let res = Self::send(req).await?.ok_or_else(|| missing("create"))?;
        let record = res.json::<Document>().await?.into_record();
        debug!(id = %record.id, "created document");
        Ok(record)
    }

    async fn list_by_type(&self, kind: Option<&str>) -> Result<Vec<Record>, StoreError> {
        let mut query = json!({ "from": [{ "collectionId": COLLECTION }] });
        if let Some(kind) = kind {
            query["where"] = json!({
                "fieldFilter": {
                    "field": { "fieldPath": "type" },
                    "op": "EQUAL",
                    "value": { "stringValue": kind },
                }
            });
        }

        let req = self
            .request(Method::POST, self.run_query_url())
            .await?
            .json(&json!({ "structuredQuery": query }));
        let res = Self::send(req).await?.ok_or_else(|| missing("query"))?;
        let results: Vec<QueryResult> = res.json().await?;
        Ok(results
            .into_iter()
            .filter_map(|r| r.document)
            .map(Document::into_record)
            .collect())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Record>, StoreError> {
        self.fetch(id).await
    }

    async fn update_by_id(&self, id: &str, patch: RecordPatch) -> Result<Option<Record>, StoreError> {
        let update = patch.validate()?;
        let Some(existing) = self.fetch(id).await? else { return Ok(None) };
        if update.is_empty() {
            return Ok(Some(existing));
        }

        let mut url = self.document_url(id);
        {
            let mut query = url.query_pairs_mut();
            for field in update.field_names() {
                query.append_pair("updateMask.fieldPaths", field);
            }
            query.append_pair("currentDocument.exists", "true");
        }

        let mut write = BTreeMap::new();
        if let Some(kind) = update.kind {
            write.insert("type".to_owned(), FsValue::StringValue(kind));
        }
        if let Some(data) = &update.data {
            write.insert("data".to_owned(), FsValue::from(data));
        }
        if let Some(metadata) = &update.metadata {
            write.insert("metadata".to_owned(), FsValue::from(metadata));
        }

        let req = self
            .request(Method::PATCH, url)
            .await?
            .json(&DocumentWrite { fields: write });
        match Self::send(req).await? {
            Some(res) => Ok(Some(res.json::<Document>().await?.into_record())),
            None => Ok(None),
        }
    }

    async fn delete_by_id(&self, id: &str) -> Result<Option<Record>, StoreError> {
        let Some(existing) = self.fetch(id).await? else { return Ok(None) };
        let req = self.request(Method::DELETE, self.document_url(id)).await?;
        Ok(Self::send(req).await?.map(|_| existing))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut url = self.collection_url();
        url.query_pairs_mut().append_pair("pageSize", "1");
        let req = self.request(Method::GET, url).await?;
        Self::send(req).await?;
        Ok(())
    }

    fn backend(&self) -> Option<Backend> {
        Some(Backend::Firestore)
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const ROOT: &str = "/v1/projects/demo/databases/(default)/documents";

    fn doc_path(id: &str) -> String {
        format!("{ROOT}/datas/{id}")
    }

    fn stored(id: &str, kind: &str, data: Value) -> Value {
        json!({
            "name": format!("projects/demo/databases/(default)/documents/datas/{id}"),
            "fields": {
                "type": { "stringValue": kind },
                "data": serde_json::to_value(FsValue::from(&data)).unwrap(),
                "metadata": { "mapValue": {} }
            },
            "createTime": "2024-01-01T00:00:00Z",
            "updateTime": "2024-01-01T00:00:00Z"
        })
    }

    async fn store(server: &MockServer) -> FirestoreStore {
        let base = format!("{}/v1", server.uri());
        FirestoreStore::with_base_url(&base, "demo", Credentials::Static("owner".into())).unwrap()
    }

    #[tokio::test]
    async fn create_posts_typed_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{ROOT}/datas")))
            .and(header("authorization", "Bearer owner"))
            .and(body_json(json!({ "fields": {
                "type": { "stringValue": "user" },
                "data": { "mapValue": { "fields": { "name": { "stringValue": "Bob" } } } },
                "metadata": { "mapValue": { "fields": {} } }
            } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(stored("abc", "user", json!({ "name": "Bob" }))))
            .expect(1)
            .mount(&server)
            .await;

        let record = store(&server)
            .await
            .create(NewRecord::new("user", json!({ "name": "Bob" })))
            .await
            .unwrap();

        assert_eq!(record.id, "abc");
        assert_eq!(record.kind, "user");
        assert_eq!(record.data, json!({ "name": "Bob" }));
        assert_eq!(record.metadata, json!({}));
        assert_eq!(record.created_at, None);
    }

    #[tokio::test]
    async fn create_validates_before_calling_firestore() {
        let server = MockServer::start().await;
        let err = store(&server).await.create(NewRecord::default()).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_missing_document_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(doc_path("gone")))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "error": { "code": 404, "message": "Document not found", "status": "NOT_FOUND" }
            })))
            .mount(&server)
            .await;

        assert_eq!(store(&server).await.get_by_id("gone").await.unwrap(), None);
    }

    #[tokio::test]
    async fn server_errors_carry_firestore_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(doc_path("x")))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "error": { "code": 403, "message": "Missing or insufficient permissions.", "status": "PERMISSION_DENIED" }
            })))
            .mount(&server)
            .await;

        let err = store(&server).await.get_by_id("x").await.unwrap_err();
        assert!(matches!(&err, StoreError::Backend(m) if m.contains("Missing or insufficient permissions.")));
    }

    #[tokio::test]
    async fn list_filters_by_type_in_the_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{ROOT}:runQuery")))
            .and(body_json(json!({ "structuredQuery": {
                "from": [{ "collectionId": "datas" }],
                "where": { "fieldFilter": {
                    "field": { "fieldPath": "type" },
                    "op": "EQUAL",
                    "value": { "stringValue": "___TEST___" }
                } }
            } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "document": stored("a", "___TEST___", json!(1)), "readTime": "2024-01-01T00:00:00Z" },
                { "document": stored("b", "___TEST___", json!(2)), "readTime": "2024-01-01T00:00:00Z" }
            ])))
            .mount(&server)
            .await;

        let records = store(&server).await.list_by_type(Some("___TEST___")).await.unwrap();
        let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
    }

    #[tokio::test]
    async fn empty_query_result_is_empty_list() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(format!("{ROOT}:runQuery")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                { "readTime": "2024-01-01T00:00:00Z" }
            ])))
            .mount(&server)
            .await;

        assert!(store(&server).await.list_by_type(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_masks_supplied_fields_only() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(doc_path("abc")))
            .respond_with(ResponseTemplate::new(200).set_body_json(stored("abc", "user", json!({ "name": "Bob" }))))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .and(path(doc_path("abc")))
            .and(query_param("updateMask.fieldPaths", "data"))
            .and(query_param("currentDocument.exists", "true"))
            .and(body_json(json!({ "fields": {
                "data": { "mapValue": { "fields": { "name": { "stringValue": "Kevin" } } } }
            } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(stored("abc", "user", json!({ "name": "Kevin" }))))
            .expect(1)
            .mount(&server)
            .await;

        let patch = RecordPatch { data: Some(json!({ "name": "Kevin" })), ..Default::default() };
        let record = store(&server).await.update_by_id("abc", patch).await.unwrap().unwrap();
        assert_eq!(record.kind, "user");
        assert_eq!(record.data, json!({ "name": "Kevin" }));
    }

    #[tokio::test]
    async fn update_missing_document_does_not_write() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(doc_path("gone")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let patch = RecordPatch { data: Some(json!(1)), ..Default::default() };
        assert_eq!(store(&server).await.update_by_id("gone", patch).await.unwrap(), None);
    }

    #[tokio::test]
    async fn delete_returns_the_snapshot_taken_before_deleting() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(doc_path("abc")))
            .respond_with(ResponseTemplate::new(200).set_body_json(stored("abc", "user", json!(7))))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path(doc_path("abc")))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let deleted = store(&server).await.delete_by_id("abc").await.unwrap().unwrap();
        assert_eq!(deleted.id, "abc");
        assert_eq!(deleted.data, json!(7));
    }

    #[tokio::test]
    async fn dot_segment_ids_are_not_found_without_a_request() {
        let server = MockServer::start().await;
        let store = store(&server).await;

        for id in ["", ".", ".."] {
            assert_eq!(store.get_by_id(id).await.unwrap(), None);
            assert_eq!(store.delete_by_id(id).await.unwrap(), None);
            let patch = RecordPatch { data: Some(json!(1)), ..Default::default() };
            assert_eq!(store.update_by_id(id, patch).await.unwrap(), None);
        }
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn document_ids_are_path_encoded() {
        let store = FirestoreStore::with_base_url(PRODUCTION_URL, "demo", Credentials::Static("t".into())).unwrap();
        assert_eq!(
            store.document_url("a b").as_str(),
            "https://firestore.googleapis.com/v1/projects/demo/databases/(default)/documents/datas/a%20b"
        );
        assert_eq!(
            store.run_query_url().as_str(),
            "https://firestore.googleapis.com/v1/projects/demo/databases/(default)/documents:runQuery"
        );
    }
}
