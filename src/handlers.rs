//! Data resource handlers.
//!
//! Each handler turns one request into one store call and wraps the result
//! in the JSON envelope every data endpoint answers with:
//!
//! ```text
//! { "message": "Data Creation: SUCCESS 🚀", "data": { ... } }
//! { "message": "Data Retrieval By Id: FAILED 🚨", "data": null }
//! { "message": "Data Update By Id: FAILED 🚨", "error": "..." }
//! ```

use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{error, info, warn};

use crate::record::{NewRecord, RecordPatch};
use crate::request::Request;
use crate::response::Response;
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Create,
    ListByType,
    GetById,
    UpdateById,
    DeleteById,
}

impl Operation {
    fn label(self) -> &'static str {
        match self {
            Operation::Create => "Data Creation",
            Operation::ListByType => "Data Retrieval By Type",
            Operation::GetById => "Data Retrieval By Id",
            Operation::UpdateById => "Data Update By Id",
            Operation::DeleteById => "Data Deletion By Id",
        }
    }

    /// Reported when the store error carries no message of its own.
    fn fallback_error(self) -> &'static str {
        match self {
            Operation::Create => "Unable to create data 😢",
            Operation::ListByType => "Unable to get data by type 😢",
            Operation::GetById => "Unable to get data by id 😢",
            Operation::UpdateById => "Unable to update data by id 😢",
            Operation::DeleteById => "Unable to delete data by id 😢",
        }
    }

    fn failure_status(self) -> StatusCode {
        match self {
            Operation::Create => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn succeeded<T: Serialize>(self, status: StatusCode, data: &T) -> Response {
        info!(operation = self.label(), "request succeeded");
        Response::builder().status(status).json(&Outcome {
            message: format!("{}: SUCCESS 🚀", self.label()),
            data: Some(data),
        })
    }

    fn not_found(self, id: &str) -> Response {
        warn!(operation = self.label(), id, "no record with this id");
        Response::builder()
            .status(StatusCode::NOT_FOUND)
            .json(&Outcome::<()> {
                message: format!("{}: FAILED 🚨", self.label()),
                data: None,
            })
    }

    fn failed(self, err: StoreError) -> Response {
        error!(operation = self.label(), error = %err, "request failed");
        let message = err.to_string();
        Response::builder().status(self.failure_status()).json(&Failure {
            message: format!("{}: FAILED 🚨", self.label()),
            error: if message.is_empty() { self.fallback_error().to_owned() } else { message },
        })
    }
}

#[derive(Serialize)]
struct Outcome<'a, T> {
    message: String,
    data: Option<&'a T>,
}

#[derive(Serialize)]
struct Failure {
    message: String,
    error: String,
}

/// The five data endpoints, sharing one store.
///
/// Methods take `Arc<Self>` so they can be registered with
/// [`bind`](crate::bind) directly.
pub struct DataHandlers {
    store: Arc<dyn RecordStore>,
}

impl DataHandlers {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// `POST /api/v1/data`
    pub async fn create(self: Arc<Self>, req: Request) -> Response {
        let op = Operation::Create;
        let record = match parse_body::<NewRecord>(&req) {
            Ok(record) => record,
            Err(e) => return op.failed(e),
        };
        match self.store.create(record).await {
            Ok(created) => op.succeeded(StatusCode::CREATED, &created),
            Err(e) => op.failed(e),
        }
    }

    /// `GET /api/v1/data?type=`. An absent or empty `type` lists everything.
    pub async fn list(self: Arc<Self>, req: Request) -> Response {
        let op = Operation::ListByType;
        let kind = req.query_param("type").filter(|kind| !kind.is_empty());
        match self.store.list_by_type(kind.as_deref()).await {
            Ok(records) => op.succeeded(StatusCode::OK, &records),
            Err(e) => op.failed(e),
        }
    }

    /// `GET /api/v1/data/{id}`
    pub async fn get(self: Arc<Self>, req: Request) -> Response {
        let op = Operation::GetById;
        let id = req.param("id").unwrap_or_default();
        match self.store.get_by_id(id).await {
            Ok(Some(record)) => op.succeeded(StatusCode::OK, &record),
            Ok(None) => op.not_found(id),
            Err(e) => op.failed(e),
        }
    }

    /// `PATCH /api/v1/data/{id}`
    pub async fn update(self: Arc<Self>, req: Request) -> Response {
        let op = Operation::UpdateById;
        let id = req.param("id").unwrap_or_default();
        let patch = match parse_body::<RecordPatch>(&req) {
            Ok(patch) => patch,
            Err(e) => return op.failed(e),
        };
        match self.store.update_by_id(id, patch).await {
            Ok(Some(record)) => op.succeeded(StatusCode::OK, &record),
            Ok(None) => op.not_found(id),
            Err(e) => op.failed(e),
        }
    }

    /// `DELETE /api/v1/data/{id}`
    pub async fn delete(self: Arc<Self>, req: Request) -> Response {
        let op = Operation::DeleteById;
        let id = req.param("id").unwrap_or_default();
        match self.store.delete_by_id(id).await {
            Ok(Some(record)) => op.succeeded(StatusCode::OK, &record),
            Ok(None) => op.not_found(id),
            Err(e) => op.failed(e),
        }
    }
}

/// An empty body reads as `{}`.
fn parse_body<T: DeserializeOwned + Default>(req: &Request) -> Result<T, StoreError> {
    if req.body().iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(req.body())
        .map_err(|e| StoreError::Validation(format!("invalid JSON body: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use http::{HeaderMap, Method};
    use serde_json::{Value, json};

    use super::*;
    use crate::record::Record;
    use crate::store::{Backend, MemoryStore};

    /// Fails every call with the given message.
    struct BrokenStore(&'static str);

    #[async_trait]
    impl RecordStore for BrokenStore {
        async fn create(&self, _: NewRecord) -> Result<Record, StoreError> {
            Err(StoreError::Backend(self.0.into()))
        }
        async fn list_by_type(&self, _: Option<&str>) -> Result<Vec<Record>, StoreError> {
            Err(StoreError::Backend(self.0.into()))
        }
        async fn get_by_id(&self, _: &str) -> Result<Option<Record>, StoreError> {
            Err(StoreError::Backend(self.0.into()))
        }
        async fn update_by_id(&self, _: &str, _: RecordPatch) -> Result<Option<Record>, StoreError> {
            Err(StoreError::Backend(self.0.into()))
        }
        async fn delete_by_id(&self, _: &str) -> Result<Option<Record>, StoreError> {
            Err(StoreError::Backend(self.0.into()))
        }
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Backend(self.0.into()))
        }
        fn backend(&self) -> Option<Backend> {
            None
        }
    }

    fn handlers(store: impl RecordStore + 'static) -> Arc<DataHandlers> {
        Arc::new(DataHandlers::new(Arc::new(store)))
    }

    fn request(method: Method, uri: &str, id: Option<&str>, body: &str) -> Request {
        let mut req = Request::new(
            method,
            uri.parse().unwrap(),
            HeaderMap::new(),
            body.to_owned(),
            "127.0.0.1:4000".parse().unwrap(),
        );
        if let Some(id) = id {
            req.set_params(HashMap::from([("id".to_owned(), id.to_owned())]));
        }
        req
    }

    fn body(res: &Response) -> Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[tokio::test]
    async fn create_answers_201_with_the_record() {
        let h = handlers(MemoryStore::new());
        let res = h
            .create(request(Method::POST, "/api/v1/data", None, r#"{"type":"user","data":{"name":"Bob"}}"#))
            .await;

        assert_eq!(res.status_code(), StatusCode::CREATED);
        let body = body(&res);
        assert_eq!(body["message"], "Data Creation: SUCCESS 🚀");
        assert_eq!(body["data"]["type"], "user");
        assert_eq!(body["data"]["data"], json!({ "name": "Bob" }));
        assert_eq!(body["data"]["metadata"], json!({}));
        assert!(body["data"]["id"].is_string());
    }

    #[tokio::test]
    async fn create_with_missing_fields_is_400() {
        let h = handlers(MemoryStore::new());
        let res = h.create(request(Method::POST, "/api/v1/data", None, "")).await;

        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        let body = body(&res);
        assert_eq!(body["message"], "Data Creation: FAILED 🚨");
        assert!(body["error"].as_str().unwrap().contains("`type` is required"));
    }

    #[tokio::test]
    async fn malformed_json_is_a_validation_failure() {
        let h = handlers(MemoryStore::new());
        let res = h.clone().create(request(Method::POST, "/api/v1/data", None, "{nope")).await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);

        let res = h.update(request(Method::PATCH, "/api/v1/data/x", Some("x"), "{nope")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body(&res)["error"].as_str().unwrap().contains("invalid JSON body"));
    }

    #[tokio::test]
    async fn unknown_id_is_404_with_null_data() {
        let h = handlers(MemoryStore::new());
        for (res, label) in [
            (h.clone().get(request(Method::GET, "/api/v1/data/x", Some("x"), "")).await, "Data Retrieval By Id"),
            (
                h.clone().update(request(Method::PATCH, "/api/v1/data/x", Some("x"), r#"{"data":1}"#)).await,
                "Data Update By Id",
            ),
            (h.clone().delete(request(Method::DELETE, "/api/v1/data/x", Some("x"), "")).await, "Data Deletion By Id"),
        ] {
            assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
            assert_eq!(body(&res), json!({ "message": format!("{label}: FAILED 🚨"), "data": null }));
        }
    }

    #[tokio::test]
    async fn empty_type_query_lists_everything() {
        let store = MemoryStore::new();
        store.create(NewRecord::new("a", json!(1))).await.unwrap();
        store.create(NewRecord::new("b", json!(2))).await.unwrap();
        let h = handlers(store);

        let all = h.clone().list(request(Method::GET, "/api/v1/data?type=", None, "")).await;
        assert_eq!(body(&all)["data"].as_array().unwrap().len(), 2);

        let only_b = h.list(request(Method::GET, "/api/v1/data?type=b", None, "")).await;
        let body = body(&only_b);
        assert_eq!(body["message"], "Data Retrieval By Type: SUCCESS 🚀");
        assert_eq!(body["data"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"][0]["type"], "b");
    }

    #[tokio::test]
    async fn store_failures_are_500_with_the_message() {
        let h = handlers(BrokenStore("connection refused"));
        let res = h.clone().list(request(Method::GET, "/api/v1/data", None, "")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body(&res),
            json!({ "message": "Data Retrieval By Type: FAILED 🚨", "error": "connection refused" })
        );

        let res = h
            .create(request(Method::POST, "/api/v1/data", None, r#"{"type":"t","data":1}"#))
            .await;
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn empty_error_message_uses_fallback() {
        let h = handlers(BrokenStore(""));
        let res = h.delete(request(Method::DELETE, "/api/v1/data/x", Some("x"), "")).await;
        assert_eq!(body(&res)["error"], "Unable to delete data by id 😢");
    }
}
