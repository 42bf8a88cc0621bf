//! MongoDB backend.
//!
//! Records are stored as
//!
//! ```text
//! { _id: ObjectId, type: String, data: <any>, metadata: <any>,
//!   createdAt: Date, updatedAt: Date }
//! ```
//!
//! in the `datas` collection. `id` on the wire is the ObjectId's hex form;
//! strings that are not valid ObjectIds cannot name a record and are
//! reported as not found.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{self, Bson, Document, doc};
use mongodb::options::ReturnDocument;
use mongodb::{Client, Collection, Database};
use serde_json::Value;
use tracing::debug;

use super::{Backend, COLLECTION, RecordStore, StoreError};
use crate::config::MongoConfig;
use crate::record::{FieldUpdate, NewRecord, Record, RecordFields, RecordPatch};

const DEFAULT_DATABASE: &str = "test";

pub struct MongoStore {
    db: Database,
    records: Collection<Document>,
}

impl MongoStore {
    /// Connects and pings the server, so an unreachable database fails at
    /// startup rather than on the first request.
    pub async fn connect(config: &MongoConfig) -> Result<Self, StoreError> {
        let client = Client::with_uri_str(&config.uri).await?;
        let db = match &config.database {
            Some(name) => client.database(name),
            None => client
                .default_database()
                .unwrap_or_else(|| client.database(DEFAULT_DATABASE)),
        };
        let store = Self::with_database(db);
        store.ping().await?;
        Ok(store)
    }

    pub fn with_database(db: Database) -> Self {
        let records = db.collection::<Document>(COLLECTION);
        Self { db, records }
    }
}

#[async_trait]
impl RecordStore for MongoStore {
    async fn create(&self, record: NewRecord) -> Result<Record, StoreError> {
        let fields = record.validate()?;
        let now = now_millis();
        let document = insert_document(&fields, now)?;
        let inserted = self.records.insert_one(document).await?;
        let id = inserted
            .inserted_id
            .as_object_id()
            .ok_or_else(|| StoreError::Backend("server returned a non-ObjectId _id".into()))?;
        debug!(%id, "inserted record");

        Ok(Record {
            id: id.to_hex(),
            kind: fields.kind,
            data: fields.data,
            metadata: fields.metadata,
            created_at: Some(to_chrono(now)),
            updated_at: Some(to_chrono(now)),
        })
    }

    async fn list_by_type(&self, kind: Option<&str>) -> Result<Vec<Record>, StoreError> {
        let filter = match kind {
            Some(kind) => doc! { "type": kind },
            None => doc! {},
        };
        let documents: Vec<Document> = self.records.find(filter).await?.try_collect().await?;
        documents.into_iter().map(record_from_document).collect()
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Record>, StoreError> {
        let Some(oid) = parse_id(id) else { return Ok(None) };
        self.records
            .find_one(doc! { "_id": oid })
            .await?
            .map(record_from_document)
            .transpose()
    }

    async fn update_by_id(&self, id: &str, patch: RecordPatch) -> Result<Option<Record>, StoreError> {
        let update = patch.validate()?;
        let Some(oid) = parse_id(id) else { return Ok(None) };
        self.records
            .find_one_and_update(doc! { "_id": oid }, set_document(&update, now_millis())?)
            .return_document(ReturnDocument::After)
            .await?
            .map(record_from_document)
            .transpose()
    }

    async fn delete_by_id(&self, id: &str) -> Result<Option<Record>, StoreError> {
        let Some(oid) = parse_id(id) else { return Ok(None) };
        self.records
            .find_one_and_delete(doc! { "_id": oid })
            .await?
            .map(record_from_document)
            .transpose()
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.db.run_command(doc! { "ping": 1 }).await?;
        Ok(())
    }

    fn backend(&self) -> Option<Backend> {
        Some(Backend::MongoDb)
    }
}

fn parse_id(id: &str) -> Option<ObjectId> {
    ObjectId::parse_str(id).ok()
}

fn now_millis() -> bson::DateTime {
    bson::DateTime::from_millis(Utc::now().timestamp_millis())
}

fn to_chrono(at: bson::DateTime) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(at.timestamp_millis()).unwrap_or_default()
}

fn to_bson(value: &Value) -> Result<Bson, StoreError> {
    bson::to_bson(value).map_err(|e| StoreError::Validation(format!("cannot store value: {e}")))
}

fn insert_document(fields: &RecordFields, now: bson::DateTime) -> Result<Document, StoreError> {
    Ok(doc! {
        "type": fields.kind.as_str(),
        "data": to_bson(&fields.data)?,
        "metadata": to_bson(&fields.metadata)?,
        "createdAt": now,
        "updatedAt": now,
    })
}

/// `$set` of the supplied fields plus `updatedAt`, which also keeps the
/// operator non-empty when the patch supplies nothing.
fn set_document(update: &FieldUpdate, now: bson::DateTime) -> Result<Document, StoreError> {
    let mut set = Document::new();
    if let Some(kind) = &update.kind {
        set.insert("type", kind.as_str());
    }
    if let Some(data) = &update.data {
        set.insert("data", to_bson(data)?);
    }
    if let Some(metadata) = &update.metadata {
        set.insert("metadata", to_bson(metadata)?);
    }
    set.insert("updatedAt", now);
    Ok(doc! { "$set": set })
}

fn record_from_document(mut document: Document) -> Result<Record, StoreError> {
    let id = match document.remove("_id") {
        Some(Bson::ObjectId(oid)) => oid.to_hex(),
        Some(other) => other.to_string(),
        None => return Err(StoreError::Backend("document has no _id".into())),
    };
    let kind = match document.remove("type") {
        Some(Bson::String(kind)) => kind,
        _ => String::new(),
    };
    let data = document
        .remove("data")
        .map(Bson::into_relaxed_extjson)
        .unwrap_or(Value::Null);
    let metadata = match document.remove("metadata") {
        None | Some(Bson::Null) => Value::Object(Default::default()),
        Some(value) => value.into_relaxed_extjson(),
    };
    let timestamp = |key: &str| document.get_datetime(key).ok().map(|at| to_chrono(*at));

    Ok(Record {
        id,
        kind,
        data,
        metadata,
        created_at: timestamp("createdAt"),
        updated_at: timestamp("updatedAt"),
    })
}
