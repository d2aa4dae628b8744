//! MongoDB engine backed by the official driver.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};

use crate::broker::ConnectionTarget;
use crate::config::BrokerConfig;
use crate::store::{Connector, Namespace, Session, StoreResult, UpdateCounts};

/// Opens a dedicated MongoDB client per call.
#[derive(Debug, Clone)]
pub struct MongoConnector {
    app_name: String,
    selection_timeout: Duration,
}

impl MongoConnector {
    pub fn new(config: &BrokerConfig) -> Self {
        Self {
            app_name: config.app_name.clone(),
            selection_timeout: Duration::from_millis(config.probe_timeout_ms),
        }
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn open(&self, target: &ConnectionTarget) -> StoreResult<Box<dyn Session>> {
        let mut options = ClientOptions::parse(target.as_uri()).await?;

        // The broker enforces its own deadline; keep the driver from waiting longer.
        options.server_selection_timeout = Some(self.selection_timeout);
        options.connect_timeout = Some(self.selection_timeout);
        if options.app_name.is_none() {
            options.app_name = Some(self.app_name.clone());
        }

        let client = Client::with_options(options)?;
        Ok(Box::new(MongoSession { client }))
    }
}

struct MongoSession {
    client: Client,
}

impl MongoSession {
    fn collection(&self, ns: &Namespace) -> Collection<Document> {
        self.client
            .database(&ns.database)
            .collection::<Document>(&ns.collection)
    }
}

#[async_trait]
impl Session for MongoSession {
    async fn ping(&self) -> StoreResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;
        Ok(())
    }

    async fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>> {
        Ok(self.client.database(database).list_collection_names().await?)
    }

    async fn create_collection(&self, ns: &Namespace) -> StoreResult<()> {
        self.client
            .database(&ns.database)
            .create_collection(&ns.collection)
            .await?;
        Ok(())
    }

    async fn find(&self, ns: &Namespace, filter: Document) -> StoreResult<Vec<Document>> {
        let cursor = self.collection(ns).find(filter).await?;
        Ok(cursor.try_collect().await?)
    }

    async fn insert_one(&self, ns: &Namespace, record: Document) -> StoreResult<Bson> {
        let result = self.collection(ns).insert_one(record).await?;
        Ok(result.inserted_id)
    }

    async fn insert_many(&self, ns: &Namespace, records: Vec<Document>) -> StoreResult<Vec<Bson>> {
        let result = self.collection(ns).insert_many(records).await?;

        // The driver keys ids by input position.
        let mut ids: Vec<(usize, Bson)> = result.inserted_ids.into_iter().collect();
        ids.sort_by_key(|(index, _)| *index);
        Ok(ids.into_iter().map(|(_, id)| id).collect())
    }

    async fn update_many(
        &self,
        ns: &Namespace,
        filter: Document,
        update: Document,
    ) -> StoreResult<UpdateCounts> {
        let result = self.collection(ns).update_many(filter, update).await?;
        Ok(UpdateCounts {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn delete_many(&self, ns: &Namespace, filter: Document) -> StoreResult<u64> {
        let result = self.collection(ns).delete_many(filter).await?;
        Ok(result.deleted_count)
    }

    async fn close(self: Box<Self>) {
        self.client.shutdown().await;
    }
}
