use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{Client, Collection, Database, bson::doc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{MongoDocument, doc_id},
};
use crate::dao::{
    gateway::{GatewayResult, RemoteSyncGateway},
    models::{EventRecord, MatchStateRecord, MatchStatusUpdate, TimerClosure, TimerRecord},
};

const STATE_COLLECTION_NAME: &str = "match_states";
const EVENT_COLLECTION_NAME: &str = "match_events";
const TIMER_COLLECTION_NAME: &str = "timers";
const STATUS_COLLECTION_NAME: &str = "match_statuses";

#[derive(Clone)]
pub struct MongoGateway {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoGateway {
    /// Establish a connection to MongoDB.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        Ok(Self { inner })
    }

    async fn collection<T>(&self, name: &str) -> Collection<MongoDocument<T>>
    where
        T: Send + Sync,
    {
        let guard = self.inner.state.read().await;
        guard.database.collection::<MongoDocument<T>>(name)
    }

    async fn find<T>(&self, collection: &'static str, id: &str) -> MongoResult<Option<MongoDocument<T>>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        self.collection::<T>(collection)
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::Load {
                collection,
                id: id.to_owned(),
                source,
            })
    }

    async fn upsert<T>(&self, collection: &'static str, document: MongoDocument<T>) -> MongoResult<()>
    where
        T: Serialize + Send + Sync,
    {
        self.collection::<T>(collection)
            .await
            .replace_one(doc_id(&document.id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::Upsert {
                collection,
                id: document.id.clone(),
                source,
            })?;
        Ok(())
    }
}

impl RemoteSyncGateway for MongoGateway {
    fn upsert_match_state(&self, record: MatchStateRecord) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move {
            let document = MongoDocument::new(record.match_id, record);
            gateway
                .upsert(STATE_COLLECTION_NAME, document)
                .await
                .map_err(Into::into)
        })
    }

    fn append_event(&self, record: EventRecord) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move {
            let document = MongoDocument::new(record.event.id, record);
            gateway
                .upsert(EVENT_COLLECTION_NAME, document)
                .await
                .map_err(Into::into)
        })
    }

    fn upsert_timer(&self, record: TimerRecord) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move {
            let mut document = MongoDocument::new(record.id, record);
            if let Some(existing) = gateway
                .find::<TimerRecord>(TIMER_COLLECTION_NAME, &document.id)
                .await?
            {
                document.body.ended_at = document.body.ended_at.or(existing.body.ended_at);
            }
            gateway
                .upsert(TIMER_COLLECTION_NAME, document)
                .await
                .map_err(Into::into)
        })
    }

    fn close_timer(&self, closure: TimerClosure) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move {
            let id = closure.timer_id.to_string();
            let Some(mut document) = gateway
                .find::<TimerRecord>(TIMER_COLLECTION_NAME, &id)
                .await?
            else {
                return Err(MongoDaoError::MissingTimer { id }.into());
            };
            document.body.ended_at = Some(closure.ended_at);
            gateway
                .upsert(TIMER_COLLECTION_NAME, document)
                .await
                .map_err(Into::into)
        })
    }

    fn update_match_status(&self, update: MatchStatusUpdate) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move {
            let document = MongoDocument::new(update.match_id, update);
            gateway
                .upsert(STATUS_COLLECTION_NAME, document)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, GatewayResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, GatewayResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.reconnect().await.map_err(Into::into) })
    }
}
