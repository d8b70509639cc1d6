use std::{sync::Arc, time::Duration};

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode};
use serde::{Serialize, de::DeserializeOwned};
use tracing::debug;

use crate::dao::{
    gateway::{GatewayError, GatewayResult, RemoteSyncGateway},
    models::{EventRecord, MatchStateRecord, MatchStatusUpdate, TimerClosure, TimerRecord},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        CouchDocument, CouchRevision, event_doc_id, match_doc_id, status_doc_id, timer_doc_id,
    },
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct CouchGateway {
    client: Client,
    base_url: Arc<str>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchGateway {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let base_url = Arc::<str>::from(config.base_url.trim_end_matches('/'));
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let gateway = Self {
            client,
            base_url,
            database,
            auth,
        };

        gateway.ensure_database().await?;
        Ok(gateway)
    }

    fn with_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}/{}", self.base_url, self.database, path);
        self.with_auth(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = format!("{}/{}", self.base_url, self.database);

        let response = self
            .with_auth(self.client.get(&url))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .with_auth(self.client.put(&url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: response.status(),
            })
        }
    }

    /// Create or replace a document, carrying over the current revision when one exists.
    async fn upsert<T>(&self, mut document: CouchDocument<T>) -> CouchResult<()>
    where
        T: Serialize,
    {
        if let Some(existing) = self.get_document::<CouchRevision>(&document.id).await? {
            document.rev = Some(existing.rev);
        }
        self.put_document(&document.id, &document).await
    }
}

impl RemoteSyncGateway for CouchGateway {
    fn upsert_match_state(&self, record: MatchStateRecord) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move {
            let doc = CouchDocument::new(match_doc_id(record.match_id), "match_state", record);
            gateway.upsert(doc).await.map_err(Into::into)
        })
    }

    fn append_event(&self, record: EventRecord) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move {
            let doc_id = event_doc_id(record.event.id);
            if gateway
                .get_document::<CouchRevision>(&doc_id)
                .await?
                .is_some()
            {
                debug!(doc_id = %doc_id, "event already stored; skipping append");
                return Ok(());
            }
            let doc = CouchDocument::new(doc_id, "match_event", record);
            gateway
                .put_document(&doc.id, &doc)
                .await
                .map_err(Into::into)
        })
    }

    fn upsert_timer(&self, record: TimerRecord) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move {
            let doc_id = timer_doc_id(record.id);
            let mut doc = CouchDocument::new(doc_id, "timer", record);
            if let Some(existing) = gateway
                .get_document::<CouchDocument<TimerRecord>>(&doc.id)
                .await?
            {
                doc.rev = existing.rev;
                doc.body.ended_at = doc.body.ended_at.or(existing.body.ended_at);
            }
            gateway
                .put_document(&doc.id, &doc)
                .await
                .map_err(Into::into)
        })
    }

    fn close_timer(&self, closure: TimerClosure) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move {
            let doc_id = timer_doc_id(closure.timer_id);
            let Some(mut doc) = gateway
                .get_document::<CouchDocument<TimerRecord>>(&doc_id)
                .await?
            else {
                return Err(GatewayError::rejected(format!(
                    "timer document `{doc_id}` does not exist"
                )));
            };
            doc.body.ended_at = Some(closure.ended_at);
            gateway
                .put_document(&doc_id, &doc)
                .await
                .map_err(Into::into)
        })
    }

    fn update_match_status(&self, update: MatchStatusUpdate) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move {
            let doc = CouchDocument::new(status_doc_id(update.match_id), "match_status", update);
            gateway.upsert(doc).await.map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move {
            let url = format!("{}/{}", gateway.base_url, gateway.database);
            let response = gateway
                .with_auth(gateway.client.get(&url))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.clone(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url,
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, GatewayResult<()>> {
        let gateway = self.clone();
        Box::pin(async move { gateway.ensure_database().await.map_err(Into::into) })
    }
}
