use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;

use crate::dao::{
    models::{FactionStatsEntity, MovableFactionEntity, MoveProposalEntity, TokenEntity},
    record_store::RecordStore,
    storage::StorageResult,
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, BulkDocsRequest, CouchDocument, DeletedDocument, END_SUFFIX,
        FACTION_PREFIX, MOVABLE_FACTIONS_DOC_ID, MovableFactionsBody, PROPOSAL_PREFIX,
        RevisionOnly, TOKEN_PREFIX, faction_doc_id, proposal_doc_id, token_doc_id,
    },
};

const ALL_DOCS: &str = "_all_docs";
const BULK_DOCS: &str = "_bulk_docs";

/// CouchDB-backed [`RecordStore`]. All collections share one database and are
/// told apart by document id prefix.
#[derive(Clone)]
pub struct CouchRecordStore {
    client: Client,
    database_url: Url,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchRecordStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let database_url = database_url(&config.base_url, &config.database)?;
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            database_url,
            database,
            auth,
        };

        store.ensure_database().await?;
        Ok(store)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.auth {
            Some((ref user, ref pass)) => builder.basic_auth(user.as_ref(), Some(pass.as_ref())),
            None => builder,
        }
    }

    fn request(&self, method: Method, path: &str) -> CouchResult<reqwest::RequestBuilder> {
        let url = endpoint_url(&self.database_url, path)?;
        Ok(self.authed(self.client.request(method, url)))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = self.database_url.clone();

        let response = self
            .authed(self.client.get(url.clone()))
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
                    .authed(self.client.put(url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                // 412 means a concurrent creator won the race.
                if create.status().is_success() || create.status() == StatusCode::PRECONDITION_FAILED
                {
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
            .request(Method::GET, doc_id)?
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

    async fn current_rev(&self, doc_id: &str) -> CouchResult<Option<String>> {
        Ok(self
            .get_document::<RevisionOnly>(doc_id)
            .await?
            .map(|doc| doc.rev))
    }

    /// Create or overwrite `doc_id` with `body`, carrying over the stored revision.
    async fn upsert<T>(&self, doc_id: String, body: T) -> CouchResult<()>
    where
        T: Serialize,
    {
        let mut document = CouchDocument::new(doc_id, body);
        document.rev = self.current_rev(&document.id).await?;

        let response = self
            .request(Method::PUT, &document.id)?
            .json(&document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: document.id.clone(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: document.id,
                status: response.status(),
            })
        }
    }

    /// Delete `doc_id` if it exists. A missing document is not an error.
    async fn delete(&self, doc_id: &str) -> CouchResult<()> {
        let Some(rev) = self.current_rev(doc_id).await? else {
            return Ok(());
        };

        let response = self
            .request(Method::DELETE, doc_id)?
            .query(&[("rev", rev)])
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(()),
            status if status.is_success() => Ok(()),
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    async fn all_docs(&self, prefix: &str, include_docs: bool) -> CouchResult<AllDocsResponse> {
        let query = [
            ("include_docs", include_docs.to_string()),
            ("startkey", format!("\"{prefix}\"")),
            ("endkey", format!("\"{prefix}{END_SUFFIX}\"")),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)?
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        response
            .json::<AllDocsResponse>()
            .await
            .map_err(|source| CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            })
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let payload = self.all_docs(prefix, true).await?;

        let mut documents = Vec::new();
        for row in payload.rows {
            if let Some(doc) = row.doc {
                let parsed: CouchDocument<T> =
                    from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                        path: row.id,
                        source,
                    })?;
                documents.push(parsed.body);
            }
        }

        Ok(documents)
    }

    /// Tombstone every document under `prefix` in one `_bulk_docs` call.
    async fn delete_prefix(&self, prefix: &str) -> CouchResult<()> {
        let payload = self.all_docs(prefix, false).await?;
        let docs: Vec<DeletedDocument> = payload
            .rows
            .into_iter()
            .filter_map(|row| {
                row.value.map(|value| DeletedDocument {
                    id: row.id,
                    rev: value.rev,
                    deleted: true,
                })
            })
            .collect();

        if docs.is_empty() {
            return Ok(());
        }

        let response = self
            .request(Method::POST, BULK_DOCS)?
            .json(&BulkDocsRequest { docs })
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: BULK_DOCS.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(CouchDaoError::RequestStatus {
                path: BULK_DOCS.to_string(),
                status: response.status(),
            })
        }
    }
}

/// Resolve the database URL, escaping the name as a single path segment.
fn database_url(base_url: &str, database: &str) -> CouchResult<Url> {
    let mut url = Url::parse(base_url).map_err(|err| CouchDaoError::InvalidUrl {
        url: base_url.to_string(),
        reason: err.to_string(),
    })?;
    url.path_segments_mut()
        .map_err(|()| CouchDaoError::InvalidUrl {
            url: base_url.to_string(),
            reason: "base url cannot carry a path".into(),
        })?
        .pop_if_empty()
        .push(database);
    Ok(url)
}

/// Append `segment` as exactly one escaped path segment, so document ids
/// holding `/`, `#` or `?` never leak into sub-resources, fragments or queries.
fn endpoint_url(database_url: &Url, segment: &str) -> CouchResult<Url> {
    let mut url = database_url.clone();
    url.path_segments_mut()
        .map_err(|()| CouchDaoError::InvalidUrl {
            url: database_url.to_string(),
            reason: "base url cannot carry a path".into(),
        })?
        .push(segment);
    Ok(url)
}

impl RecordStore for CouchRecordStore {
    fn save_token(&self, token: TokenEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert(token_doc_id(token.id), token)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_token(&self, id: i64) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete(&token_doc_id(id)).await.map_err(Into::into) })
    }

    fn list_tokens(&self) -> BoxFuture<'static, StorageResult<Vec<TokenEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tokens = store.list_documents::<TokenEntity>(TOKEN_PREFIX).await?;
            tokens.sort_by_key(|token| token.id);
            Ok(tokens)
        })
    }

    fn save_faction_stats(
        &self,
        stats: FactionStatsEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert(faction_doc_id(&stats.faction_name), stats)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_faction_stats(&self, faction_name: String) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete(&faction_doc_id(&faction_name))
                .await
                .map_err(Into::into)
        })
    }

    fn list_faction_stats(&self) -> BoxFuture<'static, StorageResult<Vec<FactionStatsEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut stats = store
                .list_documents::<FactionStatsEntity>(FACTION_PREFIX)
                .await?;
            stats.sort_by_key(|stats| stats.id);
            Ok(stats)
        })
    }

    fn save_move_proposal(
        &self,
        proposal: MoveProposalEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert(proposal_doc_id(proposal.token_id), proposal)
                .await
                .map_err(Into::into)
        })
    }

    fn delete_move_proposal(&self, token_id: i64) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete(&proposal_doc_id(token_id))
                .await
                .map_err(Into::into)
        })
    }

    fn clear_move_proposals(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.delete_prefix(PROPOSAL_PREFIX).await.map_err(Into::into) })
    }

    fn list_move_proposals(&self) -> BoxFuture<'static, StorageResult<Vec<MoveProposalEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut proposals = store
                .list_documents::<MoveProposalEntity>(PROPOSAL_PREFIX)
                .await?;
            proposals.sort_by_key(|proposal| proposal.id);
            Ok(proposals)
        })
    }

    fn replace_movable_factions(
        &self,
        factions: Vec<MovableFactionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert(
                    MOVABLE_FACTIONS_DOC_ID.to_owned(),
                    MovableFactionsBody { factions },
                )
                .await
                .map_err(Into::into)
        })
    }

    fn list_movable_factions(
        &self,
    ) -> BoxFuture<'static, StorageResult<Vec<MovableFactionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let document = store
                .get_document::<CouchDocument<MovableFactionsBody>>(MOVABLE_FACTIONS_DOC_ID)
                .await?;
            Ok(document.map(|doc| doc.body.factions).unwrap_or_default())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let url = store.database_url.to_string();
            let response = store
                .authed(store.client.get(store.database_url.clone()))
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

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ensure_database().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay_url() -> Url {
        database_url("http://localhost:5984/", "relay").unwrap()
    }

    #[test]
    fn database_url_tolerates_trailing_slash_and_prefix() {
        assert_eq!(relay_url().as_str(), "http://localhost:5984/relay");
        let nested = database_url("http://couch.local/db-proxy", "relay").unwrap();
        assert_eq!(nested.path(), "/db-proxy/relay");
    }

    #[test]
    fn faction_names_stay_in_one_document() {
        let base = relay_url();
        let hand = endpoint_url(&base, &faction_doc_id("Red#Hand")).unwrap();
        let claw = endpoint_url(&base, &faction_doc_id("Red#Claw")).unwrap();

        assert_ne!(hand, claw);
        assert_eq!(hand.path(), "/relay/faction::Red%23Hand");
        assert_eq!(hand.fragment(), None);

        let slashed = endpoint_url(&base, &faction_doc_id("Order/Chaos")).unwrap();
        assert_eq!(slashed.path(), "/relay/faction::Order%2FChaos");

        let question = endpoint_url(&base, &faction_doc_id("Who?")).unwrap();
        assert_eq!(question.path(), "/relay/faction::Who%3F");
        assert_eq!(question.query(), None);
    }

    #[test]
    fn query_pairs_still_attach_after_the_document() {
        let mut url = endpoint_url(&relay_url(), ALL_DOCS).unwrap();
        url.query_pairs_mut().append_pair("include_docs", "true");
        assert_eq!(
            url.as_str(),
            "http://localhost:5984/relay/_all_docs?include_docs=true"
        );
    }
}
