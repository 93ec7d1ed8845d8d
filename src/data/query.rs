//! Persistence service queries and deletes.

use spacelink_proto::stanza::{ErrorCondition, QueryScope, StanzaError};
use spacelink_proto::{DataObject, DataObjectFilter, IqKind, Payload, Persistence, QueryFilter};
use tracing::{debug, warn};

use super::DataExchangeEngine;
use crate::error::{ClientError, ClientResult};
use crate::store::CachedItem;

fn persistence_error(err: StanzaError) -> ClientError {
    match err.condition {
        ErrorCondition::NotAllowed | ErrorCondition::Forbidden | ErrorCondition::NotAuthorized => {
            ClientError::AccessDenied(err.to_string())
        }
        _ => ClientError::Rejected(err.to_string()),
    }
}

impl DataExchangeEngine {
    fn persistence_service(&self) -> ClientResult<String> {
        if !self.inner.mode.is_online() {
            return Err(ClientError::RequiresOnline);
        }
        self.inner
            .session()
            .network_info()
            .persistence_service
            .ok_or_else(|| ClientError::UnsupportedByServer("persistence service".into()))
    }

    async fn persistence_query(
        &self,
        service: &str,
        scope: QueryScope,
        filter: Option<QueryFilter>,
    ) -> ClientResult<Vec<DataObject>> {
        let reply = self
            .inner
            .session()
            .request(
                IqKind::Get,
                service,
                Payload::Query {
                    scope,
                    filters: filter.into_iter().collect(),
                },
            )
            .await?;
        match reply.into_result() {
            Ok(Payload::QueryResult { objects }) => Ok(objects),
            Ok(_) => Ok(Vec::new()),
            Err(err) => Err(persistence_error(err)),
        }
    }

    pub async fn query_by_id(
        &self,
        object_id: &str,
        filter: Option<QueryFilter>,
    ) -> ClientResult<Option<DataObject>> {
        let objects = self.query_by_ids(&[object_id.to_string()], filter).await?;
        Ok(objects
            .into_iter()
            .find(|o| o.id() == Some(object_id)))
    }

    pub async fn query_by_ids(
        &self,
        object_ids: &[String],
        filter: Option<QueryFilter>,
    ) -> ClientResult<Vec<DataObject>> {
        let service = self.persistence_service()?;
        if object_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.persistence_query(
            &service,
            QueryScope::Ids {
                ids: object_ids.to_vec(),
            },
            filter,
        )
        .await
    }

    /// Objects published to a space.
    ///
    /// Without a persistence service this falls back to the items the space's
    /// own channel retains, which exist only if the space persists items at
    /// all. A space with persistence off yields nothing.
    pub async fn query_by_space(
        &self,
        space_id: &str,
        filter: Option<QueryFilter>,
    ) -> ClientResult<Vec<DataObject>> {
        let has_service = self
            .inner
            .session()
            .network_info()
            .persistence_service
            .is_some();
        if has_service {
            let service = self.persistence_service()?;
            return self
                .persistence_query(
                    &service,
                    QueryScope::Spaces {
                        space_ids: vec![space_id.to_string()],
                    },
                    filter,
                )
                .await;
        }

        let (node, service, persistence) = self.channel_of(space_id).await?;
        if persistence == Persistence::Off {
            debug!(space_id = %space_id, "no persistence service and space does not persist");
            return Ok(Vec::new());
        }
        if !self.inner.mode.is_online() {
            return Err(ClientError::RequiresOnline);
        }

        // One-off fetch; an unhandled space gets no registration.
        let handle = self.inner.channels.requester(&service);
        let items = handle.fetch(&node, &[]).await?;

        // The node history is authoritative; replace the cache with it.
        if let Err(e) = self.inner.store.delete_items_by_node(&node).await {
            warn!(space_id = %space_id, error = %e, "failed to clear cache before refill");
        }
        let mut objects = Vec::with_capacity(items.len());
        for item in items {
            let (Some(item_id), Some(payload)) = (item.id, item.payload) else {
                continue;
            };
            let cached = CachedItem::new(item_id, node.clone(), payload.clone());
            if let Err(e) = self.inner.store.insert_item(&cached).await {
                warn!(space_id = %space_id, error = %e, "cache write failed");
            }
            if filter.as_ref().is_none_or(|f| f.accepts(&payload)) {
                objects.push(payload);
            }
        }
        Ok(objects)
    }

    pub async fn query_by_spaces(
        &self,
        space_ids: &[String],
        filter: Option<QueryFilter>,
    ) -> ClientResult<Vec<DataObject>> {
        let service = self.persistence_service()?;
        if space_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.persistence_query(
            &service,
            QueryScope::Spaces {
                space_ids: space_ids.to_vec(),
            },
            filter,
        )
        .await
    }

    /// Delete one object from the persistence service.
    pub async fn delete_by_id(&self, object_id: &str) -> ClientResult<bool> {
        Ok(self.delete_by_ids(&[object_id.to_string()]).await? > 0)
    }

    /// Delete objects from the persistence service. Returns how many went.
    pub async fn delete_by_ids(&self, object_ids: &[String]) -> ClientResult<u32> {
        let service = self.persistence_service()?;
        if object_ids.is_empty() {
            return Ok(0);
        }
        let reply = self
            .inner
            .session()
            .request(
                IqKind::Set,
                &service,
                Payload::Delete {
                    ids: object_ids.to_vec(),
                },
            )
            .await?;
        match reply.into_result() {
            Ok(Payload::DeleteResult { deleted }) => Ok(deleted),
            Ok(_) => Ok(0),
            Err(err) => Err(persistence_error(err)),
        }
    }

    async fn channel_of(&self, space_id: &str) -> ClientResult<(String, String, Persistence)> {
        if let Some(handled) = self.inner.handled.get(space_id) {
            return Ok((
                handled.node.clone(),
                handled.service.clone(),
                handled.persistence,
            ));
        }
        let space = self
            .inner
            .spaces
            .get(space_id)
            .await?
            .ok_or_else(|| ClientError::UnknownSpace(space_id.to_string()))?;
        match (space.pubsub_node(), space.pubsub_domain()) {
            (Some(node), Some(service)) => {
                Ok((node.to_string(), service.to_string(), space.persistence))
            }
            _ => Err(ClientError::UnknownEntity(format!(
                "space {} has no pubsub channel",
                space_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_allowed_is_access_denied() {
        let err = StanzaError {
            condition: ErrorCondition::NotAllowed,
            text: None,
        };
        assert_eq!(persistence_error(err).error_code(), "access_denied");
        let err = StanzaError {
            condition: ErrorCondition::ItemNotFound,
            text: None,
        };
        assert_eq!(persistence_error(err).error_code(), "rejected");
    }
}
