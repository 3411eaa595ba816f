//! Sequential page-to-exhaustion fetching.

use tracing::debug;

use crate::contract::{Endpoint, ListQuery, Record, ResourceAdapter};
use crate::error::TransportError;

/// Fetch every page of `endpoint`, starting at page 1 and stopping at the first empty page.
///
/// Each request waits for the previous one; the full set is returned only once assembled, so
/// nothing downstream ever matches against a partial listing.
pub async fn fetch_all<A>(
    adapter: &A,
    endpoint: Endpoint,
    query: &ListQuery,
) -> Result<Vec<Record>, TransportError>
where
    A: ResourceAdapter + ?Sized,
{
    let mut records = Vec::new();
    let mut page = 1;
    loop {
        let batch = adapter.list(endpoint, query.at_page(page)).await?;
        if batch.is_empty() {
            break;
        }
        debug!(endpoint = %endpoint, page, count = batch.len(), "Fetched page");
        records.extend(batch);
        page += 1;
    }
    debug!(endpoint = %endpoint, total = records.len(), pages = page - 1, "Live set assembled");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::MockResourceAdapter;
    use serde_json::json;

    fn page_of(ids: &[u32]) -> Vec<Record> {
        ids.iter()
            .map(|id| json!({ "id": id }).as_object().cloned().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn collects_every_page_until_an_empty_one() {
        let mut adapter = MockResourceAdapter::new();
        adapter
            .expect_list()
            .withf(|endpoint, q| *endpoint == Endpoint::Folders && q.page == 1)
            .times(1)
            .returning(|_, _| Ok(page_of(&[1, 2])));
        adapter
            .expect_list()
            .withf(|_, q| q.page == 2)
            .times(1)
            .returning(|_, _| Ok(page_of(&[3, 4])));
        adapter
            .expect_list()
            .withf(|_, q| q.page == 3)
            .times(1)
            .returning(|_, _| Ok(page_of(&[5])));
        adapter
            .expect_list()
            .withf(|_, q| q.page == 4)
            .times(1)
            .returning(|_, _| Ok(vec![]));

        let all = fetch_all(&adapter, Endpoint::Folders, &ListQuery::new().sort("id"))
            .await
            .expect("pagination should succeed");
        assert_eq!(all.len(), 5);
        assert_eq!(all[4]["id"], json!(5));
    }

    #[tokio::test]
    async fn keeps_query_options_on_every_page() {
        let mut adapter = MockResourceAdapter::new();
        adapter
            .expect_list()
            .withf(|_, q| q.sort == vec!["id".to_string()] && q.filter.is_some())
            .times(2)
            .returning(|_, q| {
                if q.page == 1 {
                    Ok(page_of(&[1]))
                } else {
                    Ok(vec![])
                }
            });
        let query = ListQuery::new()
            .sort("id")
            .filter(Some(json!({ "name": { "_eq": "x" } })));
        let all = fetch_all(&adapter, Endpoint::Roles, &query).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn surfaces_transport_errors() {
        let mut adapter = MockResourceAdapter::new();
        adapter.expect_list().returning(|_, _| {
            Err(TransportError::ConnectionRefused {
                host: "http://localhost:8055".into(),
            })
        });
        let err = fetch_all(&adapter, Endpoint::Translations, &ListQuery::new())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ConnectionRefused { .. }));
    }
}
