//! Airtable REST store.
//!
//! Talks to the v0 REST API with a bearer token:
//! - `GET    {api}/{base}/{table}`      paged listing (`pageSize`, `offset`, `fields[]`, `filterByFormula`)
//! - `GET    {api}/{base}/{table}/{id}` single record
//! - `POST   {api}/{base}/{table}`      create (`{records, typecast}`)
//! - `PATCH  {api}/{base}/{table}`      update (`{records, typecast}`)
//! - `DELETE {api}/{base}/{table}`      delete (`records[]=id`)
//! - `GET    {api}/meta/bases/{base}/tables` field metadata
//!
//! Any `{"error": ...}` payload or non-success status becomes
//! [`Error::Remote`] immediately.

use reqwest::{Method, StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{CollectionDescriptor, FieldDescriptor, FieldKind, NewRecord, Record, RecordUpdate};

use super::{Page, PageRequest, RecordStore};

/// Default REST endpoint.
pub const DEFAULT_API_URL: &str = "https://api.airtable.com/v0";

/// Largest page the API will return.
pub const MAX_PAGE_SIZE: usize = 100;

/// Airtable REST store for a single base.
#[derive(Debug)]
pub struct AirtableStore {
    client: reqwest::Client,
    api_url: String,
    base_id: String,
    api_key: String,
}

impl AirtableStore {
    /// Create a store for `base_id` at the default endpoint.
    pub fn new(base_id: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self::with_endpoint(DEFAULT_API_URL, base_id, api_key)
    }

    /// Create a store with a custom endpoint (proxies, test servers).
    pub fn with_endpoint(
        api_url: impl Into<String>,
        base_id: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            base_id: base_id.into(),
            api_key: api_key.into(),
        }
    }

    /// Base id this store points at.
    #[must_use]
    pub fn base_id(&self) -> &str {
        &self.base_id
    }

    /// Build `{api}/{segments...}` with each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_url)
            .map_err(|e| Error::Config(format!("Invalid API URL {}: {e}", self.api_url)))?;
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("API URL cannot be a base: {}", self.api_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        self.url(&[self.base_id.as_str(), table])
    }

    /// Send a request and return the status plus the raw body.
    async fn execute(
        &self,
        context: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, String)> {
        let response = request
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| Error::remote(context, format!("request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::remote(context, format!("failed to read response: {e}")))?;

        tracing::trace!(context, %status, bytes = body.len(), "store response");
        Ok((status, body))
    }

    /// Send a request and decode its JSON body, surfacing error payloads.
    async fn send(&self, context: &str, request: reqwest::RequestBuilder) -> Result<Value> {
        let (status, body) = self.execute(context, request).await?;
        check_response(context, status, &body)
    }
}

/// Turn a raw response into JSON or a [`Error::Remote`].
fn check_response(context: &str, status: StatusCode, body: &str) -> Result<Value> {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    if let Some(error) = parsed.as_ref().and_then(|v| v.get("error")) {
        return Err(Error::remote(context, format!("{status}: {error}")));
    }
    if !status.is_success() {
        return Err(Error::remote(context, format!("{status}: {body}")));
    }

    parsed.ok_or_else(|| Error::remote(context, format!("unparseable response: {body}")))
}

/// Query parameters for one listing page.
fn page_query(request: &PageRequest<'_>) -> Vec<(&'static str, String)> {
    let mut params = vec![("pageSize", request.page_size.clamp(1, MAX_PAGE_SIZE).to_string())];
    if let Some(boundary) = request.modified_after {
        params.push(("filterByFormula", boundary.filter_formula()));
    }
    if let Some(max) = request.max_records {
        params.push(("maxRecords", max.to_string()));
    }
    if let Some(offset) = request.offset {
        params.push(("offset", offset.to_string()));
    }
    if let Some(fields) = request.fields {
        for field in fields {
            params.push(("fields[]", field.clone()));
        }
    }
    params
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<Record>,
    offset: Option<String>,
}

#[derive(Debug, Serialize)]
struct WriteRequest<'a, T> {
    records: &'a [T],
    typecast: bool,
}

#[derive(Debug, Deserialize)]
struct DeletedRecord {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DeleteResponse {
    #[serde(default)]
    records: Vec<DeletedRecord>,
}

#[derive(Debug, Deserialize)]
struct MetaTablesResponse {
    tables: Vec<MetaTable>,
}

#[derive(Debug, Deserialize)]
struct MetaTable {
    id: String,
    name: String,
    #[serde(default)]
    fields: Vec<MetaField>,
}

#[derive(Debug, Deserialize)]
struct MetaField {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(default)]
    options: Option<MetaFieldOptions>,
}

#[derive(Debug, Deserialize)]
struct MetaFieldOptions {
    #[serde(rename = "linkedTableId")]
    linked_table_id: Option<String>,
}

/// Resolve one table's descriptor from the base metadata listing.
fn descriptor_from_meta(meta: &MetaTablesResponse, collection: &str) -> Option<CollectionDescriptor> {
    let table = meta
        .tables
        .iter()
        .find(|t| t.name == collection || t.id == collection)?;

    let fields = table
        .fields
        .iter()
        .filter_map(|field| {
            let target = field
                .options
                .as_ref()
                .and_then(|o| o.linked_table_id.as_deref())
                .and_then(|id| meta.tables.iter().find(|t| t.id == id))
                .map(|t| t.name.as_str());
            FieldKind::from_store_type(&field.field_type, target)
                .map(|kind| FieldDescriptor::new(field.name.clone(), kind))
        })
        .collect();

    Some(CollectionDescriptor::new(table.name.clone(), fields))
}

impl RecordStore for AirtableStore {
    fn label(&self) -> &str {
        &self.base_id
    }

    async fn describe(&self, collection: &str) -> Result<CollectionDescriptor> {
        let context = format!("describe {collection}");
        let url = self.url(&["meta", "bases", self.base_id.as_str(), "tables"])?;
        let json = self.send(&context, self.client.get(url)).await?;
        let meta: MetaTablesResponse = serde_json::from_value(json)?;

        descriptor_from_meta(&meta, collection).ok_or_else(|| {
            Error::SchemaMismatch(format!(
                "table `{collection}` does not exist in base {}",
                self.base_id
            ))
        })
    }

    async fn fetch_page(&self, collection: &str, request: PageRequest<'_>) -> Result<Page> {
        let context = format!("fetch {collection}");
        let url = self.table_url(collection)?;
        let query = page_query(&request);
        let json = self.send(&context, self.client.get(url).query(&query)).await?;
        let list: ListResponse = serde_json::from_value(json)?;

        Ok(Page {
            records: list.records,
            offset: list.offset,
        })
    }

    async fn fetch_record(&self, collection: &str, id: &str) -> Result<Option<Record>> {
        let context = format!("fetch {collection}/{id}");
        let url = self.url(&[self.base_id.as_str(), collection, id])?;
        let (status, body) = self.execute(&context, self.client.get(url)).await?;

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let json = check_response(&context, status, &body)?;
        Ok(Some(serde_json::from_value(json)?))
    }

    async fn create(&self, collection: &str, records: &[NewRecord], typecast: bool) -> Result<Vec<Record>> {
        let context = format!("create {collection}");
        let url = self.table_url(collection)?;
        let body = WriteRequest { records, typecast };
        let json = self
            .send(&context, self.client.request(Method::POST, url).json(&body))
            .await?;
        let list: ListResponse = serde_json::from_value(json)?;
        Ok(list.records)
    }

    async fn update(&self, collection: &str, records: &[RecordUpdate], typecast: bool) -> Result<Vec<Record>> {
        let context = format!("update {collection}");
        let url = self.table_url(collection)?;
        let body = WriteRequest { records, typecast };
        let json = self
            .send(&context, self.client.request(Method::PATCH, url).json(&body))
            .await?;
        let list: ListResponse = serde_json::from_value(json)?;
        Ok(list.records)
    }

    async fn delete(&self, collection: &str, ids: &[String]) -> Result<Vec<String>> {
        let context = format!("delete {collection}");
        let url = self.table_url(collection)?;
        let query: Vec<(&str, &str)> = ids.iter().map(|id| ("records[]", id.as_str())).collect();
        let json = self
            .send(&context, self.client.request(Method::DELETE, url).query(&query))
            .await?;
        let deleted: DeleteResponse = serde_json::from_value(json)?;
        Ok(deleted.records.into_iter().map(|r| r.id).collect())
    }
}
