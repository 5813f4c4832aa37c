//! Read API over the metadata store.
//!
//! Requests are dispatched through [`Route`], matched on the lower-cased path:
//!
//! | Method | Route | Result |
//! |---|---|---|
//! | `GET` | `…/images` | list, one page of up to [`PAGE_SIZE`] records |
//! | `GET` | `…/images?id=<id>` | lookup |
//! | `GET` | `…/images/<id>` | lookup (path id wins over `?id=`) |
//! | other | matched route | 405 `{"message": "Method Not Allowed"}` |
//! | any | anything else | 404 `{"message": "Route not found"}` |
//!
//! Lookup tries an exact get by id, then falls back to the first record whose
//! `imageId` or `filename` equals the id. A miss is
//! 404 `{"message": "Not found", "tried": <id>}`.
//!
//! The list body is `{"items": [...], "next": <token|null>}`. Pass the token
//! back as `?next=<token>` for the following page.
//!
//! Store failures become 500 `{"message": "Internal Error", "error": "..."}`.
//! Every response is JSON and marked `Cache-Control: no-store`.

use crate::naming::decode_identifier;
use crate::store::{MetadataStore, ScanRequest, StoreError};
use crate::types::ImageRecord;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{debug, error};

/// Records per list page.
pub const PAGE_SIZE: usize = 100;

/// Path segment naming the image collection.
const COLLECTION: &str = "images";

/// An HTTP-shaped request. Query values are kept encoded.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
}

impl ApiRequest {
    /// Build a request from a method and a target such as `/images?id=cat.png`.
    /// An empty method means `GET`.
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        let query = query
            .split('&')
            .filter(|pair| !pair.is_empty())
            .map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (k.to_string(), v.to_string())
            })
            .collect();
        let method = if method.is_empty() { "GET" } else { method };
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query,
        }
    }

    pub fn get(target: &str) -> Self {
        Self::new("GET", target)
    }

    /// Decoded, non-empty query parameter.
    pub fn query_param(&self, name: &str) -> Option<String> {
        self.query
            .get(name)
            .filter(|v| !v.is_empty())
            .map(|v| decode_identifier(v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

impl ApiResponse {
    pub fn json(status: u16, body: Value) -> Self {
        let headers = BTreeMap::from([
            ("Cache-Control".to_string(), "no-store".to_string()),
            ("Content-Type".to_string(), "application/json".to_string()),
        ]);
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn body_string(&self) -> String {
        self.body.to_string()
    }
}

/// Shape of a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Last segment is `images`.
    Collection,
    /// Segment after `images`, percent-decoded.
    Item(String),
    /// Deeper than one segment under `images`: 405 for non-GET, else 404.
    Nested,
    Unmatched,
}

impl Route {
    pub fn parse(path: &str) -> Self {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let is_collection = |s: &&str| s.eq_ignore_ascii_case(COLLECTION);
        match segments.as_slice() {
            [.., parent, id] if is_collection(parent) => Route::Item(decode_identifier(id)),
            [.., last] if is_collection(last) => Route::Collection,
            s if s.iter().any(is_collection) => Route::Nested,
            _ => Route::Unmatched,
        }
    }
}

/// Serves list and lookup requests from a [`MetadataStore`].
pub struct QueryService<'a> {
    metadata: &'a dyn MetadataStore,
    page_size: usize,
}

impl<'a> QueryService<'a> {
    pub fn new(metadata: &'a dyn MetadataStore) -> Self {
        Self {
            metadata,
            page_size: PAGE_SIZE,
        }
    }

    pub fn handle(&self, request: &ApiRequest) -> ApiResponse {
        let route = Route::parse(&request.path);
        debug!(method = %request.method, path = %request.path, ?route, "api request");

        if route != Route::Unmatched && request.method != "GET" {
            return ApiResponse::json(405, json!({"message": "Method Not Allowed"}));
        }

        let result = match route {
            Route::Item(id) => self.lookup(&id),
            Route::Collection => match request.query_param("id") {
                Some(id) => self.lookup(&id),
                None => self.list(request.query_param("next").as_deref()),
            },
            Route::Nested | Route::Unmatched => {
                return ApiResponse::json(404, json!({"message": "Route not found"}));
            }
        };

        result.unwrap_or_else(|e| {
            error!(path = %request.path, error = %e, "api error");
            ApiResponse::json(
                500,
                json!({"message": "Internal Error", "error": e.to_string()}),
            )
        })
    }

    fn list(&self, next: Option<&str>) -> Result<ApiResponse, StoreError> {
        let page = self
            .metadata
            .scan(&ScanRequest::new(self.page_size).start_after(next))?;
        Ok(ApiResponse::json(
            200,
            json!({"items": serde_json::to_value(&page.items)?, "next": page.next}),
        ))
    }

    fn lookup(&self, id: &str) -> Result<ApiResponse, StoreError> {
        if let Some(record) = self.metadata.get(id)? {
            return Ok(ApiResponse::json(200, serde_json::to_value(record)?));
        }

        let matches_id = |r: &ImageRecord| r.image_id == id || r.filename == id;
        let page = self
            .metadata
            .scan(&ScanRequest::new(1).filter(&matches_id))?;
        match page.items.into_iter().next() {
            Some(record) => Ok(ApiResponse::json(200, serde_json::to_value(record)?)),
            None => Ok(ApiResponse::json(
                404,
                json!({"message": "Not found", "tried": id}),
            )),
        }
    }
}
