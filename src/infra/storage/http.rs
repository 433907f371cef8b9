//! Client for a Supabase-style storage REST API.
//!
//! Listing is folder-at-a-time: entries without an `id` are folders and are
//! expanded recursively. Results are paged with `limit`/`offset`.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, Response, Url, header};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::application::storage::{ObjectStore, StorageError, StoredObject, content_type_for};

const LIST_PAGE_SIZE: usize = 1000;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListRequest<'a> {
    prefix: &'a str,
    limit: usize,
    offset: usize,
    sort_by: SortBy,
}

#[derive(Debug, Serialize)]
struct SortBy {
    column: &'static str,
    order: &'static str,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    name: String,
    id: Option<String>,
    #[serde(default)]
    metadata: Option<EntryMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct EntryMetadata {
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Clone, Debug)]
pub struct HttpObjectStore {
    client: Client,
    base: Url,
    bucket: String,
    service_key: Option<String>,
}

impl HttpObjectStore {
    pub fn new(
        base: Url,
        bucket: String,
        service_key: Option<String>,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(concat!("teebox/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base,
            bucket,
            service_key,
        })
    }

    /// `{base}object/{segments...}` with each segment percent-encoded.
    fn object_url<'a>(
        &self,
        segments: impl IntoIterator<Item = &'a str>,
    ) -> Result<Url, StorageError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::Transport("storage URL cannot be a base".to_string()))?
            .pop_if_empty()
            .push("object")
            .extend(segments);
        Ok(url)
    }

    fn object_path_url(&self, path: &str) -> Result<Url, StorageError> {
        if path.is_empty() || path.split('/').any(|segment| segment.is_empty() || segment == "..") {
            return Err(StorageError::invalid_path(path, "malformed object path"));
        }
        self.object_url(std::iter::once(self.bucket.as_str()).chain(path.split('/')))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.service_key.as_deref() {
            Some(key) => request.bearer_auth(key).header("apikey", key),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, StorageError> {
        self.authorize(request)
            .send()
            .await
            .map_err(|err| StorageError::Transport(err.without_url().to_string()))
    }

    async fn list_folder(
        &self,
        folder: &str,
        offset: usize,
    ) -> Result<Vec<ListEntry>, StorageError> {
        let url = self.object_url(["list", self.bucket.as_str()])?;
        let body = ListRequest {
            prefix: folder,
            limit: LIST_PAGE_SIZE,
            offset,
            sort_by: SortBy {
                column: "name",
                order: "asc",
            },
        };

        let response = self.send(self.client.post(url).json(&body)).await?;
        let bytes = success_body(response, folder).await?;
        serde_json::from_slice(&bytes).map_err(|err| StorageError::Decode(err.to_string()))
    }
}

async fn success_body(response: Response, path: &str) -> Result<Bytes, StorageError> {
    let status = response.status();
    let bytes = response
        .bytes()
        .await
        .map_err(|err| StorageError::Transport(err.without_url().to_string()))?;

    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(StorageError::NotFound(path.to_string()));
    }
    if !status.is_success() {
        return Err(StorageError::Status {
            status: status.as_u16(),
            message: String::from_utf8_lossy(&bytes).chars().take(512).collect(),
        });
    }
    Ok(bytes)
}

fn join_path(folder: &str, name: &str) -> String {
    if folder.is_empty() {
        name.to_string()
    } else {
        format!("{folder}/{name}")
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn list(&self, prefix: &str) -> Result<Vec<StoredObject>, StorageError> {
        // Start from the deepest folder the prefix names, then filter.
        let start = prefix.rsplit_once('/').map_or("", |(folder, _)| folder);
        let mut pending = vec![start.trim_matches('/').to_string()];
        let mut objects = Vec::new();

        while let Some(folder) = pending.pop() {
            let mut offset = 0;
            loop {
                let entries = self.list_folder(&folder, offset).await?;
                let page_len = entries.len();

                for entry in entries {
                    let path = join_path(&folder, &entry.name);
                    if entry.id.is_none() {
                        let as_folder = format!("{path}/");
                        if as_folder.starts_with(prefix) || prefix.starts_with(&as_folder) {
                            pending.push(path);
                        }
                    } else if path.starts_with(prefix) {
                        let size = entry.metadata.and_then(|meta| meta.size).unwrap_or(0);
                        objects.push(StoredObject { path, size });
                    }
                }

                if page_len < LIST_PAGE_SIZE {
                    break;
                }
                offset += page_len;
            }
        }

        objects.sort_by(|left, right| left.path.cmp(&right.path));
        Ok(objects)
    }

    async fn download(&self, path: &str) -> Result<Bytes, StorageError> {
        let url = self.object_path_url(path)?;
        let response = self.send(self.client.get(url)).await?;
        success_body(response, path).await
    }

    async fn upload(&self, path: &str, body: Bytes) -> Result<(), StorageError> {
        let url = self.object_path_url(path)?;
        let request = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, content_type_for(path))
            .header("x-upsert", "true")
            .body(body);
        let response = self.send(request).await?;
        success_body(response, path).await.map(|_| ())
    }

    async fn delete(&self, path: &str) -> Result<(), StorageError> {
        self.object_path_url(path)?;
        let url = self.object_url([self.bucket.as_str()])?;
        let request = self
            .client
            .delete(url)
            .json(&json!({ "prefixes": [path] }));
        let response = self.send(request).await?;
        match success_body(response, path).await {
            Ok(_) | Err(StorageError::NotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use axum::{
        Json, Router,
        body::Bytes as BodyBytes,
        extract::{Path, State},
        http::{HeaderMap, StatusCode},
        response::IntoResponse,
        routing::post,
    };
    use serde_json::Value;

    use super::*;

    type Objects = Arc<Mutex<BTreeMap<String, Vec<u8>>>>;

    /// Minimal in-memory imitation of the storage API.
    fn fake_storage(objects: Objects) -> Router {
        async fn list(
            State(objects): State<Objects>,
            Path(_bucket): Path<String>,
            Json(body): Json<Value>,
        ) -> Json<Value> {
            let folder = body["prefix"].as_str().unwrap_or_default().to_string();
            let objects = objects.lock().unwrap();
            let mut entries = BTreeMap::new();
            for (path, data) in objects.iter() {
                let rest = if folder.is_empty() {
                    path.as_str()
                } else if let Some(rest) = path.strip_prefix(&format!("{folder}/")) {
                    rest
                } else {
                    continue;
                };
                match rest.split_once('/') {
                    Some((dir, _)) => {
                        entries.insert(dir.to_string(), json!({"name": dir, "id": null}));
                    }
                    None => {
                        entries.insert(
                            rest.to_string(),
                            json!({"name": rest, "id": "x", "metadata": {"size": data.len()}}),
                        );
                    }
                }
            }
            Json(Value::Array(entries.into_values().collect()))
        }

        async fn get_object(
            State(objects): State<Objects>,
            Path((_bucket, path)): Path<(String, String)>,
        ) -> impl IntoResponse {
            match objects.lock().unwrap().get(&path) {
                Some(data) => (StatusCode::OK, data.clone()).into_response(),
                None => StatusCode::NOT_FOUND.into_response(),
            }
        }

        async fn put_object(
            State(objects): State<Objects>,
            Path((_bucket, path)): Path<(String, String)>,
            headers: HeaderMap,
            body: BodyBytes,
        ) -> StatusCode {
            assert_eq!(headers["x-upsert"], "true");
            assert_eq!(headers[header::AUTHORIZATION], "Bearer service");
            objects.lock().unwrap().insert(path, body.to_vec());
            StatusCode::OK
        }

        async fn delete_objects(
            State(objects): State<Objects>,
            Path(_bucket): Path<String>,
            Json(body): Json<Value>,
        ) -> StatusCode {
            let mut objects = objects.lock().unwrap();
            for prefix in body["prefixes"].as_array().into_iter().flatten() {
                if let Some(path) = prefix.as_str() {
                    objects.remove(path);
                }
            }
            StatusCode::OK
        }

        Router::new()
            .route("/storage/v1/object/list/{bucket}", post(list))
            .route(
                "/storage/v1/object/{bucket}/{*path}",
                axum::routing::get(get_object).post(put_object),
            )
            .route(
                "/storage/v1/object/{bucket}",
                axum::routing::delete(delete_objects),
            )
            .with_state(objects)
    }

    async fn spawn(objects: Objects) -> HttpObjectStore {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = fake_storage(objects);
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        let base = Url::parse(&format!("http://{addr}/storage/v1/")).unwrap();
        HttpObjectStore::new(base, "site-images".into(), Some("service".into())).unwrap()
    }

    fn seeded() -> Objects {
        let mut map = BTreeMap::new();
        map.insert("clubs/drivers/titleist.png".to_string(), vec![0; 10]);
        map.insert("clubs/irons/ping.jpg".to_string(), vec![0; 4]);
        map.insert("hero.jpg".to_string(), vec![0; 2]);
        Arc::new(Mutex::new(map))
    }

    #[test]
    fn object_urls_are_percent_encoded() {
        let store = HttpObjectStore::new(
            Url::parse("https://x.supabase.co/storage/v1/").unwrap(),
            "site-images".into(),
            None,
        )
        .unwrap();
        let url = store.object_path_url("clubs/big bertha.png").unwrap();
        assert_eq!(
            url.as_str(),
            "https://x.supabase.co/storage/v1/object/site-images/clubs/big%20bertha.png"
        );
        assert!(store.object_path_url("clubs/../secret.png").is_err());
        assert!(store.object_path_url("clubs//a.png").is_err());
    }

    #[tokio::test]
    async fn list_recurses_into_folders() {
        let store = spawn(seeded()).await;

        let all = store.list("").await.unwrap();
        let paths: Vec<_> = all.iter().map(|object| object.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["clubs/drivers/titleist.png", "clubs/irons/ping.jpg", "hero.jpg"]
        );
        assert_eq!(all[0].size, 10);

        let drivers = store.list("clubs/drivers/").await.unwrap();
        assert_eq!(drivers.len(), 1);
    }

    #[tokio::test]
    async fn upload_download_delete_round_trip() {
        let objects = seeded();
        let store = spawn(objects.clone()).await;

        store
            .upload("clubs/drivers/titleist.jpg", Bytes::from_static(b"jpeg"))
            .await
            .unwrap();
        store.delete("clubs/drivers/titleist.png").await.unwrap();

        assert_eq!(
            store.download("clubs/drivers/titleist.jpg").await.unwrap(),
            Bytes::from_static(b"jpeg")
        );
        assert!(matches!(
            store.download("clubs/drivers/titleist.png").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(!objects.lock().unwrap().contains_key("clubs/drivers/titleist.png"));
    }
}
