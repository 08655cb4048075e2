use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::time::{Duration, Instant};

use super::{Document, DocumentStore, FieldFilter, FieldValue, StoredDocument};
use crate::config::ServiceAccount;
use crate::error::{ConfigError, StoreError};

const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
const JWT_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const TOKEN_LIFETIME_SECS: i64 = 3600;
// Refresh a little before Google would reject the token
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

// ─── Value encoding ──────────────────────────────────────────────────────────

fn encode_value(value: &FieldValue) -> Value {
    match value {
        FieldValue::String(s) => json!({ "stringValue": s }),
        // Firestore transports int64 as a decimal string
        FieldValue::Integer(i) => json!({ "integerValue": i.to_string() }),
        FieldValue::Boolean(b) => json!({ "booleanValue": b }),
        FieldValue::Timestamp(t) => json!({ "timestampValue": t.to_rfc3339() }),
        FieldValue::Null => json!({ "nullValue": null }),
    }
}

fn decode_value(value: &Value) -> Option<FieldValue> {
    let obj = value.as_object()?;
    if let Some(s) = obj.get("stringValue").and_then(Value::as_str) {
        return Some(FieldValue::String(s.to_string()));
    }
    if let Some(i) = obj.get("integerValue") {
        let parsed = match i {
            Value::String(s) => s.parse().ok(),
            other => other.as_i64(),
        };
        return parsed.map(FieldValue::Integer);
    }
    if let Some(b) = obj.get("booleanValue").and_then(Value::as_bool) {
        return Some(FieldValue::Boolean(b));
    }
    if let Some(t) = obj.get("timestampValue").and_then(Value::as_str) {
        return DateTime::parse_from_rfc3339(t)
            .ok()
            .map(|t| FieldValue::Timestamp(t.with_timezone(&Utc)));
    }
    if obj.contains_key("nullValue") {
        return Some(FieldValue::Null);
    }
    None
}

fn encode_document(doc: &Document) -> Value {
    let fields: Map<String, Value> = doc
        .iter()
        .map(|(k, v)| (k.clone(), encode_value(v)))
        .collect();
    json!({ "fields": fields })
}

#[derive(Debug, Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, Value>,
}

impl FirestoreDocument {
    fn into_stored(self) -> StoredDocument {
        let id = document_id(&self.name).to_string();
        let mut fields = Document::new();
        for (key, raw) in &self.fields {
            match decode_value(raw) {
                Some(v) => {
                    fields.insert(key.clone(), v);
                }
                None => log::debug!("Skipping unsupported field '{}' in {}", key, self.name),
            }
        }
        StoredDocument { id, fields }
    }
}

#[derive(Debug, Deserialize)]
struct RunQueryItem {
    document: Option<FirestoreDocument>,
}

/// Last path segment of `projects/../documents/<collection>/<id>`.
fn document_id(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

fn run_query_body(collection: &str, filter: &FieldFilter) -> Value {
    json!({
        "structuredQuery": {
            "from": [{ "collectionId": collection }],
            "where": {
                "fieldFilter": {
                    "field": { "fieldPath": filter.field },
                    "op": "EQUAL",
                    "value": encode_value(&filter.value),
                }
            }
        }
    })
}

// ─── Auth ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    TOKEN_LIFETIME_SECS as u64
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    refresh_at: Instant,
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct FirestoreClient {
    http: Client,
    base_url: String,
    account: ServiceAccount,
    signing_key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

impl FirestoreClient {
    /// Fails when the service-account private key is not a usable RSA PEM.
    pub fn new(http: Client, base_url: &str, account: ServiceAccount) -> Result<Self, ConfigError> {
        let signing_key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| ConfigError::InvalidStoreCredential(format!("private_key: {}", e)))?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            account,
            signing_key,
            token: Mutex::new(None),
        })
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.base_url, self.account.project_id
        )
    }

    async fn access_token(&self) -> Result<String, StoreError> {
        let cached = self.token.lock().clone();
        if let Some(cached) = cached {
            if Instant::now() < cached.refresh_at {
                return Ok(cached.value);
            }
        }

        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.account.client_email,
            scope: DATASTORE_SCOPE,
            aud: &self.account.token_uri,
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
        };
        let assertion =
            jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &self.signing_key)
                .map_err(|e| StoreError::Unavailable(format!("Failed to sign token request: {}", e)))?;

        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[("grant_type", JWT_GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Token request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Unavailable(format!(
                "Token endpoint error ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to parse token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *self.token.lock() = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}

#[async_trait]
impl DocumentStore for FirestoreClient {
    async fn create(&self, collection: &str, doc: Document) -> Result<String, StoreError> {
        let token = self.access_token().await?;
        let url = format!("{}/{}", self.documents_url(), collection);

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&encode_document(&doc))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Firestore request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Write(format!(
                "Firestore error ({}): {}",
                status, body
            )));
        }

        let created: FirestoreDocument = response
            .json()
            .await
            .map_err(|e| StoreError::Write(format!("Failed to parse Firestore response: {}", e)))?;

        Ok(document_id(&created.name).to_string())
    }

    async fn query(
        &self,
        collection: &str,
        filter: &FieldFilter,
    ) -> Result<Vec<StoredDocument>, StoreError> {
        let token = self.access_token().await?;
        let url = format!("{}:runQuery", self.documents_url());

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&run_query_body(collection, filter))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(format!("Firestore request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Read(format!(
                "Firestore error ({}): {}",
                status, body
            )));
        }

        let items: Vec<RunQueryItem> = response
            .json()
            .await
            .map_err(|e| StoreError::Read(format!("Failed to parse Firestore response: {}", e)))?;

        // Items without a document only carry read metadata
        Ok(items
            .into_iter()
            .filter_map(|item| item.document)
            .map(FirestoreDocument::into_stored)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn task_fields_encode_to_typed_values() {
        let mut doc = Document::new();
        doc.insert("description".to_string(), FieldValue::String("Sync".to_string()));
        doc.insert("attempts".to_string(), FieldValue::Integer(3));
        doc.insert(
            "created_at".to_string(),
            FieldValue::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
        );

        assert_eq!(
            encode_document(&doc),
            json!({
                "fields": {
                    "attempts": { "integerValue": "3" },
                    "created_at": { "timestampValue": "2024-05-01T12:00:00+00:00" },
                    "description": { "stringValue": "Sync" }
                }
            })
        );
    }

    #[test]
    fn query_results_decode_and_skip_metadata_rows() {
        let items: Vec<RunQueryItem> = serde_json::from_value(json!([
            {
                "document": {
                    "name": "projects/p/databases/(default)/documents/rpa_tasks/AbC123",
                    "fields": {
                        "description": { "stringValue": "Sync inventory" },
                        "status": { "stringValue": "pending" },
                        "created_at": { "timestampValue": "2024-05-01T12:00:00.123456Z" },
                        "tags": { "arrayValue": { "values": [] } }
                    }
                },
                "readTime": "2024-05-01T12:00:01Z"
            },
            { "readTime": "2024-05-01T12:00:01Z" }
        ]))
        .unwrap();

        let docs: Vec<StoredDocument> = items
            .into_iter()
            .filter_map(|i| i.document)
            .map(FirestoreDocument::into_stored)
            .collect();

        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "AbC123");
        assert_eq!(
            docs[0].fields.get("description"),
            Some(&FieldValue::String("Sync inventory".to_string()))
        );
        assert!(matches!(
            docs[0].fields.get("created_at"),
            Some(FieldValue::Timestamp(_))
        ));
        assert!(!docs[0].fields.contains_key("tags"));
    }

    #[test]
    fn run_query_uses_single_equality_filter() {
        let filter = FieldFilter::equals("status", FieldValue::String("pending".to_string()));
        let body = run_query_body("rpa_tasks", &filter);
        assert_eq!(body["structuredQuery"]["from"][0]["collectionId"], "rpa_tasks");
        assert_eq!(
            body["structuredQuery"]["where"]["fieldFilter"],
            json!({
                "field": { "fieldPath": "status" },
                "op": "EQUAL",
                "value": { "stringValue": "pending" }
            })
        );
    }

    #[test]
    fn integer_values_accept_string_or_number() {
        assert_eq!(
            decode_value(&json!({ "integerValue": "42" })),
            Some(FieldValue::Integer(42))
        );
        assert_eq!(
            decode_value(&json!({ "integerValue": 7 })),
            Some(FieldValue::Integer(7))
        );
        assert_eq!(decode_value(&json!({ "nullValue": null })), Some(FieldValue::Null));
        assert_eq!(decode_value(&json!({ "mapValue": {} })), None);
    }

    #[test]
    fn rejects_non_pem_private_key() {
        let account: ServiceAccount = serde_json::from_value(json!({
            "project_id": "p",
            "client_email": "a@p.iam.gserviceaccount.com",
            "private_key": "not a key"
        }))
        .unwrap();
        assert!(matches!(
            FirestoreClient::new(Client::new(), "http://localhost", account),
            Err(ConfigError::InvalidStoreCredential(_))
        ));
    }
}
