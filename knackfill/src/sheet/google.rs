//! Google Sheets API v4 backend with service-account authentication

use super::{a1_range, check_cell, quote_title, Spreadsheet, Worksheet};
use crate::errors::SheetError;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

const SHEETS_API_BASE: &str = "https://sheets.googleapis.com";
const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
/// Tokens are refreshed this long before Google says they expire
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Grid size for tabs created by `add_sheet`
const NEW_SHEET_ROWS: u32 = 1000;
const NEW_SHEET_COLS: u32 = 20;

/// The fields of a service-account JSON key file that the token exchange needs
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl std::fmt::Debug for ServiceAccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountKey")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, SheetError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SheetError> {
        serde_json::from_str(raw).map_err(|e| SheetError::Credentials(e.to_string()))
    }
}

#[derive(Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// OAuth2 access tokens obtained with the JWT bearer grant, cached until near expiry
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    http: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, http: reqwest::Client) -> Result<Self, SheetError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| SheetError::Credentials(format!("invalid private key: {e}")))?;
        Ok(Self {
            key,
            encoding_key,
            http,
            cached: Mutex::new(None),
        })
    }

    fn assertion(&self) -> Result<String, SheetError> {
        let now = Utc::now().timestamp();
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + 3600,
        };
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| SheetError::Auth(format!("failed to sign assertion: {e}")))
    }

    /// A valid access token, exchanging a fresh assertion when the cached one is stale
    pub async fn access_token(&self) -> Result<String, SheetError> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() + TOKEN_REFRESH_MARGIN < token.expires_at {
                return Ok(token.token.clone());
            }
        }

        let assertion = self.assertion()?;
        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SheetError::Auth(format!(
                "token endpoint returned {status}: {body}"
            )));
        }
        let token: TokenResponse = response.json().await?;
        debug!("Obtained access token for {}", self.key.client_email);

        *cached = Some(CachedToken {
            token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(token.expires_in),
        });
        Ok(token.access_token)
    }
}

/// Extract the spreadsheet id from a `docs.google.com/spreadsheets/d/<id>/...` URL.
/// A bare id is accepted as is.
pub fn spreadsheet_id_from_url(url: &str) -> Result<String, SheetError> {
    if let Some((_, rest)) = url.split_once("/spreadsheets/d/") {
        let id: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if !id.is_empty() {
            return Ok(id);
        }
    } else if !url.is_empty()
        && url
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Ok(url.to_string());
    }
    Err(SheetError::InvalidUrl(url.to_string()))
}

/// Render a cell the way it should appear in a record: whole numbers without a
/// fractional part, so long IMEIs survive.
fn cell_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => i.to_string(),
            (None, Some(f)) if f.fract() == 0.0 && f.abs() < 1e17 => format!("{f:.0}"),
            _ => n.to_string(),
        },
        Value::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

struct SheetsApi {
    http: reqwest::Client,
    auth: ServiceAccountAuth,
    base: String,
    spreadsheet_id: String,
}

impl SheetsApi {
    fn url(&self, segments: &[&str]) -> Result<Url, SheetError> {
        let mut url =
            Url::parse(&self.base).map_err(|e| SheetError::InvalidUrl(format!("{}: {e}", self.base)))?;
        url.path_segments_mut()
            .map_err(|_| SheetError::InvalidUrl(self.base.clone()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets"])
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, SheetError> {
        let token = self.auth.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    async fn sheet_titles(&self) -> Result<Vec<String>, SheetError> {
        let mut url = self.url(&[self.spreadsheet_id.as_str()])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");
        let body = self.send(self.http.get(url)).await?;
        let titles = body
            .get("sheets")
            .and_then(|s| s.as_array())
            .map(|sheets| {
                sheets
                    .iter()
                    .filter_map(|s| s.pointer("/properties/title").and_then(|t| t.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(titles)
    }

    async fn add_sheet(&self, title: &str) -> Result<(), SheetError> {
        let url = self.url(&[format!("{}:batchUpdate", self.spreadsheet_id).as_str()])?;
        let body = json!({
            "requests": [{
                "addSheet": {
                    "properties": {
                        "title": title,
                        "gridProperties": { "rowCount": NEW_SHEET_ROWS, "columnCount": NEW_SHEET_COLS }
                    }
                }
            }]
        });
        self.send(self.http.post(url).json(&body)).await?;
        info!("📄 Created worksheet '{}'", title);
        Ok(())
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, SheetError> {
        let mut url = self.url(&[self.spreadsheet_id.as_str(), "values", range])?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE")
            .append_pair("majorDimension", "ROWS");
        let body = self.send(self.http.get(url)).await?;
        let range: ValueRange =
            serde_json::from_value(body).map_err(|e| SheetError::Api {
                status: 200,
                body: format!("unexpected values payload: {e}"),
            })?;
        Ok(range
            .values
            .iter()
            .map(|row| row.iter().map(cell_text).collect())
            .collect())
    }

    async fn update_values(&self, range: &str, values: &[String]) -> Result<(), SheetError> {
        let mut url = self.url(&[self.spreadsheet_id.as_str(), "values", range])?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": [values],
        });
        self.send(self.http.put(url).json(&body)).await?;
        Ok(())
    }
}

/// A Google spreadsheet opened through the Sheets API
#[derive(Clone)]
pub struct GoogleSheets {
    api: Arc<SheetsApi>,
}

impl GoogleSheets {
    /// Open the spreadsheet at `url` (or bare id) with a service-account key
    pub fn open_by_url(url: &str, key: ServiceAccountKey) -> Result<Self, SheetError> {
        Self::with_endpoint(url, key, SHEETS_API_BASE)
    }

    /// Same as [`GoogleSheets::open_by_url`] against a different API host
    pub fn with_endpoint(url: &str, key: ServiceAccountKey, api_base: &str) -> Result<Self, SheetError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        let auth = ServiceAccountAuth::new(key, http.clone())?;
        let spreadsheet_id = spreadsheet_id_from_url(url)?;
        Ok(Self {
            api: Arc::new(SheetsApi {
                http,
                auth,
                base: api_base.trim_end_matches('/').to_string(),
                spreadsheet_id,
            }),
        })
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.api.spreadsheet_id
    }
}

#[async_trait::async_trait]
impl Spreadsheet for GoogleSheets {
    async fn worksheet_or_create(&self, title: &str) -> Result<Arc<dyn Worksheet>, SheetError> {
        let titles = self.api.sheet_titles().await?;
        if !titles.iter().any(|t| t == title) {
            self.api.add_sheet(title).await?;
        }
        Ok(Arc::new(GoogleWorksheet {
            api: self.api.clone(),
            title: title.to_string(),
        }))
    }
}

pub struct GoogleWorksheet {
    api: Arc<SheetsApi>,
    title: String,
}

#[async_trait::async_trait]
impl Worksheet for GoogleWorksheet {
    fn title(&self) -> &str {
        &self.title
    }

    async fn all_values(&self) -> Result<Vec<Vec<String>>, SheetError> {
        self.api.get_values(&quote_title(&self.title)).await
    }

    async fn update_cell(&self, row: usize, col: usize, value: &str) -> Result<(), SheetError> {
        self.update_range(row, col, &[value.to_string()]).await
    }

    async fn update_range(
        &self,
        row: usize,
        first_col: usize,
        values: &[String],
    ) -> Result<(), SheetError> {
        check_cell(row, first_col)?;
        let last_col = first_col + values.len().saturating_sub(1);
        let range = a1_range(&self.title, row, first_col, last_col);
        self.api.update_values(&range, values).await
    }
}
