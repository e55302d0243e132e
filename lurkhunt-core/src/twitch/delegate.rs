use std::sync::LazyLock;
use std::time::Duration;

use reqwest::Client;
use thiserror::Error;

use super::responses::{CategoriesEnvelope, StreamsEnvelope, UsersEnvelope};
use super::{TwitchCategory, TwitchStream, TwitchUser};
use crate::models::TokenPayload;

/// Both batch endpoints cap their id/login lists at this size.
pub const MAX_BATCH_SIZE: usize = 100;

const HTTP_TIMEOUT: Duration = Duration::from_secs(5);

static HTTP_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    Client::builder()
        .connect_timeout(HTTP_TIMEOUT)
        .timeout(HTTP_TIMEOUT)
        .build()
        .expect("reqwest client builds with static configuration")
});

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("API request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Response did not match the expected shape: {context}")]
    Parse { context: String },

    #[error("Batch of {0} exceeds the API limit of 100")]
    BatchTooLarge(usize),
}

impl ApiError {
    /// HTTP status of the failed call, when one was received.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Everything one outbound call needs. Assembled per call from the
/// credential manager plus static endpoint configuration.
#[derive(Debug, Clone)]
pub struct TwitchApiConfig {
    pub access_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub base_url: String,
    pub oauth_url: String,
}

impl Default for TwitchApiConfig {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            base_url: "https://api.twitch.tv/helix".to_string(),
            oauth_url: "https://id.twitch.tv/oauth2".to_string(),
        }
    }
}

/// Filters for `GET /helix/streams`.
#[derive(Debug, Clone, Default)]
pub struct StreamsQuery {
    /// Page size, capped at 100 by the platform.
    pub first: Option<u32>,
    pub game_id: Option<String>,
    pub user_id: Option<String>,
    pub user_login: Option<String>,
    /// Forward-pagination cursor from the previous page.
    pub after: Option<String>,
}

impl StreamsQuery {
    fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("first", self.first.unwrap_or(20).min(100).to_string())];
        if let Some(game_id) = &self.game_id {
            params.push(("game_id", game_id.clone()));
        }
        if let Some(user_id) = &self.user_id {
            params.push(("user_id", user_id.clone()));
        }
        if let Some(user_login) = &self.user_login {
            params.push(("user_login", user_login.clone()));
        }
        if let Some(after) = &self.after {
            params.push(("after", after.clone()));
        }
        params
    }
}

async fn get_json<T: serde::de::DeserializeOwned>(
    config: &TwitchApiConfig,
    endpoint: &str,
    params: &[(&str, String)],
) -> Result<T, ApiError> {
    let response = HTTP_CLIENT
        .get(format!("{}/{}", config.base_url, endpoint))
        .header("Client-ID", &config.client_id)
        .bearer_auth(&config.access_token)
        .query(params)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response.json::<T>().await.map_err(|e| ApiError::Parse {
        context: e.to_string(),
    })
}

/// List live streams. Returns one page plus the cursor for the next one;
/// `None` means the listing is exhausted.
pub async fn get_streams(
    config: &TwitchApiConfig,
    query: &StreamsQuery,
) -> Result<(Vec<TwitchStream>, Option<String>), ApiError> {
    let envelope: StreamsEnvelope = get_json(config, "streams", &query.to_params()).await?;
    let cursor = envelope
        .pagination
        .and_then(|p| p.cursor)
        .filter(|c| !c.is_empty());
    Ok((envelope.data, cursor))
}

/// Batch-look-up users by login name. Logins the platform does not know are
/// simply absent from the result.
pub async fn get_users(
    config: &TwitchApiConfig,
    logins: &[&str],
) -> Result<Vec<TwitchUser>, ApiError> {
    if logins.len() > MAX_BATCH_SIZE {
        return Err(ApiError::BatchTooLarge(logins.len()));
    }
    let params: Vec<(&str, String)> = logins
        .iter()
        .map(|login| ("login", (*login).to_string()))
        .collect();
    let envelope: UsersEnvelope = get_json(config, "users", &params).await?;
    Ok(envelope.data)
}

/// Batch-look-up categories by id and/or name (combined limit of 100).
pub async fn get_categories(
    config: &TwitchApiConfig,
    ids: &[&str],
    names: &[&str],
) -> Result<Vec<TwitchCategory>, ApiError> {
    if ids.len() + names.len() > MAX_BATCH_SIZE {
        return Err(ApiError::BatchTooLarge(ids.len() + names.len()));
    }
    let mut params: Vec<(&str, String)> =
        ids.iter().map(|id| ("id", (*id).to_string())).collect();
    params.extend(names.iter().map(|name| ("name", (*name).to_string())));
    let envelope: CategoriesEnvelope = get_json(config, "games", &params).await?;
    Ok(envelope.data)
}

/// Exchange the stored refresh token for a fresh token pair.
pub async fn refresh_token(
    config: &TwitchApiConfig,
    refresh_token: &str,
) -> Result<TokenPayload, ApiError> {
    let response = HTTP_CLIENT
        .post(format!("{}/token", config.oauth_url))
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", &config.client_id),
            ("client_secret", &config.client_secret),
        ])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::Status {
            status: status.as_u16(),
            body,
        });
    }

    response
        .json::<TokenPayload>()
        .await
        .map_err(|e| ApiError::Parse {
            context: e.to_string(),
        })
}

/// Ask the platform whether a token is still good. A 401 is a normal "no",
/// not an error.
pub async fn validate_token(config: &TwitchApiConfig, token: &str) -> Result<bool, ApiError> {
    let response = HTTP_CLIENT
        .get(format!("{}/validate", config.oauth_url))
        .header("Authorization", format!("OAuth {token}"))
        .send()
        .await?;

    let status = response.status();
    if status.is_success() {
        return Ok(true);
    }
    if status.as_u16() == 401 {
        return Ok(false);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::Status {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> TwitchApiConfig {
        TwitchApiConfig {
            access_token: "testtoken123".to_string(),
            client_id: "clientid".to_string(),
            client_secret: "clientsecret".to_string(),
            base_url: format!("{}/helix", server.uri()),
            oauth_url: format!("{}/oauth2", server.uri()),
        }
    }

    #[tokio::test]
    async fn test_get_streams_returns_page_and_cursor() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/helix/streams"))
            .and(header("Client-ID", "clientid"))
            .and(query_param("first", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{
                    "id": "40952121085",
                    "user_id": "101051819",
                    "user_login": "afro",
                    "user_name": "Afro",
                    "game_id": "32982",
                    "game_name": "Grand Theft Auto V",
                    "type": "live",
                    "title": "foo",
                    "viewer_count": 1490,
                    "started_at": "2021-03-10T03:18:11Z",
                    "language": "en",
                    "is_mature": false,
                    "tag_ids": []
                }],
                "pagination": {"cursor": "eyJiIjpudWxs"}
            })))
            .mount(&server)
            .await;

        let config = test_config(&server);
        let query = StreamsQuery {
            first: Some(100),
            ..StreamsQuery::default()
        };
        let (streams, cursor) = get_streams(&config, &query).await.expect("call succeeds");
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].user_login, "afro");
        assert_eq!(cursor.as_deref(), Some("eyJiIjpudWxs"));
    }

    #[tokio::test]
    async fn test_get_streams_empty_cursor_means_end() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/helix/streams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [],
                "pagination": {}
            })))
            .mount(&server)
            .await;

        let (streams, cursor) = get_streams(&test_config(&server), &StreamsQuery::default())
            .await
            .expect("call succeeds");
        assert!(streams.is_empty());
        assert!(cursor.is_none());
    }

    #[tokio::test]
    async fn test_get_users_surfaces_status_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/helix/users"))
            .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized"))
            .mount(&server)
            .await;

        let err = get_users(&test_config(&server), &["somebody"])
            .await
            .expect_err("401 surfaces");
        assert_eq!(err.status(), Some(401));
    }

    #[tokio::test]
    async fn test_get_users_batch_limit() {
        let server = MockServer::start().await;
        let logins: Vec<&str> = (0..101).map(|_| "a").collect();
        let err = get_users(&test_config(&server), &logins)
            .await
            .expect_err("oversized batch rejected");
        assert!(matches!(err, ApiError::BatchTooLarge(101)));
    }

    #[tokio::test]
    async fn test_get_categories_by_id_and_name() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/helix/games"))
            .and(query_param("id", "33214"))
            .and(query_param("name", "Art"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"id": "33214", "name": "Fortnite", "box_art_url": "https://x.jpg"},
                    {"id": "509660", "name": "Art", "box_art_url": "https://y.jpg"}
                ]
            })))
            .mount(&server)
            .await;

        let categories = get_categories(&test_config(&server), &["33214"], &["Art"])
            .await
            .expect("call succeeds");
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].name, "Fortnite");
        assert_eq!(categories[1].id, "509660");
    }

    #[tokio::test]
    async fn test_refresh_token_posts_form_grant() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/oauth2/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=oldrefresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "newaccess",
                "refresh_token": "newrefresh",
                "expires_in": 14124,
                "token_type": "bearer",
                "scope": ["chat:read"]
            })))
            .mount(&server)
            .await;

        let payload = refresh_token(&test_config(&server), "oldrefresh")
            .await
            .expect("refresh succeeds");
        assert_eq!(payload.access_token, "newaccess");
        assert_eq!(payload.expires_in, 14124);
    }

    #[tokio::test]
    async fn test_validate_token_maps_statuses() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .and(header("Authorization", "OAuth goodtoken"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "client_id": "clientid",
                "login": "lurkhunt",
                "scopes": ["chat:read"],
                "expires_in": 5000
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/oauth2/validate"))
            .and(header("Authorization", "OAuth badtoken"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid access token"))
            .mount(&server)
            .await;

        let config = test_config(&server);
        assert!(validate_token(&config, "goodtoken").await.expect("ok"));
        assert!(!validate_token(&config, "badtoken").await.expect("ok"));
    }

    #[tokio::test]
    async fn test_parse_error_on_shape_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/helix/streams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "streams": []
            })))
            .mount(&server)
            .await;

        let err = get_streams(&test_config(&server), &StreamsQuery::default())
            .await
            .expect_err("shape mismatch surfaces");
        assert!(matches!(err, ApiError::Parse { .. }));
    }
}
