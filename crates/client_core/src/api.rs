//! HTTP client for the storefront REST API.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use shared::{
    domain::{AddressId, Session, UserId},
    error::{ApiError, ApiException, ErrorCode},
    protocol::{
        Address, AdminMessage, CreateUserResponse, JwtRequest, JwtResponse, NewUser, Order,
        OrderListResponse, Product, ProductSearchResponse, ProfileUpdate, Question, SearchPage,
        UserRecord,
    },
};
use tokio::sync::RwLock;
use tracing::{debug, info};
use url::Url;

use crate::{
    auth::{AccountApi, SessionSource},
    config::Settings,
    search::{LookupError, SearchBackend},
};

const NO_QUERY: &[(&str, &str)] = &[];

pub struct StorefrontApi {
    http: Client,
    base: Url,
    token: RwLock<Option<String>>,
}

impl StorefrontApi {
    pub fn new(settings: &Settings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .context("failed to build http client")?;
        Ok(Self::with_client(http, settings.api_base()?))
    }

    pub fn with_client(http: Client, base: Url) -> Self {
        Self {
            http,
            base,
            token: RwLock::new(None),
        }
    }

    pub async fn set_token(&self, token: Option<String>) {
        *self.token.write().await = token;
    }

    pub async fn has_token(&self) -> bool {
        self.token.read().await.is_some()
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("invalid endpoint path '{path}'"))
    }

    async fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.token.read().await.as_deref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn get_json<T, Q>(&self, path: &str, query: &Q) -> Result<T>
    where
        T: DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.endpoint(path)?;
        let response = self
            .authorized(self.http.get(url).query(query))
            .await
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?;
        let response = ensure_success(response).await?;
        response
            .json()
            .await
            .with_context(|| format!("GET {path} returned malformed json"))
    }

    async fn lookup<T, R, Q>(&self, path: &str, query: &Q) -> Result<SearchPage<T>, LookupError>
    where
        R: DeserializeOwned + Into<SearchPage<T>>,
        Q: Serialize + ?Sized,
    {
        let url = self
            .endpoint(path)
            .map_err(|err| LookupError::Transport(format!("{err:#}")))?;
        let response = self
            .authorized(self.http.get(url).query(query))
            .await
            .send()
            .await
            .map_err(|err| LookupError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            return Err(LookupError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let body: R = response
            .json()
            .await
            .map_err(|err| LookupError::Decode(err.to_string()))?;
        Ok(body.into())
    }

    pub async fn search_products(
        &self,
        term: &str,
        page: u32,
        limit: u32,
    ) -> Result<SearchPage<Product>, LookupError> {
        let query = [
            ("title", term.to_string()),
            ("limit", limit.to_string()),
            ("page", page.to_string()),
        ];
        self.lookup::<Product, ProductSearchResponse, _>("products/search", &query)
            .await
    }

    pub async fn search_orders(
        &self,
        user_id: &UserId,
        email: &str,
        term: &str,
        page: u32,
    ) -> Result<SearchPage<Order>, LookupError> {
        let query = [
            ("userId", user_id.to_string()),
            ("email", email.to_string()),
            ("page", page.to_string()),
            ("search", term.to_string()),
        ];
        self.lookup::<Order, OrderListResponse, _>("orders", &query)
            .await
    }

    pub async fn update_user(&self, user_id: &UserId, update: &ProfileUpdate) -> Result<()> {
        let url = self.endpoint(&format!("users/{user_id}"))?;
        let response = self
            .authorized(self.http.patch(url).json(update))
            .await
            .send()
            .await
            .context("profile update failed")?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn admin_messages(&self, email: &str) -> Result<Vec<AdminMessage>> {
        self.get_json("admin-messages", &[("email", email)]).await
    }

    pub async fn questions(&self, user_id: &UserId, email: &str) -> Result<Vec<Question>> {
        self.get_json("questions", &[("userId", user_id.as_str()), ("email", email)])
            .await
    }

    pub async fn addresses(&self, user_id: &UserId, email: &str) -> Result<Vec<Address>> {
        self.get_json("addresses", &[("userId", user_id.as_str()), ("email", email)])
            .await
    }

    pub async fn delete_address(
        &self,
        user_id: &UserId,
        email: &str,
        address_id: &AddressId,
    ) -> Result<()> {
        let url = self.endpoint(&format!("addresses/{address_id}"))?;
        let response = self
            .authorized(
                self.http
                    .delete(url)
                    .query(&[("userId", user_id.as_str()), ("email", email)]),
            )
            .await
            .send()
            .await
            .context("address delete failed")?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AccountApi for StorefrontApi {
    async fn create_jwt(&self, email: &str) -> Result<Option<String>> {
        let url = self.endpoint("jwt")?;
        let response = self
            .http
            .post(url)
            .json(&JwtRequest {
                email: email.to_string(),
            })
            .send()
            .await
            .context("token request failed")?;
        let body: JwtResponse = ensure_success(response)
            .await?
            .json()
            .await
            .context("token response was malformed")?;
        if let Some(token) = &body.token {
            self.set_token(Some(token.clone())).await;
            debug!("api token stored");
        }
        Ok(body.token)
    }

    async fn get_user(&self, email: &str) -> Result<Option<UserRecord>> {
        match self.get_json::<UserRecord, _>("users", &[("email", email)]).await {
            Ok(record) => Ok(Some(record)),
            Err(err) if is_not_found(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn create_user(&self, user: &NewUser) -> Result<CreateUserResponse> {
        let url = self.endpoint("users")?;
        let response = self
            .authorized(self.http.post(url).json(user))
            .await
            .send()
            .await
            .context("account creation failed")?;
        ensure_success(response)
            .await?
            .json()
            .await
            .context("account creation response was malformed")
    }

    async fn logout(&self) -> Result<()> {
        let url = self.endpoint("logout")?;
        let result = self.authorized(self.http.get(url)).await.send().await;
        self.set_token(None).await;
        let response = result.context("logout request failed")?;
        ensure_success(response).await?;
        info!("api session closed");
        Ok(())
    }
}

#[async_trait]
impl SessionSource for StorefrontApi {
    async fn current_session(&self) -> Result<Option<Session>> {
        if !self.has_token().await {
            return Ok(None);
        }
        match self.get_json::<UserRecord, _>("users/me", NO_QUERY).await {
            Ok(record) => Ok(Some(record.into_session())),
            Err(err) if is_not_found(&err) || is_unauthorized(&err) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

async fn error_message(response: Response) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    serde_json::from_str::<ApiError>(&text)
        .map(|body| body.message)
        .ok()
        .filter(|message| !message.is_empty())
        .or_else(|| (!text.trim().is_empty()).then(|| text.trim().to_string()))
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = error_message(response).await;
    Err(ApiException::new(ErrorCode::from_status(status.as_u16()), message).into())
}

fn api_code(err: &anyhow::Error) -> Option<ErrorCode> {
    err.downcast_ref::<ApiException>().map(|exception| exception.code)
}

fn is_not_found(err: &anyhow::Error) -> bool {
    api_code(err) == Some(ErrorCode::NotFound)
}

fn is_unauthorized(err: &anyhow::Error) -> bool {
    matches!(
        api_code(err),
        Some(ErrorCode::Unauthorized | ErrorCode::Forbidden)
    )
}

/// Header product search.
pub struct ProductSearch {
    api: Arc<StorefrontApi>,
}

impl ProductSearch {
    pub fn new(api: Arc<StorefrontApi>) -> Self {
        Self { api }
    }
}

#[async_trait]
impl SearchBackend for ProductSearch {
    type Item = Product;

    async fn search(
        &self,
        term: &str,
        page: u32,
        limit: u32,
    ) -> Result<SearchPage<Product>, LookupError> {
        self.api.search_products(term, page, limit).await
    }
}

/// Dashboard order search for one customer. The order endpoint pages by a
/// fixed server-side size, so `limit` is not sent.
pub struct OrderSearch {
    api: Arc<StorefrontApi>,
    user_id: UserId,
    email: String,
}

impl OrderSearch {
    pub fn new(api: Arc<StorefrontApi>, user_id: UserId, email: impl Into<String>) -> Self {
        Self {
            api,
            user_id,
            email: email.into(),
        }
    }
}

#[async_trait]
impl SearchBackend for OrderSearch {
    type Item = Order;

    async fn search(
        &self,
        term: &str,
        page: u32,
        _limit: u32,
    ) -> Result<SearchPage<Order>, LookupError> {
        self.api
            .search_orders(&self.user_id, &self.email, term, page)
            .await
    }
}

#[cfg(test)]
#[path = "tests/api_tests.rs"]
mod tests;
