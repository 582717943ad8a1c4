use async_trait::async_trait;
use labelkit_core::entities::{
    Credentials, LoginGrant, RefreshGrant, Registration, RegistrationReceipt, User,
};
use labelkit_core::ports::AuthApi;
use labelkit_core::Error;
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::network::{endpoint, ensure_success, read_json, transport_error};

const REGISTER_PATH: &str = "/api/auth/register";
const LOGIN_PATH: &str = "/api/auth/login";
const LOGOUT_PATH: &str = "/api/auth/logout";
const VERIFY_PATH: &str = "/api/auth/verify";
const REFRESH_PATH: &str = "/api/auth/refresh";
const ME_PATH: &str = "/api/auth/me";

#[derive(Serialize)]
struct RegisterBody<'a> {
    email: &'a str,
    username: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    full_name: Option<&'a str>,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email_or_username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh_token: &'a str,
}

/// Account endpoints of the LabelKit API
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        endpoint(&self.base_url, path)
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    #[instrument(skip(self, registration), fields(username = %registration.username))]
    async fn register(&self, registration: &Registration) -> Result<RegistrationReceipt, Error> {
        let body = RegisterBody {
            email: &registration.email,
            username: &registration.username,
            password: &registration.password,
            full_name: registration.full_name.as_deref(),
        };

        let response = self
            .client
            .post(self.url(REGISTER_PATH))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        read_json(response, "Registration failed").await
    }

    #[instrument(skip(self, credentials), fields(identifier = %credentials.identifier))]
    async fn login(&self, credentials: &Credentials) -> Result<LoginGrant, Error> {
        let body = LoginBody {
            email_or_username: &credentials.identifier,
            password: &credentials.password,
        };

        debug!("sending login request");

        let response = self
            .client
            .post(self.url(LOGIN_PATH))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        read_json(response, "Login failed").await
    }

    #[instrument(skip_all)]
    async fn logout(&self, access_token: &str) -> Result<(), Error> {
        let response = self
            .client
            .post(self.url(LOGOUT_PATH))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        ensure_success(response, "Logout failed").await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn verify(&self, access_token: &str) -> Result<(), Error> {
        let response = self
            .client
            .get(self.url(VERIFY_PATH))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        ensure_success(response, "Token verification failed").await?;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshGrant, Error> {
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&RefreshBody { refresh_token })
            .send()
            .await
            .map_err(transport_error)?;

        read_json(response, "Token refresh failed").await
    }

    #[instrument(skip_all)]
    async fn current_user(&self, access_token: &str) -> Result<User, Error> {
        let response = self
            .client
            .get(self.url(ME_PATH))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        read_json(response, "Failed to load user profile").await
    }
}
