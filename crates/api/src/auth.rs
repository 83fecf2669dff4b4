use crate::error::{auth_error, validation_error, ApiError, ApiResult};
use crate::AppState;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use waypoint_common::WaypointError;
use waypoint_core::models::{NewUser, User};
use waypoint_core::users::{UserRepository, USERNAME_TAKEN};

const REFRESH_TOKEN_TYPE: &str = "refresh";
const PASSWORD_MIN_LEN: usize = 6;
const PASSWORD_MAX_LEN: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub access_token_expire_minutes: i64,
    pub refresh_token_expire_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "default-secret-change-in-production".to_string(),
            access_token_expire_minutes: 60,
            refresh_token_expire_days: 14,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    pub iat: i64,
    pub exp: i64,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
}

impl Claims {
    fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }

    fn is_refresh(&self) -> bool {
        self.token_type.as_deref() == Some(REFRESH_TOKEN_TYPE)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub is_active: bool,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_active: user.is_active,
        }
    }
}

pub fn validate_password(password: &str) -> ApiResult<()> {
    let len = password.chars().count();
    if !(PASSWORD_MIN_LEN..=PASSWORD_MAX_LEN).contains(&len) {
        return Err(validation_error(&format!(
            "password must be between {} and {} characters",
            PASSWORD_MIN_LEN, PASSWORD_MAX_LEN
        )));
    }
    Ok(())
}

pub fn hash_password(password: &str) -> ApiResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {}", e);
            ApiError::Internal("Password hashing failed".to_string())
        })
}

pub fn verify_password(password: &str, hashed_password: &str) -> bool {
    match PasswordHash::new(hashed_password) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

#[derive(Clone)]
pub struct AuthService {
    config: AuthConfig,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        let encoding_key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

        Self {
            config,
            encoding_key,
            decoding_key,
        }
    }

    /// Checks credentials. Inactive accounts are refused only once the
    /// password has matched.
    pub async fn authenticate(
        &self,
        users: &UserRepository,
        request: &LoginRequest,
    ) -> ApiResult<User> {
        let user = users
            .find_by_username(&request.username)
            .await?
            .filter(|user| verify_password(&request.password, &user.hashed_password))
            .ok_or_else(|| auth_error("Incorrect username or password"))?;

        if !user.is_active {
            return Err(WaypointError::BadRequest("Inactive user".to_string()).into());
        }

        info!("User {} logged in", user.id);
        Ok(user)
    }

    pub async fn register(
        &self,
        users: &UserRepository,
        request: RegisterRequest,
    ) -> ApiResult<User> {
        validate_password(&request.password)?;
        if users.find_by_username(&request.username).await?.is_some() {
            return Err(WaypointError::BadRequest(USERNAME_TAKEN.to_string()).into());
        }

        let user = users
            .create(&NewUser {
                username: request.username,
                hashed_password: hash_password(&request.password)?,
                first_name: request.first_name,
                last_name: request.last_name,
            })
            .await?;

        info!("Registered user {}", user.id);
        Ok(user)
    }

    pub async fn refresh(
        &self,
        users: &UserRepository,
        request: &RefreshRequest,
    ) -> ApiResult<TokenResponse> {
        let user_id = self.verify_refresh_token(&request.refresh_token)?;

        let user = users
            .find_by_id(user_id)
            .await?
            .filter(|user| user.is_active)
            .ok_or_else(|| auth_error("User not found or inactive"))?;

        self.issue_tokens(user.id)
    }

    pub fn issue_tokens(&self, user_id: i64) -> ApiResult<TokenResponse> {
        Ok(TokenResponse {
            access_token: self.create_access_token(user_id)?,
            refresh_token: self.create_refresh_token(user_id)?,
            token_type: "bearer".to_string(),
            expires_in: self.config.access_token_expire_minutes * 60,
        })
    }

    fn decode_claims(&self, token: &str) -> ApiResult<Claims> {
        match decode::<Claims>(token, &self.decoding_key, &Validation::default()) {
            Ok(token_data) => {
                debug!("Token verified for user: {}", token_data.claims.sub);
                Ok(token_data.claims)
            }
            Err(e) => {
                warn!("Token verification failed: {}", e);
                Err(auth_error("Invalid token"))
            }
        }
    }

    /// Returns the user id carried by an access token.
    pub fn verify_access_token(&self, token: &str) -> ApiResult<i64> {
        let claims = self.decode_claims(token)?;
        if claims.is_refresh() {
            return Err(auth_error("Invalid token"));
        }
        claims.user_id().ok_or_else(|| auth_error("Invalid token payload"))
    }

    pub fn verify_refresh_token(&self, token: &str) -> ApiResult<i64> {
        let claims = self
            .decode_claims(token)
            .map_err(|_| auth_error("Invalid refresh token"))?;
        if !claims.is_refresh() {
            return Err(auth_error("Invalid refresh token"));
        }
        claims
            .user_id()
            .ok_or_else(|| auth_error("Invalid refresh token"))
    }

    fn create_token(&self, user_id: i64, lifetime: Duration, token_type: Option<&str>) -> ApiResult<String> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
            token_type: token_type.map(str::to_string),
        };

        encode(&Header::default(), &claims, &self.encoding_key).map_err(|e| {
            error!("Failed to create token: {}", e);
            ApiError::Internal("Token creation failed".to_string())
        })
    }

    fn create_access_token(&self, user_id: i64) -> ApiResult<String> {
        self.create_token(
            user_id,
            Duration::minutes(self.config.access_token_expire_minutes),
            None,
        )
    }

    fn create_refresh_token(&self, user_id: i64) -> ApiResult<String> {
        self.create_token(
            user_id,
            Duration::days(self.config.refresh_token_expire_days),
            Some(REFRESH_TOKEN_TYPE),
        )
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|token| !token.is_empty())
}

/// The live user behind the request's bearer token.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);
        let token = bearer_token(parts).ok_or_else(|| auth_error("Invalid token"))?;

        // The middleware stack injects the service; bare routers fall back to state.
        let auth_service = parts
            .extensions
            .get::<Arc<AuthService>>()
            .cloned()
            .unwrap_or_else(|| state.auth.clone());

        let user_id = auth_service.verify_access_token(token)?;
        let user = state
            .core
            .users
            .find_by_id(user_id)
            .await?
            .ok_or_else(|| auth_error("User not found"))?;

        Ok(CurrentUser(user))
    }
}
