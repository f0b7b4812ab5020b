use axum::{
    extract::State,
    http::{header::SET_COOKIE, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use axum_extra::{headers::Cookie, TypedHeader};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use sqlx::types::Json as DbJson;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::auth::{
    cookies::{clear_refresh_cookie, refresh_cookie, REFRESH_TOKEN_COOKIE},
    jwt::{create_access_token, create_token_pair, hash_token, verify_token_of_type, TokenPair, TokenType},
    middleware::AuthUser,
    password::{hash_password, verify_password},
};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::extract::AppJson;
use crate::models::user::{
    normalize_email, AuthResponse, LoginRequest, RefreshToken, RegisterRequest, SettingsPatch,
    TokenResponse, UpdateProfileRequest, User, UserProfile, UserSettings,
};
use crate::AppState;

const INVALID_CREDENTIALS: &str = "Invalid email or password";

async fn store_refresh_token(
    db: &PgPool,
    user_id: Uuid,
    raw_refresh_token: &str,
    ttl_secs: i64,
    parent_token_id: Option<Uuid>,
) -> AppResult<Uuid> {
    let token_hash = hash_token(raw_refresh_token);
    let expires_at = Utc::now() + Duration::seconds(ttl_secs);
    let id = Uuid::new_v4();

    sqlx::query(
        r#"
        INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at, parent_token_id)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(&token_hash)
    .bind(expires_at)
    .bind(parent_token_id)
    .execute(db)
    .await?;

    Ok(id)
}

/// Create a token pair AND persist the refresh token hash.
async fn issue_token_pair(
    db: &PgPool,
    user_id: Uuid,
    email: &str,
    config: &Config,
    parent_token_id: Option<Uuid>,
) -> AppResult<TokenPair> {
    let tokens = create_token_pair(user_id, email, config)?;
    store_refresh_token(
        db,
        user_id,
        &tokens.refresh_token,
        config.jwt_refresh_ttl_secs,
        parent_token_id,
    )
    .await?;
    Ok(tokens)
}

async fn revoke_all_user_tokens(db: &PgPool, user_id: Uuid) -> AppResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE refresh_tokens
        SET revoked = true, revoked_at = NOW()
        WHERE user_id = $1 AND revoked = false
        "#,
    )
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected())
}

async fn find_user(db: &PgPool, user_id: Uuid) -> AppResult<User> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

async fn email_taken(db: &PgPool, email: &str, except: Option<Uuid>) -> AppResult<bool> {
    let taken = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS(SELECT 1 FROM users WHERE email = $1 AND ($2::uuid IS NULL OR id <> $2))",
    )
    .bind(email)
    .bind(except)
    .fetch_one(db)
    .await?;
    Ok(taken)
}

pub async fn register(
    State(state): State<AppState>,
    AppJson(body): AppJson<RegisterRequest>,
) -> AppResult<impl IntoResponse> {
    body.validate()?;
    let email = normalize_email(&body.email);

    if email_taken(&state.db, &email, None).await? {
        return Err(AppError::Validation("Email already in use".into()));
    }

    let password_hash = hash_password(&body.password)?;

    let user = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (id, name, email, password_hash, settings)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(body.name.trim())
    .bind(&email)
    .bind(&password_hash)
    .bind(DbJson(UserSettings::default()))
    .fetch_one(&state.db)
    .await?;

    let tokens = issue_token_pair(&state.db, user.id, &user.email, &state.config, None).await?;
    tracing::info!(user_id = %user.id, "User registered");

    Ok((
        StatusCode::CREATED,
        [(SET_COOKIE, refresh_cookie(&tokens.refresh_token, &state.config))],
        Json(AuthResponse {
            profile: user.into(),
            token: tokens.access_token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<impl IntoResponse> {
    let email = normalize_email(&body.email);

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = $1")
        .bind(&email)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotAuthorized(INVALID_CREDENTIALS.into()))?;

    if !verify_password(&body.password, &user.password_hash)? {
        tracing::debug!(user_id = %user.id, "Login rejected: wrong password");
        return Err(AppError::NotAuthorized(INVALID_CREDENTIALS.into()));
    }

    let tokens = issue_token_pair(&state.db, user.id, &user.email, &state.config, None).await?;
    tracing::info!(user_id = %user.id, "User logged in");

    Ok((
        [(SET_COOKIE, refresh_cookie(&tokens.refresh_token, &state.config))],
        Json(AuthResponse {
            profile: user.into(),
            token: tokens.access_token,
        }),
    ))
}

/// Rotate the refresh token carried by the cookie and hand out a new access
/// token. A revoked token showing up again means it leaked, so every session
/// of that user is revoked.
pub async fn refresh_token(
    State(state): State<AppState>,
    cookies: Option<TypedHeader<Cookie>>,
) -> AppResult<impl IntoResponse> {
    let raw_token = cookies
        .as_ref()
        .and_then(|TypedHeader(c)| c.get(REFRESH_TOKEN_COOKIE))
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthorized)?
        .to_string();

    let claims = verify_token_of_type(&raw_token, TokenType::Refresh, &state.config)?;

    let stored = sqlx::query_as::<_, RefreshToken>(
        r#"
        SELECT id, user_id, revoked
        FROM refresh_tokens
        WHERE token_hash = $1 AND expires_at > NOW()
        "#,
    )
    .bind(hash_token(&raw_token))
    .fetch_optional(&state.db)
    .await?
    .ok_or(AppError::Unauthorized)?;

    if stored.user_id != claims.sub {
        return Err(AppError::Unauthorized);
    }

    // Single use: only the request that flips the flag may continue.
    let rotated = sqlx::query(
        "UPDATE refresh_tokens SET revoked = true, revoked_at = NOW() WHERE id = $1 AND revoked = false",
    )
    .bind(stored.id)
    .execute(&state.db)
    .await?
    .rows_affected();

    if stored.revoked || rotated == 0 {
        let revoked = revoke_all_user_tokens(&state.db, stored.user_id).await?;
        tracing::warn!(
            user_id = %stored.user_id,
            token_id = %stored.id,
            revoked,
            "Refresh token reuse detected, all sessions revoked"
        );
        return Err(AppError::Unauthorized);
    }

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(stored.user_id)
        .fetch_optional(&state.db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    let tokens =
        issue_token_pair(&state.db, user.id, &user.email, &state.config, Some(stored.id)).await?;
    tracing::debug!(user_id = %user.id, parent_token_id = %stored.id, "Refresh token rotated");

    Ok((
        [(SET_COOKIE, refresh_cookie(&tokens.refresh_token, &state.config))],
        Json(TokenResponse {
            token: tokens.access_token,
        }),
    ))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<impl IntoResponse> {
    let revoked = revoke_all_user_tokens(&state.db, auth_user.id).await?;
    tracing::info!(user_id = %auth_user.id, email = %auth_user.email, revoked, "User logged out");

    Ok((
        [(SET_COOKIE, clear_refresh_cookie(&state.config))],
        Json(json!({ "message": "Logged out" })),
    ))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<Json<UserProfile>> {
    let user = find_user(&state.db, auth_user.id).await?;
    Ok(Json(user.into()))
}

pub async fn update_me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(body): AppJson<UpdateProfileRequest>,
) -> AppResult<Json<AuthResponse>> {
    body.validate()?;
    let user = find_user(&state.db, auth_user.id).await?;

    let name = body.name.map(|n| n.trim().to_string()).unwrap_or(user.name);

    let email = match body.email {
        Some(raw) => {
            let email = normalize_email(&raw);
            if email != user.email && email_taken(&state.db, &email, Some(user.id)).await? {
                return Err(AppError::Validation("Email already in use".into()));
            }
            email
        }
        None => user.email,
    };

    let password_hash = match body.password {
        Some(password) => hash_password(&password)?,
        None => user.password_hash,
    };

    let settings = match body.settings {
        Some(patch) => patch.apply_to(user.settings.0).map_err(AppError::Validation)?,
        None => user.settings.0,
    };

    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET name = $2, email = $3, password_hash = $4, settings = $5, updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(user.id)
    .bind(&name)
    .bind(&email)
    .bind(&password_hash)
    .bind(DbJson(&settings))
    .fetch_one(&state.db)
    .await?;

    let token = create_access_token(updated.id, &updated.email, &state.config)?;
    tracing::info!(user_id = %updated.id, "Profile updated");

    Ok(Json(AuthResponse {
        profile: updated.into(),
        token,
    }))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    AppJson(patch): AppJson<SettingsPatch>,
) -> AppResult<Json<UserSettings>> {
    let user = find_user(&state.db, auth_user.id).await?;
    let settings = patch
        .apply_to(user.settings.0)
        .map_err(AppError::Validation)?;

    sqlx::query("UPDATE users SET settings = $2, updated_at = NOW() WHERE id = $1")
        .bind(user.id)
        .bind(DbJson(&settings))
        .execute(&state.db)
        .await?;

    tracing::debug!(user_id = %user.id, "Settings updated");
    Ok(Json(settings))
}

/// Delete the account. Habits, completions, moods and refresh tokens go with
/// it through `ON DELETE CASCADE`.
pub async fn delete_me(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
) -> AppResult<impl IntoResponse> {
    let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(auth_user.id)
        .execute(&state.db)
        .await?
        .rows_affected();

    if deleted == 0 {
        return Err(AppError::NotFound("User not found".into()));
    }

    tracing::info!(user_id = %auth_user.id, "Account deleted");
    Ok((
        [(SET_COOKIE, clear_refresh_cookie(&state.config))],
        Json::<Value>(json!({ "message": "Account deleted" })),
    ))
}
