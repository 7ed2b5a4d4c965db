use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::post,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    AppState, Result,
    auth::create_session,
    config::AppConfig,
    credentials::{self, NewUser, RESET_TTL_MS, VERIFICATION_TTL_MS},
    db::Db,
    error::{Envelope, Error},
    logging::log_login,
    metrics,
    models::UserView,
    services::{self, Services},
};

#[derive(Serialize)]
struct AuthData {
    user: UserView,
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterInput {
    username: Option<String>,
    email: String,
    password: String,
    confirm_password: String,
    first_name: String,
    last_name: String,
    profile_photo: Option<String>,
}

async fn register(
    State(db): State<Db>,
    State(services): State<Services>,
    State(config): State<AppConfig>,
    Json(input): Json<RegisterInput>,
) -> Result<(StatusCode, Json<Envelope<AuthData>>)> {
    if input.password != input.confirm_password {
        return Err(Error::validation("Passwords do not match"));
    }
    if input.email.trim().is_empty() || !input.email.contains('@') {
        return Err(Error::validation("A valid email is required"));
    }

    let user = credentials::register(
        &db,
        NewUser {
            username: input.username,
            email: input.email,
            password: input.password,
            first_name: input.first_name,
            last_name: input.last_name,
            profile_photo: input.profile_photo,
        },
    )
    .await?;

    // Verification email is fire-and-forget: delivery failure must not fail
    // the registration that already committed.
    let email = user.email.clone();
    let name = user.first_name.clone();
    let mailer = services.mailer.clone();
    let db_bg = db.clone();
    drop(tokio::spawn(async move {
        match credentials::issue_code(&db_bg, &email, VERIFICATION_TTL_MS).await {
            Ok((_, code)) => {
                let (subject, html) = services::verification_email(&name, &code);
                if let Err(err) = mailer.send(&email, &subject, &html).await {
                    warn!("verification email to {email} failed: {err:#}");
                }
            }
            Err(err) => warn!("failed to issue verification code for {email}: {err}"),
        }
    }));

    let token = create_session(&db, user.id, config.session_ttl_hours).await?;

    Ok((
        StatusCode::CREATED,
        Envelope::with_message(
            AuthData {
                user: user.into(),
                token,
            },
            "Registration successful. Verification code sent to your email.",
        ),
    ))
}

#[derive(Deserialize)]
struct LoginInput {
    email: String,
    password: String,
}

async fn login(
    State(db): State<Db>,
    State(config): State<AppConfig>,
    Json(input): Json<LoginInput>,
) -> Result<Json<Envelope<AuthData>>> {
    match credentials::login(&db, &input.email, &input.password).await {
        Ok(user) => {
            ::metrics::counter!(metrics::AUTH_LOGINS).increment(1);
            log_login(&db, user.id, "success", None).await;

            let token = create_session(&db, user.id, config.session_ttl_hours).await?;
            Ok(Envelope::with_message(
                AuthData {
                    user: user.into(),
                    token,
                },
                "Login successful",
            ))
        }
        Err(err) => {
            ::metrics::counter!(metrics::AUTH_FAILED).increment(1);
            // Record the failed attempt when the account actually exists.
            if let Ok(Some(user_id)) =
                sqlx::query_scalar::<_, i64>("SELECT id FROM users WHERE email = ?")
                    .bind(&input.email)
                    .fetch_optional(&db)
                    .await
            {
                log_login(&db, user_id, "failure", Some(&err.to_string())).await;
            }
            Err(err)
        }
    }
}

#[derive(Deserialize)]
struct EmailInput {
    email: String,
}

async fn send_verification_code(
    State(db): State<Db>,
    State(services): State<Services>,
    Json(input): Json<EmailInput>,
) -> Result<Json<Envelope<()>>> {
    let (user, code) = credentials::issue_code(&db, &input.email, VERIFICATION_TTL_MS).await?;

    let (subject, html) = services::verification_email(&user.first_name, &code);
    match services.mailer.send(&input.email, &subject, &html).await {
        // Sending the code is the entire point of this endpoint.
        Err(err) => Err(Error::External(format!(
            "Failed to send verification email: {err:#}"
        ))),
        Ok(false) => {
            info!("mailer disabled; verification code for {} generated", input.email);
            Ok(Envelope::message("Verification code generated"))
        }
        Ok(true) => Ok(Envelope::message("Verification code sent to your email")),
    }
}

#[derive(Deserialize)]
struct VerifyEmailInput {
    email: String,
    code: String,
}

async fn verify_email(
    State(db): State<Db>,
    Json(input): Json<VerifyEmailInput>,
) -> Result<Json<Envelope<()>>> {
    credentials::verify_email(&db, &input.email, &input.code).await?;
    Ok(Envelope::message("Email verified successfully"))
}

async fn forgot_password(
    State(db): State<Db>,
    State(services): State<Services>,
    Json(input): Json<EmailInput>,
) -> Result<Json<Envelope<()>>> {
    let (user, code) = credentials::issue_code(&db, &input.email, RESET_TTL_MS).await?;

    // The code is already persisted; a failed send is logged, not fatal.
    let name = user.username.clone().unwrap_or(user.first_name.clone());
    let (subject, html) = services::password_reset_email(&name, &code);
    if let Err(err) = services.mailer.send(&input.email, &subject, &html).await {
        warn!("password reset email to {} failed: {err:#}", input.email);
    }

    Ok(Envelope::message("Password reset code sent to your email"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordInput {
    email: String,
    code: String,
    new_password: String,
}

async fn reset_password(
    State(db): State<Db>,
    Json(input): Json<ResetPasswordInput>,
) -> Result<Json<Envelope<()>>> {
    if input.new_password.is_empty() {
        return Err(Error::validation("New password is required"));
    }
    credentials::reset_password(&db, &input.email, &input.code, &input.new_password).await?;
    Ok(Envelope::message("Password reset successfully"))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleSignInInput {
    email: String,
    display_name: Option<String>,
    photo_url: Option<String>,
}

async fn google_signin(
    State(db): State<Db>,
    State(config): State<AppConfig>,
    Json(input): Json<GoogleSignInInput>,
) -> Result<Json<Envelope<AuthData>>> {
    let user = credentials::google_signin(
        &db,
        &input.email,
        input.display_name.as_deref(),
        input.photo_url.as_deref(),
    )
    .await?;

    let token = create_session(&db, user.id, config.session_ttl_hours).await?;
    Ok(Envelope::with_message(
        AuthData {
            user: user.into(),
            token,
        },
        "Google Sign-In successful",
    ))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/send-verification-code", post(send_verification_code))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .route("/auth/google-signin", post(google_signin))
}
