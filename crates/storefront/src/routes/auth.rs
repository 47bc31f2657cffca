//! Authentication route handlers.
//!
//! Email and password accounts. A successful login or registration stores a
//! [`CurrentUser`] in the session; from then on the user's persisted cart is
//! the active cart. The cookie cart is neither merged nor removed.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Form,
    extract::State,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::PageContext;
use crate::error::{AppError, Result, clear_sentry_user, set_sentry_user};
use crate::filters;
use crate::middleware::{OptionalAuth, clear_current_user, set_current_user};
use crate::models::{CurrentUser, User};
use crate::services::auth::{AuthError, AuthService};
use crate::state::AppState;

// =============================================================================
// Form Types
// =============================================================================

/// Login form data.
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

/// Registration form data.
#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub password: String,
}

// =============================================================================
// Templates
// =============================================================================

/// Login page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
pub struct LoginTemplate {
    pub page: PageContext,
    pub email: String,
    pub error: Option<String>,
}

/// Register page template.
#[derive(Template, WebTemplate)]
#[template(path = "auth/register.html")]
pub struct RegisterTemplate {
    pub page: PageContext,
    pub name: String,
    pub email: String,
    pub error: Option<String>,
}

/// Sign `user` in and send them home.
async fn start_session(session: &Session, user: &User) -> Result<Response> {
    set_current_user(session, &CurrentUser::from(user)).await?;
    set_sentry_user(&user.id, Some(user.email.as_str()));
    Ok(Redirect::to("/").into_response())
}

/// Turn an auth failure into a re-rendered form, or a server error.
fn form_error(err: AuthError) -> std::result::Result<(axum::http::StatusCode, String), AppError> {
    if !err.is_user_error() {
        return Err(err.into());
    }
    let err = AppError::from(err);
    Ok((err.status(), err.public_message()))
}

// =============================================================================
// Login Routes
// =============================================================================

/// Display the login page. Signed-in users are sent home.
pub async fn login_page(OptionalAuth(user): OptionalAuth, page: PageContext) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }
    LoginTemplate {
        page,
        email: String::new(),
        error: None,
    }
    .into_response()
}

/// Handle login form submission.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    page: PageContext,
    Form(form): Form<LoginForm>,
) -> Result<Response> {
    match AuthService::new(state.pool())
        .login(&form.email, &form.password)
        .await
    {
        Ok(user) => {
            tracing::info!(user_id = %user.id, "user logged in");
            start_session(&session, &user).await
        }
        Err(err) => {
            tracing::warn!(error = %err, "login failed");
            let (status, message) = form_error(err)?;
            let template = LoginTemplate {
                page,
                email: form.email,
                error: Some(message),
            };
            Ok((status, template).into_response())
        }
    }
}

// =============================================================================
// Registration Routes
// =============================================================================

/// Display the registration page. Signed-in users are sent home.
pub async fn register_page(OptionalAuth(user): OptionalAuth, page: PageContext) -> Response {
    if user.is_some() {
        return Redirect::to("/").into_response();
    }
    RegisterTemplate {
        page,
        name: String::new(),
        email: String::new(),
        error: None,
    }
    .into_response()
}

/// Handle registration form submission.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    page: PageContext,
    Form(form): Form<RegisterForm>,
) -> Result<Response> {
    match AuthService::new(state.pool())
        .register(&form.name, &form.email, &form.password)
        .await
    {
        Ok(user) => start_session(&session, &user).await,
        Err(err) => {
            tracing::info!(error = %err, "registration rejected");
            let (status, message) = form_error(err)?;
            let template = RegisterTemplate {
                page,
                name: form.name,
                email: form.email,
                error: Some(message),
            };
            Ok((status, template).into_response())
        }
    }
}

// =============================================================================
// Logout
// =============================================================================

/// Log out: drop the session and go home.
pub async fn logout(session: Session) -> Result<Redirect> {
    clear_current_user(&session).await?;
    clear_sentry_user();
    Ok(Redirect::to("/"))
}
