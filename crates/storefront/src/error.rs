//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures server errors to Sentry
//! before responding to the client. Page handlers return `Result<T, AppError>`
//! and get an HTML error page; JSON handlers wrap it in [`ApiError`] to get a
//! `{"message": ...}` body instead.

use askama::Template;
use askama_web::WebTemplate;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use corner_shop_core::{CommerceError, ErrorKind};

use crate::db::RepositoryError;
use crate::filters;
use crate::routes::PageContext;
use crate::services::auth::AuthError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// Cart, checkout or order rule failed.
    #[error(transparent)]
    Commerce(#[from] CommerceError),

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] RepositoryError),

    /// Authentication operation failed.
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    /// Session store failed.
    #[error("Session error: {0}")]
    Session(#[from] tower_sessions::session::Error),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// User is signed in but not allowed to do this.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Bad request from client.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Commerce(err) => match err.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Validation | ErrorKind::EmptyCart => StatusCode::BAD_REQUEST,
                ErrorKind::Permission => StatusCode::FORBIDDEN,
                ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Auth(err) => match err {
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::UserAlreadyExists => StatusCode::CONFLICT,
                AuthError::WeakPassword(_) | AuthError::InvalidEmail(_) | AuthError::MissingName => {
                    StatusCode::BAD_REQUEST
                }
                AuthError::Repository(_) | AuthError::PasswordHash => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Database(_) | Self::Session(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message safe to show to the client.
    ///
    /// Internal error details are never exposed.
    #[must_use]
    pub fn public_message(&self) -> String {
        if self.status().is_server_error() {
            return "Something went wrong on our side. Please try again.".to_string();
        }
        match self {
            Self::Commerce(err) => match err {
                CommerceError::ProductNotFound(_) => "Product not found".to_string(),
                CommerceError::NotInCart(_) => "Item not in cart".to_string(),
                CommerceError::OrderNotFound(_) => "Order not found".to_string(),
                CommerceError::EmptyCart => "Cart is empty".to_string(),
                CommerceError::Permission(_) => {
                    "You do not have permission to view this page".to_string()
                }
                CommerceError::Validation(msg) => msg.clone(),
                CommerceError::Storage(_) => String::new(),
            },
            Self::Auth(AuthError::InvalidCredentials) => "Invalid email or password".to_string(),
            Self::Auth(AuthError::UserAlreadyExists) => {
                "An account with this email already exists".to_string()
            }
            Self::Auth(AuthError::WeakPassword(msg)) => msg.clone(),
            Self::Auth(AuthError::InvalidEmail(_)) => "Invalid email address".to_string(),
            Self::Auth(AuthError::MissingName) => "Name is required".to_string(),
            Self::NotFound(msg) | Self::Forbidden(msg) | Self::BadRequest(msg) => msg.clone(),
            _ => self.to_string(),
        }
    }

    /// Send server errors to Sentry.
    fn report(&self) {
        if self.status().is_server_error() {
            let event_id = sentry::capture_error(self);
            tracing::error!(
                error = %self,
                sentry_event_id = %event_id,
                "Request error"
            );
        }
    }
}

/// Error page template.
#[derive(Template, WebTemplate)]
#[template(path = "error.html")]
pub struct ErrorTemplate {
    pub page: PageContext,
    pub title: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.report();
        let status = self.status();

        let title = status
            .canonical_reason()
            .unwrap_or("Error")
            .to_string();
        let page = ErrorTemplate {
            page: PageContext::default(),
            title,
            message: self.public_message(),
        };

        (status, page).into_response()
    }
}

/// `AppError` rendered as JSON for the cart API.
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl<E: Into<AppError>> From<E> for ApiError {
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0.report();
        let body = Json(json!({ "message": self.0.public_message() }));
        (self.0.status(), body).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context for the signed-in user.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use corner_shop_core::{OrderId, ProductId};

    #[test]
    fn test_commerce_error_status_codes() {
        let cases = [
            (CommerceError::ProductNotFound(ProductId::new(1)), StatusCode::NOT_FOUND),
            (CommerceError::OrderNotFound(OrderId::new(1)), StatusCode::NOT_FOUND),
            (CommerceError::Validation("quantity".into()), StatusCode::BAD_REQUEST),
            (CommerceError::EmptyCart, StatusCode::BAD_REQUEST),
            (CommerceError::Permission("nope".into()), StatusCode::FORBIDDEN),
            (CommerceError::storage("disk on fire"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(AppError::from(err).status(), expected);
        }
    }

    #[test]
    fn test_auth_error_status_codes() {
        assert_eq!(
            AppError::from(AuthError::InvalidCredentials).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::from(AuthError::UserAlreadyExists).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            AppError::from(AuthError::MissingName).status(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = AppError::Internal("connection string postgres://secret".into());
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!err.public_message().contains("secret"));

        let err = AppError::from(CommerceError::storage("timeout talking to db-7"));
        assert!(!err.public_message().contains("db-7"));
    }

    #[test]
    fn test_client_errors_keep_message() {
        let err = AppError::from(CommerceError::Validation("Quantity must be at least 1".into()));
        assert_eq!(err.public_message(), "Quantity must be at least 1");
        assert_eq!(
            AppError::from(CommerceError::NotInCart(ProductId::new(2))).public_message(),
            "Item not in cart"
        );
    }

    #[test]
    fn test_api_error_is_json() {
        let response = ApiError::from(CommerceError::EmptyCart).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
    }
}
