//! Cart source resolution and the cart cookie.
//!
//! A signed-in visitor's cart lives on their user record; anyone else carries
//! their cart in the `cart` cookie as URL-encoded JSON. Handlers extract an
//! [`ActiveCart`], run a `CartEngine` operation, and hand the resulting
//! `CartUpdate` to [`store_cart`], which either saves the user record or
//! yields the `Set-Cookie` header to attach to the response.
//!
//! The cookie is not trusted for prices: every operation recomputes totals
//! from the catalog, so a tampered `total` is simply overwritten.

use std::convert::Infallible;

use axum::{
    extract::FromRequestParts,
    http::{
        HeaderMap, HeaderValue,
        header::{COOKIE, SET_COOKIE},
        request::Parts,
    },
    response::{IntoResponseParts, ResponseParts},
};
use tower_sessions::cookie::{Cookie, SameSite, time::Duration};

use corner_shop_core::{Cart, CartRepository, CartSource, CartWrite};

use super::auth::current_user;
use crate::db::UserRepository;
use crate::error::AppError;
use crate::models::CurrentUser;
use crate::state::AppState;

/// Name of the cart cookie.
pub const CART_COOKIE_NAME: &str = "cart";

/// Cart cookie lifetime.
const CART_COOKIE_MAX_AGE_DAYS: i64 = 7;

// =============================================================================
// Cookie codec
// =============================================================================

/// Encode a cart as a cookie value (URL-encoded JSON).
///
/// # Errors
///
/// Returns an error if the cart cannot be serialized.
pub fn encode_cart(cart: &Cart) -> Result<String, serde_json::Error> {
    let json = serde_json::to_string(cart)?;
    Ok(urlencoding::encode(&json).into_owned())
}

/// Decode a cookie value into a cart.
///
/// Anything that is not a valid cart document decodes to an empty cart.
#[must_use]
pub fn decode_cart(raw: &str) -> Cart {
    let Ok(json) = urlencoding::decode(raw) else {
        tracing::debug!("cart cookie is not valid percent-encoding");
        return Cart::default();
    };
    serde_json::from_str(&json).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "ignoring malformed cart cookie");
        Cart::default()
    })
}

/// Find the raw cart cookie value among the request's `Cookie` headers.
fn read_cart_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == CART_COOKIE_NAME)
        .map(|cookie| cookie.value().to_owned())
}

fn base_cookie(value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((CART_COOKIE_NAME, value))
        .path("/")
        .same_site(SameSite::Lax)
        .http_only(true)
        .secure(secure)
        .build()
}

// =============================================================================
// Response part
// =============================================================================

/// `Set-Cookie` header for the cart cookie, if the response needs one.
#[derive(Debug, Default)]
pub struct CartCookie(Option<HeaderValue>);

impl CartCookie {
    /// Leave the cookie as it is.
    #[must_use]
    pub const fn unchanged() -> Self {
        Self(None)
    }

    /// Issue a cookie holding `cart`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the cart cannot be encoded.
    pub fn set(cart: &Cart, secure: bool) -> Result<Self, AppError> {
        let value = encode_cart(cart).map_err(|e| AppError::Internal(e.to_string()))?;
        let mut cookie = base_cookie(value, secure);
        cookie.set_max_age(Duration::days(CART_COOKIE_MAX_AGE_DAYS));
        Self::from_cookie(&cookie)
    }

    /// Expire the cookie.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if the header cannot be built.
    pub fn clear(secure: bool) -> Result<Self, AppError> {
        let mut cookie = base_cookie(String::new(), secure);
        cookie.make_removal();
        Self::from_cookie(&cookie)
    }

    fn from_cookie(cookie: &Cookie<'_>) -> Result<Self, AppError> {
        HeaderValue::from_str(&cookie.to_string())
            .map(|value| Self(Some(value)))
            .map_err(|e| AppError::Internal(format!("invalid cart cookie header: {e}")))
    }

    /// The header value, if one will be sent.
    #[must_use]
    pub const fn header(&self) -> Option<&HeaderValue> {
        self.0.as_ref()
    }
}

impl IntoResponseParts for CartCookie {
    type Error = Infallible;

    fn into_response_parts(self, mut res: ResponseParts) -> Result<ResponseParts, Self::Error> {
        if let Some(value) = self.0 {
            res.headers_mut().append(SET_COOKIE, value);
        }
        Ok(res)
    }
}

/// Carry out a cart write instruction.
///
/// User carts are saved immediately; cookie carts come back as the header to
/// attach to the response.
///
/// # Errors
///
/// Returns `AppError::Commerce` (storage) if saving a user cart fails.
#[tracing::instrument(skip(state, cart), fields(items = cart.items().len()))]
pub async fn store_cart(
    state: &AppState,
    write: CartWrite,
    cart: &Cart,
) -> Result<CartCookie, AppError> {
    let secure = state.config().is_secure();
    match write {
        CartWrite::Keep => Ok(CartCookie::unchanged()),
        CartWrite::SaveUserCart(user_id) => {
            UserRepository::new(state.pool()).save(user_id, cart).await?;
            Ok(CartCookie::unchanged())
        }
        CartWrite::SetCookie => CartCookie::set(cart, secure),
        CartWrite::ClearCookie => CartCookie::clear(secure),
    }
}

// =============================================================================
// Extractor
// =============================================================================

/// The cart the current request operates on, and where it lives.
#[derive(Debug, Clone)]
pub struct ActiveCart {
    pub source: CartSource,
    pub cart: Cart,
    pub user: Option<CurrentUser>,
}

impl FromRequestParts<AppState> for ActiveCart {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match current_user(parts).await {
            Some(user) => {
                let cart = UserRepository::new(state.pool()).load(user.id).await?;
                Ok(Self {
                    source: CartSource::Persisted(user.id),
                    cart,
                    user: Some(user),
                })
            }
            None => {
                let cart = read_cart_cookie(&parts.headers)
                    .map(|raw| decode_cart(&raw))
                    .unwrap_or_default();
                Ok(Self {
                    source: CartSource::Ephemeral,
                    cart,
                    user: None,
                })
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use corner_shop_core::{CartItem, ProductId, Quantity};

    fn cookie_cart() -> Cart {
        serde_json::from_value(serde_json::json!({
            "items": [
                { "productId": 3, "quantity": 2 },
                { "productId": 8, "quantity": 1 }
            ],
            "total": "12.50"
        }))
        .unwrap()
    }

    #[test]
    fn test_cookie_value_is_url_encoded_json() {
        let encoded = encode_cart(&cookie_cart()).unwrap();
        assert!(!encoded.contains('{'));
        assert!(!encoded.contains('"'));
        let json = urlencoding::decode(&encoded).unwrap();
        assert!(json.contains("\"productId\":3"));
        assert!(json.contains("\"total\":\"12.50\""));
    }

    #[test]
    fn test_decode_restores_cart() {
        let cart = cookie_cart();
        let decoded = decode_cart(&encode_cart(&cart).unwrap());
        assert_eq!(decoded, cart);
        assert_eq!(decoded.count(), 3);
    }

    #[test]
    fn test_garbage_is_an_empty_cart() {
        let zero_quantity = urlencoding::encode(r#"{"items":[{"productId":1,"quantity":0}]}"#);
        for raw in ["", "not-json", "%7B%22items%22%3A", "%E0%A4%A", &zero_quantity] {
            assert!(decode_cart(raw).is_empty(), "{raw:?} should decode to an empty cart");
        }
    }

    #[test]
    fn test_duplicate_lines_are_merged() {
        let raw = urlencoding::encode(
            r#"{"items":[{"productId":5,"quantity":1},{"productId":5,"quantity":2}],"total":"0"}"#,
        );
        let cart = decode_cart(&raw);
        assert_eq!(
            cart.items(),
            &[CartItem {
                product_id: ProductId::new(5),
                quantity: Quantity::new(3).unwrap(),
            }]
        );
    }

    #[test]
    fn test_reads_cart_among_other_cookies() {
        let encoded = encode_cart(&cookie_cart()).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_str(&format!(
                "cs_session=abc; {CART_COOKIE_NAME}={encoded}; theme=dark"
            ))
            .unwrap(),
        );
        assert_eq!(read_cart_cookie(&headers).unwrap(), encoded);

        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("cs_session=abc"));
        assert!(read_cart_cookie(&headers).is_none());
    }

    #[test]
    fn test_set_cookie_attributes() {
        let cookie = CartCookie::set(&cookie_cart(), false).unwrap();
        let header = cookie.header().unwrap().to_str().unwrap();
        assert!(header.starts_with("cart="));
        assert!(header.contains("Max-Age=604800"));
        assert!(header.contains("Path=/"));
        assert!(header.contains("SameSite=Lax"));
        assert!(header.contains("HttpOnly"));
        assert!(!header.contains("Secure"));
    }

    #[test]
    fn test_clear_cookie_expires_it() {
        let cookie = CartCookie::clear(true).unwrap();
        let header = cookie.header().unwrap().to_str().unwrap();
        assert!(header.starts_with("cart=;"));
        assert!(header.contains("Max-Age=0"));
        assert!(header.contains("Secure"));
    }

    #[test]
    fn test_unchanged_sends_nothing() {
        assert!(CartCookie::unchanged().header().is_none());
    }
}
