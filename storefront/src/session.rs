use axum::extract::{FromRef, FromRequestParts};
use axum::http::request::Parts;
use axum::response::IntoResponse;
use axum_extra::extract::cookie::{Cookie, Key, SameSite};
use axum_extra::extract::SignedCookieJar;
use uuid::Uuid;

const COOKIE_NAME: &str = "storefront_sid";

/// Anonymous cart/checkout session bound to a signed, HttpOnly cookie. Carries
/// no customer identity by itself — `/orders/mine` additionally requires a
/// Nostr pubkey to be supplied out of band and matched at the store layer.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    is_new: bool,
}

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
    Key: FromRef<S>,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jar = SignedCookieJar::<Key>::from_request_parts(parts, state).await.unwrap();
        match jar.get(COOKIE_NAME) {
            Some(cookie) => Ok(Session { id: cookie.value().to_string(), is_new: false }),
            None => Ok(Session { id: Uuid::new_v4().to_string(), is_new: true }),
        }
    }
}

impl Session {
    /// Attaches this session's id to `jar` as a signed, HttpOnly cookie when
    /// it was freshly minted for this request.
    pub fn apply_to(&self, jar: SignedCookieJar<Key>) -> SignedCookieJar<Key> {
        if !self.is_new {
            return jar;
        }
        let cookie = Cookie::build((COOKIE_NAME, self.id.clone()))
            .http_only(true)
            .same_site(SameSite::Lax)
            .path("/")
            .build();
        jar.add(cookie)
    }
}

pub fn response_with_session(session: &Session, jar: SignedCookieJar<Key>, body: impl IntoResponse) -> impl IntoResponse {
    (session.apply_to(jar), body)
}
