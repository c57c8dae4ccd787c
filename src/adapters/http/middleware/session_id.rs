use actix_web::{
  Error, HttpMessage,
  body::MessageBody,
  cookie::{Cookie, SameSite},
  dev::{Service, ServiceRequest, ServiceResponse, Transform, forward_ready},
};
use futures_util::future::LocalBoxFuture;
use std::{
  future::{Ready, ready},
  rc::Rc,
};
use uuid::Uuid;

pub const SESSION_COOKIE: &str = "facturation_session";

/// Browser session middleware
///
/// Reads the `facturation_session` cookie, issuing a new UUID v4 when it is
/// absent or malformed, and stores the [`SessionId`] in request extensions.
/// The submission guard keys its per-session state on this id.
#[derive(Debug, Clone, Default)]
pub struct SessionIdMiddleware;

impl SessionIdMiddleware {
  pub fn new() -> Self {
    Self
  }
}

impl<S, B> Transform<S, ServiceRequest> for SessionIdMiddleware
where
  S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
  S::Future: 'static,
  B: MessageBody + 'static,
{
  type Response = ServiceResponse<B>;
  type Error = Error;
  type Transform = SessionIdMiddlewareService<S>;
  type InitError = ();
  type Future = Ready<Result<Self::Transform, Self::InitError>>;

  fn new_transform(&self, service: S) -> Self::Future {
    ready(Ok(SessionIdMiddlewareService {
      service: Rc::new(service),
    }))
  }
}

pub struct SessionIdMiddlewareService<S> {
  service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for SessionIdMiddlewareService<S>
where
  S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
  S::Future: 'static,
  B: MessageBody + 'static,
{
  type Response = ServiceResponse<B>;
  type Error = Error;
  type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

  forward_ready!(service);

  fn call(&self, req: ServiceRequest) -> Self::Future {
    let service = Rc::clone(&self.service);

    Box::pin(async move {
      let existing = req
        .cookie(SESSION_COOKIE)
        .and_then(|c| Uuid::parse_str(c.value()).ok());
      let session_id = SessionId(existing.unwrap_or_else(Uuid::new_v4));

      req.extensions_mut().insert(session_id);

      let mut res = service.call(req).await?;

      if existing.is_none() {
        let cookie = Cookie::build(SESSION_COOKIE, session_id.to_string())
          .path("/")
          .http_only(true)
          .same_site(SameSite::Lax)
          .finish();
        res.response_mut().add_cookie(&cookie)?;
      }

      Ok(res)
    })
  }
}

/// Session identifier stored in request extensions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionId(pub Uuid);

impl std::fmt::Display for SessionId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(f, "{}", self.0)
  }
}

pub trait SessionIdExt {
  /// `None` when the middleware is not configured.
  fn session_id(&self) -> Option<SessionId>;
}

impl SessionIdExt for actix_web::HttpRequest {
  fn session_id(&self) -> Option<SessionId> {
    self.extensions().get::<SessionId>().copied()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use actix_web::{
    App, HttpRequest, HttpResponse,
    test::{self, TestRequest},
    web,
  };

  async fn echo_session(req: HttpRequest) -> HttpResponse {
    let session_id = req.session_id().expect("session id set by middleware");
    HttpResponse::Ok().body(session_id.to_string())
  }

  #[actix_web::test]
  async fn test_new_session_sets_cookie() {
    let app = test::init_service(
      App::new()
        .wrap(SessionIdMiddleware::new())
        .route("/", web::get().to(echo_session)),
    )
    .await;

    let resp = test::call_service(&app, TestRequest::get().uri("/").to_request()).await;
    let cookie = resp
      .response()
      .cookies()
      .find(|c| c.name() == SESSION_COOKIE)
      .expect("session cookie");
    let issued = cookie.value().to_string();
    assert!(Uuid::parse_str(&issued).is_ok());

    let body = test::read_body(resp).await;
    assert_eq!(body, issued.as_bytes());
  }

  #[actix_web::test]
  async fn test_existing_session_is_kept() {
    let app = test::init_service(
      App::new()
        .wrap(SessionIdMiddleware::new())
        .route("/", web::get().to(echo_session)),
    )
    .await;

    let id = Uuid::new_v4().to_string();
    let req = TestRequest::get()
      .uri("/")
      .cookie(Cookie::new(SESSION_COOKIE, id.clone()))
      .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(resp.response().cookies().next().is_none());
    assert_eq!(test::read_body(resp).await, id.as_bytes());
  }

  #[actix_web::test]
  async fn test_malformed_cookie_is_replaced() {
    let app = test::init_service(
      App::new()
        .wrap(SessionIdMiddleware::new())
        .route("/", web::get().to(echo_session)),
    )
    .await;

    let req = TestRequest::get()
      .uri("/")
      .cookie(Cookie::new(SESSION_COOKIE, "forged"))
      .to_request();
    let resp = test::call_service(&app, req).await;

    assert!(
      resp
        .response()
        .cookies()
        .any(|c| c.name() == SESSION_COOKIE && c.value() != "forged")
    );
  }
}
