use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};
use uuid::Uuid;

/// Claims carried by relay access tokens.
///
/// Tokens are issued by the identity collaborator; this middleware only
/// validates them. `sub` is the user id, `device_id` the device the token
/// was minted for.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub device_id: String,
    pub exp: usize,
    pub iat: usize,
}

/// Authenticated (user, device) pair extracted from the bearer token.
///
/// Every inbox query downstream must bind to `device_id` from this struct,
/// never to an id taken from a request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub user_id: Uuid,
    pub device_id: Uuid,
}

/// Bearer-token authentication middleware.
///
/// Decodes the HS256 token, resolves `(user_id, device_id)` and stores a
/// [`DeviceIdentity`] in request extensions. Introspection endpoints
/// (`/health`, `/metrics`, `/v1/openapi.json`) are exempt.
pub struct DeviceAuthMiddleware {
    secret: String,
}

impl DeviceAuthMiddleware {
    pub fn new(secret: String) -> Self {
        Self { secret }
    }
}

impl<S, B> Transform<S, ServiceRequest> for DeviceAuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = DeviceAuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(DeviceAuthMiddlewareService {
            service,
            secret: self.secret.clone(),
        }))
    }
}

pub struct DeviceAuthMiddlewareService<S> {
    service: S,
    secret: String,
}

fn is_exempt(path: &str) -> bool {
    matches!(path, "/health" | "/metrics" | "/v1/openapi.json")
}

impl<S, B> Service<ServiceRequest> for DeviceAuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if is_exempt(req.path()) {
            let fut = self.service.call(req);
            return Box::pin(async move { fut.await });
        }

        let auth_header = match req.headers().get("Authorization").map(|h| h.to_str()) {
            Some(Ok(value)) => value,
            Some(Err(_)) => {
                return Box::pin(async move {
                    Err(actix_web::error::ErrorUnauthorized(
                        "Invalid Authorization header",
                    ))
                });
            }
            None => {
                return Box::pin(async move {
                    Err(actix_web::error::ErrorUnauthorized(
                        "Missing Authorization header",
                    ))
                });
            }
        };

        let token = match auth_header.strip_prefix("Bearer ") {
            Some(t) => t,
            None => {
                return Box::pin(async move {
                    Err(actix_web::error::ErrorUnauthorized(
                        "Authorization must use Bearer scheme",
                    ))
                });
            }
        };

        let decoding_key = DecodingKey::from_secret(self.secret.as_bytes());
        let token_data =
            match decode::<Claims>(token, &decoding_key, &Validation::new(Algorithm::HS256)) {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(error = %e, "rejected bearer token");
                    return Box::pin(async move {
                        Err(actix_web::error::ErrorUnauthorized("Invalid token"))
                    });
                }
            };

        let identity = match (
            Uuid::parse_str(&token_data.claims.sub),
            Uuid::parse_str(&token_data.claims.device_id),
        ) {
            (Ok(user_id), Ok(device_id)) => DeviceIdentity { user_id, device_id },
            _ => {
                tracing::warn!("bearer token carries malformed user or device id");
                return Box::pin(async move {
                    Err(actix_web::error::ErrorUnauthorized(
                        "Invalid token: malformed identity",
                    ))
                });
            }
        };

        req.extensions_mut().insert(identity);

        let fut = self.service.call(req);
        Box::pin(async move { fut.await })
    }
}

impl actix_web::FromRequest for DeviceIdentity {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(
        req: &actix_web::HttpRequest,
        _payload: &mut actix_web::dev::Payload,
    ) -> Self::Future {
        match req.extensions().get::<DeviceIdentity>() {
            Some(identity) => ready(Ok(*identity)),
            None => ready(Err(actix_web::error::ErrorUnauthorized(
                "Device not authenticated",
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, web, App, HttpResponse};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn create_test_jwt(
        user_id: Uuid,
        device_id: Uuid,
        expires_in_seconds: i64,
        secret: &str,
    ) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.to_string(),
            device_id: device_id.to_string(),
            exp: (now + expires_in_seconds) as usize,
            iat: now as usize,
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    async fn echo_identity(identity: DeviceIdentity) -> actix_web::Result<HttpResponse> {
        Ok(HttpResponse::Ok().body(format!("{}:{}", identity.user_id, identity.device_id)))
    }

    #[actix_web::test]
    async fn test_valid_token_yields_identity() {
        let app = test::init_service(
            App::new()
                .wrap(DeviceAuthMiddleware::new("test-secret".to_string()))
                .route("/test", web::get().to(echo_identity)),
        )
        .await;

        let user_id = Uuid::new_v4();
        let device_id = Uuid::new_v4();
        let token = create_test_jwt(user_id, device_id, 3600, "test-secret");

        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
        let body = test::read_body(resp).await;
        assert_eq!(body, format!("{}:{}", user_id, device_id).as_bytes());
    }

    #[actix_web::test]
    async fn test_expired_token_rejected() {
        let app = test::init_service(
            App::new()
                .wrap(DeviceAuthMiddleware::new("test-secret".to_string()))
                .route("/test", web::get().to(echo_identity)),
        )
        .await;

        let token = create_test_jwt(Uuid::new_v4(), Uuid::new_v4(), -3600, "test-secret");
        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn test_wrong_secret_rejected() {
        let app = test::init_service(
            App::new()
                .wrap(DeviceAuthMiddleware::new("test-secret".to_string()))
                .route("/test", web::get().to(echo_identity)),
        )
        .await;

        let token = create_test_jwt(Uuid::new_v4(), Uuid::new_v4(), 3600, "other-secret");
        let req = test::TestRequest::get()
            .uri("/test")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn test_missing_header_rejected() {
        let app = test::init_service(
            App::new()
                .wrap(DeviceAuthMiddleware::new("test-secret".to_string()))
                .route("/test", web::get().to(echo_identity)),
        )
        .await;

        let req = test::TestRequest::get().uri("/test").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 401);
    }

    #[actix_web::test]
    async fn test_health_is_exempt() {
        async fn health() -> HttpResponse {
            HttpResponse::Ok().finish()
        }

        let app = test::init_service(
            App::new()
                .wrap(DeviceAuthMiddleware::new("test-secret".to_string()))
                .route("/health", web::get().to(health)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 200);
    }
}
