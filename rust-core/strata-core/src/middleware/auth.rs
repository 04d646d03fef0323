//! Bearer-token authentication.

use crate::api_error::ApiError;
use crate::auth::{AuthConfig, Claims};
use crate::context::HandlerContext;
use crate::database::DatabasePool;
use crate::handler::{Handler, HandlerResult};
use crate::optional::Optional;
use futures_util::future::{ready, BoxFuture, Ready};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, warn};

/// Confirms that the user and company of a valid token still exist
///
/// Implemented for any `Fn(Option<DatabasePool>, Claims) -> impl Future`.
/// An error is returned to the client as is.
pub trait IdentityCheck: Send + Sync + 'static {
    /// Check the identity in `claims`
    fn check(&self, db: Option<DatabasePool>, claims: Claims) -> BoxFuture<'static, HandlerResult<()>>;
}

impl<F, Fut> IdentityCheck for F
where
    F: Fn(Option<DatabasePool>, Claims) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    fn check(&self, db: Option<DatabasePool>, claims: Claims) -> BoxFuture<'static, HandlerResult<()>> {
        Box::pin(self(db, claims))
    }
}

/// Identity check that accepts every valid token
pub fn skip_identity_check(_db: Option<DatabasePool>, _claims: Claims) -> Ready<HandlerResult<()>> {
    ready(Ok(()))
}

/// Require a valid `Authorization: Bearer <token>` header
///
/// On success `ctx.user` and `ctx.company` are set from the token claims.
///
/// Errors:
/// - 401 `Authorization header required`
/// - 401 `Authorization header must start with 'Bearer '`
/// - 401 `Bearer token is required`
/// - 500 `Authentication configuration error` when no secret is configured
/// - 401 `Invalid or expired token`
/// - whatever `check` returns
pub fn require_auth<P, B, R, C>(
    config: AuthConfig,
    check: C,
) -> impl Fn(Handler<P, B, R>) -> Handler<P, B, R> + Send + Sync + 'static
where
    P: Send + 'static,
    B: Send + 'static,
    R: Send + 'static,
    C: IdentityCheck,
{
    let config = Arc::new(config);
    let check = Arc::new(check);
    move |next: Handler<P, B, R>| {
        let config = Arc::clone(&config);
        let check = Arc::clone(&check);
        Handler::new(move |mut ctx: HandlerContext<P, B>| {
            let next = next.clone();
            let config = Arc::clone(&config);
            let check = Arc::clone(&check);
            async move {
                let claims = authenticate(&config, &ctx)?;
                check.check(ctx.db.clone(), claims.clone()).await?;
                ctx.user = Optional::of(claims.user_uuid);
                ctx.company = Optional::of(claims.company_uuid);
                next.call(ctx).await
            }
        })
    }
}

fn authenticate<P, B>(config: &AuthConfig, ctx: &HandlerContext<P, B>) -> Result<Claims, ApiError> {
    let header = ctx.request.header("authorization").unwrap_or_default();
    if header.is_empty() {
        return Err(ApiError::unauthorized("Authorization header required"));
    }
    let Some(token) = header.strip_prefix("Bearer ") else {
        return Err(ApiError::unauthorized(
            "Authorization header must start with 'Bearer '",
        ));
    };
    let token = token.trim();
    if token.is_empty() {
        return Err(ApiError::unauthorized("Bearer token is required"));
    }
    if !config.is_configured() {
        error!(parent: &ctx.span, "JWT secret not configured");
        return Err(ApiError::internal("Authentication configuration error"));
    }
    config.validate_token(token).map_err(|e| {
        warn!(parent: &ctx.span, error = %e, "Invalid JWT token");
        ApiError::unauthorized("Invalid or expired token")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Dependencies;
    use crate::api_error::HandlerError;
    use crate::handler::{compose, Middleware};
    use crate::request::Request;
    use crate::response::ResponseWriter;
    use std::time::Duration;
    use uuid::Uuid;

    const SECRET: &str = "test-secret";

    fn whoami(config: AuthConfig) -> Handler<(), (), (Uuid, Uuid)> {
        let base = Handler::new(|ctx: HandlerContext<(), ()>| async move {
            let user = ctx.user.get().copied().unwrap_or_default();
            let company = ctx.company.get().copied().unwrap_or_default();
            Ok((user, company))
        });
        compose(base, &[Middleware::from_fn(require_auth(config, skip_identity_check))])
    }

    fn context(authorization: Option<&str>) -> HandlerContext<(), ()> {
        let mut request = Request::get("/me");
        if let Some(value) = authorization {
            request = request.with_header("Authorization", value);
        }
        HandlerContext::new(Arc::new(request), ResponseWriter::new(), &Dependencies::default())
    }

    async fn rejection(config: AuthConfig, authorization: Option<&str>) -> ApiError {
        match whoami(config).call(context(authorization)).await {
            Err(HandlerError::Api(e)) => e,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_valid_token_sets_identity() {
        let config = AuthConfig::new(SECRET);
        let (user, company) = (Uuid::new_v4(), Uuid::new_v4());
        let token = config.issue_token(user, company, Duration::from_secs(60)).unwrap();

        let out = whoami(config)
            .call(context(Some(&format!("Bearer {token}"))))
            .await
            .unwrap();
        assert_eq!(out, (user, company));
    }

    #[tokio::test]
    async fn test_header_errors() {
        let config = AuthConfig::new(SECRET);
        assert_eq!(
            rejection(config.clone(), None).await.message,
            "Authorization header required"
        );
        assert_eq!(
            rejection(config.clone(), Some("Basic abc")).await.message,
            "Authorization header must start with 'Bearer '"
        );
        let err = rejection(config, Some("Bearer not-a-jwt")).await;
        assert_eq!((err.code, err.message.as_str()), (401, "Invalid or expired token"));
    }

    #[tokio::test]
    async fn test_missing_secret_is_server_error() {
        let err = rejection(AuthConfig::default(), Some("Bearer abc")).await;
        assert_eq!((err.code, err.message.as_str()), (500, "Authentication configuration error"));
    }

    #[tokio::test]
    async fn test_identity_check_error_returned() {
        let config = AuthConfig::new(SECRET);
        let token = config
            .issue_token(Uuid::new_v4(), Uuid::new_v4(), Duration::from_secs(60))
            .unwrap();
        let check = |_db: Option<DatabasePool>, _claims: Claims| async {
            Err::<(), HandlerError>(ApiError::forbidden("User is not active").into())
        };
        let base = Handler::new(|_ctx: HandlerContext<(), ()>| async { Ok(()) });
        let handler = compose(base, &[Middleware::from_fn(require_auth(config, check))]);

        let result = handler.call(context(Some(&format!("Bearer {token}")))).await;
        assert!(matches!(result, Err(HandlerError::Api(e)) if e.code == 403));
    }

    #[test]
    fn test_middleware_name() {
        let mw: Middleware<(), (), ()> =
            Middleware::from_fn(require_auth(AuthConfig::new(SECRET), skip_identity_check));
        assert_eq!(mw.name(), "require_auth");
    }
}
