use serde::Deserialize;
use serde_json::{json, Value};

use super::{TokenStore, UserIdentity};
use crate::error::{AuthError, GatewayError};
use crate::gateway::{ApiRequest, Gateway};

pub const LOGIN_PATH: &str = "token/";
pub const REGISTER_PATH: &str = "accounts/register/";
pub const GOOGLE_AUTH_PATH: &str = "accounts/google-auth/";

pub const REGIONAL_ADMIN_ROLE: &str = "regional_admin";
const GOOGLE_FALLBACK_USERNAME: &str = "GoogleUser";

/// Account creation form.
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<String>,
    pub admin_key: Option<String>,
}

impl Registration {
    /// The `accounts/register/` body. Unset optional fields are left out.
    pub fn to_body(&self) -> Value {
        let mut body = json!({
            "username": self.username,
            "email": self.email,
            "password": self.password,
        });
        if let Some(role) = &self.role {
            body["role"] = json!(role);
        }
        if let Some(admin_key) = &self.admin_key {
            body["admin_key"] = json!(admin_key);
        }
        body
    }
}

#[derive(Deserialize)]
struct IssuedTokens {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

#[derive(Deserialize)]
struct GoogleAuthResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
    #[serde(default)]
    user: Option<GoogleUser>,
}

#[derive(Deserialize)]
struct GoogleUser {
    #[serde(default)]
    username: Option<String>,
}

/// Creates sessions. The only component besides the gateway's refresh
/// routine that writes to the [`TokenStore`].
#[derive(Clone)]
pub struct AuthService {
    gateway: Gateway,
}

impl AuthService {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    fn tokens(&self) -> &TokenStore {
        self.gateway.tokens()
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<UserIdentity, AuthError> {
        self.login_as(username, password, false).await
    }

    async fn login_as(
        &self,
        username: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<UserIdentity, AuthError> {
        let request = ApiRequest::post(
            LOGIN_PATH,
            json!({ "username": username, "password": password }),
        )
        .anonymous();
        let issued: IssuedTokens = self
            .gateway
            .send(request)
            .await
            .map_err(|e| rejected(e, "Login failed"))?
            .json()?;

        let user = UserIdentity {
            username: username.to_string(),
            is_admin,
        };
        self.tokens()
            .establish(issued.access, issued.refresh, user.clone())
            .await?;
        tracing::info!(%username, "logged in");
        Ok(user)
    }

    /// Create the account, then log straight into it.
    pub async fn register(&self, form: &Registration) -> Result<UserIdentity, AuthError> {
        self.gateway
            .send(ApiRequest::post(REGISTER_PATH, form.to_body()).anonymous())
            .await
            .map_err(|e| rejected(e, "Registration failed"))?;
        tracing::info!(username = %form.username, role = ?form.role, "account registered");

        let is_admin = form.role.as_deref() == Some(REGIONAL_ADMIN_ROLE);
        self.login_as(&form.username, &form.password, is_admin).await
    }

    /// Trade a Google identity credential for a portal session.
    pub async fn google_exchange(&self, credential: &str) -> Result<UserIdentity, AuthError> {
        let response: GoogleAuthResponse = self
            .gateway
            .send(ApiRequest::post(GOOGLE_AUTH_PATH, json!({ "token": credential })).anonymous())
            .await
            .map_err(|e| rejected(e, "Google authentication failed"))?
            .json()?;

        let username = response
            .user
            .and_then(|u| u.username)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| GOOGLE_FALLBACK_USERNAME.to_string());
        let user = UserIdentity {
            username,
            is_admin: false,
        };
        self.tokens()
            .establish(response.access, response.refresh, user.clone())
            .await?;
        tracing::info!(username = %user.username, "logged in with google");
        Ok(user)
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        self.tokens().logout().await?;
        Ok(())
    }
}

/// A server refusal becomes a displayable message; anything else stays a
/// gateway error.
fn rejected(err: GatewayError, fallback: &str) -> AuthError {
    match err {
        GatewayError::Server { message, .. } => {
            AuthError::Rejected(message.unwrap_or_else(|| fallback.to_string()))
        }
        other => AuthError::Gateway(other),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::SessionEvent;
    use crate::storage::MemoryStore;
    use crate::test_support::{json_reply, status_reply, ScriptedTransport};

    fn service(transport: Arc<ScriptedTransport>) -> AuthService {
        let tokens = TokenStore::new(Arc::new(MemoryStore::new()));
        AuthService::new(Gateway::new(transport, tokens))
    }

    fn accounts() -> ScriptedTransport {
        ScriptedTransport::new(|req, _| match req.path.as_str() {
            LOGIN_PATH => match &req.body {
                Some(body) if body["password"] == "s3cret" => {
                    json_reply(200, json!({ "access": "a1", "refresh": "r1" }))
                }
                _ => json_reply(
                    401,
                    json!({ "detail": "No active account found with the given credentials" }),
                ),
            },
            REGISTER_PATH => match &req.body {
                Some(body) if body["username"] == "taken" => json_reply(
                    400,
                    json!({ "username": ["A user with that username already exists."] }),
                ),
                _ => json_reply(201, json!({ "username": "ok" })),
            },
            GOOGLE_AUTH_PATH => json_reply(200, json!({ "access": "g1", "refresh": "gr1" })),
            _ => status_reply(404),
        })
    }

    #[tokio::test]
    async fn login_establishes_session() {
        let auth = service(Arc::new(accounts()));
        let mut events = auth.tokens().subscribe();

        let user = auth.login("ravi", "s3cret").await.unwrap();

        assert_eq!(user.username, "ravi");
        assert!(!user.is_admin);
        assert_eq!(auth.tokens().access_token().as_deref(), Some("a1"));
        assert_eq!(auth.tokens().refresh_token().as_deref(), Some("r1"));
        assert_eq!(
            events.recv().await.unwrap(),
            SessionEvent::LoggedIn {
                username: "ravi".into()
            }
        );
    }

    #[tokio::test]
    async fn bad_credentials_surface_server_detail() {
        let auth = service(Arc::new(accounts()));

        let err = auth.login("ravi", "wrong").await.unwrap_err();

        assert_eq!(
            err.to_string(),
            "No active account found with the given credentials"
        );
        assert!(!auth.tokens().is_authenticated());
    }

    #[tokio::test]
    async fn login_without_message_uses_fallback() {
        let auth = service(Arc::new(ScriptedTransport::new(|_, _| status_reply(500))));
        let err = auth.login("ravi", "s3cret").await.unwrap_err();
        assert!(matches!(err, AuthError::Rejected(ref m) if m == "Login failed"));
    }

    #[tokio::test]
    async fn regional_admin_registration_logs_in_as_admin() {
        let transport = Arc::new(accounts());
        let auth = service(transport.clone());

        let user = auth
            .register(&Registration {
                username: "asha".into(),
                email: "asha@example.org".into(),
                password: "s3cret".into(),
                role: Some(REGIONAL_ADMIN_ROLE.into()),
                admin_key: Some("key".into()),
            })
            .await
            .unwrap();

        assert!(user.is_admin);
        assert_eq!(auth.tokens().user(), Some(user));
        let calls = transport.calls();
        assert_eq!(calls[0].path, REGISTER_PATH);
        assert_eq!(calls[0].body.as_ref().unwrap()["role"], "regional_admin");
        assert_eq!(calls[1].path, LOGIN_PATH);
    }

    #[tokio::test]
    async fn registration_field_error_is_reported() {
        let transport = Arc::new(accounts());
        let auth = service(transport.clone());

        let err = auth
            .register(&Registration {
                username: "taken".into(),
                email: "t@example.org".into(),
                password: "s3cret".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();

        assert_eq!(
            err.to_string(),
            "username: A user with that username already exists."
        );
        assert_eq!(transport.calls().len(), 1);
        let body = transport.calls()[0].body.clone().unwrap();
        assert!(body.get("role").is_none());
    }

    #[test]
    fn registration_body_includes_only_set_fields() {
        let form = Registration {
            username: "asha".into(),
            email: "asha@example.org".into(),
            password: "s3cret".into(),
            role: Some(REGIONAL_ADMIN_ROLE.into()),
            admin_key: None,
        };

        assert_eq!(
            form.to_body(),
            json!({
                "username": "asha",
                "email": "asha@example.org",
                "password": "s3cret",
                "role": "regional_admin"
            })
        );
    }

    #[tokio::test]
    async fn google_exchange_defaults_username() {
        let auth = service(Arc::new(accounts()));

        let user = auth.google_exchange("google-jwt").await.unwrap();

        assert_eq!(user.username, "GoogleUser");
        assert_eq!(auth.tokens().access_token().as_deref(), Some("g1"));
    }

    #[tokio::test]
    async fn logout_clears_session() {
        let auth = service(Arc::new(accounts()));
        auth.login("ravi", "s3cret").await.unwrap();
        let mut events = auth.tokens().subscribe();

        auth.logout().await.unwrap();

        assert!(!auth.tokens().is_authenticated());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::LoggedOut);
    }
}
