use std::sync::Arc;

use crate::models::RegisterRequest;
use crate::services::{SessionService, UserService};
use crate::tests::common::create_test_db;
use crate::utils::{ApiError, JwtUtil};

async fn create_test_user_service() -> (UserService, Arc<SessionService>, Arc<JwtUtil>) {
    let pool = create_test_db().await;
    let sessions = Arc::new(SessionService::new(pool.clone()));
    let jwt = Arc::new(JwtUtil::new("test-secret", 3600));
    let service = UserService::new(pool, Arc::clone(&sessions), Arc::clone(&jwt));
    (service, sessions, jwt)
}

fn register_request(username: &str, email: &str) -> RegisterRequest {
    RegisterRequest {
        username: username.to_string(),
        email: email.to_string(),
        password: "s3cret".to_string(),
        full_name: None,
    }
}

#[tokio::test]
async fn test_register_and_login() {
    let (service, sessions, jwt) = create_test_user_service().await;

    let user = service.register(register_request("alice", "alice@example.com")).await.unwrap();
    assert_eq!(user.username, "alice");
    assert_ne!(user.password_hash, "s3cret");

    let login = service.login("alice", "s3cret").await.unwrap();
    assert_eq!(login.token_type, "bearer");
    assert_eq!(jwt.verify_token(&login.access_token).unwrap().sub, "alice");

    let session = sessions.get(login.session_id.parse().unwrap()).await.unwrap();
    assert_eq!(session.user_id, user.id);
    assert!(session.expires_at.is_some_and(|exp| exp > session.created_at));
}

#[tokio::test]
async fn test_register_duplicate_rejected() {
    let (service, _sessions, _jwt) = create_test_user_service().await;
    service.register(register_request("bob", "bob@example.com")).await.unwrap();

    let same_name = service.register(register_request("bob", "other@example.com")).await;
    assert!(matches!(same_name, Err(ApiError::ValidationError(_))));

    let same_email = service.register(register_request("robert", "bob@example.com")).await;
    assert!(matches!(same_email, Err(ApiError::ValidationError(_))));

    assert_eq!(service.count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_login_failures() {
    let (service, sessions, _jwt) = create_test_user_service().await;
    service.register(register_request("carol", "carol@example.com")).await.unwrap();

    assert!(matches!(service.login("carol", "wrong").await, Err(ApiError::InvalidCredentials)));
    assert!(matches!(service.login("nobody", "s3cret").await, Err(ApiError::InvalidCredentials)));
    assert_eq!(sessions.count().await.unwrap(), 0);
}
