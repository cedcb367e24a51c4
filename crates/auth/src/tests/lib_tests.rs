use super::*;

fn test_config() -> TokenConfig {
    TokenConfig {
        secret: "devsecret".into(),
        ttl_seconds: 60,
    }
}

#[test]
fn minted_token_verifies_to_the_subject() {
    let cfg = test_config();
    let token = mint_session_token(&cfg, &SubjectId::from("user-7")).expect("token");

    let subject = verify_session_token(&cfg, Some(&token)).expect("verify");
    assert_eq!(subject, SubjectId::from("user-7"));
}

#[test]
fn token_claims_contain_subject_and_future_expiry() {
    let cfg = test_config();
    let token = mint_session_token(&cfg, &SubjectId::from("user-7")).expect("token");

    let decoded = decode::<serde_json::Value>(
        &token,
        &DecodingKey::from_secret(cfg.secret.as_bytes()),
        &Validation::default(),
    )
    .expect("decode");

    assert_eq!(decoded.claims["sub"], "user-7");
    assert!(decoded.claims["exp"].as_i64().expect("exp") > Utc::now().timestamp());
}

#[test]
fn missing_token_is_rejected() {
    let cfg = test_config();
    assert_eq!(verify_session_token(&cfg, None), Err(AuthError::Missing));
    assert_eq!(verify_session_token(&cfg, Some("")), Err(AuthError::Missing));
}

#[test]
fn garbage_token_is_rejected_as_invalid() {
    let cfg = test_config();
    assert_eq!(
        verify_session_token(&cfg, Some("not-a-jwt")),
        Err(AuthError::Invalid)
    );
}

#[test]
fn token_signed_with_another_secret_is_rejected_as_invalid() {
    let cfg = test_config();
    let other = TokenConfig {
        secret: "othersecret".into(),
        ttl_seconds: 60,
    };
    let token = mint_session_token(&other, &SubjectId::from("user-7")).expect("token");

    assert_eq!(
        verify_session_token(&cfg, Some(&token)),
        Err(AuthError::Invalid)
    );
}

#[test]
fn expired_token_is_rejected_as_expired() {
    let cfg = TokenConfig {
        secret: "devsecret".into(),
        ttl_seconds: -30,
    };
    let token = mint_session_token(&cfg, &SubjectId::from("user-7")).expect("token");

    assert_eq!(
        verify_session_token(&test_config(), Some(&token)),
        Err(AuthError::Expired)
    );
}
