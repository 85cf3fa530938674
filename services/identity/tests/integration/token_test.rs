use std::collections::BTreeSet;

use chrono::{Duration, Utc};

use gatehouse_auth_types::token::validate_access_token;
use gatehouse_domain::id::AccountId;
use gatehouse_identity::domain::repository::TokenRepository;
use gatehouse_identity::domain::types::{
    AuditEventKind, AuditOutcome, ClientMeta, NewRefreshToken, REFRESH_TOKEN_LEN,
};
use gatehouse_identity::error::ErrorKind;
use gatehouse_identity::usecase::secret::{generate_token, hash_token};
use gatehouse_identity::usecase::token::{LoginInput, TokenSettings, issue_access_token};

use crate::helpers::{
    PASSWORD, RecordingAuditSink, RecordingNotifier, TEST_JWT_SECRET, seed_account,
    seed_admin_role, test_config, test_env, test_env_with,
};

fn login_input(email: &str, password: &str) -> LoginInput {
    LoginInput {
        email: email.to_owned(),
        password: password.to_owned(),
        meta: ClientMeta {
            ip: Some("203.0.113.7".to_owned()),
            user_agent: Some("integration-test".to_owned()),
            ..ClientMeta::default()
        },
    }
}

// ── Login ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_login_and_embed_permission_snapshot() {
    let env = test_env();
    let admin = seed_admin_role(&env.store).await;
    let account = seed_account(&env.ctx, "alice@example.com", vec![admin.id]).await;

    let session = env
        .ctx
        .login()
        .execute(login_input("alice@example.com", PASSWORD))
        .await
        .unwrap();

    assert_eq!(session.account.id, account.id);
    assert_eq!(session.tokens.refresh_token.len(), REFRESH_TOKEN_LEN);

    let info = validate_access_token(&session.tokens.access_token, TEST_JWT_SECRET).unwrap();
    assert_eq!(info.account_id, account.id);
    assert_eq!(info.access_token_exp, session.tokens.access_token_exp);
    assert!(info.has_permission("users:delete"));
    assert_eq!(info.permissions, session.permissions);
}

#[tokio::test]
async fn should_store_only_hash_of_refresh_token() {
    let env = test_env();
    seed_account(&env.ctx, "alice@example.com", vec![]).await;

    let session = env
        .ctx
        .login()
        .execute(login_input("alice@example.com", PASSWORD))
        .await
        .unwrap();
    let raw = &session.tokens.refresh_token;

    assert!(
        TokenRepository::find_by_hash(&env.store, raw)
            .await
            .unwrap()
            .is_none()
    );
    let record = TokenRepository::find_by_hash(&env.store, &hash_token(raw))
        .await
        .unwrap()
        .expect("stored by hash");
    assert_eq!(record.expires_at, session.tokens.refresh_token_expires_at);
    assert!(!record.is_mobile);
}

#[tokio::test]
async fn should_normalize_email_on_login() {
    let env = test_env();
    seed_account(&env.ctx, "alice@example.com", vec![]).await;

    let result = env
        .ctx
        .login()
        .execute(login_input("  ALICE@Example.com ", PASSWORD))
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn should_give_mobile_sessions_the_longer_ttl() {
    let env = test_env();
    seed_account(&env.ctx, "alice@example.com", vec![]).await;
    let mut input = login_input("alice@example.com", PASSWORD);
    input.meta.is_mobile = true;
    input.meta.device_name = Some("Pixel 9".to_owned());

    let before = Utc::now();
    let session = env.ctx.login().execute(input).await.unwrap();

    assert!(session.tokens.refresh_token_expires_at >= before + Duration::days(30));
    let record = TokenRepository::find_by_hash(&env.store, &hash_token(&session.tokens.refresh_token))
        .await
        .unwrap()
        .unwrap();
    assert!(record.is_mobile);
    assert_eq!(record.device_name.as_deref(), Some("Pixel 9"));
}

#[tokio::test]
async fn should_reject_wrong_password_and_audit_failure() {
    let env = test_env();
    let account = seed_account(&env.ctx, "alice@example.com", vec![]).await;

    let err = env
        .ctx
        .login()
        .execute(login_input("alice@example.com", "wrong-password"))
        .await
        .unwrap_err();
    assert_eq!(err.op, "login");
    assert!(matches!(err.kind(), ErrorKind::InvalidCredentials));

    let events = env.audit.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, AuditEventKind::Login);
    assert_eq!(events[0].outcome, AuditOutcome::Failure);
    assert_eq!(events[0].account_id, Some(account.id));
    assert_eq!(events[0].reason, Some("INVALID_CREDENTIALS"));
    assert_eq!(events[0].ip.as_deref(), Some("203.0.113.7"));
}

#[tokio::test]
async fn should_report_unknown_email_as_account_not_found() {
    let env = test_env();

    let err = env
        .ctx
        .login()
        .execute(login_input("ghost@example.com", PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::AccountNotFound));
    assert!(matches!(err.into_kind().masked(), ErrorKind::InvalidCredentials));
    assert_eq!(env.audit.events()[0].account_id, None);
}

#[tokio::test]
async fn should_walk_login_scenario_through_deactivation() {
    let env = test_env();
    let account = seed_account(&env.ctx, "alice@example.com", vec![]).await;

    // happy path
    let session = env
        .ctx
        .login()
        .execute(login_input("alice@example.com", PASSWORD))
        .await
        .unwrap();

    // wrong password
    let err = env
        .ctx
        .login()
        .execute(login_input("alice@example.com", "nope-nope-nope"))
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidCredentials));

    // deactivated
    env.ctx
        .set_account_active()
        .execute(account.id, false)
        .await
        .unwrap();
    let err = env
        .ctx
        .login()
        .execute(login_input("alice@example.com", PASSWORD))
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::AccountInactive));

    // deactivation ended the earlier session
    let err = env
        .ctx
        .refresh_token()
        .execute(&session.tokens.refresh_token, &ClientMeta::default())
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::TokenNotFound));

    let outcomes: Vec<_> = env.audit.events().iter().map(|e| e.outcome).collect();
    assert_eq!(
        outcomes,
        [
            AuditOutcome::Success,
            AuditOutcome::Failure,
            AuditOutcome::Failure,
            AuditOutcome::Failure
        ]
    );
}

#[tokio::test]
async fn should_login_even_when_audit_sink_fails() {
    let env = test_env_with(
        test_config(),
        RecordingNotifier::default(),
        RecordingAuditSink::failing(),
    );
    seed_account(&env.ctx, "alice@example.com", vec![]).await;

    let result = env
        .ctx
        .login()
        .execute(login_input("alice@example.com", PASSWORD))
        .await;
    assert!(result.is_ok());
}

// ── RefreshToken ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_rotate_refresh_token() {
    let env = test_env();
    seed_account(&env.ctx, "alice@example.com", vec![]).await;
    let login = env
        .ctx
        .login()
        .execute(login_input("alice@example.com", PASSWORD))
        .await
        .unwrap();

    let refreshed = env
        .ctx
        .refresh_token()
        .execute(&login.tokens.refresh_token, &ClientMeta::default())
        .await
        .unwrap();
    assert_ne!(refreshed.tokens.refresh_token, login.tokens.refresh_token);
    assert_eq!(refreshed.account.id, login.account.id);

    // the old value never validates again
    let err = env
        .ctx
        .refresh_token()
        .execute(&login.tokens.refresh_token, &ClientMeta::default())
        .await
        .unwrap_err();
    assert_eq!(err.op, "refresh_token");
    assert!(matches!(err.kind(), ErrorKind::TokenNotFound));

    // the new one does
    assert!(
        env.ctx
            .refresh_token()
            .execute(&refreshed.tokens.refresh_token, &ClientMeta::default())
            .await
            .is_ok()
    );

    let refresh_events: Vec<_> = env
        .audit
        .events()
        .into_iter()
        .filter(|e| e.kind == AuditEventKind::Refresh)
        .map(|e| e.outcome)
        .collect();
    assert_eq!(
        refresh_events,
        [AuditOutcome::Success, AuditOutcome::Failure, AuditOutcome::Success]
    );
}

#[tokio::test]
async fn should_carry_session_metadata_through_rotation() {
    let env = test_env();
    seed_account(&env.ctx, "alice@example.com", vec![]).await;
    let mut input = login_input("alice@example.com", PASSWORD);
    input.meta.is_mobile = true;
    input.meta.device_name = Some("iPad".to_owned());
    let login = env.ctx.login().execute(input).await.unwrap();

    let refreshed = env
        .ctx
        .refresh_token()
        .execute(&login.tokens.refresh_token, &ClientMeta::default())
        .await
        .unwrap();

    let record = TokenRepository::find_by_hash(&env.store, &hash_token(&refreshed.tokens.refresh_token))
        .await
        .unwrap()
        .unwrap();
    assert!(record.is_mobile);
    assert_eq!(record.device_name.as_deref(), Some("iPad"));
}

#[tokio::test]
async fn should_reject_malformed_refresh_token() {
    let env = test_env();
    let bad_chars = "!".repeat(REFRESH_TOKEN_LEN);
    for value in ["", "short", bad_chars.as_str()] {
        let err = env
            .ctx
            .refresh_token()
            .execute(value, &ClientMeta::default())
            .await
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::InvalidToken), "{value:?}");
    }
}

#[tokio::test]
async fn should_reject_unknown_refresh_token() {
    let env = test_env();
    let err = env
        .ctx
        .refresh_token()
        .execute(&generate_token(REFRESH_TOKEN_LEN), &ClientMeta::default())
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::TokenNotFound));
}

#[tokio::test]
async fn should_delete_expired_refresh_token_on_use() {
    let env = test_env();
    let account = seed_account(&env.ctx, "alice@example.com", vec![]).await;
    let value = generate_token(REFRESH_TOKEN_LEN);
    TokenRepository::create(
        &env.store,
        &NewRefreshToken {
            account_id: account.id,
            token_hash: hash_token(&value),
            expires_at: Utc::now() - Duration::minutes(1),
            is_mobile: false,
            device_name: None,
        },
    )
    .await
    .unwrap();

    let err = env
        .ctx
        .refresh_token()
        .execute(&value, &ClientMeta::default())
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::TokenExpired));
    assert!(
        TokenRepository::find_by_hash(&env.store, &hash_token(&value))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn should_refuse_refresh_for_inactive_account_and_keep_token() {
    let env = test_env();
    let account = seed_account(&env.ctx, "alice@example.com", vec![]).await;
    let value = generate_token(REFRESH_TOKEN_LEN);
    TokenRepository::create(
        &env.store,
        &NewRefreshToken {
            account_id: account.id,
            token_hash: hash_token(&value),
            expires_at: Utc::now() + Duration::hours(1),
            is_mobile: false,
            device_name: None,
        },
    )
    .await
    .unwrap();

    // Flip the flag directly so the session survives.
    gatehouse_identity::domain::repository::AccountRepository::set_active(
        &env.store,
        account.id,
        false,
    )
    .await
    .unwrap();

    let err = env
        .ctx
        .refresh_token()
        .execute(&value, &ClientMeta::default())
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::AccountInactive));
    assert!(
        TokenRepository::find_by_hash(&env.store, &hash_token(&value))
            .await
            .unwrap()
            .is_some()
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_let_only_one_concurrent_rotation_win() {
    let env = test_env();
    seed_account(&env.ctx, "alice@example.com", vec![]).await;
    let login = env
        .ctx
        .login()
        .execute(login_input("alice@example.com", PASSWORD))
        .await
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ctx = env.ctx.clone();
            let value = login.tokens.refresh_token.clone();
            tokio::spawn(async move {
                ctx.refresh_token()
                    .execute(&value, &ClientMeta::default())
                    .await
                    .map(|s| s.tokens.refresh_token)
                    .map_err(|e| e.code())
            })
        })
        .collect();

    let mut winners = Vec::new();
    for handle in handles {
        match handle.await.unwrap() {
            Ok(value) => winners.push(value),
            Err(code) => assert_eq!(code, "TOKEN_NOT_FOUND"),
        }
    }
    assert_eq!(winners.len(), 1);
}

// ── Logout / RevokeAllTokens / PurgeExpiredTokens ────────────────────────────

#[tokio::test]
async fn should_logout_and_invalidate_refresh_token() {
    let env = test_env();
    let account = seed_account(&env.ctx, "alice@example.com", vec![]).await;
    let login = env
        .ctx
        .login()
        .execute(login_input("alice@example.com", PASSWORD))
        .await
        .unwrap();

    env.ctx
        .logout()
        .execute(&login.tokens.refresh_token, &ClientMeta::default())
        .await;

    let err = env
        .ctx
        .refresh_token()
        .execute(&login.tokens.refresh_token, &ClientMeta::default())
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::TokenNotFound));

    let logout = env
        .audit
        .events()
        .into_iter()
        .find(|e| e.kind == AuditEventKind::Logout)
        .expect("logout audited");
    assert_eq!(logout.account_id, Some(account.id));
}

#[tokio::test]
async fn should_treat_logout_of_unknown_token_as_success() {
    let env = test_env();
    env.ctx.logout().execute("does-not-exist", &ClientMeta::default()).await;
    env.ctx.logout().execute("", &ClientMeta::default()).await;
    assert!(env.audit.events().is_empty());
}

#[tokio::test]
async fn should_revoke_all_sessions_of_account() {
    let env = test_env();
    let alice = seed_account(&env.ctx, "alice@example.com", vec![]).await;
    seed_account(&env.ctx, "bob@example.com", vec![]).await;
    for _ in 0..2 {
        env.ctx
            .login()
            .execute(login_input("alice@example.com", PASSWORD))
            .await
            .unwrap();
    }
    let bob = env
        .ctx
        .login()
        .execute(login_input("bob@example.com", PASSWORD))
        .await
        .unwrap();

    let count = env.ctx.revoke_all_tokens().execute(alice.id).await.unwrap();
    assert_eq!(count, 2);
    assert!(
        env.ctx
            .refresh_token()
            .execute(&bob.tokens.refresh_token, &ClientMeta::default())
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn should_purge_only_expired_refresh_tokens() {
    let env = test_env();
    let account = seed_account(&env.ctx, "alice@example.com", vec![]).await;
    for (hash, offset) in [("a", -10), ("b", -1), ("c", 10)] {
        TokenRepository::create(
            &env.store,
            &NewRefreshToken {
                account_id: account.id,
                token_hash: hash.to_owned(),
                expires_at: Utc::now() + Duration::minutes(offset),
                is_mobile: false,
                device_name: None,
            },
        )
        .await
        .unwrap();
    }

    assert_eq!(env.ctx.purge_expired_tokens().execute().await.unwrap(), 2);
    assert!(
        TokenRepository::find_by_hash(&env.store, "c")
            .await
            .unwrap()
            .is_some()
    );
}

// ── ValidateToken ────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_validate_access_token_to_account() {
    let env = test_env();
    let account = seed_account(&env.ctx, "alice@example.com", vec![]).await;
    let login = env
        .ctx
        .login()
        .execute(login_input("alice@example.com", PASSWORD))
        .await
        .unwrap();

    let resolved = env
        .ctx
        .validate_token()
        .execute(&login.tokens.access_token)
        .await
        .unwrap();
    assert_eq!(resolved.id, account.id);
    assert_eq!(resolved.email, "alice@example.com");
}

#[tokio::test]
async fn should_reject_tampered_or_foreign_access_token() {
    let env = test_env();
    seed_account(&env.ctx, "alice@example.com", vec![]).await;
    let login = env
        .ctx
        .login()
        .execute(login_input("alice@example.com", PASSWORD))
        .await
        .unwrap();

    let mut foreign = TokenSettings::from_config(&test_config());
    foreign.jwt_secret = "someone-else".to_owned();
    let (forged, _) =
        issue_access_token(login.account.id, &BTreeSet::new(), &foreign, Utc::now()).unwrap();

    let tampered = format!("{}x", login.tokens.access_token);
    for token in ["garbage", forged.as_str(), tampered.as_str()] {
        let err = env.ctx.validate_token().execute(token).await.unwrap_err();
        assert_eq!(err.op, "validate_token");
        assert!(matches!(err.kind(), ErrorKind::InvalidToken), "{token}");
    }
}

#[tokio::test]
async fn should_report_expired_access_token() {
    let env = test_env();
    let account = seed_account(&env.ctx, "alice@example.com", vec![]).await;
    let settings = TokenSettings::from_config(&test_config());
    let (token, _) = issue_access_token(
        account.id,
        &BTreeSet::new(),
        &settings,
        Utc::now() - Duration::hours(2),
    )
    .unwrap();

    let err = env.ctx.validate_token().execute(&token).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::TokenExpired));
}

#[tokio::test]
async fn should_reject_access_token_of_missing_or_inactive_account() {
    let env = test_env();
    let settings = TokenSettings::from_config(&test_config());

    let (orphan, _) =
        issue_access_token(AccountId(9999), &BTreeSet::new(), &settings, Utc::now()).unwrap();
    let err = env.ctx.validate_token().execute(&orphan).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::AccountNotFound));

    let account = seed_account(&env.ctx, "alice@example.com", vec![]).await;
    let (token, _) =
        issue_access_token(account.id, &BTreeSet::new(), &settings, Utc::now()).unwrap();
    env.ctx
        .set_account_active()
        .execute(account.id, false)
        .await
        .unwrap();
    let err = env.ctx.validate_token().execute(&token).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::AccountInactive));
}
