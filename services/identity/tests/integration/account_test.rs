use gatehouse_domain::id::{AccountId, RoleId};
use gatehouse_domain::pagination::PageRequest;
use gatehouse_identity::domain::policy::PasswordPolicy;
use gatehouse_identity::domain::types::{Account, AccountFilter, ClientMeta};
use gatehouse_identity::error::ErrorKind;
use gatehouse_identity::usecase::token::LoginInput;

use crate::helpers::{
    PASSWORD, registration, seed_account, seed_admin_role, seed_permission, seed_role, test_env,
};

fn emails(accounts: &[Account]) -> Vec<&str> {
    accounts.iter().map(|a| a.email.as_str()).collect()
}

// ── RegisterAccount ──────────────────────────────────────────────────────────

#[tokio::test]
async fn should_register_account_with_roles() {
    let env = test_env();
    let admin = seed_admin_role(&env.store).await;

    let mut input = registration("  Carol@Example.COM ", vec![admin.id]);
    input.username = Some("carol".to_owned());
    input.position = Some("  ".to_owned());
    let account = env.ctx.register_account().execute(input).await.unwrap();

    assert_eq!(account.email, "carol@example.com");
    assert_eq!(account.username.as_deref(), Some("carol"));
    assert!(account.position.is_none());
    assert!(account.is_active);
    assert!(account.has_role(admin.id));
    assert_ne!(account.password_hash.as_str(), PASSWORD);
}

#[tokio::test]
async fn should_validate_registration_input() {
    let env = test_env();

    let err = env
        .ctx
        .register_account()
        .execute(registration("carol-at-example", vec![]))
        .await
        .unwrap_err();
    assert_eq!(err.op, "register_account");
    assert!(matches!(err.kind(), ErrorKind::InvalidEmail));

    let mut bad_username = registration("carol@example.com", vec![]);
    bad_username.username = Some("carol smith".to_owned());
    let err = env
        .ctx
        .register_account()
        .execute(bad_username)
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::InvalidUsername));

    let mut weak = registration("carol@example.com", vec![]);
    weak.password = "1234567".to_owned();
    weak.password_confirmation = "1234567".to_owned();
    let err = env.ctx.register_account().execute(weak).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::PasswordTooWeak));

    let mut mismatch = registration("carol@example.com", vec![]);
    mismatch.password_confirmation = "something-else".to_owned();
    let err = env
        .ctx
        .register_account()
        .execute(mismatch)
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::PasswordMismatch));

    let err = env
        .ctx
        .register_account()
        .execute(registration("carol@example.com", vec![RoleId(404)]))
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::RoleNotFound));
}

#[tokio::test]
async fn should_reject_duplicate_email_and_username() {
    let env = test_env();
    let mut first = registration("carol@example.com", vec![]);
    first.username = Some("Carol".to_owned());
    env.ctx.register_account().execute(first).await.unwrap();

    let err = env
        .ctx
        .register_account()
        .execute(registration("CAROL@example.com", vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::EmailAlreadyExists));

    let mut same_username = registration("other@example.com", vec![]);
    same_username.username = Some("carol".to_owned());
    let err = env
        .ctx
        .register_account()
        .execute(same_username)
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::UsernameAlreadyExists));
}

#[tokio::test]
async fn should_apply_custom_password_rule() {
    let env = test_env();
    let policy = PasswordPolicy::new(8).with_rule(|p| p.chars().any(|c| c.is_ascii_digit()));
    let ctx = env.ctx.clone().with_password_policy(policy);

    let mut no_digit = registration("carol@example.com", vec![]);
    no_digit.password = "no-digits-here".to_owned();
    no_digit.password_confirmation = "no-digits-here".to_owned();
    let err = ctx.register_account().execute(no_digit).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::PasswordTooWeak));

    ctx.register_account()
        .execute(registration("carol@example.com", vec![]))
        .await
        .unwrap();
}

// ── SetAccountActive ─────────────────────────────────────────────────────────

#[tokio::test]
async fn should_deactivate_and_reactivate_account() {
    let env = test_env();
    let account = seed_account(&env.ctx, "dave@example.com", vec![]).await;
    let login = || LoginInput {
        email: "dave@example.com".to_owned(),
        password: PASSWORD.to_owned(),
        meta: ClientMeta::default(),
    };
    let session = env.ctx.login().execute(login()).await.unwrap();

    let updated = env
        .ctx
        .set_account_active()
        .execute(account.id, false)
        .await
        .unwrap();
    assert!(!updated.is_active);

    let err = env.ctx.login().execute(login()).await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::AccountInactive));
    let err = env
        .ctx
        .refresh_token()
        .execute(&session.tokens.refresh_token, &ClientMeta::default())
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::TokenNotFound));

    env.ctx
        .set_account_active()
        .execute(account.id, true)
        .await
        .unwrap();
    env.ctx.login().execute(login()).await.unwrap();

    let err = env
        .ctx
        .set_account_active()
        .execute(AccountId(9999), true)
        .await
        .unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::AccountNotFound));
}

// ── ListAccounts ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_filter_accounts() {
    let env = test_env();
    let read = seed_permission(&env.store, "reports", "read").await;
    let viewer = seed_role(&env.store, "viewer", &[&read]).await;
    seed_account(&env.ctx, "amy@corp.example", vec![viewer.id]).await;
    let ben = seed_account(&env.ctx, "ben@corp.example", vec![]).await;
    seed_account(&env.ctx, "cat@home.example", vec![viewer.id]).await;
    env.ctx
        .set_account_active()
        .execute(ben.id, false)
        .await
        .unwrap();

    let by_role = env
        .ctx
        .list_accounts()
        .execute(AccountFilter {
            role_id: Some(viewer.id),
            ..AccountFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(emails(&by_role), ["amy@corp.example", "cat@home.example"]);

    let inactive = env
        .ctx
        .list_accounts()
        .execute(AccountFilter {
            active: Some(false),
            ..AccountFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(emails(&inactive), ["ben@corp.example"]);

    let by_email = env
        .ctx
        .list_accounts()
        .execute(AccountFilter {
            email: Some("CORP".to_owned()),
            active: Some(true),
            ..AccountFilter::default()
        })
        .await
        .unwrap();
    assert_eq!(emails(&by_email), ["amy@corp.example"]);
}

#[tokio::test]
async fn should_paginate_accounts() {
    let env = test_env();
    for n in 0..5 {
        seed_account(&env.ctx, &format!("user{n}@example.com"), vec![]).await;
    }

    let page = |page, per_page| AccountFilter {
        page: PageRequest { per_page, page },
        ..AccountFilter::default()
    };
    let second = env.ctx.list_accounts().execute(page(2, 2)).await.unwrap();
    assert_eq!(emails(&second), ["user2@example.com", "user3@example.com"]);

    let last = env.ctx.list_accounts().execute(page(3, 2)).await.unwrap();
    assert_eq!(emails(&last), ["user4@example.com"]);

    // page 0 and per_page 0 are clamped to the first page of one
    let clamped = env.ctx.list_accounts().execute(page(0, 0)).await.unwrap();
    assert_eq!(emails(&clamped), ["user0@example.com"]);
}
