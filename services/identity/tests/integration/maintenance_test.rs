use gatehouse_identity::domain::types::ClientMeta;
use gatehouse_identity::usecase::invitation::CreateInvitationInput;
use gatehouse_identity::usecase::maintenance::SweepReport;
use gatehouse_identity::usecase::token::LoginInput;

use crate::helpers::{
    PASSWORD, expire_everything_on_issue, seed_account, seed_admin_role, seed_role, test_env,
};

#[tokio::test]
async fn should_sweep_every_expired_record() {
    let mut env = test_env();
    expire_everything_on_issue(&mut env);

    let admin_role = seed_admin_role(&env.store).await;
    let member = seed_role(&env.store, "member", &[]).await;
    let admin = seed_account(&env.ctx, "admin@example.com", vec![admin_role.id]).await;

    env.ctx
        .login()
        .execute(LoginInput {
            email: "admin@example.com".to_owned(),
            password: PASSWORD.to_owned(),
            meta: ClientMeta::default(),
        })
        .await
        .unwrap();
    env.ctx
        .create_invitation()
        .execute(CreateInvitationInput {
            email: "new@example.com".to_owned(),
            role_id: member.id,
            creator_id: admin.id,
            first_name: None,
            last_name: None,
            position: None,
        })
        .await
        .unwrap();
    env.ctx
        .initiate_password_reset()
        .execute("admin@example.com", Some("192.0.2.1"))
        .await
        .unwrap();

    let report = env.ctx.sweep_expired().execute().await.unwrap();
    assert_eq!(
        report,
        SweepReport {
            refresh_tokens: 1,
            invitations: 1,
            reset_tokens: 1,
            rate_limit_windows: 2,
        }
    );

    let again = env.ctx.sweep_expired().execute().await.unwrap();
    assert_eq!(again, SweepReport::default());
}
