#![cfg(all(feature = "integration", feature = "pg"))]

//! Guard behaviour against a containerised Postgres.
//! Run with `--features integration,pg`.

mod common;

use std::time::Duration;

use anyhow::Result;
use chat_db::{ConnectOpts, DbHandle, DbSession, DomainError, DomainErrorKind, GuardScope};
use sea_orm::{ConnectionTrait, DbBackend, Statement, Value};

const SCHEMA: &[&str] = &[
    "CREATE TABLE users (
        id BIGSERIAL PRIMARY KEY,
        username TEXT NOT NULL,
        email TEXT NOT NULL,
        CONSTRAINT users_username_key UNIQUE (username),
        CONSTRAINT users_email_key UNIQUE (email)
    )",
    "CREATE TABLE notes (
        id BIGSERIAL PRIMARY KEY,
        user_id BIGINT NOT NULL REFERENCES users(id),
        body TEXT NOT NULL,
        CONSTRAINT notes_body_not_empty CHECK (length(body) > 0)
    )",
];

async fn setup() -> Result<(common::DbUnderTest, DbHandle)> {
    let dut = common::bring_up_postgres().await?;
    let db = DbHandle::connect(&dut.url, ConnectOpts::default()).await?;
    let conn = db.sea();
    for stmt in SCHEMA {
        conn.execute_unprepared(stmt).await?;
    }
    Ok((dut, db))
}

async fn exec(
    session: &mut DbSession,
    entity: &str,
    sql: &'static str,
    values: Vec<Value>,
) -> Result<(), DomainError> {
    session
        .guarded(GuardScope::new(entity, "create"), move |tx| {
            Box::pin(async move {
                tx.execute(Statement::from_sql_and_values(DbBackend::Postgres, sql, values))
                    .await?;
                Ok(())
            })
        })
        .await
}

const INSERT_USER: &str = "INSERT INTO users (username, email) VALUES ($1, $2)";
const INSERT_NOTE: &str = "INSERT INTO notes (user_id, body) VALUES ($1, $2)";

#[tokio::test]
async fn postgres_diagnostics_drive_classification() -> Result<()> {
    let (_dut, db) = setup().await?;

    let mut writer_a = db.session();
    let mut writer_b = db.session();

    exec(
        &mut writer_a,
        "User",
        INSERT_USER,
        vec!["alice".into(), "alice@example.com".into()],
    )
    .await?;
    writer_a.commit().await?;

    let err = exec(
        &mut writer_b,
        "User",
        INSERT_USER,
        vec!["alice2".into(), "alice@example.com".into()],
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), DomainErrorKind::Duplicate);
    assert_eq!(err.http_status(), 409);
    assert_eq!(err.constraint(), Some("users_email_key"));
    // column recovered from the DETAIL line
    assert_eq!(err.fields(), Some(&["email".to_string()][..]));

    // session not poisoned
    exec(
        &mut writer_b,
        "User",
        INSERT_USER,
        vec!["bob".into(), "bob@example.com".into()],
    )
    .await?;
    writer_b.commit().await?;

    let mut session = db.session();
    let err = exec(
        &mut session,
        "User",
        INSERT_USER,
        vec![Option::<String>::None.into(), "x@example.com".into()],
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), DomainErrorKind::MissingField);
    assert_eq!(err.fields(), Some(&["username".to_string()][..]));

    let err = exec(
        &mut session,
        "Note",
        INSERT_NOTE,
        vec![9999i64.into(), "hi".into()],
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), DomainErrorKind::Reference);
    assert_eq!(err.fields(), Some(&["user_id".to_string()][..]));

    let err = exec(&mut session, "Note", INSERT_NOTE, vec![1i64.into(), "".into()])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), DomainErrorKind::BusinessRule);
    assert_eq!(err.constraint(), Some("notes_body_not_empty"));
    assert_eq!(
        err.to_payload().detail,
        "Note business rule violated (check constraint)."
    );

    db.close().await;
    Ok(())
}

#[tokio::test]
async fn concurrent_writer_blocks_then_sees_duplicate() -> Result<()> {
    let (_dut, db) = setup().await?;

    let mut writer_a = db.session();
    let mut writer_b = db.session();

    exec(
        &mut writer_a,
        "User",
        INSERT_USER,
        vec!["alice".into(), "alice@example.com".into()],
    )
    .await?;

    // B waits on A's uncommitted index entry until A commits
    let (b_result, a_commit) = tokio::join!(
        exec(
            &mut writer_b,
            "User",
            INSERT_USER,
            vec!["alice2".into(), "alice@example.com".into()],
        ),
        async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            writer_a.commit().await
        }
    );
    a_commit?;

    let err = b_result.unwrap_err();
    assert_eq!(err.kind(), DomainErrorKind::Duplicate);
    assert_eq!(err.constraint(), Some("users_email_key"));
    assert_eq!(err.fields(), Some(&["email".to_string()][..]));
    assert!(!writer_b.in_transaction());

    exec(
        &mut writer_b,
        "User",
        INSERT_USER,
        vec!["bob".into(), "bob@example.com".into()],
    )
    .await?;
    writer_b.commit().await?;

    let row = db
        .sea()
        .query_one(Statement::from_string(
            DbBackend::Postgres,
            "SELECT COUNT(*) AS n FROM users",
        ))
        .await?
        .ok_or_else(|| anyhow::anyhow!("no row"))?;
    assert_eq!(row.try_get::<i64>("", "n")?, 2);

    db.close().await;
    Ok(())
}
