#![cfg(feature = "sqlite")]

//! Guard behaviour against a real SQLite file.

use std::time::Duration;

use anyhow::Result;
use chat_db::{ConnectOpts, DbHandle, DbSession, DomainError, DomainErrorKind, GuardScope};
use sea_orm::{ConnectionTrait, DbBackend, Statement, Value};
use tempfile::TempDir;

const SCHEMA: &[&str] = &[
    "CREATE TABLE users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        username TEXT NOT NULL UNIQUE,
        email TEXT NOT NULL UNIQUE
    )",
    "CREATE TABLE notes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES users(id),
        body TEXT NOT NULL,
        CONSTRAINT body_not_empty CHECK (length(body) > 0)
    )",
];

async fn setup() -> Result<(TempDir, DbHandle)> {
    let dir = TempDir::new()?;
    let path = dir.path().join("chat.db");
    let dsn = format!("sqlite://{}?mode=rwc", path.display());
    let db = DbHandle::connect(&dsn, ConnectOpts::default()).await?;
    let conn = db.sea();
    for stmt in SCHEMA {
        conn.execute_unprepared(stmt).await?;
    }
    Ok((dir, db))
}

async fn insert_user(
    session: &mut DbSession,
    username: Option<&str>,
    email: &str,
) -> Result<(), DomainError> {
    let values: Vec<Value> = vec![username.map(str::to_owned).into(), email.to_owned().into()];
    session
        .guarded(GuardScope::new("User", "create"), move |tx| {
            Box::pin(async move {
                tx.execute(Statement::from_sql_and_values(
                    DbBackend::Sqlite,
                    "INSERT INTO users (username, email) VALUES (?, ?)",
                    values,
                ))
                .await?;
                Ok(())
            })
        })
        .await
}

async fn insert_note(
    session: &mut DbSession,
    user_id: i64,
    body: Option<&str>,
) -> Result<(), DomainError> {
    let values: Vec<Value> = vec![user_id.into(), body.map(str::to_owned).into()];
    session
        .guarded(GuardScope::new("Note", "create"), move |tx| {
            Box::pin(async move {
                tx.execute(Statement::from_sql_and_values(
                    DbBackend::Sqlite,
                    "INSERT INTO notes (user_id, body) VALUES (?, ?)",
                    values,
                ))
                .await?;
                Ok(())
            })
        })
        .await
}

async fn count_users(db: &DbHandle) -> Result<i64> {
    let row = db
        .sea()
        .query_one(Statement::from_string(
            DbBackend::Sqlite,
            "SELECT COUNT(*) AS n FROM users",
        ))
        .await?
        .ok_or_else(|| anyhow::anyhow!("no row"))?;
    Ok(row.try_get::<i64>("", "n")?)
}

#[tokio::test]
async fn second_writer_sees_duplicate_and_session_stays_usable() -> Result<()> {
    let (_dir, db) = setup().await?;

    let mut writer_a = db.session();
    let mut writer_b = db.session();

    insert_user(&mut writer_a, Some("alice"), "alice@example.com").await?;
    writer_a.commit().await?;

    let err = insert_user(&mut writer_b, Some("alice2"), "alice@example.com")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), DomainErrorKind::Duplicate);
    assert_eq!(err.code(), Some("duplicate"));
    assert_eq!(err.http_status(), 409);
    assert_eq!(err.fields(), Some(&["email".to_string()][..]));
    assert!(err.message().contains("already exists for field(s): email"));
    assert!(!writer_b.in_transaction(), "guard must roll back");

    // same session, unrelated write, right away
    insert_user(&mut writer_b, Some("bob"), "bob@example.com").await?;
    writer_b.commit().await?;

    assert_eq!(count_users(&db).await?, 2);
    Ok(())
}

#[tokio::test]
async fn concurrent_writer_loses_race_to_pending_insert() -> Result<()> {
    let (_dir, db) = setup().await?;

    let mut writer_a = db.session();
    let mut writer_b = db.session();

    // A holds the key inside an open transaction while B tries the same email
    insert_user(&mut writer_a, Some("alice"), "alice@example.com").await?;
    assert!(writer_a.in_transaction());

    let (b_result, a_commit) = tokio::join!(
        insert_user(&mut writer_b, Some("alice2"), "alice@example.com"),
        async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            writer_a.commit().await
        }
    );
    a_commit?;

    let err = b_result.unwrap_err();
    assert_eq!(err.kind(), DomainErrorKind::Duplicate);
    assert_eq!(err.http_status(), 409);
    assert_eq!(err.fields(), Some(&["email".to_string()][..]));
    assert!(!writer_b.in_transaction(), "guard must roll back");

    insert_user(&mut writer_b, Some("bob"), "bob@example.com").await?;
    writer_b.commit().await?;

    assert_eq!(count_users(&db).await?, 2);
    Ok(())
}

#[tokio::test]
async fn rolled_back_work_is_not_persisted() -> Result<()> {
    let (_dir, db) = setup().await?;
    let mut session = db.session();

    insert_user(&mut session, Some("carol"), "carol@example.com").await?;
    // fails in the same transaction; the earlier insert goes with it
    let err = insert_user(&mut session, Some("carol"), "other@example.com")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), DomainErrorKind::Duplicate);
    assert_eq!(err.fields(), Some(&["username".to_string()][..]));

    session.commit().await?;
    assert_eq!(count_users(&db).await?, 0);
    Ok(())
}

#[tokio::test]
async fn not_null_foreign_key_and_check() -> Result<()> {
    let (_dir, db) = setup().await?;
    let mut session = db.session();

    let err = insert_user(&mut session, None, "nobody@example.com")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), DomainErrorKind::MissingField);
    assert_eq!(err.fields(), Some(&["username".to_string()][..]));
    assert_eq!(err.http_status(), 400);

    let err = insert_note(&mut session, 999, Some("hello")).await.unwrap_err();
    assert_eq!(err.kind(), DomainErrorKind::Reference);
    assert_eq!(err.message(), "Note foreign key constraint violated");

    insert_user(&mut session, Some("dave"), "dave@example.com").await?;
    session.commit().await?;

    let err = insert_note(&mut session, 1, Some("")).await.unwrap_err();
    assert_eq!(err.kind(), DomainErrorKind::BusinessRule);
    assert_eq!(err.message(), "Note business rule violated (check constraint).");
    assert_eq!(err.fields(), None);

    insert_note(&mut session, 1, Some("first note")).await?;
    session.commit().await?;
    Ok(())
}

#[tokio::test]
async fn non_integrity_failure_is_generic() -> Result<()> {
    let (_dir, db) = setup().await?;
    let mut session = db.session();

    let err = session
        .guarded(GuardScope::new("User", "list"), |tx| {
            Box::pin(async move {
                tx.execute_unprepared("SELECT * FROM no_such_table").await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();

    assert_eq!(err.kind(), DomainErrorKind::UnknownIntegrity);
    assert_eq!(err.message(), "Failed to operate on User");
    assert!(!err.to_payload().detail.contains("no_such_table"));
    Ok(())
}
