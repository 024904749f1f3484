use crate::entities::{analyses, chat_messages, chat_sessions, reports, users};
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm::{ConnectionTrait, Schema};
use std::env;
use std::time::Duration;
use tracing::info;

pub async fn setup_database() -> anyhow::Result<DatabaseConnection> {
    let db_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(&db_url);
    opt.max_connections(100)
        .min_connections(5)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    info!("🔄 Running auto-migrations...");

    // Order matters for foreign keys:
    // users -> reports -> analyses, and users -> chat_sessions -> chat_messages
    let stmts = vec![
        (
            "users",
            schema
                .create_table_from_entity(users::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "reports",
            schema
                .create_table_from_entity(reports::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "analyses",
            schema
                .create_table_from_entity(analyses::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "chat_sessions",
            schema
                .create_table_from_entity(chat_sessions::Entity)
                .if_not_exists()
                .to_owned(),
        ),
        (
            "chat_messages",
            schema
                .create_table_from_entity(chat_messages::Entity)
                .if_not_exists()
                .to_owned(),
        ),
    ];

    for (name, stmt) in stmts {
        let stmt = builder.build(&stmt);
        match db.execute(stmt).await {
            Ok(_) => info!("   - Table '{}' checked/created", name),
            Err(e) => tracing::warn!("   - Failed to create table '{}': {}", name, e),
        }
    }

    info!("🔄 Ensuring indexes...");

    let indexes = vec![
        "CREATE INDEX IF NOT EXISTS idx_reports_user_id ON reports(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_reports_uploaded_at ON reports(uploaded_at)",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_analyses_report_id ON analyses(report_id)",
        "CREATE INDEX IF NOT EXISTS idx_chat_sessions_user_id ON chat_sessions(user_id)",
        "CREATE INDEX IF NOT EXISTS idx_chat_sessions_report_id ON chat_sessions(report_id)",
        "CREATE INDEX IF NOT EXISTS idx_chat_messages_session_id ON chat_messages(session_id)",
    ];

    for query in indexes {
        match db
            .execute(sea_orm::Statement::from_string(builder, query.to_owned()))
            .await
        {
            Ok(_) => info!("   - Executed: {}", query),
            Err(e) => {
                let err_msg = e.to_string().to_lowercase();
                if err_msg.contains("already exists") {
                    info!("   - Index already present (skipped): {}", query);
                } else {
                    tracing::warn!("   - Index creation warning: {} -> {}", query, e);
                }
            }
        }
    }

    Ok(())
}
