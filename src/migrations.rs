use sqlx::{Pool, Postgres};

// Embed SQL migrations at compile time for deterministic startup
const MIG_0001: &str = include_str!("../migrations/0001_create_conversations.sql");
const MIG_0002: &str = include_str!("../migrations/0002_create_messages.sql");
const MIG_0003: &str = include_str!("../migrations/0003_create_conversation_states.sql");
const MIG_0004: &str = include_str!("../migrations/0004_create_chat_session_logs.sql");

pub async fn run_all(db: &Pool<Postgres>) -> Result<(), sqlx::Error> {
    // Run sequentially; each file may contain multiple statements and is
    // written to be idempotent (IF NOT EXISTS).
    for (i, sql) in [MIG_0001, MIG_0002, MIG_0003, MIG_0004]
        .into_iter()
        .enumerate()
    {
        let label = i + 1;
        sqlx::raw_sql(sql).execute(db).await?;
        tracing::info!(migration = %label, "migration applied");
    }
    Ok(())
}
