//! Row-level store operations.

use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::models::{Conversation, Message, Role, User};

/// Maximum connections in the shared pool.
const MAX_CONNECTIONS: u32 = 10;

/// Connect to PostgreSQL and run pending migrations.
///
/// `dsn` is a libpq-style connection string
/// (`host=… user=… password=… dbname=… port=… sslmode=…`).
pub async fn connect(dsn: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(dsn)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::info!("PostgreSQL connected, migrations applied");

    Ok(pool)
}

/// Ledger store over a shared connection pool.
///
/// Every method is atomic with respect to concurrent callers; multi-statement
/// operations open their own transaction.
#[derive(Clone)]
pub struct LedgerStore {
    pool: PgPool,
}

impl LedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying pool, for policy layers that compose transactions.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Users
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn get_user(&self, public_key: &str) -> Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, public_key, balance, consumed, created_at, updated_at
             FROM users WHERE public_key = $1",
        )
        .bind(public_key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Create the user if absent and return the surviving row.
    ///
    /// Concurrent creation races resolve to a single row through the unique
    /// key on `public_key`.
    pub async fn create_user(&self, public_key: &str) -> Result<User> {
        sqlx::query("INSERT INTO users (public_key) VALUES ($1) ON CONFLICT (public_key) DO NOTHING")
            .bind(public_key)
            .execute(&self.pool)
            .await?;

        self.get_user(public_key)
            .await?
            .ok_or(StoreError::NotFound("user"))
    }

    /// Insert the user row if absent, inside an open transaction.
    pub async fn ensure_user_on(conn: &mut PgConnection, public_key: &str) -> Result<()> {
        sqlx::query("INSERT INTO users (public_key) VALUES ($1) ON CONFLICT (public_key) DO NOTHING")
            .bind(public_key)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Adjust both token counters in one statement. Deltas are signed; sign
    /// discipline belongs to the caller.
    pub async fn adjust_balance(
        &self,
        public_key: &str,
        balance_delta: i64,
        consumed_delta: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users
             SET balance = balance + $2, consumed = consumed + $3, updated_at = now()
             WHERE public_key = $1",
        )
        .bind(public_key)
        .bind(balance_delta)
        .bind(consumed_delta)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// [`Self::adjust_balance`] against an open transaction.
    pub async fn adjust_balance_on(
        conn: &mut PgConnection,
        public_key: &str,
        balance_delta: i64,
        consumed_delta: i64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users
             SET balance = balance + $2, consumed = consumed + $3, updated_at = now()
             WHERE public_key = $1",
        )
        .bind(public_key)
        .bind(balance_delta)
        .bind(consumed_delta)
        .execute(conn)
        .await?;

        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Conversations
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn create_conversation(&self, user_pubkey: &str) -> Result<Conversation> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "INSERT INTO conversations (id, user_pubkey) VALUES ($1, $2)
             RETURNING id, user_pubkey, total_tokens, created_at, updated_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_pubkey)
        .fetch_one(&self.pool)
        .await?;

        Ok(conversation)
    }

    pub async fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>> {
        let conversation = sqlx::query_as::<_, Conversation>(
            "SELECT id, user_pubkey, total_tokens, created_at, updated_at
             FROM conversations WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(conversation)
    }

    /// All conversations of a user, newest first.
    pub async fn get_conversations(&self, user_pubkey: &str) -> Result<Vec<Conversation>> {
        let conversations = sqlx::query_as::<_, Conversation>(
            "SELECT id, user_pubkey, total_tokens, created_at, updated_at
             FROM conversations WHERE user_pubkey = $1
             ORDER BY created_at DESC",
        )
        .bind(user_pubkey)
        .fetch_all(&self.pool)
        .await?;

        Ok(conversations)
    }

    pub async fn add_total_tokens(&self, conversation_id: Uuid, delta: i64) -> Result<()> {
        sqlx::query(
            "UPDATE conversations
             SET total_tokens = total_tokens + $2, updated_at = now()
             WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(delta)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Messages
    // ═══════════════════════════════════════════════════════════════════════

    /// Append the (user, assistant) exchange of a completed chat and bump the
    /// conversation's usage counter, all in one transaction. Returns the
    /// assistant row.
    pub async fn append_exchange(
        &self,
        conversation_id: Uuid,
        user_content: &str,
        assistant_content: &str,
        total_tokens: i64,
    ) -> Result<Message> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO messages (conversation_id, role, content) VALUES ($1, $2, $3)")
            .bind(conversation_id)
            .bind(Role::User.as_str())
            .bind(user_content)
            .execute(&mut *tx)
            .await?;

        let assistant = sqlx::query_as::<_, Message>(
            "INSERT INTO messages (conversation_id, role, content) VALUES ($1, $2, $3)
             RETURNING id, conversation_id, role, content, created_at",
        )
        .bind(conversation_id)
        .bind(Role::Assistant.as_str())
        .bind(assistant_content)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE conversations
             SET total_tokens = total_tokens + $2, updated_at = now()
             WHERE id = $1",
        )
        .bind(conversation_id)
        .bind(total_tokens)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(assistant)
    }

    /// All messages of a conversation in sequence order (oldest first).
    pub async fn get_messages(&self, conversation_id: Uuid) -> Result<Vec<Message>> {
        let messages = sqlx::query_as::<_, Message>(
            "SELECT id, conversation_id, role, content, created_at
             FROM messages WHERE conversation_id = $1
             ORDER BY id ASC",
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(messages)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Credit events
    // ═══════════════════════════════════════════════════════════════════════

    /// Insert a credit-event row inside an open transaction.
    ///
    /// Returns `false` when the event id already exists - the event has been
    /// applied before and the caller must roll back the whole apply.
    pub async fn save_credit_event_on(
        conn: &mut PgConnection,
        id: &str,
        user_pubkey: &str,
        delta: i64,
        created_at: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO credit_events (id, user_pubkey, delta, created_at)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (id) DO NOTHING",
        )
        .bind(id)
        .bind(user_pubkey)
        .bind(delta)
        .bind(created_at)
        .execute(conn)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Maximum relay timestamp among applied credit events, 0 if none.
    /// This is the ingestion watermark.
    pub async fn latest_credit_timestamp(&self) -> Result<i64> {
        let latest: i64 =
            sqlx::query_scalar("SELECT COALESCE(MAX(created_at), 0) FROM credit_events")
                .fetch_one(&self.pool)
                .await?;

        Ok(latest)
    }
}
