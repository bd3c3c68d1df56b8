//! Conversation store
//!
//! Append-only turn log per conversation, read back in creation order.
//! Backed by SQLite through SQLx, with an in-memory variant for tests and
//! one-shot CLI runs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::collections::HashMap;
use std::str::FromStr;
use tokio::sync::RwLock;

use crate::{ChatError, ConversationTurn, DatabaseConfig, Result, Role};

/// A conversation header
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: i64,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

/// A persisted turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTurn {
    pub id: i64,
    pub conversation_id: i64,
    pub turn: ConversationTurn,
    /// Saved recording the turn was transcribed from, if any
    pub audio_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Trait for conversation persistence
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Start a new conversation
    async fn create_conversation(&self, title: &str) -> Result<Conversation>;

    /// Get a conversation header by ID
    async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>>;

    /// All conversations, newest first
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    /// Append a turn. Fails with `NotFound` for an unknown conversation.
    async fn append_turn(
        &self,
        conversation_id: i64,
        turn: &ConversationTurn,
        audio_path: Option<&str>,
    ) -> Result<StoredTurn>;

    /// Turns of a conversation in creation order
    async fn history(&self, conversation_id: i64) -> Result<Vec<StoredTurn>>;

    /// Turns of a conversation as plain `role`/`content` pairs
    async fn turns(&self, conversation_id: i64) -> Result<Vec<ConversationTurn>> {
        Ok(self
            .history(conversation_id)
            .await?
            .into_iter()
            .map(|stored| stored.turn)
            .collect())
    }
}

// ============================================================================
// SQLite
// ============================================================================

/// SQLite-backed conversation store
pub struct SqliteConversationStore {
    pool: SqlitePool,
}

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: i64,
    title: String,
    created_at: DateTime<Utc>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct TurnRow {
    id: i64,
    conversation_id: i64,
    role: String,
    content: String,
    audio_path: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TurnRow> for StoredTurn {
    type Error = ChatError;

    fn try_from(row: TurnRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            conversation_id: row.conversation_id,
            turn: ConversationTurn::new(row.role.parse::<Role>()?, row.content),
            audio_path: row.audio_path,
            created_at: row.created_at,
        })
    }
}

impl SqliteConversationStore {
    /// Open (creating if needed) the database and its tables
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| ChatError::Database(format!("Invalid database URL: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to an in-memory database sees its own database.
        let max_connections = if config.url.contains(":memory:") {
            1
        } else {
            config.max_connections.max(1)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| ChatError::Database(format!("SQLite connection failed: {e}")))?;

        let store = Self { pool };
        store.migrate().await?;
        tracing::debug!("Conversation store ready at {}", config.url);
        Ok(store)
    }

    /// Create from an existing pool
    pub async fn from_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::Database(format!("Failed to create conversations table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                conversation_id INTEGER NOT NULL
                    REFERENCES conversations(id) ON DELETE CASCADE,
                role TEXT NOT NULL,
                content TEXT NOT NULL,
                audio_path TEXT,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::Database(format!("Failed to create messages table: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl ConversationStore for SqliteConversationStore {
    async fn create_conversation(&self, title: &str) -> Result<Conversation> {
        let created_at = Utc::now();
        let id = sqlx::query("INSERT INTO conversations (title, created_at) VALUES (?1, ?2)")
            .bind(title)
            .bind(created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::Database(format!("Failed to create conversation: {e}")))?
            .last_insert_rowid();

        Ok(Conversation {
            id,
            title: title.to_string(),
            created_at,
        })
    }

    async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>> {
        let row: Option<ConversationRow> =
            sqlx::query_as("SELECT id, title, created_at FROM conversations WHERE id = ?1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| ChatError::Database(format!("Failed to get conversation: {e}")))?;

        Ok(row.map(Conversation::from))
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let rows: Vec<ConversationRow> = sqlx::query_as(
            "SELECT id, title, created_at FROM conversations ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChatError::Database(format!("Failed to list conversations: {e}")))?;

        Ok(rows.into_iter().map(Conversation::from).collect())
    }

    async fn append_turn(
        &self,
        conversation_id: i64,
        turn: &ConversationTurn,
        audio_path: Option<&str>,
    ) -> Result<StoredTurn> {
        if self.get_conversation(conversation_id).await?.is_none() {
            return Err(ChatError::NotFound(format!(
                "conversation {conversation_id}"
            )));
        }

        let created_at = Utc::now();
        let id = sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, role, content, audio_path, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(conversation_id)
        .bind(turn.role.as_str())
        .bind(&turn.content)
        .bind(audio_path)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::Database(format!("Failed to append turn: {e}")))?
        .last_insert_rowid();

        Ok(StoredTurn {
            id,
            conversation_id,
            turn: turn.clone(),
            audio_path: audio_path.map(str::to_string),
            created_at,
        })
    }

    async fn history(&self, conversation_id: i64) -> Result<Vec<StoredTurn>> {
        let rows: Vec<TurnRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, role, content, audio_path, created_at
            FROM messages
            WHERE conversation_id = ?1
            ORDER BY id
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ChatError::Database(format!("Failed to load history: {e}")))?;

        rows.into_iter().map(StoredTurn::try_from).collect()
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
struct MemoryState {
    conversations: Vec<Conversation>,
    turns: HashMap<i64, Vec<StoredTurn>>,
    next_turn_id: i64,
}

/// In-memory conversation store
#[derive(Default)]
pub struct MemoryConversationStore {
    state: RwLock<MemoryState>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn create_conversation(&self, title: &str) -> Result<Conversation> {
        let mut state = self.state.write().await;
        let conversation = Conversation {
            id: state.conversations.len() as i64 + 1,
            title: title.to_string(),
            created_at: Utc::now(),
        };
        state.conversations.push(conversation.clone());
        state.turns.insert(conversation.id, Vec::new());
        Ok(conversation)
    }

    async fn get_conversation(&self, id: i64) -> Result<Option<Conversation>> {
        let state = self.state.read().await;
        Ok(state.conversations.iter().find(|c| c.id == id).cloned())
    }

    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let state = self.state.read().await;
        Ok(state.conversations.iter().rev().cloned().collect())
    }

    async fn append_turn(
        &self,
        conversation_id: i64,
        turn: &ConversationTurn,
        audio_path: Option<&str>,
    ) -> Result<StoredTurn> {
        let mut state = self.state.write().await;
        state.next_turn_id += 1;
        let id = state.next_turn_id;

        let turns = state
            .turns
            .get_mut(&conversation_id)
            .ok_or_else(|| ChatError::NotFound(format!("conversation {conversation_id}")))?;

        let stored = StoredTurn {
            id,
            conversation_id,
            turn: turn.clone(),
            audio_path: audio_path.map(str::to_string),
            created_at: Utc::now(),
        };
        turns.push(stored.clone());
        Ok(stored)
    }

    async fn history(&self, conversation_id: i64) -> Result<Vec<StoredTurn>> {
        let state = self.state.read().await;
        state
            .turns
            .get(&conversation_id)
            .cloned()
            .ok_or_else(|| ChatError::NotFound(format!("conversation {conversation_id}")))
    }
}
