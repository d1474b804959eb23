//! `PostgreSQL` implementation of the story persistence ports.
//!
//! Story mutations run inside a `PgStoryTransaction`. Its `lock_story` takes a
//! row lock on the story (`SELECT ... FOR NO KEY UPDATE`), so two writers
//! racing on the same story are serialized and the second one validates
//! against what the first committed. Plain reads and inserts that only
//! reference the story, such as visibility rows, do not wait on it.

use async_trait::async_trait;
use scribly_core::error::DomainError;
use scribly_stories::domain::aggregates::{
    Cowriter, HiddenStatus, Story, StoryState, UserStory, UserStoryHide,
};
use scribly_stories::domain::ports::{LoadSpec, StoryStore, StoryTransaction};
use scribly_stories::domain::turn::Turn;
use scribly_stories::domain::user::{NewUser, User};
use sqlx::migrate::Migrator;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::rows::{CowriterRow, StoryRow, TurnRow, UserRow};

/// Schema migrations for the story store.
pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

const SELECT_USER: &str = "SELECT id, username, email, email_verification_status FROM users";

const SELECT_STORY: &str =
    "SELECT id, title, state, created_by, created_at FROM stories WHERE id = $1";

const SELECT_STORY_LOCKED: &str = "\
    SELECT id, title, state, created_by, created_at FROM stories WHERE id = $1 \
    FOR NO KEY UPDATE";

const SELECT_COWRITERS: &str = "\
    SELECT c.user_id, c.turn_index, u.username, u.email, u.email_verification_status \
    FROM story_cowriters c \
    JOIN users u ON u.id = c.user_id \
    WHERE c.story_id = $1 \
    ORDER BY c.turn_index";

const SELECT_TURNS: &str = "\
    SELECT t.id, t.story_id, t.taken_by, t.action, t.text, t.created_at, \
           u.username, u.email, u.email_verification_status \
    FROM turns t \
    JOIN users u ON u.id = t.taken_by \
    WHERE t.story_id = $1 \
    ORDER BY t.created_at, t.id";

/// Maps a database error onto the domain taxonomy.
///
/// Unique violations are conflicts; everything else is infrastructure.
fn db_error(err: sqlx::Error) -> DomainError {
    if let sqlx::Error::Database(db) = &err
        && db.is_unique_violation()
    {
        return DomainError::Conflict(db.message().to_owned());
    }
    DomainError::Infrastructure(format!("database error: {err}"))
}

fn to_db_index(cowriter: &Cowriter) -> Result<i32, DomainError> {
    i32::try_from(cowriter.turn_index).map_err(|_| {
        DomainError::Infrastructure(format!("turn index {} out of range", cowriter.turn_index))
    })
}

async fn fetch_user(conn: &mut PgConnection, user_id: Uuid) -> Result<Option<User>, DomainError> {
    let row: Option<UserRow> = sqlx::query_as(&format!("{SELECT_USER} WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;
    row.map(User::try_from).transpose()
}

/// Reads a story row and the relations `shape` asks for on one connection.
async fn load_story(
    conn: &mut PgConnection,
    story_id: Uuid,
    shape: LoadSpec,
    for_update: bool,
) -> Result<Option<Story>, DomainError> {
    let query = if for_update {
        SELECT_STORY_LOCKED
    } else {
        SELECT_STORY
    };
    let row: Option<StoryRow> = sqlx::query_as(query)
        .bind(story_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;
    let Some(row) = row else {
        return Ok(None);
    };
    let mut story = Story::try_from(row)?;

    if shape.creator {
        story.creator = fetch_user(conn, story.created_by).await?;
    }
    if shape.needs_cowriters() {
        let rows: Vec<CowriterRow> = sqlx::query_as(SELECT_COWRITERS)
            .bind(story_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(db_error)?;
        story.cowriters = rows
            .into_iter()
            .map(|row| row.into_cowriter(shape.cowriter_users))
            .collect::<Result<_, _>>()?;
    }
    if shape.needs_turns() {
        let rows: Vec<TurnRow> = sqlx::query_as(SELECT_TURNS)
            .bind(story_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(db_error)?;
        story.turns = rows
            .into_iter()
            .map(|row| row.into_turn(shape.turn_authors))
            .collect::<Result<_, _>>()?;
    }
    Ok(Some(story))
}

async fn insert_turn_row(conn: &mut PgConnection, turn: &Turn) -> Result<(), DomainError> {
    sqlx::query(
        "INSERT INTO turns (id, story_id, taken_by, action, text, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(turn.id)
    .bind(turn.story_id)
    .bind(turn.taken_by)
    .bind(turn.action.as_str())
    .bind(turn.text.as_deref())
    .bind(turn.created_at)
    .execute(&mut *conn)
    .await
    .map_err(db_error)?;
    Ok(())
}

/// `PostgreSQL`-backed story store.
#[derive(Debug, Clone)]
pub struct PgStoryStore {
    pool: PgPool,
}

impl PgStoryStore {
    /// Creates a new store over `pool`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies every pending migration.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if a migration fails.
    pub async fn migrate(&self) -> Result<(), DomainError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| DomainError::Infrastructure(format!("migration failed: {e}")))
    }

    async fn connection(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, DomainError> {
        self.pool.acquire().await.map_err(db_error)
    }
}

#[async_trait]
impl StoryStore for PgStoryStore {
    async fn begin(&self) -> Result<Box<dyn StoryTransaction>, DomainError> {
        let tx = self.pool.begin().await.map_err(db_error)?;
        Ok(Box::new(PgStoryTransaction { tx }))
    }

    async fn find_story(
        &self,
        story_id: Uuid,
        shape: LoadSpec,
    ) -> Result<Option<Story>, DomainError> {
        let mut conn = self.connection().await?;
        load_story(&mut conn, story_id, shape, false).await
    }

    async fn find_user(&self, user_id: Uuid) -> Result<Option<User>, DomainError> {
        let mut conn = self.connection().await?;
        fetch_user(&mut conn, user_id).await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, DomainError> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("{SELECT_USER} WHERE lower(username) = lower($1)"))
                .bind(username.trim())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error)?;
        row.map(User::try_from).transpose()
    }

    #[instrument(skip_all, fields(username = %new_user.username))]
    async fn create_user(&self, new_user: &NewUser) -> Result<User, DomainError> {
        let row: UserRow = sqlx::query_as(
            "INSERT INTO users (id, username, email, password_hash) \
             VALUES ($1, $2, $3, crypt($4, gen_salt('bf', 8))) \
             RETURNING id, username, email, email_verification_status",
        )
        .bind(Uuid::new_v4())
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(&new_user.password)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match db_error(e) {
            DomainError::Conflict(_) => DomainError::Conflict(format!(
                "Username {} is already taken",
                new_user.username
            )),
            other => other,
        })?;
        debug!(user_id = %row.id, "User row inserted");
        User::try_from(row)
    }

    async fn authenticate(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<User>, DomainError> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "{SELECT_USER} WHERE lower(username) = lower($1) \
             AND password_hash = crypt($2, password_hash)"
        ))
        .bind(username.trim())
        .bind(password)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        row.map(User::try_from).transpose()
    }

    async fn mark_email_verified(&self, user_id: Uuid) -> Result<(), DomainError> {
        let result =
            sqlx::query("UPDATE users SET email_verification_status = 'verified' WHERE id = $1")
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("user {user_id}")));
        }
        Ok(())
    }

    async fn list_users_except(&self, user_id: Uuid) -> Result<Vec<User>, DomainError> {
        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("{SELECT_USER} WHERE id <> $1 ORDER BY username"))
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(db_error)?;
        rows.into_iter().map(User::try_from).collect()
    }

    async fn stories_for_user(&self, user_id: Uuid) -> Result<Vec<UserStory>, DomainError> {
        let mut conn = self.connection().await?;
        let listed: Vec<(Uuid, bool)> = sqlx::query_as(
            "SELECT s.id, COALESCE(h.hidden_status = 'hidden', FALSE) AS hidden \
             FROM stories s \
             LEFT JOIN user_story_hides h ON h.story_id = s.id AND h.user_id = $1 \
             WHERE s.created_by = $1 \
                OR EXISTS (SELECT 1 FROM story_cowriters c \
                           WHERE c.story_id = s.id AND c.user_id = $1) \
             ORDER BY s.created_at DESC, s.id DESC",
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_error)?;

        let mut stories = Vec::with_capacity(listed.len());
        for (story_id, hidden) in listed {
            if let Some(story) = load_story(&mut conn, story_id, LoadSpec::full(), false).await? {
                stories.push(UserStory { story, hidden });
            }
        }
        Ok(stories)
    }

    async fn find_hide(
        &self,
        user_id: Uuid,
        story_id: Uuid,
    ) -> Result<Option<UserStoryHide>, DomainError> {
        let status: Option<(String,)> = sqlx::query_as(
            "SELECT hidden_status FROM user_story_hides WHERE user_id = $1 AND story_id = $2",
        )
        .bind(user_id)
        .bind(story_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;
        status
            .map(|(status,)| {
                let hidden_status = status.parse::<HiddenStatus>().map_err(|_| {
                    DomainError::Infrastructure(format!(
                        "data corruption: unexpected hidden_status '{status}'"
                    ))
                })?;
                Ok(UserStoryHide {
                    user_id,
                    story_id,
                    hidden_status,
                })
            })
            .transpose()
    }
}

/// A story unit of work on one `PostgreSQL` transaction.
///
/// Dropping it without `commit` rolls the transaction back.
pub struct PgStoryTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoryTransaction for PgStoryTransaction {
    async fn lock_story(
        &mut self,
        story_id: Uuid,
        shape: LoadSpec,
    ) -> Result<Option<Story>, DomainError> {
        load_story(&mut self.tx, story_id, shape, true).await
    }

    async fn find_users_by_usernames(
        &mut self,
        usernames: &[String],
    ) -> Result<Vec<User>, DomainError> {
        let lowered: Vec<String> = usernames.iter().map(|n| n.to_lowercase()).collect();
        let rows: Vec<UserRow> =
            sqlx::query_as(&format!("{SELECT_USER} WHERE lower(username) = ANY($1)"))
                .bind(lowered)
                .fetch_all(&mut *self.tx)
                .await
                .map_err(db_error)?;
        rows.into_iter().map(User::try_from).collect()
    }

    #[instrument(skip_all, fields(story_id = %story.id))]
    async fn insert_story(&mut self, story: &Story) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO stories (id, title, state, created_by, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(story.id)
        .bind(&story.title)
        .bind(story.state.as_str())
        .bind(story.created_by)
        .bind(story.created_at)
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        for turn in &story.turns {
            insert_turn_row(&mut self.tx, turn).await?;
        }
        Ok(())
    }

    async fn insert_turn(&mut self, turn: &Turn) -> Result<(), DomainError> {
        insert_turn_row(&mut self.tx, turn).await
    }

    async fn insert_cowriters(
        &mut self,
        story_id: Uuid,
        cowriters: &[Cowriter],
    ) -> Result<(), DomainError> {
        for cowriter in cowriters {
            sqlx::query(
                "INSERT INTO story_cowriters (story_id, user_id, turn_index) VALUES ($1, $2, $3)",
            )
            .bind(story_id)
            .bind(cowriter.user_id)
            .bind(to_db_index(cowriter)?)
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        }
        Ok(())
    }

    async fn update_story_state(
        &mut self,
        story_id: Uuid,
        state: StoryState,
    ) -> Result<(), DomainError> {
        let result = sqlx::query("UPDATE stories SET state = $2 WHERE id = $1")
            .bind(story_id)
            .bind(state.as_str())
            .execute(&mut *self.tx)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound(format!("story {story_id}")));
        }
        Ok(())
    }

    async fn upsert_hide(&mut self, hide: &UserStoryHide) -> Result<(), DomainError> {
        sqlx::query(
            "INSERT INTO user_story_hides (user_id, story_id, hidden_status) \
             VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, story_id) \
             DO UPDATE SET hidden_status = EXCLUDED.hidden_status, updated_at = NOW()",
        )
        .bind(hide.user_id)
        .bind(hide.story_id)
        .bind(hide.hidden_status.as_str())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), DomainError> {
        self.tx.commit().await.map_err(db_error)
    }
}
