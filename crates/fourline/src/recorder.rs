//! Postgres-backed [`GameRecorder`].

use fourline_coordinator::{FinishedGame, GameRecorder, SinkError};
use fourline_protocol::Identity;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

const SCHEMA: [&str; 2] = [
    r#"
    CREATE TABLE IF NOT EXISTS games (
        id BIGSERIAL PRIMARY KEY,
        session_id TEXT NOT NULL,
        player1 TEXT NOT NULL,
        player2 TEXT NOT NULL,
        winner TEXT,
        moves INT NOT NULL,
        duration_seconds INT NOT NULL,
        finished_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS leaderboard (
        username TEXT PRIMARY KEY,
        wins INT NOT NULL DEFAULT 0
    )
    "#,
];

/// Writes one `games` row per finished round and bumps the winner's
/// `leaderboard.wins`.
#[derive(Debug, Clone)]
pub struct PgRecorder {
    pool: PgPool,
}

impl PgRecorder {
    /// Connects to `database_url` and creates the tables if they are missing.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let recorder = Self { pool };
        recorder.ensure_schema().await?;
        Ok(recorder)
    }

    async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    async fn insert(&self, game: &FinishedGame) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO games (session_id, player1, player2, winner, moves, duration_seconds)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(game.session_id.as_str())
        .bind(game.player_one.as_str())
        .bind(game.player_two.as_str())
        .bind(game.winner.as_ref().map(Identity::as_str))
        .bind(int_column(u64::from(game.moves)))
        .bind(int_column(game.duration.as_secs()))
        .execute(&mut *tx)
        .await?;

        if let Some(winner) = &game.winner {
            sqlx::query(
                r#"
                INSERT INTO leaderboard (username, wins) VALUES ($1, 1)
                ON CONFLICT (username) DO UPDATE SET wins = leaderboard.wins + 1
                "#,
            )
            .bind(winner.as_str())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await
    }
}

/// Postgres `INT` columns saturate rather than wrap.
fn int_column(value: u64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

impl GameRecorder for PgRecorder {
    async fn record(&self, game: &FinishedGame) -> Result<(), SinkError> {
        self.insert(game)
            .await
            .map_err(|e| SinkError::Write(Box::new(e)))?;
        tracing::debug!(session_id = %game.session_id, "finished game stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};

    use fourline_protocol::SessionId;

    use super::*;

    #[test]
    fn test_int_column_saturates_at_i32_max() {
        assert_eq!(int_column(42), 42);
        assert_eq!(int_column(u64::from(u32::MAX)), i32::MAX);
        assert_eq!(int_column(u64::MAX), i32::MAX);
    }

    /// Connects to `DATABASE_URL`, or returns `None` so the database tests
    /// pass trivially on machines without Postgres.
    async fn recorder() -> Option<PgRecorder> {
        let url = std::env::var("DATABASE_URL").ok()?;
        Some(PgRecorder::connect(&url).await.expect("should connect to DATABASE_URL"))
    }

    /// A name no other test run will use.
    fn unique(prefix: &str) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        format!("{prefix}-{}-{nanos}", std::process::id())
    }

    fn finished(session: &str, one: &str, two: &str, winner: Option<&str>) -> FinishedGame {
        FinishedGame {
            session_id: SessionId::new(session),
            player_one: Identity::new(one),
            player_two: Identity::new(two),
            winner: winner.map(Identity::new),
            moves: 7,
            duration: Duration::from_secs(12),
        }
    }

    async fn games_for(recorder: &PgRecorder, session: &str) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM games WHERE session_id = $1")
            .bind(session)
            .fetch_one(&recorder.pool)
            .await
            .unwrap()
    }

    async fn wins_of(recorder: &PgRecorder, username: &str) -> Option<i32> {
        sqlx::query_scalar::<_, i32>("SELECT wins FROM leaderboard WHERE username = $1")
            .bind(username)
            .fetch_optional(&recorder.pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_record_win_inserts_game_and_counts_wins() {
        let Some(recorder) = recorder().await else {
            return;
        };
        let session = unique("session");
        let alice = unique("alice");
        let bob = unique("bob");

        let game = finished(&session, &alice, &bob, Some(&alice));
        recorder.record(&game).await.unwrap();
        recorder.record(&game).await.unwrap();

        assert_eq!(games_for(&recorder, &session).await, 2);
        assert_eq!(wins_of(&recorder, &alice).await, Some(2));
        assert_eq!(wins_of(&recorder, &bob).await, None);

        let (moves, seconds): (i32, i32) = sqlx::query_as(
            "SELECT moves, duration_seconds FROM games WHERE session_id = $1 LIMIT 1",
        )
        .bind(&session)
        .fetch_one(&recorder.pool)
        .await
        .unwrap();
        assert_eq!((moves, seconds), (7, 12));
    }

    #[tokio::test]
    async fn test_record_draw_leaves_leaderboard_untouched() {
        let Some(recorder) = recorder().await else {
            return;
        };
        let session = unique("session");
        let alice = unique("alice");
        let bob = unique("bob");

        recorder
            .record(&finished(&session, &alice, &bob, None))
            .await
            .unwrap();

        assert_eq!(games_for(&recorder, &session).await, 1);
        assert_eq!(wins_of(&recorder, &alice).await, None);
        assert_eq!(wins_of(&recorder, &bob).await, None);
    }

    #[tokio::test]
    async fn test_connect_twice_keeps_existing_schema() {
        let Some(first) = recorder().await else {
            return;
        };
        let session = unique("session");
        first
            .record(&finished(&session, "carol", "dave", None))
            .await
            .unwrap();

        let second = recorder().await.expect("DATABASE_URL is set");
        assert_eq!(games_for(&second, &session).await, 1);
    }
}
