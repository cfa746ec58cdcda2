use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::application::{AppError, AppResult, SubscriptionStore};
use crate::domain::{
    AlertState, Condition, Coordinates, Fingerprint, Location, Rule, SubscriberId, Verdict, Watch,
};

pub struct SqliteSubscriptionStore {
    pool: SqlitePool,
}

impl SqliteSubscriptionStore {
    /// db_url examples
    /// - "sqlite:/data/flypulse.db" (docker volume)
    /// - "sqlite:./flypulse.db"
    pub async fn new(db_url: &str) -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> AppResult<()> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS subscribers (
              id TEXT PRIMARY KEY
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS locations (
              id TEXT PRIMARY KEY,
              name TEXT NOT NULL,
              lat REAL NOT NULL,
              lon REAL NOT NULL
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS watches (
              id TEXT PRIMARY KEY,
              subscriber_id TEXT NOT NULL,
              location_id TEXT NOT NULL,
              active INTEGER NOT NULL
            );
            "#,
            // conditions is a JSON array: one rule may bind several fields
            r#"
            CREATE TABLE IF NOT EXISTS rules (
              id TEXT NOT NULL,
              watch_id TEXT NOT NULL,
              conditions TEXT NOT NULL,
              cooldown_seconds INTEGER NOT NULL,
              PRIMARY KEY (id, watch_id)
            );
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS alert_state (
              watch_id TEXT NOT NULL,
              rule_id TEXT NOT NULL,
              last_verdict TEXT NOT NULL,
              last_notified_at INTEGER,
              last_fingerprint TEXT,
              PRIMARY KEY (watch_id, rule_id)
            );
            "#,
        ];

        for stmt in statements {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;
        }

        Ok(())
    }

    async fn load_rules(&self, watch_id: &str) -> AppResult<Vec<Rule>> {
        let rows: Vec<(String, String, i64)> =
            sqlx::query_as("SELECT id, conditions, cooldown_seconds FROM rules WHERE watch_id = ?")
                .bind(watch_id)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| AppError::Storage(e.to_string()))?;

        let mut rules = Vec::with_capacity(rows.len());
        for (id, conditions, cooldown) in rows {
            // revalidate on the way out; a row edited by hand must not
            // reach the evaluator, and one bad row must not take the
            // whole tick down with it
            let conditions: Vec<Condition> = match serde_json::from_str(&conditions) {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(
                        watch = watch_id,
                        rule = %id,
                        error = %e,
                        "skipping rule with unreadable conditions"
                    );
                    continue;
                }
            };
            match Rule::new(id, conditions, cooldown.max(0) as u64) {
                Ok(rule) => rules.push(rule),
                Err(e) => {
                    tracing::warn!(watch = watch_id, error = %e, "skipping invalid rule row");
                }
            }
        }
        Ok(rules)
    }
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn create_watch(&self, watch: &Watch) -> AppResult<()> {
        sqlx::query("INSERT OR IGNORE INTO subscribers(id) VALUES(?)")
            .bind(watch.subscriber.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        sqlx::query("INSERT OR REPLACE INTO locations(id, name, lat, lon) VALUES(?, ?, ?, ?)")
            .bind(&watch.location.id)
            .bind(&watch.location.name)
            .bind(watch.location.coords.lat())
            .bind(watch.location.coords.lon())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        sqlx::query(
            "INSERT OR REPLACE INTO watches(id, subscriber_id, location_id, active) VALUES(?, ?, ?, ?)",
        )
        .bind(&watch.id)
        .bind(watch.subscriber.as_str())
        .bind(&watch.location.id)
        .bind(watch.active as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        sqlx::query("DELETE FROM rules WHERE watch_id = ?")
            .bind(&watch.id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        for rule in &watch.rules {
            let conditions = serde_json::to_string(&rule.conditions)
                .map_err(|e| AppError::Storage(e.to_string()))?;
            sqlx::query(
                "INSERT INTO rules(id, watch_id, conditions, cooldown_seconds) VALUES(?, ?, ?, ?)",
            )
            .bind(&rule.id)
            .bind(&watch.id)
            .bind(conditions)
            .bind(rule.cooldown_seconds as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        }

        Ok(())
    }

    async fn list_active_watches(&self) -> AppResult<Vec<Watch>> {
        let rows: Vec<(String, String, String, String, f64, f64)> = sqlx::query_as(
            r#"
            SELECT w.id, w.subscriber_id, l.id, l.name, l.lat, l.lon
            FROM watches w
            JOIN locations l ON l.id = w.location_id
            WHERE w.active = 1
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        let mut watches = Vec::with_capacity(rows.len());
        for (watch_id, subscriber, loc_id, loc_name, lat, lon) in rows {
            let coords =
                Coordinates::new(lat, lon).map_err(|e| AppError::Storage(e.to_string()))?;
            let rules = self.load_rules(&watch_id).await?;
            watches.push(Watch {
                id: watch_id,
                subscriber: SubscriberId(subscriber),
                location: Location {
                    id: loc_id,
                    name: loc_name,
                    coords,
                },
                rules,
                active: true,
            });
        }
        Ok(watches)
    }

    async fn deactivate_watch(&self, watch_id: &str) -> AppResult<()> {
        sqlx::query("UPDATE watches SET active = 0 WHERE id = ?")
            .bind(watch_id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;
        Ok(())
    }

    async fn get_alert_state(
        &self,
        watch_id: &str,
        rule_id: &str,
    ) -> AppResult<Option<AlertState>> {
        let row: Option<(String, Option<i64>, Option<String>)> = sqlx::query_as(
            r#"
            SELECT last_verdict, last_notified_at, last_fingerprint
            FROM alert_state WHERE watch_id = ? AND rule_id = ? LIMIT 1
            "#,
        )
        .bind(watch_id)
        .bind(rule_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        let (verdict, last_notified_at, fingerprint) = match row {
            Some(r) => r,
            None => return Ok(None),
        };

        let last_verdict = Verdict::parse(&verdict)
            .ok_or_else(|| AppError::Storage(format!("bad verdict in alert_state: {verdict}")))?;
        let last_fingerprint = match fingerprint {
            Some(json) => Some(
                serde_json::from_str::<Fingerprint>(&json)
                    .map_err(|e| AppError::Storage(e.to_string()))?,
            ),
            None => None,
        };

        Ok(Some(AlertState {
            last_verdict,
            last_notified_at,
            last_fingerprint,
        }))
    }

    async fn upsert_alert_state(
        &self,
        watch_id: &str,
        rule_id: &str,
        state: &AlertState,
    ) -> AppResult<()> {
        let fingerprint = match &state.last_fingerprint {
            Some(fp) => {
                Some(serde_json::to_string(fp).map_err(|e| AppError::Storage(e.to_string()))?)
            }
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO alert_state(watch_id, rule_id, last_verdict, last_notified_at, last_fingerprint)
            VALUES(?, ?, ?, ?, ?)
            ON CONFLICT(watch_id, rule_id) DO UPDATE SET
              last_verdict = excluded.last_verdict,
              last_notified_at = excluded.last_notified_at,
              last_fingerprint = excluded.last_fingerprint
            "#,
        )
        .bind(watch_id)
        .bind(rule_id)
        .bind(state.last_verdict.as_str())
        .bind(state.last_notified_at)
        .bind(fingerprint)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn remove_subscriber(&self, subscriber: &SubscriberId) -> AppResult<()> {
        sqlx::query(
            "DELETE FROM alert_state WHERE watch_id IN (SELECT id FROM watches WHERE subscriber_id = ?)",
        )
        .bind(subscriber.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        sqlx::query(
            "DELETE FROM rules WHERE watch_id IN (SELECT id FROM watches WHERE subscriber_id = ?)",
        )
        .bind(subscriber.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Storage(e.to_string()))?;

        sqlx::query("DELETE FROM watches WHERE subscriber_id = ?")
            .bind(subscriber.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        sqlx::query("DELETE FROM subscribers WHERE id = ?")
            .bind(subscriber.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Cmp, Condition, ObsField};

    async fn temp_store(name: &str) -> SqliteSubscriptionStore {
        let path = std::env::temp_dir().join(format!(
            "flypulse-{}-{}.db",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        let url = format!("sqlite://{}?mode=rwc", path.display());
        SqliteSubscriptionStore::new(&url).await.unwrap()
    }

    fn watch() -> Watch {
        let rule = Rule::new(
            "strong-wind".into(),
            vec![Condition::Threshold {
                field: ObsField::WindSpeed,
                op: Cmp::Gt,
                value: 8.0,
            }],
            3600,
        )
        .unwrap();
        Watch {
            id: "w-1".into(),
            subscriber: SubscriberId("111".into()),
            location: Location {
                id: "yutsa".into(),
                name: "Юца".into(),
                coords: Coordinates::new(43.98, 42.99).unwrap(),
            },
            rules: vec![rule],
            active: true,
        }
    }

    #[tokio::test]
    async fn corrupt_rule_rows_are_skipped_not_fatal() {
        let store = temp_store("corrupt-rules").await;
        store.create_watch(&watch()).await.unwrap();

        // a hand-edited row with unreadable JSON
        sqlx::query(
            "INSERT INTO rules(id, watch_id, conditions, cooldown_seconds) VALUES(?, ?, ?, ?)",
        )
        .bind("mangled")
        .bind("w-1")
        .bind("{not json")
        .bind(3600i64)
        .execute(&store.pool)
        .await
        .unwrap();

        // and one whose cooldown was zeroed behind our back
        sqlx::query(
            "INSERT INTO rules(id, watch_id, conditions, cooldown_seconds) VALUES(?, ?, ?, ?)",
        )
        .bind("zeroed")
        .bind("w-1")
        .bind(r#"[{"kind":"threshold","field":"wind_speed","op":"gt","value":8.0}]"#)
        .bind(0i64)
        .execute(&store.pool)
        .await
        .unwrap();

        // the tick still sees the watch, carrying only the valid rule
        let watches = store.list_active_watches().await.unwrap();
        assert_eq!(watches.len(), 1);
        let ids: Vec<&str> = watches[0].rules.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["strong-wind"]);
    }

    #[tokio::test]
    async fn alert_state_survives_a_roundtrip() {
        let store = temp_store("state-roundtrip").await;
        store.create_watch(&watch()).await.unwrap();

        let state = AlertState {
            last_verdict: Verdict::Alert,
            last_notified_at: Some(1000),
            last_fingerprint: Some(Fingerprint {
                wind_speed_ms: 12.0,
                wind_gust_ms: Some(16.0),
                precip_probability: 0.1,
            }),
        };
        store
            .upsert_alert_state("w-1", "strong-wind", &state)
            .await
            .unwrap();

        let loaded = store
            .get_alert_state("w-1", "strong-wind")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded, state);
    }
}
