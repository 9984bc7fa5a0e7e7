//! Administrative command executor.
//!
//! Commands are shape-checked, then checked against the stream registry,
//! then applied. Every state change is audited with the operator as actor.

use chrono::{DateTime, Utc};
use engine_core::{Actor, AdminCommand, AuditAction, CommandOutcome, Result};
use tracing::{info, warn};

use crate::engine::LifecycleEngine;

impl LifecycleEngine {
    /// Executes an operator command. Idempotent no-ops, such as compressing
    /// an already compressed chunk, succeed.
    pub async fn execute(&self, command: AdminCommand, now: DateTime<Utc>) -> CommandOutcome {
        let name = command.name();
        match self.apply(command, now).await {
            Ok(message) => {
                info!(command = name, message = %message, "Admin command executed");
                CommandOutcome::ok(name, message)
            }
            Err(e) if e.is_noop() => CommandOutcome::ok(name, e.to_string()),
            Err(e) => {
                warn!(command = name, error = %e, "Admin command failed");
                CommandOutcome::failed(name, e.to_string())
            }
        }
    }

    async fn apply(&self, command: AdminCommand, now: DateTime<Utc>) -> Result<String> {
        command.validate_shape()?;
        if let Some(stream) = command.stream() {
            self.registry().get(stream)?;
        }

        match command {
            AdminCommand::CompressChunk { chunk_id } => {
                let outcome = self
                    .compression
                    .compress_chunk(chunk_id, Actor::Operator, now)
                    .await?;
                Ok(format!(
                    "compressed {} rows, {} -> {} bytes",
                    outcome.rows, outcome.bytes_before, outcome.bytes_after
                ))
            }
            AdminCommand::DecompressChunk { chunk_id } => {
                let rows = self
                    .compression
                    .decompress_chunk(chunk_id, Actor::Operator, now)
                    .await?;
                Ok(format!("decompressed {} rows", rows))
            }
            AdminCommand::RefreshAggregate {
                stream,
                start,
                end,
                granularity,
            } => {
                let written = self
                    .aggregator
                    .refresh(&stream, start, end, granularity.as_deref(), now)
                    .await?;
                Ok(format!("refreshed {} buckets", written))
            }
            AdminCommand::VerifyAggregate {
                stream,
                granularity,
                start,
                end,
            } => {
                let repaired = self
                    .aggregator
                    .verify(&stream, &granularity, start, end, Actor::Operator, now)
                    .await?;
                Ok(if repaired == 0 {
                    "aggregates consistent".to_string()
                } else {
                    format!("repaired {} buckets", repaired)
                })
            }
            AdminCommand::ModifyRetention {
                stream,
                duration_secs,
            } => {
                let previous = self.registry().get(&stream)?.retention.duration_secs;
                self.registry().modify_retention(&stream, duration_secs)?;
                let message = format!("retention {}s -> {}s", previous, duration_secs);
                self.audit_change(now, AuditAction::RetentionModified, &stream, &message);
                Ok(message)
            }
            AdminCommand::PauseRetention { stream } => {
                self.registry().pause_retention(&stream)?;
                let message = "retention paused".to_string();
                self.audit_change(now, AuditAction::RetentionPaused, &stream, &message);
                Ok(message)
            }
            AdminCommand::ResumeRetention { stream } => {
                self.registry().resume_retention(&stream)?;
                let message = "retention resumed".to_string();
                self.audit_change(now, AuditAction::RetentionResumed, &stream, &message);
                Ok(message)
            }
            AdminCommand::SetArchivalBypass { stream, enabled } => {
                self.registry().set_archival_bypass(&stream, enabled)?;
                let message = format!("archival bypass {}", if enabled { "on" } else { "off" });
                self.audit_change(now, AuditAction::ArchivalBypassChanged, &stream, &message);
                Ok(message)
            }
            AdminCommand::SetChunkInterval {
                stream,
                interval_secs,
            } => {
                let previous = self.registry().get(&stream)?.chunk_interval_secs;
                self.registry().set_chunk_interval(&stream, interval_secs)?;
                let message = format!(
                    "chunk interval {}s -> {}s for new chunks",
                    previous, interval_secs
                );
                self.audit_change(now, AuditAction::ChunkIntervalChanged, &stream, &message);
                Ok(message)
            }
        }
    }

    fn audit_change(&self, now: DateTime<Utc>, action: AuditAction, stream: &str, message: &str) {
        self.audit()
            .record(now, Actor::Operator, action, stream, None, message.to_string());
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::LifecycleEngine;
    use crate::test_support::numeric_spec;
    use chrono::{Duration, Utc};
    use engine_core::limits::{DAY_SECS, HOUR_SECS};
    use engine_core::{AdminCommand, AuditAction, ChunkId, Point};

    async fn engine_with_chunk() -> (LifecycleEngine, ChunkId) {
        let engine = LifecycleEngine::builder().build();
        let now = Utc::now();
        engine.register_stream(numeric_spec("s"), now).unwrap();
        engine
            .ingest("s", vec![Point::numeric(now - Duration::hours(3), 1.0)])
            .await
            .unwrap();
        let id = engine.chunks().chunks("s").unwrap()[0].id;
        (engine, id)
    }

    #[tokio::test]
    async fn test_compress_then_decompress() {
        let (engine, id) = engine_with_chunk().await;
        let now = Utc::now();

        let outcome = engine
            .execute(AdminCommand::CompressChunk { chunk_id: id }, now)
            .await;
        assert!(outcome.success, "{}", outcome.message);

        // Idempotent
        let again = engine
            .execute(AdminCommand::CompressChunk { chunk_id: id }, now)
            .await;
        assert!(again.success);
        assert!(again.message.contains("CHUNK_002"));

        let outcome = engine
            .execute(AdminCommand::DecompressChunk { chunk_id: id }, now)
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "decompressed 1 rows");
        assert_eq!(engine.audit().for_chunk(id).len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_stream_refused() {
        let (engine, _) = engine_with_chunk().await;
        let outcome = engine
            .execute(
                AdminCommand::PauseRetention {
                    stream: "missing".into(),
                },
                Utc::now(),
            )
            .await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("CONFIG_002"));
        assert_eq!(outcome.command, "pause_retention");
    }

    #[tokio::test]
    async fn test_invalid_shape_refused() {
        let (engine, _) = engine_with_chunk().await;
        let now = Utc::now();
        let outcome = engine
            .execute(
                AdminCommand::RefreshAggregate {
                    stream: "s".into(),
                    start: now,
                    end: now - Duration::hours(1),
                    granularity: None,
                },
                now,
            )
            .await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("VALID_001"));
    }

    #[tokio::test]
    async fn test_policy_changes_are_audited() {
        let (engine, _) = engine_with_chunk().await;
        let now = Utc::now();

        let commands = vec![
            AdminCommand::ModifyRetention {
                stream: "s".into(),
                duration_secs: 30 * DAY_SECS,
            },
            AdminCommand::PauseRetention { stream: "s".into() },
            AdminCommand::ResumeRetention { stream: "s".into() },
            AdminCommand::SetArchivalBypass {
                stream: "s".into(),
                enabled: true,
            },
            AdminCommand::SetChunkInterval {
                stream: "s".into(),
                interval_secs: DAY_SECS,
            },
        ];
        for command in commands {
            let outcome = engine.execute(command, now).await;
            assert!(outcome.success, "{}", outcome.message);
        }

        let config = engine.registry().get("s").unwrap();
        assert_eq!(config.retention.duration_secs, 30 * DAY_SECS);
        assert!(!config.retention_paused);
        assert!(config.archival_bypass);
        assert_eq!(config.chunk_interval_secs, DAY_SECS);

        let actions: Vec<AuditAction> = engine
            .audit()
            .for_stream("s")
            .iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(
            actions,
            vec![
                AuditAction::RetentionModified,
                AuditAction::RetentionPaused,
                AuditAction::RetentionResumed,
                AuditAction::ArchivalBypassChanged,
                AuditAction::ChunkIntervalChanged,
            ]
        );
    }

    #[tokio::test]
    async fn test_refresh_and_verify() {
        let (engine, _) = engine_with_chunk().await;
        let now = Utc::now();
        let start = now - Duration::days(1);
        let end = now - Duration::seconds(HOUR_SECS as i64);

        let outcome = engine
            .execute(
                AdminCommand::RefreshAggregate {
                    stream: "s".into(),
                    start,
                    end,
                    granularity: Some("hourly".into()),
                },
                now,
            )
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "refreshed 1 buckets");

        let outcome = engine
            .execute(
                AdminCommand::VerifyAggregate {
                    stream: "s".into(),
                    granularity: "hourly".into(),
                    start,
                    end,
                },
                now,
            )
            .await;
        assert!(outcome.success);
        assert_eq!(outcome.message, "aggregates consistent");
    }
}
