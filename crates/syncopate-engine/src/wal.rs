//! Write-ahead log: length-prefixed JSON records appended before every
//! apply, replayed from the beginning on startup.
//!
//! Record bodies are optionally gzip-compressed; the length prefix never
//! is. The reader detects the gzip magic per record, so a log written
//! with compression toggled across restarts still replays.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use syncopate_core::error::DbError;
use syncopate_core::types::{Entity, EntityTypeDefinition};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// The operation kind of a log record. Entity mutations plus the schema
/// operations needed so a replayed store can resolve its types again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WalOp {
    Insert,
    Update,
    Delete,
    RegisterType,
    UpdateType,
}

/// One log record. `payload` carries the full post-apply field map for
/// entity writes (timestamps included, so replay is a verbatim install)
/// or the full definition for schema operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    pub op: WalOp,
    #[serde(rename = "type")]
    pub entity_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

impl WalRecord {
    pub fn insert(entity: &Entity) -> Result<Self, DbError> {
        Ok(Self {
            op: WalOp::Insert,
            entity_type: entity.entity_type.clone(),
            id: entity.id.clone(),
            payload: Some(encode_fields(entity)?),
        })
    }

    pub fn update(entity: &Entity) -> Result<Self, DbError> {
        Ok(Self {
            op: WalOp::Update,
            entity_type: entity.entity_type.clone(),
            id: entity.id.clone(),
            payload: Some(encode_fields(entity)?),
        })
    }

    pub fn delete(entity_type: &str, id: &str) -> Self {
        Self {
            op: WalOp::Delete,
            entity_type: entity_type.to_string(),
            id: id.to_string(),
            payload: None,
        }
    }

    pub fn register_type(def: &EntityTypeDefinition) -> Result<Self, DbError> {
        Ok(Self {
            op: WalOp::RegisterType,
            entity_type: def.name.clone(),
            id: String::new(),
            payload: Some(encode_definition(def)?),
        })
    }

    pub fn update_type(def: &EntityTypeDefinition) -> Result<Self, DbError> {
        Ok(Self {
            op: WalOp::UpdateType,
            entity_type: def.name.clone(),
            id: String::new(),
            payload: Some(encode_definition(def)?),
        })
    }
}

fn encode_fields(entity: &Entity) -> Result<serde_json::Value, DbError> {
    serde_json::to_value(&entity.fields).map_err(|e| DbError::Internal {
        message: format!("failed to encode wal payload: {e}"),
    })
}

fn encode_definition(def: &EntityTypeDefinition) -> Result<serde_json::Value, DbError> {
    serde_json::to_value(def).map_err(|e| DbError::Internal {
        message: format!("failed to encode wal payload: {e}"),
    })
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// Sequential append-only writer. Callers append while holding the
/// engine's write lock so log order equals apply order; the internal
/// mutex only serializes the file handle itself.
pub struct WalWriter {
    file: Mutex<File>,
    compress: bool,
    bytes_original: AtomicU64,
    bytes_encoded: AtomicU64,
}

impl WalWriter {
    /// Opens (or creates) the log for appending.
    pub fn open(path: &Path, compress: bool) -> Result<Self, DbError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| DbError::Internal {
                message: format!("failed to open wal at {}: {e}", path.display()),
            })?;
        Ok(Self {
            file: Mutex::new(file),
            compress,
            bytes_original: AtomicU64::new(0),
            bytes_encoded: AtomicU64::new(0),
        })
    }

    /// Appends one record and flushes before returning. A failure here
    /// aborts the caller's mutation; in-memory state stays untouched.
    pub async fn append(&self, record: &WalRecord) -> Result<(), DbError> {
        let plain = serde_json::to_vec(record).map_err(|e| DbError::Internal {
            message: format!("failed to serialize wal record: {e}"),
        })?;
        let body = if self.compress {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&plain).map_err(|e| DbError::Internal {
                message: format!("wal compression failed: {e}"),
            })?;
            encoder.finish().map_err(|e| DbError::Internal {
                message: format!("wal compression failed: {e}"),
            })?
        } else {
            plain.clone()
        };

        let len = u32::try_from(body.len()).map_err(|_| DbError::Internal {
            message: "wal record exceeds the 4 GiB frame limit".into(),
        })?;

        let mut file = self.file.lock().await;
        file.write_all(&len.to_le_bytes())
            .and_then(|_| file.write_all(&body))
            .and_then(|_| file.flush())
            .map_err(|e| DbError::Internal {
                message: format!("wal append failed: {e}"),
            })?;
        drop(file);

        self.bytes_original
            .fetch_add(plain.len() as u64, Ordering::Relaxed);
        self.bytes_encoded
            .fetch_add(body.len() as u64, Ordering::Relaxed);
        debug!(op = ?record.op, entity_type = %record.entity_type, id = %record.id, "wal append");
        Ok(())
    }

    pub fn compression_enabled(&self) -> bool {
        self.compress
    }

    /// original / compressed over this writer's lifetime; 1.0 means none.
    pub fn compression_ratio(&self) -> f64 {
        let original = self.bytes_original.load(Ordering::Relaxed);
        let encoded = self.bytes_encoded.load(Ordering::Relaxed);
        if !self.compress || encoded == 0 {
            1.0
        } else {
            original as f64 / encoded as f64
        }
    }
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

/// State reconstructed from a full log replay. Indexes are rebuilt by the
/// store afterwards; counters are the max id seen per type over insert
/// records, so deletions never rewind them.
#[derive(Debug, Default)]
pub struct Recovered {
    pub types: HashMap<String, EntityTypeDefinition>,
    pub entities: HashMap<String, HashMap<String, Entity>>,
    pub counters: HashMap<String, u64>,
}

/// Replays the log from offset zero. A missing file yields empty state;
/// a record that cannot be decoded (including an unknown op) aborts
/// recovery.
pub fn replay(path: &Path) -> Result<Recovered, DbError> {
    let mut recovered = Recovered::default();
    let mut file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(recovered),
        Err(e) => {
            return Err(DbError::Internal {
                message: format!("failed to open wal at {}: {e}", path.display()),
            })
        }
    };

    let mut index = 0usize;
    while let Some(len) = read_frame_len(&mut file, index)? {
        let mut body = vec![0u8; len as usize];
        file.read_exact(&mut body).map_err(|e| DbError::Internal {
            message: format!("wal record {index} is truncated: {e}"),
        })?;

        let plain = if body.len() >= 2 && body[..2] == GZIP_MAGIC {
            let mut decoder = GzDecoder::new(&body[..]);
            let mut out = Vec::new();
            decoder.read_to_end(&mut out).map_err(|e| DbError::Internal {
                message: format!("wal record {index} failed to decompress: {e}"),
            })?;
            out
        } else {
            body
        };

        let record: WalRecord = serde_json::from_slice(&plain).map_err(|e| DbError::Internal {
            message: format!("wal record {index} is not decodable: {e}"),
        })?;
        apply_record(&mut recovered, record, index)?;
        index += 1;
    }

    info!(
        records = index,
        types = recovered.types.len(),
        "wal replay complete"
    );
    Ok(recovered)
}

fn read_frame_len(file: &mut File, index: usize) -> Result<Option<u32>, DbError> {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < 4 {
        match file.read(&mut len_buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => {
                return Err(DbError::Internal {
                    message: format!("wal record {index} has a truncated length prefix"),
                })
            }
            Ok(n) => filled += n,
            Err(e) => {
                return Err(DbError::Internal {
                    message: format!("wal read failed at record {index}: {e}"),
                })
            }
        }
    }
    Ok(Some(u32::from_le_bytes(len_buf)))
}

fn apply_record(recovered: &mut Recovered, record: WalRecord, index: usize) -> Result<(), DbError> {
    match record.op {
        WalOp::RegisterType | WalOp::UpdateType => {
            let payload = record.payload.ok_or_else(|| DbError::Internal {
                message: format!("wal record {index} is missing a schema payload"),
            })?;
            let def: EntityTypeDefinition =
                serde_json::from_value(payload).map_err(|e| DbError::Internal {
                    message: format!("wal record {index} has a bad schema payload: {e}"),
                })?;
            recovered.types.insert(def.name.clone(), def);
        }
        WalOp::Insert | WalOp::Update => {
            let payload = record.payload.ok_or_else(|| DbError::Internal {
                message: format!("wal record {index} is missing an entity payload"),
            })?;
            let fields = serde_json::from_value(payload).map_err(|e| DbError::Internal {
                message: format!("wal record {index} has a bad entity payload: {e}"),
            })?;
            if record.op == WalOp::Insert {
                if let Ok(n) = record.id.parse::<u64>() {
                    let counter = recovered
                        .counters
                        .entry(record.entity_type.clone())
                        .or_insert(0);
                    *counter = (*counter).max(n);
                }
            }
            recovered
                .entities
                .entry(record.entity_type.clone())
                .or_default()
                .insert(
                    record.id.clone(),
                    Entity::new(record.id, record.entity_type, fields),
                );
        }
        WalOp::Delete => {
            if let Some(per_type) = recovered.entities.get_mut(&record.entity_type) {
                per_type.remove(&record.id);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use syncopate_core::types::{FieldDefinition, FieldType, FieldValue, IdGeneratorKind};

    use super::*;

    fn user_def() -> EntityTypeDefinition {
        EntityTypeDefinition::new("user", IdGeneratorKind::AutoIncrement).with_fields(vec![
            FieldDefinition::new("email", FieldType::String).required().unique(),
        ])
    }

    fn user_entity(id: &str, email: &str) -> Entity {
        let mut fields = BTreeMap::new();
        fields.insert(
            "email".to_string(),
            FieldValue::String(email.to_string()),
        );
        let mut e = Entity::new(id, "user", fields);
        e.stamp_created(chrono::Utc::now());
        e
    }

    #[tokio::test]
    async fn append_and_replay_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syncopate.wal");

        let writer = WalWriter::open(&path, false).unwrap();
        writer
            .append(&WalRecord::register_type(&user_def()).unwrap())
            .await
            .unwrap();
        writer
            .append(&WalRecord::insert(&user_entity("1", "a@b")).unwrap())
            .await
            .unwrap();
        writer
            .append(&WalRecord::insert(&user_entity("2", "c@d")).unwrap())
            .await
            .unwrap();
        writer
            .append(&WalRecord::delete("user", "1"))
            .await
            .unwrap();

        let recovered = replay(&path).unwrap();
        assert!(recovered.types.contains_key("user"));
        let users = recovered.entities.get("user").unwrap();
        assert!(!users.contains_key("1"));
        let survivor = users.get("2").unwrap();
        assert_eq!(
            survivor.field("email"),
            Some(&FieldValue::String("c@d".into()))
        );
        assert!(survivor.created_at().is_some());
        // the deleted max id still pins the counter
        assert_eq!(recovered.counters.get("user"), Some(&2));
    }

    #[tokio::test]
    async fn compressed_records_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syncopate.wal");

        let writer = WalWriter::open(&path, true).unwrap();
        writer
            .append(&WalRecord::register_type(&user_def()).unwrap())
            .await
            .unwrap();
        writer
            .append(&WalRecord::insert(&user_entity("1", "a@b")).unwrap())
            .await
            .unwrap();
        assert!(writer.compression_ratio() > 0.0);

        let recovered = replay(&path).unwrap();
        assert_eq!(recovered.entities.get("user").unwrap().len(), 1);
    }

    #[tokio::test]
    async fn mixed_compression_replays() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syncopate.wal");

        let plain = WalWriter::open(&path, false).unwrap();
        plain
            .append(&WalRecord::register_type(&user_def()).unwrap())
            .await
            .unwrap();
        drop(plain);

        let gz = WalWriter::open(&path, true).unwrap();
        gz.append(&WalRecord::insert(&user_entity("1", "a@b")).unwrap())
            .await
            .unwrap();

        let recovered = replay(&path).unwrap();
        assert!(recovered.types.contains_key("user"));
        assert_eq!(recovered.entities.get("user").unwrap().len(), 1);
    }

    #[test]
    fn missing_file_is_empty_state() {
        let dir = tempfile::tempdir().unwrap();
        let recovered = replay(&dir.path().join("nope.wal")).unwrap();
        assert!(recovered.types.is_empty());
        assert!(recovered.entities.is_empty());
    }

    #[test]
    fn unknown_op_aborts_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syncopate.wal");
        let body = br#"{"op":"truncate","type":"user","id":"1"}"#;
        let mut raw = (body.len() as u32).to_le_bytes().to_vec();
        raw.extend_from_slice(body);
        std::fs::write(&path, raw).unwrap();

        let err = replay(&path).unwrap_err();
        assert!(matches!(err, DbError::Internal { .. }));
    }

    #[test]
    fn truncated_tail_aborts_recovery() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("syncopate.wal");
        std::fs::write(&path, 16u32.to_le_bytes()).unwrap();

        assert!(replay(&path).is_err());
    }

    #[tokio::test]
    async fn ratio_is_one_without_compression() {
        let dir = tempfile::tempdir().unwrap();
        let writer = WalWriter::open(&dir.path().join("w.wal"), false).unwrap();
        writer
            .append(&WalRecord::delete("user", "1"))
            .await
            .unwrap();
        assert_eq!(writer.compression_ratio(), 1.0);
    }
}
