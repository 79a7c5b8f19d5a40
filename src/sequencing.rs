use crate::envelope::EventEnvelope;
use tracing::debug;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Decides which events must be consumed in order relative to each other.
///
/// Events sharing a sequence key carry the same `sequence-number` header so
/// the consumer side can serialize them.
#[derive(Debug, Clone, Default)]
pub enum SequencingPolicy {
    /// Events of the same aggregate share a key; plain events have none.
    #[default]
    PerAggregate,
    /// The value of the named metadata entry is the key.
    MetadataKey(String),
    /// Every event shares one key.
    Sequential,
    /// No event carries a key.
    FullConcurrency,
}

impl SequencingPolicy {
    pub fn sequence_key(&self, envelope: &EventEnvelope) -> Option<String> {
        match self {
            SequencingPolicy::PerAggregate => envelope.aggregate_id().map(str::to_string),

            SequencingPolicy::MetadataKey(key) => {
                let value = envelope.metadata.get(key).cloned();
                if value.is_none() {
                    debug!("Metadata key '{}' not present for sequencing", key);
                }
                value
            }

            SequencingPolicy::Sequential => Some("sequential".to_string()),

            SequencingPolicy::FullConcurrency => None,
        }
    }

    /// Numeric form of the sequence key as placed in the `sequence-number` header.
    pub fn sequence_number(&self, envelope: &EventEnvelope) -> Option<i64> {
        self.sequence_key(envelope).map(|key| numeric_key(&key))
    }
}

/// Uses `key` itself when it is an integer, otherwise its FNV-1a hash.
pub fn numeric_key(key: &str) -> i64 {
    key.parse::<i64>().unwrap_or_else(|_| fnv1a(key.as_bytes()) as i64)
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}
